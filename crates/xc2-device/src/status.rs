use xc2_protocol::consts::DeviceStatus;

/// TTL-backed status state machine (`spec.md` §3 "DeviceSession" / §4.4 lifecycle).
///
/// `Resetting`/`Bootloader`/`Firmware` are sticky: once entered, only an explicit
/// transition out of them (not TTL decay) changes status. Everything else degrades
/// `Available` → `Timeout` → `Disconnected` as `lower_ttl` is starved of `reset_ttl` calls,
/// and recovers to `Available` the moment a response arrives.
#[derive(Debug, Clone)]
pub struct StatusMachine {
    status: DeviceStatus,
    ttl: u32,
    max_ttl: u32,
}

impl StatusMachine {
    pub fn new(max_ttl: u32) -> Self {
        Self { status: DeviceStatus::Expected, ttl: max_ttl, max_ttl }
    }

    pub fn status(&self) -> DeviceStatus {
        self.status
    }

    fn is_sticky(&self) -> bool {
        matches!(self.status, DeviceStatus::Resetting | DeviceStatus::Bootloader | DeviceStatus::Firmware)
    }

    /// A response was received: refresh the TTL budget and recover from `Timeout`.
    pub fn reset_ttl(&mut self) {
        if self.is_sticky() {
            return;
        }
        self.ttl = self.max_ttl;
        self.status = DeviceStatus::Available;
    }

    /// One comms cycle passed without a response.
    pub fn lower_ttl(&mut self) {
        if self.is_sticky() {
            return;
        }
        if self.ttl > 0 {
            self.ttl -= 1;
        }
        if self.ttl == 0 {
            self.status = match self.status {
                DeviceStatus::Available => DeviceStatus::Timeout,
                DeviceStatus::Timeout | DeviceStatus::Expected => DeviceStatus::Disconnected,
                other => other,
            };
        }
    }

    pub fn enter_sticky(&mut self, status: DeviceStatus) {
        debug_assert!(matches!(status, DeviceStatus::Resetting | DeviceStatus::Bootloader | DeviceStatus::Firmware));
        self.status = status;
    }

    /// Clears a sticky state back to `Expected`, e.g. once a reset completes.
    pub fn clear_sticky(&mut self) {
        self.status = DeviceStatus::Expected;
        self.ttl = self.max_ttl;
    }
}
