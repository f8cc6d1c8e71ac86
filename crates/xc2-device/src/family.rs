//! Per-family `CMD_APPSTATUS` payload decoding (`SPEC_FULL.md` "supplemented features":
//! the per-family `xc2_dev_*` modules collapse to one capability trait rather than one
//! struct per device family, since the only thing that genuinely varies between them is how
//! the status byte is interpreted).

/// Coarse application status every family payload reduces to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppStatus {
    Running,
    Stopped,
    Fault(u8),
}

/// `CMD_ECHO` reply byte: 1 = bootloader, 2 = application (`spec.md` §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoStatus {
    Bootloader,
    Application,
}

impl EchoStatus {
    pub fn from_byte(b: u8) -> Self {
        if b == 1 {
            Self::Bootloader
        } else {
            Self::Application
        }
    }
}

pub trait FamilyStatusDecoder: Send + Sync {
    fn decode(&self, payload: &[u8]) -> AppStatus;
}

/// The default decoder: byte 0 of the `CMD_APPSTATUS` reply is `0` = stopped, `1` = running,
/// anything else a fault code. Sufficient for every family the original treats generically;
/// families with richer status words can supply their own decoder.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenericStatusDecoder;

impl FamilyStatusDecoder for GenericStatusDecoder {
    fn decode(&self, payload: &[u8]) -> AppStatus {
        match payload.first() {
            Some(0) => AppStatus::Stopped,
            Some(1) => AppStatus::Running,
            Some(&code) => AppStatus::Fault(code),
            None => AppStatus::Stopped,
        }
    }
}
