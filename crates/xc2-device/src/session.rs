use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};

use xc2_bus::{BusPort, Protocol};
use xc2_protocol::consts::{DeviceStatus, DeviceType, XC2Commands, XC2SysSubcommands};
use xc2_registers::{read_full_regs_structure, RegCommand, RegisterError, RegisterFile, RegValue};

use crate::error::DeviceError;
use crate::family::{AppStatus, EchoStatus, FamilyStatusDecoder, GenericStatusDecoder};
use crate::status::StatusMachine;

/// A live device behind a bus address: register access plus TTL/status lifecycle
/// (`spec.md` §3 "DeviceSession", §4.4).
pub struct DeviceSession {
    bus: Arc<Mutex<dyn BusPort>>,
    protocol: Protocol,
    my_addr: u16,
    pub device_addr: u16,
    pub name: String,
    pub device_type: DeviceType,
    status: RwLock<StatusMachine>,
    regs: RwLock<Option<RegisterFile>>,
    status_decoder: Box<dyn FamilyStatusDecoder>,
    timeout: Duration,
}

impl DeviceSession {
    pub fn new(
        bus: Arc<Mutex<dyn BusPort>>,
        protocol: Protocol,
        my_addr: u16,
        device_addr: u16,
        name: impl Into<String>,
        device_type: DeviceType,
    ) -> Self {
        Self {
            bus,
            protocol,
            my_addr,
            device_addr,
            name: name.into(),
            device_type,
            status: RwLock::new(StatusMachine::new(3)),
            regs: RwLock::new(None),
            status_decoder: Box::new(GenericStatusDecoder),
            timeout: Duration::from_millis(xc2_protocol::consts::TIMEOUT_RESPONSE_MS),
        }
    }

    pub fn with_status_decoder(mut self, decoder: Box<dyn FamilyStatusDecoder>) -> Self {
        self.status_decoder = decoder;
        self
    }

    pub async fn status(&self) -> DeviceStatus {
        self.status.read().await.status()
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub async fn reset_ttl(&self) {
        self.status.write().await.reset_ttl();
    }

    pub async fn lower_ttl(&self) {
        self.status.write().await.lower_ttl();
    }

    pub async fn regs(&self) -> Option<RegisterFile> {
        self.regs.read().await.clone()
    }

    async fn command(&self, cmd: u8, data: &[u8]) -> Result<Vec<u8>, DeviceError> {
        let mut bus = self.bus.lock().await;
        let result = bus.command(self.my_addr, self.device_addr, cmd, data, true, Some(self.timeout)).await;
        drop(bus);
        match result {
            Ok(payload) => {
                self.reset_ttl().await;
                Ok(payload)
            }
            Err(e @ xc2_bus::BusError::Timeout) => {
                self.lower_ttl().await;
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// `CMD_ECHO` — also the liveness probe used to drive the TTL machine externally. The
    /// reply's first byte distinguishes bootloader from application firmware; a virtual
    /// device aggregating several parents needs that distinction, not just success/failure.
    pub async fn get_echo(&self) -> Result<EchoStatus, DeviceError> {
        let payload = self.command(XC2Commands::CMD_ECHO, &[]).await?;
        Ok(EchoStatus::from_byte(payload.first().copied().unwrap_or(2)))
    }

    pub async fn get_app_status(&self) -> Result<AppStatus, DeviceError> {
        let payload = self.command(XC2Commands::CMD_APPSTATUS, &[]).await?;
        Ok(self.status_decoder.decode(&payload))
    }

    pub async fn is_running(&self) -> bool {
        matches!(self.get_app_status().await, Ok(AppStatus::Running))
    }

    async fn sys(&self, subcommand: u8, value: Option<&[u8]>) -> Result<Vec<u8>, DeviceError> {
        let mut bus = self.bus.lock().await;
        let result = bus.sys_command(self.my_addr, self.device_addr, subcommand, value, true, Some(self.timeout)).await;
        drop(bus);
        result.map_err(DeviceError::from)
    }

    pub async fn reset(&self) -> Result<(), DeviceError> {
        self.sys(XC2SysSubcommands::SYS_RESET, None).await?;
        self.status.write().await.enter_sticky(DeviceStatus::Resetting);
        Ok(())
    }

    pub async fn reset_and_stay_in_bootloader(&self) -> Result<(), DeviceError> {
        self.command(XC2Commands::CMD_STAY_IN_BOOTLOADER, &[]).await?;
        self.sys(XC2SysSubcommands::SYS_RESET, None).await?;
        self.status.write().await.enter_sticky(DeviceStatus::Bootloader);
        Ok(())
    }

    pub async fn run_app(&self) -> Result<(), DeviceError> {
        self.sys(XC2SysSubcommands::SYS_RUNAPPL, None).await?;
        self.status.write().await.clear_sticky();
        Ok(())
    }

    pub async fn write_address(&mut self, new_addr: u16) -> Result<(), DeviceError> {
        self.sys(XC2SysSubcommands::SYS_SETADDR, Some(&new_addr.to_be_bytes())).await?;
        self.device_addr = new_addr;
        Ok(())
    }

    pub async fn read_serial_number(&self) -> Result<u32, DeviceError> {
        let payload = self.sys(XC2SysSubcommands::SYS_GETSERIAL, None).await?;
        let mut buf = [0u8; 4];
        let n = payload.len().min(4);
        buf[..n].copy_from_slice(&payload[..n]);
        Ok(u32::from_be_bytes(buf))
    }

    pub async fn write_baud_rate(&self, baud: u32) -> Result<(), DeviceError> {
        self.sys(XC2SysSubcommands::SYS_SETBAUD, Some(&baud.to_be_bytes())).await?;
        Ok(())
    }

    pub async fn read_feature(&self) -> Result<Vec<u8>, DeviceError> {
        self.command(XC2Commands::CMD_GET_FEATURE, &[]).await
    }

    /// Runs `RegistryInfo_GetInfo(SIZE/STRUCTURE/DEFAULT_VALUE)` discovery and caches the
    /// resulting [`RegisterFile`] (`spec.md` §4.4 `initial_structure_reading`).
    pub async fn initial_structure_reading(&self, max_pkt_data_size: usize) -> Result<(), DeviceError> {
        let file = read_full_regs_structure(self, max_pkt_data_size).await?;
        *self.regs.write().await = Some(file);
        Ok(())
    }

    pub async fn read_reg(&self, name: &str) -> Result<RegValue, DeviceError> {
        let regs = self.regs.read().await;
        let file = regs.as_ref().ok_or(DeviceError::StructureNotRead)?;
        Ok(file.read_reg(self, name).await?)
    }

    pub async fn write_reg(&self, name: &str, value: &RegValue) -> Result<(), DeviceError> {
        let regs = self.regs.read().await;
        let file = regs.as_ref().ok_or(DeviceError::StructureNotRead)?;
        Ok(file.write_reg(self, name, value).await?)
    }

    /// Writes a single array element, leaving the rest of the register on the device
    /// untouched — what a virtual device forwards a mapped-index write to.
    pub async fn write_reg_at_index(&self, name: &str, array_index: usize, value: &RegValue) -> Result<(), DeviceError> {
        let regs = self.regs.read().await;
        let file = regs.as_ref().ok_or(DeviceError::StructureNotRead)?;
        Ok(file.write_reg_at_index(self, name, array_index, value).await?)
    }
}

#[async_trait::async_trait]
impl RegCommand for DeviceSession {
    async fn registry_read(&self, start_reg_idx: u16, reg_count: u8) -> Result<Vec<u8>, RegisterError> {
        let mut data = start_reg_idx.to_be_bytes().to_vec();
        data.push(reg_count);
        self.command(XC2Commands::CMD_REGISTRY_READ, &data)
            .await
            .map_err(|e| RegisterError::Transport(anyhow::anyhow!(e)))
    }

    async fn registry_read_elements(&self, reg_idx: u16, elem_start: u16, elem_count: u8) -> Result<Vec<u8>, RegisterError> {
        let mut data = reg_idx.to_be_bytes().to_vec();
        data.extend(elem_start.to_be_bytes());
        data.push(elem_count);
        self.command(XC2Commands::CMD_REGISTRY_READ, &data)
            .await
            .map_err(|e| RegisterError::Transport(anyhow::anyhow!(e)))
    }

    async fn registry_write(&self, reg_idx: u16, array_index: u16, payload: &[u8]) -> Result<(), RegisterError> {
        let mut data = reg_idx.to_be_bytes().to_vec();
        data.extend(array_index.to_be_bytes());
        data.extend_from_slice(payload);
        self.command(XC2Commands::CMD_REGISTRY_WRITE, &data)
            .await
            .map(|_| ())
            .map_err(|e| RegisterError::Transport(anyhow::anyhow!(e)))
    }

    async fn registry_get_info(&self, subcommand: u8, payload: &[u8]) -> Result<Vec<u8>, RegisterError> {
        let mut data = vec![subcommand];
        data.extend_from_slice(payload);
        self.command(XC2Commands::CMD_REGISTRY_GETINFO, &data)
            .await
            .map_err(|e| RegisterError::Transport(anyhow::anyhow!(e)))
    }

    async fn registry_action(&self, subcommand: u8) -> Result<(), RegisterError> {
        self.command(XC2Commands::CMD_REGISTRY_ACTION, &[subcommand])
            .await
            .map(|_| ())
            .map_err(|e| RegisterError::Transport(anyhow::anyhow!(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use xc2_bus::selector::WireFrame;
    use xc2_protocol::consts::{XC2RegFlags, XC2RegGetInfoSubcommands};

    /// Fake transport: a single `speed: u16` register plus echo/sys-reset bookkeeping, so
    /// `DeviceSession`'s lifecycle and register plumbing can be exercised without a real bus.
    struct FakeBus {
        speed: StdMutex<u16>,
        reset_called: StdMutex<bool>,
    }

    #[async_trait::async_trait]
    impl BusPort for FakeBus {
        async fn connect(&mut self) -> Result<(), xc2_bus::BusError> {
            Ok(())
        }

        async fn request_response(&mut self, _req: WireFrame, _timeout: Option<Duration>) -> Result<WireFrame, xc2_bus::BusError> {
            unimplemented!("DeviceSession only calls command()/sys_command() in these tests")
        }

        async fn broadcast(&mut self, _pkt: WireFrame, _timeout: Option<Duration>) -> Result<Vec<WireFrame>, xc2_bus::BusError> {
            unimplemented!()
        }

        async fn unicast(&mut self, _pkt: WireFrame, _req_response: bool, _timeout: Option<Duration>) -> Result<Option<WireFrame>, xc2_bus::BusError> {
            unimplemented!()
        }

        async fn command(
            &mut self,
            _my_addr: u16,
            _device_addr: u16,
            cmd: u8,
            data: &[u8],
            _req_response: bool,
            _timeout: Option<Duration>,
        ) -> Result<Vec<u8>, xc2_bus::BusError> {
            match cmd {
                c if c == XC2Commands::CMD_ECHO => Ok(vec![2]),
                c if c == XC2Commands::CMD_REGISTRY_GETINFO => {
                    let sub = data[0];
                    if sub == XC2RegGetInfoSubcommands::SIZE {
                        Ok(1u16.to_be_bytes().to_vec())
                    } else if sub == XC2RegGetInfoSubcommands::STRUCTURE {
                        let mut out = XC2RegFlags::WIDTH_16.bits().to_be_bytes().to_vec();
                        out.extend(0u16.to_be_bytes());
                        out.push(5);
                        out.extend(b"speed");
                        Ok(out)
                    } else {
                        Ok(vec![0, 0])
                    }
                }
                c if c == XC2Commands::CMD_REGISTRY_READ => {
                    // (start_reg_idx:u16, reg_count:u8) over the single "speed" register.
                    let count = data[2] as usize;
                    Ok(self.speed.lock().unwrap().to_le_bytes()[..count * 2].to_vec())
                }
                c if c == XC2Commands::CMD_REGISTRY_WRITE => {
                    // (reg_idx:u16, array_index:u16, data); "speed" is scalar so array_index is always 0.
                    let payload = &data[4..];
                    let mut buf = [0u8; 2];
                    buf[..payload.len()].copy_from_slice(payload);
                    *self.speed.lock().unwrap() = u16::from_le_bytes(buf);
                    Ok(vec![])
                }
                _ => Ok(vec![]),
            }
        }

        async fn sys_command(
            &mut self,
            _my_addr: u16,
            _device_addr: u16,
            subcommand: u8,
            _value: Option<&[u8]>,
            _req_response: bool,
            _timeout: Option<Duration>,
        ) -> Result<Vec<u8>, xc2_bus::BusError> {
            if subcommand == XC2SysSubcommands::SYS_RESET {
                *self.reset_called.lock().unwrap() = true;
            }
            Ok(vec![])
        }

        async fn read_event(&mut self, _short_timeout: Duration) -> Option<WireFrame> {
            None
        }

        fn status(&self) -> xc2_protocol::consts::BusStatus {
            xc2_protocol::consts::BusStatus::Available
        }

        fn bus_name(&self) -> String {
            "fake".into()
        }

        fn change_protocol(&mut self, _protocol: Protocol) {}
    }

    fn session() -> DeviceSession {
        let bus: Arc<Mutex<dyn BusPort>> = Arc::new(Mutex::new(FakeBus { speed: StdMutex::new(0), reset_called: StdMutex::new(false) }));
        DeviceSession::new(bus, Protocol::Xc2, 0x001, 0x123, "dev0", DeviceType::Generic)
    }

    #[tokio::test]
    async fn echo_refreshes_ttl_to_available() {
        let dev = session();
        assert_eq!(dev.get_echo().await.unwrap(), EchoStatus::Application);
        assert_eq!(dev.status().await, DeviceStatus::Available);
    }

    #[tokio::test]
    async fn discovers_and_round_trips_speed_register() {
        let dev = session();
        dev.initial_structure_reading(236).await.unwrap();
        dev.write_reg("speed", &RegValue::UInt(1200)).await.unwrap();
        assert_eq!(dev.read_reg("speed").await.unwrap(), RegValue::UInt(1200));
    }

    #[tokio::test]
    async fn reset_enters_sticky_resetting_state() {
        let dev = session();
        dev.reset().await.unwrap();
        assert_eq!(dev.status().await, DeviceStatus::Resetting);
    }

    #[tokio::test]
    async fn reading_a_register_before_discovery_is_an_error() {
        let dev = session();
        let err = dev.read_reg("speed").await.unwrap_err();
        assert!(matches!(err, DeviceError::StructureNotRead));
    }
}
