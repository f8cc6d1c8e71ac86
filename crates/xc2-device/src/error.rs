use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device did not respond")]
    DeviceNotResponding,
    #[error("register file has not been discovered yet")]
    StructureNotRead,
    #[error(transparent)]
    Bus(#[from] xc2_bus::BusError),
    #[error(transparent)]
    Register(#[from] xc2_registers::RegisterError),
}
