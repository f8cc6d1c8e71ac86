use thiserror::Error;

#[derive(Debug, Error)]
pub enum VirtualError {
    #[error("unknown virtual register: {0}")]
    UnknownRegister(String),
    #[error("parent {parent} has no register named {reg}")]
    UnknownParentRegister { parent: String, reg: String },
    #[error("mapping references unknown parent device: {0}")]
    MissingParent(String),
    #[error("parent device {0} has not completed register discovery")]
    ParentNotDiscovered(String),
    #[error("virtual register structure has not been built yet")]
    NotDiscovered,
    #[error("value shape does not match the register's array projection: {0}")]
    ShapeMismatch(String),
    #[error(transparent)]
    Device(#[from] xc2_device::DeviceError),
    #[error(transparent)]
    Register(#[from] xc2_registers::RegisterError),
}
