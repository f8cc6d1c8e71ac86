use crate::error::RegisterError;

/// What the register engine needs from a live connection, abstracted away from `xc2-bus` so
/// discovery/splitting/typed-decode logic is unit-testable without any I/O (`SPEC_FULL.md`
/// §0 "testing").
///
/// The register file is index-addressed on the wire, never byte-addressed: `CMD_Registry_Read`
/// and `CMD_Registry_Write` both take a register index (plus, for writes, an array-element
/// index), exactly as `xc2_device.py`'s `read_regs_range`/`read_reg_range`/`write_reg` pack
/// them (`struct.pack("!HB", start, sts_range)` / `struct.pack("!HHB", index, start_arr,
/// sts_range)` / `struct.pack("!HH...", index, array_index, ...)`). `xc2-device` is the real
/// implementation, translating these calls into packets over a [`xc2_bus::Bus`].
#[async_trait::async_trait]
pub trait RegCommand: Send + Sync {
    /// `Registry_Read(start_reg_idx, reg_count)` — reads the concatenated raw bytes of
    /// `reg_count` whole registers starting at register index `start_reg_idx`, in register
    /// declaration order. `reg_count` must not exceed the connection's MTU budget; callers
    /// split ranges that don't fit.
    async fn registry_read(&self, start_reg_idx: u16, reg_count: u8) -> Result<Vec<u8>, RegisterError>;

    /// `Registry_Read(reg_idx, elem_start, elem_count)` — reads a sub-range of array elements
    /// out of a single register whose full serialized form exceeds the MTU budget
    /// (`spec.md` §4.3 "a register whose serialized form exceeds the packet budget is further
    /// split into element ranges").
    async fn registry_read_elements(&self, reg_idx: u16, elem_start: u16, elem_count: u8) -> Result<Vec<u8>, RegisterError>;

    /// `Registry_Write(reg_idx, array_index, data)` — writes already-packed element bytes
    /// into register `reg_idx` starting at array element `array_index` (`0` for scalars and
    /// full-array writes).
    async fn registry_write(&self, reg_idx: u16, array_index: u16, data: &[u8]) -> Result<(), RegisterError>;

    /// `RegistryInfo_GetInfo(subcommand, payload)`, used for `SIZE`/`STRUCTURE`/
    /// `DEFAULT_VALUE` queries during discovery.
    async fn registry_get_info(&self, subcommand: u8, payload: &[u8]) -> Result<Vec<u8>, RegisterError>;

    /// `RegistryInfo_Action(subcommand)` — table-wide operations (backup/restore/store).
    async fn registry_action(&self, subcommand: u8) -> Result<(), RegisterError>;
}
