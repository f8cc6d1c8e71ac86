//! Transport-agnostic register-file engine — `spec.md` §4.3.
//!
//! Nothing in this crate talks to a [`xc2_bus::Bus`] directly: callers hand in a
//! [`RegCommand`] implementation (`xc2-device` plugs a real bus in, tests plug a fake), which
//! keeps discovery, splitting and typed decode/encode unit-testable without any I/O.

pub mod error;
pub mod info;
pub mod transport;
pub mod value;

mod discovery;
mod split;

pub use error::RegisterError;
pub use info::{RegKind, RegMod, RegisterInfo};
pub use split::{split_regs_range, ReadChunk};
pub use transport::RegCommand;
pub use value::RegValue;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use xc2_protocol::consts::{XC2Commands, XC2RegActionSubcommands};

/// Runtime-discovered register table for one device, plus the accessors built on top of it
/// (`spec.md` §4.3 "Register Engine").
#[derive(Debug, Default, Clone)]
pub struct RegisterFile {
    pub regs: Vec<RegisterInfo>,
    by_name: HashMap<String, usize>,
    /// Per-connection MTU budget for a single `RegistryRead`/`RegistryWrite` request, in
    /// register-data bytes.
    pub max_pkt_data_size: usize,
}

impl RegisterFile {
    pub fn new(regs: Vec<RegisterInfo>, max_pkt_data_size: usize) -> Self {
        let by_name = regs.iter().enumerate().map(|(i, r)| (r.name.clone(), i)).collect();
        Self { regs, by_name, max_pkt_data_size }
    }

    pub fn by_name(&self, name: &str) -> Option<&RegisterInfo> {
        self.by_name.get(name).map(|&i| &self.regs[i])
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Total byte span of the whole register file, i.e. `adr` of a one-past-the-end register.
    pub fn total_len(&self) -> usize {
        self.regs.last().map(|r| r.adr + r.byte_len()).unwrap_or(0)
    }

    /// Reads and decodes registers `[start_idx, stop_idx)` in declaration order
    /// (`spec.md` §4.3 `read_regs_range`). Splits into MTU-sized `Registry_Read` requests via
    /// [`split_regs_range`]; a register too wide for one request on its own is read back as a
    /// sequence of element-range requests and reassembled before decoding.
    pub async fn read_regs_range(&self, cmd: &dyn RegCommand, start_idx: usize, stop_idx: usize) -> Result<Vec<RegValue>, RegisterError> {
        if start_idx > stop_idx || stop_idx > self.regs.len() {
            return Err(RegisterError::MalformedStructure(format!("register range {start_idx}..{stop_idx} out of bounds")));
        }
        if start_idx == stop_idx {
            return Ok(Vec::new());
        }

        let plan = split_regs_range(&self.regs, start_idx as u16, stop_idx as u16, self.max_pkt_data_size);
        let mut reg_bytes: HashMap<u16, Vec<u8>> = HashMap::new();

        for chunk in plan {
            match chunk {
                ReadChunk::Range { start_idx: s, count } => {
                    let bytes = cmd.registry_read(s, count).await?;
                    let mut cursor = 0usize;
                    for i in s..s + count as u16 {
                        let reg = &self.regs[i as usize];
                        let len = reg.byte_len();
                        let slice = bytes
                            .get(cursor..cursor + len)
                            .ok_or_else(|| RegisterError::MalformedStructure(format!("register {i} reply truncated")))?;
                        reg_bytes.insert(i, slice.to_vec());
                        cursor += len;
                    }
                }
                ReadChunk::Elements { reg_idx, elem_start, elem_count } => {
                    let bytes = cmd.registry_read_elements(reg_idx, elem_start, elem_count).await?;
                    reg_bytes.entry(reg_idx).or_default().extend(bytes);
                }
            }
        }

        let mut values = Vec::with_capacity(stop_idx - start_idx);
        for i in start_idx..stop_idx {
            let bytes = reg_bytes.get(&(i as u16)).cloned().unwrap_or_default();
            values.push(self.regs[i].decode(&bytes));
        }
        Ok(values)
    }

    /// Reads and decodes one register to its native scalar/array/string representation
    /// (`spec.md` §4.3 "typed read").
    pub async fn read_reg(&self, cmd: &dyn RegCommand, name: &str) -> Result<RegValue, RegisterError> {
        let idx = self.index_of(name).ok_or_else(|| RegisterError::UnknownRegister(name.to_string()))?;
        let mut values = self.read_regs_range(cmd, idx, idx + 1).await?;
        Ok(values.pop().expect("read_regs_range(idx, idx+1) returns exactly one value"))
    }

    /// Writes a typed value, applying prefix-write semantics for arrays/strings shorter
    /// than the register's declared width (`spec.md` Design Notes #2).
    pub async fn write_reg(&self, cmd: &dyn RegCommand, name: &str, value: &RegValue) -> Result<(), RegisterError> {
        let info = self.by_name(name).ok_or_else(|| RegisterError::UnknownRegister(name.to_string()))?;
        if info.flags.read_only {
            return Err(RegisterError::ReadOnly(name.to_string()));
        }
        let encoded = info.encode(value)?;
        let unit_width = if info.reg_mod == RegMod::Char { 1 } else { info.element_width() };
        self.write_elements(cmd, info.idx, 0, &encoded, unit_width).await
    }

    /// Parses `value` per the register's `(mod, array)` category and delegates to
    /// [`Self::write_reg`] (`spec.md` §4.3 `write_reg_str`).
    pub async fn write_reg_str(&self, cmd: &dyn RegCommand, name: &str, value: &str) -> Result<(), RegisterError> {
        let info = self.by_name(name).ok_or_else(|| RegisterError::UnknownRegister(name.to_string()))?;
        let parsed = info.parse_str_value(value)?;
        self.write_reg(cmd, name, &parsed).await
    }

    /// Writes a single array element by index, leaving the rest of the register untouched
    /// (`spec.md` §4.3 "partial write starting at array_index" — distinct from the
    /// prefix-from-zero semantics of [`Self::write_reg`]).
    pub async fn write_reg_at_index(&self, cmd: &dyn RegCommand, name: &str, array_index: usize, value: &RegValue) -> Result<(), RegisterError> {
        let info = self.by_name(name).ok_or_else(|| RegisterError::UnknownRegister(name.to_string()))?;
        if info.flags.read_only {
            return Err(RegisterError::ReadOnly(name.to_string()));
        }
        if !info.is_array || array_index >= info.array_size {
            return Err(RegisterError::ValueTooLarge(name.to_string()));
        }
        let encoded = info.encode_element(value)?;
        let unit_width = info.element_width();
        self.write_elements(cmd, info.idx, array_index as u16, &encoded, unit_width).await
    }

    /// Writes already-encoded bytes for register `idx` starting at array element
    /// `array_index`, recursively halving the payload when it exceeds the packet budget
    /// (`spec.md` §4.3 "recursively split the list in halves, each half written in sequence
    /// at the correct offsets"). `unit_width` is the element size the split must stay aligned
    /// to (the register's element width, or `1` for a raw char-array blob).
    fn write_elements<'a>(
        &'a self,
        cmd: &'a dyn RegCommand,
        idx: u16,
        array_index: u16,
        data: &'a [u8],
        unit_width: usize,
    ) -> Pin<Box<dyn Future<Output = Result<(), RegisterError>> + 'a>> {
        Box::pin(async move {
            if data.is_empty() {
                return Ok(());
            }
            // (idx:u16, array_index:u16) header plus the payload itself.
            const HEADER_LEN: usize = 4;
            if HEADER_LEN + data.len() <= self.max_pkt_data_size {
                return cmd.registry_write(idx, array_index, data).await;
            }

            let unit_width = unit_width.max(1);
            let units = data.len() / unit_width;
            let half_units = (units / 2).max(1);
            let half_bytes = (half_units * unit_width).min(data.len());
            if half_bytes == 0 || half_bytes >= data.len() {
                // A single unit alone already exceeds the budget; send it whole rather than
                // loop forever trying to shrink it further.
                return cmd.registry_write(idx, array_index, data).await;
            }

            let (first, rest) = data.split_at(half_bytes);
            self.write_elements(cmd, idx, array_index, first, unit_width).await?;
            let rest_array_index = array_index + half_units as u16;
            self.write_elements(cmd, idx, rest_array_index, rest, unit_width).await
        })
    }

    pub async fn write_reg_default_value(&self, cmd: &dyn RegCommand, name: &str) -> Result<(), RegisterError> {
        let info = self.by_name(name).ok_or_else(|| RegisterError::UnknownRegister(name.to_string()))?;
        let default = info.default.clone();
        self.write_reg(cmd, name, &default).await
    }

    pub async fn write_all_regs_default(&self, cmd: &dyn RegCommand) -> Result<(), RegisterError> {
        for reg in &self.regs {
            if !reg.flags.read_only {
                self.write_reg(cmd, &reg.name, &reg.default.clone()).await?;
            }
        }
        Ok(())
    }

    /// `Registry_Action` subcommands operate on the whole table, not a single register.
    pub async fn backup(&self, cmd: &dyn RegCommand) -> Result<(), RegisterError> {
        cmd.registry_action(XC2RegActionSubcommands::BACKUP).await
    }

    pub async fn restore(&self, cmd: &dyn RegCommand) -> Result<(), RegisterError> {
        cmd.registry_action(XC2RegActionSubcommands::RESTORE).await
    }

    pub async fn store_to_eeprom(&self, cmd: &dyn RegCommand) -> Result<(), RegisterError> {
        cmd.registry_action(XC2RegActionSubcommands::STORE_TO_EEPROM).await
    }
}

/// Discovers and builds a [`RegisterFile`] against a live (or faked) device
/// (`spec.md` §4.3 "discovery", §4.4 `initial_structure_reading`).
pub async fn read_full_regs_structure(cmd: &dyn RegCommand, max_pkt_data_size: usize) -> Result<RegisterFile, RegisterError> {
    discovery::read_full_regs_structure(cmd, max_pkt_data_size).await
}

/// Re-exported so callers that only need the wire command constant don't have to depend on
/// `xc2-protocol` directly for it.
pub const CMD_REGISTRY_GETINFO: u8 = XC2Commands::CMD_REGISTRY_GETINFO;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use xc2_protocol::consts::{XC2RegActionSubcommands, XC2RegFlags, XC2RegGetInfoSubcommands};

    /// An in-memory register bank standing in for a real device, so discovery/split/typed
    /// access can be tested without a bus. `layout` mirrors the address table a real device
    /// computes so the fixture can translate register-index/array-index addressing into the
    /// byte-addressed backing store the same way `xc2-device::DeviceSession` would over the
    /// wire.
    struct FakeDevice {
        defs: Vec<(&'static str, u16, u16)>, // name, flags, array_size
        layout: Vec<RegisterInfo>,
        data: Mutex<Vec<u8>>,
        actions: Mutex<Vec<u8>>,
    }

    impl FakeDevice {
        fn new(defs: Vec<(&'static str, u16, u16)>, total_len: usize) -> Self {
            let mut adr = 0usize;
            let layout = defs
                .iter()
                .enumerate()
                .map(|(i, &(name, flags, array_size))| {
                    let info = RegisterInfo::from_wire(i as u16, name.to_string(), flags, array_size, adr).unwrap();
                    adr += info.byte_len();
                    info
                })
                .collect();
            Self { defs, layout, data: Mutex::new(vec![0u8; total_len]), actions: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait::async_trait]
    impl RegCommand for FakeDevice {
        async fn registry_read(&self, start_reg_idx: u16, count: u8) -> Result<Vec<u8>, RegisterError> {
            let start = self.layout[start_reg_idx as usize].adr;
            let end_idx = start_reg_idx as usize + count as usize;
            let end = self.layout.get(end_idx).map(|r| r.adr).unwrap_or_else(|| {
                let last = &self.layout[end_idx - 1];
                last.adr + last.byte_len()
            });
            let data = self.data.lock().unwrap();
            Ok(data[start..end].to_vec())
        }

        async fn registry_read_elements(&self, reg_idx: u16, elem_start: u16, elem_count: u8) -> Result<Vec<u8>, RegisterError> {
            let info = &self.layout[reg_idx as usize];
            let width = info.element_width();
            let start = info.adr + elem_start as usize * width;
            let len = elem_count as usize * width;
            let data = self.data.lock().unwrap();
            Ok(data[start..start + len].to_vec())
        }

        async fn registry_write(&self, reg_idx: u16, array_index: u16, payload: &[u8]) -> Result<(), RegisterError> {
            let info = &self.layout[reg_idx as usize];
            let width = if info.reg_mod == RegMod::Char { 1 } else { info.element_width() };
            let start = info.adr + array_index as usize * width;
            let mut data = self.data.lock().unwrap();
            data[start..start + payload.len()].copy_from_slice(payload);
            Ok(())
        }

        async fn registry_get_info(&self, subcommand: u8, payload: &[u8]) -> Result<Vec<u8>, RegisterError> {
            match subcommand {
                x if x == XC2RegGetInfoSubcommands::SIZE => Ok((self.defs.len() as u16).to_be_bytes().to_vec()),
                x if x == XC2RegGetInfoSubcommands::STRUCTURE => {
                    let idx = u16::from_be_bytes([payload[0], payload[1]]) as usize;
                    let (name, flags, array_size) = self.defs[idx];
                    let mut out = flags.to_be_bytes().to_vec();
                    out.extend(array_size.to_be_bytes());
                    out.push(name.len() as u8);
                    out.extend(name.as_bytes());
                    Ok(out)
                }
                x if x == XC2RegGetInfoSubcommands::DEFAULT_VALUE => {
                    let idx = u16::from_be_bytes([payload[0], payload[1]]) as usize;
                    let info = &self.layout[idx];
                    if payload.len() >= 4 {
                        // (idx, element_idx) tail-fetch: one element's worth of zero bytes.
                        Ok(vec![0u8; info.element_width()])
                    } else {
                        // defaults are all-zero in this fixture.
                        Ok(vec![0u8; info.byte_len()])
                    }
                }
                _ => Err(RegisterError::MalformedStructure("unsupported GetInfo subcommand in fixture".into())),
            }
        }

        async fn registry_action(&self, subcommand: u8) -> Result<(), RegisterError> {
            self.actions.lock().unwrap().push(subcommand);
            Ok(())
        }
    }

    /// A `FakeDevice` whose `DEFAULT_VALUE` reply for one chosen register is truncated to
    /// `short_len` bytes, so the tail-fetch path in `discovery.rs` gets exercised.
    struct ShortDefaultFakeDevice {
        inner: FakeDevice,
        short_idx: u16,
        short_len: usize,
    }

    #[async_trait::async_trait]
    impl RegCommand for ShortDefaultFakeDevice {
        async fn registry_read(&self, start_reg_idx: u16, count: u8) -> Result<Vec<u8>, RegisterError> {
            self.inner.registry_read(start_reg_idx, count).await
        }

        async fn registry_read_elements(&self, reg_idx: u16, elem_start: u16, elem_count: u8) -> Result<Vec<u8>, RegisterError> {
            self.inner.registry_read_elements(reg_idx, elem_start, elem_count).await
        }

        async fn registry_write(&self, reg_idx: u16, array_index: u16, payload: &[u8]) -> Result<(), RegisterError> {
            self.inner.registry_write(reg_idx, array_index, payload).await
        }

        async fn registry_get_info(&self, subcommand: u8, payload: &[u8]) -> Result<Vec<u8>, RegisterError> {
            if subcommand == XC2RegGetInfoSubcommands::DEFAULT_VALUE {
                let idx = u16::from_be_bytes([payload[0], payload[1]]) as usize;
                if idx as u16 == self.short_idx && payload.len() < 4 {
                    return Ok(vec![0u8; self.short_len]);
                }
            }
            self.inner.registry_get_info(subcommand, payload).await
        }

        async fn registry_action(&self, subcommand: u8) -> Result<(), RegisterError> {
            self.inner.registry_action(subcommand).await
        }
    }

    fn u16_reg() -> &'static str {
        "speed"
    }

    #[tokio::test]
    async fn discovers_and_round_trips_a_scalar_u16() {
        let flags = XC2RegFlags::WIDTH_16.bits();
        let dev = FakeDevice::new(vec![(u16_reg(), flags, 0)], 16);
        let file = read_full_regs_structure(&dev, 236).await.unwrap();

        assert_eq!(file.regs.len(), 1);
        let info = file.by_name("speed").unwrap();
        assert_eq!(info.adr, 0);
        assert_eq!(info.byte_len(), 2);

        file.write_reg(&dev, "speed", &RegValue::UInt(4200)).await.unwrap();
        let v = file.read_reg(&dev, "speed").await.unwrap();
        assert_eq!(v, RegValue::UInt(4200));
    }

    #[tokio::test]
    async fn rejects_writes_to_read_only_registers() {
        let flags = (XC2RegFlags::WIDTH_8 | XC2RegFlags::READ_ONLY).bits();
        let dev = FakeDevice::new(vec![("status", flags, 0)], 8);
        let file = read_full_regs_structure(&dev, 236).await.unwrap();
        let err = file.write_reg(&dev, "status", &RegValue::UInt(1)).await.unwrap_err();
        assert!(matches!(err, RegisterError::ReadOnly(_)));
    }

    #[tokio::test]
    async fn array_write_shorter_than_declared_size_leaves_tail_untouched() {
        let flags = (XC2RegFlags::WIDTH_8 | XC2RegFlags::ARRAY).bits();
        let dev = FakeDevice::new(vec![("buf", flags, 4)], 8);
        {
            let mut data = dev.data.lock().unwrap();
            data[0..4].copy_from_slice(&[9, 9, 9, 9]);
        }
        let file = read_full_regs_structure(&dev, 236).await.unwrap();

        file.write_reg(&dev, "buf", &RegValue::Array(vec![RegValue::UInt(1), RegValue::UInt(2)])).await.unwrap();
        let data = dev.data.lock().unwrap();
        assert_eq!(&data[0..4], &[1, 2, 9, 9]);
    }

    #[tokio::test]
    async fn write_reg_at_index_touches_only_that_element() {
        let flags = (XC2RegFlags::WIDTH_8 | XC2RegFlags::ARRAY).bits();
        let dev = FakeDevice::new(vec![("buf", flags, 4)], 8);
        {
            let mut data = dev.data.lock().unwrap();
            data[0..4].copy_from_slice(&[9, 9, 9, 9]);
        }
        let file = read_full_regs_structure(&dev, 236).await.unwrap();

        file.write_reg_at_index(&dev, "buf", 2, &RegValue::UInt(7)).await.unwrap();
        let data = dev.data.lock().unwrap();
        assert_eq!(&data[0..4], &[9, 9, 7, 9]);
    }

    #[tokio::test]
    async fn backup_and_restore_call_registry_action() {
        let dev = FakeDevice::new(vec![], 0);
        let file = read_full_regs_structure(&dev, 236).await.unwrap();
        file.backup(&dev).await.unwrap();
        file.restore(&dev).await.unwrap();
        assert_eq!(*dev.actions.lock().unwrap(), vec![XC2RegActionSubcommands::BACKUP, XC2RegActionSubcommands::RESTORE]);
    }

    #[tokio::test]
    async fn oversized_single_register_is_read_back_via_element_range_requests() {
        // One u8[6] array register with a 4-byte packet budget: forces the Elements split
        // path (scenario S4's element-level split).
        let flags = (XC2RegFlags::WIDTH_8 | XC2RegFlags::ARRAY).bits();
        let dev = FakeDevice::new(vec![("buf", flags, 6)], 6);
        {
            let mut data = dev.data.lock().unwrap();
            data.copy_from_slice(&[1, 2, 3, 4, 5, 6]);
        }
        let file = read_full_regs_structure(&dev, 4).await.unwrap();
        let v = file.read_reg(&dev, "buf").await.unwrap();
        assert_eq!(
            v,
            RegValue::Array(vec![
                RegValue::UInt(1),
                RegValue::UInt(2),
                RegValue::UInt(3),
                RegValue::UInt(4),
                RegValue::UInt(5),
                RegValue::UInt(6),
            ])
        );
    }

    #[tokio::test]
    async fn oversized_array_write_splits_recursively_and_lands_at_the_right_offsets() {
        // Four u16 elements (8 bytes) with a 6-byte packet budget: write_reg must recurse.
        let flags = (XC2RegFlags::WIDTH_16 | XC2RegFlags::ARRAY).bits();
        let dev = FakeDevice::new(vec![("buf", flags, 4)], 8);
        let file = read_full_regs_structure(&dev, 6).await.unwrap();

        file.write_reg(
            &dev,
            "buf",
            &RegValue::Array(vec![RegValue::UInt(10), RegValue::UInt(20), RegValue::UInt(30), RegValue::UInt(40)]),
        )
        .await
        .unwrap();

        let v = file.read_reg(&dev, "buf").await.unwrap();
        assert_eq!(
            v,
            RegValue::Array(vec![RegValue::UInt(10), RegValue::UInt(20), RegValue::UInt(30), RegValue::UInt(40)])
        );
    }

    #[tokio::test]
    async fn default_value_short_reply_is_completed_with_per_element_tail_fetches() {
        let flags = (XC2RegFlags::WIDTH_16 | XC2RegFlags::ARRAY).bits();
        let inner = FakeDevice::new(vec![("buf", flags, 4)], 8);
        // Only the first element's worth of default bytes comes back from the initial call.
        let dev = ShortDefaultFakeDevice { inner, short_idx: 0, short_len: 2 };
        let file = read_full_regs_structure(&dev, 236).await.unwrap();
        let info = file.by_name("buf").unwrap();
        assert_eq!(info.default, RegValue::Array(vec![RegValue::UInt(0); 4]));
    }

    #[tokio::test]
    async fn write_reg_str_parses_per_register_category() {
        let dev = FakeDevice::new(
            vec![
                ("unsigned", XC2RegFlags::WIDTH_16.bits(), 0),
                ("signed", (XC2RegFlags::WIDTH_16 | XC2RegFlags::MOD_SIGNED).bits(), 0),
                ("scale", (XC2RegFlags::WIDTH_32 | XC2RegFlags::MOD_FLOAT_ENUM).bits(), 0),
                ("name", (XC2RegFlags::WIDTH_8 | XC2RegFlags::MOD_CHAR | XC2RegFlags::ARRAY).bits(), 8),
                ("list", (XC2RegFlags::WIDTH_8 | XC2RegFlags::ARRAY).bits(), 3),
            ],
            64,
        );
        let file = read_full_regs_structure(&dev, 236).await.unwrap();

        file.write_reg_str(&dev, "unsigned", "0x10").await.unwrap();
        assert_eq!(file.read_reg(&dev, "unsigned").await.unwrap(), RegValue::UInt(16));

        file.write_reg_str(&dev, "signed", "-5").await.unwrap();
        assert_eq!(file.read_reg(&dev, "signed").await.unwrap(), RegValue::Int(-5));

        file.write_reg_str(&dev, "scale", "3.5").await.unwrap();
        assert_eq!(file.read_reg(&dev, "scale").await.unwrap(), RegValue::Float(3.5));

        file.write_reg_str(&dev, "name", "abc").await.unwrap();
        assert_eq!(file.read_reg(&dev, "name").await.unwrap(), RegValue::Str("abc".to_string()));

        file.write_reg_str(&dev, "list", "[1,2,3]").await.unwrap();
        assert_eq!(
            file.read_reg(&dev, "list").await.unwrap(),
            RegValue::Array(vec![RegValue::UInt(1), RegValue::UInt(2), RegValue::UInt(3)])
        );
    }

    #[tokio::test]
    async fn write_reg_str_rejects_unparseable_input() {
        let dev = FakeDevice::new(vec![("unsigned", XC2RegFlags::WIDTH_16.bits(), 0)], 8);
        let file = read_full_regs_structure(&dev, 236).await.unwrap();
        let err = file.write_reg_str(&dev, "unsigned", "not-a-number").await.unwrap_err();
        assert!(matches!(err, RegisterError::InvalidValueString(_)));
    }
}
