//! Virtual composite device — `spec.md` §4.5.
//!
//! A [`VirtualDevice`] owns no bus of its own: it projects registers (and, optionally, an
//! entire register file) out of one or more live [`DeviceSession`] parents into a single flat
//! register file, and fans lifecycle operations out to every distinct parent. The ownership
//! arrow only ever points from virtual to parent — parents never reference the virtual device
//! that aggregates them (`spec.md` §9 "cyclic graph risk").

pub mod error;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use xc2_device::{DeviceError, DeviceSession, EchoStatus};
use xc2_protocol::consts::DeviceStatus;
use xc2_registers::{RegValue, RegisterFile, RegisterInfo};

pub use error::VirtualError;

/// How a virtual register's value is carved out of its parent's register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// A single array element, e.g. `mes_temp[8]`.
    Index(usize),
    /// An inclusive window `a..=b`. Per `spec.md` §4.5, the projected register's
    /// `array_size` is `b + 1` (not `b - a + 1`) while its default value is the `a..=b`
    /// slice — a literal quirk of the source, kept as specified rather than "fixed".
    Range(usize, usize),
}

/// One entry of the `virtual_reg_name -> {parent_name, reg_name, projection}` table that
/// defines a virtual device (`spec.md` §4.5).
#[derive(Debug, Clone)]
pub struct VirtualRegMapping {
    pub virtual_name: String,
    pub parent_name: String,
    pub reg_name: String,
    pub projection: Projection,
}

/// Resolves a merged register-file entry back to the underlying parent access it forwards to.
#[derive(Debug, Clone)]
enum Resolution {
    /// Entry came from `copy_parent`'s whole register file; forward under the same name.
    CopyParent,
    Mapped { parent_name: String, reg_name: String, projection: Projection },
}

pub struct VirtualDevice {
    pub name: String,
    parents: HashMap<String, Arc<DeviceSession>>,
    copy_parent: Option<String>,
    mappings: Vec<VirtualRegMapping>,
    regs: RwLock<Option<RegisterFile>>,
    resolve: RwLock<HashMap<String, Resolution>>,
}

impl VirtualDevice {
    /// Validates that every mapping (and `copy_parent`, if set) names a device present in
    /// `parents` (`spec.md` §4.5 `check_device_list`).
    pub fn new(
        name: impl Into<String>,
        parents: HashMap<String, Arc<DeviceSession>>,
        copy_parent: Option<String>,
        mappings: Vec<VirtualRegMapping>,
    ) -> Result<Self, VirtualError> {
        if let Some(cp) = &copy_parent {
            if !parents.contains_key(cp) {
                return Err(VirtualError::MissingParent(cp.clone()));
            }
        }
        for mapping in &mappings {
            if !parents.contains_key(&mapping.parent_name) {
                return Err(VirtualError::MissingParent(mapping.parent_name.clone()));
            }
        }
        Ok(Self { name: name.into(), parents, copy_parent, mappings, regs: RwLock::new(None), resolve: RwLock::new(HashMap::new()) })
    }

    fn distinct_parents(&self) -> impl Iterator<Item = &Arc<DeviceSession>> {
        self.parents.values()
    }

    /// Builds the merged register file out of the parents' already-discovered structures
    /// (`spec.md` §4.5 "derived metadata"). Every referenced parent must have completed its
    /// own discovery first; this device does not trigger it on their behalf.
    pub async fn discover(&self, max_pkt_data_size: usize) -> Result<(), VirtualError> {
        let mut merged: Vec<RegisterInfo> = Vec::new();
        let mut resolve = HashMap::new();

        if let Some(cp) = &self.copy_parent {
            let parent = &self.parents[cp];
            let parent_regs = parent.regs().await.ok_or_else(|| VirtualError::ParentNotDiscovered(cp.clone()))?;
            for info in &parent_regs.regs {
                merged.push(info.clone());
                resolve.insert(info.name.clone(), Resolution::CopyParent);
            }
        }

        for mapping in &self.mappings {
            let parent = self.parents.get(&mapping.parent_name).ok_or_else(|| VirtualError::MissingParent(mapping.parent_name.clone()))?;
            let parent_regs = parent.regs().await.ok_or_else(|| VirtualError::ParentNotDiscovered(mapping.parent_name.clone()))?;
            let base = parent_regs.by_name(&mapping.reg_name).ok_or_else(|| VirtualError::UnknownParentRegister {
                parent: mapping.parent_name.clone(),
                reg: mapping.reg_name.clone(),
            })?;

            let mut info = base.clone();
            info.name = mapping.virtual_name.clone();
            match mapping.projection {
                Projection::Index(idx) => {
                    info.array_size = 1;
                    info.is_array = false;
                    info.default = match &base.default {
                        RegValue::Array(items) => items.get(idx).cloned().unwrap_or(RegValue::UInt(0)),
                        other => other.clone(),
                    };
                }
                Projection::Range(a, b) => {
                    info.array_size = b + 1;
                    info.is_array = false;
                    info.default = match &base.default {
                        RegValue::Array(items) => RegValue::Array(items.get(a..=b).map(|s| s.to_vec()).unwrap_or_default()),
                        other => other.clone(),
                    };
                }
            }
            merged.push(info);
            resolve.insert(
                mapping.virtual_name.clone(),
                Resolution::Mapped { parent_name: mapping.parent_name.clone(), reg_name: mapping.reg_name.clone(), projection: mapping.projection },
            );
        }

        let mut adr = 0usize;
        for (i, info) in merged.iter_mut().enumerate() {
            info.idx = i as u16;
            info.adr = adr;
            adr += info.byte_len();
        }

        *self.regs.write().await = Some(RegisterFile::new(merged, max_pkt_data_size));
        *self.resolve.write().await = resolve;
        Ok(())
    }

    pub async fn regs(&self) -> Option<RegisterFile> {
        self.regs.read().await.clone()
    }

    fn project(value: RegValue, projection: Projection) -> RegValue {
        match (projection, value) {
            (Projection::Index(idx), RegValue::Array(items)) => items.into_iter().nth(idx).unwrap_or(RegValue::UInt(0)),
            (Projection::Range(a, b), RegValue::Array(items)) => RegValue::Array(items.into_iter().skip(a).take(b + 1 - a).collect()),
            (_, other) => other,
        }
    }

    /// Reads one virtual register, delegating to the owning parent
    /// (`spec.md` §4.5 "Read / write delegate to the appropriate parent").
    pub async fn read_reg(&self, name: &str) -> Result<RegValue, VirtualError> {
        let resolve = self.resolve.read().await;
        let resolution = resolve.get(name).ok_or_else(|| VirtualError::UnknownRegister(name.to_string()))?;
        match resolution {
            Resolution::CopyParent => {
                let cp = self.copy_parent.as_ref().expect("CopyParent resolution implies copy_parent is set");
                Ok(self.parents[cp].read_reg(name).await?)
            }
            Resolution::Mapped { parent_name, reg_name, projection } => {
                let full = self.parents[parent_name].read_reg(reg_name).await?;
                Ok(Self::project(full, *projection))
            }
        }
    }

    /// Reads every virtual register, issuing exactly one parent read per distinct
    /// `(parent, reg_name)` pair even when several virtual registers project out of the same
    /// parent array (`spec.md` §8 S5).
    pub async fn read_and_get_full_regs(&self) -> Result<HashMap<String, RegValue>, VirtualError> {
        let resolve = self.resolve.read().await;
        let mut cache: HashMap<(String, String), RegValue> = HashMap::new();
        let mut out = HashMap::new();

        for (vname, resolution) in resolve.iter() {
            match resolution {
                Resolution::CopyParent => {
                    let cp = self.copy_parent.as_ref().expect("CopyParent resolution implies copy_parent is set");
                    let v = self.parents[cp].read_reg(vname).await?;
                    out.insert(vname.clone(), v);
                }
                Resolution::Mapped { parent_name, reg_name, projection } => {
                    let key = (parent_name.clone(), reg_name.clone());
                    if !cache.contains_key(&key) {
                        let full = self.parents[parent_name].read_reg(reg_name).await?;
                        cache.insert(key.clone(), full);
                    }
                    let full = cache.get(&key).unwrap().clone();
                    out.insert(vname.clone(), Self::project(full, *projection));
                }
            }
        }
        Ok(out)
    }

    /// Writes one virtual register, forwarding as a partial write at the mapped index/window
    /// on the owning parent (`spec.md` §4.5, §8 S5: writing `t_shunt_ohm` forwards as a write
    /// of array index 8 on the parent).
    pub async fn write_reg(&self, name: &str, value: &RegValue) -> Result<(), VirtualError> {
        let resolve = self.resolve.read().await;
        let resolution = resolve.get(name).ok_or_else(|| VirtualError::UnknownRegister(name.to_string()))?;
        match resolution {
            Resolution::CopyParent => {
                let cp = self.copy_parent.as_ref().expect("CopyParent resolution implies copy_parent is set");
                Ok(self.parents[cp].write_reg(name, value).await?)
            }
            Resolution::Mapped { parent_name, reg_name, projection } => {
                let parent = &self.parents[parent_name];
                match projection {
                    Projection::Index(idx) => Ok(parent.write_reg_at_index(reg_name, *idx, value).await?),
                    Projection::Range(a, b) => {
                        let items = match value {
                            RegValue::Array(items) => items,
                            _ => return Err(VirtualError::ShapeMismatch(name.to_string())),
                        };
                        if items.len() > b + 1 - a {
                            return Err(VirtualError::ShapeMismatch(name.to_string()));
                        }
                        for (offset, item) in items.iter().enumerate() {
                            parent.write_reg_at_index(reg_name, a + offset, item).await?;
                        }
                        Ok(())
                    }
                }
            }
        }
    }

    /// `reset()` fanned out to every distinct parent (`spec.md` §4.5 "Lifecycle ... fans out
    /// to every distinct parent and clears own metadata").
    pub async fn reset(&self) -> Result<(), DeviceError> {
        for parent in self.distinct_parents() {
            parent.reset().await?;
        }
        *self.regs.write().await = None;
        *self.resolve.write().await = HashMap::new();
        Ok(())
    }

    pub async fn reset_and_stay_in_bootloader(&self) -> Result<(), DeviceError> {
        for parent in self.distinct_parents() {
            parent.reset_and_stay_in_bootloader().await?;
        }
        *self.regs.write().await = None;
        *self.resolve.write().await = HashMap::new();
        Ok(())
    }

    pub async fn run_app(&self) -> Result<(), DeviceError> {
        for parent in self.distinct_parents() {
            parent.run_app().await?;
        }
        Ok(())
    }

    /// Conjunction over parents (`spec.md` §4.5 `is_running`).
    pub async fn is_running(&self) -> bool {
        for parent in self.distinct_parents() {
            if !parent.is_running().await {
                return false;
            }
        }
        true
    }

    /// Conjunction over parents' liveness, approximated as "not disconnected"
    /// (`spec.md` §4.5 `is_echoing`).
    pub async fn is_echoing(&self) -> bool {
        for parent in self.distinct_parents() {
            if parent.status().await == DeviceStatus::Disconnected {
                return false;
            }
        }
        true
    }

    /// `spec.md` §4.5: "`get_echo` returns 0 if parents disagree (mix of 1 and 2), else the
    /// common value." Modeled as `None` on disagreement (or no parents at all) rather than
    /// inventing a third [`EchoStatus`] variant for "0".
    pub async fn get_echo(&self) -> Result<Option<EchoStatus>, DeviceError> {
        let mut agreed: Option<EchoStatus> = None;
        for parent in self.distinct_parents() {
            let echo = parent.get_echo().await?;
            match agreed {
                None => agreed = Some(echo),
                Some(prev) if prev == echo => {}
                Some(_) => return Ok(None),
            }
        }
        Ok(agreed)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use tokio::sync::Mutex;
    use xc2_bus::selector::WireFrame;
    use xc2_bus::{BusPort, Protocol};
    use xc2_protocol::consts::{DeviceType, XC2Commands, XC2RegFlags, XC2RegGetInfoSubcommands};

    /// A parent with one array register `mes_temp[10]`, counting `CMD_REGISTRY_READ` calls
    /// (via `Arc`-shared counters so the test can inspect them after the fake has been moved
    /// into the `DeviceSession`'s bus slot) so tests can assert on how many times the wire was
    /// actually hit.
    struct FakeParentBus {
        data: Arc<StdMutex<[u8; 20]>>,
        reads: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl BusPort for FakeParentBus {
        async fn connect(&mut self) -> Result<(), xc2_bus::BusError> {
            Ok(())
        }

        async fn request_response(&mut self, _req: WireFrame, _timeout: Option<Duration>) -> Result<WireFrame, xc2_bus::BusError> {
            unimplemented!()
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
                c if c == XC2Commands::CMD_REGISTRY_GETINFO => {
                    let sub = data[0];
                    if sub == XC2RegGetInfoSubcommands::SIZE {
                        Ok(1u16.to_be_bytes().to_vec())
                    } else if sub == XC2RegGetInfoSubcommands::STRUCTURE {
                        let mut out = (XC2RegFlags::WIDTH_16 | XC2RegFlags::ARRAY).bits().to_be_bytes().to_vec();
                        out.extend(10u16.to_be_bytes());
                        out.push(8);
                        out.extend(b"mes_temp");
                        Ok(out)
                    } else {
                        Ok(vec![0, 0])
                    }
                }
                c if c == XC2Commands::CMD_REGISTRY_READ => {
                    self.reads.fetch_add(1, Ordering::SeqCst);
                    // (start_reg_idx:u16, reg_count:u8); this fixture has exactly one
                    // register ("mes_temp", a 20-byte u16[10] array) so the whole table is
                    // always the single whole-register range [0, 1).
                    let start_reg_idx = u16::from_be_bytes([data[0], data[1]]);
                    let count = data[2];
                    debug_assert_eq!((start_reg_idx, count), (0, 1));
                    Ok(self.data.lock().unwrap().to_vec())
                }
                c if c == XC2Commands::CMD_REGISTRY_WRITE => {
                    // (reg_idx:u16, array_index:u16, data); mes_temp elements are u16.
                    let array_index = u16::from_be_bytes([data[2], data[3]]) as usize;
                    let payload = &data[4..];
                    let adr = array_index * 2;
                    self.data.lock().unwrap()[adr..adr + payload.len()].copy_from_slice(payload);
                    Ok(vec![])
                }
                _ => Ok(vec![]),
            }
        }

        async fn sys_command(
            &mut self,
            _my_addr: u16,
            _device_addr: u16,
            _subcommand: u8,
            _value: Option<&[u8]>,
            _req_response: bool,
            _timeout: Option<Duration>,
        ) -> Result<Vec<u8>, xc2_bus::BusError> {
            Ok(vec![])
        }

        async fn read_event(&mut self, _short_timeout: Duration) -> Option<WireFrame> {
            None
        }

        fn status(&self) -> xc2_protocol::consts::BusStatus {
            xc2_protocol::consts::BusStatus::Available
        }

        fn bus_name(&self) -> String {
            "fake-parent".into()
        }

        fn change_protocol(&mut self, _protocol: Protocol) {}
    }

    async fn parent_with_temps(values: [u16; 10]) -> (Arc<DeviceSession>, Arc<StdMutex<[u8; 20]>>, Arc<AtomicUsize>) {
        let data = Arc::new(StdMutex::new([0u8; 20]));
        for (i, v) in values.iter().enumerate() {
            data.lock().unwrap()[i * 2..i * 2 + 2].copy_from_slice(&v.to_le_bytes());
        }
        let reads = Arc::new(AtomicUsize::new(0));
        let fake = FakeParentBus { data: data.clone(), reads: reads.clone() };
        let bus: Arc<Mutex<dyn BusPort>> = Arc::new(Mutex::new(fake));
        let dev = DeviceSession::new(bus, Protocol::Xc2, 0x001, 0x110, "HVL1", DeviceType::Generic);
        dev.initial_structure_reading(236).await.unwrap();
        (Arc::new(dev), data, reads)
    }

    #[tokio::test]
    async fn virtual_read_projects_two_elements_from_one_parent_read() {
        let mut temps = [0u16; 10];
        temps[8] = 30;
        temps[9] = 31;
        let (parent, _data, reads) = parent_with_temps(temps).await;

        let mut parents = HashMap::new();
        parents.insert("HVL1".to_string(), parent);

        let mappings = vec![
            VirtualRegMapping { virtual_name: "t_shunt_ohm".into(), parent_name: "HVL1".into(), reg_name: "mes_temp".into(), projection: Projection::Index(8) },
            VirtualRegMapping {
                virtual_name: "t_shunt_water_out".into(),
                parent_name: "HVL1".into(),
                reg_name: "mes_temp".into(),
                projection: Projection::Index(9),
            },
        ];
        let virt = VirtualDevice::new("virt0", parents, None, mappings).unwrap();
        virt.discover(236).await.unwrap();

        let all = virt.read_and_get_full_regs().await.unwrap();
        assert_eq!(all.get("t_shunt_ohm"), Some(&RegValue::UInt(30)));
        assert_eq!(all.get("t_shunt_water_out"), Some(&RegValue::UInt(31)));
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn virtual_write_forwards_to_parent_array_index() {
        let (parent, data, _reads) = parent_with_temps([0; 10]).await;
        let mut parents = HashMap::new();
        parents.insert("HVL1".to_string(), parent);

        let mappings = vec![VirtualRegMapping {
            virtual_name: "t_shunt_ohm".into(),
            parent_name: "HVL1".into(),
            reg_name: "mes_temp".into(),
            projection: Projection::Index(8),
        }];
        let virt = VirtualDevice::new("virt0", parents, None, mappings).unwrap();
        virt.discover(236).await.unwrap();

        virt.write_reg("t_shunt_ohm", &RegValue::UInt(42)).await.unwrap();
        let d = data.lock().unwrap();
        assert_eq!(u16::from_le_bytes([d[16], d[17]]), 42);
    }

    #[tokio::test]
    async fn unknown_parent_in_mapping_is_rejected_at_construction() {
        let mappings = vec![VirtualRegMapping {
            virtual_name: "x".into(),
            parent_name: "ghost".into(),
            reg_name: "y".into(),
            projection: Projection::Index(0),
        }];
        let err = VirtualDevice::new("virt0", HashMap::new(), None, mappings).unwrap_err();
        assert!(matches!(err, VirtualError::MissingParent(_)));
    }
}
