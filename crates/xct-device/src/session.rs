//! JSON-discovered register contract over the XCT line protocol — `spec.md` §4.7.
//!
//! Unlike [`xc2_device::DeviceSession`], the register layout isn't queried field-by-field;
//! a single `REST GET` returns the whole current state as JSON and the shape of each value
//! (scalar vs array) stands in for the binary protocol's flags/width.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use xct_protocol::{retype_value, XCTCommands, XCTPacketType, XctPort, XCTPacket, XctValue};

use crate::error::XctDeviceError;

/// One entry of the JSON-discovered register file: just enough shape to validate reads
/// and writes against (`spec.md` §4.7 "types are inferred... array if value is a list,
/// width assumed u32").
#[derive(Debug, Clone)]
pub struct XctRegisterInfo {
    pub name: String,
    pub is_array: bool,
    pub array_size: usize,
}

/// The JSON-discovered register file for one XCT device.
#[derive(Debug, Clone, Default)]
pub struct XctRegisterFile {
    regs: Vec<XctRegisterInfo>,
    by_name: HashMap<String, usize>,
}

impl XctRegisterFile {
    fn from_json(doc: &JsonValue) -> Result<Self, XctDeviceError> {
        let reg = doc.get("reg").and_then(JsonValue::as_object).ok_or(XctDeviceError::MalformedStructure)?;
        let mut regs = Vec::with_capacity(reg.len());
        let mut by_name = HashMap::with_capacity(reg.len());
        for (name, value) in reg.iter() {
            let is_array = value.is_array();
            let array_size = if is_array { value.as_array().map(Vec::len).unwrap_or(0) } else { 1 };
            by_name.insert(name.clone(), regs.len());
            regs.push(XctRegisterInfo { name: name.clone(), is_array, array_size });
        }
        Ok(Self { regs, by_name })
    }

    pub fn by_name(&self, name: &str) -> Option<&XctRegisterInfo> {
        self.by_name.get(name).map(|&i| &self.regs[i])
    }

    pub fn len(&self) -> usize {
        self.regs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regs.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.regs.iter().map(|r| r.name.as_str())
    }
}

/// A device reached over the XCT line protocol, keyed by its alt-name (e.g. `PTC`) rather
/// than an XC2 address (`spec.md` §4.7).
pub struct XctDeviceSession {
    bus: Arc<Mutex<dyn XctPort>>,
    alt_name: String,
    regs: RwLock<Option<XctRegisterFile>>,
}

impl XctDeviceSession {
    pub fn new(bus: Arc<Mutex<dyn XctPort>>, alt_name: impl Into<String>) -> Self {
        Self { bus, alt_name: alt_name.into(), regs: RwLock::new(None) }
    }

    pub fn alt_name(&self) -> &str {
        &self.alt_name
    }

    async fn device_request(&self, cmd: XCTCommands, data: impl Into<String>) -> Result<XCTPacket, XctDeviceError> {
        let pkt = XCTPacket::new(XCTPacketType::Device, self.alt_name.clone(), cmd, data);
        let mut bus = self.bus.lock().await;
        Ok(bus.request_response(pkt, None).await?)
    }

    /// `REST GET devices/ptc/hw/<name>` (`PTC` is special-cased to `kg` in the original
    /// device catalog, kept here since it's a device-catalog quirk, not a protocol rule).
    pub async fn initial_structure_reading(&self) -> Result<(), XctDeviceError> {
        let catalog_name = if self.alt_name == "PTC" { "kg" } else { &self.alt_name };
        let ret = self.device_request(XCTCommands::Rest, format!("GET devices/ptc/hw/{catalog_name}")).await?;
        if ret.cmd != XCTCommands::Ok {
            return Err(XctDeviceError::Remote(ret.data));
        }
        let doc: JsonValue = serde_json::from_str(&ret.data)?;
        let file = XctRegisterFile::from_json(&doc)?;
        debug!(device = %self.alt_name, registers = file.len(), "xct structure discovered");
        *self.regs.write().await = Some(file);
        Ok(())
    }

    pub async fn regs(&self) -> Option<XctRegisterFile> {
        self.regs.read().await.clone()
    }

    fn known(&self, file: &XctRegisterFile, name: &str) -> Result<(), XctDeviceError> {
        if file.by_name(name).is_none() {
            return Err(XctDeviceError::UnknownRegister(name.to_string()));
        }
        Ok(())
    }

    /// `GET <name>`, run through the value-typer (`spec.md` §4.7).
    pub async fn read_reg(&self, name: &str) -> Result<XctValue, XctDeviceError> {
        let regs = self.regs.read().await;
        let file = regs.as_ref().ok_or(XctDeviceError::StructureNotRead)?;
        self.known(file, name)?;
        let ret = self.device_request(XCTCommands::Get, name).await?;
        if ret.cmd != XCTCommands::Ok {
            return Err(XctDeviceError::Remote(ret.data));
        }
        Ok(retype_value(&ret.data))
    }

    /// `SET <name> <value>`.
    pub async fn write_reg(&self, name: &str, value: &str) -> Result<(), XctDeviceError> {
        let regs = self.regs.read().await;
        let file = regs.as_ref().ok_or(XctDeviceError::StructureNotRead)?;
        self.known(file, name)?;
        let ret = self.device_request(XCTCommands::Set, format!("{name} {value}")).await?;
        if ret.cmd != XCTCommands::Ok {
            return Err(XctDeviceError::Remote(ret.data));
        }
        Ok(())
    }

    /// `SET <name>[i] <value>`.
    pub async fn write_reg_at_index(&self, name: &str, array_index: usize, value: &str) -> Result<(), XctDeviceError> {
        let regs = self.regs.read().await;
        let file = regs.as_ref().ok_or(XctDeviceError::StructureNotRead)?;
        self.known(file, name)?;
        let ret = self.device_request(XCTCommands::Set, format!("{name}[{array_index}] {value}")).await?;
        if ret.cmd != XCTCommands::Ok {
            return Err(XctDeviceError::Remote(ret.data));
        }
        Ok(())
    }

    /// `GET FWStatus`: ≥20 → application, ≥10 → bootloader, else unknown/stopped
    /// (`spec.md` §4.7). Any non-integer or error reply is treated the same as "0".
    pub async fn get_echo(&self) -> Result<XctEchoStatus, XctDeviceError> {
        let ret = self.device_request(XCTCommands::Get, "FWStatus").await;
        let ret = match ret {
            Ok(ret) if ret.cmd == XCTCommands::Ok => ret,
            _ => return Ok(XctEchoStatus::Unknown),
        };
        let raw = if ret.data == "True" { "20".to_string() } else { ret.data };
        let status = match raw.parse::<i64>() {
            Ok(n) if n >= 20 => XctEchoStatus::Application,
            Ok(n) if n >= 10 => XctEchoStatus::Bootloader,
            _ => XctEchoStatus::Unknown,
        };
        Ok(status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XctEchoStatus {
    Unknown,
    Bootloader,
    Application,
}
