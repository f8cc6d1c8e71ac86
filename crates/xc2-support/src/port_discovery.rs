//! Serial port candidate discovery — `spec.md` §6 "Port discovery", original `utils.py`'s
//! `discover_serial_ports`/`get_serial_from_port`.
//!
//! Kept behind a trait so a bus manager can be tested against a fixed port list instead of
//! whatever happens to be plugged into the host running the test.

/// One serial port candidate, as reported by the OS port registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub device: String,
    pub manufacturer: Option<String>,
    pub serial_number: Option<String>,
}

/// Vendor `SERIAL` prefixes recognized as probable XC2 hardware (`spec.md` §6).
pub const KNOWN_VENDOR_PREFIXES: &[&str] = &["PW", "XU", "KP", "CB", "MM", "TV", "PP", "SR", "A5"];

const ST_MANUFACTURER: &str = "STMicroelectronics";

pub trait PortDiscovery: Send + Sync {
    /// All ports present on the host, unfiltered.
    fn all_ports(&self) -> Vec<PortInfo>;

    /// Ports that look like XC2 hardware: manufacturer is the chip vendor, or the serial
    /// number starts with one of [`KNOWN_VENDOR_PREFIXES`].
    fn candidate_ports(&self) -> Vec<PortInfo> {
        self.all_ports().into_iter().filter(|p| is_candidate(p)).collect()
    }
}

fn is_candidate(port: &PortInfo) -> bool {
    if port.manufacturer.as_deref() == Some(ST_MANUFACTURER) {
        return true;
    }
    match &port.serial_number {
        Some(serial) => KNOWN_VENDOR_PREFIXES.iter().any(|prefix| serial.starts_with(prefix)),
        None => false,
    }
}

/// Real discovery backed by [`serialport::available_ports`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPortDiscovery;

impl PortDiscovery for SystemPortDiscovery {
    fn all_ports(&self) -> Vec<PortInfo> {
        let ports = serialport::available_ports().unwrap_or_default();
        ports
            .into_iter()
            .map(|p| {
                let (manufacturer, serial_number) = match p.port_type {
                    serialport::SerialPortType::UsbPort(usb) => (usb.manufacturer, usb.serial_number),
                    _ => (None, None),
                };
                PortInfo { device: p.port_name, manufacturer, serial_number }
            })
            .collect()
    }
}

/// A fixed port list for tests and for hosts where the OS registry isn't worth querying.
#[derive(Debug, Default, Clone)]
pub struct StaticPortDiscovery {
    ports: Vec<PortInfo>,
}

impl StaticPortDiscovery {
    pub fn new(ports: Vec<PortInfo>) -> Self {
        Self { ports }
    }
}

impl PortDiscovery for StaticPortDiscovery {
    fn all_ports(&self) -> Vec<PortInfo> {
        self.ports.clone()
    }
}
