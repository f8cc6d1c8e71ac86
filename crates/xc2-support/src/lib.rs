//! Ancillary, protocol-independent helpers that sit alongside the wire/device stack but
//! aren't part of it: serial port discovery, Intel-hex decoding for firmware flashing, and
//! an ICMP reachability capability (`spec.md` §6, §9 "soft interface" notes).

pub mod intel_hex;
pub mod ping;
pub mod port_discovery;

pub use intel_hex::{parse_intel_hex, IntelHexError};
pub use ping::Pinger;
pub use port_discovery::{PortDiscovery, PortInfo, StaticPortDiscovery, SystemPortDiscovery, KNOWN_VENDOR_PREFIXES};
