use std::collections::HashMap;

/// Parsed `KEY:HEX;KEY:HEX;...` header line that opens each EVM8 data packet
/// (`spec.md` §4.6 "Header line").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderInfo {
    pub fields: HashMap<String, u64>,
}

impl HeaderInfo {
    pub fn parse(line: &str) -> Self {
        let mut fields = HashMap::new();
        for attr in line.trim().split(';') {
            let Some((name, value)) = attr.split_once(':') else { continue };
            if let Ok(parsed) = u64::from_str_radix(value, 16) {
                fields.insert(name.to_string(), parsed);
            }
        }
        Self { fields }
    }

    pub fn data_packet_size(&self) -> Option<u64> {
        self.fields.get("DATA_PACKET_SIZE").copied()
    }

    pub fn packets(&self) -> Option<u64> {
        self.fields.get("PACKETS").copied()
    }

    pub fn channels(&self) -> Option<u64> {
        self.fields.get("CHANNELS").copied()
    }
}
