use crate::error::RegisterError;
use crate::value::RegValue;
use xc2_protocol::consts::XC2RegFlags;

/// Wire width of a register element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegKind {
    Bit,
    U8,
    U16,
    U32,
    U64,
}

impl RegKind {
    pub fn byte_width(self) -> usize {
        match self {
            Self::Bit | Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
            Self::U64 => 8,
        }
    }

    fn from_flags(flags: XC2RegFlags) -> Result<Self, RegisterError> {
        Ok(match (flags & XC2RegFlags::MASK_TYPE).bits() {
            x if x == XC2RegFlags::WIDTH_1.bits() => Self::Bit,
            x if x == XC2RegFlags::WIDTH_8.bits() => Self::U8,
            x if x == XC2RegFlags::WIDTH_16.bits() => Self::U16,
            x if x == XC2RegFlags::WIDTH_32.bits() => Self::U32,
            x if x == XC2RegFlags::WIDTH_64.bits() => Self::U64,
            other => return Err(RegisterError::MalformedStructure(format!("unknown register width code {other:#x}"))),
        })
    }
}

/// Interpretation of a register's raw bits, orthogonal to its width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegMod {
    Unsigned,
    Signed,
    /// 32-bit registers decode as IEEE-754 float; narrower widths decode as an unsigned enum
    /// index (`spec.md` Design Notes — the original overloads this mod bit for both).
    FloatOrEnum,
    Char,
}

impl RegMod {
    fn from_flags(flags: XC2RegFlags) -> Self {
        match (flags & XC2RegFlags::MASK_MOD).bits() {
            x if x == XC2RegFlags::MOD_SIGNED.bits() => Self::Signed,
            x if x == XC2RegFlags::MOD_FLOAT_ENUM.bits() => Self::FloatOrEnum,
            x if x == XC2RegFlags::MOD_CHAR.bits() => Self::Char,
            _ => Self::Unsigned,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegAttrs {
    pub bound: bool,
    pub hex: bool,
    pub read_only: bool,
    pub volatile: bool,
}

impl RegAttrs {
    fn from_flags(flags: XC2RegFlags) -> Self {
        Self {
            bound: flags.contains(XC2RegFlags::BOUND),
            hex: flags.contains(XC2RegFlags::HEX),
            read_only: flags.contains(XC2RegFlags::READ_ONLY),
            volatile: flags.contains(XC2RegFlags::VOLATILE),
        }
    }
}

/// One entry of a device's register file, as returned by `RegistryInfo_Structure`
/// (`spec.md` §3 "RegisterInfo").
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterInfo {
    pub idx: u16,
    pub name: String,
    pub kind: RegKind,
    pub reg_mod: RegMod,
    pub is_array: bool,
    pub array_size: usize,
    pub flags: RegAttrs,
    /// Byte offset into the device's flat register address space, computed from the
    /// cumulative width of every preceding register (`spec.md` §4.3 "adr computation").
    pub adr: usize,
    pub default: RegValue,
}

impl RegisterInfo {
    pub fn from_wire(idx: u16, name: String, raw_flags: u16, array_size: u16, adr: usize) -> Result<Self, RegisterError> {
        let flags = XC2RegFlags::from_bits_truncate(raw_flags);
        let kind = RegKind::from_flags(flags)?;
        let reg_mod = RegMod::from_flags(flags);
        let is_array = flags.contains(XC2RegFlags::ARRAY);
        let array_size = if is_array { array_size.max(1) as usize } else { 1 };
        Ok(Self {
            idx,
            name,
            kind,
            reg_mod,
            is_array,
            array_size,
            flags: RegAttrs::from_flags(flags),
            adr,
            default: RegValue::UInt(0),
        })
    }

    pub fn element_width(&self) -> usize {
        self.kind.byte_width()
    }

    pub fn byte_len(&self) -> usize {
        self.element_width() * self.array_size
    }

    fn decode_scalar(&self, bytes: &[u8]) -> RegValue {
        match self.kind {
            RegKind::Bit => RegValue::Bool(bytes.first().map(|b| *b != 0).unwrap_or(false)),
            _ => {
                let mut buf = [0u8; 8];
                buf[..bytes.len()].copy_from_slice(bytes);
                let raw = u64::from_le_bytes(buf);
                match self.reg_mod {
                    RegMod::FloatOrEnum if self.kind == RegKind::U32 => RegValue::Float(f32::from_bits(raw as u32)),
                    RegMod::Signed => {
                        let width = self.element_width();
                        let shift = (8 - width) * 8;
                        RegValue::Int(((raw << shift) as i64) >> shift)
                    }
                    _ => RegValue::UInt(raw),
                }
            }
        }
    }

    fn encode_scalar(&self, value: &RegValue) -> Result<Vec<u8>, RegisterError> {
        let width = self.element_width();
        let raw: u64 = match self.kind {
            RegKind::Bit => return Ok(vec![value.as_u64().unwrap_or(0) as u8 & 1]),
            _ => match self.reg_mod {
                RegMod::FloatOrEnum if self.kind == RegKind::U32 => {
                    value.as_f32().ok_or_else(|| RegisterError::ValueTooLarge(self.name.clone()))?.to_bits() as u64
                }
                RegMod::Signed => value.as_i64().ok_or_else(|| RegisterError::ValueTooLarge(self.name.clone()))? as u64,
                _ => value.as_u64().ok_or_else(|| RegisterError::ValueTooLarge(self.name.clone()))?,
            },
        };
        Ok(raw.to_le_bytes()[..width].to_vec())
    }

    /// Decodes a single array element, e.g. for a virtual device projecting one index out
    /// of a parent's array register.
    pub fn decode_element(&self, bytes: &[u8]) -> RegValue {
        self.decode_scalar(bytes)
    }

    /// Encodes a single array element; the inverse of [`Self::decode_element`].
    pub fn encode_element(&self, value: &RegValue) -> Result<Vec<u8>, RegisterError> {
        self.encode_scalar(value)
    }

    /// Decodes `bytes` (up to `self.byte_len()` long) into this register's native type.
    /// `Char`-moded registers always decode to a UTF-8 string; arrays of anything else
    /// decode to [`RegValue::Array`].
    pub fn decode(&self, bytes: &[u8]) -> RegValue {
        if self.reg_mod == RegMod::Char {
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            return RegValue::Str(String::from_utf8_lossy(&bytes[..end]).into_owned());
        }
        if self.is_array {
            let w = self.element_width();
            let elems = bytes.chunks(w).map(|c| self.decode_scalar(c)).collect();
            RegValue::Array(elems)
        } else {
            self.decode_scalar(bytes)
        }
    }

    /// Encodes `value` back to wire bytes. A string or array shorter than the register's
    /// full width encodes to just that prefix — `RegisterFile::write_reg` then writes only
    /// that many bytes, leaving the remaining elements on the device untouched
    /// (`spec.md` Design Notes #2, decided as prefix-write).
    pub fn encode(&self, value: &RegValue) -> Result<Vec<u8>, RegisterError> {
        if self.reg_mod == RegMod::Char {
            let s = value.as_str().ok_or_else(|| RegisterError::ValueTooLarge(self.name.clone()))?;
            let mut bytes = s.as_bytes().to_vec();
            if bytes.len() > self.byte_len() {
                return Err(RegisterError::ValueTooLarge(self.name.clone()));
            }
            if bytes.len() < self.byte_len() {
                bytes.push(0);
            }
            return Ok(bytes);
        }
        match value {
            RegValue::Array(items) => {
                if items.len() > self.array_size {
                    return Err(RegisterError::ValueTooLarge(self.name.clone()));
                }
                let mut out = Vec::with_capacity(items.len() * self.element_width());
                for item in items {
                    out.extend(self.encode_scalar(item)?);
                }
                Ok(out)
            }
            scalar => self.encode_scalar(scalar),
        }
    }

    /// Parses a human-entered string into this register's native value according to its
    /// `(mod, array)` category (`spec.md` §4.3 `write_reg_str`): a char register takes the
    /// string as-is, an array of anything else takes a `[a,b,c]` list literal split on commas,
    /// and a scalar takes a single int/float token per `self.reg_mod`.
    pub fn parse_str_value(&self, s: &str) -> Result<RegValue, RegisterError> {
        let s = s.trim();
        if self.reg_mod == RegMod::Char {
            return Ok(RegValue::Str(s.to_string()));
        }
        if self.is_array {
            let inner = s.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')).unwrap_or(s);
            let items = if inner.trim().is_empty() {
                Vec::new()
            } else {
                inner.split(',').map(|tok| self.parse_scalar_token(tok)).collect::<Result<Vec<_>, _>>()?
            };
            return Ok(RegValue::Array(items));
        }
        self.parse_scalar_token(s)
    }

    fn parse_scalar_token(&self, token: &str) -> Result<RegValue, RegisterError> {
        let token = token.trim();
        match self.reg_mod {
            RegMod::FloatOrEnum if self.kind == RegKind::U32 => token
                .parse::<f32>()
                .map(RegValue::Float)
                .map_err(|_| RegisterError::InvalidValueString(token.to_string())),
            RegMod::Signed => parse_int_token(token).map(|v| RegValue::Int(v as i64)),
            _ => parse_int_token(token).map(|v| RegValue::UInt(v as u64)),
        }
    }
}

/// Parses a decimal or `0x`-prefixed hex integer token, optionally signed
/// (`spec.md` §4.3 `write_reg_str`; leniency mirrors the original's `str_to_int`).
fn parse_int_token(token: &str) -> Result<i128, RegisterError> {
    let token = token.trim();
    let (neg, unsigned) = match token.strip_prefix('-') {
        Some(rest) => (true, rest.trim()),
        None => (false, token),
    };
    let value = if let Some(hex) = unsigned.strip_prefix("0x").or_else(|| unsigned.strip_prefix("0X")) {
        i128::from_str_radix(hex, 16)
    } else {
        unsigned.parse::<i128>()
    }
    .map_err(|_| RegisterError::InvalidValueString(token.to_string()))?;
    Ok(if neg { -value } else { value })
}
