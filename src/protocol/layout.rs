//! Header layouts and decoded header records
//!
//! Every supported protocol describes its header as a static [`Layout`]:
//! an ordered list of fixed-width fields (MSB first, exactly as on the wire),
//! an optional variable-length options region sized by a 4-byte-word
//! length field, and the field that selects the next protocol layer.

use super::{ethernet, icmp, ipv4, tcp, udp, MacAddr};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Protocols the decoder knows how to walk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolTag {
    Dix,
    Ip,
    Tcp,
    Udp,
    Icmp,
}

impl ProtocolTag {
    pub const ALL: [ProtocolTag; 5] = [
        ProtocolTag::Dix,
        ProtocolTag::Ip,
        ProtocolTag::Tcp,
        ProtocolTag::Udp,
        ProtocolTag::Icmp,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ProtocolTag::Dix => "dix",
            ProtocolTag::Ip => "ip",
            ProtocolTag::Tcp => "tcp",
            ProtocolTag::Udp => "udp",
            ProtocolTag::Icmp => "icmp",
        }
    }

    /// Static header layout for this protocol
    pub fn layout(&self) -> &'static Layout {
        match self {
            ProtocolTag::Dix => &ethernet::LAYOUT,
            ProtocolTag::Ip => &ipv4::LAYOUT,
            ProtocolTag::Tcp => &tcp::LAYOUT,
            ProtocolTag::Udp => &udp::LAYOUT,
            ProtocolTag::Icmp => &icmp::LAYOUT,
        }
    }
}

impl fmt::Display for ProtocolTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error type for protocol name parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseProtocolTagError(String);

impl fmt::Display for ParseProtocolTagError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown protocol: {}", self.0)
    }
}

impl std::error::Error for ParseProtocolTagError {}

impl FromStr for ProtocolTag {
    type Err = ParseProtocolTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        ProtocolTag::ALL
            .into_iter()
            .find(|tag| tag.name() == lower)
            .ok_or_else(|| ParseProtocolTagError(s.to_string()))
    }
}

/// One fixed-width field of a header layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSpec {
    /// Unsigned integer, `bits` wide
    Uint { name: &'static str, bits: u8 },
    /// Opaque byte string
    Bytes { name: &'static str, len: usize },
    /// 6-byte hardware address
    Mac { name: &'static str },
    /// 4-byte IPv4 address
    Ipv4 { name: &'static str },
}

impl FieldSpec {
    pub fn name(&self) -> &'static str {
        match *self {
            FieldSpec::Uint { name, .. }
            | FieldSpec::Bytes { name, .. }
            | FieldSpec::Mac { name }
            | FieldSpec::Ipv4 { name } => name,
        }
    }

    pub fn bit_width(&self) -> usize {
        match *self {
            FieldSpec::Uint { bits, .. } => bits as usize,
            FieldSpec::Bytes { len, .. } => len * 8,
            FieldSpec::Mac { .. } => 48,
            FieldSpec::Ipv4 { .. } => 32,
        }
    }
}

/// Variable-length options region following the fixed fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionsSpec {
    /// Field name the options are stored under
    pub name: &'static str,
    /// Header length field, counted in 4-byte words
    pub words_field: &'static str,
}

/// Wire layout of one protocol header
#[derive(Debug)]
pub struct Layout {
    pub tag: ProtocolTag,
    /// Size of the fixed portion in bytes
    pub fixed_len: usize,
    pub fields: &'static [FieldSpec],
    pub options: Option<OptionsSpec>,
    /// Field whose value selects the next layer
    pub discriminant: Option<&'static str>,
}

impl Layout {
    /// Decode one header from the start of `buf`.
    ///
    /// `offset` is the position of `buf` within the whole frame and is only
    /// recorded on the result. Returns `None` when the buffer is shorter than
    /// the fixed portion or the declared header length is smaller than the
    /// fixed portion or runs past the buffer.
    pub fn decode(&self, buf: &[u8], offset: usize) -> Option<DecodedHeader> {
        let fixed = buf.get(..self.fixed_len)?;

        let mut fields = Vec::with_capacity(self.fields.len() + 1);
        let mut bit = 0;
        for spec in self.fields {
            let value = match *spec {
                FieldSpec::Uint { bits, .. } => FieldValue::Uint {
                    value: read_bits(fixed, bit, bits)?,
                    bits,
                },
                _ => FieldValue::Bytes(read_bytes(fixed, bit, spec.bit_width() / 8)?),
            };
            bit += spec.bit_width();
            fields.push(Field {
                name: spec.name(),
                value,
            });
        }

        let mut len = self.fixed_len;
        if let Some(options) = self.options {
            let words = fields
                .iter()
                .find(|f| f.name == options.words_field)?
                .value
                .as_uint()?;
            let header_len = usize::try_from(words).ok()?.checked_mul(4)?;
            if header_len < self.fixed_len {
                return None;
            }
            let region = buf.get(self.fixed_len..header_len)?;
            fields.push(Field {
                name: options.name,
                value: FieldValue::Bytes(region.to_vec()),
            });
            len = header_len;
        }

        Some(DecodedHeader {
            protocol: self.tag,
            offset,
            len,
            fields,
        })
    }
}

fn read_bits(buf: &[u8], bit_offset: usize, bits: u8) -> Option<u64> {
    let mut value = 0u64;
    for bit in bit_offset..bit_offset + bits as usize {
        let byte = *buf.get(bit / 8)?;
        value = (value << 1) | u64::from((byte >> (7 - bit % 8)) & 1);
    }
    Some(value)
}

fn read_bytes(buf: &[u8], bit_offset: usize, len: usize) -> Option<Vec<u8>> {
    if bit_offset % 8 == 0 {
        let start = bit_offset / 8;
        return buf.get(start..start + len).map(<[u8]>::to_vec);
    }
    (0..len)
        .map(|i| read_bits(buf, bit_offset + i * 8, 8).map(|b| b as u8))
        .collect()
}

fn write_bits(buf: &mut [u8], bit_offset: usize, bits: u8, value: u64) {
    for i in 0..bits as usize {
        if (value >> (bits as usize - 1 - i)) & 1 == 0 {
            continue;
        }
        let bit = bit_offset + i;
        if let Some(byte) = buf.get_mut(bit / 8) {
            *byte |= 0x80 >> (bit % 8);
        }
    }
}

/// Decoded field value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Uint { value: u64, bits: u8 },
    Bytes(Vec<u8>),
}

impl FieldValue {
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            FieldValue::Uint { value, .. } => Some(*value),
            FieldValue::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            FieldValue::Uint { .. } => None,
            FieldValue::Bytes(bytes) => Some(bytes),
        }
    }
}

/// Named field of a decoded header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub value: FieldValue,
}

/// One decoded protocol header
///
/// Fields appear in wire order. The field set for a given protocol is
/// always the same; an options region that is present but empty is stored
/// as an empty byte string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedHeader {
    pub protocol: ProtocolTag,
    /// Byte offset of the header within the decoded frame
    pub offset: usize,
    /// Header length in bytes, options included
    pub len: usize,
    pub fields: Vec<Field>,
}

impl DecodedHeader {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    pub fn uint(&self, name: &str) -> Option<u64> {
        self.get(name)?.as_uint()
    }

    pub fn bytes(&self, name: &str) -> Option<&[u8]> {
        self.get(name)?.as_bytes()
    }

    /// Byte range this header occupied in the decoded frame
    pub fn span(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.len
    }

    /// Re-encode the header from its fields
    pub fn to_bytes(&self) -> Vec<u8> {
        let layout = self.protocol.layout();
        let mut out = vec![0u8; layout.fixed_len];

        let mut bit = 0;
        for (spec, field) in layout.fields.iter().zip(&self.fields) {
            match &field.value {
                FieldValue::Uint { value, bits } => write_bits(&mut out, bit, *bits, *value),
                FieldValue::Bytes(bytes) => {
                    for (i, byte) in bytes.iter().enumerate() {
                        write_bits(&mut out, bit + i * 8, 8, u64::from(*byte));
                    }
                }
            }
            bit += spec.bit_width();
        }

        if let Some(options) = layout.options {
            if let Some(region) = self.bytes(options.name) {
                out.extend_from_slice(region);
            }
        }
        out
    }
}

impl fmt::Display for DecodedHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.protocol)?;

        let layout = self.protocol.layout();
        for field in &self.fields {
            let spec = layout.fields.iter().find(|s| s.name() == field.name);
            write!(f, " {}=", field.name)?;
            match (spec, &field.value) {
                (Some(FieldSpec::Mac { .. }), FieldValue::Bytes(b)) => {
                    match MacAddr::try_from(b.as_slice()) {
                        Ok(mac) => write!(f, "{}", mac)?,
                        Err(_) => write_hex(f, b)?,
                    }
                }
                (Some(FieldSpec::Ipv4 { .. }), FieldValue::Bytes(b)) if b.len() == 4 => {
                    write!(f, "{}", Ipv4Addr::new(b[0], b[1], b[2], b[3]))?
                }
                (Some(FieldSpec::Uint { bits: 16, .. }), FieldValue::Uint { value, .. })
                    if Some(field.name) == layout.discriminant =>
                {
                    write!(f, "0x{:04x}", value)?
                }
                (_, FieldValue::Uint { value, .. }) => write!(f, "{}", value)?,
                (_, FieldValue::Bytes(b)) => write_hex(f, b)?,
            }
        }
        Ok(())
    }
}

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    if bytes.is_empty() {
        return f.write_str("<>");
    }
    for byte in bytes {
        write!(f, "{:02x}", byte)?;
    }
    Ok(())
}
