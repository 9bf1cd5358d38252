//! Chained header decoder
//!
//! Walks a frame from the outermost header inwards. Each header's
//! discriminant field picks the next protocol from a static table; the walk
//! stops at the first header that is short, malformed, or not in the table,
//! and whatever bytes are left become the frame's opaque `data`.
//!
//! Decoding never fails. A buffer that cannot be decoded at all comes back as
//! a frame with no headers and the whole buffer as data.

use super::ipv4::Protocol;
use super::layout::{DecodedHeader, ProtocolTag};
use super::EtherType;
use std::fmt;

/// `(current protocol, discriminant value) -> next protocol`
static NEXT_LAYER: &[(ProtocolTag, u64, ProtocolTag)] = &[
    (ProtocolTag::Dix, EtherType::Ipv4 as u64, ProtocolTag::Ip),
    (ProtocolTag::Ip, Protocol::Icmp as u64, ProtocolTag::Icmp),
    (ProtocolTag::Ip, Protocol::Tcp as u64, ProtocolTag::Tcp),
    (ProtocolTag::Ip, Protocol::Udp as u64, ProtocolTag::Udp),
];

fn next_layer(header: &DecodedHeader) -> Option<ProtocolTag> {
    let field = header.protocol.layout().discriminant?;
    let value = header.uint(field)?;
    NEXT_LAYER
        .iter()
        .find(|(tag, discriminant, _)| *tag == header.protocol && *discriminant == value)
        .map(|(_, _, next)| *next)
}

/// A frame split into its decoded headers and trailing payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Headers in encounter order, outermost first
    pub headers: Vec<DecodedHeader>,
    /// Bytes following the last decoded header
    pub data: Vec<u8>,
}

impl DecodedFrame {
    /// First header of the given protocol
    pub fn header(&self, protocol: ProtocolTag) -> Option<&DecodedHeader> {
        self.headers.iter().find(|h| h.protocol == protocol)
    }

    pub fn contains(&self, protocol: ProtocolTag) -> bool {
        self.header(protocol).is_some()
    }

    /// Total number of bytes the frame was decoded from
    pub fn wire_len(&self) -> usize {
        self.headers.iter().map(|h| h.len).sum::<usize>() + self.data.len()
    }

    /// Reassemble the original frame from the decoded headers and data
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.wire_len());
        for header in &self.headers {
            out.extend_from_slice(&header.to_bytes());
        }
        out.extend_from_slice(&self.data);
        out
    }
}

impl fmt::Display for DecodedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for header in &self.headers {
            write!(f, "{} | ", header)?;
        }
        write!(f, "data[{}]", self.data.len())
    }
}

/// Decode a link-layer frame starting at the Ethernet (DIX) header
pub fn decode(buffer: &[u8]) -> DecodedFrame {
    decode_from(buffer, ProtocolTag::Dix)
}

/// Decode a buffer whose outermost header is `start`
pub fn decode_from(buffer: &[u8], start: ProtocolTag) -> DecodedFrame {
    let mut headers = Vec::new();
    let mut offset = 0;
    let mut current = Some(start);

    while let Some(protocol) = current {
        let rest = buffer.get(offset..).unwrap_or_default();
        let Some(header) = protocol.layout().decode(rest, offset) else {
            break;
        };
        offset += header.len;
        current = next_layer(&header);
        headers.push(header);
    }

    DecodedFrame {
        headers,
        data: buffer.get(offset..).unwrap_or_default().to_vec(),
    }
}
