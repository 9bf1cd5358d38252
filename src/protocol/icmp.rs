//! ICMP (Internet Control Message Protocol) - RFC 792

use super::layout::{FieldSpec, Layout, ProtocolTag};

/// ICMP header size (minimum)
pub const ICMP_HEADER_SIZE: usize = 8;

/// `un` is the type-specific second word: identifier and sequence for
/// echo, gateway address for redirect, next-hop MTU for fragmentation needed.
pub static LAYOUT: Layout = Layout {
    tag: ProtocolTag::Icmp,
    fixed_len: ICMP_HEADER_SIZE,
    fields: &[
        FieldSpec::Uint { name: "type", bits: 8 },
        FieldSpec::Uint { name: "code", bits: 8 },
        FieldSpec::Uint {
            name: "checksum",
            bits: 16,
        },
        FieldSpec::Bytes { name: "un", len: 4 },
    ],
    options: None,
    discriminant: None,
};
