//! IPv4 protocol - RFC 791

use super::layout::{FieldSpec, Layout, OptionsSpec, ProtocolTag};

/// Minimum IPv4 header size (without options)
pub const MIN_HEADER_SIZE: usize = 20;

/// IPv4 protocol numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Protocol {
    Icmp = 1,
    Tcp = 6,
    Udp = 17,
}

/// Field `hl` counts the header length in 32-bit words; anything past the
/// 20 fixed bytes is kept verbatim under `opt`.
pub static LAYOUT: Layout = Layout {
    tag: ProtocolTag::Ip,
    fixed_len: MIN_HEADER_SIZE,
    fields: &[
        FieldSpec::Uint { name: "v", bits: 4 },
        FieldSpec::Uint { name: "hl", bits: 4 },
        FieldSpec::Uint { name: "tos", bits: 8 },
        FieldSpec::Uint { name: "len", bits: 16 },
        FieldSpec::Uint { name: "id", bits: 16 },
        FieldSpec::Uint { name: "rf", bits: 1 },
        FieldSpec::Uint { name: "df", bits: 1 },
        FieldSpec::Uint { name: "mf", bits: 1 },
        FieldSpec::Uint { name: "off", bits: 13 },
        FieldSpec::Uint { name: "ttl", bits: 8 },
        FieldSpec::Uint { name: "p", bits: 8 },
        FieldSpec::Uint { name: "sum", bits: 16 },
        FieldSpec::Ipv4 { name: "saddr" },
        FieldSpec::Ipv4 { name: "daddr" },
    ],
    options: Some(OptionsSpec {
        name: "opt",
        words_field: "hl",
    }),
    discriminant: Some("p"),
};
