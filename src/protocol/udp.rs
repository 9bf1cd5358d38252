//! UDP protocol - RFC 768

use super::layout::{FieldSpec, Layout, ProtocolTag};

/// UDP header size (fixed)
pub const HEADER_SIZE: usize = 8;

pub static LAYOUT: Layout = Layout {
    tag: ProtocolTag::Udp,
    fixed_len: HEADER_SIZE,
    fields: &[
        FieldSpec::Uint { name: "sport", bits: 16 },
        FieldSpec::Uint { name: "dport", bits: 16 },
        FieldSpec::Uint { name: "ulen", bits: 16 },
        FieldSpec::Uint { name: "sum", bits: 16 },
    ],
    options: None,
    discriminant: None,
};
