//! TCP protocol - RFC 793

use super::layout::{FieldSpec, Layout, OptionsSpec, ProtocolTag};

/// Minimum TCP header size (without options)
pub const MIN_HEADER_SIZE: usize = 20;

/// Field `off` is the data offset in 32-bit words.
pub static LAYOUT: Layout = Layout {
    tag: ProtocolTag::Tcp,
    fixed_len: MIN_HEADER_SIZE,
    fields: &[
        FieldSpec::Uint { name: "sport", bits: 16 },
        FieldSpec::Uint { name: "dport", bits: 16 },
        FieldSpec::Uint { name: "seqno", bits: 32 },
        FieldSpec::Uint { name: "ackno", bits: 32 },
        FieldSpec::Uint { name: "off", bits: 4 },
        FieldSpec::Uint { name: "res", bits: 4 },
        FieldSpec::Uint { name: "cwr", bits: 1 },
        FieldSpec::Uint { name: "ece", bits: 1 },
        FieldSpec::Uint { name: "urg", bits: 1 },
        FieldSpec::Uint { name: "ack", bits: 1 },
        FieldSpec::Uint { name: "psh", bits: 1 },
        FieldSpec::Uint { name: "rst", bits: 1 },
        FieldSpec::Uint { name: "syn", bits: 1 },
        FieldSpec::Uint { name: "fin", bits: 1 },
        FieldSpec::Uint { name: "win", bits: 16 },
        FieldSpec::Uint { name: "sum", bits: 16 },
        FieldSpec::Uint { name: "urp", bits: 16 },
    ],
    options: Some(OptionsSpec {
        name: "opt",
        words_field: "off",
    }),
    discriminant: None,
};
