//! Ethernet II (DIX) header

use super::layout::{FieldSpec, Layout, ProtocolTag};

/// Minimum Ethernet frame size (without FCS)
pub const MIN_FRAME_SIZE: usize = 14;

pub static LAYOUT: Layout = Layout {
    tag: ProtocolTag::Dix,
    fixed_len: MIN_FRAME_SIZE,
    fields: &[
        FieldSpec::Mac { name: "dst" },
        FieldSpec::Mac { name: "src" },
        FieldSpec::Uint {
            name: "type",
            bits: 16,
        },
    ],
    options: None,
    discriminant: Some("type"),
};
