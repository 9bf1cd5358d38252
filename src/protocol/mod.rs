//! Link-layer frame decoding
//!
//! Supported chain: Ethernet (DIX) -> IPv4 -> TCP / UDP / ICMP. Adding a
//! protocol means adding a static [`Layout`] and its entries in the
//! decoder's next-layer table.

pub mod decoder;
pub mod ethernet;
pub mod icmp;
pub mod ipv4;
pub mod layout;
pub mod tcp;
pub mod types;
pub mod udp;

pub use decoder::{decode, decode_from, DecodedFrame};
pub use layout::{DecodedHeader, Field, FieldSpec, FieldValue, Layout, ProtocolTag};
pub use types::*;
