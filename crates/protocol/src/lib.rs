//! Vigil Protocol - Packet and message definitions
//!
//! This crate defines the wire model for the vigil monitoring protocol:
//! - `Message`: the closed, tagged set of payload kinds
//! - `Packet`: the tag-plus-message envelope, one JSON object per line
//!
//! The codec is stateless; encryption and framing live in
//! `vigil-transport`.

mod message;
mod packet;

pub use message::*;
pub use packet::*;
