//! Protocol module containing message types and the binary codec.

pub mod codec;
pub mod messages;

pub use codec::{decode_frame, encode_message, peek_tag, Decoded, ProtocolError};
pub use messages::*;
