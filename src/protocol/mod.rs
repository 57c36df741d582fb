//! Protocol Layer: Length-Prefixed JSON Framing
//!
//! Prinsip desain:
//! - Length prefix: 4 bytes little-endian, tanpa magic/version
//! - Shape-tagged: call / notify / reply dibedakan dari field yang ada
//! - Reassembly terpisah dari codec: codec tidak tahu soal fragmentasi

pub mod codec;
pub mod message;
pub mod reassembler;

pub use codec::{decode, decode_body, encode, Encoder};
pub(crate) use message::failed_call_id;
pub use message::{CallId, Message, MessageKind, LENGTH_PREFIX_SIZE, MAX_BODY_LEN};
pub use reassembler::FrameReassembler;
