//! Frame Encoder/Decoder
//!
//! Encode langsung ke buffer yang bisa dipakai ulang antar tick.
//! Satu frame = `[u32 LE length][JSON body]`; fragmentasi bukan urusan codec.

use tracing::debug;

use super::message::{Envelope, Message, LENGTH_PREFIX_SIZE, MAX_BODY_LEN};
use crate::error::{Result, RpcError};

/// Reusable outbound frame buffer
///
/// Frames are appended back to back; the connection writes
/// `as_bytes()` to the socket and `consume`s what the kernel accepted.
pub struct Encoder {
    buffer: Vec<u8>,
}

impl Encoder {
    /// Membuat encoder dengan kapasitas awal tertentu
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Reset encoder untuk reuse
    #[inline(always)]
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Append one frame for `message`.
    ///
    /// Returns the slice holding the new frame. On failure nothing is
    /// appended.
    pub fn encode(&mut self, message: &Message) -> Result<&[u8]> {
        let start = self.buffer.len();

        // Placeholder prefix, patched once the body length is known
        self.buffer.extend_from_slice(&[0u8; LENGTH_PREFIX_SIZE]);
        if let Err(e) = serde_json::to_writer(&mut self.buffer, message) {
            self.buffer.truncate(start);
            return Err(RpcError::MalformedMessage(e.to_string()));
        }

        let body_len = self.buffer.len() - start - LENGTH_PREFIX_SIZE;
        if body_len > MAX_BODY_LEN {
            self.buffer.truncate(start);
            return Err(RpcError::FrameTooLarge {
                len: body_len,
                max: MAX_BODY_LEN,
            });
        }

        self.buffer[start..start + LENGTH_PREFIX_SIZE]
            .copy_from_slice(&(body_len as u32).to_le_bytes());

        Ok(&self.buffer[start..])
    }

    /// Encode many messages in order
    pub fn encode_all<'a, I>(&mut self, messages: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a Message>,
    {
        let mut count = 0;
        for message in messages {
            self.encode(message)?;
            count += 1;
        }
        Ok(count)
    }

    /// Bytes not yet written out
    #[inline(always)]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Drop the first `n` bytes (accepted by the socket)
    #[inline]
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.buffer.len());
        self.buffer.drain(..n);
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new(64 * 1024)
    }
}

/// Encode a single message into a standalone frame
pub fn encode(message: &Message) -> Result<Vec<u8>> {
    let mut encoder = Encoder::new(128);
    encoder.encode(message)?;
    Ok(encoder.buffer)
}

/// Decode a complete frame (prefix + body), the exact inverse of [`encode`]
pub fn decode(frame: &[u8]) -> Result<Message> {
    if frame.len() < LENGTH_PREFIX_SIZE {
        return Err(RpcError::MalformedMessage(format!(
            "frame of {} bytes is shorter than its length prefix",
            frame.len()
        )));
    }

    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    prefix.copy_from_slice(&frame[..LENGTH_PREFIX_SIZE]);
    let body_len = u32::from_le_bytes(prefix) as usize;
    let body = &frame[LENGTH_PREFIX_SIZE..];

    if body.len() != body_len {
        return Err(RpcError::MalformedMessage(format!(
            "length prefix says {} bytes, frame carries {}",
            body_len,
            body.len()
        )));
    }

    decode_body(body)
}

/// Decode a frame body as extracted by the reassembler
pub fn decode_body(body: &[u8]) -> Result<Message> {
    if body.is_empty() {
        return Err(RpcError::MalformedMessage("empty body".to_string()));
    }

    let envelope: Envelope = serde_json::from_slice(body)?;
    let message = Message::try_from(envelope)?;
    debug!(kind = ?message.kind(), len = body.len(), "decoded frame");
    Ok(message)
}
