//! The framing used on both TCP ports: newline-delimited JSON.
//!
//! One JSON object per line. The newline byte cannot occur inside
//! serialized JSON text, so no escaping is involved; finding the
//! delimiter is enough to find the frame boundary.

use bytes::{Buf, BytesMut};
use serde::Serialize;
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::Error;

/// Encodes/decodes newline-delimited JSON frames.
///
/// Decoding tolerates frames split across arbitrary read boundaries as
/// well as several frames arriving in a single read; whatever follows a
/// delimiter stays in the buffer for the next call.
#[derive(Debug, Clone, Default)]
pub struct JsonLinesCodec {
    /// How far into the buffer we have already looked for a newline.
    cursor: usize,
}

impl JsonLinesCodec {
    /// Create a new codec.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for JsonLinesCodec {
    type Item = Value;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let read_to = src.len();

        let look_at = &src[self.cursor..read_to];

        if let Some(position) = look_at.iter().position(|&byte| byte == b'\n') {
            // We might have started late in the buffer (from the cursor),
            // so the position within the whole buffer has to be calculated.
            let actual_position = self.cursor + position;

            // Next time we start over.
            self.cursor = 0;

            // Split at the delimiter, getting the bytes before it.
            let line = src.split_to(actual_position);

            // Discard the newline by advancing the source buffer beyond it.
            src.advance(1);

            let value =
                serde_json::from_slice(&line).map_err(|e| Error::MessageParse(e.to_string()))?;

            Ok(Some(value))
        } else {
            // No full frame yet. The same buffer comes back on the next
            // call, possibly with more data appended; no need to re-scan
            // the bytes we have already looked at.
            self.cursor = read_to;

            Ok(None)
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None if buf.is_empty() => Ok(None),
            // The peer went away mid-frame.
            None => Err(Error::ConnectionBroken),
        }
    }
}

impl<'a, T: Serialize> Encoder<&'a T> for JsonLinesCodec {
    type Error = Error;

    fn encode(&mut self, item: &T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let serialized =
            serde_json::to_vec(item).map_err(|e| Error::MessageParse(e.to_string()))?;

        dst.extend_from_slice(&serialized);
        dst.extend_from_slice(b"\n");

        Ok(())
    }
}
