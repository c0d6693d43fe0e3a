//! Line-delimited framing for the chat protocol.
//!
//! Decoding is delegated to `LinesCodec` (UTF-8, `\n` terminator,
//! trailing `\r` stripped) and each line is then classified into a
//! [`Payload`]. One decoded line is exactly one payload, so a text
//! payload with embedded newlines arrives as several lines.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LinesCodec};

use crate::error::BuddyError;
use crate::payload::Payload;

/// Longest accepted inbound line, in bytes.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

#[derive(Debug)]
pub struct ChatCodec {
    lines: LinesCodec,
}

impl ChatCodec {
    pub fn new() -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(MAX_LINE_LENGTH),
        }
    }
}

impl Default for ChatCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ChatCodec {
    type Item = Payload;
    type Error = BuddyError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(self.lines.decode(src)?.map(|line| Payload::classify(&line)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(self
            .lines
            .decode_eof(src)?
            .map(|line| Payload::classify(&line)))
    }
}

impl Encoder<Payload> for ChatCodec {
    type Error = BuddyError;

    fn encode(&mut self, item: Payload, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = item.to_wire()?;
        dst.reserve(line.len() + 1);
        dst.put_slice(line.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}
