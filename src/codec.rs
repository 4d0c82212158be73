//! Line framing for the IRC byte stream.
//!
//! [`LineCodec`] splits inbound bytes into protocol lines and terminates
//! outbound lines with CRLF. Partial lines are buffered across reads and
//! completed by the next chunk. Input is decoded as UTF-8 with invalid byte
//! sequences dropped rather than treated as fatal.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

/// Maximum number of bytes buffered for one inbound line.
pub const MAX_IRC_LINE_LEN: usize = 8191;

/// CRLF line codec with lossy UTF-8 decoding.
#[derive(Clone, Debug)]
pub struct LineCodec {
    max_line_len: usize,
    /// Set while the rest of an overlong line is being skipped.
    discarding: bool,
}

impl LineCodec {
    /// Create a codec with the default line limit.
    pub fn new() -> Self {
        Self::with_max_line_len(MAX_IRC_LINE_LEN)
    }

    /// Create a codec with a custom line limit.
    pub fn with_max_line_len(max_line_len: usize) -> Self {
        Self {
            max_line_len,
            discarding: false,
        }
    }

    /// Strip everything from the first CR or LF on, so a single outbound
    /// command can never smuggle a second protocol line.
    pub fn sanitize(line: &str) -> &str {
        match line.find(['\r', '\n']) {
            Some(end) => &line[..end],
            None => line,
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode UTF-8, dropping invalid byte sequences.
pub fn decode_lossy(mut bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    loop {
        match std::str::from_utf8(bytes) {
            Ok(valid) => {
                out.push_str(valid);
                return out;
            }
            Err(e) => {
                let (valid, rest) = bytes.split_at(e.valid_up_to());
                // valid_up_to guarantees this prefix is well-formed
                out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                match e.error_len() {
                    Some(len) => bytes = &rest[len..],
                    // truncated sequence at the end of input
                    None => return out,
                }
            }
        }
    }
}

fn finish_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    decode_lossy(raw)
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        loop {
            let Some(newline) = src.iter().position(|&b| b == b'\n') else {
                if src.len() > self.max_line_len {
                    warn!(len = src.len(), "discarding overlong inbound line");
                    src.clear();
                    self.discarding = true;
                }
                return Ok(None);
            };

            let raw = src.split_to(newline + 1);
            if self.discarding {
                self.discarding = false;
                continue;
            }
            if raw.len() > self.max_line_len {
                warn!(len = raw.len(), "discarding overlong inbound line");
                continue;
            }

            let line = finish_line(&raw[..newline]);
            if line.is_empty() {
                continue;
            }
            return Ok(Some(line));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if src.is_empty() || self.discarding {
            src.clear();
            return Ok(None);
        }

        // the peer closed mid-line: hand over the fragment as the last line
        let raw = src.split();
        let line = finish_line(&raw);
        Ok(if line.is_empty() { None } else { Some(line) })
    }
}

impl Encoder<String> for LineCodec {
    type Error = std::io::Error;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = Self::sanitize(&line);
        dst.reserve(line.len() + 2);
        dst.put_slice(line.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}
