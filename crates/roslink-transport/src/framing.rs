//! Stream framing for raw TCP connections.
//!
//! rosbridge writes JSON objects back to back on a TCP stream, so frames are
//! cut at JSON value boundaries rather than by length prefix.

use bytes::{Buf, BufMut, BytesMut};
use log::warn;
use roslink_core::config::TextEncoding;
use roslink_core::error::TransportError;
use serde::de::IgnoredAny;
use tokio_util::codec::{Decoder, Encoder};

/// Splits a byte stream into complete JSON frames and encodes outgoing frames.
///
/// Bytes already scanned are not looked at again when more data arrives, so a
/// large frame delivered in many small reads costs one pass.
#[derive(Debug, Clone, Default)]
pub struct JsonFrameCodec {
    encoding: TextEncoding,
    scan: Scan,
}

/// How far into the buffered frame the decoder has looked.
#[derive(Debug, Clone, Default)]
struct Scan {
    offset: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl Scan {
    /// Advances over `bytes[self.offset..]` and returns the length of the
    /// first complete top-level value, if it has closed.
    fn advance(&mut self, bytes: &[u8]) -> Option<usize> {
        for (i, b) in bytes.iter().enumerate().skip(self.offset) {
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if *b == b'\\' {
                    self.escaped = true;
                } else if *b == b'"' {
                    self.in_string = false;
                }
                continue;
            }
            match b {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.depth == 0 {
                        return Some(i + 1);
                    }
                }
                _ => {}
            }
        }
        self.offset = bytes.len();
        None
    }
}

impl JsonFrameCodec {
    pub fn new(encoding: TextEncoding) -> Self {
        Self {
            encoding,
            scan: Scan::default(),
        }
    }

    fn skip_whitespace(buf: &mut BytesMut) {
        let ws = buf
            .iter()
            .take_while(|b| matches!(b, b' ' | b'\n' | b'\r' | b'\t'))
            .count();
        buf.advance(ws);
    }

    /// Drops bytes up to the next object start. Returns `false` when nothing
    /// usable is left.
    fn resync(&mut self, buf: &mut BytesMut, reason: &dyn std::fmt::Display) -> bool {
        self.scan = Scan::default();
        match buf.iter().skip(1).position(|b| *b == b'{') {
            Some(pos) => {
                warn!("Discarding {} unframeable bytes: {}", pos + 1, reason);
                buf.advance(pos + 1);
                true
            }
            None => {
                warn!("Discarding {} unframeable bytes: {}", buf.len(), reason);
                buf.clear();
                false
            }
        }
    }
}

impl Decoder for JsonFrameCodec {
    type Item = String;
    type Error = TransportError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, TransportError> {
        loop {
            if self.scan.offset == 0 {
                Self::skip_whitespace(buf);
                match buf.first() {
                    None => return Ok(None),
                    Some(b'{') => {}
                    Some(_) => {
                        if self.resync(buf, &"frame does not start with '{'") {
                            continue;
                        }
                        return Ok(None);
                    }
                }
            }

            let Some(end) = self.scan.advance(&buf[..]) else {
                return Ok(None);
            };

            // Structure balanced; make sure the content is JSON too.
            if let Err(e) = serde_json::from_slice::<IgnoredAny>(&buf[..end]) {
                if self.resync(buf, &e) {
                    continue;
                }
                return Ok(None);
            }

            self.scan = Scan::default();
            let frame = buf.split_to(end);
            return String::from_utf8(frame.to_vec())
                .map(Some)
                .map_err(|e| TransportError::Framing(e.to_string()));
        }
    }
}

impl Encoder<String> for JsonFrameCodec {
    type Error = TransportError;

    fn encode(&mut self, frame: String, dst: &mut BytesMut) -> Result<(), TransportError> {
        match self.encoding {
            TextEncoding::Utf8 => dst.put_slice(frame.as_bytes()),
            TextEncoding::Ascii => dst.put_slice(escape_non_ascii(&frame).as_bytes()),
        }
        Ok(())
    }
}

/// Rewrites every non-ASCII character of a JSON document as a `\uXXXX` escape.
///
/// Non-ASCII characters can only occur inside JSON strings, where the escape
/// form is equivalent.
pub fn escape_non_ascii(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for ch in json.chars() {
        if ch.is_ascii() {
            out.push(ch);
        } else {
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    out
}
