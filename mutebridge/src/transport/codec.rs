//! Newline framing for the peripheral link.
//!
//! Unlike `LinesCodec`, decoding never fails on content. Bytes that are not
//! UTF-8 are replaced, and a line longer than the limit is skipped up to
//! its newline and reported as [`Line::Overlong`]. Either way the stream
//! stays usable; line noise after a board reset must not end a session.

use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// One framed line from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// Line content without `\n` or a trailing `\r`.
    Text(String),
    /// A line longer than the limit was dropped.
    Overlong,
}

#[derive(Debug, Clone)]
pub struct LineCodec {
    max_length: usize,
    // Bytes before this index are known to contain no newline.
    next_index: usize,
    discarding: bool,
}

impl LineCodec {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            discarding: false,
        }
    }
}

fn to_text(mut raw: &[u8]) -> String {
    if let Some(stripped) = raw.strip_suffix(b"\r") {
        raw = stripped;
    }
    String::from_utf8_lossy(raw).into_owned()
}

impl Decoder for LineCodec {
    type Item = Line;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<Option<Line>> {
        loop {
            let newline = buf[self.next_index..]
                .iter()
                .position(|b| *b == b'\n')
                .map(|offset| self.next_index + offset);

            match newline {
                Some(end) => {
                    self.next_index = 0;
                    if self.discarding {
                        buf.advance(end + 1);
                        self.discarding = false;
                        return Ok(Some(Line::Overlong));
                    }
                    let line = buf.split_to(end + 1);
                    if end > self.max_length {
                        return Ok(Some(Line::Overlong));
                    }
                    return Ok(Some(Line::Text(to_text(&line[..end]))));
                }
                None if self.discarding => {
                    buf.clear();
                    self.next_index = 0;
                    return Ok(None);
                }
                None if buf.len() > self.max_length => {
                    self.discarding = true;
                }
                None => {
                    self.next_index = buf.len();
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> io::Result<Option<Line>> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if self.discarding {
            self.discarding = false;
            return Ok(Some(Line::Overlong));
        }
        if buf.is_empty() {
            return Ok(None);
        }
        let rest = buf.split();
        Ok(Some(Line::Text(to_text(&rest))))
    }
}

impl<T: AsRef<str>> Encoder<T> for LineCodec {
    type Error = io::Error;

    fn encode(&mut self, line: T, dst: &mut BytesMut) -> io::Result<()> {
        let line = line.as_ref();
        dst.reserve(line.len() + 1);
        dst.put_slice(line.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Option<Line> {
        Some(Line::Text(s.to_string()))
    }

    #[test]
    fn test_splits_lines_and_strips_cr() {
        let mut codec = LineCodec::new(16);
        let mut buf = BytesMut::from(&b"MUTE\r\nGET_STATE\nUNM"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap(), text("MUTE"));
        assert_eq!(codec.decode(&mut buf).unwrap(), text("GET_STATE"));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"UTE\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), text("UNMUTE"));
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut codec = LineCodec::new(16);
        let mut buf = BytesMut::from(&b"\xff\xfeMUTE\n"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap(), text("\u{fffd}\u{fffd}MUTE"));
    }

    #[test]
    fn test_overlong_line_is_skipped_across_reads() {
        let mut codec = LineCodec::new(8);
        let mut buf = BytesMut::from(&b"AAAAAAAAAAAA"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"AAAA\nMUTE\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Line::Overlong));
        assert_eq!(codec.decode(&mut buf).unwrap(), text("MUTE"));
    }

    #[test]
    fn test_overlong_line_in_one_read() {
        let mut codec = LineCodec::new(4);
        let mut buf = BytesMut::from(&b"GET_STATE\nMUTE\n"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Line::Overlong));
        assert_eq!(codec.decode(&mut buf).unwrap(), text("MUTE"));
    }

    #[test]
    fn test_unterminated_tail_at_eof() {
        let mut codec = LineCodec::new(16);
        let mut buf = BytesMut::from(&b"MUTE"[..]);

        assert_eq!(codec.decode_eof(&mut buf).unwrap(), text("MUTE"));
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_encode_appends_newline() {
        let mut codec = LineCodec::new(16);
        let mut buf = BytesMut::new();

        codec.encode("MUTED", &mut buf).unwrap();
        assert_eq!(&buf[..], b"MUTED\n");
    }
}
