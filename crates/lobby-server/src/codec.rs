//! Newline framing for byte-stream connections.
//!
//! Bytes are buffered until a `\n` arrives. Each complete line, minus the
//! `\n`, becomes one frame; empty lines are skipped. A `\r` before the
//! newline is kept so relay frames pass through intact. Bytes after
//! the last newline stay buffered for the next read and are discarded when
//! the stream ends.

use std::io;

use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;

/// Splits a byte stream into newline-delimited frames.
#[derive(Debug, Clone)]
pub struct LineCodec {
    max_length: usize,
    /// Bytes already scanned for a newline.
    next_index: usize,
}

impl LineCodec {
    /// Create a codec rejecting frames longer than `max_length` bytes.
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
        }
    }
}

impl Decoder for LineCodec {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, io::Error> {
        loop {
            let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
                self.next_index = src.len();
                if src.len() > self.max_length {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("frame exceeds {} bytes", self.max_length),
                    ));
                }
                return Ok(None);
            };

            let newline = self.next_index + offset;
            self.next_index = 0;
            let mut line = src.split_to(newline + 1);
            line.truncate(newline);
            if line.is_empty() {
                continue;
            }
            if line.len() > self.max_length {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("frame exceeds {} bytes", self.max_length),
                ));
            }
            return Ok(Some(line.freeze()));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, io::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                src.clear();
                self.next_index = 0;
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(codec: &mut LineCodec, buf: &mut BytesMut) -> Vec<Bytes> {
        let mut out = Vec::new();
        while let Some(frame) = codec.decode(buf).unwrap() {
            out.push(frame);
        }
        out
    }

    #[test]
    fn splits_lines_and_keeps_remainder() {
        let mut codec = LineCodec::new(1024);
        let mut buf = BytesMut::from(&b"first\nsecond\nthi"[..]);
        assert_eq!(frames(&mut codec, &mut buf), vec!["first", "second"]);
        assert_eq!(&buf[..], b"thi");

        buf.extend_from_slice(b"rd\n");
        assert_eq!(frames(&mut codec, &mut buf), vec!["third"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn keeps_carriage_return_and_skips_empty_lines() {
        let mut codec = LineCodec::new(1024);
        let mut buf = BytesMut::from(&b"\n\nping\r\nrelay \xff\r\n\n"[..]);
        assert_eq!(
            frames(&mut codec, &mut buf),
            vec![&b"ping\r"[..], &b"relay \xff\r"[..]]
        );
    }

    #[test]
    fn frame_split_across_many_reads() {
        let mut codec = LineCodec::new(1024);
        let mut buf = BytesMut::new();
        for chunk in [&b"{\"id\""[..], b":1,", b"\"x\":2}", b"\n"] {
            buf.extend_from_slice(chunk);
            let got = frames(&mut codec, &mut buf);
            if chunk == b"\n" {
                assert_eq!(got, vec![r#"{"id":1,"x":2}"#]);
            } else {
                assert!(got.is_empty());
            }
        }
    }

    #[test]
    fn oversized_partial_frame_errors() {
        let mut codec = LineCodec::new(4);
        let mut buf = BytesMut::from(&b"toolong"[..]);
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn unterminated_tail_discarded_at_eof() {
        let mut codec = LineCodec::new(1024);
        let mut buf = BytesMut::from(&b"done\npartial"[..]);
        assert_eq!(codec.decode_eof(&mut buf).unwrap().unwrap(), "done");
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }
}
