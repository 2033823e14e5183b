use bytes::{Buf, BytesMut};
use std::io;
use tokio_util::codec::Decoder;

/// Longest accepted line in bytes, terminator excluded.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1 << 20;

/// Splits a byte stream into lines, decoding from the upload charset.
///
/// UTF-8 input is validated in place. Any other charset is transcoded into an
/// internal buffer first, so at most one line plus one read chunk is held.
/// A line longer than the maximum length is an `InvalidData` error.
pub struct CharsetLineCodec {
    decoder: Option<encoding_rs::Decoder>,
    /// Transcoded UTF-8 not yet returned as lines.
    decoded: BytesMut,
    scratch: String,
    /// Bytes of the pending buffer already searched for `\n`.
    next_index: usize,
    max_length: usize,
    flushed: bool,
}

impl CharsetLineCodec {
    pub fn new(encoding: &'static encoding_rs::Encoding) -> Self {
        Self::with_max_length(encoding, DEFAULT_MAX_LINE_LENGTH)
    }

    pub fn with_max_length(encoding: &'static encoding_rs::Encoding, max_length: usize) -> Self {
        let decoder = if encoding == encoding_rs::UTF_8 {
            None
        } else {
            Some(encoding.new_decoder_without_bom_handling())
        };
        Self {
            decoder,
            decoded: BytesMut::new(),
            scratch: String::new(),
            next_index: 0,
            max_length,
            flushed: false,
        }
    }

    fn transcode(&mut self, src: &mut BytesMut, last: bool) {
        if self.flushed {
            return;
        }
        let Some(decoder) = self.decoder.as_mut() else {
            return;
        };
        let needed = decoder
            .max_utf8_buffer_length(src.len())
            .unwrap_or_else(|| src.len() * 3 + 16);
        self.scratch.clear();
        self.scratch.reserve(needed);
        let (_result, read, _replaced) = decoder.decode_to_string(&src[..], &mut self.scratch, last);
        src.advance(read);
        self.decoded.extend_from_slice(self.scratch.as_bytes());
        self.flushed = last;
    }
}

fn too_long(max_length: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("line longer than {max_length} bytes"),
    )
}

/// Split the next `\n`-terminated line off `buf`, resuming the search at
/// `next_index`.
fn split_line(buf: &mut BytesMut, next_index: &mut usize, max_length: usize) -> io::Result<Option<String>> {
    let read_to = buf.len();
    match buf[*next_index..read_to].iter().position(|b| *b == b'\n') {
        Some(offset) => {
            let end = *next_index + offset;
            *next_index = 0;
            if end > max_length {
                return Err(too_long(max_length));
            }
            utf8_line(buf.split_to(end + 1)).map(Some)
        }
        None if read_to > max_length => Err(too_long(max_length)),
        None => {
            *next_index = read_to;
            Ok(None)
        }
    }
}

fn trim_terminator(line: &mut String) {
    if line.ends_with('\n') {
        line.pop();
    }
    if line.ends_with('\r') {
        line.pop();
    }
}

fn utf8_line(bytes: BytesMut) -> io::Result<String> {
    let mut line =
        String::from_utf8(bytes.to_vec()).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    trim_terminator(&mut line);
    Ok(line)
}

impl Decoder for CharsetLineCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.decoder.is_some() {
            self.transcode(src, false);
            return split_line(&mut self.decoded, &mut self.next_index, self.max_length);
        }
        split_line(src, &mut self.next_index, self.max_length)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.decoder.is_some() {
            self.transcode(buf, true);
        }
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }

        let rest = if self.decoder.is_some() {
            &mut self.decoded
        } else {
            buf
        };
        if rest.is_empty() {
            return Ok(None);
        }
        self.next_index = 0;
        utf8_line(rest.split()).map(Some)
    }
}
