//! The byte sink/source contracts `MuxEngine`/`DemuxEngine` are written
//! against, plus a minimal in-memory implementation of each used by this
//! crate's own tests.

use bytes::{Buf, Bytes};
use byteorder::{BigEndian, WriteBytesExt};
use std::io::{self, Write};

/// Everything the mux needs from an output byte stream. Writes are opaque
/// to the mux; it never seeks.
pub trait ByteSink {
    fn put_byte(&mut self, b: u8) -> io::Result<()>;
    fn put_be16(&mut self, v: u16) -> io::Result<()>;
    fn put_be32(&mut self, v: u32) -> io::Result<()>;
    fn put_buffer(&mut self, buf: &[u8]) -> io::Result<()>;
    /// Marks a PS packet boundary; a plain in-memory sink treats this as a
    /// no-op flush, a socket-backed one would flush its write buffer here.
    fn put_flush_packet(&mut self) -> io::Result<()>;
}

impl<W: Write> ByteSink for W {
    fn put_byte(&mut self, b: u8) -> io::Result<()> {
        self.write_all(&[b])
    }

    fn put_be16(&mut self, v: u16) -> io::Result<()> {
        self.write_u16::<BigEndian>(v)
    }

    fn put_be32(&mut self, v: u32) -> io::Result<()> {
        self.write_u32::<BigEndian>(v)
    }

    fn put_buffer(&mut self, buf: &[u8]) -> io::Result<()> {
        self.write_all(buf)
    }

    fn put_flush_packet(&mut self) -> io::Result<()> {
        self.flush()
    }
}

/// Everything the demux needs from an input byte stream. Reads only move
/// forward; `url_fskip` may be implemented as repeated byte reads.
pub trait ByteSource {
    fn get_byte(&mut self) -> io::Result<u8>;
    fn get_be16(&mut self) -> io::Result<u16>;
    fn get_buffer(&mut self, n: usize) -> io::Result<Vec<u8>>;
    fn url_fskip(&mut self, n: u64) -> io::Result<()>;
    fn url_feof(&self) -> bool;
    fn url_ftell(&self) -> u64;
}

/// A forward-only byte source backed by an in-memory [`Bytes`] buffer, used
/// by this crate's own tests and suitable for any caller that already has
/// the whole Program Stream in memory.
#[derive(Debug, Clone)]
pub struct SliceSource {
    data: Bytes,
    pos: u64,
}

impl SliceSource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        SliceSource { data: data.into(), pos: 0 }
    }
}

fn eof_error() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "mpeg-ps: end of input")
}

impl ByteSource for SliceSource {
    fn get_byte(&mut self) -> io::Result<u8> {
        if !self.data.has_remaining() {
            return Err(eof_error());
        }
        self.pos += 1;
        Ok(self.data.get_u8())
    }

    fn get_be16(&mut self) -> io::Result<u16> {
        if self.data.remaining() < 2 {
            return Err(eof_error());
        }
        self.pos += 2;
        Ok(self.data.get_u16())
    }

    fn get_buffer(&mut self, n: usize) -> io::Result<Vec<u8>> {
        if self.data.remaining() < n {
            return Err(eof_error());
        }
        let out = self.data.copy_to_bytes(n).to_vec();
        self.pos += n as u64;
        Ok(out)
    }

    fn url_fskip(&mut self, n: u64) -> io::Result<()> {
        let n_usize = n as usize;
        if self.data.remaining() < n_usize {
            return Err(eof_error());
        }
        self.data.advance(n_usize);
        self.pos += n;
        Ok(())
    }

    fn url_feof(&self) -> bool {
        !self.data.has_remaining()
    }

    fn url_ftell(&self) -> u64 {
        self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_u8_writes_big_endian_fields() {
        let mut sink: Vec<u8> = Vec::new();
        sink.put_byte(0x01).unwrap();
        sink.put_be16(0x0203).unwrap();
        sink.put_be32(0x0405_0607).unwrap();
        sink.put_buffer(&[0xAA, 0xBB]).unwrap();
        sink.put_flush_packet().unwrap();
        assert_eq!(sink, vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0xAA, 0xBB]);
    }

    #[test]
    fn slice_source_reads_forward_and_tracks_position() {
        let mut src = SliceSource::new(vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        assert_eq!(src.get_byte().unwrap(), 0x01);
        assert_eq!(src.get_be16().unwrap(), 0x0203);
        assert_eq!(src.get_buffer(2).unwrap(), vec![0x04, 0x05]);
        assert_eq!(src.url_ftell(), 5);
        assert!(!src.url_feof());
        src.url_fskip(1).unwrap();
        assert!(src.url_feof());
    }

    #[test]
    fn slice_source_reports_eof_as_io_error() {
        let mut src = SliceSource::new(Vec::<u8>::new());
        assert!(src.get_byte().is_err());
    }
}
