//! Wire primitives shared by the two node serializations.
//!
//! The framing is fixed: `i8` as a single byte, signed varints as zig-zag
//! LEB128, `u64` as eight big-endian bytes, and byte slices prefixed with
//! their varint length. Both the digest preimage and the persisted form are
//! built from these primitives and must stay bit-stable.

use crate::error::{Error, Result};

/// Longest LEB128 encoding of a 64-bit value.
const MAX_VARINT_LEN: usize = 10;

pub fn write_i8(buf: &mut Vec<u8>, v: i8) {
    buf.push(v as u8);
}

pub fn write_varint(buf: &mut Vec<u8>, v: i64) {
    let mut z = zigzag(v);
    loop {
        let byte = (z & 0x7f) as u8;
        z >>= 7;
        if z == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

pub fn write_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_be_bytes());
}

pub fn write_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    write_varint(buf, bytes.len() as i64);
    buf.extend_from_slice(bytes);
}

fn zigzag(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

fn unzigzag(z: u64) -> i64 {
    ((z >> 1) as i64) ^ -((z & 1) as i64)
}

/// Cursor over an encoded node payload.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.buf.len() - self.pos < n {
            return Err(Error::decode(format!(
                "unexpected end of input: wanted {} bytes at offset {}, {} available",
                n,
                self.pos,
                self.buf.len() - self.pos
            )));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.take(1)?[0] as i8)
    }

    pub fn read_varint(&mut self) -> Result<i64> {
        let mut z: u64 = 0;
        for i in 0..MAX_VARINT_LEN {
            let byte = self.take(1)?[0];
            z |= u64::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                if i == MAX_VARINT_LEN - 1 && byte > 0x01 {
                    return Err(Error::decode("varint overflows 64 bits"));
                }
                return Ok(unzigzag(z));
            }
        }
        Err(Error::decode("varint longer than 10 bytes"))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let bytes = self.take(8)?;
        Ok(u64::from_be_bytes(bytes.try_into().expect("read 8 bytes")))
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_varint()?;
        if len < 0 {
            return Err(Error::decode(format!("negative byte slice length {}", len)));
        }
        Ok(self.take(len as usize)?.to_vec())
    }

    /// Fails unless the whole payload has been consumed.
    pub fn finish(self) -> Result<()> {
        if self.pos != self.buf.len() {
            return Err(Error::decode(format!(
                "{} trailing bytes after node payload",
                self.buf.len() - self.pos
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_pinned_varint_encodings() {
        let cases: [(i64, &[u8]); 6] = [
            (0, &[0x00]),
            (-1, &[0x01]),
            (1, &[0x02]),
            (2, &[0x04]),
            (-2, &[0x03]),
            (300, &[0xd8, 0x04]),
        ];
        for (v, expected) in cases {
            let mut buf = Vec::new();
            write_varint(&mut buf, v);
            assert_eq!(buf, expected, "encoding of {}", v);
        }
    }

    #[test]
    fn test_u64_is_big_endian() {
        let mut buf = Vec::new();
        write_u64(&mut buf, 0x0102_0304_0506_0708);
        assert_eq!(buf, [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_truncated_input() {
        let mut buf = Vec::new();
        write_bytes(&mut buf, b"hello");
        buf.truncate(3);
        let mut r = Reader::new(&buf);
        assert!(r.read_bytes().is_err());
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut buf = Vec::new();
        write_i8(&mut buf, 7);
        buf.push(0xff);
        let mut r = Reader::new(&buf);
        r.read_i8().unwrap();
        assert!(r.finish().is_err());
    }

    #[test_strategy::proptest]
    fn test_varint_roundtrip(v: i64) {
        let mut buf = Vec::new();
        write_varint(&mut buf, v);
        let mut r = Reader::new(&buf);
        prop_assert_eq!(r.read_varint()?, v);
        r.finish()?;
    }

    #[test_strategy::proptest]
    fn test_u64_roundtrip(v: u64) {
        let mut buf = Vec::new();
        write_u64(&mut buf, v);
        let mut r = Reader::new(&buf);
        prop_assert_eq!(r.read_u64()?, v);
        r.finish()?;
    }

    #[test_strategy::proptest]
    fn test_bytes_roundtrip(data: Vec<u8>) {
        let mut buf = Vec::new();
        write_bytes(&mut buf, &data);
        let mut r = Reader::new(&buf);
        prop_assert_eq!(r.read_bytes()?, data);
        r.finish()?;
    }

    #[test_strategy::proptest]
    fn test_mixed_frame_roundtrip(h: i8, s: i64, key: Vec<u8>, v: u64) {
        let mut buf = Vec::new();
        write_i8(&mut buf, h);
        write_varint(&mut buf, s);
        write_bytes(&mut buf, &key);
        write_u64(&mut buf, v);

        let mut r = Reader::new(&buf);
        prop_assert_eq!(r.read_i8()?, h);
        prop_assert_eq!(r.read_varint()?, s);
        prop_assert_eq!(r.read_bytes()?, key);
        prop_assert_eq!(r.read_u64()?, v);
        r.finish()?;
    }
}
