//! Endian-aware primitive read/write and the bounded-reader used by [`crate::wire`].
//!
//! Every multi-byte scalar on the wire is little-endian. `to_le_bytes`/`from_le_bytes`
//! are branch-free on little-endian hosts and perform the swap inline on big-endian
//! ones, so there is no separate byteswap pass to maintain here.

use std::io::{self, Read, Write};

use crate::error::{DataError, Error, Result};

/// Hard cap on string length, independent of `max_size`. Rejects pathological
/// input (e.g. a stream that never produces a nul byte) with `LongString`
/// rather than growing a buffer without bound.
pub(crate) const LONG_STRING_CAP: u64 = 0x8000_0000;

/// A `Read` wrapper that enforces a shrinking byte budget, the `max_size`
/// of the spec. Every read first checks the budget, then decrements it —
/// the same guard applies whether the shortfall comes from the caller's
/// declared budget or from the stream running out early, so both cases
/// surface as [`DataError::Confinement`].
pub(crate) struct BoundedReader<'a> {
    inner: &'a mut dyn Read,
    remaining: u64,
}

impl<'a> BoundedReader<'a> {
    pub(crate) fn new(inner: &'a mut dyn Read, max_size: u64) -> Self {
        BoundedReader {
            inner,
            remaining: max_size,
        }
    }

    pub(crate) fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Splits off a child reader confined to exactly `len` bytes of this
    /// reader's remaining budget, regardless of how much more the outer
    /// stream could still provide.
    pub(crate) fn confine(&mut self, len: u64) -> Result<BoundedReader<'_>> {
        self.take(len)?;
        Ok(BoundedReader {
            inner: &mut *self.inner,
            remaining: len,
        })
    }

    fn take(&mut self, needed: u64) -> Result<()> {
        if needed > self.remaining {
            return Err(DataError::Confinement.into());
        }
        self.remaining -= needed;
        Ok(())
    }

    fn read_exact_bounded(&mut self, buf: &mut [u8]) -> Result<()> {
        self.take(buf.len() as u64)?;
        self.inner.read_exact(buf).map_err(|err| {
            if err.kind() == io::ErrorKind::UnexpectedEof {
                Error::Data(DataError::Confinement)
            } else {
                Error::Io(err)
            }
        })
    }

    pub(crate) fn read_magic(&mut self) -> Result<[u8; 4]> {
        let mut buf = [0u8; 4];
        self.read_exact_bounded(&mut buf)?;
        Ok(buf)
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact_bounded(&mut buf)?;
        Ok(buf[0])
    }

    pub(crate) fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub(crate) fn read_u32_le(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact_bounded(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub(crate) fn read_i32_le(&mut self) -> Result<i32> {
        Ok(self.read_u32_le()? as i32)
    }

    pub(crate) fn read_i64_le(&mut self) -> Result<i64> {
        let mut buf = [0u8; 8];
        self.read_exact_bounded(&mut buf)?;
        Ok(i64::from_le_bytes(buf))
    }

    pub(crate) fn read_f64_le(&mut self) -> Result<f64> {
        let mut buf = [0u8; 8];
        self.read_exact_bounded(&mut buf)?;
        Ok(f64::from_le_bytes(buf))
    }

    /// Reads a nul-terminated byte string, bounded by both the remaining
    /// budget and [`LONG_STRING_CAP`]. No seeking: the stream may be a pipe.
    pub(crate) fn read_cstring(&mut self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        loop {
            let byte = self.read_u8()?;
            if byte == 0 {
                return Ok(buf);
            }
            if buf.len() as u64 >= LONG_STRING_CAP {
                return Err(DataError::LongString.into());
            }
            buf.push(byte);
        }
    }

    pub(crate) fn read_char_array(&mut self, len: u32) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len as usize];
        self.read_exact_bounded(&mut buf)?;
        Ok(buf)
    }

    pub(crate) fn read_i32_array(&mut self, len: u32) -> Result<Vec<i32>> {
        let byte_len = array_byte_len(4, len);
        let mut raw = vec![0u8; byte_len as usize];
        self.read_exact_bounded(&mut raw)?;
        Ok(raw
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes(c.try_into().unwrap()))
            .collect())
    }

    pub(crate) fn read_i64_array(&mut self, len: u32) -> Result<Vec<i64>> {
        let byte_len = array_byte_len(8, len);
        let mut raw = vec![0u8; byte_len as usize];
        self.read_exact_bounded(&mut raw)?;
        Ok(raw
            .chunks_exact(8)
            .map(|c| i64::from_le_bytes(c.try_into().unwrap()))
            .collect())
    }

    pub(crate) fn read_f64_array(&mut self, len: u32) -> Result<Vec<f64>> {
        let byte_len = array_byte_len(8, len);
        let mut raw = vec![0u8; byte_len as usize];
        self.read_exact_bounded(&mut raw)?;
        Ok(raw
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
            .collect())
    }
}

/// Exact byte length of a fixed-element array, computed in `u64` so it
/// cannot overflow the way the original `0xffffffff/itemsize >= nitems`
/// approximation could on its native 32-bit arithmetic.
pub(crate) fn array_byte_len(element_size: u64, count: u32) -> u64 {
    element_size
        .checked_mul(u64::from(count))
        .expect("array byte length fits in u64")
}

pub(crate) fn write_u8(w: &mut dyn Write, v: u8) -> io::Result<()> {
    w.write_all(&[v])
}

pub(crate) fn write_bool(w: &mut dyn Write, v: bool) -> io::Result<()> {
    write_u8(w, v as u8)
}

pub(crate) fn write_u32_le(w: &mut dyn Write, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub(crate) fn write_i32_le(w: &mut dyn Write, v: i32) -> io::Result<()> {
    write_u32_le(w, v as u32)
}

pub(crate) fn write_i64_le(w: &mut dyn Write, v: i64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub(crate) fn write_f64_le(w: &mut dyn Write, v: f64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub(crate) fn write_cstring(w: &mut dyn Write, name: &[u8]) -> io::Result<()> {
    w.write_all(name)?;
    write_u8(w, 0)
}

pub(crate) fn write_i32_array(w: &mut dyn Write, values: &[i32]) -> io::Result<()> {
    for v in values {
        write_i32_le(w, *v)?;
    }
    Ok(())
}

pub(crate) fn write_i64_array(w: &mut dyn Write, values: &[i64]) -> io::Result<()> {
    for v in values {
        write_i64_le(w, *v)?;
    }
    Ok(())
}

pub(crate) fn write_f64_array(w: &mut dyn Write, values: &[f64]) -> io::Result<()> {
    for v in values {
        write_f64_le(w, *v)?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_bounded_reader_confinement() {
        let data = [1u8, 2, 3];
        let mut cursor = &data[..];
        let mut reader = BoundedReader::new(&mut cursor, 2);
        assert_eq!(reader.read_u8().unwrap(), 1);
        assert_eq!(reader.read_u8().unwrap(), 2);
        let err = reader.read_u8().unwrap_err();
        assert!(matches!(err, Error::Data(DataError::Confinement)));
    }

    #[test]
    fn test_bounded_reader_eof_is_confinement() {
        let data = [1u8];
        let mut cursor = &data[..];
        // max_size claims 4 bytes are available, but the stream only has 1.
        let mut reader = BoundedReader::new(&mut cursor, 4);
        assert_eq!(reader.read_u8().unwrap(), 1);
        let err = reader.read_u8().unwrap_err();
        assert!(matches!(err, Error::Data(DataError::Confinement)));
    }

    #[test]
    fn test_read_cstring() {
        let data = b"hi\0rest";
        let mut cursor = &data[..];
        let mut reader = BoundedReader::new(&mut cursor, data.len() as u64);
        assert_eq!(reader.read_cstring().unwrap(), b"hi");
    }

    #[test]
    fn test_confine_is_independent_of_outer_budget() {
        let data = [0u8; 16];
        let mut cursor = &data[..];
        let mut reader = BoundedReader::new(&mut cursor, 16);
        {
            let mut child = reader.confine(4).unwrap();
            assert_eq!(child.remaining(), 4);
            child.read_u32_le().unwrap();
            let err = child.read_u8().unwrap_err();
            assert!(matches!(err, Error::Data(DataError::Confinement)));
        }
        assert_eq!(reader.remaining(), 12);
    }

    #[test]
    fn test_array_byte_len_does_not_overflow() {
        assert_eq!(array_byte_len(8, u32::MAX), 8 * u64::from(u32::MAX));
    }
}
