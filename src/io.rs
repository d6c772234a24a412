//! Endian-aware cursor over a growable in-memory buffer.
//!
//! STFS packages mix byte orders: most header fields are big-endian while
//! the volume descriptor's file table fields and the file table records
//! themselves carry little-endian values. The cursor keeps an explicit
//! current byte order, and the 24-bit accessors additionally take a
//! per-call override so callers never have to juggle mode flips around a
//! single field.

use crate::error::{Result, StfsError};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::path::Path;

/// Byte order for multi-byte reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}

/// Growable byte buffer with a cursor and a current byte order.
pub struct ByteCursor {
    buf: Vec<u8>,
    pos: usize,
    order: Endian,
}

impl ByteCursor {
    /// Wrap an existing buffer. The cursor starts at 0 in big-endian mode.
    pub fn new(buf: Vec<u8>) -> Self {
        ByteCursor {
            buf,
            pos: 0,
            order: Endian::Big,
        }
    }

    /// A zero-filled buffer of `len` bytes.
    pub fn zeroed(len: usize) -> Self {
        Self::new(vec![0u8; len])
    }

    /// Load a whole file into a cursor.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(std::fs::read(path)?))
    }

    /// Write the whole buffer out to `path`.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, &self.buf)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn position(&self) -> u64 {
        self.pos as u64
    }

    pub fn seek(&mut self, pos: u64) {
        self.pos = pos as usize;
    }

    pub fn endian(&self) -> Endian {
        self.order
    }

    pub fn set_endian(&mut self, order: Endian) {
        self.order = order;
    }

    pub fn swap_endian(&mut self) {
        self.order = match self.order {
            Endian::Big => Endian::Little,
            Endian::Little => Endian::Big,
        };
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    /// Grow the buffer by `additional` zero bytes. The cursor is unchanged.
    pub fn extend(&mut self, additional: usize) {
        let new_len = self.buf.len() + additional;
        self.buf.resize(new_len, 0);
    }

    fn take(&mut self, len: usize) -> Result<&[u8]> {
        let start = self.pos;
        let end = start.checked_add(len).ok_or(StfsError::UnexpectedEof {
            offset: start,
            wanted: len,
        })?;
        if end > self.buf.len() {
            return Err(StfsError::UnexpectedEof {
                offset: start,
                wanted: len,
            });
        }
        self.pos = end;
        Ok(&self.buf[start..end])
    }

    fn take_mut(&mut self, len: usize) -> Result<&mut [u8]> {
        let start = self.pos;
        let end = start.checked_add(len).ok_or(StfsError::UnexpectedEof {
            offset: start,
            wanted: len,
        })?;
        if end > self.buf.len() {
            return Err(StfsError::UnexpectedEof {
                offset: start,
                wanted: len,
            });
        }
        self.pos = end;
        Ok(&mut self.buf[start..end])
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let order = self.order;
        let b = self.take(2)?;
        Ok(match order {
            Endian::Big => BigEndian::read_u16(b),
            Endian::Little => LittleEndian::read_u16(b),
        })
    }

    pub fn read_u24(&mut self) -> Result<u32> {
        self.read_u24_as(self.order)
    }

    pub fn read_u24_as(&mut self, order: Endian) -> Result<u32> {
        let b = self.take(3)?;
        Ok(match order {
            Endian::Big => BigEndian::read_u24(b),
            Endian::Little => LittleEndian::read_u24(b),
        })
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let order = self.order;
        let b = self.take(4)?;
        Ok(match order {
            Endian::Big => BigEndian::read_u32(b),
            Endian::Little => LittleEndian::read_u32(b),
        })
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let order = self.order;
        let b = self.take(8)?;
        Ok(match order {
            Endian::Big => BigEndian::read_u64(b),
            Endian::Little => LittleEndian::read_u64(b),
        })
    }

    /// Read an unsigned value of 1, 2 or 4 bytes in the current byte order.
    pub fn read_multi_byte(&mut self, size: usize) -> Result<u32> {
        match size {
            1 => Ok(self.read_u8()? as u32),
            2 => Ok(self.read_u16()? as u32),
            4 => self.read_u32(),
            other => Err(StfsError::MultiByteSize(other)),
        }
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        Ok(self.take(len)?.to_vec())
    }

    pub fn read_exact(&mut self, out: &mut [u8]) -> Result<()> {
        let b = self.take(out.len())?;
        out.copy_from_slice(b);
        Ok(())
    }

    /// Read a fixed-width NUL-padded ASCII field. The cursor always
    /// advances by `len` bytes; the returned string stops at the first NUL.
    pub fn read_fixed_string(&mut self, len: usize) -> Result<String> {
        let b = self.take(len)?;
        let end = b.iter().position(|&c| c == 0).unwrap_or(len);
        Ok(String::from_utf8_lossy(&b[..end]).into_owned())
    }

    /// Read a fixed-width NUL-padded UTF-16 field of `units` code units in
    /// the current byte order. The cursor always advances by `units * 2`.
    pub fn read_fixed_utf16(&mut self, units: usize) -> Result<String> {
        let order = self.order;
        let b = self.take(units * 2)?;
        let mut code_units = Vec::with_capacity(units);
        for chunk in b.chunks_exact(2) {
            let u = match order {
                Endian::Big => BigEndian::read_u16(chunk),
                Endian::Little => LittleEndian::read_u16(chunk),
            };
            if u == 0 {
                break;
            }
            code_units.push(u);
        }
        Ok(String::from_utf16_lossy(&code_units))
    }

    pub fn write_u8(&mut self, v: u8) -> Result<()> {
        self.take_mut(1)?[0] = v;
        Ok(())
    }

    pub fn write_u16(&mut self, v: u16) -> Result<()> {
        let order = self.order;
        let b = self.take_mut(2)?;
        match order {
            Endian::Big => BigEndian::write_u16(b, v),
            Endian::Little => LittleEndian::write_u16(b, v),
        }
        Ok(())
    }

    pub fn write_u24(&mut self, v: u32) -> Result<()> {
        self.write_u24_as(v, self.order)
    }

    pub fn write_u24_as(&mut self, v: u32, order: Endian) -> Result<()> {
        let b = self.take_mut(3)?;
        match order {
            Endian::Big => BigEndian::write_u24(b, v),
            Endian::Little => LittleEndian::write_u24(b, v),
        }
        Ok(())
    }

    pub fn write_u32(&mut self, v: u32) -> Result<()> {
        let order = self.order;
        let b = self.take_mut(4)?;
        match order {
            Endian::Big => BigEndian::write_u32(b, v),
            Endian::Little => LittleEndian::write_u32(b, v),
        }
        Ok(())
    }

    pub fn write_u64(&mut self, v: u64) -> Result<()> {
        let order = self.order;
        let b = self.take_mut(8)?;
        match order {
            Endian::Big => BigEndian::write_u64(b, v),
            Endian::Little => LittleEndian::write_u64(b, v),
        }
        Ok(())
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.take_mut(data.len())?.copy_from_slice(data);
        Ok(())
    }

    /// Write a fixed-width ASCII field, truncating or NUL-padding to `len`.
    pub fn write_fixed_string(&mut self, s: &str, len: usize) -> Result<()> {
        let b = self.take_mut(len)?;
        b.fill(0);
        let bytes = s.as_bytes();
        let n = bytes.len().min(len);
        b[..n].copy_from_slice(&bytes[..n]);
        Ok(())
    }

    /// Write a fixed-width UTF-16 field of `units` code units in the
    /// current byte order, truncating or NUL-padding as needed.
    pub fn write_fixed_utf16(&mut self, s: &str, units: usize) -> Result<()> {
        let order = self.order;
        let b = self.take_mut(units * 2)?;
        b.fill(0);
        for (i, u) in s.encode_utf16().take(units).enumerate() {
            let chunk = &mut b[i * 2..i * 2 + 2];
            match order {
                Endian::Big => BigEndian::write_u16(chunk, u),
                Endian::Little => LittleEndian::write_u16(chunk, u),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_scalar_round_trips() {
        let mut io = ByteCursor::zeroed(32);
        io.write_u8(0xAB).unwrap();
        io.write_u16(0x1234).unwrap();
        io.write_u32(0xDEADBEEF).unwrap();
        io.write_u64(0x0123456789ABCDEF).unwrap();

        io.seek(0);
        assert_eq!(io.read_u8().unwrap(), 0xAB);
        assert_eq!(io.read_u16().unwrap(), 0x1234);
        assert_eq!(io.read_u32().unwrap(), 0xDEADBEEF);
        assert_eq!(io.read_u64().unwrap(), 0x0123456789ABCDEF);
    }

    #[test]
    fn test_endian_modes() {
        let mut io = ByteCursor::zeroed(8);
        io.write_u32(0x11223344).unwrap();
        io.set_endian(Endian::Little);
        io.write_u32(0x11223344).unwrap();

        assert_eq!(&io.as_slice()[..4], &[0x11, 0x22, 0x33, 0x44]);
        assert_eq!(&io.as_slice()[4..], &[0x44, 0x33, 0x22, 0x11]);

        io.swap_endian();
        assert_eq!(io.endian(), Endian::Big);
    }

    #[test]
    fn test_u24_with_override() {
        let mut io = ByteCursor::zeroed(6);
        io.write_u24(0xABCDEF).unwrap();
        io.write_u24_as(0xABCDEF, Endian::Little).unwrap();

        assert_eq!(&io.as_slice()[..3], &[0xAB, 0xCD, 0xEF]);
        assert_eq!(&io.as_slice()[3..], &[0xEF, 0xCD, 0xAB]);

        io.seek(0);
        assert_eq!(io.read_u24().unwrap(), 0xABCDEF);
        assert_eq!(io.read_u24_as(Endian::Little).unwrap(), 0xABCDEF);
    }

    #[test]
    fn test_fixed_strings_pad_and_truncate() {
        let mut io = ByteCursor::zeroed(0x28);
        io.write_fixed_string("save.dat", 0x28).unwrap();
        io.seek(0);
        assert_eq!(io.read_fixed_string(0x28).unwrap(), "save.dat");
        assert_eq!(io.position(), 0x28);
    }

    #[test]
    fn test_fixed_utf16_round_trip() {
        let mut io = ByteCursor::zeroed(0x80 * 2);
        io.write_fixed_utf16("Halo 3 Save", 0x80).unwrap();
        io.seek(0);
        assert_eq!(io.read_fixed_utf16(0x80).unwrap(), "Halo 3 Save");
        assert_eq!(io.position(), 0x100);
    }

    #[test]
    fn test_multi_byte_sizes() {
        let mut io = ByteCursor::new(vec![0x12, 0x34, 0x56, 0x78]);
        assert_eq!(io.read_multi_byte(2).unwrap(), 0x1234);
        io.seek(0);
        assert_eq!(io.read_multi_byte(4).unwrap(), 0x12345678);
        io.seek(0);
        assert!(matches!(
            io.read_multi_byte(3),
            Err(StfsError::MultiByteSize(3))
        ));
    }

    #[test]
    fn test_out_of_bounds_read() {
        let mut io = ByteCursor::zeroed(2);
        io.seek(1);
        assert!(matches!(
            io.read_u32(),
            Err(StfsError::UnexpectedEof { offset: 1, wanted: 4 })
        ));
    }

    #[test]
    fn test_extend_preserves_contents() {
        let mut io = ByteCursor::new(vec![1, 2, 3]);
        io.extend(0x1000);
        assert_eq!(io.len(), 0x1003);
        assert_eq!(&io.as_slice()[..3], &[1, 2, 3]);
    }

    #[test]
    fn test_file_round_trip() {
        let temp = NamedTempFile::new().unwrap();
        let mut io = ByteCursor::zeroed(16);
        io.write_u32(0x434F4E20).unwrap();
        io.save_to(temp.path()).unwrap();

        let mut loaded = ByteCursor::from_file(temp.path()).unwrap();
        assert_eq!(loaded.read_u32().unwrap(), 0x434F4E20);
    }
}
