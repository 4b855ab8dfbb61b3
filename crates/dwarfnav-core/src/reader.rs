//! # Byte Cursor
//!
//! Bounds-checked reads over an immutable section slice.
//!
//! Every decoder in this crate is built on [`ByteCursor`]: fixed-width
//! integers in the section's byte order, ULEB128/SLEB128, NUL-terminated
//! strings, the DWARF "initial length" field and section offsets whose width
//! depends on the 32/64-bit DWARF format.
//!
//! Errors always report the absolute offset in the section where the failed
//! read started, never the offset of the cursor after a partial read.
//!
//! ## References
//!
//! - [DWARF 5, section 7.6: Variable Length Data](https://dwarfstd.org/doc/DWARF5.pdf#page=221)
//! - [DWARF 5, section 7.4: 32-Bit and 64-Bit DWARF Formats](https://dwarfstd.org/doc/DWARF5.pdf#page=218)

use gimli::{Endianity, Format, RunTimeEndian};

use crate::error::{DwarfError, DwarfResult};

/// Cursor over a byte slice with a known byte order.
///
/// Cloning a cursor is cheap and gives an independent read position, which is
/// how look-ahead reads (for example peeking an abbreviation code) are done.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a>
{
    data: &'a [u8],
    pos: usize,
    endian: RunTimeEndian,
}

impl<'a> ByteCursor<'a>
{
    pub const fn new(data: &'a [u8], endian: RunTimeEndian) -> Self
    {
        Self { data, pos: 0, endian }
    }

    /// Create a cursor positioned at `offset`.
    ///
    /// ## Errors
    ///
    /// Returns `OffsetOutOfRange` if `offset` is past the end of `data`.
    pub fn at(data: &'a [u8], endian: RunTimeEndian, offset: u64, section: &'static str) -> DwarfResult<Self>
    {
        let mut cursor = Self::new(data, endian);
        cursor.seek(offset, section)?;
        Ok(cursor)
    }

    pub const fn endian(&self) -> RunTimeEndian
    {
        self.endian
    }

    /// Absolute offset of the next byte to be read
    pub const fn position(&self) -> u64
    {
        self.pos as u64
    }

    /// Move to an absolute offset. Seeking to exactly the end is allowed.
    pub fn seek(&mut self, offset: u64, section: &'static str) -> DwarfResult<()>
    {
        match usize::try_from(offset) {
            Ok(pos) if pos <= self.data.len() => {
                self.pos = pos;
                Ok(())
            }
            _ => Err(DwarfError::OffsetOutOfRange { offset, section }),
        }
    }

    pub const fn remaining(&self) -> usize
    {
        self.data.len() - self.pos
    }

    pub const fn is_empty(&self) -> bool
    {
        self.pos >= self.data.len()
    }

    /// Borrow the full underlying slice
    pub const fn data(&self) -> &'a [u8]
    {
        self.data
    }

    pub fn skip(&mut self, len: u64) -> DwarfResult<()>
    {
        self.read_bytes(len).map(|_| ())
    }

    /// Read `len` raw bytes, borrowing from the section
    pub fn read_bytes(&mut self, len: u64) -> DwarfResult<&'a [u8]>
    {
        let start = self.pos;
        let end = usize::try_from(len)
            .ok()
            .and_then(|len| start.checked_add(len))
            .filter(|end| *end <= self.data.len())
            .ok_or(DwarfError::UnexpectedEof { offset: start as u64 })?;
        self.pos = end;
        Ok(&self.data[start..end])
    }

    fn read_array<const N: usize>(&mut self) -> DwarfResult<[u8; N]>
    {
        let bytes = self.read_bytes(N as u64)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> DwarfResult<u8>
    {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_i8(&mut self) -> DwarfResult<i8>
    {
        Ok(i8::from_ne_bytes(self.read_array::<1>()?))
    }

    pub fn read_u16(&mut self) -> DwarfResult<u16>
    {
        let bytes = self.read_array::<2>()?;
        Ok(self.endian.read_u16(&bytes))
    }

    pub fn read_i16(&mut self) -> DwarfResult<i16>
    {
        let bytes = self.read_array::<2>()?;
        Ok(self.endian.read_i16(&bytes))
    }

    pub fn read_u32(&mut self) -> DwarfResult<u32>
    {
        let bytes = self.read_array::<4>()?;
        Ok(self.endian.read_u32(&bytes))
    }

    pub fn read_i32(&mut self) -> DwarfResult<i32>
    {
        let bytes = self.read_array::<4>()?;
        Ok(self.endian.read_i32(&bytes))
    }

    pub fn read_u64(&mut self) -> DwarfResult<u64>
    {
        let bytes = self.read_array::<8>()?;
        Ok(self.endian.read_u64(&bytes))
    }

    pub fn read_i64(&mut self) -> DwarfResult<i64>
    {
        let bytes = self.read_array::<8>()?;
        Ok(self.endian.read_i64(&bytes))
    }

    /// Read an unsigned LEB128 value.
    ///
    /// ## Errors
    ///
    /// `UnexpectedEof` if the sequence is unterminated, `BadLeb128` if it
    /// encodes more than 64 significant bits.
    pub fn read_uleb128(&mut self) -> DwarfResult<u64>
    {
        let start = self.position();
        let mut result: u64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8().map_err(|_| DwarfError::UnexpectedEof { offset: start })?;
            let low = u64::from(byte & 0x7f);
            if shift == 63 && low > 1 || shift > 63 && low != 0 {
                return Err(DwarfError::BadLeb128 { offset: start });
            }
            if shift < 64 {
                result |= low << shift;
            }
            shift += 7;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
    }

    /// Read a signed LEB128 value.
    pub fn read_sleb128(&mut self) -> DwarfResult<i64>
    {
        let start = self.position();
        let mut result: i64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8().map_err(|_| DwarfError::UnexpectedEof { offset: start })?;
            if shift == 63 && byte != 0 && byte != 0x7f || shift > 63 {
                return Err(DwarfError::BadLeb128 { offset: start });
            }
            result |= i64::from(byte & 0x7f) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                if shift < 64 && byte & 0x40 != 0 {
                    result |= -1i64 << shift;
                }
                return Ok(result);
            }
        }
    }

    /// Read a target address of `size` bytes (1, 2, 4 or 8).
    pub fn read_address(&mut self, size: u8) -> DwarfResult<u64>
    {
        match size {
            1 => self.read_u8().map(u64::from),
            2 => self.read_u16().map(u64::from),
            4 => self.read_u32().map(u64::from),
            8 => self.read_u64(),
            other => Err(DwarfError::malformed(self.position(), format!("unsupported address size {other}"))),
        }
    }

    /// Read an unsigned integer of `size` bytes (1, 2, 4 or 8)
    pub fn read_sized(&mut self, size: u8) -> DwarfResult<u64>
    {
        self.read_address(size)
    }

    /// Read a section offset whose width is given by the DWARF format
    pub fn read_offset(&mut self, format: Format) -> DwarfResult<u64>
    {
        match format {
            Format::Dwarf32 => self.read_u32().map(u64::from),
            Format::Dwarf64 => self.read_u64(),
        }
    }

    /// Read a unit or entry "initial length".
    ///
    /// `0xffffffff` introduces the 64-bit format with an 8-byte length;
    /// `0xfffffff0..=0xfffffffe` are reserved and rejected.
    pub fn read_initial_length(&mut self) -> DwarfResult<(u64, Format)>
    {
        let start = self.position();
        let first = self.read_u32()?;
        match first {
            0xffff_ffff => Ok((self.read_u64()?, Format::Dwarf64)),
            0xffff_fff0..=0xffff_fffe => {
                Err(DwarfError::malformed(start, format!("reserved initial length 0x{first:x}")))
            }
            length => Ok((u64::from(length), Format::Dwarf32)),
        }
    }

    /// Read a NUL-terminated string, returning the bytes without the terminator
    pub fn read_cstr(&mut self) -> DwarfResult<&'a [u8]>
    {
        let start = self.pos;
        let rest = &self.data[start..];
        let nul = rest
            .iter()
            .position(|b| *b == 0)
            .ok_or(DwarfError::UnexpectedEof { offset: start as u64 })?;
        self.pos = start + nul + 1;
        Ok(&rest[..nul])
    }

    /// Narrow the cursor to the next `len` bytes, advancing past them.
    ///
    /// The returned cursor keeps absolute positions so that errors inside a
    /// sub-range still report section offsets.
    pub fn split(&mut self, len: u64) -> DwarfResult<ByteCursor<'a>>
    {
        let start = self.pos;
        self.read_bytes(len)?;
        Ok(ByteCursor {
            data: &self.data[..self.pos],
            pos: start,
            endian: self.endian,
        })
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_uleb128_multi_byte()
    {
        let data = [0xe5, 0x8e, 0x26];
        let mut cursor = ByteCursor::new(&data, RunTimeEndian::Little);
        assert_eq!(cursor.read_uleb128().unwrap(), 624_485);
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_sleb128_negative()
    {
        let data = [0x7f, 0x80, 0x7f, 0xc0, 0xbb, 0x78];
        let mut cursor = ByteCursor::new(&data, RunTimeEndian::Little);
        assert_eq!(cursor.read_sleb128().unwrap(), -1);
        assert_eq!(cursor.read_sleb128().unwrap(), -128);
        assert_eq!(cursor.read_sleb128().unwrap(), -123_456);
    }

    #[test]
    fn test_uleb128_overflow_rejected()
    {
        let data = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x7f];
        let mut cursor = ByteCursor::new(&data, RunTimeEndian::Little);
        assert!(matches!(cursor.read_uleb128(), Err(DwarfError::BadLeb128 { offset: 0 })));
    }

    #[test]
    fn test_uleb128_max_value()
    {
        let data = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01];
        let mut cursor = ByteCursor::new(&data, RunTimeEndian::Little);
        assert_eq!(cursor.read_uleb128().unwrap(), u64::MAX);
    }

    #[test]
    fn test_big_endian_reads()
    {
        let data = [0x12, 0x34, 0x00, 0x00, 0x00, 0x2a];
        let mut cursor = ByteCursor::new(&data, RunTimeEndian::Big);
        assert_eq!(cursor.read_u16().unwrap(), 0x1234);
        assert_eq!(cursor.read_u32().unwrap(), 42);
    }

    #[test]
    fn test_truncated_read_reports_start()
    {
        let data = [0x01, 0x02, 0x03];
        let mut cursor = ByteCursor::new(&data, RunTimeEndian::Little);
        cursor.read_u8().unwrap();
        match cursor.read_u32() {
            Err(DwarfError::UnexpectedEof { offset }) => assert_eq!(offset, 1),
            other => panic!("expected EOF, got {other:?}"),
        }
        assert_eq!(cursor.position(), 1);
    }

    #[test]
    fn test_initial_length_formats()
    {
        let data = [0xff, 0xff, 0xff, 0xff, 0x10, 0, 0, 0, 0, 0, 0, 0];
        let mut cursor = ByteCursor::new(&data, RunTimeEndian::Little);
        assert_eq!(cursor.read_initial_length().unwrap(), (0x10, Format::Dwarf64));

        let reserved = [0xf0, 0xff, 0xff, 0xff];
        let mut cursor = ByteCursor::new(&reserved, RunTimeEndian::Little);
        assert!(cursor.read_initial_length().is_err());
    }

    #[test]
    fn test_cstr_and_split()
    {
        let data = b"abc\0rest";
        let mut cursor = ByteCursor::new(data, RunTimeEndian::Little);
        assert_eq!(cursor.read_cstr().unwrap(), b"abc");
        let mut sub = cursor.split(2).unwrap();
        assert_eq!(sub.position(), 4);
        assert_eq!(sub.read_u16().unwrap(), u16::from_le_bytes(*b"re"));
        assert!(sub.read_u8().is_err());
        assert_eq!(cursor.position(), 6);
    }
}
