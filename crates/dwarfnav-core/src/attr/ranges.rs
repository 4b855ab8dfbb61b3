//! Address range lists (`DW_AT_ranges`).
//!
//! DWARF 2-4 store them in `.debug_ranges` as address pairs; DWARF 5 uses
//! the tagged entries of `.debug_rnglists`. Both decode into the same
//! [`RangeList`].

use std::fmt;

use gimli::{DwRle, Encoding, RunTimeEndian};

use crate::error::{DwarfError, DwarfResult};
use crate::reader::ByteCursor;
use crate::types::Address;

/// Half-open address range `[begin, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AddressRange
{
    pub begin: Address,
    pub end: Address,
}

impl AddressRange
{
    pub const fn new(begin: Address, end: Address) -> Self
    {
        Self { begin, end }
    }

    /// The range that every address falls into
    pub const fn everything() -> Self
    {
        Self {
            begin: Address::ZERO,
            end: Address::MAX,
        }
    }

    pub fn contains(&self, address: Address) -> bool
    {
        self.begin <= address && (address < self.end || self.end == Address::MAX)
    }

    pub fn is_empty(&self) -> bool
    {
        self.begin >= self.end
    }
}

impl fmt::Display for AddressRange
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "[0x{:x}, 0x{:x})", self.begin.value(), self.end.value())
    }
}

/// A decoded range list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeList
{
    ranges: Vec<AddressRange>,
}

impl RangeList
{
    pub fn new(ranges: Vec<AddressRange>) -> Self
    {
        Self { ranges }
    }

    pub fn ranges(&self) -> impl Iterator<Item = &AddressRange> + '_
    {
        self.ranges.iter()
    }

    pub fn len(&self) -> usize
    {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.ranges.is_empty()
    }

    /// Whether any range of the list contains `address`
    pub fn contains(&self, address: Address) -> bool
    {
        self.ranges.iter().any(|range| range.contains(address))
    }

    /// Index of the first range containing `address`
    pub fn find(&self, address: Address) -> Option<usize>
    {
        self.ranges.iter().position(|range| range.contains(address))
    }
}

impl fmt::Display for RangeList
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "ranges{{")?;
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{range}")?;
        }
        write!(f, "}}")
    }
}

/// Decode a `.debug_ranges` list at `offset`.
///
/// `base` is the unit's base address (its `DW_AT_low_pc`); a pair whose
/// first word is all-ones replaces it.
pub fn decode_debug_ranges(
    section: &[u8],
    endian: RunTimeEndian,
    offset: u64,
    encoding: Encoding,
    mut base: u64,
) -> DwarfResult<RangeList>
{
    let mut cursor = ByteCursor::at(section, endian, offset, ".debug_ranges")?;
    let max = Address::MAX.truncate(encoding.address_size).value();
    let mut ranges = Vec::new();
    loop {
        let begin = cursor.read_address(encoding.address_size)?;
        let end = cursor.read_address(encoding.address_size)?;
        if begin == 0 && end == 0 {
            break;
        }
        if begin == max {
            base = end;
            continue;
        }
        ranges.push(AddressRange::new(
            Address::new(base.wrapping_add(begin)),
            Address::new(base.wrapping_add(end)),
        ));
    }
    Ok(RangeList { ranges })
}

/// Decode a `.debug_rnglists` list at `offset`.
///
/// `addrx` resolves `.debug_addr` indices for the `*x` entry kinds.
pub fn decode_rnglists(
    section: &[u8],
    endian: RunTimeEndian,
    offset: u64,
    encoding: Encoding,
    mut base: u64,
    addrx: &dyn Fn(u64) -> DwarfResult<u64>,
) -> DwarfResult<RangeList>
{
    let mut cursor = ByteCursor::at(section, endian, offset, ".debug_rnglists")?;
    let mut ranges = Vec::new();
    loop {
        let entry_offset = cursor.position();
        let kind = DwRle(cursor.read_u8()?);
        let (begin, end) = match kind {
            gimli::DW_RLE_end_of_list => break,
            gimli::DW_RLE_base_addressx => {
                base = addrx(cursor.read_uleb128()?)?;
                continue;
            }
            gimli::DW_RLE_base_address => {
                base = cursor.read_address(encoding.address_size)?;
                continue;
            }
            gimli::DW_RLE_startx_endx => (addrx(cursor.read_uleb128()?)?, addrx(cursor.read_uleb128()?)?),
            gimli::DW_RLE_startx_length => {
                let begin = addrx(cursor.read_uleb128()?)?;
                (begin, begin.wrapping_add(cursor.read_uleb128()?))
            }
            gimli::DW_RLE_offset_pair => {
                let begin = cursor.read_uleb128()?;
                let end = cursor.read_uleb128()?;
                (base.wrapping_add(begin), base.wrapping_add(end))
            }
            gimli::DW_RLE_start_end => (
                cursor.read_address(encoding.address_size)?,
                cursor.read_address(encoding.address_size)?,
            ),
            gimli::DW_RLE_start_length => {
                let begin = cursor.read_address(encoding.address_size)?;
                (begin, begin.wrapping_add(cursor.read_uleb128()?))
            }
            other => {
                return Err(DwarfError::malformed(entry_offset, format!("unknown range list entry {other}")));
            }
        };
        ranges.push(AddressRange::new(Address::new(begin), Address::new(end)));
    }
    Ok(RangeList { ranges })
}

#[cfg(test)]
mod tests
{
    use gimli::Format;

    use super::*;

    const ENCODING: Encoding = Encoding {
        address_size: 4,
        format: Format::Dwarf32,
        version: 4,
    };

    fn words(values: &[u32]) -> Vec<u8>
    {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_debug_ranges_with_base_selection()
    {
        let data = words(&[0x10, 0x20, u32::MAX, 0x1000, 0x0, 0x8, 0, 0]);
        let list = decode_debug_ranges(&data, RunTimeEndian::Little, 0, ENCODING, 0x400).unwrap();
        assert_eq!(list.len(), 2);
        assert!(list.contains(Address::new(0x415)));
        assert!(!list.contains(Address::new(0x420)));
        assert!(list.contains(Address::new(0x1004)));
        assert_eq!(list.find(Address::new(0x1004)), Some(1));
    }

    #[test]
    fn test_rnglists_offset_pair_and_start_length()
    {
        let mut data = vec![gimli::DW_RLE_base_address.0];
        data.extend_from_slice(&0x2000u32.to_le_bytes());
        data.extend_from_slice(&[gimli::DW_RLE_offset_pair.0, 0x04, 0x08]);
        data.push(gimli::DW_RLE_start_length.0);
        data.extend_from_slice(&0x3000u32.to_le_bytes());
        data.push(0x10);
        data.push(gimli::DW_RLE_end_of_list.0);

        let no_addr = |_: u64| -> DwarfResult<u64> { Err(DwarfError::Unsupported("addrx".into())) };
        let v5 = Encoding { version: 5, ..ENCODING };
        let list = decode_rnglists(&data, RunTimeEndian::Little, 0, v5, 0, &no_addr).unwrap();
        let ranges: Vec<_> = list.ranges().copied().collect();
        assert_eq!(
            ranges,
            vec![
                AddressRange::new(Address::new(0x2004), Address::new(0x2008)),
                AddressRange::new(Address::new(0x3000), Address::new(0x3010)),
            ]
        );
    }

    #[test]
    fn test_unterminated_list_is_error()
    {
        let data = words(&[0x10, 0x20]);
        assert!(decode_debug_ranges(&data, RunTimeEndian::Little, 0, ENCODING, 0).is_err());
    }
}
