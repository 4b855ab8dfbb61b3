//! Location lists.
//!
//! A location list maps PC ranges to the expression valid over them. Inline
//! expressions are represented as a one-entry list covering every address,
//! so callers treat all location attributes uniformly.

use std::fmt;

use gimli::{DwLle, Encoding, RunTimeEndian};

use super::op::LocExpr;
use crate::attr::AddressRange;
use crate::error::{DwarfError, DwarfResult};
use crate::reader::ByteCursor;
use crate::types::Address;

/// One `(PC range, expression)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocListEntry
{
    pub range: AddressRange,
    pub expr: LocExpr,
}

/// A decoded location list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocList
{
    entries: Vec<LocListEntry>,
}

impl LocList
{
    pub fn new(entries: Vec<LocListEntry>) -> Self
    {
        Self { entries }
    }

    /// A list whose single expression is valid everywhere
    pub fn universal(expr: LocExpr) -> Self
    {
        Self {
            entries: vec![LocListEntry {
                range: AddressRange::everything(),
                expr,
            }],
        }
    }

    pub fn entries(&self) -> &[LocListEntry]
    {
        &self.entries
    }

    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }

    /// Whether some entry is valid at every address
    pub fn covers_all(&self) -> bool
    {
        self.entries.iter().any(|entry| entry.range == AddressRange::everything())
    }

    /// Expression valid at `pc`, if any
    pub fn expr_for_pc(&self, pc: Address) -> Option<&LocExpr>
    {
        self.entries
            .iter()
            .find(|entry| entry.range.contains(pc))
            .map(|entry| &entry.expr)
    }

    /// Locate the piece holding byte `byte_offset` of the object at `pc`.
    ///
    /// Returns the piece's sub-expression, the object offset where the piece
    /// starts, and its size (`None` for an unpieced expression, which covers
    /// the whole object).
    pub fn piece_for_offset(&self, pc: Address, byte_offset: u64) -> Option<(LocExpr, u64, Option<u64>)>
    {
        let expr = self.expr_for_pc(pc)?;
        // start never passes byte_offset
        let mut start = 0u64;
        for (piece, size) in expr.pieces() {
            match size {
                None => return Some((piece, start, None)),
                Some(size) if byte_offset - start < size => return Some((piece, start, Some(size))),
                Some(size) => start += size,
            }
        }
        None
    }
}

impl fmt::Display for LocList
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        if let [only] = self.entries.as_slice() {
            if only.range == AddressRange::everything() {
                return write!(f, "{{{}}}", only.expr);
            }
        }
        write!(f, "loclist{{")?;
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", entry.range, entry.expr)?;
        }
        write!(f, "}}")
    }
}

/// Decode a `.debug_loc` list (DWARF 2-4) at `offset`.
///
/// `base` is the unit's base address; a begin word of all-ones selects a new
/// base from the end word. Each entry carries a 2-byte expression length.
pub fn decode_debug_loc(
    section: &[u8],
    endian: RunTimeEndian,
    offset: u64,
    encoding: Encoding,
    mut base: u64,
) -> DwarfResult<LocList>
{
    let mut cursor = ByteCursor::at(section, endian, offset, ".debug_loc")?;
    let max = Address::MAX.truncate(encoding.address_size).value();
    let mut entries = Vec::new();
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
        let len = cursor.read_u16()?;
        let bytes = cursor.read_bytes(u64::from(len))?;
        entries.push(LocListEntry {
            range: AddressRange::new(Address::new(base.wrapping_add(begin)), Address::new(base.wrapping_add(end))),
            expr: LocExpr::parse_endian(bytes, encoding, endian)?,
        });
    }
    Ok(LocList { entries })
}

/// Decode a `.debug_loclists` list (DWARF 5) at `offset`.
pub fn decode_loclists(
    section: &[u8],
    endian: RunTimeEndian,
    offset: u64,
    encoding: Encoding,
    mut base: u64,
    addrx: &dyn Fn(u64) -> DwarfResult<u64>,
) -> DwarfResult<LocList>
{
    let mut cursor = ByteCursor::at(section, endian, offset, ".debug_loclists")?;
    let mut entries = Vec::new();
    loop {
        let entry_offset = cursor.position();
        let kind = DwLle(cursor.read_u8()?);
        let range = match kind {
            gimli::DW_LLE_end_of_list => break,
            gimli::DW_LLE_base_addressx => {
                base = addrx(cursor.read_uleb128()?)?;
                continue;
            }
            gimli::DW_LLE_base_address => {
                base = cursor.read_address(encoding.address_size)?;
                continue;
            }
            gimli::DW_LLE_startx_endx => {
                let begin = addrx(cursor.read_uleb128()?)?;
                let end = addrx(cursor.read_uleb128()?)?;
                (begin, end)
            }
            gimli::DW_LLE_startx_length => {
                let begin = addrx(cursor.read_uleb128()?)?;
                (begin, begin.wrapping_add(cursor.read_uleb128()?))
            }
            gimli::DW_LLE_offset_pair => {
                let begin = cursor.read_uleb128()?;
                let end = cursor.read_uleb128()?;
                (base.wrapping_add(begin), base.wrapping_add(end))
            }
            gimli::DW_LLE_default_location => (0, u64::MAX),
            gimli::DW_LLE_start_end => (
                cursor.read_address(encoding.address_size)?,
                cursor.read_address(encoding.address_size)?,
            ),
            gimli::DW_LLE_start_length => {
                let begin = cursor.read_address(encoding.address_size)?;
                (begin, begin.wrapping_add(cursor.read_uleb128()?))
            }
            other => {
                return Err(DwarfError::malformed(entry_offset, format!("unknown location list entry {other}")));
            }
        };
        let len = cursor.read_uleb128()?;
        let bytes = cursor.read_bytes(len)?;
        entries.push(LocListEntry {
            range: AddressRange::new(Address::new(range.0), Address::new(range.1)),
            expr: LocExpr::parse_endian(bytes, encoding, endian)?,
        });
    }
    Ok(LocList { entries })
}
