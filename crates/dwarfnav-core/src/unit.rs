//! # Unit Headers
//!
//! Parsing of `.debug_info` unit headers into an explicit table.
//!
//! The table is computed once per [`DieGraph`](crate::graph::DieGraph) and
//! replaces any notion of "current unit" iteration state: every lookup asks
//! the table which unit contains a given offset.
//!
//! Header layout is resolved per unit because a single module may mix DWARF
//! versions:
//!
//! | Version | Layout after the initial length |
//! |---------|---------------------------------|
//! | 2-4     | version, abbrev offset, address size |
//! | 5       | version, unit type, address size, abbrev offset, type-specific fields |

use gimli::{DwUt, Encoding, Format, RunTimeEndian};
use tracing::debug;

use crate::error::{DwarfError, DwarfResult};
use crate::reader::ByteCursor;

/// Parsed header of one unit in `.debug_info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitHeader
{
    /// Offset of the header itself (start of the initial length)
    pub offset: u64,
    /// Unit length, excluding the initial-length field
    pub unit_length: u64,
    pub format: Format,
    pub version: u16,
    /// `DW_UT_compile` for pre-v5 units
    pub unit_type: DwUt,
    pub abbrev_offset: u64,
    pub address_size: u8,
    /// Type signature of type units and DWO id of skeleton/split units
    pub signature: Option<u64>,
    /// Unit-relative offset of the type DIE in type units
    pub type_offset: Option<u64>,
    /// Offset of the first DIE (the unit DIE)
    pub first_die_offset: u64,
    /// One past the last byte of this unit
    pub end_offset: u64,
}

impl UnitHeader
{
    /// Parse the header starting at `offset`.
    ///
    /// ## Errors
    ///
    /// - `UnexpectedEof` if the header or the unit it describes is truncated
    /// - `UnsupportedVersion` for versions outside 2..=5
    pub fn parse(debug_info: &[u8], endian: RunTimeEndian, offset: u64) -> DwarfResult<Self>
    {
        let mut cursor = ByteCursor::at(debug_info, endian, offset, ".debug_info")?;
        let (unit_length, format) = cursor.read_initial_length()?;
        let body_start = cursor.position();
        let end_offset = body_start
            .checked_add(unit_length)
            .filter(|end| *end <= debug_info.len() as u64)
            .ok_or(DwarfError::UnexpectedEof { offset })?;

        let version = cursor.read_u16()?;
        let (unit_type, address_size, abbrev_offset) = match version {
            2..=4 => {
                let abbrev_offset = cursor.read_offset(format)?;
                (gimli::DW_UT_compile, cursor.read_u8()?, abbrev_offset)
            }
            5 => {
                let unit_type = DwUt(cursor.read_u8()?);
                let address_size = cursor.read_u8()?;
                (unit_type, address_size, cursor.read_offset(format)?)
            }
            _ => return Err(DwarfError::UnsupportedVersion { version, offset }),
        };

        let mut signature = None;
        let mut type_offset = None;
        match unit_type {
            gimli::DW_UT_type | gimli::DW_UT_split_type => {
                signature = Some(cursor.read_u64()?);
                type_offset = Some(cursor.read_offset(format)?);
            }
            gimli::DW_UT_skeleton | gimli::DW_UT_split_compile => {
                signature = Some(cursor.read_u64()?);
            }
            gimli::DW_UT_compile | gimli::DW_UT_partial => {}
            other => {
                return Err(DwarfError::malformed(offset, format!("unknown unit type {other}")));
            }
        }

        let first_die_offset = cursor.position();
        if first_die_offset > end_offset {
            return Err(DwarfError::UnexpectedEof { offset });
        }

        Ok(Self {
            offset,
            unit_length,
            format,
            version,
            unit_type,
            abbrev_offset,
            address_size,
            signature,
            type_offset,
            first_die_offset,
            end_offset,
        })
    }

    /// Encoding parameters that attribute decoding needs
    pub const fn encoding(&self) -> Encoding
    {
        Encoding {
            address_size: self.address_size,
            format: self.format,
            version: self.version,
        }
    }

    /// Whether `offset` falls inside this unit's DIE area
    pub const fn contains(&self, offset: u64) -> bool
    {
        offset >= self.first_die_offset && offset < self.end_offset
    }
}

/// All unit headers of a `.debug_info` section, in offset order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitTable
{
    units: Vec<UnitHeader>,
}

impl UnitTable
{
    /// Parse every unit header in `debug_info`.
    ///
    /// ## Errors
    ///
    /// Fails at the first malformed header; the offset of that header is in the error.
    pub fn parse(debug_info: &[u8], endian: RunTimeEndian) -> DwarfResult<Self>
    {
        let mut units = Vec::new();
        let mut offset = 0u64;
        while offset < debug_info.len() as u64 {
            let header = UnitHeader::parse(debug_info, endian, offset)?;
            offset = header.end_offset;
            units.push(header);
        }
        debug!(count = units.len(), "parsed unit header table");
        Ok(Self { units })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, UnitHeader>
    {
        self.units.iter()
    }

    pub fn len(&self) -> usize
    {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.units.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&UnitHeader>
    {
        self.units.get(index)
    }

    /// Index of the unit whose DIE area contains `offset`
    pub fn index_containing(&self, offset: u64) -> Option<usize>
    {
        let idx = self.units.partition_point(|unit| unit.first_die_offset <= offset);
        let idx = idx.checked_sub(1)?;
        self.units[idx].contains(offset).then_some(idx)
    }

    pub fn unit_containing(&self, offset: u64) -> Option<&UnitHeader>
    {
        self.index_containing(offset).map(|idx| &self.units[idx])
    }

    /// Index of the unit whose first DIE is exactly `offset`
    pub fn index_of_unit_die(&self, offset: u64) -> Option<usize>
    {
        self.units.binary_search_by_key(&offset, |unit| unit.first_die_offset).ok()
    }
}

impl<'t> IntoIterator for &'t UnitTable
{
    type Item = &'t UnitHeader;
    type IntoIter = std::slice::Iter<'t, UnitHeader>;

    fn into_iter(self) -> Self::IntoIter
    {
        self.units.iter()
    }
}
