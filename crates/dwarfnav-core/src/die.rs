//! # DIE Decoding
//!
//! [`DieDecoder`] decodes single entries of one unit. It knows nothing about
//! caching or tree shape beyond what a single entry says: the graph layer in
//! [`crate::graph`] decides what to decode and what to keep.
//!
//! Three levels of work are offered, from cheapest to most expensive:
//!
//! - [`DieDecoder::entry_at`] reads the abbreviation code and skips the
//!   attribute bytes, yielding tag, children flag and where the entry ends
//! - [`DieDecoder::skip_subtree`] finds the end of an entry's whole subtree,
//!   jumping with `DW_AT_sibling` where the producer emitted it
//! - [`DieDecoder::decode`] builds a full [`Die`] payload

use std::fmt;
use std::rc::Rc;

use gimli::{DwAt, DwTag};

use crate::abbrev::AbbreviationTable;
use crate::attr::{skip_form, AttributeCodec, AttributeValue, FormValue};
use crate::error::{DwarfError, DwarfResult};
use crate::reader::ByteCursor;
use crate::sections::DwarfSections;
use crate::types::DieOffset;
use crate::unit::UnitHeader;

static NOT_PRESENT: AttributeValue = AttributeValue::NotPresent;

/// Decoded payload of one DIE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Die
{
    pub offset: DieOffset,
    pub tag: DwTag,
    /// 1 for unit DIEs, the virtual root being depth 0
    pub depth: usize,
    pub has_children: bool,
    /// Attributes in abbreviation order; keys are unique
    pub attrs: Vec<(DwAt, AttributeValue)>,
    /// Created by the graph rather than decoded from `.debug_info`
    pub synthetic: bool,
}

impl Die
{
    /// A synthetic DIE with no attributes
    pub fn synthetic(offset: DieOffset, tag: DwTag, depth: usize) -> Self
    {
        Self {
            offset,
            tag,
            depth,
            has_children: false,
            attrs: Vec::new(),
            synthetic: true,
        }
    }

    /// Value of `name`, or [`AttributeValue::NotPresent`]
    pub fn attr(&self, name: DwAt) -> &AttributeValue
    {
        self.attrs
            .iter()
            .find(|(at, _)| *at == name)
            .map_or(&NOT_PRESENT, |(_, value)| value)
    }

    pub fn has_attr(&self, name: DwAt) -> bool
    {
        self.attrs.iter().any(|(at, _)| *at == name)
    }

    /// `DW_AT_name` as a string
    pub fn name(&self) -> Option<&str>
    {
        self.attr(gimli::DW_AT_name).as_str()
    }

    /// Insert or replace an attribute, keeping keys unique
    pub(crate) fn set_attr(&mut self, name: DwAt, value: AttributeValue)
    {
        match self.attrs.iter_mut().find(|(at, _)| *at == name) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((name, value)),
        }
    }
}

impl fmt::Display for Die
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self.tag.static_string() {
            Some(name) => write!(f, "{} {name}", self.offset),
            None => write!(f, "{} DW_TAG_0x{:04x}", self.offset, self.tag.0),
        }
    }
}

/// What [`DieDecoder::entry_at`] found at an offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry
{
    /// A zero abbreviation code: the end of a sibling chain
    Null
    {
        /// Offset just past the null byte
        next: u64,
    },
    Die
    {
        tag: DwTag,
        has_children: bool,
        /// Offset just past this entry's own attributes (its first child, if any)
        end: u64,
        /// `DW_AT_sibling`, when the producer emitted one
        sibling: Option<u64>,
    },
}

/// Decoder for the entries of one unit.
#[derive(Debug, Clone)]
pub struct DieDecoder<'a>
{
    sections: DwarfSections<'a>,
    header: UnitHeader,
    abbrevs: Rc<AbbreviationTable>,
    codec: AttributeCodec<'a>,
}

impl<'a> DieDecoder<'a>
{
    /// Build a decoder for the unit described by `header`.
    ///
    /// ## Errors
    ///
    /// Storage-level errors from reading the unit DIE's base attributes.
    pub fn new(sections: DwarfSections<'a>, header: UnitHeader, abbrevs: Rc<AbbreviationTable>) -> DwarfResult<Self>
    {
        let codec = AttributeCodec::for_unit(sections, header, &abbrevs)?;
        Ok(Self {
            sections,
            header,
            abbrevs,
            codec,
        })
    }

    pub const fn header(&self) -> &UnitHeader
    {
        &self.header
    }

    pub const fn codec(&self) -> &AttributeCodec<'a>
    {
        &self.codec
    }

    fn cursor_at(&self, offset: u64) -> DwarfResult<ByteCursor<'a>>
    {
        if offset < self.header.first_die_offset || offset >= self.header.end_offset {
            return Err(DwarfError::UnexpectedEof { offset });
        }
        let unit_bytes = &self.sections.debug_info[..self.header.end_offset as usize];
        ByteCursor::at(unit_bytes, self.sections.endian, offset, ".debug_info")
    }

    /// Read the abbreviation at `offset` and skip its attributes.
    ///
    /// ## Errors
    ///
    /// - `UnexpectedEof` when `offset` lies outside this unit or the entry is truncated
    /// - `UnknownAbbreviation` for a code missing from the unit's table
    /// - `Malformed` for a `DW_AT_sibling` that does not point forward
    pub fn entry_at(&self, offset: u64) -> DwarfResult<Entry>
    {
        let mut cursor = self.cursor_at(offset)?;
        let code = cursor.read_uleb128()?;
        if code == 0 {
            return Ok(Entry::Null {
                next: cursor.position(),
            });
        }
        let abbrev = self
            .abbrevs
            .get(code)
            .ok_or(DwarfError::UnknownAbbreviation { code, offset })?;

        let encoding = self.header.encoding();
        let mut sibling = None;
        for spec in &abbrev.attributes {
            if spec.name == gimli::DW_AT_sibling {
                let target = match self.codec.read_raw(&mut cursor, spec)? {
                    FormValue::UnitRef(relative) => self.header.offset.checked_add(relative).ok_or_else(|| {
                        DwarfError::malformed(offset, format!("DW_AT_sibling 0x{relative:x} overflows"))
                    })?,
                    FormValue::DebugInfoRef(absolute) => absolute,
                    _ => continue,
                };
                if target <= offset {
                    let reason = format!("DW_AT_sibling points backwards to 0x{target:x}");
                    return Err(DwarfError::malformed(offset, reason));
                }
                sibling = Some(target);
            } else {
                skip_form(&mut cursor, spec.form, encoding)?;
            }
        }
        Ok(Entry::Die {
            tag: abbrev.tag,
            has_children: abbrev.has_children,
            end: cursor.position(),
            sibling,
        })
    }

    /// Fully decode the DIE at `offset`.
    ///
    /// Attributes that cannot be interpreted become
    /// [`AttributeValue::Unrecognized`]; only storage-level problems are errors.
    ///
    /// ## Errors
    ///
    /// As for [`entry_at`](Self::entry_at), plus `Malformed` if `offset` holds a null entry.
    pub fn decode(&self, offset: u64, depth: usize) -> DwarfResult<Die>
    {
        let mut cursor = self.cursor_at(offset)?;
        let code = cursor.read_uleb128()?;
        if code == 0 {
            return Err(DwarfError::malformed(offset, "null entry where a DIE was expected"));
        }
        let abbrev = self
            .abbrevs
            .get(code)
            .ok_or(DwarfError::UnknownAbbreviation { code, offset })?;

        let mut attrs: Vec<(DwAt, AttributeValue)> = Vec::with_capacity(abbrev.attributes.len());
        for spec in &abbrev.attributes {
            let value = self.codec.decode(&mut cursor, spec)?;
            match attrs.iter_mut().find(|(at, _)| *at == spec.name) {
                // A repeated attribute keeps its last value so keys stay unique
                Some(slot) => slot.1 = value,
                None => attrs.push((spec.name, value)),
            }
        }

        Ok(Die {
            offset: DieOffset(offset),
            tag: abbrev.tag,
            depth,
            has_children: abbrev.has_children,
            attrs,
            synthetic: false,
        })
    }

    /// Offset just past the subtree rooted at `offset`.
    ///
    /// For an entry without children this is the end of its own bytes.
    /// Otherwise the children are walked (jumping via `DW_AT_sibling` where
    /// present) up to and including the null entry that closes them.
    ///
    /// ## Errors
    ///
    /// As for [`entry_at`](Self::entry_at); a subtree that runs off the end
    /// of the unit is `UnexpectedEof`.
    pub fn skip_subtree(&self, offset: u64) -> DwarfResult<u64>
    {
        let (mut pos, mut open) = match self.entry_at(offset)? {
            Entry::Null { next } => return Ok(next),
            Entry::Die { sibling: Some(sibling), .. } => return Ok(sibling),
            Entry::Die {
                has_children: false,
                end,
                ..
            } => return Ok(end),
            Entry::Die { end, .. } => (end, 1usize),
        };
        while open > 0 {
            match self.entry_at(pos)? {
                Entry::Null { next } => {
                    open -= 1;
                    pos = next;
                }
                Entry::Die { sibling: Some(sibling), .. } => pos = sibling,
                Entry::Die {
                    has_children, end, ..
                } => {
                    if has_children {
                        open += 1;
                    }
                    pos = end;
                }
            }
        }
        Ok(pos)
    }
}
