//! # Abbreviation Tables
//!
//! A unit's DIEs do not spell out their shape; each starts with an
//! abbreviation code that indexes a per-unit table of
//! `(tag, has-children, [(attribute, form)])` templates stored in
//! `.debug_abbrev`. Tables are parsed once and shared (units may point at the
//! same table offset).

use std::collections::HashMap;

use gimli::{DwAt, DwForm, DwTag, RunTimeEndian};
use tracing::debug;

use crate::error::{DwarfError, DwarfResult};
use crate::reader::ByteCursor;

/// One `(attribute, form)` slot of an abbreviation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeSpec
{
    pub name: DwAt,
    pub form: DwForm,
    /// Value stored in the abbreviation itself for `DW_FORM_implicit_const`
    pub implicit_const: Option<i64>,
}

/// Template shared by every DIE with the same abbreviation code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Abbreviation
{
    pub code: u64,
    pub tag: DwTag,
    pub has_children: bool,
    pub attributes: Vec<AttributeSpec>,
}

/// Immutable map from abbreviation code to [`Abbreviation`].
#[derive(Debug, Clone, Default)]
pub struct AbbreviationTable
{
    offset: u64,
    entries: HashMap<u64, Abbreviation>,
}

impl AbbreviationTable
{
    /// Parse the table at `offset` in `.debug_abbrev`.
    ///
    /// The table ends at the first zero code.
    ///
    /// ## Errors
    ///
    /// - `UnexpectedEof` on truncation
    /// - `Malformed` for a duplicate code or a bad children flag
    pub fn parse(debug_abbrev: &[u8], endian: RunTimeEndian, offset: u64) -> DwarfResult<Self>
    {
        let mut cursor = ByteCursor::at(debug_abbrev, endian, offset, ".debug_abbrev")?;
        let mut entries = HashMap::new();

        loop {
            let entry_offset = cursor.position();
            let code = cursor.read_uleb128()?;
            if code == 0 {
                break;
            }
            let tag = cursor.read_uleb128()?;
            let tag = u16::try_from(tag)
                .map(DwTag)
                .map_err(|_| DwarfError::malformed(entry_offset, format!("tag 0x{tag:x} out of range")))?;
            let has_children = match cursor.read_u8()? {
                0 => false,
                1 => true,
                other => {
                    return Err(DwarfError::malformed(entry_offset, format!("bad children flag {other}")));
                }
            };

            let mut attributes = Vec::new();
            loop {
                let spec_offset = cursor.position();
                let name = cursor.read_uleb128()?;
                let form = cursor.read_uleb128()?;
                if name == 0 && form == 0 {
                    break;
                }
                let (Ok(name), Ok(form)) = (u16::try_from(name), u16::try_from(form)) else {
                    return Err(DwarfError::malformed(spec_offset, "attribute or form code out of range"));
                };
                let form = DwForm(form);
                let implicit_const = if form == gimli::DW_FORM_implicit_const {
                    Some(cursor.read_sleb128()?)
                } else {
                    None
                };
                attributes.push(AttributeSpec {
                    name: DwAt(name),
                    form,
                    implicit_const,
                });
            }

            let abbrev = Abbreviation {
                code,
                tag,
                has_children,
                attributes,
            };
            if entries.insert(code, abbrev).is_some() {
                return Err(DwarfError::malformed(entry_offset, format!("duplicate abbreviation code {code}")));
            }
        }

        debug!(offset, count = entries.len(), "parsed abbreviation table");
        Ok(Self { offset, entries })
    }

    pub const fn offset(&self) -> u64
    {
        self.offset
    }

    pub fn get(&self, code: u64) -> Option<&Abbreviation>
    {
        self.entries.get(&code)
    }

    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }
}
