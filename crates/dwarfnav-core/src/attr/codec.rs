//! # Attribute Codec
//!
//! Turns `(attribute, form, bytes)` into an [`AttributeValue`].
//!
//! Decoding is split in two:
//!
//! 1. [`read_form`] consumes the bytes the form occupies. Failure here is an
//!    error for the whole DIE, because nothing after the attribute can be
//!    located once its size is unknown.
//! 2. [`AttributeCodec::interpret`] picks the interpretation class and
//!    resolves anything that lives in another section (strings, address
//!    indices, location and range lists). Failure here is local: the
//!    attribute becomes [`AttributeValue::Unrecognized`] and a warning is
//!    emitted, and the rest of the DIE decodes normally.
//!
//! ## Unit Bases
//!
//! DWARF 5 indexed forms (`strx`, `addrx`, `loclistx`, `rnglistx`) are
//! relative to base offsets stored on the unit DIE. [`AttributeCodec::for_unit`]
//! reads those once, together with the unit's `DW_AT_low_pc`, which is the
//! default base address of location and range lists.

use gimli::{DwAt, DwForm};
use tracing::warn;

use super::class::{interpret, Class, Interpretation};
use super::form::{offset_size, read_form, FormValue};
use super::ranges::{decode_debug_ranges, decode_rnglists, RangeList};
use super::value::AttributeValue;
use crate::abbrev::{AbbreviationTable, AttributeSpec};
use crate::error::{DwarfError, DwarfResult};
use crate::expr::{decode_debug_loc, decode_loclists, ExprOp, LocExpr, LocList};
use crate::reader::ByteCursor;
use crate::sections::DwarfSections;
use crate::types::{Address, DieOffset};
use crate::unit::UnitHeader;

/// Per-unit base offsets read from the unit DIE.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitBases
{
    pub str_offsets_base: Option<u64>,
    pub addr_base: Option<u64>,
    pub loclists_base: Option<u64>,
    pub rnglists_base: Option<u64>,
    /// Unit `DW_AT_low_pc`; 0 when absent
    pub low_pc: u64,
}

/// Attribute decoder bound to one unit.
#[derive(Debug, Clone, Copy)]
pub struct AttributeCodec<'a>
{
    sections: DwarfSections<'a>,
    header: UnitHeader,
    bases: UnitBases,
}

impl<'a> AttributeCodec<'a>
{
    /// A codec with no unit bases; indexed forms resolve relative to offset 0.
    pub const fn new(sections: DwarfSections<'a>, header: UnitHeader) -> Self
    {
        Self {
            sections,
            header,
            bases: UnitBases {
                str_offsets_base: None,
                addr_base: None,
                loclists_base: None,
                rnglists_base: None,
                low_pc: 0,
            },
        }
    }

    #[must_use]
    pub const fn with_bases(mut self, bases: UnitBases) -> Self
    {
        self.bases = bases;
        self
    }

    /// Build the codec for `header`, reading the bases from its unit DIE.
    ///
    /// ## Errors
    ///
    /// Storage-level errors while reading the unit DIE (truncation, unknown
    /// abbreviation code, unknown form). A unit whose first entry is null
    /// gets default bases.
    pub fn for_unit(sections: DwarfSections<'a>, header: UnitHeader, abbrevs: &AbbreviationTable) -> DwarfResult<Self>
    {
        let codec = Self::new(sections, header);
        let mut cursor = ByteCursor::at(sections.debug_info, sections.endian, header.first_die_offset, ".debug_info")?;
        let code_offset = cursor.position();
        let code = cursor.read_uleb128()?;
        if code == 0 {
            return Ok(codec);
        }
        let abbrev = abbrevs.get(code).ok_or(DwarfError::UnknownAbbreviation {
            code,
            offset: code_offset,
        })?;

        let mut raw = Vec::with_capacity(abbrev.attributes.len());
        for spec in &abbrev.attributes {
            raw.push((spec, codec.read_raw(&mut cursor, spec)?));
        }

        let mut bases = UnitBases::default();
        for (spec, value) in &raw {
            let offset = match value {
                FormValue::SecOffset(offset) | FormValue::Data(offset) => Some(*offset),
                _ => None,
            };
            match spec.name {
                gimli::DW_AT_str_offsets_base => bases.str_offsets_base = offset,
                gimli::DW_AT_addr_base | gimli::DW_AT_GNU_addr_base => bases.addr_base = offset,
                gimli::DW_AT_loclists_base => bases.loclists_base = offset,
                gimli::DW_AT_rnglists_base | gimli::DW_AT_GNU_ranges_base => bases.rnglists_base = offset,
                _ => {}
            }
        }

        // low_pc may be an addrx form, so it is resolved after addr_base
        let codec = codec.with_bases(bases);
        if let Some((_, value)) = raw.iter().find(|(spec, _)| spec.name == gimli::DW_AT_low_pc) {
            bases.low_pc = match *value {
                FormValue::Addr(address) => address,
                FormValue::AddrIndex(index) => codec.address_at_index(index).unwrap_or(0),
                _ => 0,
            };
        }
        Ok(codec.with_bases(bases))
    }

    pub const fn header(&self) -> &UnitHeader
    {
        &self.header
    }

    pub const fn bases(&self) -> &UnitBases
    {
        &self.bases
    }

    /// Storage step only: consume and return the raw form value.
    ///
    /// ## Errors
    ///
    /// `UnknownForm`, `UnexpectedEof` or `BadLeb128`; all fatal for the DIE.
    pub fn read_raw<'b>(&self, cursor: &mut ByteCursor<'b>, spec: &AttributeSpec) -> DwarfResult<FormValue<'b>>
    {
        read_form(cursor, spec.form, self.header.encoding(), spec.implicit_const)
    }

    /// Read and interpret one attribute.
    ///
    /// ## Errors
    ///
    /// Only storage-level errors from [`read_raw`](Self::read_raw).
    pub fn decode(&self, cursor: &mut ByteCursor<'_>, spec: &AttributeSpec) -> DwarfResult<AttributeValue>
    {
        let raw = self.read_raw(cursor, spec)?;
        let form = if spec.form == gimli::DW_FORM_indirect { raw.representative_form() } else { spec.form };
        Ok(self.interpret(spec.name, form, raw))
    }

    /// Class step: never fails, returns `Unrecognized` instead.
    pub fn interpret(&self, name: DwAt, form: DwForm, raw: FormValue<'_>) -> AttributeValue
    {
        match self.try_interpret(name, form, raw) {
            Ok(value) => value,
            Err(err) => {
                warn!(
                    unit = self.header.offset,
                    attribute = %name,
                    form = %form,
                    error = %err,
                    "attribute decoded as unrecognized"
                );
                AttributeValue::Unrecognized { form }
            }
        }
    }

    fn try_interpret(&self, name: DwAt, form: DwForm, raw: FormValue<'_>) -> DwarfResult<AttributeValue>
    {
        let encoding = self.header.encoding();
        let endian = self.sections.endian;
        let value = match interpret(name, form, self.header.version) {
            Interpretation::Unrecognized => return Err(DwarfError::Unsupported(format!("form {form} on {name}"))),
            Interpretation::BlockAsExpr => match raw {
                FormValue::Block(bytes) | FormValue::Exprloc(bytes) => {
                    AttributeValue::LocList(LocList::universal(LocExpr::parse_endian(bytes, encoding, endian)?))
                }
                other => return Err(mismatch(other, "block")),
            },
            Interpretation::ConstantAsExpr => {
                let op = match raw {
                    FormValue::Data(value) => ExprOp::unsigned(gimli::DW_OP_constu, value),
                    FormValue::Sdata(value) | FormValue::ImplicitConst(value) => {
                        ExprOp::signed(gimli::DW_OP_consts, value)
                    }
                    other => return Err(mismatch(other, "constant")),
                };
                AttributeValue::LocList(LocList::universal(LocExpr::from_ops(vec![op])))
            }
            Interpretation::Class(class) => self.class_value(class, raw)?,
        };
        Ok(value)
    }

    fn class_value(&self, class: Class, raw: FormValue<'_>) -> DwarfResult<AttributeValue>
    {
        let encoding = self.header.encoding();
        let value = match (class, raw) {
            (Class::Address, FormValue::Addr(address)) => AttributeValue::Address(Address::new(address)),
            (Class::Address, FormValue::AddrIndex(index)) => {
                AttributeValue::Address(Address::new(self.address_at_index(index)?))
            }

            (Class::Constant, FormValue::Data(value) | FormValue::Addr(value)) => AttributeValue::Unsigned(value),
            (Class::Constant, FormValue::Sdata(value) | FormValue::ImplicitConst(value)) => {
                AttributeValue::Signed(value)
            }
            (Class::Constant, FormValue::Data16(bytes)) | (Class::Block, FormValue::Block(bytes)) => {
                AttributeValue::Block(bytes.to_vec())
            }

            (Class::Exprloc, FormValue::Exprloc(bytes)) => AttributeValue::LocList(LocList::universal(
                LocExpr::parse_endian(bytes, encoding, self.sections.endian)?,
            )),

            (Class::Flag, FormValue::Flag(value)) => AttributeValue::Flag(value),

            (Class::String, raw) => AttributeValue::String(self.string(raw)?),

            (Class::Reference, FormValue::UnitRef(offset)) => AttributeValue::Reference {
                offset: DieOffset(slot(self.header.offset, offset, 1, ".debug_info")?),
                cross_unit: false,
            },
            (Class::Reference, FormValue::DebugInfoRef(offset)) => AttributeValue::Reference {
                offset: DieOffset(offset),
                cross_unit: true,
            },
            (Class::Reference, FormValue::TypeSignature(signature)) => AttributeValue::TypeSignature(signature),

            (Class::LinePtr, FormValue::SecOffset(offset) | FormValue::Data(offset)) => AttributeValue::LinePtr(offset),
            (Class::MacPtr, FormValue::SecOffset(offset) | FormValue::Data(offset)) => AttributeValue::MacPtr(offset),
            (Class::BasePtr, FormValue::SecOffset(offset) | FormValue::Data(offset)) => {
                AttributeValue::BaseOffset(offset)
            }

            (Class::LocListPtr, FormValue::SecOffset(offset) | FormValue::Data(offset)) => {
                AttributeValue::LocList(self.loclist_at(offset)?)
            }
            (Class::LocListPtr, FormValue::LocListIndex(index)) => {
                let base = self.list_base(self.bases.loclists_base);
                let offset = self.list_offset(self.sections.debug_loclists, ".debug_loclists", base, index)?;
                AttributeValue::LocList(self.loclist_at(offset)?)
            }
            (Class::RangeListPtr, FormValue::SecOffset(offset) | FormValue::Data(offset)) => {
                AttributeValue::RangeList(self.rangelist_at(offset)?)
            }
            (Class::RangeListPtr, FormValue::RngListIndex(index)) => {
                let base = self.list_base(self.bases.rnglists_base);
                let offset = self.list_offset(self.sections.debug_rnglists, ".debug_rnglists", base, index)?;
                AttributeValue::RangeList(self.rangelist_at(offset)?)
            }

            (_, other) => return Err(mismatch(other, "its class")),
        };
        Ok(value)
    }

    /// Resolve a string-class raw value.
    ///
    /// ## Errors
    ///
    /// `OffsetOutOfRange` when the offset or index misses its section, and
    /// `Unsupported` for strings in a supplementary object file.
    pub fn string(&self, raw: FormValue<'_>) -> DwarfResult<String>
    {
        let endian = self.sections.endian;
        let bytes = match raw {
            FormValue::String(bytes) => bytes,
            FormValue::StrOffset(offset) => {
                ByteCursor::at(self.sections.debug_str, endian, offset, ".debug_str")?.read_cstr()?
            }
            FormValue::LineStrOffset(offset) => {
                ByteCursor::at(self.sections.debug_line_str, endian, offset, ".debug_line_str")?.read_cstr()?
            }
            FormValue::StrIndex(index) => {
                let width = offset_size(self.header.format);
                let base = self.bases.str_offsets_base.unwrap_or(0);
                let at = slot(base, index, width, ".debug_str_offsets")?;
                let mut cursor = ByteCursor::at(self.sections.debug_str_offsets, endian, at, ".debug_str_offsets")?;
                let offset = cursor.read_offset(self.header.format)?;
                ByteCursor::at(self.sections.debug_str, endian, offset, ".debug_str")?.read_cstr()?
            }
            FormValue::SupStrOffset(_) => {
                return Err(DwarfError::Unsupported("string in supplementary object file".into()));
            }
            other => return Err(mismatch(other, "string")),
        };
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Read entry `index` of the unit's `.debug_addr` contribution.
    ///
    /// ## Errors
    ///
    /// `OffsetOutOfRange`/`UnexpectedEof` when the index misses the section.
    pub fn address_at_index(&self, index: u64) -> DwarfResult<u64>
    {
        let size = u64::from(self.header.address_size);
        let at = slot(self.bases.addr_base.unwrap_or(0), index, size, ".debug_addr")?;
        let mut cursor = ByteCursor::at(self.sections.debug_addr, self.sections.endian, at, ".debug_addr")?;
        cursor.read_address(self.header.address_size)
    }

    fn loclist_at(&self, offset: u64) -> DwarfResult<LocList>
    {
        let encoding = self.header.encoding();
        let endian = self.sections.endian;
        if self.header.version >= 5 {
            let addrx = |index: u64| self.address_at_index(index);
            decode_loclists(self.sections.debug_loclists, endian, offset, encoding, self.bases.low_pc, &addrx)
        } else {
            decode_debug_loc(self.sections.debug_loc, endian, offset, encoding, self.bases.low_pc)
        }
    }

    fn rangelist_at(&self, offset: u64) -> DwarfResult<RangeList>
    {
        let encoding = self.header.encoding();
        let endian = self.sections.endian;
        if self.header.version >= 5 {
            let addrx = |index: u64| self.address_at_index(index);
            decode_rnglists(self.sections.debug_rnglists, endian, offset, encoding, self.bases.low_pc, &addrx)
        } else {
            decode_debug_ranges(self.sections.debug_ranges, endian, offset, encoding, self.bases.low_pc)
        }
    }

    /// Default list base: just past a list-table header of this unit's format
    fn list_base(&self, base: Option<u64>) -> u64
    {
        base.unwrap_or(match self.header.format {
            gimli::Format::Dwarf32 => 12,
            gimli::Format::Dwarf64 => 20,
        })
    }

    /// Resolve `*listx` index through the offset array that starts at `base`
    fn list_offset(&self, section: &[u8], name: &'static str, base: u64, index: u64) -> DwarfResult<u64>
    {
        let at = slot(base, index, offset_size(self.header.format), name)?;
        let mut cursor = ByteCursor::at(section, self.sections.endian, at, name)?;
        let relative = cursor.read_offset(self.header.format)?;
        slot(base, relative, 1, name)
    }
}

/// Offset of entry `index` in a table of `width`-byte entries at `base`;
/// with a width of 1 this is a checked `base + index`
fn slot(base: u64, index: u64, width: u64, section: &'static str) -> DwarfResult<u64>
{
    index
        .checked_mul(width)
        .and_then(|relative| base.checked_add(relative))
        .ok_or(DwarfError::OffsetOutOfRange { offset: index, section })
}

fn mismatch(raw: FormValue<'_>, expected: &str) -> DwarfError
{
    DwarfError::Unsupported(format!("raw value {raw:?} does not match {expected}"))
}
