//! Storage-shape decoding of attribute forms.
//!
//! This is the first of the two decoding steps: the form code alone decides
//! how many bytes an attribute occupies and what raw shape they have. No
//! other section is consulted here.

use gimli::{DwForm, Encoding, Endianity, Format};

use crate::error::{DwarfError, DwarfResult};
use crate::reader::ByteCursor;

/// Raw attribute value, borrowing from `.debug_info` where it can.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormValue<'a>
{
    Addr(u64),
    /// Index into `.debug_addr`
    AddrIndex(u64),
    Block(&'a [u8]),
    Exprloc(&'a [u8]),
    /// `data1`..`data8` and `udata`
    Data(u64),
    Data16(&'a [u8]),
    Sdata(i64),
    ImplicitConst(i64),
    Flag(bool),
    /// Inline `DW_FORM_string`
    String(&'a [u8]),
    /// Offset into `.debug_str`
    StrOffset(u64),
    /// Offset into `.debug_line_str`
    LineStrOffset(u64),
    /// Index into `.debug_str_offsets`
    StrIndex(u64),
    /// String in a supplementary object file
    SupStrOffset(u64),
    /// Unit-relative DIE reference
    UnitRef(u64),
    /// Section-relative DIE reference (`DW_FORM_ref_addr`)
    DebugInfoRef(u64),
    /// Reference into a supplementary object file
    SupRef(u64),
    TypeSignature(u64),
    SecOffset(u64),
    LocListIndex(u64),
    RngListIndex(u64),
}

impl FormValue<'_>
{
    /// A form that stores this shape, used to classify values read through `DW_FORM_indirect`
    pub const fn representative_form(&self) -> DwForm
    {
        match self {
            FormValue::Addr(_) => gimli::DW_FORM_addr,
            FormValue::AddrIndex(_) => gimli::DW_FORM_addrx,
            FormValue::Block(_) => gimli::DW_FORM_block,
            FormValue::Exprloc(_) => gimli::DW_FORM_exprloc,
            FormValue::Data(_) => gimli::DW_FORM_udata,
            FormValue::Data16(_) => gimli::DW_FORM_data16,
            FormValue::Sdata(_) => gimli::DW_FORM_sdata,
            FormValue::ImplicitConst(_) => gimli::DW_FORM_implicit_const,
            FormValue::Flag(_) => gimli::DW_FORM_flag,
            FormValue::String(_) => gimli::DW_FORM_string,
            FormValue::StrOffset(_) => gimli::DW_FORM_strp,
            FormValue::LineStrOffset(_) => gimli::DW_FORM_line_strp,
            FormValue::StrIndex(_) => gimli::DW_FORM_strx,
            FormValue::SupStrOffset(_) => gimli::DW_FORM_strp_sup,
            FormValue::UnitRef(_) => gimli::DW_FORM_ref_udata,
            FormValue::DebugInfoRef(_) => gimli::DW_FORM_ref_addr,
            FormValue::SupRef(_) => gimli::DW_FORM_ref_sup8,
            FormValue::TypeSignature(_) => gimli::DW_FORM_ref_sig8,
            FormValue::SecOffset(_) => gimli::DW_FORM_sec_offset,
            FormValue::LocListIndex(_) => gimli::DW_FORM_loclistx,
            FormValue::RngListIndex(_) => gimli::DW_FORM_rnglistx,
        }
    }
}

/// Read one value of `form`.
///
/// `DW_FORM_indirect` is resolved by reading the real form code from the
/// stream first; `implicit_const` is the value stored in the abbreviation.
///
/// ## Errors
///
/// - `UnknownForm` for codes that no DWARF version or GNU extension defines
/// - `UnexpectedEof` when the value is truncated
pub fn read_form<'a>(
    cursor: &mut ByteCursor<'a>,
    form: DwForm,
    encoding: Encoding,
    implicit_const: Option<i64>,
) -> DwarfResult<FormValue<'a>>
{
    let offset = cursor.position();
    let value = match form {
        gimli::DW_FORM_addr => FormValue::Addr(cursor.read_address(encoding.address_size)?),
        gimli::DW_FORM_addrx | gimli::DW_FORM_GNU_addr_index => FormValue::AddrIndex(cursor.read_uleb128()?),
        gimli::DW_FORM_addrx1 => FormValue::AddrIndex(cursor.read_sized(1)?),
        gimli::DW_FORM_addrx2 => FormValue::AddrIndex(cursor.read_sized(2)?),
        gimli::DW_FORM_addrx3 => FormValue::AddrIndex(read_u24(cursor)?),
        gimli::DW_FORM_addrx4 => FormValue::AddrIndex(cursor.read_sized(4)?),

        gimli::DW_FORM_block1 => {
            let len = cursor.read_u8()?;
            FormValue::Block(cursor.read_bytes(u64::from(len))?)
        }
        gimli::DW_FORM_block2 => {
            let len = cursor.read_u16()?;
            FormValue::Block(cursor.read_bytes(u64::from(len))?)
        }
        gimli::DW_FORM_block4 => {
            let len = cursor.read_u32()?;
            FormValue::Block(cursor.read_bytes(u64::from(len))?)
        }
        gimli::DW_FORM_block => {
            let len = cursor.read_uleb128()?;
            FormValue::Block(cursor.read_bytes(len)?)
        }
        gimli::DW_FORM_exprloc => {
            let len = cursor.read_uleb128()?;
            FormValue::Exprloc(cursor.read_bytes(len)?)
        }

        gimli::DW_FORM_data1 => FormValue::Data(cursor.read_sized(1)?),
        gimli::DW_FORM_data2 => FormValue::Data(cursor.read_sized(2)?),
        gimli::DW_FORM_data4 => FormValue::Data(cursor.read_sized(4)?),
        gimli::DW_FORM_data8 => FormValue::Data(cursor.read_sized(8)?),
        gimli::DW_FORM_data16 => FormValue::Data16(cursor.read_bytes(16)?),
        gimli::DW_FORM_udata => FormValue::Data(cursor.read_uleb128()?),
        gimli::DW_FORM_sdata => FormValue::Sdata(cursor.read_sleb128()?),
        gimli::DW_FORM_implicit_const => {
            let value = implicit_const.ok_or_else(|| DwarfError::malformed(offset, "implicit_const without a value"))?;
            FormValue::ImplicitConst(value)
        }

        gimli::DW_FORM_flag => FormValue::Flag(cursor.read_u8()? != 0),
        gimli::DW_FORM_flag_present => FormValue::Flag(true),

        gimli::DW_FORM_string => FormValue::String(cursor.read_cstr()?),
        gimli::DW_FORM_strp => FormValue::StrOffset(cursor.read_offset(encoding.format)?),
        gimli::DW_FORM_line_strp => FormValue::LineStrOffset(cursor.read_offset(encoding.format)?),
        gimli::DW_FORM_strp_sup | gimli::DW_FORM_GNU_strp_alt => {
            FormValue::SupStrOffset(cursor.read_offset(encoding.format)?)
        }
        gimli::DW_FORM_strx | gimli::DW_FORM_GNU_str_index => FormValue::StrIndex(cursor.read_uleb128()?),
        gimli::DW_FORM_strx1 => FormValue::StrIndex(cursor.read_sized(1)?),
        gimli::DW_FORM_strx2 => FormValue::StrIndex(cursor.read_sized(2)?),
        gimli::DW_FORM_strx3 => FormValue::StrIndex(read_u24(cursor)?),
        gimli::DW_FORM_strx4 => FormValue::StrIndex(cursor.read_sized(4)?),

        gimli::DW_FORM_ref1 => FormValue::UnitRef(cursor.read_sized(1)?),
        gimli::DW_FORM_ref2 => FormValue::UnitRef(cursor.read_sized(2)?),
        gimli::DW_FORM_ref4 => FormValue::UnitRef(cursor.read_sized(4)?),
        gimli::DW_FORM_ref8 => FormValue::UnitRef(cursor.read_sized(8)?),
        gimli::DW_FORM_ref_udata => FormValue::UnitRef(cursor.read_uleb128()?),
        gimli::DW_FORM_ref_addr => {
            // DWARF 2 sized this like an address; later versions like an offset.
            let value = if encoding.version <= 2 {
                cursor.read_address(encoding.address_size)?
            } else {
                cursor.read_offset(encoding.format)?
            };
            FormValue::DebugInfoRef(value)
        }
        gimli::DW_FORM_ref_sup4 => FormValue::SupRef(cursor.read_sized(4)?),
        gimli::DW_FORM_ref_sup8 => FormValue::SupRef(cursor.read_sized(8)?),
        gimli::DW_FORM_GNU_ref_alt => FormValue::SupRef(cursor.read_offset(encoding.format)?),
        gimli::DW_FORM_ref_sig8 => FormValue::TypeSignature(cursor.read_u64()?),

        gimli::DW_FORM_sec_offset => FormValue::SecOffset(cursor.read_offset(encoding.format)?),
        gimli::DW_FORM_loclistx => FormValue::LocListIndex(cursor.read_uleb128()?),
        gimli::DW_FORM_rnglistx => FormValue::RngListIndex(cursor.read_uleb128()?),

        gimli::DW_FORM_indirect => {
            let real = cursor.read_uleb128()?;
            let real = u16::try_from(real).map(DwForm).map_err(|_| DwarfError::UnknownForm {
                form: DwForm(u16::MAX),
                offset,
            })?;
            if real == gimli::DW_FORM_indirect {
                return Err(DwarfError::malformed(offset, "nested DW_FORM_indirect"));
            }
            return read_form(cursor, real, encoding, implicit_const);
        }
        other => return Err(DwarfError::UnknownForm { form: other, offset }),
    };
    Ok(value)
}

/// Advance past one value of `form` without building it.
///
/// Fixed-size forms are skipped arithmetically; the rest go through [`read_form`].
pub fn skip_form(cursor: &mut ByteCursor<'_>, form: DwForm, encoding: Encoding) -> DwarfResult<()>
{
    let fixed = match form {
        gimli::DW_FORM_flag_present | gimli::DW_FORM_implicit_const => Some(0),
        gimli::DW_FORM_data1 | gimli::DW_FORM_ref1 | gimli::DW_FORM_flag | gimli::DW_FORM_strx1
        | gimli::DW_FORM_addrx1 => Some(1),
        gimli::DW_FORM_data2 | gimli::DW_FORM_ref2 | gimli::DW_FORM_strx2 | gimli::DW_FORM_addrx2 => Some(2),
        gimli::DW_FORM_strx3 | gimli::DW_FORM_addrx3 => Some(3),
        gimli::DW_FORM_data4 | gimli::DW_FORM_ref4 | gimli::DW_FORM_strx4 | gimli::DW_FORM_addrx4
        | gimli::DW_FORM_ref_sup4 => Some(4),
        gimli::DW_FORM_data8 | gimli::DW_FORM_ref8 | gimli::DW_FORM_ref_sig8 | gimli::DW_FORM_ref_sup8 => Some(8),
        gimli::DW_FORM_data16 => Some(16),
        gimli::DW_FORM_addr => Some(u64::from(encoding.address_size)),
        gimli::DW_FORM_strp | gimli::DW_FORM_line_strp | gimli::DW_FORM_sec_offset => {
            Some(offset_size(encoding.format))
        }
        _ => None,
    };
    match fixed {
        Some(len) => cursor.skip(len),
        None => read_form(cursor, form, encoding, Some(0)).map(|_| ()),
    }
}

fn read_u24(cursor: &mut ByteCursor<'_>) -> DwarfResult<u64>
{
    let bytes = cursor.read_bytes(3)?;
    let (lo, hi) = if cursor.endian().is_big_endian() {
        (u64::from(bytes[2]) | u64::from(bytes[1]) << 8, u64::from(bytes[0]))
    } else {
        (u64::from(bytes[0]) | u64::from(bytes[1]) << 8, u64::from(bytes[2]))
    };
    Ok(lo | hi << 16)
}

/// Byte width of a section offset in `format`
pub(crate) const fn offset_size(format: Format) -> u64
{
    match format {
        Format::Dwarf32 => 4,
        Format::Dwarf64 => 8,
    }
}

#[cfg(test)]
mod tests
{
    use gimli::RunTimeEndian;

    use super::*;

    const V4: Encoding = Encoding {
        address_size: 8,
        format: Format::Dwarf32,
        version: 4,
    };

    #[test]
    fn test_block_forms_use_their_prefix_width()
    {
        let data = [0x02, 0x00, 0xaa, 0xbb, 0xcc];
        let mut cursor = ByteCursor::new(&data, RunTimeEndian::Little);
        let value = read_form(&mut cursor, gimli::DW_FORM_block2, V4, None).unwrap();
        assert_eq!(value, FormValue::Block(&[0xaa, 0xbb]));
        assert_eq!(cursor.position(), 4);
    }

    #[test]
    fn test_indirect_form()
    {
        // indirect -> data2
        let data = [0x05, 0x34, 0x12];
        let mut cursor = ByteCursor::new(&data, RunTimeEndian::Little);
        let value = read_form(&mut cursor, gimli::DW_FORM_indirect, V4, None).unwrap();
        assert_eq!(value, FormValue::Data(0x1234));
    }

    #[test]
    fn test_ref_addr_width_depends_on_version()
    {
        let data = [1, 0, 0, 0, 0, 0, 0, 0];
        let v2 = Encoding { version: 2, ..V4 };
        let mut cursor = ByteCursor::new(&data, RunTimeEndian::Little);
        read_form(&mut cursor, gimli::DW_FORM_ref_addr, v2, None).unwrap();
        assert_eq!(cursor.position(), 8);

        let mut cursor = ByteCursor::new(&data, RunTimeEndian::Little);
        read_form(&mut cursor, gimli::DW_FORM_ref_addr, V4, None).unwrap();
        assert_eq!(cursor.position(), 4);
    }

    #[test]
    fn test_unknown_form_is_error()
    {
        let data = [0u8; 4];
        let mut cursor = ByteCursor::new(&data, RunTimeEndian::Little);
        assert!(matches!(
            read_form(&mut cursor, DwForm(0x7f), V4, None),
            Err(DwarfError::UnknownForm { offset: 0, .. })
        ));
    }

    #[test]
    fn test_skip_matches_read()
    {
        let data = [0x03, 0x00, b'a', b'b', 0x00, 0x80, 0x01, 0xff];
        let forms = [gimli::DW_FORM_data2, gimli::DW_FORM_string, gimli::DW_FORM_udata];
        let mut read = ByteCursor::new(&data, RunTimeEndian::Little);
        let mut skip = ByteCursor::new(&data, RunTimeEndian::Little);
        for form in forms {
            read_form(&mut read, form, V4, None).unwrap();
            skip_form(&mut skip, form, V4).unwrap();
            assert_eq!(read.position(), skip.position());
        }
        assert_eq!(skip.position(), 7);
    }

    #[test]
    fn test_strx3_big_endian()
    {
        let data = [0x01, 0x02, 0x03];
        let mut cursor = ByteCursor::new(&data, RunTimeEndian::Big);
        let value = read_form(&mut cursor, gimli::DW_FORM_strx3, V4, None).unwrap();
        assert_eq!(value, FormValue::StrIndex(0x0001_0203));
    }
}
