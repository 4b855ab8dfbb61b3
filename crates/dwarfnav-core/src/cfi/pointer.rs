//! `DW_EH_PE_*` pointer encodings used by `.eh_frame`.
//!
//! The low nibble selects the storage format, bits 4-6 the base the value is
//! relative to, and bit 7 marks an indirect pointer (the value is the address
//! of the real pointer).

use gimli::{DwEhPe, Pointer};

use crate::error::{DwarfError, DwarfResult};
use crate::reader::ByteCursor;
use crate::types::Address;

/// Base addresses for relative pointer encodings.
///
/// `section` is the address `.eh_frame` is loaded at; pc-relative pointers
/// are relative to the section offset alone when it is not known.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CfiBases
{
    pub section: Option<u64>,
    pub text: Option<u64>,
    pub data: Option<u64>,
}

impl CfiBases
{
    #[must_use]
    pub const fn with_section(mut self, address: u64) -> Self
    {
        self.section = Some(address);
        self
    }

    #[must_use]
    pub const fn with_text(mut self, address: u64) -> Self
    {
        self.text = Some(address);
        self
    }

    #[must_use]
    pub const fn with_data(mut self, address: u64) -> Self
    {
        self.data = Some(address);
        self
    }
}

/// Read a pointer stored with `encoding`.
///
/// `func` is the start of the enclosing function, needed by
/// `DW_EH_PE_funcrel` (used for LSDA pointers).
///
/// ## Errors
///
/// `UnsupportedPointerEncoding` for unknown formats, for `DW_EH_PE_aligned`,
/// and for relative encodings whose base was not supplied.
pub(crate) fn read_pointer(
    cursor: &mut ByteCursor<'_>,
    encoding: DwEhPe,
    address_size: u8,
    bases: &CfiBases,
    func: Option<u64>,
) -> DwarfResult<Pointer>
{
    let position = cursor.position();
    let unsupported = DwarfError::UnsupportedPointerEncoding {
        encoding,
        offset: position,
    };

    let raw = read_value(cursor, DwEhPe(encoding.0 & 0x0f), address_size).map_err(|err| match err {
        DwarfError::Unsupported(_) => DwarfError::UnsupportedPointerEncoding {
            encoding,
            offset: position,
        },
        other => other,
    })?;

    let base = match DwEhPe(encoding.0 & 0x70) {
        gimli::DW_EH_PE_absptr => 0,
        gimli::DW_EH_PE_pcrel => bases.section.unwrap_or(0).wrapping_add(position),
        gimli::DW_EH_PE_textrel => bases.text.ok_or(unsupported)?,
        gimli::DW_EH_PE_datarel => bases.data.ok_or(unsupported)?,
        gimli::DW_EH_PE_funcrel => func.ok_or(unsupported)?,
        _ => return Err(unsupported),
    };
    let value = Address::new(base.wrapping_add(raw)).truncate(address_size).value();

    Ok(if encoding.0 & gimli::DW_EH_PE_indirect.0 != 0 {
        Pointer::Indirect(value)
    } else {
        Pointer::Direct(value)
    })
}

/// Read a value in the storage format `format` (the low nibble of an encoding)
pub(crate) fn read_value(cursor: &mut ByteCursor<'_>, format: DwEhPe, address_size: u8) -> DwarfResult<u64>
{
    Ok(match format {
        gimli::DW_EH_PE_absptr => cursor.read_address(address_size)?,
        gimli::DW_EH_PE_uleb128 => cursor.read_uleb128()?,
        gimli::DW_EH_PE_udata2 => u64::from(cursor.read_u16()?),
        gimli::DW_EH_PE_udata4 => u64::from(cursor.read_u32()?),
        gimli::DW_EH_PE_udata8 => cursor.read_u64()?,
        gimli::DW_EH_PE_sleb128 => cursor.read_sleb128()? as u64,
        gimli::DW_EH_PE_sdata2 => i64::from(cursor.read_i16()?) as u64,
        gimli::DW_EH_PE_sdata4 => i64::from(cursor.read_i32()?) as u64,
        gimli::DW_EH_PE_sdata8 => cursor.read_i64()? as u64,
        other => return Err(DwarfError::Unsupported(format!("pointer format {other}"))),
    })
}

#[cfg(test)]
mod tests
{
    use gimli::RunTimeEndian;

    use super::*;

    #[test]
    fn test_pcrel_sdata4()
    {
        // four bytes of padding, then -16 as sdata4
        let mut data = vec![0u8; 4];
        data.extend_from_slice(&(-16i32).to_le_bytes());
        let mut cursor = ByteCursor::new(&data, RunTimeEndian::Little);
        cursor.skip(4).unwrap();
        let bases = CfiBases::default().with_section(0x1000);
        let encoding = DwEhPe(gimli::DW_EH_PE_pcrel.0 | gimli::DW_EH_PE_sdata4.0);
        let pointer = read_pointer(&mut cursor, encoding, 8, &bases, None).unwrap();
        assert_eq!(pointer, Pointer::Direct(0x1000 + 4 - 16));
    }

    #[test]
    fn test_indirect_flag()
    {
        let data = 0x2000u32.to_le_bytes();
        let mut cursor = ByteCursor::new(&data, RunTimeEndian::Little);
        let encoding = DwEhPe(gimli::DW_EH_PE_indirect.0 | gimli::DW_EH_PE_udata4.0);
        let pointer = read_pointer(&mut cursor, encoding, 8, &CfiBases::default(), None).unwrap();
        assert_eq!(pointer, Pointer::Indirect(0x2000));
    }

    #[test]
    fn test_datarel_without_base()
    {
        let data = [0u8; 4];
        let mut cursor = ByteCursor::new(&data, RunTimeEndian::Little);
        let encoding = DwEhPe(gimli::DW_EH_PE_datarel.0 | gimli::DW_EH_PE_udata4.0);
        assert!(matches!(
            read_pointer(&mut cursor, encoding, 8, &CfiBases::default(), None),
            Err(DwarfError::UnsupportedPointerEncoding { offset: 0, .. })
        ));
    }

    #[test]
    fn test_absptr_truncates_to_address_size()
    {
        let data = 0xffff_fff0u32.to_le_bytes();
        let mut cursor = ByteCursor::new(&data, RunTimeEndian::Little);
        let pointer = read_pointer(&mut cursor, gimli::DW_EH_PE_absptr, 4, &CfiBases::default(), None).unwrap();
        assert_eq!(pointer, Pointer::Direct(0xffff_fff0));
    }
}
