//! CIE and FDE records.
//!
//! Both sections share a record layout (initial length, CIE id or pointer,
//! body) but differ in how an FDE names its CIE: `.debug_frame` stores the
//! CIE's section offset, `.eh_frame` stores the distance back from the
//! pointer field itself, and uses id 0 rather than all-ones to mark a CIE.
//!
//! ## References
//!
//! - [DWARF 5, section 6.4: Call Frame Information](https://dwarfstd.org/doc/DWARF5.pdf#page=193)
//! - [LSB: .eh_frame](https://refspecs.linuxfoundation.org/LSB_5.0.0/LSB-Core-generic/LSB-Core-generic/ehframechpt.html)

use std::ops::Range;
use std::rc::Rc;

use gimli::{DwEhPe, Format, Pointer, Register, RunTimeEndian};
use tracing::debug;

use super::pointer::{read_pointer, read_value, CfiBases};
use crate::error::{DwarfError, DwarfResult};
use crate::reader::ByteCursor;
use crate::types::Address;

/// Which frame section the bytes come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CfiSection
{
    DebugFrame,
    EhFrame,
}

impl CfiSection
{
    pub const fn name(self) -> &'static str
    {
        match self {
            CfiSection::DebugFrame => ".debug_frame",
            CfiSection::EhFrame => ".eh_frame",
        }
    }
}

/// How to read a frame section.
///
/// `address_size` is the target's; a version 4 CIE may override it for its
/// own FDEs.
#[derive(Debug, Clone, Copy)]
pub struct CfiConfig
{
    pub section: CfiSection,
    pub address_size: u8,
    pub endian: RunTimeEndian,
    pub bases: CfiBases,
}

impl CfiConfig
{
    pub fn debug_frame(address_size: u8, endian: RunTimeEndian) -> Self
    {
        Self {
            section: CfiSection::DebugFrame,
            address_size,
            endian,
            bases: CfiBases::default(),
        }
    }

    pub fn eh_frame(address_size: u8, endian: RunTimeEndian) -> Self
    {
        Self {
            section: CfiSection::EhFrame,
            address_size,
            endian,
            bases: CfiBases::default(),
        }
    }

    #[must_use]
    pub const fn with_bases(mut self, bases: CfiBases) -> Self
    {
        self.bases = bases;
        self
    }
}

/// Common Information Entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cie
{
    pub offset: u64,
    pub format: Format,
    pub version: u8,
    pub augmentation: String,
    pub address_size: u8,
    pub segment_size: u8,
    pub code_alignment_factor: u64,
    pub data_alignment_factor: i64,
    pub return_address_register: Register,
    /// Encoding of FDE addresses; `absptr` unless an `R` augmentation says otherwise
    pub fde_encoding: DwEhPe,
    pub lsda_encoding: Option<DwEhPe>,
    pub personality: Option<Pointer>,
    /// `S` augmentation: the frame is a signal handler's
    pub signal_frame: bool,
    pub(crate) has_augmentation_data: bool,
    pub(crate) instructions: Range<u64>,
}

/// Frame Description Entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fde
{
    pub offset: u64,
    pub cie: Rc<Cie>,
    pub initial_location: u64,
    pub address_range: u64,
    /// Language-specific data area, from an `L` augmentation
    pub lsda: Option<Pointer>,
    pub(crate) instructions: Range<u64>,
}

impl Fde
{
    /// One past the last address this FDE describes
    pub const fn end_address(&self) -> u64
    {
        self.initial_location.saturating_add(self.address_range)
    }

    pub const fn contains(&self, pc: Address) -> bool
    {
        pc.value() >= self.initial_location && pc.value() < self.end_address()
    }
}

/// What a record header says follows it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RecordKind
{
    /// A zero length: the end of `.eh_frame`, padding in `.debug_frame`
    Terminator,
    Cie,
    Fde
    {
        cie_offset: u64,
    },
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Record
{
    pub offset: u64,
    pub format: Format,
    /// Offset one past the record
    pub end: u64,
    pub kind: RecordKind,
}

/// Read a record header, leaving `cursor` at the start of the body.
pub(crate) fn read_record(cursor: &mut ByteCursor<'_>, section: CfiSection) -> DwarfResult<Record>
{
    let offset = cursor.position();
    let (length, format) = cursor.read_initial_length()?;
    if length == 0 {
        return Ok(Record {
            offset,
            format,
            end: cursor.position(),
            kind: RecordKind::Terminator,
        });
    }
    let end = cursor
        .position()
        .checked_add(length)
        .filter(|end| *end <= cursor.data().len() as u64)
        .ok_or(DwarfError::UnexpectedEof { offset })?;

    let id_position = cursor.position();
    let id = cursor.read_offset(format)?;
    let kind = match section {
        CfiSection::DebugFrame => {
            let cie_id = match format {
                Format::Dwarf32 => 0xffff_ffff,
                Format::Dwarf64 => u64::MAX,
            };
            if id == cie_id {
                RecordKind::Cie
            } else {
                RecordKind::Fde { cie_offset: id }
            }
        }
        CfiSection::EhFrame if id == 0 => RecordKind::Cie,
        CfiSection::EhFrame => RecordKind::Fde {
            cie_offset: id_position
                .checked_sub(id)
                .ok_or_else(|| DwarfError::malformed(id_position, "CIE pointer before section start"))?,
        },
    };
    Ok(Record {
        offset,
        format,
        end,
        kind,
    })
}

/// Parse a CIE body.
///
/// ## Errors
///
/// - `UnsupportedVersion` for versions other than 1, 3 and 4
/// - `Unsupported` for the GCC 2.x `eh` augmentation and for augmentations
///   without a `z` length prefix, whose layout is unknown
pub(crate) fn parse_cie(cursor: &mut ByteCursor<'_>, record: &Record, config: &CfiConfig) -> DwarfResult<Cie>
{
    let version = cursor.read_u8()?;
    if !matches!(version, 1 | 3 | 4) {
        return Err(DwarfError::UnsupportedVersion {
            version: u16::from(version),
            offset: record.offset,
        });
    }
    let augmentation = String::from_utf8_lossy(cursor.read_cstr()?).into_owned();
    if augmentation.contains("eh") {
        return Err(DwarfError::Unsupported(format!(
            "GCC 2.x \"eh\" augmentation in CIE at 0x{:x}",
            record.offset
        )));
    }
    let (address_size, segment_size) = if version >= 4 {
        (cursor.read_u8()?, cursor.read_u8()?)
    } else {
        (config.address_size, 0)
    };
    let code_alignment_factor = cursor.read_uleb128()?;
    let data_alignment_factor = cursor.read_sleb128()?;
    let return_address_register = if version == 1 {
        u16::from(cursor.read_u8()?)
    } else {
        let position = cursor.position();
        u16::try_from(cursor.read_uleb128()?)
            .map_err(|_| DwarfError::malformed(position, "return address register out of range"))?
    };

    let mut cie = Cie {
        offset: record.offset,
        format: record.format,
        version,
        augmentation: augmentation.clone(),
        address_size,
        segment_size,
        code_alignment_factor,
        data_alignment_factor,
        return_address_register: Register(return_address_register),
        fde_encoding: gimli::DW_EH_PE_absptr,
        lsda_encoding: None,
        personality: None,
        signal_frame: false,
        has_augmentation_data: false,
        instructions: 0..0,
    };

    if let Some(letters) = augmentation.strip_prefix('z') {
        let length = cursor.read_uleb128()?;
        let mut data = cursor.split(length)?;
        for letter in letters.chars() {
            match letter {
                'L' => {
                    let encoding = DwEhPe(data.read_u8()?);
                    cie.lsda_encoding = (encoding != gimli::DW_EH_PE_omit).then_some(encoding);
                }
                'P' => {
                    let encoding = DwEhPe(data.read_u8()?);
                    if encoding != gimli::DW_EH_PE_omit {
                        cie.personality = Some(read_pointer(&mut data, encoding, address_size, &config.bases, None)?);
                    }
                }
                'R' => cie.fde_encoding = DwEhPe(data.read_u8()?),
                'S' => cie.signal_frame = true,
                other => {
                    // the length prefix lets the rest be skipped
                    debug!(cie = record.offset, letter = %other, "unknown augmentation letter");
                    break;
                }
            }
        }
        cie.has_augmentation_data = true;
    } else if !augmentation.is_empty() {
        return Err(DwarfError::Unsupported(format!(
            "augmentation \"{augmentation}\" in CIE at 0x{:x}",
            record.offset
        )));
    }

    cie.instructions = cursor.position()..record.end;
    Ok(cie)
}

/// Parse an FDE body whose CIE has already been read.
pub(crate) fn parse_fde(
    cursor: &mut ByteCursor<'_>,
    record: &Record,
    cie: Rc<Cie>,
    config: &CfiConfig,
) -> DwarfResult<Fde>
{
    let encoding = match config.section {
        CfiSection::DebugFrame => gimli::DW_EH_PE_absptr,
        CfiSection::EhFrame => cie.fde_encoding,
    };
    if cie.segment_size > 0 {
        cursor.skip(u64::from(cie.segment_size))?;
    }

    let location_offset = cursor.position();
    let initial_location = match read_pointer(cursor, encoding, cie.address_size, &config.bases, None)? {
        Pointer::Direct(address) => address,
        Pointer::Indirect(_) => {
            return Err(DwarfError::UnsupportedPointerEncoding {
                encoding,
                offset: location_offset,
            })
        }
    };
    // the range is a length, so only the storage format applies
    let address_range = read_value(cursor, DwEhPe(encoding.0 & 0x0f), cie.address_size)?;

    let mut lsda = None;
    if cie.has_augmentation_data {
        let length = cursor.read_uleb128()?;
        let mut data = cursor.split(length)?;
        if let Some(lsda_encoding) = cie.lsda_encoding {
            lsda = Some(read_pointer(
                &mut data,
                lsda_encoding,
                cie.address_size,
                &config.bases,
                Some(initial_location),
            )?);
        }
    }

    Ok(Fde {
        offset: record.offset,
        cie,
        initial_location,
        address_range,
        lsda,
        instructions: cursor.position()..record.end,
    })
}
