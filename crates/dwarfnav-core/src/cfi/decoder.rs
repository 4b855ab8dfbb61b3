//! Lazy FDE index and per-PC unwind lookup.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::Range;
use std::rc::Rc;

use once_cell::unsync::OnceCell;
use tracing::debug;

use super::entry::{parse_cie, parse_fde, read_record, CfiConfig, CfiSection, Cie, Fde, RecordKind};
use super::instr::{parse_instructions, Program};
use super::table::{TableBuilder, UnwindRow, UnwindTable};
use crate::error::{DwarfError, DwarfResult};
use crate::reader::ByteCursor;
use crate::types::Address;

/// Decoder over one `.debug_frame` or `.eh_frame` section.
///
/// CIEs are parsed once and shared by their FDEs. The FDE index is built on
/// the first PC lookup.
pub struct CfiDecoder<'a>
{
    data: &'a [u8],
    config: CfiConfig,
    cies: RefCell<HashMap<u64, Rc<Cie>>>,
    fdes: OnceCell<Vec<Fde>>,
}

impl<'a> CfiDecoder<'a>
{
    pub fn new(data: &'a [u8], config: CfiConfig) -> Self
    {
        Self {
            data,
            config,
            cies: RefCell::default(),
            fdes: OnceCell::new(),
        }
    }

    pub const fn config(&self) -> &CfiConfig
    {
        &self.config
    }

    fn cursor_at(&self, offset: u64) -> DwarfResult<ByteCursor<'a>>
    {
        ByteCursor::at(self.data, self.config.endian, offset, self.config.section.name())
    }

    /// The CIE at `offset`.
    ///
    /// ## Errors
    ///
    /// `Malformed` if the record there is not a CIE, or any parse error.
    pub fn cie_at(&self, offset: u64) -> DwarfResult<Rc<Cie>>
    {
        if let Some(cie) = self.cies.borrow().get(&offset) {
            return Ok(Rc::clone(cie));
        }
        let mut cursor = self.cursor_at(offset)?;
        let record = read_record(&mut cursor, self.config.section)?;
        if record.kind != RecordKind::Cie {
            return Err(DwarfError::malformed(offset, "expected a CIE"));
        }
        let cie = Rc::new(parse_cie(&mut cursor, &record, &self.config)?);
        debug!(offset, augmentation = %cie.augmentation, version = cie.version, "parsed CIE");
        self.cies.borrow_mut().insert(offset, Rc::clone(&cie));
        Ok(cie)
    }

    /// The FDE at `offset`.
    ///
    /// ## Errors
    ///
    /// `Malformed` if the record there is not an FDE, or any parse error.
    pub fn fde_at(&self, offset: u64) -> DwarfResult<Fde>
    {
        let mut cursor = self.cursor_at(offset)?;
        let record = read_record(&mut cursor, self.config.section)?;
        let RecordKind::Fde { cie_offset } = record.kind else {
            return Err(DwarfError::malformed(offset, "expected an FDE"));
        };
        let cie = self.cie_at(cie_offset)?;
        parse_fde(&mut cursor, &record, cie, &self.config)
    }

    /// Every FDE in the section, sorted by initial location.
    ///
    /// Computed on first call. A zero-length record ends `.eh_frame`; in
    /// `.debug_frame` it is skipped as padding.
    ///
    /// ## Errors
    ///
    /// The first record that fails to parse.
    pub fn fdes(&self) -> DwarfResult<&[Fde]>
    {
        self.fdes
            .get_or_try_init(|| {
                let mut fdes = Vec::new();
                let mut offset = 0;
                while offset < self.data.len() as u64 {
                    let mut cursor = self.cursor_at(offset)?;
                    let record = read_record(&mut cursor, self.config.section)?;
                    match record.kind {
                        RecordKind::Terminator if self.config.section == CfiSection::EhFrame => break,
                        RecordKind::Terminator => {}
                        RecordKind::Cie => {
                            self.cie_at(offset)?;
                        }
                        RecordKind::Fde { cie_offset } => {
                            let cie = self.cie_at(cie_offset)?;
                            fdes.push(parse_fde(&mut cursor, &record, cie, &self.config)?);
                        }
                    }
                    offset = record.end;
                }
                fdes.sort_by_key(|fde| fde.initial_location);
                debug!(
                    section = self.config.section.name(),
                    fdes = fdes.len(),
                    cies = self.cies.borrow().len(),
                    "indexed call frame information"
                );
                Ok(fdes)
            })
            .map(Vec::as_slice)
    }

    /// The FDE whose range covers `pc`
    pub fn fde_for_pc(&self, pc: Address) -> DwarfResult<Option<&Fde>>
    {
        let fdes = self.fdes()?;
        let index = fdes.partition_point(|fde| fde.initial_location <= pc.value());
        Ok(index
            .checked_sub(1)
            .and_then(|index| fdes.get(index))
            .filter(|fde| fde.contains(pc)))
    }

    /// Decode the CIE's initial instructions and the FDE's own.
    ///
    /// ## Errors
    ///
    /// `UnsupportedCfi` for an instruction outside the supported set.
    pub fn instructions(&self, fde: &Fde) -> DwarfResult<(Program, Program)>
    {
        let cie = &fde.cie;
        let initial = self.program(cie.instructions.clone(), cie)?;
        let own = self.program(fde.instructions.clone(), cie)?;
        Ok((initial, own))
    }

    fn program(&self, range: Range<u64>, cie: &Cie) -> DwarfResult<Program>
    {
        let length = range
            .end
            .checked_sub(range.start)
            .ok_or_else(|| DwarfError::malformed(range.start, "record body overruns its length"))?;
        let mut cursor = self.cursor_at(range.start)?;
        let mut program = cursor.split(length)?;
        parse_instructions(&mut program, cie, &self.config)
    }

    /// Run the CIE's and then the FDE's instructions into a table.
    ///
    /// ## Errors
    ///
    /// `UnsupportedCfi` for an instruction outside the supported set, and
    /// `Malformed` for a location that moves backwards or leaves the FDE.
    pub fn unwind_table(&self, fde: &Fde) -> DwarfResult<UnwindTable>
    {
        let (initial, own) = self.instructions(fde)?;
        let mut builder = TableBuilder::new(fde.initial_location);
        builder.run_initial(&initial)?;
        builder.run(&own)?;
        builder.finish(fde.end_address())
    }

    /// The unwind row in force at `pc`.
    ///
    /// Returns `Ok(None)` when no FDE covers `pc`.
    pub fn unwind_row(&self, pc: Address) -> DwarfResult<Option<UnwindRow>>
    {
        let Some(fde) = self.fde_for_pc(pc)? else {
            return Ok(None);
        };
        let table = self.unwind_table(fde)?;
        Ok(table.into_rows().into_iter().find(|row| row.contains(pc)))
    }
}

impl std::fmt::Debug for CfiDecoder<'_>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("CfiDecoder")
            .field("section", &self.config.section)
            .field("len", &self.data.len())
            .field("cies", &self.cies.borrow().len())
            .field("fdes", &self.fdes.get().map(Vec::len))
            .finish()
    }
}
