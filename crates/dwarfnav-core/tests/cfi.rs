//! Unwind rows from hand-assembled `.debug_frame` and `.eh_frame` sections

mod common;

use std::collections::HashMap;

use common::{uleb, FrameBuilder};
use dwarfnav_core::cfi::{CfaRule, CfiBases, CfiConfig, CfiDecoder, RegisterRule};
use dwarfnav_core::error::{DwarfError, DwarfResult, ErrorKind};
use dwarfnav_core::expr::{EvalContext, MemoryAccess, RegisterFile};
use dwarfnav_core::types::Address;
use gimli::{Register, RunTimeEndian};

const RSP: Register = Register(7);
const RBP: Register = Register(6);
const RA: Register = Register(16);

/// def_cfa r7 8; offset r16 1 (return address at CFA-8)
const CIE_PROLOGUE: [u8; 5] = [0x0c, 0x07, 0x08, 0x90, 0x01];

/// advance 4; def_cfa_offset 16; advance 8; offset r6 2
const PUSH_RBP: [u8; 6] = [0x44, 0x0e, 0x10, 0x48, 0x86, 0x02];

/// advance 1; remember_state; def_cfa_offset 32; offset r6 4; advance 2; restore_state
const REMEMBERED: [u8; 8] = [0x41, 0x0a, 0x0e, 0x20, 0x86, 0x04, 0x42, 0x0b];

fn debug_frame() -> Vec<u8>
{
    let mut frames = FrameBuilder::default();
    let cie = frames.cie(1, -8, 16, &CIE_PROLOGUE);
    // written out of address order; the decoder sorts
    frames.fde(cie, 0x2000, 0x30, &REMEMBERED);
    frames.fde(cie, 0x1000, 0x20, &PUSH_RBP);
    let mut data = frames.finish();
    // zero-length padding record
    data.extend_from_slice(&[0; 4]);
    data
}

fn decoder(data: &[u8]) -> CfiDecoder<'_>
{
    CfiDecoder::new(data, CfiConfig::debug_frame(8, RunTimeEndian::Little))
}

fn offset_cfa(offset: i64) -> CfaRule
{
    CfaRule::RegisterOffset { register: RSP, offset }
}

#[test]
fn test_fdes_are_indexed_and_sorted()
{
    let data = debug_frame();
    let decoder = decoder(&data);
    let fdes = decoder.fdes().unwrap();

    assert_eq!(fdes.len(), 2);
    assert_eq!(fdes[0].initial_location, 0x1000);
    assert_eq!(fdes[1].initial_location, 0x2000);
    assert_eq!(fdes[0].cie.data_alignment_factor, -8);
    assert_eq!(fdes[0].cie.return_address_register, RA);
    assert!(std::rc::Rc::ptr_eq(&fdes[0].cie, &fdes[1].cie));
}

#[test]
fn test_fde_for_pc_bounds()
{
    let data = debug_frame();
    let decoder = decoder(&data);

    assert_eq!(decoder.fde_for_pc(Address::new(0x1000)).unwrap().unwrap().initial_location, 0x1000);
    assert_eq!(decoder.fde_for_pc(Address::new(0x101f)).unwrap().unwrap().initial_location, 0x1000);
    assert!(decoder.fde_for_pc(Address::new(0x1020)).unwrap().is_none());
    assert!(decoder.fde_for_pc(Address::new(0x0fff)).unwrap().is_none());
    assert!(decoder.unwind_row(Address::new(0x1800)).unwrap().is_none());
}

#[test]
fn test_prologue_rows()
{
    let data = debug_frame();
    let decoder = decoder(&data);
    let fde = decoder.fde_for_pc(Address::new(0x1000)).unwrap().unwrap().clone();
    let table = decoder.unwind_table(&fde).unwrap();

    let bounds: Vec<(u64, u64)> = table
        .rows()
        .iter()
        .map(|row| (row.start_address().value(), row.end_address().value()))
        .collect();
    assert_eq!(bounds, vec![(0x1000, 0x1004), (0x1004, 0x100c), (0x100c, 0x1020)]);

    let rows = table.rows();
    assert_eq!(rows[0].cfa(), &offset_cfa(8));
    assert_eq!(rows[0].register(RA), RegisterRule::Offset(-8));
    assert_eq!(rows[0].register(RBP), RegisterRule::Undefined);

    assert_eq!(rows[1].cfa(), &offset_cfa(16));
    assert_eq!(rows[1].register(RBP), RegisterRule::Undefined);

    assert_eq!(rows[2].cfa(), &offset_cfa(16));
    assert_eq!(rows[2].register(RBP), RegisterRule::Offset(-16));
    assert_eq!(rows[2].register(RA), RegisterRule::Offset(-8));

    assert_eq!(table.row_for(Address::new(0x1010)), Some(&rows[2]));
    assert_eq!(table.row_for(Address::new(0x1020)), None);
}

#[test]
fn test_remember_and_restore_state()
{
    let data = debug_frame();
    let decoder = decoder(&data);

    let row = |pc: u64| decoder.unwind_row(Address::new(pc)).unwrap().unwrap();
    assert_eq!(row(0x2000).cfa(), &offset_cfa(8));

    let inner = row(0x2001);
    assert_eq!(inner.cfa(), &offset_cfa(32));
    assert_eq!(inner.register(RBP), RegisterRule::Offset(-32));
    assert_eq!(inner.end_address(), Address::new(0x2003));

    let restored = row(0x2003);
    assert_eq!(restored.cfa(), &offset_cfa(8));
    assert_eq!(restored.register(RBP), RegisterRule::Undefined);
    assert_eq!(restored.register(RA), RegisterRule::Offset(-8));
    assert_eq!(restored.end_address(), Address::new(0x2030));
}

#[test]
fn test_row_display_with_register_names()
{
    let data = debug_frame();
    let decoder = decoder(&data);
    let row = decoder.unwind_row(Address::new(0x100c)).unwrap().unwrap();

    let plain = row.to_string();
    assert!(plain.ends_with(") cfa=r7+16 r16=c-8 r6=c-16"), "{plain}");
    let named = row.display_with(gimli::X86_64::register_name).to_string();
    assert!(named.contains("cfa=rsp+16"), "{named}");
    assert!(named.ends_with(" rbp=c-16"), "{named}");
}

struct Frame
{
    registers: HashMap<u16, u64>,
    memory: HashMap<u64, u64>,
}

impl RegisterFile for Frame
{
    fn read_register(&self, register: Register) -> DwarfResult<u64>
    {
        self.registers
            .get(&register.0)
            .copied()
            .ok_or(DwarfError::Unsupported(format!("register {}", register.0)))
    }
}

impl MemoryAccess for Frame
{
    fn read_u64(&self, address: Address) -> DwarfResult<u64>
    {
        self.memory
            .get(&address.value())
            .copied()
            .ok_or(DwarfError::Unsupported(format!("unmapped {address}")))
    }
}

#[test]
fn test_recover_caller_registers()
{
    let data = debug_frame();
    let decoder = decoder(&data);
    let frame = Frame {
        registers: HashMap::from([(7, 0x7fff_0000)]),
        memory: HashMap::from([(0x7fff_0000, 0x7fff_0100), (0x7fff_0008, 0x40_1234)]),
    };
    let ctx = EvalContext::new().with_registers(&frame).with_memory(&frame);

    let row = decoder.unwind_row(Address::new(0x100c)).unwrap().unwrap();
    assert_eq!(row.cfa_value(&ctx).unwrap(), 0x7fff_0010);
    assert_eq!(row.recover(RBP, &ctx).unwrap(), Some(0x7fff_0100));
    assert_eq!(row.recover(RA, &ctx).unwrap(), Some(0x40_1234));
    assert_eq!(row.recover(Register(3), &ctx).unwrap(), None);

    let no_memory = EvalContext::new().with_registers(&frame);
    assert!(matches!(row.recover(RBP, &no_memory), Err(DwarfError::NoMemoryReader)));
}

#[test]
fn test_unknown_instruction_is_unsupported()
{
    let mut frames = FrameBuilder::default();
    let cie = frames.cie(1, -8, 16, &CIE_PROLOGUE);
    // advance 1; DW_CFA_MIPS_advance_loc8
    frames.fde(cie, 0x1000, 0x10, &[0x41, 0x1d, 0, 0, 0, 0, 0, 0, 0, 0]);
    let data = frames.finish();
    let decoder = decoder(&data);

    let err = decoder.unwind_row(Address::new(0x1000)).unwrap_err();
    assert!(matches!(err, DwarfError::UnsupportedCfi { .. }));
    assert_eq!(err.kind(), ErrorKind::UnsupportedFeature);
}

/// An `.eh_frame` with a "zR" CIE and one pc-relative FDE at 0x1000
fn eh_frame(section_address: u64) -> Vec<u8>
{
    fn record(out: &mut Vec<u8>, mut body: Vec<u8>)
    {
        while body.len() % 4 != 0 {
            body.push(0);
        }
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(&body);
    }

    let mut data = Vec::new();
    let mut cie = 0u32.to_le_bytes().to_vec();
    cie.push(1);
    cie.extend_from_slice(b"zR\0");
    uleb(1, &mut cie);
    cie.push(0x78); // data alignment -8
    cie.push(16);
    uleb(1, &mut cie);
    cie.push(0x1b); // DW_EH_PE_pcrel | DW_EH_PE_sdata4
    cie.extend_from_slice(&CIE_PROLOGUE);
    record(&mut data, cie);

    let fde_offset = data.len() as u64;
    let id_position = fde_offset + 4;
    let mut fde = (id_position as u32).to_le_bytes().to_vec();
    let field = section_address + fde_offset + 8;
    fde.extend_from_slice(&((0x1000i64 - field as i64) as i32).to_le_bytes());
    fde.extend_from_slice(&0x20i32.to_le_bytes());
    uleb(0, &mut fde);
    fde.extend_from_slice(&PUSH_RBP);
    record(&mut data, fde);

    data.extend_from_slice(&[0; 4]);
    data
}

#[test]
fn test_eh_frame_pc_relative_fde()
{
    let data = eh_frame(0x3000);
    let config = CfiConfig::eh_frame(8, RunTimeEndian::Little).with_bases(CfiBases::default().with_section(0x3000));
    let decoder = CfiDecoder::new(&data, config);

    let fde = decoder.fde_for_pc(Address::new(0x1008)).unwrap().unwrap();
    assert_eq!(fde.initial_location, 0x1000);
    assert_eq!(fde.address_range, 0x20);
    assert_eq!(fde.cie.augmentation, "zR");
    assert_eq!(fde.cie.fde_encoding, gimli::DwEhPe(0x1b));

    let row = decoder.unwind_row(Address::new(0x100c)).unwrap().unwrap();
    assert_eq!(row.cfa(), &offset_cfa(16));
    assert_eq!(row.register(RBP), RegisterRule::Offset(-16));
}

#[test]
fn test_big_endian_four_byte_frame()
{
    // CIE with no initial instructions; advance 4; def_cfa r7 16; advance 8; offset r6 2
    let program = [0x44, 0x0c, 0x07, 0x10, 0x48, 0x86, 0x02];
    let mut frames = FrameBuilder::new(4, true);
    let cie = frames.cie(1, -8, 16, &[]);
    frames.fde(cie, 0x8000, 0x20, &program);
    let data = frames.finish();
    let decoder = CfiDecoder::new(&data, CfiConfig::debug_frame(4, RunTimeEndian::Big));

    let fde = decoder.fde_for_pc(Address::new(0x8000)).unwrap().unwrap().clone();
    assert_eq!(fde.address_range, 0x20);
    let table = decoder.unwind_table(&fde).unwrap();
    let rows = table.rows();
    let bounds: Vec<(u64, u64)> = rows
        .iter()
        .map(|row| (row.start_address().value(), row.end_address().value()))
        .collect();
    assert_eq!(bounds, vec![(0x8000, 0x8004), (0x8004, 0x800c), (0x800c, 0x8020)]);

    assert_eq!(rows[0].cfa(), &CfaRule::Undefined);
    assert_eq!(rows[0].register(RBP), RegisterRule::Undefined);
    assert_eq!(rows[0].register(RA), RegisterRule::Undefined);

    assert_eq!(rows[1].cfa(), &offset_cfa(16));
    assert_eq!(rows[1].register(RBP), RegisterRule::Undefined);

    assert_eq!(rows[2].cfa(), &offset_cfa(16));
    assert_eq!(rows[2].register(RBP), RegisterRule::Offset(-16));
}
