//! Location expressions parsed from bytes and evaluated

use std::collections::HashMap;

use dwarfnav_core::attr::AddressRange;
use dwarfnav_core::error::{DwarfError, DwarfResult, ErrorKind};
use dwarfnav_core::expr::{
    Accept, EvalContext, ExprEvaluator, LocExpr, LocList, LocListEntry, MemoryAccess, Outcome, RegisterFile,
    MAX_STACK_DEPTH,
};
use dwarfnav_core::types::Address;
use gimli::{Encoding, Format, Register};

const ENCODING: Encoding = Encoding {
    format: Format::Dwarf32,
    version: 4,
    address_size: 8,
};

struct Registers;

impl RegisterFile for Registers
{
    fn read_register(&self, register: Register) -> DwarfResult<u64>
    {
        match register.0 {
            0 => Ok(0xdead),
            6 => Ok(0x7ff0_0000),
            other => Err(DwarfError::Unsupported(format!("register {other}"))),
        }
    }
}

struct Memory(HashMap<u64, u64>);

impl MemoryAccess for Memory
{
    fn read_u64(&self, address: Address) -> DwarfResult<u64>
    {
        self.0
            .get(&address.value())
            .copied()
            .ok_or(DwarfError::Unsupported(format!("unmapped {address}")))
    }
}

fn parse(bytes: &[u8]) -> LocExpr
{
    LocExpr::parse(bytes, ENCODING).unwrap()
}

#[test]
fn test_arithmetic_leaves_an_address()
{
    // DW_OP_lit5 DW_OP_lit3 DW_OP_plus
    let expr = parse(&[0x35, 0x33, 0x22]);
    let evaluator = ExprEvaluator::evaluate(&expr, EvalContext::new()).unwrap();

    assert_eq!(evaluator.outcome(), Outcome::Address);
    assert_eq!(evaluator.tos(Accept::ADDRESS).unwrap(), 8);
    assert!(evaluator.is_finished());
    assert!(matches!(
        evaluator.tos(Accept::VALUE),
        Err(DwarfError::UnacceptedOutcome { .. })
    ));
}

#[test]
fn test_frame_base_offset()
{
    // DW_OP_fbreg -8
    let expr = parse(&[0x91, 0x78]);
    let ctx = EvalContext::new().with_frame_base(0x1000);
    let evaluator = ExprEvaluator::evaluate(&expr, ctx).unwrap();
    assert_eq!(evaluator.tos(Accept::ADDRESS).unwrap(), 0xff8);

    let err = ExprEvaluator::evaluate(&expr, EvalContext::new()).err().unwrap();
    assert!(matches!(err, DwarfError::NoFrameBase));
    assert_eq!(err.kind(), ErrorKind::LogicPrecondition);
}

#[test]
fn test_stack_value_is_a_value()
{
    // DW_OP_lit5 DW_OP_stack_value
    let expr = parse(&[0x35, 0x9f]);
    let evaluator = ExprEvaluator::evaluate(&expr, EvalContext::new()).unwrap();

    assert_eq!(evaluator.outcome(), Outcome::Value);
    assert_eq!(evaluator.tos(Accept::VALUE).unwrap(), 5);
    assert_eq!(evaluator.tos(Accept::ADDRESS | Accept::VALUE).unwrap(), 5);
}

#[test]
fn test_pieces_halt_and_resume()
{
    // DW_OP_reg0 DW_OP_piece 4 DW_OP_fbreg -16 DW_OP_piece 4
    let expr = parse(&[0x50, 0x93, 0x04, 0x91, 0x70, 0x93, 0x04]);
    let registers = Registers;
    let ctx = EvalContext::new().with_registers(&registers).with_frame_base(0x2000);
    let mut evaluator = ExprEvaluator::evaluate(&expr, ctx).unwrap();

    assert_eq!(evaluator.piece_size(), Some(4));
    assert_eq!(evaluator.in_register(), Some(Register(0)));
    assert_eq!(evaluator.tos(Accept::VALUE).unwrap(), 0xdead);
    assert!(!evaluator.is_finished());

    assert!(evaluator.resume().unwrap());
    assert_eq!(evaluator.piece_size(), Some(4));
    assert_eq!(evaluator.in_register(), None);
    assert_eq!(evaluator.tos(Accept::ADDRESS).unwrap(), 0x1ff0);
    assert!(evaluator.is_finished());
    assert!(!evaluator.resume().unwrap());
}

#[test]
fn test_piece_split()
{
    let expr = parse(&[0x50, 0x93, 0x04, 0x91, 0x70, 0x93, 0x04]);
    let pieces = expr.pieces();
    assert_eq!(pieces.len(), 2);
    assert_eq!(pieces[0].1, Some(4));
    assert_eq!(pieces[1].0.ops()[0].opcode, gimli::DW_OP_fbreg);

    let list = LocList::universal(expr);
    let (piece, start, size) = list.piece_for_offset(Address::new(0), 6).unwrap();
    assert_eq!((start, size), (4, Some(4)));
    assert_eq!(piece.ops()[0].operand1_signed(), -16);
    assert!(list.piece_for_offset(Address::new(0), 8).is_none());
}

#[test]
fn test_piece_offsets_near_the_top_of_the_range()
{
    // DW_OP_reg0 DW_OP_piece u64::MAX DW_OP_reg1 DW_OP_piece 4
    let mut bytes = vec![0x50, 0x93];
    bytes.extend_from_slice(&[0xff; 9]);
    bytes.extend_from_slice(&[0x01, 0x51, 0x93, 0x04]);
    let list = LocList::universal(parse(&bytes));

    let (piece, start, size) = list.piece_for_offset(Address::new(0), u64::MAX).unwrap();
    assert_eq!((start, size), (u64::MAX, Some(4)));
    assert_eq!(piece.ops()[0].opcode, gimli::DW_OP_reg1);
}

#[test]
fn test_breg_and_deref()
{
    // DW_OP_breg6 +8 DW_OP_deref
    let expr = parse(&[0x76, 0x08, 0x06]);
    let registers = Registers;
    let memory = Memory(HashMap::from([(0x7ff0_0008, 0x55aa)]));
    let ctx = EvalContext::new().with_registers(&registers).with_memory(&memory);
    let evaluator = ExprEvaluator::evaluate(&expr, ctx).unwrap();
    assert_eq!(evaluator.tos(Accept::ADDRESS).unwrap(), 0x55aa);

    let ctx = EvalContext::new().with_registers(&registers);
    let err = ExprEvaluator::evaluate(&expr, ctx).err().unwrap();
    assert!(matches!(err, DwarfError::NoMemoryReader));
    assert_eq!(err.kind(), ErrorKind::UnsupportedFeature);
}

#[test]
fn test_call_frame_cfa()
{
    // DW_OP_call_frame_cfa DW_OP_consts -16 DW_OP_plus
    let expr = parse(&[0x9c, 0x11, 0x70, 0x22]);
    let ctx = EvalContext::new().with_cfa(0x7fff_0100);
    let evaluator = ExprEvaluator::evaluate(&expr, ctx).unwrap();
    assert_eq!(evaluator.tos(Accept::ADDRESS).unwrap(), 0x7fff_00f0);

    assert!(matches!(
        ExprEvaluator::evaluate(&expr, EvalContext::new()).err(),
        Some(DwarfError::NoCfa)
    ));
}

#[test]
fn test_location_list_selects_by_pc()
{
    let entry = |begin: u64, end: u64, bytes: &[u8]| LocListEntry {
        range: AddressRange::new(Address::new(begin), Address::new(end)),
        expr: parse(bytes),
    };
    // lit1 stack_value in [0x100, 0x110), lit2 stack_value in [0x110, 0x120)
    let list = LocList::new(vec![entry(0x100, 0x110, &[0x31, 0x9f]), entry(0x110, 0x120, &[0x32, 0x9f])]);

    let at = |pc: u64| {
        ExprEvaluator::for_pc(&list, Address::new(pc), EvalContext::new())
            .unwrap()
            .map(|evaluator| evaluator.tos(Accept::VALUE).unwrap())
    };
    assert_eq!(at(0x100), Some(1));
    assert_eq!(at(0x10f), Some(1));
    assert_eq!(at(0x110), Some(2));
    assert_eq!(at(0x120), None);
}

#[test]
fn test_unsupported_opcode_is_reported()
{
    // DW_OP_push_object_address
    let expr = parse(&[0x97]);
    match ExprEvaluator::evaluate(&expr, EvalContext::new()) {
        Err(DwarfError::UnsupportedOpcode { opcode, offset }) => {
            assert_eq!(opcode, gimli::DW_OP_push_object_address);
            assert_eq!(offset, 0);
        }
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("expected an error"),
    }
}

#[test]
fn test_backward_skip_loop_is_malformed()
{
    // DW_OP_skip -3, a branch to itself
    let expr = parse(&[0x2f, 0xfd, 0xff]);
    let err = ExprEvaluator::evaluate(&expr, EvalContext::new()).err().unwrap();
    assert!(matches!(err, DwarfError::Malformed { offset: 0, .. }));
    assert_eq!(err.kind(), ErrorKind::MalformedInput);
}

#[test]
fn test_growing_stack_loop_is_malformed()
{
    // DW_OP_lit1 DW_OP_dup DW_OP_skip -3 (back to the dup)
    let expr = parse(&[0x31, 0x12, 0x2f, 0xfd, 0xff]);
    let mut evaluator = ExprEvaluator::new(&expr, EvalContext::new());
    let err = evaluator.run().unwrap_err();
    assert!(matches!(err, DwarfError::Malformed { .. }));
    assert_eq!(evaluator.stack().len(), MAX_STACK_DEPTH + 1);
}
