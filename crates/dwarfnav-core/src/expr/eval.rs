//! Location-expression stack machine.
//!
//! [`ExprEvaluator`] runs a [`LocExpr`] over an operand stack. Register
//! reads, memory reads, the frame base and the CFA are supplied through an
//! [`EvalContext`]; an expression that needs one that was not supplied fails
//! instead of guessing.
//!
//! Evaluation halts at the end of the expression or after each
//! `DW_OP_piece`. After a piece the caller reads [`ExprEvaluator::piece_size`]
//! and the piece location from [`ExprEvaluator::tos`], then calls
//! [`ExprEvaluator::resume`] to evaluate the next piece on a cleared stack.
//!
//! ## References
//!
//! - [DWARF 5, section 2.5: DWARF Expressions](https://dwarfstd.org/doc/DWARF5.pdf#page=38)
//! - [DWARF 5, section 2.6: Location Descriptions](https://dwarfstd.org/doc/DWARF5.pdf#page=48)

use std::fmt;
use std::ops::BitOr;

use gimli::Register;
use smallvec::SmallVec;
use tracing::trace;

use super::loclist::LocList;
use super::op::{ExprOp, LocExpr};
use crate::error::{DwarfError, DwarfResult};
use crate::types::{Address, DieOffset};

/// Operations one evaluation may execute, counted across pieces
pub const MAX_STEPS: usize = 1 << 16;

/// Deepest operand stack an evaluation may build
pub const MAX_STACK_DEPTH: usize = 1024;

/// Read access to the target's registers.
pub trait RegisterFile
{
    /// Read the value of a DWARF-numbered register.
    fn read_register(&self, register: Register) -> DwarfResult<u64>;
}

/// Minimal memory accessor required for dereferencing.
///
/// ## Implementation Notes
///
/// Implementations should return errors for unreadable addresses, never
/// panic, and honour the target's byte order.
pub trait MemoryAccess
{
    /// Read a 64-bit value from the given address.
    fn read_u64(&self, address: Address) -> DwarfResult<u64>;

    /// Read `size` bytes (1..=8) as an unsigned value.
    ///
    /// The default reads a full word and keeps the low `size` bytes, which is
    /// right for little-endian targets.
    fn read_sized(&self, address: Address, size: u8) -> DwarfResult<u64>
    {
        let word = self.read_u64(address)?;
        Ok(if size >= 8 { word } else { word & ((1u64 << (u32::from(size) * 8)) - 1) })
    }
}

/// Everything an expression may consult besides its own stack.
#[derive(Clone, Copy)]
pub struct EvalContext<'c>
{
    pub frame_base: Option<u64>,
    pub cfa: Option<u64>,
    pub registers: Option<&'c dyn RegisterFile>,
    pub memory: Option<&'c dyn MemoryAccess>,
    /// Size of the generic type in bytes; results wrap at this width
    pub address_size: u8,
}

impl Default for EvalContext<'_>
{
    fn default() -> Self
    {
        Self {
            frame_base: None,
            cfa: None,
            registers: None,
            memory: None,
            address_size: 8,
        }
    }
}

impl<'c> EvalContext<'c>
{
    pub fn new() -> Self
    {
        Self::default()
    }

    #[must_use]
    pub const fn with_frame_base(mut self, frame_base: u64) -> Self
    {
        self.frame_base = Some(frame_base);
        self
    }

    #[must_use]
    pub const fn with_cfa(mut self, cfa: u64) -> Self
    {
        self.cfa = Some(cfa);
        self
    }

    #[must_use]
    pub fn with_registers(mut self, registers: &'c dyn RegisterFile) -> Self
    {
        self.registers = Some(registers);
        self
    }

    #[must_use]
    pub fn with_memory(mut self, memory: &'c dyn MemoryAccess) -> Self
    {
        self.memory = Some(memory);
        self
    }

    #[must_use]
    pub const fn with_address_size(mut self, address_size: u8) -> Self
    {
        self.address_size = address_size;
        self
    }
}

impl fmt::Debug for EvalContext<'_>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("EvalContext")
            .field("frame_base", &self.frame_base)
            .field("cfa", &self.cfa)
            .field("registers", &self.registers.is_some())
            .field("memory", &self.memory.is_some())
            .field("address_size", &self.address_size)
            .finish()
    }
}

/// What the top of the stack means once evaluation halts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome
{
    /// The object lives at the address on top of the stack
    Address,
    /// The top of the stack is the object's value (`DW_OP_stack_value`,
    /// `DW_OP_implicit_value`, or a register location read through the
    /// register file)
    Value,
    /// The object is a pointer to a DIE's value that was optimized away
    ImplicitPointer
    {
        target: DieOffset,
        offset: i64,
    },
}

impl Outcome
{
    const fn name(self) -> &'static str
    {
        match self {
            Outcome::Address => "an address",
            Outcome::Value => "a value",
            Outcome::ImplicitPointer { .. } => "an implicit pointer",
        }
    }

    const fn bit(self) -> u8
    {
        match self {
            Outcome::Address => Accept::ADDRESS.0,
            Outcome::Value => Accept::VALUE.0,
            Outcome::ImplicitPointer { .. } => Accept::IMPLICIT_POINTER.0,
        }
    }
}

/// Set of outcomes a caller is prepared to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accept(u8);

impl Accept
{
    pub const ADDRESS: Self = Accept(1);
    pub const VALUE: Self = Accept(2);
    pub const IMPLICIT_POINTER: Self = Accept(4);
    pub const ANY: Self = Accept(7);

    pub const fn contains(self, outcome: Outcome) -> bool
    {
        self.0 & outcome.bit() != 0
    }
}

impl BitOr for Accept
{
    type Output = Accept;

    fn bitor(self, rhs: Self) -> Self::Output
    {
        Accept(self.0 | rhs.0)
    }
}

impl fmt::Display for Accept
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let names: Vec<&str> = [
            (Accept::ADDRESS, "address"),
            (Accept::VALUE, "value"),
            (Accept::IMPLICIT_POINTER, "implicit pointer"),
        ]
        .iter()
        .filter(|(bit, _)| self.0 & bit.0 != 0)
        .map(|(_, name)| *name)
        .collect();
        write!(f, "{}", names.join(" | "))
    }
}

/// Stack-machine evaluator for one expression.
pub struct ExprEvaluator<'e, 'c>
{
    expr: &'e LocExpr,
    ctx: EvalContext<'c>,
    next: usize,
    steps: usize,
    stack: SmallVec<[u64; 16]>,
    outcome: Outcome,
    in_register: Option<Register>,
    piece_size: Option<u64>,
}

impl<'e, 'c> ExprEvaluator<'e, 'c>
{
    /// Prepare to evaluate `expr`; nothing runs until [`run`](Self::run).
    pub fn new(expr: &'e LocExpr, ctx: EvalContext<'c>) -> Self
    {
        Self {
            expr,
            ctx,
            next: 0,
            steps: 0,
            stack: SmallVec::new(),
            outcome: Outcome::Address,
            in_register: None,
            piece_size: None,
        }
    }

    /// Seed the stack before running (CFI expression rules start with the CFA pushed).
    #[must_use]
    pub fn with_initial_stack(mut self, values: &[u64]) -> Self
    {
        self.stack.extend_from_slice(values);
        self
    }

    /// Evaluate `expr` to its first halt.
    ///
    /// ## Errors
    ///
    /// Any error from [`run`](Self::run).
    pub fn evaluate(expr: &'e LocExpr, ctx: EvalContext<'c>) -> DwarfResult<Self>
    {
        let mut evaluator = Self::new(expr, ctx);
        evaluator.run()?;
        Ok(evaluator)
    }

    /// Select the entry of `list` valid at `pc` and evaluate it.
    ///
    /// Returns `Ok(None)` when no entry covers `pc`.
    pub fn for_pc(list: &'e LocList, pc: Address, ctx: EvalContext<'c>) -> DwarfResult<Option<Self>>
    {
        list.expr_for_pc(pc).map(|expr| Self::evaluate(expr, ctx)).transpose()
    }

    /// Run until the expression ends or a piece completes.
    ///
    /// ## Errors
    ///
    /// - `UnsupportedOpcode` for opcodes outside the implemented set
    /// - `NoRegisterFile`, `NoFrameBase`, `NoCfa` when the context lacks what an op needs
    /// - `NoMemoryReader` for a dereference without a memory reader
    /// - `StackUnderflow` when an operation finds too few operands
    /// - `BadAddressSize` when the context's address size is outside 1..=8
    /// - `Malformed` once [`MAX_STEPS`] operations have run or the stack grows
    ///   past [`MAX_STACK_DEPTH`], which is how looping branches end
    pub fn run(&mut self) -> DwarfResult<()>
    {
        if !(1..=8).contains(&self.ctx.address_size) {
            return Err(DwarfError::BadAddressSize {
                size: self.ctx.address_size,
            });
        }
        while let Some(op) = self.expr.ops().get(self.next) {
            let index = self.next;
            self.next += 1;
            self.steps += 1;
            if self.steps > MAX_STEPS {
                return Err(DwarfError::malformed(
                    op.offset as u64,
                    format!("expression did not finish within {MAX_STEPS} operations"),
                ));
            }
            trace!(op = %op, depth = self.stack.len(), "evaluating");
            let halt = self.step(op, index)?;
            if self.stack.len() > MAX_STACK_DEPTH {
                return Err(DwarfError::malformed(
                    op.offset as u64,
                    format!("expression stack deeper than {MAX_STACK_DEPTH}"),
                ));
            }
            if halt {
                break;
            }
        }
        Ok(())
    }

    /// Clear the stack and continue with the next piece.
    ///
    /// Returns `false` when the expression was already finished.
    pub fn resume(&mut self) -> DwarfResult<bool>
    {
        if self.is_finished() {
            return Ok(false);
        }
        self.stack.clear();
        self.outcome = Outcome::Address;
        self.in_register = None;
        self.piece_size = None;
        self.run()?;
        Ok(true)
    }

    pub fn is_finished(&self) -> bool
    {
        self.next >= self.expr.len()
    }

    /// Size in bytes of the piece that just completed, if halted on a piece
    pub const fn piece_size(&self) -> Option<u64>
    {
        self.piece_size
    }

    pub const fn outcome(&self) -> Outcome
    {
        self.outcome
    }

    /// Register named by a `DW_OP_reg*` location, if the expression was one
    pub const fn in_register(&self) -> Option<Register>
    {
        self.in_register
    }

    pub fn stack(&self) -> &[u64]
    {
        &self.stack
    }

    /// Result of the evaluation, checked against the outcomes the caller accepts.
    ///
    /// For an implicit pointer the result is the offset of the target DIE.
    ///
    /// ## Errors
    ///
    /// - `UnacceptedOutcome` if the halted state is not in `accept`
    /// - `StackUnderflow` if the stack is empty (an optimized-out piece)
    pub fn tos(&self, accept: Accept) -> DwarfResult<u64>
    {
        if !accept.contains(self.outcome) {
            return Err(DwarfError::UnacceptedOutcome {
                actual: self.outcome.name(),
                accepted: accept.to_string(),
            });
        }
        if let Outcome::ImplicitPointer { target, .. } = self.outcome {
            return Ok(target.value());
        }
        self.stack.last().copied().ok_or(DwarfError::StackUnderflow {
            offset: self.expr.byte_len(),
        })
    }

    fn mask(&self) -> u64
    {
        if self.ctx.address_size >= 8 {
            u64::MAX
        } else {
            (1u64 << (u32::from(self.ctx.address_size) * 8)) - 1
        }
    }

    fn push(&mut self, value: u64)
    {
        let masked = value & self.mask();
        self.stack.push(masked);
    }

    fn pop(&mut self, op: &ExprOp) -> DwarfResult<u64>
    {
        self.stack.pop().ok_or(DwarfError::StackUnderflow { offset: op.offset })
    }

    fn peek(&self, op: &ExprOp, depth: usize) -> DwarfResult<u64>
    {
        self.stack
            .len()
            .checked_sub(depth + 1)
            .map(|idx| self.stack[idx])
            .ok_or(DwarfError::StackUnderflow { offset: op.offset })
    }

    /// Sign-extend a generic-type value to `i64`
    fn signed(&self, value: u64) -> i64
    {
        let bits = u32::from(self.ctx.address_size.min(8)) * 8;
        if bits >= 64 {
            value as i64
        } else {
            let shift = 64 - bits;
            ((value << shift) as i64) >> shift
        }
    }

    fn read_register(&self, register: Register) -> DwarfResult<u64>
    {
        let registers = self.ctx.registers.ok_or(DwarfError::NoRegisterFile { register: register.0 })?;
        registers.read_register(register)
    }

    fn binary(&mut self, op: &ExprOp, f: impl FnOnce(&Self, u64, u64) -> DwarfResult<u64>) -> DwarfResult<()>
    {
        let rhs = self.pop(op)?;
        let lhs = self.pop(op)?;
        let result = f(self, lhs, rhs)?;
        self.push(result);
        Ok(())
    }

    fn compare(&mut self, op: &ExprOp, f: impl FnOnce(i64, i64) -> bool) -> DwarfResult<()>
    {
        self.binary(op, |this, lhs, rhs| Ok(u64::from(f(this.signed(lhs), this.signed(rhs)))))
    }

    fn jump(&mut self, op: &ExprOp, index: usize) -> DwarfResult<()>
    {
        let after = self.expr.offset_after(index) as i64;
        let target = after + op.operand1_signed();
        let target = usize::try_from(target)
            .ok()
            .and_then(|target| self.expr.index_at_offset(target))
            .ok_or_else(|| DwarfError::malformed(op.offset as u64, format!("branch to invalid offset {target}")))?;
        self.next = target;
        Ok(())
    }

    /// Execute one operation; returns `true` when evaluation must halt.
    #[allow(clippy::too_many_lines)]
    fn step(&mut self, op: &ExprOp, index: usize) -> DwarfResult<bool>
    {
        let raw = op.opcode.0;
        if (gimli::DW_OP_lit0.0..=gimli::DW_OP_lit31.0).contains(&raw) {
            self.push(u64::from(raw - gimli::DW_OP_lit0.0));
            return Ok(false);
        }
        if (gimli::DW_OP_breg0.0..=gimli::DW_OP_breg31.0).contains(&raw) {
            let base = self.read_register(Register(u16::from(raw - gimli::DW_OP_breg0.0)))?;
            self.push(base.wrapping_add_signed(op.operand1_signed()));
            return Ok(false);
        }
        if (gimli::DW_OP_reg0.0..=gimli::DW_OP_reg31.0).contains(&raw) {
            self.register_location(Register(u16::from(raw - gimli::DW_OP_reg0.0)))?;
            return Ok(false);
        }

        match op.opcode {
            gimli::DW_OP_addr
            | gimli::DW_OP_const1u
            | gimli::DW_OP_const2u
            | gimli::DW_OP_const4u
            | gimli::DW_OP_const8u
            | gimli::DW_OP_constu
            | gimli::DW_OP_const1s
            | gimli::DW_OP_const2s
            | gimli::DW_OP_const4s
            | gimli::DW_OP_const8s
            | gimli::DW_OP_consts => self.push(op.operand1()),

            gimli::DW_OP_dup => {
                let top = self.peek(op, 0)?;
                self.push(top);
            }
            gimli::DW_OP_drop => {
                self.pop(op)?;
            }
            gimli::DW_OP_over => {
                let second = self.peek(op, 1)?;
                self.push(second);
            }
            gimli::DW_OP_pick => {
                let depth = usize::try_from(op.operand1()).unwrap_or(usize::MAX);
                let picked = self.peek(op, depth)?;
                self.push(picked);
            }
            gimli::DW_OP_swap => {
                let top = self.pop(op)?;
                let second = self.pop(op)?;
                self.stack.push(top);
                self.stack.push(second);
            }
            gimli::DW_OP_rot => {
                let first = self.pop(op)?;
                let second = self.pop(op)?;
                let third = self.pop(op)?;
                self.stack.push(first);
                self.stack.push(third);
                self.stack.push(second);
            }

            gimli::DW_OP_abs => {
                let value = self.pop(op)?;
                let abs = self.signed(value).unsigned_abs();
                self.push(abs);
            }
            gimli::DW_OP_neg => {
                let value = self.pop(op)?;
                let neg = self.signed(value).wrapping_neg() as u64;
                self.push(neg);
            }
            gimli::DW_OP_not => {
                let value = self.pop(op)?;
                self.push(!value);
            }
            gimli::DW_OP_plus_uconst => {
                let value = self.pop(op)?;
                self.push(value.wrapping_add(op.operand1()));
            }
            gimli::DW_OP_and => self.binary(op, |_, a, b| Ok(a & b))?,
            gimli::DW_OP_or => self.binary(op, |_, a, b| Ok(a | b))?,
            gimli::DW_OP_xor => self.binary(op, |_, a, b| Ok(a ^ b))?,
            gimli::DW_OP_plus => self.binary(op, |_, a, b| Ok(a.wrapping_add(b)))?,
            gimli::DW_OP_minus => self.binary(op, |_, a, b| Ok(a.wrapping_sub(b)))?,
            gimli::DW_OP_mul => self.binary(op, |_, a, b| Ok(a.wrapping_mul(b)))?,
            gimli::DW_OP_div => self.binary(op, |this, a, b| {
                if b == 0 {
                    return Err(DwarfError::malformed(op.offset as u64, "division by zero"));
                }
                Ok(this.signed(a).wrapping_div(this.signed(b)) as u64)
            })?,
            gimli::DW_OP_mod => self.binary(op, |_, a, b| {
                if b == 0 {
                    return Err(DwarfError::malformed(op.offset as u64, "modulo by zero"));
                }
                Ok(a % b)
            })?,
            gimli::DW_OP_shl => self.binary(op, |_, a, b| Ok(if b >= 64 { 0 } else { a << b }))?,
            gimli::DW_OP_shr => self.binary(op, |this, a, b| {
                let a = a & this.mask();
                Ok(if b >= 64 { 0 } else { a >> b })
            })?,
            gimli::DW_OP_shra => self.binary(op, |this, a, b| {
                let a = this.signed(a);
                Ok((if b >= 64 { a >> 63 } else { a >> b }) as u64)
            })?,

            gimli::DW_OP_eq => self.compare(op, |a, b| a == b)?,
            gimli::DW_OP_ne => self.compare(op, |a, b| a != b)?,
            gimli::DW_OP_lt => self.compare(op, |a, b| a < b)?,
            gimli::DW_OP_le => self.compare(op, |a, b| a <= b)?,
            gimli::DW_OP_gt => self.compare(op, |a, b| a > b)?,
            gimli::DW_OP_ge => self.compare(op, |a, b| a >= b)?,

            gimli::DW_OP_skip => self.jump(op, index)?,
            gimli::DW_OP_bra => {
                if self.pop(op)? != 0 {
                    self.jump(op, index)?;
                }
            }
            gimli::DW_OP_nop => {}

            gimli::DW_OP_fbreg => {
                let frame_base = self.ctx.frame_base.ok_or(DwarfError::NoFrameBase)?;
                self.push(frame_base.wrapping_add_signed(op.operand1_signed()));
            }
            gimli::DW_OP_bregx => {
                let register = register_operand(op)?;
                let base = self.read_register(register)?;
                self.push(base.wrapping_add_signed(op.operand2_signed()));
            }
            gimli::DW_OP_regx => self.register_location(register_operand(op)?)?,
            gimli::DW_OP_call_frame_cfa => {
                let cfa = self.ctx.cfa.ok_or(DwarfError::NoCfa)?;
                self.push(cfa);
            }

            gimli::DW_OP_deref => {
                let memory = self.ctx.memory.ok_or(DwarfError::NoMemoryReader)?;
                let address = self.pop(op)?;
                let size = self.ctx.address_size;
                let value = memory.read_sized(Address::new(address), size)?;
                self.push(value);
            }
            gimli::DW_OP_deref_size => {
                let memory = self.ctx.memory.ok_or(DwarfError::NoMemoryReader)?;
                let address = self.pop(op)?;
                let size = u8::try_from(op.operand1()).unwrap_or(8);
                let value = memory.read_sized(Address::new(address), size)?;
                self.push(value);
            }

            gimli::DW_OP_stack_value => self.outcome = Outcome::Value,
            gimli::DW_OP_implicit_value => {
                let bytes = op.block();
                let mut word = [0u8; 8];
                let len = bytes.len().min(8);
                word[..len].copy_from_slice(&bytes[..len]);
                self.stack.push(u64::from_le_bytes(word));
                self.outcome = Outcome::Value;
            }
            gimli::DW_OP_implicit_pointer | gimli::DW_OP_GNU_implicit_pointer => {
                self.outcome = Outcome::ImplicitPointer {
                    target: DieOffset(op.operand1()),
                    offset: op.operand2_signed(),
                };
            }

            gimli::DW_OP_piece => {
                self.piece_size = Some(op.operand1());
                return Ok(true);
            }

            other => {
                return Err(DwarfError::UnsupportedOpcode {
                    opcode: other,
                    offset: op.offset,
                });
            }
        }
        Ok(false)
    }

    fn register_location(&mut self, register: Register) -> DwarfResult<()>
    {
        let value = self.read_register(register)?;
        self.push(value);
        self.in_register = Some(register);
        self.outcome = Outcome::Value;
        Ok(())
    }
}

fn register_operand(op: &ExprOp) -> DwarfResult<Register>
{
    u16::try_from(op.operand1())
        .map(Register)
        .map_err(|_| DwarfError::malformed(op.offset as u64, "register number out of range"))
}

#[cfg(test)]
mod tests
{
    use super::*;

    struct FixedRegisters;

    impl RegisterFile for FixedRegisters
    {
        fn read_register(&self, register: Register) -> DwarfResult<u64>
        {
            Ok(0x100 * u64::from(register.0))
        }
    }

    fn eval(ops: Vec<ExprOp>, ctx: EvalContext<'_>) -> DwarfResult<u64>
    {
        let expr = LocExpr::from_ops(ops);
        ExprEvaluator::evaluate(&expr, ctx)?.tos(Accept::ANY)
    }

    #[test]
    fn test_signed_comparison()
    {
        let ops = vec![
            ExprOp::signed(gimli::DW_OP_consts, -1),
            ExprOp::new(gimli::DW_OP_lit1),
            ExprOp::new(gimli::DW_OP_lt),
        ];
        assert_eq!(eval(ops, EvalContext::new()).unwrap(), 1);
    }

    #[test]
    fn test_four_byte_generic_type_wraps()
    {
        let ops = vec![
            ExprOp::unsigned(gimli::DW_OP_constu, 0xffff_fff0),
            ExprOp::unsigned(gimli::DW_OP_plus_uconst, 0x20),
        ];
        let ctx = EvalContext::new().with_address_size(4);
        assert_eq!(eval(ops, ctx).unwrap(), 0x10);
    }

    #[test]
    fn test_address_size_outside_word_is_rejected()
    {
        let ops = vec![ExprOp::new(gimli::DW_OP_lit1)];
        for size in [0, 9] {
            let err = eval(ops.clone(), EvalContext::new().with_address_size(size)).unwrap_err();
            assert!(matches!(err, DwarfError::BadAddressSize { size: got } if got == size));
            assert_eq!(err.kind(), crate::error::ErrorKind::LogicPrecondition);
        }
    }

    #[test]
    fn test_rot_and_pick()
    {
        let ops = vec![
            ExprOp::new(gimli::DW_OP_lit1),
            ExprOp::new(gimli::DW_OP_lit2),
            ExprOp::new(gimli::DW_OP_lit3),
            ExprOp::new(gimli::DW_OP_rot),
            ExprOp::unsigned(gimli::DW_OP_pick, 2),
        ];
        let expr = LocExpr::from_ops(ops);
        let evaluator = ExprEvaluator::evaluate(&expr, EvalContext::new()).unwrap();
        assert_eq!(evaluator.stack(), &[3, 1, 2, 3]);
    }

    #[test]
    fn test_breg_uses_register_file()
    {
        let regs = FixedRegisters;
        let ops = vec![ExprOp::signed(DwOpExt::breg(7), 8)];
        let ctx = EvalContext::new().with_registers(&regs);
        assert_eq!(eval(ops, ctx).unwrap(), 0x708);
    }

    #[test]
    fn test_register_without_file_is_precondition()
    {
        let ops = vec![ExprOp::new(gimli::DW_OP_reg3)];
        let err = eval(ops, EvalContext::new()).unwrap_err();
        assert!(matches!(err, DwarfError::NoRegisterFile { register: 3 }));
        assert_eq!(err.kind(), crate::error::ErrorKind::LogicPrecondition);
    }

    #[test]
    fn test_division_by_zero()
    {
        let ops = vec![
            ExprOp::new(gimli::DW_OP_lit1),
            ExprOp::new(gimli::DW_OP_lit0),
            ExprOp::new(gimli::DW_OP_div),
        ];
        assert!(eval(ops, EvalContext::new()).is_err());
    }

    #[test]
    fn test_underflow()
    {
        let ops = vec![ExprOp::new(gimli::DW_OP_plus)];
        assert!(matches!(
            eval(ops, EvalContext::new()),
            Err(DwarfError::StackUnderflow { offset: 0 })
        ));
    }

    struct DwOpExt;

    impl DwOpExt
    {
        fn breg(n: u8) -> gimli::DwOp
        {
            gimli::DwOp(gimli::DW_OP_breg0.0 + n)
        }
    }
}
