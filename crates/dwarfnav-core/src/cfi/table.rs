//! Unwind rows and the tables built from call-frame programs.

use std::fmt;

use gimli::Register;
use smallvec::SmallVec;
use tracing::trace;

use super::instr::Instruction;
use crate::error::{DwarfError, DwarfResult};
use crate::expr::{Accept, EvalContext, ExprEvaluator, LocExpr};
use crate::types::Address;

/// How to compute the Canonical Frame Address
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CfaRule
{
    /// No CFA has been defined yet
    #[default]
    Undefined,
    RegisterOffset
    {
        register: Register,
        offset: i64,
    },
    Expression(LocExpr),
}

/// How to recover a register's value in the caller's frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterRule
{
    Undefined,
    SameValue,
    /// Saved at CFA + n
    Offset(i64),
    /// The value is CFA + n
    ValOffset(i64),
    /// Saved in another register
    Register(Register),
    /// Saved at the address the expression computes, with the CFA pushed first
    Expression(LocExpr),
    /// The value is what the expression computes, with the CFA pushed first
    ValExpression(LocExpr),
}

/// The rules in force over `[start, end)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnwindRow
{
    start: Address,
    end: Address,
    cfa: CfaRule,
    rules: SmallVec<[(Register, RegisterRule); 8]>,
}

impl UnwindRow
{
    fn starting_at(start: u64) -> Self
    {
        Self {
            start: Address::new(start),
            end: Address::new(start),
            cfa: CfaRule::Undefined,
            rules: SmallVec::new(),
        }
    }

    pub const fn start_address(&self) -> Address
    {
        self.start
    }

    pub const fn end_address(&self) -> Address
    {
        self.end
    }

    pub fn contains(&self, pc: Address) -> bool
    {
        pc >= self.start && pc < self.end
    }

    pub const fn cfa(&self) -> &CfaRule
    {
        &self.cfa
    }

    /// Rule for `register`, `Undefined` when none was set
    pub fn register(&self, register: Register) -> RegisterRule
    {
        self.rules
            .iter()
            .find(|(r, _)| *r == register)
            .map_or(RegisterRule::Undefined, |(_, rule)| rule.clone())
    }

    /// Registers with an explicit rule, in the order they were first set
    pub fn rules(&self) -> impl Iterator<Item = &(Register, RegisterRule)>
    {
        self.rules.iter()
    }

    fn set_rule(&mut self, register: Register, rule: RegisterRule)
    {
        match self.rules.iter_mut().find(|(r, _)| *r == register) {
            Some(slot) => slot.1 = rule,
            None => self.rules.push((register, rule)),
        }
    }

    fn clear_rule(&mut self, register: Register)
    {
        self.rules.retain(|(r, _)| *r != register);
    }

    /// Compute the CFA in the frame described by `ctx`.
    ///
    /// ## Errors
    ///
    /// - `NoCfa` when the row defines no CFA rule
    /// - `NoRegisterFile` or a register-read error for register-based rules
    /// - evaluation errors for expression rules
    pub fn cfa_value(&self, ctx: &EvalContext<'_>) -> DwarfResult<u64>
    {
        match &self.cfa {
            CfaRule::Undefined => Err(DwarfError::NoCfa),
            CfaRule::RegisterOffset { register, offset } => {
                let registers = ctx.registers.ok_or(DwarfError::NoRegisterFile { register: register.0 })?;
                let base = registers.read_register(*register)?;
                Ok(Address::new(base).offset_by(*offset).truncate(ctx.address_size).value())
            }
            CfaRule::Expression(expr) => ExprEvaluator::evaluate(expr, *ctx)?.tos(Accept::ADDRESS),
        }
    }

    /// Recover `register`'s value in the caller's frame.
    ///
    /// Returns `Ok(None)` when the register's rule is `Undefined`.
    ///
    /// ## Errors
    ///
    /// As for [`cfa_value`](Self::cfa_value), plus `NoMemoryReader` for rules
    /// that read a saved slot without a memory reader.
    pub fn recover(&self, register: Register, ctx: &EvalContext<'_>) -> DwarfResult<Option<u64>>
    {
        let read_register = |r: Register| {
            ctx.registers
                .ok_or(DwarfError::NoRegisterFile { register: r.0 })?
                .read_register(r)
        };
        let read_memory = |address: u64| {
            ctx.memory
                .ok_or(DwarfError::NoMemoryReader)?
                .read_u64(Address::new(address))
        };

        let value = match self.register(register) {
            RegisterRule::Undefined => return Ok(None),
            RegisterRule::SameValue => read_register(register)?,
            RegisterRule::Register(source) => read_register(source)?,
            RegisterRule::Offset(offset) => {
                let cfa = self.cfa_value(ctx)?;
                read_memory(Address::new(cfa).offset_by(offset).value())?
            }
            RegisterRule::ValOffset(offset) => {
                let cfa = self.cfa_value(ctx)?;
                Address::new(cfa).offset_by(offset).truncate(ctx.address_size).value()
            }
            RegisterRule::Expression(expr) => {
                let cfa = self.cfa_value(ctx)?;
                let ctx = ctx.with_cfa(cfa);
                let mut evaluator = ExprEvaluator::new(&expr, ctx).with_initial_stack(&[cfa]);
                evaluator.run()?;
                read_memory(evaluator.tos(Accept::ADDRESS)?)?
            }
            RegisterRule::ValExpression(expr) => {
                let cfa = self.cfa_value(ctx)?;
                let ctx = ctx.with_cfa(cfa);
                let mut evaluator = ExprEvaluator::new(&expr, ctx).with_initial_stack(&[cfa]);
                evaluator.run()?;
                evaluator.tos(Accept::ADDRESS | Accept::VALUE)?
            }
        };
        Ok(Some(value))
    }
}

/// Names a DWARF register number for display, `None` when it has no name
pub type RegisterNames = fn(Register) -> Option<&'static str>;

impl UnwindRow
{
    /// Display this row with register names from `names`, `rN` for the rest
    pub fn display_with(&self, names: RegisterNames) -> impl fmt::Display + '_
    {
        RowDisplay { row: self, names }
    }
}

impl fmt::Display for UnwindRow
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let plain = RowDisplay {
            row: self,
            names: |_| None,
        };
        fmt::Display::fmt(&plain, f)
    }
}

struct RowDisplay<'r>
{
    row: &'r UnwindRow,
    names: RegisterNames,
}

impl RowDisplay<'_>
{
    fn register(&self, f: &mut fmt::Formatter<'_>, register: Register) -> fmt::Result
    {
        match (self.names)(register) {
            Some(name) => f.write_str(name),
            None => write!(f, "r{}", register.0),
        }
    }
}

impl fmt::Display for RowDisplay<'_>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let row = self.row;
        write!(f, "[{}, {}) cfa=", row.start, row.end)?;
        match &row.cfa {
            CfaRule::Undefined => f.write_str("undefined")?,
            CfaRule::RegisterOffset { register, offset } => {
                self.register(f, *register)?;
                write!(f, "{offset:+}")?;
            }
            CfaRule::Expression(expr) => write!(f, "[{expr}]")?,
        }
        for (register, rule) in &row.rules {
            f.write_str(" ")?;
            self.register(f, *register)?;
            f.write_str("=")?;
            match rule {
                RegisterRule::Undefined => f.write_str("u")?,
                RegisterRule::SameValue => f.write_str("s")?,
                RegisterRule::Offset(n) => write!(f, "c{n:+}")?,
                RegisterRule::ValOffset(n) => write!(f, "v{n:+}")?,
                RegisterRule::Register(r) => self.register(f, *r)?,
                RegisterRule::Expression(expr) => write!(f, "exp[{expr}]")?,
                RegisterRule::ValExpression(expr) => write!(f, "vexp[{expr}]")?,
            }
        }
        Ok(())
    }
}

/// Rows for one FDE, ordered and non-overlapping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnwindTable
{
    rows: Vec<UnwindRow>,
}

impl UnwindTable
{
    pub fn rows(&self) -> &[UnwindRow]
    {
        &self.rows
    }

    pub fn len(&self) -> usize
    {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.rows.is_empty()
    }

    /// The row covering `pc`
    pub fn row_for(&self, pc: Address) -> Option<&UnwindRow>
    {
        let index = self.rows.partition_point(|row| row.end <= pc);
        self.rows.get(index).filter(|row| row.contains(pc))
    }

    pub fn into_rows(self) -> Vec<UnwindRow>
    {
        self.rows
    }
}

/// Executes a CIE's initial program and then an FDE's, closing a row at each
/// location advance.
pub(crate) struct TableBuilder
{
    rows: Vec<UnwindRow>,
    row: UnwindRow,
    /// The row as left by the CIE's initial instructions; `restore` reads it
    initial: Option<UnwindRow>,
    saved: Vec<UnwindRow>,
}

impl TableBuilder
{
    pub(crate) fn new(start: u64) -> Self
    {
        Self {
            rows: Vec::new(),
            row: UnwindRow::starting_at(start),
            initial: None,
            saved: Vec::new(),
        }
    }

    /// Run the CIE's initial instructions and snapshot the result as the
    /// row `restore` falls back to.
    pub(crate) fn run_initial(&mut self, instructions: &[(u64, Instruction)]) -> DwarfResult<()>
    {
        self.run(instructions)?;
        self.initial = Some(self.row.clone());
        Ok(())
    }

    pub(crate) fn run(&mut self, instructions: &[(u64, Instruction)]) -> DwarfResult<()>
    {
        for (offset, instruction) in instructions {
            trace!(offset, %instruction, at = %self.row.start, "executing CFI instruction");
            self.execute(*offset, instruction)?;
        }
        Ok(())
    }

    /// Close the open row at `end` and return the table.
    pub(crate) fn finish(mut self, end: u64) -> DwarfResult<UnwindTable>
    {
        let end = Address::new(end);
        if end < self.row.start {
            return Err(DwarfError::malformed(
                self.row.start.value(),
                "instructions advance past the end of the FDE",
            ));
        }
        if end > self.row.start {
            self.row.end = end;
            self.rows.push(self.row);
        }
        Ok(UnwindTable { rows: self.rows })
    }

    fn advance_to(&mut self, offset: u64, location: u64) -> DwarfResult<()>
    {
        let location = Address::new(location);
        if location == self.row.start {
            return Ok(());
        }
        if location < self.row.start {
            return Err(DwarfError::malformed(offset, "call frame location moves backwards"));
        }
        let mut closed = self.row.clone();
        closed.end = location;
        self.rows.push(closed);
        self.row.start = location;
        self.row.end = location;
        Ok(())
    }

    fn execute(&mut self, offset: u64, instruction: &Instruction) -> DwarfResult<()>
    {
        match instruction {
            Instruction::AdvanceLoc { delta } => {
                let location = self
                    .row
                    .start
                    .checked_add(*delta)
                    .ok_or_else(|| DwarfError::malformed(offset, "location advance overflows"))?;
                self.advance_to(offset, location.value())?;
            }
            Instruction::SetLoc { address } => self.advance_to(offset, *address)?,
            Instruction::DefCfa { register, offset: n } => {
                self.row.cfa = CfaRule::RegisterOffset {
                    register: *register,
                    offset: *n,
                };
            }
            Instruction::DefCfaRegister { register } => match &mut self.row.cfa {
                CfaRule::RegisterOffset { register: r, .. } => *r = *register,
                _ => return Err(DwarfError::malformed(offset, "def_cfa_register without a register CFA rule")),
            },
            Instruction::DefCfaOffset { offset: n } => match &mut self.row.cfa {
                CfaRule::RegisterOffset { offset: o, .. } => *o = *n,
                _ => return Err(DwarfError::malformed(offset, "def_cfa_offset without a register CFA rule")),
            },
            Instruction::DefCfaExpression { expr } => self.row.cfa = CfaRule::Expression(expr.clone()),
            Instruction::Undefined { register } => self.row.set_rule(*register, RegisterRule::Undefined),
            Instruction::SameValue { register } => self.row.set_rule(*register, RegisterRule::SameValue),
            Instruction::Offset { register, offset: n } => self.row.set_rule(*register, RegisterRule::Offset(*n)),
            Instruction::ValOffset { register, offset: n } => {
                self.row.set_rule(*register, RegisterRule::ValOffset(*n));
            }
            Instruction::Register { register, source } => {
                self.row.set_rule(*register, RegisterRule::Register(*source));
            }
            Instruction::Expression { register, expr } => {
                self.row.set_rule(*register, RegisterRule::Expression(expr.clone()));
            }
            Instruction::ValExpression { register, expr } => {
                self.row.set_rule(*register, RegisterRule::ValExpression(expr.clone()));
            }
            Instruction::Restore { register } => {
                let initial = self
                    .initial
                    .as_ref()
                    .and_then(|row| row.rules.iter().find(|(r, _)| r == register))
                    .map(|(_, rule)| rule.clone());
                match initial {
                    Some(rule) => self.row.set_rule(*register, rule),
                    None => self.row.clear_rule(*register),
                }
            }
            Instruction::RememberState => self.saved.push(self.row.clone()),
            Instruction::RestoreState => {
                let saved = self
                    .saved
                    .pop()
                    .ok_or_else(|| DwarfError::malformed(offset, "restore_state with nothing remembered"))?;
                self.row.cfa = saved.cfa;
                self.row.rules = saved.rules;
            }
            Instruction::ArgsSize { .. } | Instruction::Nop => {}
        }
        Ok(())
    }
}
