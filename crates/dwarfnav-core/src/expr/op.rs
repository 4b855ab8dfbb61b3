//! Location-expression byte code.
//!
//! A [`LocExpr`] is the parsed form of a DWARF expression: each operation
//! keeps its opcode, its decoded operands and its byte offset inside the
//! expression, which branch targets (`DW_OP_skip`, `DW_OP_bra`) are
//! expressed in.

use std::fmt;

use gimli::{DwOp, Encoding};
use smallvec::SmallVec;

use crate::error::{DwarfError, DwarfResult};
use crate::reader::ByteCursor;

/// Operand of an expression operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand
{
    Unsigned(u64),
    Signed(i64),
    Bytes(Vec<u8>),
}

impl Operand
{
    /// Numeric value, reinterpreting signed operands as two's complement
    pub const fn as_u64(&self) -> u64
    {
        match self {
            Operand::Unsigned(value) => *value,
            Operand::Signed(value) => *value as u64,
            Operand::Bytes(_) => 0,
        }
    }

    pub const fn as_i64(&self) -> i64
    {
        match self {
            Operand::Unsigned(value) => *value as i64,
            Operand::Signed(value) => *value,
            Operand::Bytes(_) => 0,
        }
    }
}

/// One decoded operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExprOp
{
    pub opcode: DwOp,
    pub operands: SmallVec<[Operand; 2]>,
    /// Byte offset of the opcode inside its expression
    pub offset: usize,
}

impl ExprOp
{
    pub fn new(opcode: DwOp) -> Self
    {
        Self {
            opcode,
            operands: SmallVec::new(),
            offset: 0,
        }
    }

    pub fn unsigned(opcode: DwOp, value: u64) -> Self
    {
        let mut op = Self::new(opcode);
        op.operands.push(Operand::Unsigned(value));
        op
    }

    pub fn signed(opcode: DwOp, value: i64) -> Self
    {
        let mut op = Self::new(opcode);
        op.operands.push(Operand::Signed(value));
        op
    }

    /// First operand as unsigned, 0 when absent
    pub fn operand1(&self) -> u64
    {
        self.operands.first().map_or(0, Operand::as_u64)
    }

    pub fn operand1_signed(&self) -> i64
    {
        self.operands.first().map_or(0, Operand::as_i64)
    }

    pub fn operand2_signed(&self) -> i64
    {
        self.operands.get(1).map_or(0, Operand::as_i64)
    }

    pub fn block(&self) -> &[u8]
    {
        self.operands
            .iter()
            .find_map(|op| match op {
                Operand::Bytes(bytes) => Some(bytes.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }
}

impl fmt::Display for ExprOp
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self.opcode.static_string() {
            Some(name) => write!(f, "{name}")?,
            None => write!(f, "DW_OP_0x{:02x}", self.opcode.0)?,
        }
        for operand in &self.operands {
            match operand {
                Operand::Unsigned(value) => write!(f, " {value}")?,
                Operand::Signed(value) => write!(f, " {value}")?,
                Operand::Bytes(bytes) => write!(f, " [{} bytes]", bytes.len())?,
            }
        }
        Ok(())
    }
}

/// A parsed location expression.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocExpr
{
    ops: Vec<ExprOp>,
    /// Total encoded length, the target of a branch to "the end"
    byte_len: usize,
}

impl LocExpr
{
    /// Parse little-endian expression bytes.
    ///
    /// `encoding` supplies the address size for `DW_OP_addr` and the offset
    /// size for `DW_OP_call_ref`/`DW_OP_implicit_pointer`.
    ///
    /// ## Errors
    ///
    /// `UnexpectedEof` for a truncated operand, `Malformed` for an opcode
    /// with no defined operand layout.
    pub fn parse(bytes: &[u8], encoding: Encoding) -> DwarfResult<Self>
    {
        let mut cursor = ByteCursor::new(bytes, gimli::RunTimeEndian::Little);
        Self::parse_with(&mut cursor, bytes.len(), encoding)
    }

    /// Parse expression bytes of a given byte order
    pub fn parse_endian(bytes: &[u8], encoding: Encoding, endian: gimli::RunTimeEndian) -> DwarfResult<Self>
    {
        let mut cursor = ByteCursor::new(bytes, endian);
        Self::parse_with(&mut cursor, bytes.len(), encoding)
    }

    fn parse_with(cursor: &mut ByteCursor<'_>, byte_len: usize, encoding: Encoding) -> DwarfResult<Self>
    {
        let mut ops = Vec::new();
        while !cursor.is_empty() {
            let offset = cursor.position() as usize;
            let opcode = DwOp(cursor.read_u8()?);
            let operands = read_operands(cursor, opcode, encoding, offset)?;
            ops.push(ExprOp {
                opcode,
                operands,
                offset,
            });
        }
        Ok(Self { ops, byte_len })
    }

    /// Build an expression from operations.
    ///
    /// Offsets are assigned as if each operation occupied one byte per
    /// operand plus its opcode, which keeps them strictly increasing; only
    /// hand-built expressions without branches should rely on this.
    pub fn from_ops(ops: Vec<ExprOp>) -> Self
    {
        let mut offset = 0;
        let ops: Vec<ExprOp> = ops
            .into_iter()
            .map(|mut op| {
                op.offset = offset;
                offset += 1 + op.operands.len();
                op
            })
            .collect();
        Self { ops, byte_len: offset }
    }

    pub fn ops(&self) -> &[ExprOp]
    {
        &self.ops
    }

    pub fn len(&self) -> usize
    {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.ops.is_empty()
    }

    pub const fn byte_len(&self) -> usize
    {
        self.byte_len
    }

    /// Byte offset just past the operation at `index`
    pub(crate) fn offset_after(&self, index: usize) -> usize
    {
        self.ops.get(index + 1).map_or(self.byte_len, |op| op.offset)
    }

    /// Operation index starting at byte `offset`, or `len()` for the end
    pub(crate) fn index_at_offset(&self, offset: usize) -> Option<usize>
    {
        if offset == self.byte_len {
            return Some(self.ops.len());
        }
        self.ops.binary_search_by_key(&offset, |op| op.offset).ok()
    }

    /// Split at `DW_OP_piece` boundaries.
    ///
    /// Returns `(sub-expression, piece size in bytes)` pairs; the size is
    /// `None` for a trailing expression that is not terminated by a piece,
    /// which describes the whole object.
    pub fn pieces(&self) -> Vec<(LocExpr, Option<u64>)>
    {
        let mut pieces = Vec::new();
        let mut start = 0;
        for (index, op) in self.ops.iter().enumerate() {
            if op.opcode == gimli::DW_OP_piece {
                pieces.push((self.slice(start, index, op.offset), Some(op.operand1())));
                start = index + 1;
            }
        }
        if start < self.ops.len() || pieces.is_empty() {
            pieces.push((self.slice(start, self.ops.len(), self.byte_len), None));
        }
        pieces
    }

    /// Operations `start..end` rebased to offset 0; `end_offset` is where the slice's bytes stop
    fn slice(&self, start: usize, end: usize, end_offset: usize) -> Self
    {
        let base = self.ops.get(start).map_or(end_offset, |op| op.offset);
        let ops = self.ops[start..end]
            .iter()
            .cloned()
            .map(|mut op| {
                op.offset -= base;
                op
            })
            .collect();
        Self {
            ops,
            byte_len: end_offset - base,
        }
    }

    /// Whether the expression ends by declaring its result a value
    pub fn is_value(&self) -> bool
    {
        self.ops.iter().any(|op| op.opcode == gimli::DW_OP_stack_value)
    }
}

impl fmt::Display for LocExpr
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        for (i, op) in self.ops.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{op}")?;
        }
        Ok(())
    }
}

fn read_operands(
    cursor: &mut ByteCursor<'_>,
    opcode: DwOp,
    encoding: Encoding,
    offset: usize,
) -> DwarfResult<SmallVec<[Operand; 2]>>
{
    use Operand::{Bytes, Signed, Unsigned};

    let mut out = SmallVec::new();
    let raw = opcode.0;
    match opcode {
        gimli::DW_OP_addr => out.push(Unsigned(cursor.read_address(encoding.address_size)?)),
        gimli::DW_OP_const1u | gimli::DW_OP_pick | gimli::DW_OP_deref_size | gimli::DW_OP_xderef_size => {
            out.push(Unsigned(u64::from(cursor.read_u8()?)));
        }
        gimli::DW_OP_const1s => out.push(Signed(i64::from(cursor.read_i8()?))),
        gimli::DW_OP_const2u | gimli::DW_OP_call2 => out.push(Unsigned(u64::from(cursor.read_u16()?))),
        gimli::DW_OP_const2s | gimli::DW_OP_skip | gimli::DW_OP_bra => {
            out.push(Signed(i64::from(cursor.read_i16()?)));
        }
        gimli::DW_OP_const4u | gimli::DW_OP_call4 | gimli::DW_OP_GNU_parameter_ref => {
            out.push(Unsigned(u64::from(cursor.read_u32()?)));
        }
        gimli::DW_OP_const4s => out.push(Signed(i64::from(cursor.read_i32()?))),
        gimli::DW_OP_const8u => out.push(Unsigned(cursor.read_u64()?)),
        gimli::DW_OP_const8s => out.push(Signed(cursor.read_i64()?)),
        gimli::DW_OP_constu
        | gimli::DW_OP_plus_uconst
        | gimli::DW_OP_regx
        | gimli::DW_OP_piece
        | gimli::DW_OP_convert
        | gimli::DW_OP_reinterpret
        | gimli::DW_OP_addrx
        | gimli::DW_OP_constx
        | gimli::DW_OP_GNU_addr_index
        | gimli::DW_OP_GNU_const_index => out.push(Unsigned(cursor.read_uleb128()?)),
        gimli::DW_OP_consts | gimli::DW_OP_fbreg => out.push(Signed(cursor.read_sleb128()?)),
        gimli::DW_OP_bregx => {
            out.push(Unsigned(cursor.read_uleb128()?));
            out.push(Signed(cursor.read_sleb128()?));
        }
        gimli::DW_OP_bit_piece | gimli::DW_OP_regval_type => {
            out.push(Unsigned(cursor.read_uleb128()?));
            out.push(Unsigned(cursor.read_uleb128()?));
        }
        gimli::DW_OP_deref_type | gimli::DW_OP_xderef_type => {
            out.push(Unsigned(u64::from(cursor.read_u8()?)));
            out.push(Unsigned(cursor.read_uleb128()?));
        }
        gimli::DW_OP_const_type => {
            out.push(Unsigned(cursor.read_uleb128()?));
            let len = cursor.read_u8()?;
            out.push(Bytes(cursor.read_bytes(u64::from(len))?.to_vec()));
        }
        gimli::DW_OP_call_ref => out.push(Unsigned(cursor.read_offset(encoding.format)?)),
        gimli::DW_OP_implicit_value | gimli::DW_OP_entry_value | gimli::DW_OP_GNU_entry_value => {
            let len = cursor.read_uleb128()?;
            out.push(Bytes(cursor.read_bytes(len)?.to_vec()));
        }
        gimli::DW_OP_implicit_pointer | gimli::DW_OP_GNU_implicit_pointer => {
            let target = if encoding.version <= 2 {
                cursor.read_address(encoding.address_size)?
            } else {
                cursor.read_offset(encoding.format)?
            };
            out.push(Unsigned(target));
            out.push(Signed(cursor.read_sleb128()?));
        }
        _ if (gimli::DW_OP_breg0.0..=gimli::DW_OP_breg31.0).contains(&raw) => {
            out.push(Signed(cursor.read_sleb128()?));
        }
        _ if has_no_operands(opcode) => {}
        other => {
            return Err(DwarfError::malformed(
                offset as u64,
                format!("expression opcode {other} has no known operand layout"),
            ));
        }
    }
    Ok(out)
}

fn has_no_operands(opcode: DwOp) -> bool
{
    let raw = opcode.0;
    (gimli::DW_OP_lit0.0..=gimli::DW_OP_lit31.0).contains(&raw)
        || (gimli::DW_OP_reg0.0..=gimli::DW_OP_reg31.0).contains(&raw)
        || matches!(
            opcode,
            gimli::DW_OP_deref
                | gimli::DW_OP_dup
                | gimli::DW_OP_drop
                | gimli::DW_OP_over
                | gimli::DW_OP_swap
                | gimli::DW_OP_rot
                | gimli::DW_OP_xderef
                | gimli::DW_OP_abs
                | gimli::DW_OP_and
                | gimli::DW_OP_div
                | gimli::DW_OP_minus
                | gimli::DW_OP_mod
                | gimli::DW_OP_mul
                | gimli::DW_OP_neg
                | gimli::DW_OP_not
                | gimli::DW_OP_or
                | gimli::DW_OP_plus
                | gimli::DW_OP_shl
                | gimli::DW_OP_shr
                | gimli::DW_OP_shra
                | gimli::DW_OP_xor
                | gimli::DW_OP_eq
                | gimli::DW_OP_ge
                | gimli::DW_OP_gt
                | gimli::DW_OP_le
                | gimli::DW_OP_lt
                | gimli::DW_OP_ne
                | gimli::DW_OP_nop
                | gimli::DW_OP_push_object_address
                | gimli::DW_OP_form_tls_address
                | gimli::DW_OP_call_frame_cfa
                | gimli::DW_OP_stack_value
                | gimli::DW_OP_GNU_push_tls_address
        )
}
