//! Call-frame instruction decoding.
//!
//! Operands are stored already scaled by the CIE's alignment factors, so the
//! table builder works in bytes and never sees a factored value.

use std::fmt;

use gimli::{DwCfa, Encoding, Register};
use tracing::trace;

use super::entry::{Cie, CfiConfig, CfiSection};
use super::pointer::read_pointer;
use crate::error::{DwarfError, DwarfResult};
use crate::expr::LocExpr;
use crate::reader::ByteCursor;

/// Expressions in CFI have no unit; this version only affects `DW_OP_call_ref`
const EXPRESSION_VERSION: u16 = 4;

/// Decoded instructions paired with their section offsets
pub type Program = Vec<(u64, Instruction)>;

/// One decoded call-frame instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction
{
    /// Move the location forward by `delta` bytes
    AdvanceLoc
    {
        delta: u64,
    },
    SetLoc
    {
        address: u64,
    },
    DefCfa
    {
        register: Register,
        offset: i64,
    },
    DefCfaRegister
    {
        register: Register,
    },
    DefCfaOffset
    {
        offset: i64,
    },
    DefCfaExpression
    {
        expr: LocExpr,
    },
    Undefined
    {
        register: Register,
    },
    SameValue
    {
        register: Register,
    },
    /// Saved at CFA + `offset`
    Offset
    {
        register: Register,
        offset: i64,
    },
    /// Value is CFA + `offset`
    ValOffset
    {
        register: Register,
        offset: i64,
    },
    Register
    {
        register: Register,
        source: Register,
    },
    Expression
    {
        register: Register,
        expr: LocExpr,
    },
    ValExpression
    {
        register: Register,
        expr: LocExpr,
    },
    Restore
    {
        register: Register,
    },
    RememberState,
    RestoreState,
    /// `DW_CFA_GNU_args_size`; has no effect on the table
    ArgsSize
    {
        size: u64,
    },
    Nop,
}

impl fmt::Display for Instruction
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Instruction::AdvanceLoc { delta } => write!(f, "advance_loc {delta}"),
            Instruction::SetLoc { address } => write!(f, "set_loc 0x{address:x}"),
            Instruction::DefCfa { register, offset } => write!(f, "def_cfa r{} {offset:+}", register.0),
            Instruction::DefCfaRegister { register } => write!(f, "def_cfa_register r{}", register.0),
            Instruction::DefCfaOffset { offset } => write!(f, "def_cfa_offset {offset:+}"),
            Instruction::DefCfaExpression { expr } => write!(f, "def_cfa_expression ({} ops)", expr.len()),
            Instruction::Undefined { register } => write!(f, "undefined r{}", register.0),
            Instruction::SameValue { register } => write!(f, "same_value r{}", register.0),
            Instruction::Offset { register, offset } => write!(f, "offset r{} cfa{offset:+}", register.0),
            Instruction::ValOffset { register, offset } => write!(f, "val_offset r{} cfa{offset:+}", register.0),
            Instruction::Register { register, source } => write!(f, "register r{} r{}", register.0, source.0),
            Instruction::Expression { register, expr } => {
                write!(f, "expression r{} ({} ops)", register.0, expr.len())
            }
            Instruction::ValExpression { register, expr } => {
                write!(f, "val_expression r{} ({} ops)", register.0, expr.len())
            }
            Instruction::Restore { register } => write!(f, "restore r{}", register.0),
            Instruction::RememberState => f.write_str("remember_state"),
            Instruction::RestoreState => f.write_str("restore_state"),
            Instruction::ArgsSize { size } => write!(f, "GNU_args_size {size}"),
            Instruction::Nop => f.write_str("nop"),
        }
    }
}

/// Decode every instruction in `cursor`, pairing each with its section offset.
///
/// ## Errors
///
/// `UnsupportedCfi` for any opcode outside DWARF 5 and the three GNU
/// extensions handled here.
pub(crate) fn parse_instructions(
    cursor: &mut ByteCursor<'_>,
    cie: &Cie,
    config: &CfiConfig,
) -> DwarfResult<Program>
{
    let mut out = Vec::new();
    while !cursor.is_empty() {
        let offset = cursor.position();
        let instruction = parse_one(cursor, cie, config, offset)?;
        trace!(offset, %instruction, "decoded CFI instruction");
        out.push((offset, instruction));
    }
    Ok(out)
}

fn parse_one(cursor: &mut ByteCursor<'_>, cie: &Cie, config: &CfiConfig, offset: u64) -> DwarfResult<Instruction>
{
    let byte = cursor.read_u8()?;
    let low = byte & 0x3f;
    let code = cie.code_alignment_factor;
    let data = cie.data_alignment_factor;

    // the three primary opcodes carry an operand in the low six bits
    match DwCfa(byte & 0xc0) {
        gimli::DW_CFA_advance_loc => {
            return Ok(Instruction::AdvanceLoc {
                delta: u64::from(low).wrapping_mul(code),
            })
        }
        gimli::DW_CFA_offset => {
            return Ok(Instruction::Offset {
                register: Register(u16::from(low)),
                offset: factored(cursor.read_uleb128()?, data),
            })
        }
        gimli::DW_CFA_restore => {
            return Ok(Instruction::Restore {
                register: Register(u16::from(low)),
            })
        }
        _ => {}
    }

    let opcode = DwCfa(byte);
    Ok(match opcode {
        gimli::DW_CFA_nop => Instruction::Nop,
        gimli::DW_CFA_set_loc => {
            let address = match config.section {
                CfiSection::DebugFrame => cursor.read_address(cie.address_size)?,
                CfiSection::EhFrame => {
                    let position = cursor.position();
                    read_pointer(cursor, cie.fde_encoding, cie.address_size, &config.bases, None)?
                        .direct()
                        .map_err(|_| DwarfError::UnsupportedPointerEncoding {
                            encoding: cie.fde_encoding,
                            offset: position,
                        })?
                }
            };
            Instruction::SetLoc { address }
        }
        gimli::DW_CFA_advance_loc1 => Instruction::AdvanceLoc {
            delta: u64::from(cursor.read_u8()?).wrapping_mul(code),
        },
        gimli::DW_CFA_advance_loc2 => Instruction::AdvanceLoc {
            delta: u64::from(cursor.read_u16()?).wrapping_mul(code),
        },
        gimli::DW_CFA_advance_loc4 => Instruction::AdvanceLoc {
            delta: u64::from(cursor.read_u32()?).wrapping_mul(code),
        },
        gimli::DW_CFA_offset_extended => Instruction::Offset {
            register: read_register(cursor)?,
            offset: factored(cursor.read_uleb128()?, data),
        },
        gimli::DW_CFA_offset_extended_sf => Instruction::Offset {
            register: read_register(cursor)?,
            offset: cursor.read_sleb128()?.wrapping_mul(data),
        },
        gimli::DW_CFA_GNU_negative_offset_extended => Instruction::Offset {
            register: read_register(cursor)?,
            offset: factored(cursor.read_uleb128()?, data).wrapping_neg(),
        },
        gimli::DW_CFA_val_offset => Instruction::ValOffset {
            register: read_register(cursor)?,
            offset: factored(cursor.read_uleb128()?, data),
        },
        gimli::DW_CFA_val_offset_sf => Instruction::ValOffset {
            register: read_register(cursor)?,
            offset: cursor.read_sleb128()?.wrapping_mul(data),
        },
        gimli::DW_CFA_restore_extended => Instruction::Restore {
            register: read_register(cursor)?,
        },
        gimli::DW_CFA_undefined => Instruction::Undefined {
            register: read_register(cursor)?,
        },
        gimli::DW_CFA_same_value => Instruction::SameValue {
            register: read_register(cursor)?,
        },
        gimli::DW_CFA_register => Instruction::Register {
            register: read_register(cursor)?,
            source: read_register(cursor)?,
        },
        gimli::DW_CFA_remember_state => Instruction::RememberState,
        gimli::DW_CFA_restore_state => Instruction::RestoreState,
        // def_cfa and def_cfa_offset take unfactored offsets
        gimli::DW_CFA_def_cfa => Instruction::DefCfa {
            register: read_register(cursor)?,
            offset: cursor.read_uleb128()? as i64,
        },
        gimli::DW_CFA_def_cfa_sf => Instruction::DefCfa {
            register: read_register(cursor)?,
            offset: cursor.read_sleb128()?.wrapping_mul(data),
        },
        gimli::DW_CFA_def_cfa_register => Instruction::DefCfaRegister {
            register: read_register(cursor)?,
        },
        gimli::DW_CFA_def_cfa_offset => Instruction::DefCfaOffset {
            offset: cursor.read_uleb128()? as i64,
        },
        gimli::DW_CFA_def_cfa_offset_sf => Instruction::DefCfaOffset {
            offset: cursor.read_sleb128()?.wrapping_mul(data),
        },
        gimli::DW_CFA_def_cfa_expression => Instruction::DefCfaExpression {
            expr: read_expression(cursor, cie, config)?,
        },
        gimli::DW_CFA_expression => Instruction::Expression {
            register: read_register(cursor)?,
            expr: read_expression(cursor, cie, config)?,
        },
        gimli::DW_CFA_val_expression => Instruction::ValExpression {
            register: read_register(cursor)?,
            expr: read_expression(cursor, cie, config)?,
        },
        gimli::DW_CFA_GNU_args_size => Instruction::ArgsSize {
            size: cursor.read_uleb128()?,
        },
        _ => return Err(DwarfError::UnsupportedCfi { opcode, offset }),
    })
}

fn factored(value: u64, factor: i64) -> i64
{
    (value as i64).wrapping_mul(factor)
}

fn read_register(cursor: &mut ByteCursor<'_>) -> DwarfResult<Register>
{
    let position = cursor.position();
    let value = cursor.read_uleb128()?;
    u16::try_from(value)
        .map(Register)
        .map_err(|_| DwarfError::malformed(position, format!("register number {value} out of range")))
}

fn read_expression(cursor: &mut ByteCursor<'_>, cie: &Cie, config: &CfiConfig) -> DwarfResult<LocExpr>
{
    let length = cursor.read_uleb128()?;
    let bytes = cursor.read_bytes(length)?;
    let encoding = Encoding {
        format: cie.format,
        version: EXPRESSION_VERSION,
        address_size: cie.address_size,
    };
    LocExpr::parse_endian(bytes, encoding, config.endian)
}

#[cfg(test)]
mod tests
{
    use gimli::{Format, RunTimeEndian};

    use super::*;

    fn cie(code: u64, data: i64) -> Cie
    {
        Cie {
            offset: 0,
            format: Format::Dwarf32,
            version: 1,
            augmentation: String::new(),
            address_size: 8,
            segment_size: 0,
            code_alignment_factor: code,
            data_alignment_factor: data,
            return_address_register: Register(16),
            fde_encoding: gimli::DW_EH_PE_absptr,
            lsda_encoding: None,
            personality: None,
            signal_frame: false,
            has_augmentation_data: false,
            instructions: 0..0,
        }
    }

    fn parse(bytes: &[u8], cie: &Cie) -> DwarfResult<Vec<Instruction>>
    {
        let config = CfiConfig::debug_frame(8, RunTimeEndian::Little);
        let mut cursor = ByteCursor::new(bytes, RunTimeEndian::Little);
        Ok(parse_instructions(&mut cursor, cie, &config)?.into_iter().map(|(_, i)| i).collect())
    }

    #[test]
    fn test_alignment_factors_applied()
    {
        // advance_loc 3, offset r6 2, def_cfa_offset_sf 2
        let instructions = parse(&[0x43, 0x86, 0x02, 0x13, 0x02], &cie(4, -8)).unwrap();
        assert_eq!(
            instructions,
            vec![
                Instruction::AdvanceLoc { delta: 12 },
                Instruction::Offset {
                    register: Register(6),
                    offset: -16
                },
                Instruction::DefCfaOffset { offset: -16 },
            ]
        );
    }

    #[test]
    fn test_gnu_negative_offset()
    {
        let instructions = parse(&[0x2f, 0x03, 0x01], &cie(1, -8)).unwrap();
        assert_eq!(
            instructions,
            vec![Instruction::Offset {
                register: Register(3),
                offset: 8
            }]
        );
    }

    #[test]
    fn test_vendor_opcode_is_fatal()
    {
        // DW_CFA_MIPS_advance_loc8
        let err = parse(&[0x00, 0x1d, 0, 0, 0, 0, 0, 0, 0, 0], &cie(1, -8)).unwrap_err();
        assert!(matches!(err, DwarfError::UnsupportedCfi { offset: 1, .. }));
    }
}
