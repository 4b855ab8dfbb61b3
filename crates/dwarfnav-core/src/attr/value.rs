//! Typed attribute values.

use std::fmt;

use gimli::DwForm;

use super::ranges::RangeList;
use crate::expr::LocList;
use crate::types::{Address, DieOffset};

/// A decoded attribute value.
///
/// Values own their data and outlive the graph that produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue
{
    Flag(bool),
    Unsigned(u64),
    Signed(i64),
    Address(Address),
    String(String),
    Block(Vec<u8>),
    /// A DIE reference, already made absolute within `.debug_info`
    Reference
    {
        offset: DieOffset,
        /// Set for `DW_FORM_ref_addr`, which may point into another unit
        cross_unit: bool,
    },
    /// A type-unit signature (`DW_FORM_ref_sig8`)
    TypeSignature(u64),
    /// A location list; inline expressions become a single entry covering all addresses
    LocList(LocList),
    RangeList(RangeList),
    /// Offset into `.debug_line`
    LinePtr(u64),
    /// Offset into `.debug_macinfo` / `.debug_macro`
    MacPtr(u64),
    /// Offset of the unit's contribution to an indexed section
    BaseOffset(u64),
    /// The attribute could not be decoded; the rest of its DIE still is
    Unrecognized
    {
        form: DwForm,
    },
    /// The DIE has no such attribute
    NotPresent,
}

impl AttributeValue
{
    pub const fn is_present(&self) -> bool
    {
        !matches!(self, AttributeValue::NotPresent)
    }

    /// Constant value as unsigned, accepting either signedness
    pub const fn as_unsigned(&self) -> Option<u64>
    {
        match self {
            AttributeValue::Unsigned(value) => Some(*value),
            AttributeValue::Signed(value) if *value >= 0 => Some(*value as u64),
            _ => None,
        }
    }

    /// Constant value as signed, accepting either signedness
    pub const fn as_signed(&self) -> Option<i64>
    {
        match self {
            AttributeValue::Signed(value) => Some(*value),
            AttributeValue::Unsigned(value) if *value <= i64::MAX as u64 => Some(*value as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str>
    {
        match self {
            AttributeValue::String(value) => Some(value),
            _ => None,
        }
    }

    pub const fn as_flag(&self) -> Option<bool>
    {
        match self {
            AttributeValue::Flag(value) => Some(*value),
            _ => None,
        }
    }

    pub const fn as_address(&self) -> Option<Address>
    {
        match self {
            AttributeValue::Address(value) => Some(*value),
            _ => None,
        }
    }

    pub const fn as_reference(&self) -> Option<DieOffset>
    {
        match self {
            AttributeValue::Reference { offset, .. } => Some(*offset),
            _ => None,
        }
    }

    pub const fn as_loclist(&self) -> Option<&LocList>
    {
        match self {
            AttributeValue::LocList(list) => Some(list),
            _ => None,
        }
    }

    pub const fn as_rangelist(&self) -> Option<&RangeList>
    {
        match self {
            AttributeValue::RangeList(list) => Some(list),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            AttributeValue::Flag(value) => write!(f, "{value}"),
            AttributeValue::Unsigned(value) => write!(f, "{value}"),
            AttributeValue::Signed(value) => write!(f, "{value}"),
            AttributeValue::Address(value) => write!(f, "{value}"),
            AttributeValue::String(value) => write!(f, "\"{value}\""),
            AttributeValue::Block(bytes) => {
                write!(f, "block[{}]", bytes.len())?;
                for byte in bytes {
                    write!(f, " {byte:02x}")?;
                }
                Ok(())
            }
            AttributeValue::Reference { offset, cross_unit } => {
                write!(f, "{offset}")?;
                if *cross_unit {
                    write!(f, " (ref_addr)")?;
                }
                Ok(())
            }
            AttributeValue::TypeSignature(sig) => write!(f, "signature 0x{sig:016x}"),
            AttributeValue::LocList(list) => write!(f, "{list}"),
            AttributeValue::RangeList(list) => write!(f, "{list}"),
            AttributeValue::LinePtr(offset) => write!(f, "lineptr 0x{offset:x}"),
            AttributeValue::MacPtr(offset) => write!(f, "macptr 0x{offset:x}"),
            AttributeValue::BaseOffset(offset) => write!(f, "base 0x{offset:x}"),
            AttributeValue::Unrecognized { form } => write!(f, "<unrecognized {form}>"),
            AttributeValue::NotPresent => write!(f, "<not present>"),
        }
    }
}
