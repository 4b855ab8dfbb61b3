//! # Error Types
//!
//! Error handling for DWARF decoding, navigation, expression evaluation and
//! call-frame decoding.
//!
//! We use `thiserror` to generate the `Error` implementations and messages.
//! Every variant that is tied to a position in the input carries the byte
//! offset where the condition was observed, so a front end can report it and
//! move on to the next DIE or unit.

use gimli::{DwCfa, DwEhPe, DwForm, DwOp};
use thiserror::Error;

/// Broad category of a [`DwarfError`].
///
/// There is no "not found" kind: lookups that legitimately have no
/// result return `Option::None` instead of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind
{
    /// The bytes are truncated, out of range or otherwise invalid.
    MalformedInput,
    /// The bytes are valid but use a construct this crate does not implement.
    UnsupportedFeature,
    /// The caller asked for something the data cannot support.
    LogicPrecondition,
}

/// Main error type for DWARF operations
///
/// ## Error Categories
///
/// 1. **Malformed input**: UnexpectedEof, OffsetOutOfRange, UnknownAbbreviation, UnknownForm,
///    UnsupportedVersion, BadLeb128, Malformed
/// 2. **Unsupported features**: UnsupportedOpcode, UnsupportedCfi, UnsupportedPointerEncoding,
///    NoMemoryReader, Unsupported
/// 3. **Caller preconditions**: NoRegisterFile, NoFrameBase, NoCfa, StackUnderflow,
///    UnacceptedOutcome, NotSynthetic, BadAddressSize, NoRoom
/// 4. **I/O errors**: Io (front ends reading files)
#[derive(Error, Debug)]
pub enum DwarfError
{
    /// A read ran past the end of the section
    ///
    /// This happens with truncated sections or with length fields that
    /// claim more bytes than exist.
    #[error("Unexpected end of data at offset 0x{offset:x}")]
    UnexpectedEof
    {
        /// Offset of the read that failed
        offset: u64,
    },

    /// An offset points outside the section it refers to
    #[error("Offset 0x{offset:x} is out of range for {section}")]
    OffsetOutOfRange
    {
        /// The offending offset
        offset: u64,
        /// Name of the section being indexed
        section: &'static str,
    },

    /// A DIE references an abbreviation code its table does not define
    #[error("Unknown abbreviation code {code} at offset 0x{offset:x}")]
    UnknownAbbreviation
    {
        /// Abbreviation code read from the DIE
        code: u64,
        /// Offset of the DIE
        offset: u64,
    },

    /// An attribute uses a form code that is not defined by any DWARF version
    #[error("Unknown form {form} at offset 0x{offset:x}")]
    UnknownForm
    {
        /// The form code
        form: DwForm,
        /// Offset of the attribute
        offset: u64,
    },

    /// A unit or CIE header carries a version this crate cannot decode
    #[error("Unsupported version {version} at offset 0x{offset:x}")]
    UnsupportedVersion
    {
        /// The version field
        version: u16,
        /// Offset of the header
        offset: u64,
    },

    /// A LEB128 value does not fit in 64 bits
    #[error("LEB128 value overflows 64 bits at offset 0x{offset:x}")]
    BadLeb128
    {
        /// Offset where the value starts
        offset: u64,
    },

    /// Generic malformed data
    #[error("Malformed data at offset 0x{offset:x}: {reason}")]
    Malformed
    {
        /// Offset where the problem was noticed
        offset: u64,
        /// What was wrong
        reason: String,
    },

    /// A location expression uses an opcode the evaluator does not implement
    #[error("Unsupported expression opcode {opcode} at expression offset {offset}")]
    UnsupportedOpcode
    {
        /// The opcode
        opcode: DwOp,
        /// Offset of the operation inside its expression
        offset: usize,
    },

    /// A call-frame program uses an instruction outside the supported dialect
    #[error("Unsupported CFI dialect: instruction {opcode} at offset 0x{offset:x}")]
    UnsupportedCfi
    {
        /// The instruction opcode
        opcode: DwCfa,
        /// Offset of the instruction in the frame section
        offset: u64,
    },

    /// An eh_frame pointer encoding that cannot be applied
    ///
    /// `DW_EH_PE_textrel` and `DW_EH_PE_datarel` need a base address that was
    /// not configured, and `DW_EH_PE_aligned` is not implemented.
    #[error("Unsupported pointer encoding {encoding} at offset 0x{offset:x}")]
    UnsupportedPointerEncoding
    {
        /// The encoding byte
        encoding: DwEhPe,
        /// Offset of the encoded pointer
        offset: u64,
    },

    /// A dereference was evaluated without a memory reader
    ///
    /// ## Solution
    ///
    /// Supply a [`MemoryAccess`](crate::expr::MemoryAccess) implementation in the
    /// evaluation context.
    #[error("Dereference requires a memory reader")]
    NoMemoryReader,

    /// Any other recognized-but-unimplemented construct
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// A register was read but no register file was supplied
    ///
    /// ## Solution
    ///
    /// Supply a [`RegisterFile`](crate::expr::RegisterFile) in the evaluation context.
    #[error("Register {register} read without a register file")]
    NoRegisterFile
    {
        /// DWARF register number
        register: u16,
    },

    /// `DW_OP_fbreg` was evaluated without a frame base
    #[error("Frame-relative location evaluated without a frame base")]
    NoFrameBase,

    /// `DW_OP_call_frame_cfa` was evaluated without a CFA
    #[error("CFA-relative location evaluated without a CFA")]
    NoCfa,

    /// An operation needed more operands than the stack holds
    #[error("Expression stack underflow at expression offset {offset}")]
    StackUnderflow
    {
        /// Offset of the operation inside its expression
        offset: usize,
    },

    /// The evaluator halted in a state the caller did not accept
    #[error("Expression produced {actual}, caller accepts {accepted}")]
    UnacceptedOutcome
    {
        /// What the expression produced
        actual: &'static str,
        /// What the caller accepts
        accepted: String,
    },

    /// An attribute write was attempted on a DIE decoded from the input
    #[error("DIE at offset 0x{offset:x} is not synthetic and cannot be modified")]
    NotSynthetic
    {
        /// Offset of the DIE
        offset: u64,
    },

    /// An evaluation context names a generic type width outside 1..=8 bytes
    #[error("Unsupported address size {size} for expression evaluation")]
    BadAddressSize
    {
        /// The configured size in bytes
        size: u8,
    },

    /// `make_new` found no free offset after the parent's subtree
    ///
    /// This happens when the DIE following the parent's last descendant starts
    /// exactly one byte after it.
    #[error("No room for a new DIE under offset 0x{parent:x}")]
    NoRoom
    {
        /// Offset of the requested parent
        parent: u64,
    },

    /// I/O error
    ///
    /// Only front ends that read files produce this variant.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DwarfError
{
    /// Classify this error into the broad categories callers branch on.
    pub const fn kind(&self) -> ErrorKind
    {
        match self {
            DwarfError::UnexpectedEof { .. }
            | DwarfError::OffsetOutOfRange { .. }
            | DwarfError::UnknownAbbreviation { .. }
            | DwarfError::UnknownForm { .. }
            | DwarfError::UnsupportedVersion { .. }
            | DwarfError::BadLeb128 { .. }
            | DwarfError::Malformed { .. }
            | DwarfError::Io(_) => ErrorKind::MalformedInput,
            DwarfError::UnsupportedOpcode { .. }
            | DwarfError::UnsupportedCfi { .. }
            | DwarfError::UnsupportedPointerEncoding { .. }
            | DwarfError::NoMemoryReader
            | DwarfError::Unsupported(_) => ErrorKind::UnsupportedFeature,
            DwarfError::NoRegisterFile { .. }
            | DwarfError::NoFrameBase
            | DwarfError::NoCfa
            | DwarfError::StackUnderflow { .. }
            | DwarfError::UnacceptedOutcome { .. }
            | DwarfError::NotSynthetic { .. }
            | DwarfError::BadAddressSize { .. }
            | DwarfError::NoRoom { .. } => ErrorKind::LogicPrecondition,
        }
    }

    /// Byte offset the error is attached to, when it has one.
    pub const fn offset(&self) -> Option<u64>
    {
        match self {
            DwarfError::UnexpectedEof { offset }
            | DwarfError::OffsetOutOfRange { offset, .. }
            | DwarfError::UnknownAbbreviation { offset, .. }
            | DwarfError::UnknownForm { offset, .. }
            | DwarfError::UnsupportedVersion { offset, .. }
            | DwarfError::BadLeb128 { offset }
            | DwarfError::Malformed { offset, .. }
            | DwarfError::UnsupportedCfi { offset, .. }
            | DwarfError::UnsupportedPointerEncoding { offset, .. }
            | DwarfError::NotSynthetic { offset } => Some(*offset),
            DwarfError::NoRoom { parent } => Some(*parent),
            _ => None,
        }
    }

    pub(crate) fn malformed(offset: u64, reason: impl Into<String>) -> Self
    {
        DwarfError::Malformed {
            offset,
            reason: reason.into(),
        }
    }
}

/// Convenience type alias for `Result<T, DwarfError>`
///
/// ```rust
/// use dwarfnav_core::error::DwarfResult;
/// fn foo() -> DwarfResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type DwarfResult<T> = std::result::Result<T, DwarfError>;
