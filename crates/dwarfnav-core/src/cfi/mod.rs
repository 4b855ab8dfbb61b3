//! # Call Frame Information
//!
//! Decodes `.debug_frame` and `.eh_frame` into unwind tables.
//!
//! ## How it works
//!
//! A section is a sequence of CIE and FDE records. Each FDE covers a PC
//! range and names a CIE holding the alignment factors, the return-address
//! register, pointer encodings and a prologue of "initial instructions".
//!
//! To unwind at a PC, [`CfiDecoder`] finds the covering FDE, runs the CIE's
//! initial instructions and then the FDE's, and returns the [`UnwindRow`]
//! in force at that PC. Advance instructions close the current row at a new
//! boundary; every other instruction edits the open row.
//!
//! ## Example
//!
//! ```rust,no_run
//! use dwarfnav_core::cfi::{CfiConfig, CfiDecoder};
//! use dwarfnav_core::types::Address;
//! use gimli::RunTimeEndian;
//!
//! # fn demo(debug_frame: &[u8]) -> dwarfnav_core::error::DwarfResult<()> {
//! let decoder = CfiDecoder::new(debug_frame, CfiConfig::debug_frame(8, RunTimeEndian::Little));
//! if let Some(row) = decoder.unwind_row(Address::new(0x401000))? {
//!     println!("{row}");
//! }
//! # Ok(())
//! # }
//! ```

mod decoder;
mod entry;
mod instr;
mod pointer;
mod table;

pub use self::decoder::CfiDecoder;
pub use self::entry::{CfiConfig, CfiSection, Cie, Fde};
pub use self::instr::{Instruction, Program};
pub use self::pointer::CfiBases;
pub use self::table::{CfaRule, RegisterNames, RegisterRule, UnwindRow, UnwindTable};
