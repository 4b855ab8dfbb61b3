//! # dwarfnav-core
//!
//! DWARF debugging information as a navigable, typed graph.
//!
//! This crate provides:
//! - A lazy, cached DIE graph over `.debug_info` with depth-first,
//!   breadth-first and child traversal, name lookup and synthetic DIEs
//! - Typed attribute values, interpreted per DWARF attribute class
//! - A location-expression evaluator
//! - A call-frame-information decoder producing per-PC unwind rows
//!
//! Nothing here touches a live process. Register and memory reads are
//! supplied by the caller through [`expr::RegisterFile`] and
//! [`expr::MemoryAccess`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use dwarfnav_core::graph::{Cursor, DieGraph};
//! use dwarfnav_core::sections::DwarfSections;
//! use gimli::RunTimeEndian;
//!
//! # fn demo(info: &[u8], abbrev: &[u8]) -> dwarfnav_core::DwarfResult<()> {
//! let sections = DwarfSections::new(info, abbrev, RunTimeEndian::Little);
//! let graph = DieGraph::new(sections);
//! for unit in graph.children(&Cursor::Root) {
//!     let unit = unit?;
//!     println!("{unit} {:?}", graph.name(&unit)?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod abbrev;
pub mod attr;
pub mod cfi;
pub mod die;
pub mod error;
pub mod expr;
pub mod graph;
pub mod reader;
pub mod sections;
pub mod types;
pub mod unit;

pub use attr::AttributeValue;
pub use cfi::{CfiConfig, CfiDecoder, UnwindRow};
pub use error::{DwarfError, DwarfResult, ErrorKind};
pub use expr::{EvalContext, ExprEvaluator};
pub use graph::{Cursor, DieGraph};
pub use sections::DwarfSections;
pub use types::{Address, DieOffset};
