//! # Location Expressions
//!
//! Parsing ([`op`]), location lists ([`loclist`]) and evaluation ([`eval`])
//! of DWARF location expressions.

pub mod eval;
pub mod loclist;
pub mod op;

pub use eval::{
    Accept, EvalContext, ExprEvaluator, MemoryAccess, Outcome, RegisterFile, MAX_STACK_DEPTH, MAX_STEPS,
};
pub use loclist::{decode_debug_loc, decode_loclists, LocList, LocListEntry};
pub use op::{ExprOp, LocExpr, Operand};
