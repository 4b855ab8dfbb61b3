//! # Types
//!
//! Small value types shared by every component: target addresses and DIE
//! offsets.

pub mod address;
pub mod offset;

pub use address::Address;
pub use offset::DieOffset;
