//! # Attribute Decoding
//!
//! Everything needed to turn the bytes of one attribute into an
//! [`AttributeValue`]:
//!
//! - [`form`]: storage shapes, one per `DW_FORM_*` code
//! - [`class`]: the attribute/form interpretation-class tables
//! - [`codec`]: the per-unit decoder that combines both and resolves
//!   values that live in other sections
//! - [`ranges`]: `DW_AT_ranges` lists
//!
//! ## References
//!
//! - [DWARF 5, section 7.5.5: Classes and Forms](https://dwarfstd.org/doc/DWARF5.pdf#page=213)

pub mod class;
pub mod codec;
pub mod form;
pub mod ranges;
pub mod value;

pub use class::{Class, Interpretation};
pub use codec::{AttributeCodec, UnitBases};
pub use form::{read_form, skip_form, FormValue};
pub use ranges::{AddressRange, RangeList};
pub use value::AttributeValue;
