//! Interpretation classes.
//!
//! DWARF gives every attribute a list of permitted classes and every form a
//! list of classes it can encode. The class of a concrete `(attribute, form)`
//! pair is found by intersecting the two tables, then applying a small set of
//! disambiguation rules when more than one class survives.
//!
//! ## References
//!
//! - [DWARF 4, section 7.5.4: Attribute Encodings](https://dwarfstd.org/doc/DWARF4.pdf#page=160)

use gimli::{DwAt, DwForm};

/// DWARF attribute value classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Class
{
    Address,
    Block,
    Constant,
    Exprloc,
    Flag,
    LinePtr,
    LocListPtr,
    MacPtr,
    RangeListPtr,
    Reference,
    String,
    /// `addrptr`, `stroffsetsptr`, `loclistsptr` and `rnglistsptr`: offsets
    /// of a unit's contribution to a DWARF 5 indexed section
    BasePtr,
}

/// Outcome of resolving an `(attribute, form)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpretation
{
    Class(Class),
    /// A block on a location-describing attribute, decoded as an expression
    BlockAsExpr,
    /// A constant `DW_AT_data_member_location`, re-expressed as
    /// `DW_OP_constu n` so member locations are uniformly expressions
    ConstantAsExpr,
    Unrecognized,
}

use Class::{
    Address, BasePtr, Block, Constant, Exprloc, Flag, LinePtr, LocListPtr, MacPtr, RangeListPtr, Reference,
};

/// Classes permitted for `attr`, most preferred first.
///
/// Returns an empty slice for attributes this table does not know; their
/// values are classified by form alone.
pub fn attribute_classes(attr: DwAt) -> &'static [Class]
{
    match attr {
        gimli::DW_AT_sibling
        | gimli::DW_AT_discr
        | gimli::DW_AT_import
        | gimli::DW_AT_common_reference
        | gimli::DW_AT_containing_type
        | gimli::DW_AT_default_value
        | gimli::DW_AT_abstract_origin
        | gimli::DW_AT_base_types
        | gimli::DW_AT_friend
        | gimli::DW_AT_namelist_item
        | gimli::DW_AT_priority
        | gimli::DW_AT_specification
        | gimli::DW_AT_type
        | gimli::DW_AT_extension
        | gimli::DW_AT_small
        | gimli::DW_AT_object_pointer
        | gimli::DW_AT_signature
        | gimli::DW_AT_call_origin
        | gimli::DW_AT_call_parameter => &[Reference],

        gimli::DW_AT_location => &[LocListPtr, Block, Exprloc],
        gimli::DW_AT_data_member_location => &[LocListPtr, Constant, Exprloc, Block],
        gimli::DW_AT_string_length
        | gimli::DW_AT_return_addr
        | gimli::DW_AT_frame_base
        | gimli::DW_AT_segment
        | gimli::DW_AT_static_link
        | gimli::DW_AT_use_location
        | gimli::DW_AT_vtable_elem_location => &[LocListPtr, Exprloc, Block],
        gimli::DW_AT_data_location | gimli::DW_AT_call_value | gimli::DW_AT_call_target => &[Exprloc, Block],

        gimli::DW_AT_name
        | gimli::DW_AT_comp_dir
        | gimli::DW_AT_producer
        | gimli::DW_AT_description
        | gimli::DW_AT_picture_string
        | gimli::DW_AT_linkage_name
        | gimli::DW_AT_MIPS_linkage_name
        | gimli::DW_AT_dwo_name => &[Class::String],

        gimli::DW_AT_byte_size
        | gimli::DW_AT_bit_offset
        | gimli::DW_AT_bit_size
        | gimli::DW_AT_lower_bound
        | gimli::DW_AT_upper_bound
        | gimli::DW_AT_count
        | gimli::DW_AT_byte_stride
        | gimli::DW_AT_bit_stride
        | gimli::DW_AT_associated
        | gimli::DW_AT_allocated
        | gimli::DW_AT_rank => &[Constant, Reference, Exprloc],

        gimli::DW_AT_ordering
        | gimli::DW_AT_language
        | gimli::DW_AT_discr_value
        | gimli::DW_AT_visibility
        | gimli::DW_AT_inline
        | gimli::DW_AT_start_scope
        | gimli::DW_AT_accessibility
        | gimli::DW_AT_address_class
        | gimli::DW_AT_calling_convention
        | gimli::DW_AT_decl_column
        | gimli::DW_AT_decl_file
        | gimli::DW_AT_decl_line
        | gimli::DW_AT_encoding
        | gimli::DW_AT_identifier_case
        | gimli::DW_AT_virtuality
        | gimli::DW_AT_call_column
        | gimli::DW_AT_call_file
        | gimli::DW_AT_call_line
        | gimli::DW_AT_binary_scale
        | gimli::DW_AT_decimal_scale
        | gimli::DW_AT_decimal_sign
        | gimli::DW_AT_digit_count
        | gimli::DW_AT_endianity
        | gimli::DW_AT_data_bit_offset
        | gimli::DW_AT_alignment
        | gimli::DW_AT_defaulted => &[Constant],

        gimli::DW_AT_const_value => &[Block, Constant, Class::String],

        gimli::DW_AT_is_optional
        | gimli::DW_AT_prototyped
        | gimli::DW_AT_artificial
        | gimli::DW_AT_declaration
        | gimli::DW_AT_external
        | gimli::DW_AT_variable_parameter
        | gimli::DW_AT_use_UTF8
        | gimli::DW_AT_mutable
        | gimli::DW_AT_threads_scaled
        | gimli::DW_AT_explicit
        | gimli::DW_AT_elemental
        | gimli::DW_AT_pure
        | gimli::DW_AT_recursive
        | gimli::DW_AT_main_subprogram
        | gimli::DW_AT_const_expr
        | gimli::DW_AT_enum_class
        | gimli::DW_AT_noreturn
        | gimli::DW_AT_call_all_calls
        | gimli::DW_AT_call_tail_call
        | gimli::DW_AT_export_symbols => &[Flag],

        gimli::DW_AT_low_pc | gimli::DW_AT_entry_pc | gimli::DW_AT_call_return_pc | gimli::DW_AT_call_pc => {
            &[Address]
        }
        gimli::DW_AT_high_pc => &[Address, Constant],
        gimli::DW_AT_trampoline => &[Address, Flag, Reference, Class::String],

        gimli::DW_AT_stmt_list => &[LinePtr],
        gimli::DW_AT_ranges => &[RangeListPtr],
        gimli::DW_AT_macro_info | gimli::DW_AT_macros | gimli::DW_AT_GNU_macros => &[MacPtr],
        gimli::DW_AT_discr_list => &[Block],

        gimli::DW_AT_str_offsets_base
        | gimli::DW_AT_addr_base
        | gimli::DW_AT_rnglists_base
        | gimli::DW_AT_loclists_base
        | gimli::DW_AT_GNU_addr_base
        | gimli::DW_AT_GNU_ranges_base => &[BasePtr],

        _ => &[],
    }
}

/// Classes `form` can encode in a unit of `version`.
///
/// `data4`/`data8` doubled as section pointers before DWARF 4 introduced
/// `DW_FORM_sec_offset`; from version 4 on they are listed as constants only,
/// and [`interpret`] falls back to [`SECTION_POINTERS`] for them.
pub fn form_classes(form: DwForm, version: u16) -> &'static [Class]
{
    match form {
        gimli::DW_FORM_addr => &[Address, Constant],
        gimli::DW_FORM_addrx
        | gimli::DW_FORM_addrx1
        | gimli::DW_FORM_addrx2
        | gimli::DW_FORM_addrx3
        | gimli::DW_FORM_addrx4
        | gimli::DW_FORM_GNU_addr_index => &[Address],

        gimli::DW_FORM_block1 | gimli::DW_FORM_block2 | gimli::DW_FORM_block4 | gimli::DW_FORM_block => &[Block],
        gimli::DW_FORM_exprloc => &[Exprloc],

        gimli::DW_FORM_data4 | gimli::DW_FORM_data8 if version < 4 => {
            &[Constant, LocListPtr, RangeListPtr, LinePtr, MacPtr]
        }
        gimli::DW_FORM_data1
        | gimli::DW_FORM_data2
        | gimli::DW_FORM_data4
        | gimli::DW_FORM_data8
        | gimli::DW_FORM_data16
        | gimli::DW_FORM_udata
        | gimli::DW_FORM_sdata
        | gimli::DW_FORM_implicit_const => &[Constant],

        gimli::DW_FORM_flag | gimli::DW_FORM_flag_present => &[Flag],

        gimli::DW_FORM_string
        | gimli::DW_FORM_strp
        | gimli::DW_FORM_line_strp
        | gimli::DW_FORM_strx
        | gimli::DW_FORM_strx1
        | gimli::DW_FORM_strx2
        | gimli::DW_FORM_strx3
        | gimli::DW_FORM_strx4
        | gimli::DW_FORM_GNU_str_index => &[Class::String],

        gimli::DW_FORM_ref1
        | gimli::DW_FORM_ref2
        | gimli::DW_FORM_ref4
        | gimli::DW_FORM_ref8
        | gimli::DW_FORM_ref_udata
        | gimli::DW_FORM_ref_addr
        | gimli::DW_FORM_ref_sig8 => &[Reference],

        gimli::DW_FORM_sec_offset => &[LinePtr, LocListPtr, MacPtr, RangeListPtr, BasePtr],
        gimli::DW_FORM_loclistx => &[LocListPtr],
        gimli::DW_FORM_rnglistx => &[RangeListPtr],

        _ => &[],
    }
}

/// Pointer classes `data4`/`data8` still carry in producers that never moved
/// to `DW_FORM_sec_offset`
pub const SECTION_POINTERS: &[Class] = &[LocListPtr, RangeListPtr, LinePtr, MacPtr];

/// Whether `attr` describes a location, so that a block value is an expression
pub fn describes_location(attr: DwAt) -> bool
{
    matches!(
        attr,
        gimli::DW_AT_location
            | gimli::DW_AT_data_member_location
            | gimli::DW_AT_vtable_elem_location
            | gimli::DW_AT_string_length
            | gimli::DW_AT_use_location
            | gimli::DW_AT_return_addr
            | gimli::DW_AT_frame_base
            | gimli::DW_AT_static_link
            | gimli::DW_AT_segment
            | gimli::DW_AT_data_location
    )
}

/// Resolve the interpretation of an `(attribute, form)` pair.
///
/// 1. Take the attribute's first listed class that the form also admits.
/// 2. If nothing intersects and the form is `data4`/`data8`, try the section
///    pointer classes, whatever the unit version.
/// 3. If the attribute is unknown, or still nothing intersects, fall back to
///    the form's first class.
/// 4. A block on a location-describing attribute becomes an expression; a
///    constant `DW_AT_data_member_location` becomes `DW_OP_constu n`.
/// 5. A form with no classes at all is unrecognized.
pub fn interpret(attr: DwAt, form: DwForm, version: u16) -> Interpretation
{
    let admitted = form_classes(form, version);
    let Some(first_of_form) = admitted.first().copied() else {
        return Interpretation::Unrecognized;
    };
    let wanted = attribute_classes(attr);
    let pick = |admitted: &[Class]| wanted.iter().copied().find(|class| admitted.contains(class));
    let class = pick(admitted)
        .or_else(|| {
            matches!(form, gimli::DW_FORM_data4 | gimli::DW_FORM_data8)
                .then(|| pick(SECTION_POINTERS))
                .flatten()
        })
        .unwrap_or(first_of_form);

    match class {
        Block if describes_location(attr) => Interpretation::BlockAsExpr,
        Constant if attr == gimli::DW_AT_data_member_location => Interpretation::ConstantAsExpr,
        other => Interpretation::Class(other),
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_data4_depends_on_attribute()
    {
        assert_eq!(
            interpret(gimli::DW_AT_byte_size, gimli::DW_FORM_data4, 3),
            Interpretation::Class(Constant)
        );
        assert_eq!(
            interpret(gimli::DW_AT_stmt_list, gimli::DW_FORM_data4, 3),
            Interpretation::Class(LinePtr)
        );
        assert_eq!(
            interpret(gimli::DW_AT_location, gimli::DW_FORM_data4, 2),
            Interpretation::Class(LocListPtr)
        );
    }

    #[test]
    fn test_data4_is_constant_from_v4_unless_only_a_pointer_fits()
    {
        assert_eq!(
            interpret(gimli::DW_AT_byte_size, gimli::DW_FORM_data4, 4),
            Interpretation::Class(Constant)
        );
        assert_eq!(
            interpret(gimli::DW_AT_stmt_list, gimli::DW_FORM_data4, 4),
            Interpretation::Class(LinePtr)
        );
        assert_eq!(
            interpret(gimli::DW_AT_ranges, gimli::DW_FORM_data8, 5),
            Interpretation::Class(RangeListPtr)
        );
        assert_eq!(
            interpret(gimli::DW_AT_location, gimli::DW_FORM_data4, 4),
            Interpretation::Class(LocListPtr)
        );
        assert_eq!(
            interpret(gimli::DW_AT_data_member_location, gimli::DW_FORM_data4, 4),
            Interpretation::ConstantAsExpr
        );
    }

    #[test]
    fn test_block_on_location_is_expression()
    {
        assert_eq!(
            interpret(gimli::DW_AT_location, gimli::DW_FORM_block1, 2),
            Interpretation::BlockAsExpr
        );
        assert_eq!(
            interpret(gimli::DW_AT_const_value, gimli::DW_FORM_block1, 2),
            Interpretation::Class(Block)
        );
    }

    #[test]
    fn test_unknown_attribute_uses_form_class()
    {
        assert_eq!(
            interpret(DwAt(0x3fff), gimli::DW_FORM_udata, 4),
            Interpretation::Class(Constant)
        );
        assert_eq!(interpret(gimli::DW_AT_name, DwForm(0x7e), 4), Interpretation::Unrecognized);
    }

    #[test]
    fn test_sec_offset_follows_attribute()
    {
        assert_eq!(
            interpret(gimli::DW_AT_ranges, gimli::DW_FORM_sec_offset, 4),
            Interpretation::Class(RangeListPtr)
        );
        assert_eq!(
            interpret(gimli::DW_AT_macro_info, gimli::DW_FORM_sec_offset, 4),
            Interpretation::Class(MacPtr)
        );
        assert_eq!(
            interpret(gimli::DW_AT_str_offsets_base, gimli::DW_FORM_sec_offset, 5),
            Interpretation::Class(BasePtr)
        );
    }
}
