//! Attribute values as seen through the graph, per DWARF version

mod common;

use common::{AbbrevBuilder, InfoBuilder};
use dwarfnav_core::attr::AttributeValue;
use dwarfnav_core::graph::DieGraph;
use dwarfnav_core::types::{Address, DieOffset};
use dwarfnav_core::DwarfSections;

const LOW_PC: u64 = 0x40_0000;

struct Units
{
    info: Vec<u8>,
    abbrev: Vec<u8>,
    str: Vec<u8>,
    loc: Vec<u8>,
    v3_unit: u64,
    v3_var: u64,
    v3_block: u64,
    v4_unit: u64,
    v4_var: u64,
}

impl Units
{
    fn sections(&self) -> DwarfSections<'_>
    {
        DwarfSections::new(&self.info, &self.abbrev, gimli::RunTimeEndian::Little)
            .with_debug_str(&self.str)
            .with_debug_loc(&self.loc)
    }
}

/// One version 3 and one version 4 unit sharing an abbreviation table
fn units() -> Units
{
    let abbrev = AbbrevBuilder::default()
        .add(
            1,
            gimli::DW_TAG_compile_unit,
            true,
            &[
                (gimli::DW_AT_name, gimli::DW_FORM_string),
                (gimli::DW_AT_producer, gimli::DW_FORM_strp),
                (gimli::DW_AT_low_pc, gimli::DW_FORM_addr),
                (gimli::DW_AT_stmt_list, gimli::DW_FORM_data4),
            ],
        )
        .add(
            2,
            gimli::DW_TAG_variable,
            false,
            &[
                (gimli::DW_AT_name, gimli::DW_FORM_string),
                (gimli::DW_AT_byte_size, gimli::DW_FORM_data4),
                (gimli::DW_AT_location, gimli::DW_FORM_data4),
            ],
        )
        .add(
            3,
            gimli::DW_TAG_variable,
            false,
            &[
                (gimli::DW_AT_name, gimli::DW_FORM_string),
                (gimli::DW_AT_location, gimli::DW_FORM_block1),
            ],
        )
        .finish();

    let mut info = InfoBuilder::default();
    info.begin_unit(3, 8);
    info.die("v3.cu", 1).string("a.c").u32(0).u64(LOW_PC).u32(0x40);
    info.die("v3.var", 2).string("v").u32(4).u32(0);
    // DW_OP_fbreg -8
    info.die("v3.block", 3).string("w").u8(2).u8(0x91).u8(0x78);
    info.null();
    info.end_unit();

    info.begin_unit(4, 8);
    info.die("v4.cu", 1).string("b.c").u32(0).u64(LOW_PC).u32(0x80);
    info.die("v4.var", 2).string("v").u32(4).u32(0);
    info.null();
    info.end_unit();

    let fixture = info.finish();

    let mut loc = Vec::new();
    loc.extend_from_slice(&0x10u64.to_le_bytes());
    loc.extend_from_slice(&0x20u64.to_le_bytes());
    loc.extend_from_slice(&1u16.to_le_bytes());
    loc.push(0x50); // DW_OP_reg0
    loc.extend_from_slice(&[0; 16]);

    Units {
        v3_unit: fixture.at("v3.cu"),
        v3_var: fixture.at("v3.var"),
        v3_block: fixture.at("v3.block"),
        v4_unit: fixture.at("v4.cu"),
        v4_var: fixture.at("v4.var"),
        info: fixture.info,
        abbrev,
        str: b"cc 1.0\0".to_vec(),
        loc,
    }
}

#[test]
fn test_unit_attributes()
{
    let units = units();
    let graph = DieGraph::new(units.sections());
    let unit = graph.find(DieOffset(units.v3_unit)).unwrap();

    assert_eq!(graph.attr(&unit, gimli::DW_AT_stmt_list).unwrap(), AttributeValue::LinePtr(0x40));
    assert_eq!(
        graph.attr(&unit, gimli::DW_AT_producer).unwrap().as_str(),
        Some("cc 1.0")
    );
    assert_eq!(
        graph.attr(&unit, gimli::DW_AT_low_pc).unwrap().as_address(),
        Some(Address::new(LOW_PC))
    );
    assert_eq!(graph.attr(&unit, gimli::DW_AT_language).unwrap(), AttributeValue::NotPresent);
}

#[test]
fn test_data4_location_in_version_3_is_a_list_pointer()
{
    let units = units();
    let graph = DieGraph::new(units.sections());
    let var = graph.find(DieOffset(units.v3_var)).unwrap();

    assert_eq!(graph.attr(&var, gimli::DW_AT_byte_size).unwrap().as_unsigned(), Some(4));
    let AttributeValue::LocList(list) = graph.attr(&var, gimli::DW_AT_location).unwrap() else {
        panic!("expected a location list");
    };
    assert_eq!(list.len(), 1);
    // entries are relative to the unit's low_pc
    let expr = list.expr_for_pc(Address::new(LOW_PC + 0x18)).unwrap();
    assert_eq!(expr.ops()[0].opcode, gimli::DW_OP_reg0);
    assert!(list.expr_for_pc(Address::new(LOW_PC + 0x20)).is_none());
    assert!(list.expr_for_pc(Address::new(0x18)).is_none());
}

#[test]
fn test_data4_pointers_in_version_4()
{
    let units = units();
    let graph = DieGraph::new(units.sections());
    let unit = graph.find(DieOffset(units.v4_unit)).unwrap();
    assert_eq!(graph.attr(&unit, gimli::DW_AT_stmt_list).unwrap(), AttributeValue::LinePtr(0x80));

    let var = graph.find(DieOffset(units.v4_var)).unwrap();
    assert_eq!(graph.attr(&var, gimli::DW_AT_byte_size).unwrap(), AttributeValue::Unsigned(4));
    let AttributeValue::LocList(list) = graph.attr(&var, gimli::DW_AT_location).unwrap() else {
        panic!("expected a location list");
    };
    let expr = list.expr_for_pc(Address::new(LOW_PC + 0x10)).unwrap();
    assert_eq!(expr.ops()[0].opcode, gimli::DW_OP_reg0);
}

#[test]
fn test_block_location_is_an_expression()
{
    let units = units();
    let graph = DieGraph::new(units.sections());
    let var = graph.find(DieOffset(units.v3_block)).unwrap();

    let AttributeValue::LocList(list) = graph.attr(&var, gimli::DW_AT_location).unwrap() else {
        panic!("expected an expression");
    };
    assert!(list.covers_all());
    let op = &list.entries()[0].expr.ops()[0];
    assert_eq!(op.opcode, gimli::DW_OP_fbreg);
    assert_eq!(op.operand1_signed(), -8);
}

#[test]
fn test_missing_string_section_is_local_failure()
{
    let units = units();
    let sections = DwarfSections::new(&units.info, &units.abbrev, gimli::RunTimeEndian::Little);
    let graph = DieGraph::new(sections);
    let unit = graph.find(DieOffset(units.v3_unit)).unwrap();

    assert_eq!(
        graph.attr(&unit, gimli::DW_AT_producer).unwrap(),
        AttributeValue::Unrecognized {
            form: gimli::DW_FORM_strp
        }
    );
    // the rest of the DIE still decodes
    assert_eq!(graph.name(&unit).unwrap().as_deref(), Some("a.c"));
    assert_eq!(graph.attr(&unit, gimli::DW_AT_stmt_list).unwrap(), AttributeValue::LinePtr(0x40));
}
