//! Byte-level fixture builders shared by the integration tests.

#![allow(dead_code)]

use gimli::{DwAt, DwForm, DwTag};

pub fn uleb(mut value: u64, out: &mut Vec<u8>)
{
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

pub fn sleb(mut value: i64, out: &mut Vec<u8>)
{
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
        if done {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Assembles a `.debug_abbrev` table
#[derive(Default)]
pub struct AbbrevBuilder
{
    bytes: Vec<u8>,
}

impl AbbrevBuilder
{
    pub fn add(mut self, code: u64, tag: DwTag, children: bool, attrs: &[(DwAt, DwForm)]) -> Self
    {
        uleb(code, &mut self.bytes);
        uleb(u64::from(tag.0), &mut self.bytes);
        self.bytes.push(u8::from(children));
        for (at, form) in attrs {
            uleb(u64::from(at.0), &mut self.bytes);
            uleb(u64::from(form.0), &mut self.bytes);
        }
        self.bytes.extend_from_slice(&[0, 0]);
        self
    }

    pub fn finish(mut self) -> Vec<u8>
    {
        self.bytes.push(0);
        self.bytes
    }
}

/// Assembles little-endian 32-bit `.debug_info` units
#[derive(Default)]
pub struct InfoBuilder
{
    bytes: Vec<u8>,
    unit_start: usize,
    fixups: Vec<(usize, &'static str)>,
    labels: Vec<(&'static str, u64)>,
}

impl InfoBuilder
{
    /// Start a unit; versions 2 to 4 use the pre-v5 header layout
    pub fn begin_unit(&mut self, version: u16, address_size: u8)
    {
        self.unit_start = self.bytes.len();
        self.bytes.extend_from_slice(&[0, 0, 0, 0]);
        self.bytes.extend_from_slice(&version.to_le_bytes());
        if version >= 5 {
            self.bytes.push(gimli::DW_UT_compile.0);
            self.bytes.push(address_size);
            self.bytes.extend_from_slice(&0u32.to_le_bytes());
        } else {
            self.bytes.extend_from_slice(&0u32.to_le_bytes());
            self.bytes.push(address_size);
        }
    }

    pub fn end_unit(&mut self)
    {
        let length = (self.bytes.len() - self.unit_start - 4) as u32;
        self.bytes[self.unit_start..self.unit_start + 4].copy_from_slice(&length.to_le_bytes());
    }

    pub fn offset(&self) -> u64
    {
        self.bytes.len() as u64
    }

    /// Begin a DIE with abbreviation `code`, naming its offset `label`
    pub fn die(&mut self, label: &'static str, code: u64) -> &mut Self
    {
        self.labels.push((label, self.offset()));
        uleb(code, &mut self.bytes);
        self
    }

    pub fn null(&mut self) -> &mut Self
    {
        self.bytes.push(0);
        self
    }

    pub fn string(&mut self, value: &str) -> &mut Self
    {
        self.bytes.extend_from_slice(value.as_bytes());
        self.bytes.push(0);
        self
    }

    pub fn u8(&mut self, value: u8) -> &mut Self
    {
        self.bytes.push(value);
        self
    }

    pub fn u32(&mut self, value: u32) -> &mut Self
    {
        self.bytes.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn u64(&mut self, value: u64) -> &mut Self
    {
        self.bytes.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// A `DW_FORM_ref4` to the DIE labelled `target`, which may come later
    pub fn ref4(&mut self, target: &'static str) -> &mut Self
    {
        self.fixups.push((self.bytes.len(), target));
        self.bytes.extend_from_slice(&[0, 0, 0, 0]);
        self
    }

    pub fn label(&self, name: &str) -> u64
    {
        self.labels
            .iter()
            .find(|(label, _)| *label == name)
            .map(|(_, offset)| *offset)
            .unwrap_or_else(|| panic!("no DIE labelled {name}"))
    }

    /// Resolve references; unit-relative, so every target must be in the first unit
    pub fn finish(mut self) -> Fixture
    {
        for (at, target) in std::mem::take(&mut self.fixups) {
            let value = self.label(target) as u32;
            self.bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
        }
        Fixture {
            info: self.bytes,
            labels: self.labels,
            abbrev: Vec::new(),
        }
    }
}

pub struct Fixture
{
    pub info: Vec<u8>,
    pub abbrev: Vec<u8>,
    labels: Vec<(&'static str, u64)>,
}

impl Fixture
{
    pub fn at(&self, label: &str) -> u64
    {
        self.labels
            .iter()
            .find(|(name, _)| *name == label)
            .map(|(_, offset)| *offset)
            .unwrap_or_else(|| panic!("no DIE labelled {label}"))
    }

    /// Every DIE offset in the order the DIEs were written, which is depth-first order
    pub fn offsets(&self) -> Vec<u64>
    {
        self.labels.iter().map(|(_, offset)| *offset).collect()
    }

    pub fn sections(&self) -> dwarfnav_core::DwarfSections<'_>
    {
        dwarfnav_core::DwarfSections::new(&self.info, &self.abbrev, gimli::RunTimeEndian::Little)
    }
}

/// A small C-like program:
///
/// ```text
/// compile_unit "main.c"
///   base_type "int"
///   structure_type "Point" { member x: int @0, member y: int @4 }
///   structure_type "Point" { member x: int @0, member y: int @4 }
///   structure_type "Node" { member next: *Node }
///   pointer_type -> Node
///   structure_type "Node" { member next: *Node }   (its own pointer type)
///   pointer_type -> second Node
///   unspecified_type                               (one byte, no children)
///   namespace "ns" { variable counter: int }
///   subprogram "main" { variable local: int }
///   variable "hidden" (DW_VIS_local)
/// compile_unit "util.c"
///   variable "shared"
/// ```
pub fn program() -> Fixture
{
    let abbrev = AbbrevBuilder::default()
        .add(1, gimli::DW_TAG_compile_unit, true, &[(gimli::DW_AT_name, gimli::DW_FORM_string)])
        .add(
            2,
            gimli::DW_TAG_base_type,
            false,
            &[
                (gimli::DW_AT_name, gimli::DW_FORM_string),
                (gimli::DW_AT_byte_size, gimli::DW_FORM_data1),
                (gimli::DW_AT_encoding, gimli::DW_FORM_data1),
            ],
        )
        .add(
            3,
            gimli::DW_TAG_structure_type,
            true,
            &[
                (gimli::DW_AT_name, gimli::DW_FORM_string),
                (gimli::DW_AT_byte_size, gimli::DW_FORM_data1),
            ],
        )
        .add(
            4,
            gimli::DW_TAG_member,
            false,
            &[
                (gimli::DW_AT_name, gimli::DW_FORM_string),
                (gimli::DW_AT_type, gimli::DW_FORM_ref4),
                (gimli::DW_AT_data_member_location, gimli::DW_FORM_data1),
            ],
        )
        .add(
            5,
            gimli::DW_TAG_pointer_type,
            false,
            &[
                (gimli::DW_AT_byte_size, gimli::DW_FORM_data1),
                (gimli::DW_AT_type, gimli::DW_FORM_ref4),
            ],
        )
        .add(6, gimli::DW_TAG_unspecified_type, false, &[])
        .add(7, gimli::DW_TAG_namespace, true, &[(gimli::DW_AT_name, gimli::DW_FORM_string)])
        .add(
            8,
            gimli::DW_TAG_variable,
            false,
            &[
                (gimli::DW_AT_name, gimli::DW_FORM_string),
                (gimli::DW_AT_type, gimli::DW_FORM_ref4),
            ],
        )
        .add(
            9,
            gimli::DW_TAG_subprogram,
            true,
            &[
                (gimli::DW_AT_name, gimli::DW_FORM_string),
                (gimli::DW_AT_external, gimli::DW_FORM_flag_present),
            ],
        )
        .add(
            10,
            gimli::DW_TAG_variable,
            false,
            &[
                (gimli::DW_AT_name, gimli::DW_FORM_string),
                (gimli::DW_AT_visibility, gimli::DW_FORM_data1),
            ],
        )
        .add(11, gimli::DW_TAG_variable, false, &[(gimli::DW_AT_name, gimli::DW_FORM_string)])
        .finish();

    let mut info = InfoBuilder::default();
    info.begin_unit(4, 8);
    info.die("cu", 1).string("main.c");
    info.die("int", 2).string("int").u8(4).u8(gimli::DW_ATE_signed.0);

    info.die("point_a", 3).string("Point").u8(8);
    info.die("point_a.x", 4).string("x").ref4("int").u8(0);
    info.die("point_a.y", 4).string("y").ref4("int").u8(4);
    info.null();
    info.die("point_b", 3).string("Point").u8(8);
    info.die("point_b.x", 4).string("x").ref4("int").u8(0);
    info.die("point_b.y", 4).string("y").ref4("int").u8(4);
    info.null();

    info.die("node_a", 3).string("Node").u8(8);
    info.die("node_a.next", 4).string("next").ref4("node_a_ptr").u8(0);
    info.null();
    info.die("node_a_ptr", 5).u8(8).ref4("node_a");
    info.die("node_b", 3).string("Node").u8(8);
    info.die("node_b.next", 4).string("next").ref4("node_b_ptr").u8(0);
    info.null();
    info.die("node_b_ptr", 5).u8(8).ref4("node_b");

    info.die("unspecified", 6);
    info.die("ns", 7).string("ns");
    info.die("ns.counter", 8).string("counter").ref4("int");
    info.null();
    info.die("main", 9).string("main");
    info.die("main.local", 8).string("local").ref4("int");
    info.null();
    info.die("hidden", 10).string("hidden").u8(gimli::DW_VIS_local.0);
    info.null();
    info.end_unit();

    info.begin_unit(4, 8);
    info.die("cu2", 1).string("util.c");
    info.die("shared", 11).string("shared");
    info.null();
    info.end_unit();

    let mut fixture = info.finish();
    fixture.abbrev = abbrev;
    fixture
}

/// Assembles a 32-bit-format `.debug_frame`
pub struct FrameBuilder
{
    bytes: Vec<u8>,
    address_size: usize,
    big_endian: bool,
}

impl Default for FrameBuilder
{
    fn default() -> Self
    {
        Self::new(8, false)
    }
}

impl FrameBuilder
{
    pub fn new(address_size: usize, big_endian: bool) -> Self
    {
        Self {
            bytes: Vec::new(),
            address_size,
            big_endian,
        }
    }

    /// `value` as `size` bytes in the section's byte order
    fn word(&self, value: u64, size: usize) -> Vec<u8>
    {
        if self.big_endian {
            value.to_be_bytes()[8 - size..].to_vec()
        } else {
            value.to_le_bytes()[..size].to_vec()
        }
    }

    /// Append a version 1 CIE and return its offset
    pub fn cie(&mut self, code_align: u64, data_align: i64, return_address: u8, instructions: &[u8]) -> u64
    {
        let offset = self.bytes.len() as u64;
        let mut body = self.word(0xffff_ffff, 4);
        body.push(1);
        body.push(0);
        uleb(code_align, &mut body);
        sleb(data_align, &mut body);
        body.push(return_address);
        body.extend_from_slice(instructions);
        self.record(body);
        offset
    }

    /// Append an FDE and return its offset
    pub fn fde(&mut self, cie: u64, initial_location: u64, range: u64, instructions: &[u8]) -> u64
    {
        let offset = self.bytes.len() as u64;
        let mut body = self.word(cie, 4);
        body.extend(self.word(initial_location, self.address_size));
        body.extend(self.word(range, self.address_size));
        body.extend_from_slice(instructions);
        self.record(body);
        offset
    }

    fn record(&mut self, mut body: Vec<u8>)
    {
        // pad with DW_CFA_nop to a multiple of four
        while (body.len() + 4) % 4 != 0 {
            body.push(0);
        }
        let length = self.word(body.len() as u64, 4);
        self.bytes.extend(length);
        self.bytes.extend_from_slice(&body);
    }

    pub fn finish(self) -> Vec<u8>
    {
        self.bytes
    }
}
