//! # Section Table
//!
//! The byte ranges this crate reads. Locating and mapping them is the job of
//! an object-file loader outside this crate; here they are plain borrowed
//! slices. Missing sections are empty slices, and any attribute that needs
//! one decodes as "unrecognized" instead of failing its DIE.

use gimli::RunTimeEndian;

/// Borrowed DWARF sections plus the target byte order.
#[derive(Debug, Clone, Copy)]
pub struct DwarfSections<'a>
{
    pub endian: RunTimeEndian,
    pub debug_info: &'a [u8],
    pub debug_abbrev: &'a [u8],
    pub debug_str: &'a [u8],
    pub debug_line_str: &'a [u8],
    pub debug_str_offsets: &'a [u8],
    pub debug_addr: &'a [u8],
    pub debug_loc: &'a [u8],
    pub debug_loclists: &'a [u8],
    pub debug_ranges: &'a [u8],
    pub debug_rnglists: &'a [u8],
}

impl<'a> DwarfSections<'a>
{
    /// Sections with only `.debug_info` and `.debug_abbrev` populated
    pub const fn new(debug_info: &'a [u8], debug_abbrev: &'a [u8], endian: RunTimeEndian) -> Self
    {
        Self {
            endian,
            debug_info,
            debug_abbrev,
            debug_str: &[],
            debug_line_str: &[],
            debug_str_offsets: &[],
            debug_addr: &[],
            debug_loc: &[],
            debug_loclists: &[],
            debug_ranges: &[],
            debug_rnglists: &[],
        }
    }

    #[must_use]
    pub const fn with_debug_str(mut self, debug_str: &'a [u8]) -> Self
    {
        self.debug_str = debug_str;
        self
    }

    #[must_use]
    pub const fn with_debug_loc(mut self, debug_loc: &'a [u8]) -> Self
    {
        self.debug_loc = debug_loc;
        self
    }

    #[must_use]
    pub const fn with_debug_ranges(mut self, debug_ranges: &'a [u8]) -> Self
    {
        self.debug_ranges = debug_ranges;
        self
    }

    /// Resolve a section by its conventional name (`.debug_str`, ...).
    ///
    /// Used by loaders that fill the table generically.
    pub fn slot_mut(&mut self, name: &str) -> Option<&mut &'a [u8]>
    {
        Some(match name {
            ".debug_info" => &mut self.debug_info,
            ".debug_abbrev" => &mut self.debug_abbrev,
            ".debug_str" => &mut self.debug_str,
            ".debug_line_str" => &mut self.debug_line_str,
            ".debug_str_offsets" => &mut self.debug_str_offsets,
            ".debug_addr" => &mut self.debug_addr,
            ".debug_loc" => &mut self.debug_loc,
            ".debug_loclists" => &mut self.debug_loclists,
            ".debug_ranges" => &mut self.debug_ranges,
            ".debug_rnglists" => &mut self.debug_rnglists,
            _ => return None,
        })
    }

    /// Names accepted by [`slot_mut`](Self::slot_mut)
    pub const NAMES: &'static [&'static str] = &[
        ".debug_info",
        ".debug_abbrev",
        ".debug_str",
        ".debug_line_str",
        ".debug_str_offsets",
        ".debug_addr",
        ".debug_loc",
        ".debug_loclists",
        ".debug_ranges",
        ".debug_rnglists",
    ];
}
