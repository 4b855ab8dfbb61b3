//! Loading DWARF and frame sections out of an object file.

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use dwarfnav_core::cfi::{CfiBases, CfiConfig};
use dwarfnav_core::sections::DwarfSections;
use gimli::RunTimeEndian;
use object::{Architecture, Object, ObjectSection};
use tracing::debug;

use crate::error::{CliError, CliResult};

/// Section names to try for each DWARF section, ELF spelling first
const SECTION_NAMES: &[(&str, &[&str])] = &[
    (".debug_info", &[".debug_info", "__debug_info"]),
    (".debug_abbrev", &[".debug_abbrev", "__debug_abbrev"]),
    (".debug_str", &[".debug_str", "__debug_str"]),
    (".debug_line_str", &[".debug_line_str", "__debug_line_str"]),
    (".debug_str_offsets", &[".debug_str_offsets", "__debug_str_offs"]),
    (".debug_addr", &[".debug_addr", "__debug_addr"]),
    (".debug_loc", &[".debug_loc", "__debug_loc"]),
    (".debug_loclists", &[".debug_loclists", "__debug_loclists"]),
    (".debug_ranges", &[".debug_ranges", "__debug_ranges"]),
    (".debug_rnglists", &[".debug_rnglists", "__debug_rnglists"]),
];

/// A section's bytes and the address it loads at
#[derive(Debug, Clone)]
pub struct SectionBlob
{
    pub data: Vec<u8>,
    pub address: u64,
}

/// Everything the subcommands read from one object file
#[derive(Debug)]
pub struct BinaryImage
{
    path: PathBuf,
    endian: RunTimeEndian,
    address_size: u8,
    architecture: Architecture,
    debug_sections: HashMap<&'static str, Vec<u8>>,
    debug_frame: Option<SectionBlob>,
    eh_frame: Option<SectionBlob>,
    text_address: Option<u64>,
    got_address: Option<u64>,
}

impl BinaryImage
{
    /// Read and parse `path`, copying out the sections we need.
    pub fn load(path: &Path) -> CliResult<Self>
    {
        let bytes = std::fs::read(path).map_err(|source| CliError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file = object::File::parse(&*bytes).map_err(|source| CliError::Object {
            path: path.to_path_buf(),
            source,
        })?;

        let endian = if file.is_little_endian() {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };
        let address_size = if file.is_64() { 8 } else { 4 };

        let mut debug_sections = HashMap::new();
        for (key, names) in SECTION_NAMES {
            if let Some(blob) = load_section_blob(&file, names)? {
                debug_sections.insert(*key, blob.data);
            }
        }
        let debug_frame = load_section_blob(&file, &[".debug_frame", "__debug_frame"])?;
        let eh_frame = load_section_blob(&file, &[".eh_frame", "__eh_frame"])?;
        let section_address = |names: [&str; 2]| {
            names
                .iter()
                .find_map(|name| file.section_by_name(name))
                .map(|section| section.address())
        };
        let text_address = section_address([".text", "__text"]);
        let got_address = section_address([".got", "__got"]);

        debug!(
            path = %path.display(),
            sections = debug_sections.len(),
            debug_frame = debug_frame.is_some(),
            eh_frame = eh_frame.is_some(),
            "loaded object file"
        );
        Ok(Self {
            path: path.to_path_buf(),
            endian,
            address_size,
            architecture: file.architecture(),
            debug_sections,
            debug_frame,
            eh_frame,
            text_address,
            got_address,
        })
    }

    pub fn path(&self) -> &Path
    {
        &self.path
    }

    pub const fn address_size(&self) -> u8
    {
        self.address_size
    }

    pub const fn architecture(&self) -> Architecture
    {
        self.architecture
    }

    /// The DWARF sections, borrowed from this image
    pub fn dwarf_sections(&self) -> DwarfSections<'_>
    {
        let mut sections = DwarfSections::new(&[], &[], self.endian);
        for (name, data) in &self.debug_sections {
            if let Some(slot) = sections.slot_mut(name) {
                *slot = data.as_slice();
            }
        }
        sections
    }

    /// Frame section bytes and a matching configuration.
    ///
    /// `.eh_frame` gets its own load address as the pc-relative base, plus the
    /// text and GOT addresses for `textrel` and `datarel` pointers.
    pub fn frame_section(&self, eh: bool) -> CliResult<(&[u8], CfiConfig)>
    {
        if eh {
            let blob = self.eh_frame.as_ref().ok_or(CliError::MissingSection(".eh_frame"))?;
            let mut bases = CfiBases::default().with_section(blob.address);
            if let Some(text) = self.text_address {
                bases = bases.with_text(text);
            }
            if let Some(got) = self.got_address {
                bases = bases.with_data(got);
            }
            Ok((
                &blob.data,
                CfiConfig::eh_frame(self.address_size, self.endian).with_bases(bases),
            ))
        } else {
            let blob = self.debug_frame.as_ref().ok_or(CliError::MissingSection(".debug_frame"))?;
            Ok((&blob.data, CfiConfig::debug_frame(self.address_size, self.endian)))
        }
    }
}

fn load_section_blob<'data>(file: &object::File<'data>, names: &[&str]) -> CliResult<Option<SectionBlob>>
{
    for name in names {
        if let Some(section) = file.section_by_name(name) {
            let address = section.address();
            let data = section.uncompressed_data().map_err(|source| CliError::Section {
                name: (*name).to_string(),
                source,
            })?;
            let data = match data {
                Cow::Borrowed(bytes) => bytes.to_vec(),
                Cow::Owned(vec) => vec,
            };
            return Ok(Some(SectionBlob { data, address }));
        }
    }
    Ok(None)
}
