//! Front-end errors.

use std::path::PathBuf;

use dwarfnav_core::DwarfError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError
{
    #[error("cannot read {}: {source}", path.display())]
    Read
    {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse {} as an object file: {source}", path.display())]
    Object
    {
        path: PathBuf,
        source: object::Error,
    },

    #[error("cannot read section {name}: {source}")]
    Section
    {
        name: String,
        source: object::Error,
    },

    #[error("the object file has no {0} section")]
    MissingSection(&'static str),

    #[error("invalid address '{0}': expected hex (0x401000) or decimal")]
    InvalidAddress(String),

    #[error(transparent)]
    Dwarf(#[from] DwarfError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type CliResult<T> = std::result::Result<T, CliError>;
