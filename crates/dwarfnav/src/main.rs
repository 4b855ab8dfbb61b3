mod error;
mod image;
mod registers;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use dwarfnav_core::cfi::CfiDecoder;
use dwarfnav_core::graph::{Cursor, DieGraph};
use dwarfnav_core::types::{Address, DieOffset};
use dwarfnav_utils::logging::dated_log_file;
use dwarfnav_utils::{info, init_logging_with, warn, LogConfig, LogFormat, LogLevel};

use crate::error::{CliError, CliResult};
use crate::image::BinaryImage;

/// Browse the DWARF debugging information of a compiled binary.
#[derive(Parser, Debug)]
#[command(name = "dwarfnav")]
#[command(version)]
#[command(about = "Browse DWARF debugging information and call-frame tables", long_about = None)]
struct Cli
{
    /// Log level (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,
    /// Log output format
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
    /// Also write logs to a date-stamped file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// List the unit headers in .debug_info
    Units
    {
        /// Object file to read
        file: PathBuf,
    },
    /// Print DIEs with their attributes, indented by depth
    Tree
    {
        file: PathBuf,
        /// Start from the DIE at this .debug_info offset instead of the root
        #[arg(long)]
        offset: Option<String>,
        /// Visit breadth-first instead of depth-first
        #[arg(long, default_value_t = false)]
        bfs: bool,
    },
    /// Find unit-level DIEs visible outside their unit by name
    Lookup
    {
        file: PathBuf,
        name: String,
    },
    /// Show the unwind row in force at a program counter
    Unwind
    {
        file: PathBuf,
        /// Program counter (hex format: 0x401000 or decimal)
        pc: String,
        /// Read .eh_frame instead of .debug_frame
        #[arg(long, default_value_t = false)]
        eh: bool,
    },
}

fn main()
{
    let cli = Cli::parse();

    let mut config = match LogConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };
    if let Some(level) = cli.log_level {
        config = config.with_level(level);
    }
    if let Some(format) = cli.log_format {
        config.format = format;
    }
    if let Some(dir) = &cli.log_dir {
        config = config.with_file(dated_log_file(dir));
    }
    let _guard = match init_logging_with(config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = run_command(cli.command) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(command: Commands) -> CliResult<()>
{
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match command {
        Commands::Units { file } => units(&file, &mut out),
        Commands::Tree { file, offset, bfs } => {
            let offset = offset.as_deref().map(parse_number).transpose()?;
            tree(&file, offset, bfs, &mut out)
        }
        Commands::Lookup { file, name } => lookup(&file, &name, &mut out),
        Commands::Unwind { file, pc, eh } => unwind(&file, parse_number(&pc)?, eh, &mut out),
    }
}

fn open(file: &Path) -> CliResult<BinaryImage>
{
    info!("Loading {}", file.display());
    BinaryImage::load(file)
}

fn units(file: &Path, out: &mut dyn Write) -> CliResult<()>
{
    let image = open(file)?;
    let graph = DieGraph::new(image.dwarf_sections());
    writeln!(out, "{}: {}-byte addresses", image.path().display(), image.address_size())?;
    for header in graph.units()?.iter() {
        write!(
            out,
            "0x{:08x}: version {} {} length 0x{:x} abbrev 0x{:x} address size {}",
            header.offset,
            header.version,
            header.unit_type,
            header.unit_length,
            header.abbrev_offset,
            header.address_size,
        )?;
        // a unit DIE that fails to decode is reported and skipped
        match graph.find(DieOffset(header.first_die_offset)).and_then(|unit| graph.name(&unit)) {
            Ok(Some(name)) => writeln!(out, " \"{name}\"")?,
            Ok(None) => writeln!(out)?,
            Err(e) => {
                writeln!(out)?;
                report(header.first_die_offset, &e);
            }
        }
    }
    Ok(())
}

fn tree(file: &Path, offset: Option<u64>, bfs: bool, out: &mut dyn Write) -> CliResult<()>
{
    let image = open(file)?;
    let graph = DieGraph::new(image.dwarf_sections());

    let starts = match offset {
        Some(offset) => vec![graph.find(DieOffset(offset))?],
        None => {
            let mut units = Vec::new();
            for unit in graph.children(&Cursor::Root) {
                match unit {
                    Ok(unit) => units.push(unit),
                    Err(e) => {
                        report(e.offset().unwrap_or_default(), &e);
                        break;
                    }
                }
            }
            units
        }
    };

    for start in &starts {
        let result = if bfs {
            print_bfs(&graph, start, out)
        } else {
            graph.print_tree(start, out).map_err(CliError::from)
        };
        if let Err(e) = result {
            match e {
                CliError::Dwarf(e) => report(start.offset().value(), &e),
                other => return Err(other),
            }
        }
    }
    Ok(())
}

fn print_bfs(graph: &DieGraph<'_>, start: &Cursor, out: &mut dyn Write) -> CliResult<()>
{
    for cursor in graph.bfs(start) {
        let cursor = cursor?;
        match graph.die(&cursor)? {
            Some(die) => writeln!(out, "[depth {}] {die}", die.depth)?,
            None => writeln!(out, "{cursor}")?,
        }
    }
    Ok(())
}

fn lookup(file: &Path, name: &str, out: &mut dyn Write) -> CliResult<()>
{
    let image = open(file)?;
    let graph = DieGraph::new(image.dwarf_sections());
    let found = graph.find_all_visible_grandchildren_named(name)?;
    if found.is_empty() {
        writeln!(out, "no visible DIE named \"{name}\"")?;
        return Ok(());
    }
    for cursor in &found {
        let Some(die) = graph.die(cursor)? else { continue };
        writeln!(out, "{die}")?;
        for (at, value) in graph.find_all_attrs(cursor)? {
            writeln!(out, "    {at}: {value}")?;
        }
    }
    Ok(())
}

fn unwind(file: &Path, pc: u64, eh: bool, out: &mut dyn Write) -> CliResult<()>
{
    let image = open(file)?;
    let (data, config) = image.frame_section(eh)?;
    let decoder = CfiDecoder::new(data, config);
    let pc = Address::new(pc);
    let names = registers::names_for(image.architecture());

    let Some(fde) = decoder.fde_for_pc(pc)? else {
        writeln!(out, "no FDE covers {pc} in {}", config.section.name())?;
        return Ok(());
    };
    writeln!(
        out,
        "FDE 0x{:x} [0x{:x}, 0x{:x}) CIE 0x{:x} \"{}\" code align {} data align {} return address {}",
        fde.offset,
        fde.initial_location,
        fde.end_address(),
        fde.cie.offset,
        fde.cie.augmentation,
        fde.cie.code_alignment_factor,
        fde.cie.data_alignment_factor,
        registers::describe(names, fde.cie.return_address_register),
    )?;
    match decoder.unwind_row(pc)? {
        Some(row) => writeln!(out, "{}", row.display_with(names))?,
        None => writeln!(out, "no row covers {pc}")?,
    }
    Ok(())
}

fn report(offset: u64, error: &dwarfnav_core::DwarfError)
{
    warn!(offset, kind = ?error.kind(), "{error}");
    eprintln!("error at 0x{offset:x}: {error}");
}

fn parse_number(text: &str) -> CliResult<u64>
{
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|_| CliError::InvalidAddress(text.to_string()))
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_parse_number()
    {
        assert_eq!(parse_number("0x401000").unwrap(), 0x40_1000);
        assert_eq!(parse_number("4096").unwrap(), 4096);
        assert!(matches!(parse_number("zz"), Err(CliError::InvalidAddress(_))));
    }

    #[test]
    fn test_cli_parses_unwind()
    {
        let cli = Cli::try_parse_from(["dwarfnav", "unwind", "a.out", "0x1000", "--eh"]).unwrap();
        assert!(matches!(cli.command, Commands::Unwind { eh: true, .. }));
    }
}
