//! Indented subtree dumps.

use std::io::Write;

use super::{Cursor, DieGraph};
use crate::error::DwarfResult;

impl DieGraph<'_>
{
    /// Write the subtree rooted at `start` to `out`, one DIE per line
    /// followed by its attributes, indented by depth.
    ///
    /// ## Errors
    ///
    /// Navigation errors, or `Io` if writing fails.
    pub fn print_tree(&self, start: &Cursor, out: &mut dyn Write) -> DwarfResult<()>
    {
        let base = start.depth();
        for cursor in self.dfs(start) {
            let cursor = cursor?;
            let indent = "  ".repeat(cursor.depth().saturating_sub(base));
            let Some(die) = self.die(&cursor)? else {
                writeln!(out, "{indent}{cursor}")?;
                continue;
            };
            let marker = if die.synthetic { " (synthetic)" } else { "" };
            writeln!(out, "{indent}{die}{marker}")?;
            for (at, value) in &die.attrs {
                match at.static_string() {
                    Some(name) => writeln!(out, "{indent}    {name}: {value}")?,
                    None => writeln!(out, "{indent}    DW_AT_0x{:04x}: {value}", at.0)?,
                }
            }
        }
        Ok(())
    }
}
