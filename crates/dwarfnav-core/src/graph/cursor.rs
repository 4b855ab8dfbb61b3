//! Graph positions.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::die::Die;
use crate::types::DieOffset;

/// A position in a [`DieGraph`](super::DieGraph).
///
/// An unresolved cursor is just an offset and a depth. A resolved cursor
/// shares the decoded payload with the graph's cache. Equality and hashing
/// look at the position only, so an unresolved and a resolved cursor at the
/// same offset compare equal.
#[derive(Clone)]
pub enum Cursor
{
    /// The virtual root; its children are the unit DIEs
    Root,
    /// Past the end of an axis
    End,
    Unresolved
    {
        offset: DieOffset,
        depth: usize,
    },
    Resolved(Rc<Die>),
}

impl Cursor
{
    /// Offset of the position; [`DieOffset::ROOT`] for the root and `u64::MAX` for `End`
    pub fn offset(&self) -> DieOffset
    {
        match self {
            Cursor::Root => DieOffset::ROOT,
            Cursor::End => DieOffset(u64::MAX),
            Cursor::Unresolved { offset, .. } => *offset,
            Cursor::Resolved(die) => die.offset,
        }
    }

    /// Distance from the root; unit DIEs are at depth 1
    pub fn depth(&self) -> usize
    {
        match self {
            Cursor::Root | Cursor::End => 0,
            Cursor::Unresolved { depth, .. } => *depth,
            Cursor::Resolved(die) => die.depth,
        }
    }

    pub const fn is_root(&self) -> bool
    {
        matches!(self, Cursor::Root)
    }

    pub const fn is_end(&self) -> bool
    {
        matches!(self, Cursor::End)
    }

    pub const fn is_resolved(&self) -> bool
    {
        matches!(self, Cursor::Resolved(_))
    }

    /// The payload, if this cursor is resolved
    pub fn die(&self) -> Option<&Rc<Die>>
    {
        match self {
            Cursor::Resolved(die) => Some(die),
            _ => None,
        }
    }

    fn kind(&self) -> u8
    {
        match self {
            Cursor::Root => 0,
            Cursor::End => 1,
            Cursor::Unresolved { .. } | Cursor::Resolved(_) => 2,
        }
    }
}

impl PartialEq for Cursor
{
    fn eq(&self, other: &Self) -> bool
    {
        self.kind() == other.kind() && self.offset() == other.offset()
    }
}

impl Eq for Cursor {}

impl Hash for Cursor
{
    fn hash<H: Hasher>(&self, state: &mut H)
    {
        self.kind().hash(state);
        self.offset().hash(state);
    }
}

impl fmt::Debug for Cursor
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Cursor::Root => write!(f, "Root"),
            Cursor::End => write!(f, "End"),
            Cursor::Unresolved { offset, depth } => write!(f, "Unresolved({offset}, depth {depth})"),
            Cursor::Resolved(die) => write!(f, "Resolved({die}, depth {})", die.depth),
        }
    }
}

impl fmt::Display for Cursor
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Cursor::Root => write!(f, "<root>"),
            Cursor::End => write!(f, "<end>"),
            other => write!(f, "{}", other.offset()),
        }
    }
}
