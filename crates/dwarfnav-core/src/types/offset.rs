//! DIE offset type.

use std::fmt;

/// Offset of a DIE in `.debug_info`
///
/// A DIE's identity is its byte offset. Offset 0 never names a real DIE (it is
/// where the first unit header starts), so it is reserved for the virtual root
/// that parents every compilation unit.
///
/// Synthetic DIEs created by [`DieGraph::make_new`](crate::graph::DieGraph::make_new)
/// receive offsets issued by the graph that keep depth-first order increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DieOffset(pub u64);

impl DieOffset
{
    /// The virtual root's offset
    pub const ROOT: Self = DieOffset(0);

    /// Whether this is the virtual root
    pub const fn is_root(self) -> bool
    {
        self.0 == 0
    }

    pub const fn value(self) -> u64
    {
        self.0
    }
}

impl From<u64> for DieOffset
{
    fn from(value: u64) -> Self
    {
        DieOffset(value)
    }
}

impl fmt::Display for DieOffset
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "<0x{:08x}>", self.0)
    }
}
