//! Sticky-cache policies.
//!
//! A policy decides which decoded DIEs the graph keeps. DIEs it rejects are
//! decoded again on every resolution; results are identical either way.

use std::fmt;

use crate::die::Die;

/// Decides which DIEs stay in the graph's cache once decoded.
pub trait StickyPolicy
{
    fn is_sticky(&self, die: &Die) -> bool;

    /// Short name for diagnostics
    fn name(&self) -> &'static str;
}

/// Keep unit DIEs only (the default).
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileUnitsOnly;

impl StickyPolicy for CompileUnitsOnly
{
    fn is_sticky(&self, die: &Die) -> bool
    {
        die.depth == 1
    }

    fn name(&self) -> &'static str
    {
        "compile-units-only"
    }
}

/// Keep every DIE that is resolved.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllDies;

impl StickyPolicy for AllDies
{
    fn is_sticky(&self, _die: &Die) -> bool
    {
        true
    }

    fn name(&self) -> &'static str
    {
        "all-dies"
    }
}

/// Keep nothing; every resolution decodes.
///
/// Synthetic DIEs are kept regardless, since they cannot be decoded again.
#[derive(Debug, Clone, Copy, Default)]
pub struct NothingSticky;

impl StickyPolicy for NothingSticky
{
    fn is_sticky(&self, _die: &Die) -> bool
    {
        false
    }

    fn name(&self) -> &'static str
    {
        "nothing-sticky"
    }
}

/// Options for [`DieGraph`](super::DieGraph).
pub struct GraphOptions
{
    pub policy: Box<dyn StickyPolicy>,
}

impl GraphOptions
{
    #[must_use]
    pub fn with_policy(mut self, policy: impl StickyPolicy + 'static) -> Self
    {
        self.policy = Box::new(policy);
        self
    }
}

impl Default for GraphOptions
{
    fn default() -> Self
    {
        Self {
            policy: Box::new(CompileUnitsOnly),
        }
    }
}

impl fmt::Debug for GraphOptions
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("GraphOptions").field("policy", &self.policy.name()).finish()
    }
}
