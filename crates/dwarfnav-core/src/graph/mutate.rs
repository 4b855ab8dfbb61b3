//! Synthetic DIEs.

use std::rc::Rc;

use gimli::{DwAt, DwTag};
use tracing::debug;

use super::{Cursor, DieGraph};
use crate::attr::AttributeValue;
use crate::die::Die;
use crate::error::{DwarfError, DwarfResult};
use crate::types::DieOffset;

impl DieGraph<'_>
{
    /// Append a new, attribute-less DIE as the last child of `parent`.
    ///
    /// The new offset is one past the highest offset in `parent`'s subtree,
    /// which keeps offsets increasing in depth-first order. The new DIE is
    /// always sticky.
    ///
    /// ## Errors
    ///
    /// - `NoRoom` when the next DIE after `parent`'s subtree starts right
    ///   after its highest offset
    /// - `Unsupported` for the end cursor
    /// - malformed input met while walking the subtree
    pub fn make_new(&self, parent: &Cursor, tag: DwTag) -> DwarfResult<Cursor>
    {
        if parent.is_end() {
            return Err(DwarfError::Unsupported("make_new under the end cursor".into()));
        }
        let parent_offset = parent.offset().value();

        let last_child = self.last_child(parent)?;
        let mut highest = last_child.clone().unwrap_or_else(|| parent.clone());
        while let Some(child) = self.last_child(&highest)? {
            highest = child;
        }
        let highest = highest.offset().value();

        if let Some(next) = self.next_in_dfs_after_subtree(parent)? {
            if next.offset().value() - highest <= 1 {
                return Err(DwarfError::NoRoom { parent: parent_offset });
            }
        }

        let offset = highest + 1;
        let depth = parent.depth() + 1;
        match &last_child {
            Some(last) => {
                self.next_sibling_of.borrow_mut().insert(last.offset().value(), Some(offset));
            }
            None => {
                self.first_child_of.borrow_mut().insert(parent_offset, Some(offset));
            }
        }
        self.first_child_of.borrow_mut().insert(offset, None);
        self.next_sibling_of.borrow_mut().insert(offset, None);
        self.record_parent(offset, parent_offset, depth);

        let die = Rc::new(Die::synthetic(DieOffset(offset), tag, depth));
        let mut sticky = self.sticky.borrow_mut();
        if let Some(parent_die) = sticky.get_mut(&parent_offset) {
            if parent_die.synthetic && !parent_die.has_children {
                Rc::make_mut(parent_die).has_children = true;
            }
        }
        sticky.insert(offset, Rc::clone(&die));
        debug!(parent = parent_offset, offset, tag = %tag, "issued synthetic DIE");
        Ok(Cursor::Resolved(die))
    }

    /// Set an attribute on a synthetic DIE.
    ///
    /// Resolved cursors taken earlier keep the previous payload; the graph
    /// serves the new one from then on.
    ///
    /// ## Errors
    ///
    /// `NotSynthetic` for DIEs decoded from `.debug_info` and for the root.
    pub fn set_attr(&self, cursor: &Cursor, name: DwAt, value: AttributeValue) -> DwarfResult<()>
    {
        let offset = cursor.offset().value();
        let mut sticky = self.sticky.borrow_mut();
        match sticky.get_mut(&offset) {
            Some(die) if die.synthetic => {
                Rc::make_mut(die).set_attr(name, value);
                Ok(())
            }
            _ => Err(DwarfError::NotSynthetic { offset }),
        }
    }

    /// The graph's synthetic compilation unit, created on first call.
    ///
    /// ## Errors
    ///
    /// As for [`make_new`](Self::make_new).
    pub fn get_or_create_synthetic_cu(&self) -> DwarfResult<Cursor>
    {
        if let Some(offset) = self.synthetic_cu.get() {
            return Ok(self.cursor_at(offset, 1));
        }
        let cu = self.make_new(&Cursor::Root, gimli::DW_TAG_compile_unit)?;
        self.synthetic_cu.set(Some(cu.offset().value()));
        Ok(cu)
    }

    fn last_child(&self, parent: &Cursor) -> DwarfResult<Option<Cursor>>
    {
        let mut last = None;
        for child in self.children(parent) {
            last = Some(child?);
        }
        Ok(last)
    }

    /// First DIE after `cursor`'s subtree in depth-first order
    fn next_in_dfs_after_subtree(&self, cursor: &Cursor) -> DwarfResult<Option<Cursor>>
    {
        let mut node = cursor.clone();
        loop {
            if let Some(sibling) = self.next_sibling(&node)? {
                return Ok(Some(sibling));
            }
            match self.parent(&node)? {
                Some(parent) => node = parent,
                None => return Ok(None),
            }
        }
    }
}
