//! Name lookup and attribute see-through.

use std::collections::HashSet;

use gimli::DwAt;

use super::{Cursor, DieGraph};
use crate::attr::AttributeValue;
use crate::error::DwarfResult;
use crate::types::DieOffset;

/// Attributes that link a concrete or out-of-line DIE to the DIE holding the rest of its description
const SEE_THROUGH: [DwAt; 2] = [gimli::DW_AT_abstract_origin, gimli::DW_AT_specification];

impl DieGraph<'_>
{
    /// Immediate child of `parent` whose `DW_AT_name` is `name`
    pub fn find_named_child(&self, parent: &Cursor, name: &str) -> DwarfResult<Option<Cursor>>
    {
        for child in self.children(parent) {
            let child = child?;
            if self.attr(&child, gimli::DW_AT_name)?.as_str() == Some(name) {
                return Ok(Some(child));
            }
        }
        Ok(None)
    }

    /// Resolve a qualified name such as `["ns", "Type", "member"]`.
    ///
    /// The path is first looked up from `start`; if that fails it is retried
    /// from each enclosing scope outward, up to the root.
    pub fn resolve_path(&self, start: &Cursor, path: &[&str]) -> DwarfResult<Option<Cursor>>
    {
        if path.is_empty() {
            return Ok(Some(start.clone()));
        }
        let mut scope = start.clone();
        loop {
            if let Some(found) = self.walk_path(&scope, path)? {
                return Ok(Some(found));
            }
            match self.parent(&scope)? {
                Some(parent) => scope = parent,
                None => return Ok(None),
            }
        }
    }

    fn walk_path(&self, scope: &Cursor, path: &[&str]) -> DwarfResult<Option<Cursor>>
    {
        // names at the root live one level down, in the units
        if scope.is_root() {
            for unit in self.children(scope) {
                if let Some(found) = self.walk_path(&unit?, path)? {
                    return Ok(Some(found));
                }
            }
            return Ok(None);
        }
        let mut current = scope.clone();
        for name in path {
            match self.find_named_child(&current, name)? {
                Some(child) => current = child,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    /// First unit-level DIE named `name` that is visible outside its unit
    pub fn find_visible_grandchild_named(&self, name: &str) -> DwarfResult<Option<Cursor>>
    {
        Ok(self.visible_grandchildren(name, true)?.into_iter().next())
    }

    /// Every unit-level DIE named `name` that is visible outside its unit
    pub fn find_all_visible_grandchildren_named(&self, name: &str) -> DwarfResult<Vec<Cursor>>
    {
        self.visible_grandchildren(name, false)
    }

    fn visible_grandchildren(&self, name: &str, first_only: bool) -> DwarfResult<Vec<Cursor>>
    {
        let mut found = Vec::new();
        for unit in self.children(&Cursor::Root) {
            let unit = unit?;
            for child in self.children(&unit) {
                let child = child?;
                let Some(die) = self.die(&child)? else { continue };
                if die.name() != Some(name) {
                    continue;
                }
                let local = die.attr(gimli::DW_AT_visibility).as_unsigned() == Some(u64::from(gimli::DW_VIS_local.0));
                if local {
                    continue;
                }
                found.push(child);
                if first_only {
                    return Ok(found);
                }
            }
        }
        Ok(found)
    }

    /// Attribute `name`, looking through `DW_AT_abstract_origin` and
    /// `DW_AT_specification` when `cursor` lacks it.
    pub fn find_attr(&self, cursor: &Cursor, name: DwAt) -> DwarfResult<AttributeValue>
    {
        let mut visited = HashSet::new();
        let mut current = cursor.clone();
        loop {
            let Some(die) = self.die(&current)? else {
                return Ok(AttributeValue::NotPresent);
            };
            if die.has_attr(name) {
                return Ok(die.attr(name).clone());
            }
            if !visited.insert(die.offset) {
                return Ok(AttributeValue::NotPresent);
            }
            let origin = SEE_THROUGH.iter().find_map(|at| die.attr(*at).as_reference());
            match origin {
                Some(target) => current = self.find(target)?,
                None => return Ok(AttributeValue::NotPresent),
            }
        }
    }

    /// All attributes of `cursor` merged with those of its abstract origin
    /// and specification chain; the nearest DIE wins.
    pub fn find_all_attrs(&self, cursor: &Cursor) -> DwarfResult<Vec<(DwAt, AttributeValue)>>
    {
        let mut merged: Vec<(DwAt, AttributeValue)> = Vec::new();
        let mut visited = HashSet::new();
        let mut pending = vec![cursor.clone()];
        while let Some(current) = pending.pop() {
            let Some(die) = self.die(&current)? else { continue };
            if !visited.insert(die.offset) {
                continue;
            }
            for (at, value) in &die.attrs {
                if !merged.iter().any(|(seen, _)| seen == at) {
                    merged.push((*at, value.clone()));
                }
            }
            for at in SEE_THROUGH.iter().rev() {
                if let Some(target) = die.attr(*at).as_reference() {
                    pending.push(self.find(target)?);
                }
            }
        }
        Ok(merged)
    }

    /// Every DIE reference held by `cursor`'s own attributes
    pub fn references_from(&self, cursor: &Cursor) -> DwarfResult<Vec<(DwAt, DieOffset)>>
    {
        Ok(self
            .attrs(cursor)?
            .into_iter()
            .filter_map(|(at, value)| value.as_reference().map(|target| (at, target)))
            .collect())
    }
}
