//! # DIE Graph
//!
//! A lazily decoded, cached view of the DIE forest in `.debug_info`.
//!
//! ## Design
//!
//! The graph owns every cache; cursors only name positions. DIEs refer to
//! each other by offset, so there are no ownership cycles: a reference is
//! resolved to a [`Cursor`] on demand.
//!
//! The caches only grow:
//!
//! - the unit-header table, computed once
//! - abbreviation tables, keyed by their `.debug_abbrev` offset
//! - per-unit decoders, which hold the unit's attribute bases
//! - the sticky cache of decoded payloads, filled as the [`StickyPolicy`] allows
//! - three adjacency maps: parent-of, first-child-of and next-sibling-of
//!
//! Parents are never encoded in DWARF, so every navigation step records the
//! parent of whatever it discovers. Any position handed out by the graph
//! therefore has a known parent.
//!
//! ## Mutation
//!
//! [`DieGraph::make_new`] inserts synthetic DIEs whose offsets keep the
//! depth-first order increasing, so the graph could still be written out as
//! a byte stream. Only synthetic DIEs accept [`DieGraph::set_attr`].
//!
//! ## Thread Safety
//!
//! The caches use `RefCell` and the graph is neither `Send` nor `Sync`. Use
//! one graph per thread.
//!
//! ## References
//!
//! - [DWARF 5, section 2.3: Relationship of Debugging Information Entries](https://dwarfstd.org/doc/DWARF5.pdf#page=24)

mod cursor;
mod equality;
mod lookup;
mod mutate;
mod policy;
mod print;
mod traverse;

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use gimli::{DwAt, DwTag};
use once_cell::unsync::OnceCell;
use tracing::{debug, warn};

pub use self::cursor::Cursor;
pub use self::policy::{AllDies, CompileUnitsOnly, GraphOptions, NothingSticky, StickyPolicy};
pub use self::traverse::{Bfs, Children, Dfs};
use crate::abbrev::AbbreviationTable;
use crate::attr::AttributeValue;
use crate::die::{Die, DieDecoder, Entry};
use crate::error::{DwarfError, DwarfResult};
use crate::sections::DwarfSections;
use crate::types::DieOffset;
use crate::unit::{UnitHeader, UnitTable};

/// Lazy, cached DIE tree over borrowed sections.
pub struct DieGraph<'a>
{
    sections: DwarfSections<'a>,
    options: GraphOptions,
    units: OnceCell<UnitTable>,
    abbrevs: RefCell<HashMap<u64, Rc<AbbreviationTable>>>,
    decoders: RefCell<HashMap<usize, Rc<DieDecoder<'a>>>>,
    sticky: RefCell<BTreeMap<u64, Rc<Die>>>,
    parent_of: RefCell<HashMap<u64, u64>>,
    depth_of: RefCell<HashMap<u64, usize>>,
    first_child_of: RefCell<HashMap<u64, Option<u64>>>,
    next_sibling_of: RefCell<HashMap<u64, Option<u64>>>,
    type_equality: RefCell<HashMap<(u64, u64), bool>>,
    synthetic_cu: Cell<Option<u64>>,
}

impl<'a> DieGraph<'a>
{
    /// Open a graph with the default options (only unit DIEs are sticky).
    ///
    /// Nothing is decoded until the first navigation.
    pub fn new(sections: DwarfSections<'a>) -> Self
    {
        Self::with_options(sections, GraphOptions::default())
    }

    pub fn with_options(sections: DwarfSections<'a>, options: GraphOptions) -> Self
    {
        Self {
            sections,
            options,
            units: OnceCell::new(),
            abbrevs: RefCell::default(),
            decoders: RefCell::default(),
            sticky: RefCell::default(),
            parent_of: RefCell::default(),
            depth_of: RefCell::default(),
            first_child_of: RefCell::default(),
            next_sibling_of: RefCell::default(),
            type_equality: RefCell::default(),
            synthetic_cu: Cell::new(None),
        }
    }

    pub const fn sections(&self) -> &DwarfSections<'a>
    {
        &self.sections
    }

    /// The unit-header table, parsed on first use.
    ///
    /// ## Errors
    ///
    /// The first malformed unit header.
    pub fn units(&self) -> DwarfResult<&UnitTable>
    {
        self.units
            .get_or_try_init(|| UnitTable::parse(self.sections.debug_info, self.sections.endian))
    }

    /// Header of the unit containing `offset`
    pub fn unit_of(&self, offset: DieOffset) -> DwarfResult<Option<UnitHeader>>
    {
        Ok(self.units()?.unit_containing(offset.value()).copied())
    }

    fn abbreviations(&self, offset: u64) -> DwarfResult<Rc<AbbreviationTable>>
    {
        if let Some(table) = self.abbrevs.borrow().get(&offset) {
            return Ok(Rc::clone(table));
        }
        let table = Rc::new(AbbreviationTable::parse(self.sections.debug_abbrev, self.sections.endian, offset)?);
        self.abbrevs.borrow_mut().insert(offset, Rc::clone(&table));
        Ok(table)
    }

    fn decoder_for(&self, offset: u64) -> DwarfResult<Rc<DieDecoder<'a>>>
    {
        let units = self.units()?;
        let index = units.index_containing(offset).ok_or(DwarfError::OffsetOutOfRange {
            offset,
            section: ".debug_info",
        })?;
        if let Some(decoder) = self.decoders.borrow().get(&index) {
            return Ok(Rc::clone(decoder));
        }
        let header = units.get(index).copied().ok_or(DwarfError::OffsetOutOfRange {
            offset,
            section: ".debug_info",
        })?;
        let abbrevs = self.abbreviations(header.abbrev_offset)?;
        let decoder = Rc::new(DieDecoder::new(self.sections, header, abbrevs)?);
        debug!(unit = header.offset, version = header.version, "created unit decoder");
        self.decoders.borrow_mut().insert(index, Rc::clone(&decoder));
        Ok(decoder)
    }

    /// Cursor for a known position, resolved when the payload is cached
    fn cursor_at(&self, offset: u64, depth: usize) -> Cursor
    {
        if offset == 0 {
            return Cursor::Root;
        }
        match self.sticky.borrow().get(&offset) {
            Some(die) => Cursor::Resolved(Rc::clone(die)),
            None => Cursor::Unresolved {
                offset: DieOffset(offset),
                depth,
            },
        }
    }

    fn record_parent(&self, child: u64, parent: u64, depth: usize)
    {
        self.parent_of.borrow_mut().insert(child, parent);
        self.depth_of.borrow_mut().insert(child, depth);
    }

    fn depth_of_offset(&self, offset: u64) -> usize
    {
        if offset == 0 {
            0
        } else {
            self.depth_of.borrow().get(&offset).copied().unwrap_or(0)
        }
    }

    /// First child of `cursor`, or `None` when it has none.
    ///
    /// ## Errors
    ///
    /// Malformed input met while decoding the entries involved.
    pub fn first_child(&self, cursor: &Cursor) -> DwarfResult<Option<Cursor>>
    {
        if cursor.is_end() {
            return Ok(None);
        }
        let offset = cursor.offset().value();
        let depth = cursor.depth() + 1;
        if let Some(cached) = self.first_child_of.borrow().get(&offset).copied() {
            return Ok(cached.map(|child| self.cursor_at(child, depth)));
        }

        let child = if cursor.is_root() {
            self.units()?.get(0).map(|unit| unit.first_die_offset)
        } else {
            let decoder = self.decoder_for(offset)?;
            match decoder.entry_at(offset)? {
                Entry::Die {
                    has_children: true,
                    end,
                    ..
                } => match decoder.entry_at(end)? {
                    Entry::Die { .. } => Some(end),
                    Entry::Null { .. } => None,
                },
                _ => None,
            }
        };

        self.first_child_of.borrow_mut().insert(offset, child);
        if let Some(child) = child {
            self.record_parent(child, offset, depth);
        }
        Ok(child.map(|child| self.cursor_at(child, depth)))
    }

    /// Next sibling of `cursor`, or `None` at the end of the chain.
    ///
    /// Unit DIEs are siblings of each other under the root.
    ///
    /// ## Errors
    ///
    /// Malformed input met while skipping the subtree of `cursor`.
    pub fn next_sibling(&self, cursor: &Cursor) -> DwarfResult<Option<Cursor>>
    {
        if cursor.is_root() || cursor.is_end() {
            return Ok(None);
        }
        let offset = cursor.offset().value();
        let depth = cursor.depth();
        if let Some(cached) = self.next_sibling_of.borrow().get(&offset).copied() {
            return Ok(cached.map(|sibling| self.cursor_at(sibling, depth)));
        }

        let units = self.units()?;
        let (sibling, parent) = if let Some(index) = units.index_of_unit_die(offset) {
            (units.get(index + 1).map(|unit| unit.first_die_offset), 0)
        } else {
            let known = self.parent_of.borrow().get(&offset).copied();
            let Some(parent) = known else {
                return self.next_sibling(&self.find(cursor.offset())?);
            };
            let decoder = self.decoder_for(offset)?;
            let end = decoder.skip_subtree(offset)?;
            let sibling = match decoder.entry_at(end)? {
                Entry::Die { .. } => Some(end),
                Entry::Null { .. } => None,
            };
            (sibling, parent)
        };

        self.next_sibling_of.borrow_mut().insert(offset, sibling);
        if let Some(sibling) = sibling {
            self.record_parent(sibling, parent, depth);
        }
        Ok(sibling.map(|sibling| self.cursor_at(sibling, depth)))
    }

    /// Parent of `cursor`; `None` for the root.
    ///
    /// ## Errors
    ///
    /// Malformed input met while locating `cursor` from its unit.
    pub fn parent(&self, cursor: &Cursor) -> DwarfResult<Option<Cursor>>
    {
        if cursor.is_root() || cursor.is_end() {
            return Ok(None);
        }
        let offset = cursor.offset().value();
        let known = self.parent_of.borrow().get(&offset).copied();
        let parent = match known {
            Some(parent) => parent,
            None => {
                self.find(cursor.offset())?;
                self.parent_of.borrow().get(&offset).copied().unwrap_or(0)
            }
        };
        Ok(Some(self.cursor_at(parent, self.depth_of_offset(parent))))
    }

    /// Cursor for the DIE starting at `offset`.
    ///
    /// Known positions are answered from the caches. Otherwise the owning
    /// unit is walked from its unit DIE, descending only into the subtree
    /// that can contain `offset`.
    ///
    /// ## Errors
    ///
    /// - `OffsetOutOfRange` when no unit contains `offset`
    /// - `Malformed` when `offset` lies inside a unit but does not start a DIE
    pub fn find(&self, offset: DieOffset) -> DwarfResult<Cursor>
    {
        let target = offset.value();
        if target == 0 {
            return Ok(Cursor::Root);
        }
        if self.sticky.borrow().contains_key(&target) || self.parent_of.borrow().contains_key(&target) {
            return Ok(self.cursor_at(target, self.depth_of_offset(target)));
        }

        let units = self.units()?;
        let header = units.unit_containing(target).ok_or(DwarfError::OffsetOutOfRange {
            offset: target,
            section: ".debug_info",
        })?;
        self.record_parent(header.first_die_offset, 0, 1);
        let not_a_die = || DwarfError::malformed(target, "offset does not start a DIE");

        let mut current = self.cursor_at(header.first_die_offset, 1);
        while current.offset().value() != target {
            let mut child = self.first_child(&current)?.ok_or_else(not_a_die)?;
            if child.offset().value() > target {
                return Err(not_a_die());
            }
            while let Some(next) = self.next_sibling(&child)? {
                if next.offset().value() > target {
                    break;
                }
                child = next;
            }
            current = child;
        }
        Ok(current)
    }

    /// Resolve `cursor` to its payload, decoding on first touch.
    ///
    /// The payload is kept when the sticky policy (or synthesis) says so.
    /// Root and end cursors are returned unchanged.
    ///
    /// ## Errors
    ///
    /// Storage-level errors decoding the DIE.
    pub fn resolve(&self, cursor: &Cursor) -> DwarfResult<Cursor>
    {
        Ok(match self.die(cursor)? {
            Some(die) => Cursor::Resolved(die),
            None => cursor.clone(),
        })
    }

    /// Payload of `cursor`; `None` for the root and end positions.
    pub fn die(&self, cursor: &Cursor) -> DwarfResult<Option<Rc<Die>>>
    {
        let (offset, depth) = match cursor {
            Cursor::Root | Cursor::End => return Ok(None),
            Cursor::Resolved(die) => {
                // a synthetic payload may have been replaced by set_attr
                if let Some(current) = self.sticky.borrow().get(&die.offset.value()) {
                    return Ok(Some(Rc::clone(current)));
                }
                return Ok(Some(Rc::clone(die)));
            }
            Cursor::Unresolved { offset, depth } => (offset.value(), *depth),
        };
        if let Some(die) = self.sticky.borrow().get(&offset) {
            return Ok(Some(Rc::clone(die)));
        }

        let decoder = self.decoder_for(offset)?;
        let depth = if depth == 0 { self.depth_of_offset(offset) } else { depth };
        let die = Rc::new(decoder.decode(offset, depth)?);
        if self.options.policy.is_sticky(&die) {
            self.sticky.borrow_mut().insert(offset, Rc::clone(&die));
            debug!(offset, tag = %die.tag, "cached DIE");
        }
        Ok(Some(die))
    }

    /// Tag of `cursor`; `None` for the root
    pub fn tag(&self, cursor: &Cursor) -> DwarfResult<Option<DwTag>>
    {
        Ok(self.die(cursor)?.map(|die| die.tag))
    }

    /// Value of attribute `name` on `cursor`.
    ///
    /// Returns [`AttributeValue::NotPresent`] when the DIE lacks it, and for
    /// the root.
    pub fn attr(&self, cursor: &Cursor, name: DwAt) -> DwarfResult<AttributeValue>
    {
        Ok(self
            .die(cursor)?
            .map_or(AttributeValue::NotPresent, |die| die.attr(name).clone()))
    }

    /// All attributes of `cursor` in abbreviation order
    pub fn attrs(&self, cursor: &Cursor) -> DwarfResult<Vec<(DwAt, AttributeValue)>>
    {
        Ok(self.die(cursor)?.map(|die| die.attrs.clone()).unwrap_or_default())
    }

    /// `DW_AT_name` of `cursor`
    pub fn name(&self, cursor: &Cursor) -> DwarfResult<Option<String>>
    {
        Ok(self.die(cursor)?.and_then(|die| die.name().map(str::to_owned)))
    }

    /// Follow the reference held in attribute `name`.
    ///
    /// Unit-relative and section-relative references resolve through
    /// [`find`](Self::find); type signatures resolve to the type DIE of the
    /// matching type unit. A `DW_FORM_ref_addr` that lands in a unit of
    /// another DWARF version is followed but flagged with a warning.
    ///
    /// Returns `None` when the attribute is absent or not a reference.
    pub fn follow(&self, cursor: &Cursor, name: DwAt) -> DwarfResult<Option<Cursor>>
    {
        match self.attr(cursor, name)? {
            AttributeValue::Reference { offset, cross_unit } => {
                if cross_unit {
                    let from = self.unit_of(cursor.offset())?;
                    let to = self.unit_of(offset)?;
                    if let (Some(from), Some(to)) = (from, to) {
                        if from.version != to.version {
                            warn!(
                                from = %cursor.offset(),
                                to = %offset,
                                from_version = from.version,
                                to_version = to.version,
                                "cross-version DIE reference"
                            );
                        }
                    }
                }
                self.find(offset).map(Some)
            }
            AttributeValue::TypeSignature(signature) => self.find_type_unit(signature),
            _ => Ok(None),
        }
    }

    /// The type DIE of the type unit with `signature`
    pub fn find_type_unit(&self, signature: u64) -> DwarfResult<Option<Cursor>>
    {
        let unit = self
            .units()?
            .iter()
            .find(|unit| unit.type_offset.is_some() && unit.signature == Some(signature))
            .copied();
        match unit {
            Some(unit) => {
                let type_offset = unit.type_offset.unwrap_or_default();
                let offset = unit.offset.checked_add(type_offset).ok_or(DwarfError::OffsetOutOfRange {
                    offset: type_offset,
                    section: ".debug_info",
                })?;
                self.find(DieOffset(offset)).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Whether `descendant` is `ancestor` or lies in its subtree
    pub fn is_under(&self, descendant: &Cursor, ancestor: &Cursor) -> DwarfResult<bool>
    {
        if ancestor.is_root() {
            return Ok(!descendant.is_end());
        }
        let target_depth = ancestor.depth();
        let mut current = descendant.clone();
        while current.depth() > target_depth {
            match self.parent(&current)? {
                Some(parent) => current = parent,
                None => return Ok(false),
            }
        }
        Ok(current == *ancestor)
    }

    /// Whether the payload at `offset` is held in the sticky cache
    pub fn is_cached(&self, offset: DieOffset) -> bool
    {
        self.sticky.borrow().contains_key(&offset.value())
    }

    /// Number of payloads held in the sticky cache
    pub fn sticky_count(&self) -> usize
    {
        self.sticky.borrow().len()
    }
}

impl std::fmt::Debug for DieGraph<'_>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("DieGraph")
            .field("options", &self.options)
            .field("units", &self.units.get().map(UnitTable::len))
            .field("sticky", &self.sticky.borrow().len())
            .finish_non_exhaustive()
    }
}
