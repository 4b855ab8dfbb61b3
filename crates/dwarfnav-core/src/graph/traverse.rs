//! Traversal iterators.
//!
//! All three iterators yield `DwarfResult<Cursor>` and stop after the first
//! error.

use std::collections::VecDeque;

use super::{Cursor, DieGraph};
use crate::error::DwarfResult;

impl<'a> DieGraph<'a>
{
    /// Immediate children of `parent`, in declaration order
    pub fn children<'g>(&'g self, parent: &Cursor) -> Children<'g, 'a>
    {
        Children {
            graph: self,
            state: ChildState::Start(parent.clone()),
        }
    }

    /// Depth-first pre-order walk of the subtree rooted at `start`, `start` included
    pub fn dfs<'g>(&'g self, start: &Cursor) -> Dfs<'g, 'a>
    {
        Dfs {
            graph: self,
            start: start.clone(),
            current: None,
            path: Vec::new(),
            done: start.is_end(),
        }
    }

    /// Breadth-first walk of the subtree rooted at `start`, `start` included
    pub fn bfs<'g>(&'g self, start: &Cursor) -> Bfs<'g, 'a>
    {
        let mut queue = VecDeque::new();
        if !start.is_end() {
            queue.push_back(start.clone());
        }
        Bfs {
            graph: self,
            queue,
            failed: false,
        }
    }
}

enum ChildState
{
    Start(Cursor),
    At(Cursor),
    Done,
}

/// Iterator over the immediate children of one position.
pub struct Children<'g, 'a>
{
    graph: &'g DieGraph<'a>,
    state: ChildState,
}

impl Iterator for Children<'_, '_>
{
    type Item = DwarfResult<Cursor>;

    fn next(&mut self) -> Option<Self::Item>
    {
        let step = match std::mem::replace(&mut self.state, ChildState::Done) {
            ChildState::Start(parent) => self.graph.first_child(&parent),
            ChildState::At(previous) => self.graph.next_sibling(&previous),
            ChildState::Done => return None,
        };
        match step {
            Ok(Some(child)) => {
                self.state = ChildState::At(child.clone());
                Some(Ok(child))
            }
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

/// Depth-first pre-order iterator.
///
/// Siblings are only looked up once the previous sibling's subtree has been
/// walked, so the walk reuses the adjacency recorded on the way down.
pub struct Dfs<'g, 'a>
{
    graph: &'g DieGraph<'a>,
    start: Cursor,
    current: Option<Cursor>,
    /// Ancestors of `current` below and including `start`
    path: Vec<Cursor>,
    done: bool,
}

impl Dfs<'_, '_>
{
    fn advance(&mut self) -> DwarfResult<Option<Cursor>>
    {
        let Some(current) = self.current.take() else {
            return Ok(Some(self.start.clone()));
        };
        if let Some(child) = self.graph.first_child(&current)? {
            self.path.push(current);
            return Ok(Some(child));
        }
        // an empty path means `node` is the start, whose siblings are out of scope
        let mut node = current;
        while !self.path.is_empty() {
            if let Some(sibling) = self.graph.next_sibling(&node)? {
                return Ok(Some(sibling));
            }
            match self.path.pop() {
                Some(parent) => node = parent,
                None => break,
            }
        }
        Ok(None)
    }
}

impl Iterator for Dfs<'_, '_>
{
    type Item = DwarfResult<Cursor>;

    fn next(&mut self) -> Option<Self::Item>
    {
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(Some(cursor)) => {
                self.current = Some(cursor.clone());
                Some(Ok(cursor))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Breadth-first iterator with an explicit queue.
pub struct Bfs<'g, 'a>
{
    graph: &'g DieGraph<'a>,
    queue: VecDeque<Cursor>,
    failed: bool,
}

impl Iterator for Bfs<'_, '_>
{
    type Item = DwarfResult<Cursor>;

    fn next(&mut self) -> Option<Self::Item>
    {
        if self.failed {
            return None;
        }
        let cursor = self.queue.pop_front()?;
        for child in self.graph.children(&cursor) {
            match child {
                Ok(child) => self.queue.push_back(child),
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            }
        }
        Some(Ok(cursor))
    }
}
