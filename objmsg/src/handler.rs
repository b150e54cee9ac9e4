//! # Handler Table
//!
//! Each class owns one [`HandlerTable`]. A handler keeps its position in
//! the table for as long as the table exists, which is what handler links
//! and [`HandlerRef`]s point at. Deleting a handler empties its slot; the
//! position is never handed out again, so a ref to a deleted handler finds
//! nothing instead of a different handler. A separate order index keeps the
//! live handlers sorted by `(message, qualifier)` so every handler for one
//! message name forms a contiguous group that a single binary search finds.

use std::fmt;
use std::rc::Rc;

use crate::action::Action;
use crate::class::ClassId;
use crate::symbol::Symbol;

/// Handler role in the dispatch protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Qualifier {
    Around,
    Before,
    Primary,
    After,
}

impl Qualifier {
    pub const ALL: [Qualifier; 4] = [
        Qualifier::Around,
        Qualifier::Before,
        Qualifier::Primary,
        Qualifier::After,
    ];

    /// Position of the qualifier's chain in per-qualifier arrays.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Qualifier::Around => "around",
            Qualifier::Before => "before",
            Qualifier::Primary => "primary",
            Qualifier::After => "after",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|q| q.name() == name)
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parameter list shape. The receiver is not counted in `fixed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Params {
    pub fixed: usize,
    /// A trailing wildcard parameter collects extra arguments.
    pub rest: bool,
}

impl Params {
    pub fn fixed(count: usize) -> Self {
        Self { fixed: count, rest: false }
    }

    pub fn with_rest(count: usize) -> Self {
        Self { fixed: count, rest: true }
    }

    /// Minimum argument count, receiver included.
    pub fn min_args(&self) -> usize {
        self.fixed + 1
    }

    /// Maximum argument count, receiver included; `None` when unbounded.
    pub fn max_args(&self) -> Option<usize> {
        (!self.rest).then_some(self.fixed + 1)
    }

    pub fn accepts(&self, arg_count: usize) -> bool {
        if self.rest {
            arg_count >= self.min_args()
        } else {
            arg_count == self.min_args()
        }
    }
}

/// Stable address of a handler: owning class plus table position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerRef {
    pub class: ClassId,
    pub index: usize,
}

/// A message handler.
#[derive(Debug, Clone)]
pub struct Handler {
    pub message: Symbol,
    pub class: ClassId,
    pub qualifier: Qualifier,
    pub params: Params,
    pub(crate) actions: Rc<[Action]>,
    pub local_count: usize,
    pub system: bool,
    pub trace: bool,
    pub(crate) busy: u32,
    pub(crate) marked: bool,
}

impl Handler {
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn busy(&self) -> u32 {
        self.busy
    }
}

/// Handlers of one class.
#[derive(Debug, Clone, Default)]
pub struct HandlerTable {
    /// Deleted handlers leave an empty slot behind, so positions are never
    /// reused.
    handlers: Vec<Option<Handler>>,
    keys: Vec<(Symbol, Qualifier)>,
    order: Vec<usize>,
}

impl HandlerTable {
    /// Number of live handlers.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The handler at `index`, or `None` if it was deleted or never existed.
    pub fn get(&self, index: usize) -> Option<&Handler> {
        self.handlers.get(index).and_then(Option::as_ref)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut Handler> {
        self.handlers.get_mut(index).and_then(Option::as_mut)
    }

    /// Handlers in `(message, qualifier)` order, with their positions.
    pub fn sorted(&self) -> impl Iterator<Item = (usize, &Handler)> {
        self.order
            .iter()
            .filter_map(|&index| self.get(index).map(|handler| (index, handler)))
    }

    /// Positions of every handler for `message`, in qualifier order.
    pub fn find_name_group(&self, message: Symbol) -> &[usize] {
        let start = self.order.partition_point(|&i| self.keys[i].0 < message);
        let len = self.order[start..].partition_point(|&i| self.keys[i].0 == message);
        &self.order[start..start + len]
    }

    pub fn find(&self, message: Symbol, qualifier: Qualifier) -> Option<usize> {
        self.find_name_group(message)
            .iter()
            .copied()
            .find(|&i| self.keys[i].1 == qualifier)
    }

    /// Adds a handler whose `(message, qualifier)` is not yet present.
    pub(crate) fn insert(&mut self, handler: Handler) -> usize {
        let key = (handler.message, handler.qualifier);
        let index = self.handlers.len();
        self.handlers.push(Some(handler));
        self.keys.push(key);
        let at = self.order.partition_point(|&i| self.keys[i] < key);
        self.order.insert(at, index);
        index
    }

    /// True while any handler of the table is linked into an active send.
    pub fn executing(&self) -> bool {
        self.handlers.iter().flatten().any(|h| h.busy > 0)
    }

    pub(crate) fn mark(&mut self, index: usize) {
        if let Some(handler) = self.get_mut(index) {
            handler.marked = true;
        }
    }

    /// Deletes every marked handler, returning how many went away. The
    /// remaining handlers keep their positions.
    pub(crate) fn remove_marked(&mut self) -> usize {
        let mut deleted = 0;
        for slot in &mut self.handlers {
            if slot.as_ref().is_some_and(|h| h.marked) {
                *slot = None;
                deleted += 1;
            }
        }
        let handlers = &self.handlers;
        self.order.retain(|&i| handlers[i].is_some());
        deleted
    }
}
