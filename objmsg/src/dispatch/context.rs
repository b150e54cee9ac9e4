//! Dispatch stack and scoped context guards.
//!
//! Each active send owns one [`CoreFrame`]: its linked handler chain, the
//! cursor into it and the argument frames its handlers see. Frames below
//! the top are the enclosing sends, suspended until the nested send
//! returns.
//!
//! Context is restored by guards rather than by hand: [`FrameGuard`] pops a
//! send's frame and releases its links, [`CursorGuard`] puts back the
//! cursor (and any replacement arguments) of a call-next-handler. Both do
//! their work in `Drop`, so every exit path restores the caller.

use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use crate::engine::Engine;
use crate::handler::{HandlerRef, Qualifier};
use crate::instance::InstanceId;
use crate::symbol::Symbol;
use crate::value::Value;

/// One applicable handler in a linked chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HandlerLink {
    pub handler: HandlerRef,
    pub qualifier: Qualifier,
}

/// A joined chain: arounds, befores, primaries, afters.
#[derive(Debug, Default)]
pub(crate) struct Core {
    links: Vec<HandlerLink>,
}

impl Core {
    pub fn new(links: Vec<HandlerLink>) -> Self {
        Self { links }
    }

    pub fn links(&self) -> &[HandlerLink] {
        &self.links
    }

    pub fn qualifier_at(&self, position: Option<usize>) -> Option<Qualifier> {
        position.and_then(|i| self.links.get(i)).map(|link| link.qualifier)
    }

    pub fn successor(&self, position: usize) -> Option<usize> {
        let next = position + 1;
        (next < self.links.len()).then_some(next)
    }
}

/// Position in a chain: the running handler and the one after it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Cursor {
    pub current: Option<usize>,
    pub next: Option<usize>,
}

pub(crate) struct CoreFrame {
    pub message: Symbol,
    pub core: Core,
    pub cursor: Cursor,
    args: Rc<[Value]>,
    overrides: Vec<Rc<[Value]>>,
}

impl CoreFrame {
    /// The arguments handlers of this send currently see, receiver first.
    pub fn args(&self) -> &Rc<[Value]> {
        self.overrides.last().unwrap_or(&self.args)
    }

    pub fn current_link(&self) -> Option<HandlerLink> {
        self.cursor.current.map(|i| self.core.links()[i])
    }
}

/// Active sends, innermost last.
#[derive(Default)]
pub struct DispatchStack {
    frames: Vec<CoreFrame>,
}

impl DispatchStack {
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn top(&self) -> Option<&CoreFrame> {
        self.frames.last()
    }

    pub(crate) fn top_mut(&mut self) -> Option<&mut CoreFrame> {
        self.frames.last_mut()
    }

    /// True while a handler body is executing in the innermost send.
    pub fn in_handler(&self) -> bool {
        self.top().is_some_and(|frame| frame.cursor.current.is_some())
    }

    pub(crate) fn current_link(&self) -> Option<HandlerLink> {
        self.top().and_then(CoreFrame::current_link)
    }

    pub(crate) fn current_args(&self) -> Option<Rc<[Value]>> {
        self.top().map(|frame| Rc::clone(frame.args()))
    }

    pub(crate) fn current_message(&self) -> Option<Symbol> {
        self.top().map(|frame| frame.message)
    }

    pub(crate) fn next_qualifier(&self) -> Option<Qualifier> {
        self.top().and_then(|frame| frame.core.qualifier_at(frame.cursor.next))
    }

    pub(crate) fn current_qualifier(&self) -> Option<Qualifier> {
        self.top().and_then(|frame| frame.core.qualifier_at(frame.cursor.current))
    }

    pub(crate) fn set_cursor(&mut self, cursor: Cursor) {
        if let Some(frame) = self.top_mut() {
            frame.cursor = cursor;
        }
    }

    /// Makes the next handler current.
    pub(crate) fn advance(&mut self) {
        if let Some(frame) = self.top_mut() {
            let current = frame.cursor.next;
            frame.cursor = Cursor {
                current,
                next: current.and_then(|i| frame.core.successor(i)),
            };
        }
    }

    /// Moves the next position past a run of primaries.
    pub(crate) fn skip_primaries(&mut self) {
        if let Some(frame) = self.top_mut() {
            while frame.core.qualifier_at(frame.cursor.next) == Some(Qualifier::Primary) {
                frame.cursor.next = frame.cursor.next.and_then(|i| frame.core.successor(i));
            }
        }
    }
}

/// Scope of one send: pops its frame, releases its links and the
/// receiver's busy mark when dropped.
pub(crate) struct FrameGuard<'e> {
    engine: &'e mut Engine,
    receiver: Option<InstanceId>,
}

impl Engine {
    pub(crate) fn push_frame(
        &mut self,
        message: Symbol,
        core: Core,
        args: Rc<[Value]>,
        receiver: Option<InstanceId>,
    ) -> FrameGuard<'_> {
        if let Some(id) = receiver {
            self.instances.retain(id);
        }
        self.dispatch.frames.push(CoreFrame {
            message,
            core,
            cursor: Cursor::default(),
            args,
            overrides: Vec::new(),
        });
        FrameGuard { engine: self, receiver }
    }

    /// Saves the cursor of the innermost send until the guard drops.
    /// Replacement arguments, if given, stay in effect for the same scope.
    pub(crate) fn save_cursor(&mut self, replacement: Option<Rc<[Value]>>) -> CursorGuard<'_> {
        let mut saved = Cursor::default();
        let mut pushed = false;
        if let Some(frame) = self.dispatch.top_mut() {
            saved = frame.cursor;
            if let Some(args) = replacement {
                frame.overrides.push(args);
                pushed = true;
            }
        }
        CursorGuard {
            engine: self,
            saved,
            pushed,
        }
    }
}

impl Deref for FrameGuard<'_> {
    type Target = Engine;

    fn deref(&self) -> &Engine {
        self.engine
    }
}

impl DerefMut for FrameGuard<'_> {
    fn deref_mut(&mut self) -> &mut Engine {
        self.engine
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        if let Some(frame) = self.engine.dispatch.frames.pop() {
            self.engine.release_links(frame.core.links());
        }
        if let Some(id) = self.receiver {
            self.engine.instances.release(id);
        }
    }
}

/// Scope of a call-next-handler.
pub(crate) struct CursorGuard<'e> {
    engine: &'e mut Engine,
    saved: Cursor,
    pushed: bool,
}

impl Deref for CursorGuard<'_> {
    type Target = Engine;

    fn deref(&self) -> &Engine {
        self.engine
    }
}

impl DerefMut for CursorGuard<'_> {
    fn deref_mut(&mut self) -> &mut Engine {
        self.engine
    }
}

impl Drop for CursorGuard<'_> {
    fn drop(&mut self) {
        if let Some(frame) = self.engine.dispatch.top_mut() {
            frame.cursor = self.saved;
            if self.pushed {
                frame.overrides.pop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ClassId;

    fn link(index: usize, qualifier: Qualifier) -> HandlerLink {
        HandlerLink {
            handler: HandlerRef {
                class: ClassId::default(),
                index,
            },
            qualifier,
        }
    }

    fn frame(core: Core) -> CoreFrame {
        CoreFrame {
            message: crate::symbol::SymbolTable::new().known().init,
            core,
            cursor: Cursor::default(),
            args: Rc::from(vec![Value::Integer(0)]),
            overrides: Vec::new(),
        }
    }

    #[test]
    fn test_advance_and_skip_primaries() {
        let mut stack = DispatchStack::default();
        stack.frames.push(frame(Core::new(vec![
            link(0, Qualifier::Before),
            link(1, Qualifier::Primary),
            link(2, Qualifier::Primary),
            link(3, Qualifier::After),
        ])));
        stack.set_cursor(Cursor { current: None, next: Some(0) });
        assert!(!stack.in_handler());

        stack.advance();
        assert_eq!(stack.current_qualifier(), Some(Qualifier::Before));
        assert_eq!(stack.next_qualifier(), Some(Qualifier::Primary));

        stack.advance();
        stack.skip_primaries();
        assert_eq!(stack.current_qualifier(), Some(Qualifier::Primary));
        assert_eq!(stack.next_qualifier(), Some(Qualifier::After));

        stack.advance();
        assert_eq!(stack.next_qualifier(), None);
        assert!(stack.in_handler());
    }

    #[test]
    fn test_override_arguments_shadow_base() {
        let mut f = frame(Core::default());
        f.overrides.push(Rc::from(vec![Value::Integer(0), Value::Integer(9)]));
        assert_eq!(f.args().len(), 2);
        f.overrides.pop();
        assert_eq!(f.args().len(), 1);
    }
}
