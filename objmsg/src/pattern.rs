//! Pattern-matching collaborator.
//!
//! The rule engine's matcher is outside this crate. The dispatch core only
//! needs to suspend re-matching around batched slot writes and to tell the
//! matcher which slots changed.

use std::ops::{Deref, DerefMut};

use crate::engine::Engine;
use crate::instance::InstanceId;
use crate::symbol::Symbol;

/// Hook into an external pattern-matching network.
pub trait PatternMatchHook {
    /// Sets "delay object pattern matching", returning the previous value.
    fn set_delay(&mut self, delay: bool) -> bool;

    fn is_delayed(&self) -> bool;

    /// Called after every slot write.
    fn slot_changed(&mut self, _instance: InstanceId, _slot: Symbol) {}
}

/// Hook used when no matcher is attached: just the flag.
#[derive(Debug, Default)]
pub struct DelayFlag {
    delayed: bool,
}

impl PatternMatchHook for DelayFlag {
    fn set_delay(&mut self, delay: bool) -> bool {
        std::mem::replace(&mut self.delayed, delay)
    }

    fn is_delayed(&self) -> bool {
        self.delayed
    }
}

/// Holds pattern matching delayed until dropped, then restores the prior
/// setting.
pub(crate) struct DelayMatchingGuard<'e> {
    engine: &'e mut Engine,
    prior: bool,
}

impl Engine {
    pub(crate) fn delay_pattern_matching(&mut self) -> DelayMatchingGuard<'_> {
        let prior = self.pattern.set_delay(true);
        DelayMatchingGuard { engine: self, prior }
    }
}

impl Deref for DelayMatchingGuard<'_> {
    type Target = Engine;

    fn deref(&self) -> &Engine {
        self.engine
    }
}

impl DerefMut for DelayMatchingGuard<'_> {
    fn deref_mut(&mut self) -> &mut Engine {
        self.engine
    }
}

impl Drop for DelayMatchingGuard<'_> {
    fn drop(&mut self) {
        self.engine.pattern.set_delay(self.prior);
    }
}
