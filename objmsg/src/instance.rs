//! Instance store.
//!
//! Instances live in an arena and are addressed by [`InstanceId`]. Deleting
//! an instance only marks it as garbage and drops its name binding, so ids
//! held by running handlers stay valid to test: every use goes through
//! [`InstanceStore::is_live`] first and reports a stale receiver otherwise.

use rustc_hash::FxHashMap;

use crate::class::ClassId;
use crate::symbol::{Symbol, SymbolTable};
use crate::value::Value;

/// Arena index of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(u32);

/// Stored value of one slot.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotValue {
    pub value: Value,
    /// Set when a make/duplicate override already supplied the value, so
    /// initialization leaves it alone.
    pub overridden: bool,
}

#[derive(Debug)]
pub struct Instance {
    pub name: Symbol,
    pub class: ClassId,
    pub(crate) slots: Vec<SlotValue>,
    pub(crate) garbage: bool,
    pub(crate) busy: u32,
    pub(crate) initializing: bool,
}

impl Instance {
    /// Slot values in the class template's order.
    pub fn slots(&self) -> &[SlotValue] {
        &self.slots
    }

    pub fn is_garbage(&self) -> bool {
        self.garbage
    }

    pub fn busy(&self) -> u32 {
        self.busy
    }

    pub fn is_initializing(&self) -> bool {
        self.initializing
    }
}

#[derive(Debug, Default)]
pub struct InstanceStore {
    instances: Vec<Instance>,
    by_name: FxHashMap<Symbol, InstanceId>,
    gensym: u64,
}

impl InstanceStore {
    /// Creates an instance with the given slot values. The name must not be
    /// bound to a live instance.
    pub(crate) fn build(&mut self, name: Symbol, class: ClassId, defaults: Vec<Value>) -> InstanceId {
        let id = InstanceId(self.instances.len() as u32);
        self.instances.push(Instance {
            name,
            class,
            slots: defaults
                .into_iter()
                .map(|value| SlotValue { value, overridden: false })
                .collect(),
            garbage: false,
            busy: 0,
            initializing: false,
        });
        self.by_name.insert(name, id);
        id
    }

    pub fn get(&self, id: InstanceId) -> &Instance {
        &self.instances[id.0 as usize]
    }

    pub(crate) fn get_mut(&mut self, id: InstanceId) -> &mut Instance {
        &mut self.instances[id.0 as usize]
    }

    /// The live instance bound to `name`.
    pub fn find(&self, name: Symbol) -> Option<InstanceId> {
        self.by_name.get(&name).copied()
    }

    pub fn is_live(&self, id: InstanceId) -> bool {
        !self.get(id).garbage
    }

    /// Deletes an instance. References to it become stale.
    pub(crate) fn quash(&mut self, id: InstanceId) {
        let instance = self.get_mut(id);
        instance.garbage = true;
        let name = instance.name;
        if self.by_name.get(&name) == Some(&id) {
            self.by_name.remove(&name);
        }
    }

    pub(crate) fn retain(&mut self, id: InstanceId) {
        self.get_mut(id).busy += 1;
    }

    pub(crate) fn release(&mut self, id: InstanceId) {
        let instance = self.get_mut(id);
        instance.busy = instance.busy.saturating_sub(1);
    }

    /// A fresh `gen<N>` name not bound to any live instance.
    pub(crate) fn gensym(&mut self, symbols: &mut SymbolTable) -> Symbol {
        loop {
            self.gensym += 1;
            let name = symbols.intern(&format!("gen{}", self.gensym));
            if !self.by_name.contains_key(&name) {
                return name;
            }
        }
    }

    /// Live instances in creation order.
    pub fn live(&self) -> impl Iterator<Item = (InstanceId, &Instance)> {
        self.instances
            .iter()
            .enumerate()
            .filter(|(_, instance)| !instance.garbage)
            .map(|(index, instance)| (InstanceId(index as u32), instance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quash_makes_ids_stale_and_frees_name() {
        let mut symbols = SymbolTable::new();
        let mut store = InstanceStore::default();
        let name = symbols.intern("box1");
        let id = store.build(name, ClassId::default(), vec![Value::Integer(1)]);
        assert_eq!(store.find(name), Some(id));
        assert!(store.is_live(id));

        store.quash(id);
        assert!(!store.is_live(id));
        assert_eq!(store.find(name), None);
        assert_eq!(store.live().count(), 0);
    }

    #[test]
    fn test_quash_of_replaced_instance_keeps_new_binding() {
        let mut symbols = SymbolTable::new();
        let mut store = InstanceStore::default();
        let name = symbols.intern("box1");
        let old = store.build(name, ClassId::default(), Vec::new());
        store.quash(old);
        let new = store.build(name, ClassId::default(), Vec::new());
        store.quash(old);
        assert_eq!(store.find(name), Some(new));
    }

    #[test]
    fn test_gensym_skips_bound_names() {
        let mut symbols = SymbolTable::new();
        let mut store = InstanceStore::default();
        let taken = symbols.intern("gen1");
        store.build(taken, ClassId::default(), Vec::new());
        let fresh = store.gensym(&mut symbols);
        assert_eq!(symbols.resolve(fresh), "gen2");
    }
}
