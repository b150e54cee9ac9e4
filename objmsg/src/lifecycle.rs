//! Instance lifecycle and slot storage.
//!
//! Creation sends `create`, then `init` while the instance is flagged as
//! initializing; deletion sends `delete`. The handlers for those messages
//! live on `USER` and can be wrapped like any other.
//!
//! [`Engine::store_slot_value`] is the one place slot values are written.
//! It enforces cardinality and type constraints and tells the pattern
//! matcher about the change.

use tracing::debug;

use crate::class::ClassId;
use crate::engine::Engine;
use crate::error::{DispatchError, DispatchResult};
use crate::instance::InstanceId;
use crate::mutate::{Placement, SlotOverride};
use crate::symbol::Symbol;
use crate::value::Value;

impl Engine {
    /// Creates an instance of `class` named `name`, applies the overrides
    /// and initializes it. Returns the instance name, or `FALSE`.
    pub fn make_instance(&mut self, name: &str, class: &str, overrides: Vec<SlotOverride>) -> Value {
        self.begin_command();
        let class = match self.class_named(class) {
            Ok(class) => class,
            Err(err) => {
                self.report(err);
                return Value::FALSE;
            }
        };
        let name = self.symbols.intern(name);
        let Some(id) = self.build_instance(name, class) else {
            return Value::FALSE;
        };

        self.instances.retain(id);
        self.instances.get_mut(id).initializing = true;
        let ok = self.place_overrides(id, &overrides, Placement::Direct, false) && self.initialize_instance(id);
        self.instances.release(id);

        if !ok {
            if self.instances.is_live(id) {
                self.instances.quash(id);
            }
            self.evaluation_error = true;
            return Value::FALSE;
        }
        Value::InstanceName(name)
    }

    /// Sends `delete` to an instance or instance name.
    pub fn delete_instance(&mut self, instance: Value) -> Value {
        let delete = self.symbols.known().delete;
        self.send_symbol(instance, delete, Vec::new())
    }

    /// Creates an uninitialized instance with the class defaults, replacing
    /// any instance already bound to `name`.
    pub(crate) fn build_instance(&mut self, name: Symbol, class: ClassId) -> Option<InstanceId> {
        if let Some(old) = self.instances.find(name) {
            let delete = self.symbols.known().delete;
            self.instances.retain(old);
            self.direct_message(delete, old, Vec::new());
            self.instances.release(old);
            if self.instances.is_live(old) {
                let name = self.name(name);
                self.report(DispatchError::ReplaceFailed { name });
                return None;
            }
        }

        let defaults: Vec<Value> = self
            .classes
            .class(class)
            .slots()
            .iter()
            .map(|slot| slot.default.clone())
            .collect();
        let id = self.instances.build(name, class, defaults);
        debug!(
            "built instance [{}] of {}",
            self.symbols.resolve(name),
            self.symbols.resolve(self.classes.class(class).name)
        );

        let create = self.symbols.known().create;
        self.direct_message(create, id, Vec::new());
        Some(id)
    }

    /// Sends `init` to an instance whose initializing flag is set. On
    /// success the flag and every override marker are cleared.
    pub(crate) fn initialize_instance(&mut self, id: InstanceId) -> bool {
        let init = self.symbols.known().init;
        self.instances.get_mut(id).initializing = true;
        self.instances.retain(id);
        self.direct_message(init, id, Vec::new());
        self.instances.release(id);

        if !self.instances.is_live(id) {
            self.evaluation_error = true;
            return false;
        }
        if self.evaluation_error {
            let instance = self.instance_label(id);
            self.report(DispatchError::InitializationFailed { instance });
            return false;
        }

        let instance = self.instances.get_mut(id);
        instance.initializing = false;
        for slot in &mut instance.slots {
            slot.overridden = false;
        }
        true
    }

    /// Fills every slot no override supplied with its default.
    pub(crate) fn init_slots(&mut self, id: InstanceId) -> Value {
        if !self.instances.get(id).initializing {
            let instance = self.instance_label(id);
            self.report(DispatchError::InitOutsideInitialization { instance });
            return Value::FALSE;
        }
        let class = self.instances.get(id).class;
        for index in 0..self.classes.class(class).slots().len() {
            if self.instances.get(id).slots[index].overridden {
                continue;
            }
            if let Err(err) = self.store_slot_value(id, index, None) {
                self.report(err);
                return Value::FALSE;
            }
        }
        Value::TRUE
    }

    /// Applies slot overrides to a live instance. With `mark` the written
    /// slots are flagged as overridden.
    pub(crate) fn place_overrides(
        &mut self,
        id: InstanceId,
        overrides: &[SlotOverride],
        placement: Placement,
        mark: bool,
    ) -> bool {
        for slot_override in overrides {
            let Some(index) = self.slot_index_by_name(id, slot_override.slot) else {
                let err = DispatchError::SlotNotFound {
                    context: placement.context().to_string(),
                    slot: self.name(slot_override.slot),
                    class: self.class_name(self.instances.get(id).class),
                };
                self.report(err);
                return false;
            };
            if !self.place_slot_value(id, index, slot_override.value.clone(), placement) {
                return false;
            }
            if mark && self.instances.is_live(id) {
                self.instances.get_mut(id).slots[index].overridden = true;
            }
        }
        true
    }

    /// Writes one slot directly or through its `put-<slot>` message. A
    /// message placement passes the value as a single argument, or none to
    /// restore the default, and fails when the put reports an error or
    /// answers `FALSE`.
    ///
    /// A multifield value is not spread into one argument per element: a
    /// user-defined `put-<slot>` with one fixed parameter receives the whole
    /// multifield, an empty one included. Only a reset sends no argument.
    pub(crate) fn place_slot_value(
        &mut self,
        id: InstanceId,
        index: usize,
        value: Option<Value>,
        placement: Placement,
    ) -> bool {
        match placement {
            Placement::Direct => match self.store_slot_value(id, index, value) {
                Ok(_) => true,
                Err(err) => {
                    self.report(err);
                    false
                }
            },
            Placement::Message => {
                let class = self.instances.get(id).class;
                let message = self.classes.class(class).slots()[index].override_message;
                let args: Vec<Value> = value.into_iter().collect();
                let result = self.direct_message(message, id, args);
                !self.evaluation_error && !result.is_false()
            }
        }
    }

    pub(crate) fn slot_index_by_name(&self, id: InstanceId, slot: Symbol) -> Option<usize> {
        let class = self.instances.get(id).class;
        self.classes
            .slot_id(slot)
            .and_then(|slot| self.classes.class(class).slot_index(slot))
    }

    /// Writes a slot value. `None` restores the slot's default. Single-field
    /// slots unwrap one-element multifields and reject any other multifield;
    /// multifield slots wrap scalars.
    pub(crate) fn store_slot_value(
        &mut self,
        id: InstanceId,
        index: usize,
        value: Option<Value>,
    ) -> DispatchResult<Value> {
        if !self.instances.is_live(id) {
            return Err(DispatchError::StaleInstance { function: "put" });
        }
        let class = self.instances.get(id).class;
        let descriptor = &self.classes.class(class).slots()[index];
        let value = value.unwrap_or_else(|| descriptor.default.clone());

        let value = match (descriptor.multiple, value) {
            (true, Value::Multifield(items)) => Value::Multifield(items),
            (true, scalar) => Value::multifield([scalar]),
            (false, Value::Multifield(items)) if items.len() == 1 => items[0].clone(),
            (false, multifield @ Value::Multifield(_)) => {
                return Err(DispatchError::Cardinality {
                    value: self.render(&multifield),
                    slot: self.name(descriptor.name),
                });
            }
            (false, scalar) => scalar,
        };

        if self.config.constraints.dynamic_checking && !descriptor.accepts(&value) {
            return Err(DispatchError::ConstraintViolation {
                value: self.render(&value),
                slot: self.name(descriptor.name),
            });
        }

        let slot_name = descriptor.name;
        let instance = self.instances.get_mut(id);
        let slot = &mut instance.slots[index];
        slot.value = value.clone();
        slot.overridden = instance.initializing;
        self.pattern.slot_changed(id, slot_name);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::SlotSpec;
    use crate::value::ValueType;

    fn engine_with_box() -> Engine {
        let mut engine = Engine::new();
        engine
            .define_class(
                "Box",
                &[],
                vec![
                    SlotSpec::single("size").default_value(Value::Integer(1)),
                    SlotSpec::multiple("tags"),
                    SlotSpec::single("weight").allowed_types(&[ValueType::Integer, ValueType::Float]),
                ],
            )
            .unwrap();
        engine
    }

    #[test]
    fn test_make_instance_applies_defaults_and_overrides() {
        let mut engine = engine_with_box();
        let size = engine.intern("size");
        let name = engine.make_instance("box1", "Box", vec![SlotOverride::set(size, Value::Integer(3))]);
        assert_eq!(name, Value::InstanceName(engine.intern("box1")));

        let id = engine.find_instance("box1").unwrap();
        assert_eq!(engine.slot_value(id, "size"), Some(Value::Integer(3)));
        assert_eq!(engine.slot_value(id, "tags"), Some(Value::multifield([])));
        assert!(!engine.instances().get(id).is_initializing());
        assert!(engine.instances().get(id).slots().iter().all(|slot| !slot.overridden));
    }

    #[test]
    fn test_make_instance_replaces_same_name() {
        let mut engine = engine_with_box();
        engine.make_instance("box1", "Box", Vec::new());
        let old = engine.find_instance("box1").unwrap();
        engine.make_instance("box1", "Box", Vec::new());
        let new = engine.find_instance("box1").unwrap();
        assert_ne!(old, new);
        assert!(!engine.instances().is_live(old));
    }

    #[test]
    fn test_store_cardinality_and_wrapping() {
        let mut engine = engine_with_box();
        engine.make_instance("box1", "Box", Vec::new());
        let id = engine.find_instance("box1").unwrap();

        let stored = engine.store_slot_value(id, 1, Some(Value::Integer(4))).unwrap();
        assert_eq!(stored, Value::multifield([Value::Integer(4)]));

        let stored = engine
            .store_slot_value(id, 0, Some(Value::multifield([Value::Integer(9)])))
            .unwrap();
        assert_eq!(stored, Value::Integer(9));

        let err = engine
            .store_slot_value(id, 0, Some(Value::multifield([Value::Integer(1), Value::Integer(2)])))
            .unwrap_err();
        assert!(matches!(err, DispatchError::Cardinality { .. }));

        assert_eq!(engine.store_slot_value(id, 0, None).unwrap(), Value::Integer(1));
    }

    #[test]
    fn test_dynamic_constraint_checking() {
        let mut engine = engine_with_box();
        engine.make_instance("box1", "Box", Vec::new());
        let id = engine.find_instance("box1").unwrap();
        let err = engine.store_slot_value(id, 2, Some(Value::string("heavy"))).unwrap_err();
        assert!(matches!(err, DispatchError::ConstraintViolation { .. }));

        engine.config_mut().constraints.dynamic_checking = false;
        assert!(engine.store_slot_value(id, 2, Some(Value::string("heavy"))).is_ok());
    }

    #[test]
    fn test_init_slots_outside_initialization() {
        let mut engine = engine_with_box();
        engine.make_instance("box1", "Box", Vec::new());
        let id = engine.find_instance("box1").unwrap();
        assert_eq!(engine.init_slots(id), Value::FALSE);
        assert!(matches!(
            engine.diagnostics().last(),
            Some(DispatchError::InitOutsideInitialization { .. })
        ));
    }

    #[test]
    fn test_delete_instance_makes_references_stale() {
        let mut engine = engine_with_box();
        engine.make_instance("box1", "Box", Vec::new());
        let id = engine.find_instance("box1").unwrap();
        assert_eq!(engine.delete_instance(Value::Instance(id)), Value::TRUE);
        assert_eq!(engine.send(Value::Instance(id), "print", Vec::new()), Value::FALSE);
        assert!(matches!(
            engine.diagnostics().last(),
            Some(DispatchError::StaleInstance { .. })
        ));
    }
}
