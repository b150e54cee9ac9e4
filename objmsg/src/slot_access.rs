//! # Slot Access
//!
//! `?self:<slot>` references in handler bodies are bound early: when the
//! handler is defined, [`SlotRefCompiler`] resolves each one against the
//! handler's class and rewrites it into a [`SlotRef`] naming the class that
//! defines the slot. At run time the receiver's class must still map that
//! slot to the same defining class, otherwise the reference reports an
//! early-binding error.
//!
//! `(get <slot>)` and `(put <slot> ...)` are resolved by name on every call
//! and are only legal inside a handler whose receiver is an instance.

use crate::action::{Action, OverrideExpr, SlotRef};
use crate::class::{ClassId, SlotAccess, Visibility};
use crate::engine::Engine;
use crate::error::{DispatchError, DispatchResult};
use crate::eval::Activation;
use crate::instance::InstanceId;
use crate::symbol::Symbol;
use crate::value::Value;

/// Collapses evaluated slot values: none restores the default, one is
/// stored as is, several become a multifield.
pub(crate) fn collapse_values(mut values: Vec<Value>) -> Option<Value> {
    match values.len() {
        0 => None,
        1 => values.pop(),
        _ => Some(Value::multifield(values)),
    }
}

/// Rewrites the `?self:<slot>` forms of one handler body.
pub(crate) struct SlotRefCompiler<'e> {
    engine: &'e Engine,
    class: ClassId,
}

impl<'e> SlotRefCompiler<'e> {
    pub(crate) fn new(engine: &'e Engine, class: ClassId) -> Self {
        Self { engine, class }
    }

    pub(crate) fn compile(&self, actions: Vec<Action>) -> DispatchResult<Vec<Action>> {
        actions.into_iter().map(|action| self.compile_action(action)).collect()
    }

    fn compile_boxed(&self, action: Box<Action>) -> DispatchResult<Box<Action>> {
        self.compile_action(*action).map(Box::new)
    }

    fn compile_overrides(&self, overrides: Vec<OverrideExpr>) -> DispatchResult<Vec<OverrideExpr>> {
        overrides
            .into_iter()
            .map(|expr| {
                Ok(OverrideExpr {
                    slot: self.compile_action(expr.slot)?,
                    values: self.compile(expr.values)?,
                })
            })
            .collect()
    }

    fn compile_action(&self, action: Action) -> DispatchResult<Action> {
        Ok(match action {
            Action::SelfSlot(name) => Action::SlotGet(self.resolve(name, false)?),
            Action::BindSelfSlot(name, values) => {
                let slot = self.resolve(name, true)?;
                let values = self.compile(values)?;
                self.check_constants(slot, &values)?;
                Action::SlotPut(slot, values)
            }
            Action::Bind(local, value) => Action::Bind(local, self.compile_boxed(value)?),
            Action::If {
                condition,
                then,
                otherwise,
            } => Action::If {
                condition: self.compile_boxed(condition)?,
                then: self.compile(then)?,
                otherwise: self.compile(otherwise)?,
            },
            Action::Call { function, args } => Action::Call {
                function,
                args: self.compile(args)?,
            },
            Action::Send {
                receiver,
                message,
                args,
            } => Action::Send {
                receiver: self.compile_boxed(receiver)?,
                message,
                args: self.compile(args)?,
            },
            Action::SlotPut(slot, values) => Action::SlotPut(slot, self.compile(values)?),
            Action::DynamicPut(slot, values) => Action::DynamicPut(slot, self.compile(values)?),
            Action::OverrideNextHandler(args) => Action::OverrideNextHandler(self.compile(args)?),
            Action::Modify {
                target,
                overrides,
                options,
            } => Action::Modify {
                target: self.compile_boxed(target)?,
                overrides: self.compile_overrides(overrides)?,
                options,
            },
            Action::Duplicate {
                source,
                to,
                overrides,
                options,
            } => Action::Duplicate {
                source: self.compile_boxed(source)?,
                to: to.map(|to| self.compile_boxed(to)).transpose()?,
                overrides: self.compile_overrides(overrides)?,
                options,
            },
            other => other,
        })
    }

    fn resolve(&self, name: Symbol, write: bool) -> DispatchResult<SlotRef> {
        let engine = self.engine;
        let class = engine.classes.class(self.class);
        let Some(descriptor) = engine.classes.slot_id(name).and_then(|id| class.slot(id)) else {
            return Err(DispatchError::SlotNotFound {
                context: "?self".to_string(),
                slot: engine.name(name),
                class: engine.class_name(self.class),
            });
        };
        if descriptor.visibility == Visibility::Private && descriptor.owner != self.class {
            return Err(DispatchError::PrivateSlot {
                slot: engine.name(name),
                owner: engine.class_name(descriptor.owner),
                class: engine.class_name(self.class),
            });
        }
        if write && descriptor.access == SlotAccess::ReadOnly {
            return Err(DispatchError::SlotWriteDenied {
                slot: engine.name(name),
                target: format!("class {}", engine.class_name(self.class)),
            });
        }
        Ok(SlotRef {
            class: descriptor.owner,
            slot: descriptor.id,
        })
    }

    /// Checks a write whose values are all constants against the slot's
    /// cardinality and type constraints.
    fn check_constants(&self, slot: SlotRef, values: &[Action]) -> DispatchResult<()> {
        let engine = self.engine;
        if !engine.config.constraints.static_checking {
            return Ok(());
        }
        let constants: Option<Vec<Value>> = values
            .iter()
            .map(|value| match value {
                Action::Const(value) => Some(value.clone()),
                _ => None,
            })
            .collect();
        let Some(constants) = constants else {
            return Ok(());
        };
        let Some(descriptor) = engine.classes.class(slot.class).slot(slot.slot) else {
            return Ok(());
        };
        let multiple_values = constants.len() > 1;
        let Some(value) = collapse_values(constants) else {
            return Ok(());
        };
        if multiple_values && !descriptor.multiple {
            return Err(DispatchError::Cardinality {
                value: engine.render(&value),
                slot: engine.name(descriptor.name),
            });
        }
        if !descriptor.accepts(&value) {
            return Err(DispatchError::ConstraintViolation {
                value: engine.render(&value),
                slot: engine.name(descriptor.name),
            });
        }
        Ok(())
    }
}

impl Engine {
    /// The receiver of the running handler, which must be a live instance.
    pub(crate) fn active_instance(&self, activation: &Activation, function: &'static str) -> DispatchResult<InstanceId> {
        match activation.receiver() {
            Some(Value::Instance(id)) if self.instances.is_live(*id) => Ok(*id),
            Some(Value::Instance(_)) => Err(DispatchError::StaleInstance { function }),
            _ => Err(DispatchError::InstanceRequired { function }),
        }
    }

    /// Maps a compiled reference to a slot position of `instance`.
    fn resolve_slot_ref(&self, slot: SlotRef, instance: InstanceId) -> DispatchResult<usize> {
        let class = self.instances.get(instance).class;
        let template = self.classes.class(class);
        match template.slot_index(slot.slot) {
            Some(index) if template.slots()[index].owner == slot.class => Ok(index),
            _ => {
                let name = self
                    .classes
                    .class(slot.class)
                    .slot(slot.slot)
                    .map(|descriptor| self.name(descriptor.name))
                    .unwrap_or_default();
                Err(DispatchError::EarlySlotBinding {
                    slot: name,
                    class: self.class_name(slot.class),
                    instance: self.instance_label(instance),
                    instance_class: self.class_name(class),
                })
            }
        }
    }

    /// Finds a slot by name for `get`/`put`, honoring private visibility
    /// against the class of the running handler.
    fn visible_slot(&self, instance: InstanceId, name: Symbol, function: &'static str) -> DispatchResult<usize> {
        let class = self.instances.get(instance).class;
        let Some(index) = self.slot_index_by_name(instance, name) else {
            return Err(DispatchError::SlotNotFound {
                context: function.to_string(),
                slot: self.name(name),
                class: self.class_name(class),
            });
        };
        let descriptor = &self.classes.class(class).slots()[index];
        let handler_class = self.dispatch.current_link().map(|link| link.handler.class);
        if descriptor.visibility == Visibility::Private && handler_class != Some(descriptor.owner) {
            return Err(DispatchError::PrivateSlot {
                slot: self.name(name),
                owner: self.class_name(descriptor.owner),
                class: handler_class.map(|c| self.class_name(c)).unwrap_or_default(),
            });
        }
        Ok(index)
    }

    /// Writes a slot on behalf of handler code, enforcing write access.
    fn put_slot(&mut self, instance: InstanceId, index: usize, value: Option<Value>) -> DispatchResult<Value> {
        let descriptor = &self.classes.class(self.instances.get(instance).class).slots()[index];
        let denied = match descriptor.access {
            SlotAccess::ReadWrite => false,
            SlotAccess::ReadOnly => true,
            SlotAccess::InitializeOnly => !self.instances.get(instance).initializing,
        };
        if denied {
            return Err(DispatchError::SlotWriteDenied {
                slot: self.name(descriptor.name),
                target: self.instance_label(instance),
            });
        }
        self.store_slot_value(instance, index, value)
    }

    fn answer(&mut self, result: DispatchResult<Value>) -> Value {
        result.unwrap_or_else(|err| {
            self.report(err);
            Value::FALSE
        })
    }

    /// `?self:<slot>`.
    pub(crate) fn handler_slot_get(&mut self, slot: SlotRef, activation: &Activation) -> Value {
        let result = self.active_instance(activation, "?self").and_then(|id| {
            let index = self.resolve_slot_ref(slot, id)?;
            Ok(self.instances.get(id).slots[index].value.clone())
        });
        self.answer(result)
    }

    /// `(bind ?self:<slot> ...)`. Answers the stored value.
    pub(crate) fn handler_slot_put(&mut self, slot: SlotRef, values: &[Action], activation: &mut Activation) -> Value {
        let id = match self.active_instance(activation, "bind") {
            Ok(id) => id,
            Err(err) => return self.answer(Err(err)),
        };
        let values = self.eval_args(values, activation);
        if self.evaluation_error {
            return Value::FALSE;
        }
        let result = self
            .resolve_slot_ref(slot, id)
            .and_then(|index| self.put_slot(id, index, collapse_values(values)));
        self.answer(result)
    }

    /// `(get <slot>)`.
    pub(crate) fn dynamic_slot_get(&mut self, name: Symbol, activation: &Activation) -> Value {
        if !self.dispatch.in_handler() {
            return self.answer(Err(DispatchError::NotInHandler { function: "get" }));
        }
        let result = self.active_instance(activation, "get").and_then(|id| {
            let index = self.visible_slot(id, name, "get")?;
            Ok(self.instances.get(id).slots[index].value.clone())
        });
        self.answer(result)
    }

    /// `(put <slot> ...)`. Answers the stored value.
    pub(crate) fn dynamic_slot_put(&mut self, name: Symbol, values: &[Action], activation: &mut Activation) -> Value {
        if !self.dispatch.in_handler() {
            return self.answer(Err(DispatchError::NotInHandler { function: "put" }));
        }
        let id = match self.active_instance(activation, "put") {
            Ok(id) => id,
            Err(err) => return self.answer(Err(err)),
        };
        let values = self.eval_args(values, activation);
        if self.evaluation_error {
            return Value::FALSE;
        }
        let result = self
            .visible_slot(id, name, "put")
            .and_then(|index| self.put_slot(id, index, collapse_values(values)));
        self.answer(result)
    }

    /// Body of a generated `put-<slot>` handler: the rest parameter holds
    /// the new value(s).
    pub(crate) fn put_accessor(&mut self, slot: SlotRef, activation: &Activation) -> Value {
        let values = match activation.param(1) {
            Some(Value::Multifield(items)) => items.to_vec(),
            _ => Vec::new(),
        };
        let result = self.active_instance(activation, "put").and_then(|id| {
            let index = self.resolve_slot_ref(slot, id)?;
            self.put_slot(id, index, collapse_values(values))
        });
        self.answer(result)
    }
}
