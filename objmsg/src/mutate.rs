//! # Instance Mutation Protocol
//!
//! `modify-instance` and `duplicate-instance` in their direct and message
//! forms. The public operation evaluates the slot overrides in the caller's
//! bindings, then sends one of the synthetic messages `direct-modify`,
//! `message-modify`, `direct-duplicate` or `message-duplicate` to the
//! target. The system handler for that message applies the overrides, so
//! user around/before/after handlers can wrap the whole mutation.
//!
//! ## Authorization
//!
//! The synthetic messages are only meaningful when sent by the public
//! operation. Each operation issues a one-time `Ticket` that travels in
//! the [`OverrideBatch`]; the system handler redeems it. A batch that was
//! sent by hand, replayed or forwarded to a second handler carries a ticket
//! the book no longer holds and is rejected.
//!
//! ## Pattern matching
//!
//! Unless the `active` form is requested, pattern matching is delayed for
//! the duration of the operation and restored to its prior setting
//! afterwards, whatever the outcome.

use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::action::{Action, OverrideExpr};
use crate::engine::Engine;
use crate::error::DispatchError;
use crate::eval::Activation;
use crate::instance::InstanceId;
use crate::slot_access::collapse_values;
use crate::symbol::Symbol;
use crate::value::Value;

/// Where slot overrides go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Written straight into the slots.
    Direct,
    /// Sent as `put-<slot>` messages, one per slot.
    Message,
}

impl Placement {
    pub(crate) fn context(self) -> &'static str {
        match self {
            Placement::Direct => "direct slot placement",
            Placement::Message => "message slot placement",
        }
    }
}

/// Variant selection for modify/duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationOptions {
    pub placement: Placement,
    /// Delay pattern matching until the whole operation is done.
    pub delay_matching: bool,
}

impl MutationOptions {
    /// `modify-instance` / `duplicate-instance`.
    pub const DIRECT: Self = Self {
        placement: Placement::Direct,
        delay_matching: true,
    };

    /// `message-modify-instance` / `message-duplicate-instance`.
    pub const MESSAGE: Self = Self {
        placement: Placement::Message,
        delay_matching: true,
    };

    /// The `active-` form: pattern matching proceeds after every write.
    pub fn active(self) -> Self {
        Self {
            delay_matching: false,
            ..self
        }
    }
}

impl Default for MutationOptions {
    fn default() -> Self {
        Self::DIRECT
    }
}

/// An evaluated slot override. `None` restores the slot's default.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotOverride {
    pub slot: Symbol,
    pub value: Option<Value>,
}

impl SlotOverride {
    pub fn set(slot: Symbol, value: Value) -> Self {
        Self { slot, value: Some(value) }
    }

    pub fn reset(slot: Symbol) -> Self {
        Self { slot, value: None }
    }
}

/// One-time authorization for a synthetic mutation send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Ticket(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MutationKind {
    Modify,
    Duplicate,
}

impl MutationKind {
    fn function(self) -> &'static str {
        match self {
            MutationKind::Modify => "modify-instance",
            MutationKind::Duplicate => "duplicate-instance",
        }
    }
}

/// Evaluated overrides plus the authorization for one synthetic send.
#[derive(Debug, Clone, PartialEq)]
pub struct OverrideBatch {
    ticket: Ticket,
    overrides: Rc<[SlotOverride]>,
}

impl OverrideBatch {
    pub fn overrides(&self) -> &[SlotOverride] {
        &self.overrides
    }
}

/// Outstanding mutation tickets.
#[derive(Debug, Default)]
pub(crate) struct TicketBook {
    next: u64,
    issued: FxHashMap<Ticket, MutationKind>,
}

impl TicketBook {
    fn issue(&mut self, kind: MutationKind) -> Ticket {
        self.next += 1;
        let ticket = Ticket(self.next);
        self.issued.insert(ticket, kind);
        ticket
    }

    /// Consumes a ticket issued for `kind`.
    fn redeem(&mut self, ticket: Ticket, kind: MutationKind) -> bool {
        if self.issued.get(&ticket) == Some(&kind) {
            self.issued.remove(&ticket);
            true
        } else {
            false
        }
    }

    fn revoke(&mut self, ticket: Ticket) {
        self.issued.remove(&ticket);
    }

    #[cfg(test)]
    fn outstanding(&self) -> usize {
        self.issued.len()
    }
}

impl Engine {
    /// Changes slots of an existing instance. Returns `TRUE` when every
    /// override was applied.
    pub fn modify_instance(&mut self, target: Value, overrides: Vec<SlotOverride>, options: MutationOptions) -> Value {
        self.begin_command();
        self.run_modify(target, overrides, options)
    }

    /// Copies an instance under a new name (a generated one when `to` is
    /// `None`). Returns the new instance name.
    pub fn duplicate_instance(
        &mut self,
        source: Value,
        to: Option<&str>,
        overrides: Vec<SlotOverride>,
        options: MutationOptions,
    ) -> Value {
        self.begin_command();
        let to = to.map(|name| self.symbols.intern(name));
        self.run_duplicate(source, to, overrides, options)
    }

    pub(crate) fn eval_modify(
        &mut self,
        target: &Action,
        overrides: &[OverrideExpr],
        options: MutationOptions,
        activation: &mut Activation,
    ) -> Value {
        let target = self.eval_action(target, activation);
        let Some(overrides) = self.evaluate_overrides(overrides, "modify-instance", activation) else {
            return Value::FALSE;
        };
        self.run_modify(target, overrides, options)
    }

    pub(crate) fn eval_duplicate(
        &mut self,
        source: &Action,
        to: Option<&Action>,
        overrides: &[OverrideExpr],
        options: MutationOptions,
        activation: &mut Activation,
    ) -> Value {
        let source = self.eval_action(source, activation);
        let to = match to.map(|expr| self.eval_action(expr, activation)) {
            None => None,
            Some(Value::Symbol(name) | Value::InstanceName(name)) => Some(name),
            Some(_) => {
                self.report(DispatchError::TypeError {
                    function: "duplicate-instance".to_string(),
                    expected: "an instance name for the copy",
                });
                return Value::FALSE;
            }
        };
        let Some(overrides) = self.evaluate_overrides(overrides, "duplicate-instance", activation) else {
            return Value::FALSE;
        };
        self.run_duplicate(source, to, overrides, options)
    }

    /// Evaluates override expressions in the caller's bindings, before any
    /// message is sent.
    fn evaluate_overrides(
        &mut self,
        exprs: &[OverrideExpr],
        function: &'static str,
        activation: &mut Activation,
    ) -> Option<Vec<SlotOverride>> {
        self.evaluation_error = false;
        let mut overrides = Vec::with_capacity(exprs.len());
        for (position, expr) in exprs.iter().enumerate() {
            let Value::Symbol(slot) = self.eval_action(&expr.slot, activation) else {
                self.report(DispatchError::InvalidSlotName {
                    function,
                    position: position + 1,
                });
                return None;
            };
            let values = self.eval_args(&expr.values, activation);
            if self.evaluation_error {
                return None;
            }
            overrides.push(SlotOverride {
                slot,
                value: collapse_values(values),
            });
        }
        Some(overrides)
    }

    fn run_modify(&mut self, target: Value, overrides: Vec<SlotOverride>, options: MutationOptions) -> Value {
        if options.delay_matching {
            self.delay_pattern_matching()
                .send_modify(target, overrides, options.placement)
        } else {
            self.send_modify(target, overrides, options.placement)
        }
    }

    fn run_duplicate(
        &mut self,
        source: Value,
        to: Option<Symbol>,
        overrides: Vec<SlotOverride>,
        options: MutationOptions,
    ) -> Value {
        if options.delay_matching {
            self.delay_pattern_matching()
                .send_duplicate(source, to, overrides, options.placement)
        } else {
            self.send_duplicate(source, to, overrides, options.placement)
        }
    }

    fn send_modify(&mut self, target: Value, overrides: Vec<SlotOverride>, placement: Placement) -> Value {
        let Some(id) = self.check_instance(&target, "modify-instance") else {
            return Value::FALSE;
        };
        let known = *self.symbols.known();
        let message = match placement {
            Placement::Direct => known.direct_modify,
            Placement::Message => known.message_modify,
        };
        let ticket = self.tickets.issue(MutationKind::Modify);
        let batch = OverrideBatch {
            ticket,
            overrides: overrides.into(),
        };
        let result = self.direct_message(message, id, vec![Value::Overrides(batch)]);
        self.tickets.revoke(ticket);
        result
    }

    fn send_duplicate(
        &mut self,
        source: Value,
        to: Option<Symbol>,
        overrides: Vec<SlotOverride>,
        placement: Placement,
    ) -> Value {
        let Some(id) = self.check_instance(&source, "duplicate-instance") else {
            return Value::FALSE;
        };
        let to = match to {
            Some(name) => name,
            None => self.instances.gensym(&mut self.symbols),
        };
        let known = *self.symbols.known();
        let message = match placement {
            Placement::Direct => known.direct_duplicate,
            Placement::Message => known.message_duplicate,
        };
        let ticket = self.tickets.issue(MutationKind::Duplicate);
        let batch = OverrideBatch {
            ticket,
            overrides: overrides.into(),
        };
        let result = self.direct_message(message, id, vec![Value::InstanceName(to), Value::Overrides(batch)]);
        self.tickets.revoke(ticket);
        result
    }

    /// Resolves the target of a mutation to a live instance.
    fn check_instance(&mut self, target: &Value, function: &'static str) -> Option<InstanceId> {
        let err = match target {
            Value::Instance(id) if self.instances.is_live(*id) => return Some(*id),
            Value::Instance(_) => DispatchError::StaleInstance { function },
            Value::InstanceName(name) | Value::Symbol(name) => match self.instances.find(*name) {
                Some(id) => return Some(id),
                None => DispatchError::NoSuchInstance {
                    name: self.name(*name),
                    function,
                },
            },
            _ => DispatchError::InstanceRequired { function },
        };
        self.report(err);
        None
    }

    /// Takes the override batch at `position` if its ticket is valid.
    fn redeem_batch(
        &mut self,
        activation: &Activation,
        position: usize,
        kind: MutationKind,
    ) -> Option<OverrideBatch> {
        if let Some(Value::Overrides(batch)) = activation.param(position) {
            if self.tickets.redeem(batch.ticket, kind) {
                return Some(batch.clone());
            }
        }
        let message = self
            .dispatch
            .current_message()
            .map(|message| self.name(message))
            .unwrap_or_default();
        self.report(DispatchError::UnauthorizedMutation {
            message,
            function: kind.function(),
        });
        None
    }

    /// Body of `direct-modify` / `message-modify`.
    pub(crate) fn modify_handler(&mut self, activation: &Activation, placement: Placement) -> Value {
        let Some(batch) = self.redeem_batch(activation, 1, MutationKind::Modify) else {
            return Value::FALSE;
        };
        let id = match self.active_instance(activation, "modify-instance") {
            Ok(id) => id,
            Err(err) => {
                self.report(err);
                return Value::FALSE;
            }
        };
        debug!(
            "modifying {} with {} override(s)",
            self.instance_label(id),
            batch.overrides().len()
        );
        Value::Boolean(self.place_overrides(id, batch.overrides(), placement, false))
    }

    /// Body of `direct-duplicate` / `message-duplicate`.
    pub(crate) fn duplicate_handler(&mut self, activation: &Activation, placement: Placement) -> Value {
        let Some(batch) = self.redeem_batch(activation, 2, MutationKind::Duplicate) else {
            return Value::FALSE;
        };
        let source = match self.active_instance(activation, "duplicate-instance") {
            Ok(id) => id,
            Err(err) => {
                self.report(err);
                return Value::FALSE;
            }
        };
        let new_name = match activation.param(1) {
            Some(Value::InstanceName(name) | Value::Symbol(name)) => *name,
            _ => {
                self.report(DispatchError::TypeError {
                    function: "duplicate-instance".to_string(),
                    expected: "an instance name for the copy",
                });
                return Value::FALSE;
            }
        };
        if new_name == self.instances.get(source).name {
            let name = self.name(new_name);
            self.report(DispatchError::DuplicateSameName { name });
            return Value::FALSE;
        }

        let class = self.instances.get(source).class;
        let Some(copy) = self.build_instance(new_name, class) else {
            return Value::FALSE;
        };
        self.instances.retain(copy);
        let mut ok = self.populate_copy(source, copy, batch.overrides(), placement);
        if ok && placement == Placement::Message {
            for slot in &mut self.instances.get_mut(copy).slots {
                slot.overridden = true;
            }
            ok = self.initialize_instance(copy);
        }
        self.instances.release(copy);

        if !ok || !self.instances.is_live(copy) {
            if self.instances.is_live(copy) {
                self.instances.quash(copy);
            }
            self.evaluation_error = true;
            return Value::FALSE;
        }
        for slot in &mut self.instances.get_mut(copy).slots {
            slot.overridden = false;
        }
        debug!("duplicated {} as {}", self.instance_label(source), self.instance_label(copy));
        Value::InstanceName(new_name)
    }

    /// Applies the overrides to the copy, then copies every other slot from
    /// the source.
    fn populate_copy(
        &mut self,
        source: InstanceId,
        copy: InstanceId,
        overrides: &[SlotOverride],
        placement: Placement,
    ) -> bool {
        if !self.place_overrides(copy, overrides, placement, true) {
            return false;
        }
        for index in 0..self.instances.get(copy).slots.len() {
            if !self.instances.is_live(copy) {
                return false;
            }
            if self.instances.get(copy).slots[index].overridden {
                continue;
            }
            if !self.instances.is_live(source) {
                self.report(DispatchError::StaleInstance {
                    function: "duplicate-instance",
                });
                return false;
            }
            let value = self.instances.get(source).slots[index].value.clone();
            if !self.place_slot_value(copy, index, Some(value), placement) {
                return false;
            }
        }
        true
    }
}
