//! System message handlers.
//!
//! `USER` carries the primary handlers every user instance starts with:
//! `init`, `delete`, `create`, `print` and the four synthetic mutation
//! messages. Their bodies are a single [`SystemAction`] so they can be
//! wrapped, shadowed and traced like user handlers, but never redefined or
//! deleted.
//!
//! Classes also get `get-<slot>` and `put-<slot>` accessors for the slots
//! they declare, unless the configuration or the slot turns them off.

use tracing::info;

use crate::action::{Action, HandlerDef, SlotRef};
use crate::class::{Accessors, ClassId, SlotAccess};
use crate::engine::Engine;
use crate::eval::Activation;
use crate::handler::{Params, Qualifier};
use crate::instance::InstanceId;
use crate::mutate::Placement;
use crate::value::Value;

/// Built-in handler bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemAction {
    /// `init`: fills slots that no override supplied.
    InitSlots,
    /// `delete`: removes the receiver.
    Delete,
    /// `create`: a hook; does nothing.
    Create,
    /// `print`: logs and answers the receiver's slots.
    Print,
    Modify(Placement),
    Duplicate(Placement),
    /// A generated `put-<slot>` accessor.
    PutAccessor(SlotRef),
}

impl Engine {
    pub(crate) fn install_system_handlers(&mut self) {
        let user = self.classes.user();
        let known = *self.symbols.known();
        let handlers = [
            (known.init, 0, SystemAction::InitSlots),
            (known.delete, 0, SystemAction::Delete),
            (known.create, 0, SystemAction::Create),
            (known.print, 0, SystemAction::Print),
            (known.direct_modify, 1, SystemAction::Modify(Placement::Direct)),
            (known.message_modify, 1, SystemAction::Modify(Placement::Message)),
            (known.direct_duplicate, 2, SystemAction::Duplicate(Placement::Direct)),
            (known.message_duplicate, 2, SystemAction::Duplicate(Placement::Message)),
        ];
        for (message, params, action) in handlers {
            let def = HandlerDef::new(message, Qualifier::Primary)
                .params(Params::fixed(params))
                .body(vec![Action::System(action)]);
            self.insert_handler(user, def, true);
        }
    }

    /// Generates accessors for the slots `class` declares.
    pub(crate) fn install_accessors(&mut self, class: ClassId) {
        if !self.config.classes.create_accessors {
            return;
        }
        let slots: Vec<_> = self
            .classes
            .class(class)
            .direct_slots()
            .iter()
            .map(|slot| (slot.name, slot.id, slot.access, slot.accessors, slot.override_message))
            .collect();
        for (name, id, access, accessors, put) in slots {
            let slot = SlotRef { class, slot: id };
            if accessors.contains(Accessors::READ) {
                let get = self.symbols.intern(&format!("get-{}", self.symbols.resolve(name)));
                let def = HandlerDef::new(get, Qualifier::Primary).body(vec![Action::SlotGet(slot)]);
                self.insert_handler(class, def, false);
            }
            if accessors.contains(Accessors::WRITE) && access != SlotAccess::ReadOnly {
                let def = HandlerDef::new(put, Qualifier::Primary)
                    .params(Params::with_rest(0))
                    .body(vec![Action::System(SystemAction::PutAccessor(slot))]);
                self.insert_handler(class, def, false);
            }
        }
    }

    pub(crate) fn run_system_action(&mut self, action: SystemAction, activation: &mut Activation) -> Value {
        let function = match action {
            SystemAction::Modify(placement) => return self.modify_handler(activation, placement),
            SystemAction::Duplicate(placement) => return self.duplicate_handler(activation, placement),
            SystemAction::PutAccessor(slot) => return self.put_accessor(slot, activation),
            SystemAction::Create => return Value::TRUE,
            SystemAction::InitSlots => "init-slots",
            SystemAction::Delete => "delete-instance",
            SystemAction::Print => "print",
        };
        let id = match self.active_instance(activation, function) {
            Ok(id) => id,
            Err(err) => {
                self.report(err);
                return Value::FALSE;
            }
        };
        match action {
            SystemAction::InitSlots => self.init_slots(id),
            SystemAction::Delete => {
                self.instances.quash(id);
                Value::TRUE
            }
            _ => {
                let text = self.describe_instance(id);
                info!(target: "objmsg::print", "{text}");
                Value::String(text.into())
            }
        }
    }

    /// `[name] of Class (slot value) ...`.
    pub fn describe_instance(&self, id: InstanceId) -> String {
        let instance = self.instances.get(id);
        let class = self.classes.class(instance.class);
        let mut text = format!("{} of {}", self.instance_label(id), self.name(class.name));
        for (descriptor, slot) in class.slots().iter().zip(instance.slots()) {
            let value = match &slot.value {
                Value::Multifield(items) => {
                    let items: Vec<String> = items.iter().map(|item| self.render(item)).collect();
                    items.join(" ")
                }
                other => self.render(other),
            };
            let name = self.name(descriptor.name);
            if value.is_empty() {
                text.push_str(&format!(" ({name})"));
            } else {
                text.push_str(&format!(" ({name} {value})"));
            }
        }
        text
    }
}
