//! Send entry points.

use crate::engine::Engine;
use crate::instance::InstanceId;
use crate::symbol::Symbol;
use crate::value::Value;

impl Engine {
    /// Sends `message` to a known instance.
    ///
    /// This is the path the engine itself uses for system messages.
    pub fn direct_message(&mut self, message: Symbol, instance: InstanceId, args: Vec<Value>) -> Value {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(Value::Instance(instance));
        full.extend(args);
        self.perform_message(full, message)
    }

    /// Sends a message by name to any receiver: an instance, an instance
    /// name or a primitive value.
    pub fn send(&mut self, receiver: Value, message: &str, args: Vec<Value>) -> Value {
        let message = self.symbols.intern(message);
        self.send_symbol(receiver, message, args)
    }

    /// Like [`Engine::send`] with an interned message name.
    pub fn send_symbol(&mut self, receiver: Value, message: Symbol, args: Vec<Value>) -> Value {
        self.begin_command();
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(receiver);
        full.extend(args);
        self.perform_message(full, message)
    }

    /// Sends a message to the instance bound to `name`.
    pub fn send_to(&mut self, name: &str, message: &str, args: Vec<Value>) -> Value {
        let name = self.symbols.intern(name);
        self.send(Value::InstanceName(name), message, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, HandlerDef};
    use crate::error::DispatchError;
    use crate::handler::{Params, Qualifier};

    #[test]
    fn test_primitive_receivers_dispatch_through_system_classes() {
        let mut engine = Engine::new();
        let integer = engine.find_class("INTEGER").unwrap();
        let double = engine.intern("double");
        let plus = engine.intern("+");
        engine
            .define_handler(
                integer,
                HandlerDef::new(double, Qualifier::Primary)
                    .body(vec![Action::call(plus, vec![Action::receiver(), Action::receiver()])]),
            )
            .unwrap();

        assert_eq!(engine.send(Value::Integer(21), "double", vec![]), Value::Integer(42));
        assert_eq!(engine.send(Value::string("x"), "double", vec![]), Value::FALSE);
        assert!(matches!(
            engine.diagnostics().last(),
            Some(DispatchError::NoPrimaryHandler { .. })
        ));
    }

    #[test]
    fn test_unknown_instance_name() {
        let mut engine = Engine::new();
        assert_eq!(engine.send_to("ghost", "print", vec![]), Value::FALSE);
        assert!(engine.evaluation_error());
        assert!(matches!(
            engine.diagnostics().last(),
            Some(DispatchError::NoSuchInstance { function: "send", .. })
        ));
    }

    #[test]
    fn test_arity_is_checked_before_running() {
        let mut engine = Engine::new();
        let number = engine.find_class("NUMBER").unwrap();
        let add = engine.intern("add");
        let plus = engine.intern("+");
        engine
            .define_handler(
                number,
                HandlerDef::new(add, Qualifier::Primary)
                    .params(Params::fixed(1))
                    .body(vec![Action::call(plus, vec![Action::Param(0), Action::Param(1)])]),
            )
            .unwrap();

        assert_eq!(engine.send(Value::Integer(1), "add", vec![Value::Integer(2)]), Value::Integer(3));
        assert_eq!(engine.send(Value::Integer(1), "add", vec![]), Value::FALSE);
        assert!(matches!(
            engine.diagnostics().last(),
            Some(DispatchError::ArityMismatch { expected: 2, rest: false, .. })
        ));
    }
}
