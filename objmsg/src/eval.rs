//! Action evaluation.
//!
//! Just enough of an evaluator to run handler bodies: constants,
//! parameters, locals, conditionals, function calls and sends, plus the
//! handler-only forms that the dispatch core implements.

use crate::action::Action;
use crate::engine::Engine;
use crate::error::DispatchError;
use crate::handler::Params;
use crate::value::Value;

/// Variable bindings of one handler invocation or top-level command.
#[derive(Debug, Clone, Default)]
pub struct Activation {
    params: Vec<Value>,
    locals: Vec<Value>,
}

impl Activation {
    /// Bindings for a top-level command: no parameters, locals on demand.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds handler parameters. The receiver is parameter 0; extra
    /// arguments collapse into one multifield after the fixed ones.
    pub(crate) fn for_handler(args: &[Value], params: Params, local_count: usize) -> Self {
        let fixed = (params.fixed + 1).min(args.len());
        let mut bound: Vec<Value> = args[..fixed].to_vec();
        if params.rest {
            bound.push(Value::multifield(args[fixed..].iter().cloned()));
        }
        Self {
            params: bound,
            locals: vec![Value::FALSE; local_count],
        }
    }

    pub fn receiver(&self) -> Option<&Value> {
        self.params.first()
    }

    /// Parameter `index`; 0 is the receiver.
    pub fn param(&self, index: usize) -> Option<&Value> {
        self.params.get(index)
    }

    pub fn local(&self, index: usize) -> Option<&Value> {
        self.locals.get(index)
    }

    fn set_local(&mut self, index: usize, value: Value) {
        if index >= self.locals.len() {
            self.locals.resize(index + 1, Value::FALSE);
        }
        self.locals[index] = value;
    }
}

impl Engine {
    /// Evaluates a top-level expression.
    pub fn eval(&mut self, action: &Action) -> Value {
        self.eval_in(action, &mut Activation::new())
    }

    /// Evaluates a top-level expression against caller-held bindings.
    pub fn eval_in(&mut self, action: &Action, activation: &mut Activation) -> Value {
        self.begin_command();
        self.eval_action(action, activation)
    }

    /// Evaluates a sequence, yielding the last value. Stops early on halt.
    pub(crate) fn eval_actions(&mut self, actions: &[Action], activation: &mut Activation) -> Value {
        let mut last = Value::FALSE;
        for action in actions {
            if self.halt {
                break;
            }
            last = self.eval_action(action, activation);
        }
        last
    }

    pub(crate) fn eval_args(&mut self, args: &[Action], activation: &mut Activation) -> Vec<Value> {
        args.iter().map(|arg| self.eval_action(arg, activation)).collect()
    }

    pub(crate) fn eval_action(&mut self, action: &Action, activation: &mut Activation) -> Value {
        match action {
            Action::Const(value) => value.clone(),
            Action::Param(index) => match activation.params.get(*index) {
                Some(value) => value.clone(),
                None => {
                    self.report(DispatchError::UnboundParameter { index: *index });
                    Value::FALSE
                }
            },
            Action::Local(index) => match activation.locals.get(*index) {
                Some(value) => value.clone(),
                None => {
                    self.report(DispatchError::UnboundLocal { index: *index });
                    Value::FALSE
                }
            },
            Action::Bind(index, expr) => {
                let value = self.eval_action(expr, activation);
                activation.set_local(*index, value.clone());
                value
            }
            Action::If {
                condition,
                then,
                otherwise,
            } => {
                if self.eval_action(condition, activation).is_false() {
                    self.eval_actions(otherwise, activation)
                } else {
                    self.eval_actions(then, activation)
                }
            }
            Action::Call { function, args } => {
                let values = self.eval_args(args, activation);
                match self.functions.get(function).cloned() {
                    Some(native) => native(self, &values),
                    None => {
                        let name = self.name(*function);
                        self.report(DispatchError::UnknownFunction { name });
                        Value::FALSE
                    }
                }
            }
            Action::Send {
                receiver,
                message,
                args,
            } => {
                self.evaluation_error = false;
                let mut values = Vec::with_capacity(args.len() + 1);
                values.push(self.eval_action(receiver, activation));
                values.extend(self.eval_args(args, activation));
                if self.evaluation_error {
                    return Value::FALSE;
                }
                self.perform_message(values, *message)
            }
            Action::SelfSlot(_) | Action::BindSelfSlot(..) => {
                self.report(DispatchError::NotInHandler { function: "?self" });
                Value::FALSE
            }
            Action::SlotGet(slot) => self.handler_slot_get(*slot, activation),
            Action::SlotPut(slot, values) => self.handler_slot_put(*slot, values, activation),
            Action::DynamicGet(slot) => self.dynamic_slot_get(*slot, activation),
            Action::DynamicPut(slot, values) => self.dynamic_slot_put(*slot, values, activation),
            Action::CallNextHandler => self.call_next_handler(None),
            Action::OverrideNextHandler(args) => {
                self.evaluation_error = false;
                let values = self.eval_args(args, activation);
                if self.evaluation_error {
                    return Value::FALSE;
                }
                self.call_next_handler(Some(values))
            }
            Action::NextHandlerAvailable => Value::Boolean(self.next_handler_available()),
            Action::Modify {
                target,
                overrides,
                options,
            } => self.eval_modify(target, overrides, *options, activation),
            Action::Duplicate {
                source,
                to,
                overrides,
                options,
            } => self.eval_duplicate(source, to.as_deref(), overrides, *options, activation),
            Action::System(system) => self.run_system_action(*system, activation),
        }
    }
}
