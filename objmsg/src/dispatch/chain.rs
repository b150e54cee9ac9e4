//! Dispatch engine: walking a linked core.
//!
//! A send whose chain starts with an around handler runs that handler and
//! nothing else; the rest only runs if it calls the next handler. Any
//! other chain gets the automatic walk: every before handler, the first
//! primary, every after handler. Shadowed primaries run only through
//! call-next-handler from the primary above them.

use std::rc::Rc;

use tracing::{debug, info};

use crate::class::ClassId;
use crate::dispatch::context::Cursor;
use crate::engine::Engine;
use crate::error::DispatchError;
use crate::eval::Activation;
use crate::handler::{HandlerRef, Qualifier};
use crate::instance::InstanceId;
use crate::symbol::Symbol;
use crate::value::Value;

/// How an automatic walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PhaseWalk {
    /// Every applicable phase ran.
    Completed,
    /// A halt request stopped the walk between handlers.
    Halted,
}

impl Engine {
    /// Dispatches `message` with `args[0]` as the receiver.
    pub(crate) fn perform_message(&mut self, mut args: Vec<Value>, message: Symbol) -> Value {
        self.evaluation_error = false;
        if self.halt {
            return Value::FALSE;
        }
        let Some(receiver) = args.first_mut() else {
            return Value::FALSE;
        };
        let (class, instance) = match self.qualify_receiver(receiver) {
            Ok(qualified) => qualified,
            Err(err) => {
                self.report(err);
                return Value::FALSE;
            }
        };

        let chains = self.find_applicable_handlers(class, message);
        let core = match self.join_handler_links(chains, message, class) {
            Ok(core) => core,
            Err(err) => {
                self.report(err);
                return Value::FALSE;
            }
        };

        let result = {
            let mut frame = self.push_frame(message, core, Rc::from(args), instance);
            frame.watch_message(">>");
            let result = frame.run_core();
            frame.watch_message("<<");
            result
        };

        if self.evaluation_error {
            Value::FALSE
        } else {
            result
        }
    }

    /// Finds the class a receiver dispatches through. Instance names are
    /// replaced by the instance they name.
    fn qualify_receiver(&self, receiver: &mut Value) -> Result<(ClassId, Option<InstanceId>), DispatchError> {
        match *receiver {
            Value::Instance(id) => {
                if !self.instances.is_live(id) {
                    return Err(DispatchError::StaleInstance { function: "send" });
                }
                Ok((self.instances.get(id).class, Some(id)))
            }
            Value::InstanceName(name) => match self.instances.find(name) {
                Some(id) => {
                    *receiver = Value::Instance(id);
                    Ok((self.instances.get(id).class, Some(id)))
                }
                None => Err(DispatchError::NoSuchInstance {
                    name: self.name(name),
                    function: "send",
                }),
            },
            ref primitive => Ok((self.classes.primitive_class(primitive.value_type()), None)),
        }
    }

    fn run_core(&mut self) -> Value {
        let first = self.dispatch.top().and_then(|frame| frame.core.qualifier_at(Some(0)));
        if first == Some(Qualifier::Around) {
            self.dispatch.set_cursor(Cursor { current: None, next: Some(0) });
            self.dispatch.advance();
            return self.run_current_handler();
        }

        self.dispatch.set_cursor(Cursor { current: None, next: Some(0) });
        let (result, walk) = self.call_handlers();
        if walk == PhaseWalk::Halted {
            debug!("automatic walk halted");
        }
        result
    }

    /// Runs the befores, the first primary and the afters from the cursor's
    /// next position on.
    pub(crate) fn call_handlers(&mut self) -> (Value, PhaseWalk) {
        if self.halt {
            return (Value::FALSE, PhaseWalk::Halted);
        }

        let mut result = Value::FALSE;
        while self.dispatch.next_qualifier() == Some(Qualifier::Before) {
            self.dispatch.advance();
            self.run_current_handler();
            if self.halt {
                return (result, PhaseWalk::Halted);
            }
        }

        if self.dispatch.next_qualifier() == Some(Qualifier::Primary) {
            self.dispatch.advance();
            result = self.run_current_handler();
            if self.halt {
                return (result, PhaseWalk::Halted);
            }
            self.dispatch.skip_primaries();
        }

        while self.dispatch.next_qualifier() == Some(Qualifier::After) {
            self.dispatch.advance();
            self.run_current_handler();
            if self.halt {
                return (result, PhaseWalk::Halted);
            }
        }

        (result, PhaseWalk::Completed)
    }

    /// Whether call-next-handler is legal from the running handler.
    pub fn next_handler_available(&self) -> bool {
        let Some(frame) = self.dispatch.top() else {
            return false;
        };
        match frame.core.qualifier_at(frame.cursor.current) {
            Some(Qualifier::Around) => frame.cursor.next.is_some(),
            Some(Qualifier::Primary) => frame.core.qualifier_at(frame.cursor.next) == Some(Qualifier::Primary),
            _ => false,
        }
    }

    /// Runs the shadowed part of the chain. With `replacement` the called
    /// handlers see the receiver followed by those arguments instead of the
    /// current ones.
    pub(crate) fn call_next_handler(&mut self, replacement: Option<Vec<Value>>) -> Value {
        self.evaluation_error = false;
        if self.halt {
            return Value::FALSE;
        }
        if !self.next_handler_available() {
            self.report(DispatchError::ShadowedHandlerUnavailable);
            return Value::FALSE;
        }

        let replacement = replacement.map(|rest| {
            let receiver = self
                .dispatch
                .current_args()
                .and_then(|args| args.first().cloned())
                .unwrap_or(Value::FALSE);
            std::iter::once(receiver).chain(rest).collect::<Rc<[Value]>>()
        });

        let mut scope = self.save_cursor(replacement);
        if scope.dispatch.current_qualifier() == Some(Qualifier::Around) {
            if scope.dispatch.next_qualifier() == Some(Qualifier::Around) {
                scope.dispatch.advance();
                scope.run_current_handler()
            } else {
                let (result, walk) = scope.call_handlers();
                if walk == PhaseWalk::Halted {
                    debug!("shadowed walk halted");
                }
                result
            }
        } else {
            scope.dispatch.advance();
            scope.run_current_handler()
        }
    }

    /// Checks arity and evaluates the body of the current handler.
    fn run_current_handler(&mut self) -> Value {
        let (Some(link), Some(args)) = (self.dispatch.current_link(), self.dispatch.current_args()) else {
            return Value::FALSE;
        };
        let Some(handler) = self.classes.handler(link.handler) else {
            return Value::FALSE;
        };
        let params = handler.params;
        let actions = Rc::clone(&handler.actions);
        let local_count = handler.local_count;
        let trace = handler.trace;

        if !params.accepts(args.len()) {
            let err = DispatchError::ArityMismatch {
                handler: self.handler_label(link.handler),
                expected: params.min_args(),
                rest: params.rest,
            };
            self.report(err);
            return Value::FALSE;
        }

        if trace {
            self.watch_handler(">>", link.handler);
        }
        let mut activation = Activation::for_handler(&args, params, local_count);
        let result = self.eval_actions(&actions, &mut activation);
        if trace {
            self.watch_handler("<<", link.handler);
        }
        result
    }

    /// `<message> <qualifier> in class <class>`, or `None` for a handler
    /// that has been deleted.
    pub fn describe_handler(&self, handler: HandlerRef) -> Option<String> {
        let entry = self.classes.handler(handler)?;
        Some(format!(
            "{} {} in class {}",
            self.symbols.resolve(entry.message),
            entry.qualifier,
            self.class_name(handler.class)
        ))
    }

    pub(crate) fn handler_label(&self, handler: HandlerRef) -> String {
        self.describe_handler(handler).unwrap_or_else(|| {
            format!("deleted handler #{} in class {}", handler.index, self.class_name(handler.class))
        })
    }

    fn watch_message(&self, direction: &str) {
        if !self.config.watch.messages {
            return;
        }
        let Some(frame) = self.dispatch.top() else {
            return;
        };
        let args: Vec<String> = frame.args().iter().map(|arg| self.render(arg)).collect();
        info!(
            target: "objmsg::watch",
            "MSG {direction} {} ED:{} ({})",
            self.symbols.resolve(frame.message),
            self.dispatch.depth(),
            args.join(" ")
        );
    }

    fn watch_handler(&self, direction: &str, handler: HandlerRef) {
        info!(
            target: "objmsg::watch",
            "HND {direction} {} ED:{}",
            self.handler_label(handler),
            self.dispatch.depth()
        );
    }
}
