//! Dispatch errors.
//!
//! Runtime failures never unwind through handler bodies. The engine logs
//! them, appends them to its diagnostic stream, raises the evaluation-error
//! flag and hands `FALSE` back to the caller. Definition-time operations
//! additionally return them as `Err`.

use thiserror::Error;

/// Every condition the dispatch core reports.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("no applicable primary message-handlers found for {message} (receiver class {class})")]
    NoPrimaryHandler { message: String, class: String },

    #[error("no such instance {name} in function {function}")]
    NoSuchInstance { name: String, function: &'static str },

    #[error("{function}: instance was deleted")]
    StaleInstance { function: &'static str },

    #[error("shadowed message-handlers not applicable in current context")]
    ShadowedHandlerUnavailable,

    #[error("{function} may only be called from within message-handlers")]
    NotInHandler { function: &'static str },

    #[error("{function} may only be applied to instances")]
    InstanceRequired { function: &'static str },

    #[error("message-handler {handler} expected {} {expected} argument(s)", arity_bound(.rest))]
    ArityMismatch { handler: String, expected: usize, rest: bool },

    #[error("parameter {index} is not bound in this context")]
    UnboundParameter { index: usize },

    #[error("local variable {index} is not bound in this context")]
    UnboundLocal { index: usize },

    #[error("{context}: slot {slot} does not exist in class {class}")]
    SlotNotFound { context: String, slot: String, class: String },

    #[error("slot {slot} of class {owner} is private and not visible to handlers of class {class}")]
    PrivateSlot { slot: String, owner: String, class: String },

    #[error("write access denied for slot {slot} of {target}")]
    SlotWriteDenied { slot: String, target: String },

    #[error("static reference to slot {slot} of class {class} does not apply to {instance} of {instance_class}")]
    EarlySlotBinding { slot: String, class: String, instance: String, instance_class: String },

    #[error("{value} violates the type constraints of slot {slot}")]
    ConstraintViolation { value: String, slot: String },

    #[error("{value} illegal for single-field slot {slot}")]
    Cardinality { value: String, slot: String },

    #[error("expected a slot name symbol for override {position} of {function}")]
    InvalidSlotName { function: &'static str, position: usize },

    #[error("{message} message valid only in {function}")]
    UnauthorizedMutation { message: String, function: &'static str },

    #[error("instance copy must have a different name in duplicate-instance ({name})")]
    DuplicateSameName { name: String },

    #[error("unable to delete old instance {name}")]
    ReplaceFailed { name: String },

    #[error("init-slots not valid for {instance} outside its initialization")]
    InitOutsideInitialization { instance: String },

    #[error("an error occurred during the initialization of instance {instance}")]
    InitializationFailed { instance: String },

    #[error("unable to change message-handler(s) of class {class} while they are executing")]
    HandlersExecuting { class: String },

    #[error("system message-handler {handler} cannot be modified")]
    SystemHandlerProtected { handler: String },

    #[error("message-handler {message} {qualifier} not found in class {class}")]
    HandlerNotFound { message: String, qualifier: String, class: String },

    #[error("handler #{index} of class {class} no longer exists")]
    UnknownHandler { index: usize, class: String },

    #[error("constructs are frozen and cannot be modified")]
    ConstructsFrozen,

    #[error("unknown class {name}")]
    UnknownClass { name: String },

    #[error("class {name} is already defined")]
    DuplicateClass { name: String },

    #[error("unknown function {name}")]
    UnknownFunction { name: String },

    #[error("function {function} expected {expected}")]
    TypeError { function: String, expected: &'static str },
}

fn arity_bound(rest: &bool) -> &'static str {
    if *rest {
        "at least"
    } else {
        "exactly"
    }
}

/// Result alias for definition-time operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Engine-wide error stream.
#[derive(Debug, Default)]
pub struct Diagnostics {
    errors: Vec<DispatchError>,
}

impl Diagnostics {
    pub fn push(&mut self, error: DispatchError) {
        self.errors.push(error);
    }

    pub fn errors(&self) -> &[DispatchError] {
        &self.errors
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Removes and returns everything reported so far.
    pub fn take(&mut self) -> Vec<DispatchError> {
        std::mem::take(&mut self.errors)
    }
}
