//! Handler body actions.
//!
//! An [`Action`] tree is what a front end hands the engine for a handler
//! body or a top-level expression. Slot references written as
//! `?self:<slot>` arrive as [`Action::SelfSlot`] / [`Action::BindSelfSlot`]
//! and are rewritten into compiled [`Action::SlotGet`] / [`Action::SlotPut`]
//! when the handler is defined.

use crate::class::{ClassId, SlotId};
use crate::handler::{Params, Qualifier};
use crate::mutate::MutationOptions;
use crate::symbol::Symbol;
use crate::system::SystemAction;
use crate::value::Value;

/// A compiled `?self:<slot>` reference.
///
/// `class` is the class that defines the slot descriptor the reference was
/// resolved against; `slot` is the registry-wide slot-name id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotRef {
    pub class: ClassId,
    pub slot: SlotId,
}

/// One expression of a handler body.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Const(Value),
    /// Positional parameter; 0 is the receiver. A rest parameter is bound
    /// as one multifield after the fixed ones.
    Param(usize),
    Local(usize),
    Bind(usize, Box<Action>),
    If {
        condition: Box<Action>,
        then: Vec<Action>,
        otherwise: Vec<Action>,
    },
    Call {
        function: Symbol,
        args: Vec<Action>,
    },
    Send {
        receiver: Box<Action>,
        message: Symbol,
        args: Vec<Action>,
    },
    /// Unresolved `?self:<slot>` read.
    SelfSlot(Symbol),
    /// Unresolved `(bind ?self:<slot> ...)` write.
    BindSelfSlot(Symbol, Vec<Action>),
    SlotGet(SlotRef),
    SlotPut(SlotRef, Vec<Action>),
    /// `(get <slot>)`, resolved by name at run time.
    DynamicGet(Symbol),
    /// `(put <slot> ...)`, resolved by name at run time.
    DynamicPut(Symbol, Vec<Action>),
    CallNextHandler,
    OverrideNextHandler(Vec<Action>),
    NextHandlerAvailable,
    Modify {
        target: Box<Action>,
        overrides: Vec<OverrideExpr>,
        options: MutationOptions,
    },
    Duplicate {
        source: Box<Action>,
        to: Option<Box<Action>>,
        overrides: Vec<OverrideExpr>,
        options: MutationOptions,
    },
    System(SystemAction),
}

impl Action {
    pub fn int(n: i64) -> Self {
        Action::Const(Value::Integer(n))
    }

    pub fn string(text: &str) -> Self {
        Action::Const(Value::string(text))
    }

    pub fn symbol(symbol: Symbol) -> Self {
        Action::Const(Value::Symbol(symbol))
    }

    /// The receiver of the current handler.
    pub fn receiver() -> Self {
        Action::Param(0)
    }

    pub fn call(function: Symbol, args: Vec<Action>) -> Self {
        Action::Call { function, args }
    }

    pub fn send(receiver: Action, message: Symbol, args: Vec<Action>) -> Self {
        Action::Send {
            receiver: Box::new(receiver),
            message,
            args,
        }
    }

    pub fn bind(local: usize, value: Action) -> Self {
        Action::Bind(local, Box::new(value))
    }

    pub fn if_else(condition: Action, then: Vec<Action>, otherwise: Vec<Action>) -> Self {
        Action::If {
            condition: Box::new(condition),
            then,
            otherwise,
        }
    }

    pub fn modify(target: Action, overrides: Vec<OverrideExpr>, options: MutationOptions) -> Self {
        Action::Modify {
            target: Box::new(target),
            overrides,
            options,
        }
    }

    pub fn duplicate(
        source: Action,
        to: Option<Action>,
        overrides: Vec<OverrideExpr>,
        options: MutationOptions,
    ) -> Self {
        Action::Duplicate {
            source: Box::new(source),
            to: to.map(Box::new),
            overrides,
            options,
        }
    }
}

/// An unevaluated slot override of modify/duplicate.
///
/// The slot expression must evaluate to a symbol. No value expressions
/// means "reset to the default"; several are collected into a multifield.
#[derive(Debug, Clone, PartialEq)]
pub struct OverrideExpr {
    pub slot: Action,
    pub values: Vec<Action>,
}

impl OverrideExpr {
    pub fn new(slot: Symbol, values: Vec<Action>) -> Self {
        Self {
            slot: Action::symbol(slot),
            values,
        }
    }
}

/// A handler definition as produced by a front end.
#[derive(Debug, Clone)]
pub struct HandlerDef {
    pub message: Symbol,
    pub qualifier: Qualifier,
    pub params: Params,
    pub local_count: usize,
    pub actions: Vec<Action>,
}

impl HandlerDef {
    pub fn new(message: Symbol, qualifier: Qualifier) -> Self {
        Self {
            message,
            qualifier,
            params: Params::default(),
            local_count: 0,
            actions: Vec::new(),
        }
    }

    pub fn params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn locals(mut self, count: usize) -> Self {
        self.local_count = count;
        self
    }

    pub fn body(mut self, actions: Vec<Action>) -> Self {
        self.actions = actions;
        self
    }
}
