//! # objmsg
//!
//! Message dispatch for the object system of a forward-chaining rule engine.
//!
//! A send to an instance (or to a primitive value) collects every handler
//! for the message along the receiver's class precedence, links them into
//! one chain of around, before, primary and after handlers, and walks that
//! chain. Handlers can pass control to shadowed handlers, replace the
//! arguments those see, and send further messages; each nested send gets
//! its own frame on the engine's dispatch stack.
//!
//! On top of dispatch sit the instance mutation protocol
//! (`modify-instance`, `duplicate-instance` and their message-based forms),
//! compiled `?self:<slot>` access, instance creation and deletion, and
//! handler definition.
//!
//! ## Modules
//!
//! - [`engine`]: the [`Engine`] that owns everything
//! - [`dispatch`]: resolution, linking, the dispatch walk and send entry points
//! - [`mutate`]: modify and duplicate
//! - `slot_access`: early-bound and dynamic slot access
//! - [`class`], [`handler`], [`instance`]: the data model
//! - [`config`]: TOML configuration

pub mod action;
mod builtins;
pub mod class;
pub mod config;
mod define;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod eval;
pub mod handler;
pub mod instance;
mod lifecycle;
pub mod mutate;
pub mod pattern;
mod slot_access;
pub mod symbol;
pub mod system;
pub mod value;

pub use action::{Action, HandlerDef, OverrideExpr, SlotRef};
pub use class::{Accessors, ClassId, SlotSpec};
pub use config::Config;
pub use engine::Engine;
pub use error::{DispatchError, DispatchResult};
pub use eval::Activation;
pub use handler::{HandlerRef, Params, Qualifier};
pub use instance::InstanceId;
pub use mutate::{MutationOptions, Placement, SlotOverride};
pub use pattern::PatternMatchHook;
pub use symbol::Symbol;
pub use value::{Value, ValueType};
