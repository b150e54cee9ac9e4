//! # Message Dispatch
//!
//! A send goes through four steps:
//!
//! 1. **Qualify** the receiver: live instance, instance name, or primitive
//!    value dispatching through its system class.
//! 2. **Resolve** the applicable handlers along the class precedence list
//!    ([`resolve`]).
//! 3. **Link** them into one core: arounds, befores, primaries, afters.
//! 4. **Walk** the core ([`chain`]), then tear it down and restore the
//!    caller's context ([`context`]).
//!
//! [`send`] holds the public entry points and [`preview`] renders a core
//! without running it.

pub(crate) mod chain;
pub(crate) mod context;
pub(crate) mod preview;
pub(crate) mod resolve;
pub(crate) mod send;

pub use context::DispatchStack;
