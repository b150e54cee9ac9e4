//! The engine: one owner for classes, instances, handlers and the dispatch
//! stack.
//!
//! Operations are spread over several modules as `impl Engine` blocks:
//! dispatch in [`crate::dispatch`], the mutation protocol in
//! [`crate::mutate`], slot access in [`crate::slot_access`], definitions in
//! [`crate::define`].

use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::{debug, error};

use crate::class::{ClassId, ClassRegistry};
use crate::config::Config;
use crate::dispatch::DispatchStack;
use crate::error::{Diagnostics, DispatchError, DispatchResult};
use crate::instance::{InstanceId, InstanceStore};
use crate::mutate::TicketBook;
use crate::pattern::{DelayFlag, PatternMatchHook};
use crate::symbol::{Symbol, SymbolTable};
use crate::value::Value;

/// A function callable from handler bodies through [`crate::Action::Call`].
pub type NativeFn = Rc<dyn Fn(&mut Engine, &[Value]) -> Value>;

/// The message-dispatch engine.
pub struct Engine {
    pub(crate) config: Config,
    pub(crate) symbols: SymbolTable,
    pub(crate) classes: ClassRegistry,
    pub(crate) instances: InstanceStore,
    pub(crate) dispatch: DispatchStack,
    pub(crate) functions: FxHashMap<Symbol, NativeFn>,
    pub(crate) pattern: Box<dyn PatternMatchHook>,
    pub(crate) tickets: TicketBook,
    diagnostics: Diagnostics,
    /// Raised by every reported error; cleared at the start of each send
    /// and each call-next-handler.
    pub(crate) evaluation_error: bool,
    /// Cooperative cancellation, polled between handlers and actions.
    pub(crate) halt: bool,
    pub(crate) frozen: bool,
}

impl Engine {
    /// Creates an engine with the default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates an engine with the system classes and handlers installed.
    pub fn with_config(config: Config) -> Self {
        let mut symbols = SymbolTable::new();
        let classes = ClassRegistry::new(&mut symbols);
        let mut engine = Self {
            config,
            symbols,
            classes,
            instances: InstanceStore::default(),
            dispatch: DispatchStack::default(),
            functions: FxHashMap::default(),
            pattern: Box::new(DelayFlag::default()),
            tickets: TicketBook::default(),
            diagnostics: Diagnostics::default(),
            evaluation_error: false,
            halt: false,
            frozen: false,
        };
        engine.install_system_handlers();
        crate::builtins::install(&mut engine);
        engine
    }

    /// Replaces the pattern-matching collaborator.
    pub fn with_pattern_hook(mut self, hook: Box<dyn PatternMatchHook>) -> Self {
        self.pattern = hook;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn intern(&mut self, name: &str) -> Symbol {
        self.symbols.intern(name)
    }

    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    pub fn instances(&self) -> &InstanceStore {
        &self.instances
    }

    pub fn find_class(&self, name: &str) -> Option<ClassId> {
        self.symbols.lookup(name).and_then(|name| self.classes.find(name))
    }

    pub(crate) fn class_named(&self, name: &str) -> DispatchResult<ClassId> {
        self.find_class(name).ok_or_else(|| DispatchError::UnknownClass {
            name: name.to_string(),
        })
    }

    pub fn find_instance(&self, name: &str) -> Option<InstanceId> {
        self.symbols.lookup(name).and_then(|name| self.instances.find(name))
    }

    /// Reads a slot of a live instance by name.
    pub fn slot_value(&self, instance: InstanceId, slot: &str) -> Option<Value> {
        if !self.instances.is_live(instance) {
            return None;
        }
        let instance = self.instances.get(instance);
        let slot = self.classes.slot_id(self.symbols.lookup(slot)?)?;
        let index = self.classes.class(instance.class).slot_index(slot)?;
        Some(instance.slots[index].value.clone())
    }

    /// Registers a function callable from handler bodies.
    pub fn define_function(&mut self, name: &str, function: impl Fn(&mut Engine, &[Value]) -> Value + 'static) {
        let name = self.symbols.intern(name);
        self.functions.insert(name, Rc::new(function));
    }

    pub fn diagnostics(&self) -> &[DispatchError] {
        self.diagnostics.errors()
    }

    pub fn take_diagnostics(&mut self) -> Vec<DispatchError> {
        self.diagnostics.take()
    }

    /// Whether the last send or command ended with an error.
    pub fn evaluation_error(&self) -> bool {
        self.evaluation_error
    }

    /// Asks every running send to stop at its next check.
    pub fn request_halt(&mut self) {
        debug!("halt requested at dispatch depth {}", self.dispatch.depth());
        self.halt = true;
    }

    pub fn clear_halt(&mut self) {
        self.halt = false;
    }

    pub fn is_halted(&self) -> bool {
        self.halt
    }

    /// Freezes or thaws handler definitions.
    pub fn set_frozen(&mut self, frozen: bool) {
        self.frozen = frozen;
    }

    pub fn pattern_matching_delayed(&self) -> bool {
        self.pattern.is_delayed()
    }

    /// Sets the delay flag of the pattern-matching collaborator, returning
    /// the previous value.
    pub fn set_delay_pattern_matching(&mut self, delay: bool) -> bool {
        self.pattern.set_delay(delay)
    }

    /// Number of sends currently on the dispatch stack.
    pub fn dispatch_depth(&self) -> usize {
        self.dispatch.depth()
    }

    /// Logs an error, records it and raises the evaluation-error flag.
    pub(crate) fn report(&mut self, err: DispatchError) {
        error!(target: "objmsg", "{err}");
        self.diagnostics.push(err);
        self.evaluation_error = true;
    }

    /// Resets per-command flags when entered from outside any send.
    pub(crate) fn begin_command(&mut self) {
        if self.dispatch.depth() == 0 {
            self.halt = false;
            self.evaluation_error = false;
        }
    }

    pub(crate) fn name(&self, symbol: Symbol) -> String {
        self.symbols.resolve(symbol).to_string()
    }

    pub(crate) fn class_name(&self, class: ClassId) -> String {
        self.name(self.classes.class(class).name)
    }

    pub(crate) fn instance_label(&self, instance: InstanceId) -> String {
        format!("[{}]", self.symbols.resolve(self.instances.get(instance).name))
    }

    /// Renders a value the way the watch output and `print` show it.
    pub fn render(&self, value: &Value) -> String {
        match value {
            Value::Symbol(symbol) => self.name(*symbol),
            Value::String(text) => format!("\"{text}\""),
            Value::Integer(n) => n.to_string(),
            Value::Float(x) => format!("{x:?}"),
            Value::Boolean(true) => "TRUE".to_string(),
            Value::Boolean(false) => "FALSE".to_string(),
            Value::Multifield(items) => {
                let items: Vec<String> = items.iter().map(|item| self.render(item)).collect();
                format!("({})", items.join(" "))
            }
            Value::InstanceName(name) => format!("[{}]", self.symbols.resolve(*name)),
            Value::Instance(id) => format!("<Instance-{}>", self.symbols.resolve(self.instances.get(*id).name)),
            Value::Overrides(_) => "<Slot-Overrides>".to_string(),
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_engine_has_user_system_handlers() {
        let engine = Engine::new();
        let user = engine.classes().user();
        let table = engine.classes().class(user).handlers();
        let init = engine.symbols().known().init;
        assert!(table.find(init, crate::Qualifier::Primary).is_some());
        assert_eq!(table.len(), 8);
    }

    #[test]
    fn test_begin_command_only_resets_at_top_level() {
        let mut engine = Engine::new();
        engine.request_halt();
        engine.report(DispatchError::ShadowedHandlerUnavailable);
        engine.begin_command();
        assert!(!engine.is_halted());
        assert!(!engine.evaluation_error());
        assert_eq!(engine.take_diagnostics().len(), 1);
    }

    #[test]
    fn test_render() {
        let mut engine = Engine::new();
        let nil = engine.intern("nil");
        let value = Value::multifield([Value::Integer(1), Value::Symbol(nil), Value::string("x")]);
        assert_eq!(engine.render(&value), "(1 nil \"x\")");
        assert_eq!(engine.render(&Value::Float(2.0)), "2.0");
    }
}
