//! Class and handler definition.
//!
//! Handler tables are only changed while none of their handlers is linked
//! into an active send and constructs are not frozen. System handlers can
//! be shadowed by user handlers on subclasses but never replaced or deleted.
//! Failures are reported like runtime errors and also returned.

use tracing::debug;

use crate::action::HandlerDef;
use crate::class::{ClassId, SlotSpec};
use crate::engine::Engine;
use crate::error::{DispatchError, DispatchResult};
use crate::handler::{Handler, HandlerRef, Qualifier};
use crate::slot_access::SlotRefCompiler;
use crate::symbol::Symbol;

impl Engine {
    /// Defines a class. Without superclasses it inherits from `USER`.
    pub fn define_class(&mut self, name: &str, superclasses: &[&str], slots: Vec<SlotSpec>) -> DispatchResult<ClassId> {
        let result = self.try_define_class(name, superclasses, slots);
        self.check(result)
    }

    fn try_define_class(&mut self, name: &str, superclasses: &[&str], slots: Vec<SlotSpec>) -> DispatchResult<ClassId> {
        if self.frozen {
            return Err(DispatchError::ConstructsFrozen);
        }
        if self.find_class(name).is_some() {
            return Err(DispatchError::DuplicateClass { name: name.to_string() });
        }
        let superclasses = if superclasses.is_empty() {
            vec![self.classes.user()]
        } else {
            superclasses
                .iter()
                .map(|parent| self.class_named(parent))
                .collect::<DispatchResult<Vec<_>>>()?
        };
        let symbol = self.symbols.intern(name);
        let class = self.classes.add_class(&mut self.symbols, symbol, &superclasses, slots, false);
        self.install_accessors(class);
        debug!("defined class {name}");
        Ok(class)
    }

    /// Defines or redefines a handler. `?self:<slot>` references in the body
    /// are compiled against `class`.
    pub fn define_handler(&mut self, class: ClassId, def: HandlerDef) -> DispatchResult<HandlerRef> {
        let result = self.try_define_handler(class, def);
        self.check(result)
    }

    fn try_define_handler(&mut self, class: ClassId, mut def: HandlerDef) -> DispatchResult<HandlerRef> {
        self.check_mutable(class)?;
        let table = self.classes.class(class).handlers();
        if let Some(index) = table.find(def.message, def.qualifier) {
            if table.get(index).is_some_and(|h| h.system) {
                return Err(DispatchError::SystemHandlerProtected {
                    handler: self.handler_label(HandlerRef { class, index }),
                });
            }
        }
        def.actions = SlotRefCompiler::new(self, class).compile(def.actions)?;
        let handler = self.insert_handler(class, def, false);
        debug!("defined handler {}", self.handler_label(handler));
        Ok(handler)
    }

    /// Stores a handler, replacing the body of an existing
    /// `(message, qualifier)` in place.
    pub(crate) fn insert_handler(&mut self, class: ClassId, def: HandlerDef, system: bool) -> HandlerRef {
        let trace = self.config.watch.handlers;
        let table = &mut self.classes.class_mut(class).handlers;
        let existing = table
            .find(def.message, def.qualifier)
            .and_then(|index| table.get_mut(index).map(|handler| (index, handler)));
        let index = match existing {
            Some((index, handler)) => {
                handler.params = def.params;
                handler.actions = def.actions.into();
                handler.local_count = def.local_count;
                handler.system = system;
                index
            }
            None => table.insert(Handler {
                message: def.message,
                class,
                qualifier: def.qualifier,
                params: def.params,
                actions: def.actions.into(),
                local_count: def.local_count,
                system,
                trace,
                busy: 0,
                marked: false,
            }),
        };
        HandlerRef { class, index }
    }

    /// Deletes handlers of `class`. `"*"` matches every message name and a
    /// `None` qualifier every qualifier. Returns how many were deleted.
    pub fn undefine_handler(
        &mut self,
        class: ClassId,
        message: &str,
        qualifier: Option<Qualifier>,
    ) -> DispatchResult<usize> {
        let result = self.try_undefine_handler(class, message, qualifier);
        self.check(result)
    }

    /// Deletes matching handlers from every class that has any.
    pub fn undefine_handlers_everywhere(&mut self, message: &str, qualifier: Option<Qualifier>) -> DispatchResult<usize> {
        let message_symbol = self.message_pattern(message);
        let classes: Vec<ClassId> = self
            .classes
            .classes()
            .filter(|class| {
                class.handlers().sorted().any(|(_, handler)| {
                    !handler.system
                        && message_symbol.map_or(true, |m| m == Some(handler.message))
                        && qualifier.map_or(true, |q| q == handler.qualifier)
                })
            })
            .map(|class| class.id)
            .collect();

        let mut deleted = 0;
        let mut first_error = None;
        for class in classes {
            match self.try_undefine_handler(class, message, qualifier) {
                Ok(count) => deleted += count,
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        let result = first_error.map_or(Ok(deleted), Err);
        self.check(result)
    }

    /// `None` for the `*` wildcard, `Some(None)` for a name never interned.
    fn message_pattern(&self, message: &str) -> Option<Option<Symbol>> {
        let symbol = self.symbols.lookup(message);
        if symbol == Some(self.symbols.known().wildcard) {
            None
        } else {
            Some(symbol)
        }
    }

    fn try_undefine_handler(&mut self, class: ClassId, message: &str, qualifier: Option<Qualifier>) -> DispatchResult<usize> {
        if self.frozen {
            return Err(DispatchError::ConstructsFrozen);
        }
        let not_found = |engine: &Engine, qualifier: Option<Qualifier>| DispatchError::HandlerNotFound {
            message: message.to_string(),
            qualifier: qualifier.map_or_else(|| "*".to_string(), |q| q.to_string()),
            class: engine.class_name(class),
        };
        let table = self.classes.class(class).handlers();
        if table.is_empty() {
            return Err(not_found(self, qualifier));
        }
        if table.executing() {
            return Err(DispatchError::HandlersExecuting {
                class: self.class_name(class),
            });
        }

        let qualifiers: Vec<Qualifier> = qualifier.map_or_else(|| Qualifier::ALL.to_vec(), |q| vec![q]);
        let mut marks = Vec::new();
        let mut first_error = None;
        match self.message_pattern(message) {
            None => {
                // System handlers are skipped silently by the wildcard.
                marks.extend(
                    table
                        .sorted()
                        .filter(|(_, h)| !h.system && qualifiers.contains(&h.qualifier))
                        .map(|(index, _)| index),
                );
            }
            Some(name) => {
                for q in &qualifiers {
                    match name.and_then(|name| table.find(name, *q)) {
                        Some(index) if table.get(index).is_some_and(|h| h.system) => {
                            first_error.get_or_insert(DispatchError::SystemHandlerProtected {
                                handler: self.handler_label(HandlerRef { class, index }),
                            });
                        }
                        Some(index) => marks.push(index),
                        None if qualifier.is_some() => {
                            first_error.get_or_insert(not_found(self, qualifier));
                        }
                        None => {}
                    }
                }
                if marks.is_empty() && first_error.is_none() {
                    first_error = Some(not_found(self, qualifier));
                }
            }
        }

        let table = &mut self.classes.class_mut(class).handlers;
        for index in marks {
            table.mark(index);
        }
        let deleted = table.remove_marked();
        if deleted > 0 {
            debug!("deleted {deleted} handler(s) of {message} from {}", self.class_name(class));
        }
        first_error.map_or(Ok(deleted), Err)
    }

    /// Whether `undefine_handler` would delete the handler.
    pub fn is_handler_deletable(&self, class: ClassId, message: &str, qualifier: Qualifier) -> bool {
        if self.frozen {
            return false;
        }
        let table = self.classes.class(class).handlers();
        if table.executing() {
            return false;
        }
        self.symbols
            .lookup(message)
            .and_then(|message| table.find(message, qualifier))
            .and_then(|index| table.get(index))
            .is_some_and(|handler| !handler.system)
    }

    /// Turns handler tracing on or off for one handler.
    pub fn set_handler_watch(&mut self, handler: HandlerRef, trace: bool) -> DispatchResult<()> {
        let result = match self.classes.handler_mut(handler) {
            Some(entry) => {
                entry.trace = trace;
                Ok(())
            }
            None => Err(DispatchError::UnknownHandler {
                index: handler.index,
                class: self.class_name(handler.class),
            }),
        };
        self.check(result)
    }

    fn check_mutable(&self, class: ClassId) -> DispatchResult<()> {
        if self.frozen {
            return Err(DispatchError::ConstructsFrozen);
        }
        if self.classes.class(class).handlers().executing() {
            return Err(DispatchError::HandlersExecuting {
                class: self.class_name(class),
            });
        }
        Ok(())
    }

    /// Reports a failed definition before handing it back.
    fn check<T>(&mut self, result: DispatchResult<T>) -> DispatchResult<T> {
        if let Err(err) = &result {
            self.report(err.clone());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use crate::value::Value;

    fn engine_with_class() -> (Engine, ClassId, Symbol) {
        let mut engine = Engine::new();
        let a = engine.define_class("A", &[], Vec::new()).unwrap();
        let m = engine.intern("m");
        (engine, a, m)
    }

    #[test]
    fn test_redefinition_replaces_in_place() {
        let (mut engine, a, m) = engine_with_class();
        let first = engine
            .define_handler(a, HandlerDef::new(m, Qualifier::Primary).body(vec![Action::int(1)]))
            .unwrap();
        let second = engine
            .define_handler(a, HandlerDef::new(m, Qualifier::Primary).body(vec![Action::int(2)]))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(engine.classes().class(a).handlers().len(), 1);
        engine.make_instance("a1", "A", Vec::new());
        assert_eq!(engine.send_to("a1", "m", vec![]), Value::Integer(2));
    }

    #[test]
    fn test_duplicate_and_unknown_classes() {
        let (mut engine, _, _) = engine_with_class();
        assert!(matches!(
            engine.define_class("A", &[], Vec::new()),
            Err(DispatchError::DuplicateClass { .. })
        ));
        assert!(matches!(
            engine.define_class("C", &["Nope"], Vec::new()),
            Err(DispatchError::UnknownClass { .. })
        ));
    }

    #[test]
    fn test_system_handlers_are_protected() {
        let mut engine = Engine::new();
        let user = engine.classes().user();
        let init = engine.symbols().known().init;
        assert!(matches!(
            engine.define_handler(user, HandlerDef::new(init, Qualifier::Primary)),
            Err(DispatchError::SystemHandlerProtected { .. })
        ));
        assert!(matches!(
            engine.undefine_handler(user, "init", None),
            Err(DispatchError::SystemHandlerProtected { .. })
        ));
        assert!(!engine.is_handler_deletable(user, "init", Qualifier::Primary));
        assert_eq!(engine.undefine_handler(user, "*", None), Ok(0));
        assert_eq!(engine.classes().class(user).handlers().len(), 8);
    }

    #[test]
    fn test_wildcard_deletion() {
        let (mut engine, a, m) = engine_with_class();
        let n = engine.intern("n");
        engine.define_handler(a, HandlerDef::new(m, Qualifier::Before)).unwrap();
        engine.define_handler(a, HandlerDef::new(m, Qualifier::After)).unwrap();
        engine.define_handler(a, HandlerDef::new(n, Qualifier::Before)).unwrap();

        assert_eq!(engine.undefine_handler(a, "*", Some(Qualifier::Before)), Ok(2));
        assert_eq!(engine.undefine_handler(a, "m", None), Ok(1));
        assert!(matches!(
            engine.undefine_handler(a, "m", Some(Qualifier::Primary)),
            Err(DispatchError::HandlerNotFound { .. })
        ));
    }

    #[test]
    fn test_undefine_everywhere() {
        let (mut engine, a, m) = engine_with_class();
        let b = engine.define_class("B", &["A"], Vec::new()).unwrap();
        engine.define_handler(a, HandlerDef::new(m, Qualifier::Primary)).unwrap();
        engine.define_handler(b, HandlerDef::new(m, Qualifier::Primary)).unwrap();
        assert_eq!(engine.undefine_handlers_everywhere("m", None), Ok(2));
        assert!(engine.classes().class(b).handlers().is_empty());
    }

    #[test]
    fn test_handler_refs_survive_other_deletions() {
        let (mut engine, a, m) = engine_with_class();
        let n = engine.intern("n");
        let hm = engine.define_handler(a, HandlerDef::new(m, Qualifier::Primary)).unwrap();
        let hn = engine
            .define_handler(a, HandlerDef::new(n, Qualifier::Primary).body(vec![Action::int(7)]))
            .unwrap();

        assert_eq!(engine.undefine_handler(a, "m", None), Ok(1));
        assert_eq!(engine.describe_handler(hn).as_deref(), Some("n primary in class A"));
        assert_eq!(engine.describe_handler(hm), None);
        assert_eq!(engine.set_handler_watch(hn, true), Ok(()));
        assert!(engine.classes().handler(hn).is_some_and(|h| h.trace));
        assert!(matches!(
            engine.set_handler_watch(hm, true),
            Err(DispatchError::UnknownHandler { .. })
        ));

        let again = engine.define_handler(a, HandlerDef::new(m, Qualifier::Primary)).unwrap();
        assert_ne!(again, hm);
        assert_eq!(engine.describe_handler(hm), None);
        engine.make_instance("a1", "A", Vec::new());
        assert_eq!(engine.send_to("a1", "n", vec![]), Value::Integer(7));
    }

    #[test]
    fn test_frozen_constructs() {
        let (mut engine, a, m) = engine_with_class();
        engine.set_frozen(true);
        assert_eq!(
            engine.define_handler(a, HandlerDef::new(m, Qualifier::Primary)),
            Err(DispatchError::ConstructsFrozen)
        );
        assert!(engine.evaluation_error());
    }
}
