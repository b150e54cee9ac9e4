//! Integration tests for instance creation, modify and duplicate.

use std::cell::RefCell;
use std::rc::Rc;

use objmsg::{
    Action, ClassId, DispatchError, Engine, HandlerDef, InstanceId, MutationOptions, OverrideExpr, Params,
    PatternMatchHook, Qualifier, SlotOverride, SlotSpec, Symbol, Value,
};
use pretty_assertions::assert_eq;

/// `Box` with a `size` slot (default 1), a `tags` multislot and an `area`
/// handler answering `size * size`.
fn box_engine() -> (Engine, ClassId) {
    box_engine_with(Engine::new())
}

fn box_engine_with(mut engine: Engine) -> (Engine, ClassId) {
    let class = engine
        .define_class(
            "Box",
            &[],
            vec![SlotSpec::single("size").default_value(Value::Integer(1)), SlotSpec::multiple("tags")],
        )
        .unwrap();
    let size = engine.intern("size");
    let area = engine.intern("area");
    let times = engine.intern("*");
    engine
        .define_handler(
            class,
            HandlerDef::new(area, Qualifier::Primary)
                .body(vec![Action::call(times, vec![Action::SelfSlot(size), Action::SelfSlot(size)])]),
        )
        .unwrap();
    (engine, class)
}

fn instance(engine: &Engine, name: &str) -> InstanceId {
    engine.find_instance(name).unwrap()
}

fn name(engine: &mut Engine, text: &str) -> Value {
    Value::InstanceName(engine.intern(text))
}

mod scenario {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_box_scenario() {
        let (mut engine, _) = box_engine();
        let size = engine.intern("size");

        assert_eq!(engine.make_instance("box1", "Box", Vec::new()), name(&mut engine, "box1"));
        assert_eq!(engine.send_to("box1", "area", vec![]), Value::Integer(1));

        let modify = Action::modify(
            Action::Const(name(&mut engine, "box1")),
            vec![OverrideExpr::new(size, vec![Action::int(5)])],
            MutationOptions::DIRECT,
        );
        assert_eq!(engine.eval(&modify), Value::TRUE);
        assert_eq!(engine.send_to("box1", "area", vec![]), Value::Integer(25));

        let box1 = name(&mut engine, "box1");
        let copy = engine.duplicate_instance(
            box1,
            Some("box2"),
            vec![SlotOverride::set(size, Value::Integer(2))],
            MutationOptions::DIRECT,
        );
        assert_eq!(copy, name(&mut engine, "box2"));
        assert_eq!(engine.send_to("box2", "area", vec![]), Value::Integer(4));
        assert_eq!(engine.send_to("box1", "area", vec![]), Value::Integer(25));
        assert!(engine.diagnostics().is_empty());
    }

    #[test]
    fn test_overrides_see_caller_locals() {
        let (mut engine, class) = box_engine();
        let size = engine.intern("size");
        let grow = engine.intern("grow");
        let plus = engine.intern("+");
        engine
            .define_handler(
                class,
                HandlerDef::new(grow, Qualifier::Primary).locals(1).body(vec![
                    Action::bind(0, Action::call(plus, vec![Action::SelfSlot(size), Action::int(10)])),
                    Action::modify(
                        Action::receiver(),
                        vec![OverrideExpr::new(size, vec![Action::Local(0)])],
                        MutationOptions::DIRECT,
                    ),
                ]),
            )
            .unwrap();
        engine.make_instance("box1", "Box", Vec::new());

        assert_eq!(engine.send_to("box1", "grow", vec![]), Value::TRUE);
        let id = instance(&engine, "box1");
        assert_eq!(engine.slot_value(id, "size"), Some(Value::Integer(11)));
    }
}

mod modify {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_reset_and_multifield_overrides() {
        let (mut engine, _) = box_engine();
        let size = engine.intern("size");
        let tags = engine.intern("tags");
        engine.make_instance("box1", "Box", vec![SlotOverride::set(size, Value::Integer(9))]);

        let modify = Action::modify(
            Action::Const(name(&mut engine, "box1")),
            vec![
                OverrideExpr::new(size, vec![]),
                OverrideExpr::new(tags, vec![Action::string("red"), Action::string("small")]),
            ],
            MutationOptions::DIRECT,
        );
        assert_eq!(engine.eval(&modify), Value::TRUE);

        let id = instance(&engine, "box1");
        assert_eq!(engine.slot_value(id, "size"), Some(Value::Integer(1)));
        assert_eq!(
            engine.slot_value(id, "tags"),
            Some(Value::multifield([Value::string("red"), Value::string("small")]))
        );
    }

    #[test]
    fn test_message_put_receives_the_whole_value() {
        let (mut engine, class) = box_engine();
        let seen: Rc<RefCell<Vec<Value>>> = Rc::default();
        let sink = Rc::clone(&seen);
        engine.define_function("record", move |_, args| {
            sink.borrow_mut().extend(args.iter().cloned());
            Value::TRUE
        });
        let record = engine.intern("record");
        let put_tags = engine.intern("put-tags");
        engine
            .define_handler(
                class,
                HandlerDef::new(put_tags, Qualifier::Primary)
                    .params(Params::fixed(1))
                    .body(vec![Action::call(record, vec![Action::Param(1)])]),
            )
            .unwrap();
        engine.make_instance("box1", "Box", Vec::new());

        let tags = engine.intern("tags");
        let box1 = name(&mut engine, "box1");
        let red_small = Value::multifield([Value::string("red"), Value::string("small")]);
        let empty = Value::multifield([]);
        for value in [red_small.clone(), empty.clone()] {
            let result = engine.modify_instance(box1.clone(), vec![SlotOverride::set(tags, value)], MutationOptions::MESSAGE);
            assert_eq!(result, Value::TRUE);
        }
        assert_eq!(*seen.borrow(), vec![red_small, empty]);
        assert!(engine.diagnostics().is_empty());
    }

    #[test]
    fn test_handlers_wrap_the_mutation() {
        let (mut engine, class) = box_engine();
        let log: Rc<RefCell<Vec<String>>> = Rc::default();
        let sink = Rc::clone(&log);
        engine.define_function("note", move |engine, _| {
            let id = engine.find_instance("box1").unwrap();
            let size = engine.slot_value(id, "size").unwrap();
            sink.borrow_mut().push(engine.render(&size));
            Value::TRUE
        });
        let note = engine.intern("note");
        let direct_modify = engine.symbols().known().direct_modify;
        for qualifier in [Qualifier::Before, Qualifier::After] {
            engine
                .define_handler(
                    class,
                    HandlerDef::new(direct_modify, qualifier)
                        .params(Params::with_rest(0))
                        .body(vec![Action::call(note, vec![])]),
                )
                .unwrap();
        }
        engine.make_instance("box1", "Box", Vec::new());
        let size = engine.intern("size");
        let box1 = name(&mut engine, "box1");

        let result = engine.modify_instance(box1, vec![SlotOverride::set(size, Value::Integer(4))], MutationOptions::DIRECT);
        assert_eq!(result, Value::TRUE);
        assert_eq!(*log.borrow(), vec!["1".to_string(), "4".to_string()]);
    }

    #[test]
    fn test_message_modify_stops_at_first_rejection() {
        let mut engine = Engine::new();
        let class = engine
            .define_class(
                "Triple",
                &[],
                vec![SlotSpec::single("a"), SlotSpec::single("b"), SlotSpec::single("c")],
            )
            .unwrap();
        let put_b = engine.intern("put-b");
        engine
            .define_handler(
                class,
                HandlerDef::new(put_b, Qualifier::Primary)
                    .params(Params::with_rest(0))
                    .body(vec![Action::Const(Value::FALSE)]),
            )
            .unwrap();
        engine.make_instance("t", "Triple", Vec::new());
        let [a, b, c] = ["a", "b", "c"].map(|slot| engine.intern(slot));
        let t = name(&mut engine, "t");

        let result = engine.modify_instance(
            t,
            vec![
                SlotOverride::set(a, Value::Integer(1)),
                SlotOverride::set(b, Value::Integer(2)),
                SlotOverride::set(c, Value::Integer(3)),
            ],
            MutationOptions::MESSAGE,
        );
        assert_eq!(result, Value::FALSE);

        let id = instance(&engine, "t");
        let nil = Value::Symbol(engine.intern("nil"));
        assert_eq!(engine.slot_value(id, "a"), Some(Value::Integer(1)));
        assert_eq!(engine.slot_value(id, "b"), Some(nil.clone()));
        assert_eq!(engine.slot_value(id, "c"), Some(nil));
    }

    #[test]
    fn test_unknown_slot_and_stale_target() {
        let (mut engine, _) = box_engine();
        let bogus = engine.intern("bogus");
        engine.make_instance("box1", "Box", Vec::new());
        let id = instance(&engine, "box1");

        let result = engine.modify_instance(
            Value::Instance(id),
            vec![SlotOverride::set(bogus, Value::Integer(1))],
            MutationOptions::DIRECT,
        );
        assert_eq!(result, Value::FALSE);
        assert!(matches!(
            engine.diagnostics().last(),
            Some(DispatchError::SlotNotFound { .. })
        ));

        engine.delete_instance(Value::Instance(id));
        let result = engine.modify_instance(Value::Instance(id), Vec::new(), MutationOptions::DIRECT);
        assert_eq!(result, Value::FALSE);
        assert!(matches!(
            engine.diagnostics().last(),
            Some(DispatchError::StaleInstance { function: "modify-instance" })
        ));
    }

    #[test]
    fn test_non_symbol_slot_name_is_rejected() {
        let (mut engine, _) = box_engine();
        engine.make_instance("box1", "Box", Vec::new());
        let modify = Action::modify(
            Action::Const(name(&mut engine, "box1")),
            vec![OverrideExpr {
                slot: Action::int(3),
                values: vec![Action::int(1)],
            }],
            MutationOptions::DIRECT,
        );
        assert_eq!(engine.eval(&modify), Value::FALSE);
        assert!(matches!(
            engine.diagnostics().last(),
            Some(DispatchError::InvalidSlotName { position: 1, .. })
        ));
    }

    #[test]
    fn test_synthetic_messages_need_the_public_operation() {
        let (mut engine, _) = box_engine();
        engine.make_instance("box1", "Box", Vec::new());

        assert_eq!(engine.send_to("box1", "direct-modify", vec![Value::multifield([])]), Value::FALSE);
        assert!(matches!(
            engine.diagnostics().last(),
            Some(DispatchError::UnauthorizedMutation { function: "modify-instance", .. })
        ));

        let box2 = name(&mut engine, "box2");
        assert_eq!(
            engine.send_to("box1", "message-duplicate", vec![box2, Value::multifield([])]),
            Value::FALSE
        );
        assert!(matches!(
            engine.diagnostics().last(),
            Some(DispatchError::UnauthorizedMutation { function: "duplicate-instance", .. })
        ));
        assert!(engine.find_instance("box2").is_none());
    }
}

mod duplicate {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_copies_slots_and_refuses_same_name() {
        let (mut engine, _) = box_engine();
        let tags = engine.intern("tags");
        let size = engine.intern("size");
        engine.make_instance(
            "box1",
            "Box",
            vec![
                SlotOverride::set(size, Value::Integer(3)),
                SlotOverride::set(tags, Value::multifield([Value::string("fragile")])),
            ],
        );
        let box1 = name(&mut engine, "box1");

        let copy = engine.duplicate_instance(box1.clone(), Some("box2"), Vec::new(), MutationOptions::DIRECT);
        assert_eq!(copy, name(&mut engine, "box2"));
        let id = instance(&engine, "box2");
        assert_eq!(engine.slot_value(id, "size"), Some(Value::Integer(3)));
        assert_eq!(
            engine.slot_value(id, "tags"),
            Some(Value::multifield([Value::string("fragile")]))
        );

        assert_eq!(
            engine.duplicate_instance(box1, Some("box1"), Vec::new(), MutationOptions::DIRECT),
            Value::FALSE
        );
        assert!(matches!(
            engine.diagnostics().last(),
            Some(DispatchError::DuplicateSameName { .. })
        ));
    }

    #[test]
    fn test_generated_name() {
        let (mut engine, _) = box_engine();
        engine.make_instance("box1", "Box", Vec::new());
        let box1 = name(&mut engine, "box1");
        let copy = engine.duplicate_instance(box1, None, Vec::new(), MutationOptions::DIRECT);
        assert_eq!(copy, name(&mut engine, "gen1"));
    }

    #[test]
    fn test_failure_quashes_the_copy() {
        let (mut engine, _) = box_engine();
        let bogus = engine.intern("bogus");
        engine.make_instance("box1", "Box", Vec::new());
        let box1 = name(&mut engine, "box1");

        let copy = engine.duplicate_instance(
            box1,
            Some("box2"),
            vec![SlotOverride::set(bogus, Value::Integer(1))],
            MutationOptions::DIRECT,
        );
        assert_eq!(copy, Value::FALSE);
        assert!(engine.evaluation_error());
        assert!(engine.find_instance("box2").is_none());
        assert_eq!(engine.instances().live().count(), 1);
    }

    #[test]
    fn test_message_duplicate_initializes_the_copy() {
        let (mut engine, class) = box_engine();
        let count = Rc::new(RefCell::new(0));
        let seen = Rc::clone(&count);
        engine.define_function("count-init", move |_, _| {
            *seen.borrow_mut() += 1;
            Value::TRUE
        });
        let count_init = engine.intern("count-init");
        let init = engine.symbols().known().init;
        engine
            .define_handler(
                class,
                HandlerDef::new(init, Qualifier::After).body(vec![Action::call(count_init, vec![])]),
            )
            .unwrap();
        engine.make_instance("box1", "Box", Vec::new());
        assert_eq!(*count.borrow(), 1);

        let box1 = name(&mut engine, "box1");
        engine.duplicate_instance(box1.clone(), Some("box2"), Vec::new(), MutationOptions::DIRECT);
        assert_eq!(*count.borrow(), 1);
        let copy = engine.duplicate_instance(box1, Some("box3"), Vec::new(), MutationOptions::MESSAGE);
        assert_eq!(copy, name(&mut engine, "box3"));
        assert_eq!(*count.borrow(), 2);
        let id = instance(&engine, "box3");
        assert!(!engine.instances().get(id).is_initializing());
    }

    #[test]
    fn test_duplicate_replaces_existing_target() {
        let (mut engine, _) = box_engine();
        let size = engine.intern("size");
        engine.make_instance("box1", "Box", vec![SlotOverride::set(size, Value::Integer(6))]);
        engine.make_instance("box2", "Box", Vec::new());
        let old = instance(&engine, "box2");
        let box1 = name(&mut engine, "box1");

        engine.duplicate_instance(box1, Some("box2"), Vec::new(), MutationOptions::DIRECT);
        let new = instance(&engine, "box2");
        assert_ne!(old, new);
        assert!(!engine.instances().is_live(old));
        assert_eq!(engine.slot_value(new, "size"), Some(Value::Integer(6)));
    }
}

mod pattern_delay {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Records the delay flag at every slot write.
    struct Recorder {
        delayed: bool,
        writes: Rc<RefCell<Vec<(Symbol, bool)>>>,
    }

    impl PatternMatchHook for Recorder {
        fn set_delay(&mut self, delay: bool) -> bool {
            std::mem::replace(&mut self.delayed, delay)
        }

        fn is_delayed(&self) -> bool {
            self.delayed
        }

        fn slot_changed(&mut self, _instance: InstanceId, slot: Symbol) {
            self.writes.borrow_mut().push((slot, self.delayed));
        }
    }

    fn recording_engine() -> (Engine, Rc<RefCell<Vec<(Symbol, bool)>>>) {
        let writes = Rc::new(RefCell::new(Vec::new()));
        let recorder = Recorder {
            delayed: false,
            writes: Rc::clone(&writes),
        };
        let (mut engine, _) = box_engine_with(Engine::new().with_pattern_hook(Box::new(recorder)));
        engine
            .define_class(
                "Trio",
                &[],
                vec![SlotSpec::single("a"), SlotSpec::single("b"), SlotSpec::single("c")],
            )
            .unwrap();
        engine.make_instance("box1", "Box", Vec::new());
        engine.make_instance("trio1", "Trio", Vec::new());
        writes.borrow_mut().clear();
        (engine, writes)
    }

    /// Overrides for all three slots of `trio1`.
    fn three_overrides(engine: &mut Engine) -> Vec<SlotOverride> {
        ["a", "b", "c"]
            .into_iter()
            .zip(1..)
            .map(|(slot, n)| SlotOverride::set(engine.intern(slot), Value::Integer(n)))
            .collect()
    }

    #[test]
    fn test_delay_held_across_all_writes_and_restored() {
        let (mut engine, writes) = recording_engine();
        let overrides = three_overrides(&mut engine);
        let slots: Vec<Symbol> = overrides.iter().map(|o| o.slot).collect();
        let trio1 = name(&mut engine, "trio1");

        assert_eq!(engine.modify_instance(trio1, overrides, MutationOptions::DIRECT), Value::TRUE);
        let written: Vec<Symbol> = writes.borrow().iter().map(|(slot, _)| *slot).collect();
        let flags: Vec<bool> = writes.borrow().iter().map(|(_, delayed)| *delayed).collect();
        assert_eq!(written, slots);
        assert_eq!(flags, vec![true, true, true]);
        assert!(!engine.pattern_matching_delayed());
    }

    #[test]
    fn test_prior_setting_restored_after_failure() {
        let (mut engine, _writes) = recording_engine();
        let bogus = engine.intern("bogus");
        let box1 = name(&mut engine, "box1");

        engine.set_delay_pattern_matching(true);
        let result = engine.modify_instance(
            box1.clone(),
            vec![SlotOverride::set(bogus, Value::Integer(1))],
            MutationOptions::DIRECT,
        );
        assert_eq!(result, Value::FALSE);
        assert!(engine.pattern_matching_delayed());

        engine.set_delay_pattern_matching(false);
        engine.duplicate_instance(
            box1,
            Some("box2"),
            vec![SlotOverride::set(bogus, Value::Integer(1))],
            MutationOptions::MESSAGE,
        );
        assert!(!engine.pattern_matching_delayed());
    }

    #[test]
    fn test_active_variant_leaves_matching_on() {
        let (mut engine, writes) = recording_engine();
        let overrides = three_overrides(&mut engine);
        let trio1 = name(&mut engine, "trio1");

        assert_eq!(engine.modify_instance(trio1, overrides, MutationOptions::MESSAGE.active()), Value::TRUE);
        let flags: Vec<bool> = writes.borrow().iter().map(|(_, delayed)| *delayed).collect();
        assert_eq!(flags, vec![false, false, false]);
    }
}
