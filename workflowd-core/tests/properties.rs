//! Property tests for definition validation and transitions.

use proptest::prelude::*;
use workflowd_core::{ActionDef, CoreError, DefinitionSpec, StateDef, WorkflowEngine};

/// A generated definition: `finals[i]`/`disabled[i]` describe state `s{i}`,
/// `actions[j] = (sources, target, enabled)` describes action `a{j}`.
#[derive(Debug, Clone)]
struct Machine {
    finals: Vec<bool>,
    disabled: Vec<bool>,
    actions: Vec<(Vec<usize>, usize, bool)>,
}

impl Machine {
    fn spec(&self, id: &str) -> DefinitionSpec {
        let mut spec = DefinitionSpec::new(id).with_id(id);
        for i in 0..self.finals.len() {
            let mut state = StateDef::new(format!("s{}", i), format!("State {}", i));
            if i == 0 {
                state = state.initial();
            }
            if self.finals[i] {
                state = state.terminal();
            }
            if self.disabled[i] {
                state = state.disabled();
            }
            spec = spec.with_state(state);
        }
        for (j, (sources, target, enabled)) in self.actions.iter().enumerate() {
            let mut action = ActionDef::new(
                format!("a{}", j),
                format!("Action {}", j),
                sources.iter().map(|s| format!("s{}", s)),
                format!("s{}", target),
            );
            if !enabled {
                action = action.disabled();
            }
            spec = spec.with_action(action);
        }
        spec
    }

    /// What executing action `j` from state `current` should produce.
    fn expect(&self, current: usize, j: usize) -> Result<usize, &'static str> {
        let (sources, target, enabled) = &self.actions[j];
        if !enabled {
            return Err("ACTION_DISABLED");
        }
        if self.disabled[current] {
            return Err("CURRENT_STATE_DISABLED");
        }
        if self.finals[current] {
            return Err("INSTANCE_IN_FINAL_STATE");
        }
        if !sources.contains(&current) {
            return Err("INVALID_SOURCE_STATE");
        }
        if self.disabled[*target] {
            return Err("TARGET_STATE_DISABLED");
        }
        Ok(*target)
    }
}

fn machine() -> impl Strategy<Value = Machine> {
    (2usize..6).prop_flat_map(|n| {
        let action = (
            prop::collection::vec(0..n, 0..3),
            0..n,
            prop::bool::weighted(0.9),
        );
        (
            prop::collection::vec(prop::bool::weighted(0.2), n),
            prop::collection::vec(prop::bool::weighted(0.1), n),
            prop::collection::vec(action, 1..8),
        )
            .prop_map(|(finals, disabled, actions)| Machine {
                finals,
                disabled,
                actions,
            })
    })
}

fn state_index(id: &str) -> usize {
    id[1..].parse().unwrap()
}

proptest! {
    #[test]
    fn prop_empty_states_rejected(actions in prop::collection::vec("[a-z]{1,6}", 0..4)) {
        let engine = WorkflowEngine::new();
        let mut spec = DefinitionSpec::new("empty");
        for id in &actions {
            spec = spec.with_action(ActionDef::new(id.clone(), "x", [id.clone()], id.clone()));
        }
        prop_assert_eq!(engine.create_definition(spec).unwrap_err(), CoreError::EmptyStates);
        prop_assert_eq!(engine.definition_count(), 0);
    }

    #[test]
    fn prop_initial_count_must_be_one(flags in prop::collection::vec(any::<bool>(), 1..8)) {
        let count = flags.iter().filter(|f| **f).count();
        prop_assume!(count != 1);

        let mut spec = DefinitionSpec::new("initials");
        for (i, initial) in flags.iter().enumerate() {
            let state = StateDef::new(format!("s{}", i), "s");
            spec = spec.with_state(if *initial { state.initial() } else { state });
        }

        let engine = WorkflowEngine::new();
        prop_assert_eq!(
            engine.create_definition(spec).unwrap_err(),
            CoreError::InvalidInitialState { count }
        );
    }

    #[test]
    fn prop_case_variants_are_duplicates(id in "[a-z]{1,8}", upper_mask in any::<u8>()) {
        let variant: String = id
            .chars()
            .enumerate()
            .map(|(i, c)| if upper_mask & (1 << (i % 8)) != 0 { c.to_ascii_uppercase() } else { c })
            .collect();

        let spec = DefinitionSpec::new("dup")
            .with_state(StateDef::new(id.clone(), "first").initial())
            .with_state(StateDef::new(variant, "second"));

        let engine = WorkflowEngine::new();
        prop_assert_eq!(
            engine.create_definition(spec).unwrap_err(),
            CoreError::DuplicateStateId { id }
        );
    }

    #[test]
    fn prop_dangling_reference_rejected(m in machine(), pick in any::<prop::sample::Index>(), as_target in any::<bool>()) {
        let mut m = m;
        let j = pick.index(m.actions.len());
        let ghost = m.finals.len() + 3;
        if as_target {
            m.actions[j].1 = ghost;
        } else {
            m.actions[j].0.push(ghost);
        }

        let engine = WorkflowEngine::new();
        let err = engine.create_definition(m.spec("dangling")).unwrap_err();
        let is_unknown_reference = matches!(err, CoreError::UnknownStateReference { .. });
        prop_assert!(is_unknown_reference);
    }

    #[test]
    fn prop_start_at_initial_with_empty_history(m in machine(), name in "[A-Za-z0-9]{1,10}") {
        let engine = WorkflowEngine::new();
        let def = engine.create_definition(m.spec("m")).unwrap();

        let instance = engine.start_instance("M", Some(&name)).unwrap();
        prop_assert_eq!(instance.current_state_id(), def.initial_state_id());
        prop_assert!(instance.history().is_empty());

        let missing = engine.start_instance("not-there", None);
        let is_not_found = matches!(missing, Err(CoreError::DefinitionNotFound { .. }));
        prop_assert!(is_not_found);
        prop_assert_eq!(engine.instance_count(), 1);
    }

    #[test]
    fn prop_engine_matches_model(
        m in machine(),
        steps in prop::collection::vec(any::<prop::sample::Index>(), 0..24),
    ) {
        let engine = WorkflowEngine::new();
        engine.create_definition(m.spec("m")).unwrap();
        engine.start_instance("m", Some("i")).unwrap();

        let mut current = 0usize;
        let mut history_len = 0usize;

        for step in &steps {
            let j = step.index(m.actions.len());
            let action_id = format!("A{}", j);
            let result = engine.execute_action("i", &action_id);

            match (m.expect(current, j), result) {
                (Ok(target), Ok(outcome)) => {
                    prop_assert_eq!(&outcome.entry.action_id, &format!("a{}", j));
                    prop_assert_eq!(state_index(&outcome.entry.from_state_id), current);
                    prop_assert_eq!(state_index(&outcome.entry.to_state_id), target);
                    prop_assert_eq!(outcome.is_final, m.finals[target]);
                    current = target;
                    history_len += 1;
                }
                (Err(code), Err(err)) => prop_assert_eq!(err.error_code(), code),
                (expected, actual) => {
                    prop_assert!(false, "expected {:?}, got {:?}", expected, actual.map(|o| o.entry));
                }
            }

            let instance = engine.get_instance("i").unwrap();
            prop_assert_eq!(state_index(instance.current_state_id()), current);
            prop_assert_eq!(instance.history().len(), history_len);
        }
    }

    #[test]
    fn prop_same_sequence_same_result(
        m in machine(),
        steps in prop::collection::vec(any::<prop::sample::Index>(), 0..16),
    ) {
        let engine = WorkflowEngine::new();
        engine.create_definition(m.spec("m")).unwrap();
        engine.start_instance("m", Some("one")).unwrap();
        engine.start_instance("m", Some("two")).unwrap();

        for step in &steps {
            let action_id = format!("a{}", step.index(m.actions.len()));
            let first = engine.execute_action("one", &action_id).map(|o| o.entry.to_state_id);
            let second = engine.execute_action("two", &action_id).map(|o| o.entry.to_state_id);
            prop_assert_eq!(first, second);
        }

        let one = engine.get_instance("one").unwrap();
        let two = engine.get_instance("two").unwrap();
        prop_assert_eq!(one.current_state_id(), two.current_state_id());

        let path = |h: &[workflowd_core::HistoryEntry]| -> Vec<(String, String, String)> {
            h.iter()
                .map(|e| (e.action_id.clone(), e.from_state_id.clone(), e.to_state_id.clone()))
                .collect()
        };
        prop_assert_eq!(path(one.history()), path(two.history()));
    }

    #[test]
    fn prop_final_state_blocks_every_action(m in machine(), pick in any::<prop::sample::Index>()) {
        let mut m = m;
        m.finals[0] = true;
        m.disabled[0] = false;
        for action in m.actions.iter_mut() {
            action.2 = true;
        }

        let engine = WorkflowEngine::new();
        engine.create_definition(m.spec("m")).unwrap();
        engine.start_instance("m", Some("i")).unwrap();

        let action_id = format!("a{}", pick.index(m.actions.len()));
        prop_assert_eq!(
            engine.execute_action("i", &action_id).unwrap_err(),
            CoreError::InstanceInFinalState { state: "s0".into() }
        );
        prop_assert!(engine.get_instance("i").unwrap().history().is_empty());
    }
}
