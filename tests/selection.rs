//! End-to-end scenarios for the selection engine.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use permute::logger::Logger;
use permute::select::{
    FinalizeError, ManagerOptions, PermutationManager, VariableSelection, VariableSet,
    VariableState,
};

#[derive(Default)]
struct CountingLogger {
    errors: AtomicU32,
}

impl Logger for CountingLogger {
    fn info(&self, _message: &str) {}
    fn warning(&self, _message: &str) {}
    fn error(&self, _message: &str) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }
}

fn manager() -> (PermutationManager, Arc<CountingLogger>) {
    let logger = Arc::new(CountingLogger::default());
    let manager = PermutationManager::new(ManagerOptions {
        logger: logger.clone(),
        ..ManagerOptions::default()
    });
    (manager, logger)
}

const ENUM_VALUES: [(&str, i32); 5] = [
    ("VAL0", 0),
    ("VAL1", 1),
    ("VAL2", 2),
    ("VAL3", 3),
    ("VAL4", 4),
];

fn collect(
    selection: &VariableSelection,
    manager: &PermutationManager,
) -> Vec<(String, i32, String)> {
    let mut seen = Vec::new();
    selection.iterate(manager, |variable, value, label| {
        seen.push((variable.name().to_string(), value, label.to_string()));
    });
    seen
}

#[test]
fn merge_and_finalize_across_kinds() {
    let (mut manager, _) = manager();
    manager.register_bool("A", Some(false)).unwrap();
    manager.register_bool("B", Some(true)).unwrap();
    manager.register_int("INT", &[0, 2, 4, 8], Some(4)).unwrap();
    manager.register_enum("ENUM", &ENUM_VALUES, None).unwrap();

    let mut state_a = VariableState::new();
    state_a.set_bool(manager.variable("A").unwrap(), true).unwrap();
    state_a.set_int(manager.variable("INT").unwrap(), 8).unwrap();

    let mut state_b = VariableState::new();
    state_b.set_bool(manager.variable("B").unwrap(), false).unwrap();
    state_b
        .set_label(manager.variable("ENUM").unwrap(), "VAL3")
        .unwrap();

    let mut used = VariableSet::new();
    for name in ["A", "B", "INT", "ENUM"] {
        used.add(manager.variable(name).unwrap());
    }

    let mut merged = VariableState::new();
    VariableState::merge_b_onto_a(&state_a, &state_b, &used, &mut merged);

    let mut seen = Vec::new();
    merged.iterate(&manager, |variable, value, _| {
        seen.push((variable.name().to_string(), value));
    });
    assert_eq!(
        seen,
        vec![
            ("A".to_string(), 1),
            ("B".to_string(), 0),
            ("INT".to_string(), 8),
            ("ENUM".to_string(), 3),
        ]
    );

    // Finalizing the merged state against the defaults changes nothing:
    // every used variable already has a value.
    let mut selection = VariableSelection::new();
    manager.finalize_state(&merged, &used, &mut selection).unwrap();
    assert_eq!(
        collect(&selection, &manager),
        vec![
            ("A".to_string(), 1, "TRUE".to_string()),
            ("B".to_string(), 0, "FALSE".to_string()),
            ("INT".to_string(), 8, "8".to_string()),
            ("ENUM".to_string(), 3, "VAL3".to_string()),
        ]
    );
}

#[test]
fn finalize_without_value_or_default_fails() {
    let (mut manager, logger) = manager();
    manager.register_bool("A", Some(false)).unwrap();
    manager.register_bool("B", Some(true)).unwrap();
    manager.register_int("INT", &[0, 2, 4, 8], Some(4)).unwrap();
    // No default this time.
    manager.register_enum("ENUM", &ENUM_VALUES, None).unwrap();

    let mut state_a = VariableState::new();
    state_a.set_bool(manager.variable("A").unwrap(), true).unwrap();
    state_a.set_int(manager.variable("INT").unwrap(), 8).unwrap();

    let mut state_b = VariableState::new();
    state_b.set_bool(manager.variable("B").unwrap(), false).unwrap();

    let mut used = VariableSet::new();
    for name in ["A", "B", "INT", "ENUM"] {
        used.add(manager.variable(name).unwrap());
    }

    let mut merged = VariableState::new();
    VariableState::merge_b_onto_a(&state_a, &state_b, &used, &mut merged);

    let mut selection = VariableSelection::new();
    let error = manager
        .finalize_state(&merged, &used, &mut selection)
        .unwrap_err();

    assert_eq!(
        error,
        FinalizeError {
            missing: vec!["ENUM".to_string()]
        }
    );
    assert_eq!(logger.errors.load(Ordering::Relaxed), 1);
    assert_eq!(selection, VariableSelection::new());
}

#[test]
fn later_layer_overrides_earlier() {
    let (mut manager, _) = manager();
    manager.register_int("INT", &[0, 2, 4, 8], None).unwrap();

    let mut state_a = VariableState::new();
    state_a.set_int(manager.variable("INT").unwrap(), 8).unwrap();
    let mut state_b = VariableState::new();
    state_b.set_int(manager.variable("INT").unwrap(), 4).unwrap();

    let mut used = VariableSet::new();
    used.add(manager.variable("INT").unwrap());

    let mut merged = VariableState::new();
    VariableState::merge_b_onto_a(&state_a, &state_b, &used, &mut merged);

    let mut values = Vec::new();
    merged.iterate(&manager, |_, value, _| values.push(value));
    assert_eq!(values, vec![4]);
}

#[test]
fn equal_selections_share_a_hash() {
    let (mut manager, _) = manager();
    manager.register_bool("A", None).unwrap();
    manager.register_int("INT", &[0, 2, 4, 8], None).unwrap();

    let mut used = VariableSet::new();
    used.add(manager.variable("A").unwrap());
    used.add(manager.variable("INT").unwrap());

    let mut state = VariableState::new();
    state.set_bool(manager.variable("A").unwrap(), true).unwrap();
    state.set_int(manager.variable("INT").unwrap(), 2).unwrap();

    let mut first = VariableSelection::new();
    let mut second = VariableSelection::new();
    manager.finalize_state(&state, &used, &mut first).unwrap();
    manager.finalize_state(&state, &used, &mut second).unwrap();

    assert_eq!(first, second);
    assert_eq!(first.hash(), second.hash());

    let mut other_state = VariableState::new();
    other_state.set_bool(manager.variable("A").unwrap(), false).unwrap();
    other_state.set_int(manager.variable("INT").unwrap(), 2).unwrap();

    let mut third = VariableSelection::new();
    manager.finalize_state(&other_state, &used, &mut third).unwrap();
    assert_ne!(first, third);
    assert_ne!(first.hash(), third.hash());
}

#[test]
fn large_registry_merge() {
    // 30k bool variables; A sets the first two thirds, B the last two
    // thirds, the used set is the middle two thirds.
    const TOTAL: u32 = 30_000;

    let (mut manager, _) = manager();
    let names: Vec<String> = (0..TOTAL).map(|i| format!("BOOL_{i}")).collect();
    for name in &names {
        manager.register_bool(name, None).unwrap();
    }

    let mut state_a = VariableState::new();
    for i in 0..(TOTAL / 3 * 2) {
        state_a
            .set_bool(manager.variable(&names[i as usize]).unwrap(), i % 7 == 3)
            .unwrap();
    }

    let mut state_b = VariableState::new();
    for i in (TOTAL / 3)..TOTAL {
        state_b
            .set_bool(manager.variable(&names[i as usize]).unwrap(), i % 7 == 5)
            .unwrap();
    }

    let mut used = VariableSet::new();
    for i in (TOTAL / 6)..(TOTAL / 6 * 5) {
        used.add(manager.variable(&names[i as usize]).unwrap());
    }

    let mut merged = VariableState::new();
    VariableState::merge_b_onto_a(&state_a, &state_b, &used, &mut merged);

    // Iteration yields exactly the used variables in ascending bit order,
    // with B winning in the overlapping middle third.
    let mut index = TOTAL / 6;
    let mut visited = 0;
    merged.iterate(&manager, |variable, value, _| {
        assert_eq!(variable.name(), names[index as usize]);
        let expected = if index < TOTAL / 3 {
            index % 7 == 3
        } else {
            index % 7 == 5
        };
        assert_eq!(value != 0, expected, "wrong value for {}", variable.name());
        index += 1;
        visited += 1;
    });
    assert_eq!(visited, TOTAL / 6 * 4);
}

#[test]
fn registration_is_single_threaded_but_lookup_is_shared() {
    let (mut manager, _) = manager();
    manager.register_bool("A", Some(true)).unwrap();
    manager.register_int("INT", &[1, 2, 4], Some(2)).unwrap();

    let manager = Arc::new(manager);
    let mut used = VariableSet::new();
    used.add(manager.variable("A").unwrap());
    used.add(manager.variable("INT").unwrap());
    let used = Arc::new(used);

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let manager = manager.clone();
            let used = used.clone();
            std::thread::spawn(move || {
                let mut state = VariableState::new();
                state
                    .set_bool(manager.variable("A").unwrap(), worker % 2 == 0)
                    .unwrap();

                let mut selection = VariableSelection::new();
                manager.finalize_state(&state, &used, &mut selection).unwrap();
                selection.hash()
            })
        })
        .collect();

    let hashes: Vec<u32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    // Workers 0 and 2 produced one permutation, 1 and 3 the other.
    assert_eq!(hashes[0], hashes[2]);
    assert_eq!(hashes[1], hashes[3]);
    assert_ne!(hashes[0], hashes[1]);
}
