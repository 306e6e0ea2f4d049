//! Property-based invariant tests for the observer registry.
//!
//! Drives a fluid target through random sequences of subscribe, unsubscribe,
//! drop and broadcast operations and checks, after every step:
//!
//! 1. The observer slot is absent exactly when no live observer is tracked.
//! 2. Membership matches a reference model (insertion-ordered, no duplicates).
//! 3. Broadcast reaches every live member once, in registration order.
//! 4. Hook counts equal the set size after each change.
//! 5. Dropped observers are never called.

use std::cell::RefCell;
use std::rc::Rc;

use fluids::{
    OBSERVERS_SLOT, Observer, ObserverLifecycle, add_fluid_observer, call_fluid_observers,
    get_fluid_observers, has_hidden, remove_fluid_observer, set_fluid_getter, set_fluid_hooks,
};
use proptest::prelude::*;

const POOL: usize = 6;

#[derive(Debug, Clone)]
enum Op {
    Add(usize),
    Remove(usize),
    Drop(usize),
    Broadcast,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..POOL).prop_map(Op::Add),
        3 => (0..POOL).prop_map(Op::Remove),
        1 => (0..POOL).prop_map(Op::Drop),
        2 => Just(Op::Broadcast),
    ]
}

#[derive(Default)]
struct Probe {
    counts: RefCell<Vec<usize>>,
}

impl ObserverLifecycle<u32> for Probe {
    fn observer_added(&self, count: usize, _observer: &Observer<u32>) {
        self.counts.borrow_mut().push(count);
    }

    fn observer_removed(&self, count: usize, _observer: &Observer<u32>) {
        self.counts.borrow_mut().push(count);
    }

    fn observers_pruned(&self, count: usize, _pruned: usize) {
        self.counts.borrow_mut().push(count);
    }
}

struct Harness {
    target: Rc<Probe>,
    /// Strong handles; `None` once dropped or never created.
    handles: Vec<Option<Observer<u32>>>,
    /// Observer indices registered with the target, in insertion order.
    model: Vec<usize>,
    calls: Rc<RefCell<Vec<usize>>>,
}

impl Harness {
    fn new() -> Self {
        let target = Rc::new(Probe::default());
        set_fluid_getter(&target, || 0_u32).unwrap();
        set_fluid_hooks::<_, u32>(&target).unwrap();
        Self {
            target,
            handles: vec![None; POOL],
            model: Vec::new(),
            calls: Rc::default(),
        }
    }

    fn handle(&mut self, index: usize) -> Observer<u32> {
        if let Some(existing) = &self.handles[index] {
            return existing.clone();
        }
        let calls = Rc::clone(&self.calls);
        let created = Observer::from_fn(move |_: &u32| calls.borrow_mut().push(index));
        self.handles[index] = Some(created.clone());
        created
    }

    fn apply(&mut self, op: &Op) {
        match *op {
            Op::Add(index) => {
                let observer = self.handle(index);
                let _ = add_fluid_observer(&self.target, observer);
                if !self.model.contains(&index) {
                    self.model.push(index);
                }
            }
            Op::Remove(index) => {
                let observer = self.handle(index);
                remove_fluid_observer(&self.target, &observer);
                self.model.retain(|member| *member != index);
            }
            Op::Drop(index) => {
                self.handles[index] = None;
                self.model.retain(|member| *member != index);
            }
            Op::Broadcast => {
                self.calls.borrow_mut().clear();
                call_fluid_observers(&self.target, &1_u32);
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn registry_matches_model(ops in prop::collection::vec(arb_op(), 1..48)) {
        let mut harness = Harness::new();
        for op in &ops {
            let hooks_before = harness.target.counts.borrow().len();
            harness.apply(op);

            if matches!(op, Op::Broadcast) {
                prop_assert_eq!(&*harness.calls.borrow(), &harness.model);
                // Broadcast prunes, so afterwards the set matches the model.
                match get_fluid_observers::<_, u32>(&harness.target) {
                    Some(view) => prop_assert_eq!(view.len(), harness.model.len()),
                    None => prop_assert!(harness.model.is_empty()),
                }
            }

            let live: Vec<Observer<u32>> = harness
                .model
                .iter()
                .filter_map(|index| harness.handles[*index].clone())
                .collect();
            let observers = get_fluid_observers::<_, u32>(&harness.target);
            prop_assert_eq!(observers.is_some(), !live.is_empty());
            prop_assert_eq!(has_hidden(&harness.target, OBSERVERS_SLOT), !live.is_empty());
            match &observers {
                Some(view) => {
                    prop_assert!(!view.is_empty());
                    prop_assert_eq!(view.to_vec(), live);
                }
                None => prop_assert!(harness.model.is_empty()),
            }

            let tracked = observers.map_or(0, |v| v.len());
            let counts = harness.target.counts.borrow();
            if counts.len() > hooks_before {
                let last = *counts.last().unwrap();
                prop_assert_eq!(last, tracked);
            }
        }
    }

    #[test]
    fn duplicate_adds_never_grow_the_set(repeats in 1usize..8) {
        let mut harness = Harness::new();
        for _ in 0..repeats {
            harness.apply(&Op::Add(0));
        }
        prop_assert_eq!(get_fluid_observers::<_, u32>(&harness.target).map(|v| v.len()), Some(1));
        prop_assert_eq!(&*harness.target.counts.borrow(), &vec![1]);
    }
}
