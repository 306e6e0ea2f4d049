#![forbid(unsafe_code)]

//! Event delivery.
//!
//! A broadcast snapshots the observer set before calling anyone, so
//! observers may subscribe or unsubscribe (themselves or others) while it
//! runs. Changes take effect from the next broadcast; an observer removed
//! mid-broadcast that is still in the snapshot is called.
//!
//! Observer panics are not caught. A panic unwinds out of
//! [`call_fluid_observers`] and the remaining observers are skipped. The set
//! is not borrowed while observers run, so it stays usable afterwards.

use tracing::{debug, warn};

use crate::observer::Observer;
use crate::registry::{SetLookup, lookup_set, settle_pruned};
use crate::slot::FluidTarget;

/// Deliver `event` to one observer using its calling convention.
pub fn call_fluid_observer<E: ?Sized>(observer: &Observer<E>, event: &E) {
    match observer {
        Observer::Callable(callback) => callback(event),
        Observer::Object(object) => object.event_observed(event),
    }
}

/// Deliver `event` to every observer of `target`, in registration order.
///
/// Every observer receives the same `&E`. A target with no observers is a
/// no-op.
pub fn call_fluid_observers<T: FluidTarget + ?Sized, E: ?Sized + 'static>(target: &T, event: &E) {
    let set = match lookup_set::<T, E>(target) {
        SetLookup::Found(set) => set,
        SetLookup::Absent => return,
        SetLookup::Mismatch => {
            warn!(
                event_type = std::any::type_name::<E>(),
                "call_fluid_observers: observer set holds a different event type"
            );
            return;
        }
    };

    let (snapshot, pruned, remaining) = {
        let mut members = set.borrow_mut();
        let pruned = members.prune();
        (members.snapshot(), pruned, members.len())
    };
    settle_pruned(target, &set, pruned, remaining);
    drop(set);

    if snapshot.is_empty() {
        return;
    }
    debug!(observers = snapshot.len(), "broadcast");
    for observer in &snapshot {
        call_fluid_observer(observer, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::FluidObserver;
    use crate::registry::{
        ObserverLifecycle, add_fluid_observer, remove_fluid_observer, set_fluid_hooks,
    };
    use crate::slot::{OBSERVERS_SLOT, has_hidden};
    use crate::value::{get_fluid_observers, set_fluid_getter};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn fluid() -> Rc<()> {
        let target = Rc::new(());
        set_fluid_getter(&target, || 0_u8).unwrap();
        target
    }

    struct Tally(Cell<u32>);

    impl FluidObserver<u32> for Tally {
        fn event_observed(&self, event: &u32) {
            self.0.set(self.0.get() + event);
        }
    }

    #[test]
    fn single_observer_both_conventions() {
        let seen = Rc::new(Cell::new(0));
        let seen_clone = Rc::clone(&seen);
        let callable = Observer::<u32>::from_fn(move |e| seen_clone.set(*e));
        call_fluid_observer(&callable, &9);
        assert_eq!(seen.get(), 9);

        let tally = Rc::new(Tally(Cell::new(0)));
        call_fluid_observer(&Observer::from_object(&tally), &4);
        assert_eq!(tally.0.get(), 4);
    }

    #[test]
    fn broadcast_in_registration_order() {
        let target = fluid();
        let order = Rc::new(RefCell::new(Vec::new()));
        let handles: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|name| {
                let order = Rc::clone(&order);
                let observer = Observer::<u32>::from_fn(move |_| order.borrow_mut().push(name));
                add_fluid_observer(&target, observer)
            })
            .collect();
        call_fluid_observers(&target, &1_u32);
        assert_eq!(*order.borrow(), vec!["a", "b", "c"]);
        drop(handles);
    }

    #[test]
    fn no_observers_is_noop() {
        let target = fluid();
        call_fluid_observers(&target, &1_u32);
        call_fluid_observers(&7_i32, &1_u32);
        call_fluid_observers(&None::<Rc<()>>, &1_u32);
    }

    #[test]
    fn broadcast_prunes_and_releases_set() {
        #[derive(Default)]
        struct Pruned(Cell<usize>);
        impl ObserverLifecycle<u32> for Pruned {
            fn observers_pruned(&self, count: usize, pruned: usize) {
                assert_eq!(count, 0);
                self.0.set(pruned);
            }
        }

        let target = Rc::new(Pruned::default());
        set_fluid_getter(&target, || 0_u8).unwrap();
        set_fluid_hooks::<_, u32>(&target).unwrap();
        let gone = add_fluid_observer(&target, Observer::<u32>::from_fn(|_| {}));
        drop(gone);

        call_fluid_observers(&target, &1_u32);
        assert_eq!(target.0.get(), 1);
        assert!(!has_hidden(&target, OBSERVERS_SLOT));
    }

    #[test]
    fn self_removal_mid_broadcast() {
        let target = fluid();
        let calls = Rc::new(Cell::new(0));
        let slot: Rc<RefCell<Option<Observer<u32>>>> = Rc::new(RefCell::new(None));

        let observer = {
            let target = Rc::clone(&target);
            let calls = Rc::clone(&calls);
            let slot = Rc::clone(&slot);
            Observer::<u32>::from_fn(move |_| {
                calls.set(calls.get() + 1);
                if let Some(me) = slot.borrow().as_ref() {
                    remove_fluid_observer(&target, me);
                }
            })
        };
        let observer = add_fluid_observer(&target, observer);
        *slot.borrow_mut() = Some(observer.clone());

        call_fluid_observers(&target, &1_u32);
        call_fluid_observers(&target, &1_u32);
        assert_eq!(calls.get(), 1);
        assert!(get_fluid_observers::<_, u32>(&target).is_none());
        slot.borrow_mut().take();
    }
}
