#![forbid(unsafe_code)]

//! Observer registration.
//!
//! A target's observer set is created on first subscription and reset to
//! absent when its last observer leaves, so "has observers" is always a
//! presence check on the observer slot.
//!
//! # Invariants
//!
//! 1. The observer slot is never present-but-empty.
//! 2. Adding a member twice is a no-op; `observer_added` fires only on a
//!    real insertion.
//! 3. Removing a non-member is a no-op; no hook fires.
//! 4. Counts passed to hooks are the set size after the change.
//! 5. Hooks run after the set has been updated, with no borrow held, so they
//!    may subscribe, unsubscribe or broadcast.
//!
//! # Pruning
//!
//! Observers are held weakly. Members whose last strong handle was dropped
//! are pruned whenever the set is touched (add, remove, broadcast or query),
//! and the target is told through [`ObserverLifecycle::observers_pruned`].

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::{trace, warn};

use crate::config::{BareTargetPolicy, current_config};
use crate::error::Result;
use crate::observer::{Observer, ObserverSet};
use crate::slot::{FluidTarget, HOOKS_SLOT, OBSERVERS_SLOT, get_hidden, set_hidden};
use crate::value::has_fluid_value;

/// Optional producer callbacks fired when a target's observer count changes.
///
/// All methods default to no-ops.
pub trait ObserverLifecycle<E: ?Sized> {
    /// `observer` was inserted; `count` is the new set size.
    fn observer_added(&self, _count: usize, _observer: &Observer<E>) {}

    /// `observer` was removed; `count` is the remaining set size.
    fn observer_removed(&self, _count: usize, _observer: &Observer<E>) {}

    /// `pruned` observers were found dropped and discarded; `count` is the
    /// remaining set size.
    fn observers_pruned(&self, _count: usize, _pruned: usize) {}
}

struct Hooks<E: ?Sized>(Rc<dyn ObserverLifecycle<E>>);

/// Forwards to the target itself while it is alive.
struct TargetHooks<T>(Weak<T>);

impl<T, E> ObserverLifecycle<E> for TargetHooks<T>
where
    T: ObserverLifecycle<E>,
    E: ?Sized,
{
    fn observer_added(&self, count: usize, observer: &Observer<E>) {
        if let Some(target) = self.0.upgrade() {
            target.observer_added(count, observer);
        }
    }

    fn observer_removed(&self, count: usize, observer: &Observer<E>) {
        if let Some(target) = self.0.upgrade() {
            target.observer_removed(count, observer);
        }
    }

    fn observers_pruned(&self, count: usize, pruned: usize) {
        if let Some(target) = self.0.upgrade() {
            target.observers_pruned(count, pruned);
        }
    }
}

/// Register `target`'s own [`ObserverLifecycle`] impl as its hooks.
///
/// The target is held weakly.
///
/// # Errors
///
/// [`FluidError::Sealed`](crate::FluidError::Sealed) if the target was sealed
/// before its hooks were registered.
pub fn set_fluid_hooks<T, E>(target: &Rc<T>) -> Result<()>
where
    T: ObserverLifecycle<E> + 'static,
    E: ?Sized + 'static,
{
    let hooks: Rc<dyn ObserverLifecycle<E>> = Rc::new(TargetHooks(Rc::downgrade(target)));
    install_hooks(target, hooks)
}

pub(crate) fn install_hooks<T: FluidTarget + ?Sized, E: ?Sized + 'static>(
    target: &T,
    hooks: Rc<dyn ObserverLifecycle<E>>,
) -> Result<()> {
    let slot: Rc<dyn Any> = Rc::new(Hooks(hooks));
    set_hidden(target, HOOKS_SLOT, Some(slot))
}

fn hooks_of<T: FluidTarget + ?Sized, E: ?Sized + 'static>(
    target: &T,
) -> Option<Rc<dyn ObserverLifecycle<E>>> {
    let hooks = get_hidden(target, HOOKS_SLOT)?.downcast::<Hooks<E>>().ok()?;
    Some(Rc::clone(&hooks.0))
}

pub(crate) enum SetLookup<E: ?Sized> {
    Found(Rc<RefCell<ObserverSet<E>>>),
    Absent,
    /// The set exists but holds observers of another event type.
    Mismatch,
}

pub(crate) fn lookup_set<T: FluidTarget + ?Sized, E: ?Sized + 'static>(
    target: &T,
) -> SetLookup<E> {
    match get_hidden(target, OBSERVERS_SLOT) {
        None => SetLookup::Absent,
        Some(slot) => match slot.downcast::<RefCell<ObserverSet<E>>>() {
            Ok(set) => SetLookup::Found(set),
            Err(_) => SetLookup::Mismatch,
        },
    }
}

fn warn_mismatch<E: ?Sized>(operation: &'static str) {
    warn!(
        operation,
        event_type = std::any::type_name::<E>(),
        "observer set holds a different event type"
    );
}

/// Reset the observer slot to absent if it still holds `set`.
fn release_set<T: FluidTarget + ?Sized, E: ?Sized + 'static>(
    target: &T,
    set: &Rc<RefCell<ObserverSet<E>>>,
) {
    let current = match lookup_set::<T, E>(target) {
        SetLookup::Found(current) => current,
        SetLookup::Absent | SetLookup::Mismatch => return,
    };
    if !Rc::ptr_eq(&current, set) {
        return;
    }
    drop(current);
    if let Err(err) = set_hidden(target, OBSERVERS_SLOT, None) {
        warn!(%err, "could not reset observer slot");
    } else {
        trace!("observer set released");
    }
}

/// Tell the target about pruned observers, releasing the set if it emptied.
pub(crate) fn settle_pruned<T: FluidTarget + ?Sized, E: ?Sized + 'static>(
    target: &T,
    set: &Rc<RefCell<ObserverSet<E>>>,
    pruned: usize,
    remaining: usize,
) {
    if pruned == 0 {
        return;
    }
    trace!(pruned, remaining, "pruned dropped observers");
    if remaining == 0 {
        release_set(target, set);
    }
    if let Some(hooks) = hooks_of::<T, E>(target) {
        hooks.observers_pruned(remaining, pruned);
    }
}

/// Subscribe `observer` to `target` and hand it back.
///
/// The set holds the observer weakly: keep the returned handle (or a clone)
/// for as long as the subscription should last, and pass it to
/// [`remove_fluid_observer`] to unsubscribe.
///
/// Targets without a getter are left alone under
/// [`BareTargetPolicy::Ignore`] and subscribed anyway under
/// [`BareTargetPolicy::Register`].
#[must_use = "observers are held weakly; dropping every handle ends the subscription"]
pub fn add_fluid_observer<T: FluidTarget + ?Sized, E: ?Sized + 'static>(
    target: &T,
    observer: Observer<E>,
) -> Observer<E> {
    if !has_fluid_value(target) && current_config().bare_targets == BareTargetPolicy::Ignore {
        trace!("add_fluid_observer: target is not fluid");
        return observer;
    }

    let set = match lookup_set::<T, E>(target) {
        SetLookup::Found(set) => set,
        SetLookup::Absent => {
            let set = Rc::new(RefCell::new(ObserverSet::<E>::new()));
            let slot: Rc<dyn Any> = Rc::clone(&set) as Rc<dyn Any>;
            if let Err(err) = set_hidden(target, OBSERVERS_SLOT, Some(slot)) {
                warn!(%err, "add_fluid_observer: cannot attach observer set");
                return observer;
            }
            trace!("observer set created");
            set
        }
        SetLookup::Mismatch => {
            warn_mismatch::<E>("add_fluid_observer");
            return observer;
        }
    };

    let (inserted, pruned, count) = {
        let mut members = set.borrow_mut();
        let pruned = members.prune();
        let inserted = members.insert(&observer);
        (inserted, pruned, members.len())
    };
    // The caller holds `observer`, so the set cannot be empty here.
    if pruned > 0 {
        settle_pruned(target, &set, pruned, count);
    }
    if inserted {
        trace!(count, "observer added");
        if let Some(hooks) = hooks_of::<T, E>(target) {
            hooks.observer_added(count, &observer);
        }
    }
    observer
}

/// Unsubscribe `observer` from `target`. A no-op if it is not a member.
pub fn remove_fluid_observer<T: FluidTarget + ?Sized, E: ?Sized + 'static>(
    target: &T,
    observer: &Observer<E>,
) {
    let set = match lookup_set::<T, E>(target) {
        SetLookup::Found(set) => set,
        SetLookup::Absent => return,
        SetLookup::Mismatch => {
            warn_mismatch::<E>("remove_fluid_observer");
            return;
        }
    };

    let (pruned, count) = {
        let mut members = set.borrow_mut();
        if !members.remove(observer.id()) {
            return;
        }
        let pruned = members.prune();
        (pruned, members.len())
    };
    if count == 0 {
        release_set(target, &set);
    }
    trace!(count, "observer removed");
    let hooks = hooks_of::<T, E>(target);
    if let Some(hooks) = &hooks {
        hooks.observer_removed(count, observer);
        if pruned > 0 {
            hooks.observers_pruned(count, pruned);
        }
    }
}
