#![forbid(unsafe_code)]

//! Fluidity predicate and value accessors.
//!
//! A target is fluid when its getter slot holds a getter. Every function here
//! accepts any [`FluidTarget`], including primitives and `None`, and never
//! fails: non-fluid inputs take the pass-through branch.
//!
//! ```
//! use std::rc::Rc;
//! use fluids::{get_fluid_value, has_fluid_value, set_fluid_getter};
//!
//! let spring = Rc::new(());
//! set_fluid_getter(&spring, || 5_i32).unwrap();
//! assert!(has_fluid_value(&spring));
//! assert_eq!(get_fluid_value::<_, i32>(&spring).fluid(), Some(5));
//!
//! // Plain values pass through untouched.
//! assert_eq!(get_fluid_value::<_, i32>(&42_i32).into_value(), 42);
//! ```

use std::any::Any;
use std::rc::Rc;

use tracing::trace;

use crate::error::Result;
use crate::observer::FluidObservers;
use crate::registry::{SetLookup, lookup_set, settle_pruned};
use crate::slot::{
    FluidTarget, GETTER_SLOT, OBSERVERS_SLOT, defines_slot, get_hidden, has_hidden, set_hidden,
};

/// Stored getter. `None` means the value's owner is gone.
pub(crate) struct Getter<V>(Box<dyn Fn() -> Option<V>>);

impl<V> Getter<V> {
    pub(crate) fn new(get: impl Fn() -> Option<V> + 'static) -> Self {
        Self(Box::new(get))
    }
}

/// Result of reading a maybe-fluid input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FluidOr<'a, T: ?Sized, V> {
    /// The input is fluid; this is a fresh read of its getter.
    Fluid(V),
    /// The input is not fluid and is passed through unchanged.
    Plain(&'a T),
}

impl<'a, T: ?Sized, V> FluidOr<'a, T, V> {
    /// Whether the input was fluid.
    #[must_use]
    pub fn is_fluid(&self) -> bool {
        matches!(self, Self::Fluid(_))
    }

    /// The fluid value, if any.
    #[must_use]
    pub fn fluid(self) -> Option<V> {
        match self {
            Self::Fluid(value) => Some(value),
            Self::Plain(_) => None,
        }
    }

    /// The fluid value, or one derived from the passed-through input.
    pub fn unwrap_or_else(self, plain: impl FnOnce(&'a T) -> V) -> V {
        match self {
            Self::Fluid(value) => value,
            Self::Plain(input) => plain(input),
        }
    }
}

impl<T: Clone> FluidOr<'_, T, T> {
    /// Collapse to a value when the getter yields the input's own type.
    #[must_use]
    pub fn into_value(self) -> T {
        self.unwrap_or_else(T::clone)
    }
}

/// Whether `target` carries a value getter.
#[must_use]
pub fn has_fluid_value<T: FluidTarget + ?Sized>(target: &T) -> bool {
    has_hidden(target, GETTER_SLOT)
}

/// Read the current value of a maybe-fluid input.
///
/// The getter is invoked on every call; nothing is cached. A getter
/// registered for a value type other than `V` takes the pass-through branch.
pub fn get_fluid_value<T: FluidTarget + ?Sized, V: 'static>(target: &T) -> FluidOr<'_, T, V> {
    let Some(slot) = get_hidden(target, GETTER_SLOT) else {
        return FluidOr::Plain(target);
    };
    match slot.downcast::<Getter<V>>() {
        Ok(getter) => match (getter.0)() {
            Some(value) => FluidOr::Fluid(value),
            None => FluidOr::Plain(target),
        },
        Err(_) => {
            trace!(
                value_type = std::any::type_name::<V>(),
                "getter yields a different value type"
            );
            FluidOr::Plain(target)
        }
    }
}

/// The observer set of `target`, or `None` when it has no live observers for
/// events of type `E`.
///
/// Dropped observers are pruned first. If none remain the set is released,
/// and the target's `observers_pruned` hook fires either way.
///
/// The view is read-only. Mutate the set through
/// [`add_fluid_observer`](crate::add_fluid_observer) and
/// [`remove_fluid_observer`](crate::remove_fluid_observer).
#[must_use]
pub fn get_fluid_observers<T: FluidTarget + ?Sized, E: ?Sized + 'static>(
    target: &T,
) -> Option<FluidObservers<E>> {
    let SetLookup::Found(set) = lookup_set::<T, E>(target) else {
        return None;
    };
    let (pruned, remaining) = {
        let mut members = set.borrow_mut();
        let pruned = members.prune();
        (pruned, members.len())
    };
    settle_pruned(target, &set, pruned, remaining);
    (remaining > 0).then(|| FluidObservers::new(set))
}

/// Make `target` fluid with `get` as its value getter.
///
/// Also defines the observer slot (absent) so the target can be subscribed
/// to after it is sealed.
///
/// The slot table owns `get`. A getter that captures a strong `Rc` to its
/// own target keeps that target alive for the rest of the thread, and its
/// entry is never swept. Capture `Rc::downgrade(target)` instead.
///
/// # Errors
///
/// [`FluidError::NoIdentity`](crate::FluidError::NoIdentity) for targets that
/// cannot be anchored, [`FluidError::Sealed`](crate::FluidError::Sealed) when
/// the target was sealed before it became fluid.
pub fn set_fluid_getter<T, V, F>(target: &T, get: F) -> Result<()>
where
    T: FluidTarget + ?Sized,
    V: 'static,
    F: Fn() -> V + 'static,
{
    install_getter(target, Getter::new(move || Some(get())))
}

pub(crate) fn install_getter<T: FluidTarget + ?Sized, V: 'static>(
    target: &T,
    getter: Getter<V>,
) -> Result<()> {
    let getter: Rc<dyn Any> = Rc::new(getter);
    set_hidden(target, GETTER_SLOT, Some(getter))?;
    if !defines_slot(target, OBSERVERS_SLOT) {
        set_hidden(target, OBSERVERS_SLOT, None)?;
    }
    Ok(())
}
