#![forbid(unsafe_code)]

//! Hidden protocol slots attached to arbitrary targets.
//!
//! # Design
//!
//! Targets are not modified. Each thread owns a side table mapping a
//! target's identity ([`FluidId`], the address of its shared allocation) to
//! the slots defined on it. An entry holds a `Weak` anchor to the target:
//! the table never keeps a target alive, and because a `Weak` pins the
//! allocation, an address cannot be reused by another target while its entry
//! exists.
//!
//! Slots are named by [`SlotKey`], compared by their reserved name rather
//! than by the address of a constant, so every crate that links this one
//! agrees on which slot is which.
//!
//! # Invariants
//!
//! 1. At most one value per (target, slot key).
//! 2. A slot can be *defined but absent* (`None`). Sealing only rejects
//!    slots that were never defined.
//! 3. No user code runs while the table is borrowed: values are cloned out
//!    before use and displaced values are dropped after the borrow ends.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | No identity | Primitive or `None` target | `FluidError::NoIdentity` |
//! | Sealed | New slot on a sealed target | `FluidError::Sealed` |
//! | Dead target | Target dropped | Entry swept past the threshold |

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::collections::hash_map::Entry as MapEntry;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::config::current_config;
use crate::error::{FluidError, Result};

/// Reserved name of a protocol slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotKey(&'static str);

impl SlotKey {
    /// Create a key. Keys with the same name are the same key.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// The reserved name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Slot carrying the value getter. Its presence makes a target fluid.
pub const GETTER_SLOT: SlotKey = SlotKey::new("FluidValue.get");
/// Slot carrying the observer set.
pub const OBSERVERS_SLOT: SlotKey = SlotKey::new("FluidValue.observers");
/// Slot carrying the optional observer lifecycle hooks.
pub const HOOKS_SLOT: SlotKey = SlotKey::new("FluidValue.hooks");

/// Identity of a target: the address of its shared allocation.
///
/// An id stays unique while its target is alive, and while the slot table
/// still holds the dropped target's entry. Once [`sweep`] removes that entry
/// the address can be reused, so a stale id (an old event's `parent`, say)
/// may then name an unrelated new target. Keep ids no longer than the
/// target they came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FluidId(usize);

impl FluidId {
    /// Identity of the allocation behind `rc`.
    #[must_use]
    pub fn of<T: ?Sized>(rc: &Rc<T>) -> Self {
        Self(Rc::as_ptr(rc).cast::<()>() as usize)
    }

    /// Raw address, for diagnostics.
    #[must_use]
    pub const fn addr(self) -> usize {
        self.0
    }
}

/// A value that may carry protocol slots.
///
/// Anchored targets (`Rc<T>`) have an identity and can have slots installed.
/// Everything else answers `None` and simply takes the non-fluid branch of
/// every query.
pub trait FluidTarget {
    /// Stable identity, if this value has one.
    fn fluid_id(&self) -> Option<FluidId>;

    /// Weak anchor used to detect when the target is dropped.
    fn fluid_anchor(&self) -> Option<Weak<dyn Any>> {
        None
    }
}

impl<T: Any> FluidTarget for Rc<T> {
    fn fluid_id(&self) -> Option<FluidId> {
        Some(FluidId::of(self))
    }

    fn fluid_anchor(&self) -> Option<Weak<dyn Any>> {
        let weak: Weak<T> = Rc::downgrade(self);
        Some(weak)
    }
}

impl FluidTarget for Rc<dyn Any> {
    fn fluid_id(&self) -> Option<FluidId> {
        Some(FluidId::of(self))
    }

    fn fluid_anchor(&self) -> Option<Weak<dyn Any>> {
        Some(Rc::downgrade(self))
    }
}

impl FluidTarget for FluidId {
    fn fluid_id(&self) -> Option<FluidId> {
        Some(*self)
    }
}

impl<T: FluidTarget + ?Sized> FluidTarget for &T {
    fn fluid_id(&self) -> Option<FluidId> {
        (**self).fluid_id()
    }

    fn fluid_anchor(&self) -> Option<Weak<dyn Any>> {
        (**self).fluid_anchor()
    }
}

impl<T: FluidTarget> FluidTarget for Option<T> {
    fn fluid_id(&self) -> Option<FluidId> {
        self.as_ref().and_then(FluidTarget::fluid_id)
    }

    fn fluid_anchor(&self) -> Option<Weak<dyn Any>> {
        self.as_ref().and_then(FluidTarget::fluid_anchor)
    }
}

macro_rules! opaque_targets {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FluidTarget for $ty {
                fn fluid_id(&self) -> Option<FluidId> {
                    None
                }
            }
        )*
    };
}

opaque_targets!(
    (),
    bool,
    char,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    f32,
    f64,
    str,
    String,
);

type SlotValue = Option<Rc<dyn Any>>;

struct Entry {
    anchor: Weak<dyn Any>,
    sealed: bool,
    slots: HashMap<SlotKey, SlotValue>,
}

impl Entry {
    fn new(anchor: Weak<dyn Any>) -> Self {
        Self {
            anchor,
            sealed: false,
            slots: HashMap::new(),
        }
    }

    fn is_live(&self) -> bool {
        self.anchor.strong_count() > 0
    }
}

#[derive(Default)]
struct SlotTable {
    entries: HashMap<FluidId, Entry>,
    /// Table size at which the next insertion sweeps dead entries.
    sweep_at: usize,
}

impl SlotTable {
    /// Find or create the entry for `id`. Creating needs an anchor.
    fn entry_mut(
        &mut self,
        id: FluidId,
        anchor: Option<Weak<dyn Any>>,
    ) -> Result<&mut Entry> {
        match self.entries.entry(id) {
            MapEntry::Occupied(slot) => Ok(slot.into_mut()),
            MapEntry::Vacant(slot) => {
                let anchor = anchor.ok_or(FluidError::NoIdentity)?;
                trace!(target_id = id.addr(), "slot table: new target");
                Ok(slot.insert(Entry::new(anchor)))
            }
        }
    }

    /// Remove entries whose target was dropped, returning them so they can be
    /// dropped once the table is no longer borrowed.
    fn sweep(&mut self) -> Vec<Entry> {
        let dead: Vec<FluidId> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_live())
            .map(|(id, _)| *id)
            .collect();
        let removed: Vec<Entry> = dead
            .iter()
            .filter_map(|id| self.entries.remove(id))
            .collect();
        let threshold = current_config().sweep_threshold;
        self.sweep_at = threshold.max(self.entries.len().saturating_mul(2));
        if !removed.is_empty() {
            debug!(
                removed = removed.len(),
                live = self.entries.len(),
                "slot table: swept dead targets"
            );
        }
        removed
    }

    /// Entries of dropped targets read as if they did not exist.
    fn live(&self, id: FluidId) -> Option<&Entry> {
        self.entries.get(&id).filter(|entry| entry.is_live())
    }

    fn sweep_if_due(&mut self) -> Vec<Entry> {
        let due = self.sweep_at.max(current_config().sweep_threshold);
        if self.entries.len() >= due {
            self.sweep()
        } else {
            Vec::new()
        }
    }
}

thread_local! {
    static SLOTS: RefCell<SlotTable> = RefCell::new(SlotTable::default());
}

/// Define `key` on `target`, replacing any previous value.
///
/// Passing `None` leaves the slot defined but absent.
///
/// # Errors
///
/// [`FluidError::NoIdentity`] if the target cannot be anchored, or
/// [`FluidError::Sealed`] if the target is sealed and does not already
/// define `key`.
pub fn set_hidden<T: FluidTarget + ?Sized>(
    target: &T,
    key: SlotKey,
    value: Option<Rc<dyn Any>>,
) -> Result<()> {
    let id = target.fluid_id().ok_or(FluidError::NoIdentity)?;
    let (displaced, swept) = SLOTS.with(|table| {
        let mut table = table.borrow_mut();
        let swept = table.sweep_if_due();
        let entry = match table.entry_mut(id, target.fluid_anchor()) {
            Ok(entry) => entry,
            Err(err) => return (Err(err), swept),
        };
        if entry.sealed && !entry.slots.contains_key(&key) {
            return (Err(FluidError::Sealed { slot: key.name() }), swept);
        }
        trace!(target_id = id.addr(), slot = key.name(), present = value.is_some(), "define slot");
        (Ok(entry.slots.insert(key, value)), swept)
    });
    drop(swept);
    displaced.map(drop)
}

/// Read `key` from `target`. Total: returns `None` for any target that does
/// not carry a present value under `key`.
#[must_use]
pub fn get_hidden<T: FluidTarget + ?Sized>(target: &T, key: SlotKey) -> Option<Rc<dyn Any>> {
    let id = target.fluid_id()?;
    SLOTS.with(|table| {
        let table = table.borrow();
        let entry = table.live(id)?;
        entry.slots.get(&key)?.clone()
    })
}

/// Whether `target` carries a present value under `key`.
#[must_use]
pub fn has_hidden<T: FluidTarget + ?Sized>(target: &T, key: SlotKey) -> bool {
    let Some(id) = target.fluid_id() else {
        return false;
    };
    SLOTS.with(|table| {
        table
            .borrow()
            .live(id)
            .and_then(|entry| entry.slots.get(&key))
            .is_some_and(Option::is_some)
    })
}

/// Whether `target` defines `key` at all, present or absent.
#[must_use]
pub fn defines_slot<T: FluidTarget + ?Sized>(target: &T, key: SlotKey) -> bool {
    let Some(id) = target.fluid_id() else {
        return false;
    };
    SLOTS.with(|table| {
        table
            .borrow()
            .live(id)
            .is_some_and(|entry| entry.slots.contains_key(&key))
    })
}

/// Seal `target`: slots it already defines stay writable, new slots are
/// rejected with [`FluidError::Sealed`].
///
/// # Errors
///
/// [`FluidError::NoIdentity`] if the target cannot be anchored.
pub fn seal_target<T: FluidTarget + ?Sized>(target: &T) -> Result<()> {
    let id = target.fluid_id().ok_or(FluidError::NoIdentity)?;
    SLOTS.with(|table| {
        let mut table = table.borrow_mut();
        let entry = table.entry_mut(id, target.fluid_anchor())?;
        entry.sealed = true;
        Ok(())
    })
}

/// Whether `target` has been sealed.
#[must_use]
pub fn is_sealed<T: FluidTarget + ?Sized>(target: &T) -> bool {
    let Some(id) = target.fluid_id() else {
        return false;
    };
    SLOTS.with(|table| table.borrow().live(id).is_some_and(|e| e.sealed))
}

/// Drop entries whose target no longer exists. Returns how many were removed.
pub fn sweep() -> usize {
    let removed = SLOTS.with(|table| table.borrow_mut().sweep());
    let count = removed.len();
    drop(removed);
    count
}

/// Number of targets in this thread's slot table, dead ones included until
/// they are swept.
#[must_use]
pub fn tracked_targets() -> usize {
    SLOTS.with(|table| table.borrow().entries.len())
}
