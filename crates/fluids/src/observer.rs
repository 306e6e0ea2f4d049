#![forbid(unsafe_code)]

//! Observers and observer sets.
//!
//! An [`Observer`] is either a plain callback or an object implementing
//! [`FluidObserver`]. The calling convention is fixed when the observer is
//! constructed, so a set may freely mix both kinds.
//!
//! Sets hold observers by `Weak` reference, compared by allocation address.
//! Registration never keeps an observer alive: the caller keeps the strong
//! handle, and observers whose handles were all dropped are pruned the next
//! time the set is touched.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

/// An object that receives events through a method.
pub trait FluidObserver<E: ?Sized> {
    /// Handle one event.
    fn event_observed(&self, event: &E);
}

/// Identity of an observer: the address of its shared allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(usize);

/// A strong handle to an observer.
///
/// Cloning yields another handle to the same observer (same [`ObserverId`]).
pub enum Observer<E: ?Sized> {
    /// Invoked as `callback(event)`.
    Callable(Rc<dyn Fn(&E)>),
    /// Invoked as `observer.event_observed(event)`.
    Object(Rc<dyn FluidObserver<E>>),
}

impl<E: ?Sized> Clone for Observer<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Callable(f) => Self::Callable(Rc::clone(f)),
            Self::Object(o) => Self::Object(Rc::clone(o)),
        }
    }
}

impl<E: ?Sized> fmt::Debug for Observer<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Callable(_) => "Callable",
            Self::Object(_) => "Object",
        };
        f.debug_struct("Observer")
            .field("kind", &kind)
            .field("id", &self.id())
            .finish()
    }
}

impl<E: ?Sized> PartialEq for Observer<E> {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl<E: ?Sized> Eq for Observer<E> {}

impl<E: ?Sized + 'static> Observer<E> {
    /// Wrap a callback.
    pub fn from_fn(callback: impl Fn(&E) + 'static) -> Self {
        Self::Callable(Rc::new(callback))
    }

    /// Wrap a shared object observer. The returned handle shares `observer`'s
    /// identity, so the same `Rc` always maps to the same observer.
    pub fn from_object<O: FluidObserver<E> + 'static>(observer: &Rc<O>) -> Self {
        let shared: Rc<dyn FluidObserver<E>> = Rc::clone(observer) as Rc<dyn FluidObserver<E>>;
        Self::Object(shared)
    }
}

impl<E: ?Sized> Observer<E> {
    /// Identity used for set membership.
    #[must_use]
    pub fn id(&self) -> ObserverId {
        match self {
            Self::Callable(f) => ObserverId(Rc::as_ptr(f).cast::<()>() as usize),
            Self::Object(o) => ObserverId(Rc::as_ptr(o).cast::<()>() as usize),
        }
    }

    /// Whether this observer uses the method calling convention.
    #[must_use]
    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    pub(crate) fn downgrade(&self) -> WeakObserver<E> {
        match self {
            Self::Callable(f) => WeakObserver::Callable(Rc::downgrade(f)),
            Self::Object(o) => WeakObserver::Object(Rc::downgrade(o)),
        }
    }
}

/// Non-owning form stored in a set.
pub(crate) enum WeakObserver<E: ?Sized> {
    Callable(Weak<dyn Fn(&E)>),
    Object(Weak<dyn FluidObserver<E>>),
}

impl<E: ?Sized> WeakObserver<E> {
    fn id(&self) -> ObserverId {
        match self {
            Self::Callable(f) => ObserverId(Weak::as_ptr(f).cast::<()>() as usize),
            Self::Object(o) => ObserverId(Weak::as_ptr(o).cast::<()>() as usize),
        }
    }

    fn upgrade(&self) -> Option<Observer<E>> {
        match self {
            Self::Callable(f) => f.upgrade().map(Observer::Callable),
            Self::Object(o) => o.upgrade().map(Observer::Object),
        }
    }

    fn is_live(&self) -> bool {
        match self {
            Self::Callable(f) => f.strong_count() > 0,
            Self::Object(o) => o.strong_count() > 0,
        }
    }
}

/// Insertion-ordered set of observers, by identity.
pub(crate) struct ObserverSet<E: ?Sized> {
    members: Vec<(ObserverId, WeakObserver<E>)>,
}

impl<E: ?Sized> ObserverSet<E> {
    pub(crate) fn new() -> Self {
        Self {
            members: Vec::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.members.len()
    }

    /// Members whose observer still exists.
    pub(crate) fn live_len(&self) -> usize {
        self.members.iter().filter(|(_, weak)| weak.is_live()).count()
    }

    pub(crate) fn contains(&self, id: ObserverId) -> bool {
        self.members.iter().any(|(member, _)| *member == id)
    }

    /// Insert unless already present. Returns whether it was inserted.
    pub(crate) fn insert(&mut self, observer: &Observer<E>) -> bool {
        let id = observer.id();
        if self.contains(id) {
            return false;
        }
        let weak = observer.downgrade();
        debug_assert_eq!(weak.id(), id);
        self.members.push((id, weak));
        true
    }

    /// Remove by identity. Returns whether it was present.
    pub(crate) fn remove(&mut self, id: ObserverId) -> bool {
        match self.members.iter().position(|(member, _)| *member == id) {
            Some(index) => {
                self.members.remove(index);
                true
            }
            None => false,
        }
    }

    /// Drop members whose observer no longer exists. Returns how many.
    pub(crate) fn prune(&mut self) -> usize {
        let before = self.members.len();
        self.members.retain(|(_, weak)| weak.is_live());
        before - self.members.len()
    }

    /// Strong handles to live members, in insertion order.
    pub(crate) fn snapshot(&self) -> Vec<Observer<E>> {
        self.members
            .iter()
            .filter_map(|(_, weak)| weak.upgrade())
            .collect()
    }
}

/// Read-only view of a target's observer set.
///
/// The view is live: it reflects later subscriptions on the same set. Once
/// the last observer is removed the target drops the set, and this view
/// keeps showing the set it was taken from.
pub struct FluidObservers<E: ?Sized> {
    set: Rc<RefCell<ObserverSet<E>>>,
}

impl<E: ?Sized> Clone for FluidObservers<E> {
    fn clone(&self) -> Self {
        Self {
            set: Rc::clone(&self.set),
        }
    }
}

impl<E: ?Sized> fmt::Debug for FluidObservers<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FluidObservers")
            .field("len", &self.len())
            .finish()
    }
}

impl<E: ?Sized> FluidObservers<E> {
    pub(crate) fn new(set: Rc<RefCell<ObserverSet<E>>>) -> Self {
        Self { set }
    }

    /// Number of live observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.set.borrow().live_len()
    }

    /// Whether no live observer remains. A freshly returned view is never
    /// empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `observer` is a member.
    #[must_use]
    pub fn contains(&self, observer: &Observer<E>) -> bool {
        self.set.borrow().contains(observer.id())
    }

    /// Strong handles to the live members, in registration order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Observer<E>> {
        self.set.borrow().snapshot()
    }
}
