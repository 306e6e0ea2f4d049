#![forbid(unsafe_code)]

//! Producer-side conveniences built on the protocol functions.
//!
//! [`FluidValue`] lets a type describe its value and event once and install
//! both the getter and the lifecycle hooks in one call. [`FluidCell`] is a
//! ready-made fluid value for code that just needs "a value that tells its
//! observers when it changes".
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use fluids::{add_fluid_observer, get_fluid_value, FluidCell, Observer};
//!
//! let cell = FluidCell::builder().initial(5_i32).build().unwrap();
//! assert_eq!(get_fluid_value::<_, i32>(&cell).fluid(), Some(5));
//!
//! let seen = Rc::new(Cell::new(0));
//! let sink = Rc::clone(&seen);
//! let _obs = add_fluid_observer(&cell, Observer::from_fn(move |e: &fluids::Event<i32>| {
//!     sink.set(e.payload);
//! }));
//! cell.set(7);
//! assert_eq!(seen.get(), 7);
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::dispatch::call_fluid_observers;
use crate::error::{FluidError, Result};
use crate::event::Event;
use crate::observer::Observer;
use crate::registry::{ObserverLifecycle, install_hooks};
use crate::slot::{FluidId, seal_target};
use crate::value::{Getter, install_getter};

/// A type that exposes a value through the fluid protocol.
pub trait FluidValue: 'static {
    /// What the getter returns.
    type Value: 'static;
    /// What observers receive.
    type Event: ?Sized + 'static;

    /// The current value.
    fn get(&self) -> Self::Value;

    /// Called after an observer subscribes; `count` is the new set size.
    fn observer_added(&self, _count: usize, _observer: &Observer<Self::Event>) {}

    /// Called after an observer leaves; `count` is the remaining set size.
    fn observer_removed(&self, _count: usize, _observer: &Observer<Self::Event>) {}
}

struct ValueHooks<T>(Weak<T>);

impl<T: FluidValue> ObserverLifecycle<T::Event> for ValueHooks<T> {
    fn observer_added(&self, count: usize, observer: &Observer<T::Event>) {
        if let Some(value) = self.0.upgrade() {
            value.observer_added(count, observer);
        }
    }

    fn observer_removed(&self, count: usize, observer: &Observer<T::Event>) {
        if let Some(value) = self.0.upgrade() {
            value.observer_removed(count, observer);
        }
    }
}

/// Make `target` fluid: install a getter forwarding to
/// [`FluidValue::get`] and the lifecycle hooks.
///
/// Both hold `target` weakly. Once it is dropped, reads through any other
/// handle to its identity pass through.
///
/// # Errors
///
/// [`FluidError::Sealed`] if `target` was sealed beforehand.
pub fn install_fluid_value<T: FluidValue>(target: &Rc<T>) -> Result<()> {
    let weak = Rc::downgrade(target);
    install_getter(target, Getter::new(move || weak.upgrade().map(|v| v.get())))?;
    let hooks: Rc<dyn ObserverLifecycle<T::Event>> = Rc::new(ValueHooks(Rc::downgrade(target)));
    install_hooks(target, hooks)
}

/// Broadcast `event` to the observers of `target`.
pub fn emit_fluid_event<T: FluidValue>(target: &Rc<T>, event: &T::Event) {
    call_fluid_observers(target, event);
}

type CountHook = Box<dyn Fn(usize)>;

enum Source<V> {
    Stored(V),
    Computed(Rc<dyn Fn() -> V>),
}

/// A fluid value that broadcasts [`Event::change`] when set.
pub struct FluidCell<V> {
    source: RefCell<Source<V>>,
    on_count: Option<CountHook>,
}

impl<V> fmt::Debug for FluidCell<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &*self.source.borrow() {
            Source::Stored(_) => "stored",
            Source::Computed(_) => "computed",
        };
        f.debug_struct("FluidCell")
            .field("source", &source)
            .finish_non_exhaustive()
    }
}

impl<V: Clone + 'static> FluidCell<V> {
    /// Start building a cell.
    #[must_use]
    pub fn builder() -> FluidCellBuilder<V> {
        FluidCellBuilder::new()
    }

    /// Identity of this cell, as carried in its events.
    #[must_use]
    pub fn id(self: &Rc<Self>) -> FluidId {
        FluidId::of(self)
    }

    /// Store `value` and broadcast a change event carrying it.
    ///
    /// A computed cell becomes a stored one.
    pub fn set(self: &Rc<Self>, value: V) {
        let event = Event::change(self.id(), value.clone());
        let previous = self.source.replace(Source::Stored(value));
        drop(previous);
        trace!("fluid cell set");
        emit_fluid_event(self, &event);
    }

    /// Broadcast a change event carrying the current value.
    ///
    /// For computed cells whose inputs changed behind their back.
    pub fn notify(self: &Rc<Self>) {
        let event = Event::change(self.id(), self.get());
        emit_fluid_event(self, &event);
    }
}

impl<V: Clone + 'static> FluidValue for FluidCell<V> {
    type Value = V;
    type Event = Event<V>;

    fn get(&self) -> V {
        let compute = match &*self.source.borrow() {
            Source::Stored(value) => return value.clone(),
            Source::Computed(compute) => Rc::clone(compute),
        };
        compute()
    }

    fn observer_added(&self, count: usize, _observer: &Observer<Event<V>>) {
        if let Some(hook) = &self.on_count {
            hook(count);
        }
    }

    fn observer_removed(&self, count: usize, _observer: &Observer<Event<V>>) {
        if let Some(hook) = &self.on_count {
            hook(count);
        }
    }
}

/// Builder for [`FluidCell`].
#[must_use]
pub struct FluidCellBuilder<V> {
    source: Option<Source<V>>,
    on_count: Option<CountHook>,
    sealed: bool,
}

impl<V> fmt::Debug for FluidCellBuilder<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FluidCellBuilder")
            .field("has_source", &self.source.is_some())
            .field("sealed", &self.sealed)
            .finish_non_exhaustive()
    }
}

impl<V: Clone + 'static> Default for FluidCellBuilder<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + 'static> FluidCellBuilder<V> {
    /// A builder with no value source.
    pub fn new() -> Self {
        Self {
            source: None,
            on_count: None,
            sealed: false,
        }
    }

    /// Store `value` as the initial value.
    pub fn initial(mut self, value: V) -> Self {
        self.source = Some(Source::Stored(value));
        self
    }

    /// Compute the value on every read.
    pub fn getter(mut self, get: impl Fn() -> V + 'static) -> Self {
        self.source = Some(Source::Computed(Rc::new(get)));
        self
    }

    /// Called with the new observer count whenever an observer is added or
    /// removed.
    pub fn on_observer_count(mut self, hook: impl Fn(usize) + 'static) -> Self {
        self.on_count = Some(Box::new(hook));
        self
    }

    /// Seal the cell once its slots are installed.
    pub fn sealed(mut self, sealed: bool) -> Self {
        self.sealed = sealed;
        self
    }

    /// Build and install the cell.
    ///
    /// # Errors
    ///
    /// [`FluidError::MissingGetter`] when neither [`initial`](Self::initial)
    /// nor [`getter`](Self::getter) was supplied.
    pub fn build(self) -> Result<Rc<FluidCell<V>>> {
        let source = self.source.ok_or(FluidError::MissingGetter)?;
        let cell = Rc::new(FluidCell {
            source: RefCell::new(source),
            on_count: self.on_count,
        });
        install_fluid_value(&cell)?;
        if self.sealed {
            seal_target(&cell)?;
        }
        Ok(cell)
    }
}
