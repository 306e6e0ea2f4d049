#![forbid(unsafe_code)]

//! A minimal protocol for observable ("fluid") values shared between
//! independent libraries.
//!
//! A target is fluid when it carries a hidden value getter. Producers attach
//! the getter and broadcast events; consumers read the current value and
//! subscribe observers. No side needs to know the other's concrete types:
//! everything goes through reserved slots attached to the target's identity.
//!
//! # Layers
//!
//! | Module | Role |
//! |--------|------|
//! | [`slot`] | Hidden per-target slots, sealing, identity |
//! | [`value`] | Fluidity predicate, value read, getter install |
//! | [`observer`] | Observer handles and read-only set views |
//! | [`registry`] | Subscribe, unsubscribe, lifecycle hooks |
//! | [`dispatch`] | Event delivery |
//! | [`fluid_value`] | `FluidValue` trait and `FluidCell` |
//! | [`config`] | Per-thread and environment configuration |
//!
//! # Threading
//!
//! Everything is single-threaded: slot tables and configuration overrides
//! are per thread, and handles are `Rc`-based.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod fluid_value;
pub mod observer;
pub mod registry;
pub mod slot;
pub mod value;

pub use config::{
    BareTargetPolicy, ConfigGuard, DEFAULT_SWEEP_THRESHOLD, FluidConfig, current_config,
    push_config, with_config,
};
pub use dispatch::{call_fluid_observer, call_fluid_observers};
pub use error::{FluidError, Result};
pub use event::{CHANGE, Event, FluidEvent};
pub use fluid_value::{
    FluidCell, FluidCellBuilder, FluidValue, emit_fluid_event, install_fluid_value,
};
pub use observer::{FluidObserver, FluidObservers, Observer, ObserverId};
pub use registry::{ObserverLifecycle, add_fluid_observer, remove_fluid_observer, set_fluid_hooks};
pub use slot::{
    FluidId, FluidTarget, GETTER_SLOT, HOOKS_SLOT, OBSERVERS_SLOT, SlotKey, defines_slot,
    get_hidden, has_hidden, is_sealed, seal_target, set_hidden, sweep, tracked_targets,
};
pub use value::{FluidOr, get_fluid_observers, get_fluid_value, has_fluid_value, set_fluid_getter};
