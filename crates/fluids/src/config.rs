#![forbid(unsafe_code)]

//! Protocol configuration.
//!
//! The base configuration is read from the environment once per process.
//! Tests and embedders can layer overrides on top with a thread-local stack,
//! the innermost override winning.
//!
//! | Variable | Values | Default |
//! |----------|--------|---------|
//! | `FLUIDS_BARE_TARGETS` | `ignore`, `register` | `ignore` |
//! | `FLUIDS_SWEEP_THRESHOLD` | positive integer | `64` |
//!
//! Unparseable values fall back to the default.
//!
//! # Example
//!
//! ```
//! use fluids::config::{with_config, current_config, BareTargetPolicy, FluidConfig};
//!
//! let cfg = FluidConfig::new().bare_targets(BareTargetPolicy::Register);
//! with_config(cfg, || {
//!     assert_eq!(current_config().bare_targets, BareTargetPolicy::Register);
//! });
//! ```

use std::cell::RefCell;
use std::sync::OnceLock;

/// Default number of tracked targets before the slot table sweeps dead entries.
pub const DEFAULT_SWEEP_THRESHOLD: usize = 64;

/// What `add_fluid_observer` does with a target that has no value getter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BareTargetPolicy {
    /// Return the observer without registering it.
    #[default]
    Ignore,
    /// Create the observer set anyway, so events broadcast to the bare
    /// target still reach the observer.
    Register,
}

impl BareTargetPolicy {
    /// Parse a policy name, case-insensitively.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ignore" | "noop" | "no-op" => Some(Self::Ignore),
            "register" | "always" => Some(Self::Register),
            _ => None,
        }
    }
}

/// Configuration for the fluid protocol on the current thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FluidConfig {
    /// Subscription behavior for targets without a getter.
    pub bare_targets: BareTargetPolicy,
    /// Table size that triggers a sweep of entries whose target was dropped.
    pub sweep_threshold: usize,
}

impl Default for FluidConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl FluidConfig {
    /// Built-in defaults, ignoring the environment.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bare_targets: BareTargetPolicy::Ignore,
            sweep_threshold: DEFAULT_SWEEP_THRESHOLD,
        }
    }

    /// Set the bare-target policy.
    #[must_use]
    pub const fn bare_targets(mut self, policy: BareTargetPolicy) -> Self {
        self.bare_targets = policy;
        self
    }

    /// Set the sweep threshold. Zero is clamped to one.
    #[must_use]
    pub const fn sweep_threshold(mut self, threshold: usize) -> Self {
        self.sweep_threshold = if threshold == 0 { 1 } else { threshold };
        self
    }

    /// Read the configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Read the configuration through a custom environment lookup.
    #[must_use]
    pub fn from_env_with<F>(get_env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new();
        if let Some(policy) = get_env("FLUIDS_BARE_TARGETS")
            .as_deref()
            .and_then(BareTargetPolicy::parse)
        {
            config = config.bare_targets(policy);
        }
        if let Some(threshold) =
            get_env("FLUIDS_SWEEP_THRESHOLD").and_then(|v| v.trim().parse::<usize>().ok())
        {
            config = config.sweep_threshold(threshold);
        }
        config
    }
}

fn env_config() -> FluidConfig {
    static ENV_CONFIG: OnceLock<FluidConfig> = OnceLock::new();
    *ENV_CONFIG.get_or_init(FluidConfig::from_env)
}

thread_local! {
    static CONFIG_STACK: RefCell<Vec<FluidConfig>> = const { RefCell::new(Vec::new()) };
}

/// RAII guard that pops a configuration override when dropped.
#[must_use]
pub struct ConfigGuard {
    _marker: std::marker::PhantomData<*const ()>,
}

impl std::fmt::Debug for ConfigGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigGuard").finish_non_exhaustive()
    }
}

impl Drop for ConfigGuard {
    fn drop(&mut self) {
        CONFIG_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Push a configuration override for the current thread.
#[must_use = "the override is removed when the guard is dropped"]
pub fn push_config(config: FluidConfig) -> ConfigGuard {
    CONFIG_STACK.with(|stack| stack.borrow_mut().push(config));
    ConfigGuard {
        _marker: std::marker::PhantomData,
    }
}

/// Run `f` with `config` active, restoring the previous configuration after,
/// even on panic.
pub fn with_config<F, R>(config: FluidConfig, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = push_config(config);
    f()
}

/// The effective configuration: the innermost override, or the environment.
#[must_use]
pub fn current_config() -> FluidConfig {
    CONFIG_STACK
        .with(|stack| stack.borrow().last().copied())
        .unwrap_or_else(env_config)
}
