#![forbid(unsafe_code)]

//! Errors raised by the fluid protocol.
//!
//! Only slot installation can fail. Queries, subscription and broadcast are
//! total: missing state takes a documented no-op or pass-through branch.

use std::fmt;

/// Errors from installing protocol state on a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FluidError {
    /// The target has no stable identity (a primitive, `None`, or a bare
    /// [`FluidId`](crate::FluidId) that was never anchored).
    NoIdentity,
    /// The target was sealed and does not already carry this slot.
    Sealed {
        /// Reserved name of the slot that could not be defined.
        slot: &'static str,
    },
    /// A value-bearing object was built with no way to read its value.
    MissingGetter,
}

impl fmt::Display for FluidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoIdentity => write!(f, "target has no identity and cannot carry hidden slots"),
            Self::Sealed { slot } => {
                write!(f, "cannot define slot '{slot}' on a sealed target")
            }
            Self::MissingGetter => write!(f, "unknown getter: no getter or initial value supplied"),
        }
    }
}

impl std::error::Error for FluidError {}

/// Result alias for fallible protocol operations.
pub type Result<T> = std::result::Result<T, FluidError>;
