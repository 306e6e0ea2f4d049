#![forbid(unsafe_code)]

//! Event shapes.
//!
//! The dispatcher delivers any `E` without looking inside it. Producers that
//! want the conventional `{ type, parent, ... }` shape can use [`Event`], or
//! implement [`FluidEvent`] on their own types.

use std::borrow::Cow;

use crate::slot::FluidId;

/// Discriminator of the event emitted when a value changes.
pub const CHANGE: &str = "change";

/// The structural contract of a protocol event.
pub trait FluidEvent {
    /// The `type` discriminator.
    fn kind(&self) -> &str;

    /// Identity of the fluid object that produced the event.
    fn parent(&self) -> FluidId;
}

/// A `{ type, parent, payload }` event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event<P = ()> {
    /// The `type` discriminator.
    pub kind: Cow<'static, str>,
    /// Producer identity.
    pub parent: FluidId,
    /// Producer-defined fields.
    pub payload: P,
}

impl<P> Event<P> {
    /// Create an event.
    pub fn new(kind: impl Into<Cow<'static, str>>, parent: FluidId, payload: P) -> Self {
        Self {
            kind: kind.into(),
            parent,
            payload,
        }
    }

    /// A `"change"` event carrying the new value.
    pub fn change(parent: FluidId, value: P) -> Self {
        Self::new(CHANGE, parent, value)
    }

    /// Whether this is a `"change"` event.
    #[must_use]
    pub fn is_change(&self) -> bool {
        self.kind == CHANGE
    }
}

impl<P> FluidEvent for Event<P> {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn parent(&self) -> FluidId {
        self.parent
    }
}
