#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `events` is the process-wide typed publish/subscribe bus every other
//! crate in this workspace depends on for diagnostics. Consumers subscribe
//! by event name or register as a catch-all; [`EventBus::publish`]
//! delivers to every matching subscriber exactly once, synchronously or on
//! a background worker thread depending on the event's
//! [`Event::allow_async`].
//!
//! # Design
//!
//! Delivery mirrors the double-buffered worker pattern used elsewhere in
//! this workspace for overlapping I/O and compute
//! (`checksums::pipeline::PipelinedChecksum`): a single logging thread
//! drains an `mpsc` channel of queued async events, while synchronous
//! events are delivered on the publisher's own thread. A subscriber that
//! panics is caught and reported as a [`types::RepertoryException`]
//! delivered synchronously, so a misbehaving subscriber can never starve
//! the others or recurse back through the async path.
//!
//! # Invariants
//!
//! - Every subscriber matching an event's name, plus every catch-all
//!   subscriber, is invoked exactly once per [`EventBus::publish`] call.
//! - Unregistering a subscriber is idempotent and safe while a delivery is
//!   in progress: that delivery completes, later ones skip it.
//! - [`EventBus::shutdown`] drains pending async events before returning.

mod bus;
mod level;
pub mod types;

pub use bus::{EventBus, SubscriptionId};
pub use level::EventLevel;

/// An event publishable on the [`EventBus`].
///
/// Implementors are plain data carriers; the bus itself decides how and
/// when to deliver them.
pub trait Event: Send + Sync + 'static {
    /// Stable, lowercase event name used for name-based subscription and
    /// for logging.
    fn name(&self) -> &'static str;

    /// Severity used by logging consumers to decide verbosity filtering.
    fn level(&self) -> EventLevel;

    /// Human-readable single-line rendering of the event, suitable for a
    /// console or log file consumer.
    fn get_single_line(&self) -> String;

    /// Structured rendering of the event for machine consumers.
    fn to_json(&self) -> serde_json::Value;

    /// Whether the bus is permitted to deliver this event on the
    /// background worker thread rather than synchronously with the
    /// publisher.
    fn allow_async(&self) -> bool {
        true
    }
}
