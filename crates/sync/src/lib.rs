#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `sync` centralises the two blocking concurrency primitives the rest of
//! the workspace builds on: [`Throttle`], a bounded counting semaphore used
//! to cap concurrent chunk downloads and uploads, and [`Timeout`], a
//! one-shot cancellable timer used to bound handshakes and quiescence
//! windows.
//!
//! # Design
//!
//! Both primitives are implemented with `std::sync::{Mutex, Condvar}` over
//! blocking OS threads; there is no cooperative task runtime anywhere in
//! this workspace. Waiters re-check their condition on every wake because a
//! notification is advisory, not definitive.
//!
//! # Invariants
//!
//! - [`Throttle::acquire`] never returns more than `max_size` outstanding
//!   permits, measured between an `acquire` and its matching `release`.
//! - After [`Throttle::shutdown`], every blocked and future `acquire` call
//!   returns immediately.
//! - [`Timeout::new`] with a zero duration never spawns a thread and never
//!   invokes its callback.

mod throttle;
mod timeout;

pub use throttle::Throttle;
pub use timeout::Timeout;
