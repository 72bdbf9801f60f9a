#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `packet` is the length-prefixed, nonce-bound binary transport used by
//! the peer "remote" mount to call into its peer's file manager. It
//! layers four concerns, leaves first: [`envelope`] (frame codec),
//! [`negotiation`] (per-connection nonce handshake), [`multiplex`] (the
//! per-client worker pool preserving per-`thread_id` ordering), and the
//! [`PacketClient`]/[`PacketServer`] pair built on top of them.
//!
//! # Design
//!
//! Everything here is blocking: `std::net::TcpStream`/`TcpListener`,
//! `std::thread`, and `std::sync::{Mutex, Condvar}`, matching this
//! workspace's non-daemon crates rather than an async runtime. Optional
//! shared-token encryption ([`crypto::Token`]) is applied to the encoded
//! frame payload on both sides when configured.
//!
//! # Invariants
//!
//! - No frame payload exceeds [`envelope::MAX_FRAME_SIZE`]; an oversized
//!   declared length is rejected before any buffer is allocated.
//! - Requests sharing a `thread_id` are served by the server in the order
//!   they were dispatched.
//! - A connection's nonce is rotated on every server reply; a client
//!   socket's stored nonce always reflects the most recent reply.

pub mod client;
pub mod crypto;
pub mod envelope;
pub mod message;
pub mod multiplex;
pub mod negotiation;
pub mod server;

pub use client::PacketClient;
pub use message::{Request, Response};
pub use multiplex::{ClientPool, DEFAULT_POOL_SIZE};
pub use server::{ClosedCallback, Handler, PacketServer};
