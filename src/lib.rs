// src/lib.rs

//! apiary - a single-process, multi-threaded actor runtime.
//!
//! Independent units of computation ("cells") exchange asynchronous messages
//! through private mailboxes. A fixed pool of OS worker threads pulls cells
//! from a lock-free ready queue, delivers one message per visit, and requeues
//! the cell; a timer thread injects catch-up tick messages into the system
//! cell. Message payloads cross cell boundaries as self-describing
//! linked-block byte buffers that can carry counted cell references.

/// Per-cell state: lifecycle, mailbox, behavior attachment, handles.
pub mod cell;
/// The cross-context message codec (linked-block buffers, encode, decode).
pub mod codec;
/// Explicit runtime configuration objects.
pub mod config;
/// The `Context`: cell table, spawn/close surface, shared runtime state.
pub mod context;
/// Custom error types used throughout the library.
pub mod error;
/// Message and value representation (ports, payloads, decoded values).
pub mod message;
/// The scheduler: ready queue, worker pool, timer thread, bootstrap.
pub mod runtime;

// Re-export core types for user convenience, making them accessible directly
// from the crate root (e.g., `apiary::Context`, `apiary::Value`).
pub use cell::{Behavior, BehaviorFactory, CellEnv, CellId, CellRef, DispatchOutcome};
pub use codec::{decode, encode, Payload};
pub use config::RuntimeOptions;
pub use context::Context;
pub use error::ApiaryError;
pub use message::{Blob, Message, Table, Value, PORT_TEARDOWN, PORT_TICK};
pub use runtime::start;

// --- Top-Level Library Information Functions ---

/// Major version number of the apiary library.
const VERSION_MAJOR: i32 = 0;
/// Minor version number of the apiary library.
const VERSION_MINOR: i32 = 1;
/// Patch version number of the apiary library.
const VERSION_PATCH: i32 = 0;

/// Returns the library version as a tuple (major, minor, patch).
pub fn version() -> (i32, i32, i32) {
  (VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH)
}
