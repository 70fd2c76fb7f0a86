// src/message/mod.rs

//! Message representation: ports, payload handles, decoded values.

pub mod blob;
pub mod msg;
pub mod value;

pub use blob::Blob;
pub use msg::{Message, PORT_TEARDOWN, PORT_TICK};
pub use value::{Table, Value};
