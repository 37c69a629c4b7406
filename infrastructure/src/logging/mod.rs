//! Event logging: the machine-readable agent event stream.
//!
//! Provides [`JsonlBroadcaster`], a JSONL file writer that implements the
//! [`Broadcaster`](conclave_application::Broadcaster) port.

mod jsonl_broadcaster;

pub use jsonl_broadcaster::JsonlBroadcaster;
