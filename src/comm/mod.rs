//! Communication Module
//!
//! Everything that crosses a socket: the message envelope, the connectivity descriptor,
//! jobs, job responses, and the framing used to move them over TCP.
//!
//! ## Submodules
//! - **`types`**: Envelope, descriptor, job and response types.
//! - **`protocol`**: Length-prefixed framing, timeouts and the wire error type.

pub mod protocol;
pub mod types;
