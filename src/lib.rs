//! Satellite Dispatch Library
//!
//! This library crate defines the core modules of a three-tier job platform:
//! clients submit jobs to a dispatcher, which spreads them over registered satellites.
//! It serves as the foundation for the binary executable (`main.rs`).
//!
//! ## Architecture Modules
//! - **`comm`**: Wire types and framing. Envelopes carry a kind tag and a bincode payload;
//!   job results travel back as a `JobResponse` frame.
//! - **`server`**: The dispatcher. Holds the satellite registry and the round-robin load
//!   balancer behind one lock, accepts envelopes and forwards jobs.
//! - **`satellite`**: Worker nodes. Register with the dispatcher, resolve tools through a
//!   lazily populated cache and execute jobs.
//! - **`tool`**: The `Tool` abstraction, the catalog of linked implementations, and the
//!   HTTP code repository satellites fetch tool manifests from.
//! - **`client`**: Submits a job and waits for its result.
//! - **`config`**: `.properties` and environment configuration providers.

pub mod client;
pub mod comm;
pub mod config;
pub mod error;
pub mod satellite;
pub mod server;
pub mod tool;

pub use error::{Error, Result};
