//! Satellite Module
//!
//! Worker nodes that execute jobs on behalf of the dispatcher.
//!
//! ## Submodules
//! - **`cache`**: Lazily populated, never evicted tool cache with single-flight loading.
//! - **`service`**: Registration, accept loop and job execution.

pub mod cache;
pub mod service;
