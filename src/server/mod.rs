//! Dispatcher Module
//!
//! The central server of the cluster. Satellites register here, clients submit jobs here,
//! and every job is routed to one satellite in round-robin order.
//!
//! ## Submodules
//! - **`registry`**: Satellite name -> connectivity descriptor.
//! - **`balancer`**: Round-robin selection over registered names.
//! - **`directory`**: Registry and balancer behind a single lock.
//! - **`dispatcher`**: Accept loop, envelope routing, job forwarding with retry.

pub mod balancer;
pub mod directory;
pub mod dispatcher;
pub mod registry;

#[cfg(test)]
mod tests;
