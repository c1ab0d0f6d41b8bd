//! Tool Module
//!
//! A Tool is a unit of executable logic named by an identifier and invoked with one opaque
//! parameter. Satellites never link against specific tools: they ask a [`CodeFetcher`] for
//! a constructor by identifier and instantiate what comes back.
//!
//! ## Submodules
//! - **`catalog`**: In-process catalog of constructors, usable directly as a fetcher.
//! - **`remote`**: HTTP code repository (server side and fetcher).
//! - **`builtin`**: Sample tools (`Echo`, `Fibonacci`).

pub mod builtin;
pub mod catalog;
pub mod remote;


use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// The tool contract. No assumptions about determinism, idempotence or duration; the
/// satellite runs `invoke` on the blocking pool.
pub trait Tool: Send + Sync {
    fn invoke(&self, parameter: Value) -> anyhow::Result<Value>;
}

/// Zero-argument constructor for a tool. Construction may fail.
pub type ToolConstructor = Arc<dyn Fn() -> anyhow::Result<Arc<dyn Tool>> + Send + Sync>;

pub type FetchFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ToolConstructor, FetchError>> + Send + 'a>>;

/// The code-fetch capability.
pub trait CodeFetcher: Send + Sync {
    fn fetch<'a>(&'a self, identifier: &'a str) -> FetchFuture<'a>;
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("tool {0} not found in code repository")]
    NotFound(String),

    #[error("code repository unavailable: {0}")]
    Unavailable(String),
}
