//! Tool Catalog
//!
//! Maps tool identifiers (e.g. "appserver.job.impl.Fibonacci") to constructors of tools
//! linked into this binary. Serves as a [`CodeFetcher`] on its own, and as the set of
//! implementations the remote fetcher can bind manifests to.

use super::{CodeFetcher, FetchError, FetchFuture, Tool, ToolConstructor};

use dashmap::DashMap;
use std::sync::Arc;

pub struct ToolCatalog {
    constructors: DashMap<String, ToolConstructor>,
}

impl ToolCatalog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a constructor under `identifier`, replacing any previous one.
    pub fn register<F>(&self, identifier: &str, constructor: F)
    where
        F: Fn() -> anyhow::Result<Arc<dyn Tool>> + Send + Sync + 'static,
    {
        self.constructors
            .insert(identifier.to_string(), Arc::new(constructor));

        tracing::info!("Registered tool: {}", identifier);
    }

    /// Registers a tool built through its `Default` impl.
    pub fn register_default<T>(&self, identifier: &str)
    where
        T: Tool + Default + 'static,
    {
        self.register(identifier, || Ok(Arc::new(T::default()) as Arc<dyn Tool>));
    }

    pub fn constructor(&self, identifier: &str) -> Option<ToolConstructor> {
        self.constructors
            .get(identifier)
            .map(|entry| entry.value().clone())
    }

    pub fn list_tools(&self) -> Vec<String> {
        let mut tools: Vec<String> = self
            .constructors
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        tools.sort();
        tools
    }

    pub fn has_tool(&self, identifier: &str) -> bool {
        self.constructors.contains_key(identifier)
    }

    pub fn tool_count(&self) -> usize {
        self.constructors.len()
    }
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self {
            constructors: DashMap::new(),
        }
    }
}

impl CodeFetcher for ToolCatalog {
    fn fetch<'a>(&'a self, identifier: &'a str) -> FetchFuture<'a> {
        Box::pin(async move {
            self.constructor(identifier)
                .ok_or_else(|| FetchError::NotFound(identifier.to_string()))
        })
    }
}
