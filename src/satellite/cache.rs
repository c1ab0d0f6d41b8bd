//! Tool Cache
//!
//! Lazily resolves tools through the code-fetch capability and keeps the instances for the
//! lifetime of the satellite. Each identifier owns a `OnceCell`, so concurrent misses for
//! the same tool wait on a single fetch-and-instantiate instead of racing.

use crate::error::{Error, Result};
use crate::tool::{CodeFetcher, Tool};

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

type Slot = Arc<OnceCell<Arc<dyn Tool>>>;

pub struct ToolCache {
    fetcher: Arc<dyn CodeFetcher>,
    tools: DashMap<String, Slot>,
}

impl ToolCache {
    pub fn new(fetcher: Arc<dyn CodeFetcher>) -> Self {
        Self {
            fetcher,
            tools: DashMap::new(),
        }
    }

    /// Returns the cached tool, fetching and instantiating it on first use.
    ///
    /// A failed resolution leaves no entry behind, so a later request fetches again.
    pub async fn resolve(&self, identifier: &str) -> Result<Arc<dyn Tool>> {
        let slot: Slot = self.tools.entry(identifier.to_string()).or_default().clone();

        if let Some(tool) = slot.get() {
            tracing::info!("Tool \"{}\" already in cache", identifier);
            return Ok(tool.clone());
        }

        let resolved = slot.get_or_try_init(|| self.load(identifier)).await.cloned();

        match &resolved {
            Ok(_) => {
                // A concurrent failure may have dropped this slot while it was loading.
                let mut current = self
                    .tools
                    .entry(identifier.to_string())
                    .or_insert_with(|| slot.clone());
                if !current.initialized() {
                    *current = slot.clone();
                }
            }
            Err(_) => {
                self.tools.remove_if(identifier, |_, current| {
                    Arc::ptr_eq(current, &slot) && !current.initialized()
                });
            }
        }

        resolved
    }

    async fn load(&self, identifier: &str) -> Result<Arc<dyn Tool>> {
        tracing::info!("Loading tool {}", identifier);

        let constructor = self
            .fetcher
            .fetch(identifier)
            .await
            .map_err(|e| Error::UnknownTool {
                tool: identifier.to_string(),
                cause: e.to_string(),
            })?;

        constructor().map_err(|e| Error::UnknownTool {
            tool: identifier.to_string(),
            cause: format!("instantiation failed: {:#}", e),
        })
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.tools
            .get(identifier)
            .is_some_and(|slot| slot.initialized())
    }

    /// Number of instantiated tools.
    pub fn len(&self) -> usize {
        self.tools
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
