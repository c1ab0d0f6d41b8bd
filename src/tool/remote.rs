//! HTTP Code Repository
//!
//! The code-fetch capability over HTTP. The repository publishes **manifests**: records
//! binding a tool identifier to an implementation linked into satellites. Publishing a new
//! identifier (an alias, a renamed tool) makes it usable by every satellite without a
//! restart, since satellites only resolve manifests on a cache miss.
//!
//! - `GET /tools` lists every published manifest.
//! - `GET /tools/{identifier}` returns one manifest, or 404.

use super::catalog::ToolCatalog;
use super::{CodeFetcher, FetchError, FetchFuture};
use crate::comm::types::ConnectivityInfo;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    routing::get,
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

pub const ENDPOINT_TOOLS: &str = "/tools";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolManifest {
    /// Identifier clients put in their jobs.
    pub identifier: String,
    /// Catalog key of the implementation satellites instantiate.
    pub implementation: String,
}

impl ToolManifest {
    pub fn new(identifier: impl Into<String>, implementation: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            implementation: implementation.into(),
        }
    }
}

/// Server-side store of published manifests.
#[derive(Default)]
pub struct CodeRepository {
    manifests: DashMap<String, ToolManifest>,
}

impl CodeRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn publish(&self, manifest: ToolManifest) {
        tracing::info!(
            "Published tool {} -> {}",
            manifest.identifier,
            manifest.implementation
        );
        self.manifests.insert(manifest.identifier.clone(), manifest);
    }

    /// Publishes every catalog entry under its own identifier.
    pub fn publish_catalog(&self, catalog: &ToolCatalog) {
        for identifier in catalog.list_tools() {
            self.publish(ToolManifest::new(identifier.clone(), identifier));
        }
    }

    pub fn withdraw(&self, identifier: &str) -> bool {
        self.manifests.remove(identifier).is_some()
    }

    pub fn manifest(&self, identifier: &str) -> Option<ToolManifest> {
        self.manifests
            .get(identifier)
            .map(|entry| entry.value().clone())
    }

    pub fn list(&self) -> Vec<ToolManifest> {
        let mut manifests: Vec<ToolManifest> = self
            .manifests
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        manifests.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        manifests
    }
}

pub fn code_repository_router(repository: Arc<CodeRepository>) -> Router {
    Router::new()
        .route(ENDPOINT_TOOLS, get(handle_list_tools))
        .route("/tools/:identifier", get(handle_get_tool))
        .layer(Extension(repository))
}

pub async fn serve_code_repository(
    listener: TcpListener,
    repository: Arc<CodeRepository>,
) -> std::io::Result<()> {
    tracing::info!("Code repository listening on {}", listener.local_addr()?);
    axum::serve(listener, code_repository_router(repository)).await
}

async fn handle_list_tools(
    Extension(repository): Extension<Arc<CodeRepository>>,
) -> Json<Vec<ToolManifest>> {
    Json(repository.list())
}

async fn handle_get_tool(
    Extension(repository): Extension<Arc<CodeRepository>>,
    Path(identifier): Path<String>,
) -> (StatusCode, Json<Option<ToolManifest>>) {
    match repository.manifest(&identifier) {
        Some(manifest) => (StatusCode::OK, Json(Some(manifest))),
        None => {
            tracing::debug!("Tool not published: {}", identifier);
            (StatusCode::NOT_FOUND, Json(None))
        }
    }
}

/// Satellite-side fetcher: resolves manifests over HTTP, then binds them to the
/// implementations in `linked`.
pub struct RemoteCodeFetcher {
    base_url: String,
    linked: Arc<ToolCatalog>,
    http_client: reqwest::Client,
    timeout: Duration,
}

impl RemoteCodeFetcher {
    pub fn new(repository: &ConnectivityInfo, linked: Arc<ToolCatalog>, timeout: Duration) -> Self {
        Self {
            base_url: format!("http://{}", repository.address()),
            linked,
            http_client: reqwest::Client::new(),
            timeout,
        }
    }

    pub async fn manifest(&self, identifier: &str) -> Result<ToolManifest, FetchError> {
        let url = format!(
            "{}{}/{}",
            self.base_url,
            ENDPOINT_TOOLS,
            urlencoding::encode(identifier)
        );

        let response = self
            .http_client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| FetchError::Unavailable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(identifier.to_string()));
        }
        if !response.status().is_success() {
            return Err(FetchError::Unavailable(format!(
                "code repository answered {}",
                response.status()
            )));
        }

        let manifest: Option<ToolManifest> = response
            .json()
            .await
            .map_err(|e| FetchError::Unavailable(e.to_string()))?;

        manifest.ok_or_else(|| FetchError::NotFound(identifier.to_string()))
    }
}

impl CodeFetcher for RemoteCodeFetcher {
    fn fetch<'a>(&'a self, identifier: &'a str) -> FetchFuture<'a> {
        Box::pin(async move {
            let manifest = self.manifest(identifier).await?;
            tracing::debug!(
                "Tool {} resolved to implementation {}",
                identifier,
                manifest.implementation
            );

            self.linked
                .constructor(&manifest.implementation)
                .ok_or_else(|| {
                    FetchError::NotFound(format!(
                        "{} (implementation {} is not linked into this satellite)",
                        identifier, manifest.implementation
                    ))
                })
        })
    }
}
