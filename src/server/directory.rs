//! Satellite Directory
//!
//! The dispatcher's single view of available satellites. Registry and load balancer sit
//! behind one lock so that "satellite added" and "next satellite chosen" never interleave
//! halfway: a registration is either fully visible to a routing decision or not at all.

use super::balancer::LoadBalancer;
use super::registry::SatelliteRegistry;
use crate::comm::types::ConnectivityInfo;
use crate::error::{Error, Result};

use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct DirectoryState {
    registry: SatelliteRegistry,
    balancer: LoadBalancer,
}

#[derive(Debug, Default)]
pub struct SatelliteDirectory {
    state: Mutex<DirectoryState>,
}

impl SatelliteDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers the descriptor and appends its name to the rotation.
    pub async fn register(&self, info: ConnectivityInfo) -> Result<()> {
        let mut state = self.state.lock().await;

        let (name, previous) = state.registry.register(info)?;
        if let Some(previous) = previous {
            tracing::warn!("Satellite {} re-registered (was {})", name, previous);
        }
        state.balancer.satellite_added(name);

        Ok(())
    }

    /// Picks the next satellite in round-robin order and resolves its descriptor.
    pub async fn next_route(&self) -> Result<(String, ConnectivityInfo)> {
        self.route_excluding(&[]).await
    }

    /// Like [`Self::next_route`] but skips names in `tried`. Fails with
    /// `NoSatellitesAvailable` once a full cycle yields only tried satellites.
    pub async fn route_excluding(&self, tried: &[String]) -> Result<(String, ConnectivityInfo)> {
        let mut state = self.state.lock().await;

        let cycle = state.balancer.len().max(1);
        for _ in 0..cycle {
            let name = state.balancer.next_satellite()?;
            if tried.contains(&name) {
                continue;
            }

            let info = state.registry.lookup(&name)?;
            return Ok((name, info));
        }

        Err(Error::NoSatellitesAvailable)
    }

    pub async fn lookup(&self, name: &str) -> Result<ConnectivityInfo> {
        self.state.lock().await.registry.lookup(name)
    }

    pub async fn satellites(&self) -> Vec<ConnectivityInfo> {
        self.state.lock().await.registry.snapshot()
    }

    /// Number of entries in the rotation (duplicates included).
    pub async fn rotation_len(&self) -> usize {
        self.state.lock().await.balancer.len()
    }
}
