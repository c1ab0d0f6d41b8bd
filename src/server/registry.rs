//! Satellite Registry
//!
//! Maps satellite names to their connectivity descriptors. Not synchronized on its own;
//! the dispatcher only touches it through [`super::directory::SatelliteDirectory`].

use crate::comm::types::ConnectivityInfo;
use crate::error::{Error, Result};

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct SatelliteRegistry {
    satellites: HashMap<String, ConnectivityInfo>,
}

impl SatelliteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the descriptor keyed by its name (last write wins).
    ///
    /// Returns the registered name and the descriptor it replaced, if any.
    pub fn register(
        &mut self,
        info: ConnectivityInfo,
    ) -> Result<(String, Option<ConnectivityInfo>)> {
        let name = registration_name(&info)?;

        tracing::info!("{} is added to the registry", info);
        let previous = self.satellites.insert(name.clone(), info);

        Ok((name, previous))
    }

    pub fn lookup(&self, name: &str) -> Result<ConnectivityInfo> {
        self.satellites
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownSatellite(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.satellites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.satellites.is_empty()
    }

    /// All descriptors, ordered by name.
    pub fn snapshot(&self) -> Vec<ConnectivityInfo> {
        let mut satellites: Vec<ConnectivityInfo> = self.satellites.values().cloned().collect();
        satellites.sort_by(|a, b| a.name.cmp(&b.name));
        satellites
    }
}

fn registration_name(info: &ConnectivityInfo) -> Result<String> {
    let name = match info.name() {
        Some(name) if !name.trim().is_empty() => name.to_string(),
        _ => {
            return Err(Error::InvalidRegistration(format!(
                "satellite at {} has no name",
                info.address()
            )));
        }
    };

    if info.host.is_empty() || info.port == 0 {
        return Err(Error::InvalidRegistration(format!(
            "satellite {} has no reachable address ({})",
            name,
            info.address()
        )));
    }

    Ok(name)
}
