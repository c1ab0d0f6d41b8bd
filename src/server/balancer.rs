use crate::error::{Error, Result};

/// Round-robin selector over satellite names, in registration order.
///
/// Duplicates are kept: a satellite registered twice is picked twice per cycle.
#[derive(Debug, Default)]
pub struct LoadBalancer {
    satellites: Vec<String>,
    last_index: Option<usize>,
}

impl LoadBalancer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn satellite_added(&mut self, name: impl Into<String>) {
        self.satellites.push(name.into());
    }

    /// Advances the cursor to `(last_index + 1) mod count` and returns that name.
    ///
    /// Size and cursor are read and written through the same `&mut self`, so callers that
    /// hold the directory lock get both in one critical section.
    pub fn next_satellite(&mut self) -> Result<String> {
        let count = self.satellites.len();
        if count == 0 {
            return Err(Error::NoSatellitesAvailable);
        }

        let next = match self.last_index {
            Some(last) => (last + 1) % count,
            None => 0,
        };
        self.last_index = Some(next);

        Ok(self.satellites[next].clone())
    }

    pub fn len(&self) -> usize {
        self.satellites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.satellites.is_empty()
    }
}
