//! Client Module
//!
//! Submits jobs to the dispatcher: one connection per job, one envelope out, one response
//! back.

use crate::comm::protocol::*;
use crate::comm::types::*;
use crate::error::{Error, Result};

use serde_json::Value;

#[derive(Debug, Clone)]
pub struct JobClient {
    dispatcher: ConnectivityInfo,
    timeouts: Timeouts,
}

impl JobClient {
    pub fn new(dispatcher: ConnectivityInfo, timeouts: Timeouts) -> Self {
        Self {
            dispatcher,
            timeouts,
        }
    }

    pub fn dispatcher(&self) -> &ConnectivityInfo {
        &self.dispatcher
    }

    /// Sends `job` and waits for its result.
    ///
    /// A structured failure from the cluster comes back as [`Error::Rejected`].
    pub async fn submit(&self, job: &Job) -> Result<Value> {
        let mut stream = connect(&self.dispatcher, &self.timeouts)
            .await
            .map_err(|e| Error::connection("connecting to dispatcher", e))?;

        write_message(&mut stream, &Message::JobRequest(job.clone()), self.timeouts.io)
            .await
            .map_err(|e| Error::connection("sending job", e))?;

        let response = read_response(&mut stream, self.timeouts.job)
            .await
            .map_err(|e| Error::connection("awaiting job result", e))?;

        response.into_result()
    }
}
