//! Satellite Service
//!
//! A worker node. Startup is:
//! 1. Bind the listening socket (so the advertised port is live before anyone routes to it).
//! 2. Register with the dispatcher, retrying with backoff while it is unreachable.
//! 3. Serve job requests, one task per connection.
//!
//! Each job resolves its tool through the [`ToolCache`], runs it on the blocking pool and
//! answers on the same connection with a `JobResponse`.

use super::cache::ToolCache;
use crate::comm::protocol::*;
use crate::comm::types::*;
use crate::error::{Error, Result};
use crate::tool::CodeFetcher;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone, Copy)]
pub struct SatelliteSettings {
    pub timeouts: Timeouts,
    pub registration_attempts: usize,
}

impl Default for SatelliteSettings {
    fn default() -> Self {
        Self {
            timeouts: Timeouts::default(),
            registration_attempts: 5,
        }
    }
}

pub struct Satellite {
    /// Own descriptor, with the port actually bound.
    info: ConnectivityInfo,
    dispatcher: ConnectivityInfo,
    listener: TcpListener,
    cache: Arc<ToolCache>,
    settings: SatelliteSettings,
}

impl Satellite {
    pub async fn bind(
        info: ConnectivityInfo,
        dispatcher: ConnectivityInfo,
        fetcher: Arc<dyn CodeFetcher>,
        settings: SatelliteSettings,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(info.address()).await?;
        let port = listener.local_addr()?.port();

        let info = ConnectivityInfo { port, ..info };
        tracing::info!("Satellite {} waiting for connections", info);

        Ok(Self {
            info,
            dispatcher,
            listener,
            cache: Arc::new(ToolCache::new(fetcher)),
            settings,
        })
    }

    pub fn info(&self) -> &ConnectivityInfo {
        &self.info
    }

    pub fn cache(&self) -> Arc<ToolCache> {
        self.cache.clone()
    }

    /// Sends this satellite's descriptor to the dispatcher.
    ///
    /// The dispatcher does not acknowledge registrations, so success means the envelope was
    /// written, not that it was accepted.
    pub async fn register(&self) -> Result<()> {
        let message = Message::RegisterSatellite(self.info.clone());
        let attempts = self.settings.registration_attempts.max(1);
        let mut delay_ms = 150u64;

        for attempt in 0..attempts {
            match send_envelope(&self.dispatcher, &message, &self.settings.timeouts).await {
                Ok(()) => {
                    tracing::info!("Registered {} with dispatcher {}", self.info, self.dispatcher);
                    return Ok(());
                }
                Err(e) => {
                    if attempt + 1 == attempts {
                        return Err(e);
                    }
                    tracing::warn!(
                        "Registration with {} failed (attempt {}/{}): {}",
                        self.dispatcher,
                        attempt + 1,
                        attempts,
                        e
                    );
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }

        Err(Error::connection(
            "registering with dispatcher",
            ProtocolError::Timeout("registering"),
        ))
    }

    /// Accept loop. Never returns.
    pub async fn run(self) {
        let local = Arc::new(self.info);

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    tracing::debug!("Connection established with {}", peer);
                    let cache = self.cache.clone();
                    let local = local.clone();
                    let timeouts = self.settings.timeouts;
                    tokio::spawn(async move {
                        handle_connection(&cache, &local, stream, peer, timeouts).await;
                    });
                }
                Err(e) => {
                    tracing::error!("Unable to accept connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// Registers, then serves.
    pub async fn start(self) -> Result<()> {
        self.register().await?;
        self.run().await;
        Ok(())
    }
}

async fn send_envelope(
    target: &ConnectivityInfo,
    message: &Message,
    timeouts: &Timeouts,
) -> Result<()> {
    let mut stream = connect(target, timeouts)
        .await
        .map_err(|e| Error::connection("connecting to dispatcher", e))?;

    write_message(&mut stream, message, timeouts.io)
        .await
        .map_err(|e| Error::connection("sending registration", e))?;

    // Nothing comes back; a clean shutdown only tells the peer we are done.
    if let Err(e) = stream.shutdown().await {
        tracing::debug!("Unable to shut down connection to {}: {}", target, e);
    }
    Ok(())
}

async fn handle_connection(
    cache: &ToolCache,
    local: &ConnectivityInfo,
    mut stream: TcpStream,
    peer: SocketAddr,
    timeouts: Timeouts,
) {
    let message = match read_message(&mut stream, timeouts.io).await {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!("Unable to read the message from {}: {}", peer, e);
            return;
        }
    };

    match message {
        Message::JobRequest(job) => {
            let response = execute_job(cache, &job).await;

            if let Err(e) = write_response(&mut stream, &response, timeouts.io).await {
                tracing::error!("Failed to return result of {} to {}: {}", job.tool, peer, e);
            }
        }
        other => {
            tracing::warn!(
                "Message type {} from {} not implemented on {}",
                other.kind(),
                peer,
                local
            );
        }
    }
}

/// Resolves and runs the job's tool, turning any failure into a `Failed` response.
pub async fn execute_job(cache: &ToolCache, job: &Job) -> JobResponse {
    match run_job(cache, job).await {
        Ok(result) => JobResponse::completed(&result),
        Err(e) => {
            tracing::error!("Job {} failed: {}", job.tool, e);
            JobResponse::failed(&e)
        }
    }
}

async fn run_job(cache: &ToolCache, job: &Job) -> Result<serde_json::Value> {
    let tool = cache.resolve(&job.tool).await?;

    let parameter = job.parameter().map_err(|e| Error::ToolFailed {
        tool: job.tool.clone(),
        cause: format!("invalid parameter: {}", e),
    })?;

    let outcome = tokio::task::spawn_blocking(move || tool.invoke(parameter))
        .await
        .map_err(|e| Error::ToolFailed {
            tool: job.tool.clone(),
            cause: format!("tool aborted: {}", e),
        })?;

    outcome.map_err(|e| Error::ToolFailed {
        tool: job.tool.clone(),
        cause: format!("{:#}", e),
    })
}
