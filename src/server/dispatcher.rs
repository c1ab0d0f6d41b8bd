//! Dispatcher
//!
//! Accepts connections from clients and satellites, reads exactly one envelope per
//! connection and routes it by kind:
//!
//! 1. **REGISTER_SATELLITE**: the descriptor goes into the directory. Nothing is answered.
//! 2. **JOB_REQUEST**: the directory picks the next satellite, the received frame is
//!    forwarded to it unchanged, and the satellite's response is relayed to the client.
//!
//! Routing failures are answered with a `JobResponse::Failed` so clients never hang. A
//! satellite that cannot be reached (connect or send fails) is skipped and the job goes to
//! another one, up to `forward_attempts` satellites. Once the job has been delivered it is
//! never resent, since tools are not assumed idempotent.

use super::directory::SatelliteDirectory;
use crate::comm::protocol::*;
use crate::comm::types::*;
use crate::error::Error;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct DispatcherSettings {
    pub timeouts: Timeouts,
    /// Maximum number of distinct satellites tried for one job.
    pub forward_attempts: usize,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            timeouts: Timeouts::default(),
            forward_attempts: 3,
        }
    }
}

pub struct Dispatcher {
    listener: TcpListener,
    router: Arc<JobRouter>,
}

/// State shared by all connection tasks.
struct JobRouter {
    directory: Arc<SatelliteDirectory>,
    settings: DispatcherSettings,
}

/// Where a forwarding attempt broke down.
enum ForwardFailure {
    /// The satellite never received the job; another satellite may take it.
    BeforeDelivery(Error),
    AfterDelivery(Error),
}

impl Dispatcher {
    /// Binds the listening socket on `info.host:info.port` (port 0 picks a free port).
    pub async fn bind(
        info: &ConnectivityInfo,
        settings: DispatcherSettings,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(info.address()).await?;
        tracing::info!("Dispatcher waiting for connections on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            router: Arc::new(JobRouter {
                directory: SatelliteDirectory::new(),
                settings,
            }),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn directory(&self) -> Arc<SatelliteDirectory> {
        self.router.directory.clone()
    }

    /// Serves forever, one task per accepted connection.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    tracing::debug!("Connection established with {}", peer);
                    let router = self.router.clone();
                    tokio::spawn(async move {
                        router.handle_connection(stream, peer).await;
                    });
                }
                Err(e) => {
                    tracing::error!("Unable to accept connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// Periodically logs the satellites known to the directory.
    pub fn spawn_stats_reporter(&self, period: Duration) -> tokio::task::JoinHandle<()> {
        let directory = self.directory();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);

            loop {
                interval.tick().await;
                let satellites = directory.satellites().await;
                tracing::info!("Dispatcher stats: {} registered satellites", satellites.len());
                for satellite in satellites {
                    tracing::info!("  - {}", satellite);
                }
            }
        })
    }
}

impl JobRouter {
    async fn handle_connection(&self, mut stream: TcpStream, peer: SocketAddr) {
        let timeouts = self.settings.timeouts;

        let frame = match read_frame(&mut stream, timeouts.io).await {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Failed to read envelope from {}: {}", peer, e);
                return;
            }
        };

        let message = match frame.decode() {
            Ok(message) => message,
            Err(ProtocolError::UnknownKind(tag)) => {
                tracing::warn!("Message kind {} from {} not implemented", tag, peer);
                return;
            }
            Err(e) => {
                tracing::error!("Malformed envelope (tag {}) from {}: {}", frame.tag, peer, e);
                return;
            }
        };

        match message {
            Message::RegisterSatellite(info) => {
                if let Err(e) = self.directory.register(info).await {
                    tracing::error!("Rejected registration from {}: {}", peer, e);
                }
            }
            Message::JobRequest(job) => {
                let request_id = Uuid::new_v4();
                tracing::info!("Received job request {} ({}) from {}", request_id, job.tool, peer);

                let response = self.forward_job(&frame, &job, request_id).await;

                if let Err(e) = write_response(&mut stream, &response, timeouts.io).await {
                    tracing::error!("Failed to return result of {} to {}: {}", request_id, peer, e);
                }
            }
        }
    }

    async fn forward_job(&self, frame: &Frame, job: &Job, request_id: Uuid) -> JobResponse {
        let attempts = self.settings.forward_attempts.max(1);
        let mut tried: Vec<String> = Vec::new();
        let mut last_error: Option<Error> = None;

        for attempt in 1..=attempts {
            let (name, satellite) = match self.directory.route_excluding(&tried).await {
                Ok(route) => route,
                Err(e) => {
                    let error = last_error.unwrap_or(e);
                    tracing::error!("Dropping job request {}: {}", request_id, error);
                    return JobResponse::failed(&error);
                }
            };

            tracing::info!(
                "Job request {} ({}) handled by {} (attempt {}/{})",
                request_id,
                job.tool,
                name,
                attempt,
                attempts
            );

            match self.exchange(&satellite, frame).await {
                Ok(response) => return response,
                Err(ForwardFailure::BeforeDelivery(e)) => {
                    tracing::warn!("Satellite {} unreachable for {}: {}", name, request_id, e);
                    tried.push(name);
                    last_error = Some(e);
                }
                Err(ForwardFailure::AfterDelivery(e)) => {
                    tracing::error!("Satellite {} failed to answer {}: {}", name, request_id, e);
                    return JobResponse::failed(&e);
                }
            }
        }

        let error = last_error.unwrap_or(Error::NoSatellitesAvailable);
        tracing::error!("Giving up on job request {}: {}", request_id, error);
        JobResponse::failed(&error)
    }

    async fn exchange(
        &self,
        satellite: &ConnectivityInfo,
        frame: &Frame,
    ) -> Result<JobResponse, ForwardFailure> {
        let timeouts = &self.settings.timeouts;

        let mut stream = connect(satellite, timeouts).await.map_err(|e| {
            ForwardFailure::BeforeDelivery(Error::connection("connecting to satellite", e))
        })?;

        write_frame(&mut stream, frame, timeouts.io)
            .await
            .map_err(|e| ForwardFailure::BeforeDelivery(Error::connection("forwarding job", e)))?;

        read_response(&mut stream, timeouts.job).await.map_err(|e| {
            ForwardFailure::AfterDelivery(Error::connection("awaiting satellite result", e))
        })
    }
}
