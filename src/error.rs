//! Error taxonomy shared by the dispatcher, satellites and clients.
//!
//! Every failure that can end a job request maps onto one [`FailureKind`], which is what
//! travels back to the client inside a `JobResponse::Failed`.

use crate::comm::protocol::ProtocolError;
use crate::comm::types::FailureKind;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The registry has no descriptor for a name the balancer handed out.
    #[error("unknown satellite: {0}")]
    UnknownSatellite(String),

    #[error("no satellites available")]
    NoSatellitesAvailable,

    /// Fetching or instantiating a tool failed. All causes collapse into this kind.
    #[error("unknown tool {tool}: {cause}")]
    UnknownTool { tool: String, cause: String },

    #[error("tool {tool} failed: {cause}")]
    ToolFailed { tool: String, cause: String },

    #[error("invalid registration: {0}")]
    InvalidRegistration(String),

    #[error("connection error while {stage}: {source}")]
    Connection {
        stage: &'static str,
        #[source]
        source: ProtocolError,
    },

    /// A peer answered with a structured failure.
    #[error("job rejected ({kind}): {message}")]
    Rejected { kind: FailureKind, message: String },
}

impl Error {
    pub fn connection(stage: &'static str, source: impl Into<ProtocolError>) -> Self {
        Self::Connection {
            stage,
            source: source.into(),
        }
    }

    /// The kind reported to a client when this error ends its request.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Error::UnknownSatellite(_) => FailureKind::UnknownSatellite,
            Error::NoSatellitesAvailable => FailureKind::NoSatellitesAvailable,
            Error::UnknownTool { .. } => FailureKind::UnknownTool,
            Error::ToolFailed { .. } => FailureKind::ToolFailed,
            Error::InvalidRegistration(_) | Error::Connection { .. } => FailureKind::Connection,
            Error::Rejected { kind, .. } => *kind,
        }
    }
}
