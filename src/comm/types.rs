use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Network endpoint of a process taking part in the cluster.
///
/// Satellites always carry a `name`; the dispatcher and the code repository do not.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectivityInfo {
    pub name: Option<String>,
    pub host: String,
    pub port: u16,
}

impl ConnectivityInfo {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            name: None,
            host: host.into(),
            port,
        }
    }

    pub fn named(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: Some(name.into()),
            host: host.into(),
            port,
        }
    }

    /// `host:port`, suitable for `TcpStream::connect`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl fmt::Display for ConnectivityInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}@{}:{}", name, self.host, self.port),
            None => write!(f, "{}:{}", self.host, self.port),
        }
    }
}

/// Kind tag of an envelope. The tag is a single byte on the wire so that new kinds can be
/// added without breaking the frame layout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    JobRequest = 1,
    RegisterSatellite = 2,
}

impl MessageKind {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(MessageKind::JobRequest),
            2 => Some(MessageKind::RegisterSatellite),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::JobRequest => f.write_str("JOB_REQUEST"),
            MessageKind::RegisterSatellite => f.write_str("REGISTER_SATELLITE"),
        }
    }
}

/// A request to invoke a named tool.
///
/// The parameter is opaque to the dispatcher and satellite. It travels as JSON text since
/// bincode cannot encode a `serde_json::Value`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Job {
    /// Identifier the code-fetch capability resolves (e.g. "appserver.job.impl.Fibonacci").
    pub tool: String,
    pub parameter_json: String,
}

impl Job {
    pub fn new<P: Serialize>(tool: impl Into<String>, parameter: &P) -> serde_json::Result<Self> {
        Ok(Self {
            tool: tool.into(),
            parameter_json: serde_json::to_string(parameter)?,
        })
    }

    pub fn from_value(tool: impl Into<String>, parameter: serde_json::Value) -> Self {
        Self {
            tool: tool.into(),
            parameter_json: parameter.to_string(),
        }
    }

    pub fn parameter(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.parameter_json)
    }
}

/// The unit of exchange between processes. The payload type is fixed by the kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    JobRequest(Job),
    RegisterSatellite(ConnectivityInfo),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::JobRequest(_) => MessageKind::JobRequest,
            Message::RegisterSatellite(_) => MessageKind::RegisterSatellite,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FailureKind {
    NoSatellitesAvailable,
    UnknownSatellite,
    UnknownTool,
    ToolFailed,
    Connection,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::NoSatellitesAvailable => "no satellites available",
            FailureKind::UnknownSatellite => "unknown satellite",
            FailureKind::UnknownTool => "unknown tool",
            FailureKind::ToolFailed => "tool failed",
            FailureKind::Connection => "connection error",
        };
        f.write_str(name)
    }
}

/// What a satellite (and, relayed, the dispatcher) answers to a job request.
///
/// Not wrapped in an envelope. A failure is always distinguishable from a result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobResponse {
    Completed { result_json: String },
    Failed { kind: FailureKind, message: String },
}

impl JobResponse {
    pub fn completed(result: &serde_json::Value) -> Self {
        JobResponse::Completed {
            result_json: result.to_string(),
        }
    }

    pub fn failed(error: &Error) -> Self {
        JobResponse::Failed {
            kind: error.failure_kind(),
            message: error.to_string(),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, JobResponse::Completed { .. })
    }

    pub fn into_result(self) -> Result<serde_json::Value> {
        match self {
            JobResponse::Completed { result_json } => serde_json::from_str(&result_json)
                .map_err(|e| Error::connection("decoding job result", e)),
            JobResponse::Failed { kind, message } => Err(Error::Rejected { kind, message }),
        }
    }
}
