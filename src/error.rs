//! Error types for the Podman varlink client.
//!
//! Transport failures, protocol violations and daemon-reported errors all
//! surface through [`PodmanError`]. Daemon errors are decoded from the varlink
//! error name and its parameters by [`PodmanError::from_reply`]; names without
//! a dedicated variant land in [`PodmanError::Rpc`] with the raw payload kept.

use std::time::Duration;

use serde_json::{Map, Value};
use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, PodmanError>;

/// Interface prefix of daemon-defined errors.
pub const PODMAN_INTERFACE: &str = "io.podman";

/// Interface prefix of errors defined by the varlink service itself.
pub const VARLINK_SERVICE_INTERFACE: &str = "org.varlink.service";

/// Errors that can occur while talking to the Podman service.
#[derive(Debug, Error)]
pub enum PodmanError {
    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// The socket could not be opened or the daemon is unreachable.
    #[error("failed varlink connection \"{address}\": {source}")]
    Connection {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// No reply arrived within the configured bound.
    #[error("request timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// Malformed frame or reply.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A call was attempted on a closed connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// I/O error on an established connection, including the daemon hanging up.
    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),

    // =========================================================================
    // Client-side Validation
    // =========================================================================
    /// Malformed endpoint uri.
    #[error("invalid uri '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    /// Argument rejected before a request was sent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// SSH tunnel could not be established.
    #[error("ssh tunnel to {destination} failed: {reason}")]
    Tunnel { destination: String, reason: String },

    // =========================================================================
    // io.podman Errors
    // =========================================================================
    #[error("container not found: {id}: {reason}")]
    ContainerNotFound { id: String, reason: String },

    #[error("image not found: {id}: {reason}")]
    ImageNotFound { id: String, reason: String },

    #[error("pod not found: {name}: {reason}")]
    PodNotFound { name: String, reason: String },

    #[error("volume not found: {id}: {reason}")]
    VolumeNotFound { id: String, reason: String },

    #[error("no container running")]
    NoContainerRunning,

    #[error("no containers in pod {name}")]
    NoContainersInPod { name: String },

    /// One or more containers of a pod failed an operation.
    #[error("pod {podname} container error: {}", format_pod_errors(.errors))]
    PodContainerError {
        podname: String,
        errors: Vec<PodContainerErrorData>,
    },

    #[error("invalid state for {id}: {reason}")]
    InvalidState { id: String, reason: String },

    #[error("error occurred: {reason}")]
    ErrorOccurred { reason: String },

    #[error("runtime error: {reason}")]
    RuntimeError { reason: String },

    #[error("method requires the 'more' flag: {reason}")]
    WantsMoreRequired { reason: String },

    #[error("container {id} is stopped")]
    ContainerStopped { id: String },

    #[error("rootless operation requires cgroups v2: {reason}")]
    RequiresCgroupsV2 { reason: String },

    // =========================================================================
    // org.varlink.service Errors
    // =========================================================================
    #[error("interface not found: {interface}")]
    InterfaceNotFound { interface: String },

    #[error("method not found: {method}")]
    MethodNotFound { method: String },

    #[error("method not implemented: {method}")]
    MethodNotImplemented { method: String },

    #[error("invalid parameter: {parameter}")]
    InvalidParameter { parameter: String },

    /// Daemon error with no dedicated variant.
    #[error("rpc error {name}: {parameters}")]
    Rpc { name: String, parameters: Value },
}

/// Per-container failure carried by `io.podman.PodContainerError`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PodContainerErrorData {
    #[serde(default)]
    pub containerid: String,
    #[serde(default)]
    pub reason: String,
}

fn format_pod_errors(errors: &[PodContainerErrorData]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.containerid, e.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Coarse classification of [`PodmanError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    Timeout,
    Protocol,
    Closed,
    InvalidArgument,
    NotFound,
    InvalidState,
    Daemon,
    Rpc,
}

impl PodmanError {
    /// Map a varlink error reply onto a typed error.
    ///
    /// Missing parameters decode as empty strings so that the error kind is
    /// always decided by the name alone.
    pub fn from_reply(name: &str, parameters: Option<Map<String, Value>>) -> Self {
        let parameters = parameters.unwrap_or_default();
        let text = |key: &str| -> String {
            match parameters.get(key) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            }
        };

        let Some((interface, short)) = name.rsplit_once('.') else {
            return Self::Rpc {
                name: name.to_string(),
                parameters: Value::Object(parameters),
            };
        };

        match (interface, short) {
            (PODMAN_INTERFACE, "ContainerNotFound") => Self::ContainerNotFound {
                id: text("id"),
                reason: text("reason"),
            },
            (PODMAN_INTERFACE, "ImageNotFound") => Self::ImageNotFound {
                id: text("id"),
                reason: text("reason"),
            },
            (PODMAN_INTERFACE, "PodNotFound") => Self::PodNotFound {
                name: text("name"),
                reason: text("reason"),
            },
            (PODMAN_INTERFACE, "VolumeNotFound") => Self::VolumeNotFound {
                id: text("id"),
                reason: text("reason"),
            },
            (PODMAN_INTERFACE, "NoContainerRunning") => Self::NoContainerRunning,
            (PODMAN_INTERFACE, "NoContainersInPod") => Self::NoContainersInPod { name: text("name") },
            (PODMAN_INTERFACE, "PodContainerError") => Self::PodContainerError {
                podname: text("podname"),
                errors: parameters
                    .get("errors")
                    .cloned()
                    .and_then(|v| serde_json::from_value(v).ok())
                    .unwrap_or_default(),
            },
            (PODMAN_INTERFACE, "InvalidState") => Self::InvalidState {
                id: text("id"),
                reason: text("reason"),
            },
            (PODMAN_INTERFACE, "ErrorOccurred") => Self::ErrorOccurred { reason: text("reason") },
            (PODMAN_INTERFACE, "RuntimeError") => Self::RuntimeError { reason: text("reason") },
            (PODMAN_INTERFACE, "WantsMoreRequired") => {
                Self::WantsMoreRequired { reason: text("reason") }
            }
            (PODMAN_INTERFACE, "ErrCtrStopped") => Self::ContainerStopped { id: text("id") },
            (PODMAN_INTERFACE, "ErrRequiresCgroupsV2ForRootless") => {
                Self::RequiresCgroupsV2 { reason: text("reason") }
            }
            (VARLINK_SERVICE_INTERFACE, "InterfaceNotFound") => Self::InterfaceNotFound {
                interface: text("interface"),
            },
            (VARLINK_SERVICE_INTERFACE, "MethodNotFound") => {
                Self::MethodNotFound { method: text("method") }
            }
            (VARLINK_SERVICE_INTERFACE, "MethodNotImplemented") => {
                Self::MethodNotImplemented { method: text("method") }
            }
            (VARLINK_SERVICE_INTERFACE, "InvalidParameter") => Self::InvalidParameter {
                parameter: text("parameter"),
            },
            _ => Self::Rpc {
                name: name.to_string(),
                parameters: Value::Object(parameters),
            },
        }
    }

    /// Coarse kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } | Self::Tunnel { .. } | Self::Io(_) => ErrorKind::Connection,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::ConnectionClosed => ErrorKind::Closed,
            Self::InvalidUri { .. } | Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::ContainerNotFound { .. }
            | Self::ImageNotFound { .. }
            | Self::PodNotFound { .. }
            | Self::VolumeNotFound { .. } => ErrorKind::NotFound,
            Self::InvalidState { .. } | Self::ContainerStopped { .. } | Self::NoContainerRunning => {
                ErrorKind::InvalidState
            }
            Self::NoContainersInPod { .. }
            | Self::PodContainerError { .. }
            | Self::ErrorOccurred { .. }
            | Self::RuntimeError { .. }
            | Self::WantsMoreRequired { .. }
            | Self::RequiresCgroupsV2 { .. }
            | Self::InterfaceNotFound { .. }
            | Self::MethodNotFound { .. }
            | Self::MethodNotImplemented { .. }
            | Self::InvalidParameter { .. } => ErrorKind::Daemon,
            Self::Rpc { .. } => ErrorKind::Rpc,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl From<std::io::Error> for PodmanError {
    fn from(err: std::io::Error) -> Self {
        PodmanError::Io(err)
    }
}

impl From<serde_json::Error> for PodmanError {
    fn from(err: serde_json::Error) -> Self {
        PodmanError::Protocol(format!("invalid JSON payload: {}", err))
    }
}
