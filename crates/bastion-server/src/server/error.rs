//! Error type for the runtime.
//!
//! Bootstrap failures (configuration, TLS material, database, discovery
//! backend) are fatal and surface before any listener is bound. Serving
//! failures are funneled into the shutdown path and returned from
//! [`Runtime::serve`](crate::server::runtime::Runtime::serve).

use std::path::PathBuf;
use tonic::Status;

use crate::server::runtime::Phase;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A configuration value is missing or out of range.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The web app type is neither `HTTP` nor `GRPC`.
    #[error("unsupported protocol type `{0}`")]
    UnsupportedProtocol(String),

    /// Certificate, key or CA material could not be read or parsed.
    #[error("TLS material at {}: {reason}", path.display())]
    Tls { path: PathBuf, reason: String },

    /// The discovery backend tag is not recognized.
    #[error("unknown discovery backend `{0}`")]
    UnknownDiscoveryBackend(String),

    /// The discovery agent rejected or did not answer a request.
    #[error("{backend} {operation} failed{}: {message}", status.map(|s| format!(" with status {s}")).unwrap_or_default())]
    Discovery {
        backend: &'static str,
        operation: &'static str,
        status: Option<u16>,
        message: String,
    },

    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The serve loop stopped on its own.
    #[error("server error: {0}")]
    Server(String),

    #[error(transparent)]
    Transport(#[from] tonic::transport::Error),

    #[error(transparent)]
    Store(#[from] bastion_store::Error),

    #[error(transparent)]
    Id(#[from] bastion_id::Error),

    /// The runtime was asked to do something its current phase forbids.
    #[error("operation requires phase {expected:?}, runtime is {actual:?}")]
    InvalidPhase { expected: Phase, actual: Phase },
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::Config(_) | Error::UnsupportedProtocol(_) | Error::UnknownDiscoveryBackend(_) => {
                Status::failed_precondition(err.to_string())
            }
            Error::Store(bastion_store::Error::Validation(reason)) => Status::invalid_argument(reason),
            Error::Store(bastion_store::Error::UnknownColumn { .. })
            | Error::Store(bastion_store::Error::EmptyChangeSet(_))
            | Error::Store(bastion_store::Error::MissingCondition(_)) => {
                Status::invalid_argument(err.to_string())
            }
            Error::Discovery { .. } => Status::unavailable(err.to_string()),
            Error::InvalidPhase { .. } => Status::unavailable(err.to_string()),
            _ => Status::internal(err.to_string()),
        }
    }
}
