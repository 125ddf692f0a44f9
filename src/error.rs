//! Error types for collectors, targets and their collaborators.
use std::{error::Error as StdError, fmt, io, path::PathBuf};

use thiserror::Error;

use crate::collector::CollectorState;

/// Boxed error used as the source of backend setup failures.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors raised by the output model.
#[derive(Debug, Error)]
pub enum OutputError {
    /// The kind tag is not one of the supported kinds.
    #[error("{kind} is not a valid kind [{valid}]", valid = crate::output::OutputKind::valid_kinds())]
    InvalidKind {
        /// The rejected kind tag, as given by the caller.
        kind: String,
    },

    /// A metric entry was used where a filesystem path is required.
    #[error("'{value}' is a metric, not a path")]
    NotAPath {
        /// The value of the metric entry.
        value: String,
    },
}

/// Errors raised by a target or its connection.
#[derive(Debug, Error)]
pub enum TargetError {
    /// The target is in a state that needs operator intervention.
    #[error("{0}")]
    Stable(String),

    /// The target is in a state that is safe to retry.
    #[error("{0}")]
    Transient(String),

    /// No connection has been attached to the target.
    #[error("target '{0}' is not connected")]
    NotConnected(String),

    /// A command exited unsuccessfully.
    #[error("command `{command}` failed with {status}: {stderr}")]
    Command {
        /// The command line that was run.
        command: String,
        /// Human readable exit status.
        status: String,
        /// Captured standard error.
        stderr: String,
    },

    /// I/O failure talking to the target.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl TargetError {
    /// Returns `true` if the harness may retry the failed operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Errors raised by the collector lifecycle.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// A lifecycle operation was called in the wrong state.
    #[error("cannot {op} collector '{collector}' while {state}")]
    InvalidState {
        /// Name of the collector.
        collector: String,
        /// The rejected operation.
        op: &'static str,
        /// The state the collector was in.
        state: CollectorState,
    },

    /// The backend failed to set up, start or finalize its capture.
    #[error("collector '{backend}' setup failed: {source}")]
    Setup {
        /// Name of the backend.
        backend: String,
        /// Underlying failure.
        #[source]
        source: BoxError,
    },

    /// A target operation failed. Propagated unchanged.
    #[error(transparent)]
    Target(#[from] TargetError),

    /// An output entry could not be built.
    #[error(transparent)]
    Output(#[from] OutputError),
}

impl CollectorError {
    /// Wraps a backend failure into [`CollectorError::Setup`].
    pub fn setup(backend: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Setup { backend: backend.into(), source: source.into() }
    }

    /// Returns `true` for lifecycle misuse.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState { .. })
    }
}

/// Error returned by scoped acquisition.
///
/// When the guarded body fails, the stop that follows may fail too; both are kept.
#[derive(Debug)]
pub enum CaptureError<E> {
    /// Reset or start failed, or stop failed after the body succeeded.
    Collector(CollectorError),

    /// The guarded body failed.
    Body {
        /// The body's error.
        error: E,
        /// Stop failure observed while unwinding, if any.
        stop: Option<CollectorError>,
    },
}

impl<E> CaptureError<E> {
    /// Returns the stop failure observed while unwinding a failed body.
    pub fn stop_error(&self) -> Option<&CollectorError> {
        match self {
            Self::Collector(_) => None,
            Self::Body { stop, .. } => stop.as_ref(),
        }
    }

    /// Returns the body's error, if the body failed.
    pub fn body_error(&self) -> Option<&E> {
        match self {
            Self::Collector(_) => None,
            Self::Body { error, .. } => Some(error),
        }
    }
}

impl<E: fmt::Display> fmt::Display for CaptureError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Collector(e) => write!(f, "{e}"),
            Self::Body { error, stop: None } => write!(f, "{error}"),
            Self::Body { error, stop: Some(stop) } => {
                write!(f, "{error} (stop also failed: {stop})")
            }
        }
    }
}

impl<E: StdError + 'static> StdError for CaptureError<E> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Collector(e) => Some(e),
            Self::Body { error, .. } => Some(error),
        }
    }
}

/// Errors returned by a cloud instance API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A dry run reported that the real request would have succeeded.
    #[error("request would have succeeded, but dry run was set")]
    DryRunOperation,

    /// The caller is not allowed to perform the request.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Any other API failure.
    #[error("{0}")]
    Other(String),
}

/// Errors raised while provisioning a remote target.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Invalid provisioner configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The instance API failed.
    #[error("instance api error: {0}")]
    Api(#[from] ApiError),

    /// The target could not be made usable.
    #[error(transparent)]
    Target(#[from] TargetError),

    /// Local I/O failure (e.g. writing a key pair).
    #[error("failed to write '{path}': {source}")]
    Io {
        /// File being written.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
}

/// Errors raised while saving or loading an output manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Failed to create the manifest directory.
    #[error("failed to create manifest directory '{dir}': {source}")]
    CreateDir {
        /// Directory being created.
        dir: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// Failed to create the temporary manifest file.
    #[error("failed to create '{path}': {source}")]
    CreateTemp {
        /// Temporary file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// Failed to serialize the manifest.
    #[error("failed to serialize manifest to '{path}': {source}")]
    Serialize {
        /// Temporary file path.
        path: PathBuf,
        /// Underlying serde error.
        source: serde_json::Error,
    },

    /// Failed to flush the manifest.
    #[error("failed to flush '{path}': {source}")]
    Flush {
        /// Temporary file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// Failed to sync the manifest to disk.
    #[error("failed to sync '{path}': {source}")]
    Sync {
        /// Temporary file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// Failed to move the temporary manifest into place.
    #[error("failed to rename '{from}' to '{to}': {source}")]
    Rename {
        /// Temporary file path.
        from: PathBuf,
        /// Final manifest path.
        to: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// Failed to open a manifest.
    #[error("failed to open '{path}': {source}")]
    Open {
        /// Manifest path.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// Failed to parse a manifest.
    #[error("failed to parse '{path}': {source}")]
    Parse {
        /// Manifest path.
        path: PathBuf,
        /// Underlying serde error.
        source: serde_json::Error,
    },
}

/// Result type for collector operations.
pub type CollectorResult<T> = std::result::Result<T, CollectorError>;

/// Result type for target operations.
pub type TargetResult<T> = std::result::Result<T, TargetError>;

/// Result type for provisioning operations.
pub type ProvisionResult<T> = std::result::Result<T, ProvisionError>;

/// Result type for manifest operations.
pub type ManifestResult<T> = std::result::Result<T, ManifestError>;
