//! Error taxonomy.

use thiserror::Error;

/// Errors a plugin returns from its own operations.
///
/// These are always *recoverable at some scope* — a plugin error never
/// directly corrupts ring state. How it is handled (abort the stage,
/// fall back at a restart boundary, or just log) is decided by the
/// caller, not by the error itself.
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("plugin configuration error: {0}")]
    Configuration(String),

    #[error("plugin processing error: {0}")]
    Processing(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("plugin does not support live reconfiguration")]
    UnsupportedReconfig,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Errors from the restart protocol. Always recoverable at a restart boundary.
#[derive(Error, Debug)]
pub enum RestartError {
    #[error("stage index {0} is out of range")]
    StageNotFound(usize),

    #[error("restart interrupted by another concurrent restart request")]
    Interrupted,

    #[error("new configuration rejected: {0}; stage resumed with previous configuration")]
    ConfigurationFallback(String),

    #[error("restart failed and the previous configuration could not be restored: {0}")]
    Unrecoverable(String),
}

/// Top-level pipeline errors (construction, supervision, join).
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("pipeline requires at least 3 stages (1 input, 1 output, >=1 processor), got {0}")]
    TooFewStages(usize),

    #[error("stage {index} ('{name}') has kind {found:?} but chain position requires {expected:?}")]
    StageKindMismatch {
        index: usize,
        name: String,
        found: crate::plugin::PluginKind,
        expected: crate::plugin::PluginKind,
    },

    #[error("number of plugins ({plugins}) does not match number of configured stages ({stages})")]
    PluginCountMismatch { plugins: usize, stages: usize },

    #[error("buffer capacity must be positive")]
    InvalidBufferCapacity,

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("failed to read configuration file: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("restart error: {0}")]
    Restart(#[from] RestartError),

    #[error("a stage worker thread panicked: {0}")]
    WorkerPanicked(String),

    #[error("invariant violated: {0}")]
    InvariantViolated(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
