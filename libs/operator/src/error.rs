//! Error kinds per the reconciliation layer's error handling design.
//!
//! `ValidationError`, `TransientFailure`, `ExternalSystemError` and
//! `FatalConfigError` map onto the four error kinds of the reconciliation
//! design; `KubeError` / `ConfigError` / `TemplateError` cover direct
//! failures from the underlying crates so every `?` site has a home.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    /// Invariant violated in a `Whisk`/`WhiskUser` declaration. No resource
    /// is created; surfaced as `.status` with phase `Failed`.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Direct failure from the Kubernetes API client.
    #[error("Kubernetes reported error: {0}")]
    KubeError(#[source] kube::Error),

    /// A Kubernetes API conflict or other transient failure exhausted its
    /// own retry budget. Retried by the framework on the next event; kept
    /// distinct from [`Error::KubeError`] so `metric_label` can tell a
    /// surfaced-immediately API failure from one that was retried first.
    #[error("operation was retried past its deadline: {source}")]
    TransientFailure { source: kube::Error },

    /// The underlying subsystem (object store, vector DB, cache, ...)
    /// refused a management operation. Logged locally; the owning
    /// component is marked `error` but other components still run.
    #[error("{component} rejected management operation: {message}")]
    ExternalSystemError {
        component: &'static str,
        message: String,
    },

    /// A required configuration section has no default and is missing.
    /// Not retried — the whole reconciliation aborts.
    #[error("missing required configuration: {0}")]
    FatalConfigError(String),

    #[error("configuration error: {0}")]
    ConfigError(#[from] config::ConfigError),

    #[error("template error: {0}")]
    TemplateError(#[from] tera::Error),

    #[error("invalid trace id")]
    InvalidTraceId,

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl From<kube::Error> for Error {
    fn from(e: kube::Error) -> Self {
        Error::KubeError(e)
    }
}

impl Error {
    /// Short, stable label used as a Prometheus metric label value.
    pub fn metric_label(&self) -> String {
        match self {
            Error::ValidationError(_) => "validation",
            Error::KubeError(_) => "kube",
            Error::TransientFailure { .. } => "transient",
            Error::ExternalSystemError { .. } => "external_system",
            Error::FatalConfigError(_) => "fatal_config",
            Error::ConfigError(_) => "config",
            Error::TemplateError(_) => "template",
            Error::InvalidTraceId => "invalid_trace_id",
            Error::SerializationError(_) => "serialization",
        }
        .to_owned()
    }

    /// True when the framework should treat this as retryable instead of
    /// a terminal, non-retried failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::KubeError(_) | Error::TransientFailure { .. } | Error::ExternalSystemError { .. }
        )
    }
}
