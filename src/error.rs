use crate::connection_string::ParseError;
use opentelemetry_http::HttpError;

/// Fatal pipeline errors.
///
/// These are returned for misconfiguration and programmer errors only. Anything that goes wrong
/// while delivering telemetry is reported through the [`DiagnosticLogger`] instead and never
/// surfaces as an `Error`.
///
/// [`DiagnosticLogger`]: crate::DiagnosticLogger
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// `initialize` was called on a pipeline that is already initialized.
    #[error("core should not be initialized more than once")]
    AlreadyInitialized,

    /// The pipeline was used before `initialize` completed.
    #[error("core is not initialized")]
    NotInitialized,

    /// Neither the configuration nor the connection string provides an instrumentation key.
    #[error("please provide an instrumentation key")]
    MissingInstrumentationKey,

    /// The connection string in the configuration could not be parsed.
    #[error("invalid connection string: {0}")]
    ConnectionString(#[from] ParseError),

    /// The configuration, or an extension's overrides of it, could not be read.
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] serde_json::Error),

    /// An extension failed validation, e.g. because it has no identifier.
    #[error("invalid extension: {0}")]
    InvalidExtension(String),

    /// After setup there is not a single channel to send telemetry to.
    #[error("no channels available to send telemetry")]
    NoChannels,

    /// A telemetry item passed to `track` is structurally invalid.
    #[error("invalid telemetry item: {0}")]
    InvalidTelemetry(&'static str),
}

/// Failure of a single transmission attempt.
///
/// Rendered into diagnostics when a batch is dropped; never returned to callers.
#[derive(thiserror::Error, Debug)]
pub(crate) enum DeliveryError {
    #[error("sending request failed with {0}")]
    Connection(HttpError),

    #[error("response code {0}")]
    Status(u16),

    #[error("partial success {accepted} of {received}")]
    PartialSuccess { accepted: usize, received: usize },

    #[error("response could not be parsed: {0}")]
    InvalidResponse(String),
}
