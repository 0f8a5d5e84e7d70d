// error.rs — Error types for the policy gate.
//
// Four concerns, four enums. A BLOCKED verdict is not an error: it is the
// normal result of an audit and never appears here.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating an invariant catalog.
///
/// Catalog loading is fail-fast: any of these refuses to initialize the gate.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Failed to read the catalog file.
    #[error("failed to read catalog at {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The catalog is not valid YAML for the expected shape.
    #[error("failed to parse YAML catalog: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The catalog is not valid JSON for the expected shape.
    #[error("failed to parse JSON catalog: {0}")]
    Json(#[from] serde_json::Error),

    /// The catalog declares no domains at all.
    #[error("catalog declares no domains")]
    Empty,

    /// A domain identifier is blank.
    #[error("catalog contains a blank domain identifier")]
    BlankDomain,

    /// Two entries normalize to the same domain identifier.
    #[error("duplicate domain '{domain}' in catalog")]
    DuplicateDomain { domain: String },

    /// `max_transaction` is negative, NaN, or infinite.
    #[error("domain '{domain}': max_transaction must be a non-negative number, got {value}")]
    InvalidLimit { domain: String, value: f64 },

    /// A forbidden command or concept is an empty string.
    #[error("domain '{domain}': {field}[{index}] is empty")]
    EmptyEntry {
        domain: String,
        field: &'static str,
        index: usize,
    },

    /// `similarity_threshold` is outside (-1, 1].
    #[error("domain '{domain}': similarity_threshold must lie in (-1, 1], got {value}")]
    InvalidThreshold { domain: String, value: f32 },
}

/// A malformed audit request. Rejected before any invariant layer runs.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RequestError {
    /// The intent text is missing or whitespace-only.
    #[error("intent text is required")]
    EmptyIntent,

    /// The domain does not resolve to an invariant set.
    #[error("unknown domain '{domain}'")]
    UnknownDomain { domain: String },

    /// The amount is NaN or infinite.
    #[error("amount must be a finite number, got {amount}")]
    InvalidAmount { amount: f64 },
}

/// Failures of the embedding provider.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EmbeddingError {
    /// The provider could not be reached or returned a non-success status.
    #[error("embedding provider transport error: {0}")]
    Transport(String),

    /// The provider did not answer within its time budget.
    #[error("embedding provider timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// The provider answered with something that is not an embedding.
    #[error("malformed embedding response: {0}")]
    Malformed(String),

    /// The provider returned a zero-length vector.
    #[error("embedding provider returned an empty vector")]
    EmptyVector,

    /// Vectors of different lengths cannot be compared.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The concept index for the domain could not be built.
    #[error("concept index unavailable: {0}")]
    IndexUnavailable(String),
}

/// Errors returned by `audit()` instead of a verdict.
#[derive(Debug, Error)]
pub enum GateError {
    /// The request is malformed.
    #[error("invalid audit request: {0}")]
    Request(#[from] RequestError),

    /// The semantic layer could not run and the gate is configured to
    /// surface that as an error rather than a degraded BLOCKED verdict.
    #[error("semantic layer unavailable for domain '{domain}': {source}")]
    ProviderUnavailable {
        domain: String,
        source: EmbeddingError,
    },
}
