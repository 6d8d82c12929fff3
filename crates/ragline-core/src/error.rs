//! Error taxonomy shared by every Ragline crate.

use thiserror::Error;

/// All failures surfaced by the pipeline.
#[derive(Debug, Error)]
pub enum RaglineError {
    /// Empty, oversized or malformed input. Rejected before any I/O.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Timeout, rate limit or 5xx from an external service. Eligible for retry.
    #[error("{service} transient failure: {message}")]
    Transient { service: String, message: String },

    /// Terminal failure from an external service (retries exhausted or non-retryable status).
    #[error("{service} failed: {message}")]
    FatalService { service: String, message: String },

    /// A vector disagrees with the collection's established dimension.
    #[error(
        "Dimension mismatch in collection '{collection}' (id '{id}'): expected {expected}, got {actual}"
    )]
    DimensionMismatch {
        collection: String,
        id: String,
        expected: usize,
        actual: usize,
    },

    /// Missing or invalid configuration (credentials, model files, ...).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Translation of a single chunk failed.
    #[error("Translation failed for '{id}': {message}")]
    TranslationFailed { id: String, message: String },

    /// `create` found an existing collection with a different configuration.
    #[error("Collection '{name}' conflict: {message}")]
    CollectionConflict { name: String, message: String },

    /// Query backend differs from the backend that populated the collection.
    #[error("Collection '{collection}' was indexed with '{indexed}', refusing to query with '{requested}'")]
    BackendMismatch {
        collection: String,
        indexed: String,
        requested: String,
    },

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// Post-population count check failed.
    #[error("Verification of '{collection}' failed: expected {expected} documents, found {actual}")]
    VerificationFailed {
        collection: String,
        expected: usize,
        actual: usize,
    },

    /// A batched operation failed at `batch_index` (first record at `offset`).
    #[error("Batch {batch_index} (offset {offset}) failed: {source}")]
    Batch {
        batch_index: usize,
        offset: usize,
        source: Box<RaglineError>,
    },

    /// Upsert aborted partway. `committed` records are durable and can be resumed from.
    #[error(
        "Upsert into '{collection}' aborted at batch {batch_index} after {committed} committed records: {source}"
    )]
    PartialUpsert {
        collection: String,
        committed: usize,
        batch_index: usize,
        source: Box<RaglineError>,
    },

    /// Blue/green swap failed after staging was populated. `staging` still
    /// holds the verified data; `collection` is back under its live name
    /// unless `restored` is false.
    #[error(
        "Swapping '{staging}' into '{collection}' failed (live collection restored: {restored}): {source}"
    )]
    SwapFailed {
        collection: String,
        staging: String,
        restored: bool,
        source: Box<RaglineError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RaglineError {
    pub fn transient(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn fatal(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FatalService {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Whether a local retry may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Innermost error, looking through `Batch`, `PartialUpsert` and `SwapFailed` wrappers.
    pub fn root_cause(&self) -> &RaglineError {
        match self {
            Self::Batch { source, .. }
            | Self::PartialUpsert { source, .. }
            | Self::SwapFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Map a non-success HTTP status from `service` into the taxonomy.
    ///
    /// 408/429/5xx are transient, 400/413/422 are validation failures,
    /// everything else is terminal.
    pub fn from_status(service: &str, status: u16, body: &str) -> Self {
        let body = truncate_body(body);
        match status {
            408 | 429 | 500..=599 => Self::transient(service, format!("HTTP {status}: {body}")),
            400 | 413 | 422 => Self::Validation(format!("{service} rejected request (HTTP {status}): {body}")),
            401 | 403 => Self::fatal(service, format!("authentication rejected (HTTP {status}): {body}")),
            _ => Self::fatal(service, format!("HTTP {status}: {body}")),
        }
    }

    /// Map a transport-level `reqwest` failure. Timeouts and connection
    /// failures are transient; malformed responses are terminal.
    pub fn from_http(service: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
            Self::transient(service, err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status(service, status.as_u16(), &err.to_string())
        } else {
            Self::fatal(service, err.to_string())
        }
    }
}

fn truncate_body(body: &str) -> &str {
    const MAX: usize = 300;
    if body.len() <= MAX {
        return body;
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

pub type Result<T> = std::result::Result<T, RaglineError>;
