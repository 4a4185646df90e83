use thiserror::Error;

/// Crate-wide error type.
///
/// Distinguishes the error kinds the core needs to react to differently
/// (malformed request vs. invalid reference vs. backend failure) rather
/// than collapsing everything into a single string, since callers such as
/// the session loop and the REST adapter branch on which kind occurred.
#[derive(Debug, Error)]
pub enum Error {
    /// A reference failed to parse: an interior segment was empty, or a
    /// segment contained a literal `/` after normalization.
    #[error("invalid reference {reference:?}: {reason}")]
    InvalidRef { reference: String, reason: &'static str },

    /// A wire-protocol frame or REST body could not be decoded into a
    /// well-formed request.
    #[error("failed to decode request: {0}")]
    Decode(String),

    /// The pluggable storage backend returned a failure.
    #[error("backend operation failed: {0}")]
    Backend(String),

    /// A feature that is intentionally unimplemented by this crate's
    /// in-tree stubs (the persistent backend, rules-expression
    /// evaluation).
    #[error("unimplemented: {0}")]
    Unimplemented(&'static str),

    /// The `equalTo` query parameter was combined with `startAt`/`endAt`,
    /// or `limitToFirst` was combined with `limitToLast`.
    #[error("conflicting query parameters: {0}")]
    ConflictingQuery(&'static str),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
