//! Fatal error taxonomy for a sync run.
//!
//! Only conditions that abort the whole pass live here. Per-symbol and
//! per-record failures are ordinary data (`QuoteBook::unresolved`,
//! `UpdateOutcome`) so callers can inspect and summarize them.

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Required configuration is missing or invalid. Raised before any
    /// network call is made.
    #[error("configuration error: {0}")]
    Config(String),

    /// The token exchange was rejected or failed at the transport level.
    /// Nothing downstream can proceed without a token.
    #[error("token exchange failed: {0}")]
    Auth(String),

    /// Listing the table failed at the transport/HTTP level. A partial
    /// listing cannot be trusted to contain every identifier, so this
    /// aborts the run.
    #[error("record listing failed: {0}")]
    Fetch(String),

    /// The Bitable API reported a logical failure (non-zero code, possibly
    /// on an HTTP 2xx response).
    #[error("bitable api error (code {code}): {msg}")]
    Api { code: i64, msg: String },
}
