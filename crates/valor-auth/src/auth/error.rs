use reqwest::StatusCode;
use thiserror::Error;

use crate::storage::StorageError;

/// Errors surfaced by the authentication core.
///
/// Protocol failures (`MissingCode`, `MissingArtifacts`, `StateMismatch`) are
/// fatal for the current attempt; `Decryption` and `SessionExpired` are
/// routine conditions that resolve to the anonymous state rather than a
/// user-facing failure.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("unknown identity provider '{0}'")]
    UnknownProvider(String),
    #[error("authorization response missing code parameter")]
    MissingCode,
    #[error("no redeemable login artifacts for this callback")]
    MissingArtifacts,
    #[error("authorization state mismatch")]
    StateMismatch,
    #[error("authorization request denied ({code})")]
    Provider {
        code: String,
        description: Option<String>,
    },
    #[error("failed to decrypt stored payload: {0}")]
    Decryption(String),
    #[error("encryption failure: {0}")]
    Encryption(String),
    #[error("session expired")]
    SessionExpired,
    #[error("broker endpoint error {status}: {body}")]
    Broker { status: StatusCode, body: String },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("failed to launch system browser: {0}")]
    BrowserLaunch(String),
}
