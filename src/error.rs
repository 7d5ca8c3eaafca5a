//! Error taxonomy for the retrieval pipeline.
//!
//! Every fallible library operation returns [`RagError`]. Callers that need
//! to branch on failure class use [`RagError::kind`], which folds the
//! variants onto the six user-facing [`ErrorKind`]s:
//!
//! | Kind | Raised by | Policy |
//! |------|-----------|--------|
//! | `Configuration` | missing credential / endpoint | propagates, halts the flow |
//! | `NotFound` | no index generation to load | propagates, halts the flow |
//! | `ProviderQuota` | HTTP 429 from a provider | degraded answer |
//! | `ProviderAuth` | HTTP 401/403 from a provider | degraded answer |
//! | `ProviderGeneric` | any other provider failure | degraded answer |
//! | `Unclassified` | store, I/O, anything else | degraded answer |

use std::fmt;

use reqwest::StatusCode;

/// Convenience alias used throughout the library.
pub type Result<T, E = RagError> = std::result::Result<T, E>;

/// A failure reported by an embedding or chat provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("rate limit or quota exceeded: {0}")]
    Quota(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("{0}")]
    Generic(String),
}

impl ProviderError {
    /// Classify a non-success HTTP response.
    pub fn from_status(provider: &str, status: StatusCode, body: &str) -> Self {
        match status.as_u16() {
            429 => ProviderError::Quota(format!("{} returned {}: {}", provider, status, body)),
            401 | 403 => ProviderError::Auth(format!("{} returned {}: {}", provider, status, body)),
            _ => ProviderError::Generic(format!("{} API error {}: {}", provider, status, body)),
        }
    }

    /// Classify a transport-level failure (connection refused, TLS, decode).
    pub fn from_transport(provider: &str, err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(provider, status, &err.to_string());
        }
        ProviderError::Generic(format!("{} request failed: {}", provider, err))
    }
}

/// Top-level error for the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    NotFound(String),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("index store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error(transparent)]
    Unclassified(#[from] anyhow::Error),
}

/// The six failure classes the rest of the system reasons about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    NotFound,
    ProviderQuota,
    ProviderAuth,
    ProviderGeneric,
    Unclassified,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::NotFound => "not_found",
            ErrorKind::ProviderQuota => "provider_quota",
            ErrorKind::ProviderAuth => "provider_auth",
            ErrorKind::ProviderGeneric => "provider_generic",
            ErrorKind::Unclassified => "unclassified",
        };
        f.write_str(label)
    }
}

/// Advisory shown when a provider reports rate or quota exhaustion.
pub const QUOTA_MESSAGE: &str = "The query could not be completed because the API rate limit or \
     quota was exceeded (429). Check the billing and usage limits of the provider account.";

/// Advisory shown when a provider rejects the configured credentials.
pub const AUTH_MESSAGE: &str =
    "Authentication with the API failed. Check OPENAI_API_KEY or [openai].api_key in the config.";

impl RagError {
    pub fn configuration(message: impl Into<String>) -> Self {
        RagError::Configuration(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        RagError::NotFound(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RagError::Configuration(_) => ErrorKind::Configuration,
            RagError::NotFound(_) => ErrorKind::NotFound,
            RagError::Provider(ProviderError::Quota(_)) => ErrorKind::ProviderQuota,
            RagError::Provider(ProviderError::Auth(_)) => ErrorKind::ProviderAuth,
            RagError::Provider(ProviderError::Generic(_)) => ErrorKind::ProviderGeneric,
            RagError::Store(_)
            | RagError::Io(_)
            | RagError::Manifest(_)
            | RagError::Unclassified(_) => ErrorKind::Unclassified,
        }
    }

    /// True for the kinds that must halt the caller instead of degrading.
    pub fn is_operator_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::Configuration | ErrorKind::NotFound)
    }

    /// The message displayed to a user in place of an answer.
    pub fn user_message(&self) -> String {
        match self {
            RagError::Provider(ProviderError::Quota(_)) => QUOTA_MESSAGE.to_string(),
            RagError::Provider(ProviderError::Auth(_)) => AUTH_MESSAGE.to_string(),
            RagError::Provider(ProviderError::Generic(detail)) => {
                format!("Provider API error: {}", detail)
            }
            RagError::Configuration(_) | RagError::NotFound(_) => self.to_string(),
            other => format!("Unexpected error in the answer pipeline: {}", other),
        }
    }
}
