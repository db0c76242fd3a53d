//! Error taxonomy shared by the investigation framework, the resource
//! builder, and the executor. Every variant wraps its source so root causes
//! survive to the logs and the incident notes.

use thiserror::Error;

/// Boxed error used at the strategy seams where concrete types would force
/// every adapter crate into the signature.
pub type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Contractual substring on assume-role denials that marks a cluster whose
/// cloud credentials have been revoked (handled by the CCAM path rather
/// than surfaced as a failure).
pub const CREDENTIALS_MISSING_MARKER: &str = "failed to assume into support-role";

/// Classified failure raised by investigations and resource assembly.
#[derive(Debug, Error)]
pub enum TriageError {
    /// Transient or environmental: cloud API, cluster-management API,
    /// Kubernetes API. Subject to escalation after executor-level retries.
    #[error("infrastructure failure: {context}")]
    Infrastructure {
        context: String,
        #[source]
        source: DynError,
    },

    /// A data invariant did not hold (malformed payload, mis-configured
    /// cluster record). Fatal for the current investigation.
    #[error("validation failure: {context}")]
    Validation { context: String },

    /// Programmer error; never expected in a healthy deployment.
    #[error("internal error: {context}")]
    Internal { context: String },

    /// The customer-account credential chain was denied. Handled as a
    /// successful CCAM outcome, not as a failure.
    #[error("cloud credentials are missing: {context}")]
    CredentialsMissing { context: String },
}

impl TriageError {
    pub fn infrastructure(context: impl Into<String>, source: impl Into<DynError>) -> Self {
        Self::Infrastructure {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn validation(context: impl Into<String>) -> Self {
        Self::Validation {
            context: context.into(),
        }
    }

    pub fn internal(context: impl Into<String>) -> Self {
        Self::Internal {
            context: context.into(),
        }
    }

    pub fn credentials_missing(context: impl Into<String>) -> Self {
        Self::CredentialsMissing {
            context: context.into(),
        }
    }

    #[must_use]
    pub const fn is_credentials_missing(&self) -> bool {
        matches!(self, Self::CredentialsMissing { .. })
    }

    /// Whether the outer pipeline should re-trigger the run.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Infrastructure { source, .. } => {
                crate::executor::retry::is_retryable(source.as_ref())
            }
            Self::Validation { .. } | Self::Internal { .. } | Self::CredentialsMissing { .. } => {
                false
            }
        }
    }
}
