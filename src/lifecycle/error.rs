use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by the lifecycle manager.
///
/// Every variant reaches the immediate caller; nothing is retried internally.
/// Variants carry ids only, never token values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// No record for the (user, provider) key
    #[error("no credentials for user '{user_id}' provider '{provider_id}'")]
    NotFound { user_id: String, provider_id: String },

    /// The record has no refresh token, so it can never be refreshed
    #[error("no refresh token available for provider '{provider_id}'")]
    NoRefreshToken { provider_id: String },

    /// No refresh capability is registered for the provider
    #[error("no refresh capability registered for provider '{provider_id}'")]
    ProviderUnavailable { provider_id: String },

    /// Transport, provider-side or timeout failure during refresh
    #[error("token refresh failed for provider '{provider_id}': {reason}")]
    RefreshFailed {
        provider_id: String,
        /// Full cause chain, flattened for display
        reason: String,
        #[source]
        source: RefreshCause,
    },

    /// The provider answered without a usable access token
    #[error("provider '{provider_id}' returned an empty refresh result")]
    InvalidRefreshResult { provider_id: String },
}

impl TokenError {
    pub(crate) fn not_found(user_id: &str, provider_id: &str) -> Self {
        TokenError::NotFound {
            user_id: user_id.to_string(),
            provider_id: provider_id.to_string(),
        }
    }

    pub fn refresh_failed(provider_id: &str, cause: anyhow::Error) -> Self {
        TokenError::RefreshFailed {
            provider_id: provider_id.to_string(),
            reason: format!("{:#}", cause),
            source: RefreshCause::from(cause),
        }
    }

    /// True when the user must re-run the OAuth flow to recover.
    pub fn requires_reconnect(&self) -> bool {
        matches!(
            self,
            TokenError::NoRefreshToken { .. } | TokenError::RefreshFailed { .. }
        )
    }
}

/// Underlying cause of a failed refresh, shared between clones.
///
/// Two causes are equal only when they are the same failure.
#[derive(Clone)]
pub struct RefreshCause(Arc<dyn StdError + Send + Sync + 'static>);

impl From<anyhow::Error> for RefreshCause {
    fn from(cause: anyhow::Error) -> Self {
        let boxed: Box<dyn StdError + Send + Sync + 'static> = cause.into();
        RefreshCause(Arc::from(boxed))
    }
}

impl fmt::Display for RefreshCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for RefreshCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl StdError for RefreshCause {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

impl PartialEq for RefreshCause {
    fn eq(&self, other: &Self) -> bool {
        Arc::as_ptr(&self.0) as *const () == Arc::as_ptr(&other.0) as *const ()
    }
}

impl Eq for RefreshCause {}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Context};

    #[test]
    fn test_error_messages() {
        let err = TokenError::not_found("u9", "confluence");
        assert_eq!(
            err.to_string(),
            "no credentials for user 'u9' provider 'confluence'"
        );

        let err = TokenError::refresh_failed("slack", anyhow!("timed out after 30s"));
        assert_eq!(
            err.to_string(),
            "token refresh failed for provider 'slack': timed out after 30s"
        );
    }

    #[test]
    fn test_refresh_failed_keeps_cause_chain() {
        let cause = Err::<(), _>(anyhow!("invalid_grant"))
            .context("Token refresh failed with status 400")
            .unwrap_err();
        let err = TokenError::refresh_failed("gmail", cause);

        match &err {
            TokenError::RefreshFailed { reason, .. } => {
                assert_eq!(reason, "Token refresh failed with status 400: invalid_grant");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let source = err.source().expect("cause attached");
        assert_eq!(source.to_string(), "Token refresh failed with status 400");
        assert_eq!(source.source().unwrap().to_string(), "invalid_grant");
    }

    #[test]
    fn test_clones_share_cause() {
        let err = TokenError::refresh_failed("gmail", anyhow!("invalid_grant"));
        assert_eq!(err.clone(), err);
        assert_ne!(err, TokenError::refresh_failed("gmail", anyhow!("invalid_grant")));
    }

    #[test]
    fn test_requires_reconnect() {
        assert!(TokenError::NoRefreshToken { provider_id: "gmail".into() }.requires_reconnect());
        assert!(TokenError::refresh_failed("gmail", anyhow!("invalid_grant")).requires_reconnect());
        assert!(!TokenError::not_found("u1", "gmail").requires_reconnect());
        assert!(!TokenError::ProviderUnavailable { provider_id: "gmail".into() }.requires_reconnect());
        assert!(!TokenError::InvalidRefreshResult { provider_id: "gmail".into() }.requires_reconnect());
    }
}
