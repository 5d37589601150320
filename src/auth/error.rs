// Authentication Error Types
// Error taxonomy for credential resolution, token handling, sessions and social login

use thiserror::Error;

/// Why a bearer token was refused before its expiry was even considered
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenRejection {
    #[error("malformed token encoding")]
    Malformed,

    #[error("signature mismatch")]
    SignatureMismatch,

    #[error("missing or invalid claim: {0}")]
    InvalidClaims(String),

    #[error("unsupported signing algorithm")]
    UnsupportedAlgorithm,
}

#[derive(Debug, Error)]
pub enum AuthError {
    // Identity errors
    #[error("Primary key not found on user record")]
    PrimaryKeyNotFound,

    // Credential errors
    #[error("Invalid authorization header format")]
    MalformedCredential,

    #[error("Invalid token: {0}")]
    InvalidToken(#[source] TokenRejection),

    #[error("Token expired")]
    ExpiredToken,

    #[error("User not authenticated")]
    Unauthenticated,

    #[error("Failed to sign token: {0}")]
    TokenIssuance(String),

    // Session errors
    #[error("Invalid session cookie")]
    InvalidSessionCookie,

    // Binding errors
    #[error("User lookup failed: {0}")]
    IdentityLookupFailed(#[source] BoxError),

    #[error("No identity bound to request context")]
    ContextIdentityAbsent,

    #[error("Identity bound to request context has type {found}, expected {expected}")]
    ContextIdentityTypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    // Configuration errors
    #[error("Invalid configuration value for {key}: {reason}")]
    InvalidConfig { key: String, reason: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Social login errors
    #[error("Unsupported OAuth2 provider: {0}")]
    UnsupportedProvider(String),

    #[error("Invalid OAuth2 state parameter")]
    InvalidOAuthState,

    #[error("OAuth2 callback error: {0}")]
    OAuthCallback(String),

    #[error("OAuth2 provider error: {0}")]
    OAuthProvider(String),

    // Network/HTTP errors
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),

    #[error("Internal authentication error: {0}")]
    Internal(String),
}

/// Error type returned by user lookups and other host-supplied callbacks
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        AuthError::HttpError(err.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        AuthError::JsonError(err.to_string())
    }
}

impl AuthError {
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::PrimaryKeyNotFound
            | AuthError::MalformedCredential
            | AuthError::InvalidToken(_)
            | AuthError::ExpiredToken
            | AuthError::Unauthenticated
            | AuthError::InvalidSessionCookie
            | AuthError::IdentityLookupFailed(_)
            | AuthError::ContextIdentityAbsent => 401,

            AuthError::ContextIdentityTypeMismatch { .. }
            | AuthError::TokenIssuance(_)
            | AuthError::InvalidConfig { .. }
            | AuthError::ConfigError(_)
            | AuthError::Internal(_) => 500,

            AuthError::OAuthProvider(_) | AuthError::HttpError(_) => 502,

            _ => 400,
        }
    }

    /// Failures that the middleware collapses into "not authenticated"
    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            AuthError::MalformedCredential
                | AuthError::InvalidToken(_)
                | AuthError::ExpiredToken
                | AuthError::Unauthenticated
                | AuthError::InvalidSessionCookie
                | AuthError::IdentityLookupFailed(_)
        )
    }
}
