/// Credential Resolution
///
/// Chooses between the bearer-token path and the session-cookie path for a
/// request and resolves the principal key it carries. A present
/// `Authorization` header always wins; the two mechanisms are never combined.
use axum::http::{HeaderMap, header};
use tracing::debug;

use super::error::AuthError;
use super::identity::PrincipalKey;
use super::session::SessionStore;
use super::token::TokenCodec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Bearer,
    Session,
}

/// Principal resolved from a request, with the mechanism that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub principal: PrincipalKey,
    pub source: CredentialSource,
}

#[derive(Debug, Clone)]
pub struct CredentialResolver {
    tokens: TokenCodec,
    sessions: SessionStore,
}

impl CredentialResolver {
    pub fn new(tokens: TokenCodec, sessions: SessionStore) -> Self {
        Self { tokens, sessions }
    }

    pub async fn resolve(&self, headers: &HeaderMap) -> Result<Credential, AuthError> {
        match headers.get(header::AUTHORIZATION) {
            Some(value) if !value.is_empty() => {
                let value = value.to_str().map_err(|_| AuthError::MalformedCredential)?;
                let token = parse_bearer(value)?;
                let principal = self.tokens.parse_and_validate(token)?;
                debug!(source = "bearer", "Resolved request principal");
                Ok(Credential {
                    principal,
                    source: CredentialSource::Bearer,
                })
            }
            _ => self.resolve_session(headers).await,
        }
    }

    async fn resolve_session(&self, headers: &HeaderMap) -> Result<Credential, AuthError> {
        let session = self.sessions.load(headers).await.map_err(|e| {
            debug!("Session unreadable, treating request as unauthenticated: {}", e);
            AuthError::Unauthenticated
        })?;

        let principal = session.principal().ok_or(AuthError::Unauthenticated)?;
        debug!(source = "session", "Resolved request principal");

        Ok(Credential {
            principal,
            source: CredentialSource::Session,
        })
    }
}

/// Extract the token from an `Authorization` value of exactly `Bearer <token>`
pub fn parse_bearer(value: &str) -> Result<&str, AuthError> {
    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => Ok(token),
        _ => Err(AuthError::MalformedCredential),
    }
}
