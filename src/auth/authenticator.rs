/// Authenticator
///
/// Central entry point owning the session store, token codec, resolver,
/// identity binder and (optionally) the social login bridge. Built once at
/// startup and shared behind an `Arc`.
use axum::extract::Request;
use axum::http::HeaderMap;
use tracing::info;

use super::binder::{AuthContext, IdentityBinder, UserProvider};
use super::config::AuthConfig;
use super::error::AuthError;
use super::identity::{Identifiable, extract_primary_key};
use super::resolver::{Credential, CredentialResolver};
use super::session::{SessionCookie, SessionStore};
use super::social::{ProviderRegistry, SocialAuth};
use super::token::TokenCodec;

pub struct Authenticator<P: UserProvider> {
    config: AuthConfig,
    sessions: SessionStore,
    tokens: TokenCodec,
    resolver: CredentialResolver,
    binder: IdentityBinder<P>,
    social: Option<SocialAuth>,
}

impl<P: UserProvider> Authenticator<P> {
    /// Build an authenticator with the built-in social providers
    pub fn new(config: AuthConfig, provider: P) -> Result<Self, AuthError> {
        Self::with_registry(config, provider, &ProviderRegistry::with_defaults())
    }

    /// Build an authenticator resolving social providers through `registry`
    pub fn with_registry(
        config: AuthConfig,
        provider: P,
        registry: &ProviderRegistry,
    ) -> Result<Self, AuthError> {
        config.validate()?;

        let sessions = SessionStore::new(&config)?;
        let tokens = TokenCodec::new(config.jwt_signing_key.as_bytes(), config.jwt_duration())?;
        let resolver = CredentialResolver::new(tokens.clone(), sessions.clone());

        let social = if config.social_providers.is_empty() {
            None
        } else {
            let providers = registry.build(&config.social_providers)?;
            Some(SocialAuth::new(sessions.clone(), providers))
        };

        info!(
            environment = ?config.environment,
            social_providers = social.as_ref().map_or(0, |s| s.provider_names().len()),
            "Authenticator initialized"
        );

        Ok(Self {
            config,
            sessions,
            tokens,
            resolver,
            binder: IdentityBinder::new(provider),
            social,
        })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn tokens(&self) -> &TokenCodec {
        &self.tokens
    }

    pub fn social(&self) -> Option<&SocialAuth> {
        self.social.as_ref()
    }

    /// Record `user` as the session principal; attach the returned cookie to the response
    pub async fn authenticate<R: Identifiable + ?Sized>(
        &self,
        headers: &HeaderMap,
        user: &R,
    ) -> Result<SessionCookie, AuthError> {
        let principal = extract_primary_key(user)?;

        let mut session = self.sessions.load_or_fresh(headers).await;
        session.set_principal(&principal);
        let cookie = self.sessions.save(session).await?;

        info!(principal = %principal, "User authenticated");
        Ok(cookie)
    }

    /// Remove the session principal, keeping the session itself.
    ///
    /// Without a stored session there is nothing to keep; the client is told
    /// to drop its cookie and nothing is persisted.
    pub async fn sign_out(&self, headers: &HeaderMap) -> Result<SessionCookie, AuthError> {
        let mut session = self.sessions.load(headers).await?;
        if session.is_new() {
            return self.sessions.expired_cookie();
        }

        let previous = session.clear_principal();
        let cookie = self.sessions.save(session).await?;

        if let Some(principal) = previous {
            info!(principal = %principal, "User signed out");
        }
        Ok(cookie)
    }

    /// Issue a bearer token for `user`
    pub fn issue_token<R: Identifiable + ?Sized>(&self, user: &R) -> Result<String, AuthError> {
        let principal = extract_primary_key(user)?;
        self.tokens.issue(&principal)
    }

    pub async fn resolve(&self, headers: &HeaderMap) -> Result<Credential, AuthError> {
        self.resolver.resolve(headers).await
    }

    /// Resolve the request's credential and bind the matching user into its extensions
    pub async fn authenticate_request(
        &self,
        req: &mut Request,
    ) -> Result<AuthContext<P::User>, AuthError> {
        let credential = self.resolver.resolve(req.headers()).await?;
        self.binder
            .bind(req.extensions_mut(), credential.principal)
            .await
    }
}
