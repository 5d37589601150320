/// Social Login Bridge
///
/// Delegates redirect-to-provider and callback-to-profile to OAuth2
/// integrations looked up by name in a registry. The bridge keeps the pending
/// authorization state in the shared session store and never touches the
/// session principal or issues tokens itself.
use async_trait::async_trait;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl, Scope,
    TokenResponse, TokenUrl, basic::BasicClient,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

use super::config::SocialProviderDescriptor;
use super::error::AuthError;
use super::redirect::{RedirectKind, redirect_response};
use super::session::SessionStore;

/// Session entry holding the state of an in-flight authorization
const OAUTH_STATE_KEY: &str = "oauth_state";

/// Profile returned by a provider after a completed authorization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalProfile {
    pub provider: String,
    pub provider_user_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub nickname: Option<String>,
    pub avatar_url: Option<String>,
    pub access_token: String,
    pub raw: serde_json::Value,
}

/// Provider-side half of an OAuth2 authorization-code exchange
#[async_trait]
pub trait SocialProvider: Send + Sync {
    fn name(&self) -> &str;

    /// URL the user agent is sent to, carrying `state`
    fn authorization_url(&self, state: &str) -> Result<String, AuthError>;

    /// Exchange the callback code and fetch the user's profile
    async fn exchange(&self, code: &str) -> Result<ExternalProfile, AuthError>;
}

pub type ProviderFactory = Arc<
    dyn Fn(&str, &SocialProviderDescriptor) -> Result<Arc<dyn SocialProvider>, AuthError>
        + Send
        + Sync,
>;

/// Provider name → constructor, populated at startup
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    factories: HashMap<String, ProviderFactory>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry knowing the `github`, `google` and `facebook` integrations
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for endpoints in [&GITHUB, &GOOGLE, &FACEBOOK] {
            registry.register(endpoints.name, move |name, descriptor| {
                let provider = OAuth2Provider::new(name, endpoints, descriptor)?;
                Ok(Arc::new(provider) as Arc<dyn SocialProvider>)
            });
        }
        registry
    }

    pub fn register<F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        F: Fn(&str, &SocialProviderDescriptor) -> Result<Arc<dyn SocialProvider>, AuthError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(name.to_string(), Arc::new(factory));
        self
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Instantiate every configured provider the registry knows; others are skipped
    pub fn build(
        &self,
        descriptors: &HashMap<String, SocialProviderDescriptor>,
    ) -> Result<HashMap<String, Arc<dyn SocialProvider>>, AuthError> {
        let mut providers = HashMap::new();
        for (name, descriptor) in descriptors {
            match self.factories.get(name) {
                Some(factory) => {
                    providers.insert(name.clone(), factory(name, descriptor)?);
                }
                None => debug!("Ignoring unrecognized social provider: {}", name),
            }
        }
        Ok(providers)
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("ProviderRegistry")
            .field("providers", &names)
            .finish()
    }
}

/// OAuth2 callback query parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PendingAuthorization {
    provider: String,
    state: String,
}

/// Configured social providers sharing the application's session store
#[derive(Clone)]
pub struct SocialAuth {
    store: SessionStore,
    providers: Arc<HashMap<String, Arc<dyn SocialProvider>>>,
}

impl SocialAuth {
    pub fn new(store: SessionStore, providers: HashMap<String, Arc<dyn SocialProvider>>) -> Self {
        Self {
            store,
            providers: Arc::new(providers),
        }
    }

    /// Select `name` as the active provider for one exchange
    pub fn use_provider(&self, name: &str) -> Option<ActiveProvider> {
        self.providers.get(name).map(|provider| ActiveProvider {
            provider: Arc::clone(provider),
            store: self.store.clone(),
        })
    }

    pub fn provider_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

pub struct ActiveProvider {
    provider: Arc<dyn SocialProvider>,
    store: SessionStore,
}

impl ActiveProvider {
    pub fn name(&self) -> &str {
        self.provider.name()
    }

    /// Start the authorization: remember a fresh state and send the client to the provider
    pub async fn redirect(&self, headers: &HeaderMap) -> Result<Response, AuthError> {
        let random_bytes: [u8; 32] = rand::random();
        let state = URL_SAFE_NO_PAD.encode(random_bytes);
        let url = self.provider.authorization_url(&state)?;

        let mut session = self.store.load_or_fresh(headers).await;
        session.insert(
            OAUTH_STATE_KEY,
            serde_json::to_value(PendingAuthorization {
                provider: self.name().to_string(),
                state,
            })?,
        );
        let cookie = self.store.save(session).await?;

        debug!(provider = self.name(), "Redirecting to social provider");
        Ok((cookie, redirect_response(headers, &url, RedirectKind::Temporary)).into_response())
    }

    /// Finish the authorization started by [`ActiveProvider::redirect`].
    ///
    /// The pending state is consumed whether or not it matches.
    pub async fn callback(
        &self,
        headers: &HeaderMap,
        params: CallbackParams,
    ) -> Result<ExternalProfile, AuthError> {
        if let Some(error) = params.error {
            let description = params
                .error_description
                .unwrap_or_else(|| "Unknown error".to_string());
            warn!(provider = self.name(), "Provider refused authorization: {}", error);
            return Err(AuthError::OAuthProvider(format!("{}: {}", error, description)));
        }

        let code = params
            .code
            .ok_or_else(|| AuthError::OAuthCallback("authorization code missing".to_string()))?;
        let state = params
            .state
            .ok_or_else(|| AuthError::OAuthCallback("state parameter missing".to_string()))?;

        let mut session = self
            .store
            .load(headers)
            .await
            .map_err(|_| AuthError::InvalidOAuthState)?;
        let Some(stored) = session.remove(OAUTH_STATE_KEY) else {
            warn!(provider = self.name(), "Callback without a pending authorization");
            return Err(AuthError::InvalidOAuthState);
        };
        self.store.save(session).await?;

        let Ok(pending) = serde_json::from_value::<PendingAuthorization>(stored) else {
            warn!(provider = self.name(), "Discarding malformed pending authorization");
            return Err(AuthError::InvalidOAuthState);
        };

        let state_matches: bool = pending.state.as_bytes().ct_eq(state.as_bytes()).into();
        if pending.provider != self.name() || !state_matches {
            warn!(provider = self.name(), "OAuth2 state mismatch");
            return Err(AuthError::InvalidOAuthState);
        }

        let profile = self.provider.exchange(&code).await?;
        info!(
            provider = self.name(),
            provider_user_id = %profile.provider_user_id,
            "Social login completed"
        );
        Ok(profile)
    }
}

/// Where a provider's endpoints live and how to read its profile document
#[derive(Debug)]
pub struct ProviderEndpoints {
    pub name: &'static str,
    pub auth_url: &'static str,
    pub token_url: &'static str,
    pub userinfo_url: &'static str,
    pub default_scopes: &'static [&'static str],
    /// JSON pointers into the userinfo document
    pub id_pointer: &'static str,
    pub email_pointer: &'static str,
    pub name_pointer: &'static str,
    pub nickname_pointer: Option<&'static str>,
    pub avatar_pointer: &'static str,
}

pub static GITHUB: ProviderEndpoints = ProviderEndpoints {
    name: "github",
    auth_url: "https://github.com/login/oauth/authorize",
    token_url: "https://github.com/login/oauth/access_token",
    userinfo_url: "https://api.github.com/user",
    default_scopes: &["read:user", "user:email"],
    id_pointer: "/id",
    email_pointer: "/email",
    name_pointer: "/name",
    nickname_pointer: Some("/login"),
    avatar_pointer: "/avatar_url",
};

pub static GOOGLE: ProviderEndpoints = ProviderEndpoints {
    name: "google",
    auth_url: "https://accounts.google.com/o/oauth2/v2/auth",
    token_url: "https://oauth2.googleapis.com/token",
    userinfo_url: "https://openidconnect.googleapis.com/v1/userinfo",
    default_scopes: &["openid", "email", "profile"],
    id_pointer: "/sub",
    email_pointer: "/email",
    name_pointer: "/name",
    nickname_pointer: None,
    avatar_pointer: "/picture",
};

pub static FACEBOOK: ProviderEndpoints = ProviderEndpoints {
    name: "facebook",
    auth_url: "https://www.facebook.com/v19.0/dialog/oauth",
    token_url: "https://graph.facebook.com/v19.0/oauth/access_token",
    userinfo_url: "https://graph.facebook.com/me?fields=id,name,email,picture",
    default_scopes: &["email"],
    id_pointer: "/id",
    email_pointer: "/email",
    name_pointer: "/name",
    nickname_pointer: None,
    avatar_pointer: "/picture/data/url",
};

// Type alias for a fully configured OAuth client
type ConfiguredClient = oauth2::Client<
    oauth2::basic::BasicErrorResponse,
    oauth2::basic::BasicTokenResponse,
    oauth2::basic::BasicTokenIntrospectionResponse,
    oauth2::StandardRevocableToken,
    oauth2::basic::BasicRevocationErrorResponse,
    oauth2::EndpointSet,
    oauth2::EndpointNotSet,
    oauth2::EndpointNotSet,
    oauth2::EndpointNotSet,
    oauth2::EndpointSet,
>;

/// Authorization-code integration for providers described by [`ProviderEndpoints`]
pub struct OAuth2Provider {
    name: String,
    client: ConfiguredClient,
    scopes: Vec<String>,
    endpoints: &'static ProviderEndpoints,
    http_client: reqwest::Client,
}

impl OAuth2Provider {
    pub fn new(
        name: &str,
        endpoints: &'static ProviderEndpoints,
        descriptor: &SocialProviderDescriptor,
    ) -> Result<Self, AuthError> {
        let auth_url = AuthUrl::new(endpoints.auth_url.to_string())
            .map_err(|e| AuthError::ConfigError(format!("Invalid {} auth URL: {}", name, e)))?;
        let token_url = TokenUrl::new(endpoints.token_url.to_string())
            .map_err(|e| AuthError::ConfigError(format!("Invalid {} token URL: {}", name, e)))?;
        let redirect_url = RedirectUrl::new(descriptor.callback_url.clone())
            .map_err(|e| AuthError::ConfigError(format!("Invalid redirect URL: {}", e)))?;

        let client = BasicClient::new(ClientId::new(descriptor.key.clone()))
            .set_client_secret(ClientSecret::new(descriptor.secret.clone()))
            .set_auth_uri(auth_url)
            .set_token_uri(token_url)
            .set_redirect_uri(redirect_url);

        let scopes = if descriptor.scopes.is_empty() {
            endpoints
                .default_scopes
                .iter()
                .map(|s| s.to_string())
                .collect()
        } else {
            descriptor.scopes.clone()
        };

        // Token endpoints must not be followed through redirects
        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            name: name.to_string(),
            client,
            scopes,
            endpoints,
            http_client,
        })
    }

    fn profile_from(&self, raw: serde_json::Value, access_token: String) -> Result<ExternalProfile, AuthError> {
        let text = |pointer: &str| -> Option<String> {
            match raw.pointer(pointer)? {
                serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            }
        };

        let provider_user_id = text(self.endpoints.id_pointer).ok_or_else(|| {
            AuthError::OAuthProvider(format!("{} profile has no user id", self.name))
        })?;

        Ok(ExternalProfile {
            provider: self.name.clone(),
            provider_user_id,
            email: text(self.endpoints.email_pointer),
            name: text(self.endpoints.name_pointer),
            nickname: self.endpoints.nickname_pointer.and_then(|p| text(p)),
            avatar_url: text(self.endpoints.avatar_pointer),
            access_token,
            raw,
        })
    }
}

#[async_trait]
impl SocialProvider for OAuth2Provider {
    fn name(&self) -> &str {
        &self.name
    }

    fn authorization_url(&self, state: &str) -> Result<String, AuthError> {
        let state = state.to_string();
        let (url, _csrf_state) = self
            .client
            .authorize_url(move || CsrfToken::new(state))
            .add_scopes(self.scopes.iter().cloned().map(Scope::new))
            .url();
        Ok(url.to_string())
    }

    async fn exchange(&self, code: &str) -> Result<ExternalProfile, AuthError> {
        debug!(provider = %self.name, "Exchanging authorization code");

        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| AuthError::OAuthProvider(format!("Token exchange failed: {}", e)))?;
        let access_token = token.access_token().secret().to_string();

        let response = self
            .http_client
            .get(self.endpoints.userinfo_url)
            .bearer_auth(&access_token)
            .header(reqwest::header::USER_AGENT, "authgate")
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::OAuthProvider(format!(
                "{} userinfo request returned {}",
                self.name,
                response.status()
            )));
        }

        let raw: serde_json::Value = response.json().await?;
        self.profile_from(raw, access_token)
    }
}
