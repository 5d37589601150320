// Authentication Module
// Resolves a request's identity from a bearer token or a signed session
// cookie, binds the user record into the request, and bridges social login

pub mod authenticator;
pub mod binder;
pub mod config;
pub mod error;
pub mod identity;
pub mod middleware;
pub mod redirect;
pub mod resolver;
pub mod session;
pub mod social;
pub mod token;

pub use authenticator::Authenticator;
pub use binder::{
    AuthContext, BoundIdentity, FnUserProvider, IdentityBinder, UserProvider, provider_fn,
    retrieve, retrieve_user,
};
pub use config::{AuthConfig, Environment, SocialProviderDescriptor};
pub use error::{AuthError, BoxError, TokenRejection};
pub use identity::{Identifiable, PrincipalKey, extract_primary_key};
pub use middleware::{
    AuthErrorResponse, CurrentUser, MaybeUser, enforcing_auth_middleware, silent_auth_middleware,
};
pub use redirect::{HX_REDIRECT, HX_REQUEST, RedirectKind, redirect_response};
pub use resolver::{Credential, CredentialResolver, CredentialSource};
pub use session::{CookieSigner, Session, SessionCookie, SessionStore};
pub use social::{
    ActiveProvider, CallbackParams, ExternalProfile, OAuth2Provider, ProviderRegistry,
    SocialAuth, SocialProvider,
};
pub use token::{TokenClaims, TokenCodec};
