//! Request authentication for axum services.
//!
//! An [`Authenticator`] resolves who is making a request, from an
//! `Authorization: Bearer` token or a signed session cookie, and binds the
//! host application's user record into the request extensions. Middleware
//! runs it in a silent or an enforcing posture; social login hands the
//! OAuth2 dance to configured providers.

pub mod auth;

pub use auth::{
    AuthConfig, AuthContext, AuthError, Authenticator, CurrentUser, Identifiable, MaybeUser,
    PrincipalKey, UserProvider, enforcing_auth_middleware, provider_fn, silent_auth_middleware,
};

use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber filtered by `RUST_LOG`.
///
/// Falls back to `authgate=info` when `RUST_LOG` is unset. Calling it again
/// after a subscriber is installed has no effect.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("authgate=info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
