/// Authentication Middleware
///
/// Axum middleware running credential resolution and identity binding for a
/// request, in a silent (best-effort) and an enforcing (redirect on failure)
/// posture, plus extractors for handlers downstream of them.
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::debug;

use super::authenticator::Authenticator;
use super::binder::{UserProvider, retrieve};
use super::error::AuthError;
use super::identity::PrincipalKey;
use super::redirect::{RedirectKind, redirect_response};

/// Resolve the caller if possible; always continue to the inner handler
pub async fn silent_auth_middleware<P: UserProvider>(
    State(auth): State<Arc<Authenticator<P>>>,
    mut req: Request,
    next: Next,
) -> Response {
    if let Err(e) = auth.authenticate_request(&mut req).await {
        // Continue anonymously
        debug!("Silent authentication did not bind an identity: {}", e);
    }

    next.run(req).await
}

/// Resolve the caller or redirect to the configured login target
pub async fn enforcing_auth_middleware<P: UserProvider>(
    State(auth): State<Arc<Authenticator<P>>>,
    mut req: Request,
    next: Next,
) -> Response {
    match auth.authenticate_request(&mut req).await {
        Ok(_) => next.run(req).await,
        Err(e) => {
            debug!(
                "Authentication required, redirecting to {}: {}",
                auth.config().redirect_to,
                e
            );
            redirect_response(
                req.headers(),
                &auth.config().redirect_to,
                RedirectKind::SeeOther,
            )
        }
    }
}

/// Error response for authentication failures
#[derive(Debug)]
pub struct AuthErrorResponse {
    pub error: AuthError,
}

impl IntoResponse for AuthErrorResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.error.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = serde_json::json!({
            "error": self.error.to_string(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<AuthError> for AuthErrorResponse {
    fn from(error: AuthError) -> Self {
        Self { error }
    }
}

/// Extractor for the user bound by the middleware; rejects when none is bound
#[derive(Debug)]
pub struct CurrentUser<U> {
    pub principal: PrincipalKey,
    pub user: Arc<U>,
}

impl<S, U> FromRequestParts<S> for CurrentUser<U>
where
    S: Send + Sync,
    U: Send + Sync + 'static,
{
    type Rejection = AuthErrorResponse;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let context = retrieve::<U>(&parts.extensions)?;
        Ok(CurrentUser {
            principal: context.principal,
            user: context.user,
        })
    }
}

/// Extractor for routes behind silent middleware: `None` when anonymous
#[derive(Debug)]
pub struct MaybeUser<U>(pub Option<Arc<U>>);

impl<S, U> FromRequestParts<S> for MaybeUser<U>
where
    S: Send + Sync,
    U: Send + Sync + 'static,
{
    type Rejection = AuthErrorResponse;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match retrieve::<U>(&parts.extensions) {
            Ok(context) => Ok(MaybeUser(Some(context.user))),
            Err(AuthError::ContextIdentityAbsent) => Ok(MaybeUser(None)),
            Err(e) => Err(e.into()),
        }
    }
}
