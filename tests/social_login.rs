//! Social Login Integration Tests
//!
//! Wires a stand-in provider through `ProviderRegistry` and drives the
//! redirect → callback → session round trip over HTTP.

mod common;

use async_trait::async_trait;
use authgate::auth::{
    AuthError, AuthErrorResponse, Authenticator, BoxError, CallbackParams, CurrentUser,
    ExternalProfile, ProviderRegistry, SocialProvider, UserProvider, enforcing_auth_middleware,
};
use authgate::{AuthConfig, PrincipalKey};
use axum::Router;
use axum::extract::{Path, Query};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use common::{Member, body_text, cookie_pair, test_config};
use std::sync::Arc;
use tower::ServiceExt;

/// Provider that accepts any code and answers with a fixed profile
struct LoopbackProvider;

#[async_trait]
impl SocialProvider for LoopbackProvider {
    fn name(&self) -> &str {
        "loopback"
    }

    fn authorization_url(&self, state: &str) -> Result<String, AuthError> {
        Ok(format!("https://idp.test/authorize?state={}", state))
    }

    async fn exchange(&self, code: &str) -> Result<ExternalProfile, AuthError> {
        Ok(ExternalProfile {
            provider: "loopback".to_string(),
            provider_user_id: format!("u-{}", code),
            email: None,
            name: None,
            nickname: None,
            avatar_url: None,
            access_token: "access".to_string(),
            raw: serde_json::Value::Null,
        })
    }
}

/// Every principal is a member
struct Directory;

#[async_trait]
impl UserProvider for Directory {
    type User = Member;

    async fn find_user(&self, key: &PrincipalKey) -> Result<Member, BoxError> {
        Ok(Member::new(&key.to_string()))
    }
}

fn social_config() -> AuthConfig {
    let mut config = test_config();
    config.social_providers.insert(
        "loopback".to_string(),
        authgate::auth::SocialProviderDescriptor {
            key: "client".to_string(),
            secret: "secret".to_string(),
            callback_url: "http://localhost/auth/loopback/callback".to_string(),
            scopes: vec![],
        },
    );
    config
}

fn router() -> Router {
    let mut registry = ProviderRegistry::with_defaults();
    registry.register("loopback", |_name, _descriptor| {
        Ok(Arc::new(LoopbackProvider) as Arc<dyn SocialProvider>)
    });

    let auth = Arc::new(Authenticator::with_registry(social_config(), Directory, &registry).unwrap());

    let start = {
        let auth = auth.clone();
        move |Path(provider): Path<String>, headers: HeaderMap| {
            let auth = auth.clone();
            async move {
                let Some(active) = auth.social().and_then(|s| s.use_provider(&provider)) else {
                    return Ok(StatusCode::NOT_FOUND.into_response());
                };
                active.redirect(&headers).await.map_err(AuthErrorResponse::from)
            }
        }
    };

    let callback = {
        let auth = auth.clone();
        move |Path(provider): Path<String>,
              Query(params): Query<CallbackParams>,
              headers: HeaderMap| {
            let auth = auth.clone();
            async move {
                let Some(active) = auth.social().and_then(|s| s.use_provider(&provider)) else {
                    return Ok(StatusCode::NOT_FOUND.into_response());
                };
                let profile = active.callback(&headers, params).await?;
                let cookie = auth
                    .authenticate(&headers, &Member::new(&profile.provider_user_id))
                    .await?;
                Ok::<Response, AuthErrorResponse>((cookie, Redirect::to("/me")).into_response())
            }
        }
    };

    let me = Router::new()
        .route(
            "/me",
            get(|CurrentUser { user, .. }: CurrentUser<Member>| async move { user.id.clone() }),
        )
        .route_layer(from_fn_with_state(auth.clone(), enforcing_auth_middleware::<Directory>));

    Router::new()
        .route("/auth/{provider}", get(start))
        .route("/auth/{provider}/callback", get(callback))
        .merge(me)
}

fn location(response: &Response) -> String {
    response.headers()[header::LOCATION]
        .to_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_social_round_trip() {
    let app = router();

    let response = app
        .clone()
        .oneshot(common::get("/auth/loopback", &[]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let session = cookie_pair(&response);
    let target = url::Url::parse(&location(&response)).unwrap();
    let state = target
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap();

    let callback = format!("/auth/loopback/callback?code=42&state={}", state);
    let response = app
        .clone()
        .oneshot(common::get(&callback, &[("cookie", session.as_str())]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/me");
    assert_eq!(cookie_pair(&response), session);

    let response = app
        .clone()
        .oneshot(common::get("/me", &[("cookie", session.as_str())]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "u-42");

    // The state was consumed by the first callback
    let response = app
        .oneshot(common::get(&callback, &[("cookie", session.as_str())]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_callback_without_redirect_is_rejected() {
    let response = router()
        .oneshot(common::get("/auth/loopback/callback?code=42&state=guess", &[]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_provider_error_is_surfaced() {
    let response = router()
        .oneshot(common::get(
            "/auth/loopback/callback?error=access_denied&error_description=nope",
            &[],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_unconfigured_provider_is_unavailable() {
    let response = router()
        .oneshot(common::get("/auth/google", &[]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_async_client_redirect_to_provider() {
    let response = router()
        .oneshot(common::get("/auth/loopback", &[("hx-request", "true")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(
        response.headers()["hx-redirect"]
            .to_str()
            .unwrap()
            .starts_with("https://idp.test/authorize?state=")
    );
}
