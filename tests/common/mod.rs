use async_trait::async_trait;
use authgate::auth::{AuthConfig, BoxError, Identifiable, PrincipalKey, UserProvider};
use axum::body::{Body, to_bytes};
use axum::http::{Request, Response, header};
use mockall::mock;

#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub id: String,
}

impl Member {
    pub fn new(id: &str) -> Self {
        Self { id: id.to_string() }
    }
}

impl Identifiable for Member {
    fn primary_key(&self) -> Option<PrincipalKey> {
        Some(PrincipalKey::from(self.id.as_str()))
    }
}

mock! {
    pub Users {}

    #[async_trait]
    impl UserProvider for Users {
        type User = Member;

        async fn find_user(&self, key: &PrincipalKey) -> Result<Member, BoxError>;
    }
}

/// Users whose id starts with `u-` exist
pub fn known_users() -> MockUsers {
    let mut users = MockUsers::new();
    users.expect_find_user().returning(|key| match key.as_str() {
        Some(id) if id.starts_with("u-") => Ok(Member::new(id)),
        _ => Err(BoxError::from(format!("no user {}", key))),
    });
    users
}

pub fn test_config() -> AuthConfig {
    AuthConfig {
        cookie_key: "test-cookie-key-0123456789abcdef".to_string(),
        jwt_signing_key: "test-jwt-key-0123456789abcdef012".to_string(),
        ..Default::default()
    }
}

pub fn get(uri: &str, headers: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post(uri: &str, headers: &[(&str, &str)]) -> Request<Body> {
    let mut req = get(uri, headers);
    *req.method_mut() = axum::http::Method::POST;
    req
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// `name=value` part of the response's Set-Cookie header
pub fn cookie_pair(response: &Response<Body>) -> String {
    response.headers()[header::SET_COOKIE]
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string()
}
