// Session Management
// Cookie-addressed server-side sessions with HMAC-signed session references

use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::{IntoResponseParts, ResponseParts};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::config::AuthConfig;
use super::error::AuthError;
use super::identity::PrincipalKey;

/// Session entry holding the authenticated principal
pub const PRINCIPAL_SESSION_KEY: &str = "user_id";

/// Seconds between expired-record sweeps triggered by `save`
const PURGE_INTERVAL_SECS: i64 = 300;

/// Signs and verifies session references carried in cookies
#[derive(Clone)]
pub struct CookieSigner {
    mac: Hmac<Sha256>,
}

impl CookieSigner {
    pub fn new(key: impl AsRef<[u8]>) -> Result<Self, AuthError> {
        let mac = Hmac::<Sha256>::new_from_slice(key.as_ref()).map_err(|e| {
            AuthError::InvalidConfig {
                key: "cookie_key".to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self { mac })
    }

    fn signature(&self, value: &str) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(value.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }

    /// Produce `<value>.<signature>`
    pub fn sign(&self, value: &str) -> String {
        format!("{}.{}", value, URL_SAFE_NO_PAD.encode(self.signature(value)))
    }

    /// Return the inner value if the signature matches
    pub fn verify<'a>(&self, signed: &'a str) -> Option<&'a str> {
        let (value, signature) = signed.rsplit_once('.')?;
        let provided = URL_SAFE_NO_PAD.decode(signature).ok()?;
        let expected = self.signature(value);
        if provided.len() != expected.len() {
            return None;
        }
        if bool::from(provided.ct_eq(&expected)) {
            Some(value)
        } else {
            None
        }
    }
}

impl std::fmt::Debug for CookieSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieSigner").finish_non_exhaustive()
    }
}

/// Per-request view of a session
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    values: HashMap<String, Value>,
    is_new: bool,
}

impl Session {
    fn fresh() -> Self {
        let random_bytes: [u8; 32] = rand::random();
        Self {
            id: URL_SAFE_NO_PAD.encode(random_bytes),
            values: HashMap::new(),
            is_new: true,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// True when no stored session matched the request cookie
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn principal(&self) -> Option<PrincipalKey> {
        self.values
            .get(PRINCIPAL_SESSION_KEY)
            .and_then(PrincipalKey::from_json)
    }

    pub fn set_principal(&mut self, key: &PrincipalKey) {
        self.values
            .insert(PRINCIPAL_SESSION_KEY.to_string(), key.to_json());
    }

    pub fn clear_principal(&mut self) -> Option<PrincipalKey> {
        self.values
            .remove(PRINCIPAL_SESSION_KEY)
            .as_ref()
            .and_then(PrincipalKey::from_json)
    }
}

/// `Set-Cookie` header produced by saving or destroying a session
#[derive(Debug, Clone)]
pub struct SessionCookie(HeaderValue);

impl SessionCookie {
    pub fn header_value(&self) -> &HeaderValue {
        &self.0
    }

    /// The `name=value` pair a client would send back in its `Cookie` header
    pub fn cookie_pair(&self) -> Option<&str> {
        self.0.to_str().ok()?.split(';').next().map(str::trim)
    }

    pub fn apply(self, headers: &mut HeaderMap) {
        headers.append(header::SET_COOKIE, self.0);
    }
}

impl IntoResponseParts for SessionCookie {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        res.headers_mut().append(header::SET_COOKIE, self.0);
        Ok(res)
    }
}

#[derive(Debug, Clone)]
struct SessionRecord {
    values: HashMap<String, Value>,
    expires_at: DateTime<Utc>,
}

/// In-memory session store addressed by signed cookies.
///
/// Cloning is cheap and every clone shares the same records, so one instance
/// can be handed to both the authenticator and the social login bridge.
#[derive(Debug, Clone)]
pub struct SessionStore {
    records: Arc<RwLock<HashMap<String, SessionRecord>>>,
    signer: CookieSigner,
    cookie_name: String,
    max_age: Duration,
    secure: bool,
    /// Unix time after which the next `save` sweeps expired records
    next_purge: Arc<AtomicI64>,
}

impl SessionStore {
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        let max_age = i64::try_from(config.session_max_age)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| AuthError::InvalidConfig {
                key: "session_max_age".to_string(),
                reason: "out of range".to_string(),
            })?;

        Ok(Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            signer: CookieSigner::new(&config.cookie_key)?,
            cookie_name: config.session_cookie_name.clone(),
            max_age,
            secure: config.secure_cookies(),
            next_purge: Arc::new(AtomicI64::new(Utc::now().timestamp() + PURGE_INTERVAL_SECS)),
        })
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Load the session referenced by the request cookie.
    ///
    /// A missing cookie, an unknown reference or an expired record all yield a
    /// fresh empty session. A cookie whose signature does not verify is an error.
    pub async fn load(&self, headers: &HeaderMap) -> Result<Session, AuthError> {
        let Some(raw) = read_cookie(headers, &self.cookie_name) else {
            return Ok(Session::fresh());
        };

        let id = self.signer.verify(&raw).ok_or_else(|| {
            warn!("Rejected session cookie with invalid signature");
            AuthError::InvalidSessionCookie
        })?;

        let records = self.records.read().await;
        match records.get(id) {
            Some(record) if record.expires_at > Utc::now() => Ok(Session {
                id: id.to_string(),
                values: record.values.clone(),
                is_new: false,
            }),
            Some(_) => {
                debug!("Session expired, starting a new one");
                Ok(Session::fresh())
            }
            None => {
                debug!("Session reference not found, starting a new one");
                Ok(Session::fresh())
            }
        }
    }

    /// Like [`SessionStore::load`], replacing an unreadable cookie with a fresh session
    pub async fn load_or_fresh(&self, headers: &HeaderMap) -> Session {
        match self.load(headers).await {
            Ok(session) => session,
            Err(e) => {
                debug!("Discarding unreadable session cookie: {}", e);
                Session::fresh()
            }
        }
    }

    /// Persist the session and produce the cookie that addresses it
    pub async fn save(&self, session: Session) -> Result<SessionCookie, AuthError> {
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(self.max_age)
            .ok_or_else(|| AuthError::InvalidConfig {
                key: "session_max_age".to_string(),
                reason: "session expiry is out of range".to_string(),
            })?;
        let cookie = self.set_cookie(&self.signer.sign(&session.id), self.max_age.num_seconds())?;

        let mut records = self.records.write().await;
        if now.timestamp() >= self.next_purge.load(Ordering::Relaxed) {
            self.next_purge
                .store(now.timestamp() + PURGE_INTERVAL_SECS, Ordering::Relaxed);
            let before = records.len();
            records.retain(|_, record| record.expires_at > now);
            if records.len() < before {
                debug!("Purged {} expired sessions", before - records.len());
            }
        }
        records.insert(
            session.id,
            SessionRecord {
                values: session.values,
                expires_at,
            },
        );

        Ok(cookie)
    }

    /// Delete the session record and expire the cookie
    pub async fn destroy(&self, session: Session) -> Result<SessionCookie, AuthError> {
        self.records.write().await.remove(&session.id);
        self.expired_cookie()
    }

    /// Cookie that makes the client drop its session reference
    pub fn expired_cookie(&self) -> Result<SessionCookie, AuthError> {
        self.set_cookie("", 0)
    }

    /// Number of stored records, expired ones included until purged
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }

    fn set_cookie(&self, value: &str, max_age: i64) -> Result<SessionCookie, AuthError> {
        let cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}{}",
            self.cookie_name,
            value,
            max_age,
            if self.secure { "; Secure" } else { "" }
        );
        HeaderValue::from_str(&cookie)
            .map(SessionCookie)
            .map_err(|e| AuthError::Internal(format!("Invalid session cookie header: {}", e)))
    }

    /// Drop expired records, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut records = self.records.write().await;

        let initial_count = records.len();
        records.retain(|_, record| record.expires_at > now);
        let removed = initial_count - records.len();

        if removed > 0 {
            debug!("Purged {} expired sessions", removed);
        }

        removed
    }
}

/// Find a cookie by name across all `Cookie` headers
fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .find_map(|cookie| {
            let (cookie_name, value) = cookie.trim().split_once('=')?;
            (cookie_name == name && !value.is_empty()).then(|| value.to_string())
        })
}
