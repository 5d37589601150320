/// Bearer Token Codec
///
/// Issues and validates HS256 JWTs carrying a principal key and an expiry.
/// Expiry is checked here against an explicit clock rather than inside the
/// JWT library so callers and tests control "now".
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{AuthError, TokenRejection};
use super::identity::PrincipalKey;

/// Claims carried by every issued token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Principal the token was issued for
    pub user_id: PrincipalKey,

    /// Expiration time (Unix seconds)
    pub exp: i64,

    /// Issued at (Unix seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiration: Duration,
}

impl TokenCodec {
    pub fn new(signing_key: &[u8], expiration: std::time::Duration) -> Result<Self, AuthError> {
        let expiration = Duration::from_std(expiration).map_err(|e| AuthError::InvalidConfig {
            key: "jwt_expiration".to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(signing_key),
            decoding_key: DecodingKey::from_secret(signing_key),
            expiration,
        })
    }

    pub fn expiration(&self) -> Duration {
        self.expiration
    }

    /// Issue a token for `key` expiring one configured lifetime from now
    pub fn issue(&self, key: &PrincipalKey) -> Result<String, AuthError> {
        self.issue_at(key, Utc::now())
    }

    pub fn issue_at(&self, key: &PrincipalKey, now: DateTime<Utc>) -> Result<String, AuthError> {
        let exp = now.checked_add_signed(self.expiration).ok_or_else(|| {
            AuthError::TokenIssuance("token expiry is out of range".to_string())
        })?;
        let claims = TokenClaims {
            user_id: key.clone(),
            exp: exp.timestamp(),
            iat: Some(now.timestamp()),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::TokenIssuance(e.to_string()))
    }

    /// Verify signature and expiry, returning the principal the token names
    pub fn parse_and_validate(&self, token: &str) -> Result<PrincipalKey, AuthError> {
        self.validate_at(token, Utc::now())
    }

    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<PrincipalKey, AuthError> {
        let claims = self.decode_claims(token)?;

        if now.timestamp() > claims.exp {
            debug!("Rejected expired bearer token");
            return Err(AuthError::ExpiredToken);
        }

        Ok(claims.user_id)
    }

    /// Decode and verify the signature without checking expiry
    pub fn decode_claims(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp"]);

        decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                let rejection = match e.kind() {
                    ErrorKind::InvalidSignature => TokenRejection::SignatureMismatch,
                    ErrorKind::MissingRequiredClaim(claim) => {
                        TokenRejection::InvalidClaims(claim.clone())
                    }
                    ErrorKind::Json(err) => TokenRejection::InvalidClaims(err.to_string()),
                    ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                        TokenRejection::UnsupportedAlgorithm
                    }
                    _ => TokenRejection::Malformed,
                };
                debug!("Rejected bearer token: {}", rejection);
                AuthError::InvalidToken(rejection)
            })
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}
