// Authentication Configuration
// Signing keys, session cookie settings, token lifetime and social provider descriptors

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use chrono::{TimeDelta, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use super::error::AuthError;

/// Minimum length of the cookie and token signing keys, in bytes
pub const MIN_KEY_LENGTH: usize = 32;

/// Main authentication configuration.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Key used to sign session cookie values
    pub cookie_key: String,

    /// Session cookie name
    #[serde(default = "default_cookie_name")]
    pub session_cookie_name: String,

    /// Session lifetime in seconds (default: 30 days)
    #[serde(default = "default_session_max_age")]
    pub session_max_age: u64,

    /// Deployment environment, decides the cookie Secure flag
    #[serde(default)]
    pub environment: Environment,

    /// HMAC-SHA256 key for bearer tokens
    pub jwt_signing_key: String,

    /// Bearer token lifetime in seconds (default: 1 day)
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration: u64,

    /// Where enforcing middleware sends unauthenticated requests
    #[serde(default = "default_redirect_to")]
    pub redirect_to: String,

    /// Social login providers, keyed by provider name
    #[serde(default)]
    pub social_providers: HashMap<String, SocialProviderDescriptor>,
}

impl AuthConfig {
    /// Load configuration from defaults, an optional TOML file and
    /// `AUTHGATE_*` environment variables, in that order of precedence.
    pub fn load(path: Option<&Path>) -> Result<Self, AuthError> {
        let mut figment = Figment::from(Serialized::defaults(AuthConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        let config: AuthConfig = figment
            .merge(Env::prefixed("AUTHGATE_").split("__"))
            .extract()
            .map_err(|e| AuthError::ConfigError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), AuthError> {
        validate_key("cookie_key", &self.cookie_key)?;
        validate_key("jwt_signing_key", &self.jwt_signing_key)?;

        if !is_cookie_token(&self.session_cookie_name) {
            return Err(AuthError::InvalidConfig {
                key: "session_cookie_name".to_string(),
                reason: "must be a non-empty cookie token (no whitespace, separators or control characters)".to_string(),
            });
        }

        validate_lifetime("session_max_age", self.session_max_age)?;
        validate_lifetime("jwt_expiration", self.jwt_expiration)?;

        if self.redirect_to.is_empty() {
            return Err(AuthError::InvalidConfig {
                key: "redirect_to".to_string(),
                reason: "cannot be empty".to_string(),
            });
        }

        for (name, descriptor) in &self.social_providers {
            descriptor.validate(name)?;
        }

        Ok(())
    }

    pub fn session_duration(&self) -> Duration {
        Duration::from_secs(self.session_max_age)
    }

    pub fn jwt_duration(&self) -> Duration {
        Duration::from_secs(self.jwt_expiration)
    }

    /// Whether session cookies carry the Secure attribute
    pub fn secure_cookies(&self) -> bool {
        self.environment.is_production()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cookie_key: String::new(),      // Must be set explicitly
            jwt_signing_key: String::new(), // Must be set explicitly
            session_cookie_name: default_cookie_name(),
            session_max_age: default_session_max_age(),
            environment: Environment::default(),
            jwt_expiration: default_jwt_expiration(),
            redirect_to: default_redirect_to(),
            social_providers: HashMap::new(),
        }
    }
}

fn validate_key(name: &str, key: &str) -> Result<(), AuthError> {
    if key.len() < MIN_KEY_LENGTH {
        return Err(AuthError::InvalidConfig {
            key: name.to_string(),
            reason: format!("must be at least {} bytes", MIN_KEY_LENGTH),
        });
    }
    Ok(())
}

/// Lifetimes must be positive and keep `now + lifetime` representable
fn validate_lifetime(name: &str, secs: u64) -> Result<(), AuthError> {
    if secs == 0 {
        return Err(AuthError::InvalidConfig {
            key: name.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }

    let representable = i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
        .is_some();
    if !representable {
        return Err(AuthError::InvalidConfig {
            key: name.to_string(),
            reason: "is too large".to_string(),
        });
    }
    Ok(())
}

/// RFC 6265 cookie-name token: visible ASCII without separators
fn is_cookie_token(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b)
        })
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

/// Social login provider settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SocialProviderDescriptor {
    /// OAuth2 client ID
    pub key: String,

    /// OAuth2 client secret
    pub secret: String,

    /// OAuth2 redirect URI registered with the provider
    pub callback_url: String,

    /// Requested scopes; provider defaults apply when empty
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl SocialProviderDescriptor {
    fn validate(&self, provider_name: &str) -> Result<(), AuthError> {
        if self.key.is_empty() {
            return Err(AuthError::InvalidConfig {
                key: format!("social_providers.{}.key", provider_name),
                reason: "cannot be empty".to_string(),
            });
        }

        if self.secret.is_empty() {
            return Err(AuthError::InvalidConfig {
                key: format!("social_providers.{}.secret", provider_name),
                reason: "cannot be empty".to_string(),
            });
        }

        let callback_ok = url::Url::parse(&self.callback_url)
            .is_ok_and(|url| matches!(url.scheme(), "http" | "https"));
        if !callback_ok {
            return Err(AuthError::InvalidConfig {
                key: format!("social_providers.{}.callback_url", provider_name),
                reason: "must be an absolute http:// or https:// URL".to_string(),
            });
        }

        Ok(())
    }
}

// Default value functions
fn default_cookie_name() -> String {
    "authgate_session".to_string()
}

fn default_session_max_age() -> u64 {
    86400 * 30 // 30 days
}

fn default_jwt_expiration() -> u64 {
    86400 // 1 day
}

fn default_redirect_to() -> String {
    "/auth/login".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AuthConfig {
        AuthConfig {
            cookie_key: "c".repeat(32),
            jwt_signing_key: "j".repeat(32),
            ..Default::default()
        }
    }

    fn descriptor() -> SocialProviderDescriptor {
        SocialProviderDescriptor {
            key: "client-id".to_string(),
            secret: "client-secret".to_string(),
            callback_url: "https://example.com/auth/github/callback".to_string(),
            scopes: vec!["user:email".to_string()],
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_keys_too_short() {
        let config = AuthConfig {
            jwt_signing_key: "short".to_string(),
            ..valid_config()
        };
        assert!(matches!(
            config.validate(),
            Err(AuthError::InvalidConfig { ref key, .. }) if key == "jwt_signing_key"
        ));

        let config = AuthConfig {
            cookie_key: String::new(),
            ..valid_config()
        };
        assert!(matches!(
            config.validate(),
            Err(AuthError::InvalidConfig { ref key, .. }) if key == "cookie_key"
        ));
    }

    #[test]
    fn test_durations_must_be_positive() {
        let mut config = valid_config();
        config.session_max_age = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.jwt_expiration = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_secure_flag_follows_environment() {
        let mut config = valid_config();
        assert!(!config.secure_cookies());

        config.environment = Environment::Production;
        assert!(config.secure_cookies());
    }

    #[test]
    fn test_provider_validation() {
        let mut config = valid_config();
        config
            .social_providers
            .insert("github".to_string(), descriptor());
        assert!(config.validate().is_ok());

        config.social_providers.insert(
            "google".to_string(),
            SocialProviderDescriptor {
                callback_url: "example.com/callback".to_string(),
                ..descriptor()
            },
        );
        assert!(matches!(
            config.validate(),
            Err(AuthError::InvalidConfig { ref key, .. })
                if key == "social_providers.google.callback_url"
        ));
    }

    #[test]
    fn test_unrepresentable_lifetimes_are_rejected() {
        let mut config = valid_config();
        config.jwt_expiration = 10_000_000_000_000;
        assert!(matches!(
            config.validate(),
            Err(AuthError::InvalidConfig { ref key, .. }) if key == "jwt_expiration"
        ));

        let mut config = valid_config();
        config.session_max_age = 10_000_000_000_000;
        assert!(matches!(
            config.validate(),
            Err(AuthError::InvalidConfig { ref key, .. }) if key == "session_max_age"
        ));

        let mut config = valid_config();
        config.session_max_age = u64::MAX;
        assert!(config.validate().is_err());

        // A century is fine
        let mut config = valid_config();
        config.jwt_expiration = 100 * 365 * 86400;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cookie_name_must_be_a_token() {
        for name in ["", "auth session", "a=b", "a;b", "sess\tion", "caf\u{e9}"] {
            let config = AuthConfig {
                session_cookie_name: name.to_string(),
                ..valid_config()
            };
            assert!(
                matches!(
                    config.validate(),
                    Err(AuthError::InvalidConfig { ref key, .. }) if key == "session_cookie_name"
                ),
                "{:?} should be rejected",
                name
            );
        }

        let config = AuthConfig {
            session_cookie_name: "__Host-app_sid.v2".to_string(),
            ..valid_config()
        };
        assert!(config.validate().is_ok());
    }

    const TOML_CONFIG: &str = r#"
cookie_key = "0123456789abcdef0123456789abcdef"
jwt_signing_key = "fedcba9876543210fedcba9876543210"
environment = "production"
jwt_expiration = 3600
redirect_to = "/signin"

[social_providers.github]
key = "client-id"
secret = "client-secret"
callback_url = "https://example.com/auth/github/callback"
"#;

    #[test]
    fn test_load_from_toml_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("auth.toml", TOML_CONFIG)?;

            let config = AuthConfig::load(Some(Path::new("auth.toml"))).map_err(|e| e.to_string())?;
            assert_eq!(config.environment, Environment::Production);
            assert_eq!(config.jwt_duration(), Duration::from_secs(3600));
            assert_eq!(config.redirect_to, "/signin");
            assert_eq!(config.session_cookie_name, "authgate_session");
            assert!(config.social_providers["github"].scopes.is_empty());
            Ok(())
        });
    }

    #[test]
    fn test_environment_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "auth.toml",
                r#"
cookie_key = "0123456789abcdef0123456789abcdef"
jwt_signing_key = "fedcba9876543210fedcba9876543210"
redirect_to = "/signin"

[social_providers.github]
secret = "client-secret"
callback_url = "https://example.com/auth/github/callback"
"#,
            )?;
            jail.set_env("AUTHGATE_REDIRECT_TO", "/env-login");
            jail.set_env("AUTHGATE_SOCIAL_PROVIDERS__GITHUB__KEY", "env-client-id");
            jail.set_env("AUTHGATE_ENVIRONMENT", "production");

            let config = AuthConfig::load(Some(Path::new("auth.toml"))).map_err(|e| e.to_string())?;
            assert_eq!(config.redirect_to, "/env-login");
            assert_eq!(config.environment, Environment::Production);

            let github = &config.social_providers["github"];
            assert_eq!(github.key, "env-client-id");
            assert_eq!(github.secret, "client-secret");
            Ok(())
        });
    }

    #[test]
    fn test_environment_alone_is_enough() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("AUTHGATE_COOKIE_KEY", "c".repeat(32));
            jail.set_env("AUTHGATE_JWT_SIGNING_KEY", "j".repeat(32));
            jail.set_env("AUTHGATE_SESSION_MAX_AGE", "600");

            let config = AuthConfig::load(None).map_err(|e| e.to_string())?;
            assert_eq!(config.session_duration(), Duration::from_secs(600));
            assert_eq!(config.redirect_to, "/auth/login");
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_missing_keys() {
        figment::Jail::expect_with(|_jail| {
            // A missing file contributes nothing, leaving the empty default keys
            assert!(AuthConfig::load(Some(Path::new("missing.toml"))).is_err());
            Ok(())
        });
    }
}
