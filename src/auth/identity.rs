//! Principal keys and the capability records implement to expose theirs.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

use super::error::AuthError;

/// Opaque identifier of a user record.
///
/// Serialized as a bare JSON string or number so it can travel inside token
/// claims and session values unchanged. Strings in canonical UUID form are
/// always represented by the `Uuid` variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrincipalKey {
    Str(String),
    Int(i64),
    Uuid(Uuid),
}

impl PrincipalKey {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PrincipalKey::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PrincipalKey::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            PrincipalKey::Uuid(u) => Some(*u),
            _ => None,
        }
    }

    /// Convert to the JSON form stored in sessions and claims
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            PrincipalKey::Str(s) => serde_json::Value::String(s.clone()),
            PrincipalKey::Int(i) => serde_json::Value::from(*i),
            PrincipalKey::Uuid(u) => serde_json::Value::String(u.to_string()),
        }
    }

    /// Read back a key stored with [`PrincipalKey::to_json`]
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Some(PrincipalKey::from(s.as_str())),
            serde_json::Value::Number(n) => n.as_i64().map(PrincipalKey::Int),
            _ => None,
        }
    }
}

impl fmt::Display for PrincipalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrincipalKey::Str(s) => f.write_str(s),
            PrincipalKey::Int(i) => write!(f, "{}", i),
            PrincipalKey::Uuid(u) => write!(f, "{}", u),
        }
    }
}

impl From<&str> for PrincipalKey {
    fn from(value: &str) -> Self {
        match Uuid::try_parse(value) {
            Ok(uuid) if uuid.hyphenated().to_string() == value => {
                PrincipalKey::Uuid(uuid)
            }
            _ => PrincipalKey::Str(value.to_string()),
        }
    }
}

impl From<String> for PrincipalKey {
    fn from(value: String) -> Self {
        PrincipalKey::from(value.as_str())
    }
}

impl From<i64> for PrincipalKey {
    fn from(value: i64) -> Self {
        PrincipalKey::Int(value)
    }
}

impl From<i32> for PrincipalKey {
    fn from(value: i32) -> Self {
        PrincipalKey::Int(value.into())
    }
}

impl From<Uuid> for PrincipalKey {
    fn from(value: Uuid) -> Self {
        PrincipalKey::Uuid(value)
    }
}

impl Serialize for PrincipalKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PrincipalKey::Str(s) => serializer.serialize_str(s),
            PrincipalKey::Int(i) => serializer.serialize_i64(*i),
            PrincipalKey::Uuid(u) => serializer.collect_str(u),
        }
    }
}

impl<'de> Deserialize<'de> for PrincipalKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        PrincipalKey::from_json(&value).ok_or_else(|| {
            serde::de::Error::custom("principal key must be a string or a 64-bit integer")
        })
    }
}

/// Capability of a user record to name its own primary key.
///
/// Returning `None` means the record has no key yet (for example a row that
/// was never persisted) and cannot be authenticated.
pub trait Identifiable {
    fn primary_key(&self) -> Option<PrincipalKey>;
}

impl<T: Identifiable + ?Sized> Identifiable for &T {
    fn primary_key(&self) -> Option<PrincipalKey> {
        (**self).primary_key()
    }
}

impl<T: Identifiable + ?Sized> Identifiable for std::sync::Arc<T> {
    fn primary_key(&self) -> Option<PrincipalKey> {
        (**self).primary_key()
    }
}

pub fn extract_primary_key<R: Identifiable + ?Sized>(record: &R) -> Result<PrincipalKey, AuthError> {
    record.primary_key().ok_or(AuthError::PrimaryKeyNotFound)
}
