use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Capability a verified token payload must expose.
///
/// Implemented by [`RegisteredClaims`]; services with custom claim shapes
/// implement it for their own type.
pub trait Claims: DeserializeOwned + Clone + Send + Sync + 'static {
    fn subject(&self) -> Option<&str>;

    fn issuer(&self) -> Option<&str> {
        None
    }

    /// Expiry as seconds since the Unix epoch.
    fn expires_at(&self) -> Option<u64> {
        None
    }

    fn audience(&self) -> Vec<&str> {
        Vec::new()
    }
}

/// The `aud` claim, which may be a single string or an array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let slice = match self {
            Audience::One(aud) => std::slice::from_ref(aud),
            Audience::Many(auds) => auds.as_slice(),
        };
        slice.iter().map(String::as_str)
    }
}

/// Registered JWT claims (RFC 7519 section 4.1).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

impl Claims for RegisteredClaims {
    fn subject(&self) -> Option<&str> {
        self.sub.as_deref()
    }

    fn issuer(&self) -> Option<&str> {
        self.iss.as_deref()
    }

    fn expires_at(&self) -> Option<u64> {
        self.exp
    }

    fn audience(&self) -> Vec<&str> {
        self.aud.as_ref().map(|aud| aud.iter().collect()).unwrap_or_default()
    }
}
