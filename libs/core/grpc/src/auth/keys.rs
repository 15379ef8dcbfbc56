use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, Jwk};
use jsonwebtoken::{Algorithm, DecodingKey, Header};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Failure to find a verification key for a token.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("token has no key id and no default key is configured")]
    MissingKid,

    #[error("no key registered for key id '{0}'")]
    UnknownKid(String),
}

/// A decoding key together with the algorithms it may verify.
///
/// Tokens naming any other algorithm in their header are refused, even when
/// the key family would accept them.
#[derive(Clone)]
pub struct VerificationKey {
    key: DecodingKey,
    algorithms: Vec<Algorithm>,
}

impl VerificationKey {
    pub fn new(key: DecodingKey, algorithm: Algorithm) -> Self {
        Self {
            key,
            algorithms: vec![algorithm],
        }
    }

    /// Shared-secret key for HS256.
    pub fn hmac(secret: &[u8]) -> Self {
        Self::new(DecodingKey::from_secret(secret), Algorithm::HS256)
    }

    /// Key from a JWK. A declared `alg` pins that single algorithm; without
    /// one, the algorithms of the key's type (and curve) are allowed.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, String> {
        let key = DecodingKey::from_jwk(jwk).map_err(|e| e.to_string())?;

        let algorithms = match &jwk.common.key_algorithm {
            Some(declared) => {
                let name = format!("{declared:?}");
                let algorithm = name
                    .parse::<Algorithm>()
                    .map_err(|_| format!("algorithm {name} cannot verify signatures"))?;
                vec![algorithm]
            }
            None => family_algorithms(&jwk.algorithm),
        };

        if algorithms.is_empty() {
            return Err("no signature algorithm fits this key".to_string());
        }
        Ok(Self { key, algorithms })
    }

    pub fn key(&self) -> &DecodingKey {
        &self.key
    }

    pub fn algorithms(&self) -> &[Algorithm] {
        &self.algorithms
    }

    pub fn allows(&self, algorithm: Algorithm) -> bool {
        self.algorithms.contains(&algorithm)
    }
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKey")
            .field("algorithms", &self.algorithms)
            .finish_non_exhaustive()
    }
}

fn family_algorithms(params: &AlgorithmParameters) -> Vec<Algorithm> {
    use Algorithm::*;

    #[allow(unreachable_patterns)]
    match params {
        AlgorithmParameters::RSA(_) => vec![RS256, RS384, RS512, PS256, PS384, PS512],
        AlgorithmParameters::EllipticCurve(ec) => match ec.curve {
            EllipticCurve::P256 => vec![ES256],
            EllipticCurve::P384 => vec![ES384],
            _ => Vec::new(),
        },
        AlgorithmParameters::OctetKey(_) => vec![HS256, HS384, HS512],
        AlgorithmParameters::OctetKeyPair(_) => vec![EdDSA],
        _ => Vec::new(),
    }
}

/// Resolves the key that must have signed a token.
///
/// Resolution is synchronous: implementations answer from memory, and
/// anything that needs I/O refreshes that memory in the background.
pub trait KeyResolver: Send + Sync {
    fn resolve(&self, header: &Header) -> Result<VerificationKey, KeyError>;
}

/// In-memory key set indexed by `kid`.
#[derive(Clone, Default)]
pub struct StaticKeys {
    keys: HashMap<String, VerificationKey>,
    default: Option<VerificationKey>,
}

impl StaticKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, kid: impl Into<String>, key: VerificationKey) -> Self {
        self.insert(kid, key);
        self
    }

    /// Key used for tokens that carry no `kid`.
    pub fn with_default(mut self, key: VerificationKey) -> Self {
        self.default = Some(key);
        self
    }

    pub fn insert(&mut self, kid: impl Into<String>, key: VerificationKey) {
        self.keys.insert(kid.into(), key);
    }

    pub fn len(&self) -> usize {
        self.keys.len() + usize::from(self.default.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, kid: &str) -> bool {
        self.keys.contains_key(kid)
    }
}

impl KeyResolver for StaticKeys {
    fn resolve(&self, header: &Header) -> Result<VerificationKey, KeyError> {
        match &header.kid {
            Some(kid) => self
                .keys
                .get(kid)
                .cloned()
                .ok_or_else(|| KeyError::UnknownKid(kid.clone())),
            None => self.default.clone().ok_or(KeyError::MissingKid),
        }
    }
}

impl fmt::Debug for StaticKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticKeys")
            .field("kids", &self.keys.keys().collect::<Vec<_>>())
            .field("has_default", &self.default.is_some())
            .finish()
    }
}
