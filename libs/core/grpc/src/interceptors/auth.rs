//! Server-side bearer-token authentication.
//!
//! Per call:
//! 1. a call with no metadata at all is rejected (`InvalidArgument`)
//! 2. a call without an `authorization` header follows [`MissingTokenPolicy`]
//! 3. otherwise the header must be `Bearer <token>`; the token is verified
//!    against the key its header names and the configured claim policy, and
//!    the decoded claims are attached to the request
//!
//! Any verification failure is reported as `Unauthenticated("invalid token")`
//! without detail; the cause is logged at debug level.

use crate::auth::{AuthConfig, Claims, KeyResolver, MissingTokenPolicy};
use jsonwebtoken::{Validation, decode, decode_header};
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;
use tonic::metadata::MetadataMap;
use tonic::{Request, Status};
use tracing::debug;

/// Why a call was refused.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing metadata")]
    MissingMetadata,

    #[error("missing bearer token")]
    MissingBearerToken,

    #[error("invalid token")]
    InvalidToken,
}

impl From<AuthError> for Status {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingMetadata | AuthError::MissingBearerToken => {
                Status::invalid_argument(err.to_string())
            }
            AuthError::InvalidToken => Status::unauthenticated(err.to_string()),
        }
    }
}

/// Verifies bearer tokens and attaches claims of type `C` to the request.
///
/// # Example
/// ```ignore
/// use grpc_core::auth::{AuthConfig, RegisteredClaims, StaticKeys, VerificationKey};
/// use grpc_core::interceptors::JwtAuthInterceptor;
///
/// let keys = StaticKeys::new().with_default(VerificationKey::hmac(b"secret"));
/// let auth = JwtAuthInterceptor::<RegisteredClaims>::new(Arc::new(keys), AuthConfig::default());
/// let service = TasksServiceServer::with_interceptor(my_impl, auth);
/// ```
pub struct JwtAuthInterceptor<C> {
    resolver: Arc<dyn KeyResolver>,
    config: Arc<AuthConfig>,
    _claims: PhantomData<fn() -> C>,
}

impl<C> Clone for JwtAuthInterceptor<C> {
    fn clone(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
            config: self.config.clone(),
            _claims: PhantomData,
        }
    }
}

impl<C: Claims> JwtAuthInterceptor<C> {
    pub fn new(resolver: Arc<dyn KeyResolver>, config: AuthConfig) -> Self {
        Self {
            resolver,
            config: Arc::new(config),
            _claims: PhantomData,
        }
    }

    /// Authenticate a call from its metadata.
    ///
    /// Returns `Ok(None)` for a call allowed through without a token.
    pub fn authenticate(&self, metadata: &MetadataMap) -> Result<Option<C>, AuthError> {
        if metadata.is_empty() {
            return Err(AuthError::MissingMetadata);
        }

        let Some(value) = metadata.get("authorization") else {
            return match self.config.missing_token {
                MissingTokenPolicy::Allow => Ok(None),
                MissingTokenPolicy::Reject => Err(AuthError::MissingBearerToken),
            };
        };

        let header = value.to_str().map_err(|_| AuthError::InvalidToken)?;
        let token = bearer_token(header).ok_or(AuthError::InvalidToken)?;
        self.verify(token).map(Some)
    }

    fn verify(&self, token: &str) -> Result<C, AuthError> {
        let header = decode_header(token).map_err(|e| {
            debug!(error = %e, "Malformed token header");
            AuthError::InvalidToken
        })?;

        let key = self.resolver.resolve(&header).map_err(|e| {
            debug!(error = %e, "No verification key for token");
            AuthError::InvalidToken
        })?;

        if !key.allows(header.alg) {
            debug!(alg = ?header.alg, allowed = ?key.algorithms(), "Token algorithm not allowed for key");
            return Err(AuthError::InvalidToken);
        }

        let mut validation = Validation::new(header.alg);
        validation.algorithms = key.algorithms().to_vec();
        validation.leeway = self.config.leeway_secs;
        if self.config.audience.is_empty() {
            validation.validate_aud = false;
        } else {
            validation.set_audience(&self.config.audience);
        }
        if !self.config.issuer.is_empty() {
            validation.set_issuer(&self.config.issuer);
        }

        decode::<C>(token, key.key(), &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "Token verification failed");
                AuthError::InvalidToken
            })
    }
}

impl<C: Claims> tonic::service::Interceptor for JwtAuthInterceptor<C> {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        if let Some(claims) = self.authenticate(request.metadata())? {
            if let Some(subject) = claims.subject() {
                tracing::Span::current().record("user.id", subject);
            }
            request.extensions_mut().insert(claims);
        }
        Ok(request)
    }
}

/// Claims attached by [`JwtAuthInterceptor`], if the call was authenticated.
pub fn claims_from_request<C: Claims, T>(request: &Request<T>) -> Option<&C> {
    request.extensions().get::<C>()
}

fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{RegisteredClaims, StaticKeys, VerificationKey};
    use jsonwebtoken::{Algorithm, EncodingKey, Header, encode, get_current_timestamp};
    use tonic::Code;
    use tonic::service::Interceptor;

    const SECRET: &[u8] = b"test-signing-secret";

    fn interceptor(config: AuthConfig) -> JwtAuthInterceptor<RegisteredClaims> {
        let keys = StaticKeys::new()
            .with_key("primary", VerificationKey::hmac(SECRET))
            .with_default(VerificationKey::hmac(SECRET));
        JwtAuthInterceptor::new(Arc::new(keys), config)
    }

    fn token(sub: &str, secret: &[u8], exp_offset: i64) -> String {
        token_with_alg(sub, secret, exp_offset, Algorithm::HS256)
    }

    fn token_with_alg(sub: &str, secret: &[u8], exp_offset: i64, alg: Algorithm) -> String {
        let claims = RegisteredClaims {
            sub: Some(sub.to_string()),
            exp: Some((get_current_timestamp() as i64 + exp_offset) as u64),
            ..Default::default()
        };
        let header = Header {
            kid: Some("primary".to_string()),
            ..Header::new(alg)
        };
        encode(&header, &claims, &EncodingKey::from_secret(secret)).unwrap()
    }

    fn request_with(header: Option<&str>) -> Request<()> {
        let mut request = Request::new(());
        request
            .metadata_mut()
            .insert("x-request-id", "test".parse().unwrap());
        if let Some(value) = header {
            request
                .metadata_mut()
                .insert("authorization", value.parse().unwrap());
        }
        request
    }

    #[test]
    fn test_valid_token_attaches_claims() {
        let mut auth = interceptor(AuthConfig::default());
        let bearer = format!("Bearer {}", token("alice", SECRET, 3600));

        let request = auth.call(request_with(Some(&bearer))).unwrap();
        let claims = claims_from_request::<RegisteredClaims, _>(&request).unwrap();
        assert_eq!(claims.subject(), Some("alice"));
    }

    #[test]
    fn test_scheme_is_case_insensitive() {
        let mut auth = interceptor(AuthConfig::default());
        let bearer = format!("bearer {}", token("alice", SECRET, 3600));
        assert!(auth.call(request_with(Some(&bearer))).is_ok());
    }

    #[test]
    fn test_wrong_signature_is_unauthenticated() {
        let mut auth = interceptor(AuthConfig::default());
        let bearer = format!("Bearer {}", token("alice", b"some-other-secret", 3600));

        let status = auth.call(request_with(Some(&bearer))).unwrap_err();
        assert_eq!(status.code(), Code::Unauthenticated);
        assert_eq!(status.message(), "invalid token");
    }

    #[test]
    fn test_algorithm_outside_key_pin_is_unauthenticated() {
        let mut auth = interceptor(AuthConfig::default());
        // Right secret, but the key only verifies HS256.
        let bearer = format!(
            "Bearer {}",
            token_with_alg("alice", SECRET, 3600, Algorithm::HS384)
        );

        let status = auth.call(request_with(Some(&bearer))).unwrap_err();
        assert_eq!(status.code(), Code::Unauthenticated);
        assert_eq!(status.message(), "invalid token");
    }

    #[test]
    fn test_key_pinned_to_other_hmac_accepts_it() {
        let keys = StaticKeys::new().with_key(
            "primary",
            VerificationKey::new(jsonwebtoken::DecodingKey::from_secret(SECRET), Algorithm::HS512),
        );
        let mut auth = JwtAuthInterceptor::<RegisteredClaims>::new(Arc::new(keys), AuthConfig::default());

        let bearer = format!(
            "Bearer {}",
            token_with_alg("alice", SECRET, 3600, Algorithm::HS512)
        );
        assert!(auth.call(request_with(Some(&bearer))).is_ok());
    }

    #[test]
    fn test_expired_token_is_unauthenticated() {
        let mut auth = interceptor(AuthConfig::default().with_leeway_secs(0));
        let bearer = format!("Bearer {}", token("alice", SECRET, -600));

        let status = auth.call(request_with(Some(&bearer))).unwrap_err();
        assert_eq!(status.code(), Code::Unauthenticated);
    }

    #[test]
    fn test_audience_is_enforced_when_configured() {
        let mut auth = interceptor(AuthConfig::default().with_audience("orders"));
        let bearer = format!("Bearer {}", token("alice", SECRET, 3600));

        let status = auth.call(request_with(Some(&bearer))).unwrap_err();
        assert_eq!(status.code(), Code::Unauthenticated);
    }

    #[test]
    fn test_non_bearer_scheme_is_unauthenticated() {
        let mut auth = interceptor(AuthConfig::default());
        let status = auth.call(request_with(Some("Basic dXNlcjpwYXNz"))).unwrap_err();
        assert_eq!(status.code(), Code::Unauthenticated);
    }

    #[test]
    fn test_empty_metadata_is_invalid_argument() {
        let mut auth = interceptor(AuthConfig::default());
        let status = auth.call(Request::new(())).unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
        assert_eq!(status.message(), "missing metadata");
    }

    #[test]
    fn test_missing_token_allowed_by_default() {
        let mut auth = interceptor(AuthConfig::default());
        let request = auth.call(request_with(None)).unwrap();
        assert!(claims_from_request::<RegisteredClaims, _>(&request).is_none());
    }

    #[test]
    fn test_missing_token_rejected_when_configured() {
        let mut auth =
            interceptor(AuthConfig::default().with_missing_token(MissingTokenPolicy::Reject));
        let status = auth.call(request_with(None)).unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
        assert_eq!(status.message(), "missing bearer token");
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("BEARER  abc "), Some("abc"));
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("abc"), None);
    }
}
