use super::keys::{KeyError, KeyResolver, StaticKeys, VerificationKey};
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::Header;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Failure to obtain a usable key set at startup.
#[derive(Error, Debug)]
pub enum KeySetError {
    #[error("no key set URLs configured")]
    NoUrls,

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("failed to fetch key set from {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("key sets at {urls:?} contain no usable keys")]
    Empty { urls: Vec<String> },
}

/// Key resolver backed by one or more remote JWKS documents.
///
/// Keys from every URL are merged by `kid`. With a refresh interval, a
/// background task refetches the sets; a failed refresh keeps the previous
/// keys. The task is aborted when the resolver is dropped.
pub struct JwksResolver {
    keys: Arc<RwLock<StaticKeys>>,
    refresh: Option<JoinHandle<()>>,
}

impl JwksResolver {
    pub async fn fetch(
        urls: &[String],
        refresh_interval: Option<Duration>,
    ) -> Result<Self, KeySetError> {
        if urls.is_empty() {
            return Err(KeySetError::NoUrls);
        }

        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(KeySetError::Client)?;

        let keys = fetch_all(&client, urls).await?;
        info!(urls = ?urls, keys = keys.len(), "Signing keys loaded");

        let keys = Arc::new(RwLock::new(keys));
        let refresh = refresh_interval.map(|interval| {
            tokio::spawn(refresh_loop(client, urls.to_vec(), keys.clone(), interval))
        });

        Ok(Self { keys, refresh })
    }

    pub fn key_count(&self) -> usize {
        self.snapshot().len()
    }

    fn snapshot(&self) -> std::sync::RwLockReadGuard<'_, StaticKeys> {
        self.keys.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KeyResolver for JwksResolver {
    fn resolve(&self, header: &Header) -> Result<VerificationKey, KeyError> {
        self.snapshot().resolve(header)
    }
}

impl Drop for JwksResolver {
    fn drop(&mut self) {
        if let Some(handle) = self.refresh.take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for JwksResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksResolver")
            .field("keys", &*self.snapshot())
            .field("refreshing", &self.refresh.is_some())
            .finish()
    }
}

async fn fetch_all(client: &reqwest::Client, urls: &[String]) -> Result<StaticKeys, KeySetError> {
    let mut keys = StaticKeys::new();

    for url in urls {
        let set = fetch_one(client, url).await?;
        for jwk in &set.keys {
            let Some(kid) = jwk.common.key_id.as_deref() else {
                warn!(url = %url, "Skipping key without kid");
                continue;
            };
            match VerificationKey::from_jwk(jwk) {
                Ok(key) => keys.insert(kid, key),
                Err(e) => warn!(url = %url, kid = %kid, error = %e, "Skipping unusable key"),
            }
        }
    }

    if keys.is_empty() {
        return Err(KeySetError::Empty {
            urls: urls.to_vec(),
        });
    }
    Ok(keys)
}

async fn fetch_one(client: &reqwest::Client, url: &str) -> Result<JwkSet, KeySetError> {
    let fetch_error = |source| KeySetError::Fetch {
        url: url.to_string(),
        source,
    };

    client
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(fetch_error)?
        .json::<JwkSet>()
        .await
        .map_err(fetch_error)
}

async fn refresh_loop(
    client: reqwest::Client,
    urls: Vec<String>,
    keys: Arc<RwLock<StaticKeys>>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately; the initial fetch already ran.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match fetch_all(&client, &urls).await {
            Ok(fresh) => {
                debug!(keys = fresh.len(), "Signing keys refreshed");
                *keys.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = fresh;
            }
            Err(e) => warn!(error = %e, "Signing key refresh failed, keeping previous keys"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::routing::get;
    use jsonwebtoken::Algorithm;
    use serde_json::json;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}/.well-known/jwks.json")
    }

    fn jwks_document() -> serde_json::Value {
        json!({
            "keys": [
                // base64url("secret-one")
                { "kty": "oct", "kid": "one", "alg": "HS256", "k": "c2VjcmV0LW9uZQ" },
                { "kty": "oct", "alg": "HS256", "k": "bm8ta2lk" }
            ]
        })
    }

    fn header(kid: &str) -> Header {
        Header {
            kid: Some(kid.to_string()),
            ..Header::new(Algorithm::HS256)
        }
    }

    #[tokio::test]
    async fn test_fetch_merges_keys_by_kid() {
        let url = serve(Router::new().route(
            "/.well-known/jwks.json",
            get(|| async { axum::Json(jwks_document()) }),
        ))
        .await;

        let resolver = JwksResolver::fetch(&[url], None).await.unwrap();
        assert_eq!(resolver.key_count(), 1);
        assert_eq!(
            resolver.resolve(&header("one")).unwrap().algorithms(),
            &[Algorithm::HS256]
        );
        assert_eq!(
            resolver.resolve(&header("two")).err(),
            Some(KeyError::UnknownKid("two".to_string()))
        );
    }

    #[tokio::test]
    async fn test_fetch_fails_on_http_error() {
        let url = serve(Router::new()).await;

        let err = JwksResolver::fetch(&[url.clone()], None).await.unwrap_err();
        assert!(matches!(err, KeySetError::Fetch { url: ref u, .. } if *u == url));
    }

    #[tokio::test]
    async fn test_fetch_fails_without_usable_keys() {
        let url = serve(Router::new().route(
            "/.well-known/jwks.json",
            get(|| async { axum::Json(json!({ "keys": [] })) }),
        ))
        .await;

        let err = JwksResolver::fetch(&[url], None).await.unwrap_err();
        assert!(matches!(err, KeySetError::Empty { .. }));
    }

    #[tokio::test]
    async fn test_fetch_requires_urls() {
        let err = JwksResolver::fetch(&[], None).await.unwrap_err();
        assert!(matches!(err, KeySetError::NoUrls));
    }
}
