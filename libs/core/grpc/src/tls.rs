//! Transport security for the RPC listener and for clients dialing it.
//!
//! PEM material is read from disk and parsed up front so that a bad file is
//! reported with its path at startup instead of surfacing later as an opaque
//! handshake failure.

use core_config::{ConfigError, FromEnv, env_flag, env_optional};
use serde::Deserialize;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tonic::transport::{Certificate, ClientTlsConfig, Identity, ServerTlsConfig};
use tracing::debug;

/// Errors loading TLS material. All are fatal at startup.
#[derive(Error, Debug)]
pub enum TlsError {
    #[error("TLS is enabled but no {0} path is configured")]
    MissingPath(&'static str),

    #[error("failed to read {kind} from {path}: {source}")]
    Read {
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {kind} in {path}: {reason}")]
    Parse {
        kind: &'static str,
        path: PathBuf,
        reason: String,
    },
}

/// TLS policy and material for one endpoint.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TlsConfig {
    pub enabled: bool,
    /// Require and verify a certificate from the other side.
    pub mutual: bool,
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
    pub ca_path: Option<PathBuf>,
    /// Name the client verifies in the server certificate.
    pub server_name: Option<String>,
}

impl TlsConfig {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    pub fn with_mutual(mut self, mutual: bool) -> Self {
        self.mutual = mutual;
        self
    }

    pub fn with_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.cert_path = Some(path.into());
        self
    }

    pub fn with_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_path = Some(path.into());
        self
    }

    pub fn with_ca(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_path = Some(path.into());
        self
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    /// Load from `{prefix}_TLS_ENABLED`, `_MUTUAL`, `_CERT`, `_KEY`, `_CA`
    /// and `_SERVER_NAME`.
    pub fn from_env_prefixed(prefix: &str) -> Result<Self, ConfigError> {
        let key = |suffix: &str| format!("{prefix}_TLS_{suffix}");
        Ok(Self {
            enabled: env_flag(&key("ENABLED"))?.unwrap_or(false),
            mutual: env_flag(&key("MUTUAL"))?.unwrap_or(false),
            cert_path: env_optional(&key("CERT")).map(PathBuf::from),
            key_path: env_optional(&key("KEY")).map(PathBuf::from),
            ca_path: env_optional(&key("CA")).map(PathBuf::from),
            server_name: env_optional(&key("SERVER_NAME")),
        })
    }
}

impl FromEnv for TlsConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_prefixed("GRPC")
    }
}

/// Server-side TLS context for the RPC listener.
#[derive(Debug, Clone)]
pub struct ServerSecurity {
    tls: ServerTlsConfig,
    mutual: bool,
}

impl ServerSecurity {
    /// Build the server context, or `None` when TLS is disabled.
    pub fn from_config(config: &TlsConfig) -> Result<Option<Self>, TlsError> {
        if !config.enabled {
            return Ok(None);
        }

        let identity = load_identity(config)?;
        let mut tls = ServerTlsConfig::new().identity(identity);

        if config.mutual {
            let ca = load_ca(required(&config.ca_path, "CA bundle")?)?;
            tls = tls.client_ca_root(ca);
        }

        debug!(mutual = config.mutual, "Server TLS material loaded");
        Ok(Some(Self {
            tls,
            mutual: config.mutual,
        }))
    }

    pub fn is_mutual(&self) -> bool {
        self.mutual
    }

    pub fn into_inner(self) -> ServerTlsConfig {
        self.tls
    }
}

/// Client-side security used when dialing an RPC listener.
#[derive(Debug, Clone)]
pub enum ClientSecurity {
    /// Plaintext HTTP/2.
    Insecure,
    Tls(Box<ClientTlsConfig>),
}

impl ClientSecurity {
    /// Build the client context.
    ///
    /// The peer is verified against the configured CA, or the platform roots
    /// when none is set. `default_server_name` is used when the config does
    /// not name the peer.
    pub fn from_config(config: &TlsConfig, default_server_name: &str) -> Result<Self, TlsError> {
        if !config.enabled {
            return Ok(Self::Insecure);
        }

        let server_name = config
            .server_name
            .clone()
            .unwrap_or_else(|| default_server_name.to_string());

        let mut tls = ClientTlsConfig::new().domain_name(server_name.clone());
        tls = match &config.ca_path {
            Some(path) => tls.ca_certificate(load_ca(path)?),
            None => tls.with_enabled_roots(),
        };

        if config.mutual {
            tls = tls.identity(load_identity(config)?);
        }

        debug!(server_name = %server_name, mutual = config.mutual, "Client TLS material loaded");
        Ok(Self::Tls(Box::new(tls)))
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    /// URI scheme matching this security mode.
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Insecure => "http",
            Self::Tls(_) => "https",
        }
    }
}

fn required<'a>(path: &'a Option<PathBuf>, kind: &'static str) -> Result<&'a Path, TlsError> {
    path.as_deref().ok_or(TlsError::MissingPath(kind))
}

fn read(path: &Path, kind: &'static str) -> Result<Vec<u8>, TlsError> {
    std::fs::read(path).map_err(|source| TlsError::Read {
        kind,
        path: path.to_path_buf(),
        source,
    })
}

fn parse_error(path: &Path, kind: &'static str, reason: impl Into<String>) -> TlsError {
    TlsError::Parse {
        kind,
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Read a PEM file and make sure it holds at least one certificate.
fn read_certs(path: &Path, kind: &'static str) -> Result<Vec<u8>, TlsError> {
    let pem = read(path, kind)?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(pem.as_slice()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| parse_error(path, kind, e.to_string()))?;

    if certs.is_empty() {
        return Err(parse_error(path, kind, "no certificates found"));
    }
    Ok(pem)
}

fn read_key(path: &Path) -> Result<Vec<u8>, TlsError> {
    const KIND: &str = "private key";
    let pem = read(path, KIND)?;
    match rustls_pemfile::private_key(&mut BufReader::new(pem.as_slice())) {
        Ok(Some(_)) => Ok(pem),
        Ok(None) => Err(parse_error(path, KIND, "no private key found")),
        Err(e) => Err(parse_error(path, KIND, e.to_string())),
    }
}

fn load_identity(config: &TlsConfig) -> Result<Identity, TlsError> {
    let cert = read_certs(required(&config.cert_path, "certificate")?, "certificate")?;
    let key = read_key(required(&config.key_path, "private key")?)?;
    Ok(Identity::from_pem(cert, key))
}

fn load_ca(path: &Path) -> Result<Certificate, TlsError> {
    Ok(Certificate::from_pem(read_certs(path, "CA bundle")?))
}
