//! Startup secret sources.
//!
//! The target account keypair is loaded once through a [`SecretStore`]; it is
//! never compiled into a build artifact. Values are returned as zeroizing
//! buffers so callers can drop them as soon as the key is parsed.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use zeroize::Zeroizing;

pub type SecretBytes = Zeroizing<Vec<u8>>;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("invalid secret name: {0:?}")]
    InvalidName(String),
    #[error("unknown secret store spec: {0}")]
    UnknownStore(String),
    #[error("secret store io: {0}")]
    Io(#[from] std::io::Error),
    #[error("secret store http: {0}")]
    Http(String),
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    fn kind(&self) -> &'static str;
    async fn load_secret(&self, name: &str) -> Result<Option<SecretBytes>, SecretError>;
}

fn validate_name(name: &str) -> Result<(), SecretError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(SecretError::InvalidName(name.to_owned()))
    }
}

/// Reads `<PREFIX><NAME>` from the process environment, e.g.
/// `GS_SECRET_TARGET_ACCOUNT` for the secret `target-account`.
pub struct EnvSecretStore {
    prefix: String,
}

impl EnvSecretStore {
    pub const DEFAULT_PREFIX: &'static str = "GS_SECRET_";

    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn var_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name.to_ascii_uppercase().replace('-', "_"))
    }
}

impl Default for EnvSecretStore {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PREFIX)
    }
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    fn kind(&self) -> &'static str {
        "env"
    }

    async fn load_secret(&self, name: &str) -> Result<Option<SecretBytes>, SecretError> {
        validate_name(name)?;
        Ok(std::env::var(self.var_name(name))
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(|value| Zeroizing::new(value.into_bytes())))
    }
}

/// Reads `<dir>/<name>.json`, the layout of a mounted secrets volume.
pub struct FileSecretStore {
    dir: PathBuf,
}

impl FileSecretStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    fn kind(&self) -> &'static str {
        "file"
    }

    async fn load_secret(&self, name: &str) -> Result<Option<SecretBytes>, SecretError> {
        validate_name(name)?;
        let path = self.dir.join(format!("{name}.json"));
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(Zeroizing::new(bytes))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

/// Held values are wiped when replaced or when the store is dropped.
#[derive(Default)]
pub struct InMemorySecretStore {
    secrets: RwLock<HashMap<String, SecretBytes>>,
}

impl InMemorySecretStore {
    pub async fn insert(&self, name: &str, value: impl Into<Vec<u8>>) {
        let mut guard = self.secrets.write().await;
        guard.insert(name.to_owned(), Zeroizing::new(value.into()));
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn load_secret(&self, name: &str) -> Result<Option<SecretBytes>, SecretError> {
        validate_name(name)?;
        let guard = self.secrets.read().await;
        Ok(guard.get(name).cloned())
    }
}

/// Vault-style KV endpoint: `GET {base}/v1/secrets/{name}` returning `{"value": "..."}`.
pub struct HttpSecretStore {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct HttpSecretBody {
    value: String,
}

impl HttpSecretStore {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            token,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SecretStore for HttpSecretStore {
    fn kind(&self) -> &'static str {
        "http"
    }

    async fn load_secret(&self, name: &str) -> Result<Option<SecretBytes>, SecretError> {
        validate_name(name)?;
        let url = format!("{}/v1/secrets/{}", self.base_url, name);

        let mut request = self.http.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|err| SecretError::Http(err.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(SecretError::Http(format!("{url} returned HTTP {status}")));
        }

        let body: HttpSecretBody = response
            .json()
            .await
            .map_err(|err| SecretError::Http(err.to_string()))?;

        Ok(Some(Zeroizing::new(body.value.into_bytes())))
    }
}

/// Builds a store from `env`, `file:<dir>` or `http:<base-url>`.
pub fn store_from_spec(spec: &str, token: Option<String>) -> Result<Arc<dyn SecretStore>, SecretError> {
    let spec = spec.trim();
    if spec == "env" {
        return Ok(Arc::new(EnvSecretStore::default()));
    }
    if let Some(dir) = spec.strip_prefix("file:") {
        return Ok(Arc::new(FileSecretStore::new(dir)));
    }
    if let Some(url) = spec.strip_prefix("http:") {
        return Ok(Arc::new(HttpSecretStore::new(url, token)));
    }
    Err(SecretError::UnknownStore(spec.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_store_reads_named_json_and_reports_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("target-account.json"), b"[1,2,3]").unwrap();

        let store = FileSecretStore::new(dir.path());
        let value = store.load_secret("target-account").await.unwrap().unwrap();
        assert_eq!(value.as_slice(), b"[1,2,3]");
        assert!(store.load_secret("absent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn names_cannot_escape_the_store() {
        let store = FileSecretStore::new("/tmp");
        assert!(matches!(
            store.load_secret("../etc/passwd").await,
            Err(SecretError::InvalidName(_))
        ));
    }

    #[tokio::test]
    async fn memory_store_returns_inserted_values() {
        let store = InMemorySecretStore::default();
        store.insert("target-account", "secret").await;
        assert_eq!(
            store.load_secret("target-account").await.unwrap().unwrap().as_slice(),
            b"secret"
        );

        store.insert("target-account", "rotated").await;
        let held: Option<SecretBytes> = store.secrets.read().await.get("target-account").cloned();
        assert_eq!(held.as_deref().map(Vec::as_slice), Some(&b"rotated"[..]));
    }

    #[test]
    fn env_store_maps_names_to_variables() {
        let store = EnvSecretStore::default();
        assert_eq!(store.var_name("target-account"), "GS_SECRET_TARGET_ACCOUNT");
    }

    #[test]
    fn spec_parsing_picks_backend() {
        assert_eq!(store_from_spec("env", None).unwrap().kind(), "env");
        assert_eq!(store_from_spec("file:/run/secrets", None).unwrap().kind(), "file");
        assert_eq!(
            store_from_spec("http:https://vault.internal", Some("t".into())).unwrap().kind(),
            "http"
        );
        assert!(store_from_spec("s3:bucket", None).is_err());
    }
}
