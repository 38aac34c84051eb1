//! ---
//! hct_section: "01-core-functionality"
//! hct_subsection: "module"
//! hct_type: "source"
//! hct_scope: "code"
//! hct_description: "Update engine: manifest retrieval, artifact transfer and orchestration."
//! hct_version: "v0.1.0"
//! hct_owner: "tbd"
//! ---
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ManifestError;

/// Keys that may carry the version, in lookup order.
pub const VERSION_KEYS: [&str; 5] = [
    "version",
    "client_version",
    "api_version",
    "core_version",
    "hcc_version",
];

/// Keys that may carry the artifact URL, in lookup order.
pub const DOWNLOAD_URL_KEYS: [&str; 4] = ["download_url", "url", "artifact", "link"];

/// Remote description of the latest artifact of a component.
///
/// Kept as the raw JSON object so appliers can read fields beyond the ones
/// resolved here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteManifest(Map<String, Value>);

impl RemoteManifest {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// First non-empty string among [`VERSION_KEYS`].
    pub fn version(&self) -> Option<&str> {
        self.first_string(&VERSION_KEYS)
    }

    /// First non-empty string among [`DOWNLOAD_URL_KEYS`].
    pub fn download_url(&self) -> Option<&str> {
        self.first_string(&DOWNLOAD_URL_KEYS)
    }

    /// Declared `checksum`, as `<algorithm>:<hex>` or a bare SHA-256 digest.
    pub fn checksum(&self) -> Option<&str> {
        self.first_string(&["checksum"])
    }

    /// Declared artifact file name.
    pub fn filename(&self) -> Option<&str> {
        self.first_string(&["filename"])
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    fn first_string(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .filter_map(|key| self.0.get(*key))
            .filter_map(Value::as_str)
            .map(str::trim)
            .find(|value| !value.is_empty())
    }
}

impl TryFrom<Value> for RemoteManifest {
    type Error = ManifestError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(ManifestError::InvalidBody(format!(
                "expected an object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Query parameters of a manifest request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestQuery {
    pub token: String,
    pub client_id: Option<String>,
    pub extra: IndexMap<String, String>,
}

impl ManifestQuery {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            ..Self::default()
        }
    }

    /// Encoded pairs: `token`, then `client_id`, then extras. Extras win on key clashes.
    pub fn pairs(&self) -> Vec<(String, String)> {
        let mut pairs = IndexMap::new();
        pairs.insert("token".to_owned(), self.token.clone());
        if let Some(client_id) = self.client_id.as_deref().filter(|id| !id.is_empty()) {
            pairs.insert("client_id".to_owned(), client_id.to_owned());
        }
        for (key, value) in &self.extra {
            pairs.insert(key.clone(), value.clone());
        }
        pairs.into_iter().collect()
    }
}

/// Source of remote manifests.
#[async_trait]
pub trait ManifestClient: Send + Sync {
    /// Fetch the manifest published at `base_url`.
    ///
    /// A 404 is reported as [`ManifestError::NotFound`] and is not a failure
    /// from the orchestrator's point of view.
    async fn fetch(
        &self,
        base_url: &str,
        query: &ManifestQuery,
    ) -> Result<RemoteManifest, ManifestError>;
}

/// [`ManifestClient`] speaking plain HTTPS GET with JSON bodies.
#[derive(Debug, Clone)]
pub struct HttpManifestClient {
    client: reqwest::Client,
}

impl HttpManifestClient {
    pub fn new(timeout: Duration, user_agent: &str) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ManifestClient for HttpManifestClient {
    async fn fetch(
        &self,
        base_url: &str,
        query: &ManifestQuery,
    ) -> Result<RemoteManifest, ManifestError> {
        debug!(base_url, "requesting remote manifest");
        let response = self
            .client
            .get(base_url)
            .query(&query.pairs())
            .send()
            .await
            .map_err(|err| ManifestError::Transport(err.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ManifestError::NotFound);
        }
        if !status.is_success() {
            return Err(ManifestError::Status(status.as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|err| ManifestError::InvalidBody(err.to_string()))?;
        RemoteManifest::try_from(body)
    }
}
