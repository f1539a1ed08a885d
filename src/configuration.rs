//! Configuration Layering
//!
//! Loads cascading config documents (TOML, JSON or YAML), follows their parent
//! references and folds them into one `EffectiveConfig`. Later documents
//! override earlier scalar values, variables merge key by key and endpoints
//! accumulate per group in first-seen order.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;

use crate::backend::BackendTarget;
use crate::endpoint::{push_into_groups, Endpoint, EndpointGroup, HttpMethod, DEFAULT_GROUP};
use crate::error::{ConformanceError, Result};

/// Auth URL used when no layer configures one
pub const DEFAULT_AUTH_URL: &str = "/credentials/basic";

/// Prefix marking a value as an environment variable reference
pub const ENV_SENTINEL: char = '$';

/// Map that keeps the document order of its entries
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedMap<V>(pub Vec<(String, V)>);

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<V> OrderedMap<V> {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

struct OrderedMapVisitor<V>(PhantomData<V>);

impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedMapVisitor<V> {
    type Value = OrderedMap<V>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of endpoint definitions")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
        let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, value)) = access.next_entry::<String, V>()? {
            entries.push((key, value));
        }
        Ok(OrderedMap(entries))
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(OrderedMapVisitor(PhantomData))
    }
}

/// One config file as written by the operator
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigDocument {
    #[serde(default, alias = "Url")]
    pub url: Option<String>,
    /// API description: local file path or URL
    #[serde(default, alias = "Openapi")]
    pub openapi: Option<String>,
    #[serde(default, alias = "Username")]
    pub username: Option<String>,
    #[serde(default, alias = "Password")]
    pub password: Option<String>,
    #[serde(default, alias = "Authurl")]
    pub authurl: Option<String>,
    #[serde(default, alias = "Endpoints")]
    pub endpoints: OrderedMap<EndpointDocument>,
    #[serde(default, alias = "Output")]
    pub output: Option<String>,
    /// Parent document, merged before this one
    #[serde(default, alias = "Config")]
    pub config: Option<String>,
    #[serde(default, alias = "Variables")]
    pub variables: BTreeMap<String, String>,
    #[serde(default, alias = "backend_version", alias = "Backendversion")]
    pub backendversion: Option<String>,
}

/// Endpoint entry of a config document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndpointDocument {
    #[serde(default, alias = "Id")]
    pub id: Option<String>,
    #[serde(default, alias = "Url")]
    pub url: String,
    #[serde(default, alias = "type", alias = "method", alias = "Request_type")]
    pub request_type: Option<String>,
    #[serde(default, alias = "Body")]
    pub body: Option<String>,
    #[serde(default, alias = "Group")]
    pub group: Option<String>,
    #[serde(default, alias = "Order")]
    pub order: i64,
    #[serde(default, alias = "Optional")]
    pub optional: bool,
    /// Seconds, 0 disables the per-request timeout
    #[serde(default, alias = "Timeout")]
    pub timeout: u64,
    /// Seconds to pause after the endpoint finished
    #[serde(default, alias = "Wait")]
    pub wait: u64,
    #[serde(default, alias = "retry_code", alias = "RetryCode")]
    pub retrycode: Option<String>,
}

impl EndpointDocument {
    /// Build the endpoint, deriving its id from the last dotted segment of `key`
    pub fn into_endpoint(self, key: &str) -> Endpoint {
        let id = non_empty(self.id)
            .unwrap_or_else(|| key.rsplit('.').next().unwrap_or(key).to_string());
        let method = self
            .request_type
            .as_deref()
            .map(HttpMethod::from_request_type)
            .unwrap_or_default();

        Endpoint {
            id,
            url: self.url,
            method,
            body: non_empty(self.body),
            group: non_empty(self.group).unwrap_or_else(|| DEFAULT_GROUP.to_string()),
            order: self.order,
            optional: self.optional,
            timeout: (self.timeout > 0).then(|| Duration::from_secs(self.timeout)),
            wait: Duration::from_secs(self.wait),
            retry_trigger: non_empty(self.retrycode),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// The single test plan produced by layering every config document
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveConfig {
    pub backend: BackendTarget,
    pub api_description: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub auth_url: String,
    pub variables: BTreeMap<String, String>,
    pub groups: Vec<EndpointGroup>,
    pub output: Option<PathBuf>,
    /// Every document applied, in application order
    pub sources: Vec<PathBuf>,
}

impl EffectiveConfig {
    /// Credentials are only used when username, password and auth URL are all set
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !self.auth_url.is_empty() => Some((user, pass)),
            _ => None,
        }
    }

    pub fn endpoint_count(&self) -> usize {
        self.groups.iter().map(|g| g.endpoints.len()).sum()
    }
}

/// Resolve `$NAME` indirection, falling back to the literal when the
/// variable is unset or empty
pub fn resolve_value(raw: &str) -> String {
    let Some(name) = raw.strip_prefix(ENV_SENTINEL) else {
        return raw.to_string();
    };

    match std::env::var(name) {
        Ok(value) if !value.is_empty() => value,
        _ => {
            log::warn!("Environment variable does not exist or is empty: {}", name);
            log::warn!("Using raw input instead: {}", raw);
            raw.to_string()
        }
    }
}

/// Accumulates documents field by field; the most recently applied wins
#[derive(Debug, Default)]
pub struct ConfigLayering {
    base_url: Option<String>,
    version: Option<String>,
    api_description: Option<String>,
    username: Option<String>,
    password: Option<String>,
    auth_url: Option<String>,
    output: Option<String>,
    variables: BTreeMap<String, String>,
    groups: Vec<EndpointGroup>,
    sources: Vec<PathBuf>,
}

impl ConfigLayering {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one document on top of everything applied so far
    pub fn apply(&mut self, document: ConfigDocument) {
        for (name, value) in document.variables {
            let resolved = resolve_value(&value);
            self.variables.insert(name, resolved);
        }

        override_with(&mut self.base_url, document.url);
        override_with(&mut self.output, document.output);
        override_with(&mut self.version, document.backendversion);
        override_with(&mut self.api_description, document.openapi);
        override_with(&mut self.username, document.username);
        override_with(&mut self.password, document.password);
        override_with(&mut self.auth_url, document.authurl);

        for (key, entry) in document.endpoints.0 {
            push_into_groups(&mut self.groups, entry.into_endpoint(&key));
        }
    }

    pub fn record_source(&mut self, path: PathBuf) {
        self.sources.push(path);
    }

    /// Produce the effective plan; a missing backend URL is fatal
    pub fn finish(self) -> Result<EffectiveConfig> {
        let base_url = self.base_url.ok_or(ConformanceError::NoBackendUrl)?;

        Ok(EffectiveConfig {
            backend: BackendTarget::new(base_url, self.version),
            api_description: self.api_description,
            username: self.username,
            password: self.password,
            auth_url: self.auth_url.unwrap_or_else(|| DEFAULT_AUTH_URL.to_string()),
            variables: self.variables,
            groups: self.groups.into_iter().map(EndpointGroup::scheduled).collect(),
            output: self.output.map(PathBuf::from),
            sources: self.sources,
        })
    }
}

/// Present, non-empty values override after env indirection
fn override_with(slot: &mut Option<String>, value: Option<String>) {
    if let Some(value) = non_empty(value) {
        *slot = Some(resolve_value(&value));
    }
}

/// Loads config documents from disk and layers them
#[derive(Debug, Default)]
pub struct ConfigurationLoader {
    layering: ConfigLayering,
}

impl ConfigurationLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Layer every path in the listed order, each after its own parent chain
    pub async fn load_all<P: AsRef<Path>>(paths: &[P]) -> Result<EffectiveConfig> {
        let mut loader = Self::new();
        for path in paths {
            loader.append(path.as_ref()).await?;
        }
        loader.finish()
    }

    /// Apply `path` after its ancestors, root ancestor first
    pub async fn append(&mut self, path: &Path) -> Result<()> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut next = Some(path.to_path_buf());

        while let Some(current) = next.take() {
            let identity = std::fs::canonicalize(&current).unwrap_or_else(|_| current.clone());
            if !visited.insert(identity) {
                return Err(ConformanceError::CyclicConfig { path: current });
            }

            let document = load_document(&current).await?;
            next = document
                .config
                .as_deref()
                .filter(|parent| !parent.is_empty())
                .map(|parent| parent_path(&current, parent));
            chain.push((current, document));
        }

        for (source, document) in chain.into_iter().rev() {
            log::debug!("Applying config layer {:?}", source);
            self.layering.apply(document);
            self.layering.record_source(source);
        }

        Ok(())
    }

    pub fn finish(self) -> Result<EffectiveConfig> {
        self.layering.finish()
    }
}

/// Parent paths resolve next to the referencing file when such a file exists
fn parent_path(child: &Path, parent: &str) -> PathBuf {
    let parent = Path::new(parent);
    if parent.is_absolute() {
        return parent.to_path_buf();
    }
    match child.parent() {
        Some(dir) if dir.join(parent).exists() => dir.join(parent),
        _ => parent.to_path_buf(),
    }
}

/// Read one document, picking the format from the file extension
pub async fn load_document(path: &Path) -> Result<ConfigDocument> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| config_error(path, format!("Config file is missing or unreadable: {}", e)))?;

    parse_document(path, &content)
}

pub fn parse_document(path: &Path, content: &str) -> Result<ConfigDocument> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => toml::from_str(content)
            .map_err(|e| config_error(path, format!("Failed to parse TOML configuration: {}", e))),
        Some("json") => serde_json::from_str(content)
            .map_err(|e| config_error(path, format!("Failed to parse JSON configuration: {}", e))),
        Some("yaml") | Some("yml") => serde_yaml::from_str(content)
            .map_err(|e| config_error(path, format!("Failed to parse YAML configuration: {}", e))),
        _ => match toml::from_str(content) {
            Ok(document) => Ok(document),
            Err(toml_err) => serde_json::from_str(content).map_err(|json_err| {
                config_error(
                    path,
                    format!(
                        "Error reading config file as TOML: {}; as JSON: {}",
                        toml_err, json_err
                    ),
                )
            }),
        },
    }
}

fn config_error(path: &Path, message: String) -> ConformanceError {
    ConformanceError::Config {
        path: path.to_path_buf(),
        message,
    }
}
