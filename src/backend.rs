//! Backend target and version-aware URL resolution

use serde::Deserialize;
use url::Url;

use crate::endpoint::HttpMethod;
use crate::error::TransportError;
use crate::transport::{HttpRequest, HttpTransport};

/// Discovery document listing the API versions a backend serves
pub const WELL_KNOWN_PATH: &str = "/.well-known/openeo";

/// The service under test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendTarget {
    /// URL as configured
    pub base_url: String,
    /// URL requests are sent to; differs from `base_url` when version
    /// discovery points at a versioned deployment
    pub url: String,
    /// Declared API version
    pub version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WellKnownDocument {
    #[serde(default)]
    versions: Vec<WellKnownVersion>,
}

#[derive(Debug, Deserialize)]
struct WellKnownVersion {
    api_version: String,
    url: String,
}

impl BackendTarget {
    pub fn new(base_url: impl Into<String>, version: Option<String>) -> Self {
        let base_url = base_url.into();
        Self {
            url: base_url.clone(),
            base_url,
            version: version.filter(|v| !v.is_empty()),
        }
    }

    /// Pick the versioned URL from the well-known document.
    ///
    /// Never fails: an unreachable discovery document or an unlisted version
    /// leaves the plain base URL in place.
    pub async fn resolve_url(&mut self, transport: &dyn HttpTransport) {
        self.url = self.base_url.clone();

        let Some(version) = self.version.clone() else {
            return;
        };

        let well_known = match build_url(&self.base_url, WELL_KNOWN_PATH) {
            Ok(url) => url,
            Err(e) => {
                log::warn!("Failed to build well-known url from {}: {}", self.base_url, e);
                return;
            }
        };

        let response = match transport.execute(&HttpRequest::new(HttpMethod::GET, well_known.clone())).await {
            Ok(response) => response,
            Err(e) => {
                log::warn!("Failed to get backend version url from {}: {}", well_known, e);
                log::warn!("Setting URL to base url: {}", self.base_url);
                return;
            }
        };

        let document: WellKnownDocument = match serde_json::from_slice(&response.body) {
            Ok(document) => document,
            Err(e) => {
                log::warn!("Unreadable well-known document at {}: {}", well_known, e);
                WellKnownDocument { versions: Vec::new() }
            }
        };

        match select_version_url(&document.versions, &version) {
            Some(url) => {
                log::info!("Backend version {} resolved to {}", version, url);
                self.url = url;
            }
            None => {
                log::warn!(
                    "Given backend version <{}> was not found, using just url: {}",
                    version,
                    self.base_url
                );
            }
        }
    }
}

fn select_version_url(versions: &[WellKnownVersion], declared: &str) -> Option<String> {
    let wanted = normalize_version(declared);
    versions
        .iter()
        .find(|candidate| normalize_version(&candidate.api_version) == wanted)
        .map(|candidate| candidate.url.clone())
}

/// Canonical form used to compare version strings, so "1.0", "v1.0.0" and
/// "1.0.0.0" all compare equal. Pre-release suffixes are kept.
pub fn normalize_version(version: &str) -> String {
    let trimmed = version.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);

    let (numeric, suffix) = match trimmed.find(|c| c == '-' || c == '+') {
        Some(pos) => trimmed.split_at(pos),
        None => (trimmed, ""),
    };

    let mut parts: Vec<String> = numeric
        .split('.')
        .map(|part| match part.parse::<u64>() {
            Ok(n) => n.to_string(),
            Err(_) => part.to_string(),
        })
        .collect();
    while parts.len() < 4 {
        parts.push("0".to_string());
    }

    format!("{}{}", parts.join("."), suffix.to_ascii_lowercase())
}

/// Join an endpoint path (optionally carrying a query) onto a base URL
pub fn build_url(base: &str, endpoint: &str) -> Result<String, TransportError> {
    let mut url = Url::parse(base).map_err(|e| TransportError::InvalidUrl(format!("{}: {}", base, e)))?;

    let (path, query) = match endpoint.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (endpoint, None),
    };

    let joined = format!(
        "{}/{}",
        url.path().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    url.set_path(&joined);
    url.set_query(query);

    Ok(url.to_string())
}
