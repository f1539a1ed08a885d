//! Backend capability discovery and endpoint filtering

use regex::Regex;
use serde::Deserialize;

use crate::backend::{build_url, WELL_KNOWN_PATH};
use crate::endpoint::{Endpoint, HttpMethod};
use crate::transport::{HttpRequest, HttpTransport};

/// Paths attempted whatever the capability document says
pub const EXEMPT_PATHS: [&str; 2] = ["/", WELL_KNOWN_PATH];

/// Capability document served at the backend root
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CapabilityDocument {
    #[serde(default)]
    pub endpoints: Vec<CapabilityEndpoint>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CapabilityEndpoint {
    pub path: String,
    #[serde(default)]
    pub methods: Vec<String>,
}

#[derive(Debug, Clone)]
struct CompiledCapability {
    pattern: Regex,
    methods: Vec<HttpMethod>,
}

/// Answers whether an endpoint is listed by the backend
#[derive(Debug, Clone, Default)]
pub struct CapabilityMatcher {
    capabilities: Vec<CompiledCapability>,
}

impl CapabilityMatcher {
    /// Matcher that lets every endpoint through
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn from_document(document: &CapabilityDocument) -> Self {
        let capabilities = document
            .endpoints
            .iter()
            .filter_map(|endpoint| match compile_path_pattern(&endpoint.path) {
                Ok(pattern) => Some(CompiledCapability {
                    pattern,
                    methods: endpoint
                        .methods
                        .iter()
                        .filter_map(|method| parse_method(method))
                        .collect(),
                }),
                Err(e) => {
                    log::warn!("Ignoring capability path {}: {}", endpoint.path, e);
                    None
                }
            })
            .collect();

        Self { capabilities }
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// True when the capability set is empty, or some listed path matches
    /// the endpoint path and lists its method
    pub fn is_supported(&self, endpoint: &Endpoint) -> bool {
        if self.capabilities.is_empty() {
            return true;
        }

        let path = endpoint.path();
        self.capabilities
            .iter()
            .any(|capability| capability.pattern.is_match(path) && capability.methods.contains(&endpoint.method))
    }

    /// Capability check with the exemption set applied
    pub fn should_attempt(&self, endpoint: &Endpoint) -> bool {
        is_exempt(endpoint.path()) || self.is_supported(endpoint)
    }

    /// Fetch and compile the capability document from `<url>/`.
    ///
    /// Discovery failures yield a matcher that allows everything.
    pub async fn discover(transport: &dyn HttpTransport, url: &str) -> Self {
        let capabilities_url = match build_url(url, "/") {
            Ok(capabilities_url) => capabilities_url,
            Err(e) => {
                log::warn!("Cannot build capabilities url from {}: {}", url, e);
                return Self::allow_all();
            }
        };

        let response = match transport.execute(&HttpRequest::new(HttpMethod::GET, capabilities_url.clone())).await {
            Ok(response) => response,
            Err(e) => {
                log::warn!("Failed to load backend capabilities from {}: {}", capabilities_url, e);
                return Self::allow_all();
            }
        };

        match serde_json::from_slice::<CapabilityDocument>(&response.body) {
            Ok(document) => {
                let matcher = Self::from_document(&document);
                log::info!("Loaded {} capability paths from {}", matcher.len(), capabilities_url);
                matcher
            }
            Err(e) => {
                log::warn!("Capability document at {} rejected: {}", capabilities_url, e);
                Self::allow_all()
            }
        }
    }
}

pub fn is_exempt(path: &str) -> bool {
    EXEMPT_PATHS.contains(&path)
}

/// Compile a published path into an anchored regex; every `{param}`
/// segment matches exactly one non-empty path segment
pub fn compile_path_pattern(path: &str) -> Result<Regex, regex::Error> {
    let placeholder = Regex::new(r"\{[^{}]*\}")?;

    let mut pattern = String::from("^");
    let mut last = 0;
    for found in placeholder.find_iter(path) {
        pattern.push_str(&regex::escape(&path[last..found.start()]));
        pattern.push_str("[^/]+");
        last = found.end();
    }
    pattern.push_str(&regex::escape(&path[last..]));
    pattern.push('$');

    Regex::new(&pattern)
}

fn parse_method(method: &str) -> Option<HttpMethod> {
    match method.trim().to_ascii_uppercase().as_str() {
        "GET" => Some(HttpMethod::GET),
        "POST" => Some(HttpMethod::POST),
        "PUT" => Some(HttpMethod::PUT),
        "PATCH" => Some(HttpMethod::PATCH),
        "DELETE" => Some(HttpMethod::DELETE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn matcher(entries: &[(&str, &[&str])]) -> CapabilityMatcher {
        CapabilityMatcher::from_document(&CapabilityDocument {
            endpoints: entries
                .iter()
                .map(|(path, methods)| CapabilityEndpoint {
                    path: path.to_string(),
                    methods: methods.iter().map(|m| m.to_string()).collect(),
                })
                .collect(),
        })
    }

    #[test]
    fn test_empty_capabilities_allow_everything() {
        let endpoint = Endpoint::new("anything", "/whatever/else", HttpMethod::DELETE);
        assert!(CapabilityMatcher::allow_all().is_supported(&endpoint));
    }

    #[test]
    fn test_parameter_segment_matches_exactly_one_segment() {
        let matcher = matcher(&[("/jobs/{job_id}", &["GET", "PATCH"])]);

        assert!(matcher.is_supported(&Endpoint::new("a", "/jobs/j-1", HttpMethod::GET)));
        assert!(matcher.is_supported(&Endpoint::new("b", "/jobs/j-1", HttpMethod::PATCH)));
        assert!(!matcher.is_supported(&Endpoint::new("c", "/jobs/j-1/results", HttpMethod::GET)));
        assert!(!matcher.is_supported(&Endpoint::new("d", "/jobs/", HttpMethod::GET)));
        assert!(!matcher.is_supported(&Endpoint::new("e", "/jobs/j-1", HttpMethod::DELETE)));
    }

    #[test]
    fn test_query_is_ignored_when_matching() {
        let matcher = matcher(&[("/collections", &["GET"])]);
        assert!(matcher.is_supported(&Endpoint::new("c", "/collections?limit=2", HttpMethod::GET)));
    }

    #[test]
    fn test_literal_characters_are_escaped() {
        let matcher = matcher(&[("/files.json", &["GET"])]);
        assert!(!matcher.is_supported(&Endpoint::new("f", "/filesXjson", HttpMethod::GET)));
    }

    #[test]
    fn test_exempt_paths_bypass_a_restrictive_set() {
        let matcher = matcher(&[("/collections", &["GET"])]);

        assert!(matcher.should_attempt(&Endpoint::new("root", "/", HttpMethod::GET)));
        assert!(matcher.should_attempt(&Endpoint::new("wk", "/.well-known/openeo", HttpMethod::GET)));
        assert!(!matcher.should_attempt(&Endpoint::new("jobs", "/jobs", HttpMethod::GET)));
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let result = serde_json::from_str::<CapabilityDocument>(
            r#"{"endpoints": [{"path": "/", "methods": ["GET"]}], "title": "x"}"#,
        );
        assert!(result.is_err());
    }

    proptest! {
        #[test]
        fn prop_parameter_never_spans_segments(first in "[a-z0-9]{1,8}", second in "[a-z0-9]{1,8}") {
            let pattern = compile_path_pattern("/jobs/{job_id}").unwrap();
            let single = format!("/jobs/{}", first);
            let double = format!("/jobs/{}/{}", first, second);
            prop_assert!(pattern.is_match(&single));
            prop_assert!(!pattern.is_match(&double));
        }
    }
}
