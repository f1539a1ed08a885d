//! Endpoint plan model and per-group scheduling order

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::variables::VariableStore;

/// Group assigned to endpoints that do not name one
pub const DEFAULT_GROUP: &str = "nogroup";

/// HTTP methods an endpoint can be probed with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HttpMethod {
    #[default]
    GET,
    POST,
    PUT,
    PATCH,
    DELETE,
}

impl HttpMethod {
    /// Map a configured request type onto a method; anything unrecognised is GET
    pub fn from_request_type(request_type: &str) -> Self {
        match request_type.trim().to_ascii_uppercase().as_str() {
            "POST" => HttpMethod::POST,
            "PUT" => HttpMethod::PUT,
            "PATCH" => HttpMethod::PATCH,
            "DELETE" => HttpMethod::DELETE,
            _ => HttpMethod::GET,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::DELETE => "DELETE",
        }
    }

    /// Lower-case operation key used by OpenAPI path items
    pub fn operation_key(&self) -> &'static str {
        match self {
            HttpMethod::GET => "get",
            HttpMethod::POST => "post",
            HttpMethod::PUT => "put",
            HttpMethod::PATCH => "patch",
            HttpMethod::DELETE => "delete",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declared API operation to probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: String,
    /// Path template, may contain `{name}` placeholders
    pub url: String,
    pub method: HttpMethod,
    /// Path to a request body payload on disk
    pub body: Option<String>,
    pub group: String,
    /// Explicit priority; 0 means unordered and sorts after every explicit order
    pub order: i64,
    pub optional: bool,
    pub timeout: Option<Duration>,
    /// Pause after the endpoint finished, whatever its outcome
    pub wait: Duration,
    /// Substring of an error body that marks the failure as transient
    pub retry_trigger: Option<String>,
}

impl Endpoint {
    pub fn new(id: impl Into<String>, url: impl Into<String>, method: HttpMethod) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            method,
            body: None,
            group: DEFAULT_GROUP.to_string(),
            order: 0,
            optional: false,
            timeout: None,
            wait: Duration::ZERO,
            retry_trigger: None,
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn with_order(mut self, order: i64) -> Self {
        self.order = order;
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_retry_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.retry_trigger = Some(trigger.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Copy with `url` and `body` placeholders resolved against `variables`
    pub fn resolve(&self, variables: &VariableStore) -> Endpoint {
        let mut resolved = self.clone();
        resolved.url = variables.resolve(&self.url);
        resolved.body = self.body.as_deref().map(|body| variables.resolve(body));
        resolved
    }

    /// URL without its query string
    pub fn path(&self) -> &str {
        match self.url.split_once('?') {
            Some((path, _)) => path,
            None => &self.url,
        }
    }

    /// Sort key placing explicit orders first, ascending, and unordered last
    pub fn schedule_key(&self) -> (bool, i64) {
        (self.order == 0, self.order)
    }
}

/// Named, ordered set of endpoints sharing execution context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointGroup {
    pub name: String,
    pub endpoints: Vec<Endpoint>,
}

impl EndpointGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoints: Vec::new(),
        }
    }

    /// Stable sort by priority; ties keep their first-seen position
    pub fn schedule(&mut self) {
        self.endpoints.sort_by_key(Endpoint::schedule_key);
    }

    pub fn scheduled(mut self) -> Self {
        self.schedule();
        self
    }
}

/// Append `endpoint` to its group, creating the group in first-seen order
pub fn push_into_groups(groups: &mut Vec<EndpointGroup>, endpoint: Endpoint) {
    match groups.iter_mut().find(|group| group.name == endpoint.group) {
        Some(group) => group.endpoints.push(endpoint),
        None => {
            let mut group = EndpointGroup::new(endpoint.group.clone());
            group.endpoints.push(endpoint);
            groups.push(group);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ids(group: &EndpointGroup) -> Vec<&str> {
        group.endpoints.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_request_type_mapping() {
        assert_eq!(HttpMethod::from_request_type("POST"), HttpMethod::POST);
        assert_eq!(HttpMethod::from_request_type("patch"), HttpMethod::PATCH);
        assert_eq!(HttpMethod::from_request_type(""), HttpMethod::GET);
        assert_eq!(HttpMethod::from_request_type("HEAD"), HttpMethod::GET);
    }

    #[test]
    fn test_unordered_endpoints_sort_last_and_keep_ties_stable() {
        let mut group = EndpointGroup::new("jobs");
        group.endpoints = vec![
            Endpoint::new("a", "/a", HttpMethod::GET),
            Endpoint::new("b", "/b", HttpMethod::GET).with_order(2),
            Endpoint::new("c", "/c", HttpMethod::GET),
            Endpoint::new("d", "/d", HttpMethod::GET).with_order(1),
            Endpoint::new("e", "/e", HttpMethod::GET).with_order(2),
        ];

        group.schedule();

        assert_eq!(ids(&group), vec!["d", "b", "e", "a", "c"]);
    }

    #[test]
    fn test_groups_keep_first_seen_order() {
        let mut groups = Vec::new();
        push_into_groups(&mut groups, Endpoint::new("x", "/x", HttpMethod::GET).with_group("b"));
        push_into_groups(&mut groups, Endpoint::new("y", "/y", HttpMethod::GET).with_group("a"));
        push_into_groups(&mut groups, Endpoint::new("z", "/z", HttpMethod::GET).with_group("b"));

        let names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(ids(&groups[0]), vec!["x", "z"]);
    }

    #[test]
    fn test_resolve_touches_url_and_body_only() {
        let mut variables = VariableStore::new();
        variables.set("job_id", "j-1");
        let endpoint = Endpoint::new("{job_id}", "/jobs/{job_id}", HttpMethod::PATCH)
            .with_body("bodies/{job_id}.json");

        let resolved = endpoint.resolve(&variables);

        assert_eq!(resolved.url, "/jobs/j-1");
        assert_eq!(resolved.body.as_deref(), Some("bodies/j-1.json"));
        assert_eq!(resolved.id, "{job_id}");
    }

    #[test]
    fn test_path_strips_query() {
        let endpoint = Endpoint::new("c", "/collections?limit=1", HttpMethod::GET);
        assert_eq!(endpoint.path(), "/collections");
    }

    proptest! {
        #[test]
        fn prop_explicit_orders_precede_unordered(orders in proptest::collection::vec(0i64..5, 1..20)) {
            let mut group = EndpointGroup::new("g");
            group.endpoints = orders
                .iter()
                .enumerate()
                .map(|(i, order)| Endpoint::new(i.to_string(), "/", HttpMethod::GET).with_order(*order))
                .collect();

            group.schedule();

            let first_unordered = group.endpoints.iter().position(|e| e.order == 0);
            if let Some(pos) = first_unordered {
                prop_assert!(group.endpoints[pos..].iter().all(|e| e.order == 0));
            }
            let explicit: Vec<i64> = group.endpoints.iter().filter(|e| e.order != 0).map(|e| e.order).collect();
            let mut sorted = explicit.clone();
            sorted.sort();
            prop_assert_eq!(explicit, sorted);
        }
    }
}
