use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, Method, Response};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::endpoint::HttpMethod;
use crate::error::TransportError;

/// Bytes of a response body shown in debug logs
const DEBUG_BODY_LIMIT: usize = 1000;

/// Executable HTTP request
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
    pub basic_auth: Option<(String, String)>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout: None,
            basic_auth: None,
        }
    }

    /// Set a header, replacing any previous value of the same name
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn with_basic_auth(mut self, username: &str, password: &str) -> Self {
        self.basic_auth = Some((username.to_string(), password.to_string()));
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Path component of the URL, without query or fragment
    pub fn path(&self) -> &str {
        let end = self.url.find(['?', '#']).unwrap_or(self.url.len());
        let target = &self.url[..end];
        if target.starts_with('/') {
            return target;
        }
        match target.split_once("://") {
            Some((_, rest)) => rest.find('/').map(|pos| &rest[pos..]).unwrap_or("/"),
            None => target,
        }
    }

    /// Query string of the URL, if any
    pub fn query(&self) -> Option<&str> {
        self.url.split_once('?').map(|(_, query)| query)
    }
}

/// Response as seen by the validation pipeline
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HttpResponse {
    pub status_code: u16,
    /// Header names are lower-case
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub duration: Duration,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Seam between the pipeline and the network
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// `reqwest`-backed transport
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = ClientBuilder::new()
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(60))
            .user_agent(format!("{}/{}", crate::NAME, crate::VERSION))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| TransportError::ConnectionFailed(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    fn convert_method(method: HttpMethod) -> Method {
        match method {
            HttpMethod::GET => Method::GET,
            HttpMethod::POST => Method::POST,
            HttpMethod::PUT => Method::PUT,
            HttpMethod::PATCH => Method::PATCH,
            HttpMethod::DELETE => Method::DELETE,
        }
    }

    fn extract_headers(response: &Response) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(value_str) = value.to_str() {
                headers.insert(name.as_str().to_ascii_lowercase(), value_str.to_string());
            }
        }
        headers
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self
            .client
            .request(Self::convert_method(request.method), &request.url);

        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some((username, password)) = &request.basic_auth {
            builder = builder.basic_auth(username, Some(password));
        }

        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        log_request(request);

        let start_time = Instant::now();
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout {
                    timeout: request.timeout.unwrap_or_default(),
                }
            } else if e.is_connect() {
                TransportError::ConnectionFailed(e.to_string())
            } else if e.is_builder() {
                TransportError::InvalidUrl(e.to_string())
            } else {
                TransportError::NetworkError(e.to_string())
            }
        })?;

        let status_code = response.status().as_u16();
        let headers = Self::extract_headers(&response);
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::NetworkError(format!("Failed to read response body: {}", e)))?
            .to_vec();

        let response = HttpResponse {
            status_code,
            headers,
            body,
            duration: start_time.elapsed(),
        };
        log_response(&response);

        Ok(response)
    }
}

fn log_request(request: &HttpRequest) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    log::debug!("---Request---");
    log::debug!("URL: {}", request.url);
    log::debug!("Method: {}", request.method);
    log::debug!("Header: {:?}", request.headers);
    match &request.body {
        Some(body) => log::debug!("Body: {}", String::from_utf8_lossy(body)),
        None => log::debug!("Body: Empty"),
    }
}

fn log_response(response: &HttpResponse) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    log::debug!("---Response---");
    log::debug!("Status Code: {} after {:?}", response.status_code, response.duration);
    log::debug!("Header: {:?}", response.headers);
    if response.body.is_empty() {
        log::debug!("Body: Empty");
    } else if response.body.len() < DEBUG_BODY_LIMIT {
        log::debug!("Body (length {}): {}", response.body.len(), response.body_text());
    } else {
        log::debug!(
            "Body (length {}): {:?}...",
            response.body.len(),
            String::from_utf8_lossy(&response.body[..DEBUG_BODY_LIMIT])
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_header_replaces_case_insensitively() {
        let mut request = HttpRequest::new(HttpMethod::POST, "https://b.example/jobs");
        request.set_header("Content-Type", "application/json");
        request.set_header("content-type", "application/geo+json");

        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.header("CONTENT-TYPE"), Some("application/geo+json"));
    }

    #[test]
    fn test_request_path_and_query() {
        let absolute = HttpRequest::new(HttpMethod::GET, "https://b.example/api/collections?limit=1");
        assert_eq!(absolute.path(), "/api/collections");
        assert_eq!(absolute.query(), Some("limit=1"));

        let relative = HttpRequest::new(HttpMethod::GET, "/jobs/j-1");
        assert_eq!(relative.path(), "/jobs/j-1");
        assert_eq!(relative.query(), None);

        let bare = HttpRequest::new(HttpMethod::GET, "https://b.example");
        assert_eq!(bare.path(), "/");
    }

    #[test]
    fn test_request_path_ignores_urls_inside_the_query() {
        let relative = HttpRequest::new(HttpMethod::GET, "/processes?source=https://catalog.example/v1/items");
        assert_eq!(relative.path(), "/processes");
        assert_eq!(relative.query(), Some("source=https://catalog.example/v1/items"));

        let absolute = HttpRequest::new(
            HttpMethod::GET,
            "https://b.example/api/processes?source=https://catalog.example/v1/items",
        );
        assert_eq!(absolute.path(), "/api/processes");

        let host_only = HttpRequest::new(HttpMethod::GET, "https://b.example?next=https://x.example/a");
        assert_eq!(host_only.path(), "/");
    }

    #[test]
    fn test_response_header_lookup_is_case_insensitive() {
        let response = HttpResponse {
            status_code: 201,
            headers: HashMap::from([("openeo-identifier".to_string(), "j-9".to_string())]),
            ..Default::default()
        };

        assert_eq!(response.header("OpenEO-Identifier"), Some("j-9"));
    }
}
