//! API description loading and request/response conformance checks
//!
//! The pipeline only talks to the [`SchemaValidator`] trait; the bundled
//! implementation is [`OpenApiDocument`], an OpenAPI 3.x reader that checks
//! parameters, content types, headers and JSON bodies with `jsonschema`.

pub mod openapi;
pub mod schema;

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;
use thiserror::Error;

use crate::endpoint::HttpMethod;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};

pub use openapi::OpenApiDocument;

/// Errors raised while obtaining an API description
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiDescriptionError {
    #[error("API description not found as file or url: {0}")]
    NotFound(String),

    #[error("Failed to fetch API description: {0}")]
    Fetch(String),

    #[error("Failed to parse API description: {0}")]
    Parse(String),
}

/// Operation of the API description a request was matched to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    /// Path template as written in the description, e.g. `/jobs/{job_id}`
    pub template: String,
    pub method: HttpMethod,
    pub path_params: BTreeMap<String, String>,
}

/// Checks requests and responses against an API description.
///
/// Every check returns a human readable detail on failure.
pub trait SchemaValidator: Send + Sync {
    fn find_route(&self, method: HttpMethod, path: &str) -> Result<RouteMatch, String>;

    fn validate_request(&self, route: &RouteMatch, request: &HttpRequest) -> Result<(), String>;

    fn validate_response(
        &self,
        route: &RouteMatch,
        request: &HttpRequest,
        response: &HttpResponse,
    ) -> Result<(), String>;

    /// Content types declared for the request body of `route`
    fn request_content_types(&self, route: &RouteMatch) -> Vec<String>;
}

/// Load the description from a local file, or fetch it when `source` is a URL
pub async fn load(source: &str, transport: &dyn HttpTransport) -> Result<OpenApiDocument, ApiDescriptionError> {
    match tokio::fs::read_to_string(source).await {
        Ok(content) => {
            log::info!("Reading API description from file {}", source);
            return parse_description(Path::new(source), &content);
        }
        Err(e) => log::debug!("API description is not a readable file ({}), trying url", e),
    }

    let url = url::Url::parse(source).map_err(|_| ApiDescriptionError::NotFound(source.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ApiDescriptionError::NotFound(source.to_string()));
    }

    let response = transport
        .execute(&HttpRequest::new(HttpMethod::GET, url.to_string()))
        .await
        .map_err(|e| ApiDescriptionError::Fetch(format!("{}: {}", source, e)))?;

    if !(200..300).contains(&response.status_code) {
        return Err(ApiDescriptionError::Fetch(format!(
            "{} answered with status {}",
            source, response.status_code
        )));
    }

    log::info!("Reading API description from url {}", source);
    parse_description(Path::new(url.path()), &response.body_text())
}

/// Parse a JSON or YAML description; the extension only decides which
/// format is tried first
pub fn parse_description(path: &Path, content: &str) -> Result<OpenApiDocument, ApiDescriptionError> {
    let yaml_first = matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    );

    let raw: Value = if yaml_first {
        serde_yaml::from_str(content).map_err(|e| ApiDescriptionError::Parse(e.to_string()))?
    } else {
        match serde_json::from_str(content) {
            Ok(raw) => raw,
            Err(json_err) => serde_yaml::from_str(content).map_err(|yaml_err| {
                ApiDescriptionError::Parse(format!("as JSON: {}; as YAML: {}", json_err, yaml_err))
            })?,
        }
    };

    OpenApiDocument::from_value(raw)
}
