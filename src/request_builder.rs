//! Turns endpoint definitions into executable requests

use std::io::ErrorKind;

use crate::api_description::SchemaValidator;
use crate::backend::{build_url, BackendTarget};
use crate::endpoint::Endpoint;
use crate::error::EndpointError;
use crate::transport::HttpRequest;

/// Marker of discovery paths, which are always served from the base URL
const WELL_KNOWN_MARKER: &str = ".well-known";

/// Where the built request is meant to go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestTarget {
    /// Path-only request used for API description lookups
    Relative,
    /// Fully qualified request sent to the backend
    Absolute,
}

/// Builds requests for one run; borrows the run's backend, token and validator
pub struct RequestBuilder<'a> {
    backend: &'a BackendTarget,
    token: Option<&'a str>,
    validator: &'a dyn SchemaValidator,
}

impl<'a> RequestBuilder<'a> {
    pub fn new(backend: &'a BackendTarget, token: Option<&'a str>, validator: &'a dyn SchemaValidator) -> Self {
        Self {
            backend,
            token: token.filter(|token| !token.is_empty()),
            validator,
        }
    }

    /// Authorization header value for a held access token
    pub fn bearer(token: &str) -> String {
        format!("Bearer basic//{}", token)
    }

    pub async fn build(&self, endpoint: &Endpoint, target: RequestTarget) -> Result<HttpRequest, EndpointError> {
        let mut request = match target {
            RequestTarget::Relative => HttpRequest::new(endpoint.method, endpoint.url.clone()),
            RequestTarget::Absolute => {
                let well_known = endpoint.url.contains(WELL_KNOWN_MARKER);
                let base = if well_known { &self.backend.base_url } else { &self.backend.url };
                let url = build_url(base, &endpoint.url).map_err(|e| EndpointError::Transport {
                    input: format!("{}  {}", endpoint.method, endpoint.url),
                    detail: e.to_string(),
                })?;
                let request = HttpRequest::new(endpoint.method, url).with_timeout(endpoint.timeout);
                if well_known {
                    return Ok(request);
                }
                request
            }
        };

        if let Some(token) = self.token {
            request.set_header("Authorization", Self::bearer(token));
        }

        let Some(body_path) = endpoint.body.as_deref() else {
            return Ok(request);
        };

        let body = tokio::fs::read(body_path).await.map_err(|e| EndpointError::BodyFile {
            input: endpoint.id.clone(),
            body: body_path.to_string(),
            missing: e.kind() == ErrorKind::NotFound,
            detail: e.to_string(),
        })?;
        request.body = Some(body);

        let route = self
            .validator
            .find_route(endpoint.method, endpoint.path())
            .map_err(|detail| EndpointError::ContentNegotiation {
                input: endpoint.id.clone(),
                url: endpoint.url.clone(),
                method: endpoint.method.to_string(),
                detail,
            })?;

        for content_type in self.validator.request_content_types(&route) {
            request.set_header("Content-Type", content_type);
        }

        Ok(request)
    }
}
