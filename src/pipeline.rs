//! Validation pipeline: one attempt at one endpoint, classified into a state

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::api_description::{ApiDescriptionError, SchemaValidator};
use crate::backend::BackendTarget;
use crate::capabilities::CapabilityMatcher;
use crate::endpoint::{Endpoint, HttpMethod};
use crate::error::{Diagnostic, EndpointError};
use crate::request_builder::{RequestBuilder, RequestTarget};
use crate::transport::{HttpResponse, HttpTransport};
use crate::variables::VariableStore;

/// Response header carrying the identifier of a created resource
pub const IDENTIFIER_HEADER: &str = "OpenEO-Identifier";

/// Create calls whose identifier is captured into the variable store
pub const IDENTIFIER_CAPTURES: [(HttpMethod, &str, &str); 2] = [
    (HttpMethod::POST, "/jobs", "job_id"),
    (HttpMethod::POST, "/services", "service_id"),
];

/// Closed set of endpoint outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValidationState {
    Valid,
    Invalid,
    Error,
    Missing,
    NotSupported,
    Retry,
}

impl ValidationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationState::Valid => "Valid",
            ValidationState::Invalid => "Invalid",
            ValidationState::Error => "Error",
            ValidationState::Missing => "Missing",
            ValidationState::NotSupported => "NotSupported",
            ValidationState::Retry => "Retry",
        }
    }
}

impl fmt::Display for ValidationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single attempt
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub state: ValidationState,
    pub diagnostic: Option<Diagnostic>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            state: ValidationState::Valid,
            diagnostic: None,
        }
    }

    pub fn failed(state: ValidationState, error: EndpointError) -> Self {
        Self {
            state,
            diagnostic: Some(error.into()),
        }
    }

    /// Rendered diagnostic, empty on success
    pub fn message(&self) -> String {
        self.diagnostic
            .as_ref()
            .map(|diagnostic| diagnostic.to_string())
            .unwrap_or_default()
    }
}

/// Everything an attempt needs, threaded explicitly through the run
pub struct RunContext {
    pub backend: BackendTarget,
    pub variables: VariableStore,
    pub token: Option<String>,
    pub auth_url: String,
    /// Where the API description was read from, for diagnostics
    pub api_source: String,
    pub api_description: Result<Arc<dyn SchemaValidator>, ApiDescriptionError>,
    pub capabilities: CapabilityMatcher,
    pub transport: Arc<dyn HttpTransport>,
}

impl RunContext {
    pub fn new(
        backend: BackendTarget,
        transport: Arc<dyn HttpTransport>,
        api_description: Result<Arc<dyn SchemaValidator>, ApiDescriptionError>,
    ) -> Self {
        Self {
            backend,
            variables: VariableStore::new(),
            token: None,
            auth_url: crate::configuration::DEFAULT_AUTH_URL.to_string(),
            api_source: String::new(),
            api_description,
            capabilities: CapabilityMatcher::allow_all(),
            transport,
        }
    }

    fn holds_token(&self) -> bool {
        self.token.as_deref().is_some_and(|token| !token.is_empty())
    }
}

enum Outcome {
    /// Credential probe skipped because a token is already held
    Shortcut,
    Executed(HttpResponse),
}

struct Failure {
    state: ValidationState,
    error: EndpointError,
}

impl Failure {
    fn new(state: ValidationState, error: EndpointError) -> Self {
        Self { state, error }
    }
}

/// Run one attempt of `endpoint`, whose templates are already resolved.
///
/// A `Valid` create call stores the returned identifier in the context's
/// variable store.
pub async fn validate(ctx: &mut RunContext, endpoint: &Endpoint) -> ValidationResult {
    log::debug!("====Endpoint {}====", endpoint.id);

    match attempt(ctx, endpoint).await {
        Ok(Outcome::Shortcut) => ValidationResult::valid(),
        Ok(Outcome::Executed(response)) => {
            capture_identifier(&mut ctx.variables, endpoint, &response);
            ValidationResult::valid()
        }
        Err(failure) => ValidationResult::failed(failure.state, failure.error),
    }
}

async fn attempt(ctx: &RunContext, endpoint: &Endpoint) -> Result<Outcome, Failure> {
    if ctx.holds_token() && endpoint.url == ctx.auth_url {
        return Ok(Outcome::Shortcut);
    }

    let validator = match &ctx.api_description {
        Ok(validator) => validator.as_ref(),
        Err(e) => {
            return Err(Failure::new(
                ValidationState::Error,
                EndpointError::ApiDescription {
                    input: ctx.api_source.clone(),
                    detail: e.to_string(),
                },
            ))
        }
    };

    let builder = RequestBuilder::new(&ctx.backend, ctx.token.as_deref(), validator);
    let input = format!("{}  {}", endpoint.method, endpoint.url);

    let relative = builder
        .build(endpoint, RequestTarget::Relative)
        .await
        .map_err(|e| Failure::new(ValidationState::Error, e))?;

    let route = validator.find_route(endpoint.method, relative.path()).map_err(|detail| {
        Failure::new(
            ValidationState::Invalid,
            EndpointError::RouteNotFound {
                input: input.clone(),
                detail,
            },
        )
    })?;

    validator.validate_request(&route, &relative).map_err(|detail| {
        Failure::new(
            ValidationState::Invalid,
            EndpointError::RequestValidation {
                input: input.clone(),
                detail,
            },
        )
    })?;

    let executable = builder
        .build(endpoint, RequestTarget::Absolute)
        .await
        .map_err(|e| Failure::new(ValidationState::Error, e))?;

    let response = ctx.transport.execute(&executable).await.map_err(|e| {
        Failure::new(
            ValidationState::Invalid,
            EndpointError::Transport {
                input: input.clone(),
                detail: e.to_string(),
            },
        )
    })?;

    classify_status(endpoint, executable.header("Authorization").unwrap_or_default(), &response)?;

    validator.validate_response(&route, &relative, &response).map_err(|detail| {
        Failure::new(
            ValidationState::Invalid,
            EndpointError::ResponseValidation { input: String::new(), detail },
        )
    })?;

    Ok(Outcome::Executed(response))
}

/// Map error statuses onto states; success statuses pass through
fn classify_status(endpoint: &Endpoint, authorization: &str, response: &HttpResponse) -> Result<(), Failure> {
    let status = response.status_code;

    if status == 401 {
        return Err(Failure::new(
            ValidationState::Invalid,
            EndpointError::Authentication {
                input: format!("Header Auth: {}", authorization),
                message: "Error: Basic Authentication failed.".to_string(),
                detail: response.body_text(),
            },
        ));
    }

    if !(400..600).contains(&status) {
        return Ok(());
    }

    let body = response.body_text();
    let state = if status == 404 {
        ValidationState::Missing
    } else if endpoint
        .retry_trigger
        .as_deref()
        .is_some_and(|trigger| body.contains(trigger))
    {
        ValidationState::Retry
    } else {
        ValidationState::Error
    };

    Err(Failure::new(
        state,
        EndpointError::HttpStatus {
            input: endpoint.url.clone(),
            status,
            body,
        },
    ))
}

fn capture_identifier(variables: &mut VariableStore, endpoint: &Endpoint, response: &HttpResponse) {
    let Some((_, _, variable)) = IDENTIFIER_CAPTURES
        .iter()
        .find(|(method, path, _)| *method == endpoint.method && *path == endpoint.path())
    else {
        return;
    };

    match response.header(IDENTIFIER_HEADER).filter(|value| !value.is_empty()) {
        Some(identifier) => {
            log::info!("Captured {} = {}", variable, identifier);
            variables.set(*variable, identifier);
        }
        None => log::warn!(
            "Not able to catch the {} from {} {} header via '{}' or empty!",
            variable,
            endpoint.method,
            endpoint.url,
            IDENTIFIER_HEADER
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status_code: status,
            body: body.as_bytes().to_vec(),
            ..Default::default()
        }
    }

    fn state_of(endpoint: &Endpoint, status: u16, body: &str) -> Option<ValidationState> {
        classify_status(endpoint, "", &response(status, body)).err().map(|f| f.state)
    }

    #[test]
    fn test_status_classification() {
        let endpoint = Endpoint::new("jobs", "/jobs", HttpMethod::GET).with_retry_trigger("Try again");

        assert_eq!(state_of(&endpoint, 200, ""), None);
        assert_eq!(state_of(&endpoint, 401, "Try again"), Some(ValidationState::Invalid));
        assert_eq!(state_of(&endpoint, 404, "Try again"), Some(ValidationState::Missing));
        assert_eq!(state_of(&endpoint, 500, "please Try again later"), Some(ValidationState::Retry));
        assert_eq!(state_of(&endpoint, 500, "fatal"), Some(ValidationState::Error));
        assert_eq!(state_of(&endpoint, 400, ""), Some(ValidationState::Error));
    }

    #[test]
    fn test_no_trigger_means_no_retry() {
        let endpoint = Endpoint::new("jobs", "/jobs", HttpMethod::GET);
        assert_eq!(state_of(&endpoint, 503, "anything"), Some(ValidationState::Error));
    }

    #[test]
    fn test_identifier_capture_only_for_create_calls() {
        let mut created = response(201, "");
        created.headers = HashMap::from([("openeo-identifier".to_string(), "j-7".to_string())]);

        let mut variables = VariableStore::new();
        capture_identifier(&mut variables, &Endpoint::new("list", "/jobs", HttpMethod::GET), &created);
        assert!(variables.is_empty());

        capture_identifier(&mut variables, &Endpoint::new("create", "/jobs", HttpMethod::POST), &created);
        assert_eq!(variables.get("job_id"), Some("j-7"));

        capture_identifier(
            &mut variables,
            &Endpoint::new("service", "/services", HttpMethod::POST),
            &response(201, ""),
        );
        assert_eq!(variables.get("service_id"), None);
    }

    #[test]
    fn test_result_message_is_empty_on_success() {
        assert_eq!(ValidationResult::valid().message(), "");
        assert_eq!(ValidationState::NotSupported.to_string(), "NotSupported");
    }
}
