use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern compiles"));

/// Fatal errors that abort a conformance run
#[derive(Error, Debug)]
pub enum ConformanceError {
    #[error("Configuration error in {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("Cyclic parent reference in configuration: {path}")]
    CyclicConfig { path: PathBuf },

    #[error("No config file or backend url specified")]
    NoBackendUrl,
}

/// Errors that end a single endpoint attempt without aborting the run
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EndpointError {
    #[error("Error finding endpoint in the OpenAPI definition: {detail}")]
    RouteNotFound { input: String, detail: String },

    #[error("Error validating the request: {detail}")]
    RequestValidation { input: String, detail: String },

    #[error("Response of the back end not valid: {detail}")]
    ResponseValidation { input: String, detail: String },

    #[error("Error sending request to back end: {detail}")]
    Transport { input: String, detail: String },

    #[error("Body file error for {body}: {detail}")]
    BodyFile { input: String, body: String, missing: bool, detail: String },

    #[error("Error setting correct content-type for url {url} and method {method}: {detail}")]
    ContentNegotiation { input: String, url: String, method: String, detail: String },

    #[error("Error reading the API description: {detail}")]
    ApiDescription { input: String, detail: String },

    #[error("Response Code {status}")]
    HttpStatus { input: String, status: u16, body: String },

    #[error("Authentication failed: {detail}")]
    Authentication { input: String, message: String, detail: String },
}

/// Transport-level failures reported by an `HttpTransport`
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Network error: {0}")]
    NetworkError(String),
}

/// Structured diagnostic attached to a non-valid endpoint result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub input: String,
    pub message: String,
    pub detail: String,
}

impl Diagnostic {
    pub fn new(input: impl Into<String>, message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            message: message.into(),
            detail: detail.into(),
        }
    }

    /// Detail with newlines dropped, double quotes swapped for single quotes
    /// and whitespace runs collapsed, so it embeds cleanly in the report
    pub fn normalized_detail(&self) -> String {
        let flattened = self.detail.replace('\n', "").replace('"', "'");
        WHITESPACE_RUN.replace_all(&flattened, " ").into_owned()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Input: {}; Error: {}; Details: {}",
            self.input,
            self.message,
            self.normalized_detail()
        )
    }
}

impl From<EndpointError> for Diagnostic {
    fn from(err: EndpointError) -> Self {
        match err {
            EndpointError::RouteNotFound { input, detail } => {
                Diagnostic::new(input, "Error finding endpoint in the OpenAPI definition", detail)
            }
            EndpointError::RequestValidation { input, detail } => {
                Diagnostic::new(input, "Error validating the request", detail)
            }
            EndpointError::ResponseValidation { input, detail } => {
                Diagnostic::new(input, "Response of the back end not valid", detail)
            }
            EndpointError::Transport { input, detail } => {
                Diagnostic::new(input, "Error sending request to back end", detail)
            }
            EndpointError::BodyFile { input, body, missing, detail } => {
                let message = if missing {
                    format!("Body was set in config file, but the file does not exist: {}", body)
                } else {
                    format!("Error loading body file: {}", body)
                };
                Diagnostic::new(input, message, detail)
            }
            EndpointError::ContentNegotiation { input, url, method, detail } => Diagnostic::new(
                input,
                format!("Error setting correct content-type for url {} and method {}", url, method),
                detail,
            ),
            EndpointError::ApiDescription { input, detail } => Diagnostic::new(
                input,
                "Error reading the API description, neither file nor url found",
                detail,
            ),
            EndpointError::HttpStatus { input, status, body } => {
                Diagnostic::new(input, format!("Response Code {}", status), body)
            }
            EndpointError::Authentication { input, message, detail } => Diagnostic::new(input, message, detail),
        }
    }
}

/// Result type alias for fatal operations
pub type Result<T> = std::result::Result<T, ConformanceError>;
