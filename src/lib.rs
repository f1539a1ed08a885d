//! API Conformance Runner - validates a backend against an API description
//!
//! A declarative, layered endpoint plan is executed group by group against a
//! backend. Every endpoint runs through a validation pipeline (capability
//! filter, request validation, execution, response validation) and ends in one
//! of a fixed set of states, which are rolled up into a JSON report.

pub mod error;
pub mod variables;
pub mod endpoint;
pub mod configuration;
pub mod backend;
pub mod capabilities;
pub mod transport;
pub mod auth;
pub mod api_description;
pub mod request_builder;
pub mod pipeline;
pub mod execution;
pub mod reporting;
pub mod cli;
pub mod app;

// Re-export commonly used types
pub use error::{ConformanceError, Diagnostic, EndpointError, TransportError, Result};
pub use variables::VariableStore;
pub use endpoint::{Endpoint, EndpointGroup, HttpMethod};
pub use configuration::{ConfigDocument, ConfigurationLoader, EffectiveConfig};
pub use backend::BackendTarget;
pub use capabilities::CapabilityMatcher;
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use api_description::{OpenApiDocument, RouteMatch, SchemaValidator};
pub use pipeline::{RunContext, ValidationResult, ValidationState};
pub use execution::{ExecutionResult, RetryPolicy, SerialExecutor};
pub use reporting::{Report, ReportingError};
pub use app::Application;

/// Version information for the conformance runner
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
