//! Execution engine
//!
//! Groups run one after another in plan order and endpoints within a group
//! run strictly in schedule order, because later endpoints consume
//! identifiers produced by earlier ones. Each endpoint is wrapped in a bounded
//! retry loop and followed by its configured pause.

use chrono::{DateTime, Local};
use std::time::Duration;
use tokio::time::sleep;

use crate::endpoint::{Endpoint, EndpointGroup};
use crate::pipeline::{self, RunContext, ValidationResult, ValidationState};

/// Message attached to endpoints filtered out by the capability check
pub const NOT_SUPPORTED_MESSAGE: &str = "Endpoint skipped, not listed in backend capabilities";

/// Message attached to optional endpoints whose failure is forgiven
pub const NON_MANDATORY_MESSAGE: &str = "Non-mandatory endpoint, not supported by back-end";

/// Bound and spacing of retry attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Pause between two consecutive attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay: Duration::from_secs(2),
        }
    }
}

/// Final outcome of one endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointResult {
    /// Endpoint as executed, with templates resolved
    pub endpoint: Endpoint,
    pub state: ValidationState,
    pub message: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupResult {
    pub name: String,
    pub endpoints: Vec<EndpointResult>,
}

/// Outcome of a whole run
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub groups: Vec<GroupResult>,
    pub start_time: DateTime<Local>,
    pub end_time: DateTime<Local>,
}

impl ExecutionResult {
    pub fn endpoint_count(&self) -> usize {
        self.groups.iter().map(|group| group.endpoints.len()).sum()
    }

    pub fn count_state(&self, state: ValidationState) -> usize {
        self.groups
            .iter()
            .flat_map(|group| group.endpoints.iter())
            .filter(|result| result.state == state)
            .count()
    }
}

/// Sequential executor with a single worker
#[derive(Debug, Clone, Default)]
pub struct SerialExecutor {
    retry_policy: RetryPolicy,
}

impl SerialExecutor {
    pub fn new(retry_policy: RetryPolicy) -> Self {
        Self { retry_policy }
    }

    pub async fn execute(&self, ctx: &mut RunContext, groups: &[EndpointGroup]) -> ExecutionResult {
        let start_time = Local::now();
        let mut results = Vec::with_capacity(groups.len());

        for group in groups {
            log::info!("Executing group {} ({} endpoints)", group.name, group.endpoints.len());
            let mut endpoints = Vec::with_capacity(group.endpoints.len());
            for endpoint in &group.endpoints {
                endpoints.push(self.execute_endpoint(ctx, endpoint).await);
            }
            results.push(GroupResult {
                name: group.name.clone(),
                endpoints,
            });
        }

        ExecutionResult {
            groups: results,
            start_time,
            end_time: Local::now(),
        }
    }

    /// Resolve, filter, run with retries, then pause for the endpoint's `wait`
    pub async fn execute_endpoint(&self, ctx: &mut RunContext, endpoint: &Endpoint) -> EndpointResult {
        let resolved = endpoint.resolve(&ctx.variables);

        if !ctx.capabilities.should_attempt(&resolved) {
            log::info!("Endpoint {} skipped: {} {} not in capabilities", resolved.id, resolved.method, resolved.url);
            return EndpointResult {
                endpoint: resolved,
                state: ValidationState::NotSupported,
                message: NOT_SUPPORTED_MESSAGE.to_string(),
                attempts: 0,
            };
        }

        let (result, attempts) = self.execute_with_retry(ctx, &resolved).await;

        let (state, message) = match &result.diagnostic {
            Some(_) if resolved.optional => (ValidationState::Valid, NON_MANDATORY_MESSAGE.to_string()),
            _ => (result.state, result.message()),
        };
        log::info!("Endpoint {}: {}", resolved.id, state);

        if !resolved.wait.is_zero() {
            log::debug!("Waiting {:?} after endpoint {}", resolved.wait, resolved.id);
            sleep(resolved.wait).await;
        }

        EndpointResult {
            endpoint: resolved,
            state,
            message,
            attempts,
        }
    }

    /// Re-run the pipeline while it answers `Retry`, up to the policy bound.
    ///
    /// An exhausted bound keeps the last `Retry` result.
    pub async fn execute_with_retry(&self, ctx: &mut RunContext, endpoint: &Endpoint) -> (ValidationResult, u32) {
        let mut attempts = 1;
        let mut result = pipeline::validate(ctx, endpoint).await;

        while result.state == ValidationState::Retry && attempts < self.retry_policy.max_attempts {
            log::info!(
                "Endpoint {} asked for retry ({}/{}), waiting {:?}",
                endpoint.id,
                attempts,
                self.retry_policy.max_attempts,
                self.retry_policy.delay
            );
            sleep(self.retry_policy.delay).await;
            attempts += 1;
            result = pipeline::validate(ctx, endpoint).await;
        }

        (result, attempts)
    }
}
