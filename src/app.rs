use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::api_description::{self, ApiDescriptionError, SchemaValidator};
use crate::auth::{self, BasicCredentials};
use crate::capabilities::CapabilityMatcher;
use crate::configuration::{ConfigurationLoader, EffectiveConfig};
use crate::error::Diagnostic;
use crate::execution::{ExecutionResult, SerialExecutor};
use crate::pipeline::RunContext;
use crate::reporting::Report;
use crate::transport::{HttpTransport, ReqwestTransport};
use crate::variables::VariableStore;

/// Main application orchestrator: discovery, authentication, execution, report
pub struct Application {
    pub config: EffectiveConfig,
    transport: Arc<dyn HttpTransport>,
    executor: SerialExecutor,
}

impl Application {
    pub fn new(config: EffectiveConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            config,
            transport,
            executor: SerialExecutor::default(),
        }
    }

    /// Layer the given config files and set up the `reqwest` transport
    pub async fn from_config_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let config = ConfigurationLoader::load_all(paths)
            .await
            .context("Failed to load configuration")?;
        log::info!(
            "Loaded {} endpoints in {} groups from {} config documents",
            config.endpoint_count(),
            config.groups.len(),
            config.sources.len()
        );

        let transport = ReqwestTransport::new().context("Failed to create HTTP transport")?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    pub fn with_executor(mut self, executor: SerialExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// Resolve the backend URL, discover capabilities, load the API
    /// description and authenticate; none of these failures abort the run
    pub async fn prepare(&self) -> RunContext {
        let transport = self.transport.as_ref();

        let mut backend = self.config.backend.clone();
        backend.resolve_url(transport).await;

        let capabilities = CapabilityMatcher::discover(transport, &backend.url).await;
        let api_source = self.config.api_description.clone().unwrap_or_default();
        let api_description = self.load_api_description(&api_source).await;

        let mut ctx = RunContext::new(backend, self.transport.clone(), api_description);
        ctx.variables = VariableStore::with_values(self.config.variables.clone());
        ctx.auth_url = self.config.auth_url.clone();
        ctx.api_source = api_source;
        ctx.capabilities = capabilities;
        ctx.token = self.authenticate(&ctx).await;
        ctx
    }

    async fn load_api_description(&self, source: &str) -> Result<Arc<dyn SchemaValidator>, ApiDescriptionError> {
        if source.is_empty() {
            log::warn!("No API description configured");
            return Err(ApiDescriptionError::NotFound(String::new()));
        }

        match api_description::load(source, self.transport.as_ref()).await {
            Ok(document) => {
                log::info!(
                    "API description {} (OpenAPI {}, {} paths)",
                    source,
                    document.version(),
                    document.path_count()
                );
                Ok(Arc::new(document))
            }
            Err(e) => {
                log::warn!("Error reading the API description {}: {}", source, e);
                Err(e)
            }
        }
    }

    async fn authenticate(&self, ctx: &RunContext) -> Option<String> {
        let (username, password) = self.config.credentials()?;
        let credentials = BasicCredentials::new(username, password);
        if !credentials.is_complete() {
            return None;
        }

        match auth::authenticate(self.transport.as_ref(), &ctx.backend.url, &ctx.auth_url, &credentials).await {
            Ok(token) => Some(token).filter(|token| !token.is_empty()),
            Err(e) => {
                log::warn!("{}", Diagnostic::from(e));
                None
            }
        }
    }

    /// Execute the plan and build the report
    pub async fn run(&self) -> Result<Report> {
        let mut ctx = self.prepare().await;
        let execution = self.execute(&mut ctx).await;

        log::info!(
            "Run finished: {} endpoints, {} valid",
            execution.endpoint_count(),
            execution.count_state(crate::pipeline::ValidationState::Valid)
        );

        Ok(Report::build(&execution, &ctx.backend, &ctx.api_source))
    }

    pub async fn execute(&self, ctx: &mut RunContext) -> ExecutionResult {
        self.executor.execute(ctx, &self.config.groups).await
    }

    /// Run and write the report to the configured output, or stdout
    pub async fn run_and_report(&self) -> Result<Report> {
        let report = self.run().await?;
        report
            .write(self.config.output.as_deref())
            .await
            .context("Failed to write report")?;
        Ok(report)
    }
}
