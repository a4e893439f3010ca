//! Configuration for annotation runs.
//!
//! All run behaviour is controlled through [`AnnotateConfig`], built via its
//! [`AnnotateConfigBuilder`]. The config is cheap to clone and holds no
//! per-run state, so one config can drive many concurrent submissions.

use crate::error::AnnotateError;
use crate::passes::PassPlan;
use crate::pipeline::gateway::CompletionGateway;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Configuration for annotating manuscripts.
///
/// # Example
/// ```rust
/// use manuscript_annotate::AnnotateConfig;
///
/// let config = AnnotateConfig::builder()
///     .model("gpt-4.1")
///     .api_timeout_secs(120)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct AnnotateConfig {
    /// Pre-built completion gateway. Takes precedence over every provider
    /// setting; this is how tests and hosts inject their own transport.
    pub gateway: Option<Arc<dyn CompletionGateway>>,

    /// Pre-constructed LLM provider, wrapped in the built-in adapter.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Model id used for every pass instead of the plan's per-pass model.
    pub model: Option<String>,

    /// Ordered pass plan. Default: [`PassPlan::builtin`].
    pub plan: PassPlan,

    /// Per-call deadline enforced by the gateway adapter. Default: 60.
    ///
    /// Every pass returns the whole document, so a long manuscript on a slow
    /// model needs far more than a chat reply would.
    pub api_timeout_secs: u64,

    /// Transient retries inside one gateway call. Default: 2.
    ///
    /// The orchestrator itself never retries a step.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubling per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Independent submissions processed at once in batch mode. Default: 4.
    pub concurrency: usize,

    /// Keep a copy of the document after every step in the output trail.
    /// Default: false.
    pub keep_snapshots: bool,

    /// Progress events sink. Default: none.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AnnotateConfig {
    fn default() -> Self {
        Self {
            gateway: None,
            provider: None,
            provider_name: None,
            model: None,
            plan: PassPlan::builtin(),
            api_timeout_secs: 60,
            max_retries: 2,
            retry_backoff_ms: 500,
            download_timeout_secs: 120,
            concurrency: 4,
            keep_snapshots: false,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AnnotateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnotateConfig")
            .field("gateway", &self.gateway.as_ref().map(|_| "<dyn CompletionGateway>"))
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("plan", &self.plan.version)
            .field("steps", &self.plan.steps.len())
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("concurrency", &self.concurrency)
            .field("keep_snapshots", &self.keep_snapshots)
            .finish()
    }
}

impl AnnotateConfig {
    /// Create a new builder for `AnnotateConfig`.
    pub fn builder() -> AnnotateConfigBuilder {
        AnnotateConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`AnnotateConfig`].
#[derive(Debug)]
pub struct AnnotateConfigBuilder {
    config: AnnotateConfig,
}

impl AnnotateConfigBuilder {
    pub fn gateway(mut self, gateway: Arc<dyn CompletionGateway>) -> Self {
        self.config.gateway = Some(gateway);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn plan(mut self, plan: PassPlan) -> Self {
        self.config.plan = plan;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn keep_snapshots(mut self, v: bool) -> Self {
        self.config.keep_snapshots = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnnotateConfig, AnnotateError> {
        let c = &self.config;
        c.plan.validate()?;
        if c.api_timeout_secs == 0 {
            return Err(AnnotateError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(AnnotateError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if let Some(model) = &c.model {
            if model.trim().is_empty() {
                return Err(AnnotateError::InvalidConfig("Model id must not be empty".into()));
            }
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = AnnotateConfig::default();
        assert_eq!(c.api_timeout_secs, 60);
        assert_eq!(c.max_retries, 2);
        assert_eq!(c.concurrency, 4);
        assert!(!c.keep_snapshots);
        assert_eq!(c.plan, PassPlan::builtin());
    }

    #[test]
    fn builder_clamps_concurrency() {
        let c = AnnotateConfig::builder().concurrency(0).build().unwrap();
        assert_eq!(c.concurrency, 1);
    }

    #[test]
    fn zero_timeout_rejected() {
        let err = AnnotateConfig::builder().api_timeout_secs(0).build().unwrap_err();
        assert!(matches!(err, AnnotateError::InvalidConfig(_)));
    }

    #[test]
    fn invalid_plan_rejected() {
        let plan = PassPlan {
            version: "empty".into(),
            steps: vec![],
        };
        let err = AnnotateConfig::builder().plan(plan).build().unwrap_err();
        assert!(matches!(err, AnnotateError::InvalidPlan(_)));
    }

    #[test]
    fn debug_hides_provider_objects() {
        let s = format!("{:?}", AnnotateConfig::default());
        assert!(s.contains("builtin-9"), "got: {s}");
    }
}
