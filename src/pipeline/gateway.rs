//! Completion Gateway: the single external capability the pipeline needs.
//!
//! The orchestrator and Pass Executor only ever see [`CompletionGateway`]:
//! "send role-tagged messages with generation parameters, get text back or an
//! explicit failure". [`LlmGateway`] adapts an `edgequake_llm` provider to
//! that contract and owns everything provider-specific: model selection,
//! the per-call deadline, and transient retries.
//!
//! ## Retry Strategy
//!
//! Retries happen here, inside one logical gateway call, never in the
//! orchestrator. With 500 ms base and 2 retries the wait sequence is
//! 500 ms → 1 s. Only errors `edgequake_llm` marks as retryable are
//! retried. A timeout on the final attempt surfaces as
//! [`CompletionError::Timeout`].
//!
//! ## Error Mapping
//!
//! | `LlmError`                                                   | [`CompletionError`] |
//! |--------------------------------------------------------------|---------------------|
//! | `NetworkError`, `Timeout`, `SerializationError`, `Unknown`    | `Exception`         |
//! | anything else (API, auth, rate limit, invalid request, …)     | `Failed`            |
//! | per-call deadline elapsed                                     | `Timeout`           |

use crate::error::CompletionError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, LlmError, ProviderFactory};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// A role-tagged chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Generation parameters for one completion call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub model: String,
    pub max_tokens: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            model: "gpt-4.1-mini".to_string(),
            // Passes return the whole document, so the output budget has to
            // cover a full manuscript plus markup.
            max_tokens: 16384,
            temperature: Some(0.2),
            top_p: Some(1.0),
            frequency_penalty: Some(0.0),
            presence_penalty: Some(0.0),
        }
    }
}

/// Send a structured chat-style prompt, get back text or a failure.
///
/// Implementations must be `Send + Sync`: a host may run several independent
/// submissions against one gateway concurrently.
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    async fn complete(
        &self,
        messages: &[Message],
        params: &GenerationParams,
    ) -> Result<String, CompletionError>;
}

/// Where [`LlmGateway`] gets providers from.
enum ProviderSource {
    /// One pre-built provider; the per-pass model id is informational.
    Fixed(Arc<dyn LLMProvider>),
    /// A provider family; one provider is created per model id and cached.
    Named {
        name: String,
        cache: Mutex<HashMap<String, Arc<dyn LLMProvider>>>,
    },
}

/// [`CompletionGateway`] backed by `edgequake_llm`.
pub struct LlmGateway {
    source: ProviderSource,
    call_timeout: Duration,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl LlmGateway {
    /// Use a provider the caller already configured.
    pub fn with_provider(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            source: ProviderSource::Fixed(provider),
            call_timeout: Duration::from_secs(60),
            max_retries: 2,
            retry_backoff_ms: 500,
        }
    }

    /// Create providers on demand via `ProviderFactory`, one per model id.
    pub fn named(provider_name: impl Into<String>) -> Self {
        Self {
            source: ProviderSource::Named {
                name: provider_name.into(),
                cache: Mutex::new(HashMap::new()),
            },
            call_timeout: Duration::from_secs(60),
            max_retries: 2,
            retry_backoff_ms: 500,
        }
    }

    pub fn call_timeout(mut self, secs: u64) -> Self {
        self.call_timeout = Duration::from_secs(secs.max(1));
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.retry_backoff_ms = ms;
        self
    }

    /// Create (and cache) the provider for `model` without making a call.
    ///
    /// Lets callers surface a missing API key before the first pass runs.
    pub fn preload(&self, model: &str) -> Result<(), CompletionError> {
        self.provider_for(model).map(|_| ())
    }

    fn provider_for(&self, model: &str) -> Result<Arc<dyn LLMProvider>, CompletionError> {
        match &self.source {
            ProviderSource::Fixed(provider) => Ok(Arc::clone(provider)),
            ProviderSource::Named { name, cache } => {
                let mut cache = cache
                    .lock()
                    .map_err(|_| CompletionError::Exception("provider cache poisoned".into()))?;
                if let Some(provider) = cache.get(model) {
                    return Ok(Arc::clone(provider));
                }
                let provider = ProviderFactory::create_llm_provider(name, model).map_err(|e| {
                    CompletionError::Exception(format!("cannot create provider '{name}' for model '{model}': {e}"))
                })?;
                cache.insert(model.to_string(), Arc::clone(&provider));
                Ok(provider)
            }
        }
    }
}

#[async_trait]
impl CompletionGateway for LlmGateway {
    async fn complete(
        &self,
        messages: &[Message],
        params: &GenerationParams,
    ) -> Result<String, CompletionError> {
        let provider = self.provider_for(&params.model)?;
        let chat = to_chat_messages(messages);
        let options = build_options(params);
        let start = Instant::now();

        let (provider, chat, options) = (&provider, &chat, &options);
        let model = params.model.as_str();
        let text = self
            .call_with_retry(model, move || async move {
                provider.chat(chat, Some(options)).await.map(|response| {
                    debug!(
                        "model {}: {} input tokens, {} output tokens",
                        model, response.prompt_tokens, response.completion_tokens
                    );
                    response.content
                })
            })
            .await?;

        debug!("model {}: completed in {:?}", model, start.elapsed());
        Ok(text)
    }
}

impl LlmGateway {
    /// Run `attempt` under the per-call deadline, retrying transient errors
    /// with exponential backoff.
    ///
    /// Errors the provider classifies as permanent (auth, invalid request,
    /// unknown model, content policy) end the loop on the first attempt.
    async fn call_with_retry<F, Fut>(&self, model: &str, attempt: F) -> Result<String, CompletionError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<String, LlmError>>,
    {
        let mut last_err = CompletionError::Exception("no attempt made".into());

        for n in 0..=self.max_retries {
            if n > 0 {
                let backoff = self.retry_backoff_ms * 2u64.pow(n - 1);
                warn!("model {}: retry {}/{} after {}ms", model, n, self.max_retries, backoff);
                sleep(Duration::from_millis(backoff)).await;
            }

            match timeout(self.call_timeout, attempt()).await {
                Ok(Ok(text)) => return Ok(text),
                Ok(Err(e)) => {
                    let retryable = e.retry_strategy().should_retry();
                    warn!("model {}: attempt {} failed: {}", model, n + 1, e);
                    last_err = classify(&e);
                    if !retryable {
                        break;
                    }
                }
                Err(_) => {
                    warn!(
                        "model {}: attempt {} timed out after {}s",
                        model,
                        n + 1,
                        self.call_timeout.as_secs()
                    );
                    last_err = CompletionError::Timeout {
                        secs: self.call_timeout.as_secs(),
                    };
                }
            }
        }

        Err(last_err)
    }
}

/// Transport-level errors are exceptions; everything the provider answered
/// with is a failure.
fn classify(err: &LlmError) -> CompletionError {
    match err {
        LlmError::NetworkError { .. }
        | LlmError::Timeout { .. }
        | LlmError::SerializationError { .. }
        | LlmError::Unknown { .. } => CompletionError::Exception(err.to_string()),
        _ => CompletionError::Failed(err.to_string()),
    }
}

fn to_chat_messages(messages: &[Message]) -> Vec<ChatMessage> {
    messages
        .iter()
        .map(|m| match m.role {
            Role::System => ChatMessage::system(m.content.as_str()),
            Role::User => ChatMessage::user(m.content.as_str()),
        })
        .collect()
}

/// Map generation parameters onto `CompletionOptions`.
fn build_options(params: &GenerationParams) -> CompletionOptions {
    CompletionOptions {
        max_tokens: Some(params.max_tokens),
        temperature: params.temperature,
        top_p: params.top_p,
        frequency_penalty: params.frequency_penalty,
        presence_penalty: params.presence_penalty,
        ..Default::default()
    }
}
