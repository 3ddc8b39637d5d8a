use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::capabilities::{ChatCompletion, ChatMessage, ChatModel};
use crate::error::{CoreError, CoreResult};

/// The closed set of task shapes the router selects a model for, per
/// `spec.md` §4.1. `AudioTranscription` is part of the closed set for
/// completeness and usage-stats attribution, but carries no `ChatModel`
/// slot of its own — transcription is a bytes-in/text-out operation, served
/// by the separate [`crate::capabilities::SpeechToText`] capability rather
/// than a chat completion, so it never reaches [`ModelRouter::complete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    RealTimeChat,
    QuickCategorization,
    ComplexReasoning,
    LongContext,
    StructuredOutput,
    Vision,
    ProgramGeneration,
    StreamingFeedback,
    Verification,
    AudioTranscription,
}

/// Which of the two symbolic providers (`spec.md` §4.1: "the provider
/// alphabet is two symbolic providers: fast and accurate") a registered slot
/// member is. Used only to resolve `prioritize_speed`/`prioritize_accuracy`
/// overrides at call time; it plays no role in the failure-set demotion
/// logic, which operates on provider identity alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Fast,
    Accurate,
}

/// One named model slot: a primary provider plus the fallback to demote to
/// when the primary has failed terminally in this process.
struct ModelSlot {
    primary: Option<Arc<dyn ChatModel>>,
    primary_kind: ProviderKind,
    fallback: Option<Arc<dyn ChatModel>>,
    fallback_kind: ProviderKind,
    max_tokens: u32,
    temperature: f32,
}

/// Per-call routing overrides, mirroring `spec.md` §4.1's `TaskConfig`.
/// `requires_json`/`requires_vision` are the caller's responsibility to
/// have already picked a task type whose registered providers satisfy them;
/// the router itself only acts on the speed/accuracy preference, swapping
/// which of the slot's two registered providers is tried first for this call
/// — it never mutates the slot's static registration.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskConfig {
    pub prioritize_speed: bool,
    pub prioritize_accuracy: bool,
}

/// Routes a task to the fast or accurate provider, falling back to the
/// configured secondary once a provider has failed terminally, and tracking
/// usage for observability — all in-process state, no persistence.
///
/// Grounded on the provider-demotion design in the original dual-model
/// router: a failing `provider:model` pair is added to a failure set for the
/// lifetime of the process (or until [`ModelRouter::reset_failures`] is
/// called) so subsequent calls skip straight to the fallback.
pub struct ModelRouter {
    slots: HashMap<TaskType, ModelSlot>,
    failed_models: RwLock<HashSet<String>>,
    usage_stats: RwLock<HashMap<String, u64>>,
}

impl ModelRouter {
    pub fn new() -> Self {
        ModelRouter {
            slots: HashMap::new(),
            failed_models: RwLock::new(HashSet::new()),
            usage_stats: RwLock::new(HashMap::new()),
        }
    }

    /// Register the primary/fallback providers and generation parameters for
    /// a task type. Either provider may be absent — a task with no available
    /// provider fails with `UpstreamUnavailable` rather than panicking.
    #[allow(clippy::too_many_arguments)]
    pub fn register(
        &mut self,
        task: TaskType,
        primary: Option<Arc<dyn ChatModel>>,
        primary_kind: ProviderKind,
        fallback: Option<Arc<dyn ChatModel>>,
        fallback_kind: ProviderKind,
        max_tokens: u32,
        temperature: f32,
    ) {
        self.slots.insert(
            task,
            ModelSlot { primary, primary_kind, fallback, fallback_kind, max_tokens, temperature },
        );
    }

    /// Order a slot's two provider slots by call-time preference: `spec.md`
    /// §4.1's `prioritize_speed`/`prioritize_accuracy` overrides "swap
    /// primary toward fast/accurate if not already; fallback becomes the
    /// previous primary". With no override, or with the slot's primary
    /// already matching the requested kind, the static registration order
    /// holds.
    fn preference_order(slot: &ModelSlot, config: TaskConfig) -> [(&Option<Arc<dyn ChatModel>>, ProviderKind); 2] {
        let want_fast = config.prioritize_speed && !config.prioritize_accuracy;
        let want_accurate = config.prioritize_accuracy && !config.prioritize_speed;

        let primary_already_matches = (want_fast && slot.primary_kind == ProviderKind::Fast)
            || (want_accurate && slot.primary_kind == ProviderKind::Accurate)
            || (!want_fast && !want_accurate);

        if primary_already_matches {
            [(&slot.primary, slot.primary_kind), (&slot.fallback, slot.fallback_kind)]
        } else {
            [(&slot.fallback, slot.fallback_kind), (&slot.primary, slot.primary_kind)]
        }
    }

    /// Select which provider to use for `task` given the current failure
    /// set and `config`'s speed/accuracy preference: the first preferred
    /// slot unless it has already failed terminally, in which case the
    /// other one.
    async fn select(&self, task: TaskType, config: TaskConfig) -> CoreResult<Arc<dyn ChatModel>> {
        let slot = self
            .slots
            .get(&task)
            .ok_or_else(|| CoreError::invalid_input(format!("no model registered for {task:?}")))?;

        let failed = self.failed_models.read().await;

        for (candidate, _kind) in Self::preference_order(slot, config) {
            if let Some(model) = candidate {
                if !failed.contains(model.identity()) {
                    return Ok(model.clone());
                }
            }
        }

        Err(CoreError::UpstreamUnavailable(format!(
            "all providers for {task:?} have failed in this process"
        )))
    }

    /// Classify whether an upstream error should demote its provider for the
    /// remainder of the process, by substring match on the error text —
    /// mirroring the original router's terminal-error detection.
    fn is_terminal_failure(message: &str) -> bool {
        const TERMINAL_MARKERS: &[&str] =
            &["429", "401", "quota", "rate limit", "unauthorized", "user not found"];
        let lowered = message.to_lowercase();
        TERMINAL_MARKERS.iter().any(|marker| lowered.contains(marker))
    }

    async fn record_usage(&self, identity: &str) {
        let mut stats = self.usage_stats.write().await;
        *stats.entry(identity.to_string()).or_insert(0) += 1;
    }

    async fn demote(&self, identity: &str) {
        let mut failed = self.failed_models.write().await;
        failed.insert(identity.to_string());
    }

    /// Complete a chat request for `task` with the default (no speed/accuracy
    /// override) routing preference. See [`ModelRouter::complete_with`].
    pub async fn complete(
        &self,
        task: TaskType,
        messages: &[ChatMessage],
    ) -> CoreResult<ChatCompletion> {
        self.complete_with(task, messages, TaskConfig::default()).await
    }

    /// Complete a chat request for `task`, retrying exactly once against the
    /// next-preferred provider if the first fails terminally. A non-terminal
    /// failure (e.g. a timeout) is surfaced directly without demoting or
    /// retrying — only the caller's own retry policy applies there.
    /// `config.prioritize_speed`/`prioritize_accuracy` swap which of the
    /// slot's two registered providers is tried first for this call, per
    /// `spec.md` §4.1's routing overrides.
    pub async fn complete_with(
        &self,
        task: TaskType,
        messages: &[ChatMessage],
        config: TaskConfig,
    ) -> CoreResult<ChatCompletion> {
        let slot = self
            .slots
            .get(&task)
            .ok_or_else(|| CoreError::invalid_input(format!("no model registered for {task:?}")))?;
        let (max_tokens, temperature) = (slot.max_tokens, slot.temperature);

        let model = self.select(task, config).await?;
        match model.complete(messages, max_tokens, temperature).await {
            Ok(completion) => {
                self.record_usage(model.identity()).await;
                Ok(completion)
            }
            Err(err) if Self::is_terminal_failure(&err.to_string()) => {
                warn!(provider = model.identity(), error = %err, "demoting provider after terminal failure");
                self.demote(model.identity()).await;

                let fallback_model = self.select(task, config).await?;
                if fallback_model.identity() == model.identity() {
                    return Err(err);
                }

                let completion = fallback_model.complete(messages, max_tokens, temperature).await?;
                self.record_usage(fallback_model.identity()).await;
                Ok(completion)
            }
            Err(err) => Err(err),
        }
    }

    /// Usage counts broken down by `provider:model` identity.
    pub async fn usage_stats(&self) -> HashMap<String, u64> {
        self.usage_stats.read().await.clone()
    }

    /// Clear the in-process failure set, allowing previously-demoted
    /// providers to be tried again.
    pub async fn reset_failures(&self) {
        let mut failed = self.failed_models.write().await;
        info!(count = failed.len(), "resetting model router failure set");
        failed.clear();
    }
}

impl Default for ModelRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use futures::stream::BoxStream;

    use super::*;

    /// A `ChatModel` stub that either succeeds with a fixed reply or fails
    /// with a configured error message, counting how many times it's called.
    struct StubModel {
        identity: String,
        fails_with: Option<String>,
        calls: AtomicU32,
    }

    impl StubModel {
        fn ok(identity: &str) -> Arc<Self> {
            Arc::new(StubModel { identity: identity.to_string(), fails_with: None, calls: AtomicU32::new(0) })
        }

        fn failing(identity: &str, message: &str) -> Arc<Self> {
            Arc::new(StubModel {
                identity: identity.to_string(),
                fails_with: Some(message.to_string()),
                calls: AtomicU32::new(0),
            })
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatModel for StubModel {
        fn identity(&self) -> &str {
            &self.identity
        }

        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _max_tokens: u32,
            _temperature: f32,
        ) -> CoreResult<ChatCompletion> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.fails_with {
                Some(msg) => Err(CoreError::UpstreamQuota(msg.clone())),
                None => Ok(ChatCompletion {
                    content: "ok".to_string(),
                    prompt_tokens: 1,
                    completion_tokens: 1,
                    model: self.identity.clone(),
                }),
            }
        }

        async fn complete_stream(
            &self,
            _messages: &[ChatMessage],
            _max_tokens: u32,
            _temperature: f32,
        ) -> CoreResult<BoxStream<'static, CoreResult<String>>> {
            unimplemented!("not exercised by router tests")
        }
    }

    fn messages() -> Vec<ChatMessage> {
        vec![ChatMessage::user("hello")]
    }

    /// Seed scenario 6 (`spec.md` §8): a primary that fails with a
    /// quota error must be called exactly once, the fallback exactly once,
    /// and the primary's identity must land in the failure set afterwards.
    #[tokio::test]
    async fn terminal_failure_falls_back_exactly_once_and_demotes_primary() {
        let mut router = ModelRouter::new();
        let primary = StubModel::failing("fast:A", "quota exceeded");
        let fallback = StubModel::ok("accurate:B");
        router.register(
            TaskType::RealTimeChat,
            Some(primary.clone()),
            ProviderKind::Fast,
            Some(fallback.clone()),
            ProviderKind::Accurate,
            512,
            0.7,
        );

        let result = router.complete(TaskType::RealTimeChat, &messages()).await;
        assert!(result.is_ok());
        assert_eq!(primary.call_count(), 1);
        assert_eq!(fallback.call_count(), 1);

        let failed = router.failed_models.read().await;
        assert!(failed.contains("fast:A"));
    }

    #[tokio::test]
    async fn non_terminal_failure_does_not_demote_or_retry() {
        let mut router = ModelRouter::new();
        let primary = StubModel::failing("fast:A", "connection reset by peer");
        let fallback = StubModel::ok("accurate:B");
        router.register(
            TaskType::RealTimeChat,
            Some(primary.clone()),
            ProviderKind::Fast,
            Some(fallback.clone()),
            ProviderKind::Accurate,
            512,
            0.7,
        );

        let result = router.complete(TaskType::RealTimeChat, &messages()).await;
        assert!(result.is_err());
        assert_eq!(primary.call_count(), 1);
        assert_eq!(fallback.call_count(), 0);

        let failed = router.failed_models.read().await;
        assert!(!failed.contains("fast:A"));
    }

    #[tokio::test]
    async fn prioritize_accuracy_swaps_preference_order() {
        let mut router = ModelRouter::new();
        let fast = StubModel::ok("fast:A");
        let accurate = StubModel::ok("accurate:B");
        router.register(
            TaskType::StructuredOutput,
            Some(fast.clone()),
            ProviderKind::Fast,
            Some(accurate.clone()),
            ProviderKind::Accurate,
            512,
            0.2,
        );

        let config = TaskConfig { prioritize_speed: false, prioritize_accuracy: true };
        let completion = router.complete_with(TaskType::StructuredOutput, &messages(), config).await.unwrap();
        assert_eq!(completion.model, "accurate:B");
        assert_eq!(fast.call_count(), 0);
        assert_eq!(accurate.call_count(), 1);
    }

    #[tokio::test]
    async fn no_registered_provider_is_upstream_unavailable() {
        let router = ModelRouter::new();
        let result = router.complete(TaskType::Vision, &messages()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn reset_failures_allows_primary_to_be_retried() {
        let mut router = ModelRouter::new();
        let primary = StubModel::failing("fast:A", "429 too many requests");
        let fallback = StubModel::ok("accurate:B");
        router.register(
            TaskType::RealTimeChat,
            Some(primary.clone()),
            ProviderKind::Fast,
            Some(fallback.clone()),
            ProviderKind::Accurate,
            512,
            0.7,
        );

        router.complete(TaskType::RealTimeChat, &messages()).await.unwrap();
        assert!(router.failed_models.read().await.contains("fast:A"));

        router.reset_failures().await;
        assert!(!router.failed_models.read().await.contains("fast:A"));
    }
}
