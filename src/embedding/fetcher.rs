use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::config::RetryConfig;
use crate::embedding::types::{parse_embedding, EmbeddingRequest, EmbeddingVector, EMBEDDING_DIMENSIONS};
use crate::embedding::transport::EmbeddingTransport;
use crate::errors::{JobAlertError, JobAlertResult};

const TOO_MANY_REQUESTS: u16 = 429;

/// Deterministic backoff schedule. Rate limits and transport failures grow
/// exponentially from different bases; server errors wait a fixed delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub rate_limit_base: Duration,
    pub server_error_delay: Duration,
    pub network_error_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            rate_limit_base: Duration::from_millis(cfg.rate_limit_base_ms),
            server_error_delay: Duration::from_millis(cfg.server_error_delay_ms),
            network_error_base: Duration::from_millis(cfg.network_error_base_ms),
        }
    }
}

impl RetryPolicy {
    pub fn rate_limit_delay(&self, attempt: u32) -> Duration {
        self.rate_limit_base.saturating_mul(2u32.saturating_pow(attempt))
    }

    pub fn server_error_delay(&self, _attempt: u32) -> Duration {
        self.server_error_delay
    }

    pub fn network_error_delay(&self, attempt: u32) -> Duration {
        self.network_error_base.saturating_mul(2u32.saturating_pow(attempt))
    }
}

fn millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

/// Fetches embeddings from the remote provider with bounded, strictly sequential retries.
pub struct EmbeddingFetcher {
    transport: Arc<dyn EmbeddingTransport>,
    api_key: Option<String>,
    model: String,
    policy: RetryPolicy,
    cancel: Option<watch::Receiver<bool>>,
}

impl EmbeddingFetcher {
    pub fn new(transport: Arc<dyn EmbeddingTransport>, api_key: Option<String>, model: String) -> Self {
        Self {
            transport,
            api_key,
            model,
            policy: RetryPolicy::default(),
            cancel: None,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// A pending backoff wait aborts with `Cancelled` once the signal flips to `true`.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub async fn fetch_embedding(&self, text: &str) -> JobAlertResult<EmbeddingVector> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| JobAlertError::Config("embedding API key is not configured".into()))?;

        let request = EmbeddingRequest::matching(&self.model, text);
        let max = self.policy.max_attempts;

        for attempt in 1..=max {
            let reply = match self.transport.send(api_key, &request).await {
                Ok(reply) => reply,
                Err(e) if attempt < max => {
                    let delay = self.policy.network_error_delay(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts = max,
                        delay_ms = millis(delay),
                        error = %e,
                        "embedding request failed, retrying"
                    );
                    self.wait(delay).await?;
                    continue;
                }
                Err(e) => {
                    tracing::error!(attempt, error = %e, "embedding request failed, giving up");
                    return Err(e);
                }
            };

            if !reply.is_success() {
                let delay = if attempt >= max {
                    None
                } else if reply.status == TOO_MANY_REQUESTS {
                    Some(self.policy.rate_limit_delay(attempt))
                } else if reply.status >= 500 {
                    Some(self.policy.server_error_delay(attempt))
                } else {
                    None
                };

                match delay {
                    Some(delay) => {
                        tracing::warn!(
                            attempt,
                            max_attempts = max,
                            status = reply.status,
                            delay_ms = millis(delay),
                            "embedding provider returned transient status, retrying"
                        );
                        self.wait(delay).await?;
                        continue;
                    }
                    None => {
                        tracing::error!(attempt, status = reply.status, "embedding provider rejected request");
                        return Err(JobAlertError::ProviderStatus {
                            status: reply.status,
                            body: reply.body,
                        });
                    }
                }
            }

            let vector = parse_embedding(&reply.body, EMBEDDING_DIMENSIONS)?;
            tracing::debug!(attempt, dims = vector.len(), "embedding received");
            return Ok(vector);
        }

        Err(JobAlertError::Provider(
            "embedding request did not complete within the retry budget".into(),
        ))
    }

    async fn wait(&self, delay: Duration) -> JobAlertResult<()> {
        let Some(cancel) = &self.cancel else {
            tokio::time::sleep(delay).await;
            return Ok(());
        };

        let mut cancel = cancel.clone();
        if *cancel.borrow() {
            return Err(JobAlertError::Cancelled);
        }

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        // A dropped sender means nobody can cancel any more; finish the wait.
        let cancelled = tokio::select! {
            _ = &mut sleep => false,
            changed = cancel.wait_for(|c| *c) => changed.is_ok(),
        };

        if cancelled {
            tracing::info!("backoff wait cancelled");
            return Err(JobAlertError::Cancelled);
        }
        if !sleep.is_elapsed() {
            sleep.await;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;

    use tokio::sync::Mutex;
    use tokio::time::Instant;

    use super::*;
    use crate::embedding::types::ProviderReply;

    /// Replays scripted replies in order and records when each call arrived.
    pub(crate) struct ScriptedTransport {
        replies: Mutex<VecDeque<JobAlertResult<ProviderReply>>>,
        calls: Mutex<Vec<(Instant, EmbeddingRequest)>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(replies: Vec<JobAlertResult<ProviderReply>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        pub(crate) async fn call_count(&self) -> usize {
            self.calls.lock().await.len()
        }

        pub(crate) async fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().await.iter().map(|(t, _)| *t).collect()
        }

        pub(crate) async fn inputs(&self) -> Vec<Vec<String>> {
            self.calls.lock().await.iter().map(|(_, r)| r.input.clone()).collect()
        }
    }

    #[async_trait::async_trait]
    impl EmbeddingTransport for ScriptedTransport {
        async fn send(&self, _api_key: &str, request: &EmbeddingRequest) -> JobAlertResult<ProviderReply> {
            self.calls.lock().await.push((Instant::now(), request.clone()));
            self.replies
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Err(JobAlertError::Transport("script exhausted".into())))
        }
    }

    pub(crate) fn ok_body(seed: f32) -> JobAlertResult<ProviderReply> {
        let values: Vec<f32> = (0..EMBEDDING_DIMENSIONS).map(|i| seed + i as f32).collect();
        let body = serde_json::json!({ "data": [ { "embedding": values } ] }).to_string();
        Ok(ProviderReply::new(200, body))
    }

    fn status(code: u16, body: &str) -> JobAlertResult<ProviderReply> {
        Ok(ProviderReply::new(code, body))
    }

    fn network(msg: &str) -> JobAlertResult<ProviderReply> {
        Err(JobAlertError::Transport(msg.into()))
    }

    /// Paused-clock timers land on millisecond ticks; allow rounding slack.
    pub(crate) fn assert_gap(actual: Duration, expected_ms: u64) {
        let expected = Duration::from_millis(expected_ms);
        assert!(
            actual >= expected && actual < expected + Duration::from_millis(5),
            "expected ~{expected:?}, got {actual:?}"
        );
    }

    fn fetcher(transport: &Arc<ScriptedTransport>) -> EmbeddingFetcher {
        EmbeddingFetcher::new(transport.clone(), Some("key".into()), "jina-embeddings-v3".into())
    }

    #[test]
    fn backoff_schedule_matches_formulas() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.rate_limit_delay(1), Duration::from_millis(10_000));
        assert_eq!(policy.rate_limit_delay(2), Duration::from_millis(20_000));
        assert_eq!(policy.server_error_delay(1), Duration::from_millis(5_000));
        assert_eq!(policy.server_error_delay(2), Duration::from_millis(5_000));
        assert_eq!(policy.network_error_delay(1), Duration::from_millis(4_000));
        assert_eq!(policy.network_error_delay(2), Duration::from_millis(8_000));
    }

    #[test]
    fn logged_millis_saturate() {
        assert_eq!(millis(Duration::from_millis(20_000)), 20_000);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn returns_vector_unmodified() {
        let transport = ScriptedTransport::new(vec![ok_body(0.5)]);
        let vector = fetcher(&transport).fetch_embedding("rust").await.unwrap();
        assert_eq!(vector.len(), EMBEDDING_DIMENSIONS);
        assert_eq!(vector.as_slice()[0], 0.5);
        assert_eq!(vector.as_slice()[767], 767.5);
        assert_eq!(transport.call_count().await, 1);
        assert_eq!(transport.inputs().await, vec![vec!["rust".to_string()]]);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_key_fails_without_calls() {
        let transport = ScriptedTransport::new(vec![ok_body(0.0)]);
        for key in [None, Some(String::new()), Some("   ".to_string())] {
            let fetcher = EmbeddingFetcher::new(transport.clone(), key, "m".into());
            let err = fetcher.fetch_embedding("rust").await.unwrap_err();
            assert!(matches!(err, JobAlertError::Config(_)));
        }
        assert_eq!(transport.call_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limits_back_off_exponentially() {
        let transport = ScriptedTransport::new(vec![
            status(429, "slow down"),
            status(429, "slow down"),
            ok_body(1.0),
        ]);
        let vector = fetcher(&transport).fetch_embedding("rust").await.unwrap();
        assert_eq!(vector.as_slice()[0], 1.0);

        let times = transport.call_times().await;
        assert_eq!(times.len(), 3);
        assert_gap(times[1] - times[0], 10_000);
        assert_gap(times[2] - times[1], 20_000);
    }

    #[tokio::test(start_paused = true)]
    async fn server_errors_exhaust_budget() {
        let transport = ScriptedTransport::new(vec![
            status(500, "boom 1"),
            status(502, "boom 2"),
            status(503, "boom 3"),
            ok_body(0.0),
        ]);
        let err = fetcher(&transport).fetch_embedding("rust").await.unwrap_err();
        match err {
            JobAlertError::ProviderStatus { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "boom 3");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let times = transport.call_times().await;
        assert_eq!(times.len(), 3);
        assert_gap(times[1] - times[0], 5_000);
        assert_gap(times[2] - times[1], 5_000);
    }

    #[tokio::test(start_paused = true)]
    async fn last_attempt_rate_limit_is_not_retried() {
        let transport = ScriptedTransport::new(vec![
            status(429, "a"),
            status(429, "b"),
            status(429, "c"),
        ]);
        let err = fetcher(&transport).fetch_embedding("rust").await.unwrap_err();
        assert!(matches!(err, JobAlertError::ProviderStatus { status: 429, .. }));
        assert_eq!(transport.call_count().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn client_errors_are_not_retried() {
        let transport = ScriptedTransport::new(vec![status(401, "bad key"), ok_body(0.0)]);
        let err = fetcher(&transport).fetch_embedding("rust").await.unwrap_err();
        assert!(matches!(
            err,
            JobAlertError::ProviderStatus { status: 401, ref body } if body == "bad key"
        ));
        assert_eq!(transport.call_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dimension_mismatch_is_fatal_on_success_status() {
        let body = serde_json::json!({ "data": [ { "embedding": vec![0.1f32; 512] } ] }).to_string();
        let transport = ScriptedTransport::new(vec![Ok(ProviderReply::new(200, body)), ok_body(0.0)]);
        let err = fetcher(&transport).fetch_embedding("rust").await.unwrap_err();
        assert!(matches!(err, JobAlertError::Provider(_)));
        assert_eq!(transport.call_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn network_errors_use_their_own_backoff() {
        let transport = ScriptedTransport::new(vec![network("reset"), network("refused"), ok_body(2.0)]);
        let vector = fetcher(&transport).fetch_embedding("rust").await.unwrap();
        assert_eq!(vector.as_slice()[0], 2.0);

        let times = transport.call_times().await;
        assert_gap(times[1] - times[0], 4_000);
        assert_gap(times[2] - times[1], 8_000);
    }

    #[tokio::test(start_paused = true)]
    async fn final_network_error_propagates_as_is() {
        let transport = ScriptedTransport::new(vec![network("one"), network("two"), network("three")]);
        let err = fetcher(&transport).fetch_embedding("rust").await.unwrap_err();
        assert!(matches!(err, JobAlertError::Transport(ref m) if m == "three"));
        assert_eq!(transport.call_count().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_aborts_pending_backoff() {
        let transport = ScriptedTransport::new(vec![status(429, "slow"), ok_body(0.0)]);
        let (tx, rx) = watch::channel(false);
        let fetcher = fetcher(&transport).with_cancel(rx);

        let started = Instant::now();
        let (result, _) = tokio::join!(fetcher.fetch_embedding("rust"), async {
            tokio::time::sleep(Duration::from_millis(1_000)).await;
            tx.send(true).unwrap();
        });

        assert!(matches!(result, Err(JobAlertError::Cancelled)));
        assert_gap(started.elapsed(), 1_000);
        assert_eq!(transport.call_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_cancel_sender_still_waits_full_delay() {
        let transport = ScriptedTransport::new(vec![status(500, "x"), ok_body(0.0)]);
        let (tx, rx) = watch::channel(false);
        drop(tx);
        let fetcher = fetcher(&transport).with_cancel(rx);

        fetcher.fetch_embedding("rust").await.unwrap();
        let times = transport.call_times().await;
        assert_gap(times[1] - times[0], 5_000);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_drops_pending_retry() {
        let transport = ScriptedTransport::new(vec![status(429, "slow"), ok_body(0.0)]);
        let fetcher = fetcher(&transport);
        let result = tokio::time::timeout(Duration::from_secs(3), fetcher.fetch_embedding("rust")).await;
        assert!(result.is_err());
        assert_eq!(transport.call_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn single_attempt_policy_never_waits() {
        let transport = ScriptedTransport::new(vec![status(429, "slow"), ok_body(0.0)]);
        let policy = RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        };
        let started = Instant::now();
        let err = fetcher(&transport).with_policy(policy).fetch_embedding("rust").await.unwrap_err();
        assert!(matches!(err, JobAlertError::ProviderStatus { status: 429, .. }));
        assert!(started.elapsed() < Duration::from_millis(1));
    }
}
