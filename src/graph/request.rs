use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use super::rate_gate::RateGate;
use super::transport::Transport;
use super::{GraphError, GraphResult};
use crate::random::RandomSource;

/// HTTP statuses worth another attempt
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 425 | 429 | 500 | 502 | 503 | 504)
}

/// Exponential backoff with jitter
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Upper bound for any single wait, including `Retry-After`
    pub max_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            max_jitter: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `retry` (0-based). A server supplied
    /// `Retry-After` replaces the computed backoff.
    pub fn delay_for(
        &self,
        retry: u32,
        retry_after: Option<Duration>,
        rng: &RandomSource,
    ) -> Duration {
        let delay = match retry_after {
            Some(wait) => wait,
            None => {
                let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
                self.base_delay.saturating_mul(factor) + rng.jitter(self.max_jitter)
            }
        };
        delay.min(self.max_delay)
    }
}

/// Resilient GET: rate gate, timeout, retry. Knows nothing about the
/// shape of the queries it sends.
pub struct Requester {
    transport: Arc<dyn Transport>,
    gate: RateGate,
    policy: RetryPolicy,
    timeout: Duration,
    rng: Arc<RandomSource>,
}

impl Requester {
    pub fn new(
        transport: Arc<dyn Transport>,
        gate: RateGate,
        policy: RetryPolicy,
        timeout: Duration,
        rng: Arc<RandomSource>,
    ) -> Self {
        Self {
            transport,
            gate,
            policy,
            timeout,
            rng,
        }
    }

    pub fn gate(&self) -> &RateGate {
        &self.gate
    }

    /// Send the query and decode a JSON body, retrying transient failures
    pub async fn get_json<T: DeserializeOwned>(&self, query: &[(String, String)]) -> GraphResult<T> {
        let attempts = self.policy.max_retries + 1;
        let mut last_failure = String::new();

        for attempt in 0..attempts {
            self.gate.acquire().await;

            let outcome = tokio::time::timeout(self.timeout, self.transport.get(query)).await;
            let mut rate_limited = false;
            let retry_after = match outcome {
                Err(_) => {
                    last_failure = format!("timed out after {:?}", self.timeout);
                    None
                }
                Ok(Err(err)) => {
                    last_failure = err.to_string();
                    None
                }
                Ok(Ok(reply)) if reply.is_success() => {
                    return serde_json::from_str(&reply.body)
                        .map_err(|e| GraphError::Malformed(e.to_string()));
                }
                Ok(Ok(reply)) if is_retryable_status(reply.status) => {
                    last_failure = format!("status {}", reply.status);
                    rate_limited = reply.status == 429;
                    reply.retry_after
                }
                Ok(Ok(reply)) => return Err(GraphError::Status(reply.status)),
            };

            if attempt + 1 == attempts {
                break;
            }

            let delay = self.policy.delay_for(attempt, retry_after, &self.rng);
            if rate_limited {
                self.gate.block_for(delay).await;
            }
            tracing::warn!(
                attempt = attempt + 1,
                ?delay,
                failure = %last_failure,
                "Graph request failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }

        Err(GraphError::Unavailable {
            attempts,
            last: last_failure,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::transport::{HttpReply, TransportError};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    enum Step {
        Reply(HttpReply),
        Fail(TransportError),
        Hang,
    }

    /// Plays back a fixed script, then keeps answering 200 `{}`
    struct ScriptedTransport {
        steps: Mutex<VecDeque<Step>>,
        calls: Mutex<u32>,
    }

    impl ScriptedTransport {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn get(&self, _query: &[(String, String)]) -> Result<HttpReply, TransportError> {
            *self.calls.lock().unwrap() += 1;
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(Step::Reply(reply)) => Ok(reply),
                Some(Step::Fail(err)) => Err(err),
                Some(Step::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(TransportError::Timeout)
                }
                None => Ok(HttpReply::ok("{}")),
            }
        }
    }

    fn status(code: u16, retry_after: Option<Duration>) -> Step {
        Step::Reply(HttpReply {
            status: code,
            retry_after,
            body: String::new(),
        })
    }

    fn requester(transport: Arc<ScriptedTransport>) -> Requester {
        Requester::new(
            transport,
            RateGate::new(Duration::from_millis(180)),
            RetryPolicy::default(),
            Duration::from_secs(12),
            Arc::new(RandomSource::seeded(5)),
        )
    }

    #[test]
    fn test_retryable_statuses() {
        for code in [408, 425, 429, 500, 502, 503, 504] {
            assert!(is_retryable_status(code), "{} should retry", code);
        }
        for code in [200, 400, 403, 404, 501] {
            assert!(!is_retryable_status(code), "{} should not retry", code);
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_jitter: Duration::ZERO,
            ..RetryPolicy::default()
        };
        let rng = RandomSource::seeded(1);
        assert_eq!(policy.delay_for(0, None, &rng), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2, None, &rng), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(10, None, &rng), Duration::from_secs(10));
        assert_eq!(
            policy.delay_for(0, Some(Duration::from_secs(3)), &rng),
            Duration::from_secs(3)
        );
        assert_eq!(
            policy.delay_for(0, Some(Duration::from_secs(300)), &rng),
            Duration::from_secs(10)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_try() {
        let transport = ScriptedTransport::new(vec![Step::Reply(HttpReply::ok(r#"{"x": 1}"#))]);
        let req = requester(transport.clone());

        let value: serde_json::Value = req.get_json(&[]).await.unwrap();
        assert_eq!(value["x"], 1);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_failures() {
        let transport = ScriptedTransport::new(vec![
            status(503, None),
            Step::Fail(TransportError::Network("reset".to_string())),
            Step::Reply(HttpReply::ok(r#"{"ok": true}"#)),
        ]);
        let req = requester(transport.clone());

        let value: serde_json::Value = req.get_json(&[]).await.unwrap();
        assert_eq!(value["ok"], true);
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let transport = ScriptedTransport::new((0..10).map(|_| status(502, None)).collect());
        let req = requester(transport.clone());

        let result: GraphResult<serde_json::Value> = req.get_json(&[]).await;
        match result {
            Err(GraphError::Unavailable { attempts, last }) => {
                assert_eq!(attempts, 5);
                assert!(last.contains("502"));
            }
            other => panic!("expected Unavailable, got {:?}", other),
        }
        assert_eq!(transport.calls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_status_fails_immediately() {
        let transport = ScriptedTransport::new(vec![status(403, None)]);
        let req = requester(transport.clone());

        let result: GraphResult<serde_json::Value> = req.get_json(&[]).await;
        assert!(matches!(result, Err(GraphError::Status(403))));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_retried() {
        let transport = ScriptedTransport::new(vec![
            Step::Hang,
            Step::Reply(HttpReply::ok(r#"{"after": "timeout"}"#)),
        ]);
        let req = requester(transport.clone());

        let start = Instant::now();
        let value: serde_json::Value = req.get_json(&[]).await.unwrap();
        assert_eq!(value["after"], "timeout");
        assert!(start.elapsed() >= Duration::from_secs(12));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_429_honors_retry_after_and_blocks_gate() {
        let transport = ScriptedTransport::new(vec![
            status(429, Some(Duration::from_secs(4))),
            Step::Reply(HttpReply::ok("{}")),
        ]);
        let req = requester(transport.clone());

        let start = Instant::now();
        let _: serde_json::Value = req.get_json(&[]).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(4));
        assert!(req.gate().blocked_until().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_body_is_not_retried() {
        let transport = ScriptedTransport::new(vec![Step::Reply(HttpReply::ok("<html>"))]);
        let req = requester(transport.clone());

        let result: GraphResult<serde_json::Value> = req.get_json(&[]).await;
        assert!(matches!(result, Err(GraphError::Malformed(_))));
        assert_eq!(transport.calls(), 1);
    }
}
