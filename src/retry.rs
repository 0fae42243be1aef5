//! Retry and fallback driver
//!
//! Walks the router's ordered candidate chain. Retryable failures back off
//! exponentially on the same candidate; fatal-for-model failures advance
//! the chain; fatal-for-request failures stop the walk. This is the only
//! component allowed to consume a retryable error silently.

use std::time::{Duration, Instant};

use futures::StreamExt;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{GatewayError, Result, RetryClass};
use crate::providers::ProviderRegistry;
use crate::router::RouteCandidate;
use crate::types::{ChatRequest, ChatResponse, ChunkStream};

/// Backoff tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per candidate before advancing the chain
    pub max_attempts: u32,
    /// First backoff delay; doubles per attempt
    pub base_delay_ms: u64,
    /// Backoff ceiling
    pub max_delay_ms: u64,
    /// Random jitter as a fraction of the computed delay
    pub jitter_ratio: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter_ratio: 0.1,
        }
    }
}

pub struct RetryDriver {
    config: RetryConfig,
}

impl RetryDriver {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Exponential delay for `attempt` (zero-based), honoring a vendor
    /// `retry_after` when present, capped, plus jitter.
    fn backoff_delay(&self, attempt: u32, honored: Option<Duration>) -> Duration {
        let exponential =
            Duration::from_millis(self.config.base_delay_ms.saturating_mul(1u64 << attempt.min(20)));
        let base = honored.unwrap_or(exponential);
        let capped = base.min(Duration::from_millis(self.config.max_delay_ms));
        let jitter = capped.mul_f64(self.config.jitter_ratio * rand::thread_rng().gen::<f64>());
        capped + jitter
    }

    /// Walk the chain for a non-streaming call. The returned response's
    /// `latency_ms` covers the whole walk, failed attempts included.
    pub async fn execute(
        &self,
        chain: &[RouteCandidate],
        registry: &ProviderRegistry,
        request: &ChatRequest,
    ) -> Result<ChatResponse> {
        let walk_started = Instant::now();
        let mut last_error: Option<GatewayError> = None;

        for candidate in chain {
            let mut attempt_request = request.clone();
            attempt_request.model = candidate.model.clone();

            let provider = match registry.get(candidate.provider) {
                Ok(p) => p,
                Err(e) => {
                    warn!(provider = %candidate.provider, error = %e, "skipping candidate");
                    last_error = Some(e);
                    continue;
                }
            };

            let mut attempt = 0;
            loop {
                match provider.complete(&attempt_request).await {
                    Ok(mut response) => {
                        response.latency_ms = walk_started.elapsed().as_millis() as u64;
                        return Ok(response);
                    }
                    Err(e) => match e.retry_class() {
                        RetryClass::Retryable if attempt + 1 < self.config.max_attempts => {
                            let delay = self.backoff_delay(attempt, e.honored_delay());
                            debug!(
                                provider = %candidate.provider,
                                model = %candidate.model,
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                error = %e,
                                "retryable failure, backing off"
                            );
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                            last_error = Some(e);
                        }
                        RetryClass::Retryable | RetryClass::FatalForModel => {
                            warn!(
                                provider = %candidate.provider,
                                model = %candidate.model,
                                error = %e,
                                "candidate exhausted, advancing chain"
                            );
                            last_error = Some(e);
                            break;
                        }
                        RetryClass::FatalForRequest => return Err(e),
                    },
                }
            }
        }

        Err(last_error.unwrap_or(GatewayError::NoEligibleModel))
    }

    /// Walk the chain for a streaming call.
    ///
    /// Fallback is only legal before the caller has seen a chunk, so the
    /// driver peeks the first item itself: establishment failures and
    /// first-chunk errors advance the chain; once a chunk arrives, the
    /// stream is handed over and mid-stream failures pass through untouched.
    pub async fn execute_stream(
        &self,
        chain: &[RouteCandidate],
        registry: &ProviderRegistry,
        request: &ChatRequest,
    ) -> Result<(RouteCandidate, ChunkStream)> {
        let mut last_error: Option<GatewayError> = None;

        'chain: for candidate in chain {
            let mut attempt_request = request.clone();
            attempt_request.model = candidate.model.clone();

            let provider = match registry.get(candidate.provider) {
                Ok(p) => p,
                Err(e) => {
                    warn!(provider = %candidate.provider, error = %e, "skipping candidate");
                    last_error = Some(e);
                    continue;
                }
            };

            let mut attempt = 0;
            loop {
                let first_failure = match provider.stream(&attempt_request).await {
                    Ok(mut stream) => match stream.next().await {
                        Some(Ok(first)) => {
                            let chained: ChunkStream =
                                Box::pin(futures::stream::once(async move { Ok(first) }).chain(stream));
                            return Ok((candidate.clone(), chained));
                        }
                        Some(Err(e)) => e,
                        None => GatewayError::ProviderProtocolError {
                            provider: candidate.provider,
                            message: "stream closed before any chunk".to_string(),
                        },
                    },
                    Err(e) => e,
                };

                match first_failure.retry_class() {
                    RetryClass::Retryable if attempt + 1 < self.config.max_attempts => {
                        let delay = self.backoff_delay(attempt, first_failure.honored_delay());
                        debug!(
                            provider = %candidate.provider,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "stream establishment failed, backing off"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        last_error = Some(first_failure);
                    }
                    RetryClass::Retryable | RetryClass::FatalForModel => {
                        last_error = Some(first_failure);
                        continue 'chain;
                    }
                    // A zero-chunk protocol failure is safe to fall back
                    // from: the caller has seen nothing.
                    RetryClass::FatalForRequest
                        if matches!(
                            first_failure,
                            GatewayError::ProviderProtocolError { .. }
                        ) =>
                    {
                        last_error = Some(first_failure);
                        continue 'chain;
                    }
                    RetryClass::FatalForRequest => return Err(first_failure),
                }
            }
        }

        Err(last_error.unwrap_or(GatewayError::NoEligibleModel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver() -> RetryDriver {
        RetryDriver::new(RetryConfig {
            jitter_ratio: 0.0,
            ..Default::default()
        })
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let d = driver();
        assert_eq!(d.backoff_delay(0, None), Duration::from_secs(1));
        assert_eq!(d.backoff_delay(1, None), Duration::from_secs(2));
        assert_eq!(d.backoff_delay(2, None), Duration::from_secs(4));
        assert_eq!(d.backoff_delay(10, None), Duration::from_secs(30));
    }

    #[test]
    fn test_backoff_honors_retry_after() {
        let d = driver();
        assert_eq!(
            d.backoff_delay(0, Some(Duration::from_secs(7))),
            Duration::from_secs(7)
        );
        // Still capped.
        assert_eq!(
            d.backoff_delay(0, Some(Duration::from_secs(600))),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_jitter_bounded() {
        let d = RetryDriver::new(RetryConfig::default());
        for _ in 0..32 {
            let delay = d.backoff_delay(0, None);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_millis(1100));
        }
    }
}
