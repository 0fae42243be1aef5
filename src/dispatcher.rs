//! The dispatcher façade
//!
//! Sole public entry of the request core. Pipeline order: validate →
//! cache lookup → budget pre-flight → route → retry walk → cost settle →
//! session append → cache store. Streaming follows the same path but skips
//! the response cache and settles from the final chunk (or from `Drop` on
//! cancellation), so every dispatched call appends to its session exactly
//! once.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::StreamExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::budget::{CallRecord, SessionRegistry, SessionSummary};
use crate::cache::{CacheKey, CacheStats, ResponseCache};
use crate::catalog::{Catalog, ModelEntry};
use crate::config::GatewayConfig;
use crate::cost::{self, CostBreakdown};
use crate::error::{GatewayError, Result};
use crate::providers::ProviderRegistry;
use crate::retry::RetryDriver;
use crate::router::{Constraints, RouteCandidate, Router, RouteStrategy};
use crate::types::{
    ChatRequest, ChatResponse, ChunkStream, FinishReason, ProviderId, StreamChunk, Usage,
};
use crate::utils::tokens;

/// Per-dispatch routing options.
#[derive(Debug, Clone, Default)]
pub struct RouteOptions {
    pub strategy: Option<RouteStrategy>,
    pub constraints: Constraints,
}

/// The gateway request core.
pub struct Dispatcher {
    catalog: Arc<Catalog>,
    cache: Arc<ResponseCache>,
    sessions: Arc<SessionRegistry>,
    providers: Arc<ProviderRegistry>,
    router: Router,
    retry: RetryDriver,
}

impl Dispatcher {
    /// Build the core from configuration. Catalog, cache, and session
    /// registry live for the dispatcher's lifetime; tests construct their
    /// own instance rather than reaching into a global.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        config.validate()?;

        let catalog = Arc::new(Catalog::with_defaults());
        if let Some(path) = &config.catalog_path {
            catalog.reload_from_path(path)?;
        }

        let cache = Arc::new(ResponseCache::new(config.cache.clone()));
        let sessions = Arc::new(SessionRegistry::new(config.budget.clone()));
        let providers = Arc::new(ProviderRegistry::new(
            catalog.clone(),
            config.providers.clone(),
        ));
        let router = Router::new(catalog.clone(), config.router.clone());
        let retry = RetryDriver::new(config.retry.clone());

        info!(models = catalog.snapshot().len(), "dispatcher initialized");
        Ok(Self {
            catalog,
            cache,
            sessions,
            providers,
            router,
            retry,
        })
    }

    /// Release in-process state. Idempotent.
    pub fn shutdown(&self) {
        self.cache.clear();
        info!("dispatcher shut down");
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Registry access, used by tests to install mock providers.
    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn set_session_budget(&self, session_id: &str, limit: Option<f64>) {
        self.sessions.set_budget(session_id, limit);
    }

    // ==================== Caller-facing contract ====================

    /// Non-streaming dispatch under the configured default strategy.
    pub async fn dispatch(&self, request: ChatRequest) -> Result<ChatResponse> {
        self.dispatch_with(request, RouteOptions::default()).await
    }

    /// Non-streaming dispatch with explicit strategy/constraints.
    pub async fn dispatch_with(
        &self,
        request: ChatRequest,
        options: RouteOptions,
    ) -> Result<ChatResponse> {
        let request_id = Uuid::new_v4();
        self.catalog.ensure_valid(&request)?;
        let requested_entry = self
            .catalog
            .lookup(&request.model)
            .ok_or_else(|| GatewayError::ModelNotFound {
                model: request.model.clone(),
            })?;

        // Cache lookup before any spend.
        let lookup_started = Instant::now();
        let key = CacheKey::for_request(requested_entry.provider.as_str(), &request);
        if request.cache_policy.allows_read() {
            if let Some((mut cached, hits)) = self.cache.get(&key) {
                debug!(request_id = %request_id, hits, "served from response cache");
                cached.cost_usd = 0.0;
                cached.cost_breakdown = Some(CostBreakdown::cached());
                cached.latency_ms = lookup_started.elapsed().as_millis() as u64;
                self.sessions.record(
                    request.session_id.as_deref(),
                    CallRecord {
                        request_id,
                        provider: cached.provider,
                        model: cached.model.clone(),
                        cost_usd: 0.0,
                        usage: cached.usage,
                        finish_reason: cached.finish_reason,
                        from_cache: true,
                        created_at: Utc::now(),
                    },
                );
                return Ok(cached);
            }
        }

        // Budget gate, then routing.
        let estimated_prompt = tokens::estimate_request(&request);
        let min_cost = cost::min_plausible_cost(estimated_prompt, &requested_entry);
        self.sessions
            .preflight(request.session_id.as_deref(), min_cost)?;

        let strategy = options
            .strategy
            .unwrap_or_else(|| self.router.default_strategy());
        let chain = self.router.route(&request, strategy, &options.constraints)?;

        match self.retry.execute(&chain, &self.providers, &request).await {
            Ok(mut response) => {
                let settled = self
                    .settlement_entry(response.provider, &response.model)
                    .ok_or_else(|| GatewayError::CatalogIncomplete {
                        model: response.model.clone(),
                        field: "entry",
                    })
                    .and_then(|entry| cost::compute(&response.usage, &entry));
                let breakdown = match settled {
                    Ok(breakdown) => breakdown,
                    Err(e) => {
                        // The vendor call happened; it still counts once.
                        self.record_failure(request_id, &request, &chain, &e);
                        return Err(e);
                    }
                };
                response.cost_usd = breakdown.total();
                response.cost_breakdown = Some(breakdown);

                self.sessions.record(
                    request.session_id.as_deref(),
                    CallRecord {
                        request_id,
                        provider: response.provider,
                        model: response.model.clone(),
                        cost_usd: response.cost_usd,
                        usage: response.usage,
                        finish_reason: response.finish_reason,
                        from_cache: false,
                        created_at: Utc::now(),
                    },
                );

                if request.cache_policy.allows_store() && !request.stream {
                    self.cache.put(key, &response);
                }
                Ok(response)
            }
            Err(e) => {
                self.record_failure(request_id, &request, &chain, &e);
                Err(e)
            }
        }
    }

    /// Streaming dispatch under the configured default strategy.
    pub async fn dispatch_stream(&self, request: ChatRequest) -> Result<ChunkStream> {
        self.dispatch_stream_with(request, RouteOptions::default())
            .await
    }

    /// Streaming dispatch with explicit strategy/constraints.
    ///
    /// The response cache is not consulted and never written: streamed
    /// responses are outside the cache contract. Settlement happens when
    /// the final chunk passes through, or on drop with
    /// `finish_reason = cancelled` and best-known usage.
    pub async fn dispatch_stream_with(
        &self,
        request: ChatRequest,
        options: RouteOptions,
    ) -> Result<ChunkStream> {
        let request_id = Uuid::new_v4();
        self.catalog.ensure_valid(&request)?;
        let requested_entry = self
            .catalog
            .lookup(&request.model)
            .ok_or_else(|| GatewayError::ModelNotFound {
                model: request.model.clone(),
            })?;

        let estimated_prompt = tokens::estimate_request(&request);
        let min_cost = cost::min_plausible_cost(estimated_prompt, &requested_entry);
        self.sessions
            .preflight(request.session_id.as_deref(), min_cost)?;

        let strategy = options
            .strategy
            .unwrap_or_else(|| self.router.default_strategy());
        let chain = self.router.route(&request, strategy, &options.constraints)?;

        let (candidate, inner) = match self
            .retry
            .execute_stream(&chain, &self.providers, &request)
            .await
        {
            Ok(ok) => ok,
            Err(e) => {
                self.record_failure(request_id, &request, &chain, &e);
                return Err(e);
            }
        };

        let settlement = StreamSettlement {
            sessions: self.sessions.clone(),
            session_id: request.session_id.clone(),
            request_id,
            provider: candidate.provider,
            model: candidate.model.clone(),
            entry: self.settlement_entry(candidate.provider, &candidate.model),
            usage: Usage::default(),
            finish: None,
            settled: false,
        };

        let stream = async_stream::stream! {
            let mut inner = inner;
            let mut settlement = settlement;
            while let Some(item) = inner.next().await {
                match item {
                    Ok(chunk) => {
                        settlement.observe(&chunk);
                        let is_final = chunk.is_final();
                        yield Ok(chunk);
                        if is_final {
                            settlement.settle(None);
                            return;
                        }
                    }
                    Err(e) => {
                        settlement.settle(Some(FinishReason::Error));
                        yield Err(e);
                        return;
                    }
                }
            }
            // Stream ended without a final chunk; settle with what we saw.
            settlement.settle(None);
        };
        Ok(Box::pin(stream))
    }

    /// Aggregate spend for one session.
    pub fn session_summary(&self, session_id: &str) -> Option<SessionSummary> {
        self.sessions.summary(session_id)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn cache_clear(&self) {
        self.cache.clear();
    }

    /// Dispatch with a hard deadline. On expiry the in-flight attempt is
    /// dropped (closing its connection), a `cancelled` call is appended,
    /// and `Timeout` surfaces.
    pub async fn dispatch_timeout(
        &self,
        request: ChatRequest,
        deadline: Duration,
    ) -> Result<ChatResponse> {
        let session_id = request.session_id.clone();
        let model = request.model.clone();
        let provider = self.catalog.lookup(&model).map(|e| e.provider);
        match tokio::time::timeout(deadline, self.dispatch(request)).await {
            Ok(result) => result,
            Err(_) => {
                self.sessions.record(
                    session_id.as_deref(),
                    CallRecord {
                        request_id: Uuid::new_v4(),
                        provider: provider.unwrap_or_default(),
                        model,
                        cost_usd: 0.0,
                        usage: Usage::default(),
                        finish_reason: FinishReason::Cancelled,
                        from_cache: false,
                        created_at: Utc::now(),
                    },
                );
                Err(GatewayError::Timeout(deadline))
            }
        }
    }

    // ==================== Internals ====================

    /// Entry used for settlement: the exact pair the call ran on, falling
    /// back to a bare-model lookup when the vendor reported a dated id for
    /// a requested alias.
    fn settlement_entry(&self, provider: ProviderId, model: &str) -> Option<ModelEntry> {
        self.catalog
            .lookup_pair(provider, model)
            .or_else(|| self.catalog.lookup(model))
    }

    /// A failed dispatch still appends exactly one call, with zero cost.
    fn record_failure(
        &self,
        request_id: Uuid,
        request: &ChatRequest,
        chain: &[RouteCandidate],
        error: &GatewayError,
    ) {
        let finish = match error {
            GatewayError::Cancelled | GatewayError::Timeout(_) => FinishReason::Cancelled,
            _ => FinishReason::Error,
        };
        let (provider, model) = chain
            .first()
            .map(|c| (c.provider, c.model.clone()))
            .unwrap_or((ProviderId::default(), request.model.clone()));
        self.sessions.record(
            request.session_id.as_deref(),
            CallRecord {
                request_id,
                provider,
                model,
                cost_usd: 0.0,
                usage: Usage::default(),
                finish_reason: finish,
                from_cache: false,
                created_at: Utc::now(),
            },
        );
    }
}

/// Accumulates stream-side usage and guarantees the one-append-per-call
/// contract: settled explicitly at the final chunk, or from `Drop` when the
/// caller walks away mid-stream.
struct StreamSettlement {
    sessions: Arc<SessionRegistry>,
    session_id: Option<String>,
    request_id: Uuid,
    provider: ProviderId,
    model: String,
    entry: Option<ModelEntry>,
    usage: Usage,
    finish: Option<FinishReason>,
    settled: bool,
}

impl StreamSettlement {
    fn observe(&mut self, chunk: &StreamChunk) {
        if let Some(usage) = &chunk.usage {
            self.usage.merge(usage);
        }
        if let Some(reason) = chunk.finish_reason {
            self.finish = Some(reason);
        }
    }

    fn settle(&mut self, finish_override: Option<FinishReason>) {
        if self.settled {
            return;
        }
        self.settled = true;

        let finish = finish_override
            .or(self.finish)
            .unwrap_or(FinishReason::Cancelled);

        let cost_usd = match &self.entry {
            Some(entry) => match cost::compute(&self.usage, entry) {
                Ok(breakdown) => breakdown.total(),
                Err(e) => {
                    warn!(model = %self.model, error = %e, "stream settlement cost failed");
                    0.0
                }
            },
            None => 0.0,
        };

        self.sessions.record(
            self.session_id.as_deref(),
            CallRecord {
                request_id: self.request_id,
                provider: self.provider,
                model: self.model.clone(),
                cost_usd,
                usage: self.usage,
                finish_reason: finish,
                from_cache: false,
                created_at: Utc::now(),
            },
        );
    }
}

impl Drop for StreamSettlement {
    fn drop(&mut self) {
        if !self.settled {
            // Caller dropped the stream: best-known usage, cancelled.
            self.settle(Some(FinishReason::Cancelled));
        }
    }
}
