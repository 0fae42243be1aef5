//! Cost/quality/latency router
//!
//! Scores catalog entries under a strategy and constraints, producing the
//! ordered candidate chain the retry driver walks. Selection is
//! deterministic: identical catalog snapshot, request, strategy, and
//! constraints always yield the identical chain.

pub mod complexity;
pub mod selection;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::{Catalog, LatencyClass};
use crate::error::{GatewayError, Result};
use crate::types::{Capability, ChatRequest, ProviderId};

pub use complexity::complexity_score;

/// Routing strategies for candidate ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStrategy {
    /// Cheapest blended price first
    Cost,
    /// Highest quality score first
    Quality,
    /// Fastest latency class first
    Latency,
    /// Complexity-weighted utility
    #[default]
    Hybrid,
}

/// Caller-supplied routing constraints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Constraints {
    /// Ceiling on blended (input+output)/2 price
    pub max_price_per_mtok: Option<f64>,
    /// Slowest acceptable latency class
    pub max_latency_class: Option<LatencyClass>,
    pub min_context_window: Option<u32>,
    pub required_capabilities: Vec<Capability>,
    /// When non-empty, only these providers are considered
    pub preferred_providers: Vec<ProviderId>,
    pub excluded_providers: Vec<ProviderId>,
    pub allow_deprecated: bool,
}

/// One link of the candidate chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteCandidate {
    pub provider: ProviderId,
    pub model: String,
}

impl std::fmt::Display for RouteCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

/// Router tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Chain length handed to the retry driver
    pub chain_length: usize,
    pub default_strategy: RouteStrategy,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            chain_length: 3,
            default_strategy: RouteStrategy::Hybrid,
        }
    }
}

pub struct Router {
    catalog: Arc<Catalog>,
    config: RouterConfig,
}

impl Router {
    pub fn new(catalog: Arc<Catalog>, config: RouterConfig) -> Self {
        Self { catalog, config }
    }

    pub fn default_strategy(&self) -> RouteStrategy {
        self.config.default_strategy
    }

    /// Produce the ordered candidate chain for a request.
    pub fn route(
        &self,
        request: &ChatRequest,
        strategy: RouteStrategy,
        constraints: &Constraints,
    ) -> Result<Vec<RouteCandidate>> {
        let snapshot = self.catalog.snapshot();
        let filtered = selection::filter(snapshot.entries(), request, constraints);
        if filtered.is_empty() {
            return Err(GatewayError::NoEligibleModel);
        }

        let ordered = selection::order(filtered, request, strategy);
        let chain: Vec<RouteCandidate> = ordered
            .into_iter()
            .take(self.config.chain_length)
            .map(|entry| RouteCandidate {
                provider: entry.provider,
                model: entry.model.clone(),
            })
            .collect();

        debug!(
            strategy = ?strategy,
            chain = %chain.iter().map(ToString::to_string).collect::<Vec<_>>().join(" -> "),
            "routed request"
        );
        Ok(chain)
    }
}
