//! Session accounting and budget enforcement
//!
//! Every dispatched call appends exactly once to its session's
//! accumulator, including failures (zero cost) and cancellations. The gate
//! rejects before dispatch when the conservative pre-flight estimate would
//! break the budget; it never cancels an in-flight stream.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::{GatewayError, Result};
use crate::types::{FinishReason, ProviderId, Usage};

/// Budget defaults applied to new sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Budget applied to sessions that never set one; `None` means
    /// unlimited
    pub default_budget_usd: Option<f64>,
    /// Fraction of the budget at which the alert fires
    pub alert_threshold: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            default_budget_usd: None,
            alert_threshold: 0.8,
        }
    }
}

/// One settled call, as appended to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub request_id: Uuid,
    pub provider: ProviderId,
    pub model: String,
    pub cost_usd: f64,
    pub usage: Usage,
    pub finish_reason: FinishReason,
    pub from_cache: bool,
    pub created_at: DateTime<Utc>,
}

/// Events the accumulator raises as spend evolves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BudgetEvent {
    AlertThresholdReached {
        session_id: String,
        total_cost: f64,
        budget_limit: f64,
    },
}

/// Per-session spend ledger. Calls are append-only; aggregates update
/// atomically with each append.
#[derive(Debug, Clone)]
pub struct SessionAccumulator {
    pub session_id: String,
    calls: Vec<CallRecord>,
    total_cost: f64,
    per_provider: HashMap<String, f64>,
    per_model: HashMap<String, f64>,
    budget_limit: Option<f64>,
    alert_threshold: f64,
    alert_fired: bool,
}

impl SessionAccumulator {
    fn new(session_id: String, config: &BudgetConfig) -> Self {
        Self {
            session_id,
            calls: Vec::new(),
            total_cost: 0.0,
            per_provider: HashMap::new(),
            per_model: HashMap::new(),
            budget_limit: config.default_budget_usd,
            alert_threshold: config.alert_threshold,
            alert_fired: false,
        }
    }

    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    pub fn budget_limit(&self) -> Option<f64> {
        self.budget_limit
    }

    pub fn calls(&self) -> &[CallRecord] {
        &self.calls
    }

    /// Append a settled call and update aggregates. Returns the alert event
    /// the first time spend crosses `alert_threshold × budget_limit`.
    pub fn append(&mut self, record: CallRecord) -> Option<BudgetEvent> {
        self.total_cost += record.cost_usd;
        *self
            .per_provider
            .entry(record.provider.as_str().to_string())
            .or_insert(0.0) += record.cost_usd;
        *self.per_model.entry(record.model.clone()).or_insert(0.0) += record.cost_usd;
        self.calls.push(record);

        if let Some(limit) = self.budget_limit {
            if !self.alert_fired && self.total_cost >= self.alert_threshold * limit {
                self.alert_fired = true;
                return Some(BudgetEvent::AlertThresholdReached {
                    session_id: self.session_id.clone(),
                    total_cost: self.total_cost,
                    budget_limit: limit,
                });
            }
        }
        None
    }

    fn would_exceed(&self, min_plausible_cost: f64) -> Option<f64> {
        let limit = self.budget_limit?;
        (self.total_cost + min_plausible_cost > limit).then_some(limit)
    }
}

/// Aggregate view returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub total_cost: f64,
    pub per_provider: HashMap<String, f64>,
    pub per_model: HashMap<String, f64>,
    pub calls: Vec<CallRecord>,
}

/// Process-wide session registry; one short lock per session.
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Mutex<SessionAccumulator>>>,
    config: BudgetConfig,
}

impl SessionRegistry {
    pub fn new(config: BudgetConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            config,
        }
    }

    fn accumulator(&self, session_id: &str) -> Arc<Mutex<SessionAccumulator>> {
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(SessionAccumulator::new(
                    session_id.to_string(),
                    &self.config,
                )))
            })
            .clone()
    }

    /// Set (or clear) a session's budget limit.
    pub fn set_budget(&self, session_id: &str, limit: Option<f64>) {
        let accumulator = self.accumulator(session_id);
        accumulator.lock().budget_limit = limit;
    }

    /// Pre-flight check: reject before any vendor call when the session
    /// cannot afford the conservative estimate.
    pub fn preflight(&self, session_id: Option<&str>, min_plausible_cost: f64) -> Result<()> {
        let Some(session_id) = session_id else {
            return Ok(());
        };
        let accumulator = self.accumulator(session_id);
        let guard = accumulator.lock();
        if let Some(limit) = guard.would_exceed(min_plausible_cost) {
            return Err(GatewayError::BudgetExhausted {
                session_id: session_id.to_string(),
                total_cost: guard.total_cost,
                budget_limit: limit,
            });
        }
        Ok(())
    }

    /// Post-flight append. Requests without a session are not accumulated.
    pub fn record(&self, session_id: Option<&str>, record: CallRecord) -> Option<BudgetEvent> {
        let session_id = session_id?;
        let accumulator = self.accumulator(session_id);
        let event = accumulator.lock().append(record);
        if let Some(BudgetEvent::AlertThresholdReached {
            total_cost,
            budget_limit,
            ..
        }) = &event
        {
            warn!(
                session = session_id,
                total_cost, budget_limit, "session spend crossed alert threshold"
            );
        }
        event
    }

    pub fn summary(&self, session_id: &str) -> Option<SessionSummary> {
        let accumulator = self.sessions.get(session_id)?.clone();
        let guard = accumulator.lock();
        Some(SessionSummary {
            session_id: guard.session_id.clone(),
            total_cost: guard.total_cost,
            per_provider: guard.per_provider.clone(),
            per_model: guard.per_model.clone(),
            calls: guard.calls.clone(),
        })
    }
}
