//! Cost accounting
//!
//! A pure function of usage and catalog pricing. All prices are USD per
//! million tokens; every term is rounded to the nearest micro-dollar so the
//! recorded total is exactly the sum of the recorded terms.

use serde::{Deserialize, Serialize};

use crate::catalog::ModelEntry;
use crate::error::{GatewayError, Result};
use crate::types::Usage;

const MTOK: f64 = 1_000_000.0;

/// Per-term audit record attached to a response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    /// Freshly processed prompt tokens at the input price
    pub input_cost: f64,
    /// Completion tokens at the output price
    pub output_cost: f64,
    /// Explicit cache writes at the cache-write price
    pub cache_write_cost: f64,
    /// Explicit cache reads at the cache-read price
    pub cache_read_cost: f64,
    /// True when usage was tokenizer-derived rather than vendor-reported
    #[serde(default)]
    pub estimated: bool,
    /// True when the response was served from the gateway response cache
    #[serde(default)]
    pub from_cache: bool,
}

impl CostBreakdown {
    /// Sum of all terms. Equal to the response's `cost_usd` by construction.
    pub fn total(&self) -> f64 {
        self.input_cost + self.output_cost + self.cache_write_cost + self.cache_read_cost
    }

    /// Breakdown for a response served from the gateway cache: no money
    /// changed hands.
    pub fn cached() -> Self {
        Self {
            from_cache: true,
            ..Default::default()
        }
    }
}

/// Round to the nearest micro-dollar.
pub fn round_usd(amount: f64) -> f64 {
    (amount * 1e6).round() / 1e6
}

/// Compute the cost of a completed call.
///
/// ```text
/// cost = billed_prompt × input_price
///      + completion   × output_price
///      + cache_write  × cache_write_price
///      + cache_read   × cache_read_price
/// ```
///
/// where `billed_prompt = prompt − cache_read − cached_prompt_auto`. A
/// missing price for a term with nonzero tokens is a catalog defect, not a
/// zero.
pub fn compute(usage: &Usage, entry: &ModelEntry) -> Result<CostBreakdown> {
    let billed_prompt = usage.uncached_prompt_tokens();

    let input_cost = round_usd(billed_prompt as f64 / MTOK * entry.input_price_per_mtok);
    let output_cost = round_usd(usage.completion_tokens as f64 / MTOK * entry.output_price_per_mtok);

    let cache_write_cost = if usage.cache_write_tokens > 0 {
        let price = entry
            .cache_write_price_per_mtok
            .ok_or(GatewayError::CatalogIncomplete {
                model: entry.model.clone(),
                field: "cache_write_price_per_mtok",
            })?;
        round_usd(usage.cache_write_tokens as f64 / MTOK * price)
    } else {
        0.0
    };

    let cache_read_cost = if usage.cache_read_tokens > 0 {
        let price = entry
            .cache_read_price_per_mtok
            .ok_or(GatewayError::CatalogIncomplete {
                model: entry.model.clone(),
                field: "cache_read_price_per_mtok",
            })?;
        round_usd(usage.cache_read_tokens as f64 / MTOK * price)
    } else {
        0.0
    };

    Ok(CostBreakdown {
        input_cost,
        output_cost,
        cache_write_cost,
        cache_read_cost,
        estimated: usage.estimated,
        from_cache: false,
    })
}

/// Conservative pre-flight figure used by the budget gate: estimated prompt
/// tokens at the input price only.
pub fn min_plausible_cost(estimated_prompt_tokens: u32, entry: &ModelEntry) -> f64 {
    round_usd(estimated_prompt_tokens as f64 / MTOK * entry.input_price_per_mtok)
}
