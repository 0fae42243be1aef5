//! Candidate filtering and strategy ordering

use std::cmp::Ordering;

use crate::catalog::ModelEntry;
use crate::router::{complexity_score, Constraints, RouteStrategy};
use crate::types::{Capability, ChatRequest};
use crate::utils::tokens;

/// Output budget assumed when the caller sets no `max_output_tokens`.
const DEFAULT_OUTPUT_BUDGET: u32 = 1024;

/// Apply the strategy-independent filters: constraints, context fit,
/// deprecation, provider preference/exclusion.
pub fn filter<'a>(
    entries: &'a [ModelEntry],
    request: &ChatRequest,
    constraints: &Constraints,
) -> Vec<&'a ModelEntry> {
    let prompt_tokens = tokens::estimate_request(request);
    let output_budget = request.max_output_tokens.unwrap_or(DEFAULT_OUTPUT_BUDGET);

    // Capabilities the request itself implies, beyond explicit constraints.
    let mut required = constraints.required_capabilities.clone();
    if request.has_images() && !required.contains(&Capability::Vision) {
        required.push(Capability::Vision);
    }
    if request.tools.is_some() && !required.contains(&Capability::Tools) {
        required.push(Capability::Tools);
    }

    entries
        .iter()
        .filter(|entry| {
            if let Some(max_price) = constraints.max_price_per_mtok {
                if entry.blended_price() > max_price {
                    return false;
                }
            }
            if let Some(max_latency) = constraints.max_latency_class {
                if entry.latency_class.rank() > max_latency.rank() {
                    return false;
                }
            }
            if let Some(min_context) = constraints.min_context_window {
                if entry.context_window < min_context {
                    return false;
                }
            }
            if !required.iter().all(|c| entry.supports(*c)) {
                return false;
            }
            if entry.context_window < prompt_tokens.saturating_add(output_budget) {
                return false;
            }
            if entry.deprecated && !constraints.allow_deprecated {
                return false;
            }
            if constraints.excluded_providers.contains(&entry.provider) {
                return false;
            }
            if !constraints.preferred_providers.is_empty()
                && !constraints.preferred_providers.contains(&entry.provider)
            {
                return false;
            }
            true
        })
        .collect()
}

/// Order the filtered set under a strategy. Ties fall through to the
/// documented secondary key, then to the `(provider, model)` name so the
/// chain is fully deterministic.
pub fn order<'a>(
    mut entries: Vec<&'a ModelEntry>,
    request: &ChatRequest,
    strategy: RouteStrategy,
) -> Vec<&'a ModelEntry> {
    match strategy {
        RouteStrategy::Cost => {
            entries.sort_by(|a, b| {
                cmp_f64(a.blended_price(), b.blended_price())
                    .then_with(|| cmp_f64(b.quality_score, a.quality_score))
                    .then_with(|| name_key(a).cmp(&name_key(b)))
            });
        }
        RouteStrategy::Quality => {
            entries.sort_by(|a, b| {
                cmp_f64(b.quality_score, a.quality_score)
                    .then_with(|| cmp_f64(a.blended_price(), b.blended_price()))
                    .then_with(|| name_key(a).cmp(&name_key(b)))
            });
        }
        RouteStrategy::Latency => {
            entries.sort_by(|a, b| {
                a.latency_class
                    .rank()
                    .cmp(&b.latency_class.rank())
                    .then_with(|| cmp_f64(a.blended_price(), b.blended_price()))
                    .then_with(|| name_key(a).cmp(&name_key(b)))
            });
        }
        RouteStrategy::Hybrid => {
            let complexity = complexity_score(request);
            let max_price = entries
                .iter()
                .map(|e| e.blended_price())
                .fold(0.0_f64, f64::max);
            let mut scored: Vec<(&ModelEntry, f64)> = entries
                .into_iter()
                .map(|e| {
                    let utility = hybrid_utility(e, complexity, max_price);
                    (e, utility)
                })
                .collect();
            scored.sort_by(|a, b| {
                cmp_f64(b.1, a.1).then_with(|| name_key(a.0).cmp(&name_key(b.0)))
            });
            return scored.into_iter().map(|(e, _)| e).collect();
        }
    }
    entries
}

/// Hybrid weights `(wq, wc, wl)` as a piecewise-linear function of
/// complexity: price-dominant below 0.3, quality-dominant above 0.6,
/// interpolated between.
pub fn hybrid_weights(complexity: f64) -> (f64, f64, f64) {
    const LOW: (f64, f64, f64) = (0.1, 0.6, 0.3);
    const HIGH: (f64, f64, f64) = (0.6, 0.3, 0.1);
    if complexity <= 0.3 {
        LOW
    } else if complexity >= 0.6 {
        HIGH
    } else {
        let t = (complexity - 0.3) / 0.3;
        (
            LOW.0 + t * (HIGH.0 - LOW.0),
            LOW.1 + t * (HIGH.1 - LOW.1),
            LOW.2 + t * (HIGH.2 - LOW.2),
        )
    }
}

fn hybrid_utility(entry: &ModelEntry, complexity: f64, max_price: f64) -> f64 {
    let (wq, wc, wl) = hybrid_weights(complexity);
    let price_norm = if max_price > 0.0 {
        entry.blended_price() / max_price
    } else {
        0.0
    };
    let latency_norm = entry.latency_class.rank() as f64 / 3.0;
    let mut utility = wq * entry.quality_score - wc * price_norm - wl * latency_norm;
    if entry.deprecated {
        utility -= 0.1;
    }
    utility
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

fn name_key(entry: &ModelEntry) -> (&'static str, &str) {
    (entry.provider.as_str(), &entry.model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::types::Message;

    fn request(text: &str) -> ChatRequest {
        ChatRequest::new("gpt-4o-mini", vec![Message::user(text)])
    }

    fn all_entries() -> Vec<ModelEntry> {
        Catalog::with_defaults().list(None)
    }

    #[test]
    fn test_cost_order_puts_cheapest_first() {
        let entries = all_entries();
        let filtered = filter(&entries, &request("What is 2+2?"), &Constraints::default());
        let ordered = order(filtered, &request("What is 2+2?"), RouteStrategy::Cost);
        // Local zero-price models win on raw price.
        assert_eq!(ordered[0].input_price_per_mtok, 0.0);
        // Prices never decrease along the chain.
        for pair in ordered.windows(2) {
            assert!(pair[0].blended_price() <= pair[1].blended_price());
        }
    }

    #[test]
    fn test_cost_order_excluding_local_matches_scenario() {
        let entries = all_entries();
        let constraints = Constraints {
            excluded_providers: vec![crate::types::ProviderId::Ollama],
            ..Default::default()
        };
        let req = request("What is 2+2?");
        let filtered = filter(&entries, &req, &constraints);
        let ordered = order(filtered, &req, RouteStrategy::Cost);
        assert_eq!(ordered[0].model, "llama-3.1-8b-instant");
        assert_eq!(ordered[0].provider, crate::types::ProviderId::Groq);
    }

    #[test]
    fn test_quality_order_puts_best_first() {
        let entries = all_entries();
        let req = request("Prove that √2 is irrational.");
        let filtered = filter(&entries, &req, &Constraints::default());
        let ordered = order(filtered, &req, RouteStrategy::Quality);
        assert_eq!(ordered[0].model, "o1-2024-12-17");
    }

    #[test]
    fn test_latency_order_prefers_ultra() {
        let entries = all_entries();
        let req = request("hi");
        let filtered = filter(&entries, &req, &Constraints::default());
        let ordered = order(filtered, &req, RouteStrategy::Latency);
        assert_eq!(ordered[0].latency_class.rank(), 0);
    }

    #[test]
    fn test_deprecated_dropped_by_default() {
        let entries = all_entries();
        let req = request("hi");
        let filtered = filter(&entries, &req, &Constraints::default());
        assert!(filtered.iter().all(|e| !e.deprecated));

        let allowed = filter(
            &entries,
            &req,
            &Constraints {
                allow_deprecated: true,
                ..Default::default()
            },
        );
        assert!(allowed.iter().any(|e| e.deprecated));
    }

    #[test]
    fn test_context_fit_drops_small_windows() {
        let entries = all_entries();
        // ~100k tokens of prompt excludes every 64k-context model.
        let big = "x".repeat(400_000);
        let req = request(&big);
        let filtered = filter(&entries, &req, &Constraints::default());
        assert!(filtered.iter().all(|e| e.context_window >= 100_000));
        assert!(!filtered.iter().any(|e| e.model == "deepseek-chat"));
    }

    #[test]
    fn test_capability_filter_from_request() {
        let entries = all_entries();
        let req = ChatRequest::new(
            "gpt-4o",
            vec![Message::user("look").with_image("image/png", "aGVsbG8=")],
        );
        let filtered = filter(&entries, &req, &Constraints::default());
        assert!(filtered.iter().all(|e| e.capabilities.vision));
    }

    #[test]
    fn test_preferred_providers_restrict() {
        let entries = all_entries();
        let req = request("hi");
        let constraints = Constraints {
            preferred_providers: vec![crate::types::ProviderId::Anthropic],
            ..Default::default()
        };
        let filtered = filter(&entries, &req, &constraints);
        assert!(!filtered.is_empty());
        assert!(filtered
            .iter()
            .all(|e| e.provider == crate::types::ProviderId::Anthropic));
    }

    #[test]
    fn test_hybrid_weights_interpolate() {
        assert_eq!(hybrid_weights(0.0), (0.1, 0.6, 0.3));
        assert_eq!(hybrid_weights(0.3), (0.1, 0.6, 0.3));
        assert_eq!(hybrid_weights(0.6), (0.6, 0.3, 0.1));
        assert_eq!(hybrid_weights(1.0), (0.6, 0.3, 0.1));

        let (wq, wc, wl) = hybrid_weights(0.45);
        assert!((wq - 0.35).abs() < 1e-9);
        assert!((wc - 0.45).abs() < 1e-9);
        assert!((wl - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_hybrid_differs_from_cost_and_quality_on_reasoning_prompt() {
        let entries = all_entries();
        let req = ChatRequest::new(
            "gpt-4o-mini",
            vec![Message::user(
                "Prove that √2 is irrational. Derive and explain the argument, analyze \
                 edge cases, design a generalization, and justify every step formally.",
            )],
        );
        let constraints = Constraints {
            excluded_providers: vec![crate::types::ProviderId::Ollama],
            ..Default::default()
        };
        let filtered = filter(&entries, &req, &constraints);

        let cost = order(filtered.clone(), &req, RouteStrategy::Cost);
        let quality = order(filtered.clone(), &req, RouteStrategy::Quality);
        let hybrid = order(filtered, &req, RouteStrategy::Hybrid);

        assert_ne!(hybrid[0].model, cost[0].model);
        assert_ne!(hybrid[0].model, quality[0].model);

        // Stable under repetition.
        let entries2 = all_entries();
        let filtered2 = filter(&entries2, &req, &constraints);
        let hybrid2 = order(filtered2, &req, RouteStrategy::Hybrid);
        assert_eq!(hybrid[0].model, hybrid2[0].model);
    }
}
