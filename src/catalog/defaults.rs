//! Built-in model table
//!
//! Shipped so the gateway is usable without an external catalog file.
//! Prices are USD per million tokens; quality scores are relative task
//! performance in [0, 1].

use serde_json::json;

use super::loader::{CatalogDocument, CatalogTable};

/// The built-in catalog document.
pub fn document() -> CatalogDocument {
    let value = json!({
        "version": "2025.07",
        "updated": "2025-07-15",
        "providers": {
            "openai": {
                "gpt-4o-2024-08-06": {
                    "display_name": "GPT-4o",
                    "category": "frontier",
                    "context_window": 128000,
                    "output_ceiling": 16384,
                    "input_price_per_mtok": 2.50,
                    "output_price_per_mtok": 10.00,
                    "cache_read_price_per_mtok": 1.25,
                    "capabilities": {"vision": true, "tools": true, "prompt_cache": true},
                    "quality_score": 0.82,
                    "latency_class": "fast"
                },
                "gpt-4o": {
                    "display_name": "GPT-4o (stable alias)",
                    "category": "frontier",
                    "context_window": 128000,
                    "output_ceiling": 16384,
                    "input_price_per_mtok": 2.50,
                    "output_price_per_mtok": 10.00,
                    "cache_read_price_per_mtok": 1.25,
                    "capabilities": {"vision": true, "tools": true, "prompt_cache": true},
                    "quality_score": 0.82,
                    "latency_class": "fast"
                },
                "gpt-4o-mini-2024-07-18": {
                    "display_name": "GPT-4o mini",
                    "category": "workhorse",
                    "context_window": 128000,
                    "output_ceiling": 16384,
                    "input_price_per_mtok": 0.15,
                    "output_price_per_mtok": 0.60,
                    "cache_read_price_per_mtok": 0.075,
                    "capabilities": {"vision": true, "tools": true, "prompt_cache": true},
                    "quality_score": 0.66,
                    "latency_class": "fast"
                },
                "gpt-4o-mini": {
                    "display_name": "GPT-4o mini (stable alias)",
                    "category": "workhorse",
                    "context_window": 128000,
                    "output_ceiling": 16384,
                    "input_price_per_mtok": 0.15,
                    "output_price_per_mtok": 0.60,
                    "cache_read_price_per_mtok": 0.075,
                    "capabilities": {"vision": true, "tools": true, "prompt_cache": true},
                    "quality_score": 0.66,
                    "latency_class": "fast"
                },
                "o1-2024-12-17": {
                    "display_name": "o1",
                    "category": "reasoning",
                    "context_window": 200000,
                    "output_ceiling": 100000,
                    "input_price_per_mtok": 15.00,
                    "output_price_per_mtok": 60.00,
                    "cache_read_price_per_mtok": 7.50,
                    "capabilities": {"vision": true, "tools": true, "reasoning": true, "prompt_cache": true},
                    "quality_score": 0.95,
                    "latency_class": "slow",
                    "fixed_temperature": 1.0
                }
            },
            "anthropic": {
                "claude-3-5-sonnet-20241022": {
                    "display_name": "Claude 3.5 Sonnet",
                    "category": "frontier",
                    "context_window": 200000,
                    "output_ceiling": 8192,
                    "input_price_per_mtok": 3.00,
                    "output_price_per_mtok": 15.00,
                    "cache_write_price_per_mtok": 3.75,
                    "cache_read_price_per_mtok": 0.30,
                    "capabilities": {"vision": true, "tools": true, "prompt_cache": true},
                    "quality_score": 0.88,
                    "latency_class": "standard"
                },
                "claude-3-5-haiku-20241022": {
                    "display_name": "Claude 3.5 Haiku",
                    "category": "workhorse",
                    "context_window": 200000,
                    "output_ceiling": 8192,
                    "input_price_per_mtok": 0.80,
                    "output_price_per_mtok": 4.00,
                    "cache_write_price_per_mtok": 1.00,
                    "cache_read_price_per_mtok": 0.08,
                    "capabilities": {"tools": true, "prompt_cache": true},
                    "quality_score": 0.70,
                    "latency_class": "fast"
                },
                "claude-3-opus-20240229": {
                    "display_name": "Claude 3 Opus",
                    "category": "frontier",
                    "context_window": 200000,
                    "output_ceiling": 4096,
                    "input_price_per_mtok": 15.00,
                    "output_price_per_mtok": 75.00,
                    "cache_write_price_per_mtok": 18.75,
                    "cache_read_price_per_mtok": 1.50,
                    "capabilities": {"vision": true, "tools": true, "prompt_cache": true},
                    "quality_score": 0.90,
                    "latency_class": "slow",
                    "deprecated": true,
                    "deprecated_date": "2025-01-06",
                    "replacement_model": "claude-3-5-sonnet-20241022"
                }
            },
            "google": {
                "gemini-1.5-pro-002": {
                    "display_name": "Gemini 1.5 Pro",
                    "category": "frontier",
                    "context_window": 2000000,
                    "output_ceiling": 8192,
                    "input_price_per_mtok": 1.25,
                    "output_price_per_mtok": 5.00,
                    "capabilities": {"vision": true, "tools": true},
                    "quality_score": 0.80,
                    "latency_class": "standard"
                },
                "gemini-2.0-flash": {
                    "display_name": "Gemini 2.0 Flash",
                    "category": "workhorse",
                    "context_window": 1000000,
                    "output_ceiling": 8192,
                    "input_price_per_mtok": 0.10,
                    "output_price_per_mtok": 0.40,
                    "capabilities": {"vision": true, "tools": true},
                    "quality_score": 0.72,
                    "latency_class": "ultra"
                }
            },
            "deepseek": {
                "deepseek-chat": {
                    "display_name": "DeepSeek V3",
                    "category": "workhorse",
                    "context_window": 64000,
                    "output_ceiling": 8192,
                    "input_price_per_mtok": 0.14,
                    "output_price_per_mtok": 0.28,
                    "cache_read_price_per_mtok": 0.014,
                    "capabilities": {"tools": true, "prompt_cache": true},
                    "quality_score": 0.74,
                    "latency_class": "standard"
                },
                "deepseek-reasoner": {
                    "display_name": "DeepSeek R1",
                    "category": "reasoning",
                    "context_window": 64000,
                    "output_ceiling": 8192,
                    "input_price_per_mtok": 0.55,
                    "output_price_per_mtok": 2.19,
                    "capabilities": {"reasoning": true},
                    "quality_score": 0.85,
                    "latency_class": "slow",
                    "fixed_temperature": 1.0
                }
            },
            "groq": {
                "llama-3.1-8b-instant": {
                    "display_name": "Llama 3.1 8B Instant",
                    "category": "fast",
                    "context_window": 131072,
                    "output_ceiling": 8192,
                    "input_price_per_mtok": 0.05,
                    "output_price_per_mtok": 0.08,
                    "capabilities": {"tools": true},
                    "quality_score": 0.45,
                    "latency_class": "ultra"
                },
                "llama-3.3-70b-versatile": {
                    "display_name": "Llama 3.3 70B Versatile",
                    "category": "workhorse",
                    "context_window": 131072,
                    "output_ceiling": 32768,
                    "input_price_per_mtok": 0.59,
                    "output_price_per_mtok": 0.79,
                    "capabilities": {"tools": true},
                    "quality_score": 0.68,
                    "latency_class": "ultra"
                }
            },
            "xai": {
                "grok-2-1212": {
                    "display_name": "Grok 2",
                    "category": "frontier",
                    "context_window": 131072,
                    "output_ceiling": 8192,
                    "input_price_per_mtok": 2.00,
                    "output_price_per_mtok": 10.00,
                    "capabilities": {"tools": true},
                    "quality_score": 0.78,
                    "latency_class": "standard"
                }
            },
            "ollama": {
                "llama3.2": {
                    "display_name": "Llama 3.2 (local)",
                    "category": "local",
                    "context_window": 131072,
                    "output_ceiling": 8192,
                    "input_price_per_mtok": 0.0,
                    "output_price_per_mtok": 0.0,
                    "capabilities": {"tools": true},
                    "quality_score": 0.40,
                    "latency_class": "fast"
                },
                "qwen2.5-coder": {
                    "display_name": "Qwen 2.5 Coder (local)",
                    "category": "local",
                    "context_window": 32768,
                    "output_ceiling": 8192,
                    "input_price_per_mtok": 0.0,
                    "output_price_per_mtok": 0.0,
                    "quality_score": 0.45,
                    "latency_class": "fast"
                }
            },
            "bedrock": {
                "anthropic.claude-3-5-sonnet-20241022-v2:0": {
                    "display_name": "Claude 3.5 Sonnet (Bedrock)",
                    "category": "frontier",
                    "context_window": 200000,
                    "output_ceiling": 8192,
                    "input_price_per_mtok": 3.00,
                    "output_price_per_mtok": 15.00,
                    "capabilities": {"vision": true, "tools": true},
                    "quality_score": 0.88,
                    "latency_class": "standard"
                }
            }
        }
    });

    serde_json::from_value(value).expect("built-in catalog document is well-formed")
}

/// The built-in table; panics only if the built-in document itself is
/// invalid, which the test below pins.
pub fn table() -> CatalogTable {
    CatalogTable::from_document(document()).expect("built-in catalog validates")
}
