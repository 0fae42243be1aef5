//! The live catalog registry
//!
//! Read-mostly: readers grab an immutable snapshot and never block the
//! writer; reloads swap the whole table atomically and keep the previous
//! snapshot on failure.

use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{error, info, warn};

use super::loader::{build_table, parse_file, CatalogTable, Violation};
use crate::error::{GatewayError, Result};
use crate::types::{Capability, ChatRequest, ProviderId};
use crate::utils::tokens;

/// Process-wide model catalog with atomic snapshot replacement.
pub struct Catalog {
    table: ArcSwap<CatalogTable>,
}

impl Catalog {
    pub fn new(table: CatalogTable) -> Self {
        Self {
            table: ArcSwap::from_pointee(table),
        }
    }

    /// Catalog seeded with the built-in model table.
    pub fn with_defaults() -> Self {
        Self::new(super::defaults::table())
    }

    /// Current immutable snapshot.
    pub fn snapshot(&self) -> Arc<CatalogTable> {
        self.table.load_full()
    }

    /// Replace the table from a document file. Fail-closed: on any parse or
    /// validation error the previous snapshot remains in effect.
    pub fn reload_from_path(&self, path: &Path) -> Result<()> {
        let table = parse_file(path).and_then(build_table);
        match table {
            Ok(table) => {
                info!(
                    version = %table.version,
                    models = table.len(),
                    "catalog reloaded"
                );
                self.table.store(Arc::new(table));
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "catalog reload failed, previous snapshot retained");
                Err(e)
            }
        }
    }

    /// First entry registered under a bare model id.
    pub fn lookup(&self, model: &str) -> Option<crate::catalog::ModelEntry> {
        self.table.load().lookup(model).cloned()
    }

    /// Entry for an exact `(provider, model)` pair.
    pub fn lookup_pair(
        &self,
        provider: ProviderId,
        model: &str,
    ) -> Option<crate::catalog::ModelEntry> {
        self.table.load().lookup_pair(provider, model).cloned()
    }

    /// All entries, optionally restricted to one provider.
    pub fn list(&self, provider: Option<ProviderId>) -> Vec<crate::catalog::ModelEntry> {
        self.table
            .load()
            .entries()
            .iter()
            .filter(|e| provider.map(|p| e.provider == p).unwrap_or(true))
            .cloned()
            .collect()
    }

    /// Deprecation flag and suggested replacement for a model.
    pub fn is_deprecated(&self, model: &str) -> Option<(bool, Option<String>)> {
        self.table
            .load()
            .lookup(model)
            .map(|e| (e.deprecated, e.replacement_model.clone()))
    }

    /// Cheap capability query for a known pair.
    pub fn supports(&self, provider: ProviderId, model: &str, capability: Capability) -> bool {
        self.table
            .load()
            .lookup_pair(provider, model)
            .map(|e| e.supports(capability))
            .unwrap_or(false)
    }

    /// Collect every validation violation for a request against the catalog.
    pub fn validate_request(&self, request: &ChatRequest) -> Vec<Violation> {
        let mut violations = Vec::new();
        let mut push = |location: &str, message: String| {
            violations.push(Violation {
                location: location.to_string(),
                message,
            })
        };

        if request.messages.is_empty() {
            push("messages", "a request needs at least one message".to_string());
            return violations;
        }
        if let Some(last) = request.messages.last() {
            use crate::types::MessageRole;
            if !matches!(last.role, MessageRole::User | MessageRole::Assistant) {
                push(
                    "messages",
                    format!("final message must be user (or a resumed assistant turn), got {}", last.role),
                );
            }
        }

        let table = self.table.load();
        let entry = match table.lookup(&request.model) {
            Some(e) => e,
            None => {
                push("model", format!("model {} not in catalog", request.model));
                return violations;
            }
        };

        if request.has_images() && !entry.supports(Capability::Vision) {
            push("messages", format!("model {} does not support vision", entry.model));
        }
        if request.tools.is_some() && !entry.supports(Capability::Tools) {
            push("tools", format!("model {} does not support tools", entry.model));
        }

        // Pinned-temperature models ignore the field entirely.
        if entry.fixed_temperature.is_none() {
            let max = entry.max_temperature();
            if !(0.0..=max).contains(&request.temperature) {
                push(
                    "temperature",
                    format!(
                        "temperature {} outside [0, {}] for {}",
                        request.temperature, max, entry.model
                    ),
                );
            }
        }

        if let (Some(requested), Some(ceiling)) = (request.max_output_tokens, entry.output_ceiling)
        {
            if requested > ceiling {
                push(
                    "max_output_tokens",
                    format!("{requested} exceeds output ceiling {ceiling} for {}", entry.model),
                );
            }
        }

        let prompt_tokens = tokens::estimate_request(request);
        if prompt_tokens >= entry.context_window {
            push(
                "messages",
                format!(
                    "estimated prompt of {prompt_tokens} tokens does not fit context window {}",
                    entry.context_window
                ),
            );
        }

        violations
    }

    /// Map violations to the taxonomy: unknown model is `ModelNotFound`,
    /// anything else folds into `InvalidRequest`.
    pub fn ensure_valid(&self, request: &ChatRequest) -> Result<()> {
        if !request.messages.is_empty() && self.table.load().lookup(&request.model).is_none() {
            warn!(model = %request.model, "request names a model absent from the catalog");
            return Err(GatewayError::ModelNotFound {
                model: request.model.clone(),
            });
        }
        let violations = self.validate_request(request);
        if violations.is_empty() {
            return Ok(());
        }
        Err(GatewayError::InvalidRequest(
            violations
                .iter()
                .map(Violation::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        ))
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::with_defaults()
    }
}
