//! Catalog document parsing and validation
//!
//! The catalog ships as a single structured document. Validation is
//! fail-closed: a document with any violation is rejected whole and the
//! previous table stays in effect.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::entry::{validate_model_id, ModelEntry};
use crate::error::{GatewayError, Result};
use crate::types::ProviderId;

/// On-disk / wire shape of the catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogDocument {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    /// provider id → model id → entry
    pub providers: BTreeMap<String, BTreeMap<String, ModelEntry>>,
}

/// One validation failure, located by document path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub location: String,
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

/// Immutable, validated catalog table. Replaced atomically as a unit.
#[derive(Debug, Clone, Default)]
pub struct CatalogTable {
    pub version: String,
    pub updated: Option<String>,
    entries: Vec<ModelEntry>,
    by_model: HashMap<String, Vec<usize>>,
    by_pair: HashMap<(ProviderId, String), usize>,
}

impl CatalogTable {
    /// Build a table from a parsed document, enforcing every load-time rule.
    pub fn from_document(doc: CatalogDocument) -> std::result::Result<Self, Vec<Violation>> {
        let mut violations = Vec::new();
        let mut entries = Vec::new();

        for (provider_key, models) in &doc.providers {
            let provider = match ProviderId::parse(provider_key) {
                Some(p) => p,
                None => {
                    violations.push(Violation {
                        location: format!("providers.{provider_key}"),
                        message: "unknown provider id".to_string(),
                    });
                    continue;
                }
            };

            for (model_key, entry) in models {
                let location = format!("providers.{provider_key}.{model_key}");
                let mut entry = entry.clone();
                entry.provider = provider;
                entry.model = model_key.clone();

                validate_entry(&entry, &location, &mut violations);
                entries.push(entry);
            }
        }

        if !violations.is_empty() {
            return Err(violations);
        }

        let mut by_model: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_pair = HashMap::new();
        for (i, entry) in entries.iter().enumerate() {
            by_model.entry(entry.model.clone()).or_default().push(i);
            by_pair.insert((entry.provider, entry.model.clone()), i);
        }

        Ok(Self {
            version: doc.version,
            updated: doc.updated,
            entries,
            by_model,
            by_pair,
        })
    }

    /// Reconstruct the document form; `from_document(to_document())` yields
    /// an equal table.
    pub fn to_document(&self) -> CatalogDocument {
        let mut providers: BTreeMap<String, BTreeMap<String, ModelEntry>> = BTreeMap::new();
        for entry in &self.entries {
            providers
                .entry(entry.provider.as_str().to_string())
                .or_default()
                .insert(entry.model.clone(), entry.clone());
        }
        CatalogDocument {
            version: self.version.clone(),
            updated: self.updated.clone(),
            providers,
        }
    }

    pub fn entries(&self) -> &[ModelEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry registered under a bare model id.
    pub fn lookup(&self, model: &str) -> Option<&ModelEntry> {
        self.by_model
            .get(model)
            .and_then(|idxs| idxs.first())
            .map(|&i| &self.entries[i])
    }

    /// Entry for an exact `(provider, model)` pair.
    pub fn lookup_pair(&self, provider: ProviderId, model: &str) -> Option<&ModelEntry> {
        self.by_pair
            .get(&(provider, model.to_string()))
            .map(|&i| &self.entries[i])
    }
}

impl PartialEq for CatalogTable {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.updated == other.updated
            && self.entries == other.entries
    }
}

fn validate_entry(entry: &ModelEntry, location: &str, violations: &mut Vec<Violation>) {
    let mut push = |message: String| {
        violations.push(Violation {
            location: location.to_string(),
            message,
        })
    };

    if entry.context_window == 0 {
        push("context_window must be greater than zero".to_string());
    }
    for (name, price) in [
        ("input_price_per_mtok", Some(entry.input_price_per_mtok)),
        ("output_price_per_mtok", Some(entry.output_price_per_mtok)),
        ("cache_write_price_per_mtok", entry.cache_write_price_per_mtok),
        ("cache_read_price_per_mtok", entry.cache_read_price_per_mtok),
    ] {
        if let Some(price) = price {
            if !price.is_finite() || price < 0.0 {
                push(format!("{name} must be a non-negative finite number"));
            }
        }
    }
    if !(0.0..=1.0).contains(&entry.quality_score) {
        push("quality_score must lie in [0, 1]".to_string());
    }
    if !validate_model_id(entry.provider, &entry.model) {
        push(format!(
            "model id does not match the {} naming convention",
            entry.provider
        ));
    }
    if entry.deprecated_date.is_some() && !entry.deprecated {
        push("deprecated_date set without deprecated flag".to_string());
    }
}

/// Parse a catalog file, JSON or YAML by extension.
pub fn parse_file(path: &Path) -> Result<CatalogDocument> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| GatewayError::Config(format!("cannot read catalog {}: {e}", path.display())))?;

    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    let doc: CatalogDocument = if is_yaml {
        serde_yaml::from_str(&raw)
            .map_err(|e| GatewayError::Config(format!("catalog YAML parse error: {e}")))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| GatewayError::Config(format!("catalog JSON parse error: {e}")))?
    };

    info!(path = %path.display(), providers = doc.providers.len(), "parsed catalog document");
    Ok(doc)
}

/// Validate a document into a table, folding violations into one error.
pub fn build_table(doc: CatalogDocument) -> Result<CatalogTable> {
    CatalogTable::from_document(doc).map_err(|violations| {
        let joined = violations
            .iter()
            .map(Violation::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        GatewayError::Config(format!("catalog validation failed: {joined}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_doc() -> CatalogDocument {
        serde_json::from_value(json!({
            "version": "test",
            "providers": {
                "groq": {
                    "llama-3.1-8b-instant": {
                        "context_window": 131072,
                        "input_price_per_mtok": 0.05,
                        "output_price_per_mtok": 0.08
                    }
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_keys_fill_entry_identity() {
        let table = CatalogTable::from_document(minimal_doc()).unwrap();
        let entry = table.lookup("llama-3.1-8b-instant").unwrap();
        assert_eq!(entry.provider, ProviderId::Groq);
        assert_eq!(entry.model, "llama-3.1-8b-instant");
    }

    #[test]
    fn test_zero_context_window_rejected() {
        let doc: CatalogDocument = serde_json::from_value(json!({
            "version": "test",
            "providers": {
                "groq": {
                    "llama-3.1-8b-instant": {
                        "context_window": 0,
                        "input_price_per_mtok": 0.05,
                        "output_price_per_mtok": 0.08
                    }
                }
            }
        }))
        .unwrap();
        let err = CatalogTable::from_document(doc).unwrap_err();
        assert_eq!(err.len(), 1);
        assert!(err[0].message.contains("context_window"));
    }

    #[test]
    fn test_negative_price_rejected() {
        let doc: CatalogDocument = serde_json::from_value(json!({
            "version": "test",
            "providers": {
                "groq": {
                    "llama-3.1-8b-instant": {
                        "context_window": 131072,
                        "input_price_per_mtok": -0.05,
                        "output_price_per_mtok": 0.08
                    }
                }
            }
        }))
        .unwrap();
        assert!(CatalogTable::from_document(doc).is_err());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let doc: CatalogDocument = serde_json::from_value(json!({
            "version": "test",
            "providers": {
                "acme": {
                    "acme-1": {
                        "context_window": 1000,
                        "input_price_per_mtok": 1.0,
                        "output_price_per_mtok": 1.0
                    }
                }
            }
        }))
        .unwrap();
        let err = CatalogTable::from_document(doc).unwrap_err();
        assert!(err[0].message.contains("unknown provider"));
    }

    #[test]
    fn test_undated_openai_id_rejected() {
        let doc: CatalogDocument = serde_json::from_value(json!({
            "version": "test",
            "providers": {
                "openai": {
                    "gpt-custom": {
                        "context_window": 1000,
                        "input_price_per_mtok": 1.0,
                        "output_price_per_mtok": 1.0
                    }
                }
            }
        }))
        .unwrap();
        let err = CatalogTable::from_document(doc).unwrap_err();
        assert!(err[0].message.contains("naming convention"));
    }

    #[test]
    fn test_document_round_trip() {
        let table = CatalogTable::from_document(minimal_doc()).unwrap();
        let doc = table.to_document();
        let reloaded = CatalogTable::from_document(doc).unwrap();
        assert_eq!(table, reloaded);
    }
}
