//! Model catalog
//!
//! Single source of truth for pricing, context windows, capabilities, and
//! deprecation. Consumed by the router, the cost accountant, and request
//! validation.

pub mod defaults;
pub mod entry;
pub mod loader;
pub mod registry;

pub use entry::{LatencyClass, ModelCapabilities, ModelEntry, STABLE_ALIASES};
pub use loader::{CatalogDocument, CatalogTable, Violation};
pub use registry::Catalog;
