//! Utility modules for the gateway core
//!
//! - **tokens**: tokenizer heuristic used by routing, budget pre-flight,
//!   and vendors that report no usage
//! - **logging**: tracing subscriber initialization

pub mod logging;
pub mod tokens;
