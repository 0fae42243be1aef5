//! Normalized value types shared across the gateway
//!
//! One canonical request/response shape regardless of which vendor a call
//! lands on. Provider strategies translate these types to and from the wire.

pub mod common;
pub mod message;
pub mod request;
pub mod response;
pub mod usage;

pub use common::{Capability, ProviderId};
pub use message::{ContentPart, Message, MessageRole};
pub use request::{CachePolicy, ChatRequest, ToolSpec};
pub use response::{ChatResponse, ChunkStream, FinishReason, StreamChunk};
pub use usage::Usage;
