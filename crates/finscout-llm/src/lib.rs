//! Chat and embedding provider abstraction.
//!
//! Every model interaction in finscout goes through [`LlmProvider`]: the
//! stage runner uses `chat`, the knowledge index and the retrieval gateway
//! use `embed`.

pub mod any;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod ollama;
pub mod provider;

pub use any::AnyProvider;
pub use error::LlmError;
pub use provider::{LlmProvider, Message, Role};
