//! Generation service client for contentflow.
//!
//! Provides the `GenerationService` trait the pipeline stages call, the
//! `ProviderAdapter` trait with a `DynProvider` wrapper, a middleware chain,
//! `LlmClient` for routing requests by provider, and helpers that parse model
//! output into structured values.

mod client;
mod extract;
#[cfg(feature = "providers")]
mod openai;
mod provider;
mod service;
mod types;

pub use client::*;
pub use extract::{extract_json_fragment, parse_structured};
#[cfg(feature = "providers")]
pub use openai::OpenAiAdapter;
pub use provider::*;
pub use service::*;
pub use types::*;
