//! Research tools for contentflow.
//!
//! Provides the `SearchTool` trait the research stage calls, a
//! `FirecrawlSearchTool` web search client, a `StaticSearchTool` for offline
//! runs, and char-boundary-safe truncation of tool output.

pub mod firecrawl;
pub mod tool;
pub mod truncation;

pub use firecrawl::FirecrawlSearchTool;
pub use tool::{DynSearchTool, SearchTool, StaticSearchTool};
pub use truncation::{truncate_chars, TruncationMode};
