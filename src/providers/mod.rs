//! Upstream provider clients
//!
//! The gateway forwards generate-content traffic to exactly one upstream,
//! Google's Generative Language API. The wire format is treated as opaque:
//! bodies pass through untouched in both directions.

pub mod gemini;

pub use gemini::{GeminiClient, UpstreamError};
