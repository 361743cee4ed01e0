//! API Middleware Module
//!
//! The request-processing pipeline around the forwarding handler, in strict
//! order: identity verification, per-identity rate limiting, usage
//! recording. Each stage is its own middleware so the ordering is visible
//! at the composition site.

pub mod auth;
pub mod rate_limit;
pub mod usage;

pub use auth::IdentityGuard;
pub use rate_limit::QuotaGuard;
pub use usage::UsageRecorder;
