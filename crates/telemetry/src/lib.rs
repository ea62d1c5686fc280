//! Token accounting for Patchloop.
//!
//! Tracks input/output tokens per logical model role (main conversation,
//! tool-result follow-ups, code editing, execution summaries) and renders
//! usage reports with context-window share and estimated cost.

pub mod model;
pub mod pricing;
pub mod tracker;

pub use model::{ModelRole, RoleUsage, TokenCounters, UsageReport};
pub use pricing::ModelPricing;
pub use tracker::TokenTracker;
