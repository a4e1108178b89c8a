//! Model metadata and cost accounting for IronLoom.
//!
//! The [`ModelCache`] holds the provider's model listing (context windows,
//! output limits, live prices) and is shared by every running agent. The
//! [`PricingTable`] turns a run's token usage into USD.

pub mod models;
pub mod pricing;

pub use models::{
    DEFAULT_CONTEXT_WINDOW, DEFAULT_MAX_TOKENS, MODEL_HAIKU, MODEL_OPUS, MODEL_SONNET, ModelCache,
    resolve_model,
};
pub use pricing::{DEFAULT_PRICING, ModelPricing, PricingTable};
