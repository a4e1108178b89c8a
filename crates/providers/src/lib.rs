//! LLM provider implementations for IronLoom.
//!
//! All providers implement the `ironloom_core::Provider` trait. The runtime
//! ships one transport, an OpenAI-compatible client pointed at OpenRouter
//! by default.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
