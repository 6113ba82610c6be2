//!
//! Provider Implementations Module
//!
//! This module contains the concrete adapters for each supported LLM vendor.
//! Each adapter implements the `Provider` trait defined in `crate::traits`.

pub mod mistral;

pub use mistral::MistralProvider;
