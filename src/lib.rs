//! Reelseek - semantic search over a festival film catalogue
//!
//! Embeds a chosen text column of a film catalogue, builds one similarity collection per
//! index configuration in a vector store, answers free-text queries against any of them
//! and benchmarks the configurations side by side.

pub mod benchmark;
pub mod builder;
pub mod catalogue;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod query;
pub mod registry;
pub mod store;

pub use error::{ReelseekError, Result};
