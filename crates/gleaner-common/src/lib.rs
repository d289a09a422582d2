//! Gleaner Common Library
//!
//! Shared types, utilities, and error handling for the Gleaner workspace.
//!
//! # Overview
//!
//! This crate provides common functionality used across all Gleaner workspace
//! members:
//!
//! - **Error Handling**: Custom error types and result types
//! - **Logging**: Centralized tracing initialization
//! - **Types**: Shared domain types (channel identifiers)

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{GleanerError, Result};
pub use types::ChannelId;
