//! # Calbridge Domain
//!
//! Calendar data types and request models shared by every calbridge crate.
//!
//! This crate contains:
//! - Calendar items, identities and recurrence rules
//! - Request states, edit modes, error kinds and change sets
//! - Domain error types and Result definitions
//! - Configuration structures
//!
//! ## Architecture
//! - No dependencies on other calbridge crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
