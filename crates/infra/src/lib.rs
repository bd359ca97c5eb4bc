//! # Calbridge Infrastructure
//!
//! Infrastructure implementations of the `calbridge-core` ports.
//!
//! This crate contains:
//! - An in-memory master+exception calendar store
//! - A time-zone aware recurrence expander
//! - A broadcast change sink
//! - Configuration loading and tracing initialisation
//!
//! ## Architecture
//! - Implements traits defined in `calbridge-core`
//! - Contains all "impure" code (environment, files, subscribers)

pub mod config;
pub mod notify;
pub mod observability;
pub mod recurrence;
pub mod store;

// Re-export commonly used items
pub use notify::BroadcastChangeSink;
pub use recurrence::RuleExpander;
pub use store::InMemoryCalendarStore;
