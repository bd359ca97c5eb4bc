//! # Calbridge Core
//!
//! Request orchestration for an asynchronous calendar store, with no
//! infrastructure dependencies.
//!
//! This crate contains:
//! - Port interfaces for the store, recurrence expansion and change
//!   notification
//! - The request lifecycle: handles, registration, cancellation and waits
//! - Per-collection batching, occurrence splitting and result aggregation
//! - The occurrence query engine and the backend facade
//!
//! ## Architecture Principles
//! - Only depends on `calbridge-domain`
//! - All external collaborators via traits
//! - One driving task per request; store calls fan out inside it

pub mod backend;
pub mod calendar_ports;
pub mod query;
pub mod request;

pub use backend::{CalendarBackend, QueryResult, RemoveResult, SaveResult};
pub use calendar_ports::{
    CalendarStore, ChangeSink, ItemUpdate, MasterRef, NullChangeSink, RecurrenceExpander,
    SavedItem, SessionRef, StoreResult,
};
pub use query::{generated_occurrence, QueryEngine, QueryOutput};
pub use request::{
    OperationHandle, Request, RequestId, RequestLifecycle, RequestOrchestrator, RequestPayload,
};
