//! Audit event module
//!
//! Append-only JSONL audit trail and the reader used to query it.

pub mod replay;
pub mod store;

pub use replay::{AuditSummary, EventFilter, EventReader};
pub use store::EventStore;
