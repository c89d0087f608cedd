//! Lead domain model and query envelopes.
//!
//! # Responsibility
//! - Define the lead record, stage pipeline and audit entries.
//! - Define page requests and the paginated response envelope.
//!
//! # Invariants
//! - Every lead is identified by a store-assigned `LeadId`.
//! - Stage history is append-only.

pub mod lead;
pub mod page;
