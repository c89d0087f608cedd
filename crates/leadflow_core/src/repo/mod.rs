//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define lead data access contracts.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repository writes validate input before persistence.
//! - Repository APIs return semantic errors (`NotFound`, `DuplicateLead`)
//!   in addition to store transport errors.

pub mod lead_repo;
pub mod query;
