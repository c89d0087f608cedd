//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls and change broadcasts into use-case APIs.
//! - Keep request/transport layers decoupled from storage details.

pub mod lead_service;
