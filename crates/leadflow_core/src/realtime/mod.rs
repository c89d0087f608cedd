//! Real-time change notification for connected observers.
//!
//! # Responsibility
//! - Own the observer connection registry for the process lifetime.
//! - Fan out committed lead mutations as JSON frames.
//!
//! # Invariants
//! - Delivery is best-effort and at-most-once; there is no acknowledgment.

pub mod broadcast;
