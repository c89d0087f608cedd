//! Lead lifecycle engine.
//! Owns lead persistence, the stage audit trail, paginated search and
//! real-time change fan-out.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod realtime;
pub mod repo;
pub mod service;

pub use config::{ConfigError, LeadflowConfig};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::lead::{
    Lead, LeadId, LeadUpdate, LeadValidationError, NewLead, Stage, StageChange, StagePolicy,
    StageProgress, DEFAULT_STATUS,
};
pub use model::page::{PageRequest, PaginatedResponse, SortField};
pub use realtime::broadcast::{
    BroadcastError, BroadcastManager, BroadcastReport, ChannelObserver, ConnectionId,
    DeliveryError, LeadAction, LeadChangeEvent, ObserverConnection,
};
pub use repo::lead_repo::{LeadError, LeadRepository, LeadResult, SqliteLeadRepository};
pub use repo::query::LeadListQuery;
pub use service::lead_service::LeadService;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
