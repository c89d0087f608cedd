//! Lead domain model.
//!
//! # Responsibility
//! - Define the lead record, its pipeline stages and stage audit entries.
//! - Validate client-supplied lead input before it reaches the store.
//!
//! # Invariants
//! - `id` is assigned once by the repository and never reused.
//! - `stage_history` is append-only and never empty for a persisted lead.
//! - The last `stage_history` entry always ends at `current_stage`.

use chrono::{DateTime, SubsecRound, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Store-assigned lead identifier.
pub type LeadId = Uuid;

pub const NAME_MAX_CHARS: usize = 100;
pub const COMPANY_MAX_CHARS: usize = 100;
pub const EMAIL_MAX_CHARS: usize = 254;
pub const STATUS_MAX_CHARS: usize = 50;
/// Status given to leads created without one. `Lead::status` is free text.
pub const DEFAULT_STATUS: &str = "not_engaged";
pub const STAGE_NOTE_MAX_CHARS: usize = 500;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@.]+(\.[^\s@.]+)+$").expect("email pattern must compile")
});

/// Current wall-clock time truncated to millisecond precision.
///
/// The store keeps epoch milliseconds, so every timestamp handed out by the
/// core is truncated up-front to compare equal after a round-trip.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Ordered sales pipeline.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    NewLead,
    InitialContact,
    MeetingScheduled,
    ProposalSent,
    Negotiation,
    ClosedWon,
}

impl Stage {
    /// All stages in pipeline order.
    pub const ALL: [Stage; 6] = [
        Stage::NewLead,
        Stage::InitialContact,
        Stage::MeetingScheduled,
        Stage::ProposalSent,
        Stage::Negotiation,
        Stage::ClosedWon,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewLead => "new_lead",
            Self::InitialContact => "initial_contact",
            Self::MeetingScheduled => "meeting_scheduled",
            Self::ProposalSent => "proposal_sent",
            Self::Negotiation => "negotiation",
            Self::ClosedWon => "closed_won",
        }
    }

    /// Zero-based position in the pipeline.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_final(self) -> bool {
        self == Self::ClosedWon
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = LeadValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == value.trim())
            .ok_or_else(|| LeadValidationError::UnknownStage(value.to_string()))
    }
}

/// Which stage moves are accepted on update.
///
/// `Any` keeps the permissive product behavior; `ForwardOnly` rejects moves
/// to an earlier pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StagePolicy {
    #[default]
    Any,
    ForwardOnly,
}

impl StagePolicy {
    pub fn permits(self, from: Stage, to: Stage) -> bool {
        match self {
            Self::Any => true,
            Self::ForwardOnly => to.index() >= from.index(),
        }
    }
}

impl FromStr for StagePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "any" => Ok(Self::Any),
            "forward_only" | "forward-only" => Ok(Self::ForwardOnly),
            other => Err(format!(
                "unsupported stage policy `{other}`; expected any|forward_only"
            )),
        }
    }
}

/// One audited stage transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageChange {
    /// `None` only for the entry recorded at creation.
    pub from_stage: Option<Stage>,
    pub to_stage: Stage,
    pub changed_at: DateTime<Utc>,
    pub note: Option<String>,
}

impl StageChange {
    pub fn initial(stage: Stage, changed_at: DateTime<Utc>) -> Self {
        Self {
            from_stage: None,
            to_stage: stage,
            changed_at,
            note: None,
        }
    }

    pub fn transition(
        from: Stage,
        to: Stage,
        changed_at: DateTime<Utc>,
        note: Option<String>,
    ) -> Self {
        Self {
            from_stage: Some(from),
            to_stage: to,
            changed_at,
            note,
        }
    }
}

/// Persisted lead record, serialized with the wire field names observers
/// already consume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub name: String,
    pub email: String,
    pub company: String,
    pub status: String,
    pub engaged: bool,
    pub current_stage: Stage,
    pub stage_updated_at: Option<DateTime<Utc>>,
    pub stage_history: Vec<StageChange>,
    pub last_contacted: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Position of a lead within the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageProgress {
    pub current_stage: Stage,
    pub current_index: usize,
    pub total_stages: usize,
    pub progress_percentage: f64,
}

impl Lead {
    /// Computes pipeline progress; the final stage always reports 100%.
    pub fn stage_progress(&self) -> StageProgress {
        let current_index = self.current_stage.index();
        let total_stages = Stage::ALL.len() - 1;
        let progress_percentage = if self.current_stage.is_final() {
            100.0
        } else {
            current_index as f64 / total_stages as f64 * 100.0
        };
        StageProgress {
            current_stage: self.current_stage,
            current_index,
            total_stages,
            progress_percentage,
        }
    }
}

/// Input for creating a lead. Server-managed fields are absent by type.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewLead {
    pub name: String,
    pub email: String,
    pub company: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub engaged: bool,
    #[serde(default)]
    pub current_stage: Stage,
    #[serde(default)]
    pub last_contacted: Option<DateTime<Utc>>,
}

fn default_status() -> String {
    DEFAULT_STATUS.to_string()
}

impl NewLead {
    /// Creates input with the default status, stage and engagement flag.
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        company: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            company: company.into(),
            status: default_status(),
            engaged: false,
            current_stage: Stage::default(),
            last_contacted: None,
        }
    }

    pub fn validate(&self) -> Result<(), LeadValidationError> {
        validate_text("name", &self.name, NAME_MAX_CHARS)?;
        validate_email(&self.email)?;
        validate_text("company", &self.company, COMPANY_MAX_CHARS)?;
        validate_status(&self.status)?;
        Ok(())
    }
}

/// Partial update. `None` means "leave unchanged"; for the nullable
/// `last_contacted`, `Some(None)` clears the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LeadUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub engaged: Option<bool>,
    #[serde(default)]
    pub current_stage: Option<Stage>,
    /// Stored on the history entry for this update's stage change. Rejected
    /// when `current_stage` is absent or equals the stored stage.
    #[serde(default)]
    pub stage_note: Option<String>,
    #[serde(default, deserialize_with = "deserialize_present")]
    pub last_contacted: Option<Option<DateTime<Utc>>>,
}

fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl LeadUpdate {
    /// Returns whether no field is present.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.company.is_none()
            && self.status.is_none()
            && self.engaged.is_none()
            && self.current_stage.is_none()
            && self.stage_note.is_none()
            && self.last_contacted.is_none()
    }

    pub fn validate(&self) -> Result<(), LeadValidationError> {
        if let Some(name) = &self.name {
            validate_text("name", name, NAME_MAX_CHARS)?;
        }
        if let Some(email) = &self.email {
            validate_email(email)?;
        }
        if let Some(company) = &self.company {
            validate_text("company", company, COMPANY_MAX_CHARS)?;
        }
        if let Some(status) = &self.status {
            validate_status(status)?;
        }
        if let Some(note) = &self.stage_note {
            check_length("stage_note", note, STAGE_NOTE_MAX_CHARS)?;
            if self.current_stage.is_none() {
                return Err(LeadValidationError::NoteWithoutStage);
            }
        }
        Ok(())
    }
}

/// Field-level validation failure for lead input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeadValidationError {
    EmptyField(&'static str),
    TooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },
    InvalidEmail(String),
    UnknownStage(String),
    NoteWithoutStage,
    InvalidPage(u32),
    InvalidPageSize(u32),
}

impl Display for LeadValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyField(field) => write!(f, "{field} must not be empty"),
            Self::TooLong { field, max, actual } => {
                write!(f, "{field} is {actual} chars; at most {max} allowed")
            }
            Self::InvalidEmail(value) => write!(f, "invalid email address `{value}`"),
            Self::UnknownStage(value) => write!(f, "unknown pipeline stage `{value}`"),
            Self::NoteWithoutStage => {
                write!(f, "stage_note requires a change of current_stage")
            }
            Self::InvalidPage(page) => write!(f, "page must be >= 1, got {page}"),
            Self::InvalidPageSize(size) => {
                write!(f, "page_size must be within 1..=100, got {size}")
            }
        }
    }
}

impl Error for LeadValidationError {}

fn validate_text(
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<(), LeadValidationError> {
    if value.trim().is_empty() {
        return Err(LeadValidationError::EmptyField(field));
    }
    check_length(field, value, max)
}

fn check_length(field: &'static str, value: &str, max: usize) -> Result<(), LeadValidationError> {
    let actual = value.chars().count();
    if actual > max {
        return Err(LeadValidationError::TooLong { field, max, actual });
    }
    Ok(())
}

fn validate_email(value: &str) -> Result<(), LeadValidationError> {
    check_length("email", value, EMAIL_MAX_CHARS)?;
    if !EMAIL_PATTERN.is_match(value) {
        return Err(LeadValidationError::InvalidEmail(value.to_string()));
    }
    Ok(())
}

fn validate_status(value: &str) -> Result<(), LeadValidationError> {
    check_length("status", value, STATUS_MAX_CHARS)
}

#[cfg(test)]
mod tests {
    use super::{Lead, LeadUpdate, LeadValidationError, NewLead, Stage, StagePolicy};
    use chrono::Utc;

    #[test]
    fn stage_parses_wire_names() {
        assert_eq!("proposal_sent".parse::<Stage>().unwrap(), Stage::ProposalSent);
        assert!(matches!(
            "won".parse::<Stage>(),
            Err(LeadValidationError::UnknownStage(_))
        ));
    }

    #[test]
    fn forward_only_rejects_backward_moves() {
        assert!(StagePolicy::Any.permits(Stage::Negotiation, Stage::NewLead));
        assert!(StagePolicy::ForwardOnly.permits(Stage::NewLead, Stage::Negotiation));
        assert!(!StagePolicy::ForwardOnly.permits(Stage::Negotiation, Stage::NewLead));
    }

    #[test]
    fn email_validation_requires_domain_dot() {
        assert!(NewLead::new("A", "a@x.com", "Acme").validate().is_ok());
        for bad in ["a@x", "ax.com", "a b@x.com", "@x.com", "a@.com"] {
            let err = NewLead::new("A", bad, "Acme").validate().unwrap_err();
            assert!(
                matches!(err, LeadValidationError::InvalidEmail(_)),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn blank_name_and_long_company_are_rejected() {
        let err = NewLead::new("   ", "a@x.com", "Acme").validate().unwrap_err();
        assert_eq!(err, LeadValidationError::EmptyField("name"));

        let err = NewLead::new("A", "a@x.com", "c".repeat(101))
            .validate()
            .unwrap_err();
        assert_eq!(
            err,
            LeadValidationError::TooLong {
                field: "company",
                max: 100,
                actual: 101
            }
        );
    }

    #[test]
    fn update_distinguishes_absent_from_null_last_contacted() {
        let absent: LeadUpdate = serde_json::from_str(r#"{"engaged": true}"#).unwrap();
        assert_eq!(absent.last_contacted, None);

        let cleared: LeadUpdate = serde_json::from_str(r#"{"last_contacted": null}"#).unwrap();
        assert_eq!(cleared.last_contacted, Some(None));
        assert!(!cleared.is_empty());
    }

    #[test]
    fn stage_note_without_stage_is_rejected() {
        let update = LeadUpdate {
            stage_note: Some("called back".to_string()),
            ..LeadUpdate::default()
        };
        assert_eq!(
            update.validate().unwrap_err(),
            LeadValidationError::NoteWithoutStage
        );
    }

    #[test]
    fn stage_progress_reports_final_stage_as_complete() {
        let now = Utc::now();
        let mut lead = Lead {
            id: uuid::Uuid::new_v4(),
            name: "A".to_string(),
            email: "a@x.com".to_string(),
            company: "Acme".to_string(),
            status: "not_engaged".to_string(),
            engaged: false,
            current_stage: Stage::NewLead,
            stage_updated_at: Some(now),
            stage_history: Vec::new(),
            last_contacted: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(lead.stage_progress().progress_percentage, 0.0);

        lead.current_stage = Stage::MeetingScheduled;
        let progress = lead.stage_progress();
        assert_eq!(progress.current_index, 2);
        assert_eq!(progress.total_stages, 5);
        assert!((progress.progress_percentage - 40.0).abs() < f64::EPSILON);

        lead.current_stage = Stage::ClosedWon;
        assert_eq!(lead.stage_progress().progress_percentage, 100.0);
    }
}
