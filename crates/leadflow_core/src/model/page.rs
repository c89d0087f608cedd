//! Page request and paginated response envelope.

use crate::model::lead::LeadValidationError;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Lead fields accepted as sort keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    Name,
    Email,
    Company,
    /// Sorted by pipeline position, not alphabetically.
    CurrentStage,
    StageUpdatedAt,
    LastContacted,
}

impl SortField {
    pub const ALL: [SortField; 8] = [
        SortField::CreatedAt,
        SortField::UpdatedAt,
        SortField::Name,
        SortField::Email,
        SortField::Company,
        SortField::CurrentStage,
        SortField::StageUpdatedAt,
        SortField::LastContacted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
            Self::Name => "name",
            Self::Email => "email",
            Self::Company => "company",
            Self::CurrentStage => "current_stage",
            Self::StageUpdatedAt => "stage_updated_at",
            Self::LastContacted => "last_contacted",
        }
    }
}

impl Display for SortField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|field| field.as_str() == value.trim())
            .ok_or_else(|| format!("unsupported sort field `{value}`"))
    }
}

/// Client page request. Defaults: page 1, 10 per page, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PageRequest {
    /// 1-based page number.
    pub page: u32,
    pub page_size: u32,
    pub sort_by: SortField,
    pub sort_desc: bool,
    pub search: Option<String>,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            sort_by: SortField::default(),
            sort_desc: true,
            search: None,
        }
    }
}

impl PageRequest {
    pub fn validate(&self) -> Result<(), LeadValidationError> {
        if self.page == 0 {
            return Err(LeadValidationError::InvalidPage(self.page));
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(LeadValidationError::InvalidPageSize(self.page_size));
        }
        Ok(())
    }

    /// Number of matching rows before this page.
    pub fn skip(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }

    /// Trimmed search term; blank terms mean "match everything".
    pub fn search_term(&self) -> Option<&str> {
        normalize_search(self.search.as_deref())
    }
}

/// Normalizes a raw search term: trims and maps blank input to `None`.
pub fn normalize_search(search: Option<&str>) -> Option<&str> {
    search.map(str::trim).filter(|term| !term.is_empty())
}

/// One page of results plus the unpaginated match count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    /// Builds the envelope; `total_pages = ceil(total / page_size)`.
    pub fn new(items: Vec<T>, total: u64, page: u32, page_size: u32) -> Self {
        let total_pages = if page_size == 0 {
            0
        } else {
            total.div_ceil(u64::from(page_size))
        };
        Self {
            items,
            total,
            page,
            page_size,
            total_pages,
        }
    }
}
