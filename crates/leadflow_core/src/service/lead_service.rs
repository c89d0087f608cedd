//! Lead use-case service.
//!
//! # Responsibility
//! - Provide lead CRUD and listing entry points for request layers.
//! - Announce every committed mutation through the broadcast manager.
//!
//! # Invariants
//! - A broadcast is sent only after the repository call succeeded.
//! - Broadcast outcome never changes the result returned to the caller.
//! - `total` in list responses uses the same search predicate as `items`.

use crate::model::lead::{Lead, LeadUpdate, NewLead};
use crate::model::page::{PageRequest, PaginatedResponse};
use crate::realtime::broadcast::{BroadcastManager, LeadAction};
use crate::repo::lead_repo::{LeadError, LeadRepository, LeadResult};
use crate::repo::query::LeadListQuery;
use log::{error, warn};

/// Use-case service combining lead persistence and change fan-out.
pub struct LeadService<R: LeadRepository> {
    repo: R,
    broadcaster: BroadcastManager,
}

impl<R: LeadRepository> LeadService<R> {
    pub fn new(repo: R, broadcaster: BroadcastManager) -> Self {
        Self { repo, broadcaster }
    }

    pub fn broadcaster(&self) -> &BroadcastManager {
        &self.broadcaster
    }

    /// Creates a lead and announces it.
    ///
    /// # Errors
    /// - `Validation` for malformed input.
    /// - `DuplicateLead` when the email is already used.
    pub fn create_lead(&self, input: &NewLead, actor_id: &str) -> LeadResult<Lead> {
        let result = input
            .validate()
            .map_err(LeadError::from)
            .and_then(|()| self.ensure_email_free(&input.email))
            .and_then(|()| self.repo.create(input));
        let lead = log_failure("lead_create", result)?;
        self.broadcaster
            .broadcast_lead_change(&lead, LeadAction::Create, actor_id);
        Ok(lead)
    }

    pub fn get_lead(&self, id: &str) -> LeadResult<Lead> {
        log_failure("lead_get", self.repo.get(id))
    }

    /// Applies a partial update and announces the new state.
    pub fn update_lead(&self, id: &str, changes: &LeadUpdate, actor_id: &str) -> LeadResult<Lead> {
        let lead = log_failure("lead_update", self.repo.update(id, changes))?;
        self.broadcaster
            .broadcast_lead_change(&lead, LeadAction::Update, actor_id);
        Ok(lead)
    }

    /// Deletes a lead and announces the removed record.
    pub fn delete_lead(&self, id: &str, actor_id: &str) -> LeadResult<Lead> {
        let lead = log_failure("lead_delete", self.repo.delete(id))?;
        self.broadcaster
            .broadcast_lead_change(&lead, LeadAction::Delete, actor_id);
        Ok(lead)
    }

    /// Returns one page of leads plus the unpaginated match count.
    pub fn list_leads(&self, request: &PageRequest) -> LeadResult<PaginatedResponse<Lead>> {
        let result = request
            .validate()
            .map_err(LeadError::from)
            .and_then(|()| {
                let items = self.repo.get_multi(&LeadListQuery::from(request))?;
                let total = self.repo.get_count(request.search_term())?;
                Ok(PaginatedResponse::new(
                    items,
                    total,
                    request.page,
                    request.page_size,
                ))
            });
        log_failure("lead_list", result)
    }

    fn ensure_email_free(&self, email: &str) -> LeadResult<()> {
        match self.repo.get_by_email(email)? {
            Some(_) => Err(LeadError::DuplicateLead(email.to_string())),
            None => Ok(()),
        }
    }
}

fn log_failure<T>(event: &str, result: LeadResult<T>) -> LeadResult<T> {
    if let Err(err) = &result {
        if err.is_domain() {
            warn!(
                "event={event} module=service status=rejected status_code={} error_code={}",
                err.status_code(),
                err.error_code()
            );
        } else {
            error!(
                "event={event} module=service status=error status_code={} error_code={} error={}",
                err.status_code(),
                err.error_code(),
                err
            );
        }
    }
    result
}
