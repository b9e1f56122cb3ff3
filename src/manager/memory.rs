//! In-memory storage backed by `DashMap`.
//!
//! `modify_*` holds the entry's shard lock for the duration of the closure, so
//! writers to the same aggregate are serialized. The closure works on a copy
//! that replaces the stored value only on success.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{Page, PageRequest, RequestFilter, RequestStats, Storage, VolunteerFilter};
use crate::domain::actor::AccountId;
use crate::domain::request::{HelpRequest, RequestId};
use crate::domain::volunteer::{Volunteer, VolunteerId, VolunteerStatus};
use crate::error::{LifelineError, Result};

#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    requests: Arc<DashMap<RequestId, HelpRequest>>,
    volunteers: Arc<DashMap<VolunteerId, Volunteer>>,
    volunteers_by_account: Arc<DashMap<AccountId, VolunteerId>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn insert_request(&self, request: HelpRequest) -> Result<()> {
        match self.requests.entry(request.id) {
            Entry::Occupied(_) => Err(LifelineError::Conflict(format!(
                "request {} already exists",
                request.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(request);
                Ok(())
            }
        }
    }

    async fn get_request(&self, id: RequestId) -> Result<HelpRequest> {
        self.requests
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or_else(|| LifelineError::not_found("request", id))
    }

    async fn list_requests(
        &self,
        filter: &RequestFilter,
        page: PageRequest,
    ) -> Result<Page<HelpRequest>> {
        let mut matching: Vec<HelpRequest> = self
            .requests
            .iter()
            .filter(|r| filter.matches(r.value()))
            .map(|r| r.value().clone())
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(Page::from_sorted(matching, page))
    }

    async fn modify_request<T, F>(&self, id: RequestId, f: F) -> Result<(HelpRequest, T)>
    where
        F: FnOnce(&mut HelpRequest) -> Result<T> + Send,
        T: Send,
    {
        let mut stored = self
            .requests
            .get_mut(&id)
            .ok_or_else(|| LifelineError::not_found("request", id))?;
        let mut draft = stored.value().clone();
        let out = f(&mut draft)?;
        *stored.value_mut() = draft.clone();
        Ok((draft, out))
    }

    async fn remove_request<F>(&self, id: RequestId, guard: F) -> Result<HelpRequest>
    where
        F: FnOnce(&HelpRequest) -> Result<()> + Send,
    {
        match self.requests.entry(id) {
            Entry::Vacant(_) => Err(LifelineError::not_found("request", id)),
            Entry::Occupied(slot) => {
                guard(slot.get())?;
                Ok(slot.remove())
            }
        }
    }

    async fn request_stats(&self) -> Result<RequestStats> {
        let mut stats = RequestStats::default();
        for request in self.requests.iter() {
            stats.record(request.value());
        }
        Ok(stats)
    }

    async fn insert_volunteer(&self, volunteer: Volunteer) -> Result<()> {
        match self.volunteers_by_account.entry(volunteer.account_id) {
            Entry::Occupied(_) => Err(LifelineError::Conflict(format!(
                "account {} already has a volunteer profile",
                volunteer.account_id
            ))),
            Entry::Vacant(slot) => {
                let id = volunteer.id;
                self.volunteers.insert(id, volunteer);
                slot.insert(id);
                Ok(())
            }
        }
    }

    async fn get_volunteer(&self, id: VolunteerId) -> Result<Volunteer> {
        self.volunteers
            .get(&id)
            .map(|v| v.value().clone())
            .ok_or_else(|| LifelineError::not_found("volunteer", id))
    }

    async fn find_volunteer_by_account(&self, account: AccountId) -> Result<Option<Volunteer>> {
        let Some(id) = self.volunteers_by_account.get(&account).map(|id| *id.value()) else {
            return Ok(None);
        };
        Ok(self.volunteers.get(&id).map(|v| v.value().clone()))
    }

    async fn list_volunteers(&self, filter: &VolunteerFilter) -> Result<Vec<Volunteer>> {
        let mut matching: Vec<Volunteer> = self
            .volunteers
            .iter()
            .filter(|v| filter.matches(v.value()))
            .map(|v| v.value().clone())
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }

    async fn modify_volunteer<T, F>(&self, id: VolunteerId, f: F) -> Result<(Volunteer, T)>
    where
        F: FnOnce(&mut Volunteer) -> Result<T> + Send,
        T: Send,
    {
        let mut stored = self
            .volunteers
            .get_mut(&id)
            .ok_or_else(|| LifelineError::not_found("volunteer", id))?;
        let mut draft = stored.value().clone();
        let out = f(&mut draft)?;
        *stored.value_mut() = draft.clone();
        Ok((draft, out))
    }

    async fn top_volunteers(&self, limit: usize) -> Result<Vec<Volunteer>> {
        let mut ranked: Vec<Volunteer> = self
            .volunteers
            .iter()
            .filter(|v| v.status == VolunteerStatus::Approved && v.is_active)
            .map(|v| v.value().clone())
            .collect();
        ranked.sort_by(|a, b| {
            b.points
                .cmp(&a.points)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        ranked.truncate(limit);
        Ok(ranked)
    }
}
