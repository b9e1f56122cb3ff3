//! Persistence for the request and volunteer aggregates.
//!
//! The [`Storage`] trait exposes each aggregate through read methods and a
//! single-writer `modify_*` method. A modification closure runs against the
//! current stored value with writers to the same aggregate excluded; if the
//! closure returns an error nothing is written. Preconditions checked inside the
//! closure are therefore conditional writes: two concurrent acceptors of one
//! request cannot both see it open.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::auth::districts_match;
use crate::domain::actor::AccountId;
use crate::domain::request::{
    AdminStatus, Category, HelpRequest, RequestId, RequestStatus, UrgencyLevel,
};
use crate::domain::volunteer::{Volunteer, VolunteerId, VolunteerStatus};
use crate::error::Result;

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemoryStorage;

/// Storage trait for persisting and querying requests and volunteers.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Persist a newly created request.
    async fn insert_request(&self, request: HelpRequest) -> Result<()>;

    /// Get a request by ID. `NotFound` if absent.
    async fn get_request(&self, id: RequestId) -> Result<HelpRequest>;

    /// List requests matching `filter`, newest first.
    async fn list_requests(
        &self,
        filter: &RequestFilter,
        page: PageRequest,
    ) -> Result<Page<HelpRequest>>;

    /// Run `f` against the stored request under single-writer isolation and
    /// persist the result. Nothing is written if `f` fails.
    async fn modify_request<T, F>(&self, id: RequestId, f: F) -> Result<(HelpRequest, T)>
    where
        F: FnOnce(&mut HelpRequest) -> Result<T> + Send,
        T: Send;

    /// Delete a request if `guard` accepts its current state.
    async fn remove_request<F>(&self, id: RequestId, guard: F) -> Result<HelpRequest>
    where
        F: FnOnce(&HelpRequest) -> Result<()> + Send;

    /// Totals by status and category.
    async fn request_stats(&self) -> Result<RequestStats>;

    /// Persist a new volunteer. `Conflict` if the account already has a profile.
    async fn insert_volunteer(&self, volunteer: Volunteer) -> Result<()>;

    /// Get a volunteer by ID. `NotFound` if absent.
    async fn get_volunteer(&self, id: VolunteerId) -> Result<Volunteer>;

    /// The volunteer profile belonging to an account, if any.
    async fn find_volunteer_by_account(&self, account: AccountId) -> Result<Option<Volunteer>>;

    async fn list_volunteers(&self, filter: &VolunteerFilter) -> Result<Vec<Volunteer>>;

    /// Single-writer update of a volunteer, same contract as [`Storage::modify_request`].
    async fn modify_volunteer<T, F>(&self, id: VolunteerId, f: F) -> Result<(Volunteer, T)>
    where
        F: FnOnce(&mut Volunteer) -> Result<T> + Send,
        T: Send;

    /// Approved, active volunteers with the most points, highest first.
    async fn top_volunteers(&self, limit: usize) -> Result<Vec<Volunteer>>;
}

/// Which requests a listing may see.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Audience {
    /// No visibility restriction.
    #[default]
    Everyone,
    /// Approved and public.
    PublicOnly,
    /// Requests in a district (substring match, case-insensitive).
    District(String),
    /// Requests submitted by an account.
    Submitter(AccountId),
    /// Open, approved and unassigned.
    OpenPool,
    /// Currently assigned to a volunteer.
    AssignedTo(VolunteerId),
    /// What a volunteer may browse: the open pool plus their own assignments.
    Volunteer(VolunteerId),
}

/// Filter for request listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestFilter {
    pub category: Option<Category>,
    pub urgency: Option<UrgencyLevel>,
    pub status: Option<RequestStatus>,
    pub district: Option<String>,
    pub audience: Audience,
}

impl RequestFilter {
    pub fn for_audience(audience: Audience) -> Self {
        Self {
            audience,
            ..Default::default()
        }
    }

    pub fn matches(&self, request: &HelpRequest) -> bool {
        if self.category.is_some_and(|c| c != request.category)
            || self.urgency.is_some_and(|u| u != request.urgency)
            || self.status.is_some_and(|s| s != request.status)
        {
            return false;
        }
        if let Some(district) = &self.district
            && !districts_match(district, &request.district)
        {
            return false;
        }

        match &self.audience {
            Audience::Everyone => true,
            Audience::PublicOnly => {
                request.is_public
                    && request.admin_status == AdminStatus::Approved
            }
            Audience::District(district) => districts_match(district, &request.district),
            Audience::Submitter(account) => request.is_submitted_by(*account),
            Audience::OpenPool => request.is_in_open_pool(),
            Audience::AssignedTo(volunteer) => request.assigned_volunteer == Some(*volunteer),
            Audience::Volunteer(volunteer) => {
                request.is_in_open_pool() || request.assigned_volunteer == Some(*volunteer)
            }
        }
    }
}

/// 1-based page selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: usize,
    pub limit: usize,
}

impl PageRequest {
    pub fn new(page: usize, limit: usize) -> Self {
        Self {
            page: page.max(1),
            limit: limit.max(1),
        }
    }

    /// Rows to skip. Saturates, so a page far past the end is simply empty.
    pub fn offset(&self) -> usize {
        (self.page - 1).saturating_mul(self.limit)
    }
}

/// A page of results plus pagination totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, page: PageRequest, total: usize) -> Self {
        Self {
            items,
            page: page.page,
            limit: page.limit,
            total,
            total_pages: total.div_ceil(page.limit),
        }
    }

    /// Slice an already filtered and sorted result set.
    pub fn from_sorted(all: Vec<T>, page: PageRequest) -> Self {
        let total = all.len();
        let items = all
            .into_iter()
            .skip(page.offset())
            .take(page.limit)
            .collect();
        Self::new(items, page, total)
    }
}

/// Request totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestStats {
    pub total: u64,
    pub by_status: BTreeMap<String, u64>,
    pub by_category: BTreeMap<String, u64>,
    pub awaiting_moderation: u64,
}

impl RequestStats {
    pub fn record(&mut self, request: &HelpRequest) {
        self.total += 1;
        *self
            .by_status
            .entry(request.status.as_str().to_string())
            .or_default() += 1;
        *self
            .by_category
            .entry(request.category.as_str().to_string())
            .or_default() += 1;
        if request.admin_status == AdminStatus::Pending {
            self.awaiting_moderation += 1;
        }
    }
}

/// Filter for volunteer listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolunteerFilter {
    pub status: Option<VolunteerStatus>,
    pub district: Option<String>,
    pub active_only: bool,
}

impl VolunteerFilter {
    pub fn matches(&self, volunteer: &Volunteer) -> bool {
        if self.status.is_some_and(|s| s != volunteer.status) {
            return false;
        }
        if self.active_only && !volunteer.is_active {
            return false;
        }
        match &self.district {
            Some(district) => districts_match(district, &volunteer.district),
            None => true,
        }
    }
}
