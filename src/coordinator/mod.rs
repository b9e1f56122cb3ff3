//! Lifecycle coordinator.
//!
//! [`LifecycleCoordinator`] is the entry point for every operation on help
//! requests and volunteers. Operations that change state follow one shape:
//!
//! 1. load the target aggregate (`NotFound`)
//! 2. gate the actor through [`auth::require`] (`Forbidden`)
//! 3. run the transition inside `Storage::modify_*`, which makes its
//!    preconditions a conditional write (`Conflict`, `Validation`)
//! 4. apply the volunteer-ledger effect once the request write has committed,
//!    reporting a failure there as [`LifelineError::PartialApplication`]
//!
//! Operations are grouped by concern in [`assignment`], [`review`],
//! [`moderation`] and [`volunteers`]. Intake and listings live here.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::{self, Action, ResourceScope, Scope};
use crate::domain::actor::{AccountId, Actor};
use crate::domain::request::{
    AdminStatus, Category, HelpRequest, Location, NewRequest, ProofId, RequestId, RequestStatus,
    Submitter, UrgencyLevel,
};
use crate::domain::volunteer::{LedgerEntry, SettlementOutcome, Volunteer, VolunteerId};
use crate::error::{LifelineError, Result};
use crate::external::{BlobStore, Geocoder, IdentityDirectory, Upload};
use crate::manager::{Audience, Page, PageRequest, RequestFilter, RequestStats, Storage};
use crate::metrics;
#[cfg(feature = "metrics")]
use crate::metrics::LifelineMetrics;
use crate::points::{PointsPolicy, RewardTable};

pub mod assignment;
pub mod moderation;
pub mod review;
pub mod volunteers;

pub use assignment::{ProofMedia, ProofReceipt, ProofSubmission};
pub use volunteers::{IdDocument, LeaderboardEntry};

/// Configuration for the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Page size when a listing does not ask for one
    pub default_page_size: usize,

    /// Upper bound on any requested page size
    pub max_page_size: usize,

    pub max_title_len: usize,
    pub max_description_len: usize,

    /// Blob store folder for proof media
    pub proof_folder: String,

    /// Blob store folder for request videos
    pub video_folder: String,

    /// Blob store folder for volunteer ID documents
    pub id_proof_folder: String,

    /// Number of volunteers on the leaderboard
    pub leaderboard_size: usize,

    /// Points paid per urgency tier when a proof is accepted
    pub rewards: RewardTable,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            default_page_size: 10,
            max_page_size: 100,
            max_title_len: 200,
            max_description_len: 2000,
            proof_folder: "help_requests/proofs".to_string(),
            video_folder: "help_requests/videos".to_string(),
            id_proof_folder: "volunteers/id_proofs".to_string(),
            leaderboard_size: 10,
            rewards: RewardTable::default(),
        }
    }
}

/// Request and volunteer as they stand after an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    pub request: HelpRequest,
    /// `None` when the operation did not touch a volunteer ledger
    pub volunteer: Option<Volunteer>,
}

/// Submission form for a new request, as received. Enum fields are validated on intake.
#[derive(Debug, Clone, Default)]
pub struct RequestForm {
    pub title: String,
    pub description: String,
    pub category: String,
    pub urgency: String,
    /// Free-text address; "city, state" when it contains a comma
    pub location: String,
    /// Defaults to the submitting account's district
    pub district: Option<String>,
    /// Contact fields default to the submitting account's details
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
    pub anonymous: bool,
    pub additional_info: Option<String>,
    pub video: Option<Upload>,
}

/// Filters and paging for request listings, as received.
///
/// Blank filters and `"all"` mean no filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestQuery {
    pub category: Option<String>,
    pub urgency: Option<String>,
    pub status: Option<String>,
    pub district: Option<String>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

/// Orchestrates transitions across the request and volunteer aggregates.
pub struct LifecycleCoordinator<S: Storage> {
    storage: Arc<S>,
    blobs: Arc<dyn BlobStore>,
    geocoder: Arc<dyn Geocoder>,
    directory: Arc<dyn IdentityDirectory>,
    config: LifecycleConfig,
    points: PointsPolicy,
    #[cfg(feature = "metrics")]
    metrics: Option<LifelineMetrics>,
}

impl<S: Storage> LifecycleCoordinator<S> {
    /// Create a coordinator over `storage` and its outbound collaborators.
    ///
    /// Uses the default configuration. Customize with `.with_config()` if needed.
    pub fn new(
        storage: Arc<S>,
        blobs: Arc<dyn BlobStore>,
        geocoder: Arc<dyn Geocoder>,
        directory: Arc<dyn IdentityDirectory>,
    ) -> Self {
        let config = LifecycleConfig::default();
        Self {
            storage,
            blobs,
            geocoder,
            directory,
            points: PointsPolicy::new(config.rewards),
            config,
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Set a custom configuration. The reward table is taken from it.
    pub fn with_config(mut self, config: LifecycleConfig) -> Self {
        self.points = PointsPolicy::new(config.rewards);
        self.config = config;
        self
    }

    /// Also record metrics into a Prometheus registry.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: LifelineMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn points_policy(&self) -> PointsPolicy {
        self.points
    }

    /// Resolve an authenticated account into the actor operations take.
    #[tracing::instrument(skip(self), fields(account_id = %id))]
    pub async fn actor_for(&self, id: AccountId) -> Result<Actor> {
        let account = self
            .directory
            .account(id)
            .await?
            .ok_or_else(|| LifelineError::not_found("account", id))?;
        if !account.is_active {
            return Err(LifelineError::Forbidden(format!(
                "account {id} is deactivated"
            )));
        }
        Ok(account.actor())
    }

    // ========================================================================
    // Intake
    // ========================================================================

    /// Validate and persist a new request in `open` / `pending`, hidden until approved.
    ///
    /// Geocoding is best effort. A failed video upload fails the call before
    /// anything is written.
    #[tracing::instrument(skip(self, actor, form), fields(actor = %actor.id, category = %form.category, urgency = %form.urgency))]
    pub async fn create_request(&self, actor: &Actor, form: RequestForm) -> Result<HelpRequest> {
        auth::require(actor, &ResourceScope::none(), Action::CreateRequest)?;

        let RequestForm {
            title,
            description,
            category,
            urgency,
            location,
            district,
            contact_name,
            contact_phone,
            contact_email,
            anonymous,
            additional_info,
            video,
        } = form;

        let title = bounded_text("title", &title, self.config.max_title_len)?;
        let description =
            bounded_text("description", &description, self.config.max_description_len)?;
        let category: Category = required_text("category", &category)?.parse()?;
        let urgency: UrgencyLevel = required_text("urgency", &urgency)?.parse()?;
        let address = required_text("location", &location)?;
        let district = district
            .or_else(|| actor.district.clone())
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .ok_or_else(|| LifelineError::Validation("district is required".to_string()))?;

        let account = self.directory.account(actor.id).await?;
        let submitter = Submitter {
            account_id: Some(actor.id),
            name: contact("contact name", contact_name, account.as_ref().map(|a| &a.name))?,
            phone: contact("contact phone", contact_phone, account.as_ref().map(|a| &a.phone))?,
            email: contact("contact email", contact_email, account.as_ref().map(|a| &a.email))?,
        };

        let (city, state) = if address.contains(',') {
            let mut parts = address
                .split(',')
                .map(str::trim)
                .map(|p| Some(p.to_string()).filter(|p| !p.is_empty()));
            (parts.next().flatten(), parts.next().flatten())
        } else {
            (None, None)
        };

        let coordinates = match self.geocoder.locate(&address).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(error = %e, "Geocoding failed, storing request without coordinates");
                None
            }
        };

        let video = match video {
            Some(upload) => {
                let mime_type = upload.mime_type.clone();
                let stored = self.blobs.upload(upload, &self.config.video_folder).await?;
                Some(stored.into_media(Some(mime_type)))
            }
            None => None,
        };

        let tags = additional_info
            .map(|info| info.trim().to_string())
            .filter(|info| !info.is_empty())
            .into_iter()
            .collect();

        let request = HelpRequest::submit(
            NewRequest {
                title,
                description,
                category,
                urgency,
                location: Location {
                    address,
                    city,
                    state,
                    district,
                    coordinates,
                },
                submitter,
                anonymous,
                video,
                tags,
            },
            Utc::now(),
        );
        self.storage.insert_request(request.clone()).await?;

        tracing::info!(
            request_id = %request.id,
            reference = %request.reference,
            district = %request.district,
            "Help request submitted"
        );
        Ok(request)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Get a request. Approved public requests are visible to everyone; anything
    /// else needs view permission on the request.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id, request_id = %request_id))]
    pub async fn get_request(&self, actor: &Actor, request_id: RequestId) -> Result<HelpRequest> {
        let request = self.storage.get_request(request_id).await?;
        if request.is_public && request.admin_status == AdminStatus::Approved {
            return Ok(request);
        }

        let volunteer = self.acting_volunteer(actor).await?;
        auth::require(
            actor,
            &ResourceScope::request(&request, volunteer.as_ref()),
            Action::ViewRequest,
        )?;
        Ok(request)
    }

    /// Approved, public requests, newest first. Needs no actor.
    #[tracing::instrument(skip(self))]
    pub async fn list_public_requests(&self, query: RequestQuery) -> Result<Page<HelpRequest>> {
        let filter = self.filter_from(&query, Audience::PublicOnly)?;
        self.storage
            .list_requests(&filter, self.page_request(&query))
            .await
    }

    /// Requests the actor's role may browse, newest first.
    ///
    /// The audience follows the role's view grants: global roles see
    /// everything, district-scoped roles their district, volunteers the open
    /// pool plus their own assignments, everyone else their own submissions.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id, role = %actor.role))]
    pub async fn list_requests(
        &self,
        actor: &Actor,
        query: RequestQuery,
    ) -> Result<Page<HelpRequest>> {
        let audience = self.audience_for(actor).await?;
        let filter = self.filter_from(&query, audience)?;
        self.storage
            .list_requests(&filter, self.page_request(&query))
            .await
    }

    /// Open, approved and unassigned requests a volunteer can accept.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn available_requests(
        &self,
        actor: &Actor,
        query: RequestQuery,
    ) -> Result<Page<HelpRequest>> {
        self.require_volunteer(actor).await?;
        let filter = self.filter_from(&query, Audience::OpenPool)?;
        self.storage
            .list_requests(&filter, self.page_request(&query))
            .await
    }

    /// Requests currently assigned to the acting volunteer, whatever their status.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn assigned_requests(
        &self,
        actor: &Actor,
        query: RequestQuery,
    ) -> Result<Page<HelpRequest>> {
        let volunteer = self.require_volunteer(actor).await?;
        let filter = self.filter_from(&query, Audience::AssignedTo(volunteer.id))?;
        self.storage
            .list_requests(&filter, self.page_request(&query))
            .await
    }

    /// Requests the actor submitted.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn my_requests(
        &self,
        actor: &Actor,
        query: RequestQuery,
    ) -> Result<Page<HelpRequest>> {
        let filter = self.filter_from(&query, Audience::Submitter(actor.id))?;
        self.storage
            .list_requests(&filter, self.page_request(&query))
            .await
    }

    /// Totals by status and category.
    #[tracing::instrument(skip(self))]
    pub async fn request_stats(&self) -> Result<RequestStats> {
        self.storage.request_stats().await
    }

    // ========================================================================
    // Shared helpers
    // ========================================================================

    async fn acting_volunteer(&self, actor: &Actor) -> Result<Option<Volunteer>> {
        self.storage.find_volunteer_by_account(actor.id).await
    }

    async fn require_volunteer(&self, actor: &Actor) -> Result<Volunteer> {
        self.acting_volunteer(actor).await?.ok_or_else(|| {
            LifelineError::Forbidden(format!(
                "account {} is not registered as a volunteer",
                actor.id
            ))
        })
    }

    async fn audience_for(&self, actor: &Actor) -> Result<Audience> {
        let scopes = auth::policy(actor.role).scopes(Action::ViewRequest);

        if scopes.contains(&Scope::Global) {
            return Ok(Audience::Everyone);
        }
        if scopes.contains(&Scope::District) {
            return actor
                .district
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(|d| Audience::District(d.to_string()))
                .ok_or_else(|| {
                    LifelineError::Forbidden("no district assigned to this account".to_string())
                });
        }
        if scopes.contains(&Scope::OpenPool) || scopes.contains(&Scope::Assignee) {
            return Ok(match self.acting_volunteer(actor).await? {
                Some(volunteer) => Audience::Volunteer(volunteer.id),
                None => Audience::OpenPool,
            });
        }
        if scopes.contains(&Scope::Submitter) {
            return Ok(Audience::Submitter(actor.id));
        }
        Err(LifelineError::Forbidden(format!(
            "role '{}' may not browse requests",
            actor.role
        )))
    }

    fn filter_from(&self, query: &RequestQuery, audience: Audience) -> Result<RequestFilter> {
        Ok(RequestFilter {
            category: parse_filter(query.category.as_deref())?,
            urgency: parse_filter(query.urgency.as_deref())?,
            status: parse_filter::<RequestStatus>(query.status.as_deref())?,
            district: query
                .district
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            audience,
        })
    }

    fn page_request(&self, query: &RequestQuery) -> PageRequest {
        PageRequest::new(
            query.page.unwrap_or(1),
            query
                .limit
                .unwrap_or(self.config.default_page_size)
                .min(self.config.max_page_size),
        )
    }

    /// Apply ledger entries to a volunteer after the request write committed.
    ///
    /// Returns the volunteer and the entries that changed it. A failure leaves
    /// the two aggregates out of step and is reported as
    /// [`LifelineError::PartialApplication`].
    async fn apply_ledger(
        &self,
        operation: &'static str,
        request_id: RequestId,
        volunteer_id: VolunteerId,
        proof_id: Option<ProofId>,
        entries: Vec<LedgerEntry>,
    ) -> Result<(Volunteer, Vec<LedgerEntry>)> {
        let result = self
            .storage
            .modify_volunteer(volunteer_id, move |volunteer| {
                let now = Utc::now();
                Ok(entries
                    .into_iter()
                    .filter(|entry| volunteer.apply(entry, now))
                    .collect::<Vec<_>>())
            })
            .await;

        match result {
            Ok(applied) => Ok(applied),
            Err(source) => {
                tracing::error!(
                    operation,
                    request_id = %request_id,
                    volunteer_id = %volunteer_id,
                    error = %source,
                    "Volunteer ledger update failed after the request write committed"
                );
                self.record_partial_application(operation);
                Err(LifelineError::PartialApplication {
                    request_id,
                    volunteer_id,
                    proof_id,
                    source: Box::new(source),
                })
            }
        }
    }

    /// Turn a refused transition into a conflict metric on its way out.
    fn track_conflict<T>(&self, operation: &'static str, result: Result<T>) -> Result<T> {
        if let Err(LifelineError::Conflict(reason)) = &result {
            tracing::debug!(operation, reason = %reason, "Transition refused");
            metrics::emit_conflict(operation);
            #[cfg(feature = "metrics")]
            if let Some(m) = &self.metrics {
                m.record_conflict(operation);
            }
        }
        result
    }

    fn record_transition(&self, from: RequestStatus, to: RequestStatus) {
        if from == to {
            return;
        }
        metrics::emit_transition(from, to);
        #[cfg(feature = "metrics")]
        if let Some(m) = &self.metrics {
            m.record_transition(from, to);
        }
    }

    /// Count points paid by the credited settlements among `applied`.
    fn record_credits(&self, urgency: UrgencyLevel, applied: &[LedgerEntry]) {
        for entry in applied {
            if let LedgerEntry::Settled(settlement) = entry
                && let SettlementOutcome::Credited { points } = settlement.outcome
            {
                metrics::emit_points_credited(urgency, points);
                #[cfg(feature = "metrics")]
                if let Some(m) = &self.metrics {
                    m.record_points_credited(urgency, points);
                }
            }
        }
    }

    fn record_partial_application(&self, operation: &'static str) {
        metrics::emit_partial_application(operation);
        #[cfg(feature = "metrics")]
        if let Some(m) = &self.metrics {
            m.record_partial_application(operation);
        }
    }
}

fn required_text(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(LifelineError::Validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}

fn bounded_text(field: &str, value: &str, max_len: usize) -> Result<String> {
    let value = required_text(field, value)?;
    if value.chars().count() > max_len {
        return Err(LifelineError::Validation(format!(
            "{field} must be at most {max_len} characters"
        )));
    }
    Ok(value)
}

fn contact(field: &str, given: Option<String>, fallback: Option<&String>) -> Result<String> {
    given
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            fallback
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        })
        .ok_or_else(|| LifelineError::Validation(format!("{field} is required")))
}

fn parse_filter<T>(value: Option<&str>) -> Result<Option<T>>
where
    T: FromStr<Err = LifelineError>,
{
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) if v.eq_ignore_ascii_case("all") => Ok(None),
        Some(v) => v.parse().map(Some),
    }
}
