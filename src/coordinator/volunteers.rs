//! Volunteer registration, vetting and profiles.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::LifecycleCoordinator;
use crate::auth::{self, Action, ResourceScope, Scope};
use crate::domain::actor::Actor;
use crate::domain::volunteer::{
    IdDocumentType, IdProof, NewVolunteer, ProfileUpdate, Volunteer, VolunteerId,
    VolunteerStatus,
};
use crate::error::{LifelineError, Result};
use crate::external::Upload;
use crate::manager::{Storage, VolunteerFilter};

/// Identity document submitted with a registration.
#[derive(Debug, Clone)]
pub struct IdDocument {
    pub document_type: IdDocumentType,
    pub file: Upload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// 1-based
    pub rank: usize,
    pub volunteer_id: VolunteerId,
    pub name: String,
    pub district: String,
    pub points: u64,
}

impl<S: Storage> LifecycleCoordinator<S> {
    /// Create a volunteer profile for the acting account.
    ///
    /// The profile starts `pending_review` with an empty ledger. One profile
    /// per account; a second registration is `Conflict`.
    #[tracing::instrument(skip(self, actor, form, id_document), fields(actor = %actor.id))]
    pub async fn register_volunteer(
        &self,
        actor: &Actor,
        form: NewVolunteer,
        id_document: Option<IdDocument>,
    ) -> Result<Volunteer> {
        let account = self
            .directory
            .account(actor.id)
            .await?
            .ok_or_else(|| LifelineError::not_found("account", actor.id))?;
        if !account.is_active {
            return Err(LifelineError::Forbidden(format!(
                "account {} is deactivated",
                account.id
            )));
        }
        if self.acting_volunteer(actor).await?.is_some() {
            return Err(LifelineError::Conflict(format!(
                "account {} already has a volunteer profile",
                account.id
            )));
        }

        // Validate before spending an upload on the document
        let mut volunteer = Volunteer::register(&account, form, None, Utc::now())?;
        if let Some(document) = id_document {
            let mime_type = document.file.mime_type.clone();
            let stored = self
                .blobs
                .upload(document.file, &self.config.id_proof_folder)
                .await?;
            volunteer.id_proof = Some(IdProof {
                document_type: document.document_type,
                media: stored.into_media(Some(mime_type)),
            });
        }

        self.track_conflict(
            "register_volunteer",
            self.storage.insert_volunteer(volunteer.clone()).await,
        )?;
        tracing::info!(
            volunteer_id = %volunteer.id,
            district = %volunteer.district,
            "Volunteer registered"
        );
        Ok(volunteer)
    }

    /// Approve, reject or return a volunteer to review.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id, volunteer_id = %volunteer_id, status = %status))]
    pub async fn review_volunteer(
        &self,
        actor: &Actor,
        volunteer_id: VolunteerId,
        status: VolunteerStatus,
    ) -> Result<Volunteer> {
        self.require_manage(actor, volunteer_id).await?;

        let (volunteer, previous) = self
            .storage
            .modify_volunteer(volunteer_id, move |v| {
                let previous = v.status;
                v.status = status;
                v.updated_at = Utc::now();
                Ok(previous)
            })
            .await?;
        tracing::info!(previous = %previous, "Volunteer status changed");
        Ok(volunteer)
    }

    /// Activate or deactivate a volunteer. Inactive volunteers cannot accept work.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id, volunteer_id = %volunteer_id))]
    pub async fn set_volunteer_active(
        &self,
        actor: &Actor,
        volunteer_id: VolunteerId,
        active: bool,
    ) -> Result<Volunteer> {
        self.require_manage(actor, volunteer_id).await?;

        let (volunteer, ()) = self
            .storage
            .modify_volunteer(volunteer_id, move |v| {
                v.is_active = active;
                v.updated_at = Utc::now();
                Ok(())
            })
            .await?;
        tracing::info!(is_active = active, "Volunteer activation changed");
        Ok(volunteer)
    }

    /// Edit the acting volunteer's own profile. Ledger fields are not reachable
    /// from here.
    #[tracing::instrument(skip(self, actor, update), fields(actor = %actor.id))]
    pub async fn update_volunteer_profile(
        &self,
        actor: &Actor,
        update: ProfileUpdate,
    ) -> Result<Volunteer> {
        let volunteer = self.my_volunteer_profile(actor).await?;
        let (volunteer, ()) = self
            .storage
            .modify_volunteer(volunteer.id, move |v| v.update_profile(update, Utc::now()))
            .await?;
        tracing::info!(volunteer_id = %volunteer.id, "Volunteer profile updated");
        Ok(volunteer)
    }

    /// Get a volunteer: one's own profile, or any profile the actor may manage.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id, volunteer_id = %volunteer_id))]
    pub async fn get_volunteer(&self, actor: &Actor, volunteer_id: VolunteerId) -> Result<Volunteer> {
        let volunteer = self.storage.get_volunteer(volunteer_id).await?;
        if volunteer.account_id != actor.id {
            auth::require(
                actor,
                &ResourceScope::volunteer(&volunteer),
                Action::ManageVolunteer,
            )?;
        }
        Ok(volunteer)
    }

    /// The acting account's volunteer profile.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn my_volunteer_profile(&self, actor: &Actor) -> Result<Volunteer> {
        self.acting_volunteer(actor)
            .await?
            .ok_or_else(|| LifelineError::not_found("volunteer profile for account", actor.id))
    }

    /// Volunteers the actor may manage, newest first. District-scoped actors
    /// only ever see their own district.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id, role = %actor.role))]
    pub async fn list_volunteers(
        &self,
        actor: &Actor,
        mut filter: VolunteerFilter,
    ) -> Result<Vec<Volunteer>> {
        let scopes = auth::policy(actor.role).scopes(Action::ManageVolunteer);
        if !scopes.contains(&Scope::Global) {
            if !scopes.contains(&Scope::District) {
                return Err(LifelineError::Forbidden(format!(
                    "role '{}' may not manage volunteers",
                    actor.role
                )));
            }
            let district = actor
                .district
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .ok_or_else(|| {
                    LifelineError::Forbidden("no district assigned to this account".to_string())
                })?;
            filter.district = Some(district.to_string());
        }
        self.storage.list_volunteers(&filter).await
    }

    /// Approved, active volunteers with the most points.
    #[tracing::instrument(skip(self))]
    pub async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>> {
        let top = self
            .storage
            .top_volunteers(self.config.leaderboard_size)
            .await?;
        Ok(top
            .into_iter()
            .enumerate()
            .map(|(i, v)| LeaderboardEntry {
                rank: i + 1,
                volunteer_id: v.id,
                name: v.name,
                district: v.district,
                points: v.points,
            })
            .collect())
    }

    async fn require_manage(&self, actor: &Actor, volunteer_id: VolunteerId) -> Result<()> {
        let volunteer = self.storage.get_volunteer(volunteer_id).await?;
        auth::require(
            actor,
            &ResourceScope::volunteer(&volunteer),
            Action::ManageVolunteer,
        )
    }
}
