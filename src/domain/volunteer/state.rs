//! Volunteer data types.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::actor::{Account, AccountId};
use crate::domain::request::{MediaRef, ProofId, RequestId};
use crate::error::{LifelineError, Result};

/// Free-text limit for `experience` and `motivation`.
pub const MAX_STATEMENT_LEN: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VolunteerId(pub Uuid);

impl std::fmt::Display for VolunteerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl From<Uuid> for VolunteerId {
    fn from(uuid: Uuid) -> Self {
        VolunteerId(uuid)
    }
}

impl std::ops::Deref for VolunteerId {
    type Target = Uuid;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Approval state of a volunteer profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolunteerStatus {
    PendingReview,
    Approved,
    Rejected,
}

impl VolunteerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VolunteerStatus::PendingReview => "pending_review",
            VolunteerStatus::Approved => "approved",
            VolunteerStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for VolunteerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VolunteerStatus {
    type Err = LifelineError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "pending_review" => Ok(VolunteerStatus::PendingReview),
            "approved" => Ok(VolunteerStatus::Approved),
            "rejected" => Ok(VolunteerStatus::Rejected),
            other => Err(LifelineError::Validation(format!(
                "invalid volunteer status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Availability {
    Weekends,
    Evenings,
    Flexible,
    FullTime,
}

impl Availability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Availability::Weekends => "weekends",
            Availability::Evenings => "evenings",
            Availability::Flexible => "flexible",
            Availability::FullTime => "full-time",
        }
    }
}

impl FromStr for Availability {
    type Err = LifelineError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "weekends" => Ok(Availability::Weekends),
            "evenings" => Ok(Availability::Evenings),
            "flexible" => Ok(Availability::Flexible),
            "full-time" | "full_time" => Ok(Availability::FullTime),
            other => Err(LifelineError::Validation(format!(
                "availability must be one of weekends, evenings, flexible, full-time; got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdDocumentType {
    Aadhaar,
    DrivingLicense,
    Passport,
}

/// Identity document uploaded at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdProof {
    pub document_type: IdDocumentType,
    pub media: MediaRef,
}

/// A proof submitted by this volunteer that still awaits review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingProof {
    pub request_id: RequestId,
    pub proof_id: ProofId,
    pub submitted_at: DateTime<Utc>,
}

/// Key under which a proof's review outcome has been applied to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProofKey {
    pub request_id: RequestId,
    pub proof_id: ProofId,
}

/// A request the volunteer holds, and when that assignment began.
///
/// The same volunteer can hold a request more than once over its life (a
/// rejected proof returns it to the pool), so a release names the assignments
/// it ends by time rather than by request alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveRequest {
    pub request_id: RequestId,
    pub assigned_at: DateTime<Utc>,
}

/// Volunteer profile plus the reputation ledger.
///
/// Ledger fields (`points`, `contribution_history`, `active_requests`,
/// `pending_proofs`, `settled_proofs`) only change through
/// [`Volunteer::apply`](super::ledger); profile edits never touch them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volunteer {
    pub id: VolunteerId,
    pub account_id: AccountId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub district: String,
    pub location: String,
    pub skills: Vec<String>,
    pub causes: Vec<String>,
    pub availability: Availability,
    pub experience: Option<String>,
    pub motivation: String,
    pub id_proof: Option<IdProof>,

    pub points: u64,
    pub contribution_history: Vec<RequestId>,
    pub active_requests: Vec<ActiveRequest>,
    pub pending_proofs: Vec<PendingProof>,
    pub settled_proofs: Vec<ProofKey>,

    pub status: VolunteerStatus,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Registration form for a new volunteer.
#[derive(Debug, Clone, Default)]
pub struct NewVolunteer {
    pub district: Option<String>,
    pub location: String,
    pub skills: Vec<String>,
    pub causes: Vec<String>,
    pub availability: String,
    pub experience: Option<String>,
    pub motivation: String,
}

/// Profile fields a volunteer may edit on their own profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub phone: Option<String>,
    pub location: Option<String>,
    pub skills: Option<Vec<String>>,
    pub causes: Option<Vec<String>>,
    pub availability: Option<String>,
    pub experience: Option<String>,
    pub motivation: Option<String>,
}

impl Volunteer {
    /// Build a profile for `account` in `pending_review`, active, with an empty ledger.
    pub fn register(
        account: &Account,
        form: NewVolunteer,
        id_proof: Option<IdProof>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let skills = non_empty_list("skill", form.skills)?;
        let causes = non_empty_list("cause", form.causes)?;
        let availability = form.availability.parse()?;
        let location = required("location", form.location)?;
        let motivation = bounded("motivation", required("motivation", form.motivation)?)?;
        let experience = form
            .experience
            .map(|e| bounded("experience", e))
            .transpose()?;
        let district = form
            .district
            .or_else(|| account.district.clone())
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .ok_or_else(|| LifelineError::Validation("district is required".to_string()))?;

        Ok(Volunteer {
            id: VolunteerId(Uuid::new_v4()),
            account_id: account.id,
            name: account.name.clone(),
            email: account.email.clone(),
            phone: account.phone.clone(),
            district,
            location,
            skills,
            causes,
            availability,
            experience,
            motivation,
            id_proof,
            points: 0,
            contribution_history: Vec::new(),
            active_requests: Vec::new(),
            pending_proofs: Vec::new(),
            settled_proofs: Vec::new(),
            status: VolunteerStatus::PendingReview,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    /// Approved and active: allowed to accept and work requests.
    pub fn can_take_work(&self) -> bool {
        self.status == VolunteerStatus::Approved && self.is_active
    }

    /// Whether the request is in this volunteer's `active_requests`.
    pub fn holds(&self, request_id: RequestId) -> bool {
        self.active_requests.iter().any(|a| a.request_id == request_id)
    }

    pub fn active_request_ids(&self) -> Vec<RequestId> {
        self.active_requests.iter().map(|a| a.request_id).collect()
    }

    pub fn has_settled(&self, key: ProofKey) -> bool {
        self.settled_proofs.contains(&key)
    }

    pub fn update_profile(&mut self, update: ProfileUpdate, now: DateTime<Utc>) -> Result<()> {
        if let Some(skills) = update.skills {
            self.skills = non_empty_list("skill", skills)?;
        }
        if let Some(causes) = update.causes {
            self.causes = non_empty_list("cause", causes)?;
        }
        if let Some(availability) = update.availability {
            self.availability = availability.parse()?;
        }
        if let Some(motivation) = update.motivation {
            self.motivation = bounded("motivation", required("motivation", motivation)?)?;
        }
        if let Some(experience) = update.experience {
            self.experience = Some(bounded("experience", experience)?);
        }
        if let Some(location) = update.location {
            self.location = required("location", location)?;
        }
        if let Some(phone) = update.phone {
            self.phone = phone;
        }
        self.updated_at = now;
        Ok(())
    }
}

fn required(field: &str, value: String) -> Result<String> {
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(LifelineError::Validation(format!("{field} is required")));
    }
    Ok(value)
}

fn bounded(field: &str, value: String) -> Result<String> {
    if value.chars().count() > MAX_STATEMENT_LEN {
        return Err(LifelineError::Validation(format!(
            "{field} must be at most {MAX_STATEMENT_LEN} characters"
        )));
    }
    Ok(value)
}

fn non_empty_list(item: &str, values: Vec<String>) -> Result<Vec<String>> {
    let values: Vec<String> = values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect();
    if values.is_empty() {
        return Err(LifelineError::Validation(format!(
            "at least one {item} is required"
        )));
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::actor::Role;

    fn account() -> Account {
        Account {
            id: AccountId(Uuid::new_v4()),
            name: "Ravi".to_string(),
            email: "ravi@example.com".to_string(),
            phone: "+91 98000 00000".to_string(),
            role: Role::Volunteer,
            district: Some("Pune".to_string()),
            is_active: true,
        }
    }

    fn form() -> NewVolunteer {
        NewVolunteer {
            district: None,
            location: "Kothrud".to_string(),
            skills: vec!["teaching".to_string()],
            causes: vec!["education".to_string()],
            availability: "full-time".to_string(),
            experience: None,
            motivation: "Give back".to_string(),
        }
    }

    #[test]
    fn test_register_starts_pending_with_empty_ledger() {
        let volunteer = Volunteer::register(&account(), form(), None, Utc::now()).unwrap();
        assert_eq!(volunteer.status, VolunteerStatus::PendingReview);
        assert!(volunteer.is_active);
        assert_eq!(volunteer.points, 0);
        assert_eq!(volunteer.availability, Availability::FullTime);
        assert_eq!(volunteer.district, "Pune");
        assert!(!volunteer.can_take_work());
    }

    #[test]
    fn test_register_rejects_incomplete_forms() {
        let mut no_skills = form();
        no_skills.skills = vec!["  ".to_string()];
        assert!(matches!(
            Volunteer::register(&account(), no_skills, None, Utc::now()),
            Err(LifelineError::Validation(_))
        ));

        let mut bad_availability = form();
        bad_availability.availability = "mornings".to_string();
        assert!(Volunteer::register(&account(), bad_availability, None, Utc::now()).is_err());

        let mut no_motivation = form();
        no_motivation.motivation = String::new();
        assert!(Volunteer::register(&account(), no_motivation, None, Utc::now()).is_err());
    }

    #[test]
    fn test_profile_update_leaves_ledger_alone() {
        let mut volunteer = Volunteer::register(&account(), form(), None, Utc::now()).unwrap();
        volunteer.points = 75;
        volunteer
            .update_profile(
                ProfileUpdate {
                    skills: Some(vec!["first aid".to_string()]),
                    availability: Some("weekends".to_string()),
                    ..Default::default()
                },
                Utc::now(),
            )
            .unwrap();
        assert_eq!(volunteer.skills, vec!["first aid".to_string()]);
        assert_eq!(volunteer.availability, Availability::Weekends);
        assert_eq!(volunteer.points, 75);
    }

    #[test]
    fn test_availability_serializes_kebab_case() {
        let json = serde_json::to_value(Availability::FullTime).unwrap();
        assert_eq!(json, "full-time");
    }
}
