//! Authorization scope.
//!
//! [`permit`] decides whether an actor may take an action on a resource by
//! looking the actor's role up in the [`permissions`] table and evaluating each
//! granted [`Scope`] against the facts in [`ResourceScope`]. It is a pure
//! function: the coordinator gathers the facts, this module only decides.

pub mod permissions;

use crate::domain::actor::{AccountId, Actor};
use crate::domain::request::{AdminStatus, HelpRequest};
use crate::domain::volunteer::Volunteer;
use crate::error::{LifelineError, Result};

pub use permissions::{Action, RolePolicy, Scope, policy};

/// Facts about the resource an action targets.
#[derive(Debug, Clone, Default)]
pub struct ResourceScope<'a> {
    pub district: Option<&'a str>,
    pub submitter: Option<AccountId>,
    /// The request is in the acting volunteer's `active_requests`.
    pub held_by_actor: bool,
    pub approved: bool,
    pub open_unassigned: bool,
}

impl<'a> ResourceScope<'a> {
    /// Scope of an action with no target resource yet (creation).
    pub fn none() -> Self {
        Self::default()
    }

    /// Scope of a request, as seen by an actor that may hold a volunteer profile.
    pub fn request(request: &'a HelpRequest, acting_volunteer: Option<&Volunteer>) -> Self {
        Self {
            district: Some(request.district.as_str()),
            submitter: request.submitter.account_id,
            held_by_actor: acting_volunteer.is_some_and(|v| v.holds(request.id)),
            approved: request.admin_status == AdminStatus::Approved,
            open_unassigned: request.is_in_open_pool(),
        }
    }

    /// Scope of a volunteer profile.
    pub fn volunteer(volunteer: &'a Volunteer) -> Self {
        Self {
            district: Some(volunteer.district.as_str()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(String),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Decide whether `actor` may take `action` on `resource`.
pub fn permit(actor: &Actor, resource: &ResourceScope<'_>, action: Action) -> Decision {
    let scopes = policy(actor.role).scopes(action);
    if scopes.is_empty() {
        return Decision::Deny(format!("role '{}' may not {action}", actor.role));
    }

    let mut reason = None;
    for scope in scopes {
        match check_scope(actor, resource, *scope) {
            Ok(()) => return Decision::Allow,
            Err(why) => {
                reason.get_or_insert(why);
            }
        }
    }

    Decision::Deny(reason.unwrap_or_else(|| format!("not permitted to {action}")))
}

/// [`permit`], with a deny turned into [`LifelineError::Forbidden`].
pub fn require(actor: &Actor, resource: &ResourceScope<'_>, action: Action) -> Result<()> {
    match permit(actor, resource, action) {
        Decision::Allow => Ok(()),
        Decision::Deny(reason) => {
            tracing::debug!(
                actor = %actor.id,
                role = %actor.role,
                action = %action,
                reason = %reason,
                "Authorization denied"
            );
            Err(LifelineError::Forbidden(reason))
        }
    }
}

fn check_scope(
    actor: &Actor,
    resource: &ResourceScope<'_>,
    scope: Scope,
) -> std::result::Result<(), String> {
    match scope {
        Scope::Global => Ok(()),
        Scope::District => {
            let Some(own) = actor.district.as_deref().filter(|d| !d.trim().is_empty()) else {
                return Err("no district assigned to this account".to_string());
            };
            match resource.district {
                Some(target) if districts_match(own, target) => Ok(()),
                Some(target) => Err(format!("'{target}' is outside district '{own}'")),
                None => Err("resource has no district".to_string()),
            }
        }
        Scope::Submitter => {
            if resource.submitter == Some(actor.id) {
                Ok(())
            } else {
                Err("only the submitter may do this".to_string())
            }
        }
        Scope::Assignee => {
            if resource.held_by_actor {
                Ok(())
            } else {
                Err("request is not among your active assignments".to_string())
            }
        }
        Scope::OpenPool => {
            if resource.open_unassigned {
                Ok(())
            } else {
                Err("request is not open for volunteers".to_string())
            }
        }
        Scope::Approved => {
            if resource.approved {
                Ok(())
            } else {
                Err("request has not been approved".to_string())
            }
        }
    }
}

/// Trimmed, lowercased form used for every district comparison.
pub fn normalize_district(district: &str) -> String {
    district.trim().to_lowercase()
}

/// Whether an actor scoped to `actor_district` covers `resource_district`.
///
/// Matching tolerates the resource district containing the actor's, so a
/// lead for "Pune" covers "Pune City".
pub fn districts_match(actor_district: &str, resource_district: &str) -> bool {
    let actor_district = normalize_district(actor_district);
    !actor_district.is_empty() && normalize_district(resource_district).contains(&actor_district)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::actor::Role;
    use uuid::Uuid;

    fn actor(role: Role) -> Actor {
        Actor::new(AccountId(Uuid::new_v4()), role)
    }

    fn in_district(district: &str) -> ResourceScope<'_> {
        ResourceScope {
            district: Some(district),
            approved: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_core_admin_allowed_everywhere() {
        let admin = actor(Role::CoreAdmin);
        for action in [
            Action::ViewRequest,
            Action::ReviewProof,
            Action::ModerateContent,
            Action::OverrideStatus,
            Action::ManageVolunteer,
        ] {
            assert!(permit(&admin, &in_district("Mumbai"), action).is_allowed());
        }
    }

    #[test]
    fn test_district_lead_matches_case_insensitively() {
        let lead = actor(Role::DistrictLead).with_district("  pune ");
        assert!(permit(&lead, &in_district("Pune"), Action::ModerateContent).is_allowed());
        assert!(permit(&lead, &in_district("PUNE CITY"), Action::ModerateContent).is_allowed());
        assert!(!permit(&lead, &in_district("Mumbai"), Action::ModerateContent).is_allowed());
    }

    #[test]
    fn test_district_lead_without_district_fails_closed() {
        let lead = actor(Role::DistrictLead);
        let decision = permit(&lead, &in_district("Pune"), Action::ReviewProof);
        assert!(!decision.is_allowed());

        let blank = actor(Role::DistrictLead).with_district("   ");
        assert!(!permit(&blank, &in_district("Pune"), Action::ReviewProof).is_allowed());
    }

    #[test]
    fn test_moderator_limited_to_content() {
        let moderator = actor(Role::Moderator);
        assert!(permit(&moderator, &in_district("Nagpur"), Action::ModerateContent).is_allowed());
        assert!(
            !permit(
                &moderator,
                &ResourceScope::default(),
                Action::ManageVolunteer
            )
            .is_allowed()
        );
        assert!(!permit(&moderator, &in_district("Nagpur"), Action::OverrideStatus).is_allowed());
    }

    #[test]
    fn test_volunteer_needs_assignment_to_submit_proof() {
        let volunteer = actor(Role::Volunteer);
        let held = ResourceScope {
            held_by_actor: true,
            ..in_district("Pune")
        };
        assert!(permit(&volunteer, &held, Action::SubmitProof).is_allowed());

        let result = require(&volunteer, &in_district("Pune"), Action::SubmitProof);
        assert!(matches!(result, Err(LifelineError::Forbidden(_))));
    }

    #[test]
    fn test_volunteer_sees_open_pool_only() {
        let volunteer = actor(Role::Volunteer);
        let open = ResourceScope {
            open_unassigned: true,
            ..in_district("Pune")
        };
        assert!(permit(&volunteer, &open, Action::ViewRequest).is_allowed());
        assert!(!permit(&volunteer, &in_district("Pune"), Action::ViewRequest).is_allowed());
    }

    #[test]
    fn test_help_seeker_only_on_own_requests() {
        let seeker = actor(Role::HelpSeeker);
        let own = ResourceScope {
            submitter: Some(seeker.id),
            ..in_district("Pune")
        };
        assert!(permit(&seeker, &own, Action::DeleteRequest).is_allowed());
        assert!(!permit(&seeker, &in_district("Pune"), Action::ViewRequest).is_allowed());
        assert!(!permit(&seeker, &own, Action::ModerateContent).is_allowed());
    }

    #[test]
    fn test_districts_match_rules() {
        assert!(districts_match("pune", " Pune "));
        assert!(!districts_match("", "Pune"));
        assert!(!districts_match("Pune City", "Pune"));
    }
}
