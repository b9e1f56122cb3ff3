//! Role policy table.
//!
//! Each role maps to the actions it may take and the scope each grant is
//! evaluated in. Anything absent from a role's table is denied.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::actor::Role;

/// Actions an actor can attempt on a request or volunteer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    ViewRequest,
    CreateRequest,
    AcceptRequest,
    SubmitProof,
    ReviewProof,
    ModerateContent,
    SetVisibility,
    OverrideStatus,
    DeleteRequest,
    LeaveFeedback,
    ManageVolunteer,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::ViewRequest => "view_request",
            Action::CreateRequest => "create_request",
            Action::AcceptRequest => "accept_request",
            Action::SubmitProof => "submit_proof",
            Action::ReviewProof => "review_proof",
            Action::ModerateContent => "moderate_content",
            Action::SetVisibility => "set_visibility",
            Action::OverrideStatus => "override_status",
            Action::DeleteRequest => "delete_request",
            Action::LeaveFeedback => "leave_feedback",
            Action::ManageVolunteer => "manage_volunteer",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition a grant is evaluated under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Any resource.
    Global,
    /// Resources in the actor's district. Fails closed without one.
    District,
    /// Requests the actor submitted.
    Submitter,
    /// Requests in the actor's own `active_requests`.
    Assignee,
    /// Open, approved and unassigned requests.
    OpenPool,
    /// Approved requests. State preconditions are left to the transition.
    Approved,
}

/// What a role may do.
#[derive(Debug)]
pub struct RolePolicy {
    pub role: Role,
    /// Whether moderation decisions by this role also set `is_public`.
    pub moderation_publishes: bool,
    pub grants: &'static [(Action, &'static [Scope])],
}

impl RolePolicy {
    /// Scopes under which `action` is granted; empty when it is not.
    pub fn scopes(&self, action: Action) -> &'static [Scope] {
        self.grants
            .iter()
            .find(|(a, _)| *a == action)
            .map(|(_, scopes)| *scopes)
            .unwrap_or(&[])
    }
}

static CORE_ADMIN: RolePolicy = RolePolicy {
    role: Role::CoreAdmin,
    moderation_publishes: true,
    grants: &[
        (Action::ViewRequest, &[Scope::Global]),
        (Action::CreateRequest, &[Scope::Global]),
        (Action::AcceptRequest, &[Scope::Global]),
        (Action::SubmitProof, &[Scope::Assignee]),
        (Action::ReviewProof, &[Scope::Global]),
        (Action::ModerateContent, &[Scope::Global]),
        (Action::SetVisibility, &[Scope::Global]),
        (Action::OverrideStatus, &[Scope::Global]),
        (Action::DeleteRequest, &[Scope::Submitter]),
        (Action::LeaveFeedback, &[Scope::Submitter]),
        (Action::ManageVolunteer, &[Scope::Global]),
    ],
};

static DISTRICT_LEAD: RolePolicy = RolePolicy {
    role: Role::DistrictLead,
    moderation_publishes: true,
    grants: &[
        (Action::ViewRequest, &[Scope::District, Scope::Submitter]),
        (Action::CreateRequest, &[Scope::Global]),
        (Action::ReviewProof, &[Scope::District]),
        (Action::ModerateContent, &[Scope::District]),
        (Action::SetVisibility, &[Scope::District]),
        (Action::DeleteRequest, &[Scope::Submitter]),
        (Action::LeaveFeedback, &[Scope::Submitter]),
        (Action::ManageVolunteer, &[Scope::District]),
    ],
};

static MODERATOR: RolePolicy = RolePolicy {
    role: Role::Moderator,
    moderation_publishes: false,
    grants: &[
        (Action::ViewRequest, &[Scope::Global]),
        (Action::CreateRequest, &[Scope::Global]),
        (Action::ReviewProof, &[Scope::Global]),
        (Action::ModerateContent, &[Scope::Global]),
        (Action::DeleteRequest, &[Scope::Submitter]),
        (Action::LeaveFeedback, &[Scope::Submitter]),
    ],
};

static VOLUNTEER: RolePolicy = RolePolicy {
    role: Role::Volunteer,
    moderation_publishes: false,
    grants: &[
        (
            Action::ViewRequest,
            &[Scope::OpenPool, Scope::Assignee, Scope::Submitter],
        ),
        (Action::CreateRequest, &[Scope::Global]),
        (Action::AcceptRequest, &[Scope::Approved]),
        (Action::SubmitProof, &[Scope::Assignee]),
        (Action::DeleteRequest, &[Scope::Submitter]),
        (Action::LeaveFeedback, &[Scope::Submitter]),
    ],
};

static HELP_SEEKER: RolePolicy = RolePolicy {
    role: Role::HelpSeeker,
    moderation_publishes: false,
    grants: &[
        (Action::ViewRequest, &[Scope::Submitter]),
        (Action::CreateRequest, &[Scope::Global]),
        (Action::DeleteRequest, &[Scope::Submitter]),
        (Action::LeaveFeedback, &[Scope::Submitter]),
    ],
};

/// Policy for a role.
pub fn policy(role: Role) -> &'static RolePolicy {
    match role {
        Role::CoreAdmin => &CORE_ADMIN,
        Role::DistrictLead => &DISTRICT_LEAD,
        Role::Moderator => &MODERATOR,
        Role::Volunteer => &VOLUNTEER,
        Role::HelpSeeker => &HELP_SEEKER,
    }
}
