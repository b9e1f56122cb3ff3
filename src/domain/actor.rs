//! Authenticated actors and the account records behind them.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LifelineError;

/// Identity of an account in the identity directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub Uuid);

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl From<Uuid> for AccountId {
    fn from(uuid: Uuid) -> Self {
        AccountId(uuid)
    }
}

impl std::ops::Deref for AccountId {
    type Target = Uuid;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Role carried by every authenticated actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    CoreAdmin,
    DistrictLead,
    Moderator,
    Volunteer,
    HelpSeeker,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::CoreAdmin => "core_admin",
            Role::DistrictLead => "district_lead",
            Role::Moderator => "moderator",
            Role::Volunteer => "volunteer",
            Role::HelpSeeker => "help_seeker",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = LifelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "core_admin" => Ok(Role::CoreAdmin),
            "district_lead" => Ok(Role::DistrictLead),
            "moderator" => Ok(Role::Moderator),
            "volunteer" => Ok(Role::Volunteer),
            "help_seeker" => Ok(Role::HelpSeeker),
            other => Err(LifelineError::Validation(format!("unknown role '{other}'"))),
        }
    }
}

/// The authenticated caller of an operation, as supplied by the routing layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: AccountId,
    pub role: Role,
    /// District the actor is scoped to. Only meaningful for district leads.
    pub district: Option<String>,
}

impl Actor {
    pub fn new(id: AccountId, role: Role) -> Self {
        Self {
            id,
            role,
            district: None,
        }
    }

    pub fn with_district(mut self, district: impl Into<String>) -> Self {
        self.district = Some(district.into());
        self
    }
}

/// Account record held by the identity directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub role: Role,
    pub district: Option<String>,
    pub is_active: bool,
}

impl Account {
    /// The actor this account authenticates as.
    pub fn actor(&self) -> Actor {
        Actor {
            id: self.id,
            role: self.role,
            district: self.district.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trips_through_str() {
        for role in [
            Role::CoreAdmin,
            Role::DistrictLead,
            Role::Moderator,
            Role::Volunteer,
            Role::HelpSeeker,
        ] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn test_unknown_role_is_validation_error() {
        let err = "partner".parse::<Role>().unwrap_err();
        assert!(matches!(err, LifelineError::Validation(_)));
    }
}
