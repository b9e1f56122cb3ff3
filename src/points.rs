//! Reward points per urgency tier.

use serde::{Deserialize, Serialize};

use crate::domain::request::UrgencyLevel;

/// Points credited for an accepted proof, by urgency of the resolved request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardTable {
    pub low: u64,
    pub medium: u64,
    pub high: u64,
    pub critical: u64,
}

impl Default for RewardTable {
    fn default() -> Self {
        Self {
            low: 25,
            medium: 50,
            high: 75,
            critical: 100,
        }
    }
}

/// Pure lookup from urgency tier to reward points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PointsPolicy {
    table: RewardTable,
}

impl PointsPolicy {
    pub fn new(table: RewardTable) -> Self {
        Self { table }
    }

    pub fn points_for(&self, urgency: UrgencyLevel) -> u64 {
        match urgency {
            UrgencyLevel::Low => self.table.low,
            UrgencyLevel::Medium => self.table.medium,
            UrgencyLevel::High => self.table.high,
            UrgencyLevel::Critical => self.table.critical,
        }
    }
}
