//! Volunteer reputation ledger.
//!
//! Every ledger change is a [`LedgerEntry`] applied with [`Volunteer::apply`].
//! Application is idempotent: replaying an entry that already took effect
//! changes nothing, and a proof settlement is keyed by `(request_id, proof_id)`
//! so points are credited at most once however often it is retried.
//!
//! Holds are keyed by when the assignment began. A release only ends holds that
//! began at or before its cutoff, so a release that lands late cannot drop an
//! assignment the volunteer took on afterwards.
//!
//! [`entries_for`] re-derives the entries a request's current state implies for
//! one volunteer, which is how a ledger is repaired after a partially applied
//! cross-aggregate write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::{ActiveRequest, PendingProof, ProofKey, Volunteer, VolunteerId};
use crate::domain::request::{
    HelpRequest, ProofId, RequestId, ReviewStatus, UrgencyLevel,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerEntry {
    /// The volunteer holds the request from `assigned_at`.
    Assigned {
        request_id: RequestId,
        assigned_at: DateTime<Utc>,
    },
    /// A proof was submitted and awaits review.
    ProofSubmitted {
        request_id: RequestId,
        proof_id: ProofId,
        submitted_at: DateTime<Utc>,
    },
    /// A proof was reviewed. Holds are left to [`LedgerEntry::Released`].
    Settled(Settlement),
    /// The volunteer stops holding the request: resolved, rejected, overridden
    /// or deleted. Only holds that began at or before `through`, and pending
    /// proofs submitted by then, are dropped.
    Released {
        request_id: RequestId,
        through: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub request_id: RequestId,
    pub proof_id: ProofId,
    pub outcome: SettlementOutcome,
}

impl Settlement {
    pub fn key(&self) -> ProofKey {
        ProofKey {
            request_id: self.request_id,
            proof_id: self.proof_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementOutcome {
    Credited { points: u64 },
    Rejected,
}

impl Volunteer {
    /// Apply a ledger entry. Returns whether the volunteer changed.
    pub fn apply(&mut self, entry: &LedgerEntry, now: DateTime<Utc>) -> bool {
        let changed = match *entry {
            LedgerEntry::Assigned {
                request_id,
                assigned_at,
            } => self.hold(request_id, assigned_at),
            LedgerEntry::ProofSubmitted {
                request_id,
                proof_id,
                submitted_at,
            } => {
                let key = ProofKey {
                    request_id,
                    proof_id,
                };
                if self.has_settled(key) || self.pending_proofs.iter().any(|p| p.proof_id == proof_id) {
                    false
                } else {
                    self.pending_proofs.push(PendingProof {
                        request_id,
                        proof_id,
                        submitted_at,
                    });
                    true
                }
            }
            LedgerEntry::Settled(settlement) => self.settle(settlement),
            LedgerEntry::Released {
                request_id,
                through,
            } => {
                let before = (self.active_requests.len(), self.pending_proofs.len());
                self.active_requests
                    .retain(|a| a.request_id != request_id || a.assigned_at > through);
                self.pending_proofs
                    .retain(|p| p.request_id != request_id || p.submitted_at > through);
                before != (self.active_requests.len(), self.pending_proofs.len())
            }
        };

        if changed {
            self.updated_at = now;
        }
        changed
    }

    /// Record the hold, moving an older hold on the same request forward.
    fn hold(&mut self, request_id: RequestId, assigned_at: DateTime<Utc>) -> bool {
        match self
            .active_requests
            .iter_mut()
            .find(|a| a.request_id == request_id)
        {
            Some(held) if held.assigned_at >= assigned_at => false,
            Some(held) => {
                held.assigned_at = assigned_at;
                true
            }
            None => {
                self.active_requests.push(ActiveRequest {
                    request_id,
                    assigned_at,
                });
                true
            }
        }
    }

    fn settle(&mut self, settlement: Settlement) -> bool {
        let key = settlement.key();
        if self.has_settled(key) {
            return false;
        }

        self.pending_proofs.retain(|p| p.proof_id != settlement.proof_id);
        if let SettlementOutcome::Credited { points } = settlement.outcome {
            self.points = self.points.saturating_add(points);
            if !self.contribution_history.contains(&settlement.request_id) {
                self.contribution_history.push(settlement.request_id);
            }
        }
        self.settled_proofs.push(key);
        true
    }
}

/// Ledger entries implied by `request`'s current state for `volunteer`.
///
/// `None` means the request no longer exists as of `now`, which releases it.
pub fn entries_for(
    request_id: RequestId,
    request: Option<&HelpRequest>,
    volunteer: VolunteerId,
    now: DateTime<Utc>,
    points_for: impl Fn(UrgencyLevel) -> u64,
) -> Vec<LedgerEntry> {
    let Some(request) = request else {
        return vec![LedgerEntry::Released {
            request_id,
            through: now,
        }];
    };

    let mut entries = Vec::new();
    for proof in request.proofs.iter().filter(|p| p.volunteer == volunteer) {
        let outcome = match proof.review.status {
            ReviewStatus::Pending => {
                entries.push(LedgerEntry::ProofSubmitted {
                    request_id,
                    proof_id: proof.id,
                    submitted_at: proof.submitted_at,
                });
                continue;
            }
            ReviewStatus::Accepted => SettlementOutcome::Credited {
                points: points_for(request.urgency),
            },
            ReviewStatus::Rejected => SettlementOutcome::Rejected,
        };
        entries.push(LedgerEntry::Settled(Settlement {
            request_id,
            proof_id: proof.id,
            outcome,
        }));
    }

    if request.assigned_volunteer == Some(volunteer) && request.status.is_active_assignment() {
        entries.push(LedgerEntry::Assigned {
            request_id,
            assigned_at: request.assigned_at.unwrap_or(request.updated_at),
        });
    } else {
        // Anything the volunteer took on after this snapshot is not ours to end.
        entries.push(LedgerEntry::Released {
            request_id,
            through: request.updated_at,
        });
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crate::domain::actor::{Account, AccountId, Role};
    use crate::domain::volunteer::NewVolunteer;
    use uuid::Uuid;

    fn volunteer() -> Volunteer {
        let account = Account {
            id: AccountId(Uuid::new_v4()),
            name: "Meera".to_string(),
            email: "meera@example.com".to_string(),
            phone: "1".to_string(),
            role: Role::Volunteer,
            district: Some("Mumbai".to_string()),
            is_active: true,
        };
        let form = NewVolunteer {
            location: "Dadar".to_string(),
            skills: vec!["driving".to_string()],
            causes: vec!["healthcare".to_string()],
            availability: "evenings".to_string(),
            motivation: "help".to_string(),
            ..Default::default()
        };
        Volunteer::register(&account, form, None, Utc::now()).unwrap()
    }

    #[test]
    fn test_credit_applies_once_per_proof() {
        let mut v = volunteer();
        let request_id = RequestId(Uuid::new_v4());
        let proof_id = ProofId(Uuid::new_v4());

        assert!(v.apply(
            &LedgerEntry::Assigned {
                request_id,
                assigned_at: Utc::now()
            },
            Utc::now()
        ));
        assert!(v.apply(
            &LedgerEntry::ProofSubmitted {
                request_id,
                proof_id,
                submitted_at: Utc::now()
            },
            Utc::now()
        ));
        let settled = LedgerEntry::Settled(Settlement {
            request_id,
            proof_id,
            outcome: SettlementOutcome::Credited { points: 100 },
        });
        assert!(v.apply(&settled, Utc::now()));
        assert!(!v.apply(&settled, Utc::now()));
        assert!(v.apply(
            &LedgerEntry::Released {
                request_id,
                through: Utc::now()
            },
            Utc::now()
        ));

        assert_eq!(v.points, 100);
        assert_eq!(v.contribution_history, vec![request_id]);
        assert!(v.active_requests.is_empty());
        assert!(v.pending_proofs.is_empty());
    }

    #[test]
    fn test_replayed_submission_after_settlement_is_ignored() {
        let mut v = volunteer();
        let request_id = RequestId(Uuid::new_v4());
        let proof_id = ProofId(Uuid::new_v4());
        v.apply(
            &LedgerEntry::Settled(Settlement {
                request_id,
                proof_id,
                outcome: SettlementOutcome::Rejected,
            }),
            Utc::now(),
        );

        let changed = v.apply(
            &LedgerEntry::ProofSubmitted {
                request_id,
                proof_id,
                submitted_at: Utc::now(),
            },
            Utc::now(),
        );
        assert!(!changed);
        assert!(v.pending_proofs.is_empty());
        assert_eq!(v.points, 0);
    }

    #[test]
    fn test_release_drops_request_and_its_pending_proofs() {
        let mut v = volunteer();
        let request_id = RequestId(Uuid::new_v4());
        v.apply(
            &LedgerEntry::Assigned {
                request_id,
                assigned_at: Utc::now(),
            },
            Utc::now(),
        );
        v.apply(
            &LedgerEntry::ProofSubmitted {
                request_id,
                proof_id: ProofId(Uuid::new_v4()),
                submitted_at: Utc::now(),
            },
            Utc::now(),
        );

        let released = LedgerEntry::Released {
            request_id,
            through: Utc::now(),
        };
        assert!(v.apply(&released, Utc::now()));
        assert!(!v.holds(request_id));
        assert!(v.pending_proofs.is_empty());
        assert!(!v.apply(&released, Utc::now()));
    }

    #[test]
    fn test_late_release_keeps_newer_assignment() {
        let mut v = volunteer();
        let request_id = RequestId(Uuid::new_v4());
        let first = Utc::now() - Duration::minutes(10);
        let rejected_at = first + Duration::minutes(5);
        let second = rejected_at + Duration::minutes(1);

        v.apply(
            &LedgerEntry::Assigned {
                request_id,
                assigned_at: first,
            },
            Utc::now(),
        );
        // Re-accepted before the rejection's release was applied
        assert!(v.apply(
            &LedgerEntry::Assigned {
                request_id,
                assigned_at: second,
            },
            Utc::now(),
        ));
        assert!(!v.apply(
            &LedgerEntry::Released {
                request_id,
                through: rejected_at,
            },
            Utc::now(),
        ));
        assert_eq!(
            v.active_requests,
            vec![ActiveRequest {
                request_id,
                assigned_at: second
            }]
        );

        // A replayed older assignment does not move the hold back
        assert!(!v.apply(
            &LedgerEntry::Assigned {
                request_id,
                assigned_at: first,
            },
            Utc::now(),
        ));
    }

    #[test]
    fn test_missing_request_derives_release() {
        let request_id = RequestId(Uuid::new_v4());
        let now = Utc::now();
        let entries = entries_for(request_id, None, VolunteerId(Uuid::new_v4()), now, |_| 0);
        assert_eq!(
            entries,
            vec![LedgerEntry::Released {
                request_id,
                through: now
            }]
        );
    }
}
