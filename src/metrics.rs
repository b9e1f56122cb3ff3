//! Lifecycle metrics.
//!
//! Counters are always emitted through the `metrics` facade, so any installed
//! recorder picks them up. With the `metrics` feature, [`LifelineMetrics`]
//! additionally keeps the same families in a Prometheus registry for hosts that
//! scrape one directly.
//!
//! Families:
//! - `lifeline_transitions_total{from,to}`: request status transitions
//! - `lifeline_conflicts_total{operation}`: writes refused because of state
//! - `lifeline_points_credited_total{urgency}`: points paid to volunteers
//! - `lifeline_partial_applications_total{operation}`: ledger writes that failed after
//!   the request write committed

use metrics::counter;
#[cfg(feature = "metrics")]
use prometheus::{CounterVec, Opts, Registry};

use crate::domain::request::{RequestStatus, UrgencyLevel};
#[cfg(feature = "metrics")]
use crate::error::Result;

pub(crate) fn emit_transition(from: RequestStatus, to: RequestStatus) {
    counter!(
        "lifeline_transitions_total",
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
}

pub(crate) fn emit_conflict(operation: &'static str) {
    counter!("lifeline_conflicts_total", "operation" => operation).increment(1);
}

pub(crate) fn emit_points_credited(urgency: UrgencyLevel, points: u64) {
    counter!("lifeline_points_credited_total", "urgency" => urgency.as_str()).increment(points);
}

pub(crate) fn emit_partial_application(operation: &'static str) {
    counter!("lifeline_partial_applications_total", "operation" => operation).increment(1);
}

/// Prometheus registry holding the lifecycle counter families.
#[cfg(feature = "metrics")]
#[derive(Clone)]
pub struct LifelineMetrics {
    registry: Registry,
    transitions_total: CounterVec,
    conflicts_total: CounterVec,
    points_credited_total: CounterVec,
    partial_applications_total: CounterVec,
}

#[cfg(feature = "metrics")]
impl LifelineMetrics {
    /// Register all families with `registry`.
    ///
    /// # Errors
    ///
    /// Fails if a family is already registered.
    pub fn new(registry: Registry) -> Result<Self> {
        let transitions_total = counter_vec(
            "lifeline_transitions_total",
            "Request status transitions",
            &["from", "to"],
        )?;
        let conflicts_total = counter_vec(
            "lifeline_conflicts_total",
            "Writes refused because the aggregate was in the wrong state",
            &["operation"],
        )?;
        let points_credited_total = counter_vec(
            "lifeline_points_credited_total",
            "Points credited to volunteers for accepted proofs",
            &["urgency"],
        )?;
        let partial_applications_total = counter_vec(
            "lifeline_partial_applications_total",
            "Volunteer ledger writes that failed after the request write committed",
            &["operation"],
        )?;

        for family in [
            &transitions_total,
            &conflicts_total,
            &points_credited_total,
            &partial_applications_total,
        ] {
            registry
                .register(Box::new(family.clone()))
                .map_err(|e| anyhow::anyhow!("Failed to register metric family: {}", e))?;
        }

        Ok(Self {
            registry,
            transitions_total,
            conflicts_total,
            points_credited_total,
            partial_applications_total,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_transition(&self, from: RequestStatus, to: RequestStatus) {
        self.transitions_total
            .with_label_values(&[from.as_str(), to.as_str()])
            .inc();
    }

    pub fn record_conflict(&self, operation: &str) {
        self.conflicts_total.with_label_values(&[operation]).inc();
    }

    pub fn record_points_credited(&self, urgency: UrgencyLevel, points: u64) {
        self.points_credited_total
            .with_label_values(&[urgency.as_str()])
            .inc_by(points as f64);
    }

    pub fn record_partial_application(&self, operation: &str) {
        self.partial_applications_total
            .with_label_values(&[operation])
            .inc();
    }
}

#[cfg(feature = "metrics")]
fn counter_vec(name: &str, help: &str, labels: &[&str]) -> Result<CounterVec> {
    Ok(CounterVec::new(Opts::new(name, help), labels)
        .map_err(|e| anyhow::anyhow!("Failed to create {} counter: {}", name, e))?)
}
