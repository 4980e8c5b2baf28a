//! Per-record work description and state

use crate::budget::{BudgetState, PanicBudget};
use crate::record::ManagedRecord;
use crate::traits::{DnsProvider, IpDetector, RecordResolver};
use chrono::{DateTime, Utc};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// Everything the loop needs to reconcile one record
///
/// Collaborators are shared handles: several records may use the same
/// provider client or detector.
#[derive(Clone)]
pub struct RecordTask {
    pub(crate) record: ManagedRecord,
    pub(crate) detector: Arc<dyn IpDetector>,
    pub(crate) resolver: Option<Arc<dyn RecordResolver>>,
    pub(crate) provider: Arc<dyn DnsProvider>,
    pub(crate) interval: Option<Duration>,
}

impl RecordTask {
    /// Create a task
    ///
    /// # Parameters
    ///
    /// - `resolver`: `None` compares against the last applied address instead
    pub fn new(
        record: ManagedRecord,
        detector: Arc<dyn IpDetector>,
        resolver: Option<Arc<dyn RecordResolver>>,
        provider: Arc<dyn DnsProvider>,
    ) -> Self {
        Self {
            record,
            detector,
            resolver,
            provider,
            interval: None,
        }
    }

    /// Reconcile this record on its own interval instead of the engine default
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// The managed record
    pub fn record(&self) -> &ManagedRecord {
        &self.record
    }
}

impl std::fmt::Debug for RecordTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordTask")
            .field("record", &self.record)
            .field("detector", &self.detector.method())
            .field(
                "resolver",
                &self.resolver.as_ref().map(|r| r.resolver_name()),
            )
            .field("provider", &self.provider.provider_name())
            .field("interval", &self.interval)
            .finish()
    }
}

/// In-memory state of one record, owned by the loop
///
/// `last_known_ip` only moves after a successful apply, so a failed attempt
/// leaves the discrepancy visible to the next cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordState {
    /// Address most recently applied successfully
    pub last_known_ip: Option<IpAddr>,
    /// When that apply happened
    pub last_update_at: Option<DateTime<Utc>>,
    pub(crate) budget: PanicBudget,
}

impl RecordState {
    /// Failures since the last success
    pub fn consecutive_failures(&self) -> u32 {
        self.budget.consecutive_failures()
    }

    /// Alerting state
    pub fn budget_state(&self) -> BudgetState {
        self.budget.state()
    }
}
