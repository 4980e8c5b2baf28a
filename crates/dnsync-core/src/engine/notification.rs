//! Notifications emitted by the reconcile loop

use crate::record::ManagedRecord;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;

/// Stage of a reconciliation cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Detection,
    Resolution,
    Apply,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Detection => "detection",
            Stage::Resolution => "resolution",
            Stage::Apply => "apply",
        })
    }
}

/// What happened to a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationKind {
    /// Record did not exist and was created
    Created { ip: IpAddr },

    /// Record now points at a new address
    Updated {
        previous_ip: Option<IpAddr>,
        ip: IpAddr,
    },

    /// A cycle failed while the budget is healthy
    Failed {
        stage: Stage,
        consecutive_failures: u32,
    },

    /// A cycle failed while the budget is tripped
    RepeatedFailure {
        stage: Stage,
        consecutive_failures: u32,
    },

    /// The failure budget just tripped
    BudgetTripped { consecutive_failures: u32 },

    /// A success brought a tripped budget back to healthy
    BudgetReset,
}

impl NotificationKind {
    /// Stable name of the kind
    pub fn name(&self) -> &'static str {
        match self {
            NotificationKind::Created { .. } => "created",
            NotificationKind::Updated { .. } => "updated",
            NotificationKind::Failed { .. } => "failed",
            NotificationKind::RepeatedFailure { .. } => "repeated_failure",
            NotificationKind::BudgetTripped { .. } => "budget_tripped",
            NotificationKind::BudgetReset => "budget_reset",
        }
    }

    /// Address the notification is about, if any
    pub fn ip(&self) -> Option<IpAddr> {
        match self {
            NotificationKind::Created { ip } | NotificationKind::Updated { ip, .. } => Some(*ip),
            _ => None,
        }
    }

    /// Whether this reports a problem
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            NotificationKind::Failed { .. }
                | NotificationKind::RepeatedFailure { .. }
                | NotificationKind::BudgetTripped { .. }
        )
    }
}

/// One structured event for the external notifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Which record
    pub record: ManagedRecord,
    /// What happened
    #[serde(flatten)]
    pub kind: NotificationKind,
    /// When
    pub at: DateTime<Utc>,
    /// Human-readable detail (error message, provider outcome)
    pub detail: String,
}
