//! Panic budget: the consecutive-failure state machine for one record
//!
//! ```text
//!            failure (count < PANIC_MAX)
//!              ┌─────┐
//!              ▼     │
//!          ┌─────────┴┐  failure (count reaches PANIC_MAX)  ┌─────────┐
//!   ──────►│ Healthy  ├────────────────────────────────────►│ Tripped │◄─┐
//!          └──────────┘◄────────────────────────────────────┴────┬────┘  │
//!                              success                           └───────┘
//!                                                                 failure
//! ```
//!
//! The budget decides how loudly a failure is reported. It never stops the
//! loop from trying again on the next tick.

/// Consecutive failures after which a record counts as persistently failing
pub const PANIC_MAX: u32 = 5;

/// Alerting state of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetState {
    /// Fewer than [`PANIC_MAX`] consecutive failures
    Healthy,
    /// At least [`PANIC_MAX`] consecutive failures
    Tripped,
}

/// What a recorded failure means for alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Still healthy: report as an ordinary failure
    Failure,
    /// This failure tripped the budget
    Tripped,
    /// Already tripped: report as a repeated failure
    Repeated,
}

/// What a recorded success means for alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuccessOutcome {
    /// Budget was healthy
    Healthy,
    /// Budget was tripped and is now reset
    Reset,
}

/// Consecutive-failure counter with a two-state alerting machine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanicBudget {
    consecutive_failures: u32,
}

impl PanicBudget {
    /// Create a healthy budget
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of failures since the last success
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Current state
    pub fn state(&self) -> BudgetState {
        if self.consecutive_failures >= PANIC_MAX {
            BudgetState::Tripped
        } else {
            BudgetState::Healthy
        }
    }

    /// Whether the budget is tripped
    pub fn is_tripped(&self) -> bool {
        self.state() == BudgetState::Tripped
    }

    /// Count a failed attempt
    pub fn record_failure(&mut self) -> FailureOutcome {
        let was_tripped = self.is_tripped();
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        match (was_tripped, self.is_tripped()) {
            (true, _) => FailureOutcome::Repeated,
            (false, true) => FailureOutcome::Tripped,
            (false, false) => FailureOutcome::Failure,
        }
    }

    /// Count a successful attempt, resetting the counter
    pub fn record_success(&mut self) -> SuccessOutcome {
        let was_tripped = self.is_tripped();
        self.consecutive_failures = 0;

        if was_tripped {
            SuccessOutcome::Reset
        } else {
            SuccessOutcome::Healthy
        }
    }
}
