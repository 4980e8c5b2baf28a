//! Core reconcile loop
//!
//! The Reconciler is responsible for:
//! - Detecting the current address of each record's family
//! - Reading what the record publishes
//! - Applying the detected address when they differ
//! - Folding every failure into the record's panic budget
//! - Emitting notifications for updates, failures, trips and resets
//!
//! ## Architecture
//!
//! ```text
//!            ┌──────────────┐  tick
//!            │  Reconciler  │────────┐
//!            └──────────────┘        │ one work unit per due record
//!                                    ▼
//!   ┌────────────┐   ┌────────────────┐   ┌─────────────┐   ┌──────────────┐
//!   │ IpDetector │──►│ RecordResolver │──►│  compare    │──►│ DnsProvider  │
//!   │ (detect)   │   │ (current)      │   │ (equal: no-op)  │ (apply)      │
//!   └────────────┘   └────────────────┘   └─────────────┘   └──────────────┘
//!                                                                  │
//!                                          PanicBudget + Notification
//! ```
//!
//! ## Concurrency
//!
//! Records are reconciled concurrently, each in its own spawned work unit.
//! Within one record the steps are strictly ordered. Each record's state sits
//! behind its own mutex and a work unit that finds it held gives up
//! immediately, so a slow cycle makes the next tick skip that record instead
//! of queueing behind it.
//!
//! No retries happen inside a cycle. The next tick is the retry.

mod notification;
mod task;

pub use notification::{Notification, NotificationKind, Stage};
pub use task::{RecordState, RecordTask};

use crate::budget::{FailureOutcome, SuccessOutcome};
use crate::clock::Clock;
use crate::config::{EngineConfig, MAX_INTERVAL_SECS};
use crate::error::{Error, Result};
use crate::record::ManagedRecord;
use crate::traits::{ApplyOutcome, DetectionResult};
use std::collections::HashSet;
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Result of one reconciliation attempt for one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Published address already matches; provider not called
    Unchanged,
    /// The provider was called and succeeded
    Applied(ApplyOutcome),
    /// A stage failed; counted against the budget
    Failed(Stage),
    /// A previous cycle for this record is still running
    InFlight,
    /// Shutdown began before the cycle reached the provider
    Cancelled,
}

struct RecordSlot {
    task: RecordTask,
    interval: Duration,
    state: Mutex<RecordState>,
}

struct Shared {
    slots: Vec<RecordSlot>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    stopping: AtomicBool,
    event_tx: mpsc::Sender<Notification>,
}

/// Core reconcile loop
///
/// ## Lifecycle
///
/// 1. Create with [`Reconciler::new()`]
/// 2. Start with [`Reconciler::run()`] or [`Reconciler::run_with_shutdown()`]
/// 3. On shutdown no new cycles start and in-flight cycles finish
///
/// Cloning is cheap and clones share all record state.
#[derive(Clone)]
pub struct Reconciler {
    shared: Arc<Shared>,
    tick: Duration,
}

impl Reconciler {
    /// Create a new reconciler
    ///
    /// # Parameters
    ///
    /// - `tasks`: One task per managed record
    /// - `config`: Engine settings (default interval, per-call timeout, channel capacity)
    /// - `clock`: Time source
    ///
    /// # Returns
    ///
    /// A tuple of (reconciler, notification_receiver)
    pub fn new(
        tasks: Vec<RecordTask>,
        config: &EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<(Self, mpsc::Receiver<Notification>)> {
        if tasks.is_empty() {
            return Err(Error::config("No records to reconcile"));
        }
        if config.event_channel_capacity == 0 {
            return Err(Error::config("Event channel capacity must be > 0"));
        }

        let default_interval = config.interval();
        let slots: Vec<RecordSlot> = tasks
            .into_iter()
            .map(|task| RecordSlot {
                interval: task.interval.unwrap_or(default_interval),
                task,
                state: Mutex::new(RecordState::default()),
            })
            .collect();

        let max_interval = Duration::from_secs(MAX_INTERVAL_SECS);
        let mut seen = HashSet::new();
        for slot in &slots {
            let record = &slot.task.record;
            if slot.interval.is_zero() {
                return Err(Error::config(format!("Record {} has a zero interval", record)));
            }
            if slot.interval > max_interval {
                return Err(Error::config(format!(
                    "Record {} has an interval above {:?}",
                    record, max_interval
                )));
            }
            if !seen.insert(record.identity()) {
                return Err(Error::config(format!(
                    "Record {} is configured more than once",
                    record
                )));
            }
        }

        let tick = driver_tick(slots.iter().map(|s| s.interval));
        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let shared = Shared {
            slots,
            clock,
            timeout: config.timeout(),
            stopping: AtomicBool::new(false),
            event_tx: tx,
        };

        Ok((
            Self {
                shared: Arc::new(shared),
                tick,
            },
            rx,
        ))
    }

    /// Managed records, in configuration order
    pub fn records(&self) -> impl Iterator<Item = &ManagedRecord> {
        self.shared.slots.iter().map(|s| &s.task.record)
    }

    /// Snapshot of a record's state
    ///
    /// Waits for an in-flight cycle of that record to finish.
    pub async fn state(&self, record: &ManagedRecord) -> Option<RecordState> {
        let slot = self.shared.slot(record)?;
        Some(slot.state.lock().await.clone())
    }

    /// Run one cycle for one record
    ///
    /// Returns `None` if the record is not managed by this reconciler.
    pub async fn reconcile(&self, record: &ManagedRecord) -> Option<CycleOutcome> {
        let slot = self.shared.slot(record)?;
        Some(self.shared.reconcile_slot(slot).await)
    }

    /// Run one cycle for every record concurrently and wait for all of them
    ///
    /// Outcomes are returned in configuration order.
    pub async fn reconcile_all(&self) -> Vec<CycleOutcome> {
        let mut set = JoinSet::new();
        for index in 0..self.shared.slots.len() {
            let shared = Arc::clone(&self.shared);
            set.spawn(async move { (index, shared.reconcile_index(index).await) });
        }

        let mut outcomes = vec![CycleOutcome::Cancelled; self.shared.slots.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = outcome,
                Err(e) => error!("Reconciliation task aborted: {}", e),
            }
        }
        outcomes
    }

    /// Run the loop until Ctrl-C
    pub async fn run(&self) -> Result<()> {
        self.run_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run the loop until `shutdown` completes
    ///
    /// Every record is due on the first tick. After that each record runs on
    /// its own interval. Once `shutdown` resolves no further cycle starts;
    /// cycles already past detection and resolution finish their apply.
    pub async fn run_with_shutdown<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let shared = &self.shared;
        info!(
            "Reconcile loop started: {} record(s), tick {:?}",
            shared.slots.len(),
            self.tick
        );

        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let start = shared.clock.instant();
        let mut next_due: Vec<Option<Instant>> = vec![Some(start); shared.slots.len()];
        let mut in_flight = JoinSet::new();

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }

                _ = ticker.tick() => {
                    let now = shared.clock.instant();
                    for (index, due) in next_due.iter_mut().enumerate() {
                        if !due.is_some_and(|at| now >= at) {
                            continue;
                        }
                        let slot = &shared.slots[index];
                        *due = now.checked_add(slot.interval);
                        if due.is_none() {
                            warn!("{}: next run is beyond the clock's range, not rescheduling", slot.task.record);
                        }

                        let shared = Arc::clone(shared);
                        in_flight.spawn(async move {
                            shared.reconcile_index(index).await;
                        });
                    }
                }

                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        error!("Reconciliation task aborted: {}", e);
                    }
                }
            }
        }

        shared.stopping.store(true, Ordering::SeqCst);

        if !in_flight.is_empty() {
            info!("Waiting for {} in-flight reconciliation(s)", in_flight.len());
        }
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!("Reconciliation task aborted: {}", e);
            }
        }

        info!("Reconcile loop stopped");
        Ok(())
    }

    /// Interval at which the driver wakes up
    pub fn tick(&self) -> Duration {
        self.tick
    }
}

impl Shared {
    fn slot(&self, record: &ManagedRecord) -> Option<&RecordSlot> {
        self.slots.iter().find(|s| &s.task.record == record)
    }

    fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    async fn reconcile_index(&self, index: usize) -> CycleOutcome {
        self.reconcile_slot(&self.slots[index]).await
    }

    async fn reconcile_slot(&self, slot: &RecordSlot) -> CycleOutcome {
        let record = &slot.task.record;
        let provider_name = slot.task.provider.provider_name();

        let Ok(mut state) = slot.state.try_lock() else {
            debug!("{}: previous cycle still in flight, skipping", record);
            return CycleOutcome::InFlight;
        };

        if self.is_stopping() {
            return CycleOutcome::Cancelled;
        }

        // 1. Detect
        let detection = match self.detect(&slot.task).await {
            Ok(detection) => detection,
            Err(e) => return self.fail(&mut state, record, Stage::Detection, e),
        };

        // 2. Resolve
        let published = match &slot.task.resolver {
            Some(resolver) => {
                match self.bounded(resolver.current(record)).await {
                    Ok(published) => published,
                    Err(e) => {
                        let e = classify(Stage::Resolution, e, provider_name);
                        return self.fail(&mut state, record, Stage::Resolution, e);
                    }
                }
            }
            None => state.last_known_ip,
        };

        // 3. Compare
        if published == Some(detection.ip) {
            debug!("{} already points at {}, nothing to do", record, detection.ip);
            return CycleOutcome::Unchanged;
        }

        if self.is_stopping() {
            return CycleOutcome::Cancelled;
        }

        // 4. Apply
        match published {
            Some(old) => info!("{} changed: {} -> {}", record, old, detection.ip),
            None => info!("{} not published yet, applying {}", record, detection.ip),
        }

        match self
            .bounded(slot.task.provider.apply(record, detection.ip))
            .await
        {
            Ok(outcome) => self.succeed(&mut state, record, detection.ip, published, outcome),
            Err(e) => {
                let e = classify(Stage::Apply, e, provider_name);
                self.fail(&mut state, record, Stage::Apply, e)
            }
        }
    }

    async fn detect(&self, task: &RecordTask) -> Result<DetectionResult> {
        let family = task.record.family;
        let ip = self
            .bounded(task.detector.detect(family))
            .await
            .map_err(|e| classify(Stage::Detection, e, task.provider.provider_name()))?;

        if !family.matches(&ip) {
            return Err(Error::detection(format!(
                "{} detector returned {} for {}",
                task.detector.method(),
                ip,
                family
            )));
        }

        let detection = DetectionResult {
            family,
            ip,
            detected_at: self.clock.now(),
            source_method: task.detector.method(),
        };
        debug!(
            "{}: detected {} via {}",
            task.record, detection.ip, detection.source_method
        );
        Ok(detection)
    }

    /// Await `fut` with the per-call timeout
    async fn bounded<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .unwrap_or_else(|_| Err(Error::Other(format!("timed out after {:?}", self.timeout))))
    }

    fn succeed(
        &self,
        state: &mut RecordState,
        record: &ManagedRecord,
        ip: IpAddr,
        published: Option<IpAddr>,
        outcome: ApplyOutcome,
    ) -> CycleOutcome {
        let budget = state.budget.record_success();
        if outcome != ApplyOutcome::Skipped {
            state.last_known_ip = Some(ip);
            state.last_update_at = Some(self.clock.now());
        }

        match &outcome {
            ApplyOutcome::Created => {
                info!("{} created -> {}", record, ip);
                self.emit(record, NotificationKind::Created { ip }, "record created");
            }
            ApplyOutcome::Updated { previous_ip } => {
                let previous_ip = previous_ip.or(published);
                info!("{} updated -> {} (previous: {:?})", record, ip, previous_ip);
                self.emit(
                    record,
                    NotificationKind::Updated { previous_ip, ip },
                    "record updated",
                );
            }
            ApplyOutcome::Unchanged => {
                debug!("{} provider reports {} already published", record, ip);
            }
            ApplyOutcome::Skipped => {
                info!("{} would be set to {} (dry run, nothing sent)", record, ip);
            }
        }

        if budget == SuccessOutcome::Reset {
            info!("{} recovered, failure budget reset", record);
            self.emit(
                record,
                NotificationKind::BudgetReset,
                "success after repeated failures",
            );
        }

        CycleOutcome::Applied(outcome)
    }

    fn fail(
        &self,
        state: &mut RecordState,
        record: &ManagedRecord,
        stage: Stage,
        error: Error,
    ) -> CycleOutcome {
        let outcome = state.budget.record_failure();
        let consecutive_failures = state.budget.consecutive_failures();
        let detail = error.to_string();

        warn!(
            "{} {} failed ({} consecutive): {}",
            record, stage, consecutive_failures, detail
        );

        match outcome {
            FailureOutcome::Failure => {
                self.emit(
                    record,
                    NotificationKind::Failed {
                        stage,
                        consecutive_failures,
                    },
                    detail,
                );
            }
            FailureOutcome::Tripped => {
                error!(
                    "{} has failed {} times in a row, escalating",
                    record, consecutive_failures
                );
                self.emit(
                    record,
                    NotificationKind::BudgetTripped {
                        consecutive_failures,
                    },
                    detail.clone(),
                );
                self.emit(
                    record,
                    NotificationKind::RepeatedFailure {
                        stage,
                        consecutive_failures,
                    },
                    detail,
                );
            }
            FailureOutcome::Repeated => {
                self.emit(
                    record,
                    NotificationKind::RepeatedFailure {
                        stage,
                        consecutive_failures,
                    },
                    detail,
                );
            }
        }

        CycleOutcome::Failed(stage)
    }

    fn emit(&self, record: &ManagedRecord, kind: NotificationKind, detail: impl Into<String>) {
        let notification = Notification {
            record: record.clone(),
            kind,
            at: self.clock.now(),
            detail: detail.into(),
        };

        match self.event_tx.try_send(notification) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Notification channel full, dropping notification. Consider increasing event_channel_capacity.");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Notification receiver dropped");
            }
        }
    }
}

/// File `error` under the taxonomy variant for `stage`
fn classify(stage: Stage, error: Error, provider: &str) -> Error {
    match (stage, error) {
        (Stage::Detection, e @ Error::DetectionFailed(_)) => e,
        (Stage::Resolution, e @ Error::ResolutionFailed(_)) => e,
        (Stage::Apply, e @ Error::ApplyFailed { .. }) => e,
        (Stage::Detection, e) => Error::detection(e.to_string()),
        (Stage::Resolution, e) => Error::resolution(e.to_string()),
        (Stage::Apply, e) => Error::apply(provider, e.to_string()),
    }
}

/// Greatest common divisor of the record intervals, so every record is due
/// exactly on a tick
fn driver_tick(intervals: impl Iterator<Item = Duration>) -> Duration {
    fn gcd(a: u128, b: u128) -> u128 {
        if b == 0 { a } else { gcd(b, a % b) }
    }

    let millis = intervals
        .map(|d| d.as_millis())
        .fold(0u128, gcd)
        .max(1);
    Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
}
