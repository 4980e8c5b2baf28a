//! Test doubles and common utilities for reconcile contract tests
//!
//! The doubles count their calls so tests can assert on what the loop did,
//! not only on what it returned.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use dnsync_core::error::{Error, Result};
use dnsync_core::traits::ProviderResolver;
use dnsync_core::{
    AddressFamily, ApplyOutcome, Clock, DnsProvider, EngineConfig, IpDetector, ManagedRecord,
    Notification, NotificationKind, RecordResolver, RecordTask,
};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// A detector whose answer the test controls
pub struct ScriptedDetector {
    /// `None` makes every call fail
    answer: Mutex<Option<IpAddr>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedDetector {
    pub fn new(ip: IpAddr) -> Arc<Self> {
        Arc::new(Self {
            answer: Mutex::new(Some(ip)),
            calls: AtomicUsize::new(0),
            delay: None,
        })
    }

    /// Answers `ip` after sleeping for `delay`
    pub fn slow(ip: IpAddr, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            answer: Mutex::new(Some(ip)),
            calls: AtomicUsize::new(0),
            delay: Some(delay),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            answer: Mutex::new(None),
            calls: AtomicUsize::new(0),
            delay: None,
        })
    }

    pub fn set_ip(&self, ip: IpAddr) {
        *self.answer.lock().unwrap() = Some(ip);
    }

    pub fn set_failing(&self) {
        *self.answer.lock().unwrap() = None;
    }

    /// Get the number of times detect() was called
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IpDetector for ScriptedDetector {
    async fn detect(&self, _family: AddressFamily) -> Result<IpAddr> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.answer
            .lock()
            .unwrap()
            .ok_or_else(|| Error::detection("echo service unreachable"))
    }

    fn method(&self) -> &'static str {
        "scripted"
    }
}

/// A provider backed by an in-memory zone
pub struct MockProvider {
    zone: Mutex<HashMap<ManagedRecord, IpAddr>>,
    apply_calls: AtomicUsize,
    lookup_calls: AtomicUsize,
    failing: AtomicBool,
    delay: Option<Duration>,
    dry_run: bool,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            zone: Mutex::new(HashMap::new()),
            apply_calls: AtomicUsize::new(0),
            lookup_calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            delay: None,
            dry_run: false,
        }
    }

    /// Apply reports `Skipped` and leaves the zone alone
    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// Every apply sleeps for `delay` before touching the zone
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Seed the zone with a published record
    pub fn with_published(self, record: &ManagedRecord, ip: IpAddr) -> Self {
        self.zone.lock().unwrap().insert(record.clone(), ip);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn published(&self, record: &ManagedRecord) -> Option<IpAddr> {
        self.zone.lock().unwrap().get(record).copied()
    }

    /// Get the number of times apply() was called
    pub fn apply_count(&self) -> usize {
        self.apply_calls.load(Ordering::SeqCst)
    }

    /// Get the number of times lookup() was called
    pub fn lookup_count(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DnsProvider for MockProvider {
    async fn apply(&self, record: &ManagedRecord, ip: IpAddr) -> Result<ApplyOutcome> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::auth("Invalid API token"));
        }
        if self.dry_run {
            return Ok(ApplyOutcome::Skipped);
        }

        let previous = self.zone.lock().unwrap().insert(record.clone(), ip);
        Ok(match previous {
            None => ApplyOutcome::Created,
            Some(old) if old == ip => ApplyOutcome::Unchanged,
            Some(old) => ApplyOutcome::Updated {
                previous_ip: Some(old),
            },
        })
    }

    async fn lookup(&self, record: &ManagedRecord) -> Result<Option<IpAddr>> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.published(record))
    }

    fn supports_lookup(&self) -> bool {
        true
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// A resolver that can never reach its source
pub struct FailingResolver {
    calls: AtomicUsize,
}

impl FailingResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordResolver for FailingResolver {
    async fn current(&self, _record: &ManagedRecord) -> Result<Option<IpAddr>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::http("connection refused"))
    }

    fn resolver_name(&self) -> &'static str {
        "failing"
    }
}

/// A wall clock the test moves by hand
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2026, 10, 15, 8, 0, 0).unwrap()),
        })
    }

    pub fn advance(&self, by: chrono::Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    fn instant(&self) -> tokio::time::Instant {
        tokio::time::Instant::now()
    }
}

pub fn v4(s: &str) -> IpAddr {
    s.parse().unwrap()
}

pub fn home_record() -> ManagedRecord {
    ManagedRecord::new("example.com", "home", AddressFamily::Ipv4, "mock")
}

pub fn office_record() -> ManagedRecord {
    ManagedRecord::new("example.com", "office", AddressFamily::Ipv4, "mock")
}

/// Engine settings used by the contract tests
pub fn engine_config() -> EngineConfig {
    EngineConfig {
        interval_secs: 600,
        timeout_secs: 10,
        event_channel_capacity: 100,
    }
}

/// Task whose resolver reads the provider's own zone
pub fn provider_task(
    record: ManagedRecord,
    detector: Arc<ScriptedDetector>,
    provider: Arc<MockProvider>,
) -> RecordTask {
    let provider: Arc<dyn DnsProvider> = provider;
    let resolver: Arc<dyn RecordResolver> =
        Arc::new(ProviderResolver::new(Arc::clone(&provider)).unwrap());
    RecordTask::new(record, detector, Some(resolver), provider)
}

/// Collect every notification emitted so far
pub fn drain(rx: &mut mpsc::Receiver<Notification>) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        out.push(notification);
    }
    out
}

/// Collect the kinds of every notification emitted so far
pub fn drain_kinds(rx: &mut mpsc::Receiver<Notification>) -> Vec<NotificationKind> {
    drain(rx).into_iter().map(|n| n.kind).collect()
}
