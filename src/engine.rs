//! Schedule execution: applies each schedule entry at most once, when the
//! current time falls inside the tolerance window around its timestamp.
//!
//! ```text
//! Loaded ──check──▶ Running ──[no future entries]──▶ Exhausted
//!                      │
//!                      └──[shutdown / duration cap]──▶ Stopped
//! ```
//!
//! An entry is a point-in-time instruction, not a retryable job: once it has
//! run it is consumed, whatever happened to its individual setpoints.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::client::AtmoWebClient;
use crate::schedule::ScheduleDocument;
use crate::store::{EntryId, ExecutionStore, MemoryStore};
use crate::types::{Event, ParameterKey};
use crate::{Error, Result};

pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(60);
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

type EventCallback = Box<dyn Fn(&Event) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Loaded,
    Running,
    Exhausted,
    Stopped,
}

/// Why [`ScheduleEngine::run_continuous`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Exhausted,
    DurationElapsed,
    Stopped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppliedSetpoint {
    pub key: ParameterKey,
    pub requested: f64,
    pub actual: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RejectedSetpoint {
    pub key: String,
    pub value: f64,
    pub error: String,
}

/// Per-setpoint outcomes of one entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyReport {
    pub succeeded: Vec<AppliedSetpoint>,
    /// Out of range, unknown key, network or malformed response.
    pub failed: Vec<RejectedSetpoint>,
    /// The device answered with a sentinel for the parameter.
    pub not_available: Vec<RejectedSetpoint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    pub id: EntryId,
    pub report: ApplyReport,
}

pub struct ScheduleEngineBuilder {
    client: AtmoWebClient,
    document: ScheduleDocument,
    tolerance: Duration,
    check_interval: Duration,
    max_duration: Option<Duration>,
    store: Box<dyn ExecutionStore>,
    event_callbacks: Vec<EventCallback>,
}

impl ScheduleEngineBuilder {
    pub fn new(client: AtmoWebClient, document: ScheduleDocument) -> Self {
        Self {
            client,
            document,
            tolerance: DEFAULT_TOLERANCE,
            check_interval: DEFAULT_CHECK_INTERVAL,
            max_duration: None,
            store: Box::new(MemoryStore),
            event_callbacks: Vec::new(),
        }
    }

    /// Symmetric window around an entry's timestamp in which it is due.
    pub fn tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn max_duration(mut self, duration: Duration) -> Self {
        self.max_duration = Some(duration);
        self
    }

    pub fn store(mut self, store: impl ExecutionStore + 'static) -> Self {
        self.store = Box::new(store);
        self
    }

    pub fn on_event(mut self, f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.event_callbacks.push(Box::new(f));
        self
    }

    pub fn build(mut self) -> Result<ScheduleEngine> {
        let tolerance = TimeDelta::from_std(self.tolerance)
            .map_err(|_| Error::InvalidSchedule("tolerance out of range".to_string()))?;
        let executed = self.store.load()?;
        if !executed.is_empty() {
            info!(count = executed.len(), "restored executed entries");
        }

        Ok(ScheduleEngine {
            client: self.client,
            document: self.document,
            tolerance,
            check_interval: self.check_interval,
            max_duration: self.max_duration,
            store: self.store,
            executed,
            state: EngineState::Loaded,
            event_callbacks: self.event_callbacks,
        })
    }
}

pub struct ScheduleEngine {
    client: AtmoWebClient,
    document: ScheduleDocument,
    tolerance: TimeDelta,
    check_interval: Duration,
    max_duration: Option<Duration>,
    store: Box<dyn ExecutionStore>,
    executed: HashSet<EntryId>,
    state: EngineState,
    event_callbacks: Vec<EventCallback>,
}

impl ScheduleEngine {
    pub fn builder(client: AtmoWebClient, document: ScheduleDocument) -> ScheduleEngineBuilder {
        ScheduleEngineBuilder::new(client, document)
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn document(&self) -> &ScheduleDocument {
        &self.document
    }

    pub fn client_mut(&mut self) -> &mut AtmoWebClient {
        &mut self.client
    }

    pub fn executed(&self) -> &HashSet<EntryId> {
        &self.executed
    }

    pub fn is_executed(&self, index: usize) -> bool {
        self.entry_id(index)
            .is_some_and(|id| self.executed.contains(&id))
    }

    /// Apply every due, not yet executed entry. Returns whether any ran.
    pub async fn check_and_execute(&mut self, now: DateTime<Utc>) -> bool {
        !self.execute_due(now).await.is_empty()
    }

    /// Like [`Self::check_and_execute`], returning the per-entry reports.
    pub async fn execute_due(&mut self, now: DateTime<Utc>) -> Vec<ExecutionReport> {
        if self.state == EngineState::Loaded {
            self.state = EngineState::Running;
        }

        let due: Vec<EntryId> = self
            .pending_ids()
            .filter(|id| {
                let delta = now - id.timestamp;
                -self.tolerance <= delta && delta <= self.tolerance
            })
            .collect();

        let mut reports = Vec::with_capacity(due.len());
        for id in due {
            info!(entry = id.index, scheduled = %id.timestamp, now = %now, "executing scheduled setpoints");
            let report = self.execute(id).await;
            reports.push(ExecutionReport { id, report });
        }
        reports
    }

    /// Earliest un-executed timestamp strictly after `now`.
    pub fn get_next_due(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.pending_ids()
            .map(|id| id.timestamp)
            .filter(|ts| *ts > now)
            .min()
    }

    /// Single check, for cron-style invocation.
    pub async fn run_once(&mut self, now: DateTime<Utc>) -> bool {
        let executed = self.check_and_execute(now).await;
        if !executed {
            match self.get_next_due(now) {
                Some(next) => info!(
                    next = %next,
                    in_secs = (next - now).num_seconds(),
                    "no setpoints due now"
                ),
                None => info!("no scheduled setpoints remaining"),
            }
        }
        executed
    }

    /// Apply one entry immediately, regardless of its timestamp.
    /// The entry counts as executed afterwards.
    pub async fn apply_entry(&mut self, index: usize) -> Result<ApplyReport> {
        let id = self.entry_id(index).ok_or_else(|| {
            Error::InvalidSchedule(format!(
                "entry {index} not found; schedule has {} entries",
                self.document.len()
            ))
        })?;
        if self.executed.contains(&id) {
            warn!(entry = index, "re-applying an entry that already ran");
        }
        Ok(self.execute(id).await)
    }

    /// Poll until the schedule is exhausted, the duration cap passes, or
    /// `shutdown` resolves.
    ///
    /// `shutdown` is only observed while sleeping between checks, so a query
    /// already sent always completes or times out first.
    pub async fn run_continuous(&mut self, shutdown: impl Future<Output = ()>) -> RunOutcome {
        let deadline = self.max_duration.map(|d| Instant::now() + d);
        info!(
            check_interval_secs = self.check_interval.as_secs_f64(),
            tolerance_secs = self.tolerance.num_seconds(),
            max_duration_secs = self.max_duration.map(|d| d.as_secs_f64()),
            "starting scheduler"
        );
        self.state = EngineState::Running;
        tokio::pin!(shutdown);

        loop {
            if let Some(deadline) = deadline
                && Instant::now() >= deadline
            {
                info!("scheduled duration completed");
                self.state = EngineState::Stopped;
                return RunOutcome::DurationElapsed;
            }

            let now = Utc::now();
            self.check_and_execute(now).await;

            match self.get_next_due(now) {
                Some(next) => debug!(
                    next = %next,
                    in_secs = (next - now).num_seconds(),
                    "next scheduled change"
                ),
                None => {
                    info!("no more scheduled setpoints");
                    self.state = EngineState::Exhausted;
                    self.emit(&Event::ScheduleExhausted);
                    return RunOutcome::Exhausted;
                }
            }

            let mut wake = Instant::now() + self.check_interval;
            if let Some(deadline) = deadline {
                wake = wake.min(deadline);
            }
            tokio::select! {
                _ = &mut shutdown => {
                    info!("scheduler stopped");
                    self.state = EngineState::Stopped;
                    return RunOutcome::Stopped;
                }
                _ = tokio::time::sleep_until(wake) => {}
            }
        }
    }

    fn entry_id(&self, index: usize) -> Option<EntryId> {
        self.document
            .get(index)
            .map(|e| EntryId::new(e.timestamp, index))
    }

    /// Ids of entries not yet executed, in schedule order.
    fn pending_ids(&self) -> impl Iterator<Item = EntryId> + '_ {
        self.document
            .entries()
            .iter()
            .enumerate()
            .map(|(index, e)| EntryId::new(e.timestamp, index))
            .filter(|id| !self.executed.contains(id))
    }

    async fn execute(&mut self, id: EntryId) -> ApplyReport {
        let setpoints = self
            .document
            .get(id.index)
            .map(|e| e.setpoints.clone())
            .unwrap_or_default();
        let report = self.apply_setpoints(id.index, &setpoints).await;

        // Consumed regardless of individual setpoint outcomes.
        self.executed.insert(id);
        if let Err(e) = self.store.record(&id) {
            warn!(entry = id.index, error = %e, "failed to persist executed entry");
        }

        info!(
            entry = id.index,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            not_available = report.not_available.len(),
            "execution summary"
        );
        self.emit(&Event::EntryExecuted {
            entry_index: id.index,
            timestamp: id.timestamp,
            succeeded: report.succeeded.len(),
            failed: report.failed.len(),
            not_available: report.not_available.len(),
        });
        report
    }

    async fn apply_setpoints(&mut self, entry_index: usize, setpoints: &[(String, f64)]) -> ApplyReport {
        let mut report = ApplyReport::default();

        for (name, value) in setpoints {
            let value = *value;
            let result = match name.parse::<ParameterKey>() {
                Ok(key) => self.client.set(key, value).await.map(|actual| (key, actual)),
                Err(e) => Err(e),
            };

            match result {
                Ok((key, actual)) => {
                    info!(key = %key, requested = value, actual, "setpoint applied");
                    self.emit(&Event::SetpointApplied {
                        entry_index,
                        key,
                        requested: value,
                        actual,
                    });
                    report.succeeded.push(AppliedSetpoint {
                        key,
                        requested: value,
                        actual,
                    });
                }
                Err(Error::UnsupportedParameter(key)) => {
                    warn!(key = %key, value, "parameter not available on device");
                    self.emit(&Event::SetpointUnavailable {
                        entry_index,
                        key,
                        value,
                    });
                    report.not_available.push(RejectedSetpoint {
                        key: name.clone(),
                        value,
                        error: Error::UnsupportedParameter(key).to_string(),
                    });
                }
                Err(e) => {
                    error!(key = %name, value, error = %e, "failed to set setpoint");
                    self.emit(&Event::SetpointFailed {
                        entry_index,
                        key: name.clone(),
                        value,
                        error: e.to_string(),
                    });
                    report.failed.push(RejectedSetpoint {
                        key: name.clone(),
                        value,
                        error: e.to_string(),
                    });
                }
            }
        }
        report
    }

    fn emit(&self, event: &Event) {
        for cb in &self.event_callbacks {
            cb(event);
        }
    }
}
