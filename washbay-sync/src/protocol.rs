use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch, Notify};

use crate::snapshot::{changed_dates, CapacitySnapshot};

/// A poll that could not reach the backend. Always retried internally with
/// backoff; never surfaced as a hard error on first occurrence.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("transient sync failure: {0}")]
    Transient(String),
}

/// Where the authoritative snapshots come from: the server's capacity
/// snapshot endpoint, behind whatever transport the embedding client brings.
/// Tests script it.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self, from: NaiveDate) -> Result<CapacitySnapshot, SyncError>;
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub fast_interval: Duration,
    pub normal_interval: Duration,
    pub slow_interval: Duration,
    /// Interaction younger than this selects the fast tier.
    pub fast_threshold: Duration,
    /// Interaction younger than this (but older than `fast_threshold`)
    /// selects the normal tier; anything older is slow.
    pub normal_threshold: Duration,
    /// Fixed delay between retries while polls are failing.
    pub retry_backoff: Duration,
    /// Consecutive failures before the connection is reported offline.
    pub offline_after: u32,
    /// Delay before the second self-observation poll after this client's own
    /// reservation, to absorb propagation lag in an eventually-consistent
    /// backend.
    pub echo_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            fast_interval: Duration::from_secs(10),
            normal_interval: Duration::from_secs(30),
            slow_interval: Duration::from_secs(120),
            fast_threshold: Duration::from_secs(30),
            normal_threshold: Duration::from_secs(300),
            retry_backoff: Duration::from_secs(15),
            offline_after: 3,
            echo_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollTier {
    Fast,
    Normal,
    Slow,
}

impl PollTier {
    /// Tier for a given idle duration since the last user interaction.
    pub fn for_idle(idle: Duration, config: &SyncConfig) -> Self {
        if idle < config.fast_threshold {
            PollTier::Fast
        } else if idle < config.normal_threshold {
            PollTier::Normal
        } else {
            PollTier::Slow
        }
    }

    fn interval(self, config: &SyncConfig) -> Duration {
        match self {
            PollTier::Fast => config.fast_interval,
            PollTier::Normal => config.normal_interval,
            PollTier::Slow => config.slow_interval,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Live,
    Degraded,
    Offline,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// Remote content differed; the mirror was replaced and these dates
    /// changed value (UI should refresh exactly these).
    Changed(BTreeSet<NaiveDate>),
    /// Hash matched; nothing to do.
    Unchanged,
    /// Poll failed; `state` is the connection state after counting it.
    Failed(ConnectionState),
}

struct Shared {
    wake: Notify,
    last_interaction: Mutex<Instant>,
    echo_due: Mutex<Option<Instant>>,
    connection_tx: watch::Sender<ConnectionState>,
    updates: broadcast::Sender<SyncOutcome>,
}

/// Clonable handle the page controller keeps for its event hooks: focus,
/// visibility and online transitions force an immediate re-poll; user
/// interaction feeds tier selection; a successful local reservation schedules
/// the immediate-plus-echo self-observation pair.
#[derive(Clone)]
pub struct SyncHandle {
    shared: Arc<Shared>,
    echo_delay: Duration,
}

impl SyncHandle {
    /// Focus / visibility / offline-to-online: poll now.
    pub fn trigger_repoll(&self) {
        self.shared.wake.notify_one();
    }

    pub fn note_user_interaction(&self) {
        if let Ok(mut at) = self.shared.last_interaction.lock() {
            *at = Instant::now();
        }
    }

    /// This client's own reservation succeeded: poll immediately to
    /// self-observe, then once more after the propagation delay.
    pub fn after_reservation(&self) {
        if let Ok(mut due) = self.shared.echo_due.lock() {
            *due = Some(Instant::now() + self.echo_delay);
        }
        self.shared.wake.notify_one();
    }

    /// Connection state as of the latest poll, including polls made by a
    /// spawned `run` loop.
    pub fn connection_state(&self) -> ConnectionState {
        *self.shared.connection_tx.borrow()
    }

    /// Watch the connection state across polls; `changed()` resolves on every
    /// Live/Degraded/Offline transition.
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.shared.connection_tx.subscribe()
    }

    /// Subscribe to the outcome of every poll. The changed-date sets carried
    /// by `SyncOutcome::Changed` drive targeted UI refresh.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncOutcome> {
        self.shared.updates.subscribe()
    }
}

/// Client-held synchronization protocol: polls an authoritative snapshot,
/// diffs it by content hash, and reconciles the local capacity mirror.
/// One instance per session, owned by the page controller and torn down with
/// it; instances never coordinate with each other.
pub struct SyncProtocol<S: SnapshotSource> {
    source: S,
    config: SyncConfig,
    mirror: BTreeMap<NaiveDate, i32>,
    last_known_hash: Option<String>,
    last_sync_at: Option<DateTime<Utc>>,
    consecutive_failures: u32,
    connection: ConnectionState,
    shared: Arc<Shared>,
}

impl<S: SnapshotSource> SyncProtocol<S> {
    pub fn new(source: S, config: SyncConfig) -> Self {
        let (connection_tx, _) = watch::channel(ConnectionState::Live);
        let (updates, _) = broadcast::channel(32);
        let shared = Arc::new(Shared {
            wake: Notify::new(),
            last_interaction: Mutex::new(Instant::now()),
            echo_due: Mutex::new(None),
            connection_tx,
            updates,
        });
        Self {
            source,
            config,
            mirror: BTreeMap::new(),
            last_known_hash: None,
            last_sync_at: None,
            consecutive_failures: 0,
            connection: ConnectionState::Live,
            shared,
        }
    }

    pub fn handle(&self) -> SyncHandle {
        SyncHandle {
            shared: self.shared.clone(),
            echo_delay: self.config.echo_delay,
        }
    }

    pub fn mirror(&self) -> &BTreeMap<NaiveDate, i32> {
        &self.mirror
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    pub fn last_sync_at(&self) -> Option<DateTime<Utc>> {
        self.last_sync_at
    }

    pub fn tier(&self) -> PollTier {
        let idle = self
            .shared
            .last_interaction
            .lock()
            .map(|at| at.elapsed())
            .unwrap_or(Duration::ZERO);
        PollTier::for_idle(idle, &self.config)
    }

    /// One poll cycle. Never returns an error to the caller: failures are
    /// folded into the connection state and retried by `run`. Every outcome
    /// is also published to handle subscribers, so a spawned `run` loop stays
    /// observable.
    pub async fn poll_once(&mut self, from: NaiveDate) -> SyncOutcome {
        let outcome = match self.source.fetch(from).await {
            Ok(snapshot) => {
                self.consecutive_failures = 0;
                self.connection = ConnectionState::Live;
                self.last_sync_at = Some(snapshot.as_of);

                if self.last_known_hash.as_deref() == Some(snapshot.content_hash.as_str()) {
                    SyncOutcome::Unchanged
                } else {
                    let changed = changed_dates(&self.mirror, &snapshot.dates);
                    self.mirror = snapshot.dates;
                    self.last_known_hash = Some(snapshot.content_hash);
                    SyncOutcome::Changed(changed)
                }
            }
            Err(SyncError::Transient(reason)) => {
                self.consecutive_failures += 1;
                self.connection = if self.consecutive_failures >= self.config.offline_after {
                    ConnectionState::Offline
                } else {
                    ConnectionState::Degraded
                };
                tracing::debug!(
                    failures = self.consecutive_failures,
                    state = ?self.connection,
                    "capacity poll failed: {}",
                    reason
                );
                SyncOutcome::Failed(self.connection)
            }
        };

        self.shared.connection_tx.send_if_modified(|state| {
            let changed = *state != self.connection;
            *state = self.connection;
            changed
        });
        let _ = self.shared.updates.send(outcome.clone());
        outcome
    }

    /// Delay until the next scheduled poll: fixed backoff while failing,
    /// otherwise the active tier's interval, shortened if an echo poll is
    /// due sooner. Tier switches take effect here, so there is only ever one
    /// pending deadline.
    fn next_delay(&self) -> Duration {
        let base = if self.consecutive_failures > 0 {
            self.config.retry_backoff
        } else {
            self.tier().interval(&self.config)
        };
        let echo = self
            .shared
            .echo_due
            .lock()
            .ok()
            .and_then(|due| *due)
            .map(|at| at.saturating_duration_since(Instant::now()));
        match echo {
            Some(until_echo) => base.min(until_echo),
            None => base,
        }
    }

    fn take_due_echo(&self) {
        if let Ok(mut due) = self.shared.echo_due.lock() {
            if due.is_some_and(|at| at <= Instant::now()) {
                *due = None;
            }
        }
    }

    /// Cooperative poll loop. Wakes on the schedule, on forced re-poll
    /// triggers, or on shutdown; the caller is never blocked by a poll.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            let delay = self.next_delay();
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shared.wake.notified() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }
            self.take_due_echo();
            let from = Utc::now().date_naive();
            self.poll_once(from).await;
        }
        tracing::debug!("sync protocol stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Scripted source: pops one pre-planned response per fetch.
    struct ScriptedSource {
        responses: Mutex<VecDeque<Result<CapacitySnapshot, SyncError>>>,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<CapacitySnapshot, SyncError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
            }
        }
    }

    #[async_trait]
    impl SnapshotSource for ScriptedSource {
        async fn fetch(&self, _from: NaiveDate) -> Result<CapacitySnapshot, SyncError> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(SyncError::Transient("script exhausted".to_string())))
        }
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, day).unwrap()
    }

    fn snapshot(pairs: &[(u32, i32)]) -> CapacitySnapshot {
        let dates: BTreeMap<_, _> = pairs.iter().map(|(d, a)| (date(*d), *a)).collect();
        CapacitySnapshot::new(dates, Utc::now())
    }

    fn from_date() -> NaiveDate {
        date(1)
    }

    #[tokio::test]
    async fn test_first_poll_populates_mirror() {
        let source = ScriptedSource::new(vec![Ok(snapshot(&[(16, 8), (23, 8)]))]);
        let mut protocol = SyncProtocol::new(source, SyncConfig::default());

        let outcome = protocol.poll_once(from_date()).await;
        let expected: BTreeSet<_> = [date(16), date(23)].into_iter().collect();
        assert_eq!(outcome, SyncOutcome::Changed(expected));
        assert_eq!(protocol.mirror().get(&date(16)), Some(&8));
    }

    #[tokio::test]
    async fn test_unchanged_hash_is_a_noop() {
        let source = ScriptedSource::new(vec![
            Ok(snapshot(&[(16, 8)])),
            Ok(snapshot(&[(16, 8)])),
        ]);
        let mut protocol = SyncProtocol::new(source, SyncConfig::default());

        protocol.poll_once(from_date()).await;
        let hash_before = protocol.last_known_hash.clone();

        assert_eq!(protocol.poll_once(from_date()).await, SyncOutcome::Unchanged);
        assert_eq!(protocol.last_known_hash, hash_before);
    }

    #[tokio::test]
    async fn test_change_reports_exact_diff_set() {
        let source = ScriptedSource::new(vec![
            Ok(snapshot(&[(16, 8), (23, 8)])),
            Ok(snapshot(&[(16, 7), (23, 8)])),
        ]);
        let mut protocol = SyncProtocol::new(source, SyncConfig::default());

        protocol.poll_once(from_date()).await;
        let outcome = protocol.poll_once(from_date()).await;

        let expected: BTreeSet<_> = [date(16)].into_iter().collect();
        assert_eq!(outcome, SyncOutcome::Changed(expected));
        assert_eq!(protocol.mirror().get(&date(16)), Some(&7));
    }

    #[tokio::test]
    async fn test_failures_escalate_to_offline_then_recover() {
        let fail = || Err(SyncError::Transient("connection refused".to_string()));
        let source = ScriptedSource::new(vec![fail(), fail(), fail(), Ok(snapshot(&[(16, 8)]))]);
        let mut protocol = SyncProtocol::new(source, SyncConfig::default());

        assert_eq!(
            protocol.poll_once(from_date()).await,
            SyncOutcome::Failed(ConnectionState::Degraded)
        );
        assert_eq!(
            protocol.poll_once(from_date()).await,
            SyncOutcome::Failed(ConnectionState::Degraded)
        );
        assert_eq!(
            protocol.poll_once(from_date()).await,
            SyncOutcome::Failed(ConnectionState::Offline)
        );

        // Background retry keeps going and recovers on the next good poll.
        assert!(matches!(
            protocol.poll_once(from_date()).await,
            SyncOutcome::Changed(_)
        ));
        assert_eq!(protocol.connection_state(), ConnectionState::Live);
    }

    #[test]
    fn test_tier_selection_by_idle_time() {
        let config = SyncConfig::default();
        assert_eq!(
            PollTier::for_idle(Duration::from_secs(5), &config),
            PollTier::Fast
        );
        assert_eq!(
            PollTier::for_idle(Duration::from_secs(60), &config),
            PollTier::Normal
        );
        assert_eq!(
            PollTier::for_idle(Duration::from_secs(600), &config),
            PollTier::Slow
        );
    }

    #[tokio::test]
    async fn test_interaction_moves_tier_to_fast() {
        let config = SyncConfig {
            fast_threshold: Duration::from_millis(50),
            normal_threshold: Duration::from_millis(100),
            ..SyncConfig::default()
        };
        let source = ScriptedSource::new(vec![]);
        let protocol = SyncProtocol::new(source, config);
        let handle = protocol.handle();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(protocol.tier(), PollTier::Normal);

        handle.note_user_interaction();
        assert_eq!(protocol.tier(), PollTier::Fast);
    }

    #[tokio::test]
    async fn test_failed_polls_use_retry_backoff_delay() {
        let config = SyncConfig {
            retry_backoff: Duration::from_secs(7),
            ..SyncConfig::default()
        };
        let source = ScriptedSource::new(vec![Err(SyncError::Transient("down".to_string()))]);
        let mut protocol = SyncProtocol::new(source, config);

        protocol.poll_once(from_date()).await;
        assert_eq!(protocol.next_delay(), Duration::from_secs(7));
    }

    #[tokio::test]
    async fn test_after_reservation_schedules_echo_sooner_than_tier() {
        let source = ScriptedSource::new(vec![]);
        let protocol = SyncProtocol::new(source, SyncConfig::default());
        let handle = protocol.handle();

        handle.after_reservation();
        // Echo is due in ~2s, well under the 10s fast-tier interval.
        assert!(protocol.next_delay() <= Duration::from_secs(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_offline_transition_is_observable_through_running_loop() {
        let fail = || Err(SyncError::Transient("connection refused".to_string()));
        let source = ScriptedSource::new(vec![fail(), fail(), fail()]);
        // Short backoff so the loop escalates on its own schedule.
        let config = SyncConfig {
            retry_backoff: Duration::from_millis(10),
            ..SyncConfig::default()
        };
        let protocol = SyncProtocol::new(source, config);
        let handle = protocol.handle();
        let mut connection = handle.watch_connection();
        let mut updates = handle.subscribe();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(protocol.run(shutdown_rx));
        handle.trigger_repoll();

        tokio::time::timeout(Duration::from_secs(2), async {
            while *connection.borrow_and_update() != ConnectionState::Offline {
                connection.changed().await.unwrap();
            }
        })
        .await
        .expect("loop should reach Offline after repeated failures");
        assert_eq!(handle.connection_state(), ConnectionState::Offline);

        // Subscribers saw the poll outcomes, ending in the offline failure.
        let mut last = None;
        loop {
            match updates.try_recv() {
                Ok(outcome) => last = Some(outcome),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        assert_eq!(last, Some(SyncOutcome::Failed(ConnectionState::Offline)));

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("run loop should stop on shutdown")
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_polls_on_forced_trigger_and_stops_on_shutdown() {
        let source = ScriptedSource::new(vec![
            Ok(snapshot(&[(16, 8)])),
            Ok(snapshot(&[(16, 7)])),
        ]);
        // Long intervals: only forced triggers can cause polls in this test.
        let config = SyncConfig {
            fast_interval: Duration::from_secs(3600),
            normal_interval: Duration::from_secs(3600),
            slow_interval: Duration::from_secs(3600),
            retry_backoff: Duration::from_secs(3600),
            ..SyncConfig::default()
        };
        let protocol = SyncProtocol::new(source, config);
        let handle = protocol.handle();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(protocol.run(shutdown_rx));

        handle.trigger_repoll();
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.trigger_repoll();
        tokio::time::sleep(Duration::from_millis(100)).await;

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("run loop should stop on shutdown")
            .unwrap();
    }
}
