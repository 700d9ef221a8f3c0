//! Timer lifecycle manager
//!
//! Drives every entry through `start -> update* -> stop` against a
//! [`DocumentStore`], enforcing at most one running timer per user.

use chrono::{DateTime, SecondsFormat, Utc};
use clockistry_api::{RunningTimer, StartTimer, TimeEntry, TimerPatch};
use clockistry_config::{Settings, StartGuard};
use clockistry_store::{
    from_document, to_document, Document, DocumentStore, FieldFilter, StoreError, StoreResult,
};
use clockistry_util::{format_duration, Clock, EntryId, UserId};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{
    elapsed_seconds, seconds_between, store_failure, KeyedLocks, TimerError, TimerEvent,
    TimerFeed, TimerResult, TimerSubscription,
};

/// Collection holding all time entries
pub const TIME_ENTRIES: &str = "timeEntries";

const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns the timer lifecycle for every user of one store.
///
/// The store is the source of truth; nothing about running timers is cached
/// here, so several managers may share one store.
pub struct TimerLifecycleManager {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    start_guard: StartGuard,
    io_timeout: Duration,
    start_locks: KeyedLocks<UserId>,
    stop_locks: KeyedLocks<EntryId>,
    feed: TimerFeed,
}

impl TimerLifecycleManager {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            start_guard: StartGuard::default(),
            io_timeout: DEFAULT_IO_TIMEOUT,
            start_locks: KeyedLocks::new(),
            stop_locks: KeyedLocks::new(),
            feed: TimerFeed::default(),
        }
    }

    /// Build a manager configured from service settings
    pub fn from_settings(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        settings: &Settings,
    ) -> Self {
        Self::new(store, clock)
            .with_start_guard(settings.timer.start_guard)
            .with_io_timeout(settings.store.io_timeout)
    }

    pub fn with_start_guard(mut self, start_guard: StartGuard) -> Self {
        self.start_guard = start_guard;
        self
    }

    pub fn with_io_timeout(mut self, io_timeout: Duration) -> Self {
        self.io_timeout = io_timeout;
        self
    }

    pub fn start_guard(&self) -> StartGuard {
        self.start_guard
    }

    /// Subscribe to timer changes, optionally for a single user
    pub fn subscribe(&self, user_id: Option<UserId>) -> TimerSubscription {
        self.feed.subscribe(user_id)
    }

    pub fn store_healthy(&self) -> bool {
        self.store.is_healthy()
    }

    /// Create a new running entry for `user_id`.
    ///
    /// Fails with [`TimerError::TimerAlreadyRunning`] if the user already has
    /// a running entry; nothing is written in that case.
    pub async fn start_timer(&self, user_id: &UserId, fields: StartTimer) -> TimerResult<TimeEntry> {
        let entry = match self.start_guard {
            StartGuard::Conditional => self.start_conditional(user_id, fields).await?,
            StartGuard::PerUserLock => {
                let _held = self.start_locks.lock(user_id).await;
                self.start_checked(user_id, fields).await?
            }
            StartGuard::Unguarded => self.start_checked(user_id, fields).await?,
        };

        info!(
            entry_id = %entry.id,
            user_id = %entry.user_id,
            start_time = %entry.start_time,
            "Timer started"
        );
        self.feed.publish(TimerEvent::Started(entry.clone()));

        Ok(entry)
    }

    /// Check-then-create as one atomic store call
    async fn start_conditional(&self, user_id: &UserId, fields: StartTimer) -> TimerResult<TimeEntry> {
        let entry = self.new_entry(user_id, fields);
        let doc = encode_entry(&entry)?;

        let created = self
            .io(
                "create_exclusive",
                self.store
                    .create_exclusive(TIME_ENTRIES, entry.id.as_str(), doc, &running_filter(user_id)),
            )
            .await
            .map_err(store_failure)?;

        if !created {
            // Best effort: name the entry that blocked the start
            let running = self.get_running_timer(user_id).await.ok().flatten();
            return Err(self.already_running(user_id, running.map(|e| e.id)));
        }

        Ok(entry)
    }

    /// Query for a running entry, then create one if none exists
    async fn start_checked(&self, user_id: &UserId, fields: StartTimer) -> TimerResult<TimeEntry> {
        if let Some(running) = self.get_running_timer(user_id).await? {
            return Err(self.already_running(user_id, Some(running.id)));
        }

        let entry = self.new_entry(user_id, fields);
        let doc = encode_entry(&entry)?;
        self.io("set", self.store.set(TIME_ENTRIES, entry.id.as_str(), doc))
            .await
            .map_err(store_failure)?;

        Ok(entry)
    }

    fn new_entry(&self, user_id: &UserId, fields: StartTimer) -> TimeEntry {
        TimeEntry::started(
            self.store.generate_id(),
            user_id.clone(),
            fields,
            self.clock.now(),
        )
    }

    fn already_running(&self, user_id: &UserId, entry_id: Option<EntryId>) -> TimerError {
        warn!(
            user_id = %user_id,
            running_entry = ?entry_id.as_ref().map(EntryId::as_str),
            "Start rejected, timer already running"
        );
        TimerError::TimerAlreadyRunning {
            user_id: user_id.clone(),
            entry_id,
        }
    }

    /// Apply editable field changes to an entry.
    ///
    /// An empty patch is a no-op and touches neither the store nor
    /// `updatedAt`. Stopped entries may still be edited.
    pub async fn update_timer(&self, entry_id: &EntryId, patch: TimerPatch) -> TimerResult<()> {
        if patch.is_empty() {
            debug!(entry_id = %entry_id, "Empty patch, nothing to update");
            return Ok(());
        }

        let entry = self.get_entry(entry_id).await?;

        let mut fields = to_document(&patch).map_err(|e| TimerError::InvalidState(e.to_string()))?;
        if fields
            .get("tags")
            .and_then(Value::as_array)
            .is_some_and(|tags| tags.is_empty())
        {
            fields.remove("tags");
        }
        fields.insert("updatedAt".into(), timestamp(self.clock.now()));

        self.write_fields(entry_id, fields).await?;

        debug!(entry_id = %entry_id, user_id = %entry.user_id, "Timer updated");
        self.feed.publish(TimerEvent::Updated {
            entry_id: entry_id.clone(),
            user_id: entry.user_id,
        });

        Ok(())
    }

    /// Stop a running entry and fix its duration.
    ///
    /// Stopping an already stopped entry succeeds without writing anything.
    pub async fn stop_timer(&self, entry_id: &EntryId) -> TimerResult<()> {
        self.stop_entry(entry_id).await.map(|_| ())
    }

    /// Stop whichever entry is running for `user_id`.
    ///
    /// Returns the stopped entry, or `None` if nothing was running.
    pub async fn stop_running_timer(&self, user_id: &UserId) -> TimerResult<Option<TimeEntry>> {
        match self.get_running_timer(user_id).await? {
            Some(running) => self.stop_entry(&running.id).await.map(Some),
            None => {
                debug!(user_id = %user_id, "No running timer to stop");
                Ok(None)
            }
        }
    }

    async fn stop_entry(&self, entry_id: &EntryId) -> TimerResult<TimeEntry> {
        // Stops racing within this process queue here; the conditional write
        // below settles races with other processes sharing the store
        let _held = self.stop_locks.lock(entry_id).await;

        let mut entry = self.get_entry(entry_id).await?;
        if !entry.is_running {
            debug!(entry_id = %entry_id, "Timer already stopped");
            return Ok(entry);
        }

        let end_time = self.clock.now();
        let duration = seconds_between(entry.start_time, end_time);

        let mut fields = Document::new();
        fields.insert("endTime".into(), timestamp(end_time));
        fields.insert("duration".into(), Value::from(duration));
        fields.insert("isRunning".into(), Value::Bool(false));
        fields.insert("updatedAt".into(), timestamp(end_time));

        let still_running = [FieldFilter::equals("isRunning", true)];
        let written = match self
            .io(
                "update_if",
                self.store
                    .update_if(TIME_ENTRIES, entry_id.as_str(), fields, &still_running),
            )
            .await
        {
            Ok(written) => written,
            Err(StoreError::NotFound(_)) => return Err(TimerError::NotFound(entry_id.clone())),
            Err(e) => return Err(store_failure(e)),
        };

        if !written {
            debug!(entry_id = %entry_id, "Timer stopped elsewhere first");
            return self.get_entry(entry_id).await;
        }

        entry.end_time = Some(end_time);
        entry.duration = duration;
        entry.is_running = false;
        entry.updated_at = end_time;

        info!(
            entry_id = %entry.id,
            user_id = %entry.user_id,
            duration = %format_duration(Duration::from_secs(duration)),
            "Timer stopped"
        );
        self.feed.publish(TimerEvent::Stopped(entry.clone()));

        Ok(entry)
    }

    /// The user's running entry, if any.
    ///
    /// Reads the store on every call. If a race left several running entries,
    /// the earliest created is returned.
    pub async fn get_running_timer(&self, user_id: &UserId) -> TimerResult<Option<TimeEntry>> {
        let docs = self
            .io("query", self.store.query(TIME_ENTRIES, &running_filter(user_id)))
            .await
            .map_err(store_failure)?;

        docs.into_iter().next().map(decode_entry).transpose()
    }

    /// The user's running entry together with its elapsed time right now
    pub async fn running_view(&self, user_id: &UserId) -> TimerResult<Option<RunningTimer>> {
        let running = self.get_running_timer(user_id).await?;
        Ok(running.map(|entry| {
            let as_of = self.clock.now();
            RunningTimer {
                elapsed_seconds: elapsed_seconds(&entry, as_of),
                entry,
                as_of,
            }
        }))
    }

    /// Elapsed seconds for `entry` according to this manager's clock
    pub fn elapsed_seconds(&self, entry: &TimeEntry) -> u64 {
        elapsed_seconds(entry, self.clock.now())
    }

    pub async fn get_entry(&self, entry_id: &EntryId) -> TimerResult<TimeEntry> {
        let doc = self
            .io("get", self.store.get(TIME_ENTRIES, entry_id.as_str()))
            .await
            .map_err(store_failure)?
            .ok_or_else(|| TimerError::NotFound(entry_id.clone()))?;

        decode_entry(doc)
    }

    /// All of a user's entries, newest start first
    pub async fn list_entries(&self, user_id: &UserId) -> TimerResult<Vec<TimeEntry>> {
        let filter = [FieldFilter::equals("userId", user_id.as_str())];
        let docs = self
            .io("query", self.store.query(TIME_ENTRIES, &filter))
            .await
            .map_err(store_failure)?;

        let mut entries = docs
            .into_iter()
            .map(decode_entry)
            .collect::<TimerResult<Vec<_>>>()?;
        entries.sort_by(|a, b| b.start_time.cmp(&a.start_time));

        Ok(entries)
    }

    async fn write_fields(&self, entry_id: &EntryId, fields: Document) -> TimerResult<()> {
        match self
            .io("update", self.store.update(TIME_ENTRIES, entry_id.as_str(), fields))
            .await
        {
            Ok(()) => Ok(()),
            Err(StoreError::NotFound(_)) => Err(TimerError::NotFound(entry_id.clone())),
            Err(e) => Err(store_failure(e)),
        }
    }

    /// Run one store call under the I/O timeout
    async fn io<T>(
        &self,
        op: &'static str,
        call: impl Future<Output = StoreResult<T>>,
    ) -> StoreResult<T> {
        match tokio::time::timeout(self.io_timeout, call).await {
            Ok(result) => {
                if let Err(e) = &result {
                    debug!(op, error = %e, "Store call failed");
                }
                result
            }
            Err(_) => {
                warn!(
                    op,
                    timeout_ms = self.io_timeout.as_millis() as u64,
                    "Store call timed out"
                );
                Err(StoreError::Unavailable(format!(
                    "{} timed out after {:?}",
                    op, self.io_timeout
                )))
            }
        }
    }
}

fn running_filter(user_id: &UserId) -> [FieldFilter; 2] {
    [
        FieldFilter::equals("userId", user_id.as_str()),
        FieldFilter::equals("isRunning", true),
    ]
}

fn timestamp(at: DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

fn encode_entry(entry: &TimeEntry) -> TimerResult<Document> {
    to_document(entry).map_err(|e| TimerError::InvalidState(e.to_string()))
}

/// Decode a stored record, rejecting ones that break lifecycle invariants
fn decode_entry(doc: Document) -> TimerResult<TimeEntry> {
    let entry: TimeEntry = from_document(doc)
        .map_err(|e| TimerError::InvalidState(format!("unreadable time entry: {}", e)))?;

    if entry.is_running && entry.end_time.is_some() {
        return Err(TimerError::InvalidState(format!(
            "entry {} is running but has an end time",
            entry.id
        )));
    }
    if !entry.is_running && entry.end_time.is_none() {
        return Err(TimerError::InvalidState(format!(
            "entry {} is stopped but has no end time",
            entry.id
        )));
    }

    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use clockistry_store::{MemoryStore, SqliteStore};
    use clockistry_util::ManualClock;
    use serde_json::json;

    const T0: i64 = 1_700_000_000;

    struct Harness {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        manager: TimerLifecycleManager,
    }

    fn harness_with(store: MemoryStore, guard: StartGuard) -> Harness {
        let store = Arc::new(store);
        let clock = Arc::new(ManualClock::at_unix(T0));
        let manager = TimerLifecycleManager::new(store.clone(), clock.clone()).with_start_guard(guard);
        Harness {
            store,
            clock,
            manager,
        }
    }

    fn harness() -> Harness {
        harness_with(MemoryStore::new(), StartGuard::Conditional)
    }

    fn user(id: &str) -> UserId {
        UserId::new(id)
    }

    async fn running_count(h: &Harness, user_id: &UserId) -> usize {
        h.store
            .query(TIME_ENTRIES, &running_filter(user_id))
            .await
            .unwrap()
            .len()
    }

    #[tokio::test]
    async fn start_then_stop_records_duration() {
        let h = harness();
        let alice = user("alice");

        let started = h
            .manager
            .start_timer(&alice, StartTimer::with_description("Write report"))
            .await
            .unwrap();
        assert!(started.is_running);
        assert_eq!(started.duration, 0);
        assert!(started.end_time.is_none());
        assert_eq!(started.start_time.timestamp(), T0);

        h.clock.advance(ChronoDuration::seconds(90));
        h.manager.stop_timer(&started.id).await.unwrap();

        let stopped = h.manager.get_entry(&started.id).await.unwrap();
        assert!(!stopped.is_running);
        assert_eq!(stopped.duration, 90);
        assert_eq!(stopped.end_time.unwrap().timestamp(), T0 + 90);
        assert_eq!(stopped.description.as_deref(), Some("Write report"));
        assert!(h.manager.get_running_timer(&alice).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn second_start_is_rejected_without_writing() {
        let h = harness();
        let alice = user("alice");

        let first = h.manager.start_timer(&alice, StartTimer::default()).await.unwrap();
        let err = h
            .manager
            .start_timer(&alice, StartTimer::with_description("again"))
            .await
            .unwrap_err();

        match err {
            TimerError::TimerAlreadyRunning { user_id, entry_id } => {
                assert_eq!(user_id, alice);
                assert_eq!(entry_id, Some(first.id.clone()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(h.store.len(TIME_ENTRIES), 1);
    }

    #[tokio::test]
    async fn users_have_independent_slots() {
        let h = harness();
        h.manager.start_timer(&user("alice"), StartTimer::default()).await.unwrap();
        h.manager.start_timer(&user("bob"), StartTimer::default()).await.unwrap();

        assert_eq!(running_count(&h, &user("alice")).await, 1);
        assert_eq!(running_count(&h, &user("bob")).await, 1);
    }

    #[tokio::test]
    async fn start_after_stop_succeeds() {
        let h = harness();
        let alice = user("alice");

        let first = h.manager.start_timer(&alice, StartTimer::default()).await.unwrap();
        h.clock.advance(ChronoDuration::seconds(10));
        h.manager.stop_timer(&first.id).await.unwrap();

        h.clock.advance(ChronoDuration::seconds(5));
        let second = h.manager.start_timer(&alice, StartTimer::default()).await.unwrap();
        assert_ne!(first.id, second.id);

        let running = h.manager.get_running_timer(&alice).await.unwrap().unwrap();
        assert_eq!(running.id, second.id);
    }

    #[tokio::test]
    async fn update_changes_only_editable_fields() {
        let h = harness();
        let alice = user("alice");
        let entry = h.manager.start_timer(&alice, StartTimer::default()).await.unwrap();

        h.clock.advance(ChronoDuration::seconds(30));
        let patch = TimerPatch {
            description: Some("Standup".into()),
            project_id: Some("p-7".into()),
            is_billable: Some(true),
            ..Default::default()
        };
        h.manager.update_timer(&entry.id, patch).await.unwrap();

        let updated = h.manager.get_entry(&entry.id).await.unwrap();
        assert_eq!(updated.description.as_deref(), Some("Standup"));
        assert_eq!(updated.project_id.as_deref(), Some("p-7"));
        assert!(updated.is_billable);
        assert!(updated.is_running);
        assert_eq!(updated.start_time, entry.start_time);
        assert_eq!(updated.duration, 0);
        assert!(updated.end_time.is_none());
        assert_eq!(updated.updated_at.timestamp(), T0 + 30);
    }

    #[tokio::test]
    async fn empty_tags_do_not_clear_existing_tags() {
        let h = harness();
        let fields = StartTimer {
            tags: vec!["deep-work".into()],
            ..Default::default()
        };
        let entry = h.manager.start_timer(&user("alice"), fields).await.unwrap();

        let patch = TimerPatch {
            description: Some("still tagged".into()),
            tags: Some(vec![]),
            ..Default::default()
        };
        h.manager.update_timer(&entry.id, patch).await.unwrap();

        let updated = h.manager.get_entry(&entry.id).await.unwrap();
        assert_eq!(updated.tags, vec!["deep-work".to_string()]);
        assert_eq!(updated.description.as_deref(), Some("still tagged"));
    }

    #[tokio::test]
    async fn empty_patch_is_a_no_op() {
        let h = harness();
        let entry = h.manager.start_timer(&user("alice"), StartTimer::default()).await.unwrap();

        // Offline store proves no call is made
        h.store.set_online(false);
        h.clock.advance(ChronoDuration::seconds(5));
        h.manager
            .update_timer(&entry.id, TimerPatch::default())
            .await
            .unwrap();

        h.store.set_online(true);
        let unchanged = h.manager.get_entry(&entry.id).await.unwrap();
        assert_eq!(unchanged, entry);
    }

    #[tokio::test]
    async fn update_missing_entry_is_not_found() {
        let h = harness();
        let err = h
            .manager
            .update_timer(&EntryId::new("nope"), TimerPatch {
                description: Some("x".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TimerError::NotFound(id) if id.as_str() == "nope"));
    }

    #[tokio::test]
    async fn stopped_entries_stay_editable() {
        let h = harness();
        let entry = h.manager.start_timer(&user("alice"), StartTimer::default()).await.unwrap();
        h.clock.advance(ChronoDuration::seconds(42));
        h.manager.stop_timer(&entry.id).await.unwrap();

        h.clock.advance(ChronoDuration::seconds(600));
        h.manager
            .update_timer(&entry.id, TimerPatch {
                description: Some("after the fact".into()),
                is_billable: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();

        let edited = h.manager.get_entry(&entry.id).await.unwrap();
        assert_eq!(edited.description.as_deref(), Some("after the fact"));
        assert!(edited.is_billable);
        assert_eq!(edited.duration, 42);
        assert_eq!(edited.end_time.unwrap().timestamp(), T0 + 42);
        assert!(!edited.is_running);
    }

    #[tokio::test]
    async fn stopping_twice_keeps_first_result() {
        let h = harness();
        let entry = h.manager.start_timer(&user("alice"), StartTimer::default()).await.unwrap();

        h.clock.advance(ChronoDuration::seconds(125));
        h.manager.stop_timer(&entry.id).await.unwrap();
        let first = h.manager.get_entry(&entry.id).await.unwrap();

        h.clock.advance(ChronoDuration::seconds(1000));
        h.manager.stop_timer(&entry.id).await.unwrap();
        let second = h.manager.get_entry(&entry.id).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.duration, 125);
    }

    #[tokio::test]
    async fn concurrent_stops_write_end_time_once() {
        let h = harness_with(
            MemoryStore::with_latency(Duration::from_millis(5)),
            StartGuard::Conditional,
        );
        let entry = h.manager.start_timer(&user("alice"), StartTimer::default()).await.unwrap();
        h.clock.advance(ChronoDuration::seconds(60));

        let (a, b) = tokio::join!(h.manager.stop_timer(&entry.id), h.manager.stop_timer(&entry.id));
        a.unwrap();
        b.unwrap();

        let stopped = h.manager.get_entry(&entry.id).await.unwrap();
        assert_eq!(stopped.duration, 60);
    }

    #[tokio::test]
    async fn managers_sharing_a_store_stop_once() {
        let store = Arc::new(MemoryStore::with_latency(Duration::from_millis(5)));
        let clock_a = Arc::new(ManualClock::at_unix(T0));
        let clock_b = Arc::new(ManualClock::at_unix(T0));
        let a = TimerLifecycleManager::new(store.clone(), clock_a.clone());
        let b = TimerLifecycleManager::new(store.clone(), clock_b.clone());
        let alice = user("alice");
        let mut feed_a = a.subscribe(None);
        let mut feed_b = b.subscribe(None);

        let entry = a.start_timer(&alice, StartTimer::default()).await.unwrap();
        clock_a.advance(ChronoDuration::seconds(60));
        clock_b.advance(ChronoDuration::seconds(120));

        let (from_a, from_b) = tokio::join!(a.stop_running_timer(&alice), b.stop_running_timer(&alice));
        let from_a = from_a.unwrap().unwrap();
        let from_b = from_b.unwrap().unwrap();

        let stored = a.get_entry(&entry.id).await.unwrap();
        assert!(stored.duration == 60 || stored.duration == 120);
        assert_eq!(from_a, stored);
        assert_eq!(from_b, stored);

        let mut stops = 0;
        for feed in [&mut feed_a, &mut feed_b] {
            while let Some(event) = feed.try_recv() {
                if let TimerEvent::Stopped(e) = event {
                    assert_eq!(e.duration, stored.duration);
                    stops += 1;
                }
            }
        }
        assert_eq!(stops, 1);
    }

    #[tokio::test]
    async fn stop_missing_entry_is_not_found() {
        let h = harness();
        let err = h.manager.stop_timer(&EntryId::new("ghost")).await.unwrap_err();
        assert!(matches!(err, TimerError::NotFound(_)));
    }

    #[tokio::test]
    async fn duration_is_floored() {
        let h = harness();
        let entry = h.manager.start_timer(&user("alice"), StartTimer::default()).await.unwrap();

        h.clock.advance(ChronoDuration::milliseconds(61_700));
        h.manager.stop_timer(&entry.id).await.unwrap();

        assert_eq!(h.manager.get_entry(&entry.id).await.unwrap().duration, 61);
    }

    #[tokio::test]
    async fn backwards_clock_clamps_to_zero() {
        let h = harness();
        let entry = h.manager.start_timer(&user("alice"), StartTimer::default()).await.unwrap();

        h.clock.advance(ChronoDuration::seconds(-30));
        assert_eq!(h.manager.elapsed_seconds(&entry), 0);

        h.manager.stop_timer(&entry.id).await.unwrap();
        let stopped = h.manager.get_entry(&entry.id).await.unwrap();
        assert_eq!(stopped.duration, 0);
        assert!(!stopped.is_running);
    }

    #[tokio::test]
    async fn running_view_reports_elapsed() {
        let h = harness();
        let alice = user("alice");
        assert!(h.manager.running_view(&alice).await.unwrap().is_none());

        h.manager.start_timer(&alice, StartTimer::default()).await.unwrap();
        h.clock.advance(ChronoDuration::seconds(75));

        let view = h.manager.running_view(&alice).await.unwrap().unwrap();
        assert_eq!(view.elapsed_seconds, 75);
        assert_eq!(view.as_of.timestamp(), T0 + 75);
    }

    #[tokio::test]
    async fn stop_running_timer_by_user() {
        let h = harness();
        let alice = user("alice");
        assert!(h.manager.stop_running_timer(&alice).await.unwrap().is_none());

        h.manager.start_timer(&alice, StartTimer::default()).await.unwrap();
        h.clock.advance(ChronoDuration::seconds(20));

        let stopped = h.manager.stop_running_timer(&alice).await.unwrap().unwrap();
        assert_eq!(stopped.duration, 20);
        assert!(h.manager.get_running_timer(&alice).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_entries_newest_first() {
        let h = harness();
        let alice = user("alice");

        for _ in 0..3 {
            let entry = h.manager.start_timer(&alice, StartTimer::default()).await.unwrap();
            h.clock.advance(ChronoDuration::seconds(10));
            h.manager.stop_timer(&entry.id).await.unwrap();
        }
        h.manager.start_timer(&user("bob"), StartTimer::default()).await.unwrap();

        let entries = h.manager.list_entries(&alice).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries.windows(2).all(|w| w[0].start_time > w[1].start_time));
        assert!(entries.iter().all(|e| e.user_id == alice));
    }

    #[tokio::test]
    async fn concurrent_starts_conditional_admit_one() {
        let h = harness_with(
            MemoryStore::with_latency(Duration::from_millis(5)),
            StartGuard::Conditional,
        );
        let alice = user("alice");

        let (a, b) = tokio::join!(
            h.manager.start_timer(&alice, StartTimer::default()),
            h.manager.start_timer(&alice, StartTimer::default())
        );

        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
        let err = a.err().or(b.err()).unwrap();
        assert!(matches!(err, TimerError::TimerAlreadyRunning { .. }));
        assert_eq!(running_count(&h, &alice).await, 1);
    }

    #[tokio::test]
    async fn concurrent_starts_per_user_lock_admit_one() {
        let h = harness_with(
            MemoryStore::with_latency(Duration::from_millis(5)),
            StartGuard::PerUserLock,
        );
        let alice = user("alice");

        let (a, b) = tokio::join!(
            h.manager.start_timer(&alice, StartTimer::default()),
            h.manager.start_timer(&alice, StartTimer::default())
        );

        assert!(a.is_ok() != b.is_ok());
        assert_eq!(running_count(&h, &alice).await, 1);
    }

    #[tokio::test]
    async fn concurrent_starts_unguarded_can_race() {
        let h = harness_with(
            MemoryStore::with_latency(Duration::from_millis(5)),
            StartGuard::Unguarded,
        );
        let alice = user("alice");

        let (a, b) = tokio::join!(
            h.manager.start_timer(&alice, StartTimer::default()),
            h.manager.start_timer(&alice, StartTimer::default())
        );

        // Both checks run before either write lands
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(running_count(&h, &alice).await, 2);

        // Reads still resolve to a single entry
        let running = h.manager.get_running_timer(&alice).await.unwrap().unwrap();
        assert!(running.id == a.id || running.id == b.id);
    }

    #[tokio::test]
    async fn offline_store_is_unavailable() {
        let h = harness();
        let entry = h.manager.start_timer(&user("alice"), StartTimer::default()).await.unwrap();

        h.store.set_online(false);
        let err = h.manager.stop_timer(&entry.id).await.unwrap_err();
        assert!(matches!(err, TimerError::StoreUnavailable(_)));

        h.store.set_online(true);
        assert!(h.manager.get_entry(&entry.id).await.unwrap().is_running);
    }

    #[tokio::test]
    async fn slow_store_times_out() {
        let store = Arc::new(MemoryStore::with_latency(Duration::from_millis(200)));
        let clock = Arc::new(ManualClock::at_unix(T0));
        let manager = TimerLifecycleManager::new(store.clone(), clock)
            .with_io_timeout(Duration::from_millis(20));

        let err = manager
            .start_timer(&user("alice"), StartTimer::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TimerError::StoreUnavailable(ref m) if m.contains("timed out")));
    }

    #[tokio::test]
    async fn corrupt_record_is_invalid_state() {
        let h = harness();
        let doc = json!({
            "id": "bad",
            "userId": "alice",
            "startTime": "2024-01-01T00:00:00Z",
            "isRunning": false,
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z"
        });
        let Value::Object(doc) = doc else { unreachable!() };
        h.store.set(TIME_ENTRIES, "bad", doc).await.unwrap();

        let err = h.manager.get_entry(&EntryId::new("bad")).await.unwrap_err();
        assert!(matches!(err, TimerError::InvalidState(_)));
    }

    #[tokio::test]
    async fn feed_reports_lifecycle() {
        let h = harness();
        let alice = user("alice");
        let mut sub = h.manager.subscribe(Some(alice.clone()));
        let mut other = h.manager.subscribe(Some(user("bob")));

        let entry = h.manager.start_timer(&alice, StartTimer::default()).await.unwrap();
        h.manager
            .update_timer(&entry.id, TimerPatch {
                description: Some("x".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        h.clock.advance(ChronoDuration::seconds(3));
        h.manager.stop_timer(&entry.id).await.unwrap();

        assert!(matches!(sub.try_recv(), Some(TimerEvent::Started(e)) if e.id == entry.id));
        assert!(matches!(sub.try_recv(), Some(TimerEvent::Updated { .. })));
        assert!(matches!(sub.try_recv(), Some(TimerEvent::Stopped(e)) if e.duration == 3));
        assert!(sub.try_recv().is_none());
        assert!(other.try_recv().is_none());
    }

    #[tokio::test]
    async fn works_over_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteStore::open(dir.path().join("clockistry.db")).unwrap());
        let clock = Arc::new(ManualClock::at_unix(T0));
        let manager = TimerLifecycleManager::new(store, clock.clone());
        let alice = user("alice");

        let entry = manager.start_timer(&alice, StartTimer::default()).await.unwrap();
        assert!(matches!(
            manager.start_timer(&alice, StartTimer::default()).await,
            Err(TimerError::TimerAlreadyRunning { .. })
        ));

        clock.advance(ChronoDuration::seconds(90));
        manager.stop_timer(&entry.id).await.unwrap();

        let stopped = manager.get_entry(&entry.id).await.unwrap();
        assert_eq!(stopped.duration, 90);
        assert!(manager.get_running_timer(&alice).await.unwrap().is_none());
    }
}
