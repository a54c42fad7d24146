//! Case repository: the single source of truth for the board.
//!
//! All mutations are synchronous and in-memory. The state lives in a
//! `watch` channel so every mutation is applied atomically with respect to
//! every other one and subscribers observe each committed collection.
//!
//! Each successful mutation serializes the whole collection at commit time
//! and hands it to a blocking save task. Saves are not queued: a snapshot
//! that is older than one already written is skipped, so the newest commit
//! always wins.
//!
//! ## Storage-full reporting
//!
//! A capacity-exceeded save failure opens a *failure episode* and emits one
//! [`StorageFullEvent`]. Further capacity failures in the same episode are
//! silent. The next successful save closes the episode. Other failures are
//! logged and never affect the episode.
//!
//! ## Unreadable store
//!
//! If the store fails to read at load, the board starts empty but nothing is
//! written back for the lifetime of the repository, so the unread snapshot
//! is never overwritten.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::clock::Clock;
use crate::codec::{CompressionProfile, ImageCodec};
use crate::config::ServiceDeskConfig;
use crate::errors::{RepositoryError, Result, StoreError};
use crate::model::{
    Case, CaseNote, CasePhoto, CaseStage, CaseUpdate, NewCase, Priority, new_id,
    normalize_registration,
};
use crate::schema::{LoadOutcome, decode_cases, encode_cases};
use crate::store::CaseStore;

/// Committed board state as seen by subscribers.
#[derive(Debug, Clone)]
pub struct BoardSnapshot {
    pub cases: Arc<Vec<Case>>,
    /// `true` until the stored collection has been loaded.
    pub is_loading: bool,
}

impl BoardSnapshot {
    pub fn find(&self, id: &str) -> Option<&Case> {
        self.cases.iter().find(|case| case.id == id)
    }
}

/// Raised on entry into a storage-full failure episode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageFullEvent {
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Outcome of [`Repository::add_raw_photos`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhotoBatchReport {
    pub added: usize,
    /// Images the codec rejected.
    pub failed: usize,
    /// Images dropped because the case reached its photo cap.
    pub skipped: usize,
}

/// Tunables the repository needs from [`ServiceDeskConfig`].
#[derive(Debug, Clone)]
pub struct RepositorySettings {
    pub max_photos: usize,
    pub capture_profile: CompressionProfile,
    pub archive_profile: CompressionProfile,
    pub archive_after: chrono::Duration,
    pub sweep_interval: Duration,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self::from(&ServiceDeskConfig::default())
    }
}

impl From<&ServiceDeskConfig> for RepositorySettings {
    fn from(config: &ServiceDeskConfig) -> Self {
        Self {
            max_photos: config.photos.max_per_case,
            capture_profile: config.codec.capture,
            archive_profile: config.codec.archive,
            archive_after: config.archive_after(),
            sweep_interval: config.sweep_interval(),
        }
    }
}

const STORAGE_FULL_CHANNEL_CAPACITY: usize = 16;

pub(crate) struct Inner {
    pub(crate) state: watch::Sender<BoardSnapshot>,
    store: Arc<dyn CaseStore>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) settings: RepositorySettings,

    storage_full_tx: broadcast::Sender<StorageFullEvent>,
    in_quota_episode: AtomicBool,
    /// Set when the load could not read the store; saves are suppressed.
    read_failed: AtomicBool,

    /// Commit sequence; the save task drops snapshots older than `last_saved`.
    save_seq: AtomicU64,
    last_saved: std::sync::Mutex<u64>,

    saves: TaskTracker,
    pub(crate) background: TaskTracker,
    pub(crate) cancel: CancellationToken,
    pub(crate) runtime: Handle,

    /// Photo ids the codec failed to archive since the last periodic tick.
    pub(crate) archive_failures: std::sync::Mutex<HashSet<String>>,
    /// Held for the duration of one archival sweep.
    pub(crate) sweep_lock: tokio::sync::Mutex<()>,
    pub(crate) archival_started: AtomicBool,
}

/// Cheap-to-clone handle over the shared board state.
#[derive(Clone)]
pub struct Repository {
    pub(crate) inner: Arc<Inner>,
}

impl Repository {
    /// Create an empty repository in the loading state.
    ///
    /// Must be called from within a Tokio runtime; background saves run on
    /// that runtime's blocking pool.
    pub fn new(
        store: Arc<dyn CaseStore>,
        clock: Arc<dyn Clock>,
        settings: RepositorySettings,
    ) -> Self {
        let (state, _) = watch::channel(BoardSnapshot {
            cases: Arc::new(Vec::new()),
            is_loading: true,
        });
        let (storage_full_tx, _) = broadcast::channel(STORAGE_FULL_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                state,
                store,
                clock,
                settings,
                storage_full_tx,
                in_quota_episode: AtomicBool::new(false),
                read_failed: AtomicBool::new(false),
                save_seq: AtomicU64::new(0),
                last_saved: std::sync::Mutex::new(0),
                saves: TaskTracker::new(),
                background: TaskTracker::new(),
                cancel: CancellationToken::new(),
                runtime: Handle::current(),
                archive_failures: std::sync::Mutex::new(HashSet::new()),
                sweep_lock: tokio::sync::Mutex::new(()),
                archival_started: AtomicBool::new(false),
            }),
        }
    }

    /// Create and load in one step.
    pub async fn open(
        store: Arc<dyn CaseStore>,
        clock: Arc<dyn Clock>,
        settings: RepositorySettings,
    ) -> Self {
        let repo = Self::new(store, clock, settings);
        repo.load().await;
        repo
    }

    /// Read the stored collection and leave the loading state.
    ///
    /// Missing and corrupt payloads yield an empty board. A store read
    /// failure also yields an empty board, but disables saving so whatever
    /// the store holds is left alone. Calling this again after a load is a
    /// no-op.
    pub async fn load(&self) {
        if !self.inner.state.borrow().is_loading {
            tracing::debug!("repository already loaded");
            return;
        }

        let store = Arc::clone(&self.inner.store);
        let payload = match tokio::task::spawn_blocking(move || store.load()).await {
            Ok(Ok(payload)) => payload,
            Ok(Err(e)) => {
                tracing::error!(error = %e, kind = e.kind().as_str(), "failed to read stored cases, starting empty with saving disabled");
                self.inner.read_failed.store(true, Ordering::SeqCst);
                None
            }
            Err(e) => {
                tracing::error!(error = %e, "load task failed, starting empty with saving disabled");
                self.inner.read_failed.store(true, Ordering::SeqCst);
                None
            }
        };

        let decoded = decode_cases(
            payload.as_deref(),
            self.inner.clock.now(),
            self.inner.settings.max_photos,
        );
        match decoded.outcome {
            LoadOutcome::Empty => tracing::debug!("no stored cases"),
            LoadOutcome::Corrupt => tracing::warn!("stored cases unreadable, starting empty"),
            LoadOutcome::Loaded { repairs: 0 } => {
                tracing::debug!(cases = decoded.cases.len(), "cases loaded");
            }
            LoadOutcome::Loaded { repairs } => {
                tracing::warn!(cases = decoded.cases.len(), repairs, "cases loaded with repairs");
            }
        }

        self.inner.state.send_modify(|snap| {
            snap.cases = Arc::new(decoded.cases);
            snap.is_loading = false;
        });
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<BoardSnapshot> {
        self.inner.state.subscribe()
    }

    pub fn subscribe_storage_full(&self) -> broadcast::Receiver<StorageFullEvent> {
        self.inner.storage_full_tx.subscribe()
    }

    /// `true` when the load could not read the store and changes are not
    /// being saved.
    pub fn saving_disabled(&self) -> bool {
        self.inner.read_failed.load(Ordering::SeqCst)
    }

    pub fn get(&self, id: &str) -> Option<Case> {
        self.inner.state.borrow().find(id).cloned()
    }

    // ── Mutations ────────────────────────────────────────────────────────────

    /// Register a new case at the end of the collection.
    ///
    /// Photos beyond the per-case cap are dropped.
    pub fn create_case(&self, intake: NewCase, photos: Vec<String>) -> Result<Case> {
        if let Some(field) = intake.missing_field() {
            return Err(RepositoryError::InvalidIntake { field });
        }

        let max_photos = self.inner.settings.max_photos;
        if photos.len() > max_photos {
            tracing::debug!(
                offered = photos.len(),
                kept = max_photos,
                "dropping intake photos beyond cap"
            );
        }

        let case = self.commit("create_case", move |cases, now| {
            let case = Case {
                id: new_id(),
                customer_name: intake.customer_name,
                customer_phone: intake.customer_phone,
                vehicle_model: intake.vehicle_model,
                vehicle_color: intake.vehicle_color,
                registration_number: normalize_registration(&intake.registration_number),
                damage_description: intake.damage_description,
                stage: CaseStage::NewIntake,
                insurance_status: Default::default(),
                parts_status: Default::default(),
                priority: intake.priority,
                notes: Vec::new(),
                photos: photos
                    .into_iter()
                    .take(max_photos)
                    .map(|data_url| CasePhoto::new(data_url, now))
                    .collect(),
                created_at: now,
                updated_at: now,
            };
            cases.push(case.clone());
            (case, true)
        })?;

        tracing::info!(case_id = %case.id, registration = %case.registration_number, "case created");
        Ok(case)
    }

    /// Merge `update` into the case. Returns `false` when the id is unknown.
    pub fn update_case(&self, id: &str, update: CaseUpdate) -> Result<bool> {
        self.with_case("update_case", id, |case, _| {
            update.apply_to(case);
            Some(())
        })
        .map(|found| found.is_some())
    }

    /// Put the case in `stage`, in any direction.
    pub fn move_case(&self, id: &str, stage: CaseStage) -> Result<bool> {
        self.update_case(id, CaseUpdate::stage(stage))
    }

    /// Move the case one column forward. `None` when the id is unknown or
    /// the case is already closed.
    pub fn advance_stage(&self, id: &str) -> Result<Option<CaseStage>> {
        self.with_case("advance_stage", id, |case, _| {
            let next = case.stage.next()?;
            case.stage = next;
            Some(next)
        })
    }

    /// Append a note. Blank text is ignored.
    pub fn add_note(&self, id: &str, text: &str) -> Result<Option<CaseNote>> {
        let text = text.trim();
        self.with_case("add_note", id, |case, now| {
            if text.is_empty() {
                return None;
            }
            let note = CaseNote {
                id: new_id(),
                text: text.to_string(),
                timestamp: now,
            };
            case.notes.push(note.clone());
            Some(note)
        })
    }

    /// Attach an already encoded photo. `None` at the cap.
    pub fn add_photo(&self, id: &str, data_url: String) -> Result<Option<CasePhoto>> {
        let max_photos = self.inner.settings.max_photos;
        self.with_case("add_photo", id, |case, now| {
            if case.photos.len() >= max_photos {
                tracing::debug!(case_id = %case.id, max_photos, "photo cap reached");
                return None;
            }
            let photo = CasePhoto::new(data_url, now);
            case.photos.push(photo.clone());
            Some(photo)
        })
    }

    /// Compress raw images with the capture profile and attach the results
    /// in order.
    ///
    /// A codec failure abandons only that image. Images beyond the cap are
    /// counted as skipped without being compressed. `None` when the id is
    /// unknown.
    pub async fn add_raw_photos(
        &self,
        id: &str,
        raws: Vec<Vec<u8>>,
        codec: Arc<dyn ImageCodec>,
    ) -> Result<Option<PhotoBatchReport>> {
        let max_photos = self.inner.settings.max_photos;
        let room = {
            let snap = self.inner.state.borrow();
            if snap.is_loading {
                return Err(RepositoryError::NotReady);
            }
            let Some(case) = snap.find(id) else {
                return Ok(None);
            };
            max_photos.saturating_sub(case.photos.len())
        };

        let mut report = PhotoBatchReport {
            skipped: raws.len().saturating_sub(room),
            ..Default::default()
        };
        if room == 0 {
            return Ok(Some(report));
        }

        let profile = self.inner.settings.capture_profile;
        let batch: Vec<Vec<u8>> = raws.into_iter().take(room).collect();
        let encoded = match tokio::task::spawn_blocking(move || {
            batch
                .iter()
                .map(|raw| codec.compress(raw, &profile))
                .collect::<Vec<_>>()
        })
        .await
        {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::error!(error = %e, "photo compression task failed");
                report.failed = room;
                return Ok(Some(report));
            }
        };

        let mut accepted = Vec::new();
        for result in encoded {
            match result {
                Ok(data_url) => accepted.push(data_url),
                Err(e) => {
                    tracing::warn!(case_id = %id, error = %e, "photo rejected by codec");
                    report.failed += 1;
                }
            }
        }
        if accepted.is_empty() {
            return Ok(Some(report));
        }

        // The case may have changed while compressing; re-check the cap.
        let offered = accepted.len();
        let added = self.with_case("add_raw_photos", id, |case, now| {
            let room = max_photos.saturating_sub(case.photos.len());
            let added = offered.min(room);
            case.photos.extend(
                accepted
                    .into_iter()
                    .take(added)
                    .map(|data_url| CasePhoto::new(data_url, now)),
            );
            (added > 0).then_some(added)
        })?;

        let Some(added) = added else {
            if self.inner.state.borrow().find(id).is_none() {
                return Ok(None);
            }
            report.skipped += offered;
            return Ok(Some(report));
        };
        report.added = added;
        report.skipped += offered - added;
        tracing::info!(case_id = %id, added = report.added, failed = report.failed, skipped = report.skipped, "photos attached");
        Ok(Some(report))
    }

    pub fn delete_photo(&self, id: &str, photo_id: &str) -> Result<bool> {
        self.with_case("delete_photo", id, |case, _| {
            let before = case.photos.len();
            case.photos.retain(|photo| photo.id != photo_id);
            (case.photos.len() != before).then_some(())
        })
        .map(|removed| removed.is_some())
    }

    pub fn delete_case(&self, id: &str) -> Result<bool> {
        let removed = self.commit("delete_case", |cases, _| {
            let before = cases.len();
            cases.retain(|case| case.id != id);
            let removed = cases.len() != before;
            (removed, removed)
        })?;
        if removed {
            tracing::info!(case_id = %id, "case deleted");
        }
        Ok(removed)
    }

    /// Flip between normal and urgent. Returns the new priority.
    pub fn toggle_priority(&self, id: &str) -> Result<Option<Priority>> {
        self.with_case("toggle_priority", id, |case, _| {
            case.priority = case.priority.toggled();
            Some(case.priority)
        })
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Wait for every save scheduled so far.
    pub async fn flush(&self) {
        self.inner.saves.close();
        self.inner.saves.wait().await;
        self.inner.saves.reopen();
    }

    /// Stop background work and wait for it, including pending saves.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.inner.background.close();
        self.inner.background.wait().await;
        self.flush().await;
    }

    // ── Internals ────────────────────────────────────────────────────────────

    /// Apply `f` to the case with `id`, refreshing its `updated_at` when `f`
    /// reports a change by returning `Some`.
    fn with_case<T>(
        &self,
        op: &'static str,
        id: &str,
        f: impl FnOnce(&mut Case, DateTime<Utc>) -> Option<T>,
    ) -> Result<Option<T>> {
        self.commit(op, |cases, now| {
            let Some(case) = cases.iter_mut().find(|case| case.id == id) else {
                return (None, false);
            };
            let result = f(case, now);
            if result.is_some() {
                case.updated_at = now.max(case.updated_at);
            }
            let changed = result.is_some();
            (result, changed)
        })
    }

    /// Apply `f` atomically to the collection.
    ///
    /// `f` returns its result and whether it changed anything. Changes are
    /// published to subscribers and scheduled for saving.
    pub(crate) fn commit<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut Vec<Case>, DateTime<Utc>) -> (T, bool),
    ) -> Result<T> {
        let now = self.inner.clock.now();
        let mut outcome = Err(RepositoryError::NotReady);
        let mut pending = None;

        self.inner.state.send_if_modified(|snap| {
            if snap.is_loading {
                return false;
            }
            let (result, changed) = f(Arc::make_mut(&mut snap.cases), now);
            outcome = Ok(result);
            if changed {
                let seq = self.inner.save_seq.fetch_add(1, Ordering::SeqCst) + 1;
                pending = Some((seq, encode_cases(&snap.cases)));
            }
            changed
        });

        match pending {
            Some(_) if self.inner.read_failed.load(Ordering::SeqCst) => {
                tracing::warn!(op, "store was unreadable at load, change kept in memory only");
            }
            Some((seq, Ok(payload))) => self.schedule_save(op, seq, payload),
            Some((_, Err(e))) => {
                tracing::error!(op, error = %e, "failed to serialize cases, save skipped");
            }
            None => {}
        }
        outcome
    }

    fn schedule_save(&self, op: &'static str, seq: u64, payload: String) {
        let inner = Arc::clone(&self.inner);
        self.inner
            .saves
            .spawn_blocking_on(move || inner.persist(op, seq, &payload), &self.inner.runtime);
    }
}

impl Inner {
    fn persist(&self, op: &'static str, seq: u64, payload: &str) {
        let mut last_saved = self
            .last_saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if seq <= *last_saved {
            tracing::debug!(op, seq, last_saved = *last_saved, "skipping superseded save");
            return;
        }
        *last_saved = seq;

        match self.store.save(payload) {
            Ok(()) => {
                if self.in_quota_episode.swap(false, Ordering::SeqCst) {
                    tracing::info!(op, "storage recovered");
                }
                tracing::debug!(op, seq, bytes = payload.len(), "cases saved");
            }
            Err(e) => self.report_save_failure(op, e),
        }
    }

    fn report_save_failure(&self, op: &'static str, error: StoreError) {
        if !error.is_capacity_exceeded() {
            tracing::error!(op, error = %error, kind = error.kind().as_str(), "failed to save cases");
            return;
        }

        if self.in_quota_episode.swap(true, Ordering::SeqCst) {
            tracing::debug!(op, error = %error, "storage still full");
            return;
        }

        tracing::warn!(op, error = %error, "storage full, changes are not being saved");
        let event = StorageFullEvent {
            message: error.to_string(),
            at: self.clock.now(),
        };
        // No subscribers is fine.
        let _ = self.storage_full_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::errors::StoreResult;
    use crate::model::InsuranceStatus;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Store whose save results are scripted; `true` means quota exceeded.
    #[derive(Default)]
    struct ScriptedStore {
        initial: Option<String>,
        script: Mutex<VecDeque<bool>>,
        saved: Mutex<Vec<String>>,
    }

    impl ScriptedStore {
        fn failing(script: &[bool]) -> Self {
            Self {
                script: Mutex::new(script.iter().copied().collect()),
                ..Default::default()
            }
        }
    }

    impl CaseStore for ScriptedStore {
        fn load(&self) -> StoreResult<Option<String>> {
            Ok(self.initial.clone())
        }

        fn save(&self, payload: &str) -> StoreResult<()> {
            if self.script.lock().unwrap().pop_front().unwrap_or(false) {
                return Err(StoreError::quota_exceeded("scripted"));
            }
            self.saved.lock().unwrap().push(payload.to_string());
            Ok(())
        }
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            "2026-03-01T09:00:00Z".parse::<DateTime<Utc>>().unwrap(),
        ))
    }

    fn intake() -> NewCase {
        NewCase {
            customer_name: "Asha Rao".to_string(),
            customer_phone: "9820012345".to_string(),
            vehicle_model: "Maruti Swift".to_string(),
            registration_number: "mh12ab1234".to_string(),
            ..Default::default()
        }
    }

    async fn open(store: Arc<dyn CaseStore>, clock: Arc<ManualClock>) -> Repository {
        Repository::open(store, clock, RepositorySettings::default()).await
    }

    #[tokio::test]
    async fn mutations_before_load_are_rejected() {
        let store = Arc::new(ScriptedStore::default());
        let repo = Repository::new(store.clone(), clock(), RepositorySettings::default());

        assert!(repo.snapshot().is_loading);
        assert!(matches!(
            repo.create_case(intake(), vec![]),
            Err(RepositoryError::NotReady)
        ));
        assert!(matches!(
            repo.delete_case("x"),
            Err(RepositoryError::NotReady)
        ));
        repo.flush().await;
        assert!(store.saved.lock().unwrap().is_empty());

        repo.load().await;
        assert!(!repo.snapshot().is_loading);
        repo.create_case(intake(), vec![]).unwrap();
    }

    #[tokio::test]
    async fn create_case_normalizes_and_persists() {
        let store = Arc::new(ScriptedStore::default());
        let clock = clock();
        let repo = open(store.clone(), clock.clone()).await;

        let case = repo.create_case(intake(), vec![]).unwrap();
        assert_eq!(case.registration_number, "MH12AB1234");
        assert_eq!(case.stage, CaseStage::NewIntake);
        assert_eq!(case.insurance_status, InsuranceStatus::NotApplied);
        assert_eq!(case.created_at, clock.now());
        assert_eq!(case.updated_at, case.created_at);
        assert!(case.notes.is_empty());

        repo.flush().await;
        let saved = store.saved.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert!(saved[0].contains("MH12AB1234"));
    }

    #[tokio::test]
    async fn invalid_intake_is_rejected() {
        let repo = open(Arc::new(ScriptedStore::default()), clock()).await;
        let err = repo
            .create_case(
                NewCase {
                    registration_number: "  ".to_string(),
                    ..intake()
                },
                vec![],
            )
            .unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::InvalidIntake {
                field: "registration_number"
            }
        ));
        assert!(repo.snapshot().cases.is_empty());
    }

    #[tokio::test]
    async fn mutations_refresh_updated_at() {
        let clock = clock();
        let repo = open(Arc::new(ScriptedStore::default()), clock.clone()).await;
        let case = repo.create_case(intake(), vec![]).unwrap();

        clock.advance(chrono::Duration::minutes(5));
        assert!(repo.move_case(&case.id, CaseStage::RepairInProgress).unwrap());
        let moved = repo.get(&case.id).unwrap();
        assert_eq!(moved.stage, CaseStage::RepairInProgress);
        assert_eq!(moved.updated_at, clock.now());
        assert_eq!(moved.created_at, case.created_at);

        assert!(!repo.move_case("missing", CaseStage::CaseClosed).unwrap());
    }

    #[tokio::test]
    async fn advance_stops_at_closed() {
        let repo = open(Arc::new(ScriptedStore::default()), clock()).await;
        let case = repo.create_case(intake(), vec![]).unwrap();

        let mut walked = Vec::new();
        while let Some(stage) = repo.advance_stage(&case.id).unwrap() {
            walked.push(stage);
        }
        assert_eq!(walked, CaseStage::ORDER[1..].to_vec());
        assert_eq!(repo.get(&case.id).unwrap().stage, CaseStage::CaseClosed);
    }

    #[tokio::test]
    async fn blank_note_is_a_no_op() {
        let clock = clock();
        let repo = open(Arc::new(ScriptedStore::default()), clock.clone()).await;
        let case = repo.create_case(intake(), vec![]).unwrap();

        clock.advance(chrono::Duration::minutes(1));
        assert_eq!(repo.add_note(&case.id, "   ").unwrap(), None);
        assert_eq!(repo.get(&case.id).unwrap().updated_at, case.updated_at);

        let note = repo.add_note(&case.id, "  bumper cracked ").unwrap().unwrap();
        assert_eq!(note.text, "bumper cracked");
        assert_eq!(repo.get(&case.id).unwrap().notes, vec![note]);
    }

    #[tokio::test]
    async fn photo_cap_is_enforced() {
        let settings = RepositorySettings {
            max_photos: 3,
            ..Default::default()
        };
        let repo = Repository::open(Arc::new(ScriptedStore::default()), clock(), settings).await;

        let photos = (0..5).map(|i| format!("data:image/jpeg;base64,{i}")).collect();
        let case = repo.create_case(intake(), photos).unwrap();
        assert_eq!(case.photos.len(), 3);

        assert_eq!(repo.add_photo(&case.id, "data:x".to_string()).unwrap(), None);
        assert!(repo.delete_photo(&case.id, &case.photos[0].id).unwrap());
        assert!(repo.add_photo(&case.id, "data:x".to_string()).unwrap().is_some());
        assert_eq!(repo.add_photo(&case.id, "data:y".to_string()).unwrap(), None);
        assert_eq!(repo.get(&case.id).unwrap().photos.len(), 3);
    }

    #[tokio::test]
    async fn toggle_and_delete() {
        let repo = open(Arc::new(ScriptedStore::default()), clock()).await;
        let case = repo.create_case(intake(), vec![]).unwrap();

        assert_eq!(repo.toggle_priority(&case.id).unwrap(), Some(Priority::Urgent));
        assert_eq!(repo.toggle_priority(&case.id).unwrap(), Some(Priority::Normal));
        assert!(repo.delete_case(&case.id).unwrap());
        assert!(!repo.delete_case(&case.id).unwrap());
        assert_eq!(repo.toggle_priority(&case.id).unwrap(), None);
    }

    #[tokio::test]
    async fn storage_full_is_reported_once_per_episode() {
        let store = Arc::new(ScriptedStore::failing(&[true, true, true]));
        let repo = open(store, clock()).await;
        let mut events = repo.subscribe_storage_full();

        let case = repo.create_case(intake(), vec![]).unwrap();
        repo.flush().await;
        repo.add_note(&case.id, "one").unwrap();
        repo.flush().await;
        repo.add_note(&case.id, "two").unwrap();
        repo.flush().await;

        assert!(events.try_recv().is_ok());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn storage_full_episode_ends_on_success() {
        let store = Arc::new(ScriptedStore::failing(&[true, false, true]));
        let repo = open(store, clock()).await;
        let mut events = repo.subscribe_storage_full();

        let case = repo.create_case(intake(), vec![]).unwrap();
        repo.flush().await;
        repo.add_note(&case.id, "one").unwrap();
        repo.flush().await;
        repo.add_note(&case.id, "two").unwrap();
        repo.flush().await;

        assert!(events.try_recv().is_ok());
        assert!(events.try_recv().is_ok());
        assert!(events.try_recv().is_err());
    }

    /// Store that cannot be read but would accept writes.
    #[derive(Default)]
    struct UnreadableStore {
        saved: Mutex<Vec<String>>,
    }

    impl CaseStore for UnreadableStore {
        fn load(&self) -> StoreResult<Option<String>> {
            Err(StoreError::unavailable("database is locked"))
        }

        fn save(&self, payload: &str) -> StoreResult<()> {
            self.saved.lock().unwrap().push(payload.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn unreadable_store_is_never_overwritten() {
        let store = Arc::new(UnreadableStore::default());
        let repo = open(store.clone(), clock()).await;

        let snap = repo.snapshot();
        assert!(!snap.is_loading);
        assert!(snap.cases.is_empty());

        let case = repo.create_case(intake(), vec![]).unwrap();
        repo.add_note(&case.id, "kept in memory").unwrap();
        repo.flush().await;

        assert_eq!(repo.snapshot().cases.len(), 1);
        assert!(repo.saving_disabled());
        assert!(store.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_store_loads_empty() {
        let store = Arc::new(ScriptedStore {
            initial: Some("{\"not\":\"an array\"}".to_string()),
            ..Default::default()
        });
        let repo = open(store, clock()).await;
        let snap = repo.snapshot();
        assert!(!snap.is_loading);
        assert!(snap.cases.is_empty());
    }

    #[tokio::test]
    async fn subscribers_see_commits() {
        let repo = open(Arc::new(ScriptedStore::default()), clock()).await;
        let mut rx = repo.subscribe();

        repo.create_case(intake(), vec![]).unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().cases.len(), 1);

        // Unknown id: nothing committed, nothing published.
        repo.update_case("missing", CaseUpdate::priority(Priority::Urgent))
            .unwrap();
        assert!(!rx.has_changed().unwrap());
    }
}
