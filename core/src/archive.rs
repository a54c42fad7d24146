//! Archival sweep: recompress photos of long-closed cases.
//!
//! A case is eligible once it has sat in `case-closed` for longer than the
//! configured window and still holds at least one unarchived photo. Each
//! such photo is recompressed with the archive profile and flagged
//! `archived`.
//!
//! The codec runs on a blocking thread over the snapshot taken at the start
//! of the sweep. Results are merged into whatever the state is by then:
//! a photo is replaced only if it still exists with the payload that was
//! recompressed. The sweep never touches `updated_at`.

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::{Arc, PoisonError};

use chrono::{DateTime, Duration, Utc};
use tokio::time::MissedTickBehavior;

use crate::codec::ImageCodec;
use crate::model::Case;
use crate::repository::Repository;

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Eligible cases found in the starting snapshot.
    pub cases: usize,
    pub archived: usize,
    pub failed: usize,
}

/// One photo to recompress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoJob {
    pub case_id: String,
    pub photo_id: String,
    pub data_url: String,
}

pub fn is_eligible(case: &Case, now: DateTime<Utc>, after: Duration) -> bool {
    case.is_closed()
        && now.signed_duration_since(case.updated_at) > after
        && case.photos.iter().any(|photo| !photo.archived)
}

/// Photos to recompress, skipping ids in `skip`.
pub fn plan_sweep(
    cases: &[Case],
    now: DateTime<Utc>,
    after: Duration,
    skip: &HashSet<String>,
) -> Vec<PhotoJob> {
    cases
        .iter()
        .filter(|case| is_eligible(case, now, after))
        .flat_map(|case| {
            case.photos
                .iter()
                .filter(|photo| !photo.archived && !skip.contains(&photo.id))
                .map(|photo| PhotoJob {
                    case_id: case.id.clone(),
                    photo_id: photo.id.clone(),
                    data_url: photo.data_url.clone(),
                })
        })
        .collect()
}

/// Replace recompressed photos in `cases`. Returns how many were applied.
///
/// A result is dropped when its case or photo is gone or the photo payload
/// changed since the job was planned.
pub fn merge_archived(cases: &mut [Case], results: Vec<(PhotoJob, String)>) -> usize {
    let mut applied = 0;
    for (job, encoded) in results {
        let Some(photo) = cases
            .iter_mut()
            .find(|case| case.id == job.case_id)
            .and_then(|case| case.photos.iter_mut().find(|photo| photo.id == job.photo_id))
        else {
            continue;
        };
        if photo.archived || photo.data_url != job.data_url {
            continue;
        }
        photo.data_url = encoded;
        photo.archived = true;
        applied += 1;
    }
    applied
}

impl Repository {
    /// Run one sweep now, retrying photos that failed earlier.
    pub async fn run_archival_sweep(&self, codec: Arc<dyn ImageCodec>) -> SweepReport {
        self.clear_archive_failures();
        self.sweep(codec).await
    }

    /// Spawn the background sweep loop.
    ///
    /// Sweeps on every state change and on each `sweep_interval` tick, one
    /// at a time. The periodic tick also forgets earlier codec failures.
    /// Stopped by [`Repository::shutdown`]. Calling this twice has no effect.
    pub fn start_archival(&self, codec: Arc<dyn ImageCodec>) {
        if self.inner.archival_started.swap(true, Ordering::SeqCst) {
            tracing::debug!("archival loop already running");
            return;
        }

        let repo = self.clone();
        let mut changes = self.subscribe();
        let token = self.inner.cancel.clone();
        let period = self.inner.settings.sweep_interval;

        self.inner.background.spawn_on(
            async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = ticker.tick() => repo.clear_archive_failures(),
                        changed = changes.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }

                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = repo.sweep(Arc::clone(&codec)) => {}
                    }
                }
                tracing::debug!("archival loop stopped");
            },
            &self.inner.runtime,
        );
    }

    fn clear_archive_failures(&self) {
        self.inner
            .archive_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    async fn sweep(&self, codec: Arc<dyn ImageCodec>) -> SweepReport {
        let _running = self.inner.sweep_lock.lock().await;

        let snapshot = self.snapshot();
        if snapshot.is_loading {
            return SweepReport::default();
        }

        let jobs = {
            let failures = self
                .inner
                .archive_failures
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            plan_sweep(
                &snapshot.cases,
                self.inner.clock.now(),
                self.inner.settings.archive_after,
                &failures,
            )
        };
        if jobs.is_empty() {
            return SweepReport::default();
        }

        let mut report = SweepReport {
            cases: jobs
                .iter()
                .map(|job| job.case_id.as_str())
                .collect::<HashSet<_>>()
                .len(),
            ..Default::default()
        };
        tracing::debug!(cases = report.cases, photos = jobs.len(), "archival sweep started");

        let profile = self.inner.settings.archive_profile;
        let results = match tokio::task::spawn_blocking(move || {
            jobs.into_iter()
                .map(|job| {
                    let result = codec.recompress(&job.data_url, &profile);
                    (job, result)
                })
                .collect::<Vec<_>>()
        })
        .await
        {
            Ok(results) => results,
            Err(e) => {
                tracing::error!(error = %e, "archival task failed");
                return SweepReport::default();
            }
        };

        if self.inner.cancel.is_cancelled() {
            tracing::debug!("archival sweep cancelled, discarding results");
            return SweepReport::default();
        }

        let mut archived = Vec::new();
        {
            let mut failures = self
                .inner
                .archive_failures
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            for (job, result) in results {
                match result {
                    Ok(encoded) => archived.push((job, encoded)),
                    Err(e) => {
                        tracing::warn!(
                            case_id = %job.case_id,
                            photo_id = %job.photo_id,
                            error = %e,
                            "failed to archive photo"
                        );
                        failures.insert(job.photo_id);
                        report.failed += 1;
                    }
                }
            }
        }

        if !archived.is_empty() {
            report.archived = self
                .commit("archive_photos", |cases, _| {
                    let applied = merge_archived(cases, archived);
                    (applied, applied > 0)
                })
                .unwrap_or_default();
        }

        tracing::info!(
            cases = report.cases,
            archived = report.archived,
            failed = report.failed,
            "archival sweep finished"
        );
        report
    }
}
