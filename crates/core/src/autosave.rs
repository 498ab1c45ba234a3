//! Debounced persistence of timeline edits.
//!
//! Edits only record clip ids. The clips themselves are read from the
//! timeline when a flush runs, so a burst of edits to one clip is saved once
//! with its latest state.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use riff_project::{ProjectStore, StoreError};
use riff_transport::{Clip, ClipId, ClipPatch};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::commands::ChangeSet;
use crate::timeline::{SharedTimeline, read_timeline};

/// Clip ids waiting to be saved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirtySet {
    dirty: BTreeSet<ClipId>,
    /// Clips that exist only locally so far (split halves, materialized chords).
    created: BTreeSet<ClipId>,
    removed: BTreeSet<ClipId>,
}

impl DirtySet {
    pub fn mark(&mut self, id: ClipId) {
        if !self.created.contains(&id) {
            self.dirty.insert(id);
        }
        self.removed.remove(&id);
    }

    pub fn mark_created(&mut self, id: ClipId) {
        self.dirty.remove(&id);
        self.removed.remove(&id);
        self.created.insert(id);
    }

    pub fn mark_removed(&mut self, id: ClipId) {
        self.dirty.remove(&id);
        // Never saved, so there is nothing to delete.
        if !self.created.remove(&id) {
            self.removed.insert(id);
        }
    }

    /// Stop tracking `id` entirely.
    pub fn forget(&mut self, id: ClipId) {
        self.dirty.remove(&id);
        self.created.remove(&id);
        self.removed.remove(&id);
    }

    pub fn record(&mut self, changes: &ChangeSet) {
        for change in changes.iter() {
            match (&change.before, &change.after) {
                (None, Some(clip)) => self.mark_created(clip.id),
                (Some(_), Some(clip)) => self.mark(clip.id),
                (Some(clip), None) => self.mark_removed(clip.id),
                (None, None) => {}
            }
        }
    }

    pub fn dirty(&self) -> &BTreeSet<ClipId> {
        &self.dirty
    }

    pub fn created(&self) -> &BTreeSet<ClipId> {
        &self.created
    }

    pub fn removed(&self) -> &BTreeSet<ClipId> {
        &self.removed
    }

    pub fn contains(&self, id: ClipId) -> bool {
        self.dirty.contains(&id) || self.created.contains(&id) || self.removed.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.dirty.len() + self.created.len() + self.removed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take(&mut self) -> DirtySet {
        std::mem::take(self)
    }

    /// Put back ids from a failed flush. Newer marks win over restored ones.
    fn restore(&mut self, failed: DirtySet) {
        for id in failed.created {
            if !self.removed.contains(&id) && !self.dirty.contains(&id) {
                self.created.insert(id);
            }
        }
        for id in failed.dirty {
            if !self.removed.contains(&id) && !self.created.contains(&id) {
                self.dirty.insert(id);
            }
        }
        for id in failed.removed {
            if !self.created.contains(&id) && !self.dirty.contains(&id) {
                self.removed.insert(id);
            }
        }
    }
}

/// Counts of what one flush sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

/// The session's single autosave scheduler.
pub struct Autosave<S> {
    store: Arc<S>,
    timeline: SharedTimeline,
    pending: Mutex<DirtySet>,
    /// Serializes flushes; a second flush waits for the first.
    flush_lock: tokio::sync::Mutex<()>,
    debounce: Duration,
    deadline: Mutex<Option<Instant>>,
    wake: Notify,
}

impl<S: ProjectStore> Autosave<S> {
    pub fn new(store: Arc<S>, timeline: SharedTimeline, debounce: Duration) -> Self {
        Self {
            store,
            timeline,
            pending: Mutex::new(DirtySet::default()),
            flush_lock: tokio::sync::Mutex::new(()),
            debounce,
            deadline: Mutex::new(None),
            wake: Notify::new(),
        }
    }

    fn pending(&self) -> MutexGuard<'_, DirtySet> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deadline(&self) -> MutexGuard<'_, Option<Instant>> {
        self.deadline.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the ids currently waiting.
    pub fn snapshot(&self) -> DirtySet {
        self.pending().clone()
    }

    /// Record `changes` and restart the debounce timer.
    pub fn record(&self, changes: &ChangeSet) {
        if changes.is_empty() {
            return;
        }
        self.pending().record(changes);
        self.schedule();
    }

    pub fn mark(&self, id: ClipId) {
        self.pending().mark(id);
        self.schedule();
    }

    pub fn mark_removed(&self, id: ClipId) {
        self.pending().mark_removed(id);
        self.schedule();
    }

    pub fn forget(&self, ids: impl IntoIterator<Item = ClipId>) {
        let mut pending = self.pending();
        for id in ids {
            pending.forget(id);
        }
    }

    /// Push the deadline out to one debounce interval from now.
    pub fn schedule(&self) {
        *self.deadline() = Some(Instant::now() + self.debounce);
        self.wake.notify_one();
    }

    /// Save everything pending. Ids whose save failed are put back.
    pub async fn flush(&self) -> Result<FlushReport, StoreError> {
        let _guard = self.flush_lock.lock().await;
        *self.deadline() = None;

        let batch = self.pending().take();
        if batch.is_empty() {
            return Ok(FlushReport::default());
        }

        let (creates, updates) = {
            let timeline = read_timeline(&self.timeline);
            let creates: Vec<Clip> = batch
                .created
                .iter()
                .filter_map(|id| timeline.clip(*id).cloned())
                .collect();
            let updates: Vec<ClipPatch> = batch
                .dirty
                .iter()
                .filter_map(|id| timeline.clip(*id).map(Clip::snapshot))
                .collect();
            (creates, updates)
        };

        let mut report = FlushReport::default();
        let result = self.send(&batch, creates, updates, &mut report).await;
        match result {
            Ok(()) => {
                log::info!(
                    "autosaved {} new, {} updated, {} deleted clips",
                    report.created,
                    report.updated,
                    report.deleted
                );
                Ok(report)
            }
            Err((unsent, error)) => {
                log::warn!("autosave failed, {} clip ids re-queued: {error}", unsent.len());
                self.pending().restore(unsent);
                self.schedule();
                Err(error)
            }
        }
    }

    /// Creates, then one bulk update, then deletes. On error returns the ids
    /// that were not saved.
    async fn send(
        &self,
        batch: &DirtySet,
        creates: Vec<Clip>,
        updates: Vec<ClipPatch>,
        report: &mut FlushReport,
    ) -> Result<(), (DirtySet, StoreError)> {
        let mut created_done = BTreeSet::new();
        for clip in creates {
            let id = clip.id;
            if let Err(error) = self.store.create_clip(clip.track_id, clip).await {
                let unsent = DirtySet {
                    created: batch.created.difference(&created_done).copied().collect(),
                    ..batch.clone()
                };
                return Err((unsent, error));
            }
            created_done.insert(id);
            report.created += 1;
        }

        if !updates.is_empty() {
            let count = updates.len();
            if let Err(error) = self.store.bulk_update_clips(updates).await {
                let unsent = DirtySet {
                    created: BTreeSet::new(),
                    ..batch.clone()
                };
                return Err((unsent, error));
            }
            report.updated = count;
        }

        let mut deleted = BTreeSet::new();
        for &id in &batch.removed {
            match self.store.delete_clip(id).await {
                Ok(()) => report.deleted += 1,
                Err(StoreError::NotFound(_)) => {}
                Err(error) => {
                    let unsent = DirtySet {
                        removed: batch.removed.difference(&deleted).copied().collect(),
                        ..DirtySet::default()
                    };
                    return Err((unsent, error));
                }
            }
            deleted.insert(id);
        }
        Ok(())
    }

    /// Run the debounce timer until the returned task is aborted.
    pub fn spawn_timer(self: &Arc<Self>) -> JoinHandle<()> {
        let autosave = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let deadline = *autosave.deadline();
                match deadline {
                    None => autosave.wake.notified().await,
                    Some(at) => {
                        tokio::select! {
                            _ = tokio::time::sleep_until(at) => {
                                let due = {
                                    let mut deadline = autosave.deadline();
                                    match *deadline {
                                        Some(d) if d <= Instant::now() => {
                                            *deadline = None;
                                            true
                                        }
                                        _ => false,
                                    }
                                };
                                if due {
                                    // Failures are logged and re-queued by flush.
                                    let _ = autosave.flush().await;
                                }
                            }
                            _ = autosave.wake.notified() => {}
                        }
                    }
                }
            }
        })
    }
}
