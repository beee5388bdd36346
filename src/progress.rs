//! Run state shared between the orchestrator and whoever is watching it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use serde::Serialize;

use crate::models::{ProgressState, RunStatus};

/// Receives per-job progress from the orchestrator
pub trait ProgressSink: Send + Sync {
    fn update(&self, processed: usize, total: usize, task: &str);
}

#[derive(Debug, Default)]
struct TrackerInner {
    state: ProgressState,
    started_at: Option<Instant>,
}

/// Progress of the current run with a linear ETA estimate
#[derive(Debug, Default)]
pub struct ProgressTracker {
    inner: Mutex<TrackerInner>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TrackerInner> {
        // State is replaced wholesale, so a poisoned lock still holds a valid snapshot
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Back to idle and restart the ETA clock
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = ProgressState::default();
        inner.started_at = Some(Instant::now());
    }

    /// Record progress as of `now`
    pub fn update_at(&self, processed: usize, total: usize, task: &str, now: Instant) {
        let mut inner = self.lock();
        let started_at = *inner.started_at.get_or_insert(now);
        let elapsed = now.saturating_duration_since(started_at).as_secs_f64();

        let done = total > 0 && processed >= total;
        let eta_seconds = if done {
            Some(0)
        } else if processed > 0 && total > 0 {
            let remaining = (total - processed) as f64;
            Some((elapsed / processed as f64 * remaining).round() as u64)
        } else {
            None
        };

        inner.state = ProgressState {
            processed,
            total,
            current_task: task.to_string(),
            status: if done { RunStatus::Done } else { RunStatus::Running },
            eta_seconds,
        };
    }

    pub fn snapshot(&self) -> ProgressState {
        self.lock().state.clone()
    }
}

impl ProgressSink for ProgressTracker {
    fn update(&self, processed: usize, total: usize, task: &str) {
        self.update_at(processed, total, task, Instant::now());
    }
}

/// `getStatus()` payload
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct RunStatusReport {
    pub running: bool,
}

/// Owns the single-flight flag and the progress of the active run.
///
/// Create one per process and share it by reference (or `Arc`) between the
/// code that starts runs and the code that reports on them.
#[derive(Debug, Default)]
pub struct RunContext {
    running: AtomicBool,
    progress: ProgressTracker,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the run slot. Returns `None` while another run holds it.
    pub fn try_start(&self) -> Option<RunGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        self.progress.reset();
        Some(RunGuard { ctx: self })
    }

    pub fn status(&self) -> RunStatusReport {
        RunStatusReport {
            running: self.running.load(Ordering::Acquire),
        }
    }

    pub fn progress(&self) -> ProgressState {
        self.progress.snapshot()
    }
}

/// Held for the duration of a run. Dropping it, on success or error,
/// resets progress and frees the run slot.
#[derive(Debug)]
pub struct RunGuard<'a> {
    ctx: &'a RunContext,
}

impl RunGuard<'_> {
    pub fn tracker(&self) -> &ProgressTracker {
        &self.ctx.progress
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.ctx.progress.reset();
        self.ctx.running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_eta_is_linear_in_remaining_jobs() {
        let tracker = ProgressTracker::new();
        let start = Instant::now();
        tracker.update_at(0, 4, "start", start);
        assert_eq!(tracker.snapshot().eta_seconds, None);

        tracker.update_at(1, 4, "olx", start + Duration::from_secs(10));
        let state = tracker.snapshot();
        assert_eq!(state.eta_seconds, Some(30));
        assert_eq!(state.status, RunStatus::Running);
        assert_eq!(state.current_task, "olx");
    }

    #[test]
    fn test_done_when_all_processed() {
        let tracker = ProgressTracker::new();
        let start = Instant::now();
        tracker.update_at(0, 2, "start", start);
        tracker.update_at(2, 2, "Done", start + Duration::from_secs(5));

        let state = tracker.snapshot();
        assert_eq!(state.status, RunStatus::Done);
        assert_eq!(state.eta_seconds, Some(0));
    }

    #[test]
    fn test_zero_total_stays_running_without_eta() {
        let tracker = ProgressTracker::new();
        tracker.update(0, 0, "Done");
        let state = tracker.snapshot();
        assert_eq!(state.status, RunStatus::Running);
        assert_eq!(state.eta_seconds, None);
    }

    #[test]
    fn test_single_flight() {
        let ctx = RunContext::new();
        assert!(!ctx.status().running);

        let guard = ctx.try_start().unwrap();
        assert!(ctx.status().running);
        assert!(ctx.try_start().is_none());

        guard.tracker().update(1, 3, "olx");
        assert_eq!(ctx.progress().processed, 1);

        drop(guard);
        assert!(!ctx.status().running);
        assert_eq!(ctx.progress(), ProgressState::default());
        assert!(ctx.try_start().is_some());
    }
}
