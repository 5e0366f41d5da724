//! Job metrics
//!
//! Counters for queued, running, completed and failed snapshot jobs, with a
//! JSON snapshot for the `/metrics` endpoint.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Point-in-time view of the job pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MetricsSnapshot {
    pub timestamp_unix_ms: i64,
    pub gate_capacity: usize,
    pub available_slots: usize,
    pub queued_jobs: usize,
    pub running_jobs: usize,
    pub peak_running_jobs: usize,
    pub completed_jobs: u64,
    pub failed_jobs: u64,
}

/// Live counters shared by every request
#[derive(Debug, Default)]
pub struct JobMetrics {
    queued: AtomicUsize,
    running: AtomicUsize,
    peak_running: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Shared metrics state for concurrent access across request handlers
pub type SharedMetrics = Arc<JobMetrics>;

/// Creates a new SharedMetrics instance with zeroed counters
pub fn new_shared_metrics() -> SharedMetrics {
    Arc::new(JobMetrics::default())
}

/// Counts a job as queued for as long as it is held
#[derive(Debug)]
pub struct QueuedGuard<'a> {
    metrics: &'a JobMetrics,
}

impl Drop for QueuedGuard<'_> {
    fn drop(&mut self) {
        self.metrics.queued.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Counts a job as running for as long as it is held
#[derive(Debug)]
pub struct RunningGuard<'a> {
    metrics: &'a JobMetrics,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.metrics.running.fetch_sub(1, Ordering::SeqCst);
    }
}

impl JobMetrics {
    /// Mark a job as waiting for the gate
    pub fn enter_queue(&self) -> QueuedGuard<'_> {
        self.queued.fetch_add(1, Ordering::SeqCst);
        QueuedGuard { metrics: self }
    }

    /// Mark a job as executing
    pub fn start_running(&self) -> RunningGuard<'_> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_running.fetch_max(now, Ordering::SeqCst);
        RunningGuard { metrics: self }
    }

    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn peak_running(&self) -> usize {
        self.peak_running.load(Ordering::SeqCst)
    }

    /// Build a snapshot; gate figures come from the caller
    pub fn snapshot(&self, gate_capacity: usize, available_slots: usize) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp_unix_ms: chrono::Utc::now().timestamp_millis(),
            gate_capacity,
            available_slots,
            queued_jobs: self.queued.load(Ordering::SeqCst),
            running_jobs: self.running.load(Ordering::SeqCst),
            peak_running_jobs: self.peak_running.load(Ordering::SeqCst),
            completed_jobs: self.completed.load(Ordering::SeqCst),
            failed_jobs: self.failed.load(Ordering::SeqCst),
        }
    }
}
