/// Report job tracking
///
/// Each triggered report gets a random id and moves from `Running` to
/// either `Complete` or `Failed`; a finished job never changes again.
/// Finished jobs are forgotten once they are older than the registry's TTL.

use rand::Rng;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How long a finished job stays queryable
pub const FINISHED_JOB_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportStatus {
    Running,
    Complete { path: PathBuf },
    Failed { reason: String },
}

impl ReportStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, ReportStatus::Running)
    }
}

/// 128 random bits as 32 lowercase hex digits
pub fn new_report_id() -> String {
    let bits: u128 = rand::thread_rng().gen();
    format!("{:032x}", bits)
}

/// Snapshot of the report counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportStats {
    pub triggered: u64,
    pub completed: u64,
    pub failed: u64,
    pub stores_failed: u64,
}

#[derive(Debug, Default)]
pub struct ReportMetrics {
    triggered: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    stores_failed: AtomicU64,
}

impl ReportMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> ReportStats {
        ReportStats {
            triggered: self.triggered.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            stores_failed: self.stores_failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
struct JobEntry {
    status: ReportStatus,
    finished_at: Option<Instant>,
}

/// In-memory job table shared by the HTTP handlers and background tasks
#[derive(Debug)]
pub struct ReportRegistry {
    jobs: Mutex<HashMap<String, JobEntry>>,
    metrics: ReportMetrics,
    ttl: Duration,
}

impl Default for ReportRegistry {
    fn default() -> Self {
        Self::with_ttl(FINISHED_JOB_TTL)
    }
}

impl ReportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            metrics: ReportMetrics::new(),
            ttl,
        }
    }

    /// Register a new running job and return its id.
    ///
    /// Expired finished jobs are evicted first.
    pub fn start(&self) -> String {
        self.prune_at(Instant::now());
        let mut jobs = self.lock();
        let id = loop {
            let candidate = new_report_id();
            if !jobs.contains_key(&candidate) {
                break candidate;
            }
        };
        jobs.insert(
            id.clone(),
            JobEntry {
                status: ReportStatus::Running,
                finished_at: None,
            },
        );
        self.metrics.triggered.fetch_add(1, Ordering::Relaxed);
        debug!("Report {} started", id);
        id
    }

    pub fn complete(&self, id: &str, path: PathBuf, stores_failed: usize) -> bool {
        let updated = self.finish(id, ReportStatus::Complete { path });
        if updated {
            self.metrics.completed.fetch_add(1, Ordering::Relaxed);
            self.metrics
                .stores_failed
                .fetch_add(stores_failed as u64, Ordering::Relaxed);
        }
        updated
    }

    pub fn fail(&self, id: &str, reason: impl Into<String>) -> bool {
        let updated = self.finish(id, ReportStatus::Failed { reason: reason.into() });
        if updated {
            self.metrics.failed.fetch_add(1, Ordering::Relaxed);
        }
        updated
    }

    pub fn status(&self, id: &str) -> Option<ReportStatus> {
        self.lock().get(id).map(|entry| entry.status.clone())
    }

    /// Drop jobs that finished more than the TTL before `now`; running jobs
    /// are always kept. Returns how many were dropped.
    pub fn prune_at(&self, now: Instant) -> usize {
        let mut jobs = self.lock();
        let before = jobs.len();
        jobs.retain(|_, entry| match entry.finished_at {
            Some(at) => now.saturating_duration_since(at) <= self.ttl,
            None => true,
        });
        let dropped = before - jobs.len();
        if dropped > 0 {
            debug!("Evicted {} finished reports", dropped);
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> ReportStats {
        self.metrics.stats()
    }

    /// Only a running job may finish
    fn finish(&self, id: &str, next: ReportStatus) -> bool {
        let mut jobs = self.lock();
        match jobs.get_mut(id) {
            Some(entry) if !entry.status.is_finished() => {
                entry.status = next;
                entry.finished_at = Some(Instant::now());
                true
            }
            Some(_) => {
                warn!("Report {} already finished, ignoring update", id);
                false
            }
            None => {
                warn!("Report {} is unknown, ignoring update", id);
                false
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, JobEntry>> {
        // A panicked holder cannot leave the map half-updated
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}



/// State machine model of the job lifecycle
#[cfg(test)]
mod state_machine {
    use stateright::*;

    #[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
    enum Job {
        Running,
        Complete,
        Failed,
    }

    #[derive(Clone, Debug, Hash, PartialEq)]
    enum Action {
        Trigger,
        Complete(usize),
        Fail(usize),
    }

    #[derive(Clone, Debug, Hash, PartialEq)]
    struct RegistryState {
        jobs: Vec<Job>,
        completed: u64,
        failed: u64,
    }

    struct LifecycleModel {
        max_jobs: usize,
    }

    impl Model for LifecycleModel {
        type State = RegistryState;
        type Action = Action;

        fn init_states(&self) -> Vec<Self::State> {
            vec![RegistryState { jobs: Vec::new(), completed: 0, failed: 0 }]
        }

        fn actions(&self, state: &Self::State, actions: &mut Vec<Self::Action>) {
            if state.jobs.len() < self.max_jobs {
                actions.push(Action::Trigger);
            }
            // Late updates to finished jobs are offered too; they must be no-ops
            for i in 0..state.jobs.len() {
                actions.push(Action::Complete(i));
                actions.push(Action::Fail(i));
            }
        }

        fn next_state(&self, state: &Self::State, action: Self::Action) -> Option<Self::State> {
            let mut next = state.clone();
            match action {
                Action::Trigger => next.jobs.push(Job::Running),
                Action::Complete(i) => {
                    if next.jobs[i] == Job::Running {
                        next.jobs[i] = Job::Complete;
                        next.completed += 1;
                    }
                }
                Action::Fail(i) => {
                    if next.jobs[i] == Job::Running {
                        next.jobs[i] = Job::Failed;
                        next.failed += 1;
                    }
                }
            }
            Some(next)
        }

        fn properties(&self) -> Vec<Property<Self>> {
            vec![
                Property::always("finished_counts_match", |_: &Self, s: &RegistryState| {
                    let done = s.jobs.iter().filter(|j| **j == Job::Complete).count() as u64;
                    let failed = s.jobs.iter().filter(|j| **j == Job::Failed).count() as u64;
                    s.completed == done && s.failed == failed
                }),
                Property::always("never_more_finished_than_triggered", |_: &Self, s: &RegistryState| {
                    s.completed + s.failed <= s.jobs.len() as u64
                }),
                Property::sometimes("can_complete", |_: &Self, s: &RegistryState| s.completed > 0),
                Property::sometimes("can_fail", |_: &Self, s: &RegistryState| s.failed > 0),
                Property::sometimes("can_have_mixed_outcomes", |_: &Self, s: &RegistryState| {
                    s.completed > 0 && s.failed > 0
                }),
            ]
        }
    }

    #[test]
    fn test_job_lifecycle_state_machine() {
        LifecycleModel { max_jobs: 3 }
            .checker()
            .threads(1)
            .spawn_bfs()
            .join()
            .assert_properties();
    }

    #[test]
    fn test_job_lifecycle_explores_states() {
        let checker = LifecycleModel { max_jobs: 2 }.checker().threads(1).spawn_bfs().join();
        assert!(checker.state_count() > 1, "Should explore multiple states");
    }
}
