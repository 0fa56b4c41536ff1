//! Keyed store of in-flight jobs
//!
//! The ledger folds job events into at most one record per runner id and
//! publishes an immutable snapshot after every applied change. Readers only
//! ever get [`JobSnapshot`]s through a [`JobsHandle`]; the only way to
//! change the map is through the ledger's own operations.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use folio_model::{Job, JobStatus, JobUpdate, RunnerId};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::sampling::ProgressSampler;

/// What a `JobStarted` does to a runner id that already has a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateStartPolicy {
    /// Replace the record: the start is a new occurrence of the job.
    #[default]
    Restart,
    /// Merge the start into a running record as if it were progress.
    /// Records that already reached a terminal state are still replaced.
    Merge,
}

/// Outcome of feeding one progress event to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressOutcome {
    Applied,
    /// No record existed, so one was synthesized from the update.
    Created,
    /// Dropped by the progress sampler.
    Sampled,
    /// The job already finished; progress no longer applies.
    Ignored,
}

/// Read-only view of every job in the ledger, keyed by runner id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobSnapshot(Arc<BTreeMap<RunnerId, Job>>);

impl JobSnapshot {
    pub fn get(&self, runner_id: &RunnerId) -> Option<&Job> {
        self.0.get(runner_id)
    }

    pub fn contains(&self, runner_id: &RunnerId) -> bool {
        self.0.contains_key(runner_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RunnerId, &Job)> {
        self.0.iter()
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.0.values()
    }

    /// Jobs that are still doing work, i.e. not waiting out a grace delay.
    pub fn running(&self) -> impl Iterator<Item = &Job> {
        self.jobs().filter(|job| job.status == JobStatus::Running)
    }
}

/// Cloneable reader for the ledger's published snapshots.
#[derive(Debug, Clone)]
pub struct JobsHandle {
    receiver: watch::Receiver<JobSnapshot>,
}

impl JobsHandle {
    pub fn snapshot(&self) -> JobSnapshot {
        self.receiver.borrow().clone()
    }

    /// Subscribe to snapshot changes
    pub fn subscribe(&self) -> watch::Receiver<JobSnapshot> {
        self.receiver.clone()
    }
}

#[derive(Debug)]
struct Entry {
    job: Job,
    occurrence: u64,
    progress_seen: u64,
}

#[derive(Debug)]
pub struct JobLedger {
    entries: HashMap<RunnerId, Entry>,
    sampler: ProgressSampler,
    duplicate_start: DuplicateStartPolicy,
    next_occurrence: u64,
    published: watch::Sender<JobSnapshot>,
}

impl Default for JobLedger {
    fn default() -> Self {
        Self::new(ProgressSampler::default(), DuplicateStartPolicy::default())
    }
}

impl JobLedger {
    pub fn new(
        sampler: ProgressSampler,
        duplicate_start: DuplicateStartPolicy,
    ) -> Self {
        let (published, _) = watch::channel(JobSnapshot::default());
        Self {
            entries: HashMap::new(),
            sampler,
            duplicate_start,
            next_occurrence: 0,
            published,
        }
    }

    pub fn handle(&self) -> JobsHandle {
        JobsHandle {
            receiver: self.published.subscribe(),
        }
    }

    pub fn snapshot(&self) -> JobSnapshot {
        self.published.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Occurrence number of the current record for `runner_id`.
    ///
    /// Every insert or replacement gets a fresh number, so delayed work
    /// scheduled for one occurrence can tell it apart from a restart.
    pub fn occurrence(&self, runner_id: &RunnerId) -> Option<u64> {
        self.entries.get(runner_id).map(|entry| entry.occurrence)
    }

    /// Insert a started job.
    ///
    /// An existing terminal record is always replaced. An existing running
    /// record is replaced or merged according to [`DuplicateStartPolicy`].
    /// Returns the occurrence number of the resulting record.
    pub fn add_job(&mut self, job: Job) -> u64 {
        if self.duplicate_start == DuplicateStartPolicy::Merge
            && let Some(entry) = self.entries.get_mut(&job.runner_id)
            && entry.job.status == JobStatus::Running
        {
            entry.job.apply(&JobUpdate {
                runner_id: job.runner_id.clone(),
                kind: Some(job.kind),
                current_task: job.current_task,
                task_count: job.task_count,
                message: job.message,
            });
            let occurrence = entry.occurrence;
            self.publish();
            return occurrence;
        }

        let occurrence = self.bump_occurrence();
        if self.entries.contains_key(&job.runner_id) {
            log::debug!("Job {} restarted", job.runner_id);
        }
        let job = Job {
            status: JobStatus::Running,
            ..job
        };
        self.entries.insert(
            job.runner_id.clone(),
            Entry {
                job,
                occurrence,
                progress_seen: 0,
            },
        );
        self.publish();
        occurrence
    }

    /// Merge a progress fragment into its job, creating the job if this is
    /// the first event seen for it.
    pub fn update_job(&mut self, update: JobUpdate) -> ProgressOutcome {
        let Some(entry) = self.entries.get_mut(&update.runner_id) else {
            let occurrence = self.bump_occurrence();
            log::debug!(
                "Progress for unknown job {}, creating it",
                update.runner_id
            );
            self.entries.insert(
                update.runner_id.clone(),
                Entry {
                    job: Job::from(update),
                    occurrence,
                    progress_seen: 1,
                },
            );
            self.publish();
            return ProgressOutcome::Created;
        };

        if entry.job.status.is_terminal() {
            return ProgressOutcome::Ignored;
        }

        entry.progress_seen += 1;
        let task_count = update.task_count.or(entry.job.task_count);
        if !update.is_final_task(entry.job.task_count)
            && !self.sampler.admits(task_count, entry.progress_seen)
        {
            return ProgressOutcome::Sampled;
        }

        entry.job.apply(&update);
        self.publish();
        ProgressOutcome::Applied
    }

    /// Mark a job completed in place and fill its progress to the known
    /// total. Removal is left to the caller.
    ///
    /// Returns the occurrence that completed, or `None` if the job is
    /// unknown.
    pub fn complete_job(&mut self, runner_id: &RunnerId) -> Option<u64> {
        let entry = self.entries.get_mut(runner_id)?;
        entry.job.status = JobStatus::Completed;
        if let Some(total) = entry.job.task_count {
            entry.job.current_task = Some(total);
        }
        let occurrence = entry.occurrence;
        self.publish();
        Some(occurrence)
    }

    /// Drop a failed job immediately.
    pub fn fail_job(&mut self, runner_id: &RunnerId) -> Option<Job> {
        self.remove_job(runner_id).map(|job| Job {
            status: JobStatus::Failed,
            ..job
        })
    }

    pub fn remove_job(&mut self, runner_id: &RunnerId) -> Option<Job> {
        let entry = self.entries.remove(runner_id)?;
        self.publish();
        Some(entry.job)
    }

    /// Remove a completed job, but only if it is still the same occurrence.
    pub fn remove_completed(
        &mut self,
        runner_id: &RunnerId,
        occurrence: u64,
    ) -> bool {
        let matches = self.entries.get(runner_id).is_some_and(|entry| {
            entry.occurrence == occurrence
                && entry.job.status == JobStatus::Completed
        });
        if matches {
            self.remove_job(runner_id);
        }
        matches
    }

    fn bump_occurrence(&mut self) -> u64 {
        self.next_occurrence += 1;
        self.next_occurrence
    }

    fn publish(&self) {
        let jobs = self
            .entries
            .iter()
            .map(|(id, entry)| (id.clone(), entry.job.clone()))
            .collect();
        self.published.send_replace(JobSnapshot(Arc::new(jobs)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> RunnerId {
        RunnerId::from(raw)
    }

    fn big_job(runner_id: &str, task_count: u64) -> Job {
        Job {
            task_count: Some(task_count),
            ..Job::running(runner_id, "thumbnail_generation")
        }
    }

    #[test]
    fn progress_never_duplicates_a_job() {
        let mut ledger = JobLedger::default();
        ledger.add_job(Job::running("r1", "library_scan"));
        for task in 0..100 {
            ledger.update_job(JobUpdate::new("r1").with_task(task));
        }

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get(&id("r1")).unwrap().current_task, Some(99));
    }

    #[test]
    fn progress_without_start_creates_running_job() {
        let mut ledger = JobLedger::default();
        let outcome = ledger.update_job(
            JobUpdate::new("r7").with_task(3).with_message("Analyzing"),
        );

        assert_eq!(outcome, ProgressOutcome::Created);
        let job = ledger.snapshot().get(&id("r7")).cloned().unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.current_task, Some(3));
    }

    #[test]
    fn restart_replaces_record_with_new_occurrence() {
        let mut ledger = JobLedger::default();
        let first = ledger.add_job(Job::running("r1", "library_scan"));
        ledger.update_job(JobUpdate::new("r1").with_message("halfway"));
        let second = ledger.add_job(Job::running("r1", "library_scan"));

        assert_ne!(first, second);
        let job = ledger.snapshot().get(&id("r1")).cloned().unwrap();
        assert_eq!(job.message, None);
    }

    #[test]
    fn merge_policy_treats_duplicate_start_as_progress() {
        let mut ledger = JobLedger::new(
            ProgressSampler::default(),
            DuplicateStartPolicy::Merge,
        );
        let first = ledger.add_job(Job::running("r1", "library_scan"));
        ledger.update_job(JobUpdate::new("r1").with_message("halfway"));
        let second = ledger.add_job(Job {
            current_task: Some(5),
            ..Job::running("r1", "library_scan")
        });

        assert_eq!(first, second);
        let job = ledger.snapshot().get(&id("r1")).cloned().unwrap();
        assert_eq!(job.message.as_deref(), Some("halfway"));
        assert_eq!(job.current_task, Some(5));
    }

    #[test]
    fn start_after_completion_always_replaces() {
        let mut ledger = JobLedger::new(
            ProgressSampler::default(),
            DuplicateStartPolicy::Merge,
        );
        let first = ledger.add_job(Job::running("r1", "library_scan"));
        ledger.complete_job(&id("r1"));
        let second = ledger.add_job(Job::running("r1", "library_scan"));

        assert_ne!(first, second);
        assert_eq!(
            ledger.snapshot().get(&id("r1")).unwrap().status,
            JobStatus::Running
        );
    }

    #[test]
    fn complete_marks_in_place_and_keeps_record() {
        let mut ledger = JobLedger::default();
        let occurrence = ledger.add_job(big_job("r1", 20));

        assert_eq!(ledger.complete_job(&id("r1")), Some(occurrence));
        let job = ledger.snapshot().get(&id("r1")).cloned().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.current_task, Some(20));
        assert_eq!(ledger.complete_job(&id("missing")), None);
    }

    #[test]
    fn completion_fills_progress_only_when_total_is_known() {
        let mut ledger = JobLedger::default();
        ledger.add_job(big_job("sized", 5000));
        ledger.update_job(JobUpdate::new("sized").with_task(50));
        let mut open_ended = Job::running("open", "thumbnail_generation");
        open_ended.current_task = Some(3);
        ledger.add_job(open_ended);

        ledger.complete_job(&id("sized"));
        ledger.complete_job(&id("open"));

        let snapshot = ledger.snapshot();
        let sized = snapshot.get(&id("sized")).unwrap();
        assert_eq!(
            (sized.current_task, sized.task_count),
            (Some(5000), Some(5000))
        );
        let open = snapshot.get(&id("open")).unwrap();
        assert_eq!((open.current_task, open.task_count), (Some(3), None));
    }

    #[test]
    fn progress_after_completion_is_ignored() {
        let mut ledger = JobLedger::default();
        ledger.add_job(Job::running("r1", "library_scan"));
        ledger.complete_job(&id("r1"));

        assert_eq!(
            ledger.update_job(JobUpdate::new("r1").with_task(1)),
            ProgressOutcome::Ignored
        );
        assert_eq!(
            ledger.snapshot().get(&id("r1")).unwrap().status,
            JobStatus::Completed
        );
    }

    #[test]
    fn removal_of_completed_checks_occurrence() {
        let mut ledger = JobLedger::default();
        let stale = ledger.add_job(Job::running("r1", "library_scan"));
        ledger.complete_job(&id("r1"));
        ledger.add_job(Job::running("r1", "library_scan"));

        assert!(!ledger.remove_completed(&id("r1"), stale));
        assert!(ledger.snapshot().contains(&id("r1")));

        let current = ledger.occurrence(&id("r1")).unwrap();
        ledger.complete_job(&id("r1"));
        assert!(ledger.remove_completed(&id("r1"), current));
        assert!(ledger.is_empty());
    }

    #[test]
    fn failed_job_is_removed_immediately() {
        let mut ledger = JobLedger::default();
        ledger.add_job(Job::running("r2", "library_scan"));

        let failed = ledger.fail_job(&id("r2")).unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert!(ledger.snapshot().is_empty());
        assert!(ledger.fail_job(&id("r2")).is_none());
    }

    #[test]
    fn large_jobs_are_sampled() {
        let mut ledger = JobLedger::default();
        ledger.add_job(big_job("r1", 10_000));

        let outcomes: Vec<_> = (1..=100)
            .map(|task| ledger.update_job(JobUpdate::new("r1").with_task(task)))
            .collect();

        let applied = outcomes
            .iter()
            .filter(|outcome| **outcome == ProgressOutcome::Applied)
            .count();
        assert_eq!(applied, 2);
        assert_eq!(
            ledger.snapshot().get(&id("r1")).unwrap().current_task,
            Some(100)
        );
    }

    #[test]
    fn final_progress_is_never_sampled() {
        let mut ledger = JobLedger::default();
        ledger.add_job(big_job("r1", 5_000));
        ledger.update_job(JobUpdate::new("r1").with_task(4_998));

        let outcome = ledger.update_job(JobUpdate::new("r1").with_task(5_000));
        assert_eq!(outcome, ProgressOutcome::Applied);
    }

    #[test]
    fn handle_observes_published_snapshots() {
        let mut ledger = JobLedger::default();
        let handle = ledger.handle();
        let before = handle.snapshot();

        ledger.add_job(Job::running("r1", "library_scan"));
        assert!(before.is_empty());
        assert_eq!(handle.snapshot().running().count(), 1);
    }
}
