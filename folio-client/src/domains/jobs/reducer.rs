use std::sync::Arc;
use std::time::Duration;

use folio_model::{JobFailure, RunnerId, ServerEvent};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::time::DelayQueue;

use super::ledger::{JobLedger, JobsHandle, ProgressOutcome};
use crate::domains::connection::{EventEnvelope, StreamSignal};

/// Called once per `JobFailed` event with the server's failure payload.
pub type FailureCallback = Arc<dyn Fn(&JobFailure) + Send + Sync>;

/// Sole writer of the job ledger.
///
/// Stream signals are applied strictly in arrival order. Completed jobs are
/// removed after the grace delay by the same loop, so the ledger is never
/// touched from more than one place.
pub(crate) struct JobReducer {
    ledger: JobLedger,
    grace: Duration,
    on_failed: Option<FailureCallback>,
    expiries: DelayQueue<(RunnerId, u64)>,
}

impl JobReducer {
    pub(crate) fn new(
        ledger: JobLedger,
        grace: Duration,
        on_failed: Option<FailureCallback>,
    ) -> Self {
        Self {
            ledger,
            grace,
            on_failed,
            expiries: DelayQueue::new(),
        }
    }

    pub(crate) fn handle(&self) -> JobsHandle {
        self.ledger.handle()
    }

    /// Runs until cancelled or the signal source goes away. Pending grace
    /// removals are dropped on exit.
    pub(crate) async fn run(
        mut self,
        mut signals: mpsc::UnboundedReceiver<StreamSignal>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                signal = signals.recv() => match signal {
                    Some(signal) => self.handle_signal(signal),
                    None => break,
                },
                Some(expired) = self.expiries.next(),
                    if !self.expiries.is_empty() =>
                {
                    let (runner_id, occurrence) = expired.into_inner();
                    if self.ledger.remove_completed(&runner_id, occurrence) {
                        log::debug!("Removed completed job {}", runner_id);
                    }
                }
            }
        }

        log::debug!(
            "Job reducer stopped with {} pending removal(s)",
            self.expiries.len()
        );
    }

    fn handle_signal(&mut self, signal: StreamSignal) {
        match signal {
            StreamSignal::Envelope(envelope) => self.handle_envelope(&envelope),
            StreamSignal::Opened => log::debug!("Job stream opened"),
            StreamSignal::Closed => log::debug!(
                "Job stream closed, keeping {} job(s) until it reopens",
                self.ledger.len()
            ),
        }
    }

    fn handle_envelope(&mut self, envelope: &EventEnvelope) {
        if !envelope.kind().is_some_and(|kind| kind.is_job_event()) {
            return;
        }

        match envelope.decode() {
            Ok(event) => self.apply(event),
            Err(err) => log::error!(
                "Failed to decode job event: {} - Data: {}",
                err,
                envelope.data
            ),
        }
    }

    fn apply(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::JobStarted(job) => {
                log::info!("Job {} ({}) started", job.runner_id, job.kind);
                self.ledger.add_job(job);
            }
            ServerEvent::JobProgress(update) => {
                let runner_id = update.runner_id.clone();
                if self.ledger.update_job(update) == ProgressOutcome::Ignored {
                    log::debug!(
                        "Ignoring progress for finished job {}",
                        runner_id
                    );
                }
            }
            ServerEvent::JobComplete(runner_id) => {
                match self.ledger.complete_job(&runner_id) {
                    Some(occurrence) => {
                        log::info!("Job {} completed", runner_id);
                        self.expiries
                            .insert((runner_id, occurrence), self.grace);
                    }
                    None => {
                        log::debug!("Completion for unknown job {}", runner_id)
                    }
                }
            }
            ServerEvent::JobFailed(failure) => {
                log::warn!(
                    "Job {} failed: {}",
                    failure.runner_id,
                    failure.message
                );
                self.ledger.fail_job(&failure.runner_id);
                if let Some(on_failed) = &self.on_failed {
                    on_failed(&failure);
                }
            }
            ServerEvent::CreatedMedia
            | ServerEvent::CreatedMediaBatch
            | ServerEvent::CreatedSeries
            | ServerEvent::Unknown { .. } => {}
        }
    }
}
