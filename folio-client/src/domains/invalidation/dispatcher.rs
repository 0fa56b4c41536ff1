use std::collections::HashMap;
use std::sync::Arc;

use folio_model::{CachePartition, PartitionSet};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::time::{DelayQueue, delay_queue};

use super::policy::{InvalidationDelays, InvalidationRequest, invalidation_for};
use super::sink::CacheInvalidator;
use crate::domains::connection::{EventEnvelope, StreamSignal};
use crate::infra::constants::invalidation::MAX_DEBOUNCE_WAIT;

/// Handle to the invalidation loop.
///
/// Requests for a partition that already has a pending invalidation are
/// folded into it instead of queueing a second one, so each partition is
/// invalidated once per burst. A pending invalidation only ever moves
/// later, and never fires before the `not_before` of any request folded
/// into it. A burst can postpone a partition by at most
/// [`MAX_DEBOUNCE_WAIT`] past its first request; requests that would need
/// longer start the next burst once the current one fires.
#[derive(Debug, Clone)]
pub struct InvalidationDispatcher {
    requests: mpsc::UnboundedSender<InvalidationRequest>,
    delays: InvalidationDelays,
}

impl InvalidationDispatcher {
    /// Start the dispatch loop. Pending invalidations are dropped when
    /// `cancel` fires or every handle is gone.
    pub fn spawn(
        sink: Arc<dyn CacheInvalidator>,
        delays: InvalidationDelays,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (requests, rx) = mpsc::unbounded_channel();
        let dispatch = DispatchLoop {
            sink,
            pending: HashMap::new(),
            queue: DelayQueue::new(),
        };
        let task = tokio::spawn(dispatch.run(rx, cancel));
        (Self { requests, delays }, task)
    }

    pub fn delays(&self) -> &InvalidationDelays {
        &self.delays
    }

    /// Schedule whatever invalidation an incoming event calls for.
    pub fn observe(&self, envelope: &EventEnvelope) {
        let Some(kind) = envelope.kind() else {
            log::warn!(
                "Unknown event kind {} - Data: {}",
                envelope.key,
                envelope.data
            );
            return;
        };

        if let Some((partitions, delay)) = invalidation_for(kind, &self.delays)
        {
            log::debug!(
                "{} invalidates {:?} in {:?}",
                kind,
                partitions,
                delay
            );
            self.schedule(InvalidationRequest::after(partitions, delay));
        }
    }

    pub fn schedule(&self, request: InvalidationRequest) {
        if self.requests.send(request).is_err() {
            log::debug!(
                "Invalidation dispatcher stopped, dropping {:?}",
                request.partitions
            );
        }
    }

    pub fn invalidate_now(&self, partitions: PartitionSet) {
        self.schedule(InvalidationRequest::immediate(partitions));
    }

    /// Feed every envelope from a stream subscription into [`observe`].
    ///
    /// [`observe`]: InvalidationDispatcher::observe
    pub fn follow(
        &self,
        mut signals: mpsc::UnboundedReceiver<StreamSignal>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    signal = signals.recv() => match signal {
                        Some(StreamSignal::Envelope(envelope)) => {
                            dispatcher.observe(&envelope)
                        }
                        Some(StreamSignal::Opened | StreamSignal::Closed) => {}
                        None => break,
                    },
                }
            }
        })
    }
}

struct Pending {
    key: delay_queue::Key,
    deadline: Instant,
    first_requested: Instant,
    /// Latest `not_before` that did not fit into this burst.
    deferred: Option<Instant>,
}

impl Pending {
    fn merge(
        &mut self,
        not_before: Instant,
        queue: &mut DelayQueue<CachePartition>,
    ) {
        if not_before <= self.deadline {
            return;
        }

        let latest = self.first_requested + MAX_DEBOUNCE_WAIT;
        if self.deferred.is_none() && not_before <= latest {
            self.deadline = not_before;
            queue.reset_at(&self.key, not_before);
        } else {
            self.deferred = Some(
                self.deferred
                    .map_or(not_before, |deferred| deferred.max(not_before)),
            );
        }
    }
}

struct DispatchLoop {
    sink: Arc<dyn CacheInvalidator>,
    pending: HashMap<CachePartition, Pending>,
    queue: DelayQueue<CachePartition>,
}

impl DispatchLoop {
    async fn run(
        mut self,
        mut requests: mpsc::UnboundedReceiver<InvalidationRequest>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                request = requests.recv() => match request {
                    Some(request) => self.enqueue(request),
                    None => break,
                },
                Some(expired) = self.queue.next(),
                    if !self.queue.is_empty() =>
                {
                    let partition = expired.into_inner();
                    self.fire(partition);
                    if let Some(pending) = self.pending.remove(&partition)
                        && let Some(next) = pending.deferred
                    {
                        self.insert(partition, next, Instant::now());
                    }
                }
            }
        }

        if !self.pending.is_empty() {
            log::debug!(
                "Dropping {} pending invalidation(s) on shutdown",
                self.pending.len()
            );
        }
    }

    fn enqueue(&mut self, request: InvalidationRequest) {
        let now = Instant::now();
        for partition in request.partitions.iter() {
            // Immediate requests leave a later pending deadline in place.
            if request.not_before <= now {
                self.fire(partition);
                continue;
            }

            match self.pending.get_mut(&partition) {
                Some(pending) => {
                    pending.merge(request.not_before, &mut self.queue)
                }
                None => self.insert(partition, request.not_before, now),
            }
        }
    }

    fn insert(
        &mut self,
        partition: CachePartition,
        not_before: Instant,
        now: Instant,
    ) {
        let key = self.queue.insert_at(partition, not_before);
        self.pending.insert(
            partition,
            Pending {
                key,
                deadline: not_before,
                first_requested: now,
                deferred: None,
            },
        );
    }

    fn fire(&self, partition: CachePartition) {
        log::debug!("Invalidating cache partition {}", partition);
        self.sink.invalidate(partition);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_model::EventKind;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;

    type Log = Arc<Mutex<Vec<(CachePartition, Instant)>>>;

    fn start() -> (InvalidationDispatcher, Log, CancellationToken) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let log = Arc::clone(&log);
            move |partition: CachePartition| {
                log.lock().push((partition, Instant::now()))
            }
        };
        let cancel = CancellationToken::new();
        let (dispatcher, _task) = InvalidationDispatcher::spawn(
            Arc::new(sink),
            InvalidationDelays::default(),
            cancel.clone(),
        );
        (dispatcher, log, cancel)
    }

    fn envelope(kind: EventKind) -> EventEnvelope {
        EventEnvelope::new(kind, json!(null))
    }

    fn count(log: &Log, partition: CachePartition) -> usize {
        log.lock().iter().filter(|(p, _)| *p == partition).count()
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_creations_invalidates_once() {
        let (dispatcher, log, _cancel) = start();
        let started = Instant::now();

        dispatcher.observe(&envelope(EventKind::CreatedSeries));
        tokio::time::sleep(Duration::from_millis(100)).await;
        dispatcher.observe(&envelope(EventKind::CreatedSeries));
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(count(&log, CachePartition::Series), 1);
        assert_eq!(count(&log, CachePartition::Library), 1);
        assert_eq!(count(&log, CachePartition::JobHistory), 0);
        let (_, fired_at) = log.lock()[0];
        assert!(fired_at - started >= Duration::from_millis(350));
    }

    #[tokio::test(start_paused = true)]
    async fn completion_waits_then_refreshes_all_partitions() {
        let (dispatcher, log, _cancel) = start();

        dispatcher.observe(&envelope(EventKind::JobComplete));
        tokio::time::sleep(Duration::from_millis(490)).await;
        assert!(log.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(log.lock().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_invalidates_history_without_delay() {
        let (dispatcher, log, _cancel) = start();
        let started = Instant::now();

        dispatcher.observe(&envelope(EventKind::JobFailed));
        tokio::time::sleep(Duration::from_millis(1)).await;

        let entries = log.lock().clone();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, CachePartition::JobHistory);
        assert_eq!(entries[0].1, started);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_and_progress_events_invalidate_nothing() {
        let (dispatcher, log, _cancel) = start();

        dispatcher.observe(&EventEnvelope {
            key: "LibraryScanQueued".into(),
            data: json!({ "id": 1 }),
        });
        dispatcher.observe(&envelope(EventKind::JobProgress));
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(log.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn steady_stream_cannot_postpone_forever() {
        let (dispatcher, log, _cancel) = start();

        for _ in 0..40 {
            dispatcher.observe(&envelope(EventKind::CreatedMedia));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        assert!(count(&log, CachePartition::Library) >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_drops_pending_invalidations() {
        let (dispatcher, log, cancel) = start();

        dispatcher.observe(&envelope(EventKind::JobComplete));
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(log.lock().is_empty());
    }

    fn fired_at(log: &Log, partition: CachePartition) -> Vec<Instant> {
        log.lock()
            .iter()
            .filter(|(p, _)| *p == partition)
            .map(|(_, at)| *at)
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn creation_does_not_pull_completion_forward() {
        let (dispatcher, log, _cancel) = start();
        let started = Instant::now();

        dispatcher.observe(&envelope(EventKind::JobComplete));
        tokio::time::sleep(Duration::from_millis(10)).await;
        dispatcher.observe(&envelope(EventKind::CreatedSeries));
        tokio::time::sleep(Duration::from_secs(2)).await;

        for partition in CachePartition::ALL {
            let fired = fired_at(&log, partition);
            assert_eq!(fired.len(), 1, "{partition}");
            assert!(
                fired[0] - started >= Duration::from_millis(500),
                "{partition} fired after {:?}",
                fired[0] - started
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failure_keeps_pending_completion() {
        let (dispatcher, log, _cancel) = start();
        let started = Instant::now();

        dispatcher.observe(&envelope(EventKind::JobComplete));
        tokio::time::sleep(Duration::from_millis(100)).await;
        let failed_at = Instant::now();
        dispatcher.observe(&envelope(EventKind::JobFailed));
        tokio::time::sleep(Duration::from_secs(2)).await;

        let history = fired_at(&log, CachePartition::JobHistory);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], failed_at);
        assert!(history[1] - started >= Duration::from_millis(500));

        for partition in PartitionSet::CATALOG.iter() {
            let fired = fired_at(&log, partition);
            assert_eq!(fired.len(), 1, "{partition}");
            assert!(fired[0] - started >= Duration::from_millis(500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn request_past_the_debounce_cap_starts_next_burst() {
        let (dispatcher, log, _cancel) = start();
        let library = PartitionSet::from(CachePartition::Library);
        let started = Instant::now();

        dispatcher.schedule(InvalidationRequest::after(
            library,
            Duration::from_millis(1900),
        ));
        tokio::time::sleep(Duration::from_millis(100)).await;
        // Already covered by the pending deadline.
        dispatcher.schedule(InvalidationRequest::after(
            library,
            Duration::from_millis(500),
        ));
        tokio::time::sleep(Duration::from_millis(1700)).await;
        // Would need the burst to run past its cap.
        dispatcher.schedule(InvalidationRequest::after(
            library,
            Duration::from_millis(500),
        ));
        tokio::time::sleep(Duration::from_secs(1)).await;

        let fired = fired_at(&log, CachePartition::Library);
        assert_eq!(fired.len(), 2);
        let first = fired[0] - started;
        assert!(first >= Duration::from_millis(1900));
        assert!(first < MAX_DEBOUNCE_WAIT);
        assert!(fired[1] - started >= Duration::from_millis(2300));
    }
}
