//! Shared harness for engine-level tests
//!
//! [`ScriptedTransport`] hands out one scripted connection per connect
//! call, in order. Once the scripts run out every connect fails
//! immediately, which is what a server that is down looks like.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use folio_client::model::{CachePartition, EventKind, JobFailure};
use folio_client::{
    CacheInvalidator, ClientConfig, Endpoint, JobEngine, Transport,
    TransportEvent,
};
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Server side of one scripted connection.
#[derive(Debug, Clone)]
pub struct ScriptedConnection {
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl ScriptedConnection {
    pub fn open(&self) {
        let _ = self.tx.send(TransportEvent::Open);
    }

    pub fn raw(&self, frame: &str) {
        let _ = self.tx.send(TransportEvent::Message(frame.to_owned()));
    }

    pub fn send(&self, kind: EventKind, data: Value) {
        self.raw(&json!({ "key": kind.as_str(), "data": data }).to_string());
    }

    pub fn fail(&self, reason: &str) {
        let _ = self.tx.send(TransportEvent::Error(reason.to_owned()));
    }
}

#[derive(Debug, Default)]
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<mpsc::UnboundedReceiver<TransportEvent>>>,
    connects: Mutex<Vec<Instant>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue the next connection. The returned handle drives it.
    pub fn script(&self) -> ScriptedConnection {
        let (tx, rx) = mpsc::unbounded_channel();
        self.scripts.lock().push_back(rx);
        ScriptedConnection { tx }
    }

    /// When each connect call happened.
    pub fn connects(&self) -> Vec<Instant> {
        self.connects.lock().clone()
    }
}

impl Transport for ScriptedTransport {
    fn connect(
        &self,
        _endpoint: &Endpoint,
    ) -> BoxStream<'static, TransportEvent> {
        self.connects.lock().push(Instant::now());
        match self.scripts.lock().pop_front() {
            Some(rx) => stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|event| (event, rx))
            })
            .boxed(),
            None => stream::iter([TransportEvent::Error(
                "connection refused".to_owned(),
            )])
            .boxed(),
        }
    }
}

/// Records every invalidation with the (paused) time it happened.
#[derive(Debug, Default)]
pub struct RecordingInvalidator {
    fired: Mutex<Vec<(CachePartition, Instant)>>,
}

impl RecordingInvalidator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fired(&self) -> Vec<(CachePartition, Instant)> {
        self.fired.lock().clone()
    }

    pub fn count(&self, partition: CachePartition) -> usize {
        self.fired
            .lock()
            .iter()
            .filter(|(fired, _)| *fired == partition)
            .count()
    }
}

impl CacheInvalidator for RecordingInvalidator {
    fn invalidate(&self, partition: CachePartition) {
        self.fired.lock().push((partition, Instant::now()));
    }
}

pub struct Harness {
    pub engine: JobEngine,
    pub transport: Arc<ScriptedTransport>,
    pub invalidations: Arc<RecordingInvalidator>,
    pub failures: Arc<Mutex<Vec<JobFailure>>>,
}

impl Harness {
    /// Start an engine with one scripted connection queued.
    pub fn start() -> (Self, ScriptedConnection) {
        Self::start_with(ClientConfig::default())
    }

    pub fn start_with(config: ClientConfig) -> (Self, ScriptedConnection) {
        let transport = ScriptedTransport::new();
        let first = transport.script();
        let invalidations = RecordingInvalidator::new();
        let failures = Arc::new(Mutex::new(Vec::new()));

        let recorded = Arc::clone(&failures);
        let engine = JobEngine::builder(ClientConfig {
            server_url: "http://folio.test/api".into(),
            ..config
        })
        .transport(transport.clone())
        .invalidator(invalidations.clone())
        .on_job_failed(move |failure| recorded.lock().push(failure.clone()))
        .start()
        .expect("engine starts");

        let harness = Self {
            engine,
            transport,
            invalidations,
            failures,
        };
        (harness, first)
    }
}

/// Let every spawned task drain its queue.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
