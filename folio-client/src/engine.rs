//! Job engine lifecycle
//!
//! A [`JobEngine`] owns everything the job subsystem needs: the event
//! stream connection, the single reducer task that writes the job ledger,
//! and the invalidation dispatcher. Build one with [`JobEngine::builder`],
//! hand its read-only views to whichever UI region needs them, and call
//! [`JobEngine::dispose`] when that region goes away.

use std::any::type_name_of_val;
use std::fmt;
use std::sync::Arc;

use folio_model::JobFailure;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::domains::connection::{
    ConnectionManager, ConnectivityStatus, StreamSignal,
};
use crate::domains::invalidation::{
    CacheInvalidator, InvalidationDispatcher, LogInvalidator,
};
use crate::domains::jobs::{
    FailureCallback, JobLedger, JobReducer, JobsHandle,
};
use crate::error::Result;
use crate::infra::config::ClientConfig;
use crate::infra::transport::{SseTransport, Transport};

pub struct JobEngineBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    invalidator: Option<Arc<dyn CacheInvalidator>>,
    on_job_failed: Option<FailureCallback>,
}

impl fmt::Debug for JobEngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobEngineBuilder")
            .field("config", &self.config)
            .field(
                "transport",
                &self.transport.as_ref().map(|t| type_name_of_val(t.as_ref())),
            )
            .field(
                "invalidator",
                &self
                    .invalidator
                    .as_ref()
                    .map(|sink| type_name_of_val(sink.as_ref())),
            )
            .field("on_job_failed", &self.on_job_failed.is_some())
            .finish()
    }
}

impl JobEngineBuilder {
    /// Defaults to [`SseTransport`] when unset.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Defaults to [`LogInvalidator`] when unset.
    pub fn invalidator(
        mut self,
        invalidator: Arc<dyn CacheInvalidator>,
    ) -> Self {
        self.invalidator = Some(invalidator);
        self
    }

    /// Called once for every `JobFailed` event, after the job has been
    /// removed from the ledger.
    pub fn on_job_failed<F>(mut self, callback: F) -> Self
    where
        F: Fn(&JobFailure) + Send + Sync + 'static,
    {
        self.on_job_failed = Some(Arc::new(callback));
        self
    }

    /// Validate the config, spawn the engine tasks and open the stream.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> Result<JobEngine> {
        let Self {
            config,
            transport,
            invalidator,
            on_job_failed,
        } = self;

        config.validate()?;
        let endpoint = config.endpoint()?;
        let transport = transport
            .unwrap_or_else(|| Arc::new(SseTransport::default()));
        let invalidator =
            invalidator.unwrap_or_else(|| Arc::new(LogInvalidator));

        let cancel = CancellationToken::new();
        let connection = ConnectionManager::new(transport, endpoint)
            .with_reconnect_delay(config.reconnect_delay());

        let reducer = JobReducer::new(
            JobLedger::new(config.progress_sampling, config.duplicate_start),
            config.completion_grace(),
            on_job_failed,
        );
        let jobs = reducer.handle();

        let (invalidation, dispatch_task) = InvalidationDispatcher::spawn(
            invalidator,
            config.invalidation,
            cancel.child_token(),
        );

        // Subscribe before the stream opens so no frame is missed.
        let reducer_task = tokio::spawn(
            reducer.run(connection.subscribe(), cancel.child_token()),
        );
        let follow_task =
            invalidation.follow(connection.subscribe(), cancel.child_token());

        log::info!("Starting job engine against {}", connection.endpoint());
        connection.start();

        Ok(JobEngine {
            config,
            connection,
            jobs,
            invalidation,
            cancel,
            tasks: vec![reducer_task, follow_task, dispatch_task],
        })
    }
}

/// Running job subsystem. Dropping it cancels every task it spawned;
/// [`JobEngine::dispose`] additionally waits for them to finish.
pub struct JobEngine {
    config: ClientConfig,
    connection: ConnectionManager,
    jobs: JobsHandle,
    invalidation: InvalidationDispatcher,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl fmt::Debug for JobEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobEngine")
            .field("connection", &self.connection)
            .field("jobs", &self.jobs.snapshot().len())
            .field("cancelled", &self.cancel.is_cancelled())
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

impl JobEngine {
    pub fn builder(config: ClientConfig) -> JobEngineBuilder {
        JobEngineBuilder {
            config,
            transport: None,
            invalidator: None,
            on_job_failed: None,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn jobs(&self) -> JobsHandle {
        self.jobs.clone()
    }

    pub fn connectivity(&self) -> ConnectivityStatus {
        self.connection.status()
    }

    pub fn invalidation(&self) -> &InvalidationDispatcher {
        &self.invalidation
    }

    /// Raw stream signals, for consumers outside the job subsystem.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<StreamSignal> {
        self.connection.subscribe()
    }

    /// Close the stream, cancel the reconnect timer, pending grace removals
    /// and pending invalidations, then wait for every task to exit.
    pub async fn dispose(mut self) {
        log::info!("Disposing job engine");
        self.connection.stop().await;
        self.cancel.cancel();

        for task in std::mem::take(&mut self.tasks) {
            if let Err(err) = task.await
                && err.is_panic()
            {
                log::error!("Job engine task panicked: {}", err);
            }
        }
    }
}

impl Drop for JobEngine {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
