use std::any::type_name_of_val;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::envelope::EventEnvelope;
use super::status::ConnectivityStatus;
use crate::infra::constants::stream;
use crate::infra::transport::{Endpoint, Transport, TransportEvent};

/// What subscribers of a [`ConnectionManager`] receive, in transport order.
#[derive(Debug, Clone)]
pub enum StreamSignal {
    Opened,
    /// The connection dropped; a reconnect is already scheduled.
    Closed,
    Envelope(Arc<EventEnvelope>),
}

type Subscribers = Arc<Mutex<Vec<mpsc::UnboundedSender<StreamSignal>>>>;

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Keeps one event stream connection alive for as long as it is started.
///
/// There is always either an open connection or a pending attempt to open
/// one. Retries happen after a fixed delay, forever, until [`stop`] is
/// called. Every decoded envelope is delivered to every subscriber.
///
/// [`stop`]: ConnectionManager::stop
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    endpoint: Endpoint,
    reconnect_delay: Duration,
    status: ConnectivityStatus,
    subscribers: Subscribers,
    running: Mutex<Option<Running>>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("transport", &type_name_of_val(self.transport.as_ref()))
            .field("endpoint", &self.endpoint)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("status", &self.status.current())
            .field("subscribers", &self.subscribers.lock().len())
            .field("running", &self.is_running())
            .finish()
    }
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn Transport>, endpoint: Endpoint) -> Self {
        Self {
            transport,
            endpoint,
            reconnect_delay: stream::RECONNECT_DELAY,
            status: ConnectivityStatus::new(),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            running: Mutex::new(None),
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn status(&self) -> ConnectivityStatus {
        self.status.clone()
    }

    /// Register a consumer. Subscribers that drop their receiver are pruned
    /// on the next delivery.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<StreamSignal> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|running| !running.task.is_finished())
    }

    /// Start the connection loop. Calling this while already running does
    /// nothing. Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut running = self.running.lock();
        if running
            .as_ref()
            .is_some_and(|running| !running.task.is_finished())
        {
            log::debug!("Event stream to {} already running", self.endpoint);
            return;
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(connection_loop(
            ConnectionLoop {
                transport: Arc::clone(&self.transport),
                endpoint: self.endpoint.clone(),
                reconnect_delay: self.reconnect_delay,
                status: self.status.clone(),
                subscribers: Arc::clone(&self.subscribers),
            },
            cancel.clone(),
        ));

        *running = Some(Running { cancel, task });
    }

    /// Close the connection and cancel any pending reconnect.
    ///
    /// Returns once the loop has exited; no reconnect fires afterwards.
    pub async fn stop(&self) {
        let Some(Running { cancel, task }) = self.running.lock().take() else {
            return;
        };

        cancel.cancel();
        if let Err(err) = task.await
            && err.is_panic()
        {
            log::error!("Event stream task panicked: {}", err);
        }
        self.status.mark_closed(None);
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.cancel.cancel();
        }
    }
}

struct ConnectionLoop {
    transport: Arc<dyn Transport>,
    endpoint: Endpoint,
    reconnect_delay: Duration,
    status: ConnectivityStatus,
    subscribers: Subscribers,
}

impl ConnectionLoop {
    fn publish(&self, signal: StreamSignal) {
        self.subscribers
            .lock()
            .retain(|subscriber| subscriber.send(signal.clone()).is_ok());
    }

    fn handle_frame(&self, data: &str) {
        if data.is_empty() || data == stream::KEEPALIVE {
            log::debug!("Received event stream keepalive");
            return;
        }

        match EventEnvelope::parse(data) {
            Ok(envelope) => {
                log::debug!("Received {} event", envelope.key);
                self.publish(StreamSignal::Envelope(Arc::new(envelope)));
            }
            Err(err) => {
                log::error!(
                    "Discarding malformed event frame: {} - Data: {}",
                    err,
                    data
                );
            }
        }
    }
}

async fn connection_loop(ctx: ConnectionLoop, cancel: CancellationToken) {
    loop {
        let attempt = ctx.status.begin_attempt();
        log::info!(
            "Opening event stream to {} (attempt #{})",
            ctx.endpoint,
            attempt
        );

        let mut events = ctx.transport.connect(&ctx.endpoint);
        let reason = loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    log::info!("Event stream to {} stopped", ctx.endpoint);
                    return;
                }
                event = events.next() => event,
            };

            match event {
                Some(TransportEvent::Open) => {
                    log::info!("Event stream connection opened");
                    ctx.status.mark_open();
                    ctx.publish(StreamSignal::Opened);
                }
                Some(TransportEvent::Message(data)) => ctx.handle_frame(&data),
                Some(TransportEvent::Error(err)) => break Some(err),
                None => break None,
            }
        };

        // Dropping the stream closes the transport, even if it already is.
        drop(events);
        match &reason {
            Some(err) => log::error!("Event stream error: {}", err),
            None => log::warn!("Event stream ended"),
        }
        ctx.status.mark_closed(reason);
        ctx.publish(StreamSignal::Closed);

        log::info!(
            "Reconnecting to {} in {:?}",
            ctx.endpoint,
            ctx.reconnect_delay
        );
        tokio::select! {
            _ = cancel.cancelled() => {
                log::info!("Event stream to {} stopped", ctx.endpoint);
                return;
            }
            _ = tokio::time::sleep(ctx.reconnect_delay) => {}
        }
    }
}
