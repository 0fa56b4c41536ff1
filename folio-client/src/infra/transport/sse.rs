use futures::StreamExt;
use futures::stream::{self, BoxStream};
use reqwest_eventsource::{Event, EventSource};

use super::{Endpoint, Transport, TransportEvent};

/// Server-sent events transport backed by `reqwest-eventsource`.
#[derive(Debug, Clone, Default)]
pub struct SseTransport {
    client: reqwest::Client,
}

impl SseTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for SseTransport {
    fn connect(
        &self,
        endpoint: &Endpoint,
    ) -> BoxStream<'static, TransportEvent> {
        let mut request = self.client.get(endpoint.url().clone());
        if let Some(token) = endpoint.bearer_token() {
            request = request.bearer_auth(token);
        }

        let event_source = match EventSource::new(request) {
            Ok(event_source) => event_source,
            Err(err) => {
                return stream::iter([TransportEvent::Error(err.to_string())])
                    .boxed();
            }
        };

        stream::unfold(Some(event_source), |state| async move {
            let mut event_source = state?;
            match event_source.next().await {
                Some(Ok(Event::Open)) => {
                    Some((TransportEvent::Open, Some(event_source)))
                }
                Some(Ok(Event::Message(msg))) => {
                    Some((TransportEvent::Message(msg.data), Some(event_source)))
                }
                Some(Err(err)) => {
                    // The event source would otherwise retry by itself.
                    event_source.close();
                    Some((TransportEvent::Error(err.to_string()), None))
                }
                None => None,
            }
        })
        .boxed()
    }
}
