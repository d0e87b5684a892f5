//! Server-sent event subscription for build events.
//!
//! The connection task reads named events, parses them into [`BuildEvent`]s
//! and awaits the [`EventSink`] for each one before reading the next, so
//! events are reconciled strictly in arrival order.
//!
//! Reconnection follows the event stream rules: after the stream ends or
//! fails the task waits the reconnect delay (or the server's `retry:`) and
//! connects again, resending the last event id it saw. A stream that stays
//! silent for longer than the idle timeout counts as failed, since a dead
//! peer may never close the connection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use flowsync_config::{ClientConfig, FlowDef};
use flowsync_events::{BuildEvent, EventError, parse_event};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::http::{check_status, http_client};

/// Receives parsed build events, one at a time.
#[async_trait]
pub trait EventSink: Send + Sync {
  async fn handle(&self, event: BuildEvent);
}

/// Opens build event subscriptions.
#[derive(Debug, Clone)]
pub struct EventStreamClient {
  http: reqwest::Client,
  config: Arc<ClientConfig>,
}

impl EventStreamClient {
  pub fn new(config: Arc<ClientConfig>) -> Result<Self, ClientError> {
    let http = http_client(&config)?;
    Ok(Self { http, config })
  }

  pub fn with_http(config: Arc<ClientConfig>, http: reqwest::Client) -> Self {
    Self { http, config }
  }

  /// Subscribe to the build events of `flow`.
  ///
  /// The connection lives in a spawned task until the returned
  /// [`Subscription`] is closed or dropped.
  pub fn subscribe(&self, flow: &FlowDef, sink: Arc<dyn EventSink>) -> Subscription {
    let flow_identifier = flow.flow_identifier().to_string();
    let url = self.config.events_url(&flow_identifier);
    let cancel = CancellationToken::new();

    let connection = Connection {
      http: self.http.clone(),
      url,
      flow_id: flow.id.clone(),
      sink,
      reconnect_delay: self.config.reconnect_delay(),
      idle_timeout: self.config.idle_timeout(),
      last_event_id: None,
    };
    let handle = tokio::spawn(connection.run(cancel.child_token()));

    Subscription {
      flow_identifier,
      cancel,
      handle: Some(handle),
    }
  }
}

/// An open build event subscription.
///
/// Closing or dropping it cancels the connection task. No event is
/// delivered to the sink once [`Subscription::close`] has returned.
#[derive(Debug)]
pub struct Subscription {
  flow_identifier: String,
  cancel: CancellationToken,
  handle: Option<JoinHandle<()>>,
}

impl Subscription {
  pub fn flow_identifier(&self) -> &str {
    &self.flow_identifier
  }

  pub fn is_closed(&self) -> bool {
    self.cancel.is_cancelled()
      || self
        .handle
        .as_ref()
        .is_none_or(|handle| handle.is_finished())
  }

  /// Cancel the connection and wait for its task to stop.
  pub async fn close(mut self) {
    self.cancel.cancel();

    if let Some(handle) = self.handle.take()
      && let Err(e) = handle.await
      && !e.is_cancelled()
    {
      warn!(flow = %self.flow_identifier, error = %e, "event stream task panicked");
    }

    debug!(flow = %self.flow_identifier, "subscription closed");
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    self.cancel.cancel();
  }
}

struct Connection {
  http: reqwest::Client,
  url: String,
  flow_id: String,
  sink: Arc<dyn EventSink>,
  reconnect_delay: Duration,
  idle_timeout: Option<Duration>,
  last_event_id: Option<String>,
}

impl Connection {
  async fn run(mut self, cancel: CancellationToken) {
    info!(flow_id = %self.flow_id, url = %self.url, "subscribing to build events");

    loop {
      let outcome = tokio::select! {
        _ = cancel.cancelled() => break,
        outcome = self.read_stream() => outcome,
      };

      match outcome {
        Ok(()) => {
          debug!(flow_id = %self.flow_id, "build event stream ended");
        }
        Err(e) => {
          warn!(flow_id = %self.flow_id, error = %e, "build event stream failed");
          let reason = e.to_string();
          tokio::select! {
            _ = cancel.cancelled() => break,
            _ = self.sink.handle(BuildEvent::Disconnected { reason }) => {}
          }
        }
      }

      debug!(
        flow_id = %self.flow_id,
        delay_ms = self.reconnect_delay.as_millis() as u64,
        "reconnecting build event stream"
      );
      tokio::select! {
        _ = cancel.cancelled() => break,
        _ = tokio::time::sleep(self.reconnect_delay) => {}
      }
    }

    debug!(flow_id = %self.flow_id, "build event stream task stopped");
  }

  /// Read one connection until it ends. `Ok` means the server closed cleanly.
  async fn read_stream(&mut self) -> Result<(), ClientError> {
    let mut request = self
      .http
      .get(&self.url)
      .header("accept", "text/event-stream")
      .header("cache-control", "no-cache");
    if let Some(id) = &self.last_event_id {
      request = request.header("last-event-id", id);
    }

    let response = request
      .send()
      .await
      .map_err(|e| ClientError::request(&self.url, e))?;
    let response = check_status(&self.url, response).await?;

    let mut stream = response.bytes_stream().eventsource();
    loop {
      let next = match self.idle_timeout {
        Some(idle) => tokio::time::timeout(idle, stream.next())
          .await
          .map_err(|_| ClientError::Stream {
            url: self.url.clone(),
            message: format!("no event within {}ms", idle.as_millis()),
          })?,
        None => stream.next().await,
      };
      let Some(event) = next else {
        break;
      };

      let event = event.map_err(|e| ClientError::Stream {
        url: self.url.clone(),
        message: e.to_string(),
      })?;

      if !event.id.is_empty() {
        self.last_event_id = Some(event.id.clone());
      }
      if let Some(retry) = event.retry {
        self.reconnect_delay = retry;
      }

      match parse_event(&event.event, &event.data) {
        Ok(parsed) => self.sink.handle(parsed).await,
        Err(EventError::UnknownEvent(name)) => {
          debug!(flow_id = %self.flow_id, event = %name, "ignoring unknown event");
        }
        Err(e) => {
          warn!(flow_id = %self.flow_id, event = %event.event, error = ?e, "skipping malformed event");
        }
      }
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};

  use tokio::io::{AsyncReadExt, AsyncWriteExt};
  use tokio::net::TcpListener;
  use tokio::sync::Mutex;

  #[derive(Default)]
  struct RecordingSink {
    events: Mutex<Vec<BuildEvent>>,
  }

  #[async_trait]
  impl EventSink for RecordingSink {
    async fn handle(&self, event: BuildEvent) {
      self.events.lock().await.push(event);
    }
  }

  fn config(url: String, reconnect_delay_ms: u64) -> Arc<ClientConfig> {
    Arc::new(ClientConfig {
      base_url: url,
      reconnect_delay_ms,
      ..Default::default()
    })
  }

  async fn wait_for<F>(sink: &RecordingSink, mut done: F)
  where
    F: FnMut(&[BuildEvent]) -> bool,
  {
    for _ in 0..200 {
      if done(&sink.events.lock().await) {
        return;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for events");
  }

  #[tokio::test]
  async fn test_stream_parses_named_events_and_skips_noise() {
    let mut server = mockito::Server::new_async().await;
    let body = "event: connected\ndata: {\"flow\":\"f\"}\n\n\
      data: unnamed\n\n\
      event: build_start\ndata: not json\n\n\
      event: surprise\ndata: {}\n\n\
      event: build_start\ndata: {\"id\":\"A\"}\n\n\
      event: heartbeat\ndata: {}\n\n";
    let mock = server
      .mock("GET", "/api/v1/webhook-events/flow-1")
      .with_status(200)
      .with_header("content-type", "text/event-stream")
      .with_body(body)
      .expect_at_least(1)
      .create_async()
      .await;

    let client = EventStreamClient::new(config(server.url(), 60_000)).unwrap();
    let sink = Arc::new(RecordingSink::default());
    let subscription = client.subscribe(&FlowDef::new("flow-1"), sink.clone());

    wait_for(&sink, |events| events.len() >= 3).await;
    subscription.close().await;

    let events = sink.events.lock().await;
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].name(), "connected");
    assert!(matches!(&events[1], BuildEvent::BuildStart(start) if start.id == "A"));
    assert_eq!(events[2], BuildEvent::Heartbeat);
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn test_stream_uses_endpoint_name() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("GET", "/api/v1/webhook-events/my-endpoint")
      .with_status(200)
      .with_header("content-type", "text/event-stream")
      .with_body("event: heartbeat\ndata: {}\n\n")
      .expect_at_least(1)
      .create_async()
      .await;

    let client = EventStreamClient::new(config(server.url(), 60_000)).unwrap();
    let sink = Arc::new(RecordingSink::default());
    let flow = FlowDef::new("flow-1").with_endpoint_name("my-endpoint");
    let subscription = client.subscribe(&flow, sink.clone());
    assert_eq!(subscription.flow_identifier(), "my-endpoint");

    wait_for(&sink, |events| !events.is_empty()).await;
    subscription.close().await;
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn test_failed_connection_reports_disconnect_and_retries() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("GET", "/api/v1/webhook-events/flow-1")
      .with_status(503)
      .expect_at_least(2)
      .create_async()
      .await;

    let client = EventStreamClient::new(config(server.url(), 20)).unwrap();
    let sink = Arc::new(RecordingSink::default());
    let subscription = client.subscribe(&FlowDef::new("flow-1"), sink.clone());

    wait_for(&sink, |events| events.len() >= 2).await;
    subscription.close().await;

    let events = sink.events.lock().await;
    assert!(
      events
        .iter()
        .all(|e| matches!(e, BuildEvent::Disconnected { .. }))
    );
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn test_reconnect_resends_last_event_id() {
    let mut server = mockito::Server::new_async().await;
    let first = server
      .mock("GET", "/api/v1/webhook-events/flow-1")
      .match_header("last-event-id", mockito::Matcher::Missing)
      .with_status(200)
      .with_header("content-type", "text/event-stream")
      .with_body("id: 7\nretry: 10\nevent: build_start\ndata: {\"id\":\"A\"}\n\n")
      .expect(1)
      .create_async()
      .await;
    let resumed = server
      .mock("GET", "/api/v1/webhook-events/flow-1")
      .match_header("last-event-id", "7")
      .with_status(200)
      .with_header("content-type", "text/event-stream")
      .with_body("event: build_start\ndata: {\"id\":\"B\"}\n\n")
      .expect_at_least(1)
      .create_async()
      .await;

    // The server's retry overrides the long configured delay.
    let client = EventStreamClient::new(config(server.url(), 60_000)).unwrap();
    let sink = Arc::new(RecordingSink::default());
    let subscription = client.subscribe(&FlowDef::new("flow-1"), sink.clone());

    wait_for(&sink, |events| {
      events
        .iter()
        .any(|e| matches!(e, BuildEvent::BuildStart(start) if start.id == "B"))
    })
    .await;
    subscription.close().await;

    first.assert_async().await;
    resumed.assert_async().await;
  }

  /// Answers every connection with `body` as the first chunk of an event
  /// stream, then keeps the socket open without sending anything else.
  async fn stalling_server(body: &'static str) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let accepted = Arc::new(AtomicUsize::new(0));
    let count = accepted.clone();

    tokio::spawn(async move {
      let mut open = Vec::new();
      while let Ok((mut socket, _)) = listener.accept().await {
        count.fetch_add(1, Ordering::SeqCst);
        let mut request = [0u8; 4096];
        let _ = socket.read(&mut request).await;

        let head = "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n";
        let chunk = format!("{:x}\r\n{}\r\n", body.len(), body);
        let _ = socket.write_all(head.as_bytes()).await;
        let _ = socket.write_all(chunk.as_bytes()).await;
        open.push(socket);
      }
    });

    (url, accepted)
  }

  #[tokio::test]
  async fn test_silent_stream_times_out_and_reconnects() {
    let (url, accepted) = stalling_server("event: heartbeat\ndata: {}\n\n").await;
    let config = Arc::new(ClientConfig {
      base_url: url,
      reconnect_delay_ms: 20,
      idle_timeout_ms: 100,
      ..Default::default()
    });

    let client = EventStreamClient::new(config).unwrap();
    let sink = Arc::new(RecordingSink::default());
    let subscription = client.subscribe(&FlowDef::new("flow-1"), sink.clone());

    wait_for(&sink, |events| {
      events.iter().any(|e| {
        matches!(e, BuildEvent::Disconnected { reason } if reason.contains("no event within 100ms"))
      })
    })
    .await;
    wait_for(&sink, |events| {
      events.iter().filter(|e| **e == BuildEvent::Heartbeat).count() >= 2
    })
    .await;
    subscription.close().await;

    assert!(accepted.load(Ordering::SeqCst) >= 2);
    assert_eq!(sink.events.lock().await[0], BuildEvent::Heartbeat);
  }

  #[tokio::test]
  async fn test_dropping_subscription_cancels_task() {
    let server = mockito::Server::new_async().await;
    let client = EventStreamClient::new(config(server.url(), 60_000)).unwrap();
    let sink = Arc::new(RecordingSink::default());

    let subscription = client.subscribe(&FlowDef::new("flow-1"), sink);
    assert!(!subscription.is_closed());
    let cancel = subscription.cancel.clone();
    drop(subscription);

    assert!(cancel.is_cancelled());
  }
}
