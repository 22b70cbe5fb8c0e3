// Streaming client for the dashboard API
//
// Wraps the SSE endpoint in a supervised connection: it reconnects on a
// fixed delay, resumes from the last delivered sequence via Last-Event-ID,
// and surfaces status transitions alongside the events themselves. When the
// server declares the replay window exceeded, the resume position is
// dropped and a resync notice is forwarded so the consumer can re-fetch
// through the paginated API.

use std::time::Duration;

use eventsource_stream::Eventsource;
use futures::StreamExt;
use promptlens_core::ConnectionStatus;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Path of the SSE endpoint relative to the configured base URL
const STREAM_PATH: &str = "/v1/interactions/stream";

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the API, e.g. "http://localhost:9000"
    pub base_url: String,
    /// Fixed delay between reconnection attempts
    pub retry_interval: Duration,
    /// Give up after this many consecutive failed attempts; `None` retries forever
    pub max_reconnect_attempts: Option<u32>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            retry_interval: Duration::from_millis(3000),
            max_reconnect_attempts: None,
        }
    }
}

/// What the consumer receives over the client channel
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// A stream event with its broker sequence and decoded payload
    Event {
        sequence: u64,
        event_type: String,
        data: Value,
    },
    /// Connection lifecycle transition
    Status(ConnectionStatus),
    /// Replay history was evicted server-side; re-fetch via pagination
    ResyncRequired,
}

/// One SSE frame after wire parsing, before routing
#[derive(Debug, Clone, Default)]
struct ParsedFrame {
    name: String,
    id: Option<u64>,
    data: String,
    retry: Option<Duration>,
}

impl From<eventsource_stream::Event> for ParsedFrame {
    fn from(event: eventsource_stream::Event) -> Self {
        Self {
            name: event.event,
            id: event.id.parse().ok(),
            data: event.data,
            retry: event.retry,
        }
    }
}

/// Reconnection bookkeeping: a fixed delay and an attempt budget.
///
/// Attempts count consecutive failures only; a successful connection
/// resets the budget.
#[derive(Debug, Clone)]
struct ReconnectPolicy {
    retry_interval: Duration,
    max_attempts: Option<u32>,
    attempts: u32,
}

impl ReconnectPolicy {
    fn new(retry_interval: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            retry_interval,
            max_attempts,
            attempts: 0,
        }
    }

    /// Delay before the next attempt, or `None` when the budget is spent
    fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max) = self.max_attempts {
            if self.attempts >= max {
                return None;
            }
        }
        self.attempts += 1;
        Some(self.retry_interval)
    }

    fn connected(&mut self) {
        self.attempts = 0;
    }

    /// Honor a server-sent `retry:` hint
    fn set_retry_interval(&mut self, interval: Duration) {
        self.retry_interval = interval;
    }
}

/// Resume position carried across reconnects
#[derive(Debug, Clone, Default)]
struct ResumeState {
    last_event_id: Option<u64>,
}

impl ResumeState {
    fn advance(&mut self, sequence: u64) {
        self.last_event_id = Some(sequence);
    }

    /// Forget the position; the next connect starts live-only
    fn clear(&mut self) {
        self.last_event_id = None;
    }
}

/// What to do with one parsed frame
#[derive(Debug, PartialEq)]
enum Routed {
    Forward(ClientMessage),
    Resync,
    /// Heartbeats and the greeting frame stay internal
    Internal,
}

/// Pure frame routing, shared between the run loop and tests
fn route_frame(frame: &ParsedFrame, resume: &mut ResumeState) -> Routed {
    match frame.name.as_str() {
        "connected" => Routed::Internal,
        "heartbeat" => Routed::Internal,
        "resync_required" => {
            resume.clear();
            Routed::Resync
        }
        _ => {
            let sequence = match frame.id {
                Some(id) => id,
                // A data frame without a sequence cannot be resumed past;
                // drop it rather than corrupt the resume position
                None => return Routed::Internal,
            };
            resume.advance(sequence);
            let data = serde_json::from_str(&frame.data).unwrap_or(Value::Null);
            Routed::Forward(ClientMessage::Event {
                sequence,
                event_type: frame.name.clone(),
                data,
            })
        }
    }
}

/// Handle for an active stream client; dropping it stops the background task
pub struct StreamHandle {
    shutdown: watch::Sender<bool>,
}

impl StreamHandle {
    /// Stop the connection loop. Safe to call more than once.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// Connect to the stream endpoint and supervise the connection until
/// shutdown or the reconnect budget runs out.
///
/// Returns immediately; connection progress is reported as
/// `ClientMessage::Status` values on the channel.
pub fn connect(config: ClientConfig) -> (StreamHandle, mpsc::UnboundedReceiver<ClientMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(run(config, tx, shutdown_rx));
    (
        StreamHandle {
            shutdown: shutdown_tx,
        },
        rx,
    )
}

async fn run(
    config: ClientConfig,
    tx: mpsc::UnboundedSender<ClientMessage>,
    mut shutdown: watch::Receiver<bool>,
) {
    let http = reqwest::Client::new();
    let url = format!("{}{}", config.base_url.trim_end_matches('/'), STREAM_PATH);
    let mut policy = ReconnectPolicy::new(config.retry_interval, config.max_reconnect_attempts);
    let mut resume = ResumeState::default();

    loop {
        if *shutdown.borrow() {
            break;
        }
        if tx.send(ClientMessage::Status(ConnectionStatus::Connecting)).is_err() {
            return;
        }

        match open_stream(&http, &url, &resume).await {
            Ok(response) => {
                policy.connected();
                info!(url = %url, last_event_id = resume.last_event_id, "stream connected");
                if tx.send(ClientMessage::Status(ConnectionStatus::Connected)).is_err() {
                    return;
                }

                let mut events = response.bytes_stream().eventsource();
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                let _ = tx.send(ClientMessage::Status(ConnectionStatus::Disconnected));
                                return;
                            }
                        }
                        next = events.next() => {
                            match next {
                                Some(Ok(event)) => {
                                    let frame = ParsedFrame::from(event);
                                    if let Some(retry) = frame.retry {
                                        policy.set_retry_interval(retry);
                                    }
                                    match route_frame(&frame, &mut resume) {
                                        Routed::Forward(message) => {
                                            if tx.send(message).is_err() {
                                                return;
                                            }
                                        }
                                        Routed::Resync => {
                                            warn!("replay window exceeded, resync required");
                                            if tx.send(ClientMessage::ResyncRequired).is_err() {
                                                return;
                                            }
                                        }
                                        Routed::Internal => {}
                                    }
                                }
                                Some(Err(e)) => {
                                    warn!(error = %e, "stream error, will reconnect");
                                    break;
                                }
                                None => {
                                    debug!("stream ended, will reconnect");
                                    break;
                                }
                            }
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "connection attempt failed");
            }
        }

        if tx.send(ClientMessage::Status(ConnectionStatus::Error)).is_err() {
            return;
        }

        let delay = match policy.next_delay() {
            Some(delay) => delay,
            None => {
                warn!("reconnect budget exhausted, giving up");
                break;
            }
        };
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    let _ = tx.send(ClientMessage::Status(ConnectionStatus::Disconnected));
}

/// Issue the streaming request, resuming from the recorded position
async fn open_stream(
    http: &reqwest::Client,
    url: &str,
    resume: &ResumeState,
) -> anyhow::Result<reqwest::Response> {
    let mut request = http.get(url).header("Accept", "text/event-stream");
    if let Some(id) = resume.last_event_id {
        request = request.header("Last-Event-ID", id.to_string());
    }
    let response = request.send().await?;
    if !response.status().is_success() {
        anyhow::bail!("stream request failed with status {}", response.status());
    }
    Ok(response)
}
