// Live event streaming HTTP route (SSE)
//
// Each connection runs as its own task owning its broker subscription and
// heartbeat timer; the response is fed over a channel, so dropping either
// end tears the whole session down. Resume: a client sends the last
// sequence it saw (Last-Event-ID header or lastEventId query parameter),
// gets the retained tail replayed, and stays subscribed for live events.
// History evicted from the replay buffer is answered with a dedicated
// resync_required event, never a silently truncated replay.

use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event as SseEvent, Sse};
use axum::routing::get;
use axum::Router;
use futures::stream::Stream;
use promptlens_broker::{EventBroker, Replay};
use promptlens_core::{ConnectionStatus, Error, EventFilter, StreamConfig, StreamEvent};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};
use utoipa::IntoParams;

use crate::error::ApiError;
use crate::registry::{ConnectionId, ConnectionRegistry};

/// App state for stream routes
#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<EventBroker>,
    pub registry: Arc<ConnectionRegistry>,
    pub config: StreamConfig,
}

impl AppState {
    pub fn new(broker: Arc<EventBroker>, registry: Arc<ConnectionRegistry>, config: StreamConfig) -> Self {
        Self {
            broker,
            registry,
            config,
        }
    }
}

/// Create stream routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/interactions/stream", get(stream_interactions))
        .with_state(state)
}

/// Query parameters for the stream endpoint
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct StreamQuery {
    /// Sequence of the last event received, for resumption. Equivalent to
    /// the Last-Event-ID header (the header wins when both are present).
    pub last_event_id: Option<String>,
}

/// One outbound SSE frame, kept as plain data until the HTTP edge so the
/// session logic stays testable
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Broker sequence; only frames replaying or delivering stream events carry one
    pub id: Option<u64>,
    pub event: &'static str,
    pub data: String,
    pub retry: Option<Duration>,
}

impl Frame {
    /// Greeting frame carrying the reconnect `retry:` hint
    fn hello(retry_interval: Duration) -> Self {
        Self {
            id: None,
            event: "connected",
            data: "{}".to_string(),
            retry: Some(retry_interval),
        }
    }

    fn from_event(event: &StreamEvent) -> Self {
        Self {
            id: Some(event.sequence),
            event: event.event_type.as_str(),
            data: serde_json::to_string(&event.data).unwrap_or_else(|_| "{}".to_string()),
            retry: None,
        }
    }

    fn heartbeat() -> Self {
        Self {
            id: None,
            event: "heartbeat",
            data: json!({ "time": chrono::Utc::now() }).to_string(),
            retry: None,
        }
    }

    /// Replay history is gone; the client must re-fetch via pagination
    fn resync_required() -> Self {
        Self {
            id: None,
            event: "resync_required",
            data: json!({ "reason": "replay window exceeded" }).to_string(),
            retry: None,
        }
    }

    fn into_sse(self) -> SseEvent {
        let mut sse = SseEvent::default().event(self.event).data(self.data);
        if let Some(id) = self.id {
            sse = sse.id(id.to_string());
        }
        if let Some(retry) = self.retry {
            sse = sse.retry(retry);
        }
        sse
    }
}

/// GET /v1/interactions/stream - Live interaction events (SSE)
///
/// Supports resumption: provide the last seen sequence via the
/// Last-Event-ID header or `?lastEventId=N`. Buffered events newer than it
/// are replayed before live delivery begins; if they have already been
/// evicted, a `resync_required` event is sent instead.
#[utoipa::path(
    get,
    path = "/v1/interactions/stream",
    params(StreamQuery),
    responses(
        (status = 200, description = "Event stream", content_type = "text/event-stream"),
        (status = 400, description = "Malformed last event id", body = crate::error::ErrorBody),
        (status = 429, description = "Per-IP connection limit reached", body = crate::error::ErrorBody)
    ),
    tag = "stream"
)]
pub async fn stream_interactions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<StreamQuery>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let ip = connect_info
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    let last_event_id = parse_last_event_id(&headers, &query)?;

    let (connection_id, shutdown) = state
        .registry
        .register(ip)
        .ok_or_else(|| {
            warn!(%ip, "refusing connection: per-IP limit reached");
            ApiError::too_many_connections()
        })?;

    info!(
        connection_id = %connection_id,
        %ip,
        last_event_id,
        status = ?ConnectionStatus::Connecting,
        "stream opened"
    );

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(run_session(SessionParams {
        broker: state.broker.clone(),
        registry: state.registry.clone(),
        connection_id,
        shutdown,
        last_event_id,
        heartbeat_interval: state.config.heartbeat_interval,
        retry_interval: state.config.retry_interval,
        tx,
    }));

    let stream = UnboundedReceiverStream::new(rx).map(|frame: Frame| Ok(frame.into_sse()));
    Ok(Sse::new(stream))
}

/// Resolve the resume position from header or query parameter
fn parse_last_event_id(headers: &HeaderMap, query: &StreamQuery) -> Result<Option<u64>, ApiError> {
    let raw = match headers.get("last-event-id") {
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| Error::validation("Last-Event-ID header is not valid text"))?
                .to_string(),
        ),
        None => query.last_event_id.clone(),
    };
    match raw {
        None => Ok(None),
        Some(s) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| Error::validation(format!("last event id must be an integer, got {s:?}")).into()),
    }
}

struct SessionParams {
    broker: Arc<EventBroker>,
    registry: Arc<ConnectionRegistry>,
    connection_id: ConnectionId,
    shutdown: watch::Receiver<bool>,
    last_event_id: Option<u64>,
    heartbeat_interval: Duration,
    retry_interval: Duration,
    tx: mpsc::UnboundedSender<Frame>,
}

/// Per-connection session: replay, then live events interleaved with
/// heartbeats, until the client goes away or the registry says stop.
///
/// All resources are owned here - the subscription guard, the heartbeat
/// timer, the outbound channel - so returning from this function is the
/// complete teardown. Unregistration is idempotent; the sweep may have
/// removed the entry already.
async fn run_session(params: SessionParams) {
    let SessionParams {
        broker,
        registry,
        connection_id,
        mut shutdown,
        last_event_id,
        heartbeat_interval,
        retry_interval,
        tx,
    } = params;

    // Subscribe before replaying so nothing published in between is lost;
    // the sequence bookkeeping below drops any overlap.
    let (subscription, mut live) = broker.subscribe(EventFilter::All);
    debug!(
        connection_id = %connection_id,
        status = ?ConnectionStatus::Connected,
        "session started"
    );

    let mut last_sent: u64 = 0;
    let mut connected = tx.send(Frame::hello(retry_interval)).is_ok();

    if connected {
        if let Some(seq) = last_event_id {
            match broker.events_since(seq) {
                Replay::Gap => {
                    warn!(
                        connection_id = %connection_id,
                        last_event_id = seq,
                        "resume position outside replay window, resync required"
                    );
                    connected = tx.send(Frame::resync_required()).is_ok();
                }
                Replay::Events(events) => {
                    last_sent = seq;
                    for event in &events {
                        last_sent = event.sequence;
                        if tx.send(Frame::from_event(event)).is_err() {
                            connected = false;
                            break;
                        }
                    }
                    debug!(
                        connection_id = %connection_id,
                        replayed = events.len(),
                        "replay complete"
                    );
                }
            }
        }
    }

    let mut heartbeat = tokio::time::interval(heartbeat_interval);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick of an interval fires immediately; swallow it so the
    // heartbeat cadence starts one full interval from now.
    heartbeat.tick().await;

    while connected {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!(connection_id = %connection_id, "session force-disconnected");
                    break;
                }
            }
            maybe_event = live.recv() => {
                match maybe_event {
                    None => break,
                    Some(event) => {
                        // Already delivered during replay
                        if event.sequence <= last_sent {
                            continue;
                        }
                        last_sent = event.sequence;
                        if tx.send(Frame::from_event(&event)).is_err() {
                            debug!(
                                connection_id = %connection_id,
                                status = ?ConnectionStatus::Error,
                                "client receiver closed during delivery"
                            );
                            break;
                        }
                    }
                }
            }
            _ = heartbeat.tick() => {
                if tx.send(Frame::heartbeat()).is_err() {
                    break;
                }
                registry.touch(&connection_id);
            }
        }
    }

    drop(subscription);
    registry.unregister(&connection_id);
    debug!(
        connection_id = %connection_id,
        status = ?ConnectionStatus::Disconnected,
        "session closed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptlens_core::StreamEventType;
    use std::time::Instant;
    use tokio::time::timeout;

    const RECV_TIMEOUT: Duration = Duration::from_secs(2);

    struct Harness {
        broker: Arc<EventBroker>,
        registry: Arc<ConnectionRegistry>,
        rx: mpsc::UnboundedReceiver<Frame>,
    }

    fn spawn_session(
        broker: Arc<EventBroker>,
        registry: Arc<ConnectionRegistry>,
        last_event_id: Option<u64>,
        heartbeat_interval: Duration,
    ) -> Harness {
        let (connection_id, shutdown) = registry
            .register(IpAddr::from([127, 0, 0, 1]))
            .expect("registration succeeds");
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_session(SessionParams {
            broker: broker.clone(),
            registry: registry.clone(),
            connection_id,
            shutdown,
            last_event_id,
            heartbeat_interval,
            retry_interval: Duration::from_millis(3000),
            tx,
        }));
        Harness {
            broker,
            registry,
            rx,
        }
    }

    async fn next_frame(rx: &mut mpsc::UnboundedReceiver<Frame>) -> Frame {
        timeout(RECV_TIMEOUT, rx.recv())
            .await
            .expect("frame before timeout")
            .expect("channel open")
    }

    fn broker_with(published: u64, capacity: usize) -> Arc<EventBroker> {
        let broker = Arc::new(EventBroker::new(capacity));
        for i in 1..=published {
            broker.publish(StreamEventType::InteractionCreated, json!({ "n": i }));
        }
        broker
    }

    fn registry() -> Arc<ConnectionRegistry> {
        Arc::new(ConnectionRegistry::new(10, Duration::from_secs(60)))
    }

    #[tokio::test]
    async fn test_hello_frame_carries_retry_hint() {
        let mut h = spawn_session(broker_with(0, 16), registry(), None, Duration::from_secs(60));
        let hello = next_frame(&mut h.rx).await;
        assert_eq!(hello.event, "connected");
        assert_eq!(hello.retry, Some(Duration::from_millis(3000)));
        assert_eq!(hello.id, None);
    }

    #[tokio::test]
    async fn test_replay_then_live() {
        let mut h = spawn_session(
            broker_with(3, 16),
            registry(),
            Some(1),
            Duration::from_secs(60),
        );

        assert_eq!(next_frame(&mut h.rx).await.event, "connected");
        assert_eq!(next_frame(&mut h.rx).await.id, Some(2));
        assert_eq!(next_frame(&mut h.rx).await.id, Some(3));

        let published = h
            .broker
            .publish(StreamEventType::InteractionCompleted, json!({ "n": 4 }));
        let live = next_frame(&mut h.rx).await;
        assert_eq!(live.id, Some(published.sequence));
        assert_eq!(live.event, "interaction_completed");
    }

    #[tokio::test]
    async fn test_gap_yields_resync_required_then_live_continues() {
        // Capacity 2 with 5 published: sequences 1-3 are gone
        let mut h = spawn_session(
            broker_with(5, 2),
            registry(),
            Some(1),
            Duration::from_secs(60),
        );

        assert_eq!(next_frame(&mut h.rx).await.event, "connected");
        let resync = next_frame(&mut h.rx).await;
        assert_eq!(resync.event, "resync_required");
        assert_eq!(resync.id, None);

        let published = h
            .broker
            .publish(StreamEventType::InteractionCreated, json!({}));
        assert_eq!(next_frame(&mut h.rx).await.id, Some(published.sequence));
    }

    #[tokio::test]
    async fn test_no_replay_without_resume_position() {
        let mut h = spawn_session(broker_with(3, 16), registry(), None, Duration::from_secs(60));
        assert_eq!(next_frame(&mut h.rx).await.event, "connected");

        // Nothing replayed; only a fresh publish comes through
        let published = h
            .broker
            .publish(StreamEventType::InteractionCreated, json!({}));
        let frame = next_frame(&mut h.rx).await;
        assert_eq!(frame.id, Some(published.sequence));
    }

    #[tokio::test]
    async fn test_heartbeats_flow_independent_of_traffic() {
        let mut h = spawn_session(broker_with(0, 16), registry(), None, Duration::from_millis(20));
        assert_eq!(next_frame(&mut h.rx).await.event, "connected");

        let first = next_frame(&mut h.rx).await;
        let second = next_frame(&mut h.rx).await;
        assert_eq!(first.event, "heartbeat");
        assert_eq!(second.event, "heartbeat");
        assert_eq!(first.id, None);
    }

    #[tokio::test]
    async fn test_forced_disconnect_releases_everything() {
        let registry = registry();
        let broker = broker_with(0, 16);
        let mut h = spawn_session(broker.clone(), registry.clone(), None, Duration::from_millis(20));
        assert_eq!(next_frame(&mut h.rx).await.event, "connected");
        assert_eq!(broker.subscriber_count(), 1);

        // The sweep judges the connection idle and flips its shutdown signal
        let dropped = registry.sweep(Instant::now() + Duration::from_secs(120));
        assert_eq!(dropped, 1);

        // Session ends: channel closes, subscription released, registry empty
        while let Ok(Some(_)) = timeout(RECV_TIMEOUT, h.rx.recv()).await {}
        assert_eq!(broker.subscriber_count(), 0);
        assert!(h.registry.is_empty());
    }

    #[tokio::test]
    async fn test_dropping_the_response_ends_the_session() {
        let registry = registry();
        let broker = broker_with(0, 16);
        let h = spawn_session(broker.clone(), registry.clone(), None, Duration::from_millis(10));

        drop(h.rx);
        // The next heartbeat send fails and the session cleans up
        timeout(RECV_TIMEOUT, async {
            while broker.subscriber_count() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("session cleans up after client drop");
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_connection_cap_answers_429_with_coded_body() {
        use axum::body::Body;
        use axum::http::Request;
        use http_body_util::BodyExt;
        use tower::ServiceExt;

        // Without ConnectInfo every request falls back to the same address,
        // so one slot is enough to saturate the cap
        let state = AppState::new(
            broker_with(0, 16),
            Arc::new(ConnectionRegistry::new(1, Duration::from_secs(120))),
            StreamConfig {
                max_connections_per_ip: 1,
                ..Default::default()
            },
        );
        let app = routes(state);

        let first = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/v1/interactions/stream")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(first.status(), axum::http::StatusCode::OK);

        // Second connection from the same address while the first is open
        let second = app
            .oneshot(
                Request::builder()
                    .uri("/v1/interactions/stream")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(second.status(), axum::http::StatusCode::TOO_MANY_REQUESTS);
        let bytes = second.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert!(body["error"].as_str().unwrap().contains("too many"));
        drop(first);
    }

    #[test]
    fn test_parse_last_event_id_header_wins_over_query() {
        let mut headers = HeaderMap::new();
        headers.insert("last-event-id", "42".parse().unwrap());
        let query = StreamQuery {
            last_event_id: Some("7".to_string()),
        };
        assert_eq!(parse_last_event_id(&headers, &query).unwrap(), Some(42));
    }

    #[test]
    fn test_parse_last_event_id_falls_back_to_query() {
        let headers = HeaderMap::new();
        let query = StreamQuery {
            last_event_id: Some("7".to_string()),
        };
        assert_eq!(parse_last_event_id(&headers, &query).unwrap(), Some(7));
        assert_eq!(
            parse_last_event_id(&headers, &StreamQuery::default()).unwrap(),
            None
        );
    }

    #[test]
    fn test_parse_last_event_id_rejects_garbage() {
        let headers = HeaderMap::new();
        let query = StreamQuery {
            last_event_id: Some("not-a-number".to_string()),
        };
        let err = parse_last_event_id(&headers, &query).unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::BAD_REQUEST);
    }
}
