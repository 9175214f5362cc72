//! WebSocket accept path and per-connection read loop.
//!
//! Lifecycle: upgrade → id assignment → middleware chain → hub insert →
//! on_connect → read loop → on_disconnect → hub removal. A failing id
//! extractor or middleware closes the socket with a policy-violation close
//! frame before the hub ever sees the connection.
//!
//! The read loop decodes one JSON frame at a time, gates it through the
//! connection's token bucket, and dispatches to the registered handler on a
//! fresh task. A per-connection semaphore bounds in-flight handlers; when it
//! is full the read side blocks, which doubles as backpressure against
//! floods. All in-flight handler tasks are aborted when the socket closes.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code};
use axum::http::{HeaderMap, Uri, header};
use axum::response::Response;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio::time::Instant;
use uuid::Uuid;

use crate::ws::connection::{ConnId, Connection, OutboundFrame};
use crate::ws::context::EventContext;
use crate::ws::events::{EventHandlerFn, EventRegistry};
use crate::ws::hub::Hub;
use crate::ws::messages::MessageSchema;

/// Outbound frames buffered per connection before emitters feel
/// backpressure.
const OUTBOUND_BUFFER: usize = 64;
/// Default cap on concurrently running handlers per connection.
const DEFAULT_EVENT_SEMAPHORE: usize = 5;
/// Default keepalive ping interval.
const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
/// How long a ping may go unanswered before the connection is closed.
const PING_DEADLINE: Duration = Duration::from_secs(15);

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// The parts of the upgrade request exposed to id extractors and
/// middlewares.
pub struct UpgradeRequest {
    pub headers: HeaderMap,
    pub uri: Uri,
}

/// Produces the connection id from the upgrade request. An `Err` closes the
/// socket with a policy violation.
pub type IdExtractor = Arc<dyn Fn(&UpgradeRequest) -> Result<ConnId, String> + Send + Sync>;

/// Runs after the connection object exists and before it joins the hub. An
/// `Err` closes the socket with a policy violation.
pub type Middleware = Arc<dyn Fn(&Arc<Connection>, &UpgradeRequest) -> Result<(), String> + Send + Sync>;

// ---------------------------------------------------------------------------
// WsHandler
// ---------------------------------------------------------------------------

pub struct WsHandler {
    hub: Arc<Hub>,
    events: Arc<EventRegistry>,

    ider: IdExtractor,
    origin_patterns: Vec<String>,
    middlewares: Vec<Middleware>,

    event_timeout: Option<Duration>,
    event_semaphore: usize,
    keepalive_interval: Option<Duration>,

    on_connect: Option<EventHandlerFn>,
    on_disconnect: Option<EventHandlerFn>,
}

impl WsHandler {
    pub fn new(hub: Arc<Hub>, events: Arc<EventRegistry>) -> Self {
        WsHandler {
            hub,
            events,
            ider: Arc::new(|_req| Ok(Uuid::new_v4())),
            origin_patterns: Vec::new(),
            middlewares: Vec::new(),
            event_timeout: None,
            event_semaphore: DEFAULT_EVENT_SEMAPHORE,
            keepalive_interval: Some(DEFAULT_KEEPALIVE_INTERVAL),
            on_connect: None,
            on_disconnect: None,
        }
    }

    // -----------------------------------------------------------------
    // Builder options
    // -----------------------------------------------------------------

    /// Replace the default random-UUID id extractor, e.g. to bind an
    /// authenticated identity from the request.
    pub fn with_ider(mut self, ider: IdExtractor) -> Self {
        self.ider = ider;
        self
    }

    /// Allowed websocket origins. Empty means same-origin only. `*` inside a
    /// pattern is a wildcard.
    pub fn with_origin_patterns(mut self, patterns: Vec<String>) -> Self {
        self.origin_patterns = patterns;
        self
    }

    /// Append a middleware; middlewares run in registration order.
    pub fn with_middleware(mut self, middleware: Middleware) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Deadline applied to each event handler. Unset means unbounded.
    pub fn with_event_timeout(mut self, timeout: Duration) -> Self {
        self.event_timeout = Some(timeout);
        self
    }

    /// Maximum concurrently running handlers per connection.
    pub fn with_event_semaphore(mut self, permits: usize) -> Self {
        self.event_semaphore = permits.max(1);
        self
    }

    /// Ping period. Zero disables keepalive.
    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = if interval.is_zero() {
            None
        } else {
            Some(interval)
        };
        self
    }

    pub fn with_on_connect<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(EventContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.on_connect = Some(Arc::new(move |ctx| Box::pin(hook(ctx))));
        self
    }

    pub fn with_on_disconnect<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(EventContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.on_disconnect = Some(Arc::new(move |ctx| Box::pin(hook(ctx))));
        self
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    pub fn events(&self) -> &Arc<EventRegistry> {
        &self.events
    }

    // -----------------------------------------------------------------
    // Accept path
    // -----------------------------------------------------------------

    /// Handle an upgrade request; wire this into a route's GET handler.
    pub fn handle(self: &Arc<Self>, ws: WebSocketUpgrade, headers: HeaderMap, uri: Uri) -> Response {
        let req = UpgradeRequest { headers, uri };
        if !self.origin_allowed(&req) {
            tracing::debug!("websocket upgrade rejected: origin not allowed");
            return Response::builder()
                .status(axum::http::StatusCode::FORBIDDEN)
                .body("origin not allowed".into())
                .expect("static response");
        }

        let handler = Arc::clone(self);
        ws.on_upgrade(move |socket| async move {
            handler.run_connection(socket, req).await;
        })
    }

    fn origin_allowed(&self, req: &UpgradeRequest) -> bool {
        // Non-browser clients send no Origin; nothing to restrict.
        let Some(origin) = req
            .headers
            .get(header::ORIGIN)
            .and_then(|value| value.to_str().ok())
        else {
            return true;
        };
        let origin_host = origin.split("://").nth(1).unwrap_or(origin);

        if self.origin_patterns.is_empty() {
            // Same-origin: the Origin host must match the request Host.
            let host = req
                .headers
                .get(header::HOST)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default();
            return origin_host.eq_ignore_ascii_case(host);
        }

        self.origin_patterns
            .iter()
            .any(|pattern| pattern_match(pattern, origin_host))
    }

    // -----------------------------------------------------------------
    // Connection lifecycle
    // -----------------------------------------------------------------

    async fn run_connection(self: Arc<Self>, socket: WebSocket, req: UpgradeRequest) {
        let id = match (self.ider)(&req) {
            Ok(id) => id,
            Err(reason) => {
                close_policy(socket, format!("invalid connection id: {reason}")).await;
                return;
            }
        };

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let conn = Connection::new(id, outbound_tx);

        for middleware in &self.middlewares {
            if let Err(reason) = middleware(&conn, &req) {
                close_policy(socket, format!("middleware error: {reason}")).await;
                return;
            }
        }

        let (sink, mut stream) = socket.split();

        // The writer task owns the sink; everything else writes through the
        // connection's outbound channel.
        let writer = tokio::spawn(write_loop(sink, outbound_rx));

        self.hub.add_conn(Arc::clone(&conn));
        tracing::debug!(conn_id = %conn.id(), "websocket connected");

        let keepalive = self.keepalive_interval.map(|interval| {
            let conn = Arc::clone(&conn);
            tokio::spawn(keepalive_loop(conn, interval))
        });

        if let Some(hook) = &self.on_connect {
            hook(self.context(&conn, None)).await;
        }

        self.read_loop(&mut stream, &conn).await;

        if let Some(hook) = &self.on_disconnect {
            hook(self.context(&conn, None)).await;
        }

        self.hub.remove_conn(&conn);
        conn.close();
        if let Some(task) = keepalive {
            task.abort();
        }
        // Let the writer flush the close frame; abort it if the peer stalls.
        let writer_abort = writer.abort_handle();
        if tokio::time::timeout(Duration::from_secs(5), writer)
            .await
            .is_err()
        {
            writer_abort.abort();
        }
        tracing::debug!(conn_id = %conn.id(), "websocket disconnected");
    }

    /// Read frames until the socket closes or the connection is closed from
    /// our side.
    async fn read_loop(&self, stream: &mut SplitStream<WebSocket>, conn: &Arc<Connection>) {
        let semaphore = Arc::new(Semaphore::new(self.event_semaphore));
        let mut in_flight: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                _ = conn.wait_closed() => break,
                incoming = stream.next() => {
                    let Some(Ok(message)) = incoming else { break };
                    match message {
                        Message::Text(text) => {
                            // One JSON object per frame; anything else is a
                            // framing error and ends the session.
                            let Ok(frame) = serde_json::from_str::<MessageSchema>(&text) else {
                                tracing::debug!(conn_id = %conn.id(), "malformed frame; closing");
                                break;
                            };

                            if !conn.allow() {
                                continue; // rate limited: dropped silently
                            }
                            let Some(handler) = self.events.get(&frame.event) else {
                                continue; // unknown event: dropped silently
                            };

                            // Blocks the read side when the connection has
                            // too many handlers in flight.
                            let permit = Arc::clone(&semaphore)
                                .acquire_owned()
                                .await
                                .expect("semaphore never closed");

                            let ctx = self.context(conn, frame.payload);
                            let timeout = self.event_timeout;
                            in_flight.spawn(async move {
                                let fut = handler(ctx);
                                match timeout {
                                    Some(limit) => {
                                        let _ = tokio::time::timeout(limit, fut).await;
                                    }
                                    None => fut.await,
                                }
                                drop(permit);
                            });
                        }
                        Message::Pong(_) => conn.record_pong(),
                        Message::Close(_) => break,
                        // Pings are answered by the protocol layer.
                        _ => {}
                    }
                }
                // Reap finished handler tasks as we go.
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
            }
        }

        // Socket gone: cancellation propagates into every pending handler.
        in_flight.abort_all();
    }

    fn context(
        &self,
        conn: &Arc<Connection>,
        payload: Option<Box<serde_json::value::RawValue>>,
    ) -> EventContext {
        EventContext {
            conn: Arc::clone(conn),
            hub: Arc::clone(&self.hub),
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// Connection tasks
// ---------------------------------------------------------------------------

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<OutboundFrame>,
) {
    while let Some(frame) = outbound.recv().await {
        let message = match frame {
            OutboundFrame::Text(text) => Message::Text(text.into()),
            OutboundFrame::Ping(data) => Message::Ping(data.into()),
            OutboundFrame::Close => break,
        };
        if sink.send(message).await.is_err() {
            break;
        }
    }
    let _ = sink.close().await;
}

/// Ping the peer periodically; close the connection when a pong does not
/// arrive within the deadline.
async fn keepalive_loop(conn: Arc<Connection>, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;
        let pinged_at = Instant::now();
        if conn.send_ping().await.is_err() {
            return;
        }
        tokio::time::sleep(PING_DEADLINE).await;
        if conn.last_pong() < pinged_at {
            tracing::debug!(conn_id = %conn.id(), "keepalive ping unanswered; closing");
            conn.close();
            return;
        }
    }
}

async fn close_policy(mut socket: WebSocket, reason: String) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: reason.into(),
        })))
        .await;
}

fn pattern_match(pattern: &str, host: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    match pattern.split_once('*') {
        Some((prefix, suffix)) => {
            host.len() >= prefix.len() + suffix.len()
                && host.starts_with(prefix)
                && host.ends_with(suffix)
        }
        None => pattern.eq_ignore_ascii_case(host),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
