//! In-process HTTP/2 push gateway.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fluke_hpack::{Decoder, Encoder};
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::client::notification::{format_id, generate_id};
use crate::client::Notification;
use crate::connection::{Response, CORRELATION_HEADER};
use crate::protocol::frame::{decode_frame, Frame, PREFACE};
use crate::protocol::settings::Setting;
use crate::protocol::{ErrorCode, Headers};

/// Requests carrying this header make the gateway drop the connection
/// instead of answering.
pub const CLOSE_CONNECTION_HEADER: &str = "test-close-connection";

const MAX_FRAME_SIZE: u32 = 16_384;

/// How the gateway behaves on every connection it serves.
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    /// Advertised SETTINGS_MAX_CONCURRENT_STREAMS, omitted when `None`.
    pub max_concurrent_streams: Option<u32>,
    pub answer_pings: bool,
    /// Delay before each response is written.
    pub response_delay: Duration,
    /// Send a graceful GOAWAY after accepting this many requests on one
    /// connection. Later streams are left unanswered.
    pub goaway_after: Option<usize>,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            max_concurrent_streams: Some(100),
            answer_pings: true,
            response_delay: Duration::ZERO,
            goaway_after: None,
        }
    }
}

/// A request the gateway received, with the response it gave.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub headers: Headers,
    pub body: Vec<u8>,
    /// `None` when the request asked for the connection to be closed.
    pub response: Option<Response>,
}

impl RecordedRequest {
    /// Rebuild the notification this request was formatted from.
    ///
    /// With `unformatted_id_length` the id is the last that many digits of
    /// the response id, otherwise the id with leading zeroes stripped.
    pub fn to_notification(&self, unformatted_id_length: Option<usize>) -> Notification {
        let token = self.path.rsplit('/').next().unwrap_or_default();
        let mut notification = Notification::new(token);

        let id = self
            .response
            .as_ref()
            .and_then(|response| response.unformatted_id(unformatted_id_length));
        if let Some(id) = id {
            notification = notification.with_id(id);
        }
        if let Ok(Value::Object(payload)) = serde_json::from_slice(&self.body) {
            notification = notification.with_payload(payload);
        }
        if let Some(topic) = self.headers.get("apns-topic") {
            notification = notification.with_topic(topic);
        }
        let expiration = self
            .headers
            .get("apns-expiration")
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|secs| *secs > 0);
        if let Some(secs) = expiration {
            notification = notification.with_expiration(UNIX_EPOCH + Duration::from_secs(secs));
        }
        if let Some(priority) = self.headers.get("apns-priority").and_then(|v| v.parse().ok()) {
            notification = notification.with_priority(priority);
        }
        notification
    }
}

/// Records every request and answers with stubbed responses, falling back
/// to `200` echoing the request's `apns-id`.
#[derive(Debug, Default)]
pub struct MockGateway {
    options: GatewayOptions,
    responses: Mutex<VecDeque<(u16, Option<String>)>>,
    requests: Mutex<Vec<RecordedRequest>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    pings: AtomicUsize,
    goaways: AtomicUsize,
}

impl MockGateway {
    pub fn new(options: GatewayOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn options(&self) -> &GatewayOptions {
        &self.options
    }

    /// Answer the next unanswered request with `status`, adding a
    /// `{"reason": ...}` body when `reason` is given. Stubs are used in
    /// the order they were added.
    pub fn stub_response(&self, status: u16, reason: Option<&str>) {
        lock(&self.responses).push_back((status, reason.map(str::to_owned)));
    }

    /// Requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// The recorded requests as the notifications they were built from.
    pub fn requests_as_notifications(&self, unformatted_id_length: Option<usize>) -> Vec<Notification> {
        lock(&self.requests)
            .iter()
            .map(|request| request.to_notification(unformatted_id_length))
            .collect()
    }

    /// `apns-id` of each recorded request, in arrival order.
    pub fn ids(&self) -> Vec<String> {
        lock(&self.requests)
            .iter()
            .map(|request| request.headers.get(CORRELATION_HEADER).unwrap_or_default().to_string())
            .collect()
    }

    /// Most streams that were open at the same time.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// PINGs received from clients.
    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    /// GOAWAY frames received from clients.
    pub fn goaways(&self) -> usize {
        self.goaways.load(Ordering::SeqCst)
    }

    /// Accept TCP connections on `addr` and serve each one.
    pub async fn listen(self: Arc<Self>, addr: &str) -> std::io::Result<SocketAddr> {
        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        tokio::spawn(async move {
            while let Ok((socket, peer)) = listener.accept().await {
                tracing::debug!(peer = %peer, "Mock gateway accepted connection");
                tokio::spawn(Arc::clone(&self).serve(socket));
            }
        });
        Ok(local)
    }

    /// Serve one client connection until it closes.
    pub async fn serve<T>(self: Arc<Self>, io: T)
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut reader, writer) = tokio::io::split(io);
        let (tx, rx) = mpsc::unbounded_channel::<Outgoing>();
        let write_task = tokio::spawn(write_loop(writer, rx, self.options.max_concurrent_streams));

        let mut connection = ServedConnection {
            gateway: &self,
            tx: &tx,
            decoder: Decoder::new(),
            open: HashMap::new(),
            accepted: 0,
            last_accepted: None,
        };
        let mut buf = Vec::new();
        let mut chunk = vec![0u8; 16 * 1024];
        let mut preface_seen = false;

        'read: loop {
            let n = match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            buf.extend_from_slice(&chunk[..n]);

            if !preface_seen {
                if buf.len() < PREFACE.len() {
                    continue;
                }
                if &buf[..PREFACE.len()] != PREFACE {
                    tracing::warn!("Mock gateway received an invalid client preface");
                    break;
                }
                buf.drain(..PREFACE.len());
                preface_seen = true;
            }

            loop {
                let (frame, used) = match decode_frame(&buf, MAX_FRAME_SIZE) {
                    Ok(Some(decoded)) => decoded,
                    Ok(None) => break,
                    Err(_) => break 'read,
                };
                buf.drain(..used);
                if !connection.on_frame(frame) {
                    break 'read;
                }
            }
        }

        drop(connection);
        drop(tx);
        let _ = write_task.await;
    }

    fn next_response(&self, apns_id: Option<&str>) -> Response {
        let (status, reason) = lock(&self.responses)
            .pop_front()
            .unwrap_or((200, None));
        let id = match apns_id {
            Some(id) => id.to_string(),
            None => format_id(u128::from(generate_id())),
        };
        let mut headers = Headers::new();
        headers.insert(":status", status.to_string());
        headers.insert(CORRELATION_HEADER, id);
        let body = match reason {
            Some(reason) => {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|elapsed| elapsed.as_secs())
                    .unwrap_or_default();
                let mut body = json!({ "reason": reason });
                if status == 410 {
                    body["timestamp"] = json!(now);
                }
                body.to_string().into_bytes()
            }
            None => Vec::new(),
        };
        Response::new(headers, body, None)
    }

    fn record(&self, request: RecordedRequest) {
        lock(&self.requests).push(request);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

enum Outgoing {
    SettingsAck,
    WindowUpdate(u32),
    Pong([u8; 8]),
    GoAway(u32),
    Respond { stream_id: u32, response: Response },
    Close,
}

struct PendingRequest {
    headers: Headers,
    body: Vec<u8>,
}

/// Per-connection read side state.
struct ServedConnection<'a> {
    gateway: &'a Arc<MockGateway>,
    tx: &'a mpsc::UnboundedSender<Outgoing>,
    decoder: Decoder<'static>,
    open: HashMap<u32, PendingRequest>,
    accepted: usize,
    last_accepted: Option<u32>,
}

impl ServedConnection<'_> {
    /// Returns `false` once the connection should be dropped.
    fn on_frame(&mut self, frame: Frame) -> bool {
        match frame {
            Frame::Settings { ack: false, .. } => {
                let _ = self.tx.send(Outgoing::SettingsAck);
            }
            Frame::Headers {
                stream_id,
                block,
                end_stream,
                ..
            } => {
                let Ok(raw) = self.decoder.decode(&block) else {
                    return false;
                };
                let headers: Headers = raw
                    .into_iter()
                    .map(|(name, value)| {
                        (
                            String::from_utf8_lossy(&name).into_owned(),
                            String::from_utf8_lossy(&value).into_owned(),
                        )
                    })
                    .collect();
                return self.on_request(stream_id, headers, end_stream);
            }
            Frame::Data {
                stream_id,
                payload,
                end_stream,
                flow_len,
            } => {
                if flow_len > 0 {
                    let _ = self.tx.send(Outgoing::WindowUpdate(flow_len));
                }
                if let Some(pending) = self.open.get_mut(&stream_id) {
                    pending.body.extend_from_slice(&payload);
                    if end_stream {
                        self.finish(stream_id);
                    }
                }
            }
            Frame::Ping { ack: false, payload } => {
                self.gateway.pings.fetch_add(1, Ordering::SeqCst);
                if self.gateway.options.answer_pings {
                    let _ = self.tx.send(Outgoing::Pong(payload));
                }
            }
            Frame::GoAway { .. } => {
                self.gateway.goaways.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }
        true
    }

    fn on_request(&mut self, stream_id: u32, headers: Headers, end_stream: bool) -> bool {
        if self.last_accepted.is_some_and(|last| stream_id > last) {
            return true;
        }
        if headers.contains(CLOSE_CONNECTION_HEADER) {
            self.gateway.record(RecordedRequest {
                path: headers.get(":path").unwrap_or_default().to_string(),
                headers,
                body: Vec::new(),
                response: None,
            });
            let _ = self.tx.send(Outgoing::Close);
            return false;
        }

        let active = self.gateway.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.gateway.max_active.fetch_max(active, Ordering::SeqCst);
        self.open.insert(
            stream_id,
            PendingRequest {
                headers,
                body: Vec::new(),
            },
        );
        self.accepted += 1;
        if self.gateway.options.goaway_after == Some(self.accepted) {
            self.last_accepted = Some(stream_id);
            let _ = self.tx.send(Outgoing::GoAway(stream_id));
        }
        if end_stream {
            self.finish(stream_id);
        }
        true
    }

    fn finish(&mut self, stream_id: u32) {
        let Some(pending) = self.open.remove(&stream_id) else {
            return;
        };
        let response = self
            .gateway
            .next_response(pending.headers.get(CORRELATION_HEADER));
        self.gateway.record(RecordedRequest {
            path: pending.headers.get(":path").unwrap_or_default().to_string(),
            headers: pending.headers,
            body: pending.body,
            response: Some(response.clone()),
        });

        let tx = self.tx.clone();
        let delay = self.gateway.options.response_delay;
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let _ = tx.send(Outgoing::Respond { stream_id, response });
        });
    }
}

async fn write_loop<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<Outgoing>, limit: Option<u32>)
where
    W: AsyncWrite + Unpin,
{
    let mut encoder = Encoder::new();
    let mut buf = Vec::new();
    let params = limit.map(Setting::MaxConcurrentStreams).into_iter().collect();
    Frame::Settings { ack: false, params }.encode(&mut buf);
    if writer.write_all(&buf).await.is_err() {
        return;
    }

    while let Some(out) = rx.recv().await {
        buf.clear();
        match out {
            Outgoing::SettingsAck => Frame::Settings {
                ack: true,
                params: Vec::new(),
            }
            .encode(&mut buf),
            Outgoing::WindowUpdate(increment) => Frame::WindowUpdate {
                stream_id: 0,
                increment,
            }
            .encode(&mut buf),
            Outgoing::Pong(payload) => Frame::Ping { ack: true, payload }.encode(&mut buf),
            Outgoing::GoAway(last_stream_id) => Frame::GoAway {
                last_stream_id,
                code: ErrorCode::NoError,
                debug_data: Vec::new(),
            }
            .encode(&mut buf),
            Outgoing::Respond { stream_id, response } => {
                let block = encoder.encode(
                    response
                        .headers()
                        .iter()
                        .map(|(name, value)| (name.as_bytes(), value.as_bytes())),
                );
                let body = response.raw_body();
                Frame::Headers {
                    stream_id,
                    block,
                    end_stream: body.is_empty(),
                    end_headers: true,
                }
                .encode(&mut buf);
                if !body.is_empty() {
                    Frame::Data {
                        stream_id,
                        payload: body.to_vec(),
                        end_stream: true,
                        flow_len: body.len() as u32,
                    }
                    .encode(&mut buf);
                }
            }
            Outgoing::Close => {
                let _ = writer.shutdown().await;
                return;
            }
        }
        if writer.write_all(&buf).await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorded(headers: &[(&str, &str)], body: &str, response_id: &str) -> RecordedRequest {
        let response_headers: Headers = [(":status", "200"), (CORRELATION_HEADER, response_id)]
            .into_iter()
            .collect();
        RecordedRequest {
            path: "/3/device/0123456789abcdef".into(),
            headers: headers.iter().copied().collect(),
            body: body.as_bytes().to_vec(),
            response: Some(Response::new(response_headers, Vec::new(), None)),
        }
    }

    #[test]
    fn recorded_request_becomes_notification() {
        let request = recorded(
            &[
                ("apns-expiration", "1700000000"),
                ("apns-priority", "5"),
                ("apns-topic", "com.example.app"),
            ],
            r#"{"aps":{"alert":"Hi"}}"#,
            "00000000-0000-0000-0000-00000000002a",
        );

        let notification = request.to_notification(None);
        assert_eq!(notification.token(), "0123456789abcdef");
        assert_eq!(notification.formatted_id(), "2a");
        assert_eq!(notification.priority(), Some(5));
        assert_eq!(notification.topic(), Some("com.example.app"));
        assert_eq!(
            notification.expiration(),
            Some(UNIX_EPOCH + Duration::from_secs(1_700_000_000))
        );
        assert_eq!(
            notification.payload().and_then(|p| p.get("aps")),
            Some(&json!({"alert": "Hi"}))
        );
        assert_eq!(request.to_notification(Some(4)).formatted_id(), "002a");
    }

    #[test]
    fn zero_expiration_is_absent() {
        let request = recorded(&[("apns-expiration", "0")], "{}", "1");
        assert_eq!(request.to_notification(None).expiration(), None);
    }

    #[test]
    fn stubbed_responses_are_used_in_order() {
        let gateway = MockGateway::new(GatewayOptions::default());
        gateway.stub_response(410, Some("Unregistered"));

        let stubbed = gateway.next_response(Some("a"));
        assert_eq!(stubbed.status(), Some(410));
        assert_eq!(stubbed.failure_reason().as_deref(), Some("Unregistered"));
        assert!(stubbed.validity_last_checked_at().is_some());

        let default = gateway.next_response(Some("b"));
        assert_eq!(default.status(), Some(200));
        assert_eq!(default.id(), Some("b"));
        assert!(gateway.next_response(None).id().is_some());
    }
}
