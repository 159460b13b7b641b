//! The task that owns one connection's transport and session.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;

use crate::config::ConnectionConfig;
use crate::connection::heartbeat::{Beat, Heartbeat};
use crate::connection::request::{Request, CORRELATION_HEADER};
use crate::connection::response::Response;
use crate::connection::state::{ConnectionId, ConnectionState};
use crate::error::{Deadline, Error, Result};
use crate::monitor::Monitor;
use crate::net::{BoxedIo, Connector, Endpoint};
use crate::observability::metrics;
use crate::protocol::{ErrorCode, Headers, ProtocolError, Session, SessionEvent, Settings};
use crate::resilience::RetryPolicy;
use crate::threading::{Counter, Mailbox};

const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Work submitted to the worker by [`super::Connection`] handles.
pub(crate) enum Command {
    Connect,
    Disconnect { ack: oneshot::Sender<()> },
    Shutdown { ack: oneshot::Sender<()> },
    Post(Request),
    Ping { reply: oneshot::Sender<Result<()>> },
}

/// A request whose stream is open on the current session.
struct InFlight {
    request: Request,
    headers: Headers,
    body: Vec<u8>,
    started: Instant,
}

impl InFlight {
    fn new(request: Request) -> Self {
        Self {
            request,
            headers: Headers::new(),
            body: Vec::new(),
            started: Instant::now(),
        }
    }
}

struct Transport {
    reader: ReadHalf<BoxedIo>,
    writer: WriteHalf<BoxedIo>,
    session: Session,
    /// Bytes taken from the session and not yet accepted by the socket.
    outbound: Vec<u8>,
    written: usize,
    needs_flush: bool,
}

impl Transport {
    fn new(io: BoxedIo, session: Session) -> Self {
        let (reader, writer) = tokio::io::split(io);
        Self {
            reader,
            writer,
            session,
            outbound: Vec::new(),
            written: 0,
            needs_flush: false,
        }
    }

    /// Append whatever the session has queued behind the unsent bytes.
    fn stage(&mut self) {
        if !self.session.has_outgoing() {
            return;
        }
        if self.written == self.outbound.len() {
            self.outbound.clear();
            self.written = 0;
        }
        let bytes = self.session.take_outgoing();
        self.outbound.extend_from_slice(&bytes);
    }

    fn advance(&mut self, n: usize) {
        self.written += n;
        if self.written >= self.outbound.len() {
            self.outbound.clear();
            self.written = 0;
            self.needs_flush = true;
        }
    }

    /// Write out everything staged and shut the socket down, giving up
    /// after `limit`.
    async fn finish(mut self, limit: Duration) {
        self.stage();
        let Transport {
            mut writer,
            outbound,
            written,
            ..
        } = self;
        let pending = &outbound[written..];
        let closed = tokio::time::timeout(limit, async {
            writer.write_all(pending).await?;
            writer.shutdown().await?;
            Ok::<_, io::Error>(())
        })
        .await;
        if !matches!(closed, Ok(Ok(()))) {
            tracing::debug!("Transport closed without delivering its final frames");
        }
    }
}

enum Progress {
    Sent(usize),
    Flushed,
}

enum Event {
    Command(Option<Command>),
    Dialed(Result<BoxedIo>),
    Read(io::Result<usize>),
    Written(io::Result<Progress>),
    RetryDue,
    HandshakeExpired,
    HeartbeatDue,
}

pub(crate) struct Worker {
    id: ConnectionId,
    endpoint: Endpoint,
    connector: Arc<dyn Connector>,
    config: ConnectionConfig,
    policy: RetryPolicy,
    monitor: Monitor,
    state: watch::Sender<ConnectionState>,
    in_flight: Counter,
    mailbox: Mailbox<Command>,

    queue: VecDeque<Request>,
    streams: HashMap<u32, InFlight>,
    transport: Option<Transport>,
    connecting: Option<BoxFuture<'static, Result<BoxedIo>>>,
    retry_at: Option<Instant>,
    handshake_deadline: Option<Instant>,
    failures: u32,
    max_concurrent: usize,
    /// Set after a graceful GOAWAY: the highest stream the peer will answer.
    retiring: Option<u32>,
    heartbeat: Heartbeat,
    pings: Vec<([u8; 8], oneshot::Sender<Result<()>>)>,
    read_buf: Vec<u8>,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: ConnectionId,
        endpoint: Endpoint,
        connector: Arc<dyn Connector>,
        config: ConnectionConfig,
        monitor: Monitor,
        state: watch::Sender<ConnectionState>,
        in_flight: Counter,
        mailbox: Mailbox<Command>,
    ) -> Self {
        Self {
            id,
            endpoint,
            connector,
            policy: config.retry_policy(),
            heartbeat: Heartbeat::new(config.heartbeat_interval(), config.heartbeat_timeout()),
            max_concurrent: config.fallback_max_concurrent_streams as usize,
            config,
            monitor,
            state,
            in_flight,
            mailbox,
            queue: VecDeque::new(),
            streams: HashMap::new(),
            transport: None,
            connecting: None,
            retry_at: None,
            handshake_deadline: None,
            failures: 0,
            retiring: None,
            pings: Vec::new(),
            read_buf: vec![0; READ_BUFFER_SIZE],
        }
    }

    pub(crate) async fn run(mut self) {
        tracing::debug!(connection_id = %self.id, endpoint = %self.endpoint, "Connection worker started");
        loop {
            let event = self.next_event().await;
            let keep_running = self.handle(event).await;
            if let Some(transport) = self.transport.as_mut() {
                transport.stage();
            }
            if !keep_running {
                break;
            }
        }
        for command in self.mailbox.stop() {
            self.reject(command);
        }
        tracing::debug!(connection_id = %self.id, "Connection worker stopped");
    }

    fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            metrics::record_connection_state(&self.id.to_string(), next.as_gauge());
            tracing::debug!(connection_id = %self.id, state = %next, "Connection state changed");
        }
    }

    async fn next_event(&mut self) -> Event {
        let Self {
            mailbox,
            connecting,
            transport,
            retry_at,
            handshake_deadline,
            heartbeat,
            read_buf,
            ..
        } = self;
        let heartbeat_at = heartbeat.deadline();
        let (reader, writer) = match transport.as_mut() {
            Some(Transport {
                reader,
                writer,
                outbound,
                written,
                needs_flush,
                ..
            }) => (Some(reader), Some((writer, &outbound[*written..], *needs_flush))),
            None => (None, None),
        };

        tokio::select! {
            command = mailbox.recv() => Event::Command(command),
            dialed = async {
                match connecting.as_mut() {
                    Some(dial) => dial.await,
                    None => std::future::pending().await,
                }
            } => Event::Dialed(dialed),
            read = async {
                match reader {
                    Some(reader) => reader.read(read_buf).await,
                    None => std::future::pending().await,
                }
            } => Event::Read(read),
            written = async {
                match writer {
                    Some((writer, pending, _)) if !pending.is_empty() => {
                        writer.write(pending).await.map(Progress::Sent)
                    }
                    Some((writer, _, true)) => writer.flush().await.map(|()| Progress::Flushed),
                    _ => std::future::pending().await,
                }
            } => Event::Written(written),
            _ = sleep_until(*retry_at) => Event::RetryDue,
            _ = sleep_until(*handshake_deadline) => Event::HandshakeExpired,
            _ = sleep_until(heartbeat_at) => Event::HeartbeatDue,
        }
    }

    /// Returns `false` once the worker should exit.
    async fn handle(&mut self, event: Event) -> bool {
        match event {
            Event::Command(None) => {
                self.close("all handles dropped").await;
                return false;
            }
            Event::Command(Some(command)) => return self.on_command(command).await,
            Event::Dialed(result) => {
                self.connecting = None;
                match result {
                    Ok(io) => self.on_dialed(io),
                    Err(err) => self.on_connect_failure(err),
                }
            }
            Event::Read(Ok(0)) => self.on_transport_error(Error::ConnectionClosed),
            Event::Read(Ok(n)) => self.on_read(n).await,
            Event::Read(Err(err)) => self.on_transport_error(Error::Io(err)),
            Event::Written(Ok(Progress::Sent(0))) => {
                self.on_transport_error(Error::Io(io::ErrorKind::WriteZero.into()))
            }
            Event::Written(Ok(Progress::Sent(n))) => {
                if let Some(transport) = self.transport.as_mut() {
                    transport.advance(n);
                }
            }
            Event::Written(Ok(Progress::Flushed)) => {
                if let Some(transport) = self.transport.as_mut() {
                    transport.needs_flush = false;
                }
            }
            Event::Written(Err(err)) => self.on_transport_error(Error::Io(err)),
            Event::RetryDue => {
                self.retry_at = None;
                self.begin_connect();
            }
            Event::HandshakeExpired => {
                self.handshake_deadline = None;
                self.on_connect_failure(Error::TimedOut {
                    deadline: Deadline::Handshake,
                    after: self.config.connect_timeout(),
                });
            }
            Event::HeartbeatDue => self.on_heartbeat(),
        }
        true
    }

    async fn on_command(&mut self, command: Command) -> bool {
        match command {
            Command::Connect => {
                if self.current_state() == ConnectionState::Disconnected {
                    self.failures = 0;
                    self.begin_connect();
                }
            }
            Command::Post(request) => {
                self.queue.push_back(request);
                if self.current_state() != ConnectionState::Connected {
                    tracing::debug!(
                        connection_id = %self.id,
                        queued = self.queue.len(),
                        "Request queued until connected"
                    );
                }
                self.drain();
            }
            Command::Ping { reply } => self.on_ping(reply),
            Command::Disconnect { ack } => {
                self.close("disconnect requested").await;
                let _ = ack.send(());
            }
            Command::Shutdown { ack } => {
                self.close("shutdown requested").await;
                let _ = ack.send(());
                return false;
            }
        }
        true
    }

    /// Handle a command that arrived after the worker decided to stop.
    fn reject(&self, command: Command) {
        match command {
            Command::Post(_) => {
                self.in_flight.decrement();
                metrics::record_discarded(1);
            }
            Command::Ping { reply } => {
                let _ = reply.send(Err(Error::WorkerStopped));
            }
            Command::Disconnect { ack } | Command::Shutdown { ack } => {
                let _ = ack.send(());
            }
            Command::Connect => {}
        }
    }

    fn begin_connect(&mut self) {
        self.set_state(ConnectionState::Connecting);
        tracing::info!(
            connection_id = %self.id,
            endpoint = %self.endpoint,
            attempt = self.failures + 1,
            "Connecting"
        );
        let dial = self.connector.connect(&self.endpoint);
        let timeout = self.config.connect_timeout();
        self.connecting = Some(Box::pin(async move {
            match tokio::time::timeout(timeout, dial).await {
                Ok(Ok(io)) => Ok(io),
                Ok(Err(err)) => Err(Error::Connect(err)),
                Err(_) => Err(Error::TimedOut {
                    deadline: Deadline::Connect,
                    after: timeout,
                }),
            }
        }));
    }

    fn on_dialed(&mut self, io: BoxedIo) {
        tracing::debug!(connection_id = %self.id, "Transport open, waiting for peer SETTINGS");
        self.transport = Some(Transport::new(io, Session::new(Settings::client())));
        self.retiring = None;
        self.handshake_deadline = Some(Instant::now() + self.config.connect_timeout());
    }

    fn on_connect_failure(&mut self, err: Error) {
        self.transport = None;
        self.connecting = None;
        self.handshake_deadline = None;
        self.failures += 1;
        metrics::record_connect_attempt("failure");

        match self.policy.delay_for(self.failures) {
            Some(delay) => {
                tracing::warn!(
                    connection_id = %self.id,
                    attempt = self.failures,
                    retry_in = ?delay,
                    error = %err,
                    "Connect failed, retrying"
                );
                self.retry_at = Some(Instant::now() + delay);
            }
            None => {
                let error = Error::RetriesExhausted {
                    attempts: self.failures,
                    last: Box::new(err),
                };
                tracing::error!(connection_id = %self.id, error = %error, "Giving up on connection");
                self.failures = 0;
                self.retry_at = None;
                self.set_state(ConnectionState::Disconnected);
                self.abort(Arc::new(error));
            }
        }
    }

    /// Route a transport fault to the connect path or the established path.
    fn on_transport_error(&mut self, err: Error) {
        if self.current_state() == ConnectionState::Connected {
            self.on_fault(err);
        } else {
            self.on_connect_failure(err);
        }
    }

    /// The peer broke the protocol. Fatal in every state and never retried.
    async fn on_protocol_error(&mut self, err: ProtocolError) {
        tracing::error!(connection_id = %self.id, error = %err, "Protocol error, closing connection");
        if let Some(transport) = self.transport.take() {
            // The session already queued a GOAWAY carrying the error code.
            transport.finish(self.config.heartbeat_timeout()).await;
        }
        self.connecting = None;
        self.retry_at = None;
        self.handshake_deadline = None;
        self.retiring = None;
        self.failures = 0;
        self.heartbeat.stop();
        self.set_state(ConnectionState::Disconnected);
        self.abort(Arc::new(Error::Protocol(err)));
    }

    /// A fault on an established connection.
    fn on_fault(&mut self, err: Error) {
        tracing::error!(connection_id = %self.id, error = %err, "Connection failed");
        self.transport = None;
        self.retiring = None;
        self.heartbeat.stop();
        let retry = self.config.reconnect && err.is_retryable();
        self.set_state(ConnectionState::Disconnected);
        self.abort(Arc::new(err));
        if retry {
            self.failures = 0;
            self.begin_connect();
        }
    }

    /// Drop queued and in-flight requests, fail pending pings and wake
    /// every waiter registered with the monitor.
    fn abort(&mut self, error: Arc<Error>) {
        let discarded = self.discard();
        self.monitor.broadcast(error);
        if discarded > 0 {
            tracing::warn!(connection_id = %self.id, discarded, "Discarded undelivered requests");
        }
    }

    fn discard(&mut self) -> usize {
        let discarded = self.queue.len() + self.streams.len();
        self.queue.clear();
        self.streams.clear();
        self.in_flight.sub(discarded);
        metrics::record_discarded(discarded);
        for (_, reply) in self.pings.drain(..) {
            let _ = reply.send(Err(Error::ConnectionClosed));
        }
        discarded
    }

    /// Orderly teardown for disconnect, shutdown and dropped handles.
    async fn close(&mut self, reason: &str) {
        self.connecting = None;
        self.retry_at = None;
        self.handshake_deadline = None;
        self.retiring = None;
        self.failures = 0;
        self.heartbeat.stop();
        if let Some(mut transport) = self.transport.take() {
            transport.session.go_away(ErrorCode::NoError);
            transport.finish(self.config.heartbeat_timeout()).await;
        }
        let was = self.current_state();
        self.set_state(ConnectionState::Disconnected);
        if self.discard() > 0 {
            self.monitor.broadcast(Arc::new(Error::NotConnected));
        }
        if was != ConnectionState::Disconnected {
            tracing::info!(connection_id = %self.id, reason, "Connection closed");
        }
    }

    async fn on_read(&mut self, n: usize) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        if let Err(err) = transport.session.feed(&self.read_buf[..n]) {
            self.on_protocol_error(err).await;
            return;
        }
        loop {
            let Some(transport) = self.transport.as_mut() else {
                return;
            };
            let Some(event) = transport.session.poll_event() else {
                break;
            };
            self.on_session_event(event);
        }
        self.drain();
    }

    fn on_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Ready {
                max_concurrent_streams,
            } => {
                self.handshake_deadline = None;
                self.failures = 0;
                self.set_limit(max_concurrent_streams);
                metrics::record_connect_attempt("success");
                self.set_state(ConnectionState::Connected);
                self.heartbeat.start(Instant::now());
                tracing::info!(
                    connection_id = %self.id,
                    endpoint = %self.endpoint,
                    max_concurrent_streams = self.max_concurrent,
                    "Connected"
                );
            }
            SessionEvent::SettingsChanged {
                max_concurrent_streams,
            } => {
                self.set_limit(max_concurrent_streams);
                tracing::debug!(
                    connection_id = %self.id,
                    max_concurrent_streams = self.max_concurrent,
                    "Peer changed concurrency limit"
                );
            }
            SessionEvent::Headers { stream_id, headers } => {
                if let Some(stream) = self.streams.get_mut(&stream_id) {
                    for (name, value) in headers.iter() {
                        stream.headers.insert(name, value);
                    }
                }
            }
            SessionEvent::Data { stream_id, data } => {
                if let Some(stream) = self.streams.get_mut(&stream_id) {
                    stream.body.extend_from_slice(&data);
                }
            }
            SessionEvent::StreamClosed { stream_id, reset } => self.complete(stream_id, reset),
            SessionEvent::Pong { payload } => {
                if !self.heartbeat.on_pong(payload) {
                    if let Some(index) = self.pings.iter().position(|(sent, _)| *sent == payload) {
                        let (_, reply) = self.pings.swap_remove(index);
                        let _ = reply.send(Ok(()));
                    }
                }
            }
            SessionEvent::GoAway {
                last_stream_id,
                code,
                debug_data,
            } => {
                tracing::warn!(
                    connection_id = %self.id,
                    code = %code,
                    last_stream_id,
                    debug = %String::from_utf8_lossy(&debug_data),
                    "Peer sent GOAWAY"
                );
                if code == ErrorCode::NoError && self.current_state() == ConnectionState::Connected {
                    self.begin_retiring(last_stream_id);
                } else {
                    self.on_transport_error(Error::GoAway {
                        code,
                        last_stream_id,
                    });
                }
            }
        }
    }

    /// Graceful GOAWAY: streams the peer accepted finish on this transport,
    /// the rest go back to the front of the queue for the next one.
    fn begin_retiring(&mut self, last_stream_id: u32) {
        let mut refused: Vec<u32> = self
            .streams
            .keys()
            .copied()
            .filter(|stream_id| *stream_id > last_stream_id)
            .collect();
        refused.sort_unstable();
        for stream_id in refused.iter().rev() {
            if let Some(stream) = self.streams.remove(stream_id) {
                self.queue.push_front(stream.request);
            }
        }
        tracing::info!(
            connection_id = %self.id,
            finishing = self.streams.len(),
            requeued = refused.len(),
            "Draining connection after GOAWAY"
        );
        self.retiring = Some(last_stream_id);
        self.retire_if_drained();
    }

    fn retire_if_drained(&mut self) {
        let Some(last_stream_id) = self.retiring else {
            return;
        };
        if !self.streams.is_empty() {
            return;
        }
        self.retiring = None;
        self.heartbeat.stop();
        if let Some(mut transport) = self.transport.take() {
            transport.session.go_away(ErrorCode::NoError);
            tokio::spawn(transport.finish(self.config.heartbeat_timeout()));
        }
        self.set_state(ConnectionState::Disconnected);
        tracing::info!(connection_id = %self.id, queued = self.queue.len(), "Connection retired by peer");

        if self.config.reconnect {
            self.failures = 0;
            self.begin_connect();
        } else if !self.queue.is_empty() {
            self.abort(Arc::new(Error::GoAway {
                code: ErrorCode::NoError,
                last_stream_id,
            }));
        }
    }

    fn set_limit(&mut self, advertised: Option<u32>) {
        let limit = advertised.unwrap_or(self.config.fallback_max_concurrent_streams);
        self.max_concurrent = limit as usize;
    }

    fn on_ping(&mut self, reply: oneshot::Sender<Result<()>>) {
        let Some(transport) = self.transport.as_mut() else {
            let _ = reply.send(Err(Error::NotConnected));
            return;
        };
        if !transport.session.is_ready() {
            let _ = reply.send(Err(Error::NotConnected));
            return;
        }
        let payload: [u8; 8] = rand::random();
        transport.session.ping(payload);
        self.pings.retain(|(_, waiting)| !waiting.is_closed());
        self.pings.push((payload, reply));
    }

    fn on_heartbeat(&mut self) {
        match self.heartbeat.poll(Instant::now()) {
            Beat::Send(payload) => {
                if let Some(transport) = self.transport.as_mut() {
                    transport.session.ping(payload);
                }
            }
            Beat::Expired => {
                metrics::record_heartbeat_failure();
                self.on_transport_error(Error::TimedOut {
                    deadline: Deadline::Heartbeat,
                    after: self.heartbeat.timeout(),
                });
            }
            Beat::Idle => {}
        }
    }

    /// Open streams for queued requests while the peer's limit allows.
    fn drain(&mut self) {
        if self.current_state() != ConnectionState::Connected || self.retiring.is_some() {
            return;
        }
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        let authority = self.endpoint.authority();
        let defaults = [(":scheme", self.endpoint.scheme()), (":authority", authority.as_str())];
        let mut failed = Vec::new();

        while self.streams.len() < self.max_concurrent {
            let Some(request) = self.queue.pop_front() else {
                break;
            };
            let stream_id = match transport.session.open_stream() {
                Ok(stream_id) => stream_id,
                Err(err) => {
                    tracing::warn!(connection_id = %self.id, error = %err, "Cannot open stream, request deferred");
                    self.queue.push_front(request);
                    break;
                }
            };
            let headers = request.headers().with_pseudo_defaults(&defaults);
            match transport.session.send(stream_id, &headers, request.body(), true) {
                Ok(()) => tracing::debug!(
                    connection_id = %self.id,
                    stream_id,
                    apns_id = request.correlation_id().unwrap_or(""),
                    path = headers.get(":path").unwrap_or(""),
                    "Request sent"
                ),
                Err(err) => {
                    tracing::error!(connection_id = %self.id, stream_id, error = %err, "Failed to send request");
                    failed.push(stream_id);
                }
            }
            self.streams.insert(stream_id, InFlight::new(request));
        }
        for stream_id in failed {
            self.complete(stream_id, Some(ErrorCode::InternalError));
        }
        if !self.queue.is_empty() {
            tracing::debug!(
                connection_id = %self.id,
                active = self.streams.len(),
                limit = self.max_concurrent,
                queued = self.queue.len(),
                "Concurrency limit reached, requests deferred"
            );
        }
    }

    fn complete(&mut self, stream_id: u32, reset: Option<ErrorCode>) {
        let Some(stream) = self.streams.remove(&stream_id) else {
            return;
        };
        let mut response = Response::new(stream.headers, stream.body, reset);
        if response.id().is_none() {
            if let Some(id) = stream.request.correlation_id() {
                response.headers_mut().insert(CORRELATION_HEADER, id);
            }
        }

        let status = response
            .status()
            .map(|status| status.to_string())
            .unwrap_or_else(|| "reset".to_string());
        metrics::record_response(&status, stream.started.elapsed());
        tracing::debug!(
            connection_id = %self.id,
            stream_id,
            apns_id = response.id().unwrap_or(""),
            status = %status,
            "Response received"
        );

        if let Some(delegate) = stream.request.delegate() {
            let context = stream.request.context().cloned();
            let outcome = catch_unwind(AssertUnwindSafe(|| delegate.handle_response(response, context)));
            if outcome.is_err() {
                tracing::error!(connection_id = %self.id, stream_id, "Response delegate panicked");
            }
        }
        self.in_flight.decrement();
        self.retire_if_drained();
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
