//! Client-side HTTP/2 session state machine.
//!
//! The session performs no I/O. Bytes read from the transport go in through
//! [`Session::feed`]; bytes to write come out of [`Session::take_outgoing`];
//! everything the connection layer needs to react to is queued as a
//! [`SessionEvent`].

use std::collections::{BTreeMap, VecDeque};

use fluke_hpack::{Decoder, Encoder};

use crate::protocol::error::{ErrorCode, ProtocolError};
use crate::protocol::frame::{decode_frame, Frame, PREFACE};
use crate::protocol::headers::Headers;
use crate::protocol::settings::{Setting, Settings, MAX_WINDOW_SIZE};

const LAST_STREAM_ID: u32 = 0x7fff_ffff;

/// Something the peer did that the connection layer must act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The peer's first SETTINGS frame arrived; requests may be issued.
    Ready { max_concurrent_streams: Option<u32> },
    /// A later SETTINGS frame changed the concurrency limit.
    SettingsChanged { max_concurrent_streams: Option<u32> },
    /// A complete header block (response headers or trailers).
    Headers { stream_id: u32, headers: Headers },
    /// A chunk of response body.
    Data { stream_id: u32, data: Vec<u8> },
    /// The stream finished, normally or by RST_STREAM.
    StreamClosed {
        stream_id: u32,
        reset: Option<ErrorCode>,
    },
    /// Acknowledgement of one of our PINGs.
    Pong { payload: [u8; 8] },
    /// The peer is shutting the connection down.
    GoAway {
        last_stream_id: u32,
        code: ErrorCode,
        debug_data: Vec<u8>,
    },
}

#[derive(Debug)]
struct StreamState {
    send_window: i64,
    /// Body bytes not yet released by flow control.
    pending: Vec<u8>,
    /// END_STREAM goes out with the last pending byte.
    end_pending: bool,
    local_closed: bool,
}

impl StreamState {
    fn new(initial_window: u32) -> Self {
        Self {
            send_window: i64::from(initial_window),
            pending: Vec::new(),
            end_pending: false,
            local_closed: false,
        }
    }
}

#[derive(Debug)]
struct PartialHeaders {
    stream_id: u32,
    block: Vec<u8>,
    end_stream: bool,
}

/// A single client HTTP/2 session.
pub struct Session {
    remote: Settings,
    local: Settings,
    encoder: Encoder<'static>,
    decoder: Decoder<'static>,
    inbound: Vec<u8>,
    outbound: Vec<u8>,
    events: VecDeque<SessionEvent>,
    streams: BTreeMap<u32, StreamState>,
    next_stream_id: u32,
    send_window: i64,
    ready: bool,
    going_away: bool,
    partial_headers: Option<PartialHeaders>,
}

impl Session {
    /// Start a session. The connection preface and our SETTINGS are queued
    /// for writing immediately, in that order.
    pub fn new(local: Settings) -> Self {
        let mut outbound = Vec::with_capacity(PREFACE.len() + 64);
        outbound.extend_from_slice(PREFACE);
        Frame::Settings {
            ack: false,
            params: local.to_params(),
        }
        .encode(&mut outbound);

        let remote = Settings::default();
        Self {
            send_window: i64::from(remote.initial_window_size),
            remote,
            local,
            encoder: Encoder::new(),
            decoder: Decoder::new(),
            inbound: Vec::new(),
            outbound,
            events: VecDeque::new(),
            streams: BTreeMap::new(),
            next_stream_id: 1,
            ready: false,
            going_away: false,
            partial_headers: None,
        }
    }

    /// Whether the peer's SETTINGS have been received.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_going_away(&self) -> bool {
        self.going_away
    }

    /// Settings most recently announced by the peer.
    pub fn remote_settings(&self) -> &Settings {
        &self.remote
    }

    /// Streams opened by us and not yet closed.
    pub fn active_streams(&self) -> usize {
        self.streams.len()
    }

    /// Bytes waiting to be written to the transport.
    pub fn take_outgoing(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.outbound)
    }

    pub fn has_outgoing(&self) -> bool {
        !self.outbound.is_empty()
    }

    pub fn poll_event(&mut self) -> Option<SessionEvent> {
        self.events.pop_front()
    }

    /// Reserve the next client stream identifier.
    pub fn open_stream(&mut self) -> Result<u32, ProtocolError> {
        if self.going_away {
            return Err(ProtocolError::GoingAway);
        }
        let stream_id = self.next_stream_id;
        if stream_id > LAST_STREAM_ID {
            return Err(ProtocolError::StreamIdsExhausted);
        }
        self.next_stream_id += 2;
        self.streams
            .insert(stream_id, StreamState::new(self.remote.initial_window_size));
        Ok(stream_id)
    }

    /// Send a header block followed by `body` on an open stream.
    ///
    /// Body bytes beyond the current flow-control window are held and
    /// released as the peer sends WINDOW_UPDATE frames.
    pub fn send(
        &mut self,
        stream_id: u32,
        headers: &Headers,
        body: &[u8],
        end_stream: bool,
    ) -> Result<(), ProtocolError> {
        match self.streams.get(&stream_id) {
            None => return Err(ProtocolError::UnknownStream(stream_id)),
            Some(stream) if stream.local_closed => {
                return Err(ProtocolError::Violation(format!(
                    "stream {stream_id} already finished sending"
                )))
            }
            Some(_) => {}
        }

        let headers_only = end_stream && body.is_empty();
        self.write_headers(stream_id, headers, headers_only);

        if let Some(stream) = self.streams.get_mut(&stream_id) {
            if headers_only {
                stream.local_closed = true;
            } else {
                stream.pending.extend_from_slice(body);
                stream.end_pending = end_stream;
            }
        }
        self.flush_stream(stream_id);
        Ok(())
    }

    /// Queue a PING carrying `payload`.
    pub fn ping(&mut self, payload: [u8; 8]) {
        Frame::Ping {
            ack: false,
            payload,
        }
        .encode(&mut self.outbound);
    }

    /// Queue a GOAWAY; no further streams will be opened.
    pub fn go_away(&mut self, code: ErrorCode) {
        self.going_away = true;
        Frame::GoAway {
            last_stream_id: 0,
            code,
            debug_data: Vec::new(),
        }
        .encode(&mut self.outbound);
    }

    /// Process bytes received from the peer.
    ///
    /// On error a GOAWAY carrying the matching code is queued and the
    /// session must not be used further.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.inbound.extend_from_slice(bytes);
        let mut consumed = 0;
        let result = loop {
            match decode_frame(&self.inbound[consumed..], self.local.max_frame_size) {
                Ok(Some((frame, used))) => {
                    consumed += used;
                    if let Err(err) = self.handle_frame(frame) {
                        break Err(err);
                    }
                }
                Ok(None) => break Ok(()),
                Err(err) => break Err(err),
            }
        };
        self.inbound.drain(..consumed);
        if let Err(err) = &result {
            self.go_away(err.code());
        }
        result
    }

    fn handle_frame(&mut self, frame: Frame) -> Result<(), ProtocolError> {
        if !self.ready && !matches!(frame, Frame::Settings { ack: false, .. }) {
            return Err(ProtocolError::Violation(
                "server preface must start with SETTINGS".into(),
            ));
        }
        if let Some(partial) = &self.partial_headers {
            let continues = matches!(
                &frame,
                Frame::Continuation { stream_id, .. } if *stream_id == partial.stream_id
            );
            if !continues {
                return Err(ProtocolError::Violation(
                    "header block interrupted before END_HEADERS".into(),
                ));
            }
        }

        match frame {
            Frame::Data {
                stream_id,
                payload,
                end_stream,
                flow_len,
            } => self.on_data(stream_id, payload, end_stream, flow_len),
            Frame::Headers {
                stream_id,
                block,
                end_stream,
                end_headers,
            } => {
                if end_headers {
                    self.on_header_block(stream_id, &block, end_stream)
                } else {
                    self.partial_headers = Some(PartialHeaders {
                        stream_id,
                        block,
                        end_stream,
                    });
                    Ok(())
                }
            }
            Frame::Continuation {
                block, end_headers, ..
            } => {
                let Some(mut partial) = self.partial_headers.take() else {
                    return Err(ProtocolError::Violation("unexpected CONTINUATION".into()));
                };
                partial.block.extend_from_slice(&block);
                if end_headers {
                    self.on_header_block(partial.stream_id, &partial.block, partial.end_stream)
                } else {
                    self.partial_headers = Some(partial);
                    Ok(())
                }
            }
            Frame::RstStream { stream_id, code } => {
                if self.streams.remove(&stream_id).is_some() {
                    self.events.push_back(SessionEvent::StreamClosed {
                        stream_id,
                        reset: Some(code),
                    });
                }
                Ok(())
            }
            Frame::Settings { ack: true, .. } => Ok(()),
            Frame::Settings { ack: false, params } => self.on_settings(&params),
            Frame::PushPromise { .. } => Err(ProtocolError::Violation(
                "PUSH_PROMISE received with push disabled".into(),
            )),
            Frame::Ping {
                ack: false,
                payload,
            } => {
                Frame::Ping { ack: true, payload }.encode(&mut self.outbound);
                Ok(())
            }
            Frame::Ping { ack: true, payload } => {
                self.events.push_back(SessionEvent::Pong { payload });
                Ok(())
            }
            Frame::GoAway {
                last_stream_id,
                code,
                debug_data,
            } => {
                self.going_away = true;
                self.events.push_back(SessionEvent::GoAway {
                    last_stream_id,
                    code,
                    debug_data,
                });
                Ok(())
            }
            Frame::WindowUpdate {
                stream_id,
                increment,
            } => self.on_window_update(stream_id, increment),
            Frame::Ignored { .. } => Ok(()),
        }
    }

    fn on_settings(&mut self, params: &[Setting]) -> Result<(), ProtocolError> {
        let previous_window = i64::from(self.remote.initial_window_size);
        self.remote.apply(params);
        let delta = i64::from(self.remote.initial_window_size) - previous_window;
        if delta != 0 {
            for stream in self.streams.values_mut() {
                stream.send_window += delta;
                if stream.send_window > i64::from(MAX_WINDOW_SIZE) {
                    return Err(ProtocolError::FlowControl);
                }
            }
        }

        Frame::Settings {
            ack: true,
            params: Vec::new(),
        }
        .encode(&mut self.outbound);

        let max_concurrent_streams = self.remote.max_concurrent_streams;
        if !self.ready {
            self.ready = true;
            self.events
                .push_back(SessionEvent::Ready { max_concurrent_streams });
        } else if params
            .iter()
            .any(|p| matches!(p, Setting::MaxConcurrentStreams(_)))
        {
            self.events
                .push_back(SessionEvent::SettingsChanged { max_concurrent_streams });
        }

        self.flush_all();
        Ok(())
    }

    fn on_data(
        &mut self,
        stream_id: u32,
        payload: Vec<u8>,
        end_stream: bool,
        flow_len: u32,
    ) -> Result<(), ProtocolError> {
        // Received data is credited back straight away.
        if flow_len > 0 {
            Frame::WindowUpdate {
                stream_id: 0,
                increment: flow_len,
            }
            .encode(&mut self.outbound);
        }

        if !self.streams.contains_key(&stream_id) {
            if stream_id >= self.next_stream_id {
                return Err(ProtocolError::Violation(format!(
                    "DATA on idle stream {stream_id}"
                )));
            }
            return Ok(());
        }

        if !payload.is_empty() {
            self.events.push_back(SessionEvent::Data {
                stream_id,
                data: payload,
            });
        }
        if end_stream {
            self.finish_remote(stream_id);
        } else if flow_len > 0 {
            Frame::WindowUpdate {
                stream_id,
                increment: flow_len,
            }
            .encode(&mut self.outbound);
        }
        Ok(())
    }

    fn on_header_block(
        &mut self,
        stream_id: u32,
        block: &[u8],
        end_stream: bool,
    ) -> Result<(), ProtocolError> {
        // Decode even for closed streams so the HPACK table stays in sync.
        let raw = self
            .decoder
            .decode(block)
            .map_err(|err| ProtocolError::Compression(format!("{err:?}")))?;

        if !self.streams.contains_key(&stream_id) {
            if stream_id >= self.next_stream_id {
                return Err(ProtocolError::Violation(format!(
                    "HEADERS on idle stream {stream_id}"
                )));
            }
            return Ok(());
        }

        let mut headers = Headers::new();
        headers.extend_raw(raw);
        self.events
            .push_back(SessionEvent::Headers { stream_id, headers });
        if end_stream {
            self.finish_remote(stream_id);
        }
        Ok(())
    }

    fn on_window_update(&mut self, stream_id: u32, increment: u32) -> Result<(), ProtocolError> {
        if stream_id == 0 {
            if increment == 0 {
                return Err(ProtocolError::Violation(
                    "zero WINDOW_UPDATE increment".into(),
                ));
            }
            self.send_window += i64::from(increment);
            if self.send_window > i64::from(MAX_WINDOW_SIZE) {
                return Err(ProtocolError::FlowControl);
            }
            self.flush_all();
            return Ok(());
        }

        let Some(stream) = self.streams.get_mut(&stream_id) else {
            return Ok(());
        };
        stream.send_window += i64::from(increment);
        let window = stream.send_window;
        if increment == 0 {
            self.reset_stream(stream_id, ErrorCode::ProtocolError);
        } else if window > i64::from(MAX_WINDOW_SIZE) {
            self.reset_stream(stream_id, ErrorCode::FlowControlError);
        } else {
            self.flush_stream(stream_id);
        }
        Ok(())
    }

    /// The peer finished its side of the stream.
    fn finish_remote(&mut self, stream_id: u32) {
        if let Some(stream) = self.streams.remove(&stream_id) {
            if !stream.local_closed {
                // Response arrived before the request body was fully sent.
                Frame::RstStream {
                    stream_id,
                    code: ErrorCode::Cancel,
                }
                .encode(&mut self.outbound);
            }
            self.events.push_back(SessionEvent::StreamClosed {
                stream_id,
                reset: None,
            });
        }
    }

    fn reset_stream(&mut self, stream_id: u32, code: ErrorCode) {
        if self.streams.remove(&stream_id).is_some() {
            Frame::RstStream { stream_id, code }.encode(&mut self.outbound);
            self.events.push_back(SessionEvent::StreamClosed {
                stream_id,
                reset: Some(code),
            });
        }
    }

    fn write_headers(&mut self, stream_id: u32, headers: &Headers, end_stream: bool) {
        let block = self
            .encoder
            .encode(headers.iter().map(|(n, v)| (n.as_bytes(), v.as_bytes())));
        let max = self.remote.max_frame_size as usize;
        let mut chunks = block.chunks(max).peekable();
        let first = chunks.next().unwrap_or(&[]);
        Frame::Headers {
            stream_id,
            block: first.to_vec(),
            end_stream,
            end_headers: chunks.peek().is_none(),
        }
        .encode(&mut self.outbound);
        while let Some(chunk) = chunks.next() {
            Frame::Continuation {
                stream_id,
                block: chunk.to_vec(),
                end_headers: chunks.peek().is_none(),
            }
            .encode(&mut self.outbound);
        }
    }

    fn flush_all(&mut self) {
        let ids: Vec<u32> = self.streams.keys().copied().collect();
        for stream_id in ids {
            self.flush_stream(stream_id);
        }
    }

    /// Release as much pending body as both windows allow.
    fn flush_stream(&mut self, stream_id: u32) {
        let max_frame = self.remote.max_frame_size as usize;
        let Some(stream) = self.streams.get_mut(&stream_id) else {
            return;
        };
        while !stream.local_closed {
            let window = self.send_window.min(stream.send_window).max(0) as usize;
            let n = stream.pending.len().min(window).min(max_frame);
            let drained = n == stream.pending.len();
            if n == 0 && !(drained && stream.end_pending) {
                break;
            }
            let payload: Vec<u8> = stream.pending.drain(..n).collect();
            let end_stream = drained && stream.end_pending;
            Frame::Data {
                stream_id,
                payload,
                end_stream,
                flow_len: n as u32,
            }
            .encode(&mut self.outbound);
            self.send_window -= n as i64;
            stream.send_window -= n as i64;
            if end_stream {
                stream.end_pending = false;
                stream.local_closed = true;
            }
            if drained {
                break;
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("ready", &self.ready)
            .field("going_away", &self.going_away)
            .field("active_streams", &self.streams.len())
            .field("next_stream_id", &self.next_stream_id)
            .field("send_window", &self.send_window)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(mut bytes: &[u8]) -> Vec<Frame> {
        if bytes.starts_with(PREFACE) {
            bytes = &bytes[PREFACE.len()..];
        }
        let mut out = Vec::new();
        while let Some((frame, used)) = decode_frame(bytes, 1 << 20).unwrap() {
            out.push(frame);
            bytes = &bytes[used..];
        }
        assert!(bytes.is_empty(), "trailing bytes after last frame");
        out
    }

    fn encode(frames: &[Frame]) -> Vec<u8> {
        let mut buf = Vec::new();
        for frame in frames {
            frame.encode(&mut buf);
        }
        buf
    }

    fn server_settings(params: Vec<Setting>) -> Frame {
        Frame::Settings { ack: false, params }
    }

    fn ready_session(params: Vec<Setting>) -> Session {
        let mut session = Session::new(Settings::client());
        session.take_outgoing();
        session.feed(&encode(&[server_settings(params)])).unwrap();
        session.take_outgoing();
        while session.poll_event().is_some() {}
        session
    }

    #[test]
    fn preface_precedes_settings() {
        let mut session = Session::new(Settings::client());
        let out = session.take_outgoing();
        assert!(out.starts_with(PREFACE));
        match frames(&out).as_slice() {
            [Frame::Settings { ack: false, params }] => {
                assert!(params.contains(&Setting::EnablePush(false)));
            }
            other => panic!("unexpected frames {other:?}"),
        }
    }

    #[test]
    fn first_settings_make_session_ready() {
        let mut session = Session::new(Settings::client());
        session.take_outgoing();
        session
            .feed(&encode(&[server_settings(vec![Setting::MaxConcurrentStreams(7)])]))
            .unwrap();
        assert!(session.is_ready());
        assert_eq!(
            session.poll_event(),
            Some(SessionEvent::Ready {
                max_concurrent_streams: Some(7)
            })
        );
        assert_eq!(
            frames(&session.take_outgoing()),
            vec![Frame::Settings {
                ack: true,
                params: vec![]
            }]
        );

        session
            .feed(&encode(&[server_settings(vec![Setting::MaxConcurrentStreams(3)])]))
            .unwrap();
        assert_eq!(
            session.poll_event(),
            Some(SessionEvent::SettingsChanged {
                max_concurrent_streams: Some(3)
            })
        );
    }

    #[test]
    fn non_settings_preface_rejected() {
        let mut session = Session::new(Settings::client());
        session.take_outgoing();
        let ping = encode(&[Frame::Ping {
            ack: false,
            payload: [0; 8],
        }]);
        assert!(session.feed(&ping).is_err());
        assert!(matches!(
            frames(&session.take_outgoing()).as_slice(),
            [Frame::GoAway {
                code: ErrorCode::ProtocolError,
                ..
            }]
        ));
    }

    #[test]
    fn request_and_response_on_one_stream() {
        let mut session = ready_session(vec![]);
        let stream_id = session.open_stream().unwrap();
        assert_eq!(stream_id, 1);
        assert_eq!(session.open_stream().unwrap(), 3);

        let headers: Headers = [(":method", "POST"), (":path", "/3/device/abc")]
            .into_iter()
            .collect();
        session.send(stream_id, &headers, b"{}", true).unwrap();

        let sent = frames(&session.take_outgoing());
        let block = match &sent[0] {
            Frame::Headers {
                stream_id: 1,
                block,
                end_stream: false,
                end_headers: true,
            } => block.clone(),
            other => panic!("unexpected frame {other:?}"),
        };
        let decoded = Decoder::new().decode(&block).unwrap();
        assert_eq!(decoded[0], (b":method".to_vec(), b"POST".to_vec()));
        assert!(matches!(
            &sent[1],
            Frame::Data { stream_id: 1, end_stream: true, payload, .. } if payload == b"{}"
        ));

        let mut encoder = Encoder::new();
        let response_block = encoder.encode(vec![(&b":status"[..], &b"200"[..])]);
        session
            .feed(&encode(&[
                Frame::Headers {
                    stream_id: 1,
                    block: response_block,
                    end_stream: false,
                    end_headers: true,
                },
                Frame::Data {
                    stream_id: 1,
                    payload: b"ok".to_vec(),
                    end_stream: true,
                    flow_len: 2,
                },
            ]))
            .unwrap();

        match session.poll_event() {
            Some(SessionEvent::Headers { stream_id: 1, headers }) => {
                assert_eq!(headers.get(":status"), Some("200"));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(
            session.poll_event(),
            Some(SessionEvent::Data {
                stream_id: 1,
                data: b"ok".to_vec()
            })
        );
        assert_eq!(
            session.poll_event(),
            Some(SessionEvent::StreamClosed {
                stream_id: 1,
                reset: None
            })
        );
        assert_eq!(session.active_streams(), 1);
    }

    #[test]
    fn body_waits_for_window_update() {
        let mut session = ready_session(vec![Setting::InitialWindowSize(4)]);
        let stream_id = session.open_stream().unwrap();
        let headers: Headers = [(":method", "POST")].into_iter().collect();
        session.send(stream_id, &headers, b"0123456789", true).unwrap();

        let sent = frames(&session.take_outgoing());
        assert!(matches!(
            &sent[1],
            Frame::Data { end_stream: false, payload, .. } if payload == b"0123"
        ));
        assert_eq!(sent.len(), 2);

        session
            .feed(&encode(&[Frame::WindowUpdate {
                stream_id,
                increment: 100,
            }]))
            .unwrap();
        let sent = frames(&session.take_outgoing());
        assert!(matches!(
            sent.as_slice(),
            [Frame::Data { end_stream: true, payload, .. }] if payload == b"456789"
        ));
    }

    #[test]
    fn headers_only_request_ends_stream() {
        let mut session = ready_session(vec![]);
        let stream_id = session.open_stream().unwrap();
        let headers: Headers = [(":method", "POST")].into_iter().collect();
        session.send(stream_id, &headers, b"", true).unwrap();
        assert!(matches!(
            frames(&session.take_outgoing()).as_slice(),
            [Frame::Headers {
                end_stream: true,
                ..
            }]
        ));
        assert!(session.send(stream_id, &headers, b"", true).is_err());
    }

    #[test]
    fn ping_is_acknowledged_and_pong_reported() {
        let mut session = ready_session(vec![]);
        session
            .feed(&encode(&[Frame::Ping {
                ack: false,
                payload: [1; 8],
            }]))
            .unwrap();
        assert_eq!(
            frames(&session.take_outgoing()),
            vec![Frame::Ping {
                ack: true,
                payload: [1; 8]
            }]
        );

        session.ping([9; 8]);
        session.take_outgoing();
        session
            .feed(&encode(&[Frame::Ping {
                ack: true,
                payload: [9; 8],
            }]))
            .unwrap();
        assert_eq!(
            session.poll_event(),
            Some(SessionEvent::Pong { payload: [9; 8] })
        );
    }

    #[test]
    fn reset_stream_reports_code() {
        let mut session = ready_session(vec![]);
        let stream_id = session.open_stream().unwrap();
        session
            .feed(&encode(&[Frame::RstStream {
                stream_id,
                code: ErrorCode::RefusedStream,
            }]))
            .unwrap();
        assert_eq!(
            session.poll_event(),
            Some(SessionEvent::StreamClosed {
                stream_id,
                reset: Some(ErrorCode::RefusedStream)
            })
        );
        assert_eq!(session.active_streams(), 0);
    }

    #[test]
    fn goaway_blocks_new_streams() {
        let mut session = ready_session(vec![]);
        session
            .feed(&encode(&[Frame::GoAway {
                last_stream_id: 0,
                code: ErrorCode::NoError,
                debug_data: vec![],
            }]))
            .unwrap();
        assert!(matches!(
            session.poll_event(),
            Some(SessionEvent::GoAway {
                code: ErrorCode::NoError,
                ..
            })
        ));
        assert_eq!(session.open_stream(), Err(ProtocolError::GoingAway));
    }

    #[test]
    fn data_on_idle_stream_is_fatal() {
        let mut session = ready_session(vec![]);
        let data = encode(&[Frame::Data {
            stream_id: 5,
            payload: b"x".to_vec(),
            end_stream: false,
            flow_len: 1,
        }]);
        assert!(matches!(
            session.feed(&data),
            Err(ProtocolError::Violation(_))
        ));
    }

    #[test]
    fn frames_split_across_reads() {
        let mut session = Session::new(Settings::client());
        let bytes = encode(&[server_settings(vec![Setting::MaxConcurrentStreams(2)])]);
        let (head, tail) = bytes.split_at(4);
        session.feed(head).unwrap();
        assert!(!session.is_ready());
        session.feed(tail).unwrap();
        assert!(session.is_ready());
    }
}
