//! Frame encoding and decoding.
//!
//! Every frame starts with a fixed 9-byte header:
//! ```text
//! +-----------------------------------------------+
//! |                 Length (24)                   |
//! +---------------+---------------+---------------+
//! |   Type (8)    |   Flags (8)   |
//! +-+-------------+---------------+-------------------------------+
//! |R|                 Stream Identifier (31)                      |
//! +-+-------------------------------------------------------------+
//! |                   Frame Payload ...                           |
//! +---------------------------------------------------------------+
//! ```

use crate::protocol::error::{ErrorCode, ProtocolError};
use crate::protocol::settings::{decode_settings, encode_settings, Setting};

/// Size of the fixed frame header.
pub const FRAME_HEADER_LEN: usize = 9;

/// Client connection preface, sent before the first SETTINGS frame.
pub const PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

const TYPE_DATA: u8 = 0x0;
const TYPE_HEADERS: u8 = 0x1;
const TYPE_PRIORITY: u8 = 0x2;
const TYPE_RST_STREAM: u8 = 0x3;
const TYPE_SETTINGS: u8 = 0x4;
const TYPE_PUSH_PROMISE: u8 = 0x5;
const TYPE_PING: u8 = 0x6;
const TYPE_GOAWAY: u8 = 0x7;
const TYPE_WINDOW_UPDATE: u8 = 0x8;
const TYPE_CONTINUATION: u8 = 0x9;

const FLAG_END_STREAM: u8 = 0x1;
const FLAG_ACK: u8 = 0x1;
const FLAG_END_HEADERS: u8 = 0x4;
const FLAG_PADDED: u8 = 0x8;
const FLAG_PRIORITY: u8 = 0x20;

const STREAM_ID_MASK: u32 = 0x7fff_ffff;

/// A decoded frame.
///
/// PRIORITY frames and unknown frame types decode to [`Frame::Ignored`];
/// a push client never acts on them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data {
        stream_id: u32,
        payload: Vec<u8>,
        end_stream: bool,
        /// Bytes counted against flow control, including padding.
        flow_len: u32,
    },
    Headers {
        stream_id: u32,
        block: Vec<u8>,
        end_stream: bool,
        end_headers: bool,
    },
    RstStream {
        stream_id: u32,
        code: ErrorCode,
    },
    Settings {
        ack: bool,
        params: Vec<Setting>,
    },
    PushPromise {
        stream_id: u32,
    },
    Ping {
        ack: bool,
        payload: [u8; 8],
    },
    GoAway {
        last_stream_id: u32,
        code: ErrorCode,
        debug_data: Vec<u8>,
    },
    WindowUpdate {
        stream_id: u32,
        increment: u32,
    },
    Continuation {
        stream_id: u32,
        block: Vec<u8>,
        end_headers: bool,
    },
    Ignored {
        frame_type: u8,
        stream_id: u32,
    },
}

/// The fixed-size header preceding every frame payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: u32,
    pub frame_type: u8,
    pub flags: u8,
    pub stream_id: u32,
}

impl FrameHeader {
    /// Parse a header from the start of `buf`, or `None` if it is short.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        let head = buf.get(..FRAME_HEADER_LEN)?;
        Some(Self {
            length: u32::from_be_bytes([0, head[0], head[1], head[2]]),
            frame_type: head[3],
            flags: head[4],
            stream_id: read_u32(&head[5..9]) & STREAM_ID_MASK,
        })
    }

    fn write(self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.length.to_be_bytes()[1..]);
        buf.push(self.frame_type);
        buf.push(self.flags);
        buf.extend_from_slice(&(self.stream_id & STREAM_ID_MASK).to_be_bytes());
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn put_frame(buf: &mut Vec<u8>, frame_type: u8, flags: u8, stream_id: u32, payload: &[u8]) {
    FrameHeader {
        length: payload.len() as u32,
        frame_type,
        flags,
        stream_id,
    }
    .write(buf);
    buf.extend_from_slice(payload);
}

fn flag(set: bool, bit: u8) -> u8 {
    if set {
        bit
    } else {
        0
    }
}

impl Frame {
    /// Append the wire encoding of this frame to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            Frame::Data {
                stream_id,
                payload,
                end_stream,
                ..
            } => put_frame(
                buf,
                TYPE_DATA,
                flag(*end_stream, FLAG_END_STREAM),
                *stream_id,
                payload,
            ),
            Frame::Headers {
                stream_id,
                block,
                end_stream,
                end_headers,
            } => put_frame(
                buf,
                TYPE_HEADERS,
                flag(*end_stream, FLAG_END_STREAM) | flag(*end_headers, FLAG_END_HEADERS),
                *stream_id,
                block,
            ),
            Frame::RstStream { stream_id, code } => put_frame(
                buf,
                TYPE_RST_STREAM,
                0,
                *stream_id,
                &code.as_u32().to_be_bytes(),
            ),
            Frame::Settings { ack, params } => {
                let mut payload = Vec::with_capacity(params.len() * 6);
                if !ack {
                    encode_settings(params, &mut payload);
                }
                put_frame(buf, TYPE_SETTINGS, flag(*ack, FLAG_ACK), 0, &payload);
            }
            Frame::PushPromise { stream_id } => {
                put_frame(buf, TYPE_PUSH_PROMISE, FLAG_END_HEADERS, *stream_id, &[0; 4])
            }
            Frame::Ping { ack, payload } => {
                put_frame(buf, TYPE_PING, flag(*ack, FLAG_ACK), 0, payload)
            }
            Frame::GoAway {
                last_stream_id,
                code,
                debug_data,
            } => {
                let mut payload = Vec::with_capacity(8 + debug_data.len());
                payload.extend_from_slice(&(last_stream_id & STREAM_ID_MASK).to_be_bytes());
                payload.extend_from_slice(&code.as_u32().to_be_bytes());
                payload.extend_from_slice(debug_data);
                put_frame(buf, TYPE_GOAWAY, 0, 0, &payload);
            }
            Frame::WindowUpdate {
                stream_id,
                increment,
            } => put_frame(
                buf,
                TYPE_WINDOW_UPDATE,
                0,
                *stream_id,
                &(increment & STREAM_ID_MASK).to_be_bytes(),
            ),
            Frame::Continuation {
                stream_id,
                block,
                end_headers,
            } => put_frame(
                buf,
                TYPE_CONTINUATION,
                flag(*end_headers, FLAG_END_HEADERS),
                *stream_id,
                block,
            ),
            Frame::Ignored {
                frame_type,
                stream_id,
            } => put_frame(buf, *frame_type, 0, *stream_id, &[]),
        }
    }
}

/// Remove padding from a DATA/HEADERS payload when the PADDED flag is set.
fn strip_padding(payload: &[u8], flags: u8) -> Result<&[u8], ProtocolError> {
    if flags & FLAG_PADDED == 0 {
        return Ok(payload);
    }
    let (&pad_len, rest) = payload.split_first().ok_or(ProtocolError::FrameSize)?;
    let pad_len = usize::from(pad_len);
    if pad_len > rest.len() {
        return Err(ProtocolError::Violation("padding exceeds frame payload".into()));
    }
    Ok(&rest[..rest.len() - pad_len])
}

fn require_stream(stream_id: u32, what: &str) -> Result<(), ProtocolError> {
    if stream_id == 0 {
        return Err(ProtocolError::Violation(format!("{what} on stream 0")));
    }
    Ok(())
}

fn require_connection(stream_id: u32, what: &str) -> Result<(), ProtocolError> {
    if stream_id != 0 {
        return Err(ProtocolError::Violation(format!("{what} on stream {stream_id}")));
    }
    Ok(())
}

/// Decode one frame from the start of `buf`.
///
/// Returns `Ok(None)` when more bytes are needed, otherwise the frame and
/// the number of bytes it occupied.
pub fn decode_frame(buf: &[u8], max_frame_size: u32) -> Result<Option<(Frame, usize)>, ProtocolError> {
    let Some(header) = FrameHeader::parse(buf) else {
        return Ok(None);
    };
    if header.length > max_frame_size {
        return Err(ProtocolError::FrameSize);
    }
    let total = FRAME_HEADER_LEN + header.length as usize;
    let Some(payload) = buf.get(FRAME_HEADER_LEN..total) else {
        return Ok(None);
    };

    let FrameHeader {
        frame_type,
        flags,
        stream_id,
        ..
    } = header;

    let frame = match frame_type {
        TYPE_DATA => {
            require_stream(stream_id, "DATA")?;
            Frame::Data {
                stream_id,
                payload: strip_padding(payload, flags)?.to_vec(),
                end_stream: flags & FLAG_END_STREAM != 0,
                flow_len: header.length,
            }
        }
        TYPE_HEADERS => {
            require_stream(stream_id, "HEADERS")?;
            let mut block = strip_padding(payload, flags)?;
            if flags & FLAG_PRIORITY != 0 {
                block = block.get(5..).ok_or(ProtocolError::FrameSize)?;
            }
            Frame::Headers {
                stream_id,
                block: block.to_vec(),
                end_stream: flags & FLAG_END_STREAM != 0,
                end_headers: flags & FLAG_END_HEADERS != 0,
            }
        }
        TYPE_PRIORITY => {
            require_stream(stream_id, "PRIORITY")?;
            if payload.len() != 5 {
                return Err(ProtocolError::FrameSize);
            }
            Frame::Ignored {
                frame_type,
                stream_id,
            }
        }
        TYPE_RST_STREAM => {
            require_stream(stream_id, "RST_STREAM")?;
            if payload.len() != 4 {
                return Err(ProtocolError::FrameSize);
            }
            Frame::RstStream {
                stream_id,
                code: ErrorCode::from_u32(read_u32(payload)),
            }
        }
        TYPE_SETTINGS => {
            require_connection(stream_id, "SETTINGS")?;
            let ack = flags & FLAG_ACK != 0;
            if ack && !payload.is_empty() {
                return Err(ProtocolError::FrameSize);
            }
            Frame::Settings {
                ack,
                params: if ack { Vec::new() } else { decode_settings(payload)? },
            }
        }
        TYPE_PUSH_PROMISE => {
            require_stream(stream_id, "PUSH_PROMISE")?;
            Frame::PushPromise { stream_id }
        }
        TYPE_PING => {
            require_connection(stream_id, "PING")?;
            let payload: [u8; 8] = payload.try_into().map_err(|_| ProtocolError::FrameSize)?;
            Frame::Ping {
                ack: flags & FLAG_ACK != 0,
                payload,
            }
        }
        TYPE_GOAWAY => {
            require_connection(stream_id, "GOAWAY")?;
            if payload.len() < 8 {
                return Err(ProtocolError::FrameSize);
            }
            Frame::GoAway {
                last_stream_id: read_u32(&payload[..4]) & STREAM_ID_MASK,
                code: ErrorCode::from_u32(read_u32(&payload[4..8])),
                debug_data: payload[8..].to_vec(),
            }
        }
        TYPE_WINDOW_UPDATE => {
            if payload.len() != 4 {
                return Err(ProtocolError::FrameSize);
            }
            Frame::WindowUpdate {
                stream_id,
                increment: read_u32(payload) & STREAM_ID_MASK,
            }
        }
        TYPE_CONTINUATION => {
            require_stream(stream_id, "CONTINUATION")?;
            Frame::Continuation {
                stream_id,
                block: payload.to_vec(),
                end_headers: flags & FLAG_END_HEADERS != 0,
            }
        }
        _ => Frame::Ignored {
            frame_type,
            stream_id,
        },
    };

    Ok(Some((frame, total)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_one(bytes: &[u8]) -> Frame {
        let (frame, used) = decode_frame(bytes, 16_384).unwrap().unwrap();
        assert_eq!(used, bytes.len());
        frame
    }

    #[test]
    fn header_layout() {
        let mut buf = Vec::new();
        Frame::WindowUpdate {
            stream_id: 3,
            increment: 1024,
        }
        .encode(&mut buf);
        assert_eq!(&buf[..FRAME_HEADER_LEN], &[0, 0, 4, 0x8, 0, 0, 0, 0, 3]);
        let header = FrameHeader::parse(&buf).unwrap();
        assert_eq!(header.length, 4);
        assert_eq!(header.stream_id, 3);
    }

    #[test]
    fn incomplete_input_needs_more() {
        let mut buf = Vec::new();
        Frame::Ping {
            ack: false,
            payload: [7; 8],
        }
        .encode(&mut buf);
        assert_eq!(decode_frame(&buf[..5], 16_384).unwrap(), None);
        assert_eq!(decode_frame(&buf[..12], 16_384).unwrap(), None);
    }

    #[test]
    fn data_end_stream_flag() {
        let mut buf = Vec::new();
        Frame::Data {
            stream_id: 1,
            payload: b"{}".to_vec(),
            end_stream: true,
            flow_len: 2,
        }
        .encode(&mut buf);
        match decode_one(&buf) {
            Frame::Data {
                stream_id,
                payload,
                end_stream,
                flow_len,
            } => {
                assert_eq!(stream_id, 1);
                assert_eq!(payload, b"{}");
                assert!(end_stream);
                assert_eq!(flow_len, 2);
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn padded_data_counts_padding_against_flow_control() {
        // length 6: pad length byte, 2 data bytes, 3 padding bytes
        let bytes = [0, 0, 6, TYPE_DATA, FLAG_PADDED, 0, 0, 0, 1, 3, b'o', b'k', 0, 0, 0];
        match decode_one(&bytes) {
            Frame::Data {
                payload, flow_len, ..
            } => {
                assert_eq!(payload, b"ok");
                assert_eq!(flow_len, 6);
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn headers_with_priority_block_skipped() {
        let bytes = [
            0, 0, 6, TYPE_HEADERS, FLAG_PRIORITY | FLAG_END_HEADERS, 0, 0, 0, 1, 0, 0, 0, 0, 16,
            0x88,
        ];
        match decode_one(&bytes) {
            Frame::Headers {
                block, end_headers, ..
            } => {
                assert_eq!(block, vec![0x88]);
                assert!(end_headers);
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn goaway_fields() {
        let mut buf = Vec::new();
        Frame::GoAway {
            last_stream_id: 9,
            code: ErrorCode::EnhanceYourCalm,
            debug_data: b"slow down".to_vec(),
        }
        .encode(&mut buf);
        assert_eq!(
            decode_one(&buf),
            Frame::GoAway {
                last_stream_id: 9,
                code: ErrorCode::EnhanceYourCalm,
                debug_data: b"slow down".to_vec(),
            }
        );
    }

    #[test]
    fn stream_zero_rules_enforced() {
        let data_on_zero = [0, 0, 0, TYPE_DATA, 0, 0, 0, 0, 0];
        assert!(decode_frame(&data_on_zero, 16_384).is_err());

        let ping_on_stream = [0, 0, 8, TYPE_PING, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(decode_frame(&ping_on_stream, 16_384).is_err());
    }

    #[test]
    fn oversized_frame_rejected() {
        let header = [0, 0x40, 0x01, TYPE_DATA, 0, 0, 0, 0, 1];
        assert_eq!(decode_frame(&header, 16_384), Err(ProtocolError::FrameSize));
    }

    #[test]
    fn unknown_type_ignored() {
        let bytes = [0, 0, 1, 0xfa, 0, 0, 0, 0, 0, 0xff];
        assert_eq!(
            decode_one(&bytes),
            Frame::Ignored {
                frame_type: 0xfa,
                stream_id: 0
            }
        );
    }

    #[test]
    fn settings_ack_has_no_payload() {
        let mut buf = Vec::new();
        Frame::Settings {
            ack: true,
            params: Vec::new(),
        }
        .encode(&mut buf);
        assert_eq!(buf, vec![0, 0, 0, TYPE_SETTINGS, FLAG_ACK, 0, 0, 0, 0]);
    }
}
