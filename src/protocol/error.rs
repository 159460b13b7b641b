//! Wire-level error codes and framing errors.

use thiserror::Error;

/// HTTP/2 error codes carried by RST_STREAM and GOAWAY frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    NoError = 0x0,
    ProtocolError = 0x1,
    InternalError = 0x2,
    FlowControlError = 0x3,
    SettingsTimeout = 0x4,
    StreamClosed = 0x5,
    FrameSizeError = 0x6,
    RefusedStream = 0x7,
    Cancel = 0x8,
    CompressionError = 0x9,
    ConnectError = 0xa,
    EnhanceYourCalm = 0xb,
    InadequateSecurity = 0xc,
    Http11Required = 0xd,
}

impl ErrorCode {
    /// Map a raw code to a known variant. Unknown codes are treated as
    /// `InternalError`.
    pub fn from_u32(raw: u32) -> Self {
        const KNOWN: [ErrorCode; 14] = [
            ErrorCode::NoError,
            ErrorCode::ProtocolError,
            ErrorCode::InternalError,
            ErrorCode::FlowControlError,
            ErrorCode::SettingsTimeout,
            ErrorCode::StreamClosed,
            ErrorCode::FrameSizeError,
            ErrorCode::RefusedStream,
            ErrorCode::Cancel,
            ErrorCode::CompressionError,
            ErrorCode::ConnectError,
            ErrorCode::EnhanceYourCalm,
            ErrorCode::InadequateSecurity,
            ErrorCode::Http11Required,
        ];
        KNOWN
            .get(raw as usize)
            .copied()
            .unwrap_or(ErrorCode::InternalError)
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCode::NoError => "NO_ERROR",
            ErrorCode::ProtocolError => "PROTOCOL_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::FlowControlError => "FLOW_CONTROL_ERROR",
            ErrorCode::SettingsTimeout => "SETTINGS_TIMEOUT",
            ErrorCode::StreamClosed => "STREAM_CLOSED",
            ErrorCode::FrameSizeError => "FRAME_SIZE_ERROR",
            ErrorCode::RefusedStream => "REFUSED_STREAM",
            ErrorCode::Cancel => "CANCEL",
            ErrorCode::CompressionError => "COMPRESSION_ERROR",
            ErrorCode::ConnectError => "CONNECT_ERROR",
            ErrorCode::EnhanceYourCalm => "ENHANCE_YOUR_CALM",
            ErrorCode::InadequateSecurity => "INADEQUATE_SECURITY",
            ErrorCode::Http11Required => "HTTP_1_1_REQUIRED",
        };
        f.write_str(name)
    }
}

/// Errors raised while decoding or driving an HTTP/2 session.
///
/// Every variant is connection-fatal: the session cannot continue once
/// one of these has been returned.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// A frame exceeded the negotiated maximum or had the wrong length.
    #[error("frame size error")]
    FrameSize,

    /// The peer violated framing or stream-state rules.
    #[error("protocol violation: {0}")]
    Violation(String),

    /// An HPACK header block could not be decoded.
    #[error("header compression error: {0}")]
    Compression(String),

    /// A flow-control window overflowed.
    #[error("flow control window overflow")]
    FlowControl,

    /// Client stream identifiers have been used up.
    #[error("stream identifiers exhausted")]
    StreamIdsExhausted,

    /// The peer sent GOAWAY, so no new streams may be opened.
    #[error("session is going away")]
    GoingAway,

    /// An operation referenced a stream this session does not know.
    #[error("stream {0} is not open")]
    UnknownStream(u32),
}

impl ProtocolError {
    /// Error code to report to the peer in a GOAWAY frame.
    pub fn code(&self) -> ErrorCode {
        match self {
            ProtocolError::FrameSize => ErrorCode::FrameSizeError,
            ProtocolError::Compression(_) => ErrorCode::CompressionError,
            ProtocolError::FlowControl => ErrorCode::FlowControlError,
            ProtocolError::StreamIdsExhausted | ProtocolError::GoingAway => ErrorCode::NoError,
            ProtocolError::Violation(_) | ProtocolError::UnknownStream(_) => {
                ErrorCode::ProtocolError
            }
        }
    }
}
