//! HTTP/2 framing subsystem.
//!
//! # Data Flow
//! ```text
//! bytes from transport
//!     → session.rs feed() (buffer, split into frames)
//!     → frame.rs decode_frame() (9-byte header + typed payload)
//!     → session.rs (HPACK decode, stream table, flow control)
//!     → SessionEvent queue → connection worker
//!
//! connection worker → open_stream() / send() / ping()
//!     → frame.rs encode → outgoing buffer → take_outgoing() → transport
//! ```
//!
//! # Design Decisions
//! - Sans-IO: the session never touches a socket, so it is driven the same
//!   way by the TLS transport and by in-memory test peers
//! - Only the client half of the protocol is implemented; server push is
//!   disabled in our SETTINGS and PUSH_PROMISE is a protocol error
//! - Received DATA is credited back immediately with WINDOW_UPDATE
//! - Header compression uses `fluke-hpack`

pub mod error;
pub mod frame;
pub mod headers;
pub mod session;
pub mod settings;

pub use error::{ErrorCode, ProtocolError};
pub use headers::Headers;
pub use session::{Session, SessionEvent};
pub use settings::Settings;
