//! SETTINGS parameters exchanged during the handshake.

use crate::protocol::error::ProtocolError;

const HEADER_TABLE_SIZE: u16 = 0x1;
const ENABLE_PUSH: u16 = 0x2;
const MAX_CONCURRENT_STREAMS: u16 = 0x3;
const INITIAL_WINDOW_SIZE: u16 = 0x4;
const MAX_FRAME_SIZE: u16 = 0x5;
const MAX_HEADER_LIST_SIZE: u16 = 0x6;

/// Largest flow-control window permitted by the protocol.
pub const MAX_WINDOW_SIZE: u32 = 0x7fff_ffff;

/// Smallest and largest legal SETTINGS_MAX_FRAME_SIZE values.
pub const MIN_FRAME_SIZE: u32 = 16_384;
pub const MAX_FRAME_SIZE_LIMIT: u32 = 16_777_215;

/// A single SETTINGS parameter as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setting {
    HeaderTableSize(u32),
    EnablePush(bool),
    MaxConcurrentStreams(u32),
    InitialWindowSize(u32),
    MaxFrameSize(u32),
    MaxHeaderListSize(u32),
}

impl Setting {
    fn id_and_value(self) -> (u16, u32) {
        match self {
            Setting::HeaderTableSize(v) => (HEADER_TABLE_SIZE, v),
            Setting::EnablePush(v) => (ENABLE_PUSH, u32::from(v)),
            Setting::MaxConcurrentStreams(v) => (MAX_CONCURRENT_STREAMS, v),
            Setting::InitialWindowSize(v) => (INITIAL_WINDOW_SIZE, v),
            Setting::MaxFrameSize(v) => (MAX_FRAME_SIZE, v),
            Setting::MaxHeaderListSize(v) => (MAX_HEADER_LIST_SIZE, v),
        }
    }

    fn parse(id: u16, value: u32) -> Result<Option<Self>, ProtocolError> {
        let setting = match id {
            HEADER_TABLE_SIZE => Setting::HeaderTableSize(value),
            ENABLE_PUSH => match value {
                0 => Setting::EnablePush(false),
                1 => Setting::EnablePush(true),
                _ => return Err(ProtocolError::Violation("ENABLE_PUSH must be 0 or 1".into())),
            },
            MAX_CONCURRENT_STREAMS => Setting::MaxConcurrentStreams(value),
            INITIAL_WINDOW_SIZE => {
                if value > MAX_WINDOW_SIZE {
                    return Err(ProtocolError::FlowControl);
                }
                Setting::InitialWindowSize(value)
            }
            MAX_FRAME_SIZE => {
                if !(MIN_FRAME_SIZE..=MAX_FRAME_SIZE_LIMIT).contains(&value) {
                    return Err(ProtocolError::Violation("MAX_FRAME_SIZE out of range".into()));
                }
                Setting::MaxFrameSize(value)
            }
            MAX_HEADER_LIST_SIZE => Setting::MaxHeaderListSize(value),
            // Unknown identifiers are ignored.
            _ => return Ok(None),
        };
        Ok(Some(setting))
    }
}

/// Encode parameters as 6-byte `(id, value)` pairs.
pub fn encode_settings(params: &[Setting], buf: &mut Vec<u8>) {
    for param in params {
        let (id, value) = param.id_and_value();
        buf.extend_from_slice(&id.to_be_bytes());
        buf.extend_from_slice(&value.to_be_bytes());
    }
}

/// Decode a SETTINGS payload into its parameters, in wire order.
pub fn decode_settings(payload: &[u8]) -> Result<Vec<Setting>, ProtocolError> {
    if payload.len() % 6 != 0 {
        return Err(ProtocolError::FrameSize);
    }
    let mut params = Vec::with_capacity(payload.len() / 6);
    for pair in payload.chunks_exact(6) {
        let id = u16::from_be_bytes([pair[0], pair[1]]);
        let value = u32::from_be_bytes([pair[2], pair[3], pair[4], pair[5]]);
        if let Some(setting) = Setting::parse(id, value)? {
            params.push(setting);
        }
    }
    Ok(params)
}

/// The effective settings of one side of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub header_table_size: u32,
    pub enable_push: bool,
    /// `None` until the peer declares a limit.
    pub max_concurrent_streams: Option<u32>,
    pub initial_window_size: u32,
    pub max_frame_size: u32,
    pub max_header_list_size: Option<u32>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            header_table_size: 4096,
            enable_push: true,
            max_concurrent_streams: None,
            initial_window_size: 65_535,
            max_frame_size: MIN_FRAME_SIZE,
            max_header_list_size: None,
        }
    }
}

impl Settings {
    /// Settings a push client advertises: server push disabled.
    pub fn client() -> Self {
        Self {
            enable_push: false,
            ..Self::default()
        }
    }

    /// Parameters to advertise in the initial SETTINGS frame.
    pub fn to_params(&self) -> Vec<Setting> {
        let mut params = vec![
            Setting::HeaderTableSize(self.header_table_size),
            Setting::EnablePush(self.enable_push),
        ];
        if let Some(limit) = self.max_concurrent_streams {
            params.push(Setting::MaxConcurrentStreams(limit));
        }
        params.push(Setting::InitialWindowSize(self.initial_window_size));
        params.push(Setting::MaxFrameSize(self.max_frame_size));
        if let Some(limit) = self.max_header_list_size {
            params.push(Setting::MaxHeaderListSize(limit));
        }
        params
    }

    /// Apply a received update. Parameters not present keep their value.
    pub fn apply(&mut self, params: &[Setting]) {
        for param in params {
            match *param {
                Setting::HeaderTableSize(v) => self.header_table_size = v,
                Setting::EnablePush(v) => self.enable_push = v,
                Setting::MaxConcurrentStreams(v) => self.max_concurrent_streams = Some(v),
                Setting::InitialWindowSize(v) => self.initial_window_size = v,
                Setting::MaxFrameSize(v) => self.max_frame_size = v,
                Setting::MaxHeaderListSize(v) => self.max_header_list_size = Some(v),
            }
        }
    }
}
