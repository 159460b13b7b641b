//! Push notifications and their wire formatting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Map, Value};
use uuid::Uuid;

/// Payload keys that belong in the `aps` dictionary.
pub const APS_KEYS: [&str; 5] = ["alert", "badge", "sound", "content-available", "category"];

static ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Next process-wide notification id.
pub fn generate_id() -> u64 {
    ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Canonical 8-4-4-4-12 lowercase hex form of `id`.
pub fn format_id(id: u128) -> String {
    Uuid::from_u128(id).hyphenated().to_string()
}

/// A notification addressed to one device token.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    token: String,
    id: String,
    expiration: Option<SystemTime>,
    priority: Option<u8>,
    topic: Option<String>,
    payload: Option<Map<String, Value>>,
}

impl Notification {
    /// A notification for `token` with a freshly generated id.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            id: format_id(u128::from(generate_id())),
            expiration: None,
            priority: None,
            topic: None,
            payload: None,
        }
    }

    /// Use a caller-chosen id. It is sent as given.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Keep retrying delivery until `expiration`. Without it the gateway
    /// tries once.
    pub fn with_expiration(mut self, expiration: SystemTime) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// 10 delivers immediately, 5 respects the device's power state.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_payload(mut self, payload: Map<String, Value>) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// The id sent in the `apns-id` header.
    pub fn formatted_id(&self) -> &str {
        &self.id
    }

    pub fn expiration(&self) -> Option<SystemTime> {
        self.expiration
    }

    /// Expiration as unix seconds, 0 when unset.
    pub fn expiration_secs(&self) -> u64 {
        self.expiration
            .and_then(|at| at.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |elapsed| elapsed.as_secs())
    }

    pub fn priority(&self) -> Option<u8> {
        self.priority
    }

    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    pub fn payload(&self) -> Option<&Map<String, Value>> {
        self.payload.as_ref()
    }

    /// Whether there is enough to send: a token and a payload.
    pub fn is_valid(&self) -> bool {
        !self.token.is_empty() && self.payload.is_some()
    }

    /// The payload laid out for the gateway.
    ///
    /// A payload that already has an `aps` entry is returned as is.
    /// Otherwise the well-known keys move under `aps`, everything else
    /// stays at the top level and null values are dropped.
    pub fn formatted_payload(&self) -> Map<String, Value> {
        let Some(payload) = &self.payload else {
            return Map::new();
        };
        if payload.contains_key("aps") {
            return payload.clone();
        }

        let mut aps = Map::new();
        let mut formatted = Map::new();
        for (key, value) in payload {
            if value.is_null() {
                continue;
            }
            if APS_KEYS.contains(&key.as_str()) {
                aps.insert(key.clone(), value.clone());
            } else {
                formatted.insert(key.clone(), value.clone());
            }
        }
        formatted.insert("aps".to_string(), Value::Object(aps));
        formatted
    }
}
