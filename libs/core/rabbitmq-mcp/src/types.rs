//! Wire types for the RabbitMQ management API
//!
//! Only the fields the tools read are modelled; everything else in the
//! API responses is ignored. Numeric counters are optional because the
//! management plugin omits them for queues that have not reported stats yet.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serialize};
use std::borrow::Cow;

/// Raw header table as delivered by the broker
pub type Headers = serde_json::Map<String, serde_json::Value>;

/// A message fetched from a queue via `/api/queues/{vhost}/{queue}/get`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub payload: String,
    #[serde(default)]
    pub payload_bytes: u64,
    #[serde(default = "default_payload_encoding")]
    pub payload_encoding: String,
    #[serde(default, deserialize_with = "properties_or_empty")]
    pub properties: MessageProperties,
    #[serde(default)]
    pub exchange: String,
    #[serde(default)]
    pub routing_key: String,
    #[serde(default)]
    pub redelivered: bool,
    /// Messages left in the queue after this one was fetched
    #[serde(default)]
    pub message_count: u64,
}

fn default_payload_encoding() -> String {
    "string".to_string()
}

impl Message {
    /// Message with a plain string payload
    pub fn new(payload: impl Into<String>) -> Self {
        let payload = payload.into();
        Self {
            payload_bytes: payload.len() as u64,
            payload,
            payload_encoding: default_payload_encoding(),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.properties.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_route(mut self, exchange: impl Into<String>, routing_key: impl Into<String>) -> Self {
        self.exchange = exchange.into();
        self.routing_key = routing_key.into();
        self
    }

    pub fn headers(&self) -> &Headers {
        &self.properties.headers
    }

    /// Payload as text. Base64 payloads (non UTF-8 bodies) are decoded lossily.
    pub fn payload_text(&self) -> Cow<'_, str> {
        if self.payload_encoding == "base64" {
            match STANDARD.decode(self.payload.as_bytes()) {
                Ok(bytes) => Cow::Owned(String::from_utf8_lossy(&bytes).into_owned()),
                Err(_) => Cow::Borrowed(&self.payload),
            }
        } else {
            Cow::Borrowed(&self.payload)
        }
    }
}

/// AMQP basic properties subset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_mode: Option<u8>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub headers: Headers,
}

/// The management API renders empty properties as `[]` instead of `{}`.
fn properties_or_empty<'de, D>(deserializer: D) -> Result<MessageProperties, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Object(_) => {
            serde_json::from_value(value).map_err(serde::de::Error::custom)
        }
        _ => Ok(MessageProperties::default()),
    }
}

/// Ack mode for `get`: requeue keeps messages in place, consume removes them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AckMode {
    #[serde(rename = "ack_requeue_true")]
    Requeue,
    #[serde(rename = "ack_requeue_false")]
    Consume,
}

impl AckMode {
    pub fn is_destructive(&self) -> bool {
        matches!(self, AckMode::Consume)
    }
}

/// Body of `/api/queues/{vhost}/{queue}/get`
#[derive(Debug, Clone, Serialize)]
pub struct GetRequest {
    pub count: u32,
    pub ackmode: AckMode,
    pub encoding: &'static str,
}

impl GetRequest {
    pub fn new(count: u32, ackmode: AckMode) -> Self {
        Self {
            count,
            ackmode,
            encoding: "auto",
        }
    }
}

/// Body of `/api/exchanges/{vhost}/{exchange}/publish`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishMessage {
    pub properties: MessageProperties,
    pub routing_key: String,
    pub payload: String,
    pub payload_encoding: String,
}

impl PublishMessage {
    /// Re-send a fetched message unchanged: same bytes, same encoding,
    /// forwarding content type, delivery mode, headers and message id.
    pub fn republish_of(message: &Message, routing_key: impl Into<String>) -> Self {
        let source = &message.properties;
        Self {
            properties: MessageProperties {
                content_type: Some(
                    source
                        .content_type
                        .clone()
                        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
                ),
                message_id: source.message_id.clone(),
                delivery_mode: source.delivery_mode,
                headers: source.headers.clone(),
                ..Default::default()
            },
            routing_key: routing_key.into(),
            payload: message.payload.clone(),
            payload_encoding: message.payload_encoding.clone(),
        }
    }
}

pub const DEFAULT_CONTENT_TYPE: &str = "application/vnd.masstransit+json";

#[derive(Debug, Clone, Deserialize)]
pub struct PublishResponse {
    #[serde(default)]
    pub routed: bool,
}

/// `/api/overview`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Overview {
    #[serde(default)]
    pub rabbitmq_version: Option<String>,
    #[serde(default)]
    pub erlang_version: Option<String>,
    #[serde(default)]
    pub cluster_name: Option<String>,
    #[serde(default)]
    pub queue_totals: QueueTotals,
    #[serde(default)]
    pub object_totals: ObjectTotals,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueTotals {
    #[serde(default)]
    pub messages: Option<u64>,
    #[serde(default)]
    pub messages_ready: Option<u64>,
    #[serde(default)]
    pub messages_unacknowledged: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectTotals {
    #[serde(default)]
    pub connections: Option<u64>,
    #[serde(default)]
    pub channels: Option<u64>,
    #[serde(default)]
    pub exchanges: Option<u64>,
    #[serde(default)]
    pub queues: Option<u64>,
    #[serde(default)]
    pub consumers: Option<u64>,
}

/// Entry of `/api/queues`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueInfo {
    pub name: String,
    #[serde(default)]
    pub vhost: String,
    #[serde(default)]
    pub messages: Option<u64>,
    #[serde(default)]
    pub messages_ready: Option<u64>,
    #[serde(default)]
    pub messages_unacknowledged: Option<u64>,
    #[serde(default)]
    pub consumers: Option<u64>,
    #[serde(default)]
    pub state: Option<String>,
}

impl QueueInfo {
    pub fn new(name: impl Into<String>, messages: u64) -> Self {
        Self {
            name: name.into(),
            vhost: "/".to_string(),
            messages: Some(messages),
            messages_ready: Some(messages),
            messages_unacknowledged: Some(0),
            consumers: Some(0),
            state: Some("running".to_string()),
        }
    }
}

/// Entry of `/api/connections`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub name: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub vhost: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub channels: Option<u64>,
}
