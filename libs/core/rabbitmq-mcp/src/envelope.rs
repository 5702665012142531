//! MassTransit-style message envelopes
//!
//! Payloads are parsed into an untyped JSON map first and only the known
//! keys are projected into [`Envelope`]. Fields with unexpected types are
//! treated as absent instead of failing the parse.

use serde_json::{Map, Value};
use url::Url;

const URN_PREFIX: &str = "urn:message:";

/// Keys whose presence marks a JSON object as an envelope
const ENVELOPE_MARKERS: [&str; 3] = ["messageType", "messageId", "message"];

/// Structured view of a message payload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelope {
    pub message_id: Option<String>,
    pub correlation_id: Option<String>,
    pub conversation_id: Option<String>,
    pub sent_time: Option<String>,
    pub destination_address: Option<String>,
    /// Raw URNs, in envelope order
    pub message_types: Vec<String>,
    /// Application payload, or the fault body for fault messages
    pub message: Option<Value>,
    pub host: Option<HostInfo>,
}

/// Descriptive information about the process that produced a message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostInfo {
    pub machine_name: Option<String>,
    pub process_name: Option<String>,
    pub process_id: Option<String>,
    pub assembly: Option<String>,
    pub assembly_version: Option<String>,
    pub framework_version: Option<String>,
    pub runtime_version: Option<String>,
    pub os_version: Option<String>,
}

impl HostInfo {
    /// Project a `host` object (lower-camel-cased keys)
    pub fn from_object(host: &Map<String, Value>) -> Option<Self> {
        let info = Self {
            machine_name: scalar_field(host, "machineName"),
            process_name: scalar_field(host, "processName"),
            process_id: scalar_field(host, "processId"),
            assembly: scalar_field(host, "assembly"),
            assembly_version: scalar_field(host, "assemblyVersion"),
            framework_version: scalar_field(host, "frameworkVersion"),
            runtime_version: scalar_field(host, "massTransitVersion"),
            os_version: scalar_field(host, "operatingSystemVersion"),
        };
        (!info.is_empty()).then_some(info)
    }

    pub fn is_empty(&self) -> bool {
        *self == HostInfo::default()
    }
}

impl Envelope {
    /// First message type, decoded to a dotted name
    pub fn primary_type_name(&self) -> Option<String> {
        self.message_types.first().map(|urn| decode_type_name(urn))
    }

    /// All message types, decoded
    pub fn type_names(&self) -> Vec<String> {
        self.message_types
            .iter()
            .map(|urn| decode_type_name(urn))
            .collect()
    }

    /// The `message` field when it is a JSON object
    pub fn message_object(&self) -> Option<&Map<String, Value>> {
        self.message.as_ref().and_then(Value::as_object)
    }

    /// Exchange named by the last non-empty path segment of `destinationAddress`.
    /// Short forms such as `exchange:App:OrderPlaced` have no leading `/`,
    /// so the whole path is split rather than relying on `path_segments`.
    pub fn destination_exchange(&self) -> Option<String> {
        let address = self.destination_address.as_deref()?;
        let url = Url::parse(address).ok()?;
        let segment = url.path().split('/').rev().find(|s| !s.is_empty())?;
        let decoded = urlencoding::decode(segment)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| segment.to_string());
        Some(decoded)
    }
}

/// `urn:message:NS:Type` becomes `NS.Type`; anything else is returned as-is.
pub fn decode_type_name(type_id: &str) -> String {
    match type_id.strip_prefix(URN_PREFIX) {
        Some(rest) => rest.replace(':', "."),
        None => type_id.to_string(),
    }
}

/// Try to read a payload as an envelope.
///
/// Returns `None` for non-JSON payloads, for JSON that is not an object, and
/// for objects carrying none of `messageType`, `messageId` or `message`.
pub fn parse_envelope(payload: &str) -> Option<Envelope> {
    let value: Value = serde_json::from_str(payload).ok()?;
    let object = value.as_object()?;
    if !ENVELOPE_MARKERS.iter().any(|key| object.contains_key(*key)) {
        return None;
    }

    Some(Envelope {
        message_id: scalar_field(object, "messageId"),
        correlation_id: scalar_field(object, "correlationId"),
        conversation_id: scalar_field(object, "conversationId"),
        sent_time: scalar_field(object, "sentTime"),
        destination_address: scalar_field(object, "destinationAddress"),
        message_types: string_list(object.get("messageType")),
        message: object.get("message").filter(|v| !v.is_null()).cloned(),
        host: object
            .get("host")
            .and_then(Value::as_object)
            .and_then(HostInfo::from_object),
    })
}

/// Strings pass through; numbers and booleans are rendered. Anything else is absent.
pub(crate) fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub(crate) fn scalar_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).and_then(scalar_string)
}

/// A single string or an array of strings; other entries are dropped.
pub(crate) fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_urn() {
        assert_eq!(decode_type_name("urn:message:NS.Sub:Type"), "NS.Sub.Type");
        assert_eq!(decode_type_name("urn:message:App:OrderPlaced"), "App.OrderPlaced");
        assert_eq!(
            decode_type_name("urn:message:MassTransit:Fault[[App:OrderPlaced]]"),
            "MassTransit.Fault[[App.OrderPlaced]]"
        );
    }

    #[test]
    fn test_decode_non_urn_is_identity() {
        for s in ["App.OrderPlaced", "", "urn:other:A:B", "URN:MESSAGE:A:B", "a:b"] {
            assert_eq!(decode_type_name(s), s);
            assert_eq!(decode_type_name(&decode_type_name(s)), s);
        }
    }

    #[test]
    fn test_parse_full_envelope() {
        let payload = r#"{
            "messageId": "0a000000-0000-0000-0000-000000000001",
            "correlationId": "c-1",
            "conversationId": "conv-1",
            "sentTime": "2024-05-01T10:00:00Z",
            "destinationAddress": "rabbitmq://broker/orders-exchange",
            "messageType": ["urn:message:App:OrderPlaced", "urn:message:App:IOrderEvent"],
            "message": {"id": 1},
            "host": {"machineName": "web-1", "processName": "api", "processId": 4242}
        }"#;
        let envelope = parse_envelope(payload).unwrap();
        assert_eq!(envelope.correlation_id.as_deref(), Some("c-1"));
        assert_eq!(envelope.primary_type_name().as_deref(), Some("App.OrderPlaced"));
        assert_eq!(envelope.type_names().len(), 2);
        assert_eq!(envelope.message_object().unwrap()["id"], 1);
        let host = envelope.host.unwrap();
        assert_eq!(host.machine_name.as_deref(), Some("web-1"));
        assert_eq!(host.process_id.as_deref(), Some("4242"));
    }

    #[test]
    fn test_unrelated_json_is_not_an_envelope() {
        assert!(parse_envelope(r#"{"orderId": 5, "total": 10.5}"#).is_none());
        assert!(parse_envelope("[1, 2, 3]").is_none());
        assert!(parse_envelope("\"message\"").is_none());
    }

    #[test]
    fn test_non_json_is_not_an_envelope() {
        assert!(parse_envelope("not json at all").is_none());
        assert!(parse_envelope("").is_none());
        assert!(parse_envelope("<xml/>").is_none());
    }

    #[test]
    fn test_single_marker_is_enough() {
        let envelope = parse_envelope(r#"{"messageId": "m-1"}"#).unwrap();
        assert_eq!(envelope.message_id.as_deref(), Some("m-1"));
        assert!(envelope.message_types.is_empty());
        assert!(envelope.message.is_none());
    }

    #[test]
    fn test_wrong_field_types_are_absent() {
        let envelope = parse_envelope(
            r#"{"messageId": {"nested": true}, "messageType": 7, "host": "web-1", "sentTime": null}"#,
        )
        .unwrap();
        assert!(envelope.message_id.is_none());
        assert!(envelope.message_types.is_empty());
        assert!(envelope.host.is_none());
        assert!(envelope.sent_time.is_none());
    }

    #[test]
    fn test_message_type_as_single_string() {
        let envelope = parse_envelope(r#"{"messageType": "urn:message:App:Ping"}"#).unwrap();
        assert_eq!(envelope.type_names(), vec!["App.Ping".to_string()]);
    }

    #[test]
    fn test_destination_exchange() {
        let envelope = Envelope {
            destination_address: Some("proto://host/vhost/orders-exchange".to_string()),
            ..Default::default()
        };
        assert_eq!(envelope.destination_exchange().as_deref(), Some("orders-exchange"));
    }

    #[test]
    fn test_destination_exchange_ignores_trailing_slash_and_query() {
        let envelope = Envelope {
            destination_address: Some("rabbitmq://host/vhost/App:Order%20Placed/?bind=true".to_string()),
            ..Default::default()
        };
        assert_eq!(envelope.destination_exchange().as_deref(), Some("App:Order Placed"));
    }

    #[test]
    fn test_destination_exchange_unparseable() {
        for address in ["not a uri", "rabbitmq://host", "rabbitmq://host/"] {
            let envelope = Envelope {
                destination_address: Some(address.to_string()),
                ..Default::default()
            };
            assert_eq!(envelope.destination_exchange(), None, "{address}");
        }
        assert_eq!(Envelope::default().destination_exchange(), None);
    }

    #[test]
    fn test_destination_exchange_short_forms() {
        for (address, expected) in [
            ("exchange:App:OrderPlaced", "App:OrderPlaced"),
            ("queue:orders-in", "orders-in"),
            ("queue:orders", "orders"),
            ("exchange:Order%20Placed", "Order Placed"),
        ] {
            let envelope = Envelope {
                destination_address: Some(address.to_string()),
                ..Default::default()
            };
            assert_eq!(envelope.destination_exchange().as_deref(), Some(expected), "{address}");
        }
    }
}
