//! HTTP-level tests for the management client against a mock server

use rabbitmq_mcp::{AckMode, BrokerApi, Error, ManagementClient, Message, PublishMessage, Ready};
use serde_json::json;
use wiremock::matchers::{basic_auth, body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> ManagementClient<Ready> {
    ManagementClient::new(server.uri())
        .with_credentials("ops", "s3cret")
        .init()
        .unwrap()
}

#[tokio::test]
async fn overview_uses_basic_auth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/overview"))
        .and(basic_auth("ops", "s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rabbitmq_version": "3.13.1",
            "erlang_version": "26.2.5",
            "cluster_name": "rabbit@prod",
            "queue_totals": {"messages": 3},
            "object_totals": {"queues": 2},
            "listeners": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let overview = client(&server).overview().await.unwrap();
    assert_eq!(overview.rabbitmq_version.as_deref(), Some("3.13.1"));
    assert_eq!(overview.queue_totals.messages, Some(3));
    assert_eq!(overview.queue_totals.messages_ready, None);
}

#[tokio::test]
async fn default_vhost_is_percent_encoded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/queues/%2F"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"name": "orders", "vhost": "/", "messages": 0, "consumers": 2},
            {"name": "orders_error", "vhost": "/"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let queues = client(&server).list_queues(Some("/".to_string())).await.unwrap();
    assert_eq!(queues.len(), 2);
    assert_eq!(queues[1].name, "orders_error");
    assert_eq!(queues[1].messages, None);
}

#[tokio::test]
async fn get_messages_sends_ack_mode_and_parses_empty_properties() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/queues/%2F/orders_error/get"))
        .and(body_json(json!({
            "count": 2,
            "ackmode": "ack_requeue_true",
            "encoding": "auto"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "payload_bytes": 2,
                "redelivered": true,
                "exchange": "",
                "routing_key": "orders_error",
                "message_count": 1,
                "properties": [],
                "payload": "{}",
                "payload_encoding": "string"
            },
            {
                "payload_bytes": 4,
                "redelivered": false,
                "exchange": "orders_error",
                "routing_key": "",
                "message_count": 0,
                "properties": {
                    "content_type": "application/vnd.masstransit+json",
                    "message_id": "abc",
                    "delivery_mode": 2,
                    "headers": {"MT-Reason": "fault"}
                },
                "payload": "3q2+7w==",
                "payload_encoding": "base64"
            }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let messages = client(&server)
        .get_messages("/".to_string(), "orders_error".to_string(), 2, AckMode::Requeue)
        .await
        .unwrap();

    assert_eq!(messages.len(), 2);
    assert!(messages[0].headers().is_empty());
    assert!(messages[0].redelivered);
    assert_eq!(messages[1].properties.message_id.as_deref(), Some("abc"));
    assert_eq!(messages[1].headers()["MT-Reason"], "fault");
    assert_eq!(messages[1].payload_encoding, "base64");
    assert_eq!(messages[1].payload, "3q2+7w==");
}

#[tokio::test]
async fn consume_uses_destructive_ack_mode() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/queues/prod/orders_error/get"))
        .and(body_json(json!({
            "count": 1,
            "ackmode": "ack_requeue_false",
            "encoding": "auto"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let messages = client(&server)
        .get_messages("prod".to_string(), "orders_error".to_string(), 1, AckMode::Consume)
        .await
        .unwrap();
    assert!(messages.is_empty());
}

#[tokio::test]
async fn publish_preserves_payload_and_reports_routing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/exchanges/%2F/orders-exchange/publish"))
        .and(body_json(json!({
            "properties": {
                "content_type": "application/vnd.masstransit+json",
                "message_id": "abc",
                "headers": {"MT-Reason": "fault"}
            },
            "routing_key": "orders-exchange",
            "payload": "3q2+7w==",
            "payload_encoding": "base64"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"routed": false})))
        .expect(1)
        .mount(&server)
        .await;

    let mut message = Message::new("3q2+7w==").with_header("MT-Reason", "fault");
    message.payload_encoding = "base64".to_string();
    message.properties.message_id = Some("abc".to_string());

    let routed = client(&server)
        .publish(
            "/".to_string(),
            "orders-exchange".to_string(),
            PublishMessage::republish_of(&message, "orders-exchange"),
        )
        .await
        .unwrap();
    assert!(!routed);
}

#[tokio::test]
async fn default_exchange_uses_amq_default() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/exchanges/%2F/amq.default/publish"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"routed": true})))
        .expect(1)
        .mount(&server)
        .await;

    let routed = client(&server)
        .publish(
            "/".to_string(),
            String::new(),
            PublishMessage::republish_of(&Message::new("{}"), "orders"),
        )
        .await
        .unwrap();
    assert!(routed);
}

#[tokio::test]
async fn purge_deletes_queue_contents() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/queues/%2F/orders_error/contents"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .purge_queue("/".to_string(), "orders_error".to_string())
        .await
        .unwrap();
}

#[tokio::test]
async fn status_codes_map_to_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/overview"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/queues/%2F/missing_error/get"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "Object Not Found"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/connections"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let client = client(&server);

    let err = client.overview().await.unwrap_err();
    assert!(matches!(err, Error::Unauthorized { .. }));

    let err = client
        .get_messages("/".to_string(), "missing_error".to_string(), 1, AckMode::Requeue)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));

    let err = client.list_connections().await.unwrap_err();
    match err {
        Error::Status { status, body, .. } => {
            assert_eq!(status, 503);
            assert_eq!(body, "maintenance");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn malformed_body_is_a_serialization_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/connections"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
        .mount(&server)
        .await;

    let err = client(&server).list_connections().await.unwrap_err();
    assert!(matches!(err, Error::Serialization { .. }));
    assert!(err.to_string().contains("GET /api/connections"));
}
