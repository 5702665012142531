//! Text reports for failed and peeked messages
//!
//! `format_message` walks a fixed fallback chain: header fault, body fault,
//! plain envelope, raw message. The limits below are part of the output
//! format and are not configurable.

use crate::envelope::{Envelope, HostInfo, parse_envelope};
use crate::fault::{ExceptionRecord, Fault, FaultSource, extract_fault};
use crate::types::Message;
use serde_json::Value;
use std::fmt::Write;

/// Characters of a message body shown in fault and envelope reports
pub const BODY_LIMIT: usize = 500;
/// Stack trace lines shown per exception
pub const STACK_TRACE_LINES: usize = 8;
/// Characters of payload shown when peeking at non-fault messages
pub const PEEK_LIMIT: usize = 1000;

pub const TRUNCATION_MARKER: &str = "... (truncated)";

const UNKNOWN: &str = "unknown";

/// Render one message from a failure queue. `index` is 1-based.
pub fn format_message(message: &Message, index: usize) -> String {
    let payload = message.payload_text();
    let envelope = parse_envelope(&payload);

    match extract_fault(message, envelope.as_ref()) {
        Some(fault) => render_fault(&fault, index),
        None => match envelope {
            Some(envelope) => render_envelope(&envelope, index),
            None => render_raw(message, &payload, index, BODY_LIMIT),
        },
    }
}

/// Render a message from any queue. Faults get the full fault report;
/// everything else shows routing, headers and a longer payload excerpt.
pub fn format_peek(message: &Message, index: usize) -> String {
    let payload = message.payload_text();
    let envelope = parse_envelope(&payload);
    if let Some(fault) = extract_fault(message, envelope.as_ref()) {
        return render_fault(&fault, index);
    }

    let mut out = String::new();
    let _ = writeln!(out, "=== Message {index} ===");
    let _ = writeln!(out, "Exchange: {}", display_exchange(&message.exchange));
    let _ = writeln!(out, "Routing Key: {}", message.routing_key);
    let _ = writeln!(out, "Redelivered: {}", if message.redelivered { "yes" } else { "no" });
    let _ = writeln!(out, "Remaining In Queue: {}", message.message_count);
    if let Some(content_type) = &message.properties.content_type {
        let _ = writeln!(out, "Content Type: {content_type}");
    }
    let header_keys: Vec<&str> = message.headers().keys().map(String::as_str).collect();
    if header_keys.is_empty() {
        let _ = writeln!(out, "Headers: none");
    } else {
        let _ = writeln!(out, "Headers: {}", header_keys.join(", "));
    }
    let _ = writeln!(out, "Payload:");
    let _ = writeln!(out, "{}", truncate_chars(&payload, PEEK_LIMIT));
    out
}

/// Keep the first `limit` characters, appending [`TRUNCATION_MARKER`] when cut.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

fn render_fault(fault: &Fault, index: usize) -> String {
    let mut out = String::new();
    let origin = match fault.source {
        FaultSource::Headers => "headers",
        FaultSource::Body => "body",
    };
    let _ = writeln!(out, "=== Message {index} (fault from {origin}) ===");
    let _ = writeln!(out, "Faulted At: {}", or_unknown(&fault.faulted_at));

    match fault.source {
        FaultSource::Headers => {
            let _ = writeln!(out, "Reason: {}", or_unknown(&fault.reason));
            let _ = writeln!(out, "Message Type: {}", or_unknown(&fault.message_type));
            if let Some(consumer) = &fault.consumer_type {
                let _ = writeln!(out, "Consumer: {consumer}");
            }
            if let Some(input) = &fault.input_address {
                let _ = writeln!(out, "Input Address: {input}");
            }
            write_exceptions(&mut out, &fault.exceptions);
            if let Some(retries) = fault.retry_count {
                let _ = writeln!(out, "Retry Count: {retries}");
            }
        }
        FaultSource::Body => {
            let _ = writeln!(
                out,
                "Original Message Id: {}",
                or_unknown(&fault.original_message_id)
            );
            let _ = writeln!(out, "Message Type: {}", or_unknown(&fault.message_type));
            write_exceptions(&mut out, &fault.exceptions);
        }
    }

    if let Some(primary) = fault.primary_exception() {
        write_stack_trace(&mut out, primary);
        for cause in primary.causes() {
            let _ = writeln!(out, "Caused by: {}", exception_summary(cause));
        }
    }

    if let Some(payload) = &fault.original_payload {
        let _ = writeln!(out, "Original Payload:");
        let _ = writeln!(out, "{}", truncate_chars(&pretty(payload), BODY_LIMIT));
    }

    if let Some(host) = &fault.host {
        write_host(&mut out, host);
    }
    out
}

fn write_exceptions(out: &mut String, exceptions: &[ExceptionRecord]) {
    match exceptions.split_first() {
        Some((primary, rest)) => {
            let _ = writeln!(out, "Exception: {}", exception_summary(primary));
            if !rest.is_empty() {
                let _ = writeln!(out, "Additional Exceptions: {}", rest.len());
            }
        }
        None => {
            let _ = writeln!(out, "Exception: none recorded");
        }
    }
}

fn write_stack_trace(out: &mut String, exception: &ExceptionRecord) {
    let Some(trace) = exception.stack_trace.as_deref().filter(|t| !t.trim().is_empty()) else {
        return;
    };

    let _ = writeln!(out, "Stack Trace:");
    for line in trace.lines().take(STACK_TRACE_LINES).map(str::trim) {
        if line.is_empty() {
            let _ = writeln!(out);
        } else {
            let _ = writeln!(out, "  {line}");
        }
    }
}

fn write_host(out: &mut String, host: &HostInfo) {
    let _ = writeln!(
        out,
        "Source Host: {} / {} (PID {})",
        or_unknown(&host.machine_name),
        or_unknown(&host.process_name),
        or_unknown(&host.process_id)
    );

    if let (Some(assembly), Some(version)) = (&host.assembly, &host.assembly_version) {
        let mut runtime = Vec::new();
        if let Some(framework) = &host.framework_version {
            runtime.push(format!("framework {framework}"));
        }
        if let Some(bus) = &host.runtime_version {
            runtime.push(format!("MassTransit {bus}"));
        }
        if let Some(os) = &host.os_version {
            runtime.push(format!("OS {os}"));
        }
        if runtime.is_empty() {
            let _ = writeln!(out, "Assembly: {assembly} {version}");
        } else {
            let _ = writeln!(out, "Assembly: {assembly} {version} ({})", runtime.join(", "));
        }
    }
}

fn render_envelope(envelope: &Envelope, index: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Message {index} ===");
    let _ = writeln!(out, "Message Id: {}", or_unknown(&envelope.message_id));
    let _ = writeln!(out, "Sent: {}", or_unknown(&envelope.sent_time));
    let types = envelope.type_names();
    if types.is_empty() {
        let _ = writeln!(out, "Message Type: {UNKNOWN}");
    } else {
        let _ = writeln!(out, "Message Type: {}", types.join(", "));
    }
    if let Some(body) = &envelope.message {
        let _ = writeln!(out, "Message:");
        let _ = writeln!(out, "{}", truncate_chars(&pretty(body), BODY_LIMIT));
    }
    out
}

fn render_raw(message: &Message, payload: &str, index: usize, limit: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Message {index} (raw) ===");
    let _ = writeln!(out, "Exchange: {}", display_exchange(&message.exchange));
    let _ = writeln!(out, "Routing Key: {}", message.routing_key);
    let _ = writeln!(out, "Payload:");
    let _ = writeln!(out, "{}", truncate_chars(payload, limit));
    out
}

fn exception_summary(exception: &ExceptionRecord) -> String {
    let kind = exception.exception_type.as_deref().unwrap_or(UNKNOWN);
    match &exception.message {
        Some(message) => format!("{kind} - \"{message}\""),
        None => kind.to_string(),
    }
}

fn display_exchange(exchange: &str) -> &str {
    if exchange.is_empty() { "(default)" } else { exchange }
}

fn or_unknown(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or(UNKNOWN)
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::headers;
    use serde_json::json;

    fn orders_fault() -> Message {
        Message::new(r#"{"messageType":["urn:message:App:OrderPlaced"],"message":{"id":1}}"#)
            .with_header(headers::REASON, "fault")
            .with_header(headers::EXCEPTION_TYPE, "System.InvalidOperationException")
            .with_header(headers::MESSAGE, "bad state")
            .with_header(headers::RETRY_COUNT, "3")
            .with_route("", "orders_error")
    }

    #[test]
    fn test_header_fault_report() {
        let report = format_message(&orders_fault(), 1);

        assert!(report.starts_with("=== Message 1 (fault from headers) ==="));
        assert!(report.contains("Reason: fault\n"));
        assert!(report.contains("Exception: System.InvalidOperationException - \"bad state\"\n"));
        assert!(report.contains("Retry Count: 3\n"));
        assert!(report.contains("Message Type: App.OrderPlaced\n"));
        assert!(report.contains("Original Payload:\n"));
        assert!(report.contains("\"id\": 1"));
        assert!(!report.contains("Consumer:"));
        assert!(!report.contains("Source Host:"));
    }

    #[test]
    fn test_header_fault_with_host_and_stack() {
        let trace = (1..=12).map(|i| format!("   at Frame{i}()   ")).collect::<Vec<_>>().join("\n");
        let message = orders_fault()
            .with_header(headers::CONSUMER_TYPE, "App.OrderConsumer")
            .with_header(headers::STACK_TRACE, trace)
            .with_header(headers::HOST_MACHINE_NAME, "web-1")
            .with_header(headers::HOST_PROCESS_NAME, "api")
            .with_header(headers::HOST_PROCESS_ID, 4242)
            .with_header(headers::HOST_ASSEMBLY, "App")
            .with_header(headers::HOST_ASSEMBLY_VERSION, "1.2.0")
            .with_header(headers::HOST_FRAMEWORK_VERSION, "8.0.1");
        let report = format_message(&message, 2);

        assert!(report.contains("Consumer: App.OrderConsumer\n"));
        assert!(report.contains("Stack Trace:\n  at Frame1()\n"));
        assert!(report.contains("  at Frame8()\n"));
        assert!(!report.contains("Frame9()"));
        assert!(!report.contains("more lines"));
        assert!(report.contains("Source Host: web-1 / api (PID 4242)\n"));
        assert!(report.contains("Assembly: App 1.2.0 (framework 8.0.1)\n"));
    }

    #[test]
    fn test_stack_trace_keeps_first_eight_raw_lines() {
        let trace = "at Frame1()\n\n  at Frame3()  \nat Frame4()\nat Frame5()\nat Frame6()\nat Frame7()\nat Frame8()\nat Frame9()";
        let report = format_message(&orders_fault().with_header(headers::STACK_TRACE, trace), 1);

        let block = report.split("Stack Trace:\n").nth(1).unwrap();
        let lines: Vec<&str> = block.lines().take(STACK_TRACE_LINES).collect();
        assert_eq!(lines[0], "  at Frame1()");
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], "  at Frame3()");
        assert_eq!(lines[7], "  at Frame8()");
        assert!(!report.contains("Frame9()"));
    }

    #[test]
    fn test_blank_stack_trace_is_omitted() {
        let report = format_message(&orders_fault().with_header(headers::STACK_TRACE, "  \n "), 1);
        assert!(!report.contains("Stack Trace:"));
    }

    #[test]
    fn test_assembly_line_needs_name_and_version() {
        let message = orders_fault()
            .with_header(headers::HOST_MACHINE_NAME, "web-1")
            .with_header(headers::HOST_ASSEMBLY, "App");
        let report = format_message(&message, 1);
        assert!(report.contains("Source Host: web-1 / unknown (PID unknown)\n"));
        assert!(!report.contains("Assembly:"));
    }

    #[test]
    fn test_body_fault_report() {
        let payload = json!({
            "messageType": ["urn:message:MassTransit:Fault[[App:OrderPlaced]]"],
            "message": {
                "faultedMessageId": "orig-1",
                "timestamp": "2024-05-01T10:00:00Z",
                "exceptions": [
                    {
                        "exceptionType": "System.ArgumentException",
                        "message": "amount must be positive",
                        "stackTrace": "at A()\nat B()",
                        "innerException": {"exceptionType": "System.FormatException", "message": "bad number"}
                    },
                    {"exceptionType": "System.Exception"}
                ],
                "message": {"id": 7}
            },
            "host": {"machineName": "worker-2", "processName": "svc", "processId": 99}
        });
        let report = format_message(&Message::new(payload.to_string()), 3);

        assert!(report.starts_with("=== Message 3 (fault from body) ==="));
        assert!(report.contains("Faulted At: 2024-05-01T10:00:00Z\n"));
        assert!(report.contains("Original Message Id: orig-1\n"));
        assert!(report.contains("Message Type: MassTransit.Fault[[App.OrderPlaced]]\n"));
        assert!(report.contains("Exception: System.ArgumentException - \"amount must be positive\"\n"));
        assert!(report.contains("Additional Exceptions: 1\n"));
        assert!(report.contains("Stack Trace:\n  at A()\n  at B()\n"));
        assert!(report.contains("Caused by: System.FormatException - \"bad number\"\n"));
        assert!(report.contains("\"id\": 7"));
        assert!(report.contains("Source Host: worker-2 / svc (PID 99)\n"));
        assert!(!report.contains("Retry Count"));
        assert!(!report.contains("Reason:"));
    }

    #[test]
    fn test_original_payload_is_truncated() {
        let big = "x".repeat(2000);
        let message = Message::new(json!({"message": {"blob": big}}).to_string())
            .with_header(headers::REASON, "fault");
        let report = format_message(&message, 1);
        let payload_block = report.split("Original Payload:\n").nth(1).unwrap();
        let first_line_block: String = payload_block.lines().collect::<Vec<_>>().join("\n");
        assert!(first_line_block.ends_with(TRUNCATION_MARKER));
        assert_eq!(
            first_line_block.chars().count(),
            BODY_LIMIT + TRUNCATION_MARKER.chars().count()
        );
    }

    #[test]
    fn test_plain_envelope_report() {
        let message = Message::new(
            json!({
                "messageId": "m-1",
                "sentTime": "2024-05-01T09:00:00Z",
                "messageType": ["urn:message:App:OrderPlaced", "urn:message:App:IEvent"],
                "message": {"id": 1}
            })
            .to_string(),
        );
        let report = format_message(&message, 1);
        assert!(report.starts_with("=== Message 1 ===\n"));
        assert!(report.contains("Message Id: m-1\n"));
        assert!(report.contains("Sent: 2024-05-01T09:00:00Z\n"));
        assert!(report.contains("Message Type: App.OrderPlaced, App.IEvent\n"));
        assert!(report.contains("\"id\": 1"));
    }

    #[test]
    fn test_raw_report() {
        let message = Message::new("x".repeat(600)).with_route("orders", "orders.created");
        let report = format_message(&message, 4);
        assert!(report.starts_with("=== Message 4 (raw) ===\n"));
        assert!(report.contains("Exchange: orders\n"));
        assert!(report.contains("Routing Key: orders.created\n"));
        assert!(report.contains(&format!("{}{}", "x".repeat(500), TRUNCATION_MARKER)));
        assert!(!report.contains(&"x".repeat(501)));
    }

    #[test]
    fn test_unrelated_json_falls_back_to_raw() {
        let message = Message::new(r#"{"orderId": 5}"#);
        let report = format_message(&message, 1);
        assert!(report.contains("(raw)"));
        assert!(report.contains("Exchange: (default)\n"));
        assert!(report.contains(r#"{"orderId": 5}"#));
    }

    #[test]
    fn test_peek_uses_longer_limit() {
        let message = Message::new("y".repeat(1500))
            .with_route("", "orders")
            .with_header("x-trace", "abc");
        let report = format_peek(&message, 1);
        assert!(report.contains("Headers: x-trace\n"));
        assert!(report.contains(&format!("{}{}", "y".repeat(1000), TRUNCATION_MARKER)));
        assert!(!report.contains(&"y".repeat(1001)));
    }

    #[test]
    fn test_peek_of_fault_renders_fault() {
        let report = format_peek(&orders_fault(), 1);
        assert!(report.contains("(fault from headers)"));
    }

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate_chars("héllo", 10), "héllo");
        assert_eq!(truncate_chars("héllo", 5), "héllo");
        assert_eq!(truncate_chars("héllo", 2), format!("hé{TRUNCATION_MARKER}"));
        assert_eq!(truncate_chars("", 0), "");
    }
}
