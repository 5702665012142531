//! Plain-text listings for the read-only tools

use crate::naming::{QueueKind, source_queue_of};
use crate::types::{ConnectionInfo, Overview, QueueInfo};
use std::fmt::Write;

fn n(value: Option<u64>) -> u64 {
    value.unwrap_or(0)
}

pub fn render_overview(overview: &Overview) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "RabbitMQ {} (Erlang {})",
        overview.rabbitmq_version.as_deref().unwrap_or("unknown"),
        overview.erlang_version.as_deref().unwrap_or("unknown")
    );
    if let Some(cluster) = &overview.cluster_name {
        let _ = writeln!(out, "Cluster: {cluster}");
    }
    let q = &overview.queue_totals;
    let _ = writeln!(
        out,
        "Messages: {} total, {} ready, {} unacked",
        n(q.messages),
        n(q.messages_ready),
        n(q.messages_unacknowledged)
    );
    let o = &overview.object_totals;
    let _ = writeln!(
        out,
        "Objects: {} queues, {} exchanges, {} connections, {} channels, {} consumers",
        n(o.queues),
        n(o.exchanges),
        n(o.connections),
        n(o.channels),
        n(o.consumers)
    );
    out
}

pub fn render_queues(queues: &[QueueInfo]) -> String {
    if queues.is_empty() {
        return "No queues found.\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(out, "{} queue(s):", queues.len());
    for queue in queues {
        let _ = writeln!(
            out,
            "- {} [{}]: {} messages ({} ready, {} unacked), {} consumers",
            queue.name,
            queue.vhost,
            n(queue.messages),
            n(queue.messages_ready),
            n(queue.messages_unacknowledged),
            n(queue.consumers)
        );
    }
    out
}

/// Failure queues, most messages first
pub fn failure_queues(queues: &[QueueInfo]) -> Vec<&QueueInfo> {
    let mut failures: Vec<&QueueInfo> = queues
        .iter()
        .filter(|q| QueueKind::of(&q.name).is_failure())
        .collect();
    failures.sort_by(|a, b| {
        n(b.messages)
            .cmp(&n(a.messages))
            .then_with(|| a.name.cmp(&b.name))
    });
    failures
}

pub fn render_failure_queues(queues: &[QueueInfo]) -> String {
    let failures = failure_queues(queues);
    if failures.is_empty() {
        return "No error or skipped queues found.\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(out, "{} failure queue(s):", failures.len());
    for queue in failures {
        let _ = writeln!(
            out,
            "- {} ({}, source: {}): {} messages",
            queue.name,
            QueueKind::of(&queue.name),
            source_queue_of(&queue.name),
            n(queue.messages)
        );
    }
    out
}

pub fn render_connections(connections: &[ConnectionInfo]) -> String {
    if connections.is_empty() {
        return "No connections.\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(out, "{} connection(s):", connections.len());
    for conn in connections {
        let _ = writeln!(
            out,
            "- {} user={} vhost={} state={} channels={}",
            conn.name,
            conn.user.as_deref().unwrap_or("-"),
            conn.vhost.as_deref().unwrap_or("-"),
            conn.state.as_deref().unwrap_or("-"),
            n(conn.channels)
        );
    }
    out
}
