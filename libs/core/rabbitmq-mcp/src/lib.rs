//! RabbitMQ MCP Server
//!
//! An MCP (Model Context Protocol) server for inspecting RabbitMQ through the
//! management HTTP API, with a focus on MassTransit error queues:
//! - Typestate pattern for client lifecycle
//! - Ordered fault-extraction strategies (headers, then body)
//! - Sealed traits for controlled tool registration
//! - Error context pattern for rich error information
//! - Two-phase (preview, then confirm) republish of failed messages

mod broker;
mod client;
mod envelope;
mod error;
mod fault;
mod format;
mod mcp;
mod naming;
mod report;
mod republish;
mod server;
mod types;

pub use broker::BrokerApi;
pub use client::{ManagementClient, Ready, Uninitialized};
pub use envelope::{Envelope, HostInfo, decode_type_name, parse_envelope};
pub use error::{Error, ErrorContext, Result};
pub use fault::{ExceptionRecord, Fault, FaultSource, MAX_EXCEPTION_DEPTH, extract_fault, headers};
pub use format::{
    BODY_LIMIT, PEEK_LIMIT, STACK_TRACE_LINES, TRUNCATION_MARKER, format_message, format_peek,
    truncate_chars,
};
pub use mcp::{McpError, McpHandler, McpRequest, McpResponse, Tool};
pub use naming::{
    ERROR_SUFFIX, QueueKind, SKIPPED_SUFFIX, is_error_queue, is_skipped_queue, source_queue_of,
};
pub use report::{
    failure_queues, render_connections, render_failure_queues, render_overview, render_queues,
};
pub use republish::{
    Destination, MAX_BATCH, PreviewEntry, RepublishOutcome, RepublishRequest, RepublishResponse,
    Republisher, confirm_instruction, resolve_destination, validate_count,
};
pub use server::McpServer;
pub use types::{
    AckMode, ConnectionInfo, DEFAULT_CONTENT_TYPE, Headers, Message, MessageProperties,
    ObjectTotals, Overview, PublishMessage, QueueInfo, QueueTotals,
};
