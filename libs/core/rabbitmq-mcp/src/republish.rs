//! Two-phase republish of failed messages
//!
//! `confirm = false` reads messages with requeue and only renders them.
//! `confirm = true` consumes the messages and publishes each original
//! payload back to its destination, one at a time, in fetch order.
//!
//! The two calls share no state: the commit re-reads the queue, so what it
//! consumes can differ from what the preview showed if the queue changed in
//! between. Nothing fences or reserves messages across the two calls.

use crate::broker::BrokerApi;
use crate::envelope::{Envelope, parse_envelope};
use crate::error::{Error, Result};
use crate::format::format_message;
use crate::naming::source_queue_of;
use crate::types::{AckMode, Message, PublishMessage};
use std::fmt::Write;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Largest batch a single call may touch
pub const MAX_BATCH: u32 = 50;

/// Parameters of one republish call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepublishRequest {
    pub error_queue: String,
    pub count: u32,
    pub confirm: bool,
    pub vhost: Option<String>,
}

impl RepublishRequest {
    pub fn new(error_queue: impl Into<String>, count: u32) -> Self {
        Self {
            error_queue: error_queue.into(),
            count,
            confirm: false,
            vhost: None,
        }
    }

    pub fn with_confirm(mut self, confirm: bool) -> Self {
        self.confirm = confirm;
        self
    }

    pub fn with_vhost(mut self, vhost: impl Into<String>) -> Self {
        self.vhost = Some(vhost.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.error_queue.is_empty() {
            return Err(Error::invalid("error_queue must not be empty"));
        }
        validate_count(self.count)
    }
}

/// `count` must be between 1 and [`MAX_BATCH`]
pub fn validate_count(count: u32) -> Result<()> {
    if count == 0 || count > MAX_BATCH {
        return Err(Error::invalid(format!(
            "count must be between 1 and {MAX_BATCH}, got {count}"
        )));
    }
    Ok(())
}

/// Result of a commit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepublishOutcome {
    pub attempted: usize,
    pub succeeded: usize,
    pub per_message_errors: Vec<String>,
}

/// Where a message will be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub exchange: String,
    pub routing_key: String,
}

/// Destination from the envelope's `destinationAddress`, falling back to
/// the source queue derived from the error queue name.
pub fn resolve_destination(envelope: Option<&Envelope>, error_queue: &str) -> Destination {
    let exchange = envelope
        .and_then(Envelope::destination_exchange)
        .unwrap_or_else(|| source_queue_of(error_queue).to_string());
    Destination {
        routing_key: exchange.clone(),
        exchange,
    }
}

fn destination_of(message: &Message, error_queue: &str) -> Destination {
    let envelope = parse_envelope(&message.payload_text());
    resolve_destination(envelope.as_ref(), error_queue)
}

/// One previewed message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewEntry {
    pub report: String,
    pub destination: Destination,
}

/// What a republish call did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepublishResponse {
    /// The queue had nothing to read
    Empty { queue: String, confirm: bool },
    /// Non-destructive read; nothing was changed
    Preview {
        queue: String,
        count: u32,
        entries: Vec<PreviewEntry>,
    },
    /// Messages were consumed and republished
    Committed {
        queue: String,
        outcome: RepublishOutcome,
    },
}

impl RepublishResponse {
    pub fn render(&self) -> String {
        let mut out = String::new();
        match self {
            RepublishResponse::Empty { queue, confirm } => {
                let action = if *confirm { "republish" } else { "preview" };
                let _ = writeln!(out, "No messages in {queue}; nothing to {action}.");
            }
            RepublishResponse::Preview {
                queue,
                count,
                entries,
            } => {
                let _ = writeln!(
                    out,
                    "Preview of {} message(s) from {queue}. Messages remain in the queue.",
                    entries.len()
                );
                for entry in entries {
                    let _ = writeln!(out);
                    let _ = write!(out, "{}", entry.report);
                    let _ = writeln!(
                        out,
                        "Republish Target: exchange '{}' (routing key '{}')",
                        entry.destination.exchange, entry.destination.routing_key
                    );
                }
                let _ = writeln!(out);
                let _ = writeln!(out, "{}", confirm_instruction(*count));
                let _ = writeln!(
                    out,
                    "Note: the queue is read again on confirm. If it changed since this preview, different messages may be republished."
                );
            }
            RepublishResponse::Committed { queue, outcome } => {
                let _ = writeln!(
                    out,
                    "Republished {}/{} message(s) from {queue}.",
                    outcome.succeeded, outcome.attempted
                );
                if !outcome.per_message_errors.is_empty() {
                    let _ = writeln!(out, "Errors:");
                    for error in &outcome.per_message_errors {
                        let _ = writeln!(out, "  - {error}");
                    }
                }
            }
        }
        out
    }

    pub fn outcome(&self) -> Option<&RepublishOutcome> {
        match self {
            RepublishResponse::Committed { outcome, .. } => Some(outcome),
            _ => None,
        }
    }
}

/// The instruction a preview ends with
pub fn confirm_instruction(count: u32) -> String {
    format!(
        "To republish these messages, call republish_from_error again with confirm=true and count={count}."
    )
}

/// Runs the preview/commit protocol against a broker
pub struct Republisher {
    broker: Arc<dyn BrokerApi>,
    default_vhost: String,
}

impl Republisher {
    pub fn new(broker: Arc<dyn BrokerApi>, default_vhost: impl Into<String>) -> Self {
        Self {
            broker,
            default_vhost: default_vhost.into(),
        }
    }

    /// Preview or commit depending on `request.confirm`
    pub async fn run(&self, request: &RepublishRequest) -> Result<RepublishResponse> {
        request.validate()?;
        if request.confirm {
            self.commit(request).await
        } else {
            self.preview(request).await
        }
    }

    fn vhost(&self, request: &RepublishRequest) -> String {
        request
            .vhost
            .clone()
            .unwrap_or_else(|| self.default_vhost.clone())
    }

    /// Non-destructive read and render
    #[instrument(skip(self), fields(queue = %request.error_queue))]
    pub async fn preview(&self, request: &RepublishRequest) -> Result<RepublishResponse> {
        let messages = self
            .broker
            .get_messages(
                self.vhost(request),
                request.error_queue.clone(),
                request.count,
                AckMode::Requeue,
            )
            .await?;

        if messages.is_empty() {
            return Ok(RepublishResponse::Empty {
                queue: request.error_queue.clone(),
                confirm: false,
            });
        }

        let entries = messages
            .iter()
            .enumerate()
            .map(|(i, message)| PreviewEntry {
                report: format_message(message, i + 1),
                destination: destination_of(message, &request.error_queue),
            })
            .collect();

        Ok(RepublishResponse::Preview {
            queue: request.error_queue.clone(),
            count: request.count,
            entries,
        })
    }

    /// Consume and republish, continuing past individual failures
    #[instrument(skip(self), fields(queue = %request.error_queue))]
    pub async fn commit(&self, request: &RepublishRequest) -> Result<RepublishResponse> {
        let vhost = self.vhost(request);
        let messages = self
            .broker
            .get_messages(
                vhost.clone(),
                request.error_queue.clone(),
                request.count,
                AckMode::Consume,
            )
            .await?;

        if messages.is_empty() {
            return Ok(RepublishResponse::Empty {
                queue: request.error_queue.clone(),
                confirm: true,
            });
        }

        let mut outcome = RepublishOutcome {
            attempted: messages.len(),
            ..Default::default()
        };

        for (i, message) in messages.iter().enumerate() {
            let destination = destination_of(message, &request.error_queue);
            let label = message_label(message, i + 1);
            let publish = PublishMessage::republish_of(message, destination.routing_key.clone());

            match self
                .broker
                .publish(vhost.clone(), destination.exchange.clone(), publish)
                .await
            {
                Ok(true) => {
                    outcome.succeeded += 1;
                    info!(message = %label, exchange = %destination.exchange, "Republished message");
                }
                Ok(false) => {
                    warn!(message = %label, exchange = %destination.exchange, "Message was not routed");
                    outcome.per_message_errors.push(format!(
                        "{label}: not routed by exchange '{}'",
                        destination.exchange
                    ));
                }
                Err(e) => {
                    warn!(message = %label, error = %e, "Republish failed");
                    outcome.per_message_errors.push(format!("{label}: {e}"));
                }
            }
        }

        info!(
            attempted = outcome.attempted,
            succeeded = outcome.succeeded,
            "Republish finished"
        );

        Ok(RepublishResponse::Committed {
            queue: request.error_queue.clone(),
            outcome,
        })
    }
}

fn message_label(message: &Message, index: usize) -> String {
    match &message.properties.message_id {
        Some(id) => format!("message {index} ({id})"),
        None => format!("message {index}"),
    }
}
