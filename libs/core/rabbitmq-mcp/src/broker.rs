//! Broker management abstraction
//!
//! The tools only talk to the broker through this trait, so the HTTP client
//! can be swapped for a mock or an in-memory fake in tests.

use crate::error::Result;
use crate::types::{AckMode, ConnectionInfo, Message, Overview, PublishMessage, QueueInfo};
use async_trait::async_trait;

/// Operations the tools need from the broker's management interface
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerApi: Send + Sync {
    /// Cluster-wide overview
    async fn overview(&self) -> Result<Overview>;

    /// Queues in one vhost, or in all vhosts when `vhost` is `None`
    async fn list_queues(&self, vhost: Option<String>) -> Result<Vec<QueueInfo>>;

    /// Client connections
    async fn list_connections(&self) -> Result<Vec<ConnectionInfo>>;

    /// Fetch up to `count` messages. `AckMode::Requeue` leaves them in the
    /// queue, `AckMode::Consume` removes them.
    async fn get_messages(
        &self,
        vhost: String,
        queue: String,
        count: u32,
        ack_mode: AckMode,
    ) -> Result<Vec<Message>>;

    /// Publish to an exchange. Returns whether the broker routed the message.
    async fn publish(&self, vhost: String, exchange: String, message: PublishMessage) -> Result<bool>;

    /// Remove all ready messages from a queue
    async fn purge_queue(&self, vhost: String, queue: String) -> Result<()>;
}
