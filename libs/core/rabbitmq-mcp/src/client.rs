//! RabbitMQ management HTTP client using the Typestate pattern
//!
//! The client must be initialized before making requests.
//! Invalid states (like listing queues without initialization) are compile-time errors.

use crate::broker::BrokerApi;
use crate::error::{Error, ErrorContext, Result};
use crate::types::{
    AckMode, ConnectionInfo, GetRequest, Message, Overview, PublishMessage, PublishResponse,
    QueueInfo,
};
use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::time::Duration;
use tracing::{debug, instrument};

/// Marker type: Client is not yet initialized
pub struct Uninitialized;

/// Marker type: Client is ready to make requests
pub struct Ready;

/// Name the management API uses for the nameless default exchange
const DEFAULT_EXCHANGE: &str = "amq.default";

/// Management API client with typestate pattern
///
/// The client transitions from `Uninitialized` to `Ready` after calling `init()`.
pub struct ManagementClient<State> {
    client: Option<reqwest::Client>,
    base_url: String,
    username: String,
    password: String,
    timeout: Duration,
    _state: PhantomData<State>,
}

impl ManagementClient<Uninitialized> {
    /// Create a new uninitialized client for `base_url` (e.g. `http://localhost:15672`)
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: None,
            base_url: base_url.trim_end_matches('/').to_string(),
            username: "guest".to_string(),
            password: "guest".to_string(),
            timeout: Duration::from_secs(30),
            _state: PhantomData,
        }
    }

    /// Set basic auth credentials
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Set the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Initialize the client, transitioning to Ready state
    pub fn init(self) -> Result<ManagementClient<Ready>> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("rabbitmq-mcp/", env!("CARGO_PKG_VERSION")))
            .timeout(self.timeout)
            .build()
            .with_context("client initialization")?;

        Ok(ManagementClient {
            client: Some(client),
            base_url: self.base_url,
            username: self.username,
            password: self.password,
            timeout: self.timeout,
            _state: PhantomData,
        })
    }
}

impl ManagementClient<Ready> {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn http(&self) -> Result<&reqwest::Client> {
        self.client.as_ref().ok_or_else(|| Error::InvalidRequest {
            message: "management client is not initialized".to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    fn get(&self, path: &str) -> Result<RequestBuilder> {
        Ok(self
            .http()?
            .get(self.url(path))
            .basic_auth(&self.username, Some(&self.password)))
    }

    fn post(&self, path: &str) -> Result<RequestBuilder> {
        Ok(self
            .http()?
            .post(self.url(path))
            .basic_auth(&self.username, Some(&self.password)))
    }

    fn delete(&self, path: &str) -> Result<RequestBuilder> {
        Ok(self
            .http()?
            .delete(self.url(path))
            .basic_auth(&self.username, Some(&self.password)))
    }

    /// Send a request and map error statuses
    async fn send(&self, request: RequestBuilder, context: &str) -> Result<reqwest::Response> {
        let response = request.send().await.with_context(context)?;
        let status = response.status();

        match status {
            StatusCode::UNAUTHORIZED => Err(Error::Unauthorized {
                context: context.to_string(),
            }),
            StatusCode::NOT_FOUND => Err(Error::NotFound {
                context: context.to_string(),
            }),
            s if !s.is_success() => {
                let body = response.text().await.unwrap_or_default();
                Err(Error::Status {
                    context: context.to_string(),
                    status: s.as_u16(),
                    body,
                })
            }
            _ => Ok(response),
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder, context: &str) -> Result<T> {
        let response = self.send(request, context).await?;
        let body = response.text().await.with_context(context)?;
        serde_json::from_str(&body).with_context(context)
    }
}

/// Percent-encode a single path segment; the default vhost `/` becomes `%2F`.
fn segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

fn exchange_segment(exchange: &str) -> String {
    if exchange.is_empty() {
        DEFAULT_EXCHANGE.to_string()
    } else {
        segment(exchange)
    }
}

#[async_trait]
impl BrokerApi for ManagementClient<Ready> {
    #[instrument(skip(self))]
    async fn overview(&self) -> Result<Overview> {
        self.send_json(self.get("overview")?, "GET /api/overview").await
    }

    #[instrument(skip(self))]
    async fn list_queues(&self, vhost: Option<String>) -> Result<Vec<QueueInfo>> {
        let path = match &vhost {
            Some(vhost) => format!("queues/{}", segment(vhost)),
            None => "queues".to_string(),
        };
        let context = format!("GET /api/{path}");
        self.send_json(self.get(&path)?, &context).await
    }

    #[instrument(skip(self))]
    async fn list_connections(&self) -> Result<Vec<ConnectionInfo>> {
        self.send_json(self.get("connections")?, "GET /api/connections")
            .await
    }

    #[instrument(skip(self), fields(destructive = ack_mode.is_destructive()))]
    async fn get_messages(
        &self,
        vhost: String,
        queue: String,
        count: u32,
        ack_mode: AckMode,
    ) -> Result<Vec<Message>> {
        let path = format!("queues/{}/{}/get", segment(&vhost), segment(&queue));
        let context = format!("POST /api/{path}");
        let request = self.post(&path)?.json(&GetRequest::new(count, ack_mode));
        let messages: Vec<Message> = self.send_json(request, &context).await?;

        debug!(fetched = messages.len(), "Fetched messages");
        Ok(messages)
    }

    #[instrument(skip(self, message), fields(routing_key = %message.routing_key))]
    async fn publish(&self, vhost: String, exchange: String, message: PublishMessage) -> Result<bool> {
        let path = format!(
            "exchanges/{}/{}/publish",
            segment(&vhost),
            exchange_segment(&exchange)
        );
        let context = format!("POST /api/{path}");
        let request = self.post(&path)?.json(&message);
        let response: PublishResponse = self.send_json(request, &context).await?;
        Ok(response.routed)
    }

    #[instrument(skip(self))]
    async fn purge_queue(&self, vhost: String, queue: String) -> Result<()> {
        let path = format!("queues/{}/{}/contents", segment(&vhost), segment(&queue));
        let context = format!("DELETE /api/{path}");
        self.send(self.delete(&path)?, &context).await?;
        Ok(())
    }
}

// Ensure the client can't be cloned in an uninitialized state
impl Clone for ManagementClient<Ready> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            timeout: self.timeout,
            _state: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typestate_init() {
        // fetching is only available once init() has produced a Ready client
        let client = ManagementClient::new("http://localhost:15672/").init();
        assert!(client.is_ok());
        assert_eq!(client.unwrap().base_url(), "http://localhost:15672");
    }

    #[test]
    fn test_segments_are_encoded() {
        assert_eq!(segment("/"), "%2F");
        assert_eq!(segment("orders_error"), "orders_error");
        assert_eq!(segment("App:Order Placed"), "App%3AOrder%20Placed");
        assert_eq!(exchange_segment(""), "amq.default");
    }

    #[test]
    fn test_builder_sets_credentials() {
        let client = ManagementClient::new("http://broker:15672")
            .with_credentials("ops", "secret")
            .with_timeout(Duration::from_secs(5));
        assert_eq!(client.username, "ops");
        assert_eq!(client.timeout, Duration::from_secs(5));
    }
}
