use crate::{env_or_default, ConfigError, FromEnv};
use std::fmt;
use std::time::Duration;

/// Connection settings for the RabbitMQ management HTTP API
#[derive(Clone)]
pub struct RabbitMqConfig {
    pub management_url: String,
    pub username: String,
    pub password: String,
    pub vhost: String,
    pub timeout: Duration,
}

impl RabbitMqConfig {
    pub fn new(management_url: impl Into<String>) -> Self {
        Self {
            management_url: normalize_url(management_url.into()),
            ..Self::default()
        }
    }

    /// Apply command-line overrides on top of the environment
    pub fn with_overrides(
        mut self,
        management_url: Option<String>,
        username: Option<String>,
        vhost: Option<String>,
    ) -> Self {
        if let Some(url) = management_url {
            self.management_url = normalize_url(url);
        }
        if let Some(username) = username {
            self.username = username;
        }
        if let Some(vhost) = vhost {
            self.vhost = vhost;
        }
        self
    }
}

fn normalize_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

impl FromEnv for RabbitMqConfig {
    /// Reads from environment variables with local-broker defaults:
    /// - RABBITMQ_MANAGEMENT_URL: defaults to http://localhost:15672
    /// - RABBITMQ_USER / RABBITMQ_PASSWORD: default to guest/guest
    /// - RABBITMQ_VHOST: defaults to /
    /// - RABBITMQ_TIMEOUT_SECS: defaults to 30
    fn from_env() -> Result<Self, ConfigError> {
        let timeout_secs: u64 = env_or_default("RABBITMQ_TIMEOUT_SECS", "30")
            .parse()
            .map_err(|e| ConfigError::ParseError {
                key: "RABBITMQ_TIMEOUT_SECS".to_string(),
                details: format!("{}", e),
            })?;

        Ok(Self {
            management_url: normalize_url(env_or_default(
                "RABBITMQ_MANAGEMENT_URL",
                "http://localhost:15672",
            )),
            username: env_or_default("RABBITMQ_USER", "guest"),
            password: env_or_default("RABBITMQ_PASSWORD", "guest"),
            vhost: env_or_default("RABBITMQ_VHOST", "/"),
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

impl Default for RabbitMqConfig {
    fn default() -> Self {
        Self {
            management_url: "http://localhost:15672".to_string(),
            username: "guest".to_string(),
            password: "guest".to_string(),
            vhost: "/".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

// Password stays out of logs
impl fmt::Debug for RabbitMqConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RabbitMqConfig")
            .field("management_url", &self.management_url)
            .field("username", &self.username)
            .field("password", &"***")
            .field("vhost", &self.vhost)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: [&str; 5] = [
        "RABBITMQ_MANAGEMENT_URL",
        "RABBITMQ_USER",
        "RABBITMQ_PASSWORD",
        "RABBITMQ_VHOST",
        "RABBITMQ_TIMEOUT_SECS",
    ];

    #[test]
    fn test_rabbitmq_config_from_env_with_defaults() {
        temp_env::with_vars(VARS.map(|k| (k, None::<&str>)), || {
            let config = RabbitMqConfig::from_env().unwrap();
            assert_eq!(config.management_url, "http://localhost:15672");
            assert_eq!(config.username, "guest");
            assert_eq!(config.password, "guest");
            assert_eq!(config.vhost, "/");
            assert_eq!(config.timeout, Duration::from_secs(30));
        });
    }

    #[test]
    fn test_rabbitmq_config_from_env_with_custom_values() {
        temp_env::with_vars(
            [
                ("RABBITMQ_MANAGEMENT_URL", Some("https://mq.internal:443/")),
                ("RABBITMQ_USER", Some("ops")),
                ("RABBITMQ_PASSWORD", Some("hunter2")),
                ("RABBITMQ_VHOST", Some("prod")),
                ("RABBITMQ_TIMEOUT_SECS", Some("5")),
            ],
            || {
                let config = RabbitMqConfig::from_env().unwrap();
                assert_eq!(config.management_url, "https://mq.internal:443");
                assert_eq!(config.username, "ops");
                assert_eq!(config.password, "hunter2");
                assert_eq!(config.vhost, "prod");
                assert_eq!(config.timeout, Duration::from_secs(5));
            },
        );
    }

    #[test]
    fn test_rabbitmq_config_invalid_timeout() {
        temp_env::with_var("RABBITMQ_TIMEOUT_SECS", Some("soon"), || {
            let err = RabbitMqConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("RABBITMQ_TIMEOUT_SECS"));
        });
    }

    #[test]
    fn test_rabbitmq_config_overrides() {
        let config = RabbitMqConfig::default().with_overrides(
            Some("http://broker:15672/".to_string()),
            None,
            Some("staging".to_string()),
        );
        assert_eq!(config.management_url, "http://broker:15672");
        assert_eq!(config.username, "guest");
        assert_eq!(config.vhost, "staging");
    }

    #[test]
    fn test_rabbitmq_config_debug_hides_password() {
        let mut config = RabbitMqConfig::new("http://broker:15672");
        config.password = "hunter2".to_string();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("***"));
    }
}
