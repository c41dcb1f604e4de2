//! Mailbox provider selection and construction.
//!
//! The provider selector and the endpoint block travel separately through
//! configuration, so a mismatch between the two is rejected at startup
//! instead of surfacing as a confusing connection error later.
use crate::mem::MemMQueue;
use crate::redis::{RedisClusterMQueue, RedisSingleMQueue};
use crate::MQueue;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Which backing store serves the mailboxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MailboxProvider {
    Mem,
    RedisSingle,
    RedisCluster,
}

impl MailboxProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            MailboxProvider::Mem => "mem",
            MailboxProvider::RedisSingle => "redis-single",
            MailboxProvider::RedisCluster => "redis-cluster",
        }
    }
}

impl fmt::Display for MailboxProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MailboxProvider {
    type Err = MailboxInitError;

    fn from_str(input: &str) -> std::result::Result<Self, Self::Err> {
        match input {
            "mem" => Ok(MailboxProvider::Mem),
            "redis-single" => Ok(MailboxProvider::RedisSingle),
            "redis-cluster" => Ok(MailboxProvider::RedisCluster),
            other => Err(MailboxInitError::UnknownBackend(other.to_string())),
        }
    }
}

/// Mailbox backend configuration: the provider selector plus the endpoint
/// block for the Redis providers.
#[derive(Debug, Clone, Deserialize)]
pub struct MailboxConfig {
    #[serde(default = "default_provider")]
    pub provider: MailboxProvider,
    /// Endpoint for `redis-single`.
    #[serde(default)]
    pub addr: Option<String>,
    /// Endpoints for `redis-cluster`.
    #[serde(default)]
    pub addrs: Vec<String>,
}

fn default_provider() -> MailboxProvider {
    MailboxProvider::Mem
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            addr: None,
            addrs: Vec::new(),
        }
    }
}

impl MailboxConfig {
    /// The provider selector must agree with the endpoint block that was
    /// actually populated.
    pub fn validate(&self) -> std::result::Result<(), MailboxInitError> {
        let conflict = match self.provider {
            MailboxProvider::Mem => self.addr.is_some() || !self.addrs.is_empty(),
            MailboxProvider::RedisSingle => self.addr.is_none() || !self.addrs.is_empty(),
            MailboxProvider::RedisCluster => self.addrs.is_empty() || self.addr.is_some(),
        };
        if conflict {
            return Err(MailboxInitError::BackendConfigConflict {
                provider: self.provider,
            });
        }
        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum MailboxInitError {
    #[error("unknown mailbox backend: {0}")]
    UnknownBackend(String),
    #[error("mailbox provider `{provider}` does not match the configured endpoints")]
    BackendConfigConflict { provider: MailboxProvider },
    #[error("failed to reach mailbox backing store: {0}")]
    Connect(#[from] crate::MQueueError),
}

/// Construct the configured mailbox backend.
pub async fn new_mailbox(
    config: &MailboxConfig,
) -> std::result::Result<Arc<dyn MQueue>, MailboxInitError> {
    config.validate()?;
    match config.provider {
        MailboxProvider::Mem => Ok(Arc::new(MemMQueue::new())),
        MailboxProvider::RedisSingle => {
            // validate() guarantees the endpoint is present.
            let addr = config.addr.clone().unwrap_or_default();
            Ok(Arc::new(RedisSingleMQueue::connect(&addr).await?))
        }
        MailboxProvider::RedisCluster => {
            Ok(Arc::new(RedisClusterMQueue::connect(&config.addrs).await?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_parses_known_selectors() {
        assert_eq!(
            "mem".parse::<MailboxProvider>().expect("mem"),
            MailboxProvider::Mem
        );
        assert_eq!(
            "redis-single".parse::<MailboxProvider>().expect("single"),
            MailboxProvider::RedisSingle
        );
        assert_eq!(
            "redis-cluster".parse::<MailboxProvider>().expect("cluster"),
            MailboxProvider::RedisCluster
        );
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let err = "etcd".parse::<MailboxProvider>().expect_err("unknown");
        assert!(matches!(err, MailboxInitError::UnknownBackend(name) if name == "etcd"));
    }

    #[test]
    fn mem_with_redis_endpoints_conflicts() {
        let config = MailboxConfig {
            provider: MailboxProvider::Mem,
            addr: Some("127.0.0.1:6379".to_string()),
            addrs: Vec::new(),
        };
        let err = config.validate().expect_err("conflict");
        assert!(matches!(
            err,
            MailboxInitError::BackendConfigConflict {
                provider: MailboxProvider::Mem
            }
        ));
    }

    #[test]
    fn redis_single_requires_addr() {
        let config = MailboxConfig {
            provider: MailboxProvider::RedisSingle,
            addr: None,
            addrs: Vec::new(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn redis_cluster_rejects_single_addr_block() {
        let config = MailboxConfig {
            provider: MailboxProvider::RedisCluster,
            addr: Some("127.0.0.1:6379".to_string()),
            addrs: vec!["127.0.0.1:7000".to_string()],
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn matching_blocks_validate() {
        assert!(MailboxConfig::default().validate().is_ok());
        let single = MailboxConfig {
            provider: MailboxProvider::RedisSingle,
            addr: Some("127.0.0.1:6379".to_string()),
            addrs: Vec::new(),
        };
        assert!(single.validate().is_ok());
        let cluster = MailboxConfig {
            provider: MailboxProvider::RedisCluster,
            addr: None,
            addrs: vec!["127.0.0.1:7000".to_string(), "127.0.0.1:7001".to_string()],
        };
        assert!(cluster.validate().is_ok());
    }

    #[test]
    fn provider_deserializes_from_yaml() {
        let config: MailboxConfig =
            serde_yaml::from_str("provider: redis-single\naddr: 127.0.0.1:6379\n")
                .expect("yaml");
        assert_eq!(config.provider, MailboxProvider::RedisSingle);
        assert_eq!(config.addr.as_deref(), Some("127.0.0.1:6379"));
    }

    #[tokio::test]
    async fn mem_mailbox_constructs() {
        let mailbox = new_mailbox(&MailboxConfig::default()).await.expect("mem");
        assert_eq!(mailbox.next("sub").await.expect("next"), 0);
    }

    #[tokio::test]
    async fn conflicting_config_fails_construction() {
        let config = MailboxConfig {
            provider: MailboxProvider::Mem,
            addr: Some("127.0.0.1:6379".to_string()),
            addrs: Vec::new(),
        };
        assert!(new_mailbox(&config).await.is_err());
    }
}
