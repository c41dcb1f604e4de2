use anyhow::{Context, Result};
use portico_mqueue::MailboxConfig;
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;

// Gateway configuration sourced from environment variables, with optional
// YAML overrides for ops-friendly deployments. The mailbox provider selector
// is validated against its endpoint block at startup, before binding.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    // HTTP bind address for the public API.
    pub bind_addr: SocketAddr,
    // Metrics HTTP bind address.
    pub metrics_bind: SocketAddr,
    // Mailbox provider and store endpoints.
    pub mailbox: MailboxConfig,
}

#[derive(Debug, Deserialize)]
struct GatewayConfigOverride {
    bind_addr: Option<String>,
    metrics_bind: Option<String>,
    mailbox: Option<MailboxOverride>,
}

#[derive(Debug, Deserialize)]
struct MailboxOverride {
    provider: Option<String>,
    addr: Option<String>,
    addrs: Option<Vec<String>>,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        // Environment variables provide defaults for local development.
        let bind_addr = std::env::var("PORTICO_BIND")
            .unwrap_or_else(|_| "0.0.0.0:1234".to_string())
            .parse()
            .with_context(|| "parse PORTICO_BIND")?;
        let metrics_bind = std::env::var("PORTICO_METRICS_BIND")
            .unwrap_or_else(|_| "0.0.0.0:9108".to_string())
            .parse()
            .with_context(|| "parse PORTICO_METRICS_BIND")?;
        let provider = std::env::var("PORTICO_MQUEUE_PROVIDER")
            .unwrap_or_else(|_| "mem".to_string())
            .parse()
            .with_context(|| "parse PORTICO_MQUEUE_PROVIDER")?;
        let addr = std::env::var("PORTICO_REDIS_ADDR").ok();
        let addrs = std::env::var("PORTICO_REDIS_ADDRS")
            .ok()
            .map(|value| {
                value
                    .split(',')
                    .map(|endpoint| endpoint.trim().to_string())
                    .filter(|endpoint| !endpoint.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self {
            bind_addr,
            metrics_bind,
            mailbox: MailboxConfig {
                provider,
                addr,
                addrs,
            },
        })
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("PORTICO_GATEWAY_CONFIG") {
            // YAML overrides allow ops-friendly config files.
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read PORTICO_GATEWAY_CONFIG: {path}"))?;
            let override_cfg: GatewayConfigOverride =
                serde_yaml::from_str(&contents).with_context(|| "parse gateway config yaml")?;
            if let Some(value) = override_cfg.bind_addr {
                config.bind_addr = value.parse().with_context(|| "parse bind_addr")?;
            }
            if let Some(value) = override_cfg.metrics_bind {
                config.metrics_bind = value.parse().with_context(|| "parse metrics_bind")?;
            }
            if let Some(mailbox) = override_cfg.mailbox {
                if let Some(provider) = mailbox.provider {
                    config.mailbox.provider = provider
                        .parse()
                        .with_context(|| "parse mailbox provider")?;
                }
                if let Some(addr) = mailbox.addr {
                    config.mailbox.addr = Some(addr);
                }
                if let Some(addrs) = mailbox.addrs {
                    config.mailbox.addrs = addrs;
                }
            }
        }
        Ok(config)
    }
}
