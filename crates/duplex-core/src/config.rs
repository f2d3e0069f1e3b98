//! Centralized configuration for the duplex RPC layer.
//!
//! Protocol constants are associated consts on unit structs. Values that a
//! host may want to change at runtime live on [`ClientConfig`] and
//! [`HandshakeConfig`].

use crate::{Result, RpcError};
use std::time::Duration;
use url::Url;

/// Dispatch-level constants.
pub struct RpcConfig;

impl RpcConfig {
    /// Namespace assumed for bare `Method` names.
    pub const DEFAULT_NAMESPACE: &'static str = "Service1";
    pub const STATUS_OK: u16 = 200;
    pub const STATUS_BAD_REQUEST: u16 = 400;
}

/// Transport-level constants.
pub struct TransportConfig;

impl TransportConfig {
    pub const DEFAULT_ADDR: &'static str = "127.0.0.1:8080";
    pub const DEFAULT_PATH: &'static str = "/";
    /// Bound on TCP connect, proxy tunnel and WebSocket upgrade combined.
    pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(45);
    /// Upper limit on a proxy's CONNECT reply header block.
    pub const MAX_PROXY_RESPONSE_BYTES: usize = 8 * 1024;
}

/// Literal values of the identity exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeConfig {
    /// Exact frame text that triggers the exchange.
    pub sentinel: String,
    /// Prefix of the generated client key; the process id is appended.
    pub key_prefix: String,
    /// Challenge line echoed back. Never verified by either side.
    pub challenge: String,
}

impl HandshakeConfig {
    pub const SENTINEL: &'static str = "ClientKeyPlease";
    pub const KEY_PREFIX: &'static str = "Client";
    pub const CHALLENGE: &'static str = "Wibble";
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            sentinel: Self::SENTINEL.to_string(),
            key_prefix: Self::KEY_PREFIX.to_string(),
            challenge: Self::CHALLENGE.to_string(),
        }
    }
}

/// Runtime configuration for a [`crate::Client`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// `host:port` of the WebSocket endpoint.
    pub addr: String,
    /// Request path used in the upgrade request.
    pub path: String,
    /// Optional HTTP proxy, e.g. `http://localhost:8888`.
    pub proxy: Option<String>,
    pub default_namespace: String,
    pub handshake: HandshakeConfig,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addr: TransportConfig::DEFAULT_ADDR.to_string(),
            path: TransportConfig::DEFAULT_PATH.to_string(),
            proxy: None,
            default_namespace: RpcConfig::DEFAULT_NAMESPACE.to_string(),
            handshake: HandshakeConfig::default(),
            connect_timeout: TransportConfig::HANDSHAKE_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Create a configuration for the given `host:port`, defaults elsewhere.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Self::default()
        }
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn with_default_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.default_namespace = namespace.into();
        self
    }

    /// Check the configuration before dialing.
    pub fn validate(&self) -> Result<()> {
        if self.addr.trim().is_empty() {
            return Err(RpcError::config("address must not be empty"));
        }
        if self.default_namespace.trim().is_empty() {
            return Err(RpcError::config("default namespace must not be empty"));
        }
        if self.handshake.sentinel.is_empty() {
            return Err(RpcError::config("handshake sentinel must not be empty"));
        }
        if let Some(proxy) = &self.proxy {
            proxy_authority(proxy)?;
        }
        Ok(())
    }

    /// WebSocket URL built from `addr` and `path`.
    pub fn url(&self) -> String {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        format!("ws://{}{}", self.addr, path)
    }

    /// `host:port` of the configured proxy, if any.
    pub fn proxy_authority(&self) -> Result<Option<String>> {
        self.proxy.as_deref().map(proxy_authority).transpose()
    }
}

/// Extract `host:port` from a proxy URL, defaulting the port from the scheme.
fn proxy_authority(proxy: &str) -> Result<String> {
    let url = Url::parse(proxy)
        .map_err(|e| RpcError::config(format!("invalid proxy URL {:?}: {}", proxy, e)))?;
    let host = url
        .host_str()
        .ok_or_else(|| RpcError::config(format!("proxy URL {:?} has no host", proxy)))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| RpcError::config(format!("proxy URL {:?} has no port", proxy)))?;
    Ok(format!("{}:{}", host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.addr, "127.0.0.1:8080");
        assert_eq!(config.default_namespace, "Service1");
        assert_eq!(config.handshake.sentinel, "ClientKeyPlease");
        assert!(config.proxy.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_url_from_addr_and_path() {
        let mut config = ClientConfig::new("10.0.0.5:9000");
        assert_eq!(config.url(), "ws://10.0.0.5:9000/");

        config.path = "rpc".into();
        assert_eq!(config.url(), "ws://10.0.0.5:9000/rpc");
    }

    #[test]
    fn test_proxy_authority() {
        let config = ClientConfig::default().with_proxy("http://localhost:8888");
        assert_eq!(
            config.proxy_authority().unwrap(),
            Some("localhost:8888".to_string())
        );

        let config = ClientConfig::default().with_proxy("http://proxy.internal");
        assert_eq!(
            config.proxy_authority().unwrap(),
            Some("proxy.internal:80".to_string())
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(ClientConfig::new("  ").validate().is_err());
        assert!(ClientConfig::default()
            .with_proxy("not a url")
            .validate()
            .is_err());
        assert!(ClientConfig::default()
            .with_default_namespace("")
            .validate()
            .is_err());
    }

    #[test]
    fn test_timeouts_are_reasonable() {
        assert!(TransportConfig::HANDSHAKE_TIMEOUT > Duration::from_secs(1));
    }
}
