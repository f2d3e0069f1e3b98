//! Client facade tying configuration, dispatch and transport together.
//!
//! A [`Client`] owns one [`Dispatcher`] for its whole life. Services and
//! hooks are registered on it before [`Client::run`] dials out; `run` then
//! serves the single connection until it closes. The client never
//! reconnects on its own.

use crate::config::ClientConfig;
use crate::connection::{self, CloseReason, ConnectionLoop};
use crate::dispatcher::Dispatcher;
use crate::registry::{Registry, Service};
use crate::transport;
use crate::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Host-side endpoint of a duplex RPC connection.
#[derive(Debug)]
pub struct Client {
    config: ClientConfig,
    dispatcher: Arc<Dispatcher>,
    listening: AtomicBool,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        let registry = Registry::with_default_namespace(config.default_namespace.clone());
        Self {
            config,
            dispatcher: Arc::new(Dispatcher::new(Arc::new(registry))),
            listening: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Register a service under `name`, or under its type name.
    pub fn register_service<S: Service>(&self, service: S, name: Option<&str>) -> Result<()> {
        self.dispatcher.register_service(service, name)
    }

    /// Dispatcher shared with the connection loop, for hook registration.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// True while [`Client::run`] is serving a connection.
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Identity token this client sends in reply to the handshake sentinel.
    pub fn client_key(&self) -> String {
        connection::client_key(&self.config.handshake)
    }

    /// Connect and serve until the connection closes.
    ///
    /// Connection failures are returned as errors. Once connected, the loop
    /// always ends with a [`CloseReason`].
    pub async fn run(&self) -> Result<CloseReason> {
        let channel = transport::connect(&self.config).await?;
        info!("Connected to {}", self.config.url());

        let mut connection = ConnectionLoop::with_handshake(
            channel,
            Arc::clone(&self.dispatcher),
            self.config.handshake.clone(),
        );

        let reason = {
            let _listening = ListeningGuard::set(&self.listening);
            connection.run().await
        };

        info!(
            "Connection finished after {} frames: {:?}",
            connection.session().frames_handled(),
            reason
        );
        Ok(reason)
    }
}

/// Clears the listening flag when dropped, so a cancelled `run` does not
/// leave it set.
struct ListeningGuard<'a>(&'a AtomicBool);

impl<'a> ListeningGuard<'a> {
    fn set(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for ListeningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MethodResult;
    use crate::registry::MethodTable;
    use crate::ErrorKind;
    use std::time::Duration;

    struct Echo;

    impl Echo {
        fn ping(&self, _: &mut String, reply: &mut String) -> MethodResult {
            *reply = "Pong".to_string();
            Ok(())
        }
    }

    impl Service for Echo {
        fn register_methods(table: &mut MethodTable<Self>) {
            table.method("Ping", Self::ping);
        }
    }

    #[test]
    fn test_default_namespace_follows_config() {
        let client = Client::new(ClientConfig::default().with_default_namespace("Echo"));
        client.register_service(Echo, None).unwrap();

        assert_eq!(client.dispatcher().registry().default_namespace(), "Echo");
        assert!(client.dispatcher().has_method("Ping"));
        assert!(!client.is_listening());
    }

    #[test]
    fn test_client_key_uses_handshake_prefix() {
        let client = Client::new(ClientConfig::default());
        assert_eq!(client.client_key(), format!("Client{}", std::process::id()));
    }

    #[tokio::test]
    async fn test_run_rejects_invalid_config() {
        let client = Client::new(ClientConfig::new(""));
        let err = client.run().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[tokio::test]
    async fn test_run_fails_when_nothing_listens() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut config = ClientConfig::new(addr.to_string());
        config.connect_timeout = Duration::from_secs(5);
        let err = Client::new(config).run().await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_cancelled_run_clears_listening() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Complete the upgrade, then stay silent.
        let peer = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(ws);
        });

        let client = Client::new(ClientConfig::new(addr.to_string()));
        client.register_service(Echo, None).unwrap();

        let mut run = Box::pin(client.run());
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !client.is_listening() {
            assert!(tokio::time::Instant::now() < deadline, "client never connected");
            tokio::select! {
                result = &mut run => panic!("run returned early: {:?}", result),
                _ = tokio::time::sleep(Duration::from_millis(10)) => {}
            }
        }

        // Dropping the future is what `select!` or a timeout does on cancel.
        drop(run);
        assert!(!client.is_listening());
        peer.abort();
    }
}
