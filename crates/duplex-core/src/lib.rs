//! Duplex RPC - JSON-RPC method dispatch over one long-lived WebSocket.
//!
//! A host registers services, connects to a single WebSocket endpoint and
//! answers JSON-RPC requests that the remote side pushes down that
//! connection. Roles are inverted compared to a usual RPC server: this side
//! dials out, then serves.
//!
//! # Example
//!
//! ```rust,ignore
//! use duplex_rpc::{Client, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> duplex_rpc::Result<()> {
//!     let client = Client::new(ClientConfig::new("127.0.0.1:8080"));
//!     client.register_service(MyService, None)?;
//!
//!     client.dispatcher().register_after_hook(|info| {
//!         println!("{} -> {}", info.method, info.status_code);
//!     });
//!
//!     let reason = client.run().await?;
//!     println!("connection closed: {:?}", reason);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod registry;
pub mod transport;

// Re-export commonly used types
pub use client::Client;
pub use codec::{encode_response, RequestEnvelope, ResponseEnvelope};
pub use config::{ClientConfig, HandshakeConfig, RpcConfig, TransportConfig};
pub use connection::{CloseReason, ConnectionLoop, Frame, FrameChannel, FrameKind, Session};
pub use dispatcher::{Dispatcher, Hook, RequestInfo, Response};
pub use error::{ErrorKind, MethodError, MethodResult, Result, RpcError};
pub use registry::{
    MethodDescriptor, MethodOutcome, MethodTable, PreparedCall, Registry, Service,
    ServiceNamespace,
};
pub use transport::{connect, WsChannel};
