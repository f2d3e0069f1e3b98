//! Request dispatcher.
//!
//! [`Dispatcher::serve`] takes one raw request and always produces a
//! [`Response`]; nothing escapes it as an error. Each call runs
//! decode, resolve, bind, invoke and encode in order. A failure at any stage
//! skips straight to encoding an error envelope with the bad-request status.
//!
//! Two optional hooks observe traffic:
//!
//! - the *before* hook sees the resolved method name just before the call;
//! - the *after* hook sees the method name, any failure and the status code,
//!   exactly once per served request, on success and failure paths alike.
//!
//! Each hook has a single slot. Registering again replaces the previous hook.

use crate::codec::{encode_response, RequestEnvelope, ResponseEnvelope};
use crate::config::RpcConfig;
use crate::registry::{Registry, Service};
use crate::{Result, RpcError};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Information handed to the before and after hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    /// Method name as requested; empty if the request could not be decoded.
    pub method: String,
    /// Failure message, from the method itself or from dispatch.
    pub error: Option<String>,
    /// Status marker; `0` in the before hook.
    pub status_code: u16,
}

/// Callback invoked around dispatch.
pub type Hook = Arc<dyn Fn(&RequestInfo) + Send + Sync>;

/// Outcome of serving one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    /// Encoded response envelope. Empty for notifications.
    pub body: String,
}

impl Response {
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Decodes requests, calls registered methods and encodes responses.
pub struct Dispatcher {
    registry: Arc<Registry>,
    before: RwLock<Option<Hook>>,
    after: RwLock<Option<Hook>>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(Arc::new(Registry::new()))
    }
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            before: RwLock::new(None),
            after: RwLock::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Register a service with the underlying registry.
    pub fn register_service<S: Service>(&self, service: S, name: Option<&str>) -> Result<()> {
        self.registry.register(service, name)
    }

    /// True if `method` (dotted or bare) is registered.
    pub fn has_method(&self, method: &str) -> bool {
        self.registry.has_method(method)
    }

    /// Set the hook run before every method call, replacing any previous one.
    pub fn register_before_hook<F>(&self, hook: F)
    where
        F: Fn(&RequestInfo) + Send + Sync + 'static,
    {
        set_hook(&self.before, Arc::new(hook));
    }

    /// Set the hook run after every served request, replacing any previous one.
    pub fn register_after_hook<F>(&self, hook: F)
    where
        F: Fn(&RequestInfo) + Send + Sync + 'static,
    {
        set_hook(&self.after, Arc::new(hook));
    }

    /// Serve one raw request.
    pub fn serve(&self, raw: &str) -> Response {
        debug!("[serve] {}", raw);

        let request = match RequestEnvelope::decode(raw) {
            Ok(request) => request,
            Err(err) => return self.write_error(None, err),
        };
        let method = request.method();

        let (_, descriptor) = match self.registry.resolve(method) {
            Ok(resolved) => resolved,
            Err(err) => {
                warn!("Error getting method '{}'. {}", method, err);
                return self.write_error(Some(&request), err);
            }
        };

        let call = match descriptor.bind(&request) {
            Ok(call) => call,
            Err(err) => {
                warn!("Error reading request '{}'. {}", raw, err);
                return self.write_error(Some(&request), err);
            }
        };

        if let Some(before) = current_hook(&self.before) {
            before(&RequestInfo {
                method: method.to_string(),
                error: None,
                status_code: 0,
            });
        }

        debug!("[serve] Calling method: {}", method);
        let outcome = match call() {
            Ok(outcome) => outcome,
            Err(err) => return self.write_error(Some(&request), err),
        };

        let body = match encode_response(outcome.reply, outcome.error.as_ref(), request.id()) {
            Ok(body) => body,
            Err(err) => return self.write_error(Some(&request), err),
        };

        if let Some(err) = &outcome.error {
            debug!("[serve] {} returned failure: {}", method, err);
        }
        self.notify_after(RequestInfo {
            method: method.to_string(),
            error: outcome.error.map(|e| e.message().to_string()),
            status_code: RpcConfig::STATUS_OK,
        });

        Response {
            status: RpcConfig::STATUS_OK,
            body,
        }
    }

    /// Turn a dispatch failure into an error envelope.
    ///
    /// Undecodable requests get an envelope with a `null` id; decoded
    /// notifications still get no response body.
    fn write_error(&self, request: Option<&RequestEnvelope>, err: RpcError) -> Response {
        let status = err.status_code();
        let message = err.to_string();

        let body = match request {
            Some(request) if request.is_notification() => String::new(),
            Some(request) => ResponseEnvelope::failure(
                request.id().cloned().unwrap_or(Value::Null),
                message.as_str(),
            )
            .to_json()
            .unwrap_or_default(),
            None => ResponseEnvelope::failure(Value::Null, message.as_str())
                .to_json()
                .unwrap_or_default(),
        };

        self.notify_after(RequestInfo {
            method: request.map(|r| r.method().to_string()).unwrap_or_default(),
            error: Some(message),
            status_code: status,
        });

        Response { status, body }
    }

    fn notify_after(&self, info: RequestInfo) {
        if let Some(after) = current_hook(&self.after) {
            after(&info);
        }
    }
}

fn set_hook(slot: &RwLock<Option<Hook>>, hook: Hook) {
    match slot.write() {
        Ok(mut guard) => *guard = Some(hook),
        Err(poisoned) => *poisoned.into_inner() = Some(hook),
    }
}

/// Clone the hook out so it never runs under the slot lock.
fn current_hook(slot: &RwLock<Option<Hook>>) -> Option<Hook> {
    match slot.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}
