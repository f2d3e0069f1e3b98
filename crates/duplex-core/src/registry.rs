//! Service registry.
//!
//! Services describe their callable methods through [`Service::register_methods`].
//! Each candidate takes the receiver, a mutable argument and a mutable reply
//! and returns a [`MethodResult`]; argument and reply types are checked by
//! the compiler. Registration then applies the naming rules: method names
//! and inferred service names must be exported (start with an uppercase
//! letter), and a service with no qualifying methods is rejected.
//!
//! # Example
//!
//! ```rust
//! use duplex_rpc::{MethodResult, MethodTable, Registry, Service};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Default, Deserialize)]
//! struct Operands { a: i64, b: i64 }
//!
//! #[derive(Default, Serialize)]
//! struct Product { result: i64 }
//!
//! struct Arith;
//!
//! impl Arith {
//!     fn multiply(&self, args: &mut Operands, reply: &mut Product) -> MethodResult {
//!         reply.result = args.a * args.b;
//!         Ok(())
//!     }
//! }
//!
//! impl Service for Arith {
//!     fn register_methods(table: &mut MethodTable<Self>) {
//!         table.method("Multiply", Self::multiply);
//!     }
//! }
//!
//! let registry = Registry::new();
//! registry.register(Arith, None).unwrap();
//! assert!(registry.has_method("Arith.Multiply"));
//! ```

use crate::codec::RequestEnvelope;
use crate::config::RpcConfig;
use crate::error::{MethodError, MethodResult};
use crate::{Result, RpcError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// A type whose methods can be exposed over RPC.
pub trait Service: Send + Sync + Sized + 'static {
    /// List this service's candidate methods.
    fn register_methods(table: &mut MethodTable<Self>);
}

/// What a method call produced: the serialized reply and the method's own
/// failure, if it reported one.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodOutcome {
    pub reply: Value,
    pub error: Option<MethodError>,
}

/// A call whose arguments have been bound and which is ready to run.
pub type PreparedCall<'a> = Box<dyn FnOnce() -> Result<MethodOutcome> + 'a>;

/// Type-erased view of a registered method.
trait ErasedMethod: Send + Sync {
    fn bind<'a>(&'a self, request: &RequestEnvelope) -> Result<PreparedCall<'a>>;
}

struct TypedMethod<S, A, R, F> {
    receiver: Arc<S>,
    func: F,
    _marker: PhantomData<fn(&mut A, &mut R)>,
}

impl<S, A, R, F> ErasedMethod for TypedMethod<S, A, R, F>
where
    S: Service,
    A: DeserializeOwned + Default + 'static,
    R: Serialize + Default + 'static,
    F: Fn(&S, &mut A, &mut R) -> MethodResult + Send + Sync + 'static,
{
    fn bind<'a>(&'a self, request: &RequestEnvelope) -> Result<PreparedCall<'a>> {
        let mut args = A::default();
        request.read_params(&mut args)?;

        Ok(Box::new(move || {
            let mut reply = R::default();
            let outcome = (self.func)(&self.receiver, &mut args, &mut reply);
            let reply = serde_json::to_value(&reply).map_err(|e| RpcError::Encode {
                message: e.to_string(),
                source: Some(e),
            })?;
            Ok(MethodOutcome {
                reply,
                error: outcome.err(),
            })
        }))
    }
}

/// Registry record for one method.
#[derive(Clone)]
pub struct MethodDescriptor {
    name: String,
    args_type: &'static str,
    reply_type: &'static str,
    method: Arc<dyn ErasedMethod>,
}

impl MethodDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rust type name of the argument value.
    pub fn args_type(&self) -> &'static str {
        self.args_type
    }

    /// Rust type name of the reply value.
    pub fn reply_type(&self) -> &'static str {
        self.reply_type
    }

    /// Bind the request's params into a fresh argument value.
    pub fn bind<'a>(&'a self, request: &RequestEnvelope) -> Result<PreparedCall<'a>> {
        self.method.bind(request)
    }

    /// True if both descriptors call the same registered function.
    pub fn same_callable(&self, other: &MethodDescriptor) -> bool {
        Arc::ptr_eq(&self.method, &other.method)
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("args_type", &self.args_type)
            .field("reply_type", &self.reply_type)
            .finish()
    }
}

/// Candidate methods collected from a service during registration.
pub struct MethodTable<S> {
    receiver: Arc<S>,
    methods: HashMap<String, MethodDescriptor>,
}

impl<S: Service> MethodTable<S> {
    fn new(receiver: Arc<S>) -> Self {
        Self {
            receiver,
            methods: HashMap::new(),
        }
    }

    /// Offer a method under `name`.
    ///
    /// Names that are not exported are skipped, as are repeats of a name
    /// already offered.
    pub fn method<A, R, F>(&mut self, name: &str, func: F) -> &mut Self
    where
        A: DeserializeOwned + Default + 'static,
        R: Serialize + Default + 'static,
        F: Fn(&S, &mut A, &mut R) -> MethodResult + Send + Sync + 'static,
    {
        debug!("[register] Testing method {}", name);
        if !is_exported(name) {
            debug!("[register] {} not exported", name);
            return self;
        }
        if self.methods.contains_key(name) {
            warn!("[register] {} offered twice, keeping the first", name);
            return self;
        }

        let method = TypedMethod {
            receiver: Arc::clone(&self.receiver),
            func,
            _marker: PhantomData,
        };
        self.methods.insert(
            name.to_string(),
            MethodDescriptor {
                name: name.to_string(),
                args_type: std::any::type_name::<A>(),
                reply_type: std::any::type_name::<R>(),
                method: Arc::new(method),
            },
        );
        debug!("[register] Found method {}", name);
        self
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// A registered service: its namespace and methods. Immutable once built.
#[derive(Debug)]
pub struct ServiceNamespace {
    name: String,
    type_name: &'static str,
    methods: HashMap<String, MethodDescriptor>,
}

impl ServiceNamespace {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rust type name of the receiver.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.get(name)
    }

    /// Method names, sorted.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Process-wide table of services, keyed by namespace.
///
/// The map is guarded by a mutex held only for the map read or write, never
/// across a method call.
pub struct Registry {
    default_namespace: String,
    services: Mutex<HashMap<String, Arc<ServiceNamespace>>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("default_namespace", &self.default_namespace)
            .field("namespaces", &self.namespaces().unwrap_or_default())
            .finish()
    }
}

impl Registry {
    /// Create an empty registry using [`RpcConfig::DEFAULT_NAMESPACE`].
    pub fn new() -> Self {
        Self::with_default_namespace(RpcConfig::DEFAULT_NAMESPACE)
    }

    /// Create an empty registry resolving bare method names in `namespace`.
    pub fn with_default_namespace(namespace: impl Into<String>) -> Self {
        Self {
            default_namespace: namespace.into(),
            services: Mutex::new(HashMap::new()),
        }
    }

    pub fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    /// Register `service` under `name`, or under its type name when `name`
    /// is `None` or empty.
    pub fn register<S: Service>(&self, service: S, name: Option<&str>) -> Result<()> {
        self.register_shared(Arc::new(service), name)
    }

    /// Like [`Registry::register`], for a receiver the host keeps a handle to.
    pub fn register_shared<S: Service>(&self, service: Arc<S>, name: Option<&str>) -> Result<()> {
        let type_name = std::any::type_name::<S>();
        let name = match name.filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => {
                let inferred = short_type_name(type_name);
                if inferred.is_empty() {
                    return Err(RpcError::MissingServiceName {
                        type_name: type_name.to_string(),
                    });
                }
                if !is_exported(inferred) {
                    return Err(RpcError::UnexportedService {
                        name: inferred.to_string(),
                    });
                }
                inferred.to_string()
            }
        };

        let mut table = MethodTable::new(service);
        S::register_methods(&mut table);
        if table.is_empty() {
            return Err(RpcError::NoSuitableMethods { service: name });
        }

        let namespace = Arc::new(ServiceNamespace {
            name: name.clone(),
            type_name,
            methods: table.methods,
        });

        let mut services = self.lock()?;
        if services.contains_key(&name) {
            return Err(RpcError::DuplicateService { service: name });
        }
        info!(
            "[register] Adding service {} ({} methods)",
            name,
            namespace.methods.len()
        );
        services.insert(name, namespace);
        Ok(())
    }

    /// Resolve `Namespace.Method`, or a bare `Method` in the default namespace.
    pub fn resolve(&self, method: &str) -> Result<(Arc<ServiceNamespace>, MethodDescriptor)> {
        let (namespace, method_name) = method
            .split_once('.')
            .unwrap_or((self.default_namespace.as_str(), method));

        let service = self.lock()?.get(namespace).cloned();
        let service = service.ok_or_else(|| RpcError::ServiceNotFound {
            namespace: namespace.to_string(),
            method: method.to_string(),
        })?;

        let descriptor = service
            .method(method_name)
            .cloned()
            .ok_or_else(|| RpcError::MethodNotFound {
                method: method.to_string(),
            })?;
        Ok((service, descriptor))
    }

    /// True if `method` resolves.
    pub fn has_method(&self, method: &str) -> bool {
        self.resolve(method).is_ok()
    }

    /// Registered namespace names, sorted.
    pub fn namespaces(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.lock()?.keys().cloned().collect();
        names.sort_unstable();
        Ok(names)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Arc<ServiceNamespace>>>> {
        self.services
            .lock()
            .map_err(|e| RpcError::internal(format!("registry lock poisoned: {}", e)))
    }
}

/// True if `name` starts with an uppercase letter.
fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

/// Last path segment of a type name, without generic arguments.
fn short_type_name(type_name: &str) -> &str {
    let base = type_name.split('<').next().unwrap_or(type_name);
    base.rsplit("::").next().unwrap_or(base)
}
