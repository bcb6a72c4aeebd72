//! Service registry
//!
//! A registry maps binding names (`"local"`, `"remote"`, ...) to factories
//! for one service. The first registered binding is the default until
//! [`ServiceRegistry::set_default`] picks another. [`ServiceRegistry::get`]
//! builds the default once and memoizes the outcome, error included.
//!
//! Registries are usually owned by whoever wires the services, typically as
//! a namespace node. [`global`] keeps a process-wide table of named
//! registries for code that cannot thread one through.

use futures::future::BoxFuture;
use futures::FutureExt;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use trellis_core::{Error, Result};

type Factory<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T>> + Send + Sync>;

struct Bindings<T> {
    factories: BTreeMap<String, Factory<T>>,
    default: Option<String>,
}

/// Named factories for one service
pub struct ServiceRegistry<T> {
    name: String,
    bindings: Mutex<Bindings<T>>,
    built: OnceCell<Result<T>>,
}

impl<T> ServiceRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Empty registry
    pub fn new(name: impl Into<String>) -> Self {
        ServiceRegistry {
            name: name.into(),
            bindings: Mutex::new(Bindings {
                factories: BTreeMap::new(),
                default: None,
            }),
            built: OnceCell::new(),
        }
    }

    /// Registry name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a binding. The first one registered becomes the default.
    pub fn register<F, Fut>(&self, binding: impl Into<String>, factory: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let binding = binding.into();
        let factory: Factory<T> = Arc::new(move || factory().boxed());
        let mut bindings = self.bindings.lock();
        if bindings.factories.insert(binding.clone(), factory).is_some() {
            warn!(target: "trellis::registry", registry = %self.name, binding = %binding, "Replacing binding");
        }
        if bindings.default.is_none() {
            bindings.default = Some(binding.clone());
        }
        debug!(target: "trellis::registry", registry = %self.name, binding = %binding, "Registered binding");
    }

    /// Make `binding` the default
    pub fn set_default(&self, binding: &str) -> Result<()> {
        let mut bindings = self.bindings.lock();
        if !bindings.factories.contains_key(binding) {
            return Err(Error::not_found(format!(
                "no client called \"{}\" known for {}",
                binding, self.name
            )));
        }
        if self.built.initialized() {
            warn!(target: "trellis::registry", registry = %self.name, binding, "Default changed after first get; memoized value kept");
        }
        bindings.default = Some(binding.to_string());
        Ok(())
    }

    /// Current default binding
    pub fn default_binding(&self) -> Option<String> {
        self.bindings.lock().default.clone()
    }

    /// Registered binding names, sorted
    pub fn bindings(&self) -> Vec<String> {
        self.bindings.lock().factories.keys().cloned().collect()
    }

    /// Build the default binding once and return the memoized result
    pub async fn get(&self) -> Result<T> {
        self.built
            .get_or_init(|| async {
                let factory = {
                    let bindings = self.bindings.lock();
                    let Some(default) = bindings.default.clone() else {
                        return Err(Error::not_found(format!(
                            "no clients registered for {}",
                            self.name
                        )));
                    };
                    match bindings.factories.get(&default) {
                        Some(factory) => {
                            info!(target: "trellis::registry", registry = %self.name, binding = %default, "Building client");
                            factory.clone()
                        }
                        None => {
                            return Err(Error::not_found(format!(
                                "no client called \"{}\" known for {}",
                                default, self.name
                            )))
                        }
                    }
                };
                factory().await.map_err(|e| match e {
                    Error::Build { .. } => e,
                    other => Error::build(&self.name, other.to_string()),
                })
            })
            .await
            .clone()
    }

    /// Build a specific binding without touching the memoized default
    pub async fn get_binding(&self, binding: &str) -> Result<T> {
        let factory = self
            .bindings
            .lock()
            .factories
            .get(binding)
            .cloned()
            .ok_or_else(|| {
                Error::not_found(format!(
                    "no client called \"{}\" known for {}",
                    binding, self.name
                ))
            })?;
        factory().await
    }
}

static GLOBAL: Lazy<Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Process-wide registry called `name`, created on first use.
///
/// # Errors
///
/// Returns `TypeMismatch` if `name` was first created for a different
/// service type.
pub fn global<T>(name: &str) -> Result<Arc<ServiceRegistry<T>>>
where
    T: Clone + Send + Sync + 'static,
{
    let mut table = GLOBAL.lock();
    let entry = table
        .entry(name.to_string())
        .or_insert_with(|| Arc::new(ServiceRegistry::<T>::new(name)) as Arc<dyn Any + Send + Sync>)
        .clone();
    entry.downcast::<ServiceRegistry<T>>().map_err(|_| {
        Error::type_mismatch(
            std::any::type_name::<ServiceRegistry<T>>(),
            format!("registry {}", name),
        )
    })
}
