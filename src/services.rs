//! Dependency resolution for job actions.
//!
//! Every job declares the service type it needs. When the worker starts a job
//! it opens a fresh [`ServiceScope`] from the configured [`ServiceResolver`],
//! resolves that one service, and hands it to the action.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

/// A resolved service instance.
pub type Service = Arc<dyn Any + Send + Sync>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolveError {
    #[error("No service registered for {0}")]
    NotRegistered(String),
    #[error("Failed to construct {service}: {message}")]
    Factory { service: String, message: String },
}

/// Identifies the type of service a job depends on.
#[derive(Clone, Copy)]
pub struct ServiceType {
    id: TypeId,
    name: &'static str,
}

impl ServiceType {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without its module path, e.g. `Mailer` for `app::mail::Mailer`.
    /// Generic arguments are dropped as well.
    pub fn short_name(&self) -> &'static str {
        let base = match self.name.find('<') {
            Some(idx) => &self.name[..idx],
            None => self.name,
        };
        match base.rfind("::") {
            Some(idx) => &base[idx + 2..],
            None => base,
        }
    }
}

impl PartialEq for ServiceType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ServiceType {}

impl std::hash::Hash for ServiceType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ServiceType").field(&self.name).finish()
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Produces a new dependency scope for each job run.
pub trait ServiceResolver: Send + Sync {
    fn create_scope(&self) -> Box<dyn ServiceScope>;
}

/// A unit of dependency lifetime. Dropped once the job using it finishes.
#[async_trait]
pub trait ServiceScope: Send {
    async fn resolve(&mut self, service_type: &ServiceType) -> Result<Service, ResolveError>;
}

type ScopedFactory = Arc<dyn Fn() -> Result<Service, ResolveError> + Send + Sync>;

#[derive(Clone)]
enum Registration {
    Singleton(Service),
    Scoped(ScopedFactory),
}

/// Factory-backed [`ServiceResolver`].
///
/// Singletons are shared by every scope. Scoped services are built lazily,
/// once per scope.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    registrations: Arc<RwLock<HashMap<TypeId, Registration>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_singleton<T>(&self, instance: Arc<T>) -> &Self
    where
        T: Send + Sync + 'static,
    {
        let mut registrations = self.registrations.write().unwrap_or_else(|e| e.into_inner());
        registrations.insert(TypeId::of::<T>(), Registration::Singleton(instance));
        self
    }

    pub fn register_scoped<T, F, E>(&self, factory: F) -> &Self
    where
        T: Send + Sync + 'static,
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
        E: fmt::Display,
    {
        let boxed: ScopedFactory = Arc::new(move || {
            factory()
                .map(|instance| Arc::new(instance) as Service)
                .map_err(|e| ResolveError::Factory {
                    service: std::any::type_name::<T>().to_string(),
                    message: e.to_string(),
                })
        });

        let mut registrations = self.registrations.write().unwrap_or_else(|e| e.into_inner());
        registrations.insert(TypeId::of::<T>(), Registration::Scoped(boxed));
        self
    }

    pub fn is_registered(&self, service_type: &ServiceType) -> bool {
        let registrations = self.registrations.read().unwrap_or_else(|e| e.into_inner());
        registrations.contains_key(&service_type.id())
    }
}

impl ServiceResolver for ServiceRegistry {
    fn create_scope(&self) -> Box<dyn ServiceScope> {
        Box::new(RegistryScope {
            registrations: Arc::clone(&self.registrations),
            instances: HashMap::new(),
        })
    }
}

struct RegistryScope {
    registrations: Arc<RwLock<HashMap<TypeId, Registration>>>,
    instances: HashMap<TypeId, Service>,
}

#[async_trait]
impl ServiceScope for RegistryScope {
    async fn resolve(&mut self, service_type: &ServiceType) -> Result<Service, ResolveError> {
        if let Some(instance) = self.instances.get(&service_type.id()) {
            return Ok(Arc::clone(instance));
        }

        let registration = {
            let registrations = self.registrations.read().unwrap_or_else(|e| e.into_inner());
            registrations
                .get(&service_type.id())
                .cloned()
                .ok_or_else(|| ResolveError::NotRegistered(service_type.name().to_string()))?
        };

        match registration {
            Registration::Singleton(instance) => Ok(instance),
            Registration::Scoped(factory) => {
                let instance = factory()?;
                self.instances.insert(service_type.id(), Arc::clone(&instance));
                Ok(instance)
            }
        }
    }
}
