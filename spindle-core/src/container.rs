// Dependency injection container

use crate::Error;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// A type the container can build.
///
/// Dependencies are resolved through the container passed to `create`,
/// so every injectable is a singleton per container.
pub trait Injectable: Send + Sync + Sized + 'static {
    fn create(container: &Container) -> Result<Self, Error>;
}

/// The dependency injection container
#[derive(Clone, Default)]
pub struct Container {
    providers: Arc<RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>>,
}

impl Container {
    pub fn new() -> Self {
        debug!("Creating new DI container");
        Self::default()
    }

    /// Register a provider instance
    pub fn register<T: Send + Sync + 'static>(&self, instance: T) -> Arc<T> {
        let instance = Arc::new(instance);
        self.register_arc(instance.clone());
        instance
    }

    /// Register an already shared provider
    pub fn register_arc<T: Send + Sync + 'static>(&self, instance: Arc<T>) {
        let type_name = std::any::type_name::<T>();
        trace!(provider = type_name, "Acquiring write lock for registration");
        self.providers.write().insert(TypeId::of::<T>(), instance);
        debug!(provider = type_name, "Provider registered in DI container");
    }

    /// Get a registered provider without building it
    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, Error> {
        let type_name = std::any::type_name::<T>();
        self.providers
            .read()
            .get(&TypeId::of::<T>())
            .and_then(|any| any.clone().downcast::<T>().ok())
            .ok_or_else(|| Error::ProviderNotFound(type_name.to_string()))
    }

    /// Resolve a provider, building and registering it on first use
    pub fn resolve<T: Injectable>(&self) -> Result<Arc<T>, Error> {
        let type_name = std::any::type_name::<T>();
        trace!(provider = type_name, "Attempting to resolve provider");

        if let Ok(existing) = self.get::<T>() {
            return Ok(existing);
        }

        let instance = T::create(self).map_err(|e| {
            Error::DependencyInjection(format!("Failed to create {}: {}", type_name, e))
        })?;

        // Keep the first instance if another caller won the race
        let mut providers = self.providers.write();
        let entry = providers
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Arc::new(instance));
        let resolved = entry
            .clone()
            .downcast::<T>()
            .map_err(|_| Error::DependencyInjection(format!("Provider type mismatch: {}", type_name)))?;

        debug!(provider = type_name, "Provider resolved successfully");
        Ok(resolved)
    }

    /// Check if a provider is registered
    pub fn has<T: Send + Sync + 'static>(&self) -> bool {
        self.providers.read().contains_key(&TypeId::of::<T>())
    }

    /// Clear all providers
    pub fn clear(&self) {
        let mut providers = self.providers.write();
        let count = providers.len();
        providers.clear();
        debug!(provider_count = count, "Cleared all providers from container");
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("providers", &self.providers.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Database {
        url: String,
    }

    impl Injectable for Database {
        fn create(_: &Container) -> Result<Self, Error> {
            Ok(Self {
                url: "memory://".to_string(),
            })
        }
    }

    struct UserService {
        db: Arc<Database>,
    }

    impl Injectable for UserService {
        fn create(container: &Container) -> Result<Self, Error> {
            Ok(Self {
                db: container.resolve::<Database>()?,
            })
        }
    }

    struct Broken;

    impl Injectable for Broken {
        fn create(container: &Container) -> Result<Self, Error> {
            container.get::<String>()?;
            Ok(Broken)
        }
    }

    #[test]
    fn test_resolve_builds_dependencies_once() {
        let container = Container::new();
        let service = container.resolve::<UserService>().unwrap();
        let again = container.resolve::<UserService>().unwrap();

        assert!(Arc::ptr_eq(&service, &again));
        assert!(Arc::ptr_eq(&service.db, &container.get::<Database>().unwrap()));
        assert_eq!(service.db.url, "memory://");
    }

    #[test]
    fn test_registered_instance_wins() {
        let container = Container::new();
        container.register(Database {
            url: "postgres://".to_string(),
        });
        assert_eq!(container.resolve::<Database>().unwrap().url, "postgres://");
        assert!(container.has::<Database>());
    }

    #[test]
    fn test_failures() {
        let container = Container::new();
        assert!(matches!(container.get::<Database>(), Err(Error::ProviderNotFound(_))));
        assert!(matches!(
            container.resolve::<Broken>(),
            Err(Error::DependencyInjection(_))
        ));

        container.register(1u8);
        container.clear();
        assert!(!container.has::<u8>());
    }
}
