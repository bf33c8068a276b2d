use std::{
    any::{type_name, Any, TypeId},
    collections::HashMap,
    sync::Arc,
};

use thiserror::Error;

/// Errors that can occur while registering or looking up a service
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("A service of type {type_name} is already registered")]
    AlreadyRegistered { type_name: &'static str },

    #[error("No service of type {type_name} is registered")]
    NotRegistered { type_name: &'static str },
}

/// Capabilities the composition root hands to behaviours, looked up by type.
///
/// Register trait objects as `Arc<dyn Capability>` (via
/// [`register_arc`](Self::register_arc)) to look them up by capability
/// rather than by concrete type.
#[derive(Default)]
pub struct ServiceRegistry {
    services: HashMap<TypeId, Box<dyn Any>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service
    ///
    /// # Panics
    ///
    /// Panics if a service of the same type is already registered.
    /// Consider using `try_register` for non-panicking error handling.
    pub fn register<T: ?Sized + 'static>(&mut self, service: Arc<T>) {
        self.try_register(service)
            .expect("Service cannot be registered more than once!")
    }

    /// Registers a service
    ///
    /// Returns an error if a service of the same type is already registered.
    pub fn try_register<T: ?Sized + 'static>(&mut self, service: Arc<T>) -> Result<(), RegistryError> {
        let key = TypeId::of::<Arc<T>>();
        if self.services.contains_key(&key) {
            return Err(RegistryError::AlreadyRegistered {
                type_name: type_name::<T>(),
            });
        }
        self.services.insert(key, Box::new(service));
        Ok(())
    }

    /// Registers a service, replacing a previous one of the same type
    pub fn register_arc<T: ?Sized + 'static>(&mut self, service: Arc<T>) -> Option<Arc<T>> {
        self.services
            .insert(TypeId::of::<Arc<T>>(), Box::new(service))
            .and_then(|previous| previous.downcast::<Arc<T>>().ok())
            .map(|previous| *previous)
    }

    pub fn get<T: ?Sized + 'static>(&self) -> Option<Arc<T>> {
        self.services
            .get(&TypeId::of::<Arc<T>>())
            .and_then(|service| service.downcast_ref::<Arc<T>>())
            .cloned()
    }

    pub fn try_get<T: ?Sized + 'static>(&self) -> Result<Arc<T>, RegistryError> {
        self.get::<T>().ok_or(RegistryError::NotRegistered {
            type_name: type_name::<T>(),
        })
    }

    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.services.contains_key(&TypeId::of::<Arc<T>>())
    }
}
