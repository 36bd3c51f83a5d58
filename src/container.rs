//! Type-keyed service registry consulted by the argument resolver.
//!
//! Controllers declare a [`ParamKind::Service`](crate::controller::ParamKind)
//! parameter and receive the registered instance without any matching
//! request value.

use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

type ServiceMap = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;

#[derive(Clone, Default)]
pub struct ServiceContainer {
    services: Arc<RwLock<ServiceMap>>,
}

impl ServiceContainer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instance, replacing any previous one of the same type.
    pub fn register<T: Any + Send + Sync>(&self, instance: T) {
        self.register_arc(Arc::new(instance));
    }

    pub fn register_arc<T: Any + Send + Sync>(&self, instance: Arc<T>) {
        let type_name = std::any::type_name::<T>();
        self.services.write().insert(TypeId::of::<T>(), instance);
        debug!(service = type_name, "Service registered");
    }

    #[must_use]
    pub fn resolve<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let found = self.resolve_by_id(TypeId::of::<T>())?;
        found.downcast::<T>().ok()
    }

    /// Untyped lookup used when only the `TypeId` is known.
    #[must_use]
    pub fn resolve_by_id(&self, type_id: TypeId) -> Option<Arc<dyn Any + Send + Sync>> {
        let found = self.services.read().get(&type_id).cloned();
        trace!(type_id = ?type_id, found = found.is_some(), "Service lookup");
        found
    }

    #[must_use]
    pub fn has<T: Any + Send + Sync>(&self) -> bool {
        self.services.read().contains_key(&TypeId::of::<T>())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ServiceContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContainer")
            .field("services", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Mailer(&'static str);

    #[test]
    fn test_register_and_resolve() {
        let container = ServiceContainer::new();
        assert!(container.resolve::<Mailer>().is_none());
        container.register(Mailer("smtp"));
        assert!(container.has::<Mailer>());
        assert_eq!(container.resolve::<Mailer>().map(|m| m.0), Some("smtp"));
    }

    #[test]
    fn test_clones_share_registrations() {
        let container = ServiceContainer::new();
        let clone = container.clone();
        clone.register(42_u32);
        assert_eq!(container.resolve::<u32>().as_deref(), Some(&42));
    }
}
