use serde::{Deserialize, Serialize};

use crate::container::descriptor::ObjectRef;
use crate::errors::ContainerError;

/// Lifetime of a managed object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectScope {
    /// One shared instance per container, created on first demand
    Singleton,
    /// A fresh instance for every request, never cached by the container
    Prototype,
    /// Instance lifetime delegated to a registered scope handler
    Custom(String),
}

impl Default for ObjectScope {
    fn default() -> Self {
        ObjectScope::Singleton
    }
}

impl std::fmt::Display for ObjectScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectScope::Singleton => write!(f, "singleton"),
            ObjectScope::Prototype => write!(f, "prototype"),
            ObjectScope::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// Storage strategy for a custom scope.
///
/// The handler owns its cache; the container hands it the object name and a
/// creation thunk and takes whatever comes back. Instances held by a custom
/// scope are not registered for container-driven disposal.
pub trait ScopeHandler: Send + Sync {
    /// Return the instance for `name`, creating it via `factory` if the
    /// scope does not hold one yet.
    fn get(
        &self,
        name: &str,
        factory: &dyn Fn() -> Result<ObjectRef, ContainerError>,
    ) -> Result<ObjectRef, ContainerError>;

    /// Evict `name` from this scope, returning the removed instance if any.
    fn remove(&self, name: &str) -> Option<ObjectRef>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_display_names() {
        assert_eq!(ObjectScope::Singleton.to_string(), "singleton");
        assert_eq!(ObjectScope::Prototype.to_string(), "prototype");
        assert_eq!(ObjectScope::Custom("request".into()).to_string(), "request");
    }

    #[test]
    fn singleton_is_default() {
        assert_eq!(ObjectScope::default(), ObjectScope::Singleton);
    }
}
