use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::container::descriptor::{Capability, ObjectDescriptor, ObjectRef};
use crate::container::graph::DependencyTracker;
use crate::container::registry::SingletonRegistry;
use crate::container::resolver::{CandidateResolver, CapabilityRequest, Resolution};
use crate::container::scope::{ObjectScope, ScopeHandler};
use crate::container::store::DescriptorStore;
use crate::errors::ContainerError;

/// Opaque identifier of a container instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(Uuid);

impl ContainerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContainerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ContainerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The object container: definition store, singleton lifecycle, dependency
/// tracking and capability-based resolution behind one facade.
///
/// All operations take `&self`; the container is meant to be shared behind
/// an `Arc` across threads.
pub struct Container {
    id: ContainerId,
    store: DescriptorStore,
    graph: Arc<DependencyTracker>,
    singletons: SingletonRegistry,
    /// Capabilities declared for manually registered instances
    manual: RwLock<HashMap<String, Vec<Capability>>>,
    scopes: RwLock<HashMap<String, Arc<dyn ScopeHandler>>>,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.id)
            .field("definitions", &self.store.len())
            .field("singletons", &self.singletons.count())
            .finish()
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Container {
    pub fn new() -> Self {
        let graph = Arc::new(DependencyTracker::new());
        Self {
            id: ContainerId::new(),
            store: DescriptorStore::new(),
            graph: graph.clone(),
            singletons: SingletonRegistry::new(graph),
            manual: RwLock::new(HashMap::new()),
            scopes: RwLock::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> ContainerId {
        self.id
    }

    pub(crate) fn store(&self) -> &DescriptorStore {
        &self.store
    }

    pub(crate) fn singletons(&self) -> &SingletonRegistry {
        &self.singletons
    }

    pub fn graph(&self) -> &DependencyTracker {
        &self.graph
    }

    /// Capabilities declared for a manually registered instance
    pub(crate) fn manual_capabilities(&self, name: &str) -> Option<Vec<Capability>> {
        self.manual.read().get(name).cloned()
    }

    // ---- definition registration -------------------------------------

    /// Register an object definition. Replacing an existing definition
    /// resets the built instances of every name whose resolved form changes.
    pub fn register(&self, descriptor: ObjectDescriptor) -> Result<(), ContainerError> {
        let affected = self.store.register(descriptor)?;
        for name in affected {
            self.singletons.destroy(&name);
        }
        Ok(())
    }

    /// Remove a definition and reset the instances it affects
    pub fn remove_definition(&self, name: &str) -> Result<(), ContainerError> {
        let affected = self.store.remove(name)?;
        for name in affected {
            self.singletons.destroy(&name);
        }
        Ok(())
    }

    /// Register a pre-built instance under `name`, bypassing the definition
    /// store. The instance participates in candidate resolution through its
    /// concrete type.
    pub fn register_instance<T>(&self, name: &str, instance: T) -> Result<(), ContainerError>
    where
        T: Send + Sync + 'static,
    {
        self.register_instance_with(name, instance, Vec::new())
    }

    /// Register a pre-built instance that additionally provides the given
    /// capabilities (its concrete type is always included).
    pub fn register_instance_with<T>(
        &self,
        name: &str,
        instance: T,
        extra: Vec<Capability>,
    ) -> Result<(), ContainerError>
    where
        T: Send + Sync + 'static,
    {
        let obj: ObjectRef = Arc::new(instance);
        self.singletons.register_completed(name, obj)?;
        let mut capabilities = vec![Capability::of::<T>()];
        capabilities.extend(extra);
        self.manual.write().insert(name.to_string(), capabilities);
        Ok(())
    }

    /// Register a type-erased instance without capability metadata; it is
    /// only reachable by name.
    pub fn register_instance_raw(
        &self,
        name: &str,
        instance: ObjectRef,
    ) -> Result<(), ContainerError> {
        self.singletons.register_completed(name, instance)
    }

    pub fn register_alias(&self, name: &str, alias: &str) -> Result<(), ContainerError> {
        self.store.register_alias(name, alias)
    }

    pub fn canonical_name(&self, name: &str) -> String {
        self.store.canonical_name(name)
    }

    pub fn set_allow_overriding(&self, allow: bool) {
        self.store.set_allow_overriding(allow);
    }

    /// Register the handler backing a custom scope name
    pub fn register_scope(&self, scope_name: &str, handler: Arc<dyn ScopeHandler>) {
        self.scopes
            .write()
            .insert(scope_name.to_string(), handler);
    }

    /// Attach standalone teardown logic to `name`
    pub fn register_disposal(
        &self,
        name: &str,
        action: crate::container::registry::DisposalAction,
    ) {
        self.singletons.register_disposal(name, action);
    }

    // ---- retrieval -----------------------------------------------------

    /// Retrieve the object registered or defined under `name` (alias chains
    /// are resolved first), creating it according to its scope if needed.
    pub fn get_object(&self, name: &str) -> Result<ObjectRef, ContainerError> {
        let canonical = self.store.canonical_name(name);
        if let Some(obj) = self.singletons.get(&canonical, true) {
            return Ok(obj);
        }
        let descriptor = self
            .store
            .merged(&canonical)?
            .ok_or_else(|| ContainerError::not_found(&canonical))?;
        self.create_scoped(&canonical, &descriptor)
    }

    /// Retrieve `name` and downcast it to its concrete type
    pub fn get_typed<T>(&self, name: &str) -> Result<Arc<T>, ContainerError>
    where
        T: Send + Sync + 'static,
    {
        let obj = self.get_object(name)?;
        obj.downcast::<T>()
            .map_err(|_| ContainerError::TypeMismatch {
                name: name.to_string(),
                expected: std::any::type_name::<T>().to_string(),
                actual: "a different registered type".to_string(),
            })
    }

    fn create_scoped(
        &self,
        name: &str,
        descriptor: &ObjectDescriptor,
    ) -> Result<ObjectRef, ContainerError> {
        if descriptor.is_abstract() {
            return Err(ContainerError::invalid_descriptor(
                name,
                "abstract definitions cannot be instantiated",
            ));
        }
        match descriptor.scope() {
            ObjectScope::Singleton => {
                self.singletons.get_or_create(name, || {
                    let obj = self.build_instance(name, descriptor)?;
                    if let Some(disposer) = descriptor.disposer() {
                        let held = obj.clone();
                        self.singletons
                            .register_disposal(name, Box::new(move || disposer(&held)));
                    }
                    Ok(obj)
                })
            }
            // Prototype instances are never cached and never disposed by
            // the container; the caller owns them outright.
            ObjectScope::Prototype => self.build_instance(name, descriptor),
            ObjectScope::Custom(scope_name) => {
                let handler = self
                    .scopes
                    .read()
                    .get(&scope_name)
                    .cloned()
                    .ok_or_else(|| {
                        ContainerError::invalid_descriptor(
                            name,
                            format!("no handler registered for scope '{scope_name}'"),
                        )
                    })?;
                handler.get(name, &|| self.build_instance(name, descriptor))
            }
        }
    }

    /// Honor declared `depends_on` names, then run the factory
    fn build_instance(
        &self,
        name: &str,
        descriptor: &ObjectDescriptor,
    ) -> Result<ObjectRef, ContainerError> {
        for dep in descriptor.depends_on() {
            let dep = self.store.canonical_name(dep);
            if self.graph.is_transitively_dependent(name, &dep) {
                return Err(ContainerError::CircularDependency {
                    name: name.to_string(),
                    chain: format!("{name} -> {dep}"),
                });
            }
            self.graph.add_dependency(name, &dep);
            self.get_object(&dep)?;
        }
        let factory = descriptor.factory().ok_or_else(|| {
            ContainerError::invalid_descriptor(name, "definition declares no factory")
        })?;
        let cx = CreationContext {
            container: self,
            name,
        };
        factory(&cx)
    }

    /// Instantiate every non-lazy singleton definition, in registration
    /// order. Stops at the first failure.
    pub fn pre_instantiate_singletons(&self) -> Result<(), ContainerError> {
        tracing::debug!("Pre-instantiating singletons in {:?}", self);
        for name in self.store.names() {
            let Some(descriptor) = self.store.merged(&name)? else {
                continue;
            };
            if descriptor.is_abstract()
                || descriptor.is_lazy()
                || descriptor.scope() != ObjectScope::Singleton
            {
                continue;
            }
            self.get_object(&name)?;
        }
        Ok(())
    }

    // ---- capability resolution -----------------------------------------

    /// Resolve a capability request against all known candidates. When the
    /// request names a requester, the winner(s) are recorded as its
    /// dependencies for destruction ordering.
    pub fn resolve(&self, request: &CapabilityRequest) -> Result<Resolution, ContainerError> {
        let resolution = CandidateResolver::new(self).resolve(request)?;
        if let Some(requester) = request.requester() {
            match &resolution {
                Resolution::One { name, .. } => self.graph.add_dependency(requester, name),
                Resolution::Many(entries) => {
                    for (name, _) in entries {
                        self.graph.add_dependency(requester, name);
                    }
                }
                Resolution::None => {}
            }
        }
        Ok(resolution)
    }

    /// Resolve exactly one provider of `T`
    pub fn resolve_one<T>(&self) -> Result<Arc<T>, ContainerError>
    where
        T: Send + Sync + 'static,
    {
        match self.resolve(&CapabilityRequest::one::<T>())? {
            Resolution::One { name, instance } => {
                instance
                    .downcast::<T>()
                    .map_err(|_| ContainerError::TypeMismatch {
                        name,
                        expected: std::any::type_name::<T>().to_string(),
                        actual: "a different registered type".to_string(),
                    })
            }
            _ => Err(ContainerError::NoMatchingCandidate {
                capability: std::any::type_name::<T>().to_string(),
            }),
        }
    }

    /// Resolve all providers of `T`, ordered by their declared order values
    pub fn resolve_all<T>(&self) -> Result<Vec<Arc<T>>, ContainerError>
    where
        T: Send + Sync + 'static,
    {
        match self.resolve(&CapabilityRequest::many::<T>())? {
            Resolution::Many(entries) => entries
                .into_iter()
                .map(|(name, instance)| {
                    instance
                        .downcast::<T>()
                        .map_err(|_| ContainerError::TypeMismatch {
                            name,
                            expected: std::any::type_name::<T>().to_string(),
                            actual: "a different registered type".to_string(),
                        })
                })
                .collect(),
            _ => Ok(Vec::new()),
        }
    }

    // ---- introspection ---------------------------------------------------

    /// Definition names in registration order, followed by manually
    /// registered instances that have no definition.
    pub fn names(&self) -> Vec<String> {
        let mut names = self.store.names();
        for name in self.singletons.names() {
            if !names.iter().any(|n| n == &name) {
                names.push(name);
            }
        }
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        let canonical = self.store.canonical_name(name);
        self.store.contains(&canonical) || self.singletons.contains(&canonical)
    }

    pub fn len(&self) -> usize {
        self.names().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty() && self.singletons.count() == 0
    }

    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        self.graph.dependents_of(name)
    }

    pub fn dependencies_of(&self, name: &str) -> Vec<String> {
        self.graph.dependencies_of(name)
    }

    // ---- teardown --------------------------------------------------------

    /// Destroy one named instance, its dependents first
    pub fn destroy(&self, name: &str) {
        let canonical = self.store.canonical_name(name);
        self.manual.write().remove(&canonical);
        self.singletons.destroy(&canonical);
    }

    /// Destroy every instance and permanently reject further creation
    pub fn destroy_all(&self) {
        self.singletons.destroy_all();
        self.manual.write().clear();
    }
}

/// Handle passed to object factories during construction.
///
/// Dependency lookups through the context record dependency edges for
/// destruction ordering, and `expose_early` lets a factory publish a
/// reference to a partially initialized instance so that field-level cycles
/// can be closed.
pub struct CreationContext<'a> {
    container: &'a Container,
    name: &'a str,
}

impl<'a> CreationContext<'a> {
    /// Name of the object under construction
    pub fn name(&self) -> &str {
        self.name
    }

    pub fn container(&self) -> &Container {
        self.container
    }

    /// Retrieve a dependency by name, recording the dependency edge
    pub fn get_object(&self, name: &str) -> Result<ObjectRef, ContainerError> {
        let canonical = self.container.store.canonical_name(name);
        self.container.graph.add_dependency(self.name, &canonical);
        self.container.get_object(&canonical)
    }

    /// Retrieve a dependency and downcast it to its concrete type
    pub fn get_typed<T>(&self, name: &str) -> Result<Arc<T>, ContainerError>
    where
        T: Send + Sync + 'static,
    {
        let canonical = self.container.store.canonical_name(name);
        self.container.graph.add_dependency(self.name, &canonical);
        self.container.get_typed(&canonical)
    }

    /// Resolve a capability request on behalf of the object under
    /// construction.
    pub fn resolve(&self, request: CapabilityRequest) -> Result<Resolution, ContainerError> {
        self.container
            .resolve(&request.requested_by(self.name.to_string()))
    }

    /// Publish an early reference to the instance under construction.
    ///
    /// Other factories requesting this name while it is still being built
    /// receive this reference instead of failing with an in-creation error.
    pub fn expose_early(&self, instance: ObjectRef) {
        let name = self.name.to_string();
        tracing::debug!("Exposing early reference for managed object '{}'", name);
        self.container
            .singletons
            .register_factory(&name, Box::new(move || instance));
    }

    /// Record that `inner` only lives inside the object under construction
    pub fn record_containment(&self, inner: &str) {
        self.container.graph.add_containment(inner, self.name);
    }
}

impl std::fmt::Debug for CreationContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreationContext")
            .field("name", &self.name)
            .finish()
    }
}
