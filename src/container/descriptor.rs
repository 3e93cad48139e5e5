use std::any::{Any, TypeId};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::container::container::CreationContext;
use crate::container::scope::ObjectScope;
use crate::errors::ContainerError;

/// Type-erased reference to a managed object instance
pub type ObjectRef = Arc<dyn Any + Send + Sync>;

/// Factory invoked by the container to construct a managed object.
///
/// The creation context gives the factory access to its dependencies and to
/// early-reference exposure for breaking field-level cycles.
pub type ObjectFactory =
    Arc<dyn Fn(&CreationContext<'_>) -> Result<ObjectRef, ContainerError> + Send + Sync>;

/// Teardown callback attached to a descriptor, invoked with the instance
/// during destruction.
pub type Disposer = Arc<dyn Fn(&ObjectRef) -> Result<(), ContainerError> + Send + Sync>;

/// Explicit type identifier used for capability matching.
///
/// Computed once at registration time; the resolver never introspects
/// instances to decide assignability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeKey {
    type_id: TypeId,
    type_name: &'static str,
}

impl TypeKey {
    /// Create a type key for a type (sized or trait object)
    pub fn of<T: 'static + ?Sized>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.type_id
    }

    pub fn name(&self) -> &'static str {
        self.type_name
    }
}

/// A capability a descriptor provides or a dependent requests: a type key
/// plus explicit generic parameter keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Capability {
    key: TypeKey,
    params: Vec<TypeKey>,
}

impl Capability {
    /// Capability for a plain (non-parameterized) type
    pub fn of<T: 'static + ?Sized>() -> Self {
        Self {
            key: TypeKey::of::<T>(),
            params: Vec::new(),
        }
    }

    /// Add an explicit generic parameter key
    pub fn with_param<P: 'static + ?Sized>(mut self) -> Self {
        self.params.push(TypeKey::of::<P>());
        self
    }

    pub fn key(&self) -> &TypeKey {
        &self.key
    }

    pub fn params(&self) -> &[TypeKey] {
        &self.params
    }

    /// Human-readable form for error messages
    pub fn describe(&self) -> String {
        if self.params.is_empty() {
            self.key.name().to_string()
        } else {
            let params: Vec<&str> = self.params.iter().map(|p| p.name()).collect();
            format!("{}<{}>", self.key.name(), params.join(", "))
        }
    }
}

/// The three independent precedence signals a descriptor may declare
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Precedence {
    /// Boolean preference for single-result tie-breaks
    pub primary: bool,
    /// Numeric tie-break value, lower wins
    pub priority: Option<i32>,
    /// Collection ordering value, lower first
    pub order: Option<i32>,
}

/// Role of a definition, used to pick the log level when one definition
/// overrides another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectRole {
    Application,
    Support,
    Infrastructure,
}

impl Default for ObjectRole {
    fn default() -> Self {
        ObjectRole::Application
    }
}

/// Immutable-after-registration metadata describing how to construct a
/// managed object.
///
/// Fields left unset by the builder inherit from the parent descriptor when
/// the store merges a definition chain; accessors apply the documented
/// defaults.
#[derive(Clone)]
pub struct ObjectDescriptor {
    name: String,
    parent: Option<String>,
    provides: Vec<Capability>,
    implementation: Option<TypeKey>,
    scope: Option<ObjectScope>,
    lazy: Option<bool>,
    abstract_definition: bool,
    depends_on: Vec<String>,
    primary: Option<bool>,
    priority: Option<i32>,
    order: Option<i32>,
    eligible: Option<bool>,
    role: Option<ObjectRole>,
    factory: Option<ObjectFactory>,
    disposer: Option<Disposer>,
}

impl std::fmt::Debug for ObjectDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectDescriptor")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("provides", &self.provides)
            .field("implementation", &self.implementation)
            .field("scope", &self.scope)
            .field("lazy", &self.lazy)
            .field("abstract_definition", &self.abstract_definition)
            .field("depends_on", &self.depends_on)
            .field("primary", &self.primary)
            .field("priority", &self.priority)
            .field("order", &self.order)
            .field("eligible", &self.eligible)
            .field("role", &self.role)
            .field("factory", &self.factory.as_ref().map(|_| "<factory>"))
            .field("disposer", &self.disposer.as_ref().map(|_| "<disposer>"))
            .finish()
    }
}

impl ObjectDescriptor {
    /// Start building a descriptor for the given name
    pub fn named(name: impl Into<String>) -> DescriptorBuilder {
        DescriptorBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn provides(&self) -> &[Capability] {
        &self.provides
    }

    pub fn implementation(&self) -> Option<&TypeKey> {
        self.implementation.as_ref()
    }

    pub fn scope(&self) -> ObjectScope {
        self.scope.clone().unwrap_or_default()
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy.unwrap_or(false)
    }

    pub fn is_abstract(&self) -> bool {
        self.abstract_definition
    }

    pub fn depends_on(&self) -> &[String] {
        &self.depends_on
    }

    pub fn is_primary(&self) -> bool {
        self.primary.unwrap_or(false)
    }

    pub fn priority(&self) -> Option<i32> {
        self.priority
    }

    pub fn order(&self) -> Option<i32> {
        self.order
    }

    pub fn is_eligible(&self) -> bool {
        self.eligible.unwrap_or(true)
    }

    pub fn role(&self) -> ObjectRole {
        self.role.unwrap_or_default()
    }

    pub fn precedence(&self) -> Precedence {
        Precedence {
            primary: self.is_primary(),
            priority: self.priority,
            order: self.order,
        }
    }

    pub fn factory(&self) -> Option<ObjectFactory> {
        self.factory.clone()
    }

    pub fn disposer(&self) -> Option<Disposer> {
        self.disposer.clone()
    }

    /// Whether the declared type of this definition is statically known
    /// (i.e. matching it does not require invoking its factory).
    pub fn has_known_type(&self) -> bool {
        !self.provides.is_empty() || self.implementation.is_some()
    }

    /// Whether this definition provides the requested capability
    pub fn provides_capability(&self, capability: &Capability) -> bool {
        if self.provides.iter().any(|c| c == capability) {
            return true;
        }
        // A concrete implementation key satisfies a plain capability for the
        // same type even when not listed explicitly.
        capability.params().is_empty()
            && self
                .implementation
                .map(|key| key.id() == capability.key().id())
                .unwrap_or(false)
    }

    /// Produce the resolved descriptor for a child definition, inheriting
    /// every unset field from the (already resolved) parent.
    pub(crate) fn merged_with(&self, parent: &ObjectDescriptor) -> ObjectDescriptor {
        ObjectDescriptor {
            name: self.name.clone(),
            parent: self.parent.clone(),
            provides: if self.provides.is_empty() {
                parent.provides.clone()
            } else {
                self.provides.clone()
            },
            implementation: self.implementation.or(parent.implementation),
            scope: self.scope.clone().or_else(|| parent.scope.clone()),
            lazy: self.lazy.or(parent.lazy),
            // Abstractness is a property of the definition itself, never inherited.
            abstract_definition: self.abstract_definition,
            depends_on: if self.depends_on.is_empty() {
                parent.depends_on.clone()
            } else {
                self.depends_on.clone()
            },
            primary: self.primary.or(parent.primary),
            priority: self.priority.or(parent.priority),
            order: self.order.or(parent.order),
            eligible: self.eligible.or(parent.eligible),
            role: self.role.or(parent.role),
            factory: self.factory.clone().or_else(|| parent.factory.clone()),
            disposer: self.disposer.clone().or_else(|| parent.disposer.clone()),
        }
    }

    /// Metadata equality, ignoring factory/disposer identity. Used by the
    /// store to pick the log level for definition overrides.
    pub(crate) fn same_definition(&self, other: &ObjectDescriptor) -> bool {
        self.parent == other.parent
            && self.provides == other.provides
            && self.implementation == other.implementation
            && self.scope == other.scope
            && self.lazy == other.lazy
            && self.abstract_definition == other.abstract_definition
            && self.depends_on == other.depends_on
            && self.primary == other.primary
            && self.priority == other.priority
            && self.order == other.order
            && self.eligible == other.eligible
    }
}

/// Builder for object descriptors
pub struct DescriptorBuilder {
    descriptor: ObjectDescriptor,
}

impl DescriptorBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            descriptor: ObjectDescriptor {
                name: name.into(),
                parent: None,
                provides: Vec::new(),
                implementation: None,
                scope: None,
                lazy: None,
                abstract_definition: false,
                depends_on: Vec::new(),
                primary: None,
                priority: None,
                order: None,
                eligible: None,
                role: None,
                factory: None,
                disposer: None,
            },
        }
    }

    /// Inherit unset fields from another definition
    pub fn parent(mut self, name: impl Into<String>) -> Self {
        self.descriptor.parent = Some(name.into());
        self
    }

    /// Declare a capability this object provides
    pub fn provides<T: 'static + ?Sized>(mut self) -> Self {
        self.descriptor.provides.push(Capability::of::<T>());
        self
    }

    /// Declare a parameterized capability this object provides
    pub fn provides_capability(mut self, capability: Capability) -> Self {
        self.descriptor.provides.push(capability);
        self
    }

    pub fn scope(mut self, scope: ObjectScope) -> Self {
        self.descriptor.scope = Some(scope);
        self
    }

    pub fn lazy(mut self, lazy: bool) -> Self {
        self.descriptor.lazy = Some(lazy);
        self
    }

    /// Mark this as a template definition that can never be instantiated
    pub fn abstract_definition(mut self) -> Self {
        self.descriptor.abstract_definition = true;
        self
    }

    /// Declare that construction of this object requires `name` to exist first
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.descriptor.depends_on.push(name.into());
        self
    }

    pub fn primary(mut self, primary: bool) -> Self {
        self.descriptor.primary = Some(primary);
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.descriptor.priority = Some(priority);
        self
    }

    pub fn order(mut self, order: i32) -> Self {
        self.descriptor.order = Some(order);
        self
    }

    /// Exclude this definition from candidate selection
    pub fn not_eligible(mut self) -> Self {
        self.descriptor.eligible = Some(false);
        self
    }

    pub fn role(mut self, role: ObjectRole) -> Self {
        self.descriptor.role = Some(role);
        self
    }

    /// Set a typed factory. Records the concrete implementation key and, if
    /// no capability was declared yet, the concrete capability as well.
    pub fn with_factory<F, T>(mut self, factory: F) -> Self
    where
        F: Fn(&CreationContext<'_>) -> Result<T, ContainerError> + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        self.descriptor.implementation = Some(TypeKey::of::<T>());
        if self.descriptor.provides.is_empty() {
            self.descriptor.provides.push(Capability::of::<T>());
        }
        self.descriptor.factory = Some(Arc::new(move |cx| {
            let instance = factory(cx)?;
            Ok(Arc::new(instance) as ObjectRef)
        }));
        self
    }

    /// Set a factory that produces the type-erased reference itself.
    ///
    /// Needed when the factory must share the instance before returning it,
    /// e.g. to expose an early reference while still populating fields.
    pub fn with_raw_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&CreationContext<'_>) -> Result<ObjectRef, ContainerError> + Send + Sync + 'static,
    {
        self.descriptor.factory = Some(Arc::new(factory));
        self
    }

    /// Attach a typed disposal action, run once during destruction
    pub fn with_disposer<F, T>(mut self, disposer: F) -> Self
    where
        F: Fn(&T) -> Result<(), ContainerError> + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        self.descriptor.disposer = Some(Arc::new(move |obj: &ObjectRef| {
            let instance =
                obj.as_ref()
                    .downcast_ref::<T>()
                    .ok_or_else(|| ContainerError::TypeMismatch {
                        name: String::new(),
                        expected: std::any::type_name::<T>().to_string(),
                        actual: "a different registered type".to_string(),
                    })?;
            disposer(instance)
        }));
        self
    }

    pub fn build(self) -> ObjectDescriptor {
        self.descriptor
    }
}
