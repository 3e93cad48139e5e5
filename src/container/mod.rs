//! Managed-object container: definitions, singleton lifecycle, dependency
//! tracking and capability-based resolution.

pub mod container;
pub mod descriptor;
pub mod diagnostics;
pub mod forward;
pub mod graph;
pub mod process;
pub mod registry;
pub mod resolver;
pub mod scope;
pub mod store;

pub use container::{Container, ContainerId, CreationContext};
pub use descriptor::{
    Capability, DescriptorBuilder, Disposer, ObjectDescriptor, ObjectFactory, ObjectRef,
    ObjectRole, Precedence, TypeKey,
};
pub use diagnostics::{ContainerSnapshot, DefinitionSnapshot, DependencyEdge};
pub use forward::ForwardRef;
pub use graph::DependencyTracker;
pub use registry::{DisposalAction, EarlyFactory, SingletonRegistry};
pub use resolver::{CandidateResolver, CapabilityRequest, Cardinality, Resolution};
pub use scope::{ObjectScope, ScopeHandler};
pub use store::DescriptorStore;
