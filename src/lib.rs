//! # armature
//!
//! A runtime container for managed objects: register object definitions
//! (name, scope, factory, precedence metadata), retrieve shared instances
//! with guaranteed at-most-once construction, resolve capability requests
//! across candidates, and tear everything down in reverse dependency order.
//!
//! ```
//! use armature::{Container, ObjectDescriptor};
//!
//! struct Greeter {
//!     greeting: String,
//! }
//!
//! let container = Container::new();
//! container
//!     .register(
//!         ObjectDescriptor::named("greeter")
//!             .with_factory(|_| {
//!                 Ok(Greeter {
//!                     greeting: "hello".to_string(),
//!                 })
//!             })
//!             .build(),
//!     )
//!     .unwrap();
//!
//! let greeter = container.get_typed::<Greeter>("greeter").unwrap();
//! assert_eq!(greeter.greeting, "hello");
//! ```

pub mod container;
pub mod errors;

// Re-export key types for convenience
pub use container::{
    CandidateResolver, Capability, CapabilityRequest, Cardinality, Container, ContainerId,
    ContainerSnapshot, CreationContext, DependencyTracker, DescriptorStore, ForwardRef,
    ObjectDescriptor, ObjectRef, ObjectRole, ObjectScope, Resolution, ScopeHandler,
    SingletonRegistry,
};
pub use errors::ContainerError;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get crate version
pub fn version() -> &'static str {
    VERSION
}
