use serde::{Deserialize, Serialize};

use crate::container::container::{Container, ContainerId};
use crate::container::descriptor::ObjectRole;
use crate::container::scope::ObjectScope;
use crate::errors::ContainerError;

/// Point-in-time view of a container's registrations, suitable for logging
/// and for wiring dumps in bug reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSnapshot {
    pub container_id: ContainerId,
    /// Definitions in registration order, parent-resolved
    pub definitions: Vec<DefinitionSnapshot>,
    /// Names with a live singleton entry, in registration order
    pub singletons: Vec<String>,
    pub dependency_edges: Vec<DependencyEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefinitionSnapshot {
    pub name: String,
    pub scope: ObjectScope,
    pub lazy: bool,
    pub abstract_definition: bool,
    pub primary: bool,
    pub role: ObjectRole,
    pub aliases: Vec<String>,
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub dependent: String,
    pub dependency: String,
}

impl Container {
    /// Capture a snapshot of every definition, live singleton and recorded
    /// dependency edge.
    pub fn snapshot(&self) -> Result<ContainerSnapshot, ContainerError> {
        let mut definitions = Vec::new();
        for name in self.store().names() {
            let Some(descriptor) = self.store().merged(&name)? else {
                continue;
            };
            let mut aliases = self.store().aliases_of(&name);
            aliases.sort();
            definitions.push(DefinitionSnapshot {
                name: name.clone(),
                scope: descriptor.scope(),
                lazy: descriptor.is_lazy(),
                abstract_definition: descriptor.is_abstract(),
                primary: descriptor.is_primary(),
                role: descriptor.role(),
                aliases,
                depends_on: descriptor.depends_on().to_vec(),
            });
        }
        Ok(ContainerSnapshot {
            container_id: self.id(),
            definitions,
            singletons: self.singletons().names(),
            dependency_edges: self
                .graph()
                .edges()
                .into_iter()
                .map(|(dependent, dependency)| DependencyEdge {
                    dependent,
                    dependency,
                })
                .collect(),
        })
    }

    /// Snapshot serialized as pretty-printed JSON
    pub fn snapshot_json(&self) -> Result<String, ContainerError> {
        Ok(serde_json::to_string_pretty(&self.snapshot()?)?)
    }
}
