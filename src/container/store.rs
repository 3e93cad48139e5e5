use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::container::descriptor::ObjectDescriptor;
use crate::errors::ContainerError;

/// Store of object definitions and name aliases.
///
/// Definitions are immutable once registered; replacement swaps the whole
/// descriptor. Registration order is preserved and drives eager
/// instantiation and candidate enumeration. Merged (parent-resolved)
/// descriptors are cached and invalidated when an ancestor is replaced.
pub struct DescriptorStore {
    inner: RwLock<StoreState>,
    allow_overriding: AtomicBool,
}

#[derive(Default)]
struct StoreState {
    definitions: HashMap<String, Arc<ObjectDescriptor>>,
    /// Definition names in registration order
    order: Vec<String>,
    /// Cache of parent-resolved descriptors
    merged: HashMap<String, Arc<ObjectDescriptor>>,
    /// alias -> canonical (or next alias in a chain)
    aliases: HashMap<String, String>,
}

impl Default for DescriptorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DescriptorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("DescriptorStore")
            .field("definitions", &inner.order)
            .field("aliases", &inner.aliases)
            .field("allow_overriding", &self.allow_overriding.load(Ordering::Relaxed))
            .finish()
    }
}

impl DescriptorStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreState::default()),
            allow_overriding: AtomicBool::new(true),
        }
    }

    /// Whether re-registering an occupied name replaces the old definition
    pub fn set_allow_overriding(&self, allow: bool) {
        self.allow_overriding.store(allow, Ordering::Relaxed);
    }

    pub fn allow_overriding(&self) -> bool {
        self.allow_overriding.load(Ordering::Relaxed)
    }

    /// Whether registering a definition under `name` would succeed
    pub fn can_override(&self, name: &str) -> bool {
        self.allow_overriding() || !self.contains(name)
    }

    /// Register a definition under its own name.
    ///
    /// Returns the names whose resolved form may have changed: the name
    /// itself plus every definition that transitively inherits from it. The
    /// container uses this set to reset already-built instances.
    pub fn register(&self, descriptor: ObjectDescriptor) -> Result<Vec<String>, ContainerError> {
        let name = descriptor.name().to_string();
        if name.is_empty() {
            return Err(ContainerError::invalid_descriptor(
                "",
                "definition name must not be empty",
            ));
        }

        let mut inner = self.inner.write();
        if let Some(existing) = inner.definitions.get(&name) {
            if !self.allow_overriding() {
                return Err(ContainerError::OverrideNotAllowed { name });
            }
            if !existing.same_definition(&descriptor) {
                tracing::warn!(
                    "Overriding definition for managed object '{}' with a different definition",
                    name
                );
            } else if existing.role() != descriptor.role() {
                tracing::info!(
                    "Overriding definition for managed object '{}' with one of role {:?}",
                    name,
                    descriptor.role()
                );
            } else {
                tracing::debug!(
                    "Overriding definition for managed object '{}' with an equivalent definition",
                    name
                );
            }
        } else {
            inner.order.push(name.clone());
        }
        inner.definitions.insert(name.clone(), Arc::new(descriptor));

        let affected = Self::affected_names(&inner, &name);
        for stale in &affected {
            inner.merged.remove(stale);
        }
        Ok(affected)
    }

    /// Remove a definition. Returns the affected names as `register` does.
    pub fn remove(&self, name: &str) -> Result<Vec<String>, ContainerError> {
        let mut inner = self.inner.write();
        if inner.definitions.remove(name).is_none() {
            return Err(ContainerError::not_found(name));
        }
        inner.order.retain(|n| n != name);
        let affected = Self::affected_names(&inner, name);
        for stale in &affected {
            inner.merged.remove(stale);
        }
        Ok(affected)
    }

    /// Name plus all names that transitively declare it as a parent
    fn affected_names(inner: &StoreState, name: &str) -> Vec<String> {
        let mut affected = vec![name.to_string()];
        let mut i = 0;
        while i < affected.len() {
            for (child, desc) in &inner.definitions {
                if desc.parent() == Some(affected[i].as_str())
                    && !affected.iter().any(|n| n == child)
                {
                    affected.push(child.clone());
                }
            }
            i += 1;
        }
        affected
    }

    /// The raw definition registered under `name`, if any
    pub fn get(&self, name: &str) -> Option<Arc<ObjectDescriptor>> {
        self.inner.read().definitions.get(name).cloned()
    }

    /// The parent-resolved definition for `name`.
    ///
    /// Walks the parent chain, inheriting unset fields top-down; the result
    /// is cached until an ancestor definition changes.
    pub fn merged(&self, name: &str) -> Result<Option<Arc<ObjectDescriptor>>, ContainerError> {
        if let Some(cached) = self.inner.read().merged.get(name).cloned() {
            return Ok(Some(cached));
        }

        let mut inner = self.inner.write();
        if let Some(cached) = inner.merged.get(name).cloned() {
            return Ok(Some(cached));
        }
        let Some(descriptor) = inner.definitions.get(name).cloned() else {
            return Ok(None);
        };

        let mut resolved = (*descriptor).clone();
        let mut visited = HashSet::new();
        visited.insert(name.to_string());
        let mut parent = descriptor.parent().map(str::to_string);
        while let Some(parent_name) = parent {
            if !visited.insert(parent_name.clone()) {
                return Err(ContainerError::invalid_descriptor(
                    name,
                    format!("parent chain contains a cycle through '{parent_name}'"),
                ));
            }
            let ancestor = inner.definitions.get(&parent_name).cloned().ok_or_else(|| {
                ContainerError::invalid_descriptor(
                    name,
                    format!("parent definition '{parent_name}' does not exist"),
                )
            })?;
            resolved = resolved.merged_with(&ancestor);
            parent = ancestor.parent().map(str::to_string);
        }

        let resolved = Arc::new(resolved);
        inner.merged.insert(name.to_string(), resolved.clone());
        Ok(Some(resolved))
    }

    /// Register `alias` as an alternative name for `name`.
    ///
    /// An alias equal to its target removes any existing alias entry. An
    /// alias already pointing elsewhere is only replaced when overriding is
    /// allowed, and never if the new mapping would form a cycle.
    pub fn register_alias(&self, name: &str, alias: &str) -> Result<(), ContainerError> {
        let mut inner = self.inner.write();
        if alias == name {
            inner.aliases.remove(alias);
            return Ok(());
        }
        if let Some(existing) = inner.aliases.get(alias) {
            if existing == name {
                return Ok(());
            }
            if !self.allow_overriding() {
                return Err(ContainerError::OverrideNotAllowed {
                    name: alias.to_string(),
                });
            }
            tracing::debug!(
                "Alias '{}' redirected from '{}' to '{}'",
                alias,
                existing,
                name
            );
        }
        // Would resolving the target loop back through the new alias?
        let mut current = name.to_string();
        loop {
            if current == alias {
                return Err(ContainerError::AliasCycle {
                    alias: alias.to_string(),
                    name: name.to_string(),
                });
            }
            match inner.aliases.get(&current) {
                Some(next) => current = next.clone(),
                None => break,
            }
        }
        inner.aliases.insert(alias.to_string(), name.to_string());
        Ok(())
    }

    pub fn remove_alias(&self, alias: &str) {
        self.inner.write().aliases.remove(alias);
    }

    /// Resolve an alias chain to the underlying definition name. A name
    /// that is not an alias resolves to itself.
    pub fn canonical_name(&self, name: &str) -> String {
        let inner = self.inner.read();
        let mut current = name.to_string();
        while let Some(next) = inner.aliases.get(&current) {
            current = next.clone();
        }
        current
    }

    /// All aliases that resolve (directly or through a chain) to `name`
    pub fn aliases_of(&self, name: &str) -> Vec<String> {
        let inner = self.inner.read();
        inner
            .aliases
            .keys()
            .filter(|alias| {
                let mut current = (*alias).clone();
                while let Some(next) = inner.aliases.get(&current) {
                    current = next.clone();
                }
                current == name
            })
            .cloned()
            .collect()
    }

    pub fn is_alias(&self, name: &str) -> bool {
        self.inner.read().aliases.contains_key(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().definitions.contains_key(name)
    }

    /// Definition names in registration order
    pub fn names(&self) -> Vec<String> {
        self.inner.read().order.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().order.is_empty()
    }
}
