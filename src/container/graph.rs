use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

/// Records "depends-on" and "contains" relationships between managed object
/// names and answers reachability queries over them.
///
/// The two adjacency maps mirror each other and are kept consistent under one
/// lock. Destruction ordering is driven by the singleton registry, which
/// snapshots dependents/contained sets from here and recurses back into its
/// own `destroy` entry point; the two components are mutually recursive by
/// design.
#[derive(Debug, Default)]
pub struct DependencyTracker {
    state: Mutex<GraphState>,
}

#[derive(Debug, Default)]
struct GraphState {
    /// name -> names that depend on it (insertion order preserved)
    dependents: HashMap<String, Vec<String>>,
    /// name -> names it depends on
    dependencies: HashMap<String, Vec<String>>,
    /// outer name -> names created as nested parts of it
    contained: HashMap<String, Vec<String>>,
}

fn insert_unique(map: &mut HashMap<String, Vec<String>>, key: &str, value: &str) -> bool {
    let entry = map.entry(key.to_string()).or_default();
    if entry.iter().any(|v| v == value) {
        return false;
    }
    entry.push(value.to_string());
    true
}

impl DependencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `dependent` requires `dependency` to stay alive.
    /// Idempotent; both maps are updated together.
    pub fn add_dependency(&self, dependent: &str, dependency: &str) {
        let mut state = self.state.lock();
        if !insert_unique(&mut state.dependents, dependency, dependent) {
            return;
        }
        insert_unique(&mut state.dependencies, dependent, dependency);
    }

    /// Record that `inner` was created as a nested part of `outer`.
    ///
    /// The outer object is registered as a dependent of its part: tearing
    /// down the part first tears down its owner, and an owner's own teardown
    /// sweeps its parts after its disposal action has run.
    pub fn add_containment(&self, inner: &str, outer: &str) {
        {
            let mut state = self.state.lock();
            if !insert_unique(&mut state.contained, outer, inner) {
                return;
            }
        }
        self.add_dependency(outer, inner);
    }

    /// Whether `dependent` is reachable from `name` over the dependents
    /// relation, i.e. whether declaring `name` depends on `dependent` would
    /// close a cycle.
    ///
    /// The visited set guarantees termination even if other registration
    /// paths already introduced cycles into the graph.
    pub fn is_transitively_dependent(&self, name: &str, dependent: &str) -> bool {
        let state = self.state.lock();
        let mut seen = HashSet::new();
        Self::is_dependent_inner(&state, name, dependent, &mut seen)
    }

    fn is_dependent_inner(
        state: &GraphState,
        name: &str,
        dependent: &str,
        seen: &mut HashSet<String>,
    ) -> bool {
        if !seen.insert(name.to_string()) {
            return false;
        }
        let Some(dependents) = state.dependents.get(name) else {
            return false;
        };
        if dependents.iter().any(|d| d == dependent) {
            return true;
        }
        dependents
            .iter()
            .any(|transitive| Self::is_dependent_inner(state, transitive, dependent, seen))
    }

    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        self.state
            .lock()
            .dependents
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn dependencies_of(&self, name: &str) -> Vec<String> {
        self.state
            .lock()
            .dependencies
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn has_dependents(&self, name: &str) -> bool {
        self.state
            .lock()
            .dependents
            .get(name)
            .map(|d| !d.is_empty())
            .unwrap_or(false)
    }

    /// Detach and return the current dependents of `name`.
    /// The full lock guarantees a disconnected set for the destroy traversal.
    pub(crate) fn take_dependents(&self, name: &str) -> Vec<String> {
        self.state
            .lock()
            .dependents
            .remove(name)
            .unwrap_or_default()
    }

    /// Detach and return the names contained in `name`
    pub(crate) fn take_contained(&self, name: &str) -> Vec<String> {
        self.state.lock().contained.remove(name).unwrap_or_default()
    }

    /// Remove `name` from both maps and scrub it from every other name's
    /// dependent/dependency set.
    pub fn forget(&self, name: &str) {
        let mut state = self.state.lock();
        let state = &mut *state;
        state.dependents.remove(name);
        state.dependencies.remove(name);
        state.contained.remove(name);
        for map in [
            &mut state.dependents,
            &mut state.dependencies,
            &mut state.contained,
        ] {
            map.retain(|_, values| {
                values.retain(|v| v != name);
                !values.is_empty()
            });
        }
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.dependents.clear();
        state.dependencies.clear();
        state.contained.clear();
    }

    /// All current (dependent, dependency) edges, for diagnostics
    pub fn edges(&self) -> Vec<(String, String)> {
        let state = self.state.lock();
        let mut edges = Vec::new();
        for (dependency, dependents) in &state.dependents {
            for dependent in dependents {
                edges.push((dependent.clone(), dependency.clone()));
            }
        }
        edges
    }
}
