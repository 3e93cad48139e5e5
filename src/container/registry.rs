use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex, RwLock};

use crate::container::descriptor::ObjectRef;
use crate::container::graph::DependencyTracker;
use crate::errors::ContainerError;

/// Maximum number of suppressed errors preserved per creation attempt
const SUPPRESSED_ERRORS_LIMIT: usize = 100;

/// Thunk that synthesizes an early reference to an object still under
/// construction; consumed at most once.
pub type EarlyFactory = Box<dyn FnOnce() -> ObjectRef + Send>;

/// Teardown logic registered for a name, run once during destruction
pub type DisposalAction = Box<dyn FnOnce() -> Result<(), ContainerError> + Send>;

/// Registry of shared instances keyed by name.
///
/// Three tiers per name: completed instances, early references exposed to
/// break field-level cycles, and early-reference factories. A name occupies
/// at most one tier at a time, and once completed it never returns to the
/// other two short of explicit eviction.
///
/// One reentrant lock guards the whole creation phase so that a factory
/// running under it can re-enter the registry for its own dependencies;
/// collaborators that extend construction must go through this registry
/// rather than take a second, independently ordered lock. Completed-cache
/// reads bypass the lock: completed entries are only removed during full
/// shutdown, which is preceded by the creation-rejection flag.
pub struct SingletonRegistry {
    /// Completed instances, readable without the registry lock
    completed: RwLock<HashMap<String, ObjectRef>>,
    /// Registry-wide creation lock and the mutable creation-phase state
    state: ReentrantMutex<RefCell<RegistryState>>,
    /// Disposal actions in registration order, independent of singleton entries
    disposables: Mutex<Vec<(String, DisposalAction)>>,
    graph: Arc<DependencyTracker>,
}

struct RegistryState {
    /// Early references exposed for names still in creation
    early: HashMap<String, ObjectRef>,
    /// Early-reference factories, consumed on first early access
    factories: HashMap<String, EarlyFactory>,
    /// Registered names in registration order
    registered: Vec<String>,
    /// Names currently inside their construction bracket
    in_creation: HashSet<String>,
    /// Names exempted from in-creation checks
    check_exclusions: HashSet<String>,
    /// Suppressed errors collected during the outermost creation attempt
    suppressed: Option<Vec<ContainerError>>,
    /// Once set, all further creation is rejected
    in_destruction: bool,
}

impl std::fmt::Debug for SingletonRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingletonRegistry")
            .field("completed_count", &self.completed.read().len())
            .field("disposable_count", &self.disposables.lock().len())
            .finish()
    }
}

impl SingletonRegistry {
    pub fn new(graph: Arc<DependencyTracker>) -> Self {
        Self {
            completed: RwLock::new(HashMap::new()),
            state: ReentrantMutex::new(RefCell::new(RegistryState {
                early: HashMap::new(),
                factories: HashMap::new(),
                registered: Vec::new(),
                in_creation: HashSet::new(),
                check_exclusions: HashSet::new(),
                suppressed: None,
                in_destruction: false,
            })),
            disposables: Mutex::new(Vec::new()),
            graph,
        }
    }

    pub fn graph(&self) -> &Arc<DependencyTracker> {
        &self.graph
    }

    /// Return the completed instance for `name`, or an early reference to a
    /// currently-created one when `allow_early` is set. Never triggers new
    /// construction of the object itself.
    pub fn get(&self, name: &str, allow_early: bool) -> Option<ObjectRef> {
        // Quick check for an existing instance without the registry lock
        if let Some(obj) = self.completed.read().get(name) {
            return Some(obj.clone());
        }
        let guard = self.state.lock();
        if !guard.borrow().in_creation.contains(name) {
            return None;
        }
        if let Some(obj) = guard.borrow().early.get(name).cloned() {
            return Some(obj);
        }
        if !allow_early {
            return None;
        }
        // Re-check both tiers under the full lock to stay consistent with
        // concurrent writers, then consume the early factory if one exists.
        if let Some(obj) = self.completed.read().get(name) {
            return Some(obj.clone());
        }
        if let Some(obj) = guard.borrow().early.get(name).cloned() {
            return Some(obj);
        }
        let thunk = guard.borrow_mut().factories.remove(name);
        if let Some(thunk) = thunk {
            let obj = thunk();
            guard
                .borrow_mut()
                .early
                .insert(name.to_string(), obj.clone());
            return Some(obj);
        }
        None
    }

    /// Return the completed instance for `name`, creating and registering it
    /// via `factory` if absent.
    ///
    /// The whole bracket runs under the registry lock, so concurrent callers
    /// for the same name block until the first caller's factory returns and
    /// every caller observes the same instance.
    pub fn get_or_create<F>(&self, name: &str, factory: F) -> Result<ObjectRef, ContainerError>
    where
        F: FnOnce() -> Result<ObjectRef, ContainerError>,
    {
        if let Some(obj) = self.completed.read().get(name) {
            return Ok(obj.clone());
        }
        let guard = self.state.lock();
        if let Some(obj) = self.completed.read().get(name) {
            return Ok(obj.clone());
        }

        let record_suppressed;
        {
            let mut st = guard.borrow_mut();
            if st.in_destruction {
                return Err(ContainerError::CreationRejected {
                    name: name.to_string(),
                });
            }
            tracing::debug!("Creating shared instance of managed object '{}'", name);
            self.before_creation(&mut st, name)?;
            record_suppressed = st.suppressed.is_none();
            if record_suppressed {
                st.suppressed = Some(Vec::new());
            }
        }

        // The RefCell borrow is released: the factory may re-enter this
        // registry on the same thread for its dependencies. The drop guard
        // clears the in-creation marker even if the factory unwinds, so a
        // later call can retry construction from scratch.
        let bracket = CreationBracket {
            registry: self,
            name,
            record_suppressed,
        };
        let result = factory();

        let suppressed = {
            let mut st = guard.borrow_mut();
            bracket.finish(&mut st)
        };

        match result {
            Ok(obj) => {
                self.add_completed(&guard, name, obj.clone());
                Ok(obj)
            }
            Err(err) => {
                // The instance may have appeared implicitly in the meantime
                // (e.g. the factory registered it directly before failing on
                // an unrelated step); prefer that state over the error.
                if let Some(obj) = self.completed.read().get(name) {
                    return Ok(obj.clone());
                }
                match err {
                    failure @ ContainerError::CreationFailed { .. } => {
                        Err(failure.with_related(suppressed))
                    }
                    other => Err(other),
                }
            }
        }
    }

    fn before_creation(
        &self,
        st: &mut RegistryState,
        name: &str,
    ) -> Result<(), ContainerError> {
        if !st.check_exclusions.contains(name) && !st.in_creation.insert(name.to_string()) {
            return Err(ContainerError::CurrentlyInCreation {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn after_creation(&self, st: &mut RegistryState, name: &str) {
        if !st.check_exclusions.contains(name) && !st.in_creation.remove(name) {
            tracing::warn!(
                "Managed object '{}' was not marked in-creation at the end of its bracket",
                name
            );
        }
    }

    /// Record an error that was suppressed during the current creation
    /// attempt, to be attached as a related cause to an eventual top-level
    /// creation failure. The collection is capacity-bounded.
    pub fn on_suppressed(&self, err: ContainerError) {
        let guard = self.state.lock();
        let mut st = guard.borrow_mut();
        if let Some(suppressed) = st.suppressed.as_mut() {
            if suppressed.len() < SUPPRESSED_ERRORS_LIMIT {
                suppressed.push(err);
            }
        }
    }

    /// Install a thunk that can synthesize an early reference to `name`
    /// while it is still being constructed. No-op once `name` is completed.
    pub fn register_factory(&self, name: &str, thunk: EarlyFactory) {
        let guard = self.state.lock();
        if self.completed.read().contains_key(name) {
            return;
        }
        let mut st = guard.borrow_mut();
        st.factories.insert(name.to_string(), thunk);
        st.early.remove(name);
        if !st.registered.iter().any(|n| n == name) {
            st.registered.push(name.to_string());
        }
    }

    /// Register a completed instance directly, independent of any descriptor.
    ///
    /// Registering the identical instance again is a no-op; a different
    /// instance under an occupied name is rejected. Replacement is only
    /// possible through explicit eviction.
    pub fn register_completed(
        &self,
        name: &str,
        instance: ObjectRef,
    ) -> Result<(), ContainerError> {
        let guard = self.state.lock();
        if let Some(existing) = self.completed.read().get(name) {
            if Arc::ptr_eq(existing, &instance) {
                return Ok(());
            }
            return Err(ContainerError::AlreadyRegistered {
                name: name.to_string(),
            });
        }
        self.add_completed(&guard, name, instance);
        Ok(())
    }

    /// Move `name` into the completed tier, clearing the other two
    fn add_completed(
        &self,
        guard: &parking_lot::ReentrantMutexGuard<'_, RefCell<RegistryState>>,
        name: &str,
        instance: ObjectRef,
    ) {
        self.completed.write().insert(name.to_string(), instance);
        let mut st = guard.borrow_mut();
        st.factories.remove(name);
        st.early.remove(name);
        if !st.registered.iter().any(|n| n == name) {
            st.registered.push(name.to_string());
        }
    }

    /// Evict `name` from all three tiers, e.g. to roll back a failed eager
    /// registration or support definition replacement.
    pub fn remove(&self, name: &str) {
        let guard = self.state.lock();
        self.completed.write().remove(name);
        let mut st = guard.borrow_mut();
        st.factories.remove(name);
        st.early.remove(name);
        st.registered.retain(|n| n != name);
    }

    /// Whether a completed instance is registered for `name`
    pub fn contains(&self, name: &str) -> bool {
        self.completed.read().contains_key(name)
    }

    /// Registered names in registration order
    pub fn names(&self) -> Vec<String> {
        self.state.lock().borrow().registered.clone()
    }

    pub fn count(&self) -> usize {
        self.state.lock().borrow().registered.len()
    }

    /// Exempt `name` from (or re-subject it to) in-creation checks
    pub fn set_currently_in_creation(&self, name: &str, in_creation: bool) {
        let guard = self.state.lock();
        let mut st = guard.borrow_mut();
        if in_creation {
            st.check_exclusions.remove(name);
        } else {
            st.check_exclusions.insert(name.to_string());
        }
    }

    /// Whether `name` is inside its construction bracket, honoring exclusions
    pub fn is_currently_in_creation(&self, name: &str) -> bool {
        let guard = self.state.lock();
        let st = guard.borrow();
        !st.check_exclusions.contains(name) && st.in_creation.contains(name)
    }

    pub fn is_in_destruction(&self) -> bool {
        self.state.lock().borrow().in_destruction
    }

    /// Register teardown logic for `name`. A disposal action may exist
    /// without a matching singleton entry.
    pub fn register_disposal(&self, name: &str, action: DisposalAction) {
        let mut disposables = self.disposables.lock();
        if let Some(entry) = disposables.iter_mut().find(|(n, _)| n == name) {
            entry.1 = action;
        } else {
            disposables.push((name.to_string(), action));
        }
    }

    /// Destroy every name with a registered disposal action in reverse
    /// registration order, then clear all caches and graph edges.
    ///
    /// After this returns the registry permanently rejects new creation;
    /// calling it again is a no-op.
    pub fn destroy_all(&self) {
        tracing::debug!("Destroying singletons");
        {
            let guard = self.state.lock();
            guard.borrow_mut().in_destruction = true;
        }

        let names: Vec<String> = {
            let disposables = self.disposables.lock();
            disposables.iter().map(|(n, _)| n.clone()).collect()
        };
        for name in names.iter().rev() {
            self.destroy(name);
        }

        self.graph.clear();
        let guard = self.state.lock();
        self.completed.write().clear();
        let mut st = guard.borrow_mut();
        st.factories.clear();
        st.early.clear();
        st.registered.clear();
    }

    /// Destroy `name`: evict it, tear down everything that depends on it,
    /// run its disposal action, then sweep the names it contains.
    ///
    /// Disposal failures are reported and never propagate: partial failure
    /// favors completing teardown over stopping at the first fault.
    pub fn destroy(&self, name: &str) {
        self.remove(name);
        let action = {
            let mut disposables = self.disposables.lock();
            disposables
                .iter()
                .position(|(n, _)| n == name)
                .map(|pos| disposables.remove(pos).1)
        };
        self.destroy_object(name, action);
    }

    fn destroy_object(&self, name: &str, action: Option<DisposalAction>) {
        // Dependents would break if `name` disappeared first
        let dependents = self.graph.take_dependents(name);
        if !dependents.is_empty() {
            tracing::trace!(
                "Destroying dependents of managed object '{}': {:?}",
                name,
                dependents
            );
            for dependent in dependents {
                self.destroy(&dependent);
            }
        }

        if let Some(action) = action {
            if let Err(err) = action() {
                tracing::warn!(
                    "Disposal action for managed object '{}' failed: {}",
                    name,
                    err
                );
            }
        }

        for inner in self.graph.take_contained(name) {
            self.destroy(&inner);
        }
        self.graph.forget(name);
    }

    /// Which tiers currently hold `name`: (completed, early, factory)
    #[cfg(test)]
    pub(crate) fn tier_occupancy(&self, name: &str) -> (bool, bool, bool) {
        let guard = self.state.lock();
        let st = guard.borrow();
        (
            self.completed.read().contains_key(name),
            st.early.contains_key(name),
            st.factories.contains_key(name),
        )
    }
}

/// Exit path of the construction bracket. The normal path consumes it via
/// `finish`, which also yields the suppressed errors; a panicking factory
/// reaches the `Drop` impl instead, which re-acquires the reentrant registry
/// lock and performs the same cleanup so the name can be retried.
struct CreationBracket<'a> {
    registry: &'a SingletonRegistry,
    name: &'a str,
    record_suppressed: bool,
}

impl CreationBracket<'_> {
    fn finish(self, st: &mut RegistryState) -> Vec<ContainerError> {
        self.registry.after_creation(st, self.name);
        let suppressed = if self.record_suppressed {
            st.suppressed.take().unwrap_or_default()
        } else {
            Vec::new()
        };
        std::mem::forget(self);
        suppressed
    }
}

impl Drop for CreationBracket<'_> {
    fn drop(&mut self) {
        let guard = self.registry.state.lock();
        let mut st = guard.borrow_mut();
        self.registry.after_creation(&mut st, self.name);
        if self.record_suppressed {
            st.suppressed = None;
        }
    }
}
