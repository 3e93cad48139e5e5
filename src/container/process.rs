use std::collections::HashMap;
use std::sync::{Arc, Weak};

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::container::container::{Container, ContainerId};

/// Process-wide table of published containers, held weakly so publication
/// never keeps a container alive.
static CONTAINERS: Lazy<Mutex<HashMap<ContainerId, Weak<Container>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Make a container discoverable by its id from anywhere in the process.
/// Returns the id it was published under.
pub fn publish(container: &Arc<Container>) -> ContainerId {
    let id = container.id();
    tracing::debug!("Publishing container {}", id);
    CONTAINERS.lock().insert(id, Arc::downgrade(container));
    id
}

/// Look up a published container. Returns `None` for unknown ids and for
/// containers that have since been dropped.
pub fn lookup(id: ContainerId) -> Option<Arc<Container>> {
    let mut table = CONTAINERS.lock();
    match table.get(&id) {
        Some(weak) => {
            let strong = weak.upgrade();
            if strong.is_none() {
                table.remove(&id);
            }
            strong
        }
        None => None,
    }
}

/// Remove a container from the table. Dropping the last strong reference
/// has the same observable effect.
pub fn unpublish(id: ContainerId) {
    CONTAINERS.lock().remove(&id);
}

/// Number of currently published (and still live) containers
pub fn published_count() -> usize {
    let mut table = CONTAINERS.lock();
    table.retain(|_, weak| weak.upgrade().is_some());
    table.len()
}
