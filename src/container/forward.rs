use std::sync::Arc;

use parking_lot::RwLock;

use crate::errors::ContainerError;

/// Indirection cell for a reference that is wired after construction.
///
/// Breaks field-level circular dependencies: an object is created with an
/// empty cell, exposed as an early reference, and the cell is filled once the
/// peer exists. Constructor-level injection cannot go through a cell, which
/// is why pure constructor cycles remain unresolvable.
pub struct ForwardRef<T: ?Sized> {
    cell: RwLock<Option<Arc<T>>>,
}

impl<T: ?Sized> ForwardRef<T> {
    pub fn new() -> Self {
        Self {
            cell: RwLock::new(None),
        }
    }

    /// Fill the cell. Filling twice is an error; the target is written once.
    pub fn set(&self, value: Arc<T>) -> Result<(), ContainerError> {
        let mut cell = self.cell.write();
        if cell.is_some() {
            return Err(ContainerError::AlreadyRegistered {
                name: format!("forward reference to {}", std::any::type_name::<T>()),
            });
        }
        *cell = Some(value);
        Ok(())
    }

    pub fn get(&self) -> Option<Arc<T>> {
        self.cell.read().clone()
    }

    /// Force the reference, failing if the cell was never wired
    pub fn force(&self) -> Result<Arc<T>, ContainerError> {
        self.get().ok_or_else(|| ContainerError::NotFound {
            name: format!("forward reference to {}", std::any::type_name::<T>()),
        })
    }

    pub fn is_set(&self) -> bool {
        self.cell.read().is_some()
    }
}

impl<T: ?Sized> Default for ForwardRef<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> std::fmt::Debug for ForwardRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardRef")
            .field("set", &self.is_set())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_force_returns_same_arc() {
        let cell: ForwardRef<String> = ForwardRef::new();
        assert!(!cell.is_set());
        assert!(cell.force().is_err());

        let value = Arc::new("hello".to_string());
        cell.set(value.clone()).unwrap();
        assert!(Arc::ptr_eq(&cell.force().unwrap(), &value));
    }

    #[test]
    fn double_set_is_rejected() {
        let cell: ForwardRef<u32> = ForwardRef::new();
        cell.set(Arc::new(1)).unwrap();
        let err = cell.set(Arc::new(2)).unwrap_err();
        assert!(matches!(err, ContainerError::AlreadyRegistered { .. }));
        assert_eq!(*cell.force().unwrap(), 1);
    }
}
