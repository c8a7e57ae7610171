use std::any::Any;
use std::cell::UnsafeCell;
use std::collections::HashMap;

use crate::type_key::TypeKey;

struct ResourceCell(UnsafeCell<Box<dyn Any + Send + Sync>>);

// The cell itself does no checking; the task schedule is what keeps a
// writer from overlapping any other access to the same resource.
unsafe impl Sync for ResourceCell {}

/// Registry of shared resources, keyed by type.
///
/// Populated before the frame loop starts and structurally read-only while
/// jobs run, so concurrent `get`s don't race. Mutation of a resource during
/// execution goes through [`Context::get_mut_unchecked`] and is policed by
/// the permission schedule.
#[derive(Default)]
pub struct Context {
    values: HashMap<TypeKey, ResourceCell>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a resource, replacing any previous value of the same type.
    pub fn set<T: Any + Send + Sync>(&mut self, value: T) {
        self.values
            .insert(TypeKey::of::<T>(), ResourceCell(UnsafeCell::new(Box::new(value))));
    }

    pub fn get<T: Any>(&self) -> Option<&T> {
        self.values
            .get(&TypeKey::of::<T>())
            .and_then(|cell| unsafe { (*cell.0.get()).downcast_ref::<T>() })
    }

    pub fn get_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.values
            .get_mut(&TypeKey::of::<T>())
            .and_then(|cell| cell.0.get_mut().downcast_mut::<T>())
    }

    /// Get a mutable reference to a resource without any check for aliasing.
    ///
    /// # Safety
    ///
    /// UB if the resource is borrowed anywhere else at the same time. The
    /// derived task schedule guarantees a writer never overlaps another
    /// reader or writer of the same type.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut_unchecked<T: Any>(&self) -> Option<&mut T> {
        match self.values.get(&TypeKey::of::<T>()) {
            Some(cell) => (*cell.0.get()).downcast_mut::<T>(),
            None => None,
        }
    }

    pub fn contains<T: Any>(&self) -> bool {
        self.values.contains_key(&TypeKey::of::<T>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Window(u32);
    struct Renderer(u32);

    #[test]
    fn typed_lookup() {
        let mut context = Context::new();
        context.set(Window(800));
        context.set(Renderer(1));

        assert_eq!(800, context.get::<Window>().unwrap().0);
        assert_eq!(1, context.get::<Renderer>().unwrap().0);
        assert!(context.get::<String>().is_none());
        assert!(context.contains::<Window>());
        assert!(!context.contains::<String>());
    }

    #[test]
    fn set_replaces() {
        let mut context = Context::new();
        context.set(Window(800));
        context.set(Window(1280));
        assert_eq!(1280, context.get::<Window>().unwrap().0);
    }

    #[test]
    fn mutation() {
        let mut context = Context::new();
        context.set(Window(800));
        context.get_mut::<Window>().unwrap().0 = 1024;
        assert_eq!(1024, context.get::<Window>().unwrap().0);
    }
}
