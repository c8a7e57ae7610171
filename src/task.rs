use std::any::type_name;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use crate::context::Context;
use crate::permission::Permission;
use crate::work::Work;

/// A declarative unit of per-frame work: a fixed access declaration plus an
/// entry point resolved against a [`Context`]. The `&mut self` is what
/// gives a task exclusive use of its own state while it runs.
pub trait Task: Send {
    fn permission(&self) -> &Permission;
    fn exec(&mut self, context: &Context);
}

/// Shared view of a context resource. Declares a read of `T`.
pub struct Res<T: 'static> {
    value: *const T,
}

impl<T> Deref for Res<T> {
    type Target = T;
    fn deref(&self) -> &T {
        // Lives in the context, which outlives the task's call.
        unsafe { &*self.value }
    }
}

/// Exclusive view of a context resource. Declares a write of `T`.
pub struct ResMut<T: 'static> {
    value: *mut T,
}

impl<T> Deref for ResMut<T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.value }
    }
}

impl<T> DerefMut for ResMut<T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.value }
    }
}

/// Mutable handle into the task's own [`Work`], created on first use.
/// Declares no permission; the storage is private to the task, which is how
/// a task keeps state across frames without contending on a shared
/// [`Context`] entry.
pub struct Scratch<T: 'static> {
    value: *mut T,
}

impl<T> Deref for Scratch<T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.value }
    }
}

impl<T> DerefMut for Scratch<T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.value }
    }
}

/// A type a task function may take as a parameter: contributes to the
/// task's [`Permission`] and knows how to resolve itself from the
/// [`Context`] or the task's [`Work`].
pub trait TaskArg {
    fn set_permission(permission: &mut Permission);
    fn fetch(context: &Context, work: &mut Work) -> Self;
}

impl<T: 'static> TaskArg for Res<T> {
    fn set_permission(permission: &mut Permission) {
        permission.add_read::<T>();
    }
    fn fetch(context: &Context, _work: &mut Work) -> Self {
        let value = context
            .get::<T>()
            .unwrap_or_else(|| panic!("resource not in context: {}", type_name::<T>()));
        Self { value: value as *const T }
    }
}

impl<T: 'static> TaskArg for ResMut<T> {
    fn set_permission(permission: &mut Permission) {
        permission.add_write::<T>();
    }
    fn fetch(context: &Context, _work: &mut Work) -> Self {
        // The derived schedule never overlaps two tasks whose permissions
        // conflict, so the exclusive view cannot alias.
        let value = unsafe { context.get_mut_unchecked::<T>() }
            .unwrap_or_else(|| panic!("resource not in context: {}", type_name::<T>()));
        Self { value: value as *mut T }
    }
}

impl<T: 'static> TaskArg for Option<Res<T>> {
    fn set_permission(permission: &mut Permission) {
        permission.add_read::<T>();
    }
    fn fetch(context: &Context, _work: &mut Work) -> Self {
        context.get::<T>().map(|value| Res { value: value as *const T })
    }
}

impl<T: 'static> TaskArg for Option<ResMut<T>> {
    fn set_permission(permission: &mut Permission) {
        permission.add_write::<T>();
    }
    fn fetch(context: &Context, _work: &mut Work) -> Self {
        unsafe { context.get_mut_unchecked::<T>() }.map(|value| ResMut { value: value as *mut T })
    }
}

impl<T: Default + Send + 'static> TaskArg for Scratch<T> {
    fn set_permission(_permission: &mut Permission) {}
    fn fetch(_context: &Context, work: &mut Work) -> Self {
        if !work.contains::<T>() {
            work.emplace(T::default());
        }
        let value = work.get_mut::<T>().unwrap();
        Self { value: value as *mut T }
    }
}

/// Implemented for functions whose parameters are all [`TaskArg`]s; gives
/// [`FuncTask`] its permission derivation and its calling convention.
pub trait TaskFn<A>: Send + Sync + 'static {
    fn permission() -> Permission;
    fn invoke(&self, context: &Context, work: &mut Work);
}

macro_rules! impl_task_fn {
    () => {
        impl_task_fn!(@impl);
    };
    ($head:ident $(, $tail:ident)*) => {
        impl_task_fn!(@impl $head $(, $tail)*);
        impl_task_fn!($($tail),*);
    };
    (@impl $($arg:ident),*) => {
        impl<Func, $($arg),*> TaskFn<($($arg,)*)> for Func
        where
            Func: Fn($($arg),*) + Send + Sync + 'static,
            $($arg: TaskArg + 'static,)*
        {
            fn permission() -> Permission {
                #[allow(unused_mut)]
                let mut permission = Permission::new();
                $(<$arg as TaskArg>::set_permission(&mut permission);)*
                permission
            }
            #[allow(unused_variables)]
            fn invoke(&self, context: &Context, work: &mut Work) {
                (self)($(<$arg as TaskArg>::fetch(context, work)),*);
            }
        }
    };
}

impl_task_fn!(A, B, C, D, E, F, G, H, I, J, K, L, M, N, O, P);

/// A [`Task`] built from a plain function; the permission is derived from
/// the parameter types at construction.
pub struct FuncTask<Func, A> {
    func: Func,
    permission: Permission,
    work: Work,
    _args: PhantomData<fn(A)>,
}

impl<Func: TaskFn<A>, A: 'static> FuncTask<Func, A> {
    pub fn new(func: Func) -> Self {
        Self {
            func,
            permission: Func::permission(),
            work: Work::new(),
            _args: PhantomData,
        }
    }
}

impl<Func: TaskFn<A>, A: 'static> Task for FuncTask<Func, A> {
    fn permission(&self) -> &Permission {
        &self.permission
    }
    fn exec(&mut self, context: &Context) {
        self.func.invoke(context, &mut self.work);
    }
}
