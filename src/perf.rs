/// Hooks a performance timeline can attach to the scheduler.
///
/// The scheduler never owns a profiler singleton; a handle is injected into
/// [`JobSystem`](crate::JobSystem) and [`TaskSystem`](crate::TaskSystem)
/// and defaults to [`NoopProfiler`].
pub trait Profiler: Send + Sync {
    /// Called once by every thread that takes part in scheduling, with a
    /// human-readable thread name.
    fn setup_thread(&self, _name: &str) {}
    /// Called at the top of each frame.
    fn swap(&self) {}
    fn begin_tag(&self, _name: &str) {}
    fn end_tag(&self) {}
}

/// Profiler that records nothing.
pub struct NoopProfiler;

impl Profiler for NoopProfiler {}

/// RAII pair for [`Profiler::begin_tag`] / [`Profiler::end_tag`].
#[must_use]
pub struct TagScope<'a> {
    profiler: &'a dyn Profiler,
}

impl<'a> TagScope<'a> {
    pub fn enter(profiler: &'a dyn Profiler, name: &str) -> Self {
        profiler.begin_tag(name);
        Self { profiler }
    }
}

impl Drop for TagScope<'_> {
    fn drop(&mut self) {
        self.profiler.end_tag();
    }
}
