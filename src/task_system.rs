use std::any::Any;
use std::sync::Arc;

use crate::context::Context;
use crate::job_system::JobSystem;
use crate::perf::{NoopProfiler, Profiler, TagScope};
use crate::task::{FuncTask, TaskFn};
use crate::task_job::TaskJob;

/// Control data the frame loop injects into the context. A task that wants
/// to stop the loop takes `ResMut<TaskSystemData>` and clears `is_loop`;
/// the loop ends after the frame that did it completes.
pub struct TaskSystemData {
    pub is_loop: bool,
}

/// Frame scheduler: owns the registered task jobs and the shared context,
/// derives prerequisite edges from the declared permissions and dispatches
/// every task as a job once per frame.
pub struct TaskSystem {
    tasks: Vec<TaskJob>,
    context: Box<Context>,
    profiler: Arc<dyn Profiler>,
}

impl TaskSystem {
    pub fn new() -> Self {
        Self::with_profiler(Arc::new(NoopProfiler))
    }

    pub fn with_profiler(profiler: Arc<dyn Profiler>) -> Self {
        Self {
            tasks: Vec::new(),
            context: Box::new(Context::new()),
            profiler,
        }
    }

    /// Store a resource tasks can then take as `Res`/`ResMut` parameters.
    /// The [`JobSystem`] itself goes in here too.
    pub fn set_context<T: Any + Send + Sync>(&mut self, value: T) {
        self.context.set(value);
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Register a task. Registration order decides who goes first whenever
    /// two tasks touch the same type; unrelated tasks run in parallel. The
    /// returned handle is mostly useful for
    /// [`pin_to_current_thread`](TaskJob::pin_to_current_thread).
    pub fn add_task<A: 'static>(&mut self, name: &str, func: impl TaskFn<A>) -> TaskJob {
        let task_job = TaskJob::new(name, Box::new(FuncTask::new(func)), &self.context);
        self.tasks.push(task_job.clone());
        task_job
    }

    /// Run frames until a task clears [`TaskSystemData::is_loop`].
    ///
    /// Panics when no [`JobSystem`] was stored in the context.
    pub fn run(&mut self) {
        self.context.set(TaskSystemData { is_loop: true });
        self.setup_dependencies();
        self.profiler.setup_thread("main");
        loop {
            self.profiler.swap();
            let jobs = self
                .context
                .get::<JobSystem>()
                .expect("job system not in context");
            {
                let _tag = TagScope::enter(&*self.profiler, "setup jobs");
                for task in &self.tasks {
                    task.reset();
                }
                for task in &self.tasks {
                    jobs.add_job(task.job());
                }
            }
            jobs.exec_all_jobs();

            let data = self
                .context
                .get::<TaskSystemData>()
                .expect("task system data is injected at the top of run");
            if !data.is_loop {
                break;
            }
        }
    }

    /// Turn permissions into prerequisite edges: a writer waits for every
    /// earlier reader and writer of the type, a reader waits for every
    /// earlier writer. Transitively redundant edges are refused by
    /// [`Job::add_prerequisite`](crate::Job::add_prerequisite), which also
    /// makes a second `run` harmless.
    fn setup_dependencies(&self) {
        for (index, task) in self.tasks.iter().enumerate() {
            for key in task.permission().writes() {
                for earlier in self.tasks[..index].iter().rev() {
                    if earlier.permission().conflicts_write(*key) {
                        task.add_prerequisite(earlier.job());
                    }
                }
            }
            for key in task.permission().reads() {
                for earlier in self.tasks[..index].iter().rev() {
                    if earlier.permission().conflicts_read(*key) {
                        task.add_prerequisite(earlier.job());
                    }
                }
            }
        }
    }
}

impl Default for TaskSystem {
    fn default() -> Self {
        Self::new()
    }
}
