use std::ops::Deref;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use crate::context::Context;
use crate::job::{Job, JobBody};
use crate::permission::Permission;
use crate::task::Task;

struct TaskBody {
    permission: Permission,
    task: Mutex<Box<dyn Task>>,
    context: *const Context,
    pin: Mutex<Option<ThreadId>>,
}

// The context is owned by the TaskSystem that also owns this job and stays
// put for as long as the job is alive; the task itself sits behind a lock.
unsafe impl Send for TaskBody {}
unsafe impl Sync for TaskBody {}

impl JobBody for TaskBody {
    fn can_exec(&self) -> bool {
        // A pinned job is invisible to every other thread's queue scan.
        match *self.pin.lock() {
            Some(id) => id == thread::current().id(),
            None => true,
        }
    }
    fn exec(&self, _job: &Job) {
        let context = unsafe { &*self.context };
        self.task.lock().exec(context);
    }
}

/// A [`Job`] that runs a [`Task`] against a shared [`Context`]. Created by
/// [`TaskSystem::add_task`](crate::TaskSystem::add_task), dispatched anew
/// every frame.
#[derive(Clone)]
pub struct TaskJob {
    job: Job,
    body: Arc<TaskBody>,
}

impl TaskJob {
    pub(crate) fn new(name: &str, task: Box<dyn Task>, context: &Context) -> Self {
        let body = Arc::new(TaskBody {
            permission: task.permission().clone(),
            task: Mutex::new(task),
            context: context as *const Context,
            pin: Mutex::new(None),
        });
        Self {
            job: Job::new(name, body.clone()),
            body,
        }
    }

    pub fn permission(&self) -> &Permission {
        &self.body.permission
    }

    /// Restrict execution to the calling thread. Workers whose identity
    /// does not match pass the job over, only the recorded thread picks it
    /// up. For tasks that touch thread-affine state such as a window or a
    /// GPU context.
    pub fn pin_to_current_thread(&self) {
        *self.body.pin.lock() = Some(thread::current().id());
    }

    pub fn job(&self) -> &Job {
        &self.job
    }
}

impl Deref for TaskJob {
    type Target = Job;
    fn deref(&self) -> &Job {
        &self.job
    }
}
