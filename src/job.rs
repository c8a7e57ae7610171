use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// Lifecycle of a [`Job`].
///
/// ```text
/// None -submit-> WaitExec -exec-> Exec -> WaitDone -done-> Done -reset-> None
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum State {
    None = 0,
    WaitExec,
    Exec,
    WaitDone,
    Done,
}

impl State {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => State::None,
            1 => State::WaitExec,
            2 => State::Exec,
            3 => State::WaitDone,
            4 => State::Done,
            _ => unreachable!("invalid job state"),
        }
    }
}

/// The two extension points of a job.
pub trait JobBody: Send + Sync {
    /// Extra gate checked on top of the state machine, e.g. a thread pin.
    fn can_exec(&self) -> bool {
        true
    }
    /// The work itself. Receives the executing job's handle so it can spawn
    /// children with [`Job::add_child`].
    fn exec(&self, job: &Job);
}

struct FnBody<F>(F);

impl<F: Fn(&Job) + Send + Sync> JobBody for FnBody<F> {
    fn exec(&self, job: &Job) {
        (self.0)(job)
    }
}

#[derive(Default)]
struct Links {
    /// Jobs that must be Done before this one runs. Strong edges.
    prerequisites: Vec<Job>,
    /// Inverse of prerequisites: the jobs whose counters this one
    /// decrements when it finishes. Weak, to not close reference cycles.
    dependencies: Vec<Weak<Inner>>,
    parent: Option<Weak<Inner>>,
}

struct Inner {
    name: String,
    state: AtomicU8,
    prerequisite_count: AtomicUsize,
    child_count: AtomicUsize,
    links: Mutex<Links>,
    body: Arc<dyn JobBody>,
}

/// A schedulable unit of work: a cheap-to-clone handle over the state
/// machine, the dependency counters and the body. Handle equality is
/// identity.
#[derive(Clone)]
pub struct Job {
    inner: Arc<Inner>,
}

impl Job {
    pub fn new(name: &str, body: Arc<dyn JobBody>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.to_owned(),
                state: AtomicU8::new(State::None as u8),
                prerequisite_count: AtomicUsize::new(0),
                child_count: AtomicUsize::new(0),
                links: Mutex::new(Links::default()),
                body,
            }),
        }
    }

    pub fn from_fn<F: Fn(&Job) + Send + Sync + 'static>(name: &str, f: F) -> Self {
        Self::new(name, Arc::new(FnBody(f)))
    }

    #[inline(always)]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn state(&self) -> State {
        State::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: State) {
        self.inner.state.store(state as u8, Ordering::Release);
    }

    pub fn can_submit(&self) -> bool {
        self.state() == State::None
    }

    /// Arm the counters and move to WaitExec. The job system calls this
    /// under its queue lock when the job is queued.
    pub fn submit(&self) {
        debug_assert!(self.can_submit());
        let links = self.inner.links.lock();
        self.inner
            .prerequisite_count
            .store(links.prerequisites.len(), Ordering::Release);
        self.inner.child_count.store(0, Ordering::Release);
        drop(links);
        self.set_state(State::WaitExec);
    }

    pub fn can_exec(&self) -> bool {
        self.state() == State::WaitExec
            && self.inner.prerequisite_count.load(Ordering::Acquire) == 0
            && self.inner.body.can_exec()
    }

    /// Run the body. Non-preemptive: returns once the body has, leaving the
    /// job in WaitDone.
    pub fn exec(&self) {
        debug_assert!(self.can_exec());
        self.set_state(State::Exec);
        self.inner.body.exec(self);
        self.set_state(State::WaitDone);
    }

    pub fn can_done(&self) -> bool {
        self.state() == State::WaitDone && self.inner.child_count.load(Ordering::Acquire) == 0
    }

    /// Mark the job Done and propagate completion: every dependent loses a
    /// prerequisite, the parent (if any) loses a child.
    pub fn done(&self) {
        debug_assert!(self.can_done());
        self.set_state(State::Done);
        let mut links = self.inner.links.lock();
        for dependency in &links.dependencies {
            if let Some(dependency) = dependency.upgrade() {
                let previous = dependency.prerequisite_count.fetch_sub(1, Ordering::AcqRel);
                debug_assert!(previous > 0);
            }
        }
        if let Some(parent) = links.parent.take() {
            if let Some(parent) = parent.upgrade() {
                let previous = parent.child_count.fetch_sub(1, Ordering::AcqRel);
                debug_assert!(previous > 0);
            }
        }
    }

    /// Return a finished job to None so it can be submitted again. Refused
    /// while the job is anywhere between submission and Done.
    pub fn reset(&self) -> bool {
        match self.state() {
            State::None | State::Done => {}
            _ => return false,
        }
        let links = self.inner.links.lock();
        self.inner
            .prerequisite_count
            .store(links.prerequisites.len(), Ordering::Release);
        self.inner.child_count.store(0, Ordering::Release);
        drop(links);
        self.set_state(State::None);
        true
    }

    /// Declare that `other` must be Done before this job can start.
    ///
    /// Both jobs must still be in None. The edge is refused when it would
    /// close a cycle, and when `other` already is a prerequisite of this
    /// job, directly or through another prerequisite.
    pub fn add_prerequisite(&self, other: &Job) -> bool {
        if self.state() != State::None || other.state() != State::None {
            return false;
        }
        if other.reaches(self) || self.reaches(other) {
            return false;
        }
        self.inner.links.lock().prerequisites.push(other.clone());
        other
            .inner
            .links
            .lock()
            .dependencies
            .push(Arc::downgrade(&self.inner));
        self.inner.prerequisite_count.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Walk the transitive prerequisite closure looking for `target`.
    fn reaches(&self, target: &Job) -> bool {
        if self == target {
            return true;
        }
        let links = self.inner.links.lock();
        links
            .prerequisites
            .iter()
            .any(|prerequisite| prerequisite.reaches(target))
    }

    /// Attach `other` as an in-flight child of this job. Only valid while
    /// this job is executing; the caller still has to hand the child to the
    /// job system, normally with
    /// [`JobSystem::insert_job`](crate::JobSystem::insert_job).
    pub fn add_child(&self, other: &Job) -> bool {
        if self.state() != State::Exec || other.state() != State::None {
            return false;
        }
        other.inner.links.lock().parent = Some(Arc::downgrade(&self.inner));
        self.inner.child_count.fetch_add(1, Ordering::AcqRel);
        true
    }
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Job {}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(name: &str) -> Job {
        Job::from_fn(name, |_: &Job| {})
    }

    #[test]
    fn lifecycle() {
        let job = noop("job");
        assert_eq!(State::None, job.state());
        assert!(job.can_submit());

        job.submit();
        assert_eq!(State::WaitExec, job.state());
        assert!(!job.can_submit());
        assert!(job.can_exec());

        job.exec();
        assert_eq!(State::WaitDone, job.state());
        assert!(job.can_done());

        job.done();
        assert_eq!(State::Done, job.state());

        assert!(job.reset());
        assert_eq!(State::None, job.state());
    }

    #[test]
    fn prerequisites_gate_execution() {
        let a = noop("a");
        let b = noop("b");
        assert!(b.add_prerequisite(&a));

        a.submit();
        b.submit();
        assert!(!b.can_exec());

        a.exec();
        assert!(!b.can_exec());
        a.done();
        assert!(b.can_exec());
    }

    #[test]
    fn cycles_and_duplicates_are_refused() {
        let a = noop("a");
        let b = noop("b");
        let c = noop("c");
        assert!(b.add_prerequisite(&a));
        assert!(c.add_prerequisite(&b));

        assert!(!a.add_prerequisite(&a));
        assert!(!a.add_prerequisite(&c));
        assert!(!b.add_prerequisite(&c));
        assert!(!c.add_prerequisite(&b));
        assert!(!c.add_prerequisite(&a));
    }

    #[test]
    fn edges_are_frozen_once_submitted() {
        let a = noop("a");
        let b = noop("b");
        a.submit();
        assert!(!b.add_prerequisite(&a));
        assert!(!a.add_prerequisite(&b));
        assert!(!a.reset());
    }

    #[test]
    fn children_gate_completion() {
        let slot = Arc::new(Mutex::new(None));
        let parent = Job::from_fn("parent", {
            let slot = slot.clone();
            move |job: &Job| {
                let child = Job::from_fn("child", |_: &Job| {});
                assert!(job.add_child(&child));
                *slot.lock() = Some(child);
            }
        });

        parent.submit();
        parent.exec();
        assert!(!parent.can_done());

        let child = slot.lock().take().unwrap();
        child.submit();
        child.exec();
        child.done();

        assert!(parent.can_done());
        parent.done();
        assert_eq!(State::Done, parent.state());
    }

    #[test]
    fn add_child_requires_an_executing_parent() {
        let parent = noop("parent");
        let child = noop("child");
        assert!(!parent.add_child(&child));
    }

    #[test]
    fn reset_reseeds_the_prerequisite_count() {
        let a = noop("a");
        let b = noop("b");
        assert!(b.add_prerequisite(&a));

        for _ in 0..3 {
            assert!(a.reset());
            assert!(b.reset());
            a.submit();
            b.submit();
            assert!(!b.can_exec());
            a.exec();
            a.done();
            assert!(b.can_exec());
            b.exec();
            b.done();
        }
    }
}
