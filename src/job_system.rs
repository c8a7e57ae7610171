use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

use crate::job::Job;
use crate::perf::{NoopProfiler, Profiler, TagScope};

/// Errors of [`JobSystem::init`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to spawn worker thread")]
    SpawnWorker(#[source] std::io::Error),
}

/// What a scheduling step does when it finds nothing selectable.
#[derive(Clone, Copy)]
enum IdleWait {
    /// Sleep until woken, unless the system is quitting. Worker threads.
    Worker,
    /// Sleep only while jobs are still pending, so the wakeup on the last
    /// completion ends the drain. The thread inside
    /// [`JobSystem::exec_all_jobs`].
    Drain,
}

struct Shared {
    jobs: Mutex<VecDeque<Job>>,
    cond: Condvar,
    is_quit: AtomicBool,
    pending_jobs: AtomicUsize,
    started_workers: AtomicUsize,
    profiler: Arc<dyn Profiler>,
}

impl Shared {
    /// One scheduling step: pick the first job that can run or finish,
    /// advance it, or sleep when there is nothing to pick.
    fn exec_jobs_once(&self, idle: IdleWait) {
        let job = {
            let mut jobs = self.jobs.lock();
            match jobs.iter().position(|job| job.can_exec() || job.can_done()) {
                Some(index) => jobs.remove(index),
                None => {
                    let wait = match idle {
                        IdleWait::Worker => !self.is_quit.load(Ordering::Acquire),
                        IdleWait::Drain => self.pending_jobs.load(Ordering::Acquire) > 0,
                    };
                    if wait {
                        self.cond.wait(&mut jobs);
                    }
                    None
                }
            }
        };
        let Some(job) = job else { return };

        if job.can_exec() {
            log::trace!("exec {:?}", job);
            let _tag = TagScope::enter(&*self.profiler, job.name());
            job.exec();
        }
        if job.can_done() {
            job.done();
            // Decremented under the lock so a draining thread can't miss
            // the last completion between its scan and its wait.
            let _jobs = self.jobs.lock();
            self.pending_jobs.fetch_sub(1, Ordering::AcqRel);
            self.cond.notify_all();
        } else {
            // Still waiting on children; their completion broadcasts.
            self.jobs.lock().push_front(job);
        }
    }
}

fn worker(shared: Arc<Shared>, index: usize) {
    let name = format!("job thread {index}");
    shared.profiler.setup_thread(&name);
    {
        let _jobs = shared.jobs.lock();
        shared.started_workers.fetch_add(1, Ordering::AcqRel);
        shared.cond.notify_all();
    }
    log::trace!("{name}: started");
    while !shared.is_quit.load(Ordering::Acquire) {
        shared.exec_jobs_once(IdleWait::Worker);
    }
    log::trace!("{name}: stopping");
}

/// Fixed pool of worker threads draining a shared queue of [`Job`]s.
///
/// Selection walks the queue front to back, so
/// [`insert_job`](JobSystem::insert_job)ed children run before older
/// entries. There is no fairness guarantee beyond that.
pub struct JobSystem {
    shared: Arc<Shared>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl JobSystem {
    pub fn new() -> Self {
        Self::with_profiler(Arc::new(NoopProfiler))
    }

    pub fn with_profiler(profiler: Arc<dyn Profiler>) -> Self {
        Self {
            shared: Arc::new(Shared {
                jobs: Mutex::new(VecDeque::new()),
                cond: Condvar::new(),
                is_quit: AtomicBool::new(false),
                pending_jobs: AtomicUsize::new(0),
                started_workers: AtomicUsize::new(0),
                profiler,
            }),
            threads: Mutex::new(Vec::new()),
        }
    }

    /// Spawn `thread_count` workers and block until every one of them is
    /// running. On a spawn failure the workers that did start are torn down
    /// again and the system is left un-inited.
    pub fn init(&mut self, thread_count: usize) -> Result<(), Error> {
        assert!(
            self.threads.lock().is_empty(),
            "job system is already initialized"
        );
        self.shared.is_quit.store(false, Ordering::Release);
        self.shared.started_workers.store(0, Ordering::Release);

        let mut spawned = 0;
        let mut failure = None;
        for index in 0..thread_count {
            let shared = self.shared.clone();
            let builder = thread::Builder::new().name(format!("job thread {index}"));
            match builder.spawn(move || worker(shared, index)) {
                Ok(handle) => {
                    self.threads.lock().push(handle);
                    spawned += 1;
                }
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        {
            let mut jobs = self.shared.jobs.lock();
            while self.shared.started_workers.load(Ordering::Acquire) < spawned {
                self.shared.cond.wait(&mut jobs);
            }
        }

        if let Some(err) = failure {
            self.quit();
            return Err(Error::SpawnWorker(err));
        }
        log::debug!("job system running with {thread_count} workers");
        Ok(())
    }

    /// Stop and join every worker. Jobs that are mid-execution finish, the
    /// rest stay queued. Safe to call more than once; never call it from
    /// inside a job.
    pub fn quit(&mut self) {
        {
            let _jobs = self.shared.jobs.lock();
            self.shared.is_quit.store(true, Ordering::Release);
            self.shared.cond.notify_all();
        }
        let handles: Vec<_> = self.threads.lock().drain(..).collect();
        if handles.is_empty() {
            return;
        }
        for handle in handles {
            let _ = handle.join();
        }
        log::debug!("job system stopped");
    }

    /// Queue a job at the back. Refused unless the job can be submitted.
    /// Sleeping workers are not woken; that is what
    /// [`kick_jobs`](JobSystem::kick_jobs) is for.
    pub fn add_job(&self, job: &Job) -> bool {
        let mut jobs = self.shared.jobs.lock();
        if !job.can_submit() {
            return false;
        }
        job.submit();
        jobs.push_back(job.clone());
        self.shared.pending_jobs.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Queue a job at the front, so it is serviced before older entries.
    /// This is the path for children spawned by a running job.
    pub fn insert_job(&self, job: &Job) -> bool {
        let mut jobs = self.shared.jobs.lock();
        if !job.can_submit() {
            return false;
        }
        job.submit();
        jobs.push_front(job.clone());
        self.shared.pending_jobs.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Wake every worker.
    pub fn kick_jobs(&self) {
        let _jobs = self.shared.jobs.lock();
        self.shared.cond.notify_all();
    }

    /// Kick the workers and drain the queue on the calling thread as well,
    /// returning once every queued job is Done. This is what turns the
    /// submitting thread into an extra worker for the frame.
    pub fn exec_all_jobs(&self) {
        self.kick_jobs();
        while self.shared.pending_jobs.load(Ordering::Acquire) > 0 {
            self.shared.exec_jobs_once(IdleWait::Drain);
        }
    }

    /// Number of submitted jobs that have not reached Done yet.
    pub fn pending_jobs(&self) -> usize {
        self.shared.pending_jobs.load(Ordering::Acquire)
    }
}

impl Default for JobSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for JobSystem {
    fn drop(&mut self) {
        self.quit();
    }
}
