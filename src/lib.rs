mod context;
mod job;
mod job_system;
mod perf;
mod permission;
mod task;
mod task_job;
mod task_system;
mod type_key;
mod work;

pub use context::Context;
pub use job::Job;
pub use job::JobBody;
pub use job::State;
pub use job_system::Error;
pub use job_system::JobSystem;
pub use perf::NoopProfiler;
pub use perf::Profiler;
pub use perf::TagScope;
pub use permission::Permission;
pub use task::FuncTask;
pub use task::Res;
pub use task::ResMut;
pub use task::Scratch;
pub use task::Task;
pub use task::TaskArg;
pub use task::TaskFn;
pub use task_job::TaskJob;
pub use task_system::TaskSystem;
pub use task_system::TaskSystemData;
pub use type_key::TypeKey;
pub use work::Work;
