//! `LeaseScheduler` + `WorkerPool` (§4.2): a small pool of cooperative worker
//! tasks per pipeline kind, each looping claim -> run -> finish against
//! `JobStore`'s lease primitives. Lease renewal races the pipeline future via
//! `tokio::select!`, generalizing the teacher's spawn-a-background-task /
//! join-against-the-main-future shape from batched disk writes to DB lease
//! renewal (§4.2.1).

pub mod config;
pub mod pool;
pub mod scheduler;
pub mod worker;

pub use config::SchedulerConfig;
pub use pool::WorkerPool;
pub use scheduler::LeaseScheduler;
