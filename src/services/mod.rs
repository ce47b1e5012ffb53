//! Long-running workers: the catch-up scheduler, the consumer pool and
//! the queue cleaner. Each accepts a cancellation token and returns at
//! the next loop boundary on shutdown.

pub mod queue_cleaner;
pub mod relayer;
pub mod scheduler;

pub use queue_cleaner::QueueCleaner;
pub use relayer::Relayer;
pub use scheduler::Scheduler;
