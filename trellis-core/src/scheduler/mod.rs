//! Update Scheduling
//!
//! Watchers that are not lazy or sync do not re-run the moment a dependency
//! changes. They are queued, and the queue is flushed once on the next tick,
//! so that any number of writes in one turn causes at most one run per
//! watcher.
//!
//! - [`queue`]: the update queue and its flush.
//! - [`tick`]: deferral to the next turn of the host's event loop.

pub mod queue;
pub mod tick;

pub use queue::{
    clear_flush_hooks, flush_scheduler_queue, is_flushing, is_waiting, on_flushed, queue_len,
    queue_watcher, FlushHook, FlushReport,
};
pub use tick::{
    flush_callbacks, next_tick, next_tick_async, pending, run_pending, run_until_idle,
    set_task_scheduler, LocalSetScheduler, Task, TaskScheduler,
};
