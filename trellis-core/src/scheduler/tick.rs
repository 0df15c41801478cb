//! Deferred Callbacks
//!
//! [`next_tick`] defers work to the next turn of the host's event loop. All
//! callbacks queued during one turn run together, in order, as one batch.
//!
//! The crate does not own an event loop. The host decides what "later" means
//! by installing a [`TaskScheduler`]:
//!
//! - With no scheduler installed, batches wait until the host calls
//!   [`run_pending`] or [`run_until_idle`]. This is the default and what tests
//!   use.
//! - [`LocalSetScheduler`] spawns each batch onto the current
//!   `tokio::task::LocalSet`.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;

use tokio::sync::oneshot;

/// A deferred callback.
pub type Task = Box<dyn FnOnce()>;

/// Runs a task on a later turn of the host's event loop.
pub trait TaskScheduler {
    fn schedule(&self, task: Task);
}

impl<F> TaskScheduler for F
where
    F: Fn(Task),
{
    fn schedule(&self, task: Task) {
        self(task)
    }
}

/// Spawns batches onto the current `tokio::task::LocalSet`.
///
/// Scheduling outside of a `LocalSet` context panics, as
/// `tokio::task::spawn_local` does.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalSetScheduler;

impl TaskScheduler for LocalSetScheduler {
    fn schedule(&self, task: Task) {
        tokio::task::spawn_local(async move { task() });
    }
}

thread_local! {
    static CALLBACKS: RefCell<Vec<Task>> = RefCell::new(Vec::new());
    static PENDING: Cell<bool> = const { Cell::new(false) };
    static SCHEDULER: RefCell<Option<Rc<dyn TaskScheduler>>> = RefCell::new(None);
}

/// Install the task scheduler for this thread, returning the previous one.
pub fn set_task_scheduler(scheduler: Option<Rc<dyn TaskScheduler>>) -> Option<Rc<dyn TaskScheduler>> {
    SCHEDULER.with(|s| std::mem::replace(&mut *s.borrow_mut(), scheduler))
}

/// Run `callback` on the next tick.
pub fn next_tick(callback: impl FnOnce() + 'static) {
    CALLBACKS.with(|c| c.borrow_mut().push(Box::new(callback)));

    if PENDING.with(|p| p.replace(true)) {
        return;
    }
    let scheduler = SCHEDULER.with(|s| s.borrow().clone());
    if let Some(scheduler) = scheduler {
        scheduler.schedule(Box::new(flush_callbacks));
    }
}

/// Resolves after the batch that is queued now has run.
pub fn next_tick_async() -> impl Future<Output = ()> {
    let (tx, rx) = oneshot::channel();
    next_tick(move || {
        let _ = tx.send(());
    });
    async move {
        let _ = rx.await;
    }
}

/// Run the current batch. Callbacks queued while it runs form the next batch.
pub fn flush_callbacks() {
    PENDING.with(|p| p.set(false));
    let batch = CALLBACKS.with(|c| std::mem::take(&mut *c.borrow_mut()));
    tracing::trace!(target: "trellis", callbacks = batch.len(), "tick");
    for callback in batch {
        callback();
    }
}

/// Whether a batch is waiting to run.
pub fn pending() -> bool {
    PENDING.with(Cell::get)
}

/// Run the waiting batch, if any. Returns whether one ran.
pub fn run_pending() -> bool {
    if !pending() {
        return false;
    }
    flush_callbacks();
    true
}

/// Run batches until none are left. Returns how many ran.
pub fn run_until_idle() -> usize {
    let mut batches = 0;
    while run_pending() {
        batches += 1;
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callbacks_run_in_order_as_one_batch() {
        let log = Rc::new(RefCell::new(Vec::new()));
        for n in 0..3 {
            let log = log.clone();
            next_tick(move || log.borrow_mut().push(n));
        }

        assert!(pending());
        assert!(log.borrow().is_empty());
        assert!(run_pending());
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert!(!run_pending());
    }

    #[test]
    fn callbacks_queued_during_a_batch_run_next_turn() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let outer = log.clone();
        next_tick(move || {
            outer.borrow_mut().push("first");
            let inner = outer.clone();
            next_tick(move || inner.borrow_mut().push("second"));
        });

        run_pending();
        assert_eq!(*log.borrow(), vec!["first"]);
        assert!(pending());
        assert_eq!(run_until_idle(), 1);
        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn installed_scheduler_receives_one_task_per_batch() {
        let tasks: Rc<RefCell<Vec<Task>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = tasks.clone();
        set_task_scheduler(Some(Rc::new(move |task: Task| sink.borrow_mut().push(task))));

        let ran = Rc::new(Cell::new(0));
        for _ in 0..2 {
            let ran = ran.clone();
            next_tick(move || ran.set(ran.get() + 1));
        }
        set_task_scheduler(None);

        assert_eq!(tasks.borrow().len(), 1);
        let task = tasks.borrow_mut().pop().unwrap();
        task();
        assert_eq!(ran.get(), 2);
        assert!(!pending());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn async_tick_resolves_under_local_set() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                set_task_scheduler(Some(Rc::new(LocalSetScheduler)));
                let ran = Rc::new(Cell::new(false));
                let flag = ran.clone();
                next_tick(move || flag.set(true));

                next_tick_async().await;
                set_task_scheduler(None);
                assert!(ran.get());
            })
            .await;
    }
}
