//! Update Queue
//!
//! The queue batches watcher runs so that each watcher runs at most once per
//! flush, however many of its dependencies changed.
//!
//! # Algorithm
//!
//! 1. A changed dependency queues its watchers. A watcher that is already
//!    queued is skipped.
//!
//! 2. The first watcher queued in a turn schedules a flush on the next tick
//!    (or flushes inline when [`Config::async_mode`](crate::config::Config) is
//!    off).
//!
//! 3. The flush sorts the queue by watcher id, so that owners update before
//!    the things they created and user watchers run before the render watcher
//!    of the same owner.
//!
//! 4. The queue is walked by index, not over a snapshot: running a watcher can
//!    queue further watchers, which are slotted in by id behind the cursor and
//!    run in the same flush.
//!
//! 5. A watcher that keeps re-queueing itself is cut off after
//!    `max_update_count` re-entries, which aborts the flush.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use super::tick;
use crate::config;
use crate::diagnostics;
use crate::error::{ReactiveError, Result};
use crate::reactive::{Watcher, WatcherId};

/// Called after every flush with the watchers that ran.
pub type FlushHook = Rc<dyn Fn(&[Watcher])>;

/// Outcome of one flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Watchers in the order they ran. A watcher that re-entered the queue
    /// appears once per run.
    pub ran: Vec<WatcherId>,
    /// Set when the flush was aborted because this watcher kept re-queueing
    /// itself.
    pub runaway: Option<WatcherId>,
}

#[derive(Default)]
struct QueueState {
    queue: Vec<Watcher>,
    has: HashSet<WatcherId>,
    circular: HashMap<WatcherId, u32>,
    waiting: bool,
    flushing: bool,
    index: usize,
}

thread_local! {
    static STATE: RefCell<QueueState> = RefCell::new(QueueState::default());
    static HOOKS: RefCell<Vec<FlushHook>> = RefCell::new(Vec::new());
}

/// Queue `watcher` for the next flush. Queueing an already queued watcher is
/// a no-op.
pub fn queue_watcher(watcher: Watcher) {
    let id = watcher.id();
    let schedule = STATE.with(|state| {
        let mut state = state.borrow_mut();
        if !state.has.insert(id) {
            return false;
        }

        if state.flushing {
            // Keep the unvisited part of the queue sorted by id. A watcher
            // whose id is already behind the cursor runs next.
            let mut at = state.queue.len();
            while at > state.index + 1 && state.queue[at - 1].id() > id {
                at -= 1;
            }
            state.queue.insert(at, watcher);
        } else {
            state.queue.push(watcher);
        }
        tracing::trace!(target: "trellis", watcher = id.raw(), flushing = state.flushing, "queued");

        !std::mem::replace(&mut state.waiting, true)
    });

    if !schedule {
        return;
    }
    if config::async_mode() {
        tick::next_tick(run_flush);
    } else {
        run_flush();
    }
}

/// Flush on behalf of the tick, reporting instead of returning errors.
fn run_flush() {
    if let Err(err) = flush_scheduler_queue() {
        diagnostics::report_error(&err, None, "flush");
    }
}

/// Run every queued watcher.
///
/// Bookkeeping is reset and post-flush hooks run even when a watcher fails;
/// the failure is returned afterwards. Watchers still queued behind a failure
/// or a runaway watcher are dropped.
pub fn flush_scheduler_queue() -> Result<FlushReport> {
    let queued = STATE.with(|state| {
        let mut state = state.borrow_mut();
        if state.flushing {
            return None;
        }
        state.flushing = true;
        state.queue.sort_by_key(Watcher::id);
        Some(state.queue.len())
    });
    let Some(queued) = queued else {
        return Ok(FlushReport::default());
    };
    tracing::debug!(target: "trellis", queued, "flush start");

    let mut ran = Vec::new();
    let mut report = FlushReport::default();
    let outcome = drain(&mut ran, &mut report);

    reset_state();
    tracing::debug!(target: "trellis", ran = ran.len(), aborted = report.runaway.is_some(), "flush end");

    let hooks = HOOKS.with(|h| h.borrow().clone());
    for hook in hooks {
        hook(&ran);
    }

    outcome.map(|()| report)
}

fn drain(ran: &mut Vec<Watcher>, report: &mut FlushReport) -> Result<()> {
    let limit = config::max_update_count();
    loop {
        let next = STATE.with(|state| {
            let state = state.borrow();
            state.queue.get(state.index).cloned()
        });
        let Some(watcher) = next else {
            return Ok(());
        };
        let id = watcher.id();

        watcher.run_before_hook();
        STATE.with(|state| state.borrow_mut().has.remove(&id));
        tracing::trace!(target: "trellis", watcher = id.raw(), "run");

        let result = watcher.run();
        ran.push(watcher.clone());
        report.ran.push(id);
        result?;

        let runaway = STATE.with(|state| {
            let mut state = state.borrow_mut();
            if !state.has.contains(&id) {
                return false;
            }
            let count = state.circular.entry(id).or_insert(0);
            *count += 1;
            *count > limit
        });
        if runaway {
            let err = ReactiveError::RunawayUpdate {
                watcher: id,
                expression: watcher.expression().to_string(),
                limit,
            };
            diagnostics::warn(&err.to_string());
            report.runaway = Some(id);
            return Ok(());
        }

        STATE.with(|state| state.borrow_mut().index += 1);
    }
}

fn reset_state() {
    STATE.with(|state| {
        let mut state = state.borrow_mut();
        state.queue.clear();
        state.has.clear();
        state.circular.clear();
        state.waiting = false;
        state.flushing = false;
        state.index = 0;
    });
}

/// Register a hook called after every flush with the watchers that ran.
pub fn on_flushed(hook: impl Fn(&[Watcher]) + 'static) {
    HOOKS.with(|h| h.borrow_mut().push(Rc::new(hook)));
}

/// Remove every post-flush hook.
pub fn clear_flush_hooks() {
    HOOKS.with(|h| h.borrow_mut().clear());
}

pub fn is_flushing() -> bool {
    STATE.with(|state| state.borrow().flushing)
}

/// Whether a flush is scheduled or in progress.
pub fn is_waiting() -> bool {
    STATE.with(|state| state.borrow().waiting)
}

/// Number of watchers in the queue, run or not.
pub fn queue_len() -> usize {
    STATE.with(|state| state.borrow().queue.len())
}
