//! Reactive Context
//!
//! The reactive context tracks which watcher is currently evaluating. This
//! enables automatic dependency tracking: when a reactive property is read, the
//! dependency node registers itself with the current watcher.
//!
//! # Implementation
//!
//! We use a thread-local stack of readers. Entering a context pushes a watcher
//! (or an explicit "no reader" entry, used to read state without tracking);
//! dropping the returned guard pops it. Because popping happens in `Drop`, the
//! stack is restored on every exit path, including early returns through `?`
//! and unwinding panics.
//!
//! This design supports nested evaluation (a computed value read while a render
//! watcher is evaluating): the enclosing reader becomes current again as soon
//! as the inner one finishes.

use std::cell::RefCell;

use super::watcher::Watcher;
use super::WatcherId;

thread_local! {
    static TARGET_STACK: RefCell<Vec<Option<Watcher>>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops the reader when dropped.
#[must_use = "the reader is popped as soon as the guard is dropped"]
pub struct ReactiveContext {
    expected: Option<WatcherId>,
}

impl ReactiveContext {
    /// Make `target` the current reader until the guard is dropped.
    ///
    /// Passing `None` suspends tracking for nested code.
    pub fn enter(target: Option<Watcher>) -> Self {
        let expected = target.as_ref().map(Watcher::id);
        TARGET_STACK.with(|stack| stack.borrow_mut().push(target));
        Self { expected }
    }

    /// The current reader, if any.
    pub fn current() -> Option<Watcher> {
        TARGET_STACK.with(|stack| stack.borrow().last().cloned().flatten())
    }

    /// Whether reads are currently being tracked.
    pub fn is_tracking() -> bool {
        TARGET_STACK.with(|stack| matches!(stack.borrow().last(), Some(Some(_))))
    }

    /// Number of entries on the stack, tracked or not.
    pub fn depth() -> usize {
        TARGET_STACK.with(|stack| stack.borrow().len())
    }

    /// Run `f` with tracking suspended.
    pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
        let _ctx = Self::enter(None);
        f()
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let popped = TARGET_STACK.with(|stack| stack.borrow_mut().pop());

        // Mismatched guards would mis-attribute every later read.
        if let Some(entry) = popped {
            debug_assert_eq!(
                entry.as_ref().map(Watcher::id),
                self.expected,
                "ReactiveContext mismatch"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Getter, Owner, Value, WatcherOptions};

    fn lazy_watcher(owner: &Owner) -> Watcher {
        let options = WatcherOptions {
            lazy: true,
            ..Default::default()
        };
        Watcher::new(owner, Getter::new(|_| Ok(Value::Undefined)), None, options).unwrap()
    }

    #[test]
    fn context_tracks_reader() {
        let owner = Owner::new("ctx");
        let w = lazy_watcher(&owner);

        assert!(!ReactiveContext::is_tracking());
        assert!(ReactiveContext::current().is_none());

        {
            let _ctx = ReactiveContext::enter(Some(w.clone()));
            assert!(ReactiveContext::is_tracking());
            assert_eq!(ReactiveContext::current().map(|c| c.id()), Some(w.id()));
        }

        assert!(!ReactiveContext::is_tracking());
        assert_eq!(ReactiveContext::depth(), 0);
    }

    #[test]
    fn nested_contexts_restore_outer_reader() {
        let owner = Owner::new("ctx");
        let outer = lazy_watcher(&owner);
        let inner = lazy_watcher(&owner);

        let _outer_ctx = ReactiveContext::enter(Some(outer.clone()));
        {
            let _inner_ctx = ReactiveContext::enter(Some(inner.clone()));
            assert_eq!(ReactiveContext::current().map(|c| c.id()), Some(inner.id()));
        }
        assert_eq!(ReactiveContext::current().map(|c| c.id()), Some(outer.id()));
    }

    #[test]
    fn untracked_hides_reader() {
        let owner = Owner::new("ctx");
        let w = lazy_watcher(&owner);
        let _ctx = ReactiveContext::enter(Some(w));

        let tracking_inside = ReactiveContext::untracked(ReactiveContext::is_tracking);
        assert!(!tracking_inside);
        assert!(ReactiveContext::is_tracking());
    }

    #[test]
    fn stack_restored_after_panic() {
        let result = std::panic::catch_unwind(|| {
            let _ctx = ReactiveContext::enter(None);
            panic!("getter failed");
        });
        assert!(result.is_err());
        assert_eq!(ReactiveContext::depth(), 0);
    }
}
