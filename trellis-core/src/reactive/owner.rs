//! Owner Contexts
//!
//! An [`Owner`] is the context watchers are bound to: it holds the root state
//! that dotted watch paths resolve against, and a registry of every watcher
//! created on its behalf. Destroying the owner tears all of them down.
//!
//! # How It Works
//!
//! 1. `Owner::with_state` observes the state as a root. Root state refuses new
//!    keys through [`set`](super::set) because nothing could be subscribed to
//!    them yet.
//!
//! 2. Each [`Watcher`] registers itself with its owner on creation and
//!    unregisters on teardown. The registry holds watchers strongly; watchers
//!    only hold their owner weakly.
//!
//! 3. [`Owner::destroy`] marks the owner as being destroyed (so watchers do not
//!    unregister one by one while the registry is being drained), tears every
//!    watcher down, and releases the root state.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::computed::Computed;
use super::context::ReactiveContext;
use super::observer::observe;
use super::value::Value;
use super::watcher::{invoke_with_error_handling, Callback, Getter, Watcher, WatcherOptions};
use super::WatcherId;
use crate::error::Result;

struct OwnerInner {
    label: String,
    state: Value,
    watchers: RefCell<Vec<Watcher>>,
    being_destroyed: Cell<bool>,
    destroyed: Cell<bool>,
}

/// Context that watchers are bound to.
///
/// Cloning an `Owner` yields another handle to the same context.
#[derive(Clone)]
pub struct Owner(Rc<OwnerInner>);

/// Non-owning handle held by watchers.
#[derive(Clone)]
pub(crate) struct WeakOwner(Weak<OwnerInner>);

impl WeakOwner {
    pub(crate) fn upgrade(&self) -> Option<Owner> {
        self.0.upgrade().map(Owner)
    }
}

/// Options for [`Owner::watch`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WatchOptions {
    /// Fire on changes anywhere inside the watched value.
    pub deep: bool,
    /// Fire on every change instead of once per flush.
    pub sync: bool,
    /// Fire once right away with `(value, Undefined)`.
    pub immediate: bool,
}

/// Handle returned by [`Owner::watch`].
#[derive(Debug, Clone)]
pub struct WatchHandle {
    watcher: Watcher,
}

impl WatchHandle {
    /// Stop watching. Idempotent.
    pub fn unwatch(&self) {
        self.watcher.teardown();
    }

    pub fn watcher(&self) -> &Watcher {
        &self.watcher
    }
}

impl Owner {
    /// An owner with no state.
    pub fn new(label: impl Into<String>) -> Self {
        Self::from_parts(label.into(), Value::Undefined)
    }

    /// An owner whose state is observed as a root.
    pub fn with_state(label: impl Into<String>, state: Value) -> Self {
        observe(&state, true);
        Self::from_parts(label.into(), state)
    }

    fn from_parts(label: String, state: Value) -> Self {
        tracing::debug!(target: "trellis", owner = %label, "owner created");
        Self(Rc::new(OwnerInner {
            label,
            state,
            watchers: RefCell::new(Vec::new()),
            being_destroyed: Cell::new(false),
            destroyed: Cell::new(false),
        }))
    }

    pub fn label(&self) -> &str {
        &self.0.label
    }

    /// The root state.
    pub fn state(&self) -> Value {
        self.0.state.clone()
    }

    /// Number of live watchers registered here.
    pub fn watcher_count(&self) -> usize {
        self.0.watchers.borrow().len()
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.get()
    }

    /// Watch `getter` and call `callback` with `(new, old)` when it changes.
    ///
    /// Errors raised by the getter or the callback are reported, not returned.
    pub fn watch(
        &self,
        getter: impl Into<Getter>,
        callback: impl Fn(&Value, &Value) -> Result<()> + 'static,
        options: WatchOptions,
    ) -> Result<WatchHandle> {
        let callback: Callback = Rc::new(callback);
        let watcher = Watcher::new(
            self,
            getter,
            Some(callback.clone()),
            WatcherOptions {
                deep: options.deep,
                sync: options.sync,
                user: true,
                ..Default::default()
            },
        )?;

        if options.immediate {
            let info = format!("callback for immediate watcher \"{}\"", watcher.expression());
            let value = watcher.value();
            ReactiveContext::untracked(|| {
                invoke_with_error_handling(&callback, &value, &Value::Undefined, Some(self), &info);
            });
        }
        Ok(WatchHandle { watcher })
    }

    /// A lazily evaluated, cached derived value.
    pub fn computed(&self, getter: impl Into<Getter>) -> Result<Computed> {
        Computed::new(self, getter)
    }

    /// Tear down every watcher and release the root state. Idempotent.
    pub fn destroy(&self) {
        if self.0.being_destroyed.replace(true) {
            return;
        }
        let watchers = std::mem::take(&mut *self.0.watchers.borrow_mut());
        for watcher in &watchers {
            watcher.teardown();
        }
        if let Some(observer) = self.0.state.observer() {
            observer.release_root();
        }
        self.0.destroyed.set(true);
        tracing::debug!(
            target: "trellis",
            owner = %self.0.label,
            watchers = watchers.len(),
            "owner destroyed"
        );
    }

    pub(crate) fn register(&self, watcher: Watcher) {
        self.0.watchers.borrow_mut().push(watcher);
    }

    pub(crate) fn unregister(&self, id: WatcherId) {
        self.0.watchers.borrow_mut().retain(|w| w.id() != id);
    }

    pub(crate) fn is_being_destroyed(&self) -> bool {
        self.0.being_destroyed.get()
    }

    pub(crate) fn downgrade(&self) -> WeakOwner {
        WeakOwner(Rc::downgrade(&self.0))
    }
}

impl fmt::Debug for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Owner")
            .field("label", &self.0.label)
            .field("watchers", &self.watcher_count())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics;
    use crate::error::ReactiveError;
    use crate::reactive::set;

    fn state() -> Value {
        Value::object([("a", Value::from(1)), ("b", Value::from(2))])
    }

    #[test]
    fn with_state_observes_as_root() {
        let value = state();
        let owner = Owner::with_state("root", value.clone());
        let observer = value.observer().unwrap();
        assert_eq!(observer.root_count(), 1);

        owner.destroy();
        assert_eq!(observer.root_count(), 0);
    }

    #[test]
    fn root_state_refuses_new_keys() {
        let warnings = Rc::new(RefCell::new(Vec::new()));
        let sink = warnings.clone();
        diagnostics::set_warn_handler(Some(Rc::new(move |m: &str| sink.borrow_mut().push(m.to_string()))));

        let value = state();
        let _owner = Owner::with_state("root", value.clone());
        let returned = set(&value, "c", Value::from(3));

        diagnostics::set_warn_handler(None);
        assert_eq!(returned, Value::from(3));
        assert!(!value.as_object().unwrap().has("c"));
        assert_eq!(warnings.borrow().len(), 1);
    }

    #[test]
    fn immediate_watch_fires_with_undefined_old_value() {
        let owner = Owner::with_state("watch", state());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();

        let handle = owner
            .watch(
                "a",
                move |new, old| {
                    sink.borrow_mut().push((new.clone(), old.clone()));
                    Ok(())
                },
                WatchOptions {
                    immediate: true,
                    sync: true,
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(*seen.borrow(), vec![(Value::from(1), Value::Undefined)]);
        assert!(handle.watcher().is_user());

        owner.state().as_object().unwrap().set("a", Value::from(5));
        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(seen.borrow()[1], (Value::from(5), Value::from(1)));
    }

    #[test]
    fn immediate_callback_does_not_track() {
        let owner = Owner::with_state("watch", state());
        let handle = owner
            .watch(
                "a",
                |_, _| {
                    assert!(!ReactiveContext::is_tracking());
                    Ok(())
                },
                WatchOptions {
                    immediate: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(handle.watcher().dependency_count(), 1);
    }

    #[test]
    fn immediate_callback_errors_are_reported() {
        let infos = Rc::new(RefCell::new(Vec::new()));
        let sink = infos.clone();
        diagnostics::set_error_handler(Some(Rc::new(
            move |_: &ReactiveError, _: Option<&Owner>, info: &str| sink.borrow_mut().push(info.to_string()),
        )));

        let owner = Owner::with_state("watch", state());
        let result = owner.watch(
            "b",
            |_, _| Err(ReactiveError::evaluation("cb", "bad")),
            WatchOptions {
                immediate: true,
                ..Default::default()
            },
        );
        diagnostics::set_error_handler(None);

        assert!(result.is_ok());
        assert_eq!(*infos.borrow(), vec!["callback for immediate watcher \"b\"".to_string()]);
    }

    #[test]
    fn unwatch_stops_callbacks() {
        let owner = Owner::with_state("watch", state());
        let fired = Rc::new(Cell::new(0));
        let count = fired.clone();
        let handle = owner
            .watch(
                "a",
                move |_, _| {
                    count.set(count.get() + 1);
                    Ok(())
                },
                WatchOptions {
                    sync: true,
                    ..Default::default()
                },
            )
            .unwrap();

        handle.unwatch();
        handle.unwatch();
        owner.state().as_object().unwrap().set("a", Value::from(9));
        assert_eq!(fired.get(), 0);
        assert_eq!(owner.watcher_count(), 0);
    }

    #[test]
    fn destroy_tears_down_every_watcher() {
        let value = state();
        let owner = Owner::with_state("destroy", value.clone());
        let handle = owner.watch("a", |_, _| Ok(()), WatchOptions::default()).unwrap();
        let computed = owner.computed("b").unwrap();
        assert_eq!(owner.watcher_count(), 2);

        owner.destroy();
        owner.destroy();

        assert!(owner.is_destroyed());
        assert_eq!(owner.watcher_count(), 0);
        assert!(!handle.watcher().is_active());
        assert!(!computed.watcher().is_active());
        assert_eq!(value.observer().unwrap().root_count(), 0);
    }
}
