//! Watcher Implementation
//!
//! A [`Watcher`] is one piece of derived work: a render, a computed value, or a
//! user-registered watch callback. It evaluates a getter inside a reactive
//! context, remembers exactly which dependency nodes the getter read, and
//! re-evaluates when any of them changes.
//!
//! # How Watchers Work
//!
//! 1. On creation the watcher evaluates its getter once (unless it is lazy),
//!    collecting the dependency nodes it reads.
//!
//! 2. When a dependency changes, [`Watcher::update`] runs. Lazy watchers only
//!    mark themselves dirty, sync watchers re-run on the spot, and everything
//!    else is queued on the scheduler.
//!
//! 3. Every evaluation rebuilds the dependency set from scratch. Nodes that
//!    were read last time but not this time are unsubscribed, so conditional
//!    reads (`a ? b : c`) only subscribe to the branch actually taken.
//!
//! # Errors
//!
//! Errors from getters and callbacks of user watchers are reported through
//! [`diagnostics::report_error`] and the evaluation yields `Undefined`. For
//! internal watchers (renders, computed values) errors propagate to the caller.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use super::context::ReactiveContext;
use super::dep::Dep;
use super::observer::traverse;
use super::owner::{Owner, WeakOwner};
use super::value::Value;
use super::{DepId, WatcherId};
use crate::diagnostics;
use crate::error::{ReactiveError, Result};
use crate::scheduler;

/// Getter closure: evaluates against the owner and returns the watched value.
pub type GetterFn = dyn Fn(&Owner) -> Result<Value>;

/// Callback invoked with `(new_value, old_value)`.
pub type Callback = Rc<dyn Fn(&Value, &Value) -> Result<()>>;

/// Hook run by the scheduler right before a queued watcher runs.
pub type BeforeHook = Rc<dyn Fn()>;

/// What a watcher evaluates.
#[derive(Clone)]
pub enum Getter {
    /// A closure.
    Func(Rc<GetterFn>),
    /// A dot-delimited path into the owner's state, such as `"user.name"`.
    Path(String),
}

impl Getter {
    /// Wrap a closure.
    pub fn new(f: impl Fn(&Owner) -> Result<Value> + 'static) -> Self {
        Getter::Func(Rc::new(f))
    }

    /// Watch a dot-delimited path.
    pub fn path(path: impl Into<String>) -> Self {
        Getter::Path(path.into())
    }
}

impl From<&str> for Getter {
    fn from(path: &str) -> Self {
        Getter::path(path)
    }
}

impl From<String> for Getter {
    fn from(path: String) -> Self {
        Getter::Path(path)
    }
}

/// Flags for [`Watcher::new`].
#[derive(Clone, Default)]
pub struct WatcherOptions {
    /// Traverse the value after every evaluation so that changes anywhere
    /// inside it re-fire the watcher.
    pub deep: bool,
    /// Created on behalf of application code: errors are reported, not
    /// propagated.
    pub user: bool,
    /// Do not evaluate until asked; changes only mark the watcher dirty.
    pub lazy: bool,
    /// Re-run immediately on change instead of queueing.
    pub sync: bool,
    /// Run by the scheduler before each queued run.
    pub before: Option<BeforeHook>,
}

impl fmt::Debug for WatcherOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatcherOptions")
            .field("deep", &self.deep)
            .field("user", &self.user)
            .field("lazy", &self.lazy)
            .field("sync", &self.sync)
            .field("before", &self.before.is_some())
            .finish()
    }
}

pub(crate) struct WatcherInner {
    id: WatcherId,
    owner: WeakOwner,
    getter: Rc<GetterFn>,
    callback: Option<Callback>,
    expression: String,
    deep: bool,
    user: bool,
    lazy: bool,
    sync: bool,
    before: Option<BeforeHook>,

    value: RefCell<Value>,
    dirty: Cell<bool>,
    active: Cell<bool>,

    /// Dependencies from the last completed evaluation.
    deps: RefCell<Vec<Dep>>,
    dep_ids: RefCell<HashSet<DepId>>,
    /// Dependencies collected by the evaluation in flight.
    new_deps: RefCell<Vec<Dep>>,
    new_dep_ids: RefCell<HashSet<DepId>>,
}

/// A re-runnable computation with a cached value and a dependency set.
///
/// Cloning a `Watcher` yields another handle to the same computation.
#[derive(Clone)]
pub struct Watcher(Rc<WatcherInner>);

impl Watcher {
    /// Create a watcher bound to `owner` and register it there.
    ///
    /// Non-lazy watchers evaluate immediately; an error from that first
    /// evaluation of an internal watcher tears the watcher down and is
    /// returned.
    pub fn new(
        owner: &Owner,
        getter: impl Into<Getter>,
        callback: Option<Callback>,
        options: WatcherOptions,
    ) -> Result<Self> {
        let (getter, expression) = match getter.into() {
            Getter::Func(f) => (f, "<function>".to_string()),
            Getter::Path(path) => match parse_path(&path) {
                Some(g) => (g, path),
                None => {
                    diagnostics::warn(&ReactiveError::InvalidPath { path: path.clone() }.to_string());
                    let noop: Rc<GetterFn> = Rc::new(|_: &Owner| Ok(Value::Undefined));
                    (noop, path)
                }
            },
        };

        let watcher = Watcher(Rc::new(WatcherInner {
            id: WatcherId::next(),
            owner: owner.downgrade(),
            getter,
            callback,
            expression,
            deep: options.deep,
            user: options.user,
            lazy: options.lazy,
            sync: options.sync,
            before: options.before,
            value: RefCell::new(Value::Undefined),
            dirty: Cell::new(options.lazy),
            active: Cell::new(true),
            deps: RefCell::new(Vec::new()),
            dep_ids: RefCell::new(HashSet::new()),
            new_deps: RefCell::new(Vec::new()),
            new_dep_ids: RefCell::new(HashSet::new()),
        }));
        owner.register(watcher.clone());

        if !watcher.0.lazy {
            match watcher.get() {
                Ok(value) => *watcher.0.value.borrow_mut() = value,
                Err(err) => {
                    watcher.teardown();
                    return Err(err);
                }
            }
        }
        Ok(watcher)
    }

    pub fn id(&self) -> WatcherId {
        self.0.id
    }

    /// Path or `<function>`, used in diagnostics.
    pub fn expression(&self) -> &str {
        &self.0.expression
    }

    /// The cached value from the last evaluation.
    pub fn value(&self) -> Value {
        self.0.value.borrow().clone()
    }

    pub fn is_dirty(&self) -> bool {
        self.0.dirty.get()
    }

    pub fn is_active(&self) -> bool {
        self.0.active.get()
    }

    pub fn is_lazy(&self) -> bool {
        self.0.lazy
    }

    pub fn is_user(&self) -> bool {
        self.0.user
    }

    pub fn is_deep(&self) -> bool {
        self.0.deep
    }

    pub fn is_sync(&self) -> bool {
        self.0.sync
    }

    pub fn owner(&self) -> Option<Owner> {
        self.0.owner.upgrade()
    }

    /// Ids of the dependency nodes read by the last evaluation.
    pub fn dep_ids(&self) -> Vec<DepId> {
        self.0.deps.borrow().iter().map(Dep::id).collect()
    }

    pub fn dependency_count(&self) -> usize {
        self.0.deps.borrow().len()
    }

    /// Evaluate the getter, re-collecting dependencies.
    pub fn get(&self) -> Result<Value> {
        let owner = self.owner();
        let _evaluation = Evaluation::enter(self);

        let result = match &owner {
            Some(owner) => (self.0.getter)(owner),
            None => Ok(Value::Undefined),
        };
        let value = match result {
            Ok(value) => value,
            Err(err) if self.0.user => {
                let info = format!("getter for watcher \"{}\"", self.0.expression);
                diagnostics::report_error(&err.in_context(&info), owner.as_ref(), &info);
                Value::Undefined
            }
            Err(err) => return Err(err),
        };

        if self.0.deep {
            traverse(&value);
        }
        Ok(value)
    }

    /// Record a dependency read by the evaluation in flight.
    pub fn add_dep(&self, dep: &Dep) {
        let id = dep.id();
        if !self.0.new_dep_ids.borrow_mut().insert(id) {
            return;
        }
        self.0.new_deps.borrow_mut().push(dep.clone());
        if !self.0.dep_ids.borrow().contains(&id) {
            dep.add_sub(self);
        }
    }

    /// Swap in the dependencies of the evaluation that just finished and
    /// unsubscribe from nodes it no longer read.
    fn cleanup_deps(&self) {
        let new_ids = std::mem::take(&mut *self.0.new_dep_ids.borrow_mut());
        let new_deps = std::mem::take(&mut *self.0.new_deps.borrow_mut());

        let stale: SmallVec<[Dep; 4]> = self
            .0
            .deps
            .borrow()
            .iter()
            .filter(|dep| !new_ids.contains(&dep.id()))
            .cloned()
            .collect();
        for dep in &stale {
            dep.remove_sub(self);
        }

        *self.0.deps.borrow_mut() = new_deps;
        *self.0.dep_ids.borrow_mut() = new_ids;
    }

    /// React to a dependency change.
    pub fn update(&self) {
        if self.0.lazy {
            self.0.dirty.set(true);
        } else if self.0.sync {
            if let Err(err) = self.run() {
                diagnostics::report_error(&err, self.owner().as_ref(), "sync watcher");
            }
        } else {
            scheduler::queue_watcher(self.clone());
        }
    }

    /// Re-evaluate and fire the callback if the value changed.
    ///
    /// Objects always count as changed (they may have been mutated in place),
    /// as does any value of a deep watcher.
    pub fn run(&self) -> Result<()> {
        if !self.is_active() {
            return Ok(());
        }
        let value = self.get()?;
        let old = self.value();
        if value.is_identical(&old) && !value.is_object() && !self.0.deep {
            return Ok(());
        }

        *self.0.value.borrow_mut() = value.clone();
        let Some(callback) = self.0.callback.clone() else {
            return Ok(());
        };
        if self.0.user {
            let info = format!("callback for watcher \"{}\"", self.0.expression);
            invoke_with_error_handling(&callback, &value, &old, self.owner().as_ref(), &info);
            Ok(())
        } else {
            callback(&value, &old)
        }
    }

    /// Evaluate a lazy watcher and clear its dirty flag.
    pub fn evaluate(&self) -> Result<()> {
        let value = self.get()?;
        *self.0.value.borrow_mut() = value;
        self.0.dirty.set(false);
        Ok(())
    }

    /// Make the current reader depend on everything this watcher depends on.
    pub fn depend(&self) {
        let deps = self.0.deps.borrow().clone();
        for dep in &deps {
            dep.depend();
        }
    }

    /// Unsubscribe from every dependency and stop reacting. Idempotent.
    pub fn teardown(&self) {
        if !self.is_active() {
            return;
        }
        if let Some(owner) = self.owner() {
            if !owner.is_being_destroyed() {
                owner.unregister(self.id());
            }
        }
        let deps = self.0.deps.borrow().clone();
        for dep in &deps {
            dep.remove_sub(self);
        }
        self.0.active.set(false);
    }

    pub(crate) fn run_before_hook(&self) {
        if let Some(before) = &self.0.before {
            before();
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<WatcherInner> {
        Rc::downgrade(&self.0)
    }

    pub(crate) fn upgrade(weak: &Weak<WatcherInner>) -> Option<Self> {
        weak.upgrade().map(Watcher)
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.0.id)
            .field("expression", &self.0.expression)
            .field("dirty", &self.0.dirty.get())
            .field("active", &self.0.active.get())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

/// Scope of one evaluation: the watcher is the current reader while it lives,
/// and its dependency sets are reconciled when it ends, however it ends.
struct Evaluation<'a> {
    watcher: &'a Watcher,
    _context: ReactiveContext,
}

impl<'a> Evaluation<'a> {
    fn enter(watcher: &'a Watcher) -> Self {
        Self {
            watcher,
            _context: ReactiveContext::enter(Some(watcher.clone())),
        }
    }
}

impl Drop for Evaluation<'_> {
    fn drop(&mut self) {
        self.watcher.cleanup_deps();
    }
}

/// Call a user callback, reporting rather than propagating its error.
pub(crate) fn invoke_with_error_handling(
    callback: &Callback,
    value: &Value,
    old: &Value,
    owner: Option<&Owner>,
    info: &str,
) {
    if let Err(err) = callback(value, old) {
        diagnostics::report_error(&err.in_context(info), owner, info);
    }
}

fn is_path_char(c: char) -> bool {
    c.is_alphabetic() || c.is_ascii_digit() || matches!(c, '.' | '$' | '_')
}

/// Compile a dot-delimited path into a getter, or `None` if the path contains
/// anything besides letters, digits, `$`, `_`, and dots.
fn parse_path(path: &str) -> Option<Rc<GetterFn>> {
    if !path.chars().all(is_path_char) {
        return None;
    }
    let segments: SmallVec<[String; 4]> = path.split('.').map(str::to_string).collect();

    let getter: Rc<GetterFn> = Rc::new(move |owner: &Owner| {
        let mut current = owner.state();
        for segment in &segments {
            current = match &current {
                Value::Object(obj) => obj.get(segment),
                Value::Array(arr) => match segment.parse::<usize>() {
                    Ok(index) => arr.get(index),
                    Err(_) if segment == "length" => Value::from(arr.len()),
                    Err(_) => Value::Undefined,
                },
                _ => return Ok(Value::Undefined),
            };
        }
        Ok(current)
    });
    Some(getter)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
