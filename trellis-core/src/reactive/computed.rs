//! Computed Values
//!
//! A [`Computed`] is a cached derived value backed by a lazy watcher.
//!
//! # How Computed Values Work
//!
//! 1. Nothing runs on creation. The first [`Computed::get`] evaluates the
//!    getter and caches the result.
//!
//! 2. When a dependency changes, the backing watcher is only marked dirty.
//!    Values that are never read again are never recomputed.
//!
//! 3. Reading a computed value inside another watcher forwards the computed
//!    value's dependencies to that reader, so the reader re-runs whenever the
//!    computed value could have changed.

use std::fmt;

use super::context::ReactiveContext;
use super::owner::Owner;
use super::value::Value;
use super::watcher::{Getter, Watcher, WatcherOptions};
use crate::error::Result;

/// A lazily evaluated, cached derived value.
#[derive(Clone)]
pub struct Computed {
    watcher: Watcher,
}

impl Computed {
    pub fn new(owner: &Owner, getter: impl Into<Getter>) -> Result<Self> {
        let watcher = Watcher::new(
            owner,
            getter,
            None,
            WatcherOptions {
                lazy: true,
                ..Default::default()
            },
        )?;
        Ok(Self { watcher })
    }

    /// The current value, recomputing first if a dependency changed.
    pub fn get(&self) -> Result<Value> {
        if self.watcher.is_dirty() {
            self.watcher.evaluate()?;
        }
        if ReactiveContext::is_tracking() {
            self.watcher.depend();
        }
        Ok(self.watcher.value())
    }

    pub fn is_dirty(&self) -> bool {
        self.watcher.is_dirty()
    }

    /// The backing watcher.
    pub fn watcher(&self) -> &Watcher {
        &self.watcher
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("watcher", &self.watcher)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn sum_getter(calls: Rc<Cell<u32>>) -> Getter {
        Getter::new(move |owner| {
            calls.set(calls.get() + 1);
            let state = owner.state();
            let obj = state.as_object().expect("object state");
            let a = obj.get("a").as_f64().unwrap_or_default();
            let b = obj.get("b").as_f64().unwrap_or_default();
            Ok(Value::from(a + b))
        })
    }

    #[test]
    fn computes_lazily_and_caches() {
        let owner = Owner::with_state(
            "computed",
            Value::object([("a", Value::from(1)), ("b", Value::from(2))]),
        );
        let calls = Rc::new(Cell::new(0));
        let sum = Computed::new(&owner, sum_getter(calls.clone())).unwrap();

        assert_eq!(calls.get(), 0);
        assert!(sum.is_dirty());

        assert_eq!(sum.get().unwrap(), Value::from(3));
        assert_eq!(sum.get().unwrap(), Value::from(3));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn recomputes_only_after_change() {
        let state = Value::object([("a", Value::from(1)), ("b", Value::from(2))]);
        let owner = Owner::with_state("computed", state.clone());
        let calls = Rc::new(Cell::new(0));
        let sum = Computed::new(&owner, sum_getter(calls.clone())).unwrap();
        sum.get().unwrap();

        state.as_object().unwrap().set("a", Value::from(10));
        state.as_object().unwrap().set("a", Value::from(20));
        assert!(sum.is_dirty());
        assert_eq!(calls.get(), 1);

        assert_eq!(sum.get().unwrap(), Value::from(22));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn readers_track_through_computed() {
        let state = Value::object([("a", Value::from(1)), ("b", Value::from(2))]);
        let owner = Owner::with_state("computed", state.clone());
        let sum = Computed::new(&owner, sum_getter(Rc::new(Cell::new(0)))).unwrap();

        let seen = Rc::new(Cell::new(0.0));
        let sink = seen.clone();
        let reader = sum.clone();
        let _render = Watcher::new(
            &owner,
            Getter::new(move |_| {
                let value = reader.get()?;
                sink.set(value.as_f64().unwrap_or_default());
                Ok(value)
            }),
            None,
            WatcherOptions {
                sync: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(seen.get(), 3.0);

        state.as_object().unwrap().set("b", Value::from(5));
        assert_eq!(seen.get(), 6.0);
    }
}
