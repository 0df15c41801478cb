//! Reactive Primitives
//!
//! This module implements the dependency-tracking half of the engine: values,
//! dependency nodes, the reader stack, property instrumentation, and watchers.
//!
//! # Concepts
//!
//! ## Dependency nodes
//!
//! A [`Dep`] is a subscribable unit of state. Every reactive property owns one,
//! and every reactive container owns one more for its shape.
//!
//! ## Observed values
//!
//! [`observe`] instruments plain [`ObjectRef`]s and [`ArrayRef`]s so that reads
//! subscribe the current reader and writes notify subscribers. New keys go
//! through [`set`] and removals through [`del`]; array mutation methods notify
//! on their own.
//!
//! ## Watchers
//!
//! A [`Watcher`] evaluates a getter, records the nodes it read, and re-runs
//! when any of them changes. [`Computed`] and [`Owner::watch`] are the two
//! common shapes of watcher.
//!
//! # Implementation Notes
//!
//! Everything here is single-threaded: values are `Rc`/`RefCell` and the reader
//! stack is thread-local. Re-runs are batched by [`crate::scheduler`].

mod array;
mod computed;
mod context;
mod dep;
mod id;
mod observer;
mod owner;
mod value;
mod watcher;

pub use computed::Computed;
pub use context::ReactiveContext;
pub use dep::Dep;
pub use id::{DepId, WatcherId};
pub use observer::{
    define_reactive, del, observe, set, toggle_observing, CustomSetter, DefineOptions, Key, Observer,
};
pub use owner::{Owner, WatchHandle, WatchOptions};
pub use value::{Accessor, AccessorGet, AccessorSet, ArrayRef, ObjectRef, Value};
pub use watcher::{BeforeHook, Callback, Getter, GetterFn, Watcher, WatcherOptions};
