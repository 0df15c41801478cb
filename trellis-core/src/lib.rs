//! Trellis Core
//!
//! This crate provides the observable-state engine behind the Trellis UI
//! runtime. It implements:
//!
//! - Dynamic values whose reads and writes can be observed
//! - Fine-grained dependency tracking between state and derived work
//! - Watchers, computed values, and explicit watches
//! - A batching scheduler that runs each stale watcher once per tick
//!
//! Rendering, templates, and component wiring live elsewhere; to this crate a
//! render function is just a watcher whose getter reads state.
//!
//! # Architecture
//!
//! - `reactive`: values, dependency nodes, instrumentation, and watchers
//! - `scheduler`: the update queue and the tick primitive
//! - `config`: thread-local runtime settings
//! - `diagnostics`: warnings and error reporting hooks
//! - `error`: the crate's error type
//!
//! # Example
//!
//! ```rust
//! use trellis_core::reactive::{Owner, Value, WatchOptions};
//! use trellis_core::scheduler;
//!
//! let state = Value::object([("count", Value::from(0))]);
//! let owner = Owner::with_state("counter", state.clone());
//!
//! owner
//!     .watch("count", |new, old| {
//!         println!("count: {old:?} -> {new:?}");
//!         Ok(())
//!     }, WatchOptions::default())
//!     .unwrap();
//!
//! let count = state.as_object().unwrap();
//! count.set("count", Value::from(1));
//! count.set("count", Value::from(2));
//!
//! // One batched run: prints "count: Number(0) -> Number(2)".
//! scheduler::run_until_idle();
//! ```

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod reactive;
pub mod scheduler;

pub use config::Config;
pub use error::{ReactiveError, Result};
pub use reactive::{
    del, observe, set, ArrayRef, Computed, Dep, ObjectRef, Owner, Value, WatchOptions, Watcher,
    WatcherOptions,
};
pub use scheduler::{next_tick, next_tick_async};
