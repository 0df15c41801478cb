//! Runtime configuration.
//!
//! Configuration is thread-local, like the rest of the reactive state: every
//! thread that hosts a reactive graph has its own settings. The defaults match
//! normal batched operation; tests usually flip [`Config::async_mode`] off to
//! make flushes run inline.

use std::cell::RefCell;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default number of times a watcher may re-queue itself within one flush.
pub const DEFAULT_MAX_UPDATE_COUNT: u32 = 100;

/// Settings for the reactive core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Batch watcher runs into a flush on the next tick. When false, every
    /// queued watcher flushes immediately and subscribers are notified in
    /// ascending id order.
    pub async_mode: bool,

    /// Re-entries allowed per watcher per flush before the flush is aborted.
    pub max_update_count: u32,

    /// Suppress forwarding of warnings to the installed warn handler.
    /// Warnings are still emitted through `tracing`.
    pub silent: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            async_mode: true,
            max_update_count: DEFAULT_MAX_UPDATE_COUNT,
            silent: false,
        }
    }
}

impl Config {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

thread_local! {
    static CONFIG: RefCell<Config> = RefCell::new(Config::default());
}

/// Current configuration for this thread.
pub fn get() -> Config {
    CONFIG.with(|c| c.borrow().clone())
}

/// Replace the configuration for this thread.
pub fn set(config: Config) {
    CONFIG.with(|c| *c.borrow_mut() = config);
}

/// Modify the configuration in place.
pub fn update(f: impl FnOnce(&mut Config)) {
    CONFIG.with(|c| f(&mut c.borrow_mut()));
}

pub(crate) fn async_mode() -> bool {
    CONFIG.with(|c| c.borrow().async_mode)
}

pub(crate) fn max_update_count() -> u32 {
    CONFIG.with(|c| c.borrow().max_update_count)
}

pub(crate) fn silent() -> bool {
    CONFIG.with(|c| c.borrow().silent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert!(config.async_mode);
        assert_eq!(config.max_update_count, 100);
        assert!(!config.silent);
    }

    #[test]
    fn from_json_fills_missing_fields() {
        let config = Config::from_json(r#"{ "async_mode": false }"#).unwrap();
        assert!(!config.async_mode);
        assert_eq!(config.max_update_count, DEFAULT_MAX_UPDATE_COUNT);
    }

    #[test]
    fn from_json_rejects_garbage() {
        assert!(Config::from_json("not json").is_err());
    }

    #[test]
    fn update_is_thread_local() {
        update(|c| c.max_update_count = 7);
        assert_eq!(get().max_update_count, 7);

        let other = std::thread::spawn(|| get().max_update_count).join().unwrap();
        assert_eq!(other, DEFAULT_MAX_UPDATE_COUNT);

        set(Config::default());
    }
}
