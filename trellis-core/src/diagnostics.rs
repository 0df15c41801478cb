//! Diagnostics: developer warnings and error reporting.
//!
//! The reactive core never panics on application mistakes. Instead it emits a
//! warning (invalid watch path, refused mutation, runaway update loop) or
//! reports an error raised by application code (a failing user getter or
//! callback). Both are logged through `tracing` and forwarded to handlers the
//! host can install, so a renderer can surface them however it likes.

use std::cell::RefCell;
use std::rc::Rc;

use crate::config;
use crate::error::ReactiveError;
use crate::reactive::Owner;

/// Receives errors raised by application code during evaluation.
pub trait ErrorHandler {
    /// Handle `err`, raised while evaluating on behalf of `owner`. `info`
    /// describes where it happened (for example `callback for watcher "a.b"`).
    fn handle(&self, err: &ReactiveError, owner: Option<&Owner>, info: &str);
}

impl<F> ErrorHandler for F
where
    F: Fn(&ReactiveError, Option<&Owner>, &str),
{
    fn handle(&self, err: &ReactiveError, owner: Option<&Owner>, info: &str) {
        self(err, owner, info)
    }
}

type WarnHandler = Rc<dyn Fn(&str)>;

thread_local! {
    static ERROR_HANDLER: RefCell<Option<Rc<dyn ErrorHandler>>> = RefCell::new(None);
    static WARN_HANDLER: RefCell<Option<WarnHandler>> = RefCell::new(None);
}

/// Install the error handler for this thread, returning the previous one.
pub fn set_error_handler(handler: Option<Rc<dyn ErrorHandler>>) -> Option<Rc<dyn ErrorHandler>> {
    ERROR_HANDLER.with(|h| std::mem::replace(&mut *h.borrow_mut(), handler))
}

/// Install the warn handler for this thread, returning the previous one.
pub fn set_warn_handler(handler: Option<WarnHandler>) -> Option<WarnHandler> {
    WARN_HANDLER.with(|h| std::mem::replace(&mut *h.borrow_mut(), handler))
}

/// Emit a developer warning.
pub fn warn(message: &str) {
    tracing::warn!(target: "trellis", "{message}");

    if config::silent() {
        return;
    }
    let handler = WARN_HANDLER.with(|h| h.borrow().clone());
    if let Some(handler) = handler {
        handler(message);
    }
}

/// Report an error raised by application code.
///
/// Falls back to logging when no handler is installed.
pub fn report_error(err: &ReactiveError, owner: Option<&Owner>, info: &str) {
    let handler = ERROR_HANDLER.with(|h| h.borrow().clone());
    match handler {
        Some(handler) => handler.handle(err, owner, info),
        None => {
            let label = owner.map(|o| o.label().to_string()).unwrap_or_default();
            tracing::error!(target: "trellis", owner = %label, "error in {info}: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn warn_reaches_handler() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        set_warn_handler(Some(Rc::new(move |msg: &str| sink.borrow_mut().push(msg.to_string()))));

        warn("first");
        warn("second");

        set_warn_handler(None);
        assert_eq!(*seen.borrow(), vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn silent_suppresses_warn_handler() {
        let count = Rc::new(Cell::new(0));
        let sink = count.clone();
        set_warn_handler(Some(Rc::new(move |_: &str| sink.set(sink.get() + 1))));
        config::update(|c| c.silent = true);

        warn("hidden");

        config::set(config::Config::default());
        set_warn_handler(None);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn report_error_uses_installed_handler() {
        let infos = Rc::new(RefCell::new(Vec::new()));
        let sink = infos.clone();
        set_error_handler(Some(Rc::new(
            move |err: &ReactiveError, _owner: Option<&Owner>, info: &str| {
                sink.borrow_mut().push(format!("{info} / {err}"));
            },
        )));

        report_error(&ReactiveError::evaluation("x", "bad"), None, "render");

        set_error_handler(None);
        assert_eq!(*infos.borrow(), vec!["render / x: bad".to_string()]);
    }
}
