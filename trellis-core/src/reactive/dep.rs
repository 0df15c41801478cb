//! Dependency Nodes
//!
//! A [`Dep`] is the smallest unit of subscribable state. Every reactive
//! property owns one, and every reactive container owns one more that stands
//! for its shape (keys added or removed, array length and order).
//!
//! # How Dependency Nodes Work
//!
//! 1. When a reactive property is read while a watcher is evaluating, the
//!    property calls [`Dep::depend`], which hands the node to the current
//!    watcher. The watcher decides whether to subscribe.
//!
//! 2. When the property is written, it calls [`Dep::notify`], which tells
//!    every subscriber it became stale.
//!
//! Subscribers are kept in insertion order and held weakly, so a dependency
//! node never keeps a watcher alive.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::context::ReactiveContext;
use super::watcher::{Watcher, WatcherInner};
use super::{DepId, WatcherId};
use crate::config;

struct DepInner {
    id: DepId,
    subs: RefCell<IndexMap<WatcherId, Weak<WatcherInner>>>,
}

/// A dependency node.
///
/// Cloning a `Dep` yields another handle to the same node.
#[derive(Clone)]
pub struct Dep(Rc<DepInner>);

impl Dep {
    pub fn new() -> Self {
        Self(Rc::new(DepInner {
            id: DepId::next(),
            subs: RefCell::new(IndexMap::new()),
        }))
    }

    pub fn id(&self) -> DepId {
        self.0.id
    }

    /// Subscribe a watcher. Subscribing twice is a no-op.
    pub fn add_sub(&self, watcher: &Watcher) {
        self.0
            .subs
            .borrow_mut()
            .entry(watcher.id())
            .or_insert_with(|| watcher.downgrade());
    }

    /// Unsubscribe a watcher.
    pub fn remove_sub(&self, watcher: &Watcher) {
        self.0.subs.borrow_mut().shift_remove(&watcher.id());
    }

    /// Whether the watcher with `id` is subscribed.
    pub fn has_sub(&self, id: WatcherId) -> bool {
        self.0.subs.borrow().contains_key(&id)
    }

    /// Register this node with the current reader, if there is one.
    pub fn depend(&self) {
        if let Some(target) = ReactiveContext::current() {
            target.add_dep(self);
        }
    }

    /// Tell every subscriber that this node changed.
    ///
    /// The subscriber list is snapshotted first: updating a subscriber can
    /// subscribe or unsubscribe watchers on this same node.
    pub fn notify(&self) {
        let mut subs: SmallVec<[Watcher; 8]> = {
            let mut map = self.0.subs.borrow_mut();
            map.retain(|_, weak| weak.strong_count() > 0);
            map.values().filter_map(Watcher::upgrade).collect()
        };

        if !config::async_mode() {
            // Unbatched: the scheduler does not sort, so fire in creation order.
            subs.sort_by_key(Watcher::id);
        }

        tracing::trace!(dep = self.0.id.raw(), subscribers = subs.len(), "notify");
        for sub in subs {
            sub.update();
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.0
            .subs
            .borrow()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.0.id)
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::reactive::{Getter, Owner, Value, WatcherOptions};
    use std::cell::RefCell;

    fn sync_watcher(owner: &Owner, dep: &Dep, log: &Rc<RefCell<Vec<&'static str>>>, name: &'static str) -> Watcher {
        let dep = dep.clone();
        let getter_log = log.clone();
        let options = WatcherOptions {
            sync: true,
            ..Default::default()
        };
        Watcher::new(
            owner,
            Getter::new(move |_| {
                dep.depend();
                getter_log.borrow_mut().push(name);
                Ok(Value::Undefined)
            }),
            None,
            options,
        )
        .unwrap()
    }

    #[test]
    fn depend_subscribes_current_reader_once() {
        let owner = Owner::new("dep");
        let dep = Dep::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let watcher = sync_watcher(&owner, &dep, &log, "w");

        assert!(dep.has_sub(watcher.id()));
        assert_eq!(dep.subscriber_count(), 1);

        // Re-subscribing is idempotent.
        dep.add_sub(&watcher);
        assert_eq!(dep.subscriber_count(), 1);
    }

    #[test]
    fn depend_without_reader_is_noop() {
        let dep = Dep::new();
        dep.depend();
        assert_eq!(dep.subscriber_count(), 0);
    }

    #[test]
    fn notify_reaches_subscribers() {
        let owner = Owner::new("dep");
        let dep = Dep::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let _w = sync_watcher(&owner, &dep, &log, "w");

        dep.notify();
        dep.notify();
        assert_eq!(*log.borrow(), vec!["w", "w", "w"]);
    }

    #[test]
    fn unbatched_notify_orders_by_id() {
        config::update(|c| c.async_mode = false);

        let owner = Owner::new("dep");
        let dep = Dep::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let first = sync_watcher(&owner, &dep, &log, "first");
        let second = sync_watcher(&owner, &dep, &log, "second");

        // Re-insert the first watcher at the end of the subscriber list.
        dep.remove_sub(&first);
        dep.add_sub(&first);
        log.borrow_mut().clear();

        dep.notify();
        config::set(Config::default());

        assert!(first.id() < second.id());
        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn subscriber_added_during_notify_waits_for_next_change() {
        let owner = Owner::new("dep");
        let dep = Dep::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let spawned: Rc<RefCell<Option<Watcher>>> = Rc::new(RefCell::new(None));

        let getter_dep = dep.clone();
        let getter_log = log.clone();
        let spawn_owner = owner.clone();
        let spawn_dep = dep.clone();
        let spawn_log = log.clone();
        let slot = spawned.clone();
        let _parent = Watcher::new(
            &owner,
            Getter::new(move |_| {
                getter_dep.depend();
                getter_log.borrow_mut().push("parent");
                Ok(Value::array([]))
            }),
            Some(Rc::new(move |_: &Value, _: &Value| {
                if slot.borrow().is_none() {
                    let child = sync_watcher(&spawn_owner, &spawn_dep, &spawn_log, "child");
                    *slot.borrow_mut() = Some(child);
                }
                Ok(())
            })),
            WatcherOptions {
                sync: true,
                ..Default::default()
            },
        )
        .unwrap();
        log.borrow_mut().clear();

        dep.notify();
        // The child evaluated once on creation and was not reached by the
        // notification that created it.
        assert_eq!(*log.borrow(), vec!["parent", "child"]);
        assert_eq!(dep.subscriber_count(), 2);

        dep.notify();
        assert_eq!(*log.borrow(), vec!["parent", "child", "parent", "child"]);
    }

    #[test]
    fn dropped_watchers_are_pruned() {
        let owner = Owner::new("dep");
        let dep = Dep::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let watcher = sync_watcher(&owner, &dep, &log, "w");

        watcher.teardown();
        drop(watcher);
        drop(owner);

        assert_eq!(dep.subscriber_count(), 0);
        dep.notify();
    }
}
