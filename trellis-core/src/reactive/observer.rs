//! Reactive Property Instrumentation
//!
//! [`observe`] turns plain objects and arrays into reactive containers. Each
//! own enumerable property of an observed object is replaced by a reactive slot
//! that closes over the current value, a dedicated [`Dep`], and the child
//! [`Observer`] of that value when it is itself a container.
//!
//! # How Instrumentation Works
//!
//! 1. Reading a reactive property while a watcher evaluates subscribes the
//!    watcher to the property's node, to the child container's structural node,
//!    and (for arrays) to the structural node of every nested reactive element.
//!
//! 2. Writing a reactive property stores the value, makes it reactive if it is
//!    a container, and notifies the property's node. Writing a value identical
//!    to the current one (or NaN over NaN) does nothing.
//!
//! 3. Shape changes go through [`set`] and [`del`], which notify the
//!    container's structural node. Plain assignment of a new key is not
//!    observable.
//!
//! The observer is attached to the value before its children are walked, so an
//! object graph that contains itself is wrapped exactly once.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use super::context::ReactiveContext;
use super::dep::Dep;
use super::value::{Accessor, AccessorGet, AccessorSet, ArrayRef, ObjectRef, Slot, Value};
use crate::diagnostics;
use crate::error::ReactiveError;

thread_local! {
    static SHOULD_OBSERVE: Cell<bool> = const { Cell::new(true) };
}

/// Enable or disable creation of new reactive containers on this thread.
///
/// Values that are already reactive stay reactive; this only affects values
/// seen for the first time while disabled.
pub fn toggle_observing(enabled: bool) {
    SHOULD_OBSERVE.with(|s| s.set(enabled));
}

fn should_observe() -> bool {
    SHOULD_OBSERVE.with(Cell::get)
}

/// The reactive container attached to an observed object or array.
pub struct Observer {
    dep: Dep,
    root_count: Cell<usize>,
}

impl Observer {
    fn new() -> Self {
        Self {
            dep: Dep::new(),
            root_count: Cell::new(0),
        }
    }

    /// The structural dependency node: notified when keys are added or
    /// removed, or when an array is mutated in place.
    pub fn dep(&self) -> &Dep {
        &self.dep
    }

    /// How many owners use this value as their root state.
    pub fn root_count(&self) -> usize {
        self.root_count.get()
    }

    pub(crate) fn release_root(&self) {
        self.root_count.set(self.root_count.get().saturating_sub(1));
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("dep", &self.dep)
            .field("root_count", &self.root_count.get())
            .finish()
    }
}

/// Make `value` reactive, returning its container.
///
/// Primitives, foreign values, raw-marked values, and non-extensible objects
/// are skipped. Observing an already reactive value returns the existing
/// container. With `as_root`, the container records one more owner using the
/// value as root state.
pub fn observe(value: &Value, as_root: bool) -> Option<Rc<Observer>> {
    let observer = match value {
        Value::Object(obj) => observe_object(obj),
        Value::Array(arr) => observe_array(arr),
        _ => None,
    }?;

    if as_root {
        observer.root_count.set(observer.root_count.get() + 1);
    }
    Some(observer)
}

fn observe_object(obj: &ObjectRef) -> Option<Rc<Observer>> {
    if let Some(existing) = obj.observer() {
        return Some(existing);
    }
    if !should_observe() || !obj.is_extensible() || obj.is_raw() {
        return None;
    }

    let observer = Rc::new(Observer::new());
    obj.attach_observer(observer.clone());
    for key in obj.enumerable_keys() {
        define_reactive(obj, &key, None, DefineOptions::default());
    }
    Some(observer)
}

fn observe_array(arr: &ArrayRef) -> Option<Rc<Observer>> {
    if let Some(existing) = arr.observer() {
        return Some(existing);
    }
    if !should_observe() || arr.is_raw() {
        return None;
    }

    let observer = Rc::new(Observer::new());
    arr.attach_observer(observer.clone());
    let items = arr.to_vec();
    observe_items(&items);
    Some(observer)
}

/// Observe each element of a freshly inserted batch.
pub(crate) fn observe_items(items: &[Value]) {
    for item in items {
        observe(item, false);
    }
}

/// Hook invoked with the incoming value before a reactive write is applied.
pub type CustomSetter = Rc<dyn Fn(&Value)>;

/// Options for [`define_reactive`].
#[derive(Clone, Default)]
pub struct DefineOptions {
    /// Called with the new value on every effective write, before it lands.
    pub custom_setter: Option<CustomSetter>,
    /// Do not make the property's value reactive.
    pub shallow: bool,
}

/// A reactive property: value, dependency node, and child container.
pub(crate) struct ReactiveSlot {
    dep: Dep,
    value: RefCell<Value>,
    child: RefCell<Option<Rc<Observer>>>,
    getter: Option<AccessorGet>,
    setter: Option<AccessorSet>,
    custom_setter: Option<CustomSetter>,
    shallow: bool,
}

impl ReactiveSlot {
    fn current(&self) -> Value {
        match &self.getter {
            Some(getter) => getter(),
            None => self.value.borrow().clone(),
        }
    }

    pub(crate) fn get(&self) -> Value {
        let value = self.current();
        if ReactiveContext::is_tracking() {
            self.dep.depend();
            let child = self.child.borrow().clone();
            if let Some(child) = child {
                child.dep.depend();
                if let Value::Array(arr) = &value {
                    depend_array(arr);
                }
            }
        }
        value
    }

    pub(crate) fn peek(&self) -> Value {
        ReactiveContext::untracked(|| self.current())
    }

    pub(crate) fn set(&self, new_value: Value) {
        let value = self.current();
        if new_value.is_identical(&value) || (new_value.is_nan() && value.is_nan()) {
            return;
        }
        if let Some(custom_setter) = &self.custom_setter {
            custom_setter(&new_value);
        }
        // Getter without setter: the property is read-only.
        if self.getter.is_some() && self.setter.is_none() {
            return;
        }

        match &self.setter {
            Some(setter) => setter(new_value.clone()),
            None => *self.value.borrow_mut() = new_value.clone(),
        }
        let child = if self.shallow {
            None
        } else {
            observe(&new_value, false)
        };
        *self.child.borrow_mut() = child;
        self.dep.notify();
    }

    #[cfg(test)]
    pub(crate) fn dep(&self) -> &Dep {
        &self.dep
    }
}

/// Install a reactive property `key` on `obj`.
///
/// Non-configurable properties are left alone. A pre-existing accessor keeps
/// providing the value: its getter is used for reads and its setter for writes.
/// When `value` is `None`, the property's current value is used, unless the
/// property is a getter-only accessor.
pub fn define_reactive(obj: &ObjectRef, key: &str, value: Option<Value>, options: DefineOptions) {
    let existing = obj.property(key);
    if let Some(prop) = &existing {
        if !prop.configurable {
            return;
        }
    }
    let enumerable = existing.as_ref().map_or(true, |p| p.enumerable);

    let accessor = match existing.map(|p| p.slot) {
        Some(Slot::Accessor(accessor)) => Some(accessor),
        // Re-defining a reactive property chains onto the existing slot.
        Some(Slot::Reactive(inner)) => {
            let read = inner.clone();
            let write = inner;
            Some(Accessor {
                get: Some(Rc::new(move || read.get())),
                set: Some(Rc::new(move |v| write.set(v))),
            })
        }
        Some(Slot::Data(_)) | None => None,
    };
    let getter = accessor.as_ref().and_then(|a| a.get.clone());
    let setter = accessor.as_ref().and_then(|a| a.set.clone());

    let initial = match value {
        Some(v) => v,
        None if getter.is_none() || setter.is_some() => obj.get_raw(key),
        None => Value::Undefined,
    };
    let child = if options.shallow {
        None
    } else {
        observe(&initial, false)
    };

    let slot = Rc::new(ReactiveSlot {
        dep: Dep::new(),
        value: RefCell::new(initial),
        child: RefCell::new(child),
        getter,
        setter,
        custom_setter: options.custom_setter,
        shallow: options.shallow,
    });
    obj.install_slot(key, slot, enumerable);
}

/// Subscribe the current reader to every reactive element nested in `arr`.
///
/// Element reads do not go through property slots, so this is how a watcher
/// that read an array learns about changes inside its elements.
fn depend_array(arr: &ArrayRef) {
    let mut seen = HashSet::new();
    depend_array_inner(arr, &mut seen);
}

fn depend_array_inner(arr: &ArrayRef, seen: &mut HashSet<usize>) {
    if !seen.insert(arr.addr()) {
        return;
    }
    let items = arr.to_vec();
    for item in &items {
        if let Some(observer) = item.observer() {
            observer.dep.depend();
        }
        if let Value::Array(nested) = item {
            depend_array_inner(nested, seen);
        }
    }
}

/// Key for [`set`] and [`del`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Index(usize),
    Name(String),
}

impl Key {
    fn as_index(&self) -> Option<usize> {
        match self {
            Key::Index(i) => Some(*i),
            Key::Name(name) => name.parse().ok(),
        }
    }

    fn name(&self) -> String {
        match self {
            Key::Index(i) => i.to_string(),
            Key::Name(name) => name.clone(),
        }
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Index(i)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Name(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Name(s)
    }
}

fn warn_illegal(reason: String) {
    diagnostics::warn(&ReactiveError::IllegalMutation { reason }.to_string());
}

/// Set a property on `target`, adding it reactively if it does not exist.
///
/// For arrays, a numeric key assigns through `splice`, growing the array when
/// needed, so the write is observable. Returns `value`.
pub fn set(target: &Value, key: impl Into<Key>, value: Value) -> Value {
    let key = key.into();
    match target {
        Value::Array(arr) => {
            let Some(index) = key.as_index() else {
                warn_illegal(format!("cannot set non-index key \"{}\" on an array", key.name()));
                return value;
            };
            if index > arr.len() {
                let fill = index - arr.len();
                arr.with_items_mut(|items| items.extend(std::iter::repeat(Value::Undefined).take(fill)));
            }
            arr.splice(index, 1, [value.clone()]);
            value
        }
        Value::Object(obj) => {
            let name = key.name();
            if obj.has(&name) {
                obj.set(&name, value.clone());
                return value;
            }
            let observer = obj.observer();
            if observer.as_ref().is_some_and(|ob| ob.root_count() > 0) {
                warn_illegal(format!(
                    "cannot add reactive property \"{name}\" to root state at runtime; declare it upfront"
                ));
                return value;
            }
            let Some(observer) = observer else {
                obj.set(&name, value.clone());
                return value;
            };
            define_reactive(obj, &name, Some(value.clone()), DefineOptions::default());
            observer.dep.notify();
            value
        }
        other => {
            warn_illegal(format!("cannot set reactive property on {} value", other.kind()));
            value
        }
    }
}

/// Delete a property from `target`, notifying its container if reactive.
pub fn del(target: &Value, key: impl Into<Key>) {
    let key = key.into();
    match target {
        Value::Array(arr) => {
            if let Some(index) = key.as_index() {
                arr.splice(index, 1, std::iter::empty());
            }
        }
        Value::Object(obj) => {
            let observer = obj.observer();
            if observer.as_ref().is_some_and(|ob| ob.root_count() > 0) {
                warn_illegal(format!(
                    "cannot delete property \"{}\" from root state; set it to null instead",
                    key.name()
                ));
                return;
            }
            let name = key.name();
            if !obj.has(&name) || !obj.remove(&name) {
                return;
            }
            if let Some(observer) = observer {
                observer.dep.notify();
            }
        }
        other => {
            warn_illegal(format!("cannot delete reactive property on {} value", other.kind()));
        }
    }
}

/// Read every reachable property of `value` so the current reader subscribes
/// to all nested state. Frozen objects and foreign values are not entered.
pub(crate) fn traverse(value: &Value) {
    let mut seen = HashSet::new();
    traverse_inner(value, &mut seen);
}

fn traverse_inner(value: &Value, seen: &mut HashSet<usize>) {
    match value {
        Value::Object(obj) => {
            if obj.is_frozen() || !seen.insert(obj.addr()) {
                return;
            }
            for key in obj.enumerable_keys() {
                traverse_inner(&obj.get(&key), seen);
            }
        }
        Value::Array(arr) => {
            if !seen.insert(arr.addr()) {
                return;
            }
            for item in arr.to_vec() {
                traverse_inner(&item, seen);
            }
        }
        _ => {}
    }
}
