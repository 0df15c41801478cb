//! Dynamic Values
//!
//! Reactive state is made of [`Value`]s: primitives, shared objects, shared
//! arrays, and opaque foreign values owned by other subsystems. Objects and
//! arrays are reference types. Cloning a handle yields another handle to the
//! same allocation, and identity (not structural equality) is what the reactive
//! core compares when deciding whether a write changed anything.
//!
//! # Properties
//!
//! An object keeps its properties in insertion order. Each property is one of:
//!
//! - a plain data slot,
//! - a user accessor (getter and/or setter closures),
//! - a reactive slot installed by [`observe`](super::observe), which tracks
//!   reads and notifies on writes.
//!
//! Reads through [`ObjectRef::get`] go through the slot, so reading a reactive
//! property inside a watcher registers a dependency. [`ObjectRef::get_raw`]
//! reads without tracking.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::observer::{Observer, ReactiveSlot};
use crate::error::{ReactiveError, Result};

/// Getter half of a user-defined accessor property.
pub type AccessorGet = Rc<dyn Fn() -> Value>;

/// Setter half of a user-defined accessor property.
pub type AccessorSet = Rc<dyn Fn(Value)>;

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(ObjectRef),
    Array(ArrayRef),
    /// A value owned by another subsystem (for example a render-tree node).
    /// Foreign values are never made reactive.
    Foreign(Rc<dyn Any>),
}

impl Value {
    /// Build an object value from key/value pairs.
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(ObjectRef::from_entries(entries))
    }

    /// Build an array value.
    pub fn array<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        Value::Array(ArrayRef::from_vec(items.into_iter().collect()))
    }

    /// Wrap a value owned by another subsystem.
    pub fn foreign<T: Any>(value: T) -> Self {
        Value::Foreign(Rc::new(value))
    }

    /// Short name of the value's kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(_) => "object",
            Value::Array(_) => "array",
            Value::Foreign(_) => "foreign",
        }
    }

    /// True for reference types: objects, arrays, and foreign values.
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Array(_) | Value::Foreign(_))
    }

    /// True for everything that is not a reference type.
    pub fn is_primitive(&self) -> bool {
        !self.is_object()
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_nan(&self) -> bool {
        matches!(self, Value::Number(n) if n.is_nan())
    }

    /// Strict identity: primitives compare by value (NaN is never identical to
    /// itself), containers compare by allocation.
    pub fn is_identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Foreign(a), Value::Foreign(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Truthiness with the usual scripting rules.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Object(_) | Value::Array(_) | Value::Foreign(_) => true,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Downcast a foreign value.
    pub fn downcast_foreign<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Foreign(f) => f.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// The reactive container attached to this value, if any.
    pub fn observer(&self) -> Option<Rc<Observer>> {
        match self {
            Value::Object(o) => o.observer(),
            Value::Array(a) => a.observer(),
            _ => None,
        }
    }

    /// String form used for display and for the default array collation.
    ///
    /// An array that contains itself prints as an empty string at the point of
    /// recursion.
    pub fn to_display_string(&self) -> String {
        let mut path = Vec::new();
        display_inner(self, &mut path)
    }

    /// Build a plain (not yet reactive) value from JSON.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::from(s),
            serde_json::Value::Array(items) => {
                Value::array(items.into_iter().map(Value::from_json))
            }
            serde_json::Value::Object(map) => {
                Value::object(map.into_iter().map(|(k, v)| (k, Value::from_json(v))))
            }
        }
    }

    /// Snapshot this value as JSON without registering dependencies.
    ///
    /// `Undefined` object members are skipped and `Undefined` array elements
    /// become `null`. Cyclic graphs and foreign values are rejected.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        let mut path = Vec::new();
        to_json_inner(self, &mut path)
    }
}

fn display_inner(value: &Value, path: &mut Vec<usize>) -> String {
    match value {
        Value::Undefined => "undefined".to_string(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(*n),
        Value::String(s) => s.to_string(),
        Value::Object(_) => "[object Object]".to_string(),
        Value::Array(a) => {
            if path.contains(&a.addr()) {
                return String::new();
            }
            path.push(a.addr());
            let joined = a
                .to_vec()
                .iter()
                .map(|v| match v {
                    Value::Undefined | Value::Null => String::new(),
                    other => display_inner(other, path),
                })
                .collect::<Vec<_>>()
                .join(",");
            path.pop();
            joined
        }
        Value::Foreign(_) => "[foreign]".to_string(),
    }
}

/// Shortest round-trip form, switching to exponent notation outside
/// `[1e-6, 1e21)`. Negative zero prints as `0`.
fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let magnitude = n.abs();
    if (1e-6..1e21).contains(&magnitude) {
        return n.to_string();
    }
    let formatted = format!("{n:e}");
    match formatted.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => {
            format!("{mantissa}e+{exponent}")
        }
        _ => formatted,
    }
}

fn to_json_inner(value: &Value, path: &mut Vec<usize>) -> Result<serde_json::Value> {
    Ok(match value {
        Value::Undefined | Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::String(s.to_string()),
        Value::Object(obj) => {
            let addr = obj.addr();
            if path.contains(&addr) {
                return Err(ReactiveError::CyclicValue);
            }
            path.push(addr);
            let mut map = serde_json::Map::new();
            for key in obj.keys() {
                let member = obj.get_raw(&key);
                if member.is_undefined() {
                    continue;
                }
                map.insert(key, to_json_inner(&member, path)?);
            }
            path.pop();
            serde_json::Value::Object(map)
        }
        Value::Array(arr) => {
            let addr = arr.addr();
            if path.contains(&addr) {
                return Err(ReactiveError::CyclicValue);
            }
            path.push(addr);
            let items = arr
                .to_vec()
                .iter()
                .map(|item| to_json_inner(item, path))
                .collect::<Result<Vec<_>>>()?;
            path.pop();
            serde_json::Value::Array(items)
        }
        Value::Foreign(_) => return Err(ReactiveError::NotSerializable { kind: "foreign" }),
    })
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("Undefined"),
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Object(o) => o.fmt(f),
            Value::Array(a) => a.fmt(f),
            Value::Foreign(_) => f.write_str("Foreign(..)"),
        }
    }
}

/// Structural-looking equality for tests and assertions: primitives by value,
/// containers by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.is_identical(other)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<ObjectRef> for Value {
    fn from(o: ObjectRef) -> Self {
        Value::Object(o)
    }
}

impl From<ArrayRef> for Value {
    fn from(a: ArrayRef) -> Self {
        Value::Array(a)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

// ----------------------------------------------------------------------------
// Objects
// ----------------------------------------------------------------------------

/// A user-defined accessor pair.
#[derive(Clone, Default)]
pub struct Accessor {
    pub get: Option<AccessorGet>,
    pub set: Option<AccessorSet>,
}

impl Accessor {
    /// A read-only accessor.
    pub fn getter(get: impl Fn() -> Value + 'static) -> Self {
        Self {
            get: Some(Rc::new(get)),
            set: None,
        }
    }

    /// An accessor with both halves.
    pub fn new(get: impl Fn() -> Value + 'static, set: impl Fn(Value) + 'static) -> Self {
        Self {
            get: Some(Rc::new(get)),
            set: Some(Rc::new(set)),
        }
    }
}

#[derive(Clone)]
pub(crate) enum Slot {
    Data(Value),
    Accessor(Accessor),
    Reactive(Rc<ReactiveSlot>),
}

#[derive(Clone)]
pub(crate) struct Property {
    pub(crate) slot: Slot,
    pub(crate) enumerable: bool,
    pub(crate) configurable: bool,
    pub(crate) writable: bool,
}

impl Property {
    fn data(value: Value) -> Self {
        Self {
            slot: Slot::Data(value),
            enumerable: true,
            configurable: true,
            writable: true,
        }
    }
}

struct ObjectData {
    props: RefCell<IndexMap<String, Property>>,
    observer: RefCell<Option<Rc<Observer>>>,
    extensible: Cell<bool>,
    raw: Cell<bool>,
}

/// Shared handle to an object.
#[derive(Clone)]
pub struct ObjectRef(Rc<ObjectData>);

impl ObjectRef {
    /// Create an empty object.
    pub fn new() -> Self {
        Self(Rc::new(ObjectData {
            props: RefCell::new(IndexMap::new()),
            observer: RefCell::new(None),
            extensible: Cell::new(true),
            raw: Cell::new(false),
        }))
    }

    /// Create an object holding plain data properties.
    pub fn from_entries<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let obj = Self::new();
        {
            let mut props = obj.0.props.borrow_mut();
            for (key, value) in entries {
                props.insert(key.into(), Property::data(value));
            }
        }
        obj
    }

    /// Read a property. Reactive properties register a dependency on the
    /// current reader. Missing properties read as `Undefined`.
    pub fn get(&self, key: &str) -> Value {
        match self.slot(key) {
            None => Value::Undefined,
            Some(Slot::Data(value)) => value,
            Some(Slot::Accessor(accessor)) => accessor.get.map(|g| g()).unwrap_or_default(),
            Some(Slot::Reactive(slot)) => slot.get(),
        }
    }

    /// Read a property without registering any dependency.
    pub fn get_raw(&self, key: &str) -> Value {
        match self.slot(key) {
            None => Value::Undefined,
            Some(Slot::Data(value)) => value,
            Some(Slot::Accessor(accessor)) => {
                super::ReactiveContext::untracked(|| accessor.get.map(|g| g()).unwrap_or_default())
            }
            Some(Slot::Reactive(slot)) => slot.peek(),
        }
    }

    /// Assign a property.
    ///
    /// Existing reactive properties notify their subscribers. Assigning a key
    /// the object does not have creates a plain, non-reactive data property;
    /// use [`set`](super::set) to add a reactive one.
    pub fn set(&self, key: &str, value: Value) {
        match self.slot(key) {
            Some(Slot::Reactive(slot)) => slot.set(value),
            Some(Slot::Accessor(accessor)) => {
                if let Some(setter) = accessor.set {
                    setter(value);
                }
            }
            Some(Slot::Data(_)) => {
                let mut props = self.0.props.borrow_mut();
                if let Some(prop) = props.get_mut(key) {
                    if prop.writable {
                        prop.slot = Slot::Data(value);
                    }
                }
            }
            None => {
                if self.is_extensible() {
                    self.0
                        .props
                        .borrow_mut()
                        .insert(key.to_string(), Property::data(value));
                }
            }
        }
    }

    /// Define an accessor property, replacing any configurable property of the
    /// same name. Returns false if the object refused the definition.
    pub fn define_accessor(&self, key: &str, accessor: Accessor) -> bool {
        self.define(
            key,
            Property {
                slot: Slot::Accessor(accessor),
                enumerable: true,
                configurable: true,
                writable: true,
            },
        )
    }

    /// Define a data property with explicit attributes.
    pub fn define_data(&self, key: &str, value: Value, enumerable: bool, configurable: bool) -> bool {
        self.define(
            key,
            Property {
                slot: Slot::Data(value),
                enumerable,
                configurable,
                writable: true,
            },
        )
    }

    fn define(&self, key: &str, prop: Property) -> bool {
        let mut props = self.0.props.borrow_mut();
        match props.get_mut(key) {
            Some(existing) if !existing.configurable => false,
            Some(existing) => {
                *existing = prop;
                true
            }
            None if !self.0.extensible.get() => false,
            None => {
                props.insert(key.to_string(), prop);
                true
            }
        }
    }

    /// Whether the object has an own property named `key`.
    pub fn has(&self, key: &str) -> bool {
        self.0.props.borrow().contains_key(key)
    }

    /// Own property names in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.0.props.borrow().keys().cloned().collect()
    }

    /// Own enumerable property names in insertion order.
    pub fn enumerable_keys(&self) -> Vec<String> {
        self.0
            .props
            .borrow()
            .iter()
            .filter(|(_, p)| p.enumerable)
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.props.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove a configurable property. Returns true if a property was removed.
    pub(crate) fn remove(&self, key: &str) -> bool {
        let mut props = self.0.props.borrow_mut();
        match props.get(key) {
            Some(prop) if prop.configurable => {
                props.shift_remove(key);
                true
            }
            _ => false,
        }
    }

    /// Forbid adding properties, and make every existing property
    /// non-configurable and (for data properties) read-only.
    pub fn freeze(&self) {
        self.0.extensible.set(false);
        for prop in self.0.props.borrow_mut().values_mut() {
            prop.configurable = false;
            prop.writable = false;
        }
    }

    /// Forbid adding properties.
    pub fn prevent_extensions(&self) {
        self.0.extensible.set(false);
    }

    pub fn is_extensible(&self) -> bool {
        self.0.extensible.get()
    }

    pub fn is_frozen(&self) -> bool {
        !self.is_extensible()
            && self
                .0
                .props
                .borrow()
                .values()
                .all(|p| !p.configurable && (!p.writable || matches!(p.slot, Slot::Accessor(_))))
    }

    /// Mark the object as never observable.
    pub fn mark_raw(&self) {
        self.0.raw.set(true);
    }

    pub fn is_raw(&self) -> bool {
        self.0.raw.get()
    }

    /// The reactive container attached to this object, if it is observed.
    pub fn observer(&self) -> Option<Rc<Observer>> {
        self.0.observer.borrow().clone()
    }

    /// Whether both handles refer to the same object.
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub(crate) fn attach_observer(&self, observer: Rc<Observer>) {
        *self.0.observer.borrow_mut() = Some(observer);
    }

    pub(crate) fn property(&self, key: &str) -> Option<Property> {
        self.0.props.borrow().get(key).cloned()
    }

    pub(crate) fn install_slot(&self, key: &str, slot: Rc<ReactiveSlot>, enumerable: bool) {
        let prop = Property {
            slot: Slot::Reactive(slot),
            enumerable,
            configurable: true,
            writable: true,
        };
        self.0.props.borrow_mut().insert(key.to_string(), prop);
    }

    fn slot(&self, key: &str) -> Option<Slot> {
        self.0.props.borrow().get(key).map(|p| p.slot.clone())
    }
}

impl Default for ObjectRef {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("keys", &self.keys())
            .field("observed", &self.observer().is_some())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Arrays
// ----------------------------------------------------------------------------

struct ArrayData {
    items: RefCell<Vec<Value>>,
    observer: RefCell<Option<Rc<Observer>>>,
    raw: Cell<bool>,
}

/// Shared handle to an array.
///
/// Element reads are untracked; dependency on an array's contents is carried
/// by the property that holds the array. Mutating operations live in the
/// interception layer (see `array.rs`).
#[derive(Clone)]
pub struct ArrayRef(Rc<ArrayData>);

impl ArrayRef {
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    pub fn from_vec(items: Vec<Value>) -> Self {
        Self(Rc::new(ArrayData {
            items: RefCell::new(items),
            observer: RefCell::new(None),
            raw: Cell::new(false),
        }))
    }

    /// Element at `index`, or `Undefined` when out of bounds.
    pub fn get(&self, index: usize) -> Value {
        self.0.items.borrow().get(index).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.0.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the elements.
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.items.borrow().clone()
    }

    pub fn mark_raw(&self) {
        self.0.raw.set(true);
    }

    pub fn is_raw(&self) -> bool {
        self.0.raw.get()
    }

    pub fn observer(&self) -> Option<Rc<Observer>> {
        self.0.observer.borrow().clone()
    }

    pub fn ptr_eq(&self, other: &ArrayRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub(crate) fn attach_observer(&self, observer: Rc<Observer>) {
        *self.0.observer.borrow_mut() = Some(observer);
    }

    /// Mutate the elements in place. `op` must not call back into user code,
    /// since the elements stay borrowed while it runs.
    pub(crate) fn with_items_mut<R>(&self, op: impl FnOnce(&mut Vec<Value>) -> R) -> R {
        op(&mut self.0.items.borrow_mut())
    }
}

impl Default for ArrayRef {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ArrayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Array")
            .field("len", &self.len())
            .field("observed", &self.observer().is_some())
            .finish()
    }
}

/// Default collation used by `sort()`: `Undefined` sorts last, everything
/// else compares by string form.
pub(crate) fn default_compare(a: &Value, b: &Value) -> Ordering {
    match (a.is_undefined(), b.is_undefined()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.to_display_string().cmp(&b.to_display_string()),
    }
}
