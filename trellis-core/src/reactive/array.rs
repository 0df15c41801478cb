//! Array Mutation Interception
//!
//! In-place array mutations never pass through a property slot, so they are
//! made observable here: each mutating operation runs the usual semantics,
//! makes any inserted elements reactive, and notifies the array's structural
//! dependency node. Arrays that are not observed mutate silently.

use std::cmp::Ordering;

use super::observer::observe_items;
use super::value::{default_compare, ArrayRef, Value};

impl ArrayRef {
    /// Run `op` on the elements, then observe `inserted` and notify.
    fn mutate<R>(&self, op: impl FnOnce(&mut Vec<Value>) -> (R, Vec<Value>)) -> R {
        let (result, inserted) = self.with_items_mut(op);
        if let Some(observer) = self.observer() {
            if !inserted.is_empty() {
                observe_items(&inserted);
            }
            observer.dep().notify();
        }
        result
    }

    /// Append an element. Returns the new length.
    pub fn push(&self, value: Value) -> usize {
        self.extend([value])
    }

    /// Append several elements with one notification. Returns the new length.
    pub fn extend(&self, values: impl IntoIterator<Item = Value>) -> usize {
        let values: Vec<Value> = values.into_iter().collect();
        self.mutate(|items| {
            items.extend(values.iter().cloned());
            (items.len(), values)
        })
    }

    /// Remove and return the last element (`Undefined` when empty).
    pub fn pop(&self) -> Value {
        self.mutate(|items| (items.pop().unwrap_or_default(), Vec::new()))
    }

    /// Remove and return the first element (`Undefined` when empty).
    pub fn shift(&self) -> Value {
        self.mutate(|items| {
            let first = if items.is_empty() {
                Value::Undefined
            } else {
                items.remove(0)
            };
            (first, Vec::new())
        })
    }

    /// Insert elements at the front, keeping their order. Returns the new length.
    pub fn unshift(&self, values: impl IntoIterator<Item = Value>) -> usize {
        let values: Vec<Value> = values.into_iter().collect();
        self.mutate(|items| {
            items.splice(0..0, values.iter().cloned());
            (items.len(), values)
        })
    }

    /// Remove `delete_count` elements starting at `start` and insert `values`
    /// in their place. Out-of-range arguments are clamped. Returns the removed
    /// elements.
    pub fn splice(
        &self,
        start: usize,
        delete_count: usize,
        values: impl IntoIterator<Item = Value>,
    ) -> Vec<Value> {
        let values: Vec<Value> = values.into_iter().collect();
        self.mutate(|items| {
            let start = start.min(items.len());
            let end = start.saturating_add(delete_count).min(items.len());
            let removed: Vec<Value> = items.splice(start..end, values.iter().cloned()).collect();
            (removed, values)
        })
    }

    /// Sort with the default collation: `Undefined` last, everything else by
    /// string form.
    pub fn sort(&self) {
        self.sort_by(default_compare);
    }

    /// Sort with a comparator. The sort is stable.
    ///
    /// The comparator runs against a copy, so it may read this array and sees
    /// its contents unchanged. If it panics the array is left as it was.
    pub fn sort_by(&self, compare: impl FnMut(&Value, &Value) -> Ordering) {
        let mut sorted = self.to_vec();
        sorted.sort_by(compare);
        let previous = self.mutate(|items| (std::mem::replace(items, sorted), Vec::new()));
        drop(previous);
    }

    /// Reverse in place.
    pub fn reverse(&self) {
        self.mutate(|items| {
            items.reverse();
            ((), Vec::new())
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::observe;

    fn nums(values: &[f64]) -> Vec<Value> {
        values.iter().copied().map(Value::from).collect()
    }

    #[test]
    fn push_pop_shift_unshift() {
        let arr = ArrayRef::from_vec(nums(&[1.0, 2.0]));
        assert_eq!(arr.push(Value::from(3)), 3);
        assert_eq!(arr.unshift([Value::from(0), Value::from(0.5)]), 5);
        assert_eq!(arr.to_vec(), nums(&[0.0, 0.5, 1.0, 2.0, 3.0]));

        assert_eq!(arr.pop(), Value::from(3));
        assert_eq!(arr.shift(), Value::from(0));
        assert_eq!(arr.to_vec(), nums(&[0.5, 1.0, 2.0]));

        let empty = ArrayRef::new();
        assert_eq!(empty.pop(), Value::Undefined);
        assert_eq!(empty.shift(), Value::Undefined);
    }

    #[test]
    fn splice_clamps_and_returns_removed() {
        let arr = ArrayRef::from_vec(nums(&[1.0, 2.0, 3.0, 4.0]));
        let removed = arr.splice(1, 2, [Value::from(9)]);
        assert_eq!(removed, nums(&[2.0, 3.0]));
        assert_eq!(arr.to_vec(), nums(&[1.0, 9.0, 4.0]));

        let removed = arr.splice(10, 5, [Value::from(5)]);
        assert!(removed.is_empty());
        assert_eq!(arr.to_vec(), nums(&[1.0, 9.0, 4.0, 5.0]));
    }

    #[test]
    fn sort_and_reverse() {
        let arr = ArrayRef::from_vec(nums(&[3.0, 1.0, 2.0]));
        arr.sort();
        assert_eq!(arr.to_vec(), nums(&[1.0, 2.0, 3.0]));
        arr.reverse();
        assert_eq!(arr.to_vec(), nums(&[3.0, 2.0, 1.0]));

        arr.sort_by(|a, b| {
            a.as_f64()
                .unwrap_or_default()
                .total_cmp(&b.as_f64().unwrap_or_default())
        });
        assert_eq!(arr.to_vec(), nums(&[1.0, 2.0, 3.0]));
    }

    #[test]
    fn sort_handles_self_containing_elements() {
        let inner = ArrayRef::new();
        inner.push(Value::Array(inner.clone()));
        let outer = ArrayRef::from_vec(vec![Value::from(1), Value::Array(inner.clone())]);

        outer.sort();
        let sorted = outer.to_vec();
        assert_eq!(sorted.len(), 2);
        assert!(sorted[0].as_array().is_some_and(|a| a.ptr_eq(&inner)));
        assert_eq!(sorted[1], Value::from(1));
    }

    #[test]
    fn comparator_sees_unchanged_array() {
        let arr = ArrayRef::from_vec(nums(&[2.0, 1.0]));
        let reader = arr.clone();
        let mut seen = Vec::new();
        arr.sort_by(|a: &Value, b: &Value| {
            seen.push(reader.len());
            default_compare(a, b)
        });

        assert!(!seen.is_empty());
        assert!(seen.iter().all(|&len| len == 2));
        assert_eq!(arr.to_vec(), nums(&[1.0, 2.0]));
    }

    #[test]
    fn panicking_comparator_leaves_array_intact() {
        let arr = ArrayRef::from_vec(nums(&[3.0, 1.0, 2.0]));
        let sorting = arr.clone();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            sorting.sort_by(|_: &Value, _: &Value| panic!("comparator failed"));
        }));

        assert!(outcome.is_err());
        assert_eq!(arr.to_vec(), nums(&[3.0, 1.0, 2.0]));
    }

    #[test]
    fn inserted_elements_become_reactive() {
        let value = Value::array([]);
        observe(&value, false);
        let arr = value.as_array().unwrap();

        let obj = Value::object([("a", Value::from(1))]);
        let nested = Value::array([Value::object([("b", Value::from(2))])]);
        arr.push(obj.clone());
        arr.unshift([nested.clone()]);
        let spliced = Value::object([("c", Value::from(3))]);
        arr.splice(1, 0, [spliced.clone()]);

        assert!(obj.observer().is_some());
        assert!(nested.observer().is_some());
        assert!(nested.as_array().unwrap().get(0).observer().is_some());
        assert!(spliced.observer().is_some());
    }

    #[test]
    fn unobserved_array_stays_plain() {
        let arr = ArrayRef::new();
        let obj = Value::object([("a", Value::from(1))]);
        arr.push(obj.clone());
        assert!(obj.observer().is_none());
    }
}
