use std::fmt::{Display, Formatter};
use std::sync::Arc;

use crate::value::Value;

/// Shared handle to an interned atom
pub type AtomRef = Arc<Atom>;

/// An interned, immutable dimension value.
///
/// Atoms are unique by `key` within their dimension. Datums referencing the same
/// value share the same `Arc`, so identity checks can use [`Atom::same`].
#[derive(Debug)]
pub struct Atom {
    dimension: String,
    value: Option<Value>,
    raw_value: Option<Value>,
    label: String,
    key: String,
    index: usize,
}

impl Atom {
    pub(crate) fn new(
        dimension: &str,
        value: Option<Value>,
        raw_value: Option<Value>,
        label: String,
        index: usize,
    ) -> Self {
        let key = value.as_ref().map(|v| v.key()).unwrap_or_default();
        Self {
            dimension: dimension.to_string(),
            value,
            raw_value,
            label,
            key,
            index,
        }
    }

    pub(crate) fn null(dimension: &str) -> Self {
        Self::new(dimension, None, None, String::new(), 0)
    }

    /// Name of the dimension that interned this atom
    pub fn dimension(&self) -> &str {
        &self.dimension
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// The value as given to `intern`, before casting to the dimension's value type
    pub fn raw_value(&self) -> Option<&Value> {
        self.raw_value.as_ref()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    /// Interning order within the dimension. The null atom is always 0.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Reference equality: both handles point to the same interned atom
    pub fn same(a: &AtomRef, b: &AtomRef) -> bool {
        Arc::ptr_eq(a, b)
    }
}

impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        self.dimension == other.dimension && self.key == other.key
    }
}

impl Eq for Atom {}

impl Display for Atom {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label)
    }
}
