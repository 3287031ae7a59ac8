use std::fmt::{Display, Formatter};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::atom::AtomRef;
use crate::complex_type::ComplexType;
use crate::interpolation::InterpolationMode;
use crate::value::Value;

/// Creation-order id of a datum. Stable secondary sort key and removal handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatumId(pub(crate) usize);

impl DatumId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl Display for DatumId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Predicate over datums used by `where` filters and load/grouping options
pub type DatumPredicate = Arc<dyn Fn(&Datum) -> bool + Send + Sync>;

/// One logical row: an atom per dimension of the owner's complex type plus state flags.
#[derive(Debug, Clone)]
pub struct Datum {
    id: DatumId,
    key: String,
    complex_type: Arc<ComplexType>,
    atoms: Vec<AtomRef>,
    is_null: bool,
    is_virtual: bool,
    interpolation: Option<InterpolationMode>,
    is_selected: bool,
    is_visible: bool,
}

impl Datum {
    pub(crate) fn new(id: DatumId, complex_type: Arc<ComplexType>, atoms: Vec<AtomRef>) -> Self {
        let key = atoms.iter().map(|a| a.key()).collect::<Vec<_>>().join(",");
        Self {
            id,
            key,
            complex_type,
            atoms,
            is_null: false,
            is_virtual: false,
            interpolation: None,
            is_selected: false,
            is_visible: true,
        }
    }

    pub fn id(&self) -> DatumId {
        self.id
    }

    /// Composite key across every dimension of the owner's complex type
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn atom(&self, dim_name: &str) -> Option<&AtomRef> {
        self.complex_type
            .dimension_index(dim_name)
            .and_then(|i| self.atoms.get(i))
    }

    pub fn value(&self, dim_name: &str) -> Option<&Value> {
        self.atom(dim_name).and_then(|a| a.value())
    }

    pub fn atoms(&self) -> impl Iterator<Item = (&str, &AtomRef)> {
        self.complex_type.dimension_names().zip(self.atoms.iter())
    }

    pub fn is_null(&self) -> bool {
        self.is_null
    }

    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    pub fn is_interpolated(&self) -> bool {
        self.interpolation.is_some()
    }

    pub fn interpolation(&self) -> Option<InterpolationMode> {
        self.interpolation
    }

    pub fn is_selected(&self) -> bool {
        self.is_selected
    }

    pub fn is_visible(&self) -> bool {
        self.is_visible
    }

    pub(crate) fn set_null(&mut self, is_null: bool) {
        self.is_null = is_null;
    }

    pub(crate) fn set_selected(&mut self, is_selected: bool) {
        self.is_selected = is_selected;
    }

    pub(crate) fn set_visible(&mut self, is_visible: bool) {
        self.is_visible = is_visible;
    }

    pub(crate) fn mark_interpolated(&mut self, mode: InterpolationMode) {
        self.is_virtual = true;
        self.interpolation = Some(mode);
    }
}

/// A raw cell of a translated record
#[derive(Debug, Clone)]
pub enum RecordValue {
    Value(Option<Value>),
    Labeled(Value, String),
    Atom(AtomRef),
}

impl RecordValue {
    pub fn null() -> Self {
        RecordValue::Value(None)
    }
}

macro_rules! impl_record_value_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for RecordValue {
                fn from(value: $t) -> Self {
                    RecordValue::Value(Some(value.into()))
                }
            }
        )*
    };
}

impl_record_value_from!(Value, f64, i32, i64, bool, &str, String, chrono::NaiveDateTime);

impl From<Option<Value>> for RecordValue {
    fn from(value: Option<Value>) -> Self {
        RecordValue::Value(value)
    }
}

impl From<AtomRef> for RecordValue {
    fn from(atom: AtomRef) -> Self {
        RecordValue::Atom(atom)
    }
}

/// An item map produced by a translator: dimension name to raw value or pre-built atom.
#[derive(Debug, Clone, Default)]
pub struct Record {
    values: IndexMap<String, RecordValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, dim_name: &str, value: impl Into<RecordValue>) -> Self {
        self.values.insert(dim_name.to_string(), value.into());
        self
    }

    pub fn with_null(self, dim_name: &str) -> Self {
        self.with(dim_name, RecordValue::null())
    }

    pub fn set(&mut self, dim_name: &str, value: impl Into<RecordValue>) {
        self.values.insert(dim_name.to_string(), value.into());
    }

    pub fn get(&self, dim_name: &str) -> Option<&RecordValue> {
        self.values.get(dim_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RecordValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<RecordValue>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
