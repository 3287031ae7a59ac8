use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::atom::{Atom, AtomRef};
use crate::complex_type::DimensionType;
use crate::error::CccDataError;
use crate::value::Value;

/// The intern table of one dimension of an owner dataset.
#[derive(Debug)]
pub struct Dimension {
    dim_type: DimensionType,
    null_atom: AtomRef,
    atoms_by_key: IndexMap<String, AtomRef>,
    next_index: usize,
}

impl Dimension {
    pub fn new(dim_type: DimensionType) -> Self {
        let null_atom = Arc::new(Atom::null(dim_type.name()));
        Self {
            dim_type,
            null_atom,
            atoms_by_key: IndexMap::new(),
            next_index: 1,
        }
    }

    pub fn name(&self) -> &str {
        self.dim_type.name()
    }

    pub fn dim_type(&self) -> &DimensionType {
        &self.dim_type
    }

    pub fn null_atom(&self) -> &AtomRef {
        &self.null_atom
    }

    /// Number of interned non-null atoms
    pub fn atom_count(&self) -> usize {
        self.atoms_by_key.len()
    }

    /// Cast to the dimension's value type. `None` when the cast value is empty.
    fn cast(&self, raw: &Value) -> Result<Option<Value>, CccDataError> {
        if raw.is_empty() {
            return Ok(None);
        }
        let value = raw
            .cast(self.dim_type.value_type())
            .ok_or_else(|| CccDataError::ValueCast {
                dimension: self.name().to_string(),
                value: raw.to_string(),
                value_type: self.dim_type.value_type(),
            })?;
        Ok((!value.is_empty()).then_some(value))
    }

    /// The key a raw value would intern to
    pub fn key_of(&self, raw: Option<&Value>) -> Result<String, CccDataError> {
        match raw {
            None => Ok(String::new()),
            Some(raw) => Ok(self.cast(raw)?.map(|v| v.key()).unwrap_or_default()),
        }
    }

    /// Intern a raw value, returning the shared atom for it.
    pub fn intern(&mut self, raw: Option<Value>) -> Result<AtomRef, CccDataError> {
        self.intern_labeled(raw, None)
    }

    /// Intern a raw value with an explicit label. The label only applies when the
    /// atom is created; an existing atom keeps its label.
    pub fn intern_labeled(
        &mut self,
        raw: Option<Value>,
        label: Option<String>,
    ) -> Result<AtomRef, CccDataError> {
        let Some(raw) = raw else {
            return Ok(self.null_atom.clone());
        };
        let Some(value) = self.cast(&raw)? else {
            return Ok(self.null_atom.clone());
        };
        let key = value.key();
        if let Some(atom) = self.atoms_by_key.get(&key) {
            return Ok(atom.clone());
        }
        let label = label.unwrap_or_else(|| self.dim_type.format(&value));
        let atom = Arc::new(Atom::new(
            self.name(),
            Some(value),
            Some(raw),
            label,
            self.next_index,
        ));
        self.next_index += 1;
        self.atoms_by_key.insert(key, atom.clone());
        Ok(atom)
    }

    /// Adopt a pre-built atom. An atom with the same key that is already interned wins.
    pub fn adopt(&mut self, atom: &AtomRef) -> Result<AtomRef, CccDataError> {
        if atom.dimension() != self.name() {
            return Err(CccDataError::ForeignAtom {
                dimension: self.name().to_string(),
                atom_dimension: atom.dimension().to_string(),
            });
        }
        if atom.is_null() || atom.key().is_empty() {
            return Ok(self.null_atom.clone());
        }
        if let Some(existing) = self.atoms_by_key.get(atom.key()) {
            return Ok(existing.clone());
        }
        self.atoms_by_key
            .insert(atom.key().to_string(), atom.clone());
        self.next_index = self.next_index.max(atom.index() + 1);
        Ok(atom.clone())
    }

    /// Look up the atom of a raw value without interning it
    pub fn atom(&self, raw: Option<&Value>) -> Option<AtomRef> {
        match raw {
            None => Some(self.null_atom.clone()),
            Some(raw) => match self.cast(raw).ok()? {
                Some(value) => self.atoms_by_key.get(&value.key()).cloned(),
                None => Some(self.null_atom.clone()),
            },
        }
    }

    pub fn atom_by_key(&self, key: &str) -> Option<AtomRef> {
        if key.is_empty() {
            return Some(self.null_atom.clone());
        }
        self.atoms_by_key.get(key).cloned()
    }

    /// Non-null atoms, sorted by the dimension's comparer when it is comparable,
    /// in interning order otherwise.
    pub fn atoms(&self) -> Vec<AtomRef> {
        let mut atoms = self.atoms_by_key.values().cloned().collect::<Vec<_>>();
        if self.dim_type.is_comparable() {
            atoms.sort_by(|a, b| self.dim_type.compare_atoms(a, b, false));
        }
        atoms
    }

    /// Minimum and maximum non-null atoms of a comparable dimension
    pub fn extent(&self) -> Option<(AtomRef, AtomRef)> {
        if !self.dim_type.is_comparable() {
            return None;
        }
        let cmp = |a: &&AtomRef, b: &&AtomRef| self.dim_type.compare_atoms(a, b, false);
        let min = self.atoms_by_key.values().min_by(cmp)?;
        let max = self.atoms_by_key.values().max_by(cmp)?;
        Some((min.clone(), max.clone()))
    }

    pub fn min(&self) -> Option<AtomRef> {
        self.extent().map(|(min, _)| min)
    }

    pub fn max(&self) -> Option<AtomRef> {
        self.extent().map(|(_, max)| max)
    }

    /// Sweep the atoms interned after the first `mark` whose key is not in
    /// `live`. Returns the number of atoms removed.
    pub(crate) fn sweep_since(&mut self, mark: usize, live: &HashSet<&str>) -> usize {
        if mark >= self.atoms_by_key.len() {
            return 0;
        }
        let fresh = self.atoms_by_key.split_off(mark);
        let before = fresh.len();
        self.atoms_by_key
            .extend(fresh.into_iter().filter(|(key, _)| live.contains(key.as_str())));
        before - (self.atoms_by_key.len() - mark)
    }

    /// Sweep every atom whose key is not in `live`. Returns the number of atoms removed.
    pub(crate) fn retain_keys(&mut self, live: &HashSet<&str>) -> usize {
        let before = self.atoms_by_key.len();
        self.atoms_by_key.retain(|key, _| live.contains(key.as_str()));
        before - self.atoms_by_key.len()
    }
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use rstest::rstest;

    use super::*;
    use crate::value::ValueType;

    #[test]
    fn test_interning_returns_same_atom() -> Result<(), CccDataError> {
        let mut dim = Dimension::new(DimensionType::new("value", ValueType::Number));
        let a = dim.intern(Some(Value::number(10.0)))?;
        let b = dim.intern(Some(Value::from("10")))?;
        assert!(Atom::same(&a, &b));
        assert_eq!(a.key(), "10");
        assert_eq!(b.raw_value(), Some(&Value::number(10.0)));
        assert_eq!(dim.atom_count(), 1);
        Ok(())
    }

    #[test]
    fn test_null_atom_is_canonical() -> Result<(), CccDataError> {
        let mut dim = Dimension::new(DimensionType::new("series", ValueType::String));
        let a = dim.intern(None)?;
        let b = dim.intern(None)?;
        assert!(Atom::same(&a, &b));
        assert!(Atom::same(&a, dim.null_atom()));
        assert_eq!(a.key(), "");
        assert!(a.is_null());
        assert_eq!(dim.atom_count(), 0);
        Ok(())
    }

    #[rstest]
    #[case(ValueType::String, Value::from(""))]
    #[case(ValueType::Number, Value::number(f64::NAN))]
    #[case(ValueType::Number, Value::from(""))]
    #[case(ValueType::Any, Value::from(""))]
    fn test_empty_value_interns_to_null_atom(
        #[case] value_type: ValueType,
        #[case] value: Value,
    ) -> Result<(), CccDataError> {
        let mut dim = Dimension::new(DimensionType::new("dim", value_type));
        let empty = dim.intern(Some(value.clone()))?;
        let null = dim.intern(None)?;
        assert!(Atom::same(&empty, &null));
        assert!(empty.is_null());
        assert_eq!(dim.atom_count(), 0);
        assert_eq!(dim.key_of(Some(&value))?, "");
        assert!(dim.atom(Some(&value)).is_some_and(|a| a.is_null()));
        Ok(())
    }

    #[test]
    fn test_null_sorts_first() -> Result<(), CccDataError> {
        let mut dim = Dimension::new(DimensionType::new("value", ValueType::Number));
        let null = dim.intern(None)?;
        let low = dim.intern(Some(Value::number(-100.0)))?;
        assert_eq!(
            dim.dim_type().compare_atoms(&null, &low, false),
            Ordering::Less
        );
        Ok(())
    }

    #[test]
    fn test_cast_failure() {
        let mut dim = Dimension::new(DimensionType::new("value", ValueType::Number));
        let err = dim.intern(Some(Value::from("abc"))).unwrap_err();
        assert!(matches!(err, CccDataError::ValueCast { .. }));
    }

    #[test]
    fn test_atoms_and_extent() -> Result<(), CccDataError> {
        let mut dim = Dimension::new(DimensionType::new("value", ValueType::Number));
        for v in [5.0, -1.0, 3.0] {
            dim.intern(Some(Value::number(v)))?;
        }
        let keys = dim.atoms().iter().map(|a| a.key().to_string()).collect::<Vec<_>>();
        assert_eq!(keys, vec!["-1", "3", "5"]);
        let (min, max) = dim.extent().unwrap();
        assert_eq!(min.key(), "-1");
        assert_eq!(max.key(), "5");

        let mut series = Dimension::new(DimensionType::new("series", ValueType::String));
        for v in ["b", "a"] {
            series.intern(Some(Value::from(v)))?;
        }
        let keys = series.atoms().iter().map(|a| a.key().to_string()).collect::<Vec<_>>();
        assert_eq!(keys, vec!["b", "a"]);
        assert!(series.extent().is_none());
        Ok(())
    }

    #[test]
    fn test_adopt_foreign_atom_fails() -> Result<(), CccDataError> {
        let mut a = Dimension::new(DimensionType::new("a", ValueType::String));
        let mut b = Dimension::new(DimensionType::new("b", ValueType::String));
        let atom = a.intern(Some(Value::from("x")))?;
        assert!(matches!(
            b.adopt(&atom),
            Err(CccDataError::ForeignAtom { .. })
        ));
        Ok(())
    }
}
