use std::cmp::Ordering;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::atom::Atom;
use crate::error::CccDataError;
use crate::value::{Value, ValueType};

pub type ValueComparer = Arc<dyn Fn(&Value, &Value) -> Ordering + Send + Sync>;
pub type ValueFormatter = Arc<dyn Fn(&Value) -> String + Send + Sync>;

static NEXT_COMPLEX_TYPE_ID: AtomicU64 = AtomicU64::new(1);

/// Schema entry describing one dimension
#[derive(Clone)]
pub struct DimensionType {
    name: String,
    label: String,
    value_type: ValueType,
    is_discrete: bool,
    is_comparable: bool,
    is_hidden: bool,
    comparer: Option<ValueComparer>,
    formatter: Option<ValueFormatter>,
}

impl Debug for DimensionType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DimensionType")
            .field("name", &self.name)
            .field("value_type", &self.value_type)
            .field("is_discrete", &self.is_discrete)
            .field("is_comparable", &self.is_comparable)
            .field("is_hidden", &self.is_hidden)
            .field("has_comparer", &self.comparer.is_some())
            .finish()
    }
}

impl DimensionType {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        let name = name.into();
        let is_discrete = !value_type.is_continuous_by_default();
        Self {
            label: name.clone(),
            name,
            value_type,
            is_discrete,
            is_comparable: !is_discrete,
            is_hidden: false,
            comparer: None,
            formatter: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_discrete(mut self, is_discrete: bool) -> Self {
        self.is_discrete = is_discrete;
        if !is_discrete {
            self.is_comparable = true;
        }
        self
    }

    pub fn with_comparable(mut self, is_comparable: bool) -> Self {
        self.is_comparable = is_comparable;
        self
    }

    pub fn with_hidden(mut self, is_hidden: bool) -> Self {
        self.is_hidden = is_hidden;
        self
    }

    /// A custom comparer makes the dimension comparable
    pub fn with_comparer(mut self, comparer: ValueComparer) -> Self {
        self.comparer = Some(comparer);
        self.is_comparable = true;
        self
    }

    pub fn with_formatter(mut self, formatter: ValueFormatter) -> Self {
        self.formatter = Some(formatter);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn is_discrete(&self) -> bool {
        self.is_discrete
    }

    pub fn is_comparable(&self) -> bool {
        self.is_comparable
    }

    pub fn is_hidden(&self) -> bool {
        self.is_hidden
    }

    /// Group name and level of this dimension (`category3` is level 2 of `category`)
    pub fn group(&self) -> (&str, usize) {
        split_dimension_group(&self.name)
    }

    /// Coerce a continuous dimension to discrete. One-way; returns whether anything changed.
    pub fn to_discrete(&mut self) -> bool {
        if self.is_discrete {
            return false;
        }
        self.is_discrete = true;
        true
    }

    pub fn format(&self, value: &Value) -> String {
        match &self.formatter {
            Some(formatter) => formatter(value),
            None => value.to_string(),
        }
    }

    pub fn compare_values(&self, a: &Value, b: &Value) -> Ordering {
        match &self.comparer {
            Some(comparer) => comparer(a, b),
            None => a.natural_cmp(b),
        }
    }

    /// Compare two atoms of this dimension. Null sorts first; `reverse` mirrors the whole order.
    pub fn compare_atoms(&self, a: &Atom, b: &Atom, reverse: bool) -> Ordering {
        let ord = match (a.value(), b.value()) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => self.compare_values(a, b),
        };
        if reverse {
            ord.reverse()
        } else {
            ord
        }
    }
}

/// Split a dimension name into its group name and level.
///
/// `category` is level 0 of group `category`, `category2` level 1, `category3` level 2.
/// Names ending in `0` or `1` are not group members and form their own group.
pub fn split_dimension_group(name: &str) -> (&str, usize) {
    let digits_start = name
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)
        .unwrap_or(name.len());
    if digits_start == 0 || digits_start == name.len() {
        return (name, 0);
    }
    match name[digits_start..].parse::<usize>() {
        Ok(n) if n >= 2 => (&name[..digits_start], n - 1),
        _ => (name, 0),
    }
}

/// The concrete schema of a dataset: an ordered set of dimension types.
///
/// Clones share the same `id`, so groupings bound to a clone remain valid for the original.
#[derive(Debug, Clone)]
pub struct ComplexType {
    id: u64,
    dimensions: IndexMap<String, DimensionType>,
}

impl Default for ComplexType {
    fn default() -> Self {
        Self::new()
    }
}

impl ComplexType {
    pub fn new() -> Self {
        Self {
            id: NEXT_COMPLEX_TYPE_ID.fetch_add(1, AtomicOrdering::Relaxed),
            dimensions: IndexMap::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn add_dimension(&mut self, dim_type: DimensionType) -> Result<(), CccDataError> {
        if self.dimensions.contains_key(dim_type.name()) {
            return Err(CccDataError::DuplicateDimension(dim_type.name().to_string()));
        }
        self.dimensions.insert(dim_type.name().to_string(), dim_type);
        Ok(())
    }

    pub fn with_dimension(mut self, dim_type: DimensionType) -> Result<Self, CccDataError> {
        self.add_dimension(dim_type)?;
        Ok(self)
    }

    pub fn dimension(&self, name: &str) -> Option<&DimensionType> {
        self.dimensions.get(name)
    }

    pub fn dimension_mut(&mut self, name: &str) -> Option<&mut DimensionType> {
        self.dimensions.get_mut(name)
    }

    pub fn require_dimension(&self, name: &str) -> Result<&DimensionType, CccDataError> {
        self.dimensions
            .get(name)
            .ok_or_else(|| CccDataError::UnknownDimension(name.to_string()))
    }

    pub fn dimension_index(&self, name: &str) -> Option<usize> {
        self.dimensions.get_index_of(name)
    }

    pub fn dimension_names(&self) -> impl Iterator<Item = &str> {
        self.dimensions.keys().map(|k| k.as_str())
    }

    pub fn dimensions(&self) -> impl Iterator<Item = &DimensionType> {
        self.dimensions.values()
    }

    pub fn len(&self) -> usize {
        self.dimensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    /// Names of the dimensions in group `group`, ordered by level
    pub fn dimension_group_names(&self, group: &str) -> Vec<String> {
        group_members(self.dimensions.keys().map(|k| k.as_str()), group)
    }
}

pub(crate) fn group_members<'a>(names: impl Iterator<Item = &'a str>, group: &str) -> Vec<String> {
    let mut members = names
        .filter_map(|name| {
            let (g, level) = split_dimension_group(name);
            (g == group).then(|| (level, name.to_string()))
        })
        .collect::<Vec<_>>();
    members.sort_by_key(|(level, _)| *level);
    members.into_iter().map(|(_, name)| name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("category", ("category", 0))]
    #[case("category2", ("category", 1))]
    #[case("category3", ("category", 2))]
    #[case("value1", ("value1", 0))]
    #[case("x10", ("x", 9))]
    #[case("2", ("2", 0))]
    fn test_split_dimension_group(#[case] name: &str, #[case] expected: (&str, usize)) {
        assert_eq!(split_dimension_group(name), expected);
    }

    #[test]
    fn test_group_names_ordered_by_level() -> Result<(), CccDataError> {
        let ct = ComplexType::new()
            .with_dimension(DimensionType::new("category3", ValueType::String))?
            .with_dimension(DimensionType::new("value", ValueType::Number))?
            .with_dimension(DimensionType::new("category", ValueType::String))?
            .with_dimension(DimensionType::new("category2", ValueType::String))?;
        assert_eq!(
            ct.dimension_group_names("category"),
            vec!["category", "category2", "category3"]
        );
        Ok(())
    }

    #[test]
    fn test_duplicate_dimension_is_rejected() {
        let mut ct = ComplexType::new();
        ct.add_dimension(DimensionType::new("a", ValueType::String))
            .unwrap();
        assert_eq!(
            ct.add_dimension(DimensionType::new("a", ValueType::Number)),
            Err(CccDataError::DuplicateDimension("a".to_string()))
        );
    }

    #[test]
    fn test_discreteness_defaults_and_coercion() {
        let mut dim = DimensionType::new("value", ValueType::Number);
        assert!(!dim.is_discrete());
        assert!(dim.is_comparable());
        assert!(dim.to_discrete());
        assert!(dim.is_discrete());
        assert!(!dim.to_discrete());

        let series = DimensionType::new("series", ValueType::String);
        assert!(series.is_discrete());
        assert!(!series.is_comparable());
    }
}
