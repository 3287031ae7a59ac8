use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::complex_type::{group_members, ComplexType, DimensionType};
use crate::error::CccDataError;
use crate::value::ValueType;

/// A pending dimension definition. Unset fields fall back to defaults when the
/// concrete [`ComplexType`] is configured.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DimensionSpec {
    pub value_type: Option<ValueType>,
    pub is_discrete: Option<bool>,
    pub is_comparable: Option<bool>,
    pub is_hidden: Option<bool>,
    pub label: Option<String>,
}

impl DimensionSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = Some(value_type);
        self
    }

    pub fn discrete(mut self, is_discrete: bool) -> Self {
        self.is_discrete = Some(is_discrete);
        self
    }

    pub fn comparable(mut self, is_comparable: bool) -> Self {
        self.is_comparable = Some(is_comparable);
        self
    }

    pub fn hidden(mut self, is_hidden: bool) -> Self {
        self.is_hidden = Some(is_hidden);
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set every field of `self` that `other` specifies
    fn override_with(&mut self, other: &DimensionSpec) {
        if other.value_type.is_some() {
            self.value_type = other.value_type;
        }
        if other.is_discrete.is_some() {
            self.is_discrete = other.is_discrete;
        }
        if other.is_comparable.is_some() {
            self.is_comparable = other.is_comparable;
        }
        if other.is_hidden.is_some() {
            self.is_hidden = other.is_hidden;
        }
        if other.label.is_some() {
            self.label = other.label.clone();
        }
    }

    /// Fill only the fields of `self` that are still unset
    fn fill_defaults(&mut self, defaults: &DimensionSpec) {
        self.value_type = self.value_type.or(defaults.value_type);
        self.is_discrete = self.is_discrete.or(defaults.is_discrete);
        self.is_comparable = self.is_comparable.or(defaults.is_comparable);
        self.is_hidden = self.is_hidden.or(defaults.is_hidden);
        if self.label.is_none() {
            self.label = defaults.label.clone();
        }
    }

    pub fn to_dimension_type(&self, name: &str) -> DimensionType {
        let mut dim = DimensionType::new(name, self.value_type.unwrap_or_default());
        if let Some(is_discrete) = self.is_discrete {
            dim = dim.with_discrete(is_discrete);
        }
        if let Some(is_comparable) = self.is_comparable {
            dim = dim.with_comparable(is_comparable);
        }
        if let Some(is_hidden) = self.is_hidden {
            dim = dim.with_hidden(is_hidden);
        }
        if let Some(label) = &self.label {
            dim = dim.with_label(label.clone());
        }
        dim
    }
}

/// The schema under construction.
///
/// Role binding writes defaults and auto-created dimensions here before the
/// translator has declared the source's dimensions; `configure_complex_type`
/// produces the concrete schema once both are done.
#[derive(Debug, Clone, Default)]
pub struct ComplexTypeProject {
    dims: IndexMap<String, DimensionSpec>,
}

impl ComplexTypeProject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a dimension explicitly. Explicit fields win over defaults.
    pub fn set_dim(&mut self, name: &str, spec: DimensionSpec) {
        match self.dims.get_mut(name) {
            Some(existing) => existing.override_with(&spec),
            None => {
                self.dims.insert(name.to_string(), spec);
            }
        }
    }

    /// Apply defaults to a dimension, creating its pending definition when absent
    pub fn set_dim_defaults(&mut self, name: &str, defaults: &DimensionSpec) {
        self.dims
            .entry(name.to_string())
            .or_default()
            .fill_defaults(defaults);
    }

    /// Make sure a pending definition exists without changing it
    pub fn ensure_dim(&mut self, name: &str) {
        self.dims.entry(name.to_string()).or_default();
    }

    pub fn has_dim(&self, name: &str) -> bool {
        self.dims.contains_key(name)
    }

    pub fn dim(&self, name: &str) -> Option<&DimensionSpec> {
        self.dims.get(name)
    }

    pub fn dimension_names(&self) -> impl Iterator<Item = &str> {
        self.dims.keys().map(|k| k.as_str())
    }

    pub fn dimension_group_names(&self, group: &str) -> Vec<String> {
        group_members(self.dims.keys().map(|k| k.as_str()), group)
    }

    pub fn configure_complex_type(&self) -> Result<ComplexType, CccDataError> {
        let mut complex_type = ComplexType::new();
        for (name, spec) in &self.dims {
            complex_type.add_dimension(spec.to_dimension_type(name))?;
        }
        Ok(complex_type)
    }
}
