use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use strum::{Display as StrumDisplay, EnumString, VariantNames};

use crate::complex_type::ComplexType;
use crate::error::CccDataError;

/// How the levels of one grouping specification are emitted
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    StrumDisplay,
    EnumString,
    VariantNames,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum FlattenMode {
    /// One generation of children per level
    #[default]
    None,
    /// Every node of every level as siblings, depth-first pre-order
    DfsPre,
    /// Every node of every level as siblings, depth-first post-order
    DfsPost,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupingDimensionSpec {
    name: String,
    reverse: bool,
}

impl GroupingDimensionSpec {
    pub fn new(name: impl Into<String>, reverse: bool) -> Self {
        Self {
            name: name.into(),
            reverse,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Descending order
    pub fn reverse(&self) -> bool {
        self.reverse
    }

    fn key(&self) -> String {
        if self.reverse {
            format!("{} desc", self.name)
        } else {
            self.name.clone()
        }
    }
}

/// The dimensions that together form the key of one grouping level
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupingLevelSpec {
    dimensions: Vec<GroupingDimensionSpec>,
}

impl GroupingLevelSpec {
    pub fn new(dimensions: Vec<GroupingDimensionSpec>) -> Self {
        Self { dimensions }
    }

    pub fn dimensions(&self) -> &[GroupingDimensionSpec] {
        &self.dimensions
    }

    pub fn dimension_names(&self) -> impl Iterator<Item = &str> {
        self.dimensions.iter().map(|d| d.name())
    }

    fn key(&self) -> String {
        self.dimensions.iter().map(|d| d.key()).join("|")
    }
}

/// Options of [`GroupingSpec::ensure`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnsureOptions {
    /// Toggle the order of every dimension
    pub reverse: bool,
    /// Collapse all levels into one holding the union of their dimensions
    pub is_single_level: bool,
    pub flatten_mode: Option<FlattenMode>,
    pub root_label: Option<String>,
}

impl EnsureOptions {
    pub fn with_reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    pub fn with_single_level(mut self, is_single_level: bool) -> Self {
        self.is_single_level = is_single_level;
        self
    }

    pub fn with_flatten_mode(mut self, flatten_mode: FlattenMode) -> Self {
        self.flatten_mode = Some(flatten_mode);
        self
    }

    pub fn with_root_label(mut self, root_label: impl Into<String>) -> Self {
        self.root_label = Some(root_label.into());
        self
    }

    fn key(&self) -> String {
        format!(
            "reverse:{}|single:{}|flatten:{:?}|label:{:?}",
            self.reverse, self.is_single_level, self.flatten_mode, self.root_label
        )
    }
}

#[derive(Debug, Clone)]
struct SpecBinding {
    type_id: u64,
    discrete: HashMap<String, bool>,
}

/// An immutable description of a group-by: levels of dimensions, a flatten
/// mode and a root label.
///
/// Equality and caching go through [`GroupingSpec::key`], so textually
/// different but equivalent specs share cache entries.
#[derive(Debug)]
pub struct GroupingSpec {
    levels: Vec<GroupingLevelSpec>,
    flatten_mode: FlattenMode,
    root_label: Option<String>,
    key: String,
    binding: Option<SpecBinding>,
    ensured: Mutex<HashMap<String, Arc<GroupingSpec>>>,
}

impl PartialEq for GroupingSpec {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl GroupingSpec {
    pub fn new(
        levels: Vec<GroupingLevelSpec>,
        flatten_mode: FlattenMode,
        root_label: Option<String>,
    ) -> Result<Self, CccDataError> {
        if levels.is_empty() || levels.iter().any(|l| l.dimensions.is_empty()) {
            return Err(CccDataError::InvalidArgument(
                "a grouping needs at least one dimension per level".to_string(),
            ));
        }
        Ok(Self::build(levels, flatten_mode, root_label, None))
    }

    fn build(
        levels: Vec<GroupingLevelSpec>,
        flatten_mode: FlattenMode,
        root_label: Option<String>,
        binding: Option<SpecBinding>,
    ) -> Self {
        let mut key = levels.iter().map(|l| l.key()).join(",");
        if flatten_mode != FlattenMode::None {
            key.push_str(&format!("#{flatten_mode}"));
        }
        if let Some(root_label) = &root_label {
            key.push_str(&format!("#label:{root_label}"));
        }
        Self {
            levels,
            flatten_mode,
            root_label,
            key,
            binding,
            ensured: Mutex::new(HashMap::new()),
        }
    }

    /// Parse `"series desc, category|product"`: commas separate levels, pipes
    /// separate the dimensions of one level, and each dimension may carry an
    /// `asc`/`desc` suffix.
    pub fn parse(text: &str) -> Result<Self, CccDataError> {
        let parse_error = |reason: &str| CccDataError::GroupingParse {
            text: text.to_string(),
            reason: reason.to_string(),
        };
        if text.trim().is_empty() {
            return Err(parse_error("empty grouping"));
        }
        let mut levels = Vec::new();
        for level_text in text.split(',') {
            let mut dimensions = Vec::new();
            for dim_text in level_text.split('|') {
                let tokens = dim_text.split_whitespace().collect::<Vec<_>>();
                let dimension = match tokens.as_slice() {
                    [name] => GroupingDimensionSpec::new(*name, false),
                    [name, dir] if dir.eq_ignore_ascii_case("asc") => {
                        GroupingDimensionSpec::new(*name, false)
                    }
                    [name, dir] if dir.eq_ignore_ascii_case("desc") => {
                        GroupingDimensionSpec::new(*name, true)
                    }
                    [] => return Err(parse_error("missing dimension name")),
                    _ => return Err(parse_error(&format!("invalid dimension `{}`", dim_text.trim()))),
                };
                dimensions.push(dimension);
            }
            levels.push(GroupingLevelSpec::new(dimensions));
        }
        Self::new(levels, FlattenMode::None, None)
    }

    /// A single-level spec over the given dimensions
    pub fn from_dimension_names<S: AsRef<str>>(names: &[S]) -> Result<Self, CccDataError> {
        let dimensions = names
            .iter()
            .map(|n| GroupingDimensionSpec::new(n.as_ref(), false))
            .collect();
        Self::new(vec![GroupingLevelSpec::new(dimensions)], FlattenMode::None, None)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn levels(&self) -> &[GroupingLevelSpec] {
        &self.levels
    }

    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    pub fn flatten_mode(&self) -> FlattenMode {
        self.flatten_mode
    }

    pub fn is_flattened(&self) -> bool {
        self.flatten_mode != FlattenMode::None
    }

    pub fn root_label(&self) -> Option<&str> {
        self.root_label.as_deref()
    }

    /// Distinct dimension names across all levels, in order
    pub fn dimension_names(&self) -> Vec<&str> {
        self.levels
            .iter()
            .flat_map(|l| l.dimension_names())
            .unique()
            .collect()
    }

    pub fn first_dimension_name(&self) -> Option<&str> {
        self.levels
            .first()
            .and_then(|l| l.dimensions.first())
            .map(|d| d.name())
    }

    pub fn is_single_dimension(&self) -> bool {
        self.dimension_names().len() == 1
    }

    pub fn is_single_level(&self) -> bool {
        self.levels.len() == 1
    }

    /// Discrete when there is more than one dimension or the single dimension is
    /// discrete. An unbound single-dimension spec counts as discrete.
    pub fn is_discrete(&self) -> bool {
        let names = self.dimension_names();
        if names.len() != 1 {
            return true;
        }
        self.binding
            .as_ref()
            .and_then(|b| b.discrete.get(names[0]).copied())
            .unwrap_or(true)
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// Id of the complex type this spec was bound to
    pub fn type_id(&self) -> Option<u64> {
        self.binding.as_ref().map(|b| b.type_id)
    }

    /// Validate every dimension against `complex_type` and return the bound spec
    pub fn bind(&self, complex_type: &ComplexType) -> Result<Arc<GroupingSpec>, CccDataError> {
        let mut discrete = HashMap::new();
        for name in self.dimension_names() {
            let dim_type = complex_type.require_dimension(name)?;
            discrete.insert(name.to_string(), dim_type.is_discrete());
        }
        Ok(Arc::new(Self::build(
            self.levels.clone(),
            self.flatten_mode,
            self.root_label.clone(),
            Some(SpecBinding {
                type_id: complex_type.id(),
                discrete,
            }),
        )))
    }

    /// A transformed variant of this spec. Repeated requests with the same
    /// options return the same instance; options that change nothing return `self`.
    pub fn ensure(self: &Arc<Self>, options: &EnsureOptions) -> Arc<GroupingSpec> {
        let cache_key = options.key();
        if let Ok(cache) = self.ensured.lock() {
            if let Some(spec) = cache.get(&cache_key) {
                return spec.clone();
            }
        }

        let mut levels = self.levels.clone();
        if options.is_single_level && levels.len() > 1 {
            let mut dimensions: Vec<GroupingDimensionSpec> = Vec::new();
            for dim in levels.iter().flat_map(|l| l.dimensions.iter()) {
                if !dimensions.iter().any(|d| d.name == dim.name) {
                    dimensions.push(dim.clone());
                }
            }
            levels = vec![GroupingLevelSpec::new(dimensions)];
        }
        if options.reverse {
            for dim in levels.iter_mut().flat_map(|l| l.dimensions.iter_mut()) {
                dim.reverse = !dim.reverse;
            }
        }
        let flatten_mode = options.flatten_mode.unwrap_or(self.flatten_mode);
        let root_label = options.root_label.clone().or_else(|| self.root_label.clone());

        let candidate = Self::build(levels, flatten_mode, root_label, self.binding.clone());
        if candidate.key == self.key {
            return self.clone();
        }
        let spec = Arc::new(candidate);
        if let Ok(mut cache) = self.ensured.lock() {
            cache.insert(cache_key, spec.clone());
        }
        spec
    }
}
