use std::sync::Arc;

use ccc_data::{
    ComplexType, DataId, DataSet, DimensionSpec, EnsureOptions, GroupingOptions, GroupingSpec,
    ValueType,
};

use crate::error::CccVisualError;
use crate::traversal::{TraversalMode, TraversalModes};

/// Static definition of a visual role, as declared by a chart type
#[derive(Debug, Clone)]
pub struct VisualRoleDef {
    pub name: String,
    /// Plot owning the role; `None` for the main plot
    pub plot: Option<String>,
    pub label: Option<String>,
    pub is_required: bool,
    pub is_measure: bool,
    pub is_percent: bool,
    pub require_single_dimension: bool,
    /// `Some(true)` coerces continuous dimensions to discrete, `Some(false)` rejects discrete ones
    pub require_is_discrete: Option<bool>,
    pub value_type: Option<ValueType>,
    /// Dimension bound when the role is not configured. A trailing `*` names a dimension group.
    pub default_dimension: Option<String>,
    pub default_source_role: Option<String>,
    pub auto_create_dimension: bool,
    pub traversal_modes: TraversalModes,
    pub traversal_mode: TraversalMode,
    /// Defaults applied to a dimension bound by this role alone
    pub dimension_defaults: DimensionSpec,
}

impl VisualRoleDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            plot: None,
            label: None,
            is_required: false,
            is_measure: false,
            is_percent: false,
            require_single_dimension: false,
            require_is_discrete: None,
            value_type: None,
            default_dimension: None,
            default_source_role: None,
            auto_create_dimension: false,
            traversal_modes: TraversalModes::from(TraversalMode::FlattenedSingleLevel),
            traversal_mode: TraversalMode::FlattenedSingleLevel,
            dimension_defaults: DimensionSpec::default(),
        }
    }

    pub fn with_plot(mut self, plot: impl Into<String>) -> Self {
        self.plot = Some(plot.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_required(mut self, is_required: bool) -> Self {
        self.is_required = is_required;
        self
    }

    pub fn with_measure(mut self, is_measure: bool) -> Self {
        self.is_measure = is_measure;
        self
    }

    pub fn with_percent(mut self, is_percent: bool) -> Self {
        self.is_percent = is_percent;
        self
    }

    pub fn with_single_dimension(mut self, require_single_dimension: bool) -> Self {
        self.require_single_dimension = require_single_dimension;
        self
    }

    pub fn with_discrete(mut self, require_is_discrete: Option<bool>) -> Self {
        self.require_is_discrete = require_is_discrete;
        self
    }

    pub fn with_value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = Some(value_type);
        self
    }

    pub fn with_default_dimension(mut self, name: impl Into<String>) -> Self {
        self.default_dimension = Some(name.into());
        self
    }

    pub fn with_default_source_role(mut self, name: impl Into<String>) -> Self {
        self.default_source_role = Some(name.into());
        self
    }

    pub fn with_auto_create_dimension(mut self, auto_create: bool) -> Self {
        self.auto_create_dimension = auto_create;
        self
    }

    pub fn with_traversal_modes(mut self, modes: TraversalModes, preferred: TraversalMode) -> Self {
        self.traversal_modes = modes.with(preferred);
        self.traversal_mode = preferred;
        self
    }

    pub fn with_dimension_defaults(mut self, defaults: DimensionSpec) -> Self {
        self.dimension_defaults = defaults;
        self
    }

    /// `plot.name` for roles of secondary plots, `name` otherwise
    pub fn qualified_name(&self) -> String {
        match &self.plot {
            Some(plot) => format!("{plot}.{}", self.name),
            None => self.name.clone(),
        }
    }
}

/// Binding state of a role
#[derive(Debug, Clone, Default)]
pub enum RoleBinding {
    #[default]
    Unbound,
    /// Waiting for its source role to resolve
    Sourced,
    /// A grouping that is not validated yet. `None` is the explicit null
    /// grouping: deliberately unbound.
    PreBound(Option<Arc<GroupingSpec>>),
    /// A grouping validated against and bound to a concrete complex type
    Bound(Arc<GroupingSpec>),
    /// Permanently unbound
    Declined,
}

/// Options of [`VisualRole::flatten`] and [`VisualRole::select`]
#[derive(Debug, Clone)]
pub struct RoleGroupOptions {
    /// Overrides the role's preferred traversal mode (flatten only)
    pub traversal_mode: Option<TraversalMode>,
    /// Reverse on top of the role's own `is_reversed`
    pub reverse: bool,
    pub visible: Option<bool>,
    pub is_null: Option<bool>,
    pub root_label: Option<String>,
}

impl Default for RoleGroupOptions {
    fn default() -> Self {
        Self {
            traversal_mode: None,
            reverse: false,
            visible: None,
            is_null: Some(false),
            root_label: None,
        }
    }
}

impl RoleGroupOptions {
    pub fn with_traversal_mode(mut self, mode: TraversalMode) -> Self {
        self.traversal_mode = Some(mode);
        self
    }

    pub fn with_reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    pub fn with_visible(mut self, visible: Option<bool>) -> Self {
        self.visible = visible;
        self
    }

    pub fn with_is_null(mut self, is_null: Option<bool>) -> Self {
        self.is_null = is_null;
        self
    }

    pub fn with_root_label(mut self, root_label: impl Into<String>) -> Self {
        self.root_label = Some(root_label.into());
        self
    }
}

/// A declared role and its binding
#[derive(Debug, Clone)]
pub struct VisualRole {
    def: VisualRoleDef,
    qualified_name: String,
    binding: RoleBinding,
    source_role: Option<String>,
    is_reversed: bool,
}

impl VisualRole {
    pub fn new(def: VisualRoleDef) -> Self {
        Self {
            qualified_name: def.qualified_name(),
            def,
            binding: RoleBinding::Unbound,
            source_role: None,
            is_reversed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub fn def(&self) -> &VisualRoleDef {
        &self.def
    }

    pub fn binding(&self) -> &RoleBinding {
        &self.binding
    }

    pub fn is_bound(&self) -> bool {
        matches!(self.binding, RoleBinding::Bound(_))
    }

    pub fn is_pre_bound(&self) -> bool {
        matches!(self.binding, RoleBinding::PreBound(_))
    }

    /// Sourced and still waiting for its source
    pub fn is_sourced(&self) -> bool {
        matches!(self.binding, RoleBinding::Sourced)
    }

    pub fn is_declined(&self) -> bool {
        matches!(self.binding, RoleBinding::Declined)
    }

    /// The bound or pre-bound grouping
    pub fn grouping(&self) -> Option<&Arc<GroupingSpec>> {
        match &self.binding {
            RoleBinding::Bound(spec) | RoleBinding::PreBound(Some(spec)) => Some(spec),
            _ => None,
        }
    }

    pub fn dimension_names(&self) -> Vec<&str> {
        self.grouping()
            .map(|g| g.dimension_names())
            .unwrap_or_default()
    }

    pub fn first_dimension_name(&self) -> Option<&str> {
        self.grouping().and_then(|g| g.first_dimension_name())
    }

    pub fn is_discrete(&self) -> bool {
        self.grouping().is_some_and(|g| g.is_discrete())
    }

    /// Qualified name of the role this one takes its grouping from
    pub fn source_role(&self) -> Option<&str> {
        self.source_role.as_deref()
    }

    pub fn is_reversed(&self) -> bool {
        self.is_reversed
    }

    pub(crate) fn set_reversed(&mut self, is_reversed: bool) {
        self.is_reversed = is_reversed;
    }

    pub(crate) fn set_source_role(&mut self, source: &str) -> Result<(), CccVisualError> {
        self.require_unbound()?;
        self.source_role = Some(source.to_string());
        self.binding = RoleBinding::Sourced;
        Ok(())
    }

    pub(crate) fn pre_bind(&mut self, grouping: Option<Arc<GroupingSpec>>) -> Result<(), CccVisualError> {
        if !self.is_sourced() {
            self.require_unbound()?;
        }
        self.binding = RoleBinding::PreBound(grouping);
        Ok(())
    }

    pub(crate) fn decline(&mut self) {
        self.binding = RoleBinding::Declined;
    }

    fn require_unbound(&self) -> Result<(), CccVisualError> {
        match self.binding {
            RoleBinding::Unbound => Ok(()),
            _ => Err(CccVisualError::RoleAlreadyBound(self.qualified_name.clone())),
        }
    }

    /// Validate the pre-bound grouping against `complex_type` and bind it.
    ///
    /// Continuous dimensions of a role requiring discreteness are coerced to
    /// discrete in `complex_type`. The explicit null grouping declines the role.
    pub(crate) fn commit(&mut self, complex_type: &mut ComplexType) -> Result<(), CccVisualError> {
        let spec = match self.binding.clone() {
            RoleBinding::PreBound(Some(spec)) => spec,
            RoleBinding::PreBound(None) => {
                log::debug!("role `{}` declined by configuration", self.qualified_name);
                self.binding = RoleBinding::Declined;
                return Ok(());
            }
            RoleBinding::Bound(_) => {
                return Err(CccVisualError::RoleAlreadyBound(self.qualified_name.clone()))
            }
            _ => return Ok(()),
        };

        if self.def.require_single_dimension && !spec.is_single_dimension() {
            return Err(CccVisualError::InvalidArgument(format!(
                "role `{}` requires a single dimension but is bound to `{}`",
                self.qualified_name,
                spec.key()
            )));
        }
        for name in spec.dimension_names() {
            let dim_type = complex_type.require_dimension(name)?;
            if let Some(value_type) = self.def.value_type {
                if value_type != ValueType::Any && dim_type.value_type() != value_type {
                    return Err(CccVisualError::InvalidArgument(format!(
                        "role `{}` requires {value_type} dimensions but `{name}` is {}",
                        self.qualified_name,
                        dim_type.value_type()
                    )));
                }
            }
            match self.def.require_is_discrete {
                Some(true) if !dim_type.is_discrete() => {
                    if let Some(dim_type) = complex_type.dimension_mut(name) {
                        dim_type.to_discrete();
                        log::info!(
                            "dimension `{name}` coerced to discrete for role `{}`",
                            self.qualified_name
                        );
                    }
                }
                Some(false) if dim_type.is_discrete() => {
                    return Err(CccVisualError::InvalidArgument(format!(
                        "role `{}` requires continuous dimensions but `{name}` is discrete",
                        self.qualified_name
                    )));
                }
                _ => {}
            }
        }

        self.binding = RoleBinding::Bound(spec.bind(complex_type)?);
        Ok(())
    }

    fn bound_grouping(&self) -> Result<&Arc<GroupingSpec>, CccVisualError> {
        match &self.binding {
            RoleBinding::Bound(spec) => Ok(spec),
            _ => Err(CccVisualError::RoleNotBound(self.qualified_name.clone())),
        }
    }

    fn grouping_options(&self, options: &RoleGroupOptions) -> GroupingOptions {
        GroupingOptions::default()
            .with_visible(options.visible)
            .with_is_null(options.is_null)
            .with_reverse(self.is_reversed != options.reverse)
    }

    /// Group `base` by the role's grouping walked in a flattened traversal mode
    pub fn flatten(
        &self,
        data: &mut DataSet,
        base: DataId,
        options: &RoleGroupOptions,
    ) -> Result<DataId, CccVisualError> {
        let mode = options.traversal_mode.unwrap_or(self.def.traversal_mode);
        if !self.def.traversal_modes.supports(mode) {
            return Err(CccVisualError::InvalidArgument(format!(
                "role `{}` does not support traversal mode {mode}",
                self.qualified_name
            )));
        }
        let mut spec = self.bound_grouping()?.ensure(&mode.ensure_options());
        if let Some(root_label) = &options.root_label {
            spec = spec.ensure(&EnsureOptions::default().with_root_label(root_label.clone()));
        }
        Ok(data.group_by(base, &[spec], &self.grouping_options(options))?)
    }

    /// Group `base` by the role's grouping as a tree
    pub fn select(
        &self,
        data: &mut DataSet,
        base: DataId,
        options: &RoleGroupOptions,
    ) -> Result<DataId, CccVisualError> {
        let spec = self.bound_grouping()?.clone();
        Ok(data.group_by(base, &[spec], &self.grouping_options(options))?)
    }
}

#[cfg(test)]
mod tests {
    use ccc_data::{DimensionType, LoadOptions, Record};

    use super::*;

    fn complex_type() -> Result<ComplexType, CccVisualError> {
        Ok(ComplexType::new()
            .with_dimension(DimensionType::new("series", ValueType::String))?
            .with_dimension(DimensionType::new("category", ValueType::String))?
            .with_dimension(DimensionType::new("value", ValueType::Number))?)
    }

    fn pre_bound(def: VisualRoleDef, text: &str) -> VisualRole {
        let mut role = VisualRole::new(def);
        role.pre_bind(Some(Arc::new(GroupingSpec::parse(text).unwrap())))
            .unwrap();
        role
    }

    #[test]
    fn test_commit_binds_grouping() -> Result<(), CccVisualError> {
        let mut ct = complex_type()?;
        let mut role = pre_bound(VisualRoleDef::new("series"), "series");
        role.commit(&mut ct)?;
        assert!(role.is_bound());
        assert_eq!(role.grouping().and_then(|g| g.type_id()), Some(ct.id()));
        assert_eq!(role.dimension_names(), vec!["series"]);
        assert!(role.is_discrete());
        assert!(matches!(
            role.pre_bind(None),
            Err(CccVisualError::RoleAlreadyBound(_))
        ));
        Ok(())
    }

    #[test]
    fn test_commit_declines_null_grouping() -> Result<(), CccVisualError> {
        let mut ct = complex_type()?;
        let mut role = VisualRole::new(VisualRoleDef::new("size"));
        role.pre_bind(None)?;
        role.commit(&mut ct)?;
        assert!(role.is_declined());
        assert!(role.grouping().is_none());
        Ok(())
    }

    #[test]
    fn test_single_dimension_and_value_type_rules() -> Result<(), CccVisualError> {
        let mut ct = complex_type()?;
        let mut role = pre_bound(
            VisualRoleDef::new("color").with_single_dimension(true),
            "series,category",
        );
        assert!(matches!(
            role.commit(&mut ct),
            Err(CccVisualError::InvalidArgument(_))
        ));

        let mut role = pre_bound(
            VisualRoleDef::new("value").with_value_type(ValueType::Number),
            "series",
        );
        assert!(matches!(
            role.commit(&mut ct),
            Err(CccVisualError::InvalidArgument(_))
        ));
        Ok(())
    }

    #[test]
    fn test_discreteness_coercion_is_one_way() -> Result<(), CccVisualError> {
        let mut ct = complex_type()?;
        let mut category = pre_bound(
            VisualRoleDef::new("category").with_discrete(Some(true)),
            "value",
        );
        category.commit(&mut ct)?;
        assert!(ct.require_dimension("value")?.is_discrete());
        assert!(category.is_discrete());

        let mut measure = pre_bound(
            VisualRoleDef::new("value").with_discrete(Some(false)),
            "series",
        );
        assert!(matches!(
            measure.commit(&mut ct),
            Err(CccVisualError::InvalidArgument(_))
        ));
        Ok(())
    }

    #[test]
    fn test_flatten_and_select() -> Result<(), CccVisualError> {
        let mut ct = complex_type()?;
        let mut role = pre_bound(VisualRoleDef::new("category"), "series,category");
        role.commit(&mut ct)?;
        let mut data = DataSet::new(ct);
        data.load(
            vec![
                Record::new().with("series", "A").with("category", "x").with("value", 1),
                Record::new().with("series", "B").with("category", "x").with("value", 2),
                Record::new().with("series", "A").with("category", "y").with("value", 3),
            ],
            &LoadOptions::default(),
        )?;
        let root = data.root();

        let flat = role.flatten(&mut data, root, &RoleGroupOptions::default())?;
        let keys = data
            .data(flat)?
            .child_refs()
            .map(|c| c.key().to_string())
            .collect::<Vec<_>>();
        assert_eq!(keys, vec!["A~x", "B~x", "A~y"]);

        let tree = role.select(&mut data, root, &RoleGroupOptions::default())?;
        assert_eq!(data.data(tree)?.child_count(), 2);
        assert_eq!(data.data(tree)?.tree_height(), 2);

        let reversed = role.select(
            &mut data,
            root,
            &RoleGroupOptions::default().with_reverse(true),
        )?;
        let keys = data
            .data(reversed)?
            .child_refs()
            .map(|c| c.key().to_string())
            .collect::<Vec<_>>();
        assert_eq!(keys, vec!["B", "A"]);
        Ok(())
    }

    #[test]
    fn test_flatten_requires_bound_role() -> Result<(), CccVisualError> {
        let mut data = DataSet::new(complex_type()?);
        let role = VisualRole::new(VisualRoleDef::new("category"));
        let root = data.root();
        assert!(matches!(
            role.flatten(&mut data, root, &RoleGroupOptions::default()),
            Err(CccVisualError::RoleNotBound(_))
        ));
        Ok(())
    }
}
