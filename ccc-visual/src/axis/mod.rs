//! Axes: the consumers of visual roles that derive ordered, distinct domain
//! values from grouped data for scale construction.

pub mod cartesian;
pub mod color;
pub mod conciliate;
pub mod registry;

use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use strum::{Display as StrumDisplay, EnumString, VariantNames};

use ccc_data::{
    ComplexType, DataId, DataSet, GroupingSpec, QueryClause, QuerySpec, Value, WhereOptions,
};

use crate::error::CccVisualError;
use crate::role::{RoleGroupOptions, VisualRole};
use crate::role_list::VisualRoleList;

pub use cartesian::{AxisOrientation, CartesianAxis};
pub use color::ColorAxis;
pub use conciliate::{cell_scale_type, conciliate, AxisConciliation};
pub use registry::{AxisConstructor, AxisRegistry};

#[derive(
    Debug,
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
pub enum ScaleType {
    Discrete,
    TimeSeries,
    Numeric,
}

impl ScaleType {
    pub fn is_discrete(&self) -> bool {
        matches!(self, ScaleType::Discrete)
    }
}

/// How an axis groups the data of its roles
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, StrumDisplay, EnumString,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum GroupOperator {
    #[default]
    Flatten,
    Select,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AxisOptions {
    /// Only visible datums contribute to the domain
    pub visible_only: bool,
    /// Null groups are left out of the domain
    pub ignore_nulls: bool,
    pub reverse: bool,
    pub group_operator: GroupOperator,
}

impl Default for AxisOptions {
    fn default() -> Self {
        Self {
            visible_only: true,
            ignore_nulls: true,
            reverse: false,
            group_operator: GroupOperator::Flatten,
        }
    }
}

impl AxisOptions {
    pub fn with_visible_only(mut self, visible_only: bool) -> Self {
        self.visible_only = visible_only;
        self
    }

    pub fn with_ignore_nulls(mut self, ignore_nulls: bool) -> Self {
        self.ignore_nulls = ignore_nulls;
        self
    }

    pub fn with_reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    pub fn with_group_operator(mut self, group_operator: GroupOperator) -> Self {
        self.group_operator = group_operator;
        self
    }
}

/// A role feeding an axis, optionally restricted to some data parts
#[derive(Debug, Clone, PartialEq)]
pub struct AxisDataCell {
    pub role: String,
    pub data_part: Option<QueryClause>,
}

impl AxisDataCell {
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            data_part: None,
        }
    }

    /// Keep only datums whose `dim_name` atom is one of `values`
    pub fn with_data_part<I, V>(mut self, dim_name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.data_part = Some(QueryClause::new().with_any(dim_name, values));
        self
    }
}

/// A data cell whose role is bound
#[derive(Debug, Clone)]
pub struct BoundAxisCell {
    role: VisualRole,
    data_part: Option<QuerySpec>,
}

impl BoundAxisCell {
    pub fn new(role: VisualRole, data_part: Option<QuerySpec>) -> Self {
        Self { role, data_part }
    }

    pub fn role(&self) -> &VisualRole {
        &self.role
    }

    pub fn data_part(&self) -> Option<&QuerySpec> {
        self.data_part.as_ref()
    }

    pub fn grouping(&self) -> Result<&Arc<GroupingSpec>, CccVisualError> {
        self.role
            .grouping()
            .ok_or_else(|| CccVisualError::RoleNotBound(self.role.qualified_name().to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScaleDomain {
    Discrete(Vec<Value>),
    Continuous { min: f64, max: f64 },
}

/// The scale an axis was given, mapping its domain onto a range
#[derive(Debug, Clone, PartialEq)]
pub struct AxisScale {
    pub domain: ScaleDomain,
    pub range: (f64, f64),
}

impl AxisScale {
    pub fn new(domain: ScaleDomain, range: (f64, f64)) -> Self {
        Self { domain, range }
    }

    pub fn is_discrete(&self) -> bool {
        matches!(self.domain, ScaleDomain::Discrete(_))
    }

    /// Position of `value` in the range: band centers for discrete domains,
    /// linear interpolation for continuous ones.
    pub fn position(&self, value: &Value) -> Option<f64> {
        let (start, end) = self.range;
        match &self.domain {
            ScaleDomain::Discrete(values) => {
                let index = values.iter().position(|v| v == value)?;
                let step = (end - start) / values.len() as f64;
                Some(start + step * (index as f64 + 0.5))
            }
            ScaleDomain::Continuous { min, max } => {
                let v = value.as_f64()?;
                if max == min {
                    return Some((start + end) / 2.0);
                }
                Some(start + (v - min) / (max - min) * (end - start))
            }
        }
    }
}

#[derive(Debug, Clone)]
struct AxisDomain {
    data: Vec<DataId>,
    items: Vec<DataId>,
    values: Vec<Value>,
}

/// State shared by every axis kind
#[derive(Debug, Clone)]
pub struct AxisCore {
    axis_type: String,
    index: usize,
    id: String,
    options: AxisOptions,
    cells: Vec<BoundAxisCell>,
    conciliation: Option<AxisConciliation>,
    domain: Option<AxisDomain>,
    scale: Option<AxisScale>,
}

impl AxisCore {
    /// The first axis of a type is identified by the type name, the next ones
    /// by the name followed by their one-based index (`base2`).
    pub fn new(axis_type: impl Into<String>, index: usize, options: AxisOptions) -> Self {
        let axis_type = axis_type.into();
        let id = if index == 0 {
            axis_type.clone()
        } else {
            format!("{axis_type}{}", index + 1)
        };
        Self {
            axis_type,
            index,
            id,
            options,
            cells: Vec::new(),
            conciliation: None,
            domain: None,
            scale: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn axis_type(&self) -> &str {
        &self.axis_type
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn options(&self) -> &AxisOptions {
        &self.options
    }

    pub fn cells(&self) -> &[BoundAxisCell] {
        &self.cells
    }

    pub fn is_bound(&self) -> bool {
        self.conciliation.is_some()
    }

    pub fn conciliation(&self) -> Option<&AxisConciliation> {
        self.conciliation.as_ref()
    }

    pub fn scale(&self) -> Option<&AxisScale> {
        self.scale.as_ref()
    }

    /// Bind the cells whose roles are bound. Cells of unbound or declined
    /// roles are skipped; an axis left without cells stays unbound.
    pub fn bind(
        &mut self,
        cells: &[AxisDataCell],
        roles: &VisualRoleList,
        complex_type: &ComplexType,
    ) -> Result<(), CccVisualError> {
        let mut bound = Vec::new();
        for cell in cells {
            let role = roles.require(&cell.role)?;
            if !role.is_bound() {
                log::debug!(
                    "axis `{}` skips role `{}` which is not bound",
                    self.id,
                    role.qualified_name()
                );
                continue;
            }
            let data_part = cell.data_part.clone().map(QuerySpec::from);
            bound.push(BoundAxisCell::new(role.clone(), data_part));
        }

        self.invalidate();
        self.scale = None;
        if bound.is_empty() {
            self.cells.clear();
            self.conciliation = None;
            return Ok(());
        }
        self.conciliation = Some(conciliate(&self.id, &bound, complex_type)?);
        self.cells = bound;
        Ok(())
    }

    fn require_conciliation(&self) -> Result<&AxisConciliation, CccVisualError> {
        self.conciliation
            .as_ref()
            .ok_or_else(|| CccVisualError::AxisNotBound(self.id.clone()))
    }

    pub fn scale_type(&self) -> Option<ScaleType> {
        self.conciliation.as_ref().map(|c| c.scale_type)
    }

    fn cell_domain_data(
        &self,
        cell: &BoundAxisCell,
        data: &mut DataSet,
        base: DataId,
    ) -> Result<DataId, CccVisualError> {
        let conciliation = self.require_conciliation()?;
        let source = match cell.data_part() {
            Some(query) => data.where_(base, Some(query), &WhereOptions::default())?,
            None => base,
        };
        let options = RoleGroupOptions {
            traversal_mode: conciliation.traversal_mode,
            reverse: self.options.reverse,
            visible: self.options.visible_only.then_some(true),
            is_null: self.options.ignore_nulls.then_some(false),
            root_label: conciliation.root_label.clone(),
        };
        match self.options.group_operator {
            GroupOperator::Flatten => cell.role().flatten(data, source, &options),
            GroupOperator::Select => cell.role().select(data, source, &options),
        }
    }

    fn ensure_domain(
        &mut self,
        data: &mut DataSet,
        base: DataId,
    ) -> Result<&AxisDomain, CccVisualError> {
        self.require_conciliation()?;
        let stale = match &self.domain {
            Some(domain) => domain.data.iter().any(|id| data.is_disposed(*id)),
            None => true,
        };
        if stale {
            let mut domain_data = Vec::with_capacity(self.cells.len());
            for cell in &self.cells {
                domain_data.push(self.cell_domain_data(cell, data, base)?);
            }
            self.domain = Some(compute_domain(data, domain_data)?);
        }
        self.domain
            .as_ref()
            .ok_or_else(|| CccVisualError::AxisNotBound(self.id.clone()))
    }

    /// One grouped data per bound cell, in cell order
    pub fn domain_data(
        &mut self,
        data: &mut DataSet,
        base: DataId,
    ) -> Result<Vec<DataId>, CccVisualError> {
        Ok(self.ensure_domain(data, base)?.data.clone())
    }

    pub fn domain_items(
        &mut self,
        data: &mut DataSet,
        base: DataId,
    ) -> Result<Vec<DataId>, CccVisualError> {
        Ok(self.ensure_domain(data, base)?.items.clone())
    }

    pub fn domain_values(
        &mut self,
        data: &mut DataSet,
        base: DataId,
    ) -> Result<Vec<Value>, CccVisualError> {
        Ok(self.ensure_domain(data, base)?.values.clone())
    }

    /// Accept a scale whose domain kind matches the axis scale type
    pub fn set_scale(&mut self, scale: AxisScale) -> Result<(), CccVisualError> {
        let scale_type = self.require_conciliation()?.scale_type;
        if scale.is_discrete() != scale_type.is_discrete() {
            return Err(CccVisualError::InvalidArgument(format!(
                "axis `{}` of scale type {scale_type} cannot take a {} scale",
                self.id,
                if scale.is_discrete() { "discrete" } else { "continuous" }
            )));
        }
        self.scale = Some(scale);
        Ok(())
    }

    /// Drop the cached domain; the next request regroups the data
    pub fn invalidate(&mut self) {
        self.domain = None;
    }
}

/// Children of every domain data, de-duplicated by value in first-occurrence order
fn compute_domain(data: &DataSet, domain_data: Vec<DataId>) -> Result<AxisDomain, CccVisualError> {
    let mut children = Vec::new();
    for id in &domain_data {
        children.extend(data.data(*id)?.child_refs().map(|c| (c.id(), c.value())));
    }
    let items = children
        .into_iter()
        .unique_by(|(_, value)| value.as_ref().map(Value::key))
        .collect::<Vec<_>>();
    Ok(AxisDomain {
        data: domain_data,
        values: items.iter().filter_map(|(_, v)| v.clone()).collect(),
        items: items.into_iter().map(|(id, _)| id).collect(),
    })
}

/// An axis kind: a fixed capability set over a shared [`AxisCore`]
pub trait Axis: Debug + Send + Sync {
    fn core(&self) -> &AxisCore;
    fn core_mut(&mut self) -> &mut AxisCore;
    fn clone_box(&self) -> Box<dyn Axis>;
    fn as_any(&self) -> &dyn Any;

    fn id(&self) -> &str {
        self.core().id()
    }

    fn axis_type(&self) -> &str {
        self.core().axis_type()
    }

    fn bind(
        &mut self,
        cells: &[AxisDataCell],
        roles: &VisualRoleList,
        complex_type: &ComplexType,
    ) -> Result<(), CccVisualError> {
        self.core_mut().bind(cells, roles, complex_type)
    }

    fn is_bound(&self) -> bool {
        self.core().is_bound()
    }

    fn scale_type(&self) -> Option<ScaleType> {
        self.core().scale_type()
    }

    fn domain_data(
        &mut self,
        data: &mut DataSet,
        base: DataId,
    ) -> Result<Vec<DataId>, CccVisualError> {
        self.core_mut().domain_data(data, base)
    }

    fn domain_items(
        &mut self,
        data: &mut DataSet,
        base: DataId,
    ) -> Result<Vec<DataId>, CccVisualError> {
        self.core_mut().domain_items(data, base)
    }

    fn domain_values(
        &mut self,
        data: &mut DataSet,
        base: DataId,
    ) -> Result<Vec<Value>, CccVisualError> {
        self.core_mut().domain_values(data, base)
    }

    fn set_scale(&mut self, scale: AxisScale) -> Result<(), CccVisualError> {
        self.core_mut().set_scale(scale)
    }

    fn scale(&self) -> Option<&AxisScale> {
        self.core().scale()
    }

    fn invalidate(&mut self) {
        self.core_mut().invalidate()
    }
}

impl Clone for Box<dyn Axis> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

#[cfg(test)]
mod tests {
    use ccc_data::{ComplexTypeProject, DimensionSpec, LoadOptions, Record, ValueType};

    use super::*;
    use crate::binder::VisualRolesBinder;
    use crate::config::{RoleConfig, RoleOptions};
    use crate::role::VisualRoleDef;

    fn bound_roles() -> Result<(VisualRoleList, DataSet), CccVisualError> {
        let mut roles = VisualRoleList::new();
        roles.add(VisualRoleDef::new("series"))?;
        roles.add(VisualRoleDef::new("category"))?;
        roles.add(VisualRoleDef::new("value").with_discrete(Some(false)))?;
        roles.add(VisualRoleDef::new("color").with_default_source_role("series"))?;
        let options = RoleOptions::new()
            .with("series", RoleConfig::dimensions("series"))
            .with("category", RoleConfig::dimensions("category"))
            .with("value", RoleConfig::dimensions("value"));

        let mut binder = VisualRolesBinder::new(roles, options);
        let mut project = ComplexTypeProject::new();
        binder.init(&mut project)?;
        project.set_dim("value", DimensionSpec::new().value_type(ValueType::Number));
        binder.dimensions_finished(&mut project)?;
        let mut complex_type = project.configure_complex_type()?;
        binder.bind(&mut complex_type)?;

        let mut data = DataSet::new(complex_type);
        data.load(
            vec![
                Record::new().with("series", "A").with("category", "x").with("value", 1),
                Record::new().with("series", "B").with("category", "x").with("value", 2),
                Record::new().with("series", "A").with("category", "y").with("value", 3),
            ],
            &LoadOptions::default(),
        )?;
        Ok((binder.into_roles(), data))
    }

    fn strings(values: &[Value]) -> Vec<String> {
        values.iter().map(|v| v.key()).collect()
    }

    #[test]
    fn test_discrete_domain_is_cached_until_invalidated() -> Result<(), CccVisualError> {
        let (roles, mut data) = bound_roles()?;
        let root = data.root();
        let mut axis = CartesianAxis::new("base", 0, AxisOrientation::X, AxisOptions::default());
        axis.bind(&[AxisDataCell::new("category")], &roles, data.complex_type())?;
        assert_eq!(axis.scale_type(), Some(ScaleType::Discrete));
        assert_eq!(strings(&axis.domain_values(&mut data, root)?), vec!["x", "y"]);
        assert_eq!(axis.domain_items(&mut data, root)?.len(), 2);

        data.add(
            vec![Record::new().with("series", "B").with("category", "z").with("value", 4)],
            &LoadOptions::default(),
        )?;
        assert_eq!(strings(&axis.domain_values(&mut data, root)?), vec!["x", "y"]);
        axis.invalidate();
        assert_eq!(strings(&axis.domain_values(&mut data, root)?), vec!["x", "y", "z"]);
        Ok(())
    }

    #[test]
    fn test_multiple_cells_deduplicate_values() -> Result<(), CccVisualError> {
        let (roles, mut data) = bound_roles()?;
        let root = data.root();
        let mut axis = ColorAxis::new(0, AxisOptions::default());
        axis.bind(
            &[AxisDataCell::new("color"), AxisDataCell::new("series")],
            &roles,
            data.complex_type(),
        )?;
        assert_eq!(axis.domain_data(&mut data, root)?.len(), 2);
        assert_eq!(strings(&axis.domain_values(&mut data, root)?), vec!["A", "B"]);

        axis.fit_scale(&mut data, root)?;
        assert_eq!(axis.color_of(&Value::string("A")), Some("#1f77b4"));
        assert_eq!(axis.color_of(&Value::string("B")), Some("#ff7f0e"));
        assert_eq!(axis.color_of(&Value::string("C")), None);
        Ok(())
    }

    #[test]
    fn test_data_part_and_visibility_filters() -> Result<(), CccVisualError> {
        let (roles, mut data) = bound_roles()?;
        let root = data.root();
        let mut axis = CartesianAxis::new("base", 0, AxisOrientation::X, AxisOptions::default());
        axis.bind(
            &[AxisDataCell::new("category").with_data_part("series", ["B"])],
            &roles,
            data.complex_type(),
        )?;
        assert_eq!(strings(&axis.domain_values(&mut data, root)?), vec!["x"]);

        let mut axis = CartesianAxis::new("base", 0, AxisOrientation::X, AxisOptions::default());
        axis.bind(&[AxisDataCell::new("category")], &roles, data.complex_type())?;
        let hidden = data.data(root)?.datum_ids()[2];
        data.set_visible(hidden, false)?;
        assert_eq!(strings(&axis.domain_values(&mut data, root)?), vec!["x"]);

        let mut axis = CartesianAxis::new(
            "base",
            0,
            AxisOrientation::X,
            AxisOptions::default().with_visible_only(false),
        );
        axis.bind(&[AxisDataCell::new("category")], &roles, data.complex_type())?;
        assert_eq!(strings(&axis.domain_values(&mut data, root)?), vec!["x", "y"]);
        Ok(())
    }

    #[test]
    fn test_continuous_extent_and_scale() -> Result<(), CccVisualError> {
        let (roles, mut data) = bound_roles()?;
        let root = data.root();
        let mut axis = CartesianAxis::new("ortho", 0, AxisOrientation::Y, AxisOptions::default());
        axis.bind(&[AxisDataCell::new("value")], &roles, data.complex_type())?;
        assert_eq!(axis.scale_type(), Some(ScaleType::Numeric));
        assert_eq!(axis.domain_extent(&mut data, root)?, Some((1.0, 3.0)));

        let scale = axis.fit_scale(&mut data, root, (0.0, 100.0))?;
        assert_eq!(scale.position(&Value::number(2.0)), Some(50.0));
        assert!(axis
            .set_scale(AxisScale::new(ScaleDomain::Discrete(vec![]), (0.0, 1.0)))
            .is_err());
        Ok(())
    }

    #[test]
    fn test_unbound_roles_leave_axis_unbound() -> Result<(), CccVisualError> {
        let mut roles = VisualRoleList::new();
        roles.add(VisualRoleDef::new("size"))?;
        let complex_type = ComplexType::new();
        let mut data = DataSet::new(complex_type.clone());
        let root = data.root();
        let mut axis = CartesianAxis::new("base", 0, AxisOrientation::X, AxisOptions::default());
        axis.bind(&[AxisDataCell::new("size")], &roles, &complex_type)?;
        assert!(!axis.is_bound());
        assert!(matches!(
            axis.domain_values(&mut data, root),
            Err(CccVisualError::AxisNotBound(_))
        ));
        assert!(matches!(
            axis.bind(&[AxisDataCell::new("shape")], &roles, &complex_type),
            Err(CccVisualError::UnknownRole(_))
        ));
        Ok(())
    }
}
