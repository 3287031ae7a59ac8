use ccc_data::{ComplexType, ValueType};

use crate::axis::{BoundAxisCell, ScaleType};
use crate::error::CccVisualError;
use crate::traversal::{TraversalMode, TraversalModes};

/// The settings shared by all data cells of one axis
#[derive(Debug, Clone, PartialEq)]
pub struct AxisConciliation {
    pub scale_type: ScaleType,
    /// Shared traversal mode of discrete axes. Continuous cells keep the
    /// preferred mode of their role.
    pub traversal_mode: Option<TraversalMode>,
    pub root_label: Option<String>,
    pub dimension_names: Vec<String>,
}

/// Scale type implied by a cell's bound grouping
pub fn cell_scale_type(
    cell: &BoundAxisCell,
    complex_type: &ComplexType,
) -> Result<ScaleType, CccVisualError> {
    let grouping = cell.grouping()?;
    if grouping.is_discrete() {
        return Ok(ScaleType::Discrete);
    }
    let Some(name) = grouping.first_dimension_name() else {
        return Ok(ScaleType::Discrete);
    };
    Ok(match complex_type.require_dimension(name)?.value_type() {
        ValueType::Date => ScaleType::TimeSeries,
        _ => ScaleType::Numeric,
    })
}

/// Check the cells of axis `axis_id` agree and derive their shared settings
pub fn conciliate(
    axis_id: &str,
    cells: &[BoundAxisCell],
    complex_type: &ComplexType,
) -> Result<AxisConciliation, CccVisualError> {
    let fail = |reason: String| CccVisualError::AxisConciliation {
        axis: axis_id.to_string(),
        reason,
    };
    let Some(first) = cells.first() else {
        return Err(CccVisualError::AxisNotBound(axis_id.to_string()));
    };

    let scale_type = cell_scale_type(first, complex_type)?;
    let dimension_names = first
        .grouping()?
        .dimension_names()
        .into_iter()
        .map(String::from)
        .collect::<Vec<_>>();

    if scale_type == ScaleType::Discrete {
        let mut modes = TraversalModes::all();
        let mut root_label = None;
        for cell in cells {
            let grouping = cell.grouping()?;
            let names = grouping.dimension_names();
            if !cell_scale_type(cell, complex_type)?.is_discrete() || names != dimension_names {
                return Err(fail(format!(
                    "role `{}` is bound to `{}` but the axis groups by `{}`",
                    cell.role().qualified_name(),
                    grouping.key(),
                    dimension_names.join(",")
                )));
            }
            modes &= cell.role().def().traversal_modes;
            if root_label.is_none() {
                root_label = grouping
                    .root_label()
                    .filter(|l| !l.is_empty())
                    .map(String::from);
            }
        }
        let traversal_mode = modes
            .highest()
            .ok_or_else(|| fail("the roles share no traversal mode".to_string()))?;
        log::debug!("axis `{axis_id}` conciliated to traversal mode {traversal_mode}");
        return Ok(AxisConciliation {
            scale_type,
            traversal_mode: Some(traversal_mode),
            root_label,
            dimension_names,
        });
    }

    for cell in cells {
        let cell_type = cell_scale_type(cell, complex_type)?;
        if cell_type != scale_type {
            return Err(fail(format!(
                "role `{}` has scale type {cell_type} but the axis is {scale_type}",
                cell.role().qualified_name()
            )));
        }
        for name in cell.grouping()?.dimension_names() {
            if !complex_type.require_dimension(name)?.is_comparable() {
                return Err(fail(format!("dimension `{name}` is not comparable")));
            }
        }
    }
    Ok(AxisConciliation {
        scale_type,
        traversal_mode: None,
        root_label: None,
        dimension_names,
    })
}
