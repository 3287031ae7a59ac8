use std::any::Any;

use serde::{Deserialize, Serialize};
use strum::{Display as StrumDisplay, EnumString};

use ccc_data::{DataId, DataSet};

use crate::axis::{Axis, AxisCore, AxisOptions, AxisScale, ScaleDomain};
use crate::error::CccVisualError;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, StrumDisplay, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AxisOrientation {
    X,
    Y,
}

/// A positional axis of a cartesian plot
#[derive(Debug, Clone)]
pub struct CartesianAxis {
    core: AxisCore,
    orientation: AxisOrientation,
}

impl CartesianAxis {
    /// `axis_type` is `base` or `ortho`
    pub fn new(
        axis_type: impl Into<String>,
        index: usize,
        orientation: AxisOrientation,
        options: AxisOptions,
    ) -> Self {
        Self {
            core: AxisCore::new(axis_type, index, options),
            orientation,
        }
    }

    pub fn orientation(&self) -> AxisOrientation {
        self.orientation
    }

    /// Minimum and maximum of the domain values of a continuous axis, or
    /// `None` when the domain is empty
    pub fn domain_extent(
        &mut self,
        data: &mut DataSet,
        base: DataId,
    ) -> Result<Option<(f64, f64)>, CccVisualError> {
        if self.scale_type().is_some_and(|t| t.is_discrete()) {
            return Err(CccVisualError::InvalidArgument(format!(
                "discrete axis `{}` has no extent",
                self.id()
            )));
        }
        let values = self.domain_values(data, base)?;
        Ok(values
            .iter()
            .filter_map(|v| v.as_f64())
            .fold(None, |extent, v| match extent {
                None => Some((v, v)),
                Some((min, max)) => Some((f64::min(min, v), f64::max(max, v))),
            }))
    }

    /// Build a scale over the current domain mapped onto `range` and set it
    pub fn fit_scale(
        &mut self,
        data: &mut DataSet,
        base: DataId,
        range: (f64, f64),
    ) -> Result<&AxisScale, CccVisualError> {
        let discrete = self
            .scale_type()
            .ok_or_else(|| CccVisualError::AxisNotBound(self.id().to_string()))?
            .is_discrete();
        let domain = if discrete {
            ScaleDomain::Discrete(self.domain_values(data, base)?)
        } else {
            let (min, max) = self.domain_extent(data, base)?.unwrap_or((0.0, 1.0));
            ScaleDomain::Continuous { min, max }
        };
        self.set_scale(AxisScale::new(domain, range))?;
        self.scale()
            .ok_or_else(|| CccVisualError::AxisNotBound(self.id().to_string()))
    }
}

impl Axis for CartesianAxis {
    fn core(&self) -> &AxisCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AxisCore {
        &mut self.core
    }

    fn clone_box(&self) -> Box<dyn Axis> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
