use std::any::Any;

use ccc_data::{DataId, DataSet, Value};

use crate::axis::{Axis, AxisCore, AxisOptions, AxisScale, ScaleDomain};
use crate::error::CccVisualError;

/// Default categorical colors
pub const DEFAULT_COLOR_SCHEME: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

/// Maps the domain values of the color role onto a color scheme
#[derive(Debug, Clone)]
pub struct ColorAxis {
    core: AxisCore,
    scheme: Vec<String>,
}

impl ColorAxis {
    pub fn new(index: usize, options: AxisOptions) -> Self {
        Self {
            core: AxisCore::new("color", index, options),
            scheme: DEFAULT_COLOR_SCHEME.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn with_scheme<I, S>(mut self, scheme: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scheme = scheme.into_iter().map(Into::into).collect();
        self
    }

    pub fn scheme(&self) -> &[String] {
        &self.scheme
    }

    /// Set a discrete scale over the domain values, one color slot per value
    pub fn fit_scale(&mut self, data: &mut DataSet, base: DataId) -> Result<(), CccVisualError> {
        let values = self.domain_values(data, base)?;
        let domain = if self.scale_type().is_some_and(|t| t.is_discrete()) {
            ScaleDomain::Discrete(values)
        } else {
            let numbers = values.iter().filter_map(|v| v.as_f64());
            let (min, max) = numbers.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
            if min > max {
                ScaleDomain::Continuous { min: 0.0, max: 1.0 }
            } else {
                ScaleDomain::Continuous { min, max }
            }
        };
        let slots = self.scheme.len().saturating_sub(1) as f64;
        self.set_scale(AxisScale::new(domain, (0.0, slots)))
    }

    /// Color of a domain value. Discrete values cycle through the scheme,
    /// continuous values pick the nearest slot.
    pub fn color_of(&self, value: &Value) -> Option<&str> {
        let scale = self.scale()?;
        if self.scheme.is_empty() {
            return None;
        }
        let index = match &scale.domain {
            ScaleDomain::Discrete(values) => values.iter().position(|v| v == value)?,
            ScaleDomain::Continuous { .. } => {
                let slot = scale.position(value)?.round().max(0.0) as usize;
                slot.min(self.scheme.len() - 1)
            }
        };
        self.scheme
            .get(index % self.scheme.len())
            .map(String::as_str)
    }
}

impl Axis for ColorAxis {
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
