use std::collections::HashMap;
use std::sync::Arc;

use crate::axis::{Axis, AxisOptions, AxisOrientation, CartesianAxis, ColorAxis};
use crate::error::CccVisualError;

pub type AxisConstructor = Arc<dyn Fn(usize, AxisOptions) -> Box<dyn Axis> + Send + Sync>;

/// Axis constructors by axis type name. Built once and passed to whatever
/// creates axes for a chart.
#[derive(Clone)]
pub struct AxisRegistry {
    constructors: HashMap<String, AxisConstructor>,
}

impl AxisRegistry {
    /// A registry without any axis type
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// A registry with the `base`, `ortho` and `color` axis types
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register("base", |index, options| {
            Box::new(CartesianAxis::new("base", index, AxisOrientation::X, options))
        });
        registry.register("ortho", |index, options| {
            Box::new(CartesianAxis::new("ortho", index, AxisOrientation::Y, options))
        });
        registry.register("color", |index, options| {
            Box::new(ColorAxis::new(index, options))
        });
        registry
    }

    /// Register or replace the constructor of `axis_type`
    pub fn register<F>(&mut self, axis_type: &str, constructor: F)
    where
        F: Fn(usize, AxisOptions) -> Box<dyn Axis> + Send + Sync + 'static,
    {
        self.constructors
            .insert(axis_type.to_string(), Arc::new(constructor));
    }

    pub fn contains(&self, axis_type: &str) -> bool {
        self.constructors.contains_key(axis_type)
    }

    /// Registered type names, sorted
    pub fn axis_types(&self) -> Vec<&str> {
        let mut names = self.constructors.keys().map(String::as_str).collect::<Vec<_>>();
        names.sort();
        names
    }

    pub fn create(
        &self,
        axis_type: &str,
        index: usize,
        options: AxisOptions,
    ) -> Result<Box<dyn Axis>, CccVisualError> {
        let constructor = self
            .constructors
            .get(axis_type)
            .ok_or_else(|| CccVisualError::UnknownAxisType(axis_type.to_string()))?;
        Ok(constructor(index, options))
    }
}

impl Default for AxisRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AxisRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AxisRegistry")
            .field("axis_types", &self.axis_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_axis_types() -> Result<(), CccVisualError> {
        let registry = AxisRegistry::default();
        assert_eq!(registry.axis_types(), vec!["base", "color", "ortho"]);

        let axis = registry.create("ortho", 1, AxisOptions::default())?;
        assert_eq!(axis.id(), "ortho2");
        assert_eq!(axis.axis_type(), "ortho");
        let cartesian = axis.as_any().downcast_ref::<CartesianAxis>().unwrap();
        assert_eq!(cartesian.orientation(), AxisOrientation::Y);
        assert!(!axis.is_bound());
        Ok(())
    }

    #[test]
    fn test_unknown_axis_type() {
        let registry = AxisRegistry::empty();
        assert!(matches!(
            registry.create("base", 0, AxisOptions::default()),
            Err(CccVisualError::UnknownAxisType(name)) if name == "base"
        ));
    }

    #[test]
    fn test_register_custom_axis_type() -> Result<(), CccVisualError> {
        let mut registry = AxisRegistry::empty();
        registry.register("size", |index, options| {
            Box::new(CartesianAxis::new("size", index, AxisOrientation::X, options))
        });
        assert!(registry.contains("size"));
        assert_eq!(registry.create("size", 0, AxisOptions::default())?.id(), "size");
        Ok(())
    }
}
