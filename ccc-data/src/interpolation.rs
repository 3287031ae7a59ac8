use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display as StrumDisplay, EnumString, VariantNames};

use crate::data::{DataId, DataSet};
use crate::datum::{Datum, DatumId};
use crate::error::CccDataError;
use crate::grouping::{level_key, EnsureOptions, GroupingOptions, GroupingSpec};
use crate::value::{Value, ValueType};

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
pub enum InterpolationMode {
    /// Linear between the nearest known neighbours, by category index
    Linear,
    /// Missing values become 0
    Zero,
}

/// Options of [`DataSet::interpolate`]
#[derive(Debug, Clone)]
pub struct InterpolationOptions {
    pub mode: InterpolationMode,
    /// Categories, flattened to a single level
    pub category: Arc<GroupingSpec>,
    /// Series interpolated independently; all datums form one series when absent
    pub series: Option<Arc<GroupingSpec>>,
    pub value_dimension: String,
    /// Fill leading and trailing gaps with the nearest known value (linear mode only)
    pub stretch_ends: bool,
}

impl InterpolationOptions {
    pub fn new(
        mode: InterpolationMode,
        category: Arc<GroupingSpec>,
        value_dimension: impl Into<String>,
    ) -> Self {
        Self {
            mode,
            category,
            series: None,
            value_dimension: value_dimension.into(),
            stretch_ends: false,
        }
    }

    pub fn with_series(mut self, series: Arc<GroupingSpec>) -> Self {
        self.series = Some(series);
        self
    }

    pub fn with_stretch_ends(mut self, stretch_ends: bool) -> Self {
        self.stretch_ends = stretch_ends;
        self
    }
}

impl DataSet {
    /// Create virtual, interpolated datums for every (series, category) cell
    /// of `base` whose value is missing.
    ///
    /// The datums are added to the owner, so every live view receives them.
    /// Returns the ids of the created datums.
    pub fn interpolate(
        &mut self,
        base: DataId,
        options: &InterpolationOptions,
    ) -> Result<Vec<DatumId>, CccDataError> {
        let value_dim = options.value_dimension.as_str();
        let value_type = self.dimension(value_dim)?.dim_type().value_type();
        if value_type != ValueType::Number {
            return Err(CccDataError::InvalidArgument(format!(
                "cannot interpolate dimension `{value_dim}` of type {value_type}"
            )));
        }

        let single_level = EnsureOptions::default().with_single_level(true);
        let unfiltered = GroupingOptions::default().with_is_null(None);
        let category_spec = options.category.ensure(&single_level);
        let categories = self.single_level_groups(base, &category_spec, &unfiltered)?;
        let series_spec = options.series.as_ref().map(|s| s.ensure(&single_level));
        let series = match &series_spec {
            Some(spec) => self.single_level_groups(base, spec, &unfiltered)?,
            None => match categories.first() {
                Some((_, main)) => vec![(String::new(), *main)],
                None => Vec::new(),
            },
        };

        let mut known: HashMap<(String, String), f64> = HashMap::new();
        for datum in self.data(base)?.datums() {
            if datum.is_null() {
                continue;
            }
            let Some(value) = datum.value(value_dim).and_then(|v| v.as_f64()) else {
                continue;
            };
            let series_key = series_spec
                .as_ref()
                .map(|s| level_key(datum, &s.levels()[0]))
                .unwrap_or_default();
            let category_key = level_key(datum, &category_spec.levels()[0]);
            known.entry((series_key, category_key)).or_insert(value);
        }

        let category_dims = category_spec
            .dimension_names()
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>();
        let mut datums = Vec::new();
        for (series_key, series_main) in &series {
            let values = categories
                .iter()
                .map(|(category_key, _)| {
                    known
                        .get(&(series_key.clone(), category_key.clone()))
                        .copied()
                })
                .collect::<Vec<_>>();
            for (index, (_, category_main)) in categories.iter().enumerate() {
                if values[index].is_some() {
                    continue;
                }
                let Some(value) = fill_value(&values, index, options) else {
                    continue;
                };
                datums.push(self.virtual_datum(
                    *series_main,
                    *category_main,
                    &category_dims,
                    value_dim,
                    value,
                )?);
            }
        }

        for datum in &mut datums {
            datum.mark_interpolated(options.mode);
        }
        log::debug!("interpolating {} missing values", datums.len());
        self.add_datums(datums)
    }

    /// Key and main datum of each group of a single-level grouping of `base`
    fn single_level_groups(
        &mut self,
        base: DataId,
        spec: &Arc<GroupingSpec>,
        options: &GroupingOptions,
    ) -> Result<Vec<(String, DatumId)>, CccDataError> {
        let root = self.group_by(base, std::slice::from_ref(spec), options)?;
        let root = self.data(root)?;
        Ok(root
            .child_refs()
            .filter_map(|c| c.main_datum().map(|d| (c.key().to_string(), d.id())))
            .collect())
    }

    /// Copy of the series main datum, with the category atoms of the category
    /// main datum and the given value
    fn virtual_datum(
        &mut self,
        series_main: DatumId,
        category_main: DatumId,
        category_dims: &[String],
        value_dim: &str,
        value: f64,
    ) -> Result<Datum, CccDataError> {
        let mut atoms = self
            .get_datum(series_main)?
            .atoms()
            .map(|(_, a)| a.clone())
            .collect::<Vec<_>>();
        let category_datum = self.get_datum(category_main)?;
        for dim in category_dims {
            if let (Some(index), Some(atom)) = (
                self.complex_type.dimension_index(dim),
                category_datum.atom(dim),
            ) {
                atoms[index] = atom.clone();
            }
        }
        let value_atom = self
            .dimension_mut(value_dim)?
            .intern(Some(Value::number(value)))?;
        if let Some(index) = self.complex_type.dimension_index(value_dim) {
            atoms[index] = value_atom;
        }
        Ok(Datum::new(
            self.store.next_id(),
            self.complex_type.clone(),
            atoms,
        ))
    }
}

fn fill_value(values: &[Option<f64>], index: usize, options: &InterpolationOptions) -> Option<f64> {
    match options.mode {
        InterpolationMode::Zero => Some(0.0),
        InterpolationMode::Linear => {
            let previous = values[..index]
                .iter()
                .enumerate()
                .rev()
                .find_map(|(i, v)| v.map(|v| (i, v)));
            let next = values[index + 1..]
                .iter()
                .enumerate()
                .find_map(|(i, v)| v.map(|v| (index + 1 + i, v)));
            match (previous, next) {
                (Some((i, a)), Some((j, b))) => {
                    Some(a + (b - a) * (index - i) as f64 / (j - i) as f64)
                }
                (Some((_, v)), None) | (None, Some((_, v))) if options.stretch_ends => Some(v),
                _ => None,
            }
        }
    }
}
