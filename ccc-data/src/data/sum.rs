use super::{DataId, DataSet};
use crate::error::CccDataError;

impl DataSet {
    /// Sum of the absolute values of a numeric dimension below `id`.
    ///
    /// Summed over the immediate children, recursively, so flattened groups
    /// that duplicate their descendants (non-degenerate flatten groups) are
    /// skipped. A node without children sums its own datums; null datums and
    /// null values count as 0. Results are cached per node until it receives
    /// new datums or a datum changes its null state.
    pub fn dimensions_sum_abs(&mut self, id: DataId, dim_name: &str) -> Result<f64, CccDataError> {
        self.dimension(dim_name)?;
        if let Some(sum) = self.node(id)?.caches.sum_abs.get(dim_name) {
            return Ok(*sum);
        }

        let node = self.node(id)?;
        let sum = if node.children.is_empty() {
            let mut sum = 0.0;
            for datum_id in &node.datums {
                let datum = self.store.get(*datum_id)?;
                if datum.is_null() {
                    continue;
                }
                sum += datum
                    .value(dim_name)
                    .and_then(|v| v.as_f64())
                    .map(f64::abs)
                    .unwrap_or(0.0);
            }
            sum
        } else {
            let children = node
                .children
                .iter()
                .copied()
                .filter(|child| {
                    self.node(*child)
                        .map(|c| !c.is_flatten_group || c.is_degenerate_flatten_group)
                        .unwrap_or(false)
                })
                .collect::<Vec<_>>();
            let mut sum = 0.0;
            for child in children {
                sum += self.dimensions_sum_abs(child, dim_name)?;
            }
            sum
        };

        self.node_mut(id)?
            .caches
            .sum_abs
            .insert(dim_name.to_string(), sum);
        Ok(sum)
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;

    use super::*;
    use crate::complex_type::{ComplexType, DimensionType};
    use crate::data::LoadOptions;
    use crate::datum::Record;
    use crate::grouping::GroupingOptions;
    use crate::value::ValueType;

    fn dataset() -> Result<DataSet, CccDataError> {
        let ct = ComplexType::new()
            .with_dimension(DimensionType::new("series", ValueType::String))?
            .with_dimension(DimensionType::new("value", ValueType::Number))?;
        let mut data = DataSet::new(ct);
        data.load(
            vec![
                Record::new().with("series", "A").with("value", -2.5),
                Record::new().with("series", "A").with("value", 1.0),
                Record::new().with("series", "B").with("value", 4.0),
            ],
            &LoadOptions::default(),
        )?;
        Ok(data)
    }

    #[test]
    fn test_sum_abs_over_children() -> Result<(), CccDataError> {
        let mut data = dataset()?;
        let grouped = data.group_by_text(data.root(), "series", &GroupingOptions::default())?;
        assert_approx_eq!(f64, data.dimensions_sum_abs(grouped, "value")?, 7.5);
        let a = data.data(grouped)?.children()[0];
        assert_approx_eq!(f64, data.dimensions_sum_abs(a, "value")?, 3.5);
        Ok(())
    }

    #[test]
    fn test_sum_abs_refreshes_after_add() -> Result<(), CccDataError> {
        let mut data = dataset()?;
        let grouped = data.group_by_text(data.root(), "series", &GroupingOptions::default())?;
        assert_approx_eq!(f64, data.dimensions_sum_abs(grouped, "value")?, 7.5);
        data.add(
            vec![Record::new().with("series", "B").with("value", -0.5)],
            &LoadOptions::default(),
        )?;
        assert_approx_eq!(f64, data.dimensions_sum_abs(grouped, "value")?, 8.0);
        Ok(())
    }

    #[test]
    fn test_sum_abs_follows_null_state() -> Result<(), CccDataError> {
        let mut data = dataset()?;
        let grouped = data.group_by_text(data.root(), "series", &GroupingOptions::default())?;
        let b = data.data(grouped)?.children()[1];
        assert_approx_eq!(f64, data.dimensions_sum_abs(grouped, "value")?, 7.5);
        assert_approx_eq!(f64, data.dimensions_sum_abs(b, "value")?, 4.0);

        let b_datum = data.data(b)?.datum_ids()[0];
        assert!(data.set_null(b_datum, true)?);
        assert_approx_eq!(f64, data.dimensions_sum_abs(grouped, "value")?, 3.5);
        assert_approx_eq!(f64, data.dimensions_sum_abs(b, "value")?, 0.0);

        assert!(data.set_null(b_datum, false)?);
        assert_approx_eq!(f64, data.dimensions_sum_abs(grouped, "value")?, 7.5);
        Ok(())
    }

    #[test]
    fn test_sum_abs_skips_flattened_duplicates() -> Result<(), CccDataError> {
        let mut data = dataset()?;
        let options = GroupingOptions::default();
        let spec = crate::grouping::GroupingSpec::parse("series")?;
        let flattened = std::sync::Arc::new(spec).ensure(
            &crate::grouping::EnsureOptions::default()
                .with_flatten_mode(crate::grouping::FlattenMode::DfsPre),
        );
        let grouped = data.group_by(data.root(), &[flattened], &options)?;
        // The flattened root node duplicates A and B and must not be counted
        assert_eq!(data.data(grouped)?.child_count(), 3);
        assert_approx_eq!(f64, data.dimensions_sum_abs(grouped, "value")?, 7.5);
        Ok(())
    }
}
