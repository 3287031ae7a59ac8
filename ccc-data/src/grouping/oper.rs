use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use itertools::Itertools;

use super::spec::{FlattenMode, GroupingSpec};
use crate::data::DatumFilter;
use crate::datum::DatumPredicate;

/// Options of [`crate::data::DataSet::group_by`]
#[derive(Clone)]
pub struct GroupingOptions {
    /// Pre-filter on the datum's visible flag
    pub visible: Option<bool>,
    /// Pre-filter on the datum's selected flag. Makes the grouping uncacheable.
    pub selected: Option<bool>,
    /// Post-filter on the datum's null flag; `Some(false)` by default
    pub is_null: Option<bool>,
    /// Custom pre-filter
    pub predicate: Option<DatumPredicate>,
    /// Identifies `predicate` for caching. A predicate without a key makes the grouping uncacheable.
    pub predicate_key: Option<String>,
    /// Reverse the order of every grouping dimension
    pub reverse: bool,
}

impl Default for GroupingOptions {
    fn default() -> Self {
        Self {
            visible: None,
            selected: None,
            is_null: Some(false),
            predicate: None,
            predicate_key: None,
            reverse: false,
        }
    }
}

impl Debug for GroupingOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupingOptions")
            .field("visible", &self.visible)
            .field("selected", &self.selected)
            .field("is_null", &self.is_null)
            .field("predicate", &self.predicate.is_some())
            .field("predicate_key", &self.predicate_key)
            .field("reverse", &self.reverse)
            .finish()
    }
}

impl GroupingOptions {
    /// No filtering at all. Used for query indexes.
    pub fn index() -> Self {
        Self {
            is_null: None,
            ..Default::default()
        }
    }

    pub fn with_visible(mut self, visible: Option<bool>) -> Self {
        self.visible = visible;
        self
    }

    pub fn with_selected(mut self, selected: Option<bool>) -> Self {
        self.selected = selected;
        self
    }

    pub fn with_is_null(mut self, is_null: Option<bool>) -> Self {
        self.is_null = is_null;
        self
    }

    pub fn with_predicate(mut self, predicate: DatumPredicate, key: Option<&str>) -> Self {
        self.predicate = Some(predicate);
        self.predicate_key = key.map(|k| k.to_string());
        self
    }

    pub fn with_reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }
}

/// One effective output level of a grouping operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LevelPlan {
    /// Level `level` of spec `spec`, one generation of children
    Level { spec: usize, level: usize },
    /// All levels of spec `spec` emitted as siblings
    Flattened { spec: usize },
}

/// A compiled group-by: chained grouping specs plus pre- and post-filters.
///
/// Kept on the root of its result so datums added upstream can be merged
/// into the existing tree.
pub struct GroupingOper {
    specs: Vec<Arc<GroupingSpec>>,
    plan: Vec<LevelPlan>,
    key: Option<String>,
    pre_filter: DatumFilter,
    post_filter: DatumFilter,
}

impl Debug for GroupingOper {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupingOper")
            .field("specs", &self.specs.iter().map(|s| s.key()).collect::<Vec<_>>())
            .field("key", &self.key)
            .finish()
    }
}

impl GroupingOper {
    /// `specs` must already be bound and reversed as requested by `options`
    pub(crate) fn new(specs: Vec<Arc<GroupingSpec>>, options: &GroupingOptions) -> Self {
        let plan = specs
            .iter()
            .enumerate()
            .flat_map(|(spec_index, spec)| match spec.flatten_mode() {
                FlattenMode::None => (0..spec.depth())
                    .map(|level| LevelPlan::Level {
                        spec: spec_index,
                        level,
                    })
                    .collect::<Vec<_>>(),
                FlattenMode::DfsPre | FlattenMode::DfsPost => {
                    vec![LevelPlan::Flattened { spec: spec_index }]
                }
            })
            .collect();
        let spec_keys = specs.iter().map(|s| s.key().to_string()).collect::<Vec<_>>();
        Self {
            key: Self::compose_key(&spec_keys, options),
            specs,
            plan,
            pre_filter: DatumFilter::states(
                options.visible,
                options.selected,
                None,
                options.predicate.clone(),
            ),
            post_filter: DatumFilter::states(None, None, options.is_null, None),
        }
    }

    /// Cache key of an operation, `None` when it must not be cached
    pub(crate) fn compose_key(spec_keys: &[String], options: &GroupingOptions) -> Option<String> {
        if options.selected.is_some()
            || (options.predicate.is_some() && options.predicate_key.is_none())
        {
            return None;
        }
        Some(format!(
            "{}||visible:{:?}|isNull:{:?}|where:{}",
            spec_keys.iter().join("||"),
            options.visible,
            options.is_null,
            options.predicate_key.as_deref().unwrap_or_default()
        ))
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn specs(&self) -> &[Arc<GroupingSpec>] {
        &self.specs
    }

    /// Number of effective levels; a flattened spec counts as one
    pub fn tree_height(&self) -> usize {
        self.plan.len()
    }

    pub(crate) fn plan(&self) -> &[LevelPlan] {
        &self.plan
    }

    pub(crate) fn pre_filter(&self) -> &DatumFilter {
        &self.pre_filter
    }

    pub(crate) fn post_filter(&self) -> &DatumFilter {
        &self.post_filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::Datum;

    fn oper(text: &str, options: &GroupingOptions) -> GroupingOper {
        GroupingOper::new(vec![Arc::new(GroupingSpec::parse(text).unwrap())], options)
    }

    #[test]
    fn test_key_encodes_filters() {
        let a = oper("a,b", &GroupingOptions::default());
        let b = oper("a,b", &GroupingOptions::default().with_visible(Some(true)));
        assert_ne!(a.key(), b.key());
        assert_eq!(a.key(), oper(" a , b ", &GroupingOptions::default()).key());
    }

    #[test]
    fn test_uncacheable_operations() {
        let selected = oper("a", &GroupingOptions::default().with_selected(Some(true)));
        assert_eq!(selected.key(), None);
        let predicate = GroupingOptions::default().with_predicate(Arc::new(|_: &Datum| true), None);
        assert_eq!(oper("a", &predicate).key(), None);
        let keyed = GroupingOptions::default().with_predicate(Arc::new(|_: &Datum| true), Some("all"));
        assert!(oper("a", &keyed).key().is_some_and(|k| k.ends_with("where:all")));
    }

    #[test]
    fn test_flattened_spec_is_one_level() {
        let spec = Arc::new(GroupingSpec::parse("a,b").unwrap()).ensure(
            &super::super::EnsureOptions::default().with_flatten_mode(FlattenMode::DfsPre),
        );
        let plain = Arc::new(GroupingSpec::parse("c,d").unwrap());
        let oper = GroupingOper::new(vec![spec, plain], &GroupingOptions::default());
        assert_eq!(oper.tree_height(), 3);
    }
}
