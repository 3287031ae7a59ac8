use std::collections::HashSet;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use indexmap::IndexMap;
use itertools::Itertools;

use super::{DataId, DataKind, DataNode, DataSet, Partition};
use crate::datum::{Datum, DatumId, DatumPredicate};
use crate::error::CccDataError;
use crate::grouping::{GroupingOper, GroupingOptions, GroupingSpec};
use crate::value::Value;

/// AND of per-dimension value lists. A datum matches when, for every
/// dimension, its atom equals one of the listed values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryClause {
    dims: IndexMap<String, Vec<Option<Value>>>,
}

impl QueryClause {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, dim_name: &str, value: impl Into<Value>) -> Self {
        self.dims
            .entry(dim_name.to_string())
            .or_default()
            .push(Some(value.into()));
        self
    }

    pub fn with_any<I, V>(mut self, dim_name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.dims
            .entry(dim_name.to_string())
            .or_default()
            .extend(values.into_iter().map(|v| Some(v.into())));
        self
    }

    pub fn with_null(mut self, dim_name: &str) -> Self {
        self.dims
            .entry(dim_name.to_string())
            .or_default()
            .push(None);
        self
    }

    pub fn dimension_names(&self) -> impl Iterator<Item = &str> {
        self.dims.keys().map(|k| k.as_str())
    }

    fn key(&self) -> String {
        self.dims
            .iter()
            .map(|(dim, values)| {
                let values = values
                    .iter()
                    .map(|v| v.as_ref().map(|v| v.key()).unwrap_or_default())
                    .join(",");
                format!("{dim}:{values}")
            })
            .join("&")
    }
}

/// OR of [`QueryClause`]s. An empty query matches every datum.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
    clauses: Vec<QueryClause>,
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn or(mut self, clause: QueryClause) -> Self {
        self.clauses.push(clause);
        self
    }

    pub fn clauses(&self) -> &[QueryClause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn key(&self) -> String {
        self.clauses.iter().map(|c| c.key()).join("||")
    }
}

impl From<QueryClause> for QuerySpec {
    fn from(clause: QueryClause) -> Self {
        QuerySpec::new().or(clause)
    }
}

/// Options of [`DataSet::where_`]
#[derive(Clone, Default)]
pub struct WhereOptions {
    pub visible: Option<bool>,
    pub selected: Option<bool>,
    pub is_null: Option<bool>,
    pub predicate: Option<DatumPredicate>,
    /// Identifies `predicate` for caching. A predicate without a key makes the view uncacheable.
    pub predicate_key: Option<String>,
}

impl Debug for WhereOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhereOptions")
            .field("visible", &self.visible)
            .field("selected", &self.selected)
            .field("is_null", &self.is_null)
            .field("predicate", &self.predicate.is_some())
            .field("predicate_key", &self.predicate_key)
            .finish()
    }
}

impl WhereOptions {
    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = Some(visible);
        self
    }

    pub fn with_selected(mut self, selected: bool) -> Self {
        self.selected = Some(selected);
        self
    }

    pub fn with_is_null(mut self, is_null: bool) -> Self {
        self.is_null = Some(is_null);
        self
    }

    pub fn with_predicate(mut self, predicate: DatumPredicate, key: Option<&str>) -> Self {
        self.predicate = Some(predicate);
        self.predicate_key = key.map(|k| k.to_string());
        self
    }

    fn cache_key(&self, query: Option<&QuerySpec>) -> Option<String> {
        if self.selected.is_some() || (self.predicate.is_some() && self.predicate_key.is_none()) {
            return None;
        }
        Some(format!(
            "{}|visible:{:?}|isNull:{:?}|where:{}",
            query.map(|q| q.key()).unwrap_or_default(),
            self.visible,
            self.is_null,
            self.predicate_key.as_deref().unwrap_or_default()
        ))
    }
}

/// State filters of [`DataSet::datums`]
#[derive(Clone, Default)]
pub struct DatumsOptions {
    pub visible: Option<bool>,
    pub selected: Option<bool>,
    pub is_null: Option<bool>,
    pub predicate: Option<DatumPredicate>,
}

impl Debug for DatumsOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatumsOptions")
            .field("visible", &self.visible)
            .field("selected", &self.selected)
            .field("is_null", &self.is_null)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

impl DatumsOptions {
    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = Some(visible);
        self
    }

    pub fn with_selected(mut self, selected: bool) -> Self {
        self.selected = Some(selected);
        self
    }

    pub fn with_is_null(mut self, is_null: bool) -> Self {
        self.is_null = Some(is_null);
        self
    }

    pub fn with_predicate(mut self, predicate: DatumPredicate) -> Self {
        self.predicate = Some(predicate);
        self
    }
}

/// A query clause resolved against the owner's dimensions: atom keys per dimension
#[derive(Debug, Clone)]
struct CompiledClause {
    dims: Vec<(String, HashSet<String>)>,
}

impl CompiledClause {
    fn matches(&self, datum: &Datum) -> bool {
        self.dims.iter().all(|(dim, keys)| {
            datum
                .atom(dim)
                .map(|a| keys.contains(a.key()))
                .unwrap_or(false)
        })
    }
}

/// A single compiled predicate: AND of query match, state flags and a custom predicate
#[derive(Clone, Default)]
pub(crate) struct DatumFilter {
    query: Option<Vec<CompiledClause>>,
    visible: Option<bool>,
    selected: Option<bool>,
    is_null: Option<bool>,
    predicate: Option<DatumPredicate>,
}

impl Debug for DatumFilter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatumFilter")
            .field("query", &self.query)
            .field("visible", &self.visible)
            .field("selected", &self.selected)
            .field("is_null", &self.is_null)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

impl DatumFilter {
    pub(crate) fn states(
        visible: Option<bool>,
        selected: Option<bool>,
        is_null: Option<bool>,
        predicate: Option<DatumPredicate>,
    ) -> Self {
        Self {
            query: None,
            visible,
            selected,
            is_null,
            predicate,
        }
    }

    pub(crate) fn is_pass_through(&self) -> bool {
        self.query.is_none()
            && self.visible.is_none()
            && self.selected.is_none()
            && self.is_null.is_none()
            && self.predicate.is_none()
    }

    pub(crate) fn matches(&self, datum: &Datum) -> bool {
        if let Some(clauses) = &self.query {
            if !clauses.iter().any(|c| c.matches(datum)) {
                return false;
            }
        }
        if self.visible.is_some_and(|v| datum.is_visible() != v)
            || self.selected.is_some_and(|s| datum.is_selected() != s)
            || self.is_null.is_some_and(|n| datum.is_null() != n)
        {
            return false;
        }
        match &self.predicate {
            Some(predicate) => predicate(datum),
            None => true,
        }
    }
}

impl DataSet {
    fn compile_clause(&self, clause: &QueryClause) -> Result<CompiledClause, CccDataError> {
        let dims = clause
            .dims
            .iter()
            .map(|(dim_name, values)| {
                let dimension = self.dimension(dim_name)?;
                let keys = values
                    .iter()
                    .filter_map(|v| dimension.key_of(v.as_ref()).ok())
                    .collect();
                Ok((dim_name.clone(), keys))
            })
            .collect::<Result<Vec<_>, CccDataError>>()?;
        Ok(CompiledClause { dims })
    }

    fn compile_query(&self, query: Option<&QuerySpec>) -> Result<Option<Vec<CompiledClause>>, CccDataError> {
        match query {
            Some(query) if !query.is_empty() => Ok(Some(
                query
                    .clauses
                    .iter()
                    .map(|c| self.compile_clause(c))
                    .collect::<Result<Vec<_>, _>>()?,
            )),
            _ => Ok(None),
        }
    }

    /// A live filtered view of `base`.
    ///
    /// The filter is compiled once and kept on the returned node so that
    /// datums later added upstream that match it flow into the view.
    pub fn where_(
        &mut self,
        base: DataId,
        query: Option<&QuerySpec>,
        options: &WhereOptions,
    ) -> Result<DataId, CccDataError> {
        let cache_key = options.cache_key(query);
        if let Some(key) = &cache_key {
            if let Some(id) = self.node(base)?.caches.where_views.get(key) {
                if !self.is_disposed(*id) {
                    log::debug!("where cache hit on {base} for `{key}`");
                    return Ok(*id);
                }
            }
        }

        let filter = DatumFilter {
            query: self.compile_query(query)?,
            ..DatumFilter::states(
                options.visible,
                options.selected,
                options.is_null,
                options.predicate.clone(),
            )
        };
        let base_node = self.node(base)?;
        let datums = base_node
            .datums
            .iter()
            .copied()
            .filter(|id| self.store.get(*id).map(|d| filter.matches(d)).unwrap_or(false))
            .collect::<Vec<_>>();

        let mut node = DataNode::new(DataKind::Linked);
        node.link_parent = Some(base);
        node.datums = datums;
        node.atoms = base_node.atoms.clone();
        node.key = base_node.key.clone();
        node.abs_key = base_node.abs_key.clone();
        node.label = base_node.label.clone();
        node.abs_label = base_node.abs_label.clone();
        node.partition = Partition::Where(Arc::new(filter));
        let id = self.alloc(node);

        let base_node = self.node_mut(base)?;
        base_node.link_children.push(id);
        if let Some(key) = cache_key {
            base_node.caches.where_views.insert(key, id);
        }
        Ok(id)
    }

    /// Datums of `base` matching `query` and the state filters, in creation order.
    ///
    /// Clauses whose dimensions have an index grouping on `base` (see
    /// [`DataSet::ensure_index`]) are answered by walking the index instead of scanning.
    pub fn datums(
        &self,
        base: DataId,
        query: Option<&QuerySpec>,
        options: &DatumsOptions,
    ) -> Result<Vec<&Datum>, CccDataError> {
        let node = self.node(base)?;
        let states = DatumFilter::states(
            options.visible,
            options.selected,
            options.is_null,
            options.predicate.clone(),
        );
        let mut ids = match query {
            Some(query) if !query.is_empty() => {
                let mut seen = HashSet::new();
                let mut ids = Vec::new();
                for clause in &query.clauses {
                    let candidates = match self.indexed_candidates(base, clause)? {
                        Some(candidates) => candidates,
                        None => {
                            let compiled = self.compile_clause(clause)?;
                            node.datums
                                .iter()
                                .copied()
                                .filter(|id| {
                                    self.store
                                        .get(*id)
                                        .map(|d| compiled.matches(d))
                                        .unwrap_or(false)
                                })
                                .collect()
                        }
                    };
                    ids.extend(candidates.into_iter().filter(|id| seen.insert(*id)));
                }
                ids
            }
            _ => node.datums.clone(),
        };
        ids.sort();

        let mut datums = Vec::with_capacity(ids.len());
        for id in ids {
            let datum = self.store.get(id)?;
            if states.is_pass_through() || states.matches(datum) {
                datums.push(datum);
            }
        }
        Ok(datums)
    }

    /// First datum matching `query`, if any
    pub fn datum(
        &self,
        base: DataId,
        query: Option<&QuerySpec>,
        options: &DatumsOptions,
    ) -> Result<Option<&Datum>, CccDataError> {
        Ok(self.datums(base, query, options)?.into_iter().next())
    }

    /// Build (or reuse) the index grouping used by [`DataSet::datums`] for
    /// queries over exactly `dim_names`, in this order.
    pub fn ensure_index(&mut self, base: DataId, dim_names: &[&str]) -> Result<DataId, CccDataError> {
        let spec = Arc::new(GroupingSpec::parse(&dim_names.join(","))?);
        self.group_by(base, &[spec], &GroupingOptions::index())
    }

    fn index_key(dim_names: &[&str]) -> Option<String> {
        let spec = GroupingSpec::parse(&dim_names.join(",")).ok()?;
        GroupingOper::compose_key(&[spec.key().to_string()], &GroupingOptions::index())
    }

    fn indexed_candidates(
        &self,
        base: DataId,
        clause: &QueryClause,
    ) -> Result<Option<Vec<DatumId>>, CccDataError> {
        let dim_names = clause.dimension_names().collect::<Vec<_>>();
        if dim_names.is_empty() {
            return Ok(None);
        }
        let Some(key) = Self::index_key(&dim_names) else {
            return Ok(None);
        };
        let Some(index_root) = self.node(base)?.caches.group_by.get(&key).copied() else {
            return Ok(None);
        };
        if self.is_disposed(index_root) {
            return Ok(None);
        }
        log::debug!("answering query on {base} from index `{key}`");

        let mut frontier = vec![index_root];
        for (dim_name, values) in &clause.dims {
            let dimension = self.dimension(dim_name)?;
            let keys = values
                .iter()
                .filter_map(|v| dimension.key_of(v.as_ref()).ok())
                .unique()
                .collect::<Vec<_>>();
            let mut next = Vec::new();
            for id in frontier {
                let node = self.node(id)?;
                next.extend(keys.iter().filter_map(|k| node.children_by_key.get(k).copied()));
            }
            frontier = next;
        }

        let mut ids = Vec::new();
        for id in frontier {
            ids.extend_from_slice(&self.node(id)?.datums);
        }
        Ok(Some(ids))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complex_type::{ComplexType, DimensionType};
    use crate::data::LoadOptions;
    use crate::datum::Record;
    use crate::value::ValueType;

    fn dataset() -> Result<DataSet, CccDataError> {
        let ct = ComplexType::new()
            .with_dimension(DimensionType::new("series", ValueType::String))?
            .with_dimension(DimensionType::new("category", ValueType::String))?
            .with_dimension(DimensionType::new("value", ValueType::Number))?;
        let mut data = DataSet::new(ct);
        data.load(
            vec![
                Record::new().with("series", "A").with("category", "x").with("value", 10.0),
                Record::new().with("series", "A").with("category", "y").with("value", 20.0),
                Record::new().with("series", "B").with("category", "x").with("value", 5.0),
                Record::new().with("series", "B").with("category", "y").with_null("value"),
            ],
            &LoadOptions::default(),
        )?;
        Ok(data)
    }

    fn values(datums: &[&Datum]) -> Vec<Option<f64>> {
        datums
            .iter()
            .map(|d| d.value("value").and_then(|v| v.as_f64()))
            .collect()
    }

    #[test]
    fn test_datums_or_of_and() -> Result<(), CccDataError> {
        let data = dataset()?;
        let query = QuerySpec::new()
            .or(QueryClause::new().with("series", "A").with("category", "y"))
            .or(QueryClause::new().with_any("category", ["x"]));
        let datums = data.datums(data.root(), Some(&query), &DatumsOptions::default())?;
        assert_eq!(values(&datums), vec![Some(10.0), Some(20.0), Some(5.0)]);
        Ok(())
    }

    #[test]
    fn test_datums_null_value_query() -> Result<(), CccDataError> {
        let data = dataset()?;
        let query = QuerySpec::from(QueryClause::new().with_null("value"));
        let datums = data.datums(data.root(), Some(&query), &DatumsOptions::default())?;
        assert_eq!(datums.len(), 1);
        assert_eq!(datums[0].value("series"), Some(&Value::from("B")));
        Ok(())
    }

    #[test]
    fn test_datums_unknown_dimension() -> Result<(), CccDataError> {
        let data = dataset()?;
        let query = QuerySpec::from(QueryClause::new().with("region", "EU"));
        let err = data
            .datums(data.root(), Some(&query), &DatumsOptions::default())
            .unwrap_err();
        assert_eq!(err, CccDataError::UnknownDimension("region".to_string()));
        Ok(())
    }

    #[test]
    fn test_indexed_datums_match_scan() -> Result<(), CccDataError> {
        let mut data = dataset()?;
        let root = data.root();
        let query = QuerySpec::new()
            .or(QueryClause::new().with("category", "y"))
            .or(QueryClause::new().with_any("category", ["x", "y"]));
        let scanned = values(&data.datums(root, Some(&query), &DatumsOptions::default())?);
        data.ensure_index(root, &["category"])?;
        let indexed = values(&data.datums(root, Some(&query), &DatumsOptions::default())?);
        assert_eq!(scanned, indexed);
        assert_eq!(indexed.len(), 4);
        Ok(())
    }

    #[test]
    fn test_where_view_receives_added_datums() -> Result<(), CccDataError> {
        let mut data = dataset()?;
        let root = data.root();
        let query = QuerySpec::from(QueryClause::new().with("series", "A"));
        let view = data.where_(root, Some(&query), &WhereOptions::default())?;
        assert_eq!(data.data(view)?.datum_count(), 2);

        data.add(
            vec![
                Record::new().with("series", "A").with("category", "z").with("value", 7.0),
                Record::new().with("series", "C").with("category", "z").with("value", 1.0),
            ],
            &LoadOptions::default(),
        )?;
        assert_eq!(data.data(view)?.datum_count(), 3);

        let again = data.where_(root, Some(&query), &WhereOptions::default())?;
        assert_eq!(view, again);
        Ok(())
    }

    #[test]
    fn test_where_with_unkeyed_predicate_is_not_cached() -> Result<(), CccDataError> {
        let mut data = dataset()?;
        let root = data.root();
        let options = WhereOptions::default().with_predicate(Arc::new(|_: &Datum| true), None);
        let a = data.where_(root, None, &options)?;
        let b = data.where_(root, None, &options)?;
        assert_ne!(a, b);
        Ok(())
    }
}
