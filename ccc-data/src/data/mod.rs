mod load;
mod navigation;
mod query;
mod state;
mod sum;

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use strum::Display as StrumDisplay;

use crate::atom::AtomRef;
use crate::complex_type::ComplexType;
use crate::datum::{Datum, DatumId};
use crate::dimension::Dimension;
use crate::error::CccDataError;
use crate::grouping::{FlatState, GroupingOper};

pub use load::LoadOptions;
pub use navigation::DataRef;
pub(crate) use query::DatumFilter;
pub use query::{DatumsOptions, QueryClause, QuerySpec, WhereOptions};

/// Handle of a node in a [`DataSet`] arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataId(pub(crate) usize);

impl Display for DataId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "data#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay)]
#[strum(serialize_all = "lowercase")]
pub enum DataKind {
    /// Root of the arena; holds every datum
    Owner,
    /// Root of a grouping result or a `where` view
    Linked,
    /// Group node produced by a grouping
    Child,
}

/// The partition logic a linked node re-applies to datums added upstream
#[derive(Debug, Clone)]
pub(crate) enum Partition {
    None,
    Where(Arc<DatumFilter>),
    Grouping(Arc<GroupingOper>),
}

#[derive(Debug, Default)]
pub(crate) struct NodeCaches {
    pub(crate) group_by: HashMap<String, DataId>,
    pub(crate) where_views: HashMap<String, DataId>,
    pub(crate) sum_abs: HashMap<String, f64>,
}

#[derive(Debug)]
pub(crate) struct DataNode {
    pub(crate) kind: DataKind,
    pub(crate) parent: Option<DataId>,
    pub(crate) link_parent: Option<DataId>,
    pub(crate) children: Vec<DataId>,
    pub(crate) children_by_key: HashMap<String, DataId>,
    pub(crate) link_children: Vec<DataId>,

    /// Always in ascending datum id order
    pub(crate) datums: Vec<DatumId>,
    pub(crate) atoms: IndexMap<String, AtomRef>,
    pub(crate) own_dimension_names: Vec<String>,

    pub(crate) key: String,
    pub(crate) abs_key: String,
    pub(crate) label: String,
    pub(crate) abs_label: String,
    pub(crate) depth: usize,
    pub(crate) tree_height: usize,

    pub(crate) is_flatten_group: bool,
    pub(crate) is_degenerate_flatten_group: bool,
    pub(crate) main_datum: Option<DatumId>,
    pub(crate) leaf_index: Option<usize>,
    pub(crate) leafs: Vec<DataId>,

    pub(crate) partition: Partition,
    /// Grouping root this node belongs to, itself for the root
    pub(crate) grouping_root: Option<DataId>,
    /// Index into the grouping plan of the level that partitions this node's children
    pub(crate) child_plan: Option<usize>,
    /// Hierarchy of the flattened spec partitioning this node's children
    pub(crate) flat_state: Option<Box<FlatState>>,
    /// Main datum of every group ever formed under a grouping root, including
    /// groups dropped by the post-filter, by absolute key
    pub(crate) group_mains: HashMap<String, DatumId>,

    pub(crate) caches: NodeCaches,
}

impl DataNode {
    pub(crate) fn new(kind: DataKind) -> Self {
        Self {
            kind,
            parent: None,
            link_parent: None,
            children: Vec::new(),
            children_by_key: HashMap::new(),
            link_children: Vec::new(),
            datums: Vec::new(),
            atoms: IndexMap::new(),
            own_dimension_names: Vec::new(),
            key: String::new(),
            abs_key: String::new(),
            label: String::new(),
            abs_label: String::new(),
            depth: 0,
            tree_height: 0,
            is_flatten_group: false,
            is_degenerate_flatten_group: false,
            main_datum: None,
            leaf_index: None,
            leafs: Vec::new(),
            partition: Partition::None,
            grouping_root: None,
            child_plan: None,
            flat_state: None,
            group_mains: HashMap::new(),
            caches: NodeCaches::default(),
        }
    }

    /// Append datums with ids above every datum already present
    pub(crate) fn extend_datums(&mut self, ids: &[DatumId]) {
        if ids.is_empty() {
            return;
        }
        self.datums.extend_from_slice(ids);
        self.caches.sum_abs.clear();
    }
}

/// Datums of the owner plus the fast-lookup state sets
#[derive(Debug, Default)]
pub(crate) struct DatumStore {
    pub(crate) datums: HashMap<DatumId, Datum>,
    pub(crate) by_key: HashMap<String, DatumId>,
    pub(crate) next_id: usize,
    pub(crate) selected: IndexSet<DatumId>,
    pub(crate) visible: IndexSet<DatumId>,
}

impl DatumStore {
    pub(crate) fn get(&self, id: DatumId) -> Result<&Datum, CccDataError> {
        self.datums.get(&id).ok_or(CccDataError::DatumNotFound(id))
    }

    pub(crate) fn get_mut(&mut self, id: DatumId) -> Result<&mut Datum, CccDataError> {
        self.datums
            .get_mut(&id)
            .ok_or(CccDataError::DatumNotFound(id))
    }

    pub(crate) fn next_id(&mut self) -> DatumId {
        let id = DatumId(self.next_id);
        self.next_id += 1;
        id
    }

    pub(crate) fn clear(&mut self) {
        self.datums.clear();
        self.by_key.clear();
        self.selected.clear();
        self.visible.clear();
    }
}

/// A grouped dataset: one owner node holding every datum plus the linked and
/// child nodes derived from it by `where` and `group_by`.
///
/// Nodes live in an arena and are addressed by [`DataId`]. Disposed nodes keep
/// their slot, so a stale id reports [`CccDataError::DataDisposed`].
#[derive(Debug)]
pub struct DataSet {
    pub(crate) complex_type: Arc<ComplexType>,
    pub(crate) dimensions: IndexMap<String, Dimension>,
    pub(crate) store: DatumStore,
    pub(crate) nodes: Vec<Option<DataNode>>,
    pub(crate) root: DataId,
}

impl DataSet {
    pub fn new(complex_type: ComplexType) -> Self {
        let dimensions = complex_type
            .dimensions()
            .map(|dim_type| {
                (
                    dim_type.name().to_string(),
                    Dimension::new(dim_type.clone()),
                )
            })
            .collect();
        Self {
            complex_type: Arc::new(complex_type),
            dimensions,
            store: DatumStore::default(),
            nodes: vec![Some(DataNode::new(DataKind::Owner))],
            root: DataId(0),
        }
    }

    pub fn complex_type(&self) -> &Arc<ComplexType> {
        &self.complex_type
    }

    /// The owner node
    pub fn root(&self) -> DataId {
        self.root
    }

    pub fn dimension(&self, name: &str) -> Result<&Dimension, CccDataError> {
        self.dimensions
            .get(name)
            .ok_or_else(|| CccDataError::UnknownDimension(name.to_string()))
    }

    pub fn dimension_mut(&mut self, name: &str) -> Result<&mut Dimension, CccDataError> {
        self.dimensions
            .get_mut(name)
            .ok_or_else(|| CccDataError::UnknownDimension(name.to_string()))
    }

    pub fn dimensions(&self) -> impl Iterator<Item = &Dimension> {
        self.dimensions.values()
    }

    /// Navigation view of a node
    pub fn data(&self, id: DataId) -> Result<DataRef<'_>, CccDataError> {
        Ok(DataRef::new(self, id, self.node(id)?))
    }

    pub fn get_datum(&self, id: DatumId) -> Result<&Datum, CccDataError> {
        self.store.get(id)
    }

    /// Number of datums held by the owner
    pub fn datum_count(&self) -> usize {
        self.store.datums.len()
    }

    pub fn is_disposed(&self, id: DataId) -> bool {
        !matches!(self.nodes.get(id.0), Some(Some(_)))
    }

    pub(crate) fn node(&self, id: DataId) -> Result<&DataNode, CccDataError> {
        self.nodes
            .get(id.0)
            .and_then(|n| n.as_ref())
            .ok_or(CccDataError::DataDisposed(id))
    }

    pub(crate) fn node_mut(&mut self, id: DataId) -> Result<&mut DataNode, CccDataError> {
        self.nodes
            .get_mut(id.0)
            .and_then(|n| n.as_mut())
            .ok_or(CccDataError::DataDisposed(id))
    }

    pub(crate) fn alloc(&mut self, node: DataNode) -> DataId {
        self.nodes.push(Some(node));
        DataId(self.nodes.len() - 1)
    }

    /// Detach a node and everything derived from it
    pub(crate) fn dispose(&mut self, id: DataId) {
        let Some(node) = self.nodes.get_mut(id.0).and_then(|n| n.take()) else {
            return;
        };
        for child in node.children.iter().chain(node.link_children.iter()) {
            self.dispose(*child);
        }
    }

    /// Dispose every linked view hanging off `id`, cached or not, and drop its caches.
    pub fn clear_caches(&mut self, id: DataId) -> Result<(), CccDataError> {
        let node = self.node_mut(id)?;
        node.caches.group_by.clear();
        node.caches.where_views.clear();
        node.caches.sum_abs.clear();
        let views = std::mem::take(&mut node.link_children);
        log::debug!("clear_caches on {id} disposes {} views", views.len());
        for view in views {
            self.dispose(view);
        }
        Ok(())
    }

    /// Signal the recoverable "no data" condition when a node has no datums
    pub fn ensure_not_empty(&self, id: DataId) -> Result<(), CccDataError> {
        if self.node(id)?.datums.is_empty() {
            return Err(CccDataError::NoData);
        }
        Ok(())
    }

    /// Lowest common ancestor over parent and link-parent chains
    pub fn lca(&self, ids: &[DataId]) -> Option<DataId> {
        let (first, rest) = ids.split_first()?;
        let mut candidates = self.ancestry(*first);
        for id in rest {
            let ancestry = self.ancestry(*id);
            candidates.retain(|c| ancestry.contains(c));
        }
        candidates.first().copied()
    }

    /// The node itself followed by its ancestors, nearest first
    fn ancestry(&self, id: DataId) -> Vec<DataId> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(id) = current {
            let Ok(node) = self.node(id) else {
                break;
            };
            chain.push(id);
            current = node.parent.or(node.link_parent);
        }
        chain
    }
}
