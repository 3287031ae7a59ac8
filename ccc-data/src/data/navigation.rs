use std::collections::HashSet;

use indexmap::IndexMap;

use super::{DataId, DataKind, DataNode, DataSet};
use crate::atom::AtomRef;
use crate::datum::{Datum, DatumId};
use crate::error::CccDataError;
use crate::value::Value;

/// Read-only view of one node of a [`DataSet`]
#[derive(Clone, Copy)]
pub struct DataRef<'a> {
    set: &'a DataSet,
    id: DataId,
    node: &'a DataNode,
}

impl std::fmt::Debug for DataRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataRef")
            .field("id", &self.id)
            .field("kind", &self.node.kind)
            .field("abs_key", &self.node.abs_key)
            .field("datums", &self.node.datums.len())
            .finish()
    }
}

impl<'a> DataRef<'a> {
    pub(crate) fn new(set: &'a DataSet, id: DataId, node: &'a DataNode) -> Self {
        Self { set, id, node }
    }

    fn other(&self, id: DataId) -> Option<DataRef<'a>> {
        self.set.data(id).ok()
    }

    pub fn id(&self) -> DataId {
        self.id
    }

    pub fn kind(&self) -> DataKind {
        self.node.kind
    }

    pub fn is_owner(&self) -> bool {
        self.node.kind == DataKind::Owner
    }

    pub fn parent(&self) -> Option<DataRef<'a>> {
        self.node.parent.and_then(|id| self.other(id))
    }

    pub fn link_parent(&self) -> Option<DataRef<'a>> {
        self.node.link_parent.and_then(|id| self.other(id))
    }

    /// Root of the grouping result this node belongs to
    pub fn grouping_root(&self) -> Option<DataRef<'a>> {
        self.node.grouping_root.and_then(|id| self.other(id))
    }

    pub fn children(&self) -> &'a [DataId] {
        &self.node.children
    }

    pub fn child_count(&self) -> usize {
        self.node.children.len()
    }

    pub fn child(&self, index: usize) -> Option<DataRef<'a>> {
        self.node.children.get(index).and_then(|id| self.other(*id))
    }

    pub fn child_by_key(&self, key: &str) -> Option<DataRef<'a>> {
        self.node.children_by_key.get(key).and_then(|id| self.other(*id))
    }

    pub fn child_refs(&self) -> impl Iterator<Item = DataRef<'a>> + 'a {
        let set = self.set;
        self.node
            .children
            .iter()
            .filter_map(move |id| set.data(*id).ok())
    }

    pub fn link_children(&self) -> &'a [DataId] {
        &self.node.link_children
    }

    /// Nodes of the last level below this node, in tree order.
    ///
    /// A node without children is its own single leaf.
    pub fn leafs(&self) -> Vec<DataId> {
        if self.node.grouping_root == Some(self.id) {
            return self.node.leafs.clone();
        }
        let mut leafs = Vec::new();
        let mut stack = vec![self.id];
        while let Some(id) = stack.pop() {
            let Ok(node) = self.set.node(id) else {
                continue;
            };
            if node.children.is_empty() {
                leafs.push(id);
            } else {
                stack.extend(node.children.iter().rev());
            }
        }
        leafs
    }

    pub fn leaf_index(&self) -> Option<usize> {
        self.node.leaf_index
    }

    pub fn depth(&self) -> usize {
        self.node.depth
    }

    /// Number of levels below a grouping root
    pub fn tree_height(&self) -> usize {
        self.node.tree_height
    }

    pub fn key(&self) -> &'a str {
        &self.node.key
    }

    pub fn abs_key(&self) -> &'a str {
        &self.node.abs_key
    }

    pub fn label(&self) -> &'a str {
        &self.node.label
    }

    pub fn abs_label(&self) -> &'a str {
        &self.node.abs_label
    }

    /// Fixed atoms inherited from every grouping level above and at this node
    pub fn atoms(&self) -> &'a IndexMap<String, AtomRef> {
        &self.node.atoms
    }

    pub fn atom(&self, dim_name: &str) -> Option<&'a AtomRef> {
        self.node.atoms.get(dim_name)
    }

    /// Dimensions fixed by this node's own level
    pub fn own_dimension_names(&self) -> &'a [String] {
        &self.node.own_dimension_names
    }

    /// The value of the node's single own atom, or its key for composite levels
    pub fn value(&self) -> Option<Value> {
        match self.node.own_dimension_names.as_slice() {
            [dim_name] => self.atom(dim_name).and_then(|a| a.value().cloned()),
            _ if self.node.key.is_empty() => None,
            _ => Some(Value::string(self.node.key.clone())),
        }
    }

    pub fn is_flatten_group(&self) -> bool {
        self.node.is_flatten_group
    }

    pub fn is_degenerate_flatten_group(&self) -> bool {
        self.node.is_degenerate_flatten_group
    }

    pub fn main_datum(&self) -> Option<&'a Datum> {
        self.node
            .main_datum
            .and_then(|id| self.set.store.datums.get(&id))
    }

    pub fn datum_ids(&self) -> &'a [DatumId] {
        &self.node.datums
    }

    pub fn datums(&self) -> impl Iterator<Item = &'a Datum> + 'a {
        let set = self.set;
        self.node
            .datums
            .iter()
            .filter_map(move |id| set.store.datums.get(id))
    }

    pub fn datum_count(&self) -> usize {
        self.node.datums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node.datums.is_empty()
    }

    /// Distinct atoms of `dim_name` over this node's datums, in first-occurrence order
    pub fn data_atoms(&self, dim_name: &str) -> Result<Vec<AtomRef>, CccDataError> {
        self.set.dimension(dim_name)?;
        let mut seen = HashSet::new();
        Ok(self
            .datums()
            .filter_map(|d| d.atom(dim_name))
            .filter(|a| seen.insert(a.key().to_string()))
            .cloned()
            .collect())
    }
}
