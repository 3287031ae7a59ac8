use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;
use itertools::Itertools;

use super::oper::{GroupingOper, GroupingOptions, LevelPlan};
use super::spec::{EnsureOptions, FlattenMode, GroupingLevelSpec, GroupingSpec};
use crate::atom::AtomRef;
use crate::complex_type::ComplexType;
use crate::data::{DataId, DataKind, DataNode, DataSet, DatumFilter, Partition};
use crate::datum::{Datum, DatumId};
use crate::error::CccDataError;

/// Nodes that received datums during a merge, with the datums they received
type Touched = Vec<(DataId, Vec<DatumId>)>;

impl DataSet {
    /// Parse `text` as a grouping specification and group `base` by it
    pub fn group_by_text(
        &mut self,
        base: DataId,
        text: &str,
        options: &GroupingOptions,
    ) -> Result<DataId, CccDataError> {
        let spec = Arc::new(GroupingSpec::parse(text)?);
        self.group_by(base, &[spec], options)
    }

    /// Group the datums of `base` by chained grouping specs and return the root
    /// of the result.
    ///
    /// Results are cached on `base` by the operation's key. The root is a
    /// linked node of `base`: datums later added upstream are merged into the
    /// existing tree instead of rebuilding it.
    pub fn group_by(
        &mut self,
        base: DataId,
        specs: &[Arc<GroupingSpec>],
        options: &GroupingOptions,
    ) -> Result<DataId, CccDataError> {
        if specs.is_empty() {
            return Err(CccDataError::InvalidArgument(
                "group_by requires at least one grouping specification".to_string(),
            ));
        }
        self.node(base)?;
        let specs = specs
            .iter()
            .map(|spec| self.prepare_spec(spec, options.reverse))
            .collect::<Result<Vec<_>, _>>()?;
        let oper = Arc::new(GroupingOper::new(specs, options));

        if let Some(key) = oper.key() {
            if let Some(id) = self.node(base)?.caches.group_by.get(key).copied() {
                if !self.is_disposed(id) {
                    log::debug!("group_by cache hit on {base} for `{key}`");
                    return Ok(id);
                }
            }
        }
        log::debug!("group_by cache miss on {base} for {:?}", oper.key());

        let root = self.execute(base, &oper)?;
        let base_node = self.node_mut(base)?;
        base_node.link_children.push(root);
        if let Some(key) = oper.key() {
            base_node.caches.group_by.insert(key.to_string(), root);
        }
        Ok(root)
    }

    fn prepare_spec(
        &self,
        spec: &Arc<GroupingSpec>,
        reverse: bool,
    ) -> Result<Arc<GroupingSpec>, CccDataError> {
        let bound = match spec.type_id() {
            Some(type_id) if type_id != self.complex_type.id() => {
                return Err(CccDataError::SchemaMismatch {
                    grouping_type: type_id,
                    data_type: self.complex_type.id(),
                })
            }
            Some(_) => spec.clone(),
            None => spec.bind(&self.complex_type)?,
        };
        if reverse {
            Ok(bound.ensure(&EnsureOptions::default().with_reverse(true)))
        } else {
            Ok(bound)
        }
    }

    fn execute(&mut self, base: DataId, oper: &Arc<GroupingOper>) -> Result<DataId, CccDataError> {
        let base_node = self.node(base)?;
        let input = base_node.datums.clone();

        let mut node = DataNode::new(DataKind::Linked);
        node.link_parent = Some(base);
        node.atoms = base_node.atoms.clone();
        node.key = base_node.key.clone();
        node.abs_key = base_node.abs_key.clone();
        node.label = base_node.label.clone();
        node.abs_label = base_node.abs_label.clone();
        node.tree_height = oper.tree_height();
        node.child_plan = (oper.tree_height() > 0).then_some(0);
        node.partition = Partition::Grouping(oper.clone());
        let root = self.alloc(node);
        self.node_mut(root)?.grouping_root = Some(root);

        // No partial tree on failure
        if let Err(err) = self.extend_grouping(root, oper, &input) {
            self.dispose(root);
            return Err(err);
        }
        Ok(root)
    }

    /// Merge datums new to the link parent of grouping root `root` into its tree
    pub(crate) fn extend_grouping(
        &mut self,
        root: DataId,
        oper: &Arc<GroupingOper>,
        ids: &[DatumId],
    ) -> Result<(), CccDataError> {
        let pre = self.filter_ids(oper.pre_filter(), ids)?;
        if pre.is_empty() {
            return Ok(());
        }
        let kept = self.filter_ids(oper.post_filter(), &pre)?;
        let child_plan = {
            let node = self.node_mut(root)?;
            node.extend_datums(&kept);
            node.child_plan
        };

        let mut touched = vec![(root, kept)];
        if let Some(plan_index) = child_plan {
            self.merge_plan(root, oper, plan_index, &pre, &mut touched)?;
        }
        self.rebuild_leafs(root)?;
        log::debug!(
            "grouping {root} merged {} datums into {} nodes",
            pre.len(),
            touched.len()
        );

        for (id, ids) in touched {
            if !ids.is_empty() && !self.is_disposed(id) {
                self.propagate_add(id, &ids)?;
            }
        }
        Ok(())
    }

    fn filter_ids(&self, filter: &DatumFilter, ids: &[DatumId]) -> Result<Vec<DatumId>, CccDataError> {
        if filter.is_pass_through() {
            return Ok(ids.to_vec());
        }
        let mut kept = Vec::with_capacity(ids.len());
        for id in ids {
            if filter.matches(self.store.get(*id)?) {
                kept.push(*id);
            }
        }
        Ok(kept)
    }

    fn merge_plan(
        &mut self,
        parent: DataId,
        oper: &Arc<GroupingOper>,
        plan_index: usize,
        input: &[DatumId],
        touched: &mut Touched,
    ) -> Result<(), CccDataError> {
        match oper.plan()[plan_index] {
            LevelPlan::Level { spec, level } => {
                self.merge_level(parent, oper, plan_index, spec, level, input, touched)
            }
            LevelPlan::Flattened { spec } => {
                self.merge_flattened(parent, oper, plan_index, spec, input, touched)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn merge_level(
        &mut self,
        parent: DataId,
        oper: &Arc<GroupingOper>,
        plan_index: usize,
        spec_index: usize,
        level_index: usize,
        input: &[DatumId],
        touched: &mut Touched,
    ) -> Result<(), CccDataError> {
        let spec = oper.specs()[spec_index].clone();
        let level = &spec.levels()[level_index];
        let groups = self.partition_by_level(level, input)?;
        let (parent_abs_key, grouping_root) = {
            let node = self.node(parent)?;
            (node.abs_key.clone(), node.grouping_root.unwrap_or(parent))
        };

        for (key, ids) in groups {
            let abs_key = compose_key(&parent_abs_key, &key);
            // The first datum of a group is its main datum, even if the post-filter drops it
            let main = *self
                .node_mut(grouping_root)?
                .group_mains
                .entry(abs_key.clone())
                .or_insert(ids[0]);
            let kept = self.filter_ids(oper.post_filter(), &ids)?;
            if kept.is_empty() {
                continue;
            }

            let existing = self.node(parent)?.children_by_key.get(&key).copied();
            let child = match existing {
                Some(child) => child,
                None => self.create_level_child(parent, oper, plan_index, level, key, abs_key, main)?,
            };
            let next_plan = {
                let node = self.node_mut(child)?;
                node.extend_datums(&kept);
                node.child_plan
            };
            if let Some(next_plan) = next_plan {
                self.merge_plan(child, oper, next_plan, &kept, touched)?;
            }
            touched.push((child, kept));
        }
        Ok(())
    }

    fn partition_by_level(
        &self,
        level: &GroupingLevelSpec,
        input: &[DatumId],
    ) -> Result<IndexMap<String, Vec<DatumId>>, CccDataError> {
        let mut groups: IndexMap<String, Vec<DatumId>> = IndexMap::new();
        for id in input {
            let datum = self.store.get(*id)?;
            groups.entry(level_key(datum, level)).or_default().push(*id);
        }
        Ok(groups)
    }

    #[allow(clippy::too_many_arguments)]
    fn create_level_child(
        &mut self,
        parent: DataId,
        oper: &GroupingOper,
        plan_index: usize,
        level: &GroupingLevelSpec,
        key: String,
        abs_key: String,
        main: DatumId,
    ) -> Result<DataId, CccDataError> {
        let main_datum = self.store.get(main)?;
        let parent_node = self.node(parent)?;

        let mut node = DataNode::new(DataKind::Child);
        node.parent = Some(parent);
        node.grouping_root = parent_node.grouping_root;
        node.depth = parent_node.depth + 1;
        node.atoms = parent_node.atoms.clone();
        for dim in level.dimensions() {
            if let Some(atom) = main_datum.atom(dim.name()) {
                node.atoms.insert(dim.name().to_string(), atom.clone());
            }
            node.own_dimension_names.push(dim.name().to_string());
        }
        node.label = level_label(&node.atoms, level);
        node.abs_label = compose_label(&parent_node.abs_label, &node.label);
        node.key = key.clone();
        node.abs_key = abs_key;
        node.main_datum = Some(main);
        node.child_plan = next_plan_index(oper, plan_index);
        node.tree_height = oper.tree_height() - plan_index - 1;

        let position = parent_node.children.partition_point(|sibling| {
            self.node(*sibling)
                .map(|s| {
                    compare_groups(
                        &self.complex_type,
                        level,
                        (&s.atoms, s.main_datum),
                        (&node.atoms, node.main_datum),
                    ) != Ordering::Greater
                })
                .unwrap_or(true)
        });

        let id = self.alloc(node);
        let parent_node = self.node_mut(parent)?;
        parent_node.children.insert(position, id);
        parent_node.children_by_key.insert(key, id);
        Ok(id)
    }

    /// Merge `input`, new to `parent`, into the flattened hierarchy kept on
    /// `parent` and reconcile its flattened children with it, by key.
    #[allow(clippy::too_many_arguments)]
    fn merge_flattened(
        &mut self,
        parent: DataId,
        oper: &Arc<GroupingOper>,
        plan_index: usize,
        spec_index: usize,
        input: &[DatumId],
        touched: &mut Touched,
    ) -> Result<(), CccDataError> {
        let spec = oper.specs()[spec_index].clone();
        let state = {
            let node = self.node_mut(parent)?;
            node.flat_state.take()
        };
        let mut state = match state {
            Some(state) => *state,
            None => FlatState::new(FlatGroup {
                flat_key: String::new(),
                atoms: self.node(parent)?.atoms.clone(),
                own_dims: Vec::new(),
                label: spec.root_label().unwrap_or_default().to_string(),
                main: input.first().copied(),
                datums: Vec::new(),
                parent: None,
                children: Vec::new(),
            }),
        };
        let result = self.merge_flat_state(parent, oper, plan_index, &spec, &mut state, input, touched);
        self.node_mut(parent)?.flat_state = Some(Box::new(state));
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn merge_flat_state(
        &mut self,
        parent: DataId,
        oper: &Arc<GroupingOper>,
        plan_index: usize,
        spec: &GroupingSpec,
        state: &mut FlatState,
        input: &[DatumId],
        touched: &mut Touched,
    ) -> Result<(), CccDataError> {
        let mut fresh: HashMap<usize, Vec<DatumId>> = HashMap::new();
        let kept = self.filter_ids(oper.post_filter(), input)?;
        state.tree[0].datums.extend_from_slice(&kept);
        fresh.insert(0, kept);
        self.extend_flat_level(spec, oper, state, 0, 0, input, &mut fresh)?;

        let mut order = Vec::with_capacity(state.tree.len());
        emit_flat_order(&state.tree, 0, spec.flatten_mode(), &mut order);
        let entries = merge_flat_entries(&state.tree, &order);

        let (parent_abs_key, parent_abs_label, depth, grouping_root) = {
            let node = self.node(parent)?;
            (
                node.abs_key.clone(),
                node.abs_label.clone(),
                node.depth,
                node.grouping_root,
            )
        };
        let next_plan = next_plan_index(oper, plan_index);
        let tree_height = oper.tree_height() - plan_index - 1;
        let old_children = self.node(parent)?.children.clone();
        let mut children = Vec::with_capacity(entries.len());
        let mut children_by_key = HashMap::new();
        let mut emitted = HashMap::new();

        for entry in entries {
            let group = &state.tree[entry.group];
            if group.datums.is_empty() {
                continue;
            }
            let existing = self.node(parent)?.children_by_key.get(&entry.key).copied();
            let (id, added) = match existing {
                Some(id) if state.emitted.get(&entry.key) == Some(&entry.group) => {
                    let added = fresh.remove(&entry.group).unwrap_or_default();
                    let node = self.node_mut(id)?;
                    node.extend_datums(&added);
                    apply_flat_group(node, group, &entry, &parent_abs_key, &parent_abs_label);
                    (id, added)
                }
                // The key now stands for another group of the hierarchy
                Some(id) => {
                    let node = self.node_mut(id)?;
                    let old = node.datums.iter().copied().collect::<HashSet<_>>();
                    let new = group.datums.iter().copied().collect::<HashSet<_>>();
                    let shrunk = old.iter().any(|d| !new.contains(d));
                    let added = if shrunk {
                        group.datums.clone()
                    } else {
                        group
                            .datums
                            .iter()
                            .copied()
                            .filter(|d| !old.contains(d))
                            .collect::<Vec<_>>()
                    };
                    node.datums = group.datums.clone();
                    node.caches.sum_abs.clear();
                    apply_flat_group(node, group, &entry, &parent_abs_key, &parent_abs_label);
                    let stale = if shrunk {
                        node.flat_state = None;
                        node.children_by_key.clear();
                        std::mem::take(&mut node.children)
                    } else {
                        Vec::new()
                    };
                    for stale in stale {
                        self.dispose(stale);
                    }
                    (id, added)
                }
                None => {
                    let mut node = DataNode::new(DataKind::Child);
                    node.parent = Some(parent);
                    node.grouping_root = grouping_root;
                    node.depth = depth + 1;
                    node.datums = group.datums.clone();
                    node.child_plan = next_plan;
                    node.tree_height = tree_height;
                    apply_flat_group(&mut node, group, &entry, &parent_abs_key, &parent_abs_label);
                    (self.alloc(node), group.datums.clone())
                }
            };
            emitted.insert(entry.key.clone(), entry.group);
            children_by_key.insert(entry.key, id);
            children.push(id);
            if !added.is_empty() {
                if let Some(next_plan) = next_plan {
                    self.merge_plan(id, oper, next_plan, &added, touched)?;
                }
                touched.push((id, added));
            }
        }
        state.emitted = emitted;

        for stale in old_children.into_iter().filter(|c| !children.contains(c)) {
            self.dispose(stale);
        }
        let parent_node = self.node_mut(parent)?;
        parent_node.children = children;
        parent_node.children_by_key = children_by_key;
        Ok(())
    }

    /// Partition `input`, new to group `parent` of the hierarchy, by one level
    /// of `spec` and merge the parts into the group's children, recursively.
    /// Records the datums each group received in `fresh`.
    #[allow(clippy::too_many_arguments)]
    fn extend_flat_level(
        &self,
        spec: &GroupingSpec,
        oper: &GroupingOper,
        state: &mut FlatState,
        parent: usize,
        level_index: usize,
        input: &[DatumId],
        fresh: &mut HashMap<usize, Vec<DatumId>>,
    ) -> Result<(), CccDataError> {
        let Some(level) = spec.levels().get(level_index) else {
            return Ok(());
        };
        for (key, ids) in self.partition_by_level(level, input)? {
            let kept = self.filter_ids(oper.post_filter(), &ids)?;
            let slot = (parent, key);
            let index = match state.child_by_key.get(&slot).copied() {
                Some(index) => index,
                None => {
                    // The first datum of a group is its main datum, even if the post-filter drops it
                    let main = *state.pending_mains.entry(slot.clone()).or_insert(ids[0]);
                    if kept.is_empty() {
                        continue;
                    }
                    state.pending_mains.remove(&slot);
                    let index = self.insert_flat_group(level, state, parent, &slot.1, main)?;
                    state.child_by_key.insert(slot, index);
                    index
                }
            };
            if kept.is_empty() {
                continue;
            }
            state.tree[index].datums.extend_from_slice(&kept);
            fresh.entry(index).or_default().extend_from_slice(&kept);
            self.extend_flat_level(spec, oper, state, index, level_index + 1, &kept, fresh)?;
        }
        Ok(())
    }

    /// Add a group below `parent`, among its siblings in level order
    fn insert_flat_group(
        &self,
        level: &GroupingLevelSpec,
        state: &mut FlatState,
        parent: usize,
        key: &str,
        main: DatumId,
    ) -> Result<usize, CccDataError> {
        let main_datum = self.store.get(main)?;
        let parent_group = &state.tree[parent];
        let mut atoms = parent_group.atoms.clone();
        let mut own_dims = parent_group.own_dims.clone();
        for dim in level.dimensions() {
            if let Some(atom) = main_datum.atom(dim.name()) {
                atoms.insert(dim.name().to_string(), atom.clone());
            }
            if !own_dims.iter().any(|d| d == dim.name()) {
                own_dims.push(dim.name().to_string());
            }
        }
        let own_label = level_label(&atoms, level);
        let label = if parent == 0 {
            own_label
        } else {
            compose_label(&parent_group.label, &own_label)
        };
        let flat_key = if key.is_empty() {
            parent_group.flat_key.clone()
        } else {
            compose_key(&parent_group.flat_key, key)
        };
        let position = parent_group.children.partition_point(|sibling| {
            let sibling = &state.tree[*sibling];
            compare_groups(
                &self.complex_type,
                level,
                (&sibling.atoms, sibling.main),
                (&atoms, Some(main)),
            ) != Ordering::Greater
        });

        let index = state.tree.len();
        state.tree.push(FlatGroup {
            flat_key,
            atoms,
            own_dims,
            label,
            main: Some(main),
            datums: Vec::new(),
            parent: Some(parent),
            children: Vec::new(),
        });
        state.tree[parent].children.insert(position, index);
        Ok(index)
    }

    fn rebuild_leafs(&mut self, root: DataId) -> Result<(), CccDataError> {
        let mut leafs = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = self.node(id)?;
            if node.child_plan.is_none() {
                leafs.push(id);
            } else {
                stack.extend(node.children.iter().rev());
            }
        }
        for (index, id) in leafs.iter().enumerate() {
            self.node_mut(*id)?.leaf_index = Some(index);
        }
        self.node_mut(root)?.leafs = leafs;
        Ok(())
    }
}

/// The hierarchy of a flattened spec below one node.
///
/// Groups are only ever appended, so indexes stay valid across adds.
#[derive(Debug)]
pub(crate) struct FlatState {
    /// The root group is at index 0
    tree: Vec<FlatGroup>,
    child_by_key: HashMap<(usize, String), usize>,
    /// Main datums of groups whose datums the post-filter dropped so far
    pending_mains: HashMap<(usize, String), DatumId>,
    /// Group each flattened child was built from, by child key
    emitted: HashMap<String, usize>,
}

impl FlatState {
    fn new(root: FlatGroup) -> Self {
        Self {
            tree: vec![root],
            child_by_key: HashMap::new(),
            pending_mains: HashMap::new(),
            emitted: HashMap::new(),
        }
    }
}

/// One node of a flattened spec's hierarchy, before it is emitted as a sibling
#[derive(Debug)]
struct FlatGroup {
    flat_key: String,
    atoms: IndexMap<String, AtomRef>,
    own_dims: Vec<String>,
    label: String,
    main: Option<DatumId>,
    datums: Vec<DatumId>,
    parent: Option<usize>,
    children: Vec<usize>,
}

#[derive(Debug)]
struct FlatEntry {
    group: usize,
    key: String,
    degenerate: bool,
}

fn emit_flat_order(tree: &[FlatGroup], index: usize, mode: FlattenMode, out: &mut Vec<usize>) {
    if mode == FlattenMode::DfsPre {
        out.push(index);
    }
    for child in &tree[index].children {
        emit_flat_order(tree, *child, mode, out);
    }
    if mode == FlattenMode::DfsPost {
        out.push(index);
    }
}

/// Resolve flat key collisions.
///
/// When one of the colliding groups descends from the other through a chain
/// of only-children, the ancestor keeps the slot and becomes a degenerate
/// flatten group. Otherwise both are kept and the later one gets a `#n` suffix.
fn merge_flat_entries(tree: &[FlatGroup], order: &[usize]) -> Vec<FlatEntry> {
    let mut entries: Vec<FlatEntry> = Vec::with_capacity(order.len());
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut suffixes: HashMap<String, usize> = HashMap::new();
    for &index in order {
        let flat_key = &tree[index].flat_key;
        match slots.get(flat_key).copied() {
            None => {
                slots.insert(flat_key.clone(), entries.len());
                entries.push(FlatEntry {
                    group: index,
                    key: flat_key.clone(),
                    degenerate: false,
                });
            }
            Some(slot) => {
                let other = entries[slot].group;
                if let Some(ancestor) = single_chain_ancestor(tree, other, index) {
                    entries[slot].group = ancestor;
                    entries[slot].degenerate = true;
                } else {
                    let n = suffixes.entry(flat_key.clone()).or_insert(0);
                    *n += 1;
                    let key = format!("{flat_key}#{n}");
                    slots.insert(key.clone(), entries.len());
                    entries.push(FlatEntry {
                        group: index,
                        key,
                        degenerate: false,
                    });
                }
            }
        }
    }
    entries
}

fn single_chain_ancestor(tree: &[FlatGroup], a: usize, b: usize) -> Option<usize> {
    if descends_through_only_children(tree, a, b) {
        Some(a)
    } else if descends_through_only_children(tree, b, a) {
        Some(b)
    } else {
        None
    }
}

fn descends_through_only_children(tree: &[FlatGroup], ancestor: usize, descendant: usize) -> bool {
    let mut current = descendant;
    while let Some(parent) = tree[current].parent {
        if tree[parent].children.len() != 1 {
            return false;
        }
        if parent == ancestor {
            return true;
        }
        current = parent;
    }
    false
}

fn apply_flat_group(
    node: &mut DataNode,
    group: &FlatGroup,
    entry: &FlatEntry,
    parent_abs_key: &str,
    parent_abs_label: &str,
) {
    node.key = entry.key.clone();
    node.abs_key = compose_key(parent_abs_key, &entry.key);
    node.label = group.label.clone();
    node.abs_label = compose_label(parent_abs_label, &group.label);
    node.atoms = group.atoms.clone();
    node.own_dimension_names = group.own_dims.clone();
    node.main_datum = group.main;
    node.is_flatten_group = !group.children.is_empty();
    node.is_degenerate_flatten_group = entry.degenerate;
}

fn next_plan_index(oper: &GroupingOper, plan_index: usize) -> Option<usize> {
    (plan_index + 1 < oper.tree_height()).then_some(plan_index + 1)
}

/// Key of a datum at one level: the atom keys of the level's dimensions, or
/// empty when every one of them is null
pub(crate) fn level_key(datum: &Datum, level: &GroupingLevelSpec) -> String {
    let keys = level
        .dimensions()
        .iter()
        .map(|d| datum.atom(d.name()).map(|a| a.key()).unwrap_or_default())
        .collect::<Vec<_>>();
    if keys.iter().all(|k| k.is_empty()) {
        String::new()
    } else {
        keys.join("~")
    }
}

fn level_label(atoms: &IndexMap<String, AtomRef>, level: &GroupingLevelSpec) -> String {
    level
        .dimension_names()
        .filter_map(|name| atoms.get(name))
        .map(|a| a.label())
        .filter(|l| !l.is_empty())
        .join(", ")
}

fn compose_key(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent},{key}")
    }
}

fn compose_label(parent: &str, label: &str) -> String {
    match (parent.is_empty(), label.is_empty()) {
        (true, _) => label.to_string(),
        (false, true) => parent.to_string(),
        (false, false) => format!("{parent} ~ {label}"),
    }
}

/// Sibling order of two groups of the same level.
///
/// Comparable dimensions order by their comparer (nulls first, mirrored when
/// descending). A non-comparable dimension orders by main datum id, i.e.
/// source order. Ties fall back to source order.
fn compare_groups(
    complex_type: &ComplexType,
    level: &GroupingLevelSpec,
    a: (&IndexMap<String, AtomRef>, Option<DatumId>),
    b: (&IndexMap<String, AtomRef>, Option<DatumId>),
) -> Ordering {
    for dim in level.dimensions() {
        let Some(dim_type) = complex_type.dimension(dim.name()) else {
            continue;
        };
        if dim_type.is_comparable() {
            let ord = match (a.0.get(dim.name()), b.0.get(dim.name())) {
                (Some(x), Some(y)) => dim_type.compare_atoms(x, y, dim.reverse()),
                _ => Ordering::Equal,
            };
            if ord != Ordering::Equal {
                return ord;
            }
        } else {
            let ord = a.1.cmp(&b.1);
            return if dim.reverse() { ord.reverse() } else { ord };
        }
    }
    a.1.cmp(&b.1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complex_type::DimensionType;
    use crate::data::LoadOptions;
    use crate::datum::Record;
    use crate::value::ValueType;

    fn dataset() -> Result<DataSet, CccDataError> {
        let ct = ComplexType::new()
            .with_dimension(DimensionType::new("series", ValueType::String))?
            .with_dimension(DimensionType::new("category", ValueType::String))?
            .with_dimension(DimensionType::new("value", ValueType::Number))?;
        Ok(DataSet::new(ct))
    }

    fn keys(data: &DataSet, id: DataId) -> Vec<String> {
        data.data(id)
            .unwrap()
            .child_refs()
            .map(|c| c.key().to_string())
            .collect()
    }

    #[test]
    fn test_discrete_groups_keep_source_order() -> Result<(), CccDataError> {
        let mut data = dataset()?;
        data.load(
            vec![
                Record::new().with("series", "B").with("value", 1),
                Record::new().with("series", "A").with("value", 2),
                Record::new().with("series", "C").with("value", 3),
            ],
            &LoadOptions::default(),
        )?;
        let root = data.root();
        let grouped = data.group_by_text(root, "series", &GroupingOptions::default())?;
        assert_eq!(keys(&data, grouped), vec!["B", "A", "C"]);
        let reversed = data.group_by_text(root, "series desc", &GroupingOptions::default())?;
        assert_eq!(keys(&data, reversed), vec!["C", "A", "B"]);
        Ok(())
    }

    #[test]
    fn test_continuous_groups_sort_by_value() -> Result<(), CccDataError> {
        let mut data = dataset()?;
        data.load(
            [3, 1, 2].map(|v| Record::new().with("series", "A").with("value", v)),
            &LoadOptions::default(),
        )?;
        let root = data.root();
        let grouped = data.group_by_text(root, "value", &GroupingOptions::default())?;
        assert_eq!(keys(&data, grouped), vec!["1", "2", "3"]);
        let desc = data.group_by_text(
            root,
            "value",
            &GroupingOptions::default().with_reverse(true),
        )?;
        assert_eq!(keys(&data, desc), vec!["3", "2", "1"]);

        data.add(
            vec![Record::new().with("series", "A").with("value", 1.5)],
            &LoadOptions::default(),
        )?;
        assert_eq!(keys(&data, grouped), vec!["1", "1.5", "2", "3"]);
        assert_eq!(keys(&data, desc), vec!["3", "2", "1.5", "1"]);
        Ok(())
    }

    #[test]
    fn test_multi_dimension_level_key() -> Result<(), CccDataError> {
        let mut data = dataset()?;
        data.load(
            vec![
                Record::new().with("series", "A").with("category", "x").with("value", 1),
                Record::new().with("series", "A").with("category", "x").with("value", 2),
                Record::new().with("series", "A").with("value", 3),
            ],
            &LoadOptions::default(),
        )?;
        let grouped = data.group_by_text(data.root(), "series|category", &GroupingOptions::default())?;
        assert_eq!(keys(&data, grouped), vec!["A~x", "A~"]);
        let first = data.data(grouped)?.child(0).unwrap();
        assert_eq!(first.label(), "A, x");
        assert_eq!(first.datum_count(), 2);
        assert_eq!(first.value(), Some(crate::value::Value::from("A~x")));
        Ok(())
    }

    #[test]
    fn test_schema_mismatch() -> Result<(), CccDataError> {
        let mut data = dataset()?;
        let other = ComplexType::new().with_dimension(DimensionType::new("series", ValueType::String))?;
        let spec = GroupingSpec::parse("series")?.bind(&other)?;
        let err = data
            .group_by(data.root(), &[spec], &GroupingOptions::default())
            .unwrap_err();
        assert!(matches!(err, CccDataError::SchemaMismatch { .. }));
        assert!(matches!(
            data.group_by(data.root(), &[], &GroupingOptions::default()),
            Err(CccDataError::InvalidArgument(_))
        ));
        Ok(())
    }

    #[test]
    fn test_flattened_pre_order_labels() -> Result<(), CccDataError> {
        let mut data = dataset()?;
        data.load(
            vec![
                Record::new().with("series", "A").with("category", "x").with("value", 1),
                Record::new().with("series", "A").with("category", "y").with("value", 2),
                Record::new().with("series", "B").with("category", "x").with("value", 3),
            ],
            &LoadOptions::default(),
        )?;
        let spec = Arc::new(GroupingSpec::parse("series,category")?).ensure(
            &EnsureOptions::default()
                .with_flatten_mode(FlattenMode::DfsPre)
                .with_root_label("All"),
        );
        let grouped = data.group_by(data.root(), &[spec], &GroupingOptions::default())?;
        assert_eq!(
            keys(&data, grouped),
            vec!["", "A", "A,x", "A,y", "B", "B,x"]
        );
        let view = data.data(grouped)?;
        assert_eq!(view.tree_height(), 1);
        let labels = view
            .child_refs()
            .map(|c| c.label().to_string())
            .collect::<Vec<_>>();
        assert_eq!(labels, vec!["All", "A", "A ~ x", "A ~ y", "B", "B ~ x"]);
        let flags = view
            .child_refs()
            .map(|c| c.is_flatten_group())
            .collect::<Vec<_>>();
        assert_eq!(flags, vec![true, true, false, false, true, false]);
        assert_eq!(view.leafs().len(), 6);
        Ok(())
    }

    #[test]
    fn test_flattened_add_merges_into_existing_groups() -> Result<(), CccDataError> {
        let mut data = dataset()?;
        data.load(
            vec![
                Record::new().with("series", "A").with("category", "x").with("value", 1),
                Record::new().with("series", "B").with("value", 2),
            ],
            &LoadOptions::default(),
        )?;
        let spec = Arc::new(GroupingSpec::parse("series,category")?)
            .ensure(&EnsureOptions::default().with_flatten_mode(FlattenMode::DfsPost));
        let grouped = data.group_by(data.root(), &[spec], &GroupingOptions::default())?;
        assert_eq!(keys(&data, grouped), vec!["A,x", "A", "B", ""]);
        let before = data.data(grouped)?.children().to_vec();
        let b = data.data(grouped)?.child_by_key("B").unwrap();
        assert!(b.is_degenerate_flatten_group());

        data.add(
            vec![Record::new().with("series", "A").with("category", "y").with("value", 3)],
            &LoadOptions::default(),
        )?;
        assert_eq!(keys(&data, grouped), vec!["A,x", "A,y", "A", "B", ""]);
        let after = data.data(grouped)?.children().to_vec();
        assert_eq!(after[0], before[0]);
        assert_eq!(&after[2..], &before[1..]);
        assert_eq!(data.data(after[2])?.datum_count(), 2);
        assert_eq!(data.data(after[4])?.datum_count(), 3);

        // B keeps a single child until a second category shows up
        data.add(
            vec![Record::new().with("series", "B").with("category", "x").with("value", 4)],
            &LoadOptions::default(),
        )?;
        assert_eq!(keys(&data, grouped), vec!["A,x", "A,y", "A", "B", "B,x", "B#1", ""]);
        let view = data.data(grouped)?;
        let b_null = view.child_by_key("B").unwrap();
        assert_eq!(b_null.id(), before[2]);
        assert!(!b_null.is_flatten_group());
        assert_eq!(b_null.datum_count(), 1);
        assert_eq!(view.child_by_key("B#1").unwrap().datum_count(), 2);

        let state = data.node(grouped)?.flat_state.as_ref().unwrap();
        assert_eq!(state.tree[0].datums.len(), 4);
        assert_eq!(state.tree.len(), 7);
        Ok(())
    }
}
