use std::collections::{HashMap, HashSet};
use std::fmt::{Debug, Formatter};

use super::{DataId, DataSet, NodeCaches, Partition};
use crate::atom::AtomRef;
use crate::datum::{Datum, DatumId, DatumPredicate, Record, RecordValue};
use crate::error::CccDataError;

/// Options of [`DataSet::load`] and [`DataSet::add`]
#[derive(Clone, Default)]
pub struct LoadOptions {
    /// Classifies a datum as null. Null datums are kept but excluded from
    /// the selected/visible sets and, by default, from groupings.
    pub is_null: Option<DatumPredicate>,
    /// Inclusion predicate; datums failing it are not loaded
    pub where_: Option<DatumPredicate>,
}

impl Debug for LoadOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadOptions")
            .field("is_null", &self.is_null.is_some())
            .field("where_", &self.where_.is_some())
            .finish()
    }
}

impl LoadOptions {
    pub fn with_is_null(mut self, is_null: DatumPredicate) -> Self {
        self.is_null = Some(is_null);
        self
    }

    pub fn with_where(mut self, where_: DatumPredicate) -> Self {
        self.where_ = Some(where_);
        self
    }
}

impl DataSet {
    /// Replace every datum of the owner.
    ///
    /// Disposes all derived views, sweeps atoms no surviving datum references
    /// and rebuilds the selected/visible sets.
    pub fn load<I>(&mut self, records: I, options: &LoadOptions) -> Result<(), CccDataError>
    where
        I: IntoIterator<Item = Record>,
    {
        let datums = self.build_datums(records, options)?;

        let root = self.root;
        let derived = {
            let owner = self.node_mut(root)?;
            owner.caches = NodeCaches::default();
            owner.datums.clear();
            owner.children.clear();
            owner.children_by_key.clear();
            owner.link_children.drain(..).collect::<Vec<_>>()
        };
        for id in derived {
            self.dispose(id);
        }
        self.store.clear();

        let mut ids = Vec::with_capacity(datums.len());
        for datum in datums {
            if self.store.by_key.contains_key(datum.key()) {
                continue;
            }
            ids.push(self.commit_datum(datum));
        }
        self.node_mut(root)?.datums = ids;

        let removed = self.collect_garbage();
        log::debug!(
            "loaded {} datums, swept {} unreferenced atoms",
            self.store.datums.len(),
            removed
        );
        Ok(())
    }

    /// Add datums to the owner without rebuilding derived views.
    ///
    /// A datum whose key already exists is skipped and the existing one kept.
    /// The new datums flow into every live `where` view and grouping. Returns
    /// the ids of the datums actually added.
    pub fn add<I>(&mut self, records: I, options: &LoadOptions) -> Result<Vec<DatumId>, CccDataError>
    where
        I: IntoIterator<Item = Record>,
    {
        let datums = self.build_unseen_datums(records, options)?;
        self.add_datums(datums)
    }

    /// Build the datums of records not loaded yet.
    ///
    /// Atoms interned only for records that end up not added (rejected by
    /// `where`, duplicates or a failed build) are swept again.
    fn build_unseen_datums<I>(
        &mut self,
        records: I,
        options: &LoadOptions,
    ) -> Result<Vec<Datum>, CccDataError>
    where
        I: IntoIterator<Item = Record>,
    {
        let marks = self
            .dimensions
            .values()
            .map(|d| d.atom_count())
            .collect::<Vec<_>>();
        let built = self
            .build_datums(records, options)
            .map(|datums| self.unseen(datums));
        let swept = self.sweep_atoms_since(&marks, built.as_deref().unwrap_or_default());
        if swept > 0 {
            log::debug!("swept {swept} atoms interned for records that were not added");
        }
        built
    }

    fn unseen(&self, datums: Vec<Datum>) -> Vec<Datum> {
        let mut keys = HashSet::new();
        datums
            .into_iter()
            .filter(|datum| {
                let fresh = !self.store.by_key.contains_key(datum.key())
                    && keys.insert(datum.key().to_string());
                if !fresh {
                    log::debug!("skipping datum with existing key `{}`", datum.key());
                }
                fresh
            })
            .collect()
    }

    /// Un-intern the atoms created after `marks` that none of `datums` references
    fn sweep_atoms_since(&mut self, marks: &[usize], datums: &[Datum]) -> usize {
        let mut live: HashMap<&str, HashSet<&str>> = HashMap::new();
        for datum in datums {
            for (dim_name, atom) in datum.atoms() {
                live.entry(dim_name).or_default().insert(atom.key());
            }
        }
        let empty = HashSet::new();
        self.dimensions
            .iter_mut()
            .zip(marks)
            .map(|((name, dimension), mark)| {
                dimension.sweep_since(*mark, live.get(name.as_str()).unwrap_or(&empty))
            })
            .sum()
    }

    pub(crate) fn add_datums(&mut self, datums: Vec<Datum>) -> Result<Vec<DatumId>, CccDataError> {
        let mut ids = Vec::with_capacity(datums.len());
        for datum in datums {
            if self.store.by_key.contains_key(datum.key()) {
                log::debug!("skipping datum with existing key `{}`", datum.key());
                continue;
            }
            ids.push(self.commit_datum(datum));
        }
        if ids.is_empty() {
            return Ok(ids);
        }
        let root = self.root;
        self.node_mut(root)?.extend_datums(&ids);
        self.propagate_add(root, &ids)?;
        Ok(ids)
    }

    /// Build datums from records, interning their atoms
    fn build_datums<I>(&mut self, records: I, options: &LoadOptions) -> Result<Vec<Datum>, CccDataError>
    where
        I: IntoIterator<Item = Record>,
    {
        let mut datums = Vec::new();
        for record in records {
            let atoms = self.intern_record(&record)?;
            let datum = Datum::new(self.store.next_id(), self.complex_type.clone(), atoms);
            if let Some(where_) = &options.where_ {
                if !where_(&datum) {
                    continue;
                }
            }
            let mut datum = datum;
            if let Some(is_null) = &options.is_null {
                let null = is_null(&datum);
                datum.set_null(null);
            }
            datums.push(datum);
        }
        Ok(datums)
    }

    pub(crate) fn intern_record(&mut self, record: &Record) -> Result<Vec<AtomRef>, CccDataError> {
        for (name, _) in record.iter() {
            if !self.dimensions.contains_key(name) {
                log::warn!("record value for undeclared dimension `{name}` is ignored");
            }
        }
        let mut atoms = Vec::with_capacity(self.dimensions.len());
        for (name, dimension) in self.dimensions.iter_mut() {
            let atom = match record.get(name) {
                None => dimension.null_atom().clone(),
                Some(RecordValue::Value(value)) => dimension.intern(value.clone())?,
                Some(RecordValue::Labeled(value, label)) => {
                    dimension.intern_labeled(Some(value.clone()), Some(label.clone()))?
                }
                Some(RecordValue::Atom(atom)) => dimension.adopt(atom)?,
            };
            atoms.push(atom);
        }
        Ok(atoms)
    }

    fn commit_datum(&mut self, datum: Datum) -> DatumId {
        let id = datum.id();
        if !datum.is_null() {
            if datum.is_selected() {
                self.store.selected.insert(id);
            }
            if datum.is_visible() {
                self.store.visible.insert(id);
            }
        }
        self.store.by_key.insert(datum.key().to_string(), id);
        self.store.datums.insert(id, datum);
        id
    }

    /// Un-intern every atom no datum of the owner references
    fn collect_garbage(&mut self) -> usize {
        let mut live: HashMap<&str, HashSet<&str>> = HashMap::new();
        for datum in self.store.datums.values() {
            for (dim_name, atom) in datum.atoms() {
                live.entry(dim_name).or_default().insert(atom.key());
            }
        }
        let empty = HashSet::new();
        self.dimensions
            .iter_mut()
            .map(|(name, dimension)| {
                dimension.retain_keys(live.get(name.as_str()).unwrap_or(&empty))
            })
            .sum()
    }

    /// Push datums newly added to `source` into each of its linked views
    pub(crate) fn propagate_add(&mut self, source: DataId, ids: &[DatumId]) -> Result<(), CccDataError> {
        let link_children = self.node(source)?.link_children.clone();
        for child in link_children {
            let partition = self.node(child)?.partition.clone();
            match partition {
                Partition::Where(filter) => {
                    let kept = ids
                        .iter()
                        .copied()
                        .filter(|id| {
                            self.store
                                .get(*id)
                                .map(|d| filter.matches(d))
                                .unwrap_or(false)
                        })
                        .collect::<Vec<_>>();
                    if kept.is_empty() {
                        continue;
                    }
                    log::debug!("where view {child} receives {} datums", kept.len());
                    self.node_mut(child)?.extend_datums(&kept);
                    self.propagate_add(child, &kept)?;
                }
                Partition::Grouping(oper) => {
                    self.extend_grouping(child, &oper, ids)?;
                }
                Partition::None => {}
            }
        }
        Ok(())
    }
}
