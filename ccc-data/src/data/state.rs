use super::DataSet;
use crate::datum::{Datum, DatumId};
use crate::error::CccDataError;

// Selection and visibility are plain flags toggled by interaction code. Views
// filtered on them are not refreshed when they change.
impl DataSet {
    /// Returns whether the state changed
    pub fn set_selected(&mut self, id: DatumId, selected: bool) -> Result<bool, CccDataError> {
        let datum = self.store.get_mut(id)?;
        if datum.is_selected() == selected {
            return Ok(false);
        }
        datum.set_selected(selected);
        let is_null = datum.is_null();
        if selected && !is_null {
            self.store.selected.insert(id);
        } else {
            self.store.selected.shift_remove(&id);
        }
        Ok(true)
    }

    /// Returns the new state
    pub fn toggle_selected(&mut self, id: DatumId) -> Result<bool, CccDataError> {
        let selected = !self.store.get(id)?.is_selected();
        self.set_selected(id, selected)?;
        Ok(selected)
    }

    /// Deselect every datum. Returns how many were selected.
    pub fn clear_selected(&mut self) -> usize {
        let selected = std::mem::take(&mut self.store.selected);
        for id in &selected {
            if let Ok(datum) = self.store.get_mut(*id) {
                datum.set_selected(false);
            }
        }
        selected.len()
    }

    pub fn set_visible(&mut self, id: DatumId, visible: bool) -> Result<bool, CccDataError> {
        let datum = self.store.get_mut(id)?;
        if datum.is_visible() == visible {
            return Ok(false);
        }
        datum.set_visible(visible);
        let is_null = datum.is_null();
        if visible && !is_null {
            self.store.visible.insert(id);
        } else {
            self.store.visible.shift_remove(&id);
        }
        Ok(true)
    }

    pub fn toggle_visible(&mut self, id: DatumId) -> Result<bool, CccDataError> {
        let visible = !self.store.get(id)?.is_visible();
        self.set_visible(id, visible)?;
        Ok(visible)
    }

    /// Null datums leave the selected and visible sets; their flags are kept.
    /// Cached sums are dropped.
    pub fn set_null(&mut self, id: DatumId, is_null: bool) -> Result<bool, CccDataError> {
        let datum = self.store.get_mut(id)?;
        if datum.is_null() == is_null {
            return Ok(false);
        }
        datum.set_null(is_null);
        let (selected, visible) = (datum.is_selected(), datum.is_visible());
        // Sums skip null datums
        for node in self.nodes.iter_mut().flatten() {
            node.caches.sum_abs.clear();
        }
        if is_null {
            self.store.selected.shift_remove(&id);
            self.store.visible.shift_remove(&id);
        } else {
            if selected {
                self.store.selected.insert(id);
            }
            if visible {
                self.store.visible.insert(id);
            }
        }
        Ok(true)
    }

    pub fn selected_count(&self) -> usize {
        self.store.selected.len()
    }

    pub fn visible_count(&self) -> usize {
        self.store.visible.len()
    }

    pub fn selected_datums(&self) -> Vec<&Datum> {
        self.state_datums(self.store.selected.iter())
    }

    pub fn visible_datums(&self) -> Vec<&Datum> {
        self.state_datums(self.store.visible.iter())
    }

    fn state_datums<'a>(&'a self, ids: impl Iterator<Item = &'a DatumId>) -> Vec<&'a Datum> {
        let mut datums = ids
            .filter_map(|id| self.store.datums.get(id))
            .collect::<Vec<_>>();
        datums.sort_by_key(|d| d.id());
        datums
    }
}
