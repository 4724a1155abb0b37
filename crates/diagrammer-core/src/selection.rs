//! Element selection.

use crate::shapes::ElementId;

/// Ordered set of selected element ids.
///
/// Order is the order in which elements joined the selection. Only the
/// engine prunes entries, and only when the elements leave the document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    ids: Vec<ElementId>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> &[ElementId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|s| s == id)
    }

    /// Replace the selection with a single element. Returns true if it changed.
    pub fn select(&mut self, id: impl Into<ElementId>) -> bool {
        let id = id.into();
        if self.ids.len() == 1 && self.ids[0] == id {
            return false;
        }
        self.ids.clear();
        self.ids.push(id);
        true
    }

    /// Replace the selection with `ids` (duplicates dropped).
    pub fn set(&mut self, ids: impl IntoIterator<Item = ElementId>) -> bool {
        let mut next: Vec<ElementId> = Vec::new();
        for id in ids {
            if !next.contains(&id) {
                next.push(id);
            }
        }
        if next == self.ids {
            return false;
        }
        self.ids = next;
        true
    }

    /// Add an element. Returns true if it was not already selected.
    pub fn add(&mut self, id: impl Into<ElementId>) -> bool {
        let id = id.into();
        if self.contains(&id) {
            return false;
        }
        self.ids.push(id);
        true
    }

    /// Flip membership of an element. Returns true if it is now selected.
    pub fn toggle(&mut self, id: impl Into<ElementId>) -> bool {
        let id = id.into();
        if self.deselect(&id) {
            false
        } else {
            self.ids.push(id);
            true
        }
    }

    /// Remove an element. Returns true if it was selected.
    pub fn deselect(&mut self, id: &str) -> bool {
        let before = self.ids.len();
        self.ids.retain(|s| s != id);
        self.ids.len() != before
    }

    /// Empty the selection. Returns true if anything was selected.
    pub fn clear(&mut self) -> bool {
        let had_any = !self.ids.is_empty();
        self.ids.clear();
        had_any
    }

    /// Drop ids for which `exists` is false. Returns true if any were dropped.
    pub fn retain_existing(&mut self, exists: impl Fn(&str) -> bool) -> bool {
        let before = self.ids.len();
        self.ids.retain(|id| exists(id));
        self.ids.len() != before
    }
}
