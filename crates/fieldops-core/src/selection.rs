//! Multi-select state for one list view.

use std::collections::BTreeSet;

use crate::recycle::BulkOutcome;

/// Ids selected in a single list view.
///
/// Owned by the view that created it. Refreshing the list leaves it alone;
/// only a bulk action that acted on it, or an explicit clear, changes it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    ids: BTreeSet<String>,
}

impl SelectionSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip one id. Returns whether it is selected afterwards.
    pub fn toggle(&mut self, id: &str) -> bool {
        if self.ids.remove(id) {
            false
        } else {
            self.ids.insert(id.to_string());
            true
        }
    }

    /// Select every id on the page, or deselect them all if the page is
    /// already fully selected. Ids from other pages are untouched.
    pub fn toggle_all<I, S>(&mut self, page: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let page: Vec<String> = page.into_iter().map(|id| id.as_ref().to_string()).collect();
        if page.is_empty() {
            return;
        }
        if page.iter().all(|id| self.ids.contains(id)) {
            for id in &page {
                self.ids.remove(id);
            }
        } else {
            self.ids.extend(page);
        }
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Drop the ids a bulk action succeeded on; failed ids stay selected.
    pub fn apply_outcome(&mut self, outcome: &BulkOutcome) {
        for id in &outcome.succeeded {
            self.ids.remove(id);
        }
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// Selected ids in sorted order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<String> {
        self.ids.iter().cloned().collect()
    }
}
