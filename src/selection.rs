use crate::types::{LayerHandle, ViewRole};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Which identifier is selected and which drawn elements are highlighted.
///
/// Only the coordinator writes to this; views read it during `render`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SelectionState {
    selected: Option<String>,
    highlighted: BTreeMap<ViewRole, BTreeSet<LayerHandle>>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&mut self, identifier: &str) {
        self.selected = Some(identifier.to_string());
    }

    pub fn clear(&mut self) {
        self.selected = None;
        self.highlighted.clear();
    }

    pub fn is_selected(&self, identifier: &str) -> bool {
        self.selected.as_deref() == Some(identifier)
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn replace_highlights<I>(&mut self, view: ViewRole, handles: I)
    where
        I: IntoIterator<Item = LayerHandle>,
    {
        let handles: BTreeSet<LayerHandle> = handles.into_iter().collect();
        if handles.is_empty() {
            self.highlighted.remove(&view);
        } else {
            self.highlighted.insert(view, handles);
        }
    }

    pub fn highlights(&self, view: ViewRole) -> impl Iterator<Item = LayerHandle> + '_ {
        self.highlighted.get(&view).into_iter().flatten().copied()
    }

    pub fn highlight_count(&self) -> usize {
        self.highlighted.values().map(BTreeSet::len).sum()
    }
}
