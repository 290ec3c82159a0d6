//! Parent to child market lookup.
//!
//! Markets only store their parent id. This index answers the reverse
//! question without markets holding references to each other.

use dashmap::DashMap;

use crate::domain::id::MarketId;

#[derive(Debug, Default)]
pub struct HierarchyIndex {
    children: DashMap<MarketId, Vec<MarketId>>,
}

impl HierarchyIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, parent: MarketId, child: MarketId) {
        let mut children = self.children.entry(parent).or_default();
        if !children.contains(&child) {
            children.push(child);
        }
    }

    /// Forget `child`, dropping the parent entry once it has no children.
    pub fn remove(&self, parent: &MarketId, child: &MarketId) {
        if let Some(mut children) = self.children.get_mut(parent) {
            children.retain(|id| id != child);
        }
        self.children.remove_if(parent, |_, children| children.is_empty());
    }

    /// Children of `parent` in insertion order.
    #[must_use]
    pub fn children_of(&self, parent: &MarketId) -> Vec<MarketId> {
        self.children
            .get(parent)
            .map(|children| children.clone())
            .unwrap_or_default()
    }
}
