//! Pool of reusable scene instances keyed by component tag.

use std::collections::HashMap;

use crate::scene::{NodeId, SceneGraph};

pub const BUSY_INDICATOR_TAG: &str = "busy_indicator";

#[derive(Debug, Default)]
pub struct InstanceRegistry {
    pooled: HashMap<&'static str, Vec<NodeId>>,
}

impl InstanceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a pooled instance for `tag`. Entries destroyed since they were
    /// returned are discarded.
    pub fn get(&mut self, scene: &SceneGraph, tag: &'static str) -> Option<NodeId> {
        let pool = self.pooled.get_mut(tag)?;
        while let Some(node) = pool.pop() {
            if scene.is_alive(node) {
                return Some(node);
            }
            tracing::debug!(node = %node, tag, "Dropping dead pooled instance");
        }
        None
    }

    pub fn put(&mut self, tag: &'static str, node: NodeId) {
        let pool = self.pooled.entry(tag).or_default();
        if !pool.contains(&node) {
            pool.push(node);
        }
    }

    #[must_use]
    pub fn pooled(&self, tag: &str) -> usize {
        self.pooled.get(tag).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::BUSY_INDICATOR_PREFAB;

    #[test]
    fn get_returns_put_instance() {
        let mut scene = SceneGraph::with_default_prefabs();
        let table = scene.add_surface("table");
        let spinner = scene.instantiate(BUSY_INDICATOR_PREFAB, table).unwrap();

        let mut registry = InstanceRegistry::new();
        assert_eq!(registry.get(&scene, BUSY_INDICATOR_TAG), None);

        registry.put(BUSY_INDICATOR_TAG, spinner);
        registry.put(BUSY_INDICATOR_TAG, spinner);
        assert_eq!(registry.pooled(BUSY_INDICATOR_TAG), 1);
        assert_eq!(registry.get(&scene, BUSY_INDICATOR_TAG), Some(spinner));
        assert_eq!(registry.get(&scene, BUSY_INDICATOR_TAG), None);
    }

    #[test]
    fn dead_instances_are_skipped() {
        let mut scene = SceneGraph::with_default_prefabs();
        let table = scene.add_surface("table");
        let spinner = scene.instantiate(BUSY_INDICATOR_PREFAB, table).unwrap();

        let mut registry = InstanceRegistry::new();
        registry.put(BUSY_INDICATOR_TAG, spinner);
        scene.destroy(table);

        assert_eq!(registry.get(&scene, BUSY_INDICATOR_TAG), None);
        assert_eq!(registry.pooled(BUSY_INDICATOR_TAG), 0);
    }
}
