//! In-memory scene graph the orchestrator attaches dialogs and indicators to.
//!
//! Nodes form a forest: top-level surfaces (tables, menus) are roots, dialogs
//! and busy indicators hang off them. Node ids are never reused, so a stale id
//! simply stops being alive.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use cashier_types::CallError;
use thiserror::Error;

pub const DIALOG_PREFAB: &str = "dialog";
pub const BUSY_INDICATOR_PREFAB: &str = "busy_indicator";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LayoutPreset {
    #[default]
    Fill,
    Center,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogTone {
    Notice,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogView {
    pub title: Option<String>,
    pub message: String,
    pub tone: DialogTone,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Surface { name: String },
    Dialog(DialogView),
    BusyIndicator { label: String },
}

/// Template a prefab name resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prefab {
    Dialog,
    BusyIndicator,
}

impl Prefab {
    fn build(self) -> NodeKind {
        match self {
            Prefab::Dialog => NodeKind::Dialog(DialogView {
                title: None,
                message: String::new(),
                tone: DialogTone::Notice,
            }),
            Prefab::BusyIndicator => NodeKind::BusyIndicator {
                label: String::new(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    layout: LayoutPreset,
    active: bool,
    persistent: bool,
}

impl Node {
    #[must_use]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    #[must_use]
    pub fn layout(&self) -> LayoutPreset {
        self.layout
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SceneError {
    #[error("no prefab registered as {0:?}")]
    UnknownPrefab(String),
    #[error("{0} does not exist")]
    MissingNode(NodeId),
    #[error("no top-level surface to attach to")]
    NoSurface,
}

impl From<SceneError> for CallError {
    fn from(err: SceneError) -> Self {
        CallError::Configuration(err.to_string())
    }
}

#[derive(Debug, Default)]
pub struct SceneGraph {
    nodes: BTreeMap<NodeId, Node>,
    prefabs: HashMap<String, Prefab>,
    next_id: u64,
}

impl SceneGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A scene with the `dialog` and `busy_indicator` prefabs registered.
    #[must_use]
    pub fn with_default_prefabs() -> Self {
        let mut scene = Self::new();
        scene.register_prefab(DIALOG_PREFAB, Prefab::Dialog);
        scene.register_prefab(BUSY_INDICATOR_PREFAB, Prefab::BusyIndicator);
        scene
    }

    pub fn register_prefab(&mut self, name: impl Into<String>, prefab: Prefab) {
        self.prefabs.insert(name.into(), prefab);
    }

    fn allocate(&mut self, kind: NodeKind, parent: Option<NodeId>) -> NodeId {
        self.next_id += 1;
        let id = NodeId(self.next_id);
        self.nodes.insert(
            id,
            Node {
                kind,
                parent,
                children: Vec::new(),
                layout: LayoutPreset::default(),
                active: true,
                persistent: false,
            },
        );
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.push(id);
        }
        id
    }

    /// Add a top-level surface.
    pub fn add_surface(&mut self, name: impl Into<String>) -> NodeId {
        let id = self.allocate(NodeKind::Surface { name: name.into() }, None);
        tracing::debug!(node = %id, "Surface added");
        id
    }

    pub fn instantiate(&mut self, prefab: &str, parent: NodeId) -> Result<NodeId, SceneError> {
        let template = *self
            .prefabs
            .get(prefab)
            .ok_or_else(|| SceneError::UnknownPrefab(prefab.to_string()))?;
        if !self.is_alive(parent) {
            return Err(SceneError::MissingNode(parent));
        }
        Ok(self.allocate(template.build(), Some(parent)))
    }

    #[must_use]
    pub fn is_alive(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    #[must_use]
    pub fn node(&self, node: NodeId) -> Option<&Node> {
        self.nodes.get(&node)
    }

    /// The oldest top-level surface still alive.
    #[must_use]
    pub fn first_surface(&self) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|(_, node)| {
                node.parent.is_none() && matches!(node.kind, NodeKind::Surface { .. })
            })
            .map(|(id, _)| *id)
    }

    /// `container` if given, otherwise the first top-level surface.
    pub fn resolve_container(&self, container: Option<NodeId>) -> Result<NodeId, SceneError> {
        match container {
            Some(node) if self.is_alive(node) => Ok(node),
            Some(node) => Err(SceneError::MissingNode(node)),
            None => self.first_surface().ok_or(SceneError::NoSurface),
        }
    }

    pub fn set_layout(&mut self, node: NodeId, preset: LayoutPreset) -> Result<(), SceneError> {
        self.node_mut(node)?.layout = preset;
        Ok(())
    }

    pub fn set_active(&mut self, node: NodeId, active: bool) -> Result<(), SceneError> {
        self.node_mut(node)?.active = active;
        Ok(())
    }

    /// Keep `node` alive when its surface is unloaded by [`Self::load_surface`].
    pub fn mark_persistent(&mut self, node: NodeId) -> Result<(), SceneError> {
        self.node_mut(node)?.persistent = true;
        Ok(())
    }

    /// Move `node` under `parent` (or to the top level with `None`).
    pub fn reparent(&mut self, node: NodeId, parent: Option<NodeId>) -> Result<(), SceneError> {
        if let Some(parent) = parent
            && !self.is_alive(parent)
        {
            return Err(SceneError::MissingNode(parent));
        }
        let old_parent = std::mem::replace(&mut self.node_mut(node)?.parent, parent);
        if let Some(old) = old_parent.and_then(|p| self.nodes.get_mut(&p)) {
            old.children.retain(|child| *child != node);
        }
        if let Some(new) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            new.children.push(node);
        }
        Ok(())
    }

    /// Remove `node` and everything under it. Destroying a dead node is a no-op.
    pub fn destroy(&mut self, node: NodeId) {
        let Some(removed) = self.nodes.remove(&node) else {
            return;
        };
        if let Some(parent) = removed.parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.retain(|child| *child != node);
        }
        let mut pending = removed.children;
        while let Some(child) = pending.pop() {
            if let Some(child) = self.nodes.remove(&child) {
                pending.extend(child.children);
            }
        }
    }

    /// Replace every non-persistent top-level surface with a fresh one named
    /// `name`. Persistent nodes under the unloaded surfaces are detached and
    /// deactivated instead of destroyed.
    pub fn load_surface(&mut self, name: impl Into<String>) -> NodeId {
        let unloading: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, node)| {
                node.parent.is_none()
                    && !node.persistent
                    && matches!(node.kind, NodeKind::Surface { .. })
            })
            .map(|(id, _)| *id)
            .collect();

        for surface in unloading {
            for keep in self.persistent_descendants(surface) {
                let _ = self.reparent(keep, None);
                let _ = self.set_active(keep, false);
            }
            self.destroy(surface);
            tracing::debug!(node = %surface, "Surface unloaded");
        }
        self.add_surface(name)
    }

    fn persistent_descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut pending = self
            .nodes
            .get(&root)
            .map(|n| n.children.clone())
            .unwrap_or_default();
        while let Some(id) = pending.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            if node.persistent {
                found.push(id);
            } else {
                pending.extend(node.children.iter().copied());
            }
        }
        found
    }

    pub fn dialog_view_mut(&mut self, node: NodeId) -> Option<&mut DialogView> {
        match &mut self.nodes.get_mut(&node)?.kind {
            NodeKind::Dialog(view) => Some(view),
            _ => None,
        }
    }

    pub fn set_indicator_label(&mut self, node: NodeId, text: impl Into<String>) {
        if let Some(Node {
            kind: NodeKind::BusyIndicator { label },
            ..
        }) = self.nodes.get_mut(&node)
        {
            *label = text.into();
        }
    }

    /// Active busy indicators whose whole ancestor chain is active.
    pub fn visible_indicators(&self) -> impl Iterator<Item = (NodeId, &str)> + '_ {
        self.nodes.iter().filter_map(|(id, node)| match &node.kind {
            NodeKind::BusyIndicator { label } if self.is_visible(*id) => {
                Some((*id, label.as_str()))
            }
            _ => None,
        })
    }

    #[must_use]
    pub fn is_visible(&self, node: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(id) = cursor {
            match self.nodes.get(&id) {
                Some(n) if n.active => cursor = n.parent,
                _ => return false,
            }
        }
        true
    }

    #[must_use]
    pub fn surface_name(&self, node: NodeId) -> Option<&str> {
        match &self.nodes.get(&node)?.kind {
            NodeKind::Surface { name } => Some(name),
            _ => None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn node_mut(&mut self, node: NodeId) -> Result<&mut Node, SceneError> {
        self.nodes.get_mut(&node).ok_or(SceneError::MissingNode(node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instantiate_attaches_to_parent() {
        let mut scene = SceneGraph::with_default_prefabs();
        let table = scene.add_surface("table");
        let dialog = scene.instantiate(DIALOG_PREFAB, table).unwrap();

        assert_eq!(scene.node(dialog).unwrap().parent(), Some(table));
        assert_eq!(scene.node(table).unwrap().children(), &[dialog]);
    }

    #[test]
    fn unknown_prefab_and_dead_parent_are_errors() {
        let mut scene = SceneGraph::new();
        let table = scene.add_surface("table");
        assert_eq!(
            scene.instantiate(DIALOG_PREFAB, table),
            Err(SceneError::UnknownPrefab("dialog".to_string()))
        );

        let mut scene = SceneGraph::with_default_prefabs();
        let table = scene.add_surface("table");
        scene.destroy(table);
        assert_eq!(
            scene.instantiate(DIALOG_PREFAB, table),
            Err(SceneError::MissingNode(table))
        );
    }

    #[test]
    fn destroy_is_recursive() {
        let mut scene = SceneGraph::with_default_prefabs();
        let table = scene.add_surface("table");
        let dialog = scene.instantiate(DIALOG_PREFAB, table).unwrap();
        let spinner = scene.instantiate(BUSY_INDICATOR_PREFAB, dialog).unwrap();

        scene.destroy(table);
        assert!(!scene.is_alive(table));
        assert!(!scene.is_alive(dialog));
        assert!(!scene.is_alive(spinner));
        assert!(scene.is_empty());
    }

    #[test]
    fn first_surface_is_oldest_root() {
        let mut scene = SceneGraph::with_default_prefabs();
        assert_eq!(scene.first_surface(), None);
        assert_eq!(scene.resolve_container(None), Err(SceneError::NoSurface));

        let lobby = scene.add_surface("lobby");
        let table = scene.add_surface("table");
        assert_eq!(scene.first_surface(), Some(lobby));
        assert_eq!(scene.resolve_container(Some(table)), Ok(table));

        scene.destroy(lobby);
        assert_eq!(scene.resolve_container(None), Ok(table));
    }

    #[test]
    fn load_surface_keeps_persistent_nodes_detached() {
        let mut scene = SceneGraph::with_default_prefabs();
        let table = scene.add_surface("table");
        let spinner = scene.instantiate(BUSY_INDICATOR_PREFAB, table).unwrap();
        let dialog = scene.instantiate(DIALOG_PREFAB, table).unwrap();
        scene.mark_persistent(spinner).unwrap();

        let next = scene.load_surface("next table");

        assert!(!scene.is_alive(table));
        assert!(!scene.is_alive(dialog));
        let kept = scene.node(spinner).unwrap();
        assert_eq!(kept.parent(), None);
        assert!(!kept.is_active());
        assert_eq!(scene.first_surface(), Some(next));
        assert_eq!(scene.surface_name(next), Some("next table"));
    }

    #[test]
    fn visibility_follows_ancestors() {
        let mut scene = SceneGraph::with_default_prefabs();
        let table = scene.add_surface("table");
        let spinner = scene.instantiate(BUSY_INDICATOR_PREFAB, table).unwrap();
        scene.set_indicator_label(spinner, "Working");

        assert_eq!(scene.visible_indicators().count(), 1);
        scene.set_active(table, false).unwrap();
        assert!(!scene.is_visible(spinner));
        assert_eq!(scene.visible_indicators().count(), 0);
    }

    #[test]
    fn reparent_moves_children() {
        let mut scene = SceneGraph::with_default_prefabs();
        let a = scene.add_surface("a");
        let b = scene.add_surface("b");
        let spinner = scene.instantiate(BUSY_INDICATOR_PREFAB, a).unwrap();

        scene.reparent(spinner, Some(b)).unwrap();
        assert!(scene.node(a).unwrap().children().is_empty());
        assert_eq!(scene.node(b).unwrap().children(), &[spinner]);
        assert_eq!(scene.node(spinner).unwrap().parent(), Some(b));
    }
}
