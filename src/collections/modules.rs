//! Path-indexed storage for every object discovered during a loading session.

use crate::error::AliasError;
use crate::models::{Alias, AliasState, Node, NodeId, Object};
use std::collections::BTreeMap;

/// Arena of graph nodes plus the index of top-level modules
///
/// A collection is owned by one loader and lives for one loading session.
/// Nodes removed from their parent stay in the arena, detached.
#[derive(Debug, Default)]
pub struct ModulesCollection {
    nodes: Vec<Node>,
    roots: BTreeMap<String, NodeId>,
}

impl ModulesCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a detached node to the arena
    pub fn insert(&mut self, node: impl Into<Node>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node.into());
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn object(&self, id: NodeId) -> Option<&Object> {
        self.node(id).as_object()
    }

    pub fn object_mut(&mut self, id: NodeId) -> Option<&mut Object> {
        self.node_mut(id).as_object_mut()
    }

    pub fn alias(&self, id: NodeId) -> Option<&Alias> {
        self.node(id).as_alias()
    }

    pub fn alias_mut(&mut self, id: NodeId) -> Option<&mut Alias> {
        self.node_mut(id).as_alias_mut()
    }

    // =========================================================================
    // Top-level modules
    // =========================================================================

    pub fn set_root(&mut self, id: NodeId) {
        self.node_mut(id).set_parent(None);
        let name = self.node(id).name().to_string();
        self.roots.insert(name, id);
    }

    pub fn root(&self, name: &str) -> Option<NodeId> {
        self.roots.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.roots.contains_key(name)
    }

    /// Snapshot of the top-level module names
    pub fn root_names(&self) -> Vec<String> {
        self.roots.keys().cloned().collect()
    }

    pub fn roots(&self) -> impl Iterator<Item = (&str, NodeId)> {
        self.roots.iter().map(|(name, id)| (name.as_str(), *id))
    }

    // =========================================================================
    // Members
    // =========================================================================

    pub fn member(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.object(parent)?.members.get(name).copied()
    }

    /// Snapshot of the members of `parent`, sorted by name
    pub fn members(&self, parent: NodeId) -> Vec<(String, NodeId)> {
        self.object(parent)
            .map(|object| {
                object
                    .members
                    .iter()
                    .map(|(name, id)| (name.clone(), *id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Attach `child` under its own name, detaching any member it replaces
    pub fn set_member(&mut self, parent: NodeId, child: NodeId) {
        let name = self.node(child).name().to_string();
        if self.object(parent).is_none() {
            tracing::debug!(
                "Cannot attach {} under {}: not an object",
                name,
                self.path(parent)
            );
            return;
        }
        if let Some(previous) = self.member(parent, &name) {
            if previous != child {
                self.node_mut(previous).set_parent(None);
            }
        }
        self.node_mut(child).set_parent(Some(parent));
        if let Some(object) = self.object_mut(parent) {
            object.members.insert(name, child);
        }
    }

    pub fn del_member(&mut self, parent: NodeId, name: &str) -> Option<NodeId> {
        let removed = self.object_mut(parent)?.members.remove(name)?;
        self.node_mut(removed).set_parent(None);
        Some(removed)
    }

    /// Point `child` at `parent` without making it a member yet
    ///
    /// Extractors use this so a module under construction already knows its
    /// dotted path; the loader attaches it once it built successfully.
    pub(crate) fn set_parent(&mut self, child: NodeId, parent: Option<NodeId>) {
        self.node_mut(child).set_parent(parent);
    }

    // =========================================================================
    // Paths
    // =========================================================================

    /// Dotted path computed from the parent chain
    pub fn path(&self, id: NodeId) -> String {
        let mut parts = vec![self.node(id).name()];
        let mut current = self.node(id).parent();
        while let Some(parent) = current {
            parts.push(self.node(parent).name());
            current = self.node(parent).parent();
        }
        parts.reverse();
        parts.join(".")
    }

    /// Top-level ancestor of `id`
    pub fn package_of(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(parent) = self.node(current).parent() {
            current = parent;
        }
        current
    }

    /// Whether `id` is still reachable from a top-level module
    pub fn is_attached(&self, id: NodeId) -> bool {
        let top = self.package_of(id);
        self.roots.get(self.node(top).name()) == Some(&top)
    }

    /// Name of the package `id` belongs to
    pub fn package_name(&self, id: NodeId) -> &str {
        self.node(self.package_of(id)).name()
    }

    /// Look up a node by dotted path, going through aliases met on the way
    ///
    /// The last segment is returned as is, so looking up the path of an alias
    /// returns the alias itself.
    pub fn get_member(&self, path: &str) -> Option<NodeId> {
        self.descend(path, &mut Vec::new()).ok().flatten()
    }

    /// Follow `id` through any chain of aliases down to a concrete object
    pub fn final_target(&self, id: NodeId) -> Result<NodeId, AliasError> {
        self.follow(id, &mut Vec::new())
    }

    /// Like [`Self::final_target`], recording the outcome on the alias
    pub fn resolve_alias(&mut self, id: NodeId) -> Result<NodeId, AliasError> {
        let result = self.final_target(id);
        if let Some(alias) = self.alias_mut(id) {
            match &result {
                Ok(target) => alias.state = AliasState::Resolved(*target),
                Err(AliasError::Cyclic { .. }) => alias.state = AliasState::Cyclic,
                Err(AliasError::Unresolved { .. }) => {}
            }
        }
        result
    }

    fn follow(&self, id: NodeId, chain: &mut Vec<String>) -> Result<NodeId, AliasError> {
        let mut current = id;
        loop {
            let alias = match self.node(current) {
                Node::Object(_) => return Ok(current),
                Node::Alias(alias) => alias,
            };
            if let AliasState::Resolved(target) = alias.state {
                if self.is_attached(target) {
                    return Ok(target);
                }
            }

            let path = self.path(current);
            if chain.contains(&path) {
                chain.push(path);
                return Err(AliasError::Cyclic {
                    chain: chain.clone(),
                });
            }
            chain.push(path.clone());

            current = match self.descend(&alias.target_path, chain)? {
                Some(next) => next,
                None => {
                    return Err(AliasError::Unresolved {
                        alias_path: path,
                        target_path: alias.target_path.clone(),
                    })
                }
            };
        }
    }

    fn descend(&self, path: &str, chain: &mut Vec<String>) -> Result<Option<NodeId>, AliasError> {
        let mut parts = path.split('.');
        let Some(mut current) = parts.next().and_then(|first| self.root(first)) else {
            return Ok(None);
        };
        for part in parts {
            // Intermediate segments are lookups, not links of the alias chain
            let mark = chain.len();
            let owner = self.follow(current, chain)?;
            chain.truncate(mark);
            match self.member(owner, part) {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    // =========================================================================
    // Visibility
    // =========================================================================

    /// Whether `id` is listed in its parent module's export list
    pub fn is_exported(&self, id: NodeId) -> bool {
        let node = self.node(id);
        node.parent()
            .and_then(|parent| self.object(parent))
            .is_some_and(|parent| parent.is_module() && parent.exports_name(node.name()))
    }

    /// Whether `from parent import *` brings `id` into the importing module
    ///
    /// Names listed in the export list always are. Otherwise public names are,
    /// except submodules which Python only binds when they are imported.
    pub fn is_wildcard_exposed(&self, id: NodeId) -> bool {
        let node = self.node(id);
        if node.as_alias().is_some_and(Alias::is_wildcard) {
            return false;
        }
        if self.is_exported(id) {
            return true;
        }
        if node.name().starts_with('_') {
            return false;
        }
        !node.as_object().is_some_and(Object::is_module)
    }
}
