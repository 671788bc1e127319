//! Object graph nodes
//!
//! Every node lives in the arena owned by [`crate::collections::ModulesCollection`]
//! and is addressed by a [`NodeId`]. Parents own their members through their
//! `members` map; aliases only carry the dotted path of their target.

pub mod alias;
pub mod object;

pub use alias::{Alias, AliasState};
pub use object::{Export, Filepath, Kind, Object};

use serde::Serialize;

/// Index of a node in the modules collection arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A node of the graph: a concrete object or an alias
#[derive(Debug, Clone)]
pub enum Node {
    Object(Object),
    Alias(Alias),
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Node::Object(object) => &object.name,
            Node::Alias(alias) => &alias.name,
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        match self {
            Node::Object(object) => object.parent,
            Node::Alias(alias) => alias.parent,
        }
    }

    pub(crate) fn set_parent(&mut self, parent: Option<NodeId>) {
        match self {
            Node::Object(object) => object.parent = parent,
            Node::Alias(alias) => alias.parent = parent,
        }
    }

    pub fn is_alias(&self) -> bool {
        matches!(self, Node::Alias(_))
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Node::Object(object) => Some(object),
            Node::Alias(_) => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut Object> {
        match self {
            Node::Object(object) => Some(object),
            Node::Alias(_) => None,
        }
    }

    pub fn as_alias(&self) -> Option<&Alias> {
        match self {
            Node::Alias(alias) => Some(alias),
            Node::Object(_) => None,
        }
    }

    pub fn as_alias_mut(&mut self) -> Option<&mut Alias> {
        match self {
            Node::Alias(alias) => Some(alias),
            Node::Object(_) => None,
        }
    }

    /// Line at which this name gets bound in its parent
    pub fn defining_lineno(&self) -> Option<usize> {
        match self {
            Node::Object(object) => object.lineno,
            Node::Alias(alias) => alias.alias_lineno,
        }
    }
}

impl From<Object> for Node {
    fn from(object: Object) -> Self {
        Node::Object(object)
    }
}

impl From<Alias> for Node {
    fn from(alias: Alias) -> Self {
        Node::Alias(alias)
    }
}
