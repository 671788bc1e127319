//! Extension hooks
//!
//! Callbacks registered per [`Event`] and run synchronously, in registration
//! order, with mutable access to the loader. A hook error aborts the operation
//! that fired the event.

use crate::loader::Loader;
use crate::models::NodeId;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// A top-level load finished; receives the package root
    PackageLoaded,
    /// A concrete alias replaced part of a wildcard import; receives the alias
    WildcardExpanded,
}

pub type Hook = Box<dyn FnMut(&mut Loader, NodeId) -> anyhow::Result<()>>;

#[derive(Default)]
pub struct Extensions {
    hooks: HashMap<Event, Vec<Hook>>,
}

impl std::fmt::Debug for Extensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<&Event, usize> =
            self.hooks.iter().map(|(event, hooks)| (event, hooks.len())).collect();
        f.debug_struct("Extensions").field("hooks", &counts).finish()
    }
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&mut self, event: Event, hook: F)
    where
        F: FnMut(&mut Loader, NodeId) -> anyhow::Result<()> + 'static,
    {
        self.hooks.entry(event).or_default().push(Box::new(hook));
    }

    pub fn len(&self, event: Event) -> usize {
        self.hooks.get(&event).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.values().all(Vec::is_empty)
    }

    /// Take the hooks of `event` out so they can borrow the loader mutably
    pub(crate) fn take(&mut self, event: Event) -> Vec<Hook> {
        self.hooks.remove(&event).unwrap_or_default()
    }

    /// Put hooks back in front of any registered while they were running
    pub(crate) fn restore(&mut self, event: Event, mut hooks: Vec<Hook>) {
        let added = self.take(event);
        hooks.extend(added);
        if !hooks.is_empty() {
            self.hooks.insert(event, hooks);
        }
    }
}
