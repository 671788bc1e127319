use super::Loader;
use crate::models::{Export, NodeId, Object};
use std::collections::{BTreeSet, HashSet};

enum Step {
    Enter(NodeId),
    Exit(NodeId),
}

impl Loader {
    /// Flatten the export lists of `module` and every module under it
    ///
    /// References to another module's export list are replaced by that list's
    /// names once it has been flattened itself. Entries that are neither names
    /// nor loaded references are dropped. Running it again is a no-op.
    pub fn expand_exports(&mut self, module: NodeId) {
        let mut seen: HashSet<String> = HashSet::new();
        let mut stack = vec![Step::Enter(module)];

        while let Some(step) = stack.pop() {
            match step {
                Step::Enter(id) => {
                    if !seen.insert(self.modules.path(id)) {
                        continue;
                    }
                    stack.push(Step::Exit(id));

                    for (_, member) in self.modules.members(id).into_iter().rev() {
                        if self.modules.object(member).is_some_and(Object::is_module) {
                            stack.push(Step::Enter(member));
                        }
                    }
                    // Referenced modules go on top so they are flattened first
                    let references: Vec<String> = self
                        .modules
                        .object(id)
                        .and_then(|object| object.exports.as_ref())
                        .map(|exports| {
                            exports
                                .iter()
                                .filter_map(|export| match export {
                                    Export::Module(path) => Some(path.clone()),
                                    _ => None,
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                    for reference in references {
                        if let Some(target) = self.module_at(&reference) {
                            stack.push(Step::Enter(target));
                        }
                    }
                }
                Step::Exit(id) => self.flatten_exports(id),
            }
        }
    }

    fn flatten_exports(&mut self, id: NodeId) {
        let Some(exports) = self.modules.object(id).and_then(|object| object.exports.clone()) else {
            return;
        };
        let module_path = self.modules.path(id);

        let mut flattened = BTreeSet::new();
        for export in exports {
            match export {
                Export::Name(name) => {
                    flattened.insert(Export::Name(name));
                }
                Export::Module(reference) => {
                    let names = self
                        .module_at(&reference)
                        .and_then(|target| self.modules.object(target))
                        .and_then(|target| target.exports.as_ref());
                    match names {
                        Some(names) => flattened.extend(
                            names
                                .iter()
                                .filter(|name| matches!(name, Export::Name(_)))
                                .cloned(),
                        ),
                        None => tracing::debug!(
                            "Cannot expand '{}' in {}, try pre-loading the corresponding package",
                            reference,
                            module_path
                        ),
                    }
                }
                Export::Invalid(text) => {
                    tracing::warn!(
                        "Failed to expand '{}' in the exports of {}: not a string",
                        text,
                        module_path
                    );
                }
            }
        }

        if let Some(object) = self.modules.object_mut(id) {
            object.exports = Some(flattened);
        }
    }
}
