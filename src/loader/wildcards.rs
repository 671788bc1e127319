use super::Loader;
use crate::config::ExternalPolicy;
use crate::error::LoadError;
use crate::extensions::Event;
use crate::models::{Alias, AliasState, NodeId, Object};
use std::collections::HashSet;

enum Step {
    Enter(NodeId),
    Exit(NodeId),
}

struct Wildcard {
    name: String,
    target: String,
    lineno: Option<usize>,
    endlineno: Option<usize>,
}

impl Loader {
    /// Replace `from x import *` aliases under `module` by one alias per name
    /// the imported module exposes
    ///
    /// Imported modules are expanded before their importers. A wildcard whose
    /// module is not loaded stays in place, to be retried by a later call once
    /// more packages are known; `external` decides which packages may be
    /// loaded on the fly to get there.
    pub fn expand_wildcards(
        &mut self,
        module: NodeId,
        external: ExternalPolicy,
    ) -> Result<(), LoadError> {
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
                        let is_submodule = self.modules.object(member).is_some_and(Object::is_module);
                        if is_submodule && !seen.contains(&self.modules.path(member)) {
                            stack.push(Step::Enter(member));
                        }
                    }

                    for wildcard in self.wildcards_of(id) {
                        self.ensure_loaded(&wildcard.target, id, external)?;
                        match self.module_at(&wildcard.target) {
                            Some(target) => stack.push(Step::Enter(target)),
                            None => tracing::debug!(
                                "Could not expand wildcard import of {} in {}: module not loaded",
                                wildcard.target,
                                self.modules.path(id)
                            ),
                        }
                    }
                }
                Step::Exit(id) => self.expand_module_wildcards(id)?,
            }
        }
        Ok(())
    }

    fn wildcards_of(&self, id: NodeId) -> Vec<Wildcard> {
        self.modules
            .members(id)
            .into_iter()
            .filter_map(|(name, member)| {
                let alias = self.modules.alias(member)?;
                let target = alias.wildcard.clone()?;
                Some(Wildcard {
                    name,
                    target,
                    lineno: alias.alias_lineno,
                    endlineno: alias.alias_endlineno,
                })
            })
            .collect()
    }

    /// Load the package of `target` if policy allows it and it is not known yet
    fn ensure_loaded(
        &mut self,
        target: &str,
        importer: NodeId,
        external: ExternalPolicy,
    ) -> Result<(), LoadError> {
        let package = target.split('.').next().unwrap_or(target).to_string();
        if self.modules.contains(&package) || self.has_failed(&package) {
            return Ok(());
        }
        let current = self.modules.package_name(importer).to_string();
        if !external.permits(&package, &current) {
            return Ok(());
        }
        match self.load_external(&package) {
            Err(error @ LoadError::Extension(_)) => Err(error),
            _ => Ok(()),
        }
    }

    fn expand_module_wildcards(&mut self, id: NodeId) -> Result<(), LoadError> {
        let module_path = self.modules.path(id);

        for wildcard in self.wildcards_of(id) {
            let Some(source) = self.module_at(&wildcard.target) else {
                continue;
            };
            let candidates: Vec<(String, NodeId)> = self
                .modules
                .members(source)
                .into_iter()
                .filter(|(_, member)| self.modules.is_wildcard_exposed(*member))
                .collect();

            self.modules.del_member(id, &wildcard.name);
            tracing::debug!(
                "Expanding wildcard import of {} in {} ({} names)",
                wildcard.target,
                module_path,
                candidates.len()
            );

            for (name, member) in candidates {
                let member_path = format!("{}.{}", module_path, name);
                let target_path = self.modules.path(member);
                let final_target = self.modules.final_target(member).ok();

                let self_alias = target_path == member_path
                    || self
                        .modules
                        .alias(member)
                        .is_some_and(|alias| alias.target_path == member_path)
                    || final_target.is_some_and(|t| self.modules.path(t) == member_path);
                if self_alias {
                    continue;
                }

                if let Some(existing) = self.modules.member(id, &name) {
                    let old_lineno = self.modules.node(existing).defining_lineno().unwrap_or(0);
                    if wildcard.lineno.unwrap_or(0) <= old_lineno {
                        continue;
                    }
                    // An alias to the very submodule it would replace is redundant
                    let previous_module = self
                        .modules
                        .final_target(existing)
                        .ok()
                        .filter(|prev| self.modules.object(*prev).is_some_and(Object::is_module));
                    if previous_module.is_some() && previous_module == final_target {
                        continue;
                    }
                }

                let mut alias = Alias::expanded(&name, target_path, &wildcard.target)
                    .with_lines(wildcard.lineno, wildcard.endlineno);
                if let Some(target) = final_target {
                    alias.state = AliasState::Resolved(target);
                }
                let alias_id = self.modules.insert(alias);
                self.modules.set_member(id, alias_id);
                self.emit(Event::WildcardExpanded, alias_id)?;
            }
        }
        Ok(())
    }
}
