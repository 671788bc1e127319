use super::Loader;
use crate::config::{ExternalPolicy, ResolutionConfig};
use crate::error::{AliasError, LoadError};
use crate::models::{AliasState, Kind, NodeId};
use serde::Serialize;
use std::collections::BTreeSet;

/// Alias resolution switches
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveOptions {
    /// Resolve every alias, not only exported ones
    pub implicit: bool,
    pub external: ExternalPolicy,
    /// Cap on whole-graph passes; unbounded when `None`
    pub max_iterations: Option<usize>,
}

impl From<&ResolutionConfig> for ResolveOptions {
    fn from(config: &ResolutionConfig) -> Self {
        Self {
            implicit: config.implicit,
            external: config.external,
            max_iterations: config.max_iterations,
        }
    }
}

/// Outcome of [`Loader::resolve_aliases`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionReport {
    /// Aliases resolved over all passes
    pub resolved: usize,
    /// Paths of the aliases still unresolved after the last pass, cyclic ones included
    pub unresolved: BTreeSet<String>,
    /// Paths of the aliases that are part of a cycle
    pub cyclic: BTreeSet<String>,
    pub iterations: usize,
}

impl Loader {
    /// Resolve aliases over the whole graph until a pass leaves the same
    /// aliases unresolved as the previous one
    ///
    /// A pass may load the packages unresolved aliases point into (see
    /// [`ExternalPolicy`]), which is what lets the next pass make progress.
    /// Each package is tried once per loader.
    pub fn resolve_aliases(&mut self, options: ResolveOptions) -> Result<ResolutionReport, LoadError> {
        for name in self.modules.root_names() {
            if let Some(root) = self.modules.root(&name) {
                self.expand_exports(root);
            }
        }
        for name in self.modules.root_names() {
            if let Some(root) = self.modules.root(&name) {
                self.expand_wildcards(root, options.external)?;
            }
        }

        let mut report = ResolutionReport::default();
        let mut previous: Option<BTreeSet<String>> = None;
        loop {
            if options.max_iterations.is_some_and(|max| report.iterations >= max) {
                break;
            }
            let unresolved = self.resolve_pass(options, &mut report)?;
            report.iterations += 1;
            tracing::debug!(
                "Alias resolution pass {}: {} unresolved",
                report.iterations,
                unresolved.len()
            );

            let stalled = previous.as_ref() == Some(&unresolved);
            report.unresolved = unresolved.clone();
            if unresolved.is_empty() || stalled {
                break;
            }
            previous = Some(unresolved);
        }
        Ok(report)
    }

    fn resolve_pass(
        &mut self,
        options: ResolveOptions,
        report: &mut ResolutionReport,
    ) -> Result<BTreeSet<String>, LoadError> {
        let mut unresolved = BTreeSet::new();
        let mut stack: Vec<NodeId> = self
            .modules
            .root_names()
            .iter()
            .rev()
            .filter_map(|name| self.modules.root(name))
            .collect();

        while let Some(id) = stack.pop() {
            for (_, member) in self.modules.members(id).into_iter().rev() {
                let Some(alias) = self.modules.alias(member) else {
                    let recurse = self
                        .modules
                        .object(member)
                        .is_some_and(|object| matches!(object.kind, Kind::Module | Kind::Class));
                    if recurse {
                        stack.push(member);
                    }
                    continue;
                };

                if alias.is_wildcard() || alias.expanded_from.is_some() {
                    continue;
                }
                let path = self.modules.path(member);
                match alias.state {
                    AliasState::Resolved(target) if self.modules.is_attached(target) => continue,
                    AliasState::Cyclic => {
                        unresolved.insert(path);
                        continue;
                    }
                    AliasState::Resolved(_) | AliasState::Unresolved => {}
                }
                if !options.implicit && !self.modules.is_exported(member) {
                    continue;
                }

                match self.modules.resolve_alias(member) {
                    Ok(_) => report.resolved += 1,
                    Err(error @ AliasError::Cyclic { .. }) => {
                        tracing::warn!("{}", error);
                        report.cyclic.insert(path.clone());
                        unresolved.insert(path);
                    }
                    Err(AliasError::Unresolved { target_path, .. }) => {
                        unresolved.insert(path.clone());
                        self.load_target_package(&path, &target_path, member, options.external)?;
                    }
                }
            }
        }
        Ok(unresolved)
    }

    /// Load the package an unresolved alias points into, when allowed
    fn load_target_package(
        &mut self,
        alias_path: &str,
        target_path: &str,
        alias: NodeId,
        external: ExternalPolicy,
    ) -> Result<(), LoadError> {
        let package = target_path.split('.').next().unwrap_or(target_path).to_string();
        let current = self.modules.package_name(alias).to_string();
        if package == current || self.modules.contains(&package) || self.has_failed(&package) {
            return Ok(());
        }
        if !external.permits(&package, &current) {
            return Ok(());
        }
        match self.load_external(&package) {
            Ok(()) => Ok(()),
            Err(error @ LoadError::Extension(_)) => Err(error),
            Err(error) => {
                tracing::debug!("Could not follow alias {}: {}", alias_path, error);
                Ok(())
            }
        }
    }
}
