//! Package loader
//!
//! Drives one loading session: locates packages with the [`ModuleFinder`],
//! builds module trees with the static or dynamic extractor, attaches
//! submodules, merges stub companions, then expands export lists and wildcard
//! imports. Alias resolution is a separate, explicit pass
//! ([`Loader::resolve_aliases`]).
//!
//! Failures below the requested package are recorded in [`Loader::skipped`]
//! and leave holes in the graph instead of aborting the load.

mod aliases;
mod exports;
mod merge;
mod wildcards;

pub use aliases::{ResolutionReport, ResolveOptions};

use crate::collections::{LinesCollection, ModulesCollection};
use crate::config::{ExternalPolicy, InspectionPolicy, LoaderConfig};
use crate::error::{ExtractError, FinderError, LoadError};
use crate::extensions::{Event, Extensions};
use crate::extract::{build_module, InspectedModule, Inspector, PythonInspector, StaticExtractor};
use crate::finder::{ModuleFinder, NamespacePackage, Package, PackageSpec, Submodule};
use crate::models::{Filepath, NodeId, Object};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Per-call loading switches, defaulting to the loader configuration
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    pub submodules: bool,
    /// Accept a filesystem path in place of a dotted name
    pub try_relative_path: bool,
    pub find_stubs_package: bool,
}

impl From<&LoaderConfig> for LoadOptions {
    fn from(config: &LoaderConfig) -> Self {
        Self {
            submodules: config.submodules,
            try_relative_path: true,
            find_stubs_package: config.find_stubs_package,
        }
    }
}

/// A module left out of the graph, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedModule {
    pub path: String,
    pub reason: String,
}

pub struct Loader {
    config: LoaderConfig,
    finder: ModuleFinder,
    modules: ModulesCollection,
    lines: LinesCollection,
    extensions: Extensions,
    visitor: StaticExtractor,
    inspector: Box<dyn Inspector>,
    skipped: Vec<SkippedModule>,
    /// Packages that failed to load on demand; never retried
    load_failures: HashSet<String>,
    pub(crate) time_spent_visiting: Duration,
    pub(crate) time_spent_inspecting: Duration,
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("config", &self.config)
            .field("finder", &self.finder)
            .field("modules", &self.modules.root_names())
            .field("extensions", &self.extensions)
            .field("skipped", &self.skipped)
            .finish_non_exhaustive()
    }
}

impl Loader {
    pub fn new(config: LoaderConfig) -> Result<Self, LoadError> {
        let finder = ModuleFinder::new(&config.search_paths);
        let inspector = Box::new(PythonInspector::new(config.python.clone()));
        Ok(Self {
            finder,
            modules: ModulesCollection::new(),
            lines: LinesCollection::new(),
            extensions: Extensions::new(),
            visitor: StaticExtractor::new()?,
            inspector,
            skipped: Vec::new(),
            load_failures: HashSet::new(),
            time_spent_visiting: Duration::ZERO,
            time_spent_inspecting: Duration::ZERO,
            config,
        })
    }

    /// Replace the interpreter-backed inspector
    pub fn with_inspector(mut self, inspector: impl Inspector + 'static) -> Self {
        self.inspector = Box::new(inspector);
        self
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn finder(&self) -> &ModuleFinder {
        &self.finder
    }

    pub fn modules(&self) -> &ModulesCollection {
        &self.modules
    }

    pub fn modules_mut(&mut self) -> &mut ModulesCollection {
        &mut self.modules
    }

    pub fn lines(&self) -> &LinesCollection {
        &self.lines
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    pub fn skipped(&self) -> &[SkippedModule] {
        &self.skipped
    }

    /// Look up a loaded object or alias by dotted path
    pub fn get(&self, path: &str) -> Option<NodeId> {
        self.modules.get_member(path)
    }

    /// The module at `path`, following aliases met on the way
    pub(crate) fn module_at(&self, path: &str) -> Option<NodeId> {
        let id = self.modules.get_member(path)?;
        let target = self.modules.final_target(id).ok()?;
        self.modules
            .object(target)
            .is_some_and(Object::is_module)
            .then_some(target)
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Load the package holding `spec` and return the node at `spec`
    pub fn load(&mut self, spec: &str) -> Result<NodeId, LoadError> {
        let options = LoadOptions::from(&self.config);
        self.load_with(spec, options)
    }

    pub fn load_with(&mut self, spec: &str, options: LoadOptions) -> Result<NodeId, LoadError> {
        tracing::debug!("Loading {}", spec);
        let found = self.finder.find_spec(
            spec,
            options.try_relative_path,
            options.find_stubs_package,
        );
        let (obj_path, package) = match found {
            Ok(found) => found,
            Err(FinderError::NotFound(name)) => {
                if self.config.inspection == InspectionPolicy::Disallow {
                    return Err(LoadError::NotFound(name));
                }
                tracing::debug!("Could not find {} on disk, trying dynamic import", spec);
                let top = spec.split('.').next().unwrap_or(spec);
                let inspected = self.inspect_module(top)?;
                match runtime_package(top, &inspected) {
                    Some(package) => (spec.to_string(), package),
                    None => {
                        let id = build_module(&mut self.modules, top, &inspected, None);
                        self.modules.set_root(id);
                        return self.post_load(spec, id);
                    }
                }
            }
            Err(error) => return Err(error.into()),
        };

        let top = self.load_package(&package, options.submodules)?;
        self.post_load(&obj_path, top)
    }

    fn post_load(&mut self, obj_path: &str, top: NodeId) -> Result<NodeId, LoadError> {
        self.expand_exports(top);
        self.expand_wildcards(top, ExternalPolicy::Never)?;
        let id = self
            .modules
            .get_member(obj_path)
            .ok_or_else(|| LoadError::NotFound(obj_path.to_string()))?;
        self.emit(Event::PackageLoaded, top)?;
        Ok(id)
    }

    fn load_package(&mut self, package: &PackageSpec, submodules: bool) -> Result<NodeId, LoadError> {
        match package {
            PackageSpec::Namespace(NamespacePackage { name, paths }) => {
                let top = self.load_module(name, Filepath::Namespace(paths.clone()), submodules, None)?;
                self.modules.set_root(top);
                Ok(top)
            }
            PackageSpec::Regular(Package { name, path, stubs }) => {
                let top = self.load_module(name, Filepath::File(path.clone()), submodules, None)?;
                self.modules.set_root(top);

                if let Some(stubs) = stubs {
                    let external = self.config.resolution.external;
                    self.expand_wildcards(top, external)?;
                    // Inline stubs were merged submodule by submodule already
                    let stubs_submodules = submodules && stubs.parent() != path.parent();
                    let stub_root =
                        self.load_module(name, Filepath::File(stubs.clone()), stubs_submodules, None)?;
                    merge::merge_stubs(&mut self.modules, top, stub_root);
                }
                Ok(top)
            }
        }
    }

    /// Build a module and, when asked, everything nested under it
    fn load_module(
        &mut self,
        name: &str,
        filepath: Filepath,
        submodules: bool,
        parent: Option<NodeId>,
    ) -> Result<NodeId, LoadError> {
        let id = self.build_module_node(name, &filepath, parent)?;
        if submodules {
            let filepath = self
                .modules
                .object(id)
                .and_then(|module| module.filepath.clone())
                .unwrap_or(filepath);
            for submodule in self.finder.submodules(&filepath) {
                self.load_submodule(id, &submodule);
            }
        }
        Ok(id)
    }

    fn build_module_node(
        &mut self,
        name: &str,
        filepath: &Filepath,
        parent: Option<NodeId>,
    ) -> Result<NodeId, LoadError> {
        let path = match filepath {
            Filepath::Namespace(_) => {
                let id = self.modules.insert(Object::module(name, Some(filepath.clone())));
                self.modules.set_parent(id, parent);
                return Ok(id);
            }
            Filepath::File(path) => path,
        };

        let module_path = match parent {
            Some(parent) => format!("{}.{}", self.modules.path(parent), name),
            None => name.to_string(),
        };
        if self.config.inspection == InspectionPolicy::Force {
            return self.inspect_into(name, &module_path, parent);
        }

        let is_source = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == "py" || e == "pyi");
        if is_source {
            return self
                .visit_module(name, path, parent)
                .map_err(|source| LoadError::Loading {
                    module: module_path,
                    source,
                });
        }

        if self.config.inspection == InspectionPolicy::Disallow {
            return Err(LoadError::CompiledWithoutInspection(path.clone()));
        }
        self.inspect_into(name, &module_path, parent)
    }

    fn visit_module(
        &mut self,
        name: &str,
        path: &Path,
        parent: Option<NodeId>,
    ) -> Result<NodeId, ExtractError> {
        let bytes = std::fs::read(path).map_err(|source| ExtractError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let code = String::from_utf8(bytes).map_err(|source| ExtractError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        if self.config.store_source {
            self.lines.insert(path, &code);
        }

        let start = Instant::now();
        let result = self
            .visitor
            .visit(&mut self.modules, name, path, &code, parent);
        self.time_spent_visiting += start.elapsed();
        result
    }

    fn inspect_into(
        &mut self,
        name: &str,
        module_path: &str,
        parent: Option<NodeId>,
    ) -> Result<NodeId, LoadError> {
        let inspected = self.inspect_module(module_path)?;
        Ok(build_module(&mut self.modules, name, &inspected, parent))
    }

    fn inspect_module(&mut self, module_path: &str) -> Result<InspectedModule, LoadError> {
        let ignored = self
            .config
            .ignored_modules
            .iter()
            .any(|prefix| module_path.starts_with(prefix.as_str()));
        if ignored {
            return Err(LoadError::Loading {
                module: module_path.to_string(),
                source: ExtractError::Import(format!("Importing {} is disabled", module_path)),
            });
        }

        let search_paths: Vec<PathBuf> = self.finder.search_paths().to_vec();
        let start = Instant::now();
        let result = self.inspector.inspect(module_path, &search_paths);
        self.time_spent_inspecting += start.elapsed();
        result.map_err(|source| LoadError::Loading {
            module: module_path.to_string(),
            source,
        })
    }

    // =========================================================================
    // Submodules
    // =========================================================================

    fn load_submodule(&mut self, module: NodeId, submodule: &Submodule) {
        let sub_path = format!("{}.{}", self.modules.path(module), submodule.parts.join("."));

        if submodule.parts.iter().any(|part| part.contains('.')) {
            tracing::debug!(
                "Skip {}, dots in filenames are not supported",
                submodule.path.display()
            );
            self.skip(sub_path, "dots in filenames are not supported");
            return;
        }
        let Some((name, parent_parts)) = submodule.parts.split_last() else {
            return;
        };

        let parent = match self.get_or_create_parent_module(module, parent_parts, &submodule.path) {
            Ok(parent) => parent,
            Err(error) => {
                tracing::debug!("{}", error);
                self.skip(sub_path, error.to_string());
                return;
            }
        };

        let id = match self.load_module(name, Filepath::File(submodule.path.clone()), false, Some(parent)) {
            Ok(id) => id,
            Err(error) => {
                tracing::warn!("{}. Skipping.", error);
                self.skip(sub_path, error.to_string());
                return;
            }
        };

        if let Some(stubs) = &submodule.stubs {
            match self.load_module(name, Filepath::File(stubs.clone()), false, Some(parent)) {
                Ok(stub_id) => merge::merge_stubs(&mut self.modules, id, stub_id),
                Err(error) => tracing::debug!("Could not merge stubs of {}: {}", sub_path, error),
            }
        }

        if let Some(existing) = self.modules.member(parent, name) {
            let is_module = self.modules.object(existing).is_some_and(Object::is_module);
            if !is_module {
                tracing::warn!(
                    "Submodule '{}' is shadowing the member at the same path. \
                     Rename the member or the submodule (for example prefixing it with `_`).",
                    sub_path
                );
            }
        }
        self.modules.set_member(parent, id);
    }

    /// Walk down `parent_parts` from `module`, creating namespace directories
    /// on the way when the parent is itself a namespace package
    fn get_or_create_parent_module(
        &mut self,
        module: NodeId,
        parent_parts: &[String],
        subpath: &Path,
    ) -> Result<NodeId, LoadError> {
        let mut ancestors: Vec<&Path> = subpath.ancestors().skip(1).collect();
        if subpath.file_stem().is_some_and(|stem| stem == "__init__") && !ancestors.is_empty() {
            ancestors.remove(0);
        }

        let mut current = module;
        for (offset, part) in parent_parts.iter().enumerate() {
            let dir = ancestors
                .get(parent_parts.len() - 1 - offset)
                .map(|dir| dir.to_path_buf())
                .unwrap_or_default();
            let existing = self
                .modules
                .member(current, part)
                .filter(|id| self.modules.object(*id).is_some_and(Object::is_module));
            let parent_is_namespace = self
                .modules
                .object(current)
                .is_some_and(Object::is_namespace);

            current = match existing {
                Some(next) => {
                    if let Some(Filepath::Namespace(paths)) = self
                        .modules
                        .object_mut(next)
                        .and_then(|object| object.filepath.as_mut())
                    {
                        if !paths.contains(&dir) {
                            paths.push(dir);
                        }
                    }
                    next
                }
                None if parent_is_namespace => {
                    let id = self
                        .modules
                        .insert(Object::module(part, Some(Filepath::Namespace(vec![dir]))));
                    self.modules.set_member(current, id);
                    id
                }
                None => {
                    return Err(LoadError::Unimportable(format!(
                        "Skip {}, it is not importable",
                        subpath.display()
                    )))
                }
            };
        }
        Ok(current)
    }

    fn skip(&mut self, path: String, reason: impl Into<String>) {
        self.skipped.push(SkippedModule {
            path,
            reason: reason.into(),
        });
    }

    // =========================================================================
    // On-demand packages and hooks
    // =========================================================================

    /// Load `package` on behalf of another one, remembering failures
    pub(crate) fn load_external(&mut self, package: &str) -> Result<(), LoadError> {
        if self.modules.contains(package) {
            return Ok(());
        }
        if self.load_failures.contains(package) {
            return Err(LoadError::NotFound(package.to_string()));
        }
        let options = LoadOptions {
            try_relative_path: false,
            ..LoadOptions::from(&self.config)
        };
        match self.load_with(package, options) {
            Ok(_) => Ok(()),
            Err(error @ LoadError::Extension(_)) => Err(error),
            Err(error) => {
                tracing::debug!("Could not load {}: {}", package, error);
                self.load_failures.insert(package.to_string());
                Err(error)
            }
        }
    }

    pub(crate) fn has_failed(&self, package: &str) -> bool {
        self.load_failures.contains(package)
    }

    pub(crate) fn emit(&mut self, event: Event, node: NodeId) -> Result<(), LoadError> {
        let mut hooks = self.extensions.take(event);
        let mut result = Ok(());
        for hook in hooks.iter_mut() {
            if let Err(error) = hook(self, node) {
                result = Err(LoadError::Extension(error));
                break;
            }
        }
        self.extensions.restore(event, hooks);
        result
    }
}

/// Map a runtime `__path__` back to something loadable from disk
fn runtime_package(name: &str, inspected: &InspectedModule) -> Option<PackageSpec> {
    let paths = inspected.paths.as_ref().filter(|paths| !paths.is_empty())?;
    if let [dir] = paths.as_slice() {
        let init = ["__init__.py", "__init__.pyi"]
            .iter()
            .map(|file| dir.join(file))
            .find(|path| path.is_file());
        if let Some(init) = init {
            return Some(PackageSpec::Regular(Package {
                name: name.to_string(),
                path: init,
                stubs: None,
            }));
        }
    }
    Some(PackageSpec::Namespace(NamespacePackage {
        name: name.to_string(),
        paths: paths.clone(),
    }))
}
