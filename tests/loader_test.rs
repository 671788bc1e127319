//! Integration tests for the package loader
//!
//! Tests the complete loading flow including:
//! - Submodule discovery and failure isolation
//! - Export and wildcard expansion
//! - Alias resolution across packages
//! - Stub merging, extension hooks and the dynamic fallback

use apigraph::error::ExtractError;
use apigraph::extensions::Event;
use apigraph::extract::{InspectedKind, InspectedMember, InspectedModule, Inspector};
use apigraph::models::{AliasState, Export, Filepath, Kind, NodeId, Object};
use apigraph::{ExternalPolicy, InspectionPolicy, LoadError, Loader, LoaderConfig, ResolveOptions};
use std::cell::Cell;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn config(roots: &[&Path]) -> LoaderConfig {
    LoaderConfig {
        search_paths: roots.iter().map(|root| root.to_path_buf()).collect(),
        inspection: InspectionPolicy::Disallow,
        ..Default::default()
    }
}

fn loader(root: &Path) -> Loader {
    Loader::new(config(&[root])).unwrap()
}

fn member_names(loader: &Loader, id: NodeId) -> Vec<String> {
    loader
        .modules()
        .members(id)
        .into_iter()
        .map(|(name, _)| name)
        .collect()
}

fn assert_no_self_alias(loader: &Loader) {
    let modules = loader.modules();
    let mut stack: Vec<NodeId> = modules.roots().map(|(_, id)| id).collect();
    while let Some(id) = stack.pop() {
        if modules.alias(id).is_some() {
            if let Ok(target) = modules.final_target(id) {
                assert_ne!(modules.path(target), modules.path(id));
            }
        }
        stack.extend(modules.members(id).into_iter().map(|(_, member)| member));
    }
}

/// Package with `pkg.a` exporting two names and `pkg.b` star-importing it
fn create_wildcard_package(root: &Path) {
    write(root, "pkg/__init__.py", "");
    write(
        root,
        "pkg/a.py",
        r#"__all__ = ["foo", "Bar"]

foo = 1


class Bar:
    pass
"#,
    );
    write(root, "pkg/b.py", "from pkg.a import *\n");
}

// =============================================================================
// Wildcard expansion
// =============================================================================

#[test]
fn test_wildcard_import_becomes_concrete_aliases() {
    let temp_dir = TempDir::new().unwrap();
    create_wildcard_package(temp_dir.path());

    let mut loader = loader(temp_dir.path());
    let b = loader.load("pkg.b").unwrap();

    assert_eq!(member_names(&loader, b), vec!["Bar", "foo"]);
    for name in ["foo", "Bar"] {
        let alias_id = loader.get(&format!("pkg.b.{}", name)).unwrap();
        let alias = loader.modules().alias(alias_id).unwrap();
        assert_eq!(alias.target_path, format!("pkg.a.{}", name));
        assert_eq!(alias.alias_lineno, Some(1));
    }
    assert!(loader.get("pkg.b.pkg/a/*").is_none());
    assert_no_self_alias(&loader);
}

#[test]
fn test_later_wildcard_import_wins() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "pkg/__init__.py", "");
    write(temp_dir.path(), "pkg/src.py", "value = 1\n");
    write(
        temp_dir.path(),
        "pkg/late.py",
        "# value is shadowed below\n\n\n\nvalue = 'mine'\n\n\n\n\nfrom pkg.src import *\n",
    );
    write(
        temp_dir.path(),
        "pkg/early.py",
        "\nfrom pkg.src import *\n\n\nvalue = 'mine'\n",
    );

    let mut loader = loader(temp_dir.path());
    loader.load("pkg").unwrap();

    let late = loader.get("pkg.late.value").unwrap();
    let alias = loader.modules().alias(late).unwrap();
    assert_eq!(alias.target_path, "pkg.src.value");
    assert_eq!(alias.alias_lineno, Some(10));

    let early = loader.get("pkg.early.value").unwrap();
    let attribute = loader.modules().object(early).unwrap();
    assert_eq!(attribute.kind, Kind::Attribute);
    assert_eq!(attribute.lineno, Some(5));
}

#[test]
fn test_transitive_wildcards_are_flattened() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "pkg/__init__.py", "from pkg.middle import *\n");
    write(temp_dir.path(), "pkg/middle.py", "from pkg.base import *\n");
    write(temp_dir.path(), "pkg/base.py", "def helper():\n    pass\n");

    let mut loader = loader(temp_dir.path());
    loader.load("pkg").unwrap();

    let helper = loader.get("pkg.helper").unwrap();
    let alias = loader.modules().alias(helper).unwrap();
    assert_eq!(alias.target_path, "pkg.middle.helper");
    let target = loader.modules().final_target(helper).unwrap();
    assert_eq!(loader.modules().path(target), "pkg.base.helper");
    assert_no_self_alias(&loader);
}

#[test]
fn test_wildcard_hook_fires_per_alias() {
    let temp_dir = TempDir::new().unwrap();
    create_wildcard_package(temp_dir.path());

    let mut loader = loader(temp_dir.path());
    let expanded = Rc::new(Cell::new(0));
    let counter = expanded.clone();
    loader
        .extensions_mut()
        .on(Event::WildcardExpanded, move |loader, alias| {
            assert!(loader.modules().alias(alias).is_some());
            counter.set(counter.get() + 1);
            Ok(())
        });

    loader.load("pkg").unwrap();
    assert_eq!(expanded.get(), 2);
}

// =============================================================================
// Export expansion
// =============================================================================

#[test]
fn test_export_expansion_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    write(
        temp_dir.path(),
        "pkg/__init__.py",
        "from . import core\n\n__all__ = [\"main\"] + core.__all__\n\nmain = 1\n",
    );
    write(temp_dir.path(), "pkg/core.py", "__all__ = [\"engine\"]\nengine = 1\n");

    let mut loader = loader(temp_dir.path());
    let pkg = loader.load("pkg").unwrap();

    let expected: BTreeSet<Export> = ["engine", "main"]
        .iter()
        .map(|name| Export::Name(name.to_string()))
        .collect();
    let first = loader.modules().object(pkg).unwrap().exports.clone();
    assert_eq!(first, Some(expected));

    loader.expand_exports(pkg);
    let second = loader.modules().object(pkg).unwrap().exports.clone();
    assert_eq!(first, second);
}

// =============================================================================
// Failure isolation
// =============================================================================

#[test]
fn test_unimportable_directory_is_skipped() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "pkg/__init__.py", "");
    write(temp_dir.path(), "pkg/sub/thing.py", "class Thing:\n    pass\n");

    let mut loader = loader(temp_dir.path());
    loader.load("pkg").unwrap();

    assert!(loader.get("pkg.sub").is_none());
    assert_eq!(loader.skipped().len(), 1);
    assert_eq!(loader.skipped()[0].path, "pkg.sub.thing");
    assert!(loader.skipped()[0].reason.contains("not importable"));

    let result = loader.load("pkg.sub.Thing");
    assert!(matches!(result, Err(LoadError::NotFound(path)) if path == "pkg.sub.Thing"));
    assert!(loader.modules().contains("pkg"));
}

#[test]
fn test_broken_submodule_is_skipped_but_broken_package_fails() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "pkg/__init__.py", "VALUE = 1\n");
    write(temp_dir.path(), "pkg/broken.py", "def oops(:\n    pass\n");
    write(temp_dir.path(), "pkg/fine.py", "OK = True\n");
    write(temp_dir.path(), "bad.py", "def oops(:\n    pass\n");

    let mut loader = loader(temp_dir.path());
    loader.load("pkg").unwrap();
    assert!(loader.get("pkg.fine.OK").is_some());
    assert!(loader.get("pkg.broken").is_none());
    assert_eq!(loader.skipped()[0].path, "pkg.broken");

    match loader.load("bad") {
        Err(LoadError::Loading { module, source }) => {
            assert_eq!(module, "bad");
            assert!(matches!(source, ExtractError::Syntax { .. }));
        }
        other => panic!("expected a loading error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_undecodable_submodule_is_skipped() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "pkg/__init__.py", "");
    let latin1 = temp_dir.path().join("pkg/latin.py");
    fs::write(&latin1, b"name = '\xe9t\xe9'\n").unwrap();

    let mut loader = loader(temp_dir.path());
    loader.load("pkg").unwrap();
    assert!(loader.get("pkg.latin").is_none());
    assert!(loader.skipped()[0].reason.contains("UnicodeDecodeError"));
}

#[test]
fn test_missing_package_without_inspection() {
    let temp_dir = TempDir::new().unwrap();
    let mut loader = loader(temp_dir.path());
    assert!(matches!(
        loader.load("nothing.here"),
        Err(LoadError::NotFound(name)) if name == "nothing"
    ));
}

// =============================================================================
// Alias resolution
// =============================================================================

#[test]
fn test_cyclic_aliases_do_not_block_others() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "a.py", "from b import y as x\n__all__ = [\"x\"]\n");
    write(temp_dir.path(), "b.py", "from a import x as y\n__all__ = [\"y\"]\n");
    write(temp_dir.path(), "c.py", "from d import Real\n__all__ = [\"Real\"]\n");
    write(temp_dir.path(), "d.py", "class Real:\n    pass\n");

    let mut loader = loader(temp_dir.path());
    for module in ["a", "b", "c", "d"] {
        loader.load(module).unwrap();
    }
    let report = loader.resolve_aliases(ResolveOptions::default()).unwrap();

    let cyclic: BTreeSet<String> = ["a.x", "b.y"].iter().map(|s| s.to_string()).collect();
    assert_eq!(report.cyclic, cyclic);
    assert_eq!(report.unresolved, cyclic);

    let x = loader.get("a.x").unwrap();
    assert_eq!(loader.modules().alias(x).unwrap().state, AliasState::Cyclic);

    let real_alias = loader.get("c.Real").unwrap();
    let real = loader.get("d.Real").unwrap();
    assert_eq!(
        loader.modules().alias(real_alias).unwrap().state,
        AliasState::Resolved(real)
    );
}

#[test]
fn test_resolution_converges_with_unloadable_package() {
    let temp_dir = TempDir::new().unwrap();
    write(
        temp_dir.path(),
        "pkg/__init__.py",
        "from ext import thing\n__all__ = [\"thing\"]\n",
    );

    let mut loader = loader(temp_dir.path());
    loader.load("pkg").unwrap();
    let options = ResolveOptions {
        external: ExternalPolicy::Always,
        ..Default::default()
    };
    let report = loader.resolve_aliases(options).unwrap();

    assert_eq!(report.iterations, 2);
    assert_eq!(report.resolved, 0);
    assert!(report.unresolved.contains("pkg.thing"));
    assert!(!loader.modules().contains("ext"));
}

#[test]
fn test_iteration_cap() {
    let temp_dir = TempDir::new().unwrap();
    write(
        temp_dir.path(),
        "pkg/__init__.py",
        "from ext import thing\n__all__ = [\"thing\"]\n",
    );

    let mut loader = loader(temp_dir.path());
    loader.load("pkg").unwrap();
    let options = ResolveOptions {
        external: ExternalPolicy::Always,
        max_iterations: Some(1),
        ..Default::default()
    };
    let report = loader.resolve_aliases(options).unwrap();
    assert_eq!(report.iterations, 1);
}

#[test]
fn test_private_sibling_is_loaded_on_demand() {
    let temp_dir = TempDir::new().unwrap();
    write(
        temp_dir.path(),
        "pkg/__init__.py",
        "from _pkg.impl import Thing\n__all__ = [\"Thing\"]\n",
    );
    write(temp_dir.path(), "_pkg/__init__.py", "");
    write(temp_dir.path(), "_pkg/impl.py", "class Thing:\n    pass\n");
    write(temp_dir.path(), "other/__init__.py", "");

    let mut loader = loader(temp_dir.path());
    loader.load("pkg").unwrap();
    assert!(!loader.modules().contains("_pkg"));

    let report = loader.resolve_aliases(ResolveOptions::default()).unwrap();
    assert!(report.unresolved.is_empty());
    assert_eq!(report.resolved, 1);
    assert_eq!(report.iterations, 2);

    let alias = loader.get("pkg.Thing").unwrap();
    let thing = loader.get("_pkg.impl.Thing").unwrap();
    assert_eq!(
        loader.modules().alias(alias).unwrap().state,
        AliasState::Resolved(thing)
    );
}

#[test]
fn test_implicit_resolution_includes_private_imports() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "pkg/__init__.py", "from pkg.core import run\n");
    write(temp_dir.path(), "pkg/core.py", "def run():\n    pass\n");

    let mut loader = loader(temp_dir.path());
    loader.load("pkg").unwrap();
    let alias = loader.get("pkg.run").unwrap();

    let report = loader.resolve_aliases(ResolveOptions::default()).unwrap();
    assert_eq!(report.resolved, 0);
    assert!(!loader.modules().alias(alias).unwrap().is_resolved());

    let options = ResolveOptions {
        implicit: true,
        ..Default::default()
    };
    let report = loader.resolve_aliases(options).unwrap();
    assert_eq!(report.resolved, 1);
    assert!(loader.modules().alias(alias).unwrap().is_resolved());
}

#[test]
fn test_wildcard_from_private_sibling_expands_during_resolution() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "pkg/__init__.py", "from _pkg import *\n");
    write(temp_dir.path(), "_pkg/__init__.py", "def helper():\n    pass\n");

    let mut loader = loader(temp_dir.path());
    loader.load("pkg").unwrap();
    assert!(loader.get("pkg.helper").is_none());

    loader.resolve_aliases(ResolveOptions::default()).unwrap();
    let helper = loader.get("pkg.helper").unwrap();
    assert_eq!(loader.modules().alias(helper).unwrap().target_path, "_pkg.helper");
}

// =============================================================================
// Namespace packages and stubs
// =============================================================================

#[test]
fn test_namespace_package_across_roots() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    write(first.path(), "ns/a.py", "A = 1\n");
    write(second.path(), "ns/b.py", "B = 2\n");

    let mut loader = Loader::new(config(&[first.path(), second.path()])).unwrap();
    let ns = loader.load("ns").unwrap();

    assert_eq!(
        loader.modules().object(ns).unwrap().filepath,
        Some(Filepath::Namespace(vec![
            first.path().join("ns"),
            second.path().join("ns"),
        ]))
    );
    assert!(loader.get("ns.a.A").is_some());
    assert!(loader.get("ns.b.B").is_some());
}

#[test]
fn test_inline_stubs_are_merged() {
    let temp_dir = TempDir::new().unwrap();
    write(
        temp_dir.path(),
        "pkg/__init__.py",
        "def run(x):\n    \"\"\"Run.\"\"\"\n",
    );
    write(
        temp_dir.path(),
        "pkg/__init__.pyi",
        "def run(x: int) -> str: ...\nVERSION: str\n",
    );
    write(temp_dir.path(), "pkg/tool.py", "def go(a):\n    pass\n");
    write(temp_dir.path(), "pkg/tool.pyi", "def go(a: bytes) -> None: ...\n");

    let mut loader = loader(temp_dir.path());
    loader.load("pkg").unwrap();

    let run = loader.modules().object(loader.get("pkg.run").unwrap()).unwrap();
    assert_eq!(run.signature.as_deref(), Some("(x: int) -> str"));
    assert_eq!(run.docstring.as_deref(), Some("Run."));

    let version = loader.modules().object(loader.get("pkg.VERSION").unwrap()).unwrap();
    assert_eq!(version.annotation.as_deref(), Some("str"));

    let go = loader.modules().object(loader.get("pkg.tool.go").unwrap()).unwrap();
    assert_eq!(go.signature.as_deref(), Some("(a: bytes) -> None"));
}

// =============================================================================
// Hooks
// =============================================================================

#[test]
fn test_package_loaded_hook_can_mutate_the_graph() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "pkg/__init__.py", "");

    let mut loader = loader(temp_dir.path());
    let calls = Rc::new(Cell::new(0));
    let counter = calls.clone();
    loader
        .extensions_mut()
        .on(Event::PackageLoaded, move |loader, package| {
            counter.set(counter.get() + 1);
            let modules = loader.modules_mut();
            let injected = modules.insert(Object::new("injected", Kind::Attribute));
            modules.set_member(package, injected);
            Ok(())
        });

    loader.load("pkg").unwrap();
    assert_eq!(calls.get(), 1);
    assert!(loader.get("pkg.injected").is_some());
}

#[test]
fn test_hook_error_propagates() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "pkg/__init__.py", "");

    let mut loader = loader(temp_dir.path());
    loader
        .extensions_mut()
        .on(Event::PackageLoaded, |_, _| Err(anyhow::anyhow!("boom")));

    match loader.load("pkg") {
        Err(LoadError::Extension(error)) => assert_eq!(error.to_string(), "boom"),
        other => panic!("expected an extension error, got {:?}", other.map(|_| ())),
    }
}

// =============================================================================
// Dynamic fallback
// =============================================================================

struct FakeInspector {
    runtime_dir: Option<PathBuf>,
}

impl Inspector for FakeInspector {
    fn inspect(
        &self,
        module_path: &str,
        _search_paths: &[PathBuf],
    ) -> Result<InspectedModule, ExtractError> {
        match module_path {
            "native" => Ok(InspectedModule {
                name: "native".to_string(),
                file: Some(PathBuf::from("/usr/lib/native.cpython-312.so")),
                members: vec![InspectedMember::new("compute", InspectedKind::Function)],
                ..Default::default()
            }),
            "rtpkg" => Ok(InspectedModule {
                name: "rtpkg".to_string(),
                paths: self.runtime_dir.clone().map(|dir| vec![dir]),
                ..Default::default()
            }),
            "pkg" => Ok(InspectedModule {
                name: "pkg".to_string(),
                members: vec![InspectedMember::new("from_runtime", InspectedKind::Attribute)],
                ..Default::default()
            }),
            other => Err(ExtractError::Import(format!("No module named '{}'", other))),
        }
    }
}

fn dynamic_loader(root: &Path, inspection: InspectionPolicy, runtime_dir: Option<PathBuf>) -> Loader {
    let config = LoaderConfig {
        search_paths: vec![root.to_path_buf()],
        inspection,
        ..Default::default()
    };
    Loader::new(config)
        .unwrap()
        .with_inspector(FakeInspector { runtime_dir })
}

#[test]
fn test_dynamic_fallback_for_missing_sources() {
    let temp_dir = TempDir::new().unwrap();
    let mut loader = dynamic_loader(temp_dir.path(), InspectionPolicy::Allow, None);

    let compute = loader.load("native.compute").unwrap();
    let function = loader.modules().object(compute).unwrap();
    assert_eq!(function.kind, Kind::Function);

    match loader.load("missing") {
        Err(LoadError::Loading { module, source }) => {
            assert_eq!(module, "missing");
            assert!(matches!(source, ExtractError::Import(_)));
        }
        other => panic!("expected a loading error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_runtime_path_is_loaded_from_sources() {
    let search_root = TempDir::new().unwrap();
    let elsewhere = TempDir::new().unwrap();
    write(elsewhere.path(), "rtpkg/__init__.py", "");
    write(elsewhere.path(), "rtpkg/mod.py", "class X:\n    pass\n");

    let runtime_dir = elsewhere.path().join("rtpkg");
    let mut loader = dynamic_loader(search_root.path(), InspectionPolicy::Allow, Some(runtime_dir));

    let x = loader.load("rtpkg.mod.X").unwrap();
    assert_eq!(loader.modules().object(x).unwrap().kind, Kind::Class);
}

#[test]
fn test_forced_inspection_ignores_sources() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "pkg/__init__.py", "from_source = 1\n");

    let mut loader = dynamic_loader(temp_dir.path(), InspectionPolicy::Force, None);
    loader.load("pkg").unwrap();

    assert!(loader.get("pkg.from_runtime").is_some());
    assert!(loader.get("pkg.from_source").is_none());
}

#[test]
fn test_ignored_modules_are_never_imported() {
    let temp_dir = TempDir::new().unwrap();
    let mut loader = dynamic_loader(temp_dir.path(), InspectionPolicy::Allow, None);

    match loader.load("debugpy.server") {
        Err(LoadError::Loading { source, .. }) => {
            assert!(source.to_string().contains("disabled"));
        }
        other => panic!("expected a loading error, got {:?}", other.map(|_| ())),
    }
}

// =============================================================================
// Convenience entry point
// =============================================================================

#[test]
fn test_load_with_configured_resolution() {
    let temp_dir = TempDir::new().unwrap();
    write(
        temp_dir.path(),
        "pkg/__init__.py",
        "from pkg.core import run\n__all__ = [\"run\"]\n",
    );
    write(temp_dir.path(), "pkg/core.py", "def run():\n    pass\n");

    let mut config = config(&[temp_dir.path()]);
    config.resolution.resolve_aliases = true;
    let loaded = apigraph::load("pkg", &config).unwrap();

    let report = loaded.resolution.unwrap();
    assert!(report.unresolved.is_empty());
    assert_eq!(report.resolved, 1);

    let stats = loaded.loader.stats();
    assert_eq!(stats.packages, 1);
    assert_eq!(stats.modules, 2);
    assert_eq!(stats.functions, 1);
    assert_eq!(stats.aliases, 1);
    assert_eq!(stats.files_by_extension.get("py"), Some(&2));
}
