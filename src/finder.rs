//! Package Finder
//!
//! Locates packages on disk from a dotted name or a filesystem path, and
//! enumerates the submodule files of an already located package.

use crate::error::FinderError;
use crate::models::Filepath;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const SOURCE_EXTENSIONS: [&str; 2] = ["py", "pyi"];
const COMPILED_EXTENSIONS: [&str; 2] = ["so", "pyd"];

/// A package backed by a single file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub name: String,
    /// Initializer, module file or compiled extension
    pub path: PathBuf,
    /// Stub companion merged over the loaded tree
    pub stubs: Option<PathBuf>,
}

/// A package split across one directory per search root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespacePackage {
    pub name: String,
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSpec {
    Regular(Package),
    Namespace(NamespacePackage),
}

impl PackageSpec {
    pub fn name(&self) -> &str {
        match self {
            PackageSpec::Regular(package) => &package.name,
            PackageSpec::Namespace(package) => &package.name,
        }
    }
}

/// A module file discovered under a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submodule {
    /// Path segments relative to the package
    pub parts: Vec<String>,
    pub path: PathBuf,
    pub stubs: Option<PathBuf>,
}

#[derive(Debug, Default)]
struct SubmoduleFiles {
    origin: usize,
    source: Option<PathBuf>,
    stub: Option<PathBuf>,
    compiled: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ModuleFinder {
    search_paths: Vec<PathBuf>,
}

impl ModuleFinder {
    /// Create a finder over `search_paths`, or the current directory when empty
    pub fn new(search_paths: &[PathBuf]) -> Self {
        let mut finder = Self {
            search_paths: Vec::new(),
        };
        for path in search_paths {
            if !finder.search_paths.contains(path) {
                finder.search_paths.push(path.clone());
            }
        }
        if finder.search_paths.is_empty() {
            finder.search_paths.push(PathBuf::from("."));
        }
        finder
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Give `path` the highest priority, moving it up if already present
    pub fn prepend_search_path(&mut self, path: PathBuf) {
        self.search_paths.retain(|existing| existing != &path);
        self.search_paths.insert(0, path);
    }

    /// Locate the package holding `spec`
    ///
    /// Returns the dotted path of the requested object together with the
    /// package to load. A filesystem path is accepted when `try_relative_path`
    /// is set; its parent directory then becomes the first search path.
    pub fn find_spec(
        &mut self,
        spec: &str,
        try_relative_path: bool,
        find_stubs: bool,
    ) -> Result<(String, PackageSpec), FinderError> {
        if try_relative_path && looks_like_path(spec) {
            let path = Path::new(spec);
            if path.exists() {
                return self.find_path(path, find_stubs);
            }
        }

        let top = spec.split('.').next().unwrap_or(spec);
        let package = self.find_package(top, find_stubs)?;
        Ok((spec.to_string(), package))
    }

    fn find_path(
        &mut self,
        path: &Path,
        find_stubs: bool,
    ) -> Result<(String, PackageSpec), FinderError> {
        let invalid = || FinderError::InvalidPath(path.to_path_buf());

        let (name, module_dir) = if path.is_dir() {
            (file_name(path).ok_or_else(invalid)?, path.to_path_buf())
        } else {
            let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
            if !SOURCE_EXTENSIONS.contains(&extension) && !COMPILED_EXTENSIONS.contains(&extension) {
                return Err(invalid());
            }
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(invalid)?;
            if stem == "__init__" {
                let dir = parent_or_current(path);
                let dir = if dir == Path::new(".") {
                    std::env::current_dir().map_err(|_| invalid())?
                } else {
                    dir
                };
                (file_name(&dir).ok_or_else(invalid)?, dir)
            } else {
                // Compiled extensions carry an ABI tag after the first dot
                let name = stem.split('.').next().unwrap_or(stem).to_string();
                self.prepend_search_path(parent_or_current(path));
                return Ok((
                    name.clone(),
                    PackageSpec::Regular(Package {
                        name,
                        path: path.to_path_buf(),
                        stubs: sibling_stub(path),
                    }),
                ));
            }
        };

        self.prepend_search_path(parent_or_current(&module_dir));
        let package = match self.find_package(&name, find_stubs)? {
            PackageSpec::Namespace(_) => PackageSpec::Namespace(NamespacePackage {
                name: name.clone(),
                paths: vec![module_dir],
            }),
            regular => regular,
        };
        Ok((name, package))
    }

    /// Search every root for a regular package, a single module file or a
    /// namespace package named `name`
    pub fn find_package(&self, name: &str, find_stubs: bool) -> Result<PackageSpec, FinderError> {
        let mut namespace_dirs = Vec::new();
        let mut stubs_only = None;

        for root in &self.search_paths {
            let dir = root.join(name);
            let candidates = [
                dir.join("__init__.py"),
                dir.join("__init__.pyi"),
                root.join(format!("{name}.py")),
                root.join(format!("{name}.pyi")),
            ];

            if let Some(path) = candidates.into_iter().find(|p| p.is_file()) {
                let mut stubs = sibling_stub(&path);
                if stubs.is_none() && find_stubs {
                    stubs = self.find_stubs_package(name);
                }
                return Ok(PackageSpec::Regular(Package {
                    name: name.to_string(),
                    path,
                    stubs,
                }));
            }

            if let Some(path) = find_compiled(root, name) {
                let stubs = if find_stubs {
                    self.find_stubs_package(name)
                } else {
                    None
                };
                return Ok(PackageSpec::Regular(Package {
                    name: name.to_string(),
                    path,
                    stubs,
                }));
            }

            if dir.is_dir() {
                namespace_dirs.push(dir);
            }
            if find_stubs && stubs_only.is_none() {
                stubs_only = stubs_package_init(root, name);
            }
        }

        if !namespace_dirs.is_empty() {
            return Ok(PackageSpec::Namespace(NamespacePackage {
                name: name.to_string(),
                paths: namespace_dirs,
            }));
        }
        if let Some(path) = stubs_only {
            return Ok(PackageSpec::Regular(Package {
                name: name.to_string(),
                path,
                stubs: None,
            }));
        }
        Err(FinderError::NotFound(name.to_string()))
    }

    fn find_stubs_package(&self, name: &str) -> Option<PathBuf> {
        self.search_paths
            .iter()
            .find_map(|root| stubs_package_init(root, name))
    }

    /// Every module file nested under the package at `filepath`
    ///
    /// Parents come before their children. For a namespace package spanning
    /// several directories the first directory providing a module wins.
    pub fn submodules(&self, filepath: &Filepath) -> Vec<Submodule> {
        let dirs: Vec<PathBuf> = match filepath {
            Filepath::Namespace(paths) => paths.clone(),
            Filepath::File(path) => {
                let is_init = path.file_stem().is_some_and(|stem| stem == "__init__");
                if is_init {
                    vec![parent_or_current(path)]
                } else if path.is_dir() {
                    vec![path.clone()]
                } else {
                    return Vec::new();
                }
            }
        };

        let mut files: BTreeMap<Vec<String>, SubmoduleFiles> = BTreeMap::new();
        for (origin, dir) in dirs.iter().enumerate() {
            let walker = WalkDir::new(dir)
                .min_depth(1)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|entry| !is_skipped_dir(entry));

            for entry in walker.filter_map(|e| e.ok()) {
                if !entry.file_type().is_file() {
                    continue;
                }
                let path = entry.path();
                let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
                    continue;
                };
                if !SOURCE_EXTENSIONS.contains(&extension) && !COMPILED_EXTENSIONS.contains(&extension) {
                    continue;
                }
                let Some(parts) = module_parts(dir, path, extension) else {
                    continue;
                };
                if parts.is_empty() {
                    continue;
                }

                let slot = files.entry(parts).or_insert_with(|| SubmoduleFiles {
                    origin,
                    ..Default::default()
                });
                if slot.origin != origin {
                    continue;
                }
                let target = match extension {
                    "py" => &mut slot.source,
                    "pyi" => &mut slot.stub,
                    _ => &mut slot.compiled,
                };
                // __init__.py beats a same-named sibling module file
                let is_init = path.file_stem().is_some_and(|stem| stem == "__init__");
                if target.is_none() || is_init {
                    *target = Some(path.to_path_buf());
                }
            }
        }

        let mut submodules: Vec<Submodule> = files
            .into_iter()
            .filter_map(|(parts, files)| {
                let path = files
                    .source
                    .clone()
                    .or(files.compiled.clone())
                    .or(files.stub.clone())?;
                let stubs = files.stub.filter(|stub| stub != &path);
                Some(Submodule { parts, path, stubs })
            })
            .collect();
        submodules.sort_by(|a, b| (a.parts.len(), &a.parts).cmp(&(b.parts.len(), &b.parts)));
        submodules
    }
}

fn looks_like_path(spec: &str) -> bool {
    spec.contains('/')
        || spec.contains(std::path::MAIN_SEPARATOR)
        || spec.ends_with(".py")
        || spec.ends_with(".pyi")
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
}

fn parent_or_current(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// `module.pyi` next to `module.py`
fn sibling_stub(path: &Path) -> Option<PathBuf> {
    if path.extension().is_some_and(|e| e == "pyi") {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let stem = stem.split('.').next().unwrap_or(stem);
    let stub = path.with_file_name(format!("{stem}.pyi"));
    stub.is_file().then_some(stub)
}

fn stubs_package_init(root: &Path, name: &str) -> Option<PathBuf> {
    let init = root.join(format!("{name}-stubs")).join("__init__.pyi");
    init.is_file().then_some(init)
}

/// `name.cpython-312-x86_64-linux-gnu.so` and friends
fn find_compiled(root: &Path, name: &str) -> Option<PathBuf> {
    let prefix = format!("{name}.");
    let mut matches: Vec<PathBuf> = std::fs::read_dir(root)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&prefix))
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| COMPILED_EXTENSIONS.contains(&e))
        })
        .collect();
    matches.sort();
    matches.into_iter().next()
}

fn is_skipped_dir(entry: &walkdir::DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || name == "__pycache__"
}

/// Dotted segments of `path` relative to the package directory `dir`
fn module_parts(dir: &Path, path: &Path, extension: &str) -> Option<Vec<String>> {
    let relative = path.strip_prefix(dir).ok()?;
    let mut parts: Vec<String> = relative
        .parent()
        .map(|parent| {
            parent
                .components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default();

    let file_name = relative.file_name()?.to_str()?;
    let stem = file_name.strip_suffix(&format!(".{extension}"))?;
    let stem = if COMPILED_EXTENSIONS.contains(&extension) {
        stem.split('.').next().unwrap_or(stem)
    } else {
        stem
    };
    if stem != "__init__" {
        parts.push(stem.to_string());
    }
    Some(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) -> PathBuf {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "").unwrap();
        path
    }

    #[test]
    fn test_find_regular_package() {
        let temp_dir = TempDir::new().unwrap();
        let init = touch(temp_dir.path(), "pkg/__init__.py");

        let mut finder = ModuleFinder::new(&[temp_dir.path().to_path_buf()]);
        let (name, spec) = finder.find_spec("pkg.sub.Thing", true, false).unwrap();

        assert_eq!(name, "pkg.sub.Thing");
        assert_eq!(
            spec,
            PackageSpec::Regular(Package {
                name: "pkg".to_string(),
                path: init,
                stubs: None,
            })
        );
    }

    #[test]
    fn test_search_path_priority() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        touch(second.path(), "mod.py");
        let expected = touch(first.path(), "mod.py");

        let finder = ModuleFinder::new(&[first.path().to_path_buf(), second.path().to_path_buf()]);
        match finder.find_package("mod", false).unwrap() {
            PackageSpec::Regular(package) => assert_eq!(package.path, expected),
            other => panic!("expected regular package, got {:?}", other),
        }
    }

    #[test]
    fn test_find_namespace_package_across_roots() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        touch(first.path(), "ns/a.py");
        touch(second.path(), "ns/b.py");

        let finder = ModuleFinder::new(&[first.path().to_path_buf(), second.path().to_path_buf()]);
        let spec = finder.find_package("ns", false).unwrap();

        assert_eq!(
            spec,
            PackageSpec::Namespace(NamespacePackage {
                name: "ns".to_string(),
                paths: vec![first.path().join("ns"), second.path().join("ns")],
            })
        );
    }

    #[test]
    fn test_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let finder = ModuleFinder::new(&[temp_dir.path().to_path_buf()]);
        assert!(matches!(
            finder.find_package("missing", false),
            Err(FinderError::NotFound(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_inline_and_package_stubs() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "inline.py");
        let inline_stub = touch(temp_dir.path(), "inline.pyi");
        touch(temp_dir.path(), "typed/__init__.py");
        let package_stub = touch(temp_dir.path(), "typed-stubs/__init__.pyi");

        let finder = ModuleFinder::new(&[temp_dir.path().to_path_buf()]);
        match finder.find_package("inline", false).unwrap() {
            PackageSpec::Regular(package) => assert_eq!(package.stubs, Some(inline_stub)),
            other => panic!("unexpected {:?}", other),
        }
        match finder.find_package("typed", false).unwrap() {
            PackageSpec::Regular(package) => assert_eq!(package.stubs, None),
            other => panic!("unexpected {:?}", other),
        }
        match finder.find_package("typed", true).unwrap() {
            PackageSpec::Regular(package) => assert_eq!(package.stubs, Some(package_stub)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_find_compiled_module() {
        let temp_dir = TempDir::new().unwrap();
        let compiled = touch(temp_dir.path(), "fast.cpython-312-x86_64-linux-gnu.so");

        let finder = ModuleFinder::new(&[temp_dir.path().to_path_buf()]);
        match finder.find_package("fast", false).unwrap() {
            PackageSpec::Regular(package) => assert_eq!(package.path, compiled),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_find_by_relative_path() {
        let temp_dir = TempDir::new().unwrap();
        let init = touch(temp_dir.path(), "pkg/__init__.py");

        let mut finder = ModuleFinder::new(&[]);
        let spec_path = temp_dir.path().join("pkg");
        let (name, spec) = finder
            .find_spec(spec_path.to_str().unwrap(), true, false)
            .unwrap();

        assert_eq!(name, "pkg");
        assert_eq!(finder.search_paths()[0], temp_dir.path());
        match spec {
            PackageSpec::Regular(package) => assert_eq!(package.path, init),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_relative_path_rejects_other_files() {
        let temp_dir = TempDir::new().unwrap();
        let readme = touch(temp_dir.path(), "README.md");

        let mut finder = ModuleFinder::new(&[]);
        assert!(matches!(
            finder.find_spec(readme.to_str().unwrap(), true, false),
            Err(FinderError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_submodules_are_sorted_parents_first() {
        let temp_dir = TempDir::new().unwrap();
        let init = touch(temp_dir.path(), "pkg/__init__.py");
        touch(temp_dir.path(), "pkg/b.py");
        touch(temp_dir.path(), "pkg/a/__init__.py");
        touch(temp_dir.path(), "pkg/a/deep.py");
        let typed = touch(temp_dir.path(), "pkg/typed.py");
        let typed_stub = touch(temp_dir.path(), "pkg/typed.pyi");
        touch(temp_dir.path(), "pkg/README.md");
        touch(temp_dir.path(), "pkg/__pycache__/b.cpython-312.pyc");
        touch(temp_dir.path(), "pkg/.hidden/c.py");

        let finder = ModuleFinder::new(&[temp_dir.path().to_path_buf()]);
        let submodules = finder.submodules(&Filepath::File(init));
        let parts: Vec<String> = submodules.iter().map(|s| s.parts.join(".")).collect();

        assert_eq!(parts, vec!["a", "b", "typed", "a.deep"]);
        let typed_module = submodules.iter().find(|s| s.parts == ["typed"]).unwrap();
        assert_eq!(typed_module.path, typed);
        assert_eq!(typed_module.stubs, Some(typed_stub));
    }

    #[test]
    fn test_plain_module_has_no_submodules() {
        let temp_dir = TempDir::new().unwrap();
        let module = touch(temp_dir.path(), "mod.py");
        touch(temp_dir.path(), "other.py");

        let finder = ModuleFinder::new(&[temp_dir.path().to_path_buf()]);
        assert!(finder.submodules(&Filepath::File(module)).is_empty());
    }

    #[test]
    fn test_namespace_submodules_first_dir_wins() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        let winner = touch(first.path(), "ns/shared.py");
        touch(second.path(), "ns/shared.py");
        touch(second.path(), "ns/only_second.py");

        let finder = ModuleFinder::new(&[]);
        let submodules = finder.submodules(&Filepath::Namespace(vec![
            first.path().join("ns"),
            second.path().join("ns"),
        ]));

        let parts: Vec<String> = submodules.iter().map(|s| s.parts.join(".")).collect();
        assert_eq!(parts, vec!["only_second", "shared"]);
        assert_eq!(submodules[1].path, winner);
    }
}
