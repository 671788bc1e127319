use super::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Kind of object stored in the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Module,
    Class,
    Function,
    Attribute,
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Module => write!(f, "module"),
            Self::Class => write!(f, "class"),
            Self::Function => write!(f, "function"),
            Self::Attribute => write!(f, "attribute"),
        }
    }
}

/// Location of a module on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Filepath {
    File(PathBuf),
    /// One directory per search root, in search-path priority order
    Namespace(Vec<PathBuf>),
}

impl Filepath {
    pub fn is_namespace(&self) -> bool {
        matches!(self, Filepath::Namespace(_))
    }

    /// The single file backing this module, if any
    pub fn file(&self) -> Option<&Path> {
        match self {
            Filepath::File(path) => Some(path),
            Filepath::Namespace(_) => None,
        }
    }

    pub fn paths(&self) -> Vec<&Path> {
        match self {
            Filepath::File(path) => vec![path.as_path()],
            Filepath::Namespace(paths) => paths.iter().map(PathBuf::as_path).collect(),
        }
    }
}

impl std::fmt::Display for Filepath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Filepath::File(path) => write!(f, "{}", path.display()),
            Filepath::Namespace(paths) => {
                let joined: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
                write!(f, "[{}]", joined.join(", "))
            }
        }
    }
}

/// One entry of a module's declared public names (`__all__`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Export {
    Name(String),
    /// Dotted path of a module whose own exports are spliced in (`other.__all__`)
    Module(String),
    /// Source text of an entry that is not a string literal
    Invalid(String),
}

impl Export {
    pub fn name(&self) -> Option<&str> {
        match self {
            Export::Name(name) => Some(name),
            _ => None,
        }
    }
}

/// A module, class, function or attribute
#[derive(Debug, Clone)]
pub struct Object {
    pub name: String,
    pub kind: Kind,
    pub parent: Option<NodeId>,
    pub members: BTreeMap<String, NodeId>,
    pub filepath: Option<Filepath>,
    pub lineno: Option<usize>,
    pub endlineno: Option<usize>,
    /// `None` when the module declares no export list
    pub exports: Option<BTreeSet<Export>>,
    pub docstring: Option<String>,
    /// Function parameters and return annotation
    pub signature: Option<String>,
    /// Attribute type annotation
    pub annotation: Option<String>,
    /// Attribute value as written in the source
    pub value: Option<String>,
    /// Class bases as written in the source
    pub bases: Vec<String>,
}

impl Object {
    pub fn new(name: impl Into<String>, kind: Kind) -> Self {
        Self {
            name: name.into(),
            kind,
            parent: None,
            members: BTreeMap::new(),
            filepath: None,
            lineno: None,
            endlineno: None,
            exports: None,
            docstring: None,
            signature: None,
            annotation: None,
            value: None,
            bases: Vec::new(),
        }
    }

    pub fn module(name: impl Into<String>, filepath: Option<Filepath>) -> Self {
        let mut module = Self::new(name, Kind::Module);
        module.filepath = filepath;
        module
    }

    pub fn with_lines(mut self, lineno: usize, endlineno: usize) -> Self {
        self.lineno = Some(lineno);
        self.endlineno = Some(endlineno);
        self
    }

    pub fn is_module(&self) -> bool {
        self.kind == Kind::Module
    }

    /// Namespace packages and the directories created under them
    pub fn is_namespace(&self) -> bool {
        self.is_module() && self.filepath.as_ref().is_some_and(Filepath::is_namespace)
    }

    /// Whether this module is a package initializer (`__init__.py`)
    pub fn is_init_module(&self) -> bool {
        self.filepath
            .as_ref()
            .and_then(Filepath::file)
            .and_then(Path::file_stem)
            .is_some_and(|stem| stem == "__init__")
    }

    /// Whether `name` is listed as a plain string in the export list
    pub fn exports_name(&self, name: &str) -> bool {
        self.exports
            .as_ref()
            .is_some_and(|exports| exports.iter().any(|e| e.name() == Some(name)))
    }
}
