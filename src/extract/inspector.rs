//! Dynamic extractor
//!
//! Imports a module in a Python interpreter and reflects on the live objects.
//! The interpreter runs an embedded script that prints one JSON document per
//! module; [`build_module`] turns that document into graph nodes.

use crate::collections::ModulesCollection;
use crate::error::ExtractError;
use crate::models::{Alias, Export, Filepath, Kind, NodeId, Object};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Command;

const INSPECT_SCRIPT: &str = include_str!("inspect.py");

/// Source of runtime module descriptions
///
/// Importing executes module-level code, so this seam is kept behind a trait:
/// the loader can run without an interpreter and tests substitute canned data.
pub trait Inspector {
    fn inspect(
        &self,
        module_path: &str,
        search_paths: &[PathBuf],
    ) -> Result<InspectedModule, ExtractError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InspectedKind {
    Module,
    Class,
    Function,
    Attribute,
    Alias,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InspectedModule {
    pub name: String,
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Runtime `__path__`, present for packages
    #[serde(default)]
    pub paths: Option<Vec<PathBuf>>,
    #[serde(default)]
    pub docstring: Option<String>,
    #[serde(default)]
    pub exports: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub members: Vec<InspectedMember>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectedMember {
    pub name: String,
    pub kind: InspectedKind,
    /// Dotted path of the original object when this member is an import
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub lineno: Option<usize>,
    #[serde(default)]
    pub endlineno: Option<usize>,
    #[serde(default)]
    pub docstring: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub annotation: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub bases: Vec<String>,
    #[serde(default)]
    pub members: Vec<InspectedMember>,
}

impl InspectedMember {
    pub fn new(name: impl Into<String>, kind: InspectedKind) -> Self {
        Self {
            name: name.into(),
            kind,
            target: None,
            lineno: None,
            endlineno: None,
            docstring: None,
            signature: None,
            annotation: None,
            value: None,
            bases: Vec::new(),
            members: Vec::new(),
        }
    }

    pub fn alias(name: impl Into<String>, target: impl Into<String>) -> Self {
        let mut member = Self::new(name, InspectedKind::Alias);
        member.target = Some(target.into());
        member
    }
}

/// Insert the module described by `inspected`, detached under `parent`
pub fn build_module(
    modules: &mut ModulesCollection,
    name: &str,
    inspected: &InspectedModule,
    parent: Option<NodeId>,
) -> NodeId {
    let filepath = match (&inspected.file, &inspected.paths) {
        (Some(file), _) => Some(Filepath::File(file.clone())),
        (None, Some(paths)) if !paths.is_empty() => Some(Filepath::Namespace(paths.clone())),
        _ => None,
    };
    let mut module = Object::module(name, filepath);
    module.docstring = inspected.docstring.clone();
    module.exports = inspected.exports.as_ref().map(|exports| {
        exports
            .iter()
            .map(|value| match value {
                serde_json::Value::String(name) => Export::Name(name.clone()),
                other => Export::Invalid(other.to_string()),
            })
            .collect()
    });

    let id = modules.insert(module);
    modules.set_parent(id, parent);

    let mut stack: Vec<(NodeId, &InspectedMember)> =
        inspected.members.iter().rev().map(|m| (id, m)).collect();
    while let Some((owner, member)) = stack.pop() {
        let kind = match member.kind {
            InspectedKind::Alias | InspectedKind::Module => {
                match &member.target {
                    Some(target) => {
                        let alias = Alias::new(&member.name, target)
                            .with_lines(member.lineno, member.endlineno);
                        let alias_id = modules.insert(alias);
                        modules.set_member(owner, alias_id);
                    }
                    None => tracing::debug!(
                        "Skipping runtime member {} of {}: no target",
                        member.name,
                        modules.path(owner)
                    ),
                }
                continue;
            }
            InspectedKind::Class => Kind::Class,
            InspectedKind::Function => Kind::Function,
            InspectedKind::Attribute => Kind::Attribute,
        };

        let mut object = Object::new(&member.name, kind);
        object.lineno = member.lineno;
        object.endlineno = member.endlineno;
        object.docstring = member.docstring.clone();
        object.signature = member.signature.clone();
        object.annotation = member.annotation.clone();
        object.value = member.value.clone();
        object.bases = member.bases.clone();

        let object_id = modules.insert(object);
        modules.set_member(owner, object_id);
        stack.extend(member.members.iter().rev().map(|m| (object_id, m)));
    }

    id
}

/// Runs the embedded inspection script with a Python interpreter
#[derive(Debug, Clone)]
pub struct PythonInspector {
    python: String,
}

impl PythonInspector {
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
        }
    }
}

impl Default for PythonInspector {
    fn default() -> Self {
        Self::new("python3")
    }
}

impl Inspector for PythonInspector {
    fn inspect(
        &self,
        module_path: &str,
        search_paths: &[PathBuf],
    ) -> Result<InspectedModule, ExtractError> {
        let pythonpath = std::env::join_paths(search_paths)
            .map_err(|e| ExtractError::Import(format!("invalid search path: {}", e)))?;

        tracing::debug!("Inspecting {} with {}", module_path, self.python);
        let output = Command::new(&self.python)
            .arg("-c")
            .arg(INSPECT_SCRIPT)
            .arg(module_path)
            .env("PYTHONPATH", pythonpath)
            .output()
            .map_err(|e| ExtractError::Import(format!("failed to run {}: {}", self.python, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("import failed");
            return Err(ExtractError::Import(format!("{}: {}", module_path, message)));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| {
            ExtractError::Import(format!("invalid inspection output for {}: {}", module_path, e))
        })
    }
}
