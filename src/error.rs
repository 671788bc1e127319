//! Error types surfaced by the finder, the extractors, the loader and alias resolution.

use std::path::PathBuf;

/// Failure to locate a package on disk
#[derive(Debug, thiserror::Error)]
pub enum FinderError {
    #[error("Module not found: {0}")]
    NotFound(String),

    #[error("Not a Python module or package: {0}")]
    InvalidPath(PathBuf),
}

/// Failure of a single extractor (static visit or dynamic inspection) on one module
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Syntax error in {path} at line {line}: {message}")]
    Syntax {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("UnicodeDecodeError when loading {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: std::string::FromUtf8Error,
    },

    #[error("OSError when loading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Import error: {0}")]
    Import(String),
}

/// Errors returned by the loader
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Module not found: {0}")]
    NotFound(String),

    #[error("Not a Python module or package: {0}")]
    InvalidPath(PathBuf),

    #[error("Could not load {module}: {source}")]
    Loading {
        module: String,
        #[source]
        source: ExtractError,
    },

    #[error("Cannot load compiled module {0} without inspection")]
    CompiledWithoutInspection(PathBuf),

    #[error("{0}")]
    Unimportable(String),

    #[error("Failed to initialize the Python parser: {0}")]
    Parser(String),

    #[error("Extension hook failed: {0}")]
    Extension(#[source] anyhow::Error),
}

impl From<FinderError> for LoadError {
    fn from(error: FinderError) -> Self {
        match error {
            FinderError::NotFound(name) => LoadError::NotFound(name),
            FinderError::InvalidPath(path) => LoadError::InvalidPath(path),
        }
    }
}

/// Why an alias could not be followed down to a concrete object
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AliasError {
    #[error("Could not resolve alias {alias_path} pointing at {target_path}")]
    Unresolved {
        alias_path: String,
        target_path: String,
    },

    #[error("Cyclic aliases detected: {}", .chain.join(" -> "))]
    Cyclic { chain: Vec<String> },
}
