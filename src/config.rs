//! Loader configuration
//!
//! Read from an optional `apigraph.toml` at the project root. Every field has a
//! default, so an empty or missing file yields [`LoaderConfig::default`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "apigraph.toml";

/// When the dynamic extractor (importing the module) may be used
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InspectionPolicy {
    /// Only when no source is available
    #[default]
    Allow,
    /// Always, even when sources were found
    Force,
    /// Never; compiled modules fail to load
    Disallow,
}

/// Which packages may be loaded on the fly to expand wildcards or resolve aliases
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ExternalPolicy {
    Never,
    /// Only the private implementation package of the current one (`_pkg` for `pkg`)
    #[default]
    PrivateSibling,
    Always,
}

impl ExternalPolicy {
    /// Whether `package` may be loaded on behalf of an object of `current_package`
    pub fn permits(&self, package: &str, current_package: &str) -> bool {
        match self {
            ExternalPolicy::Never => false,
            ExternalPolicy::Always => true,
            ExternalPolicy::PrivateSibling => {
                package.strip_prefix('_') == Some(current_package)
            }
        }
    }
}

/// Alias resolution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionConfig {
    /// Run alias resolution after loading
    #[serde(default)]
    pub resolve_aliases: bool,

    /// Resolve every alias, not only exported ones
    #[serde(default)]
    pub implicit: bool,

    #[serde(default)]
    pub external: ExternalPolicy,

    /// Cap on whole-graph resolution passes
    #[serde(default)]
    pub max_iterations: Option<usize>,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            resolve_aliases: false,
            implicit: false,
            external: ExternalPolicy::default(),
            max_iterations: None,
        }
    }
}

/// Loader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Roots searched for packages, in priority order
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,

    #[serde(default)]
    pub inspection: InspectionPolicy,

    /// Recurse into submodules of the loaded package
    #[serde(default = "default_true")]
    pub submodules: bool,

    /// Look for `<name>-stubs` packages and merge them
    #[serde(default)]
    pub find_stubs_package: bool,

    /// Keep the source lines of every file read
    #[serde(default = "default_true")]
    pub store_source: bool,

    /// Module prefixes that are never imported
    #[serde(default = "default_ignored_modules")]
    pub ignored_modules: Vec<String>,

    /// Interpreter used by the dynamic extractor
    #[serde(default = "default_python")]
    pub python: String,

    #[serde(default)]
    pub resolution: ResolutionConfig,
}

fn default_true() -> bool {
    true
}

fn default_ignored_modules() -> Vec<String> {
    vec!["debugpy".to_string(), "_pydev".to_string()]
}

fn default_python() -> String {
    "python3".to_string()
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            inspection: InspectionPolicy::default(),
            submodules: true,
            find_stubs_package: false,
            store_source: true,
            ignored_modules: default_ignored_modules(),
            python: default_python(),
            resolution: ResolutionConfig::default(),
        }
    }
}

impl LoaderConfig {
    /// Load config from `apigraph.toml` in `project_root`, or defaults when absent
    pub fn load(project_root: &Path) -> Result<Self> {
        let config_path = project_root.join(CONFIG_FILE);
        if !config_path.exists() {
            return Ok(Self::default());
        }
        Self::from_file(&config_path)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config: LoaderConfig = toml::from_str(&content)
            .with_context(|| format!("Invalid config in {}", path.display()))?;
        Ok(config)
    }
}
