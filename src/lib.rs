// Apigraph - Python API graph loader
// Builds the public API surface of Python packages, resolving re-exports and wildcard imports

pub mod cli;
pub mod collections;
pub mod config;
pub mod error;
pub mod extensions;
pub mod extract;
pub mod finder;
pub mod loader;
pub mod models;
pub mod stats;

pub use anyhow::{Context, Result};
pub use colored::Colorize;

// Re-export commonly used types
pub use collections::{LinesCollection, ModulesCollection};
pub use config::{ExternalPolicy, InspectionPolicy, LoaderConfig};
pub use error::{AliasError, LoadError};
pub use extensions::Event;
pub use loader::{LoadOptions, Loader, ResolutionReport, ResolveOptions, SkippedModule};
pub use models::{Alias, Kind, Node, NodeId, Object};
pub use stats::Stats;

/// Result of [`load`]
#[derive(Debug)]
pub struct Loaded {
    pub loader: Loader,
    /// Node at the requested path
    pub node: NodeId,
    /// Present when the configuration asks for alias resolution
    pub resolution: Option<ResolutionReport>,
}

/// Load `spec` with a fresh loader built from `config`
pub fn load(spec: &str, config: &LoaderConfig) -> Result<Loaded> {
    let mut loader = Loader::new(config.clone())?;
    let node = loader
        .load(spec)
        .with_context(|| format!("Failed to load {}", spec))?;

    let resolution = if config.resolution.resolve_aliases {
        let options = ResolveOptions::from(&config.resolution);
        Some(loader.resolve_aliases(options)?)
    } else {
        None
    };

    Ok(Loaded {
        loader,
        node,
        resolution,
    })
}
