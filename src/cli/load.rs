use crate::config::{ExternalPolicy, InspectionPolicy, LoaderConfig};
use crate::models::{AliasState, Node, NodeId};
use crate::{ModulesCollection, Result};
use anyhow::Context;
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use std::env;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct LoadArgs {
    /// Dotted path of the object to load, or a path to a package or module
    pub spec: String,

    /// Directory to search for packages (repeatable, highest priority first)
    #[arg(short = 'p', long = "search-path")]
    pub search_paths: Vec<PathBuf>,

    /// When modules may be imported instead of parsed
    #[arg(long, value_enum)]
    pub inspection: Option<InspectionPolicy>,

    /// Do not load submodules
    #[arg(long)]
    pub no_submodules: bool,

    /// Look for `<name>-stubs` packages
    #[arg(long)]
    pub find_stubs: bool,

    /// Resolve aliases after loading
    #[arg(short, long)]
    pub resolve: bool,

    /// Resolve every alias, not only exported ones
    #[arg(long)]
    pub implicit: bool,

    /// Which packages may be loaded to resolve aliases
    #[arg(long, value_enum)]
    pub external: Option<ExternalPolicy>,

    /// Maximum number of alias resolution passes
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// Config file (default: ./apigraph.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output in JSON format
    #[arg(short, long)]
    pub json: bool,

    /// Print loading statistics
    #[arg(long)]
    pub stats: bool,
}

#[derive(Debug, Serialize)]
struct NodeSummary {
    name: String,
    path: String,
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lineno: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    members: Vec<NodeSummary>,
}

fn summarize(modules: &ModulesCollection, id: NodeId) -> NodeSummary {
    let node = modules.node(id);
    let (kind, target) = match node {
        Node::Object(object) => (object.kind.to_string(), None),
        Node::Alias(alias) => ("alias".to_string(), Some(alias.target_path.clone())),
    };
    NodeSummary {
        name: node.name().to_string(),
        path: modules.path(id),
        kind,
        target,
        lineno: node.defining_lineno(),
        members: modules
            .members(id)
            .into_iter()
            .map(|(_, member)| summarize(modules, member))
            .collect(),
    }
}

fn build_config(args: &LoadArgs) -> Result<LoaderConfig> {
    let mut config = match &args.config {
        Some(path) => LoaderConfig::from_file(path)?,
        None => LoaderConfig::load(&env::current_dir()?)?,
    };

    if !args.search_paths.is_empty() {
        config.search_paths = args.search_paths.clone();
    }
    if let Some(inspection) = args.inspection {
        config.inspection = inspection;
    }
    if args.no_submodules {
        config.submodules = false;
    }
    if args.find_stubs {
        config.find_stubs_package = true;
    }
    if args.resolve {
        config.resolution.resolve_aliases = true;
    }
    if args.implicit {
        config.resolution.implicit = true;
    }
    if let Some(external) = args.external {
        config.resolution.external = external;
    }
    if args.max_iterations.is_some() {
        config.resolution.max_iterations = args.max_iterations;
    }
    Ok(config)
}

pub fn run(args: LoadArgs) -> Result<()> {
    let config = build_config(&args)?;
    let loaded = crate::load(&args.spec, &config)?;
    let loader = &loaded.loader;
    let modules = loader.modules();

    if args.json {
        let output = serde_json::json!({
            "object": summarize(modules, loaded.node),
            "skipped": loader.skipped(),
            "resolution": loaded.resolution,
            "stats": args.stats.then(|| loader.stats()),
        });
        let text = serde_json::to_string_pretty(&output).context("Failed to serialize output")?;
        println!("{}", text);
        return Ok(());
    }

    print_tree(modules, loaded.node);

    if !loader.skipped().is_empty() {
        println!();
        println!("{}", format!("Skipped {} module(s):", loader.skipped().len()).yellow());
        for skipped in loader.skipped() {
            println!("   {} {}", skipped.path.bold(), skipped.reason.bright_black());
        }
    }

    if let Some(report) = &loaded.resolution {
        println!();
        let summary = format!(
            "Resolved {} alias(es) in {} pass(es)",
            report.resolved, report.iterations
        );
        if report.unresolved.is_empty() {
            println!("{}", summary.green());
        } else {
            println!("{}", format!("{}, {} unresolved:", summary, report.unresolved.len()).yellow());
            for path in &report.unresolved {
                let marker = if report.cyclic.contains(path) { " (cyclic)" } else { "" };
                println!("   {}{}", path, marker.red());
            }
        }
    }

    if args.stats {
        let stats = loader.stats();
        println!();
        println!("{}", "Statistics:".cyan().bold());
        println!("   Packages:   {}", stats.packages);
        println!("   Modules:    {}", stats.modules);
        println!("   Classes:    {}", stats.classes);
        println!("   Functions:  {}", stats.functions);
        println!("   Attributes: {}", stats.attributes);
        println!("   Aliases:    {}", stats.aliases);
        println!("   Lines:      {}", stats.lines);
        for (extension, count) in &stats.files_by_extension {
            println!("   .{:<10} {}", extension, count);
        }
        println!("   Visiting:   {:?}", stats.time_spent_visiting);
        println!("   Inspecting: {:?}", stats.time_spent_inspecting);
    }

    Ok(())
}

fn print_tree(modules: &ModulesCollection, root: NodeId) {
    let mut stack = vec![(root, 0usize)];
    while let Some((id, depth)) = stack.pop() {
        let indent = "  ".repeat(depth);
        match modules.node(id) {
            Node::Object(object) => {
                let label = match object.kind {
                    crate::Kind::Module => object.name.blue().bold(),
                    crate::Kind::Class => object.name.yellow(),
                    crate::Kind::Function => object.name.green(),
                    crate::Kind::Attribute => object.name.normal(),
                };
                let detail = object
                    .signature
                    .as_deref()
                    .or(object.annotation.as_deref())
                    .unwrap_or_default();
                println!("{}{} {}{}", indent, object.kind.to_string().bright_black(), label, detail);
            }
            Node::Alias(alias) => {
                let state = match alias.state {
                    AliasState::Resolved(_) => "".normal(),
                    AliasState::Unresolved => " (unresolved)".yellow(),
                    AliasState::Cyclic => " (cyclic)".red(),
                };
                println!(
                    "{}{} {} -> {}{}",
                    indent,
                    "alias".bright_black(),
                    alias.name,
                    alias.target_path.cyan(),
                    state
                );
            }
        }
        for (_, member) in modules.members(id).into_iter().rev() {
            stack.push((member, depth + 1));
        }
    }
}
