//! Loading statistics

use crate::loader::Loader;
use crate::models::{Kind, Node, NodeId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Counts over the graph reachable from the top-level modules
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub packages: usize,
    pub modules: usize,
    pub classes: usize,
    pub functions: usize,
    pub attributes: usize,
    pub aliases: usize,
    /// Source lines read
    pub lines: usize,
    /// Module files by extension (`py`, `pyi`, `so`...)
    pub files_by_extension: BTreeMap<String, usize>,
    pub time_spent_visiting: Duration,
    pub time_spent_inspecting: Duration,
}

impl Stats {
    pub fn collect(loader: &Loader) -> Self {
        let modules = loader.modules();
        let mut stats = Stats {
            lines: loader.lines().total_lines(),
            time_spent_visiting: loader.time_spent_visiting,
            time_spent_inspecting: loader.time_spent_inspecting,
            ..Default::default()
        };

        let mut stack: Vec<NodeId> = modules.roots().map(|(_, id)| id).collect();
        stats.packages = stack.len();

        while let Some(id) = stack.pop() {
            let object = match modules.node(id) {
                Node::Alias(_) => {
                    stats.aliases += 1;
                    continue;
                }
                Node::Object(object) => object,
            };
            match object.kind {
                Kind::Module => {
                    stats.modules += 1;
                    if let Some(extension) = object
                        .filepath
                        .as_ref()
                        .and_then(|filepath| filepath.file())
                        .and_then(|file| file.extension())
                    {
                        *stats
                            .files_by_extension
                            .entry(extension.to_string_lossy().to_string())
                            .or_default() += 1;
                    }
                }
                Kind::Class => stats.classes += 1,
                Kind::Function => stats.functions += 1,
                Kind::Attribute => stats.attributes += 1,
            }
            stack.extend(object.members.values().copied());
        }
        stats
    }
}

impl Loader {
    pub fn stats(&self) -> Stats {
        Stats::collect(self)
    }
}
