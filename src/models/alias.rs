use super::NodeId;

/// Resolution state of an alias
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasState {
    Unresolved,
    /// Final concrete target
    Resolved(NodeId),
    /// Following the chain revisited one of its own links; never retried
    Cyclic,
}

/// A named, non-owning reference to another path of the graph
#[derive(Debug, Clone)]
pub struct Alias {
    pub name: String,
    pub parent: Option<NodeId>,
    pub target_path: String,
    /// Path of the imported module for `from module import *`
    pub wildcard: Option<String>,
    /// Module whose wildcard import was expanded into this alias
    pub expanded_from: Option<String>,
    pub alias_lineno: Option<usize>,
    pub alias_endlineno: Option<usize>,
    pub state: AliasState,
}

impl Alias {
    pub fn new(name: impl Into<String>, target_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            target_path: target_path.into(),
            wildcard: None,
            expanded_from: None,
            alias_lineno: None,
            alias_endlineno: None,
            state: AliasState::Unresolved,
        }
    }

    /// `from module import *`
    ///
    /// Named after the imported module (`a/b/*`) so that several wildcard
    /// imports can live side by side in the same module.
    pub fn wildcard(module: &str) -> Self {
        let mut alias = Self::new(format!("{}/*", module.replace('.', "/")), module);
        alias.wildcard = Some(module.to_string());
        alias
    }

    /// One concrete name brought in by `from source import *`
    pub fn expanded(name: impl Into<String>, target_path: impl Into<String>, source: &str) -> Self {
        let mut alias = Self::new(name, target_path);
        alias.expanded_from = Some(source.to_string());
        alias
    }

    pub fn with_lines(mut self, lineno: Option<usize>, endlineno: Option<usize>) -> Self {
        self.alias_lineno = lineno;
        self.alias_endlineno = endlineno;
        self
    }

    pub fn is_wildcard(&self) -> bool {
        self.wildcard.is_some()
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.state, AliasState::Resolved(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_alias_naming() {
        let alias = Alias::wildcard("pkg.sub");
        assert_eq!(alias.name, "pkg/sub/*");
        assert_eq!(alias.target_path, "pkg.sub");
        assert_eq!(alias.wildcard.as_deref(), Some("pkg.sub"));
        assert!(alias.is_wildcard());
        assert!(!alias.is_resolved());
        assert_eq!(alias.expanded_from, None);
    }

    #[test]
    fn test_expanded_alias_is_not_a_wildcard() {
        let alias = Alias::expanded("foo", "pkg.a.foo", "pkg.a");
        assert!(!alias.is_wildcard());
        assert_eq!(alias.expanded_from.as_deref(), Some("pkg.a"));
    }
}
