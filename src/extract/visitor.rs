//! Static extractor
//!
//! Parses one Python source file with tree-sitter and adds the resulting module
//! fragment to a [`ModulesCollection`] without executing anything.

use crate::collections::ModulesCollection;
use crate::error::{ExtractError, LoadError};
use crate::models::{Alias, Export, Filepath, Kind, NodeId, Object};
use std::collections::BTreeSet;
use std::path::Path;
use tree_sitter::{Node, Parser};

/// tree-sitter based module visitor
pub struct StaticExtractor {
    parser: Parser,
}

impl std::fmt::Debug for StaticExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticExtractor").finish_non_exhaustive()
    }
}

impl StaticExtractor {
    pub fn new() -> Result<Self, LoadError> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| LoadError::Parser(e.to_string()))?;
        Ok(Self { parser })
    }

    /// Build the module `name` from `code`
    ///
    /// The module is inserted detached, pointing at `parent` so its dotted path
    /// is known while relative imports get resolved. Attaching it is left to
    /// the caller.
    pub fn visit(
        &mut self,
        modules: &mut ModulesCollection,
        name: &str,
        filepath: &Path,
        code: &str,
        parent: Option<NodeId>,
    ) -> Result<NodeId, ExtractError> {
        let tree = self
            .parser
            .parse(code, None)
            .ok_or_else(|| ExtractError::Syntax {
                path: filepath.to_path_buf(),
                line: 1,
                message: "parser produced no tree".to_string(),
            })?;
        let root = tree.root_node();

        if root.has_error() {
            let (line, message) = first_error(root, code);
            return Err(ExtractError::Syntax {
                path: filepath.to_path_buf(),
                line,
                message,
            });
        }

        let mut module = Object::module(name, Some(Filepath::File(filepath.to_path_buf())))
            .with_lines(1, root.end_position().row + 1);
        module.docstring = docstring(root, code);
        let is_package = module.is_init_module();

        let id = modules.insert(module);
        modules.set_parent(id, parent);

        let mut visitor = Visitor {
            modules,
            source: code,
            module: id,
            module_path: String::new(),
            is_package,
        };
        visitor.module_path = visitor.modules.path(id);
        visitor.visit_block(root, id);

        Ok(id)
    }
}

struct Visitor<'a> {
    modules: &'a mut ModulesCollection,
    source: &'a str,
    module: NodeId,
    module_path: String,
    is_package: bool,
}

impl<'a> Visitor<'a> {
    fn node_text(&self, node: &Node) -> &'a str {
        &self.source[node.start_byte()..node.end_byte()]
    }

    fn visit_block(&mut self, block: Node, owner: NodeId) {
        let mut cursor = block.walk();
        let statements: Vec<Node> = block.named_children(&mut cursor).collect();
        for statement in statements {
            self.visit_statement(statement, owner);
        }
    }

    fn visit_statement(&mut self, node: Node, owner: NodeId) {
        match node.kind() {
            "class_definition" => self.visit_class(node, node, owner),
            "function_definition" => self.visit_function(node, node, owner),
            "decorated_definition" => {
                if let Some(definition) = node.child_by_field_name("definition") {
                    match definition.kind() {
                        "class_definition" => self.visit_class(definition, node, owner),
                        "function_definition" => self.visit_function(definition, node, owner),
                        _ => {}
                    }
                }
            }
            "import_statement" => self.visit_import(node, owner),
            "import_from_statement" => self.visit_import_from(node, owner),
            "expression_statement" => self.visit_expression_statement(node, owner),
            "if_statement" | "try_statement" | "with_statement" => {
                self.visit_compound(node, owner)
            }
            _ => {}
        }
    }

    /// Statements nested in the blocks and clauses of `if`, `try` and `with`
    fn visit_compound(&mut self, node: Node, owner: NodeId) {
        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        for child in children {
            match child.kind() {
                "block" => self.visit_block(child, owner),
                "elif_clause" | "else_clause" | "except_clause" | "except_group_clause"
                | "finally_clause" => self.visit_compound(child, owner),
                _ => {}
            }
        }
    }

    // =========================================================================
    // Definitions
    // =========================================================================

    fn visit_class(&mut self, node: Node, outer: Node, owner: NodeId) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let mut class = Object::new(self.node_text(&name_node), Kind::Class)
            .with_lines(outer.start_position().row + 1, outer.end_position().row + 1);

        if let Some(superclasses) = node.child_by_field_name("superclasses") {
            let mut cursor = superclasses.walk();
            class.bases = superclasses
                .named_children(&mut cursor)
                .filter(|base| base.kind() != "keyword_argument" && base.kind() != "comment")
                .map(|base| self.node_text(&base).to_string())
                .collect();
        }

        let body = node.child_by_field_name("body");
        class.docstring = body.and_then(|body| docstring(body, self.source));

        let id = self.modules.insert(class);
        self.modules.set_member(owner, id);

        if let Some(body) = body {
            self.visit_block(body, id);
        }
    }

    fn visit_function(&mut self, node: Node, outer: Node, owner: NodeId) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.node_text(&name_node);
        let mut function = Object::new(name, Kind::Function)
            .with_lines(outer.start_position().row + 1, outer.end_position().row + 1);

        let mut signature = node
            .child_by_field_name("parameters")
            .map(|params| self.node_text(&params).to_string())
            .unwrap_or_else(|| "()".to_string());
        if let Some(returns) = node.child_by_field_name("return_type") {
            signature.push_str(" -> ");
            signature.push_str(self.node_text(&returns));
        }
        function.signature = Some(signature);

        let body = node.child_by_field_name("body");
        function.docstring = body.and_then(|body| docstring(body, self.source));

        let id = self.modules.insert(function);
        self.modules.set_member(owner, id);

        let owner_is_class = self
            .modules
            .object(owner)
            .is_some_and(|object| object.kind == Kind::Class);
        if owner_is_class && name == "__init__" {
            if let Some(body) = body {
                self.visit_instance_attributes(body, owner);
            }
        }
    }

    /// `self.x = ...` in `__init__` declares a class attribute
    fn visit_instance_attributes(&mut self, block: Node, class: NodeId) {
        let mut cursor = block.walk();
        let statements: Vec<Node> = block.named_children(&mut cursor).collect();
        for statement in statements {
            match statement.kind() {
                "expression_statement" => {
                    let Some(assignment) = statement.named_child(0) else {
                        continue;
                    };
                    if assignment.kind() != "assignment" {
                        continue;
                    }
                    let Some(left) = assignment.child_by_field_name("left") else {
                        continue;
                    };
                    let Some(name) = self.self_attribute(left) else {
                        continue;
                    };
                    if self.modules.member(class, name).is_some() {
                        continue;
                    }
                    let mut attribute = Object::new(name, Kind::Attribute).with_lines(
                        statement.start_position().row + 1,
                        statement.end_position().row + 1,
                    );
                    attribute.annotation = assignment
                        .child_by_field_name("type")
                        .map(|t| self.node_text(&t).to_string());
                    attribute.value = assignment
                        .child_by_field_name("right")
                        .map(|v| self.node_text(&v).to_string());
                    let id = self.modules.insert(attribute);
                    self.modules.set_member(class, id);
                }
                "if_statement" | "try_statement" | "with_statement" => {
                    let mut inner = statement.walk();
                    let blocks: Vec<Node> = statement
                        .named_children(&mut inner)
                        .filter(|child| child.kind() == "block")
                        .collect();
                    for block in blocks {
                        self.visit_instance_attributes(block, class);
                    }
                }
                _ => {}
            }
        }
    }

    fn self_attribute(&self, node: Node) -> Option<&'a str> {
        if node.kind() != "attribute" {
            return None;
        }
        let object = node.child_by_field_name("object")?;
        if self.node_text(&object) != "self" {
            return None;
        }
        let attribute = node.child_by_field_name("attribute")?;
        Some(self.node_text(&attribute))
    }

    // =========================================================================
    // Imports
    // =========================================================================

    fn visit_import(&mut self, node: Node, owner: NodeId) {
        let lines = statement_lines(&node);
        let mut cursor = node.walk();
        let names: Vec<Node> = node.children_by_field_name("name", &mut cursor).collect();
        for name in names {
            let (alias_name, target) = match name.kind() {
                // `import a.b` binds `a`
                "dotted_name" => {
                    let text = self.node_text(&name);
                    let top = text.split('.').next().unwrap_or(text);
                    (top.to_string(), top.to_string())
                }
                "aliased_import" => {
                    let (Some(imported), Some(alias)) = (
                        name.child_by_field_name("name"),
                        name.child_by_field_name("alias"),
                    ) else {
                        continue;
                    };
                    (
                        self.node_text(&alias).to_string(),
                        self.node_text(&imported).to_string(),
                    )
                }
                _ => continue,
            };
            self.add_alias(owner, Alias::new(alias_name, target), lines);
        }
    }

    fn visit_import_from(&mut self, node: Node, owner: NodeId) {
        let Some(module_name) = node.child_by_field_name("module_name") else {
            return;
        };
        let base = match module_name.kind() {
            "relative_import" => match self.relative_base(module_name) {
                Some(base) => base,
                None => {
                    tracing::debug!(
                        "Relative import beyond top-level package in {}: {}",
                        self.module_path,
                        self.node_text(&node)
                    );
                    return;
                }
            },
            _ => self.node_text(&module_name).to_string(),
        };
        let lines = statement_lines(&node);

        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        if children.iter().any(|child| child.kind() == "wildcard_import") {
            self.add_alias(owner, Alias::wildcard(&base), lines);
            return;
        }

        let mut cursor = node.walk();
        let names: Vec<Node> = node.children_by_field_name("name", &mut cursor).collect();
        for name in names {
            let (alias_name, imported) = match name.kind() {
                "dotted_name" => {
                    let text = self.node_text(&name);
                    (text.to_string(), text.to_string())
                }
                "aliased_import" => {
                    let (Some(imported), Some(alias)) = (
                        name.child_by_field_name("name"),
                        name.child_by_field_name("alias"),
                    ) else {
                        continue;
                    };
                    (
                        self.node_text(&alias).to_string(),
                        self.node_text(&imported).to_string(),
                    )
                }
                _ => continue,
            };
            let target = if base.is_empty() {
                imported
            } else {
                format!("{base}.{imported}")
            };
            self.add_alias(owner, Alias::new(alias_name, target), lines);
        }
    }

    /// Absolute module path of a relative import such as `..sub`
    fn relative_base(&self, node: Node) -> Option<String> {
        let mut level = 0;
        let mut rest = None;
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "import_prefix" => level = self.node_text(&child).matches('.').count(),
                "dotted_name" => rest = Some(self.node_text(&child)),
                _ => {}
            }
        }

        let mut parts: Vec<&str> = self.module_path.split('.').collect();
        if !self.is_package {
            parts.pop()?;
        }
        for _ in 1..level {
            parts.pop()?;
        }
        if parts.is_empty() {
            return None;
        }
        if let Some(rest) = rest {
            parts.push(rest);
        }
        Some(parts.join("."))
    }

    fn add_alias(&mut self, owner: NodeId, alias: Alias, lines: (usize, usize)) {
        let alias = alias.with_lines(Some(lines.0), Some(lines.1));
        let id = self.modules.insert(alias);
        self.modules.set_member(owner, id);
    }

    // =========================================================================
    // Assignments and export lists
    // =========================================================================

    fn visit_expression_statement(&mut self, node: Node, owner: NodeId) {
        let Some(expression) = node.named_child(0) else {
            return;
        };
        let lines = statement_lines(&node);
        match expression.kind() {
            "assignment" => self.visit_assignment(expression, owner, lines),
            "augmented_assignment" => self.visit_augmented_assignment(expression, owner),
            "call" => self.visit_exports_call(expression, owner),
            _ => {}
        }
    }

    fn visit_assignment(&mut self, node: Node, owner: NodeId, lines: (usize, usize)) {
        // `a = b = value` nests assignments in the right-hand side
        let mut targets = Vec::new();
        let mut current = node;
        let (annotation, value) = loop {
            if let Some(left) = current.child_by_field_name("left") {
                targets.push(left);
            }
            match current.child_by_field_name("right") {
                Some(right) if right.kind() == "assignment" => current = right,
                right => break (current.child_by_field_name("type"), right),
            }
        };

        for target in targets {
            let names: Vec<&str> = match target.kind() {
                "identifier" => vec![self.node_text(&target)],
                "pattern_list" | "tuple_pattern" | "list_pattern" => {
                    let mut cursor = target.walk();
                    target
                        .named_children(&mut cursor)
                        .filter(|n| n.kind() == "identifier")
                        .map(|n| self.node_text(&n))
                        .collect()
                }
                _ => continue,
            };
            let unpacked = names.len() > 1;

            for name in names {
                if name == "__all__" && owner == self.module {
                    if let Some(value) = value {
                        let exports = self.parse_exports(value, owner);
                        if let Some(object) = self.modules.object_mut(owner) {
                            object.exports = Some(exports.into_iter().collect());
                        }
                    }
                    continue;
                }

                let mut attribute =
                    Object::new(name, Kind::Attribute).with_lines(lines.0, lines.1);
                attribute.annotation = annotation.map(|a| self.node_text(&a).to_string());
                if !unpacked {
                    attribute.value = value.map(|v| self.node_text(&v).to_string());
                }
                let id = self.modules.insert(attribute);
                self.modules.set_member(owner, id);
            }
        }
    }

    /// `__all__ += [...]`
    fn visit_augmented_assignment(&mut self, node: Node, owner: NodeId) {
        let (Some(left), Some(right)) = (
            node.child_by_field_name("left"),
            node.child_by_field_name("right"),
        ) else {
            return;
        };
        let is_add = node
            .child_by_field_name("operator")
            .is_some_and(|op| self.node_text(&op) == "+=");
        if is_add && self.node_text(&left) == "__all__" && owner == self.module {
            let exports = self.parse_exports(right, owner);
            self.extend_exports(owner, exports);
        }
    }

    /// `__all__.extend([...])` and `__all__.append("name")`
    fn visit_exports_call(&mut self, node: Node, owner: NodeId) {
        if owner != self.module {
            return;
        }
        let Some(function) = node.child_by_field_name("function") else {
            return;
        };
        if function.kind() != "attribute" {
            return;
        }
        let (Some(object), Some(method)) = (
            function.child_by_field_name("object"),
            function.child_by_field_name("attribute"),
        ) else {
            return;
        };
        if self.node_text(&object) != "__all__" {
            return;
        }
        let Some(argument) = node
            .child_by_field_name("arguments")
            .and_then(|arguments| arguments.named_child(0))
        else {
            return;
        };

        let exports = match self.node_text(&method) {
            "extend" => self.parse_exports(argument, owner),
            "append" => vec![self.parse_export_entry(argument, owner)],
            _ => return,
        };
        self.extend_exports(owner, exports);
    }

    fn extend_exports(&mut self, owner: NodeId, exports: Vec<Export>) {
        if let Some(object) = self.modules.object_mut(owner) {
            object
                .exports
                .get_or_insert_with(BTreeSet::new)
                .extend(exports);
        }
    }

    fn parse_exports(&self, node: Node, owner: NodeId) -> Vec<Export> {
        match node.kind() {
            "list" | "tuple" | "set" => {
                let mut cursor = node.walk();
                node.named_children(&mut cursor)
                    .filter(|entry| entry.kind() != "comment")
                    .map(|entry| self.parse_export_entry(entry, owner))
                    .collect()
            }
            "parenthesized_expression" => node
                .named_child(0)
                .map(|inner| self.parse_exports(inner, owner))
                .unwrap_or_default(),
            "binary_operator" => {
                let (Some(left), Some(right)) = (
                    node.child_by_field_name("left"),
                    node.child_by_field_name("right"),
                ) else {
                    return vec![Export::Invalid(self.node_text(&node).to_string())];
                };
                let mut exports = self.parse_exports(left, owner);
                exports.extend(self.parse_exports(right, owner));
                exports
            }
            _ => match self.export_reference(node, owner) {
                Some(module) => vec![Export::Module(module)],
                None => vec![Export::Invalid(self.node_text(&node).to_string())],
            },
        }
    }

    fn parse_export_entry(&self, node: Node, owner: NodeId) -> Export {
        match node.kind() {
            "string" => Export::Name(string_literal(self.node_text(&node))),
            "list_splat" => node
                .named_child(0)
                .and_then(|inner| self.export_reference(inner, owner))
                .map(Export::Module)
                .unwrap_or_else(|| Export::Invalid(self.node_text(&node).to_string())),
            _ => Export::Invalid(self.node_text(&node).to_string()),
        }
    }

    /// Module path behind `other.__all__`, or a name imported as `from other import __all__`
    fn export_reference(&self, node: Node, owner: NodeId) -> Option<String> {
        let text = self.node_text(&node);
        let path = match node.kind() {
            "attribute" => text.strip_suffix(".__all__")?,
            "identifier" => text,
            _ => return None,
        };

        let mut segments = path.splitn(2, '.');
        let first = segments.next()?;
        let rest = segments.next();
        let canonical = match self
            .modules
            .member(owner, first)
            .and_then(|member| self.modules.alias(member))
        {
            Some(alias) => match rest {
                Some(rest) => format!("{}.{}", alias.target_path, rest),
                None => alias.target_path.clone(),
            },
            None if node.kind() == "identifier" => return None,
            None => path.to_string(),
        };

        if node.kind() == "identifier" {
            return canonical.strip_suffix(".__all__").map(str::to_string);
        }
        Some(canonical)
    }
}

fn statement_lines(node: &Node) -> (usize, usize) {
    (node.start_position().row + 1, node.end_position().row + 1)
}

/// Line and message of the first error node in the tree
fn first_error(root: Node, source: &str) -> (usize, String) {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_missing() {
            return (
                node.start_position().row + 1,
                format!("expected '{}'", node.kind()),
            );
        }
        if node.is_error() {
            let text = &source[node.start_byte()..node.end_byte()];
            let snippet = text.lines().next().unwrap_or_default().trim();
            return (
                node.start_position().row + 1,
                format!("invalid syntax near '{}'", snippet),
            );
        }
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    (root.start_position().row + 1, "invalid syntax".to_string())
}

/// Docstring of a module, class or function body
fn docstring(body: Node, source: &str) -> Option<String> {
    let mut cursor = body.walk();
    let first = body
        .named_children(&mut cursor)
        .find(|child| child.kind() != "comment")?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let expression = first.named_child(0)?;
    if expression.kind() != "string" {
        return None;
    }
    let raw = string_literal(&source[expression.start_byte()..expression.end_byte()]);
    Some(clean_docstring(&raw))
}

/// Contents of a string literal, without prefix and quotes
fn string_literal(text: &str) -> String {
    let body = text.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if let Some(inner) = body
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner.to_string();
        }
    }
    body.to_string()
}

/// Strip the common indentation of every line after the first
fn clean_docstring(raw: &str) -> String {
    let mut lines = raw.lines();
    let first = lines.next().unwrap_or_default().trim().to_string();
    let rest: Vec<&str> = lines.collect();
    let indent = rest
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut cleaned = vec![first];
    cleaned.extend(
        rest.iter()
            .map(|line| line.get(indent..).unwrap_or("").trim_end().to_string()),
    );
    cleaned.join("\n").trim().to_string()
}
