//! Visitor for Rust trees.

use tree_sitter::Node;

use super::{
    cyclomatic_complexity, location, walk_named, ArtifactBuilder, ClassInfo, ClassKind, Descend,
    ExportInfo, FunctionInfo, ImportInfo, VariableInfo,
};

pub(super) fn visit(root: Node, b: &mut ArtifactBuilder) {
    let mut impls = Vec::new();
    walk_named(root, |node| visit_node(node, b, &mut impls));

    // `impl Foo { fn bar() }` attaches `bar` to struct or enum `Foo`
    for (type_name, methods) in impls {
        if let Some(class) = b.classes.iter_mut().find(|c| c.name == type_name) {
            class.methods.extend(methods);
        }
    }
}

fn visit_node(
    node: Node,
    b: &mut ArtifactBuilder,
    impls: &mut Vec<(String, Vec<String>)>,
) -> Descend {
    match node.kind() {
        "function_item" => push_function(node, b),
        "struct_item" => push_class(node, ClassKind::Struct, b),
        "enum_item" => push_class(node, ClassKind::Enum, b),
        "trait_item" => push_class(node, ClassKind::Trait, b),
        "type_item" => push_class(node, ClassKind::TypeAlias, b),
        "impl_item" => {
            if let Some(entry) = impl_methods(node, b) {
                impls.push(entry);
            }
        }
        "use_declaration" => {
            visit_use(node, b);
            return Descend::Skip;
        }
        "extern_crate_declaration" => {
            if let Some(name) = b.field_text(node, "name") {
                b.imports.push(ImportInfo {
                    source: name.clone(),
                    specifiers: vec![name],
                    snippet: b.snippet(node),
                    location: location(node),
                });
            }
            return Descend::Skip;
        }
        "const_item" | "static_item" => {
            if let Some(name) = b.field_text(node, "name") {
                let kind = if node.kind() == "const_item" { "const" } else { "static" };
                b.variables.push(VariableInfo {
                    name,
                    kind: kind.to_string(),
                    snippet: b.snippet(node),
                    location: location(node),
                });
            }
        }
        "line_comment" | "block_comment" => {
            let text = b.text(node);
            let is_doc = ["///", "//!", "/**", "/*!"]
                .iter()
                .any(|marker| text.starts_with(marker));
            b.push_comment(node, is_doc);
            return Descend::Skip;
        }
        "call_expression" => {
            if let Some(function) = node.child_by_field_name("function") {
                b.push_call(node, function);
            }
        }
        "macro_invocation" => {
            if let Some(name) = node.child_by_field_name("macro") {
                b.push_call(node, name);
            }
        }
        "if_expression" => b.push_control_flow("if", node),
        "for_expression" | "while_expression" | "loop_expression" => {
            b.push_control_flow("loop", node)
        }
        "match_arm" => b.push_control_flow("match_arm", node),
        "string_literal" | "raw_string_literal" => {
            b.push_literal(node);
            return Descend::Skip;
        }
        _ => {}
    }

    if is_public_item(node) {
        if let Some(name) = b.field_text(node, "name") {
            b.exports.push(ExportInfo {
                name,
                snippet: b.snippet(node),
                location: location(node),
            });
        }
    }

    Descend::Children
}

fn is_branch(kind: &str) -> bool {
    matches!(
        kind,
        "if_expression"
            | "for_expression"
            | "while_expression"
            | "loop_expression"
            | "match_arm"
            | "try_expression"
    )
}

fn has_child(node: Node, kind: &str) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|c| c.kind() == kind);
    found
}

/// `pub` items declared at file or inline-module scope.
fn is_public_item(node: Node) -> bool {
    const ITEMS: &[&str] = &[
        "function_item",
        "struct_item",
        "enum_item",
        "trait_item",
        "type_item",
        "const_item",
        "static_item",
        "mod_item",
    ];
    if !ITEMS.contains(&node.kind()) || !has_child(node, "visibility_modifier") {
        return false;
    }
    match node.parent() {
        Some(parent) if parent.kind() == "source_file" => true,
        Some(parent) if parent.kind() == "declaration_list" => parent
            .parent()
            .map(|owner| owner.kind() == "mod_item")
            .unwrap_or(false),
        _ => false,
    }
}

fn push_function(node: Node, b: &mut ArtifactBuilder) {
    let Some(name) = b.field_text(node, "name") else {
        return;
    };

    let mut parameters = Vec::new();
    if let Some(params) = node.child_by_field_name("parameters") {
        let mut cursor = params.walk();
        for param in params.named_children(&mut cursor) {
            match param.kind() {
                "self_parameter" => parameters.push("self".to_string()),
                "parameter" => {
                    if let Some(pattern) = b.field_text(param, "pattern") {
                        parameters.push(pattern);
                    }
                }
                _ => {}
            }
        }
    }

    let is_async = {
        let mut cursor = node.walk();
        let found = node
            .children(&mut cursor)
            .any(|c| c.kind() == "function_modifiers" && b.text(c).contains("async"));
        found
    };

    b.functions.push(FunctionInfo {
        name,
        snippet: b.snippet(node),
        location: location(node),
        parameters,
        is_async,
        complexity: cyclomatic_complexity(node, is_branch),
    });
}

fn push_class(node: Node, kind: ClassKind, b: &mut ArtifactBuilder) {
    let Some(name) = b.field_text(node, "name") else {
        return;
    };

    let mut methods = Vec::new();
    if kind == ClassKind::Trait {
        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for member in body.named_children(&mut cursor) {
                if matches!(member.kind(), "function_item" | "function_signature_item") {
                    if let Some(method) = b.field_text(member, "name") {
                        methods.push(method);
                    }
                }
            }
        }
    }

    b.classes.push(ClassInfo {
        name,
        kind,
        snippet: b.snippet(node),
        location: location(node),
        methods,
    });
}

fn impl_methods(node: Node, b: &ArtifactBuilder) -> Option<(String, Vec<String>)> {
    let type_node = node.child_by_field_name("type")?;
    // `impl<T> Store<T>` is recorded against `Store`
    let type_name = match type_node.kind() {
        "generic_type" => b.field_text(type_node, "type")?,
        _ => b.text(type_node),
    };

    let body = node.child_by_field_name("body")?;
    let mut cursor = body.walk();
    let methods = body
        .named_children(&mut cursor)
        .filter(|member| member.kind() == "function_item")
        .filter_map(|member| b.field_text(member, "name"))
        .collect();
    Some((type_name, methods))
}

/// `use std::sync::{Arc, Mutex};` becomes source `std::sync` with two specifiers.
fn visit_use(node: Node, b: &mut ArtifactBuilder) {
    let Some(argument) = b.field_text(node, "argument") else {
        return;
    };
    let argument: String = argument.split_whitespace().collect::<Vec<_>>().join(" ");

    let (source, specifiers) = match argument.split_once("::{") {
        Some((prefix, list)) => (
            prefix.to_string(),
            list.trim_end_matches('}')
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        ),
        None => match argument.rsplit_once("::") {
            Some((prefix, last)) => {
                let last = last.split(" as ").last().unwrap_or(last).trim();
                (prefix.to_string(), vec![last.to_string()])
            }
            None => (argument.clone(), vec![argument.clone()]),
        },
    };

    b.imports.push(ImportInfo {
        source,
        specifiers,
        snippet: b.snippet(node),
        location: location(node),
    });
}

#[cfg(test)]
mod tests {
    use crate::extract::{ClassKind, Extractor};

    const STORE_RS: &str = r#"//! Session storage.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use serde::Serialize;

pub const DEFAULT_TTL: u64 = 3600;
static COUNTER: u32 = 0;

/// A stored session.
#[derive(Serialize)]
pub struct Session {
    pub user_id: String,
}

pub enum Backend {
    Memory,
    Redis(String),
}

pub trait SessionStore {
    fn load(&self, id: &str) -> Option<Session>;
}

impl Session {
    pub fn new(user_id: String) -> Self {
        Self { user_id }
    }

    pub async fn refresh(&mut self, ttl: u64) -> bool {
        if ttl == 0 {
            return false;
        }
        for _ in 0..3 {
            println!("refreshing");
        }
        match self.user_id.len() {
            0 => false,
            _ => true,
        }
    }
}

fn private_helper() {}
"#;

    fn artifact() -> crate::extract::AstArtifact {
        Extractor::new().unwrap().extract("src/session.rs", STORE_RS)
    }

    #[test]
    fn test_extracts_functions() {
        let artifact = artifact();
        assert!(artifact.parse_success);

        let refresh = artifact.functions.iter().find(|f| f.name == "refresh").unwrap();
        assert!(refresh.is_async);
        assert_eq!(refresh.parameters, vec!["self", "ttl"]);
        // if + for + two match arms
        assert_eq!(refresh.complexity, 5);

        let new = artifact.functions.iter().find(|f| f.name == "new").unwrap();
        assert!(!new.is_async);
        assert_eq!(new.parameters, vec!["user_id"]);
    }

    #[test]
    fn test_extracts_types_with_impl_methods() {
        let artifact = artifact();

        let session = artifact.classes.iter().find(|c| c.name == "Session").unwrap();
        assert_eq!(session.kind, ClassKind::Struct);
        assert_eq!(session.methods, vec!["new", "refresh"]);

        let backend = artifact.classes.iter().find(|c| c.name == "Backend").unwrap();
        assert_eq!(backend.kind, ClassKind::Enum);

        let store = artifact.classes.iter().find(|c| c.name == "SessionStore").unwrap();
        assert_eq!(store.kind, ClassKind::Trait);
        assert_eq!(store.methods, vec!["load"]);
    }

    #[test]
    fn test_extracts_use_declarations() {
        let artifact = artifact();

        let sync = artifact
            .imports
            .iter()
            .find(|i| i.source == "std::sync")
            .unwrap();
        assert_eq!(sync.specifiers, vec!["Arc", "Mutex"]);
        assert_eq!(artifact.dependencies, vec!["std", "serde"]);
    }

    #[test]
    fn test_exports_are_top_level_pub_items() {
        let artifact = artifact();
        let exports: Vec<&str> = artifact.exports.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            exports,
            vec!["DEFAULT_TTL", "Session", "Backend", "SessionStore"]
        );
    }

    #[test]
    fn test_variables_and_comments() {
        let artifact = artifact();
        let variables: Vec<(&str, &str)> = artifact
            .variables
            .iter()
            .map(|v| (v.name.as_str(), v.kind.as_str()))
            .collect();
        assert_eq!(variables, vec![("DEFAULT_TTL", "const"), ("COUNTER", "static")]);

        assert_eq!(artifact.comments.len(), 2);
        assert!(artifact.comments.iter().all(|c| c.is_doc));
    }

    #[test]
    fn test_calls_include_macros() {
        let artifact = artifact();
        assert!(artifact.calls.iter().any(|c| c.callee == "println"));
    }

    #[test]
    fn test_string_literals() {
        let source = "fn greet() -> &'static str {\n    let prefix = \"hello\";\n    prefix\n}\n";
        let artifact = Extractor::new().unwrap().extract("src/greet.rs", source);
        assert_eq!(artifact.literals.len(), 1);
        assert_eq!(artifact.literals[0].value, "hello");
        assert_eq!(artifact.literals[0].location.start_line, 2);
    }
}
