//! Visitor for Python trees.

use tree_sitter::Node;

use super::{
    cyclomatic_complexity, location, walk_named, ArtifactBuilder, ClassInfo, ClassKind, Descend,
    ExportInfo, FunctionInfo, ImportInfo, VariableInfo,
};

pub(super) fn visit(root: Node, b: &mut ArtifactBuilder) {
    walk_named(root, |node| visit_node(node, b));

    let top_level = top_level_lines(root);
    // Python has no export syntax; `__all__` aside, public module-level
    // definitions are what other modules import.
    let public: Vec<ExportInfo> = b
        .functions
        .iter()
        .filter(|f| !f.name.starts_with('_'))
        .map(|f| (f.name.clone(), f.snippet.clone(), f.location))
        .chain(
            b.classes
                .iter()
                .filter(|c| !c.name.starts_with('_'))
                .map(|c| (c.name.clone(), c.snippet.clone(), c.location)),
        )
        .filter(|(_, _, loc)| top_level.contains(&loc.start_line))
        .map(|(name, snippet, location)| ExportInfo {
            name,
            snippet,
            location,
        })
        .collect();
    b.exports.extend(public);
}

/// Start lines (1-based) of definitions directly under the module.
fn top_level_lines(root: Node) -> Vec<usize> {
    let mut cursor = root.walk();
    root.named_children(&mut cursor)
        .map(|child| match child.kind() {
            "decorated_definition" => child
                .child_by_field_name("definition")
                .map(|d| d.start_position().row + 1)
                .unwrap_or(0),
            _ => child.start_position().row + 1,
        })
        .collect()
}

fn visit_node(node: Node, b: &mut ArtifactBuilder) -> Descend {
    match node.kind() {
        "function_definition" => push_function(node, b),
        "class_definition" => push_class(node, b),
        "import_statement" => {
            visit_import(node, b);
            return Descend::Skip;
        }
        "import_from_statement" => {
            visit_import_from(node, b);
            return Descend::Skip;
        }
        "expression_statement" => {
            if is_docstring(node) {
                b.push_comment(node, true);
                return Descend::Skip;
            }
            visit_assignment(node, b);
        }
        "comment" => {
            b.push_comment(node, false);
            return Descend::Skip;
        }
        "call" => {
            if let Some(function) = node.child_by_field_name("function") {
                b.push_call(node, function);
            }
        }
        "if_statement" | "elif_clause" => b.push_control_flow("if", node),
        "for_statement" | "while_statement" => b.push_control_flow("loop", node),
        "except_clause" => b.push_control_flow("catch", node),
        "conditional_expression" => b.push_control_flow("ternary", node),
        "case_clause" => b.push_control_flow("match_arm", node),
        "string" => {
            b.push_literal(node);
            return Descend::Skip;
        }
        _ => {}
    }

    Descend::Children
}

fn is_branch(kind: &str) -> bool {
    matches!(
        kind,
        "if_statement"
            | "elif_clause"
            | "for_statement"
            | "while_statement"
            | "except_clause"
            | "conditional_expression"
            | "case_clause"
            | "boolean_operator"
    )
}

fn push_function(node: Node, b: &mut ArtifactBuilder) {
    let Some(name) = b.field_text(node, "name") else {
        return;
    };

    let parameters = node
        .child_by_field_name("parameters")
        .map(|params| {
            let mut cursor = params.walk();
            params
                .named_children(&mut cursor)
                .filter_map(|p| parameter_name(p, b))
                .collect()
        })
        .unwrap_or_default();

    let is_async = {
        let mut cursor = node.walk();
        let found = node.children(&mut cursor).any(|c| c.kind() == "async");
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

fn parameter_name(param: Node, b: &ArtifactBuilder) -> Option<String> {
    match param.kind() {
        "identifier" => Some(b.text(param)),
        "default_parameter" | "typed_default_parameter" => b.field_text(param, "name"),
        // typed_parameter, list_splat_pattern, dictionary_splat_pattern
        _ => {
            let mut cursor = param.walk();
            let name = param
                .named_children(&mut cursor)
                .find(|c| c.kind() == "identifier")
                .map(|c| b.text(c));
            name
        }
    }
}

fn push_class(node: Node, b: &mut ArtifactBuilder) {
    let Some(name) = b.field_text(node, "name") else {
        return;
    };

    let mut methods = Vec::new();
    if let Some(body) = node.child_by_field_name("body") {
        let mut cursor = body.walk();
        for member in body.named_children(&mut cursor) {
            let definition = match member.kind() {
                "decorated_definition" => member.child_by_field_name("definition"),
                _ => Some(member),
            };
            if let Some(definition) = definition.filter(|d| d.kind() == "function_definition") {
                if let Some(method) = b.field_text(definition, "name") {
                    methods.push(method);
                }
            }
        }
    }

    b.classes.push(ClassInfo {
        name,
        kind: ClassKind::Class,
        snippet: b.snippet(node),
        location: location(node),
        methods,
    });
}

/// `import os, numpy as np` yields one import per module.
fn visit_import(node: Node, b: &mut ArtifactBuilder) {
    let mut cursor = node.walk();
    let modules: Vec<Node> = node.children_by_field_name("name", &mut cursor).collect();
    for module in modules {
        let (source, alias) = match module.kind() {
            "aliased_import" => (
                b.field_text(module, "name").unwrap_or_default(),
                b.field_text(module, "alias"),
            ),
            _ => (b.text(module), None),
        };
        let specifier = alias.unwrap_or_else(|| source.clone());
        b.imports.push(ImportInfo {
            source,
            specifiers: vec![specifier],
            snippet: b.snippet(node),
            location: location(node),
        });
    }
}

/// `from flask import Flask, request`
fn visit_import_from(node: Node, b: &mut ArtifactBuilder) {
    let Some(source) = b.field_text(node, "module_name") else {
        return;
    };

    let mut cursor = node.walk();
    let mut specifiers: Vec<String> = node
        .children_by_field_name("name", &mut cursor)
        .map(|name| match name.kind() {
            "aliased_import" => b.field_text(name, "name").unwrap_or_default(),
            _ => b.text(name),
        })
        .collect();

    let mut cursor = node.walk();
    if node
        .named_children(&mut cursor)
        .any(|c| c.kind() == "wildcard_import")
    {
        specifiers.push("*".to_string());
    }

    b.imports.push(ImportInfo {
        source,
        specifiers,
        snippet: b.snippet(node),
        location: location(node),
    });
}

/// Module-level `NAME = value` bindings.
fn visit_assignment(statement: Node, b: &mut ArtifactBuilder) {
    let at_module = statement
        .parent()
        .map(|p| p.kind() == "module")
        .unwrap_or(false);
    if !at_module {
        return;
    }
    let Some(assignment) = statement.named_child(0).filter(|n| n.kind() == "assignment") else {
        return;
    };
    let Some(left) = assignment
        .child_by_field_name("left")
        .filter(|l| l.kind() == "identifier")
    else {
        return;
    };

    b.variables.push(VariableInfo {
        name: b.text(left),
        kind: "assignment".to_string(),
        snippet: b.snippet(statement),
        location: location(statement),
    });
}

/// A bare string as the first statement of a module, class or function body.
fn is_docstring(statement: Node) -> bool {
    statement.named_child_count() == 1
        && statement
            .named_child(0)
            .map(|c| c.kind() == "string")
            .unwrap_or(false)
        && statement.prev_named_sibling().is_none()
}
