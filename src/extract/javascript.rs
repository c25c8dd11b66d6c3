//! Visitor for JavaScript, TypeScript and TSX trees.

use tree_sitter::Node;

use super::{
    cyclomatic_complexity, location, walk_named, ArtifactBuilder, ClassInfo, ClassKind, Descend,
    ExportInfo, FunctionInfo, ImportInfo, VariableInfo,
};

pub(super) fn visit(root: Node, b: &mut ArtifactBuilder) {
    walk_named(root, |node| visit_node(node, b));
}

fn visit_node(node: Node, b: &mut ArtifactBuilder) -> Descend {
    match node.kind() {
        "function_declaration" | "generator_function_declaration" | "method_definition" => {
            if let Some(name) = b.field_text(node, "name") {
                push_function(node, name, node, b);
            }
        }
        "variable_declarator" => visit_declarator(node, b),
        "class_declaration" | "abstract_class_declaration" => {
            push_class(node, ClassKind::Class, b)
        }
        "interface_declaration" => push_class(node, ClassKind::Interface, b),
        "type_alias_declaration" => push_class(node, ClassKind::TypeAlias, b),
        "enum_declaration" => push_class(node, ClassKind::Enum, b),
        "import_statement" => {
            visit_import(node, b);
            return Descend::Skip;
        }
        "export_statement" => visit_export(node, b),
        "comment" => {
            let is_doc = b.text(node).starts_with("/**");
            b.push_comment(node, is_doc);
            return Descend::Skip;
        }
        "call_expression" => visit_call(node, b),
        "new_expression" => {
            if let Some(constructor) = node.child_by_field_name("constructor") {
                b.push_call(node, constructor);
            }
        }
        "if_statement" => b.push_control_flow("if", node),
        "for_statement" | "for_in_statement" | "while_statement" | "do_statement" => {
            b.push_control_flow("loop", node)
        }
        "switch_case" => b.push_control_flow("switch_case", node),
        "catch_clause" => b.push_control_flow("catch", node),
        "ternary_expression" => b.push_control_flow("ternary", node),
        "string" | "template_string" => {
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
            | "for_statement"
            | "for_in_statement"
            | "while_statement"
            | "do_statement"
            | "switch_case"
            | "catch_clause"
            | "ternary_expression"
    )
}

/// `const login = async () => {}` is a function; `const MAX = 3` at module
/// scope is a variable.
fn visit_declarator(node: Node, b: &mut ArtifactBuilder) {
    let Some(name) = b.field_text(node, "name") else {
        return;
    };
    let value = node.child_by_field_name("value");
    match value.map(|v| v.kind()) {
        Some("arrow_function" | "function_expression" | "function" | "generator_function") => {
            if let Some(value) = value {
                push_function(node, name, value, b);
            }
        }
        _ => {
            let Some(declaration) = node.parent() else {
                return;
            };
            if !is_module_scope(declaration) {
                return;
            }
            let kind = match declaration.kind() {
                "variable_declaration" => "var".to_string(),
                _ => declaration
                    .child(0)
                    .map(|keyword| b.text(keyword))
                    .unwrap_or_else(|| "let".to_string()),
            };
            b.variables.push(VariableInfo {
                name,
                kind,
                snippet: b.snippet(node),
                location: location(node),
            });
        }
    }
}

fn is_module_scope(declaration: Node) -> bool {
    match declaration.parent() {
        Some(parent) if parent.kind() == "program" => true,
        Some(parent) if parent.kind() == "export_statement" => parent
            .parent()
            .map(|grand| grand.kind() == "program")
            .unwrap_or(false),
        _ => false,
    }
}

/// `outer` spans the whole definition for snippets and locations; `function`
/// is the node carrying the parameters and body.
fn push_function(outer: Node, name: String, function: Node, b: &mut ArtifactBuilder) {
    let parameters = match function.child_by_field_name("parameters") {
        Some(params) => {
            let mut cursor = params.walk();
            params
                .named_children(&mut cursor)
                .filter(|p| p.kind() != "comment")
                .map(|p| parameter_name(p, b))
                .collect()
        }
        // `x => x * 2`
        None => b
            .field_text(function, "parameter")
            .map(|p| vec![p])
            .unwrap_or_default(),
    };

    b.functions.push(FunctionInfo {
        name,
        snippet: b.snippet(outer),
        location: location(outer),
        parameters,
        is_async: has_token(function, "async"),
        complexity: cyclomatic_complexity(function, is_branch),
    });
}

fn parameter_name(param: Node, b: &ArtifactBuilder) -> String {
    // TypeScript wraps parameters as required_parameter / optional_parameter
    match param.child_by_field_name("pattern") {
        Some(pattern) => b.text(pattern),
        None => b.text(param),
    }
}

fn push_class(node: Node, kind: ClassKind, b: &mut ArtifactBuilder) {
    let Some(name) = b.field_text(node, "name") else {
        return;
    };

    let mut methods = Vec::new();
    if let Some(body) = node.child_by_field_name("body") {
        let mut cursor = body.walk();
        for member in body.named_children(&mut cursor) {
            if matches!(
                member.kind(),
                "method_definition" | "method_signature" | "abstract_method_signature"
            ) {
                if let Some(method) = b.field_text(member, "name") {
                    methods.push(method);
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

fn visit_import(node: Node, b: &mut ArtifactBuilder) {
    let Some(source) = b.field_text(node, "source") else {
        return;
    };

    let mut specifiers = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() == "import_clause" {
            collect_import_names(child, b, &mut specifiers);
        }
    }

    b.imports.push(ImportInfo {
        source: unquote(&source),
        specifiers,
        snippet: b.snippet(node),
        location: location(node),
    });
}

fn collect_import_names(node: Node, b: &ArtifactBuilder, out: &mut Vec<String>) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "identifier" => out.push(b.text(child)),
            "import_specifier" => {
                if let Some(name) = b.field_text(child, "name") {
                    out.push(name);
                }
            }
            "named_imports" | "namespace_import" => collect_import_names(child, b, out),
            _ => {}
        }
    }
}

fn visit_export(node: Node, b: &mut ArtifactBuilder) {
    let mut names = Vec::new();

    if let Some(declaration) = node.child_by_field_name("declaration") {
        match b.field_text(declaration, "name") {
            Some(name) => names.push(name),
            None => {
                // export const a = 1, b = 2;
                let mut cursor = declaration.walk();
                for declarator in declaration.named_children(&mut cursor) {
                    if let Some(name) = b.field_text(declarator, "name") {
                        names.push(name);
                    }
                }
            }
        }
    } else {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.kind() == "export_clause" {
                let mut inner = child.walk();
                for specifier in child.named_children(&mut inner) {
                    let name = specifier
                        .child_by_field_name("alias")
                        .or_else(|| specifier.child_by_field_name("name"))
                        .map(|n| b.text(n));
                    if let Some(name) = name {
                        names.push(name);
                    }
                }
            }
        }
    }

    if names.is_empty() && has_token(node, "default") {
        names.push("default".to_string());
    }

    for name in names {
        b.exports.push(ExportInfo {
            name,
            snippet: b.snippet(node),
            location: location(node),
        });
    }
}

/// `require("x")` and `import("x")` count as imports as well as calls.
fn visit_call(node: Node, b: &mut ArtifactBuilder) {
    let Some(function) = node.child_by_field_name("function") else {
        return;
    };
    b.push_call(node, function);

    let callee = b.text(function);
    if callee != "require" && function.kind() != "import" {
        return;
    }
    let source = node
        .child_by_field_name("arguments")
        .and_then(|args| args.named_child(0))
        .filter(|arg| arg.kind() == "string")
        .map(|arg| unquote(&b.text(arg)));
    if let Some(source) = source {
        b.imports.push(ImportInfo {
            source,
            specifiers: Vec::new(),
            snippet: b.snippet(node),
            location: location(node),
        });
    }
}

fn has_token(node: Node, token: &str) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|c| c.kind() == token);
    found
}

fn unquote(text: &str) -> String {
    text.trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .to_string()
}

#[cfg(test)]
mod tests {
    use crate::extract::{ClassKind, Extractor};

    const AUTH_TS: &str = r#"import { signIn, useSession } from "next-auth/react";
import React from 'react';
const crypto = require("crypto");

/** Maximum login attempts before lockout. */
export const MAX_ATTEMPTS = 3;

export interface Session {
  userId: string;
  refresh(): Promise<void>;
}

export type Provider = "google" | "github";

export async function loginWithGoogle(redirect: string, remember?: boolean) {
  if (!redirect) {
    throw new Error("missing redirect");
  }
  for (const attempt of [1, 2]) {
    await signIn("google", { callbackUrl: redirect });
  }
  return remember ? "ok" : "session";
}

export class AuthClient {
  constructor(private base: string) {}
  logout() {
    return fetch(`${this.base}/logout`);
  }
}

const handler = async (req) => {
  try {
    return await loginWithGoogle(req.url);
  } catch (e) {
    return null;
  }
};
"#;

    fn extract(path: &str, content: &str) -> crate::extract::AstArtifact {
        Extractor::new().unwrap().extract(path, content)
    }

    #[test]
    fn test_extracts_functions_with_parameters() {
        let artifact = extract("src/lib/auth.ts", AUTH_TS);
        assert!(artifact.parse_success);

        let login = artifact
            .functions
            .iter()
            .find(|f| f.name == "loginWithGoogle")
            .expect("loginWithGoogle extracted");
        assert!(login.is_async);
        assert_eq!(login.parameters, vec!["redirect", "remember"]);
        // if + for + ternary
        assert_eq!(login.complexity, 4);
        assert_eq!(login.location.start_line, 15);

        let handler = artifact.functions.iter().find(|f| f.name == "handler").unwrap();
        assert!(handler.is_async);
        assert!(artifact.functions.iter().any(|f| f.name == "logout"));
    }

    #[test]
    fn test_extracts_classes_and_type_declarations() {
        let artifact = extract("src/lib/auth.ts", AUTH_TS);

        let session = artifact.classes.iter().find(|c| c.name == "Session").unwrap();
        assert_eq!(session.kind, ClassKind::Interface);
        assert_eq!(session.methods, vec!["refresh"]);

        let provider = artifact.classes.iter().find(|c| c.name == "Provider").unwrap();
        assert_eq!(provider.kind, ClassKind::TypeAlias);

        let client = artifact.classes.iter().find(|c| c.name == "AuthClient").unwrap();
        assert_eq!(client.kind, ClassKind::Class);
        assert_eq!(client.methods, vec!["constructor", "logout"]);
    }

    #[test]
    fn test_extracts_imports_and_dependencies() {
        let artifact = extract("src/lib/auth.ts", AUTH_TS);

        let next_auth = artifact
            .imports
            .iter()
            .find(|i| i.source == "next-auth/react")
            .unwrap();
        assert_eq!(next_auth.specifiers, vec!["signIn", "useSession"]);
        assert_eq!(
            artifact.dependencies,
            vec!["next-auth/react", "react", "crypto"]
        );
    }

    #[test]
    fn test_extracts_exports_variables_and_comments() {
        let artifact = extract("src/lib/auth.ts", AUTH_TS);

        let exported: Vec<&str> = artifact.exports.iter().map(|e| e.name.as_str()).collect();
        for name in ["MAX_ATTEMPTS", "Session", "Provider", "loginWithGoogle", "AuthClient"] {
            assert!(exported.contains(&name), "missing export {name}");
        }

        let max = artifact
            .variables
            .iter()
            .find(|v| v.name == "MAX_ATTEMPTS")
            .unwrap();
        assert_eq!(max.kind, "const");
        // locals inside functions are not module variables
        assert!(!artifact.variables.iter().any(|v| v.name == "attempt"));

        assert_eq!(artifact.comments.len(), 1);
        assert!(artifact.comments[0].is_doc);
    }

    #[test]
    fn test_extracts_calls_control_flow_and_literals() {
        let artifact = extract("src/lib/auth.ts", AUTH_TS);

        assert!(artifact.calls.iter().any(|c| c.callee == "signIn"));
        assert!(artifact.calls.iter().any(|c| c.callee == "Error"));
        assert!(artifact.control_flow.iter().any(|c| c.kind == "catch"));
        assert!(artifact.control_flow.iter().any(|c| c.kind == "ternary"));
        assert!(artifact.literals.iter().any(|l| l.value == "missing redirect"));
    }

    #[test]
    fn test_plain_javascript() {
        let source = "function add(a, b) { return a + b; }\nmodule.exports = { add };\n";
        let artifact = extract("lib/math.js", source);
        assert!(artifact.parse_success);
        assert_eq!(artifact.language, "javascript");
        assert_eq!(artifact.functions[0].name, "add");
        assert_eq!(artifact.functions[0].complexity, 1);
        assert!(!artifact.functions[0].is_async);
    }

    #[test]
    fn test_tsx_component() {
        let source = "export function Button({ label }: Props) {\n  return <button>{label}</button>;\n}\n";
        let artifact = extract("components/Button.tsx", source);
        assert!(artifact.parse_success);
        assert_eq!(artifact.language, "tsx");
        assert_eq!(artifact.functions[0].name, "Button");
    }
}
