//! Structural extraction: tree-sitter for supported languages, a degraded
//! artifact for everything else.
//!
//! The [`Extractor`] owns one parser per supported language and is built once
//! at startup, then shared by reference. Each language has its own typed
//! visitor (`javascript`, `python`, `rust`) that dispatches on node kind and
//! fills an [`ArtifactBuilder`].

pub mod artifact;
pub mod fallback;
mod javascript;
mod python;
mod rust;

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use thiserror::Error;
use tree_sitter::{Node, Parser, Tree};

pub use artifact::{
    AstArtifact, CallInfo, ClassInfo, ClassKind, CommentInfo, ControlFlowInfo, ExportInfo,
    FunctionInfo, ImportInfo, LiteralInfo, Location, VariableInfo,
};

/// Files larger than this skip AST parsing entirely.
const MAX_FILE_SIZE: usize = 500 * 1024; // 500 KB

/// If more than this fraction of AST nodes are error nodes, fall back.
const ERROR_THRESHOLD: f64 = 0.30;

/// Longest snippet kept per element.
const SNIPPET_CHARS: usize = 240;

/// Longest string literal kept.
const LITERAL_CHARS: usize = 120;

/// Trees nested deeper than this are generated or hostile input; they get the
/// degraded artifact.
const MAX_NESTING_DEPTH: usize = 1024;

/// Languages with tree-sitter support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Rust,
    JavaScript,
    TypeScript,
    Tsx,
    Python,
}

impl Language {
    pub const SUPPORTED: [Language; 5] = [
        Language::Rust,
        Language::JavaScript,
        Language::TypeScript,
        Language::Tsx,
        Language::Python,
    ];

    /// Map a language label (as produced by [`detect_language`]) to a parser.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_lowercase().as_str() {
            "rust" | "rs" => Some(Language::Rust),
            "javascript" | "js" | "jsx" => Some(Language::JavaScript),
            "typescript" | "ts" => Some(Language::TypeScript),
            "tsx" => Some(Language::Tsx),
            "python" | "py" => Some(Language::Python),
            _ => None,
        }
    }

    pub fn tree_sitter_language(&self) -> tree_sitter::Language {
        match self {
            Language::Rust => tree_sitter_rust::LANGUAGE.into(),
            Language::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Language::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Language::Python => tree_sitter_python::LANGUAGE.into(),
        }
    }
}

/// Detect a language label from a file path's extension.
pub fn detect_language(path: &str) -> String {
    let name = path.rsplit('/').next().unwrap_or(path);
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "rs" => "rust",
        "py" | "pyi" => "python",
        "js" | "mjs" | "cjs" => "javascript",
        "jsx" => "jsx",
        "ts" | "mts" | "cts" => "typescript",
        "tsx" => "tsx",
        "go" => "go",
        "java" => "java",
        "c" => "c",
        "cpp" | "cc" | "h" | "hpp" => "cpp",
        "cs" => "csharp",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "kt" | "kts" => "kotlin",
        "scala" => "scala",
        "vue" => "vue",
        "svelte" => "svelte",
        "sh" | "bash" | "zsh" => "shell",
        "sql" => "sql",
        "html" => "html",
        "css" | "scss" | "less" => "css",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "md" | "rst" | "txt" => "text",
        "graphql" | "gql" => "graphql",
        "prisma" => "prisma",
        _ => "text",
    }
    .to_string()
}

/// Whether a language label denotes program source (as opposed to config, docs or data).
pub fn is_code_language(label: &str) -> bool {
    matches!(
        label,
        "rust"
            | "python"
            | "javascript"
            | "jsx"
            | "typescript"
            | "tsx"
            | "go"
            | "java"
            | "c"
            | "cpp"
            | "csharp"
            | "ruby"
            | "php"
            | "swift"
            | "kotlin"
            | "scala"
            | "vue"
            | "svelte"
            | "shell"
            | "sql"
    )
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("no parser for language '{0}'")]
    Unsupported(String),
    #[error("file too large for AST parsing ({0} bytes)")]
    TooLarge(usize),
    #[error("parser produced no tree")]
    NoTree,
    #[error("AST error rate {0:.0}% exceeds threshold")]
    ErrorRate(f64),
    #[error("AST nesting depth {0} exceeds the limit")]
    TooDeep(usize),
}

/// One initialized parser per supported language.
pub struct ParserSet {
    parsers: HashMap<Language, Mutex<Parser>>,
}

impl ParserSet {
    pub fn new() -> anyhow::Result<Self> {
        let mut parsers = HashMap::new();
        for language in Language::SUPPORTED {
            let mut parser = Parser::new();
            parser
                .set_language(&language.tree_sitter_language())
                .map_err(|e| anyhow::anyhow!("Failed to load {language:?} grammar: {e}"))?;
            parsers.insert(language, Mutex::new(parser));
        }
        Ok(Self { parsers })
    }

    fn parse(&self, language: Language, content: &str) -> Option<Tree> {
        let mut parser = self.parsers.get(&language)?.lock();
        parser.parse(content, None)
    }
}

/// Turns file contents into [`AstArtifact`]s.
pub struct Extractor {
    parsers: ParserSet,
}

impl Extractor {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            parsers: ParserSet::new()?,
        })
    }

    /// Extract one file. Never fails: anything that cannot be parsed yields the
    /// degraded artifact with `parse_success == false`.
    pub fn extract(&self, path: &str, content: &str) -> AstArtifact {
        let language = detect_language(path);
        match self.try_extract(path, content, &language) {
            Ok(artifact) => artifact,
            Err(ExtractError::Unsupported(_)) => fallback::degraded_artifact(path, &language, content),
            Err(e) => {
                tracing::warn!("AST extraction failed for {path}: {e}; using degraded artifact");
                fallback::degraded_artifact(path, &language, content)
            }
        }
    }

    pub fn extract_all<'a, I>(&self, files: I) -> Vec<AstArtifact>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        files
            .into_iter()
            .map(|(path, content)| self.extract(path, content))
            .collect()
    }

    fn try_extract(
        &self,
        path: &str,
        content: &str,
        label: &str,
    ) -> Result<AstArtifact, ExtractError> {
        let language =
            Language::from_label(label).ok_or_else(|| ExtractError::Unsupported(label.to_string()))?;
        if content.len() > MAX_FILE_SIZE {
            return Err(ExtractError::TooLarge(content.len()));
        }

        let tree = self
            .parsers
            .parse(language, content)
            .ok_or(ExtractError::NoTree)?;
        let root = tree.root_node();

        let stats = TreeStats::collect(root);
        if stats.depth > MAX_NESTING_DEPTH {
            return Err(ExtractError::TooDeep(stats.depth));
        }
        let error_rate = stats.errors as f64 / stats.nodes as f64;
        if error_rate > ERROR_THRESHOLD {
            return Err(ExtractError::ErrorRate(error_rate * 100.0));
        }

        let mut builder = ArtifactBuilder::new(content.as_bytes());
        match language {
            Language::Rust => rust::visit(root, &mut builder),
            Language::JavaScript | Language::TypeScript | Language::Tsx => {
                javascript::visit(root, &mut builder)
            }
            Language::Python => python::visit(root, &mut builder),
        }

        Ok(builder.finish(path, label, content.len(), language))
    }
}

/// Collects elements while a visitor walks a tree. Holds the source bytes the
/// nodes point into; nothing from the tree outlives [`ArtifactBuilder::finish`].
pub(crate) struct ArtifactBuilder<'s> {
    pub source: &'s [u8],
    pub functions: Vec<FunctionInfo>,
    pub classes: Vec<ClassInfo>,
    pub imports: Vec<ImportInfo>,
    pub exports: Vec<ExportInfo>,
    pub variables: Vec<VariableInfo>,
    pub comments: Vec<CommentInfo>,
    pub calls: Vec<CallInfo>,
    pub control_flow: Vec<ControlFlowInfo>,
    pub literals: Vec<LiteralInfo>,
}

impl<'s> ArtifactBuilder<'s> {
    pub fn new(source: &'s [u8]) -> Self {
        Self {
            source,
            functions: Vec::new(),
            classes: Vec::new(),
            imports: Vec::new(),
            exports: Vec::new(),
            variables: Vec::new(),
            comments: Vec::new(),
            calls: Vec::new(),
            control_flow: Vec::new(),
            literals: Vec::new(),
        }
    }

    pub fn text(&self, node: Node) -> String {
        node.utf8_text(self.source).unwrap_or_default().to_string()
    }

    pub fn field_text(&self, node: Node, field: &str) -> Option<String> {
        node.child_by_field_name(field).map(|n| self.text(n))
    }

    /// First few lines of a node, trimmed to a bounded length.
    pub fn snippet(&self, node: Node) -> String {
        let text = node.utf8_text(self.source).unwrap_or_default();
        let head: Vec<&str> = text.lines().take(3).collect();
        let joined = head.join("\n");
        crate::llm::truncate_chars(&joined, SNIPPET_CHARS).to_string()
    }

    pub fn push_control_flow(&mut self, kind: &str, node: Node) {
        self.control_flow.push(ControlFlowInfo {
            kind: kind.to_string(),
            location: location(node),
        });
    }

    pub fn push_call(&mut self, call: Node, callee: Node) {
        let text = self.text(callee);
        let callee = crate::llm::truncate_chars(&text, 80).to_string();
        if !callee.is_empty() {
            self.calls.push(CallInfo {
                callee,
                location: location(call),
            });
        }
    }

    pub fn push_literal(&mut self, node: Node) {
        let text = self.text(node);
        let value = text.trim_matches(|c| c == '"' || c == '\'' || c == '`');
        if value.is_empty() {
            return;
        }
        self.literals.push(LiteralInfo {
            value: crate::llm::truncate_chars(value, LITERAL_CHARS).to_string(),
            location: location(node),
        });
    }

    pub fn push_comment(&mut self, node: Node, is_doc: bool) {
        self.comments.push(CommentInfo {
            text: self.text(node).trim().to_string(),
            is_doc,
            location: location(node),
        });
    }

    fn finish(self, path: &str, label: &str, size: usize, language: Language) -> AstArtifact {
        let mut seen = HashSet::new();
        let dependencies = self
            .imports
            .iter()
            .map(|i| dependency_name(language, &i.source))
            .filter(|d| !d.is_empty() && seen.insert(d.clone()))
            .collect();

        AstArtifact {
            path: path.to_string(),
            language: label.to_string(),
            size,
            parse_success: true,
            functions: self.functions,
            classes: self.classes,
            imports: self.imports,
            exports: self.exports,
            variables: self.variables,
            comments: self.comments,
            calls: self.calls,
            control_flow: self.control_flow,
            literals: self.literals,
            dependencies,
        }
    }
}

/// The dependency an import refers to: the crate root for Rust paths, the
/// specifier as written everywhere else.
fn dependency_name(language: Language, source: &str) -> String {
    match language {
        Language::Rust => {
            let root = source.split("::").next().unwrap_or(source).trim();
            // crate-local paths are not dependencies
            match root {
                "crate" | "self" | "super" => String::new(),
                _ => root.to_string(),
            }
        }
        _ => source.trim().to_string(),
    }
}

pub(crate) fn location(node: Node) -> Location {
    Location {
        start_line: node.start_position().row + 1,
        end_line: node.end_position().row + 1,
    }
}

/// What a visitor wants after seeing a node.
pub(crate) enum Descend {
    Children,
    Skip,
}

/// Pre-order walk over named nodes with an explicit stack, so nesting depth
/// never turns into call depth.
pub(crate) fn walk_named<'t>(root: Node<'t>, mut visit: impl FnMut(Node<'t>) -> Descend) {
    let mut stack = vec![root];
    let mut children = Vec::new();
    while let Some(node) = stack.pop() {
        if let Descend::Skip = visit(node) {
            continue;
        }
        let mut cursor = node.walk();
        children.extend(node.named_children(&mut cursor));
        stack.extend(children.drain(..).rev());
    }
}

/// 1 + the number of nodes in `node`'s subtree for which `is_branch` holds.
pub(crate) fn cyclomatic_complexity(node: Node, is_branch: fn(&str) -> bool) -> u32 {
    let mut branches = 0;
    walk_named(node, |n| {
        branches += u32::from(is_branch(n.kind()));
        Descend::Children
    });
    1 + branches
}

/// Node count, error-node count and maximum depth of a tree.
struct TreeStats {
    nodes: usize,
    errors: usize,
    depth: usize,
}

impl TreeStats {
    fn collect(root: Node) -> Self {
        let mut stats = TreeStats {
            nodes: 0,
            errors: 0,
            depth: 0,
        };
        let mut cursor = root.walk();
        let mut depth = 0usize;
        loop {
            let node = cursor.node();
            stats.nodes += 1;
            stats.errors += usize::from(node.is_error());
            stats.depth = stats.depth.max(depth);

            if cursor.goto_first_child() {
                depth += 1;
                continue;
            }
            loop {
                if depth == 0 {
                    return stats;
                }
                if cursor.goto_next_sibling() {
                    break;
                }
                cursor.goto_parent();
                depth -= 1;
            }
        }
    }
}
