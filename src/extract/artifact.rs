//! Plain-data syntax summary of one file.
//!
//! Everything here owns its data; no parser handle or node reference can be
//! stored in an artifact, so it always serializes to a tree of maps, arrays
//! and scalars.

use serde::{Deserialize, Serialize};

/// 1-based, inclusive line range
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Location {
    pub start_line: usize,
    pub end_line: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionInfo {
    pub name: String,
    pub snippet: String,
    pub location: Location,
    #[serde(default)]
    pub parameters: Vec<String>,
    #[serde(default)]
    pub is_async: bool,
    /// 1 + one per branch or loop in the function's subtree
    pub complexity: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClassKind {
    Class,
    Interface,
    TypeAlias,
    Struct,
    Enum,
    Trait,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassInfo {
    pub name: String,
    pub kind: ClassKind,
    pub snippet: String,
    pub location: Location,
    #[serde(default)]
    pub methods: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImportInfo {
    /// Module specifier as written (`next-auth/react`, `std::sync::Arc`, `os.path`)
    pub source: String,
    #[serde(default)]
    pub specifiers: Vec<String>,
    pub snippet: String,
    pub location: Location,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportInfo {
    pub name: String,
    pub snippet: String,
    pub location: Location,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VariableInfo {
    pub name: String,
    /// `const`, `let`, `var`, `static`, or `assignment`
    pub kind: String,
    pub snippet: String,
    pub location: Location,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommentInfo {
    pub text: String,
    pub is_doc: bool,
    pub location: Location,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallInfo {
    pub callee: String,
    pub location: Location,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControlFlowInfo {
    /// `if`, `loop`, `switch_case`, `catch`, `ternary`, `match_arm`
    pub kind: String,
    pub location: Location,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LiteralInfo {
    pub value: String,
    pub location: Location,
}

/// Syntax summary of one file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AstArtifact {
    pub path: String,
    pub language: String,
    /// Size of the source in bytes
    pub size: usize,
    pub parse_success: bool,
    pub functions: Vec<FunctionInfo>,
    pub classes: Vec<ClassInfo>,
    pub imports: Vec<ImportInfo>,
    pub exports: Vec<ExportInfo>,
    pub variables: Vec<VariableInfo>,
    pub comments: Vec<CommentInfo>,
    #[serde(default)]
    pub calls: Vec<CallInfo>,
    #[serde(default)]
    pub control_flow: Vec<ControlFlowInfo>,
    #[serde(default)]
    pub literals: Vec<LiteralInfo>,
    /// Unique import sources, in first-seen order
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl AstArtifact {
    pub fn element_count(&self) -> usize {
        self.functions.len()
            + self.classes.len()
            + self.imports.len()
            + self.variables.len()
            + self.comments.len()
    }
}
