use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::extract::AstArtifact;

/// A tracked source repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: Uuid,
    /// `owner/name`, as used by the source host
    pub full_name: String,
    pub owner: String,
    pub description: Option<String>,
    pub primary_language: Option<String>,
    #[serde(default)]
    pub stars: u64,
    #[serde(default)]
    pub forks: u64,
    pub created_at: DateTime<Utc>,
    pub last_analyzed_at: Option<DateTime<Utc>>,
}

impl Repository {
    pub fn new(full_name: &str) -> Self {
        let owner = full_name.split('/').next().unwrap_or_default().to_string();
        Self {
            id: Uuid::new_v4(),
            full_name: full_name.to_string(),
            owner,
            description: None,
            primary_language: None,
            stars: 0,
            forks: 0,
            created_at: Utc::now(),
            last_analyzed_at: None,
        }
    }

    /// Repository name without the owner prefix.
    pub fn name(&self) -> &str {
        self.full_name
            .split_once('/')
            .map(|(_, name)| name)
            .unwrap_or(&self.full_name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisStatus {
    InProgress,
    Completed,
    Failed,
}

/// One analysis run of a repository. Created IN_PROGRESS, updated exactly once
/// more into a terminal state, then never touched again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub id: Uuid,
    pub repository_id: Uuid,
    pub status: AnalysisStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub result: Option<AnalysisResult>,
}

impl Analysis {
    pub fn start(repository_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            repository_id,
            status: AnalysisStatus::InProgress,
            started_at: Utc::now(),
            completed_at: None,
            error_message: None,
            result: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != AnalysisStatus::InProgress
    }

    pub fn completed(mut self, result: AnalysisResult) -> Self {
        self.status = AnalysisStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.result = Some(result);
        self
    }

    pub fn failed(mut self, message: impl Into<String>) -> Self {
        self.status = AnalysisStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error_message = Some(message.into());
        self
    }
}

/// Payload of a COMPLETED analysis
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub features: FeatureSet,
    pub structure: Structure,
    pub tech_stack: TechStack,
    pub ast_artifacts: Vec<AstArtifact>,
    pub code_metrics: CodeMetrics,
    pub searchable_index: SearchableIndex,
    pub summary: String,
    pub complexity: Complexity,
    /// Stages that fell back to their default value
    #[serde(default)]
    pub degraded_stages: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Feature {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeatureSet {
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DirectoryRole {
    pub path: String,
    pub purpose: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Structure {
    pub architecture: String,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub directories: Vec<DirectoryRole>,
    #[serde(default)]
    pub entry_points: Vec<String>,
}

impl Default for Structure {
    fn default() -> Self {
        Self {
            architecture: "unknown".to_string(),
            patterns: Vec::new(),
            directories: Vec::new(),
            entry_points: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TechStack {
    pub languages: Vec<String>,
    #[serde(default)]
    pub frameworks: Vec<String>,
    #[serde(default)]
    pub libraries: Vec<String>,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub databases: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    #[default]
    Low,
    Medium,
    High,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Low => "low",
            Complexity::Medium => "medium",
            Complexity::High => "high",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CodeMetrics {
    pub lines_of_code: usize,
    pub file_count: usize,
    pub complexity: Complexity,
    pub maintainability: f64,
    /// Number of code files per detected language
    #[serde(default)]
    pub languages: BTreeMap<String, usize>,
}

/// Flattened keyword projection of an analysis, searchable without AST artifacts
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchableIndex {
    pub keywords: Vec<String>,
    pub directories: Vec<String>,
    pub file_types: Vec<String>,
}

// ─── Search request/response types ───────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub frameworks: Vec<String>,
    pub complexity: Option<Complexity>,
}

/// Search request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryContext {
    pub query: String,
    /// Restrict the search to these repositories
    pub repository_ids: Option<Vec<Uuid>>,
    #[serde(default)]
    pub filters: SearchFilters,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    CodeSearch,
    CasualConversation,
    HelpRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntentResult {
    pub intent: Intent,
    /// 0-100
    pub confidence: u8,
    pub reasoning: String,
    pub suggested_response: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchPatternSet {
    pub search_terms: Vec<String>,
    #[serde(default)]
    pub file_patterns: Vec<String>,
    #[serde(default)]
    pub code_patterns: Vec<String>,
    #[serde(default)]
    pub framework_hints: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Function,
    Class,
    Interface,
    Variable,
    Import,
    Comment,
    General,
}

/// One scored element of a file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Match {
    #[serde(rename = "type")]
    pub match_type: MatchType,
    pub name: String,
    pub snippet: String,
    pub line_start: usize,
    pub line_end: usize,
    /// 0-100
    pub score: u32,
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepositoryRef {
    pub id: Uuid,
    pub full_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileRef {
    pub path: String,
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub repository: RepositoryRef,
    pub file: FileRef,
    pub matches: Vec<Match>,
    pub overall_score: f64,
    /// Explanation from the model re-score, when it ran
    pub explanation: Option<String>,
}

// ─── Streaming events ────────────────────────────────────

/// Event emitted by the analysis pipeline. Every stream ends with exactly one
/// of `Complete`, `Failed` or `InProgress`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalysisEvent {
    Progress {
        step_index: usize,
        total_steps: usize,
        message: String,
        /// The stage fell back to its default value
        degraded: bool,
    },
    Complete {
        analysis_id: Uuid,
        status: AnalysisStatus,
    },
    Failed {
        analysis_id: Option<Uuid>,
        status: AnalysisStatus,
        error: String,
    },
    /// Another analysis of this repository is still running
    InProgress { analysis_id: Uuid },
}

impl AnalysisEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AnalysisEvent::Progress { .. } => "progress",
            AnalysisEvent::Complete { .. } => "complete",
            AnalysisEvent::Failed { .. } => "failed",
            AnalysisEvent::InProgress { .. } => "in_progress",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, AnalysisEvent::Progress { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchEvent {
    Progress {
        stage: String,
        message: String,
    },
    Complete {
        intent: Intent,
        results: Vec<SearchResult>,
        summary: String,
    },
    Failed {
        error: String,
        query: String,
    },
}

impl SearchEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SearchEvent::Progress { .. } => "progress",
            SearchEvent::Complete { .. } => "complete",
            SearchEvent::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SearchEvent::Progress { .. })
    }
}

/// Create-or-update repository request
#[derive(Debug, Clone, Deserialize)]
pub struct SaveRepositoryRequest {
    pub full_name: String,
    pub description: Option<String>,
    pub primary_language: Option<String>,
    #[serde(default)]
    pub stars: u64,
    #[serde(default)]
    pub forks: u64,
}
