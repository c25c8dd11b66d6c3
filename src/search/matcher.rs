//! Lexical scoring of AST artifacts against a query and its pattern set.
//!
//! Pure and synchronous; the search service runs it on the blocking pool.

use serde::Serialize;

use crate::extract::{AstArtifact, ClassKind, Location};
use crate::models::{
    Analysis, FileRef, Match, MatchType, Repository, RepositoryRef, SearchPatternSet,
    SearchableIndex,
};

const MAX_SCORE: u32 = 100;

// Per-category thresholds: an element must score strictly above these.
const FUNCTION_THRESHOLD: u32 = 20;
const CLASS_THRESHOLD: u32 = 20;
const VARIABLE_THRESHOLD: u32 = 25;
const IMPORT_THRESHOLD: u32 = 30;
const COMMENT_THRESHOLD: u32 = 15;
const INDEX_THRESHOLD: u32 = 25;

/// All matches found in one file, sorted by descending score.
#[derive(Debug, Clone, Serialize)]
pub struct FileMatches {
    pub repository: RepositoryRef,
    pub file: FileRef,
    pub matches: Vec<Match>,
    /// One-line description of the repository, for the ranker prompt
    pub context: String,
}

/// Lowercased query and patterns, prepared once per search.
#[derive(Debug, Clone)]
pub struct MatchQuery {
    query: String,
    terms: Vec<String>,
    code_patterns: Vec<String>,
    framework_hints: Vec<String>,
    /// Each file pattern split on `*` into the fragments it must contain, in order
    file_patterns: Vec<Vec<String>>,
}

impl MatchQuery {
    pub fn new(query: &str, patterns: &SearchPatternSet) -> Self {
        let lower = |items: &[String]| -> Vec<String> {
            items
                .iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        };
        Self {
            query: query.trim().to_lowercase(),
            terms: lower(&patterns.search_terms),
            code_patterns: lower(&patterns.code_patterns),
            framework_hints: lower(&patterns.framework_hints),
            file_patterns: lower(&patterns.file_patterns)
                .iter()
                .map(|pattern| {
                    pattern
                        .split('*')
                        .filter(|fragment| !fragment.is_empty())
                        .map(str::to_string)
                        .collect::<Vec<_>>()
                })
                .filter(|fragments| !fragments.is_empty())
                .collect(),
        }
    }

    /// Whether `path` fits one of the file patterns. `*` matches any run of
    /// characters; a pattern without one matches as a substring.
    pub fn path_matches(&self, path: &str) -> bool {
        let path = path.to_lowercase();
        self.file_patterns.iter().any(|fragments| {
            let mut rest = path.as_str();
            fragments.iter().all(|fragment| match rest.find(fragment.as_str()) {
                Some(at) => {
                    rest = &rest[at + fragment.len()..];
                    true
                }
                None => false,
            })
        })
    }
}

#[derive(Default)]
struct Tally {
    points: u32,
    reasons: Vec<String>,
}

impl Tally {
    fn add(&mut self, points: u32, reason: String) {
        self.points += points;
        self.reasons.push(reason);
    }

    fn score(&self) -> u32 {
        self.points.min(MAX_SCORE)
    }

    fn explanation(&self) -> String {
        self.reasons.join("; ")
    }
}

fn tally_element(name: &str, serialized: &str, q: &MatchQuery) -> Tally {
    let mut tally = Tally::default();
    if !q.query.is_empty() && name.to_lowercase().contains(&q.query) {
        tally.add(50, "name contains query".to_string());
    }
    for term in &q.terms {
        if serialized.contains(term.as_str()) {
            tally.add(30, format!("term \"{term}\""));
        }
    }
    for pattern in &q.code_patterns {
        if serialized.contains(pattern.as_str()) {
            tally.add(25, format!("code pattern \"{pattern}\""));
        }
    }
    for hint in &q.framework_hints {
        if serialized.contains(hint.as_str()) {
            tally.add(20, format!("framework \"{hint}\""));
        }
    }
    tally
}

fn tally_import(source: &str, q: &MatchQuery) -> Tally {
    let source = source.to_lowercase();
    let mut tally = Tally::default();
    if !q.query.is_empty() && source.contains(&q.query) {
        tally.add(60, "source contains query".to_string());
    }
    for hint in &q.framework_hints {
        if source.contains(hint.as_str()) {
            tally.add(40, format!("framework \"{hint}\""));
        }
    }
    for term in &q.terms {
        if source.contains(term.as_str()) {
            tally.add(35, format!("term \"{term}\""));
        }
    }
    tally
}

fn tally_comment(text: &str, is_doc: bool, q: &MatchQuery) -> Tally {
    let text = text.to_lowercase();
    let mut tally = Tally::default();
    if !q.query.is_empty() && text.contains(&q.query) {
        tally.add(40, "comment mentions query".to_string());
    }
    for term in &q.terms {
        if text.contains(term.as_str()) {
            tally.add(20, format!("term \"{term}\""));
        }
    }
    if is_doc {
        tally.add(10, "doc comment".to_string());
    }
    tally
}

/// Score a function, class or variable. `serialized` is the element's JSON
/// form, lowercased.
pub fn score_element(name: &str, serialized: &str, q: &MatchQuery) -> u32 {
    tally_element(name, serialized, q).score()
}

pub fn score_import(source: &str, q: &MatchQuery) -> u32 {
    tally_import(source, q).score()
}

pub fn score_comment(text: &str, is_doc: bool, q: &MatchQuery) -> u32 {
    tally_comment(text, is_doc, q).score()
}

fn serialized<T: Serialize>(element: &T) -> String {
    serde_json::to_string(element)
        .unwrap_or_default()
        .to_lowercase()
}

fn push_match(
    out: &mut Vec<Match>,
    tally: Tally,
    threshold: u32,
    match_type: MatchType,
    name: &str,
    snippet: &str,
    location: Location,
) {
    let score = tally.score();
    if score > threshold {
        out.push(Match {
            match_type,
            name: name.to_string(),
            snippet: snippet.to_string(),
            line_start: location.start_line,
            line_end: location.end_line,
            score,
            explanation: tally.explanation(),
        });
    }
}

/// Score every element of one artifact. Matches come back sorted by
/// descending score.
pub fn match_artifact(artifact: &AstArtifact, q: &MatchQuery) -> Vec<Match> {
    let mut matches = Vec::new();

    for function in &artifact.functions {
        let tally = tally_element(&function.name, &serialized(function), q);
        push_match(
            &mut matches,
            tally,
            FUNCTION_THRESHOLD,
            MatchType::Function,
            &function.name,
            &function.snippet,
            function.location,
        );
    }

    for class in &artifact.classes {
        let tally = tally_element(&class.name, &serialized(class), q);
        let match_type = if class.kind == ClassKind::Interface {
            MatchType::Interface
        } else {
            MatchType::Class
        };
        push_match(
            &mut matches,
            tally,
            CLASS_THRESHOLD,
            match_type,
            &class.name,
            &class.snippet,
            class.location,
        );
    }

    for variable in &artifact.variables {
        let tally = tally_element(&variable.name, &serialized(variable), q);
        push_match(
            &mut matches,
            tally,
            VARIABLE_THRESHOLD,
            MatchType::Variable,
            &variable.name,
            &variable.snippet,
            variable.location,
        );
    }

    for import in &artifact.imports {
        push_match(
            &mut matches,
            tally_import(&import.source, q),
            IMPORT_THRESHOLD,
            MatchType::Import,
            &import.source,
            &import.snippet,
            import.location,
        );
    }

    for comment in &artifact.comments {
        push_match(
            &mut matches,
            tally_comment(&comment.text, comment.is_doc, q),
            COMMENT_THRESHOLD,
            MatchType::Comment,
            "comment",
            &comment.text,
            comment.location,
        );
    }

    matches.sort_by(|a, b| b.score.cmp(&a.score));
    matches
}

/// Keyword-level matches for a repository with no parsed artifacts.
pub fn match_index(index: &SearchableIndex, q: &MatchQuery) -> Vec<Match> {
    let mut matches = Vec::new();
    let candidates = index
        .keywords
        .iter()
        .chain(index.directories.iter())
        .chain(index.file_types.iter());

    for keyword in candidates {
        let lower = keyword.to_lowercase();
        let mut tally = Tally::default();
        if !q.query.is_empty() && lower == q.query {
            tally.add(50, "keyword equals query".to_string());
        }
        for term in &q.terms {
            if lower.contains(term.as_str()) {
                tally.add(30, format!("term \"{term}\""));
            }
        }
        push_match(
            &mut matches,
            tally,
            INDEX_THRESHOLD,
            MatchType::General,
            keyword,
            keyword,
            Location::default(),
        );
    }

    matches.sort_by(|a, b| b.score.cmp(&a.score));
    matches
}

fn repository_context(repository: &Repository, analysis: &Analysis) -> String {
    let mut context = repository.full_name.clone();
    if let Some(result) = &analysis.result {
        context.push_str(&format!(", {} architecture", result.structure.architecture));
        if !result.tech_stack.languages.is_empty() {
            context.push_str(&format!(", {}", result.tech_stack.languages.join("/")));
        }
    }
    if let Some(description) = &repository.description {
        context.push_str(&format!(": {description}"));
    }
    context
}

/// Scan one repository's latest completed analysis. Falls back to the
/// searchable index when no artifact parsed.
pub fn match_repository(
    repository: &Repository,
    analysis: &Analysis,
    q: &MatchQuery,
) -> Vec<FileMatches> {
    let Some(result) = &analysis.result else {
        return Vec::new();
    };
    let repo_ref = RepositoryRef {
        id: repository.id,
        full_name: repository.full_name.clone(),
    };
    let context = repository_context(repository, analysis);

    let parsed: Vec<&AstArtifact> = result
        .ast_artifacts
        .iter()
        .filter(|a| a.parse_success)
        .collect();

    if parsed.is_empty() {
        let matches = match_index(&result.searchable_index, q);
        if matches.is_empty() {
            return Vec::new();
        }
        return vec![FileMatches {
            repository: repo_ref,
            file: FileRef {
                path: ".".to_string(),
                language: "index".to_string(),
            },
            matches,
            context,
        }];
    }

    parsed
        .into_iter()
        .filter_map(|artifact| {
            let matches = match_artifact(artifact, q);
            if matches.is_empty() {
                return None;
            }
            Some(FileMatches {
                repository: repo_ref.clone(),
                file: FileRef {
                    path: artifact.path.clone(),
                    language: artifact.language.clone(),
                },
                matches,
                context: context.clone(),
            })
        })
        .collect()
}

/// Scan every candidate repository. Files whose path fits a file pattern
/// come first; ranking sorts stably, so this breaks ties between equal scores.
pub fn match_candidates(
    candidates: &[(Repository, Analysis)],
    q: &MatchQuery,
) -> Vec<FileMatches> {
    let mut files: Vec<FileMatches> = candidates
        .iter()
        .flat_map(|(repository, analysis)| match_repository(repository, analysis, q))
        .collect();
    files.sort_by_key(|file| !q.path_matches(&file.file.path));
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{CommentInfo, FunctionInfo, ImportInfo};
    use crate::models::AnalysisResult;

    fn patterns(terms: &[&str]) -> SearchPatternSet {
        SearchPatternSet {
            search_terms: terms.iter().map(|s| s.to_string()).collect(),
            ..SearchPatternSet::default()
        }
    }

    fn login_function() -> FunctionInfo {
        FunctionInfo {
            name: "loginWithGoogle".into(),
            snippet: "export async function loginWithGoogle() {\n  // next-auth session\n"
                .into(),
            location: Location {
                start_line: 4,
                end_line: 12,
            },
            parameters: vec![],
            is_async: true,
            complexity: 1,
        }
    }

    #[test]
    fn test_two_term_hits_score_sixty() {
        let q = MatchQuery::new("next-auth", &patterns(&["next-auth", "session"]));
        let f = login_function();
        assert_eq!(score_element(&f.name, &serialized(&f), &q), 60);
    }

    #[test]
    fn test_name_match_and_cap() {
        let mut set = patterns(&["login", "google", "async"]);
        set.code_patterns = vec!["loginWithGoogle(".into()];
        let q = MatchQuery::new("login", &set);
        let text = "loginwithgoogle( login google async";
        // 50 + 3*30 + 25 = 165, capped
        assert_eq!(score_element("loginWithGoogle", text, &q), 100);
    }

    #[test]
    fn test_adding_matching_term_never_lowers_score() {
        let text = "jwt token refresh session";
        let mut terms = vec!["jwt"];
        let mut last = 0;
        for extra in ["token", "refresh", "session", "cookie"] {
            let score = score_element("refresh", text, &MatchQuery::new("x", &patterns(&terms)));
            assert!(score >= last);
            assert!(score <= MAX_SCORE);
            last = score;
            terms.push(extra);
        }
    }

    #[test]
    fn test_import_scoring() {
        let mut set = patterns(&["auth"]);
        set.framework_hints = vec!["NextAuth".into()];
        let q = MatchQuery::new("next-auth", &set);
        // query 60 + term 35
        assert_eq!(score_import("next-auth/react", &q), 95);
        assert_eq!(score_import("nextauth", &q), 75);
        assert_eq!(score_import("react", &q), 0);
    }

    #[test]
    fn test_comment_scoring() {
        let q = MatchQuery::new("oauth", &patterns(&["token"]));
        assert_eq!(score_comment("/** Refresh the OAuth token */", true, &q), 70);
        assert_eq!(score_comment("// refresh the oauth token", false, &q), 60);
        assert_eq!(score_comment("/** unrelated */", true, &q), 10);
        assert_eq!(score_comment("// unrelated", false, &q), 0);
    }

    #[test]
    fn test_artifact_matches_sorted_and_thresholded() {
        let artifact = AstArtifact {
            path: "src/auth.ts".into(),
            language: "typescript".into(),
            parse_success: true,
            functions: vec![login_function()],
            imports: vec![
                ImportInfo {
                    source: "next-auth/react".into(),
                    specifiers: vec!["signIn".into()],
                    snippet: "import { signIn } from 'next-auth/react'".into(),
                    location: Location {
                        start_line: 1,
                        end_line: 1,
                    },
                },
                ImportInfo {
                    source: "react".into(),
                    specifiers: vec![],
                    snippet: "import React from 'react'".into(),
                    location: Location {
                        start_line: 2,
                        end_line: 2,
                    },
                },
            ],
            comments: vec![CommentInfo {
                text: "// keeps the session alive".into(),
                is_doc: false,
                location: Location {
                    start_line: 3,
                    end_line: 3,
                },
            }],
            ..AstArtifact::default()
        };
        let q = MatchQuery::new("next-auth", &patterns(&["next-auth", "session"]));
        let matches = match_artifact(&artifact, &q);

        let kinds: Vec<MatchType> = matches.iter().map(|m| m.match_type).collect();
        assert_eq!(
            kinds,
            vec![MatchType::Import, MatchType::Function, MatchType::Comment]
        );
        assert_eq!(matches[0].score, 95);
        assert_eq!(matches[1].score, 60);
        assert_eq!(matches[1].line_start, 4);
        assert_eq!(matches[2].score, 20);
    }

    #[test]
    fn test_interface_match_type() {
        let artifact = AstArtifact {
            parse_success: true,
            classes: vec![crate::extract::ClassInfo {
                name: "SessionStore".into(),
                kind: ClassKind::Interface,
                snippet: "interface SessionStore {".into(),
                location: Location::default(),
                methods: vec![],
            }],
            ..AstArtifact::default()
        };
        let q = MatchQuery::new("session", &patterns(&["session"]));
        let matches = match_artifact(&artifact, &q);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].match_type, MatchType::Interface);
    }

    #[test]
    fn test_index_fallback_when_nothing_parsed() {
        let repository = Repository::new("acme/legacy");
        let result = AnalysisResult {
            searchable_index: SearchableIndex {
                keywords: vec!["authentication".into(), "billing".into()],
                directories: vec!["src/auth".into()],
                file_types: vec!["go".into()],
            },
            ast_artifacts: vec![AstArtifact {
                path: "main.go".into(),
                language: "go".into(),
                ..AstArtifact::default()
            }],
            ..AnalysisResult::default()
        };
        let analysis = Analysis::start(repository.id).completed(result);
        let q = MatchQuery::new("authentication", &patterns(&["auth"]));

        let files = match_repository(&repository, &analysis, &q);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file.path, ".");
        assert_eq!(files[0].file.language, "index");
        let names: Vec<&str> = files[0].matches.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["authentication", "src/auth"]);
        assert_eq!(files[0].matches[0].score, 80);
        assert!(files[0]
            .matches
            .iter()
            .all(|m| m.match_type == MatchType::General));
    }

    #[test]
    fn test_analysis_without_result_yields_nothing() {
        let repository = Repository::new("acme/empty");
        let analysis = Analysis::start(repository.id);
        let q = MatchQuery::new("x", &patterns(&["x"]));
        assert!(match_repository(&repository, &analysis, &q).is_empty());
    }

    #[test]
    fn test_path_matches_file_patterns() {
        let mut set = patterns(&["session"]);
        set.file_patterns = vec!["src/auth/*".into(), "*.Config.ts".into(), "middleware".into()];
        let q = MatchQuery::new("session", &set);

        assert!(q.path_matches("src/auth/session.ts"));
        assert!(q.path_matches("web/next.config.ts"));
        assert!(q.path_matches("app/Middleware.js"));
        assert!(!q.path_matches("src/billing/auth.ts"));
        assert!(!q.path_matches("config.ts"));
        assert!(!MatchQuery::new("session", &patterns(&["session"])).path_matches("src/auth/a.ts"));
    }

    #[test]
    fn test_candidates_matching_file_patterns_come_first() {
        let file = |path: &str| AstArtifact {
            path: path.into(),
            language: "typescript".into(),
            parse_success: true,
            functions: vec![login_function()],
            ..AstArtifact::default()
        };
        let repository = Repository::new("acme/web");
        let analysis = Analysis::start(repository.id).completed(AnalysisResult {
            ast_artifacts: vec![file("src/pages/index.ts"), file("src/auth/google.ts")],
            ..AnalysisResult::default()
        });
        let mut set = patterns(&["session", "next-auth"]);
        set.file_patterns = vec!["auth/".into()];
        let q = MatchQuery::new("login", &set);

        let files = match_candidates(&[(repository, analysis)], &q);
        let paths: Vec<&str> = files.iter().map(|f| f.file.path.as_str()).collect();
        assert_eq!(paths, vec!["src/auth/google.ts", "src/pages/index.ts"]);
        assert_eq!(files[0].matches[0].score, files[1].matches[0].score);
    }
}
