//! Search entry point.
//!
//! ```text
//!  query ─▶ intent ─┬─ casual / help ─▶ reply, no results
//!                   │
//!                   └─ code_search ─▶ candidates ─▶ patterns ─▶ matcher ─▶ ranker ─▶ summary
//! ```
//!
//! Intent classification and the result summary degrade to defaults. Pattern
//! generation has none: without patterns there is nothing to match, so its
//! failure fails the search.

pub mod intent;
pub mod matcher;
pub mod patterns;
pub mod ranker;

use std::collections::BTreeSet;
use std::sync::Arc;

use futures_util::stream::Stream;

use crate::config::SearchConfig;
use crate::error::{CoreError, CoreResult};
use crate::events::{event_channel, EventSink, EVENT_BUFFER};
use crate::llm::Generator;
use crate::models::{
    Analysis, Intent, IntentResult, QueryContext, Repository, SearchEvent, SearchFilters,
    SearchResult,
};
use crate::store::ArtifactStore;

use matcher::{match_candidates, MatchQuery};
use patterns::{generate_patterns, PatternHints};

pub const MAX_QUERY_CHARS: usize = 1000;

/// The trimmed query, or `InvalidInput` when it is empty or too long.
pub fn validate_query(query: &str) -> CoreResult<&str> {
    let query = query.trim();
    if query.is_empty() {
        return Err(CoreError::InvalidInput("query must not be empty".to_string()));
    }
    if query.chars().count() > MAX_QUERY_CHARS {
        return Err(CoreError::InvalidInput(format!(
            "query longer than {MAX_QUERY_CHARS} characters"
        )));
    }
    Ok(query)
}

/// Final answer of a search.
#[derive(Debug, Clone)]
pub struct SearchResponse {
    pub intent: IntentResult,
    pub results: Vec<SearchResult>,
    pub summary: String,
}

pub struct SearchService {
    generator: Arc<dyn Generator>,
    store: Arc<dyn ArtifactStore>,
    config: SearchConfig,
}

impl SearchService {
    pub fn new(
        generator: Arc<dyn Generator>,
        store: Arc<dyn ArtifactStore>,
        config: SearchConfig,
    ) -> Self {
        Self {
            generator,
            store,
            config,
        }
    }

    /// Run a search in a detached task and return its event stream, which
    /// ends with exactly one `complete` or `failed` event.
    pub fn search(
        self: &Arc<Self>,
        context: QueryContext,
    ) -> impl Stream<Item = SearchEvent> + Send + 'static {
        let (sink, events) = event_channel(EVENT_BUFFER);
        let service = Arc::clone(self);

        tokio::spawn(async move {
            let query = context.query.clone();
            let terminal = match service.execute(context, &sink).await {
                Ok(response) => SearchEvent::Complete {
                    intent: response.intent.intent,
                    results: response.results,
                    summary: response.summary,
                },
                Err(e) => {
                    tracing::error!("Search for {query:?} failed: {e}");
                    SearchEvent::Failed {
                        error: e.to_string(),
                        query,
                    }
                }
            };
            sink.emit(terminal).await;
        });

        events
    }

    pub async fn execute(
        &self,
        context: QueryContext,
        sink: &EventSink<SearchEvent>,
    ) -> CoreResult<SearchResponse> {
        let query = validate_query(&context.query)?;
        let generator = self.generator.as_ref();

        progress(sink, "intent", "Classifying query").await;
        let intent = intent::classify_intent(generator, query).await;
        tracing::info!(
            "Query {query:?} classified as {:?} ({}%)",
            intent.intent,
            intent.confidence
        );
        if intent.intent != Intent::CodeSearch {
            let summary = intent
                .suggested_response
                .clone()
                .unwrap_or_else(|| intent::canned_reply(intent.intent).to_string());
            return Ok(SearchResponse {
                intent,
                results: Vec::new(),
                summary,
            });
        }

        progress(sink, "candidates", "Selecting analyzed repositories").await;
        let candidates: Vec<(Repository, Analysis)> = self
            .store
            .latest_completed_analyses(context.repository_ids.as_deref())
            .await?
            .into_iter()
            .filter(|(repository, analysis)| passes_filters(repository, analysis, &context.filters))
            .collect();
        if candidates.is_empty() {
            tracing::info!("No analyzed repository matches the search filters");
            return Ok(SearchResponse {
                intent,
                results: Vec::new(),
                summary: ranker::summarize_results(generator, query, &[]).await,
            });
        }

        progress(sink, "patterns", "Generating search patterns").await;
        let patterns = generate_patterns(generator, query, &hints(&candidates), &context.filters)
            .await
            .map_err(CoreError::PatternGeneration)?;
        tracing::debug!("Search terms for {query:?}: {:?}", patterns.search_terms);

        progress(
            sink,
            "matching",
            &format!("Scanning {} repositories", candidates.len()),
        )
        .await;
        let match_query = MatchQuery::new(query, &patterns);
        let files =
            tokio::task::spawn_blocking(move || match_candidates(&candidates, &match_query))
                .await?;
        tracing::info!("{} files matched {query:?}", files.len());

        progress(sink, "ranking", &format!("Ranking {} files", files.len())).await;
        let results = ranker::rank(generator, query, files, &self.config).await;

        progress(sink, "summary", "Summarizing results").await;
        let summary = ranker::summarize_results(generator, query, &results).await;

        Ok(SearchResponse {
            intent,
            results,
            summary,
        })
    }
}

fn contains_ignore_case(haystack: &[String], needle: &str) -> bool {
    haystack.iter().any(|h| h.eq_ignore_ascii_case(needle))
}

/// Whether a repository's latest analysis satisfies the request filters.
/// Each non-empty filter must match; within a filter any value may match.
pub fn passes_filters(repository: &Repository, analysis: &Analysis, filters: &SearchFilters) -> bool {
    let Some(result) = &analysis.result else {
        return false;
    };

    if !filters.languages.is_empty() {
        let matched = filters.languages.iter().any(|lang| {
            repository
                .primary_language
                .as_deref()
                .is_some_and(|primary| primary.eq_ignore_ascii_case(lang))
                || contains_ignore_case(&result.tech_stack.languages, lang)
        });
        if !matched {
            return false;
        }
    }

    if !filters.frameworks.is_empty()
        && !filters
            .frameworks
            .iter()
            .any(|fw| contains_ignore_case(&result.tech_stack.frameworks, fw))
    {
        return false;
    }

    match filters.complexity {
        Some(complexity) => result.complexity == complexity,
        None => true,
    }
}

fn hints(candidates: &[(Repository, Analysis)]) -> PatternHints {
    let mut languages = BTreeSet::new();
    let mut frameworks = BTreeSet::new();
    for (repository, analysis) in candidates {
        if let Some(primary) = &repository.primary_language {
            languages.insert(primary.clone());
        }
        if let Some(result) = &analysis.result {
            languages.extend(result.tech_stack.languages.iter().cloned());
            frameworks.extend(result.tech_stack.frameworks.iter().cloned());
        }
    }
    PatternHints {
        languages: languages.into_iter().collect(),
        frameworks: frameworks.into_iter().collect(),
    }
}

async fn progress(sink: &EventSink<SearchEvent>, stage: &str, message: &str) {
    sink.emit(SearchEvent::Progress {
        stage: stage.to_string(),
        message: message.to_string(),
    })
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use async_trait::async_trait;
    use futures_util::StreamExt;
    use parking_lot::Mutex;

    use crate::error::GenerationError;
    use crate::extract::Extractor;
    use crate::llm::GenerationRequest;
    use crate::models::{AnalysisResult, Complexity, TechStack};
    use crate::store::{AnalysisStart, JsonFileStore};

    const AUTH_TS: &str = r#"import { signIn } from "next-auth/react";

// Starts the next-auth session flow
export async function loginWithGoogle() {
  const session = await signIn("google"); // next-auth
  return session;
}
"#;

    /// Replies by request label and records every label it was asked for.
    #[derive(Default)]
    struct Scripted {
        replies: HashMap<&'static str, String>,
        calls: Mutex<Vec<&'static str>>,
    }

    impl Scripted {
        fn with(mut self, label: &'static str, reply: &str) -> Self {
            self.replies.insert(label, reply.to_string());
            self
        }

        fn called(&self, label: &str) -> usize {
            self.calls.lock().iter().filter(|l| **l == label).count()
        }
    }

    #[async_trait]
    impl Generator for Scripted {
        async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
            self.calls.lock().push(request.label);
            self.replies
                .get(request.label)
                .cloned()
                .ok_or_else(|| GenerationError::Transport(format!("no reply for {}", request.label)))
        }
    }

    const CODE_SEARCH: &str = r#"{"intent": "code_search", "confidence": 90, "reasoning": "code"}"#;
    const PATTERNS: &str = r#"{"search_terms": ["next-auth", "session"], "file_patterns": [], "code_patterns": [], "framework_hints": []}"#;

    async fn seeded_store() -> Arc<JsonFileStore> {
        let store = Arc::new(JsonFileStore::in_memory());
        let mut repo = Repository::new("acme/web");
        repo.primary_language = Some("TypeScript".into());
        let repo = store.save_repository(repo).await.unwrap();

        let artifact = Extractor::new().unwrap().extract("src/auth.ts", AUTH_TS);
        let result = AnalysisResult {
            ast_artifacts: vec![artifact],
            tech_stack: TechStack {
                languages: vec!["TypeScript".into()],
                frameworks: vec!["Next.js".into()],
                ..TechStack::default()
            },
            complexity: Complexity::Low,
            ..AnalysisResult::default()
        };
        let AnalysisStart::Started(analysis) = store.begin_analysis(repo.id).await.unwrap() else {
            panic!("expected a fresh analysis");
        };
        store.finish_analysis(analysis.completed(result)).await.unwrap();
        store
    }

    fn build_service(
        generator: Scripted,
        store: Arc<JsonFileStore>,
    ) -> (Arc<SearchService>, Arc<Scripted>) {
        let generator = Arc::new(generator);
        let config = SearchConfig {
            use_model_rescoring: false,
            ..SearchConfig::default()
        };
        let service = Arc::new(SearchService::new(generator.clone(), store, config));
        (service, generator)
    }

    fn query(text: &str) -> QueryContext {
        QueryContext {
            query: text.to_string(),
            ..QueryContext::default()
        }
    }

    #[tokio::test]
    async fn test_casual_conversation_short_circuits() {
        let generator = Scripted::default().with(
            "intent",
            r#"{"intent": "casual_conversation", "confidence": 95, "reasoning": "greeting", "suggested_response": "Hello! What code are you looking for?"}"#,
        );
        let (service, generator) = build_service(generator, seeded_store().await);

        let events: Vec<SearchEvent> = service.search(query("hey, how are you?")).collect().await;
        let Some(SearchEvent::Complete {
            intent,
            results,
            summary,
        }) = events.last()
        else {
            panic!("expected a complete event, got {events:?}");
        };
        assert_eq!(*intent, Intent::CasualConversation);
        assert!(results.is_empty());
        assert_eq!(summary, "Hello! What code are you looking for?");
        assert_eq!(generator.called("patterns"), 0);
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    }

    #[tokio::test]
    async fn test_help_request_without_suggestion_uses_canned_reply() {
        let generator = Scripted::default().with(
            "intent",
            r#"{"intent": "help_request", "confidence": 80, "reasoning": "asks how to use"}"#,
        );
        let (service, _) = build_service(generator, seeded_store().await);
        let (sink, _events) = event_channel(EVENT_BUFFER);
        let response = service.execute(query("how do I search?"), &sink).await.unwrap();
        assert_eq!(response.summary, intent::canned_reply(Intent::HelpRequest));
    }

    #[tokio::test]
    async fn test_code_search_finds_function() {
        let generator = Scripted::default()
            .with("intent", CODE_SEARCH)
            .with("patterns", PATTERNS);
        let (service, generator) = build_service(generator, seeded_store().await);

        let events: Vec<SearchEvent> = service.search(query("next-auth")).collect().await;
        let stages: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                SearchEvent::Progress { stage, .. } => Some(stage.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(
            stages,
            vec!["intent", "candidates", "patterns", "matching", "ranking", "summary"]
        );

        let Some(SearchEvent::Complete {
            intent,
            results,
            summary,
        }) = events.last()
        else {
            panic!("expected a complete event, got {events:?}");
        };
        assert_eq!(*intent, Intent::CodeSearch);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].file.path, "src/auth.ts");
        assert!(results[0]
            .matches
            .iter()
            .any(|m| m.name == "loginWithGoogle"));
        // summary model has no script, so the count fallback is used
        assert_eq!(summary, "Found 1 results for \"next-auth\"");
        assert_eq!(generator.called("rescore"), 0);
    }

    #[tokio::test]
    async fn test_pattern_failure_fails_search_with_query() {
        let generator = Scripted::default().with("intent", CODE_SEARCH);
        let (service, _) = build_service(generator, seeded_store().await);

        let events: Vec<SearchEvent> = service.search(query("jwt refresh")).collect().await;
        match events.last() {
            Some(SearchEvent::Failed { error, query }) => {
                assert!(error.contains("pattern generation failed"));
                assert_eq!(query, "jwt refresh");
            }
            other => panic!("expected failed event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected() {
        let (service, generator) = build_service(Scripted::default(), seeded_store().await);
        let events: Vec<SearchEvent> = service.search(query("   ")).collect().await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], SearchEvent::Failed { error, .. } if error.contains("invalid input")));
        assert!(generator.calls.lock().is_empty());
    }

    #[test]
    fn test_validate_query_bounds() {
        assert_eq!(validate_query("  find auth  ").unwrap(), "find auth");
        assert!(validate_query(&"é".repeat(MAX_QUERY_CHARS)).is_ok());
        assert!(matches!(
            validate_query(&"a".repeat(MAX_QUERY_CHARS + 1)),
            Err(CoreError::InvalidInput(_))
        ));
        assert!(matches!(validate_query("\n\t"), Err(CoreError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_filters_exclude_every_candidate() {
        let generator = Scripted::default()
            .with("intent", CODE_SEARCH)
            .with("patterns", PATTERNS);
        let (service, generator) = build_service(generator, seeded_store().await);
        let mut context = query("next-auth");
        context.filters.languages = vec!["python".into()];

        let (sink, _events) = event_channel(EVENT_BUFFER);
        let response = service.execute(context, &sink).await.unwrap();
        assert!(response.results.is_empty());
        assert_eq!(generator.called("patterns"), 0);
    }

    #[test]
    fn test_passes_filters() {
        let mut repo = Repository::new("acme/api");
        repo.primary_language = Some("Rust".into());
        let analysis = Analysis::start(repo.id).completed(AnalysisResult {
            tech_stack: TechStack {
                languages: vec!["Rust".into(), "SQL".into()],
                frameworks: vec!["axum".into()],
                ..TechStack::default()
            },
            complexity: Complexity::Medium,
            ..AnalysisResult::default()
        });

        let mut filters = SearchFilters {
            languages: vec!["sql".into()],
            ..SearchFilters::default()
        };
        assert!(passes_filters(&repo, &analysis, &filters));

        filters.frameworks = vec!["Axum".into()];
        assert!(passes_filters(&repo, &analysis, &filters));

        filters.complexity = Some(Complexity::High);
        assert!(!passes_filters(&repo, &analysis, &filters));

        filters.complexity = Some(Complexity::Medium);
        filters.languages = vec!["go".into()];
        assert!(!passes_filters(&repo, &analysis, &filters));

        let running = Analysis::start(repo.id);
        assert!(!passes_filters(&repo, &running, &SearchFilters::default()));
    }
}
