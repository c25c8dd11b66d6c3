//! Per-file ranking: heuristic average blended with an optional model re-score.

use futures_util::future::join_all;
use serde::Deserialize;
use serde_json::json;

use crate::config::SearchConfig;
use crate::error::GenerationError;
use crate::llm::{self, sanitize_for_prompt, truncate_chars, ChatMessage, GenerationRequest, Generator};
use crate::models::SearchResult;
use crate::search::matcher::FileMatches;

const HEURISTIC_WEIGHT: f64 = 0.3;
const MODEL_WEIGHT: f64 = 0.7;
/// Matches shown to the model per file
const PROMPT_MATCHES: usize = 8;
/// Results described in the summary prompt
const SUMMARY_RESULTS: usize = 10;

#[derive(Debug, Deserialize)]
struct Rescore {
    score: f64,
    #[serde(default)]
    explanation: String,
}

fn rescore_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "score": {"type": "number", "minimum": 0, "maximum": 100},
            "explanation": {"type": "string"}
        },
        "required": ["score", "explanation"]
    })
}

/// Unweighted mean of a file's heuristic match scores.
pub fn heuristic_average(file: &FileMatches) -> f64 {
    if file.matches.is_empty() {
        return 0.0;
    }
    let total: u32 = file.matches.iter().map(|m| m.score).sum();
    f64::from(total) / file.matches.len() as f64
}

/// `0.3 * heuristic + 0.7 * model`
pub fn blend(heuristic: f64, model: f64) -> f64 {
    HEURISTIC_WEIGHT * heuristic + MODEL_WEIGHT * model
}

async fn rescore(
    generator: &dyn Generator,
    query: &str,
    file: &FileMatches,
) -> Result<Rescore, GenerationError> {
    let listing: String = file
        .matches
        .iter()
        .take(PROMPT_MATCHES)
        .map(|m| {
            format!(
                "- {:?} {} (lines {}-{}, heuristic {}):\n{}\n",
                m.match_type,
                m.name,
                m.line_start,
                m.line_end,
                m.score,
                truncate_chars(&m.snippet, 400)
            )
        })
        .collect();

    let prompt = format!(
        "Query: \"{}\"\nRepository: {}\nFile: {} ({})\n\nMatches:\n{}\n\
         Rate from 0 to 100 how well this file answers the query and explain in one sentence.",
        sanitize_for_prompt(query),
        sanitize_for_prompt(&file.context),
        file.file.path,
        file.file.language,
        sanitize_for_prompt(&listing),
    );

    let request = GenerationRequest::structured(
        "rescore",
        vec![
            ChatMessage::system(
                "You judge the relevance of code search results. \
                 Respond with ONLY a JSON object matching the schema.",
            ),
            ChatMessage::user(prompt),
        ],
        rescore_schema(),
    );

    let parsed: Rescore = llm::generate_structured(generator, &request).await?;
    if !parsed.score.is_finite() || !(0.0..=100.0).contains(&parsed.score) {
        return Err(GenerationError::InvalidResponse(format!(
            "score {} outside [0, 100]",
            parsed.score
        )));
    }
    Ok(parsed)
}

async fn rank_file(
    generator: &dyn Generator,
    query: &str,
    file: FileMatches,
    use_model: bool,
) -> SearchResult {
    let heuristic = heuristic_average(&file);
    let (overall_score, explanation) = if use_model {
        match rescore(generator, query, &file).await {
            Ok(r) => (blend(heuristic, r.score), Some(r.explanation)),
            Err(e) => {
                tracing::warn!(
                    "Re-score failed for {}:{}, using heuristic average: {e}",
                    file.repository.full_name,
                    file.file.path
                );
                (heuristic, None)
            }
        }
    } else {
        (heuristic, None)
    };

    SearchResult {
        repository: file.repository,
        file: file.file,
        matches: file.matches,
        overall_score,
        explanation,
    }
}

/// Score files in batches of `rank_batch_size`, sort descending by overall
/// score and keep the top `max_results`.
pub async fn rank(
    generator: &dyn Generator,
    query: &str,
    files: Vec<FileMatches>,
    config: &SearchConfig,
) -> Vec<SearchResult> {
    let batch_size = config.rank_batch_size.max(1);
    let mut results = Vec::with_capacity(files.len());
    let mut remaining = files.into_iter().peekable();

    while remaining.peek().is_some() {
        let batch: Vec<FileMatches> = remaining.by_ref().take(batch_size).collect();
        let scored = join_all(
            batch
                .into_iter()
                .map(|file| rank_file(generator, query, file, config.use_model_rescoring)),
        )
        .await;
        results.extend(scored);
    }

    results.sort_by(|a, b| {
        b.overall_score
            .partial_cmp(&a.overall_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(config.max_results);
    results
}

/// One-paragraph description of the ranked results. Falls back to a count
/// when the model is unavailable; never fails.
pub async fn summarize_results(
    generator: &dyn Generator,
    query: &str,
    results: &[SearchResult],
) -> String {
    let fallback = format!("Found {} results for \"{}\"", results.len(), query);
    if results.is_empty() {
        return fallback;
    }

    let listing: String = results
        .iter()
        .take(SUMMARY_RESULTS)
        .map(|r| {
            let top = r
                .matches
                .first()
                .map(|m| m.name.as_str())
                .unwrap_or_default();
            format!(
                "- {} {} (score {:.0}, top match {})\n",
                r.repository.full_name, r.file.path, r.overall_score, top
            )
        })
        .collect();

    let request = GenerationRequest::text(
        "search_summary",
        vec![
            ChatMessage::system(
                "Summarize code search results for a developer in two or three sentences. \
                 Mention the most relevant files.",
            ),
            ChatMessage::user(format!(
                "Query: \"{}\"\nResults:\n{}",
                sanitize_for_prompt(query),
                sanitize_for_prompt(&listing)
            )),
        ],
    );

    match generator.generate(&request).await {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => fallback,
        Err(e) => {
            tracing::warn!("Result summary failed: {e}");
            fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FileRef, Match, MatchType, RepositoryRef};
    use crate::summarize::testing::Canned;
    use uuid::Uuid;

    fn file(path: &str, scores: &[u32]) -> FileMatches {
        FileMatches {
            repository: RepositoryRef {
                id: Uuid::nil(),
                full_name: "acme/app".into(),
            },
            file: FileRef {
                path: path.into(),
                language: "typescript".into(),
            },
            matches: scores
                .iter()
                .map(|&score| Match {
                    match_type: MatchType::Function,
                    name: format!("f{score}"),
                    snippet: String::new(),
                    line_start: 1,
                    line_end: 1,
                    score,
                    explanation: String::new(),
                })
                .collect(),
            context: "acme/app".into(),
        }
    }

    fn config(use_model: bool) -> SearchConfig {
        SearchConfig {
            use_model_rescoring: use_model,
            ..SearchConfig::default()
        }
    }

    #[test]
    fn test_blend_weights() {
        assert!((blend(60.0, 90.0) - 81.0).abs() < 1e-9);
        assert!((heuristic_average(&file("a", &[40, 60, 80])) - 60.0).abs() < 1e-9);
        assert_eq!(heuristic_average(&file("a", &[])), 0.0);
    }

    #[tokio::test]
    async fn test_model_score_is_blended() {
        let generator = Canned::ok(r#"{"score": 90, "explanation": "implements login"}"#);
        let results = rank(&generator, "login", vec![file("a.ts", &[40, 60, 80])], &config(true)).await;
        assert_eq!(results.len(), 1);
        assert!((results[0].overall_score - 81.0).abs() < 1e-9);
        assert_eq!(results[0].explanation.as_deref(), Some("implements login"));
    }

    #[tokio::test]
    async fn test_failed_rescore_uses_plain_average() {
        let generator = Canned::err(GenerationError::Transport("down".into()));
        let results = rank(&generator, "login", vec![file("a.ts", &[40, 60, 80])], &config(true)).await;
        assert!((results[0].overall_score - 60.0).abs() < 1e-9);
        assert_eq!(results[0].explanation, None);
    }

    #[tokio::test]
    async fn test_out_of_range_score_is_a_local_failure() {
        let generator = Canned::ok(r#"{"score": 250, "explanation": "?"}"#);
        let results = rank(&generator, "q", vec![file("a.ts", &[30, 50])], &config(true)).await;
        assert!((results[0].overall_score - 40.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_sorted_truncated_and_batched() {
        let generator = Canned::ok("unused");
        let files: Vec<FileMatches> = (0..12u32)
            .map(|i| file(&format!("f{i}.ts"), &[30 + i * 5]))
            .collect();
        let mut cfg = config(false);
        cfg.max_results = 10;
        let results = rank(&generator, "q", files, &cfg).await;
        assert_eq!(results.len(), 10);
        assert_eq!(results[0].file.path, "f11.ts");
        assert!(results
            .windows(2)
            .all(|w| w[0].overall_score >= w[1].overall_score));
        assert!(generator.prompts.lock().is_empty());
    }

    #[tokio::test]
    async fn test_summary_fallbacks() {
        let generator = Canned::err(GenerationError::Transport("down".into()));
        assert_eq!(
            summarize_results(&generator, "jwt", &[]).await,
            "Found 0 results for \"jwt\""
        );
        assert!(generator.prompts.lock().is_empty());

        let results = rank(&generator, "jwt", vec![file("a.ts", &[50])], &config(false)).await;
        assert_eq!(
            summarize_results(&generator, "jwt", &results).await,
            "Found 1 results for \"jwt\""
        );
    }

    #[tokio::test]
    async fn test_summary_uses_model_text() {
        let generator = Canned::ok("  Login lives in a.ts.  ");
        let results = rank(&generator, "login", vec![file("a.ts", &[50])], &config(false)).await;
        assert_eq!(
            summarize_results(&generator, "login", &results).await,
            "Login lives in a.ts."
        );
    }
}
