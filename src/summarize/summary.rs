use super::{RepoSnapshot, Summarized};
use crate::llm::{ChatMessage, GenerationRequest, Generator};
use crate::models::{CodeMetrics, FeatureSet, Structure, TechStack};

/// What the earlier stages concluded, fed to the final summary.
pub struct Findings<'a> {
    pub features: &'a FeatureSet,
    pub structure: &'a Structure,
    pub tech_stack: &'a TechStack,
    pub metrics: &'a CodeMetrics,
}

/// Write a short natural-language overview of the repository.
///
/// On failure, or an empty completion, a plain sentence assembled from the
/// findings is used instead.
pub async fn summarize_repository(
    generator: &dyn Generator,
    snapshot: &RepoSnapshot,
    findings: &Findings<'_>,
) -> Summarized<String> {
    let feature_names: Vec<&str> = findings
        .features
        .features
        .iter()
        .map(|f| f.name.as_str())
        .collect();

    let prompt = format!(
        "Repository: {}\n\n{}\
         Architecture: {}\nPatterns: {}\nLanguages: {}\nFrameworks: {}\nFeatures: {}\n\
         Files analyzed: {}, lines of code: {}, complexity: {}\n\n\
         Write a concise 2-4 sentence summary of what this repository does and how it is built.",
        snapshot.full_name,
        snapshot.readme_section(),
        findings.structure.architecture,
        findings.structure.patterns.join(", "),
        findings.tech_stack.languages.join(", "),
        findings.tech_stack.frameworks.join(", "),
        feature_names.join(", "),
        findings.metrics.file_count,
        findings.metrics.lines_of_code,
        findings.metrics.complexity.as_str(),
    );

    let request = GenerationRequest::text(
        "summary",
        vec![
            ChatMessage::system("You write brief technical summaries of software repositories."),
            ChatMessage::user(prompt),
        ],
    );

    match generator.generate(&request).await {
        Ok(text) if !text.trim().is_empty() => Summarized::ok(text.trim().to_string()),
        Ok(_) => Summarized::fallback(fallback_summary(snapshot, findings), "empty summary"),
        Err(e) => {
            tracing::warn!("summary generation failed, using fallback: {e}");
            Summarized::fallback(fallback_summary(snapshot, findings), e.to_string())
        }
    }
}

fn fallback_summary(snapshot: &RepoSnapshot, findings: &Findings<'_>) -> String {
    let languages = if findings.tech_stack.languages.is_empty() {
        snapshot.ranked_languages()
    } else {
        findings.tech_stack.languages.clone()
    };
    let written_in = if languages.is_empty() {
        String::new()
    } else {
        format!(", written in {}", languages.join(", "))
    };
    format!(
        "{} ({} architecture{}): {} analyzed files, {} lines of code, {} complexity, {} identified features.",
        snapshot.full_name,
        findings.structure.architecture,
        written_in,
        findings.metrics.file_count,
        findings.metrics.lines_of_code,
        findings.metrics.complexity.as_str(),
        findings.features.features.len(),
    )
}
