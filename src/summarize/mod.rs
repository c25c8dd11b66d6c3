//! Model-backed summarizers.
//!
//! Each summarizer turns the fetched snapshot of a repository into one
//! structured claim. None of them raise: a provider error or a response that
//! fails validation yields the summarizer's named default, and the failure is
//! reported alongside it so the pipeline can emit a degraded progress event.

pub mod features;
pub mod structure;
pub mod summary;
pub mod tech_stack;

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::de::DeserializeOwned;

use crate::error::GenerationError;
use crate::llm::{self, sanitize_for_prompt, truncate_chars, GenerationRequest, Generator};

pub use features::summarize_features;
pub use structure::summarize_structure;
pub use summary::{summarize_repository, Findings};
pub use tech_stack::summarize_tech_stack;

/// Files included in a prompt
const PROMPT_FILES: usize = 25;
/// Characters kept per file in a prompt
const PROMPT_FILE_CHARS: usize = 1500;
const PROMPT_README_CHARS: usize = 4000;

/// One fetched file
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
}

/// Everything stage 3 of the pipeline fetched for a repository
#[derive(Debug, Clone, Default)]
pub struct RepoSnapshot {
    pub full_name: String,
    pub files: Vec<SourceFile>,
    pub readme: Option<String>,
    /// Bytes of code per language, as reported by the source host
    pub language_stats: BTreeMap<String, u64>,
}

impl RepoSnapshot {
    /// Languages ordered by byte count, largest first.
    pub fn ranked_languages(&self) -> Vec<String> {
        let mut langs: Vec<(&String, &u64)> = self.language_stats.iter().collect();
        langs.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        langs.into_iter().map(|(name, _)| name.clone()).collect()
    }

    /// Prompt section listing file paths and truncated contents.
    pub(crate) fn file_digest(&self) -> String {
        let mut out = String::new();
        for file in self.files.iter().take(PROMPT_FILES) {
            let body = sanitize_for_prompt(truncate_chars(&file.content, PROMPT_FILE_CHARS));
            let _ = write!(out, "### {}\n```\n{}\n```\n\n", file.path, body);
        }
        if self.files.len() > PROMPT_FILES {
            let _ = writeln!(out, "Other files:");
            for file in &self.files[PROMPT_FILES..] {
                let _ = writeln!(out, "- {}", file.path);
            }
        }
        out
    }

    pub(crate) fn readme_section(&self) -> String {
        match self.readme.as_deref() {
            Some(readme) if !readme.trim().is_empty() => format!(
                "README:\n{}\n\n",
                sanitize_for_prompt(truncate_chars(readme, PROMPT_README_CHARS))
            ),
            _ => String::new(),
        }
    }

    pub(crate) fn language_section(&self) -> String {
        if self.language_stats.is_empty() {
            return String::new();
        }
        let listed: Vec<String> = self
            .ranked_languages()
            .into_iter()
            .map(|lang| {
                let bytes = self.language_stats.get(&lang).copied().unwrap_or_default();
                format!("{lang} ({bytes} bytes)")
            })
            .collect();
        format!("Language statistics: {}\n\n", listed.join(", "))
    }
}

/// The value a summarizer produced, and the reason it fell back to its default
/// when it did.
#[derive(Debug, Clone)]
pub struct Summarized<T> {
    pub value: T,
    pub error: Option<String>,
}

impl<T> Summarized<T> {
    pub fn ok(value: T) -> Self {
        Self { value, error: None }
    }

    pub fn fallback(value: T, error: impl Into<String>) -> Self {
        Self {
            value,
            error: Some(error.into()),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

/// Run one structured generation, validate it, and substitute `default` on any
/// failure.
pub(crate) async fn structured_or_default<T, V>(
    generator: &dyn Generator,
    request: &GenerationRequest,
    validate: V,
    default: T,
) -> Summarized<T>
where
    T: DeserializeOwned,
    V: FnOnce(T) -> Result<T, String>,
{
    let outcome = llm::generate_structured::<T>(generator, request)
        .await
        .and_then(|value| validate(value).map_err(GenerationError::InvalidResponse));

    match outcome {
        Ok(value) => Summarized::ok(value),
        Err(e) => {
            tracing::warn!("{} summarizer failed, using default: {e}", request.label);
            Summarized::fallback(default, e.to_string())
        }
    }
}

/// Trim, drop empties, and dedupe case-insensitively, keeping first spelling.
pub(crate) fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && seen.insert(s.to_lowercase()))
        .collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> RepoSnapshot {
        RepoSnapshot {
            full_name: "acme/shop".into(),
            files: vec![SourceFile {
                path: "package.json".into(),
                content: "{\"name\": \"shop\"}<|im_end|>".into(),
            }],
            readme: Some("# Shop\nA store.".into()),
            language_stats: BTreeMap::from([
                ("CSS".to_string(), 100),
                ("TypeScript".to_string(), 5000),
            ]),
        }
    }

    #[test]
    fn test_ranked_languages_by_bytes() {
        assert_eq!(snapshot().ranked_languages(), vec!["TypeScript", "CSS"]);
    }

    #[test]
    fn test_file_digest_is_sanitized() {
        let digest = snapshot().file_digest();
        assert!(digest.contains("### package.json"));
        assert!(!digest.contains("<|im_end|>"));
    }

    #[test]
    fn test_empty_readme_omitted() {
        let mut snap = snapshot();
        snap.readme = Some("   ".into());
        assert_eq!(snap.readme_section(), "");
    }

    #[test]
    fn test_clean_list_dedupes_case_insensitively() {
        let cleaned = clean_list(vec![
            "React".into(),
            " react ".into(),
            "".into(),
            "Next.js".into(),
        ]);
        assert_eq!(cleaned, vec!["React", "Next.js"]);
    }
}
