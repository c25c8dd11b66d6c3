use serde_json::json;

use super::{structured_or_default, RepoSnapshot, Summarized};
use crate::llm::{ChatMessage, GenerationRequest, Generator};
use crate::models::FeatureSet;

const MAX_FEATURES: usize = 20;

fn schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "features": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "description": {"type": "string"},
                        "category": {"type": "string"},
                        "files": {"type": "array", "items": {"type": "string"}}
                    },
                    "required": ["name", "description"]
                }
            }
        },
        "required": ["features"]
    })
}

/// Identify the user-facing features a repository implements.
///
/// Falls back to an empty feature list.
pub async fn summarize_features(
    generator: &dyn Generator,
    snapshot: &RepoSnapshot,
) -> Summarized<FeatureSet> {
    let prompt = format!(
        "Repository: {}\n\n{}{}Files:\n{}\
         List the main features this codebase implements. For each feature give a short \
         name, a one-sentence description, a category (e.g. authentication, payments, api, ui, \
         data, infrastructure) and the file paths that implement it.",
        snapshot.full_name,
        snapshot.readme_section(),
        snapshot.language_section(),
        snapshot.file_digest(),
    );

    let request = GenerationRequest::structured(
        "features",
        vec![
            ChatMessage::system(
                "You analyze source code repositories. Respond with ONLY a JSON object \
                 matching the requested schema.",
            ),
            ChatMessage::user(prompt),
        ],
        schema(),
    );

    structured_or_default(generator, &request, validate, FeatureSet::default()).await
}

fn validate(mut set: FeatureSet) -> Result<FeatureSet, String> {
    if set.features.iter().any(|f| f.name.trim().is_empty()) {
        return Err("feature with empty name".to_string());
    }
    set.features.truncate(MAX_FEATURES);
    for feature in &mut set.features {
        feature.name = feature.name.trim().to_string();
        feature.category = feature.category.trim().to_lowercase();
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;
    use crate::summarize::testing::Canned;
    use crate::summarize::SourceFile;

    fn snapshot() -> RepoSnapshot {
        RepoSnapshot {
            full_name: "acme/shop".into(),
            files: vec![SourceFile {
                path: "src/auth.ts".into(),
                content: "export function login() {}".into(),
            }],
            ..RepoSnapshot::default()
        }
    }

    #[tokio::test]
    async fn test_parses_features() {
        let generator = Canned::ok(
            r#"{"features": [{"name": "Login", "description": "OAuth login", "category": "Authentication", "files": ["src/auth.ts"]}]}"#,
        );
        let outcome = summarize_features(&generator, &snapshot()).await;
        assert!(!outcome.is_degraded());
        assert_eq!(outcome.value.features.len(), 1);
        assert_eq!(outcome.value.features[0].category, "authentication");
        assert!(generator.prompts.lock()[0].contains("src/auth.ts"));
    }

    #[tokio::test]
    async fn test_provider_error_yields_empty_list() {
        let generator = Canned::err(GenerationError::Transport("down".into()));
        let outcome = summarize_features(&generator, &snapshot()).await;
        assert!(outcome.is_degraded());
        assert!(outcome.value.features.is_empty());
    }

    #[tokio::test]
    async fn test_blank_feature_name_rejected() {
        let generator = Canned::ok(r#"{"features": [{"name": " ", "description": "x"}]}"#);
        let outcome = summarize_features(&generator, &snapshot()).await;
        assert!(outcome.is_degraded());
        assert!(outcome.value.features.is_empty());
    }
}
