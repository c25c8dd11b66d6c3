use serde_json::json;

use super::{clean_list, structured_or_default, RepoSnapshot, Summarized};
use crate::llm::{ChatMessage, GenerationRequest, Generator};
use crate::models::TechStack;

fn schema() -> serde_json::Value {
    let list = json!({"type": "array", "items": {"type": "string"}});
    json!({
        "type": "object",
        "properties": {
            "languages": list,
            "frameworks": list,
            "libraries": list,
            "tools": list,
            "databases": list
        },
        "required": ["languages", "frameworks", "libraries", "tools", "databases"]
    })
}

/// Identify languages, frameworks, libraries, tools and databases.
///
/// Manifests carry most of the signal, so the host's language byte counts are
/// given to the model as prior stats. Falls back to an empty stack.
pub async fn summarize_tech_stack(
    generator: &dyn Generator,
    snapshot: &RepoSnapshot,
) -> Summarized<TechStack> {
    let prompt = format!(
        "Repository: {}\n\n{}{}Files:\n{}\
         Identify the technology stack of this codebase from its manifests, configuration and \
         source: programming languages, frameworks, libraries, developer tools and databases. \
         Use canonical names (e.g. \"React\", \"PostgreSQL\").",
        snapshot.full_name,
        snapshot.language_section(),
        snapshot.readme_section(),
        snapshot.file_digest(),
    );

    let request = GenerationRequest::structured(
        "tech_stack",
        vec![
            ChatMessage::system(
                "You analyze source code repositories. Respond with ONLY a JSON object \
                 matching the requested schema.",
            ),
            ChatMessage::user(prompt),
        ],
        schema(),
    );

    structured_or_default(generator, &request, validate, TechStack::default()).await
}

fn validate(stack: TechStack) -> Result<TechStack, String> {
    Ok(TechStack {
        languages: clean_list(stack.languages),
        frameworks: clean_list(stack.frameworks),
        libraries: clean_list(stack.libraries),
        tools: clean_list(stack.tools),
        databases: clean_list(stack.databases),
    })
}
