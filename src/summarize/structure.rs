use serde_json::json;

use super::{clean_list, structured_or_default, RepoSnapshot, Summarized};
use crate::llm::{ChatMessage, GenerationRequest, Generator};
use crate::models::Structure;

fn schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "architecture": {"type": "string"},
            "patterns": {"type": "array", "items": {"type": "string"}},
            "directories": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "path": {"type": "string"},
                        "purpose": {"type": "string"}
                    },
                    "required": ["path", "purpose"]
                }
            },
            "entry_points": {"type": "array", "items": {"type": "string"}}
        },
        "required": ["architecture"]
    })
}

/// Describe the architecture and directory layout of a repository.
///
/// Falls back to architecture `"unknown"` with no patterns or directories.
pub async fn summarize_structure(
    generator: &dyn Generator,
    snapshot: &RepoSnapshot,
) -> Summarized<Structure> {
    let paths: Vec<&str> = snapshot.files.iter().map(|f| f.path.as_str()).collect();
    let prompt = format!(
        "Repository: {}\n\n{}Selected paths:\n{}\n\nFiles:\n{}\
         Describe the architecture of this codebase: an architecture label (e.g. monolith, \
         layered, mvc, microservices, library, cli, monorepo), the design patterns in use, the \
         purpose of each top-level directory, and the entry-point files.",
        snapshot.full_name,
        snapshot.readme_section(),
        paths.join("\n"),
        snapshot.file_digest(),
    );

    let request = GenerationRequest::structured(
        "structure",
        vec![
            ChatMessage::system(
                "You analyze source code repositories. Respond with ONLY a JSON object \
                 matching the requested schema.",
            ),
            ChatMessage::user(prompt),
        ],
        schema(),
    );

    structured_or_default(generator, &request, validate, Structure::default()).await
}

fn validate(mut structure: Structure) -> Result<Structure, String> {
    structure.architecture = structure.architecture.trim().to_lowercase();
    if structure.architecture.is_empty() {
        return Err("empty architecture".to_string());
    }
    structure.patterns = clean_list(structure.patterns);
    structure.entry_points = clean_list(structure.entry_points);
    structure.directories.retain(|d| !d.path.trim().is_empty());
    Ok(structure)
}
