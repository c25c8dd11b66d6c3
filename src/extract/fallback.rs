//! Degraded artifacts for files the extractor cannot parse.

use super::AstArtifact;

/// The artifact recorded for a file with no parser, an oversized body, or a
/// tree too damaged or too deeply nested to trust: every element list empty and `parse_success`
/// false. Search falls back to the repository's searchable index for these.
pub fn degraded_artifact(path: &str, language: &str, content: &str) -> AstArtifact {
    AstArtifact {
        path: path.to_string(),
        language: language.to_string(),
        size: content.len(),
        parse_success: false,
        ..AstArtifact::default()
    }
}
