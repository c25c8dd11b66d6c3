use serde_json::json;

use crate::error::GenerationError;
use crate::llm::{self, sanitize_for_prompt, truncate_chars, ChatMessage, GenerationRequest, Generator};
use crate::models::{SearchFilters, SearchPatternSet};
use crate::summarize::clean_list;

const MAX_TERMS: usize = 10;

/// Languages and frameworks present in the repositories being searched.
#[derive(Debug, Clone, Default)]
pub struct PatternHints {
    pub languages: Vec<String>,
    pub frameworks: Vec<String>,
}

fn schema() -> serde_json::Value {
    let list = json!({"type": "array", "items": {"type": "string"}});
    json!({
        "type": "object",
        "properties": {
            "search_terms": list,
            "file_patterns": list,
            "code_patterns": list,
            "framework_hints": list
        },
        "required": ["search_terms", "file_patterns", "code_patterns", "framework_hints"]
    })
}

/// Derive the lexical signals the matcher scores against.
///
/// There is no fallback: an error here fails the search.
pub async fn generate_patterns(
    generator: &dyn Generator,
    query: &str,
    hints: &PatternHints,
    filters: &SearchFilters,
) -> Result<SearchPatternSet, GenerationError> {
    let mut context = String::new();
    if !hints.languages.is_empty() {
        context.push_str(&format!("Languages in scope: {}\n", hints.languages.join(", ")));
    }
    if !hints.frameworks.is_empty() {
        context.push_str(&format!("Frameworks in scope: {}\n", hints.frameworks.join(", ")));
    }
    if !filters.languages.is_empty() {
        context.push_str(&format!("Only languages: {}\n", filters.languages.join(", ")));
    }
    if !filters.frameworks.is_empty() {
        context.push_str(&format!("Only frameworks: {}\n", filters.frameworks.join(", ")));
    }

    let prompt = format!(
        "Search query: \"{}\"\n{context}\n\
         Produce search patterns for finding this in source code:\n\
         - search_terms: identifiers, keywords and package names likely to appear in matching code\n\
         - file_patterns: path fragments or globs of files likely to contain it\n\
         - code_patterns: short code fragments (calls, decorators, type names)\n\
         - framework_hints: frameworks or libraries involved",
        sanitize_for_prompt(truncate_chars(query, 1000)),
    );

    let request = GenerationRequest::structured(
        "patterns",
        vec![
            ChatMessage::system(
                "You turn natural-language code search queries into lexical search patterns. \
                 Respond with ONLY a JSON object matching the schema.",
            ),
            ChatMessage::user(prompt),
        ],
        schema(),
    );

    let raw: SearchPatternSet = llm::generate_structured(generator, &request).await?;
    let mut patterns = SearchPatternSet {
        search_terms: clean_list(raw.search_terms),
        file_patterns: clean_list(raw.file_patterns),
        code_patterns: clean_list(raw.code_patterns),
        framework_hints: clean_list(raw.framework_hints),
    };
    if patterns.search_terms.is_empty() {
        return Err(GenerationError::InvalidResponse(
            "pattern set has no search terms".to_string(),
        ));
    }
    patterns.search_terms.truncate(MAX_TERMS);
    Ok(patterns)
}
