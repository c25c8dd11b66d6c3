use serde::Deserialize;
use serde_json::json;

use crate::llm::{self, sanitize_for_prompt, truncate_chars, ChatMessage, GenerationRequest, Generator};
use crate::models::{Intent, IntentResult};

const MAX_QUERY_CHARS: usize = 1000;

fn schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "intent": {
                "type": "string",
                "enum": ["code_search", "casual_conversation", "help_request"]
            },
            "confidence": {"type": "number", "minimum": 0, "maximum": 100},
            "reasoning": {"type": "string"},
            "suggested_response": {"type": ["string", "null"]}
        },
        "required": ["intent", "confidence", "reasoning"]
    })
}

#[derive(Deserialize)]
struct RawIntent {
    intent: Intent,
    confidence: f64,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    suggested_response: Option<String>,
}

const SYSTEM_PROMPT: &str = "You classify messages sent to a code search engine.\n\
     - code_search: the user wants to find code, implementations, APIs, patterns or \
     files in their repositories.\n\
     - casual_conversation: greetings, thanks, small talk.\n\
     - help_request: questions about how to use this search tool itself.\n\
     When a message is ambiguous, choose code_search. For casual_conversation and \
     help_request, include a short friendly suggested_response.\n\
     Respond with ONLY a JSON object matching the schema.";

/// Classify a raw query. Never fails: when the model cannot be reached or
/// answers off-schema, the query is treated as a code search.
pub async fn classify_intent(generator: &dyn Generator, query: &str) -> IntentResult {
    let request = GenerationRequest::structured(
        "intent",
        vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "Message: \"{}\"",
                sanitize_for_prompt(truncate_chars(query, MAX_QUERY_CHARS))
            )),
        ],
        schema(),
    );

    match llm::generate_structured::<RawIntent>(generator, &request).await {
        Ok(raw) => IntentResult {
            intent: raw.intent,
            confidence: raw.confidence.clamp(0.0, 100.0).round() as u8,
            reasoning: raw.reasoning,
            suggested_response: raw
                .suggested_response
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        },
        Err(e) => {
            tracing::warn!("Intent classification failed, assuming code search: {e}");
            IntentResult {
                intent: Intent::CodeSearch,
                confidence: 0,
                reasoning: format!("classification unavailable ({e}); defaulting to code search"),
                suggested_response: None,
            }
        }
    }
}

/// Reply for a non-search intent when the classifier suggested none.
pub fn canned_reply(intent: Intent) -> &'static str {
    match intent {
        Intent::CasualConversation => {
            "Hi! Ask me about code in your analyzed repositories, for example \
             \"where is authentication handled?\""
        }
        Intent::HelpRequest => {
            "Describe the code you are looking for in plain words, such as \"OAuth login\" or \
             \"database connection pooling\". You can narrow a search by repository, language, \
             framework or complexity."
        }
        Intent::CodeSearch => "",
    }
}
