//! Wire protocol codec for the agent subprocess.
//!
//! Outbound: the full conversation history as one JSON array written to the
//! child's stdin. Inbound: newline-delimited JSON objects on stdout, one
//! independent event per line, discriminated by a `type` field.

use crate::error::ProtocolError;
use crate::history::Turn;
use crate::textutil::preview;
use serde::Deserialize;
use serde_json::Value;

/// Tool name the agent uses to ask the human a question mid-turn.
pub const ASK_USER_QUESTION_TOOL: &str = "AskUserQuestion";

/// Maximum characters of a raw line echoed back in parse errors.
const PARSE_ERROR_PREVIEW_CHARS: usize = 120;

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Serialize the history snapshot as the complete stdin payload.
pub fn encode_turns(turns: &[Turn]) -> Result<String, ProtocolError> {
    serde_json::to_string(turns).map_err(ProtocolError::Encode)
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// One decoded stdout line.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Direct assistant text.
    Text { text: String },
    /// Internal tool-result echo; never surfaced.
    User {},
    /// Assistant message with nested content blocks.
    Assistant {
        #[serde(default)]
        message: Option<AssistantMessage>,
    },
    /// Informational event; logged, not surfaced as chat.
    System {},
    /// Agent-reported error.
    Error {
        #[serde(default)]
        error: Option<String>,
    },
    /// Terminal event for the generation.
    Result {
        #[serde(default)]
        permission_denials: Vec<PermissionDenial>,
        #[serde(default)]
        total_cost_usd: f64,
        #[serde(default)]
        duration_ms: u64,
        #[serde(default)]
        duration_api_ms: u64,
        #[serde(default)]
        num_turns: u32,
        #[serde(default)]
        result: Option<String>,
    },
    /// Recognized-but-unhandled event types; skipped with a log line.
    #[serde(other)]
    Unknown,
}

/// Nested payload of an `assistant` event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub usage: Option<TokenUsage>,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

/// Token accounting reported alongside assistant messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
}

/// One ordered content block inside an assistant message.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    ToolUse {
        #[serde(default)]
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    /// Block types this orchestrator does not interpret.
    #[serde(other)]
    Other,
}

/// One entry of a result event's `permission_denials` list.
#[derive(Debug, Clone, Deserialize)]
pub struct PermissionDenial {
    #[serde(default)]
    pub tool_name: String,
    #[serde(default)]
    pub tool_use_id: String,
    #[serde(default)]
    pub tool_input: Value,
}

/// Decode one non-empty stdout line into a typed event.
pub fn parse_line(line: &str) -> Result<StreamEvent, ProtocolError> {
    serde_json::from_str(line).map_err(|e| ProtocolError::Parse {
        preview: preview(line, PARSE_ERROR_PREVIEW_CHARS),
        detail: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// AskUserQuestion extraction
// ---------------------------------------------------------------------------

/// Question text plus flattened multiple-choice option labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionPrompt {
    pub text: String,
    pub options: Vec<String>,
}

/// Build a displayable question from an `AskUserQuestion` tool input.
///
/// The input carries `questions: [{question, options: [{label, ...} | string]}]`
/// with a legacy single-`question` fallback. Options are flattened across all
/// questions; a question without options is answered as free text.
pub fn extract_question(input: &Value) -> QuestionPrompt {
    let mut text = String::new();
    let mut options = Vec::new();

    if let Some(questions) = input.get("questions").and_then(Value::as_array) {
        for (index, question) in questions.iter().enumerate() {
            let question_text = question
                .get("question")
                .and_then(Value::as_str)
                .or_else(|| question.as_str())
                .unwrap_or("(no question text)");
            text.push_str(&format!("{}. {question_text}\n", index + 1));

            if let Some(raw_options) = question.get("options").and_then(Value::as_array) {
                for option in raw_options {
                    // Options are objects with a label, or bare strings.
                    let label = option
                        .get("label")
                        .and_then(Value::as_str)
                        .or_else(|| option.as_str());
                    match label {
                        Some(label) => options.push(label.to_string()),
                        None => options.push(option.to_string()),
                    }
                }
            }
        }
    }

    if text.is_empty() {
        if let Some(single) = input.get("question").and_then(Value::as_str) {
            text.push_str(single);
        }
    }
    if text.is_empty() {
        text.push_str("(no question provided)");
    }

    QuestionPrompt {
        text: text.trim_end().to_string(),
        options,
    }
}
