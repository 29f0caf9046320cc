use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ─── Runtime event stream ─────────────────────────────────────────────────

/// Every event emitted by `claude --print --output-format stream-json`.
/// Discriminated by the JSON `"type"` field. The sequence for one
/// invocation is: one `System` init, zero or more `Assistant` turns
/// (text and/or tool-use blocks), zero or more `User` tool-result
/// passthroughs, and one terminal `Result`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    System(SystemEvent),
    Assistant(AssistantEvent),
    User(UserEvent),
    Result(ResultEvent),
}

impl RuntimeEvent {
    /// Returns `Some(&ResultEvent)` if this is the terminal event.
    pub fn as_result(&self) -> Option<&ResultEvent> {
        if let RuntimeEvent::Result(r) = self {
            Some(r)
        } else {
            None
        }
    }
}

// ─── System events ────────────────────────────────────────────────────────

/// `type = "system"` — further distinguished by `subtype`. Only the
/// `init` payload matters to the gateway; everything else is skipped.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SystemEvent {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(flatten)]
    pub payload: SystemPayload,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub enum SystemPayload {
    /// First event — carries the effective model and runtime session info.
    Init(SystemInit),
    /// Any other system subtype — safe to ignore.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SystemInit {
    pub model: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default, alias = "permissionMode")]
    pub permission_mode: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
}

// ─── Assistant events ─────────────────────────────────────────────────────

/// `type = "assistant"` — a model turn, including content blocks.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssistantEvent {
    pub message: AssistantContent,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssistantContent {
    #[serde(default)]
    pub id: Option<String>,
    pub role: String,
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

impl AssistantEvent {
    /// Concatenated text of all text blocks in this turn.
    pub fn text(&self) -> String {
        self.message
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Tool invocations in this turn, in emission order.
    pub fn tool_uses(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
        self.message.content.iter().filter_map(|block| match block {
            ContentBlock::ToolUse { name, input, .. } => Some((name.as_str(), input)),
            _ => None,
        })
    }
}

/// Content blocks within an assistant turn.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        /// Tool inputs are schema-polymorphic, so Value is correct here.
        input: serde_json::Value,
    },
    Thinking {
        thinking: String,
    },
}

// ─── User events ──────────────────────────────────────────────────────────

/// `type = "user"` — tool results fed back to the model mid-run. The
/// gateway passes these through without interpretation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserEvent {
    pub message: serde_json::Value,
    #[serde(default)]
    pub session_id: Option<String>,
}

// ─── Result events ────────────────────────────────────────────────────────

/// `type = "result"` — the terminal event in every invocation.
/// `subtype` distinguishes success from the error conditions.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub enum ResultEvent {
    Success(ResultSuccess),
    ErrorDuringExecution(ResultError),
    ErrorMaxTurns(ResultError),
}

impl ResultEvent {
    pub fn is_error(&self) -> bool {
        !matches!(self, ResultEvent::Success(_))
    }

    /// The final result text. `None` for error subtypes.
    pub fn result_text(&self) -> Option<&str> {
        if let ResultEvent::Success(r) = self {
            Some(&r.result)
        } else {
            None
        }
    }

    pub fn stop_reason(&self) -> Option<&str> {
        match self {
            ResultEvent::Success(r) => r.stop_reason.as_deref(),
            ResultEvent::ErrorDuringExecution(r) | ResultEvent::ErrorMaxTurns(r) => {
                r.stop_reason.as_deref()
            }
        }
    }

    pub fn usage(&self) -> Option<&ResultUsage> {
        match self {
            ResultEvent::Success(r) => r.usage.as_ref(),
            ResultEvent::ErrorDuringExecution(r) | ResultEvent::ErrorMaxTurns(r) => {
                r.usage.as_ref()
            }
        }
    }

    pub fn total_cost_usd(&self) -> Option<f64> {
        match self {
            ResultEvent::Success(r) => r.total_cost_usd,
            ResultEvent::ErrorDuringExecution(r) | ResultEvent::ErrorMaxTurns(r) => {
                r.total_cost_usd
            }
        }
    }

    pub fn errors(&self) -> &[String] {
        match self {
            ResultEvent::Success(_) => &[],
            ResultEvent::ErrorDuringExecution(r) | ResultEvent::ErrorMaxTurns(r) => &r.errors,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResultSuccess {
    #[serde(default)]
    pub session_id: Option<String>,
    pub result: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub num_turns: u32,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub total_cost_usd: Option<f64>,
    #[serde(default)]
    pub usage: Option<ResultUsage>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResultError {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub num_turns: u32,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub total_cost_usd: Option<f64>,
    #[serde(default)]
    pub usage: Option<ResultUsage>,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct ResultUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_creation_input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_input_tokens: Option<u64>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

// ─── CompletionOptions ────────────────────────────────────────────────────

/// Options for one Claude subprocess invocation.
#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    /// Claude model id (canonical; aliases resolved by the caller).
    pub model: Option<String>,
    /// System prompt override for this invocation.
    pub system_prompt: Option<String>,
    /// Maximum agentic turns before the CLI stops with `error_max_turns`.
    pub max_turns: Option<u32>,
    /// Environment overlay from the auth resolver, merged over the
    /// process environment at spawn.
    pub env: HashMap<String, String>,
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_system_init() {
        let line = r#"{"type":"system","subtype":"init","session_id":"s1","model":"claude-sonnet-4-20250514","tools":["Bash"],"cwd":"/tmp"}"#;
        let event: RuntimeEvent = serde_json::from_str(line).unwrap();
        match event {
            RuntimeEvent::System(sys) => match sys.payload {
                SystemPayload::Init(init) => {
                    assert_eq!(init.model, "claude-sonnet-4-20250514");
                    assert_eq!(init.tools, vec!["Bash"]);
                }
                _ => panic!("expected init"),
            },
            _ => panic!("expected system"),
        }
    }

    #[test]
    fn unknown_system_subtype_is_tolerated() {
        let line = r#"{"type":"system","subtype":"status","session_id":"s1","status":"thinking"}"#;
        let event: RuntimeEvent = serde_json::from_str(line).unwrap();
        assert!(matches!(
            event,
            RuntimeEvent::System(SystemEvent {
                payload: SystemPayload::Unknown,
                ..
            })
        ));
    }

    #[test]
    fn assistant_text_concatenates_blocks() {
        let line = r#"{"type":"assistant","session_id":"s1","message":{"id":"m1","role":"assistant","content":[{"type":"text","text":"2+2 "},{"type":"thinking","thinking":"..."},{"type":"text","text":"is 4"}],"stop_reason":"end_turn"}}"#;
        let event: RuntimeEvent = serde_json::from_str(line).unwrap();
        match event {
            RuntimeEvent::Assistant(a) => assert_eq!(a.text(), "2+2 is 4"),
            _ => panic!("expected assistant"),
        }
    }

    #[test]
    fn assistant_tool_uses_are_extracted_in_order() {
        let line = r#"{"type":"assistant","session_id":"s1","message":{"role":"assistant","content":[{"type":"tool_use","id":"t1","name":"get_weather","input":{"city":"Oslo"}},{"type":"tool_use","id":"t2","name":"get_time","input":{}}]}}"#;
        let event: RuntimeEvent = serde_json::from_str(line).unwrap();
        match event {
            RuntimeEvent::Assistant(a) => {
                let names: Vec<_> = a.tool_uses().map(|(name, _)| name).collect();
                assert_eq!(names, vec!["get_weather", "get_time"]);
            }
            _ => panic!("expected assistant"),
        }
    }

    #[test]
    fn parses_success_result() {
        let line = r#"{"type":"result","subtype":"success","session_id":"s1","result":"4","duration_ms":900,"num_turns":1,"stop_reason":"end_turn","total_cost_usd":0.003,"usage":{"input_tokens":12,"output_tokens":3}}"#;
        let event: RuntimeEvent = serde_json::from_str(line).unwrap();
        let result = event.as_result().unwrap();
        assert!(!result.is_error());
        assert_eq!(result.result_text(), Some("4"));
        assert_eq!(result.usage().unwrap().input_tokens, 12);
        assert_eq!(result.total_cost_usd(), Some(0.003));
    }

    #[test]
    fn parses_error_result_with_reasons() {
        let line = r#"{"type":"result","subtype":"error_during_execution","session_id":"s1","duration_ms":10,"num_turns":0,"errors":["credit exhausted"]}"#;
        let event: RuntimeEvent = serde_json::from_str(line).unwrap();
        let result = event.as_result().unwrap();
        assert!(result.is_error());
        assert_eq!(result.result_text(), None);
        assert_eq!(result.errors(), ["credit exhausted"]);
    }

    #[test]
    fn user_tool_result_passthrough_parses() {
        let line = r#"{"type":"user","session_id":"s1","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"t1","content":"sunny"}]}}"#;
        let event: RuntimeEvent = serde_json::from_str(line).unwrap();
        assert!(matches!(event, RuntimeEvent::User(_)));
    }
}
