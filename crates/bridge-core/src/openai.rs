//! OpenAI Chat Completions wire format.
//!
//! These types mirror the OpenAI API byte-for-byte on the wire so clients
//! built for `/v1/chat/completions` (SDKs, Cursor, Open WebUI, LibreChat)
//! work unchanged. Non-standard extension fields (`session_id`,
//! `enable_tools`, `system_prompt`) ride alongside and are ignored by
//! strict OpenAI clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── Roles and messages ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// One conversation message, inbound or stored in a session.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    /// `None` is legal for assistant turns that only carry tool calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Assistant turns invoking tools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Required iff `role == tool`; correlates to a prior assistant tool call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::of(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::of(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::of(Role::System, content)
    }

    fn of(role: Role, content: impl Into<String>) -> Self {
        ChatMessage {
            role,
            content: Some(content.into()),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

// ─── Tool calls and definitions ───────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolCall {
    /// `call_<opaque>`, unique within a conversation.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON text exactly as emitted by the model.
    pub arguments: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolDef {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionDef,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FunctionDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// `tool_choice`: `"auto"`, `"none"`, or a forced function reference.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ToolChoice {
    Mode(String),
    Function {
        #[serde(rename = "type")]
        kind: String,
        function: ForcedFunction,
    },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ForcedFunction {
    pub name: String,
}

// ─── Completion request ───────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub tools: Option<Vec<ToolDef>>,
    pub tool_choice: Option<ToolChoice>,

    // Non-standard extensions.
    /// Opaque session id for multi-turn memory. `None` = stateless.
    pub session_id: Option<String>,
    #[serde(default)]
    pub enable_tools: bool,
    /// Explicit system prompt, appended after any inline system messages.
    pub system_prompt: Option<String>,

    // Standard OpenAI fields the backend cannot honor. Accepted and
    // ignored so strict SDK clients do not break.
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub n: Option<u32>,
    #[serde(default)]
    pub presence_penalty: Option<f64>,
    #[serde(default)]
    pub frequency_penalty: Option<f64>,
    #[serde(default)]
    pub logit_bias: Option<Value>,
    #[serde(default)]
    pub user: Option<String>,
}

// ─── Completion response (non-stream) ─────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    /// Unix seconds.
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: AssistantReply,
    pub finish_reason: FinishReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantReply {
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Usage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
}

// ─── Streaming chunks ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: Delta,
    pub finish_reason: Option<FinishReason>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Delta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionCallDelta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCallDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// Why the model stopped. `Error` is a local convention for mid-stream
/// failures delivered as a final SSE frame before `[DONE]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Error,
}

// ─── ID helpers ───────────────────────────────────────────────────────────

pub fn completion_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
}

pub fn tool_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

pub fn session_id() -> String {
    format!("session_{}", uuid::Uuid::new_v4().simple())
}

pub fn request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().simple())
}

pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_parses_minimal_payload() {
        let req: ChatCompletionRequest = serde_json::from_str(
            r#"{"model":"claude-3-5-sonnet-20241022","messages":[{"role":"user","content":"hi"}]}"#,
        )
        .unwrap();
        assert_eq!(req.model, "claude-3-5-sonnet-20241022");
        assert!(!req.stream);
        assert_eq!(req.session_id, None);
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.messages[0].role, Role::User);
    }

    #[test]
    fn request_parses_tool_choice_variants() {
        let req: ChatCompletionRequest = serde_json::from_str(
            r#"{"model":"m","messages":[{"role":"user","content":"x"}],"tool_choice":"auto"}"#,
        )
        .unwrap();
        assert!(matches!(req.tool_choice, Some(ToolChoice::Mode(ref m)) if m == "auto"));

        let req: ChatCompletionRequest = serde_json::from_str(
            r#"{"model":"m","messages":[{"role":"user","content":"x"}],
                "tool_choice":{"type":"function","function":{"name":"get_weather"}}}"#,
        )
        .unwrap();
        match req.tool_choice {
            Some(ToolChoice::Function { function, .. }) => {
                assert_eq!(function.name, "get_weather")
            }
            other => panic!("expected forced function, got {other:?}"),
        }
    }

    #[test]
    fn request_tolerates_unsupported_openai_fields() {
        let req: ChatCompletionRequest = serde_json::from_str(
            r#"{"model":"m","messages":[{"role":"user","content":"x"}],
                "top_p":0.9,"n":1,"presence_penalty":0.5,"user":"abc"}"#,
        )
        .unwrap();
        assert_eq!(req.top_p, Some(0.9));
        assert_eq!(req.user.as_deref(), Some("abc"));
    }

    #[test]
    fn response_serializes_openai_shape() {
        let resp = ChatCompletionResponse {
            id: "chatcmpl-abc".into(),
            object: "chat.completion".into(),
            created: 1700000000,
            model: "claude-3-5-sonnet-20241022".into(),
            choices: vec![Choice {
                index: 0,
                message: AssistantReply {
                    role: Role::Assistant,
                    content: Some("4".into()),
                    tool_calls: None,
                },
                finish_reason: FinishReason::Stop,
            }],
            usage: Usage::new(10, 5),
            metadata: None,
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["object"], "chat.completion");
        assert_eq!(json["choices"][0]["index"], 0);
        assert_eq!(json["choices"][0]["message"]["role"], "assistant");
        assert_eq!(json["choices"][0]["finish_reason"], "stop");
        assert_eq!(json["usage"]["total_tokens"], 15);
        assert!(json.get("metadata").is_none());
    }

    #[test]
    fn usage_total_is_sum() {
        let usage = Usage::new(120, 34);
        assert_eq!(usage.total_tokens, usage.prompt_tokens + usage.completion_tokens);
    }

    #[test]
    fn chunk_delta_omits_empty_fields() {
        let chunk = ChatCompletionChunk {
            id: "chatcmpl-abc".into(),
            object: "chat.completion.chunk".into(),
            created: 1700000000,
            model: "m".into(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: Delta {
                    content: Some("hel".into()),
                    ..Delta::default()
                },
                finish_reason: None,
            }],
            usage: None,
        };
        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["choices"][0]["delta"]["content"], "hel");
        assert!(json["choices"][0]["delta"].get("role").is_none());
        assert_eq!(json["choices"][0]["finish_reason"], Value::Null);
    }

    #[test]
    fn finish_reason_wire_names() {
        assert_eq!(
            serde_json::to_string(&FinishReason::ToolCalls).unwrap(),
            "\"tool_calls\""
        );
        assert_eq!(
            serde_json::to_string(&FinishReason::ContentFilter).unwrap(),
            "\"content_filter\""
        );
    }

    #[test]
    fn id_helpers_use_expected_prefixes() {
        assert!(completion_id().starts_with("chatcmpl-"));
        assert!(tool_call_id().starts_with("call_"));
        assert!(session_id().starts_with("session_"));
        assert!(request_id().starts_with("req_"));
    }

    #[test]
    fn tool_message_round_trips() {
        let msg = ChatMessage {
            role: Role::Tool,
            content: Some("{\"temp\": 21}".into()),
            name: None,
            tool_calls: None,
            tool_call_id: Some("call_abc".into()),
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: ChatMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.role, Role::Tool);
        assert_eq!(back.tool_call_id.as_deref(), Some("call_abc"));
    }
}
