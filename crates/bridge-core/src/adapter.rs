//! Bidirectional translation between OpenAI message arrays and the prompt
//! form the Claude runtime expects.
//!
//! Forward: an ordered OpenAI `messages[]` becomes one flattened prompt
//! plus an optional coalesced system prompt. Reverse helpers map runtime
//! stop reasons and tool-use blocks back onto OpenAI shapes; the adapter
//! never paraphrases stored turns.

use std::collections::HashSet;

use serde_json::Value;

use crate::error::{BridgeError, Result};
use crate::openai::{
    self, ChatMessage, FinishReason, FunctionCall, Role, ToolCall, ToolChoice, ToolDef,
};

/// The prompt form handed to the Claude runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaudePrompt {
    pub prompt: String,
    pub system_prompt: Option<String>,
}

// ─── Forward: OpenAI → Claude ─────────────────────────────────────────────

/// Flatten an OpenAI conversation into a Claude prompt.
///
/// System messages coalesce in order into a single system prompt; an
/// explicit `system_prompt` field is appended after inline system
/// messages. Tool messages must reference a tool call from a prior
/// assistant turn or the request fails validation.
pub fn build_prompt(
    messages: &[ChatMessage],
    explicit_system: Option<&str>,
    tools: Option<&[ToolDef]>,
    enable_tools: bool,
) -> Result<ClaudePrompt> {
    validate_tool_stitching(messages)?;

    let mut system_parts: Vec<&str> = Vec::new();
    let mut conversation: Vec<&ChatMessage> = Vec::new();
    for msg in messages {
        match msg.role {
            Role::System => {
                if let Some(content) = msg.content.as_deref() {
                    system_parts.push(content);
                }
            }
            _ => conversation.push(msg),
        }
    }
    if let Some(explicit) = explicit_system {
        system_parts.push(explicit);
    }

    let mut system_prompt = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };

    if enable_tools {
        if let Some(tools) = tools.filter(|t| !t.is_empty()) {
            let schema_block = tool_schema_block(tools);
            system_prompt = Some(match system_prompt {
                Some(existing) => format!("{existing}\n\n{schema_block}"),
                None => schema_block,
            });
        }
    }

    let prompt = render_conversation(&conversation);
    Ok(ClaudePrompt {
        prompt,
        system_prompt,
    })
}

/// Every `role=tool` message must name a `tool_call_id` emitted by a prior
/// assistant turn in the same conversation.
fn validate_tool_stitching(messages: &[ChatMessage]) -> Result<()> {
    let mut known_call_ids: HashSet<&str> = HashSet::new();
    for msg in messages {
        match msg.role {
            Role::Assistant => {
                if let Some(calls) = &msg.tool_calls {
                    for call in calls {
                        known_call_ids.insert(call.id.as_str());
                    }
                }
            }
            Role::Tool => {
                let id = msg.tool_call_id.as_deref().ok_or_else(|| {
                    BridgeError::validation_field(
                        "tool message is missing tool_call_id",
                        "tool_call_id",
                    )
                })?;
                if !known_call_ids.contains(id) {
                    return Err(BridgeError::validation_field(
                        format!("tool message references unknown tool_call_id '{id}'"),
                        "tool_call_id",
                    ));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// A single user message passes through verbatim; anything longer becomes
/// a Human/Assistant transcript ending with an `Assistant:` cue.
fn render_conversation(conversation: &[&ChatMessage]) -> String {
    if let [only] = conversation {
        if only.role == Role::User {
            return only.content.clone().unwrap_or_default();
        }
    }

    let mut out = String::new();
    for msg in conversation {
        let content = msg.content.as_deref().unwrap_or("");
        match msg.role {
            Role::User => {
                out.push_str("Human: ");
                out.push_str(content);
                out.push_str("\n\n");
            }
            Role::Assistant => {
                out.push_str("Assistant: ");
                out.push_str(content);
                if let Some(calls) = &msg.tool_calls {
                    for call in calls {
                        out.push_str(&format!(
                            "\n[tool call {} -> {}({})]",
                            call.id, call.function.name, call.function.arguments
                        ));
                    }
                }
                out.push_str("\n\n");
            }
            Role::Tool => {
                let id = msg.tool_call_id.as_deref().unwrap_or("");
                out.push_str(&format!("Tool result ({id}): {content}\n\n"));
            }
            Role::System => unreachable!("system messages are split off before rendering"),
        }
    }
    out.push_str("Assistant:");
    out
}

/// Render tool definitions into a schema block Claude can act on.
fn tool_schema_block(tools: &[ToolDef]) -> String {
    let defs: Vec<Value> = tools
        .iter()
        .map(|t| {
            serde_json::json!({
                "name": t.function.name,
                "description": t.function.description,
                "parameters": t.function.parameters,
            })
        })
        .collect();
    format!(
        "You may call the following tools. To call one, reply with a tool_use block.\n{}",
        serde_json::to_string_pretty(&defs).unwrap_or_default()
    )
}

/// Check `tool_choice` against the declared tool list.
pub fn validate_tool_choice(choice: Option<&ToolChoice>, tools: Option<&[ToolDef]>) -> Result<()> {
    match choice {
        None => Ok(()),
        Some(ToolChoice::Mode(mode)) if mode == "auto" || mode == "none" => Ok(()),
        Some(ToolChoice::Mode(other)) => Err(BridgeError::validation_field(
            format!("tool_choice '{other}' is not one of: auto, none"),
            "tool_choice",
        )),
        Some(ToolChoice::Function { function, .. }) => {
            let declared = tools
                .map(|t| t.iter().any(|d| d.function.name == function.name))
                .unwrap_or(false);
            if declared {
                Ok(())
            } else {
                Err(BridgeError::validation_field(
                    format!("tool_choice names undeclared tool '{}'", function.name),
                    "tool_choice",
                ))
            }
        }
    }
}

// ─── Reverse: Claude → OpenAI ─────────────────────────────────────────────

/// Map a runtime stop reason onto an OpenAI finish_reason.
pub fn finish_reason_for(stop_reason: Option<&str>, has_tool_calls: bool) -> FinishReason {
    if has_tool_calls {
        return FinishReason::ToolCalls;
    }
    match stop_reason {
        Some("max_tokens") => FinishReason::Length,
        Some("tool_use") => FinishReason::ToolCalls,
        Some("refusal") | Some("content_filter") => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

/// Build an OpenAI tool call from a model-emitted function invocation,
/// synthesizing a fresh `call_<opaque>` id.
pub fn synthesize_tool_call(name: &str, arguments: &Value) -> ToolCall {
    ToolCall {
        id: openai::tool_call_id(),
        kind: "function".into(),
        function: FunctionCall {
            name: name.to_string(),
            arguments: arguments.to_string(),
        },
    }
}

/// The assistant turn to append to a session after a completion.
pub fn assistant_turn(content: &str, tool_calls: Vec<ToolCall>) -> ChatMessage {
    ChatMessage {
        role: Role::Assistant,
        content: if content.is_empty() {
            None
        } else {
            Some(content.to_string())
        },
        name: None,
        tool_calls: if tool_calls.is_empty() {
            None
        } else {
            Some(tool_calls)
        },
        tool_call_id: None,
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openai::{ForcedFunction, FunctionDef};

    fn tool_def(name: &str) -> ToolDef {
        ToolDef {
            kind: "function".into(),
            function: FunctionDef {
                name: name.into(),
                description: Some("test tool".into()),
                parameters: Some(serde_json::json!({"type": "object"})),
            },
        }
    }

    fn assistant_with_call(id: &str) -> ChatMessage {
        ChatMessage {
            role: Role::Assistant,
            content: None,
            name: None,
            tool_calls: Some(vec![ToolCall {
                id: id.into(),
                kind: "function".into(),
                function: FunctionCall {
                    name: "get_weather".into(),
                    arguments: "{}".into(),
                },
            }]),
            tool_call_id: None,
        }
    }

    fn tool_result(id: &str) -> ChatMessage {
        ChatMessage {
            role: Role::Tool,
            content: Some("sunny".into()),
            name: None,
            tool_calls: None,
            tool_call_id: Some(id.into()),
        }
    }

    #[test]
    fn single_user_message_passes_through() {
        let prompt = build_prompt(&[ChatMessage::user("What is 2+2?")], None, None, false).unwrap();
        assert_eq!(prompt.prompt, "What is 2+2?");
        assert_eq!(prompt.system_prompt, None);
    }

    #[test]
    fn multi_turn_renders_transcript_in_order() {
        let prompt = build_prompt(
            &[
                ChatMessage::user("My name is Alice."),
                ChatMessage::assistant("Nice to meet you, Alice."),
                ChatMessage::user("What is my name?"),
            ],
            None,
            None,
            false,
        )
        .unwrap();
        let alice_pos = prompt.prompt.find("My name is Alice.").unwrap();
        let question_pos = prompt.prompt.find("What is my name?").unwrap();
        assert!(alice_pos < question_pos);
        assert!(prompt.prompt.ends_with("Assistant:"));
    }

    #[test]
    fn system_messages_coalesce_in_order() {
        let prompt = build_prompt(
            &[
                ChatMessage::system("Be terse."),
                ChatMessage::user("hi"),
                ChatMessage::system("Use metric units."),
            ],
            None,
            None,
            false,
        )
        .unwrap();
        assert_eq!(
            prompt.system_prompt.as_deref(),
            Some("Be terse.\n\nUse metric units.")
        );
    }

    #[test]
    fn explicit_system_prompt_is_appended_last() {
        let prompt = build_prompt(
            &[ChatMessage::system("inline"), ChatMessage::user("hi")],
            Some("explicit"),
            None,
            false,
        )
        .unwrap();
        assert_eq!(prompt.system_prompt.as_deref(), Some("inline\n\nexplicit"));
    }

    #[test]
    fn orphan_tool_message_is_rejected() {
        let err = build_prompt(
            &[ChatMessage::user("hi"), tool_result("call_nowhere")],
            None,
            None,
            false,
        )
        .unwrap_err();
        assert!(matches!(err, BridgeError::Validation { .. }));
    }

    #[test]
    fn tool_message_without_id_is_rejected() {
        let mut orphan = tool_result("call_x");
        orphan.tool_call_id = None;
        let err = build_prompt(&[orphan], None, None, false).unwrap_err();
        match err {
            BridgeError::Validation { field, .. } => {
                assert_eq!(field.as_deref(), Some("tool_call_id"))
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn stitched_tool_message_is_accepted() {
        let prompt = build_prompt(
            &[
                ChatMessage::user("weather?"),
                assistant_with_call("call_1"),
                tool_result("call_1"),
            ],
            None,
            None,
            false,
        )
        .unwrap();
        assert!(prompt.prompt.contains("Tool result (call_1): sunny"));
    }

    #[test]
    fn tool_schemas_land_in_system_prompt_only_when_enabled() {
        let tools = [tool_def("get_weather")];
        let without = build_prompt(&[ChatMessage::user("hi")], None, Some(&tools), false).unwrap();
        assert_eq!(without.system_prompt, None);

        let with = build_prompt(&[ChatMessage::user("hi")], None, Some(&tools), true).unwrap();
        assert!(with.system_prompt.unwrap().contains("get_weather"));
    }

    #[test]
    fn tool_choice_validation() {
        let tools = [tool_def("get_weather")];
        assert!(validate_tool_choice(Some(&ToolChoice::Mode("auto".into())), None).is_ok());
        assert!(validate_tool_choice(Some(&ToolChoice::Mode("none".into())), None).is_ok());
        assert!(validate_tool_choice(Some(&ToolChoice::Mode("always".into())), None).is_err());

        let forced = ToolChoice::Function {
            kind: "function".into(),
            function: ForcedFunction {
                name: "get_weather".into(),
            },
        };
        assert!(validate_tool_choice(Some(&forced), Some(&tools)).is_ok());
        assert!(validate_tool_choice(Some(&forced), None).is_err());
    }

    #[test]
    fn finish_reason_mapping() {
        assert_eq!(finish_reason_for(Some("end_turn"), false), FinishReason::Stop);
        assert_eq!(finish_reason_for(Some("max_tokens"), false), FinishReason::Length);
        assert_eq!(finish_reason_for(Some("tool_use"), false), FinishReason::ToolCalls);
        assert_eq!(finish_reason_for(None, true), FinishReason::ToolCalls);
        assert_eq!(
            finish_reason_for(Some("refusal"), false),
            FinishReason::ContentFilter
        );
        assert_eq!(finish_reason_for(None, false), FinishReason::Stop);
    }

    #[test]
    fn synthesized_tool_calls_have_unique_ids() {
        let args = serde_json::json!({"city": "Oslo"});
        let a = synthesize_tool_call("get_weather", &args);
        let b = synthesize_tool_call("get_weather", &args);
        assert!(a.id.starts_with("call_"));
        assert_ne!(a.id, b.id);
        assert_eq!(a.function.arguments, "{\"city\":\"Oslo\"}");
    }

    #[test]
    fn assistant_turn_drops_empty_parts() {
        let turn = assistant_turn("", vec![]);
        assert_eq!(turn.content, None);
        assert!(turn.tool_calls.is_none());

        let with_text = assistant_turn("4", vec![]);
        assert_eq!(with_text.content.as_deref(), Some("4"));
    }
}
