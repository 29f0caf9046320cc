//! The completion service: orchestrates one user-visible request.
//!
//! Both shapes share the same front half — validate, merge session
//! history, build the Claude prompt, start the runtime — and differ only
//! in how events leave: aggregated into one response, or forwarded as
//! OpenAI chunks over SSE. Client disconnects cancel by dropping the
//! runtime stream, which kills the subprocess; a cancelled request never
//! commits its assistant turn.

use std::convert::Infallible;
use std::time::Instant;

use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use bridge_core::adapter;
use bridge_core::openai::{
    self, AssistantReply, ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse,
    Choice, ChunkChoice, Delta, FinishReason, FunctionCallDelta, ResponseMetadata, Role, ToolCall,
    ToolCallDelta, Usage,
};
use claude_agent::{CompletionOptions, EventStream, RuntimeEvent};

use crate::error::ApiError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request preparation (shared by both shapes)
// ---------------------------------------------------------------------------

struct Prepared {
    model: String,
    prompt: String,
    session_id: Option<String>,
    opts: CompletionOptions,
}

fn validate(state: &AppState, req: &ChatCompletionRequest) -> Result<String, ApiError> {
    if req.messages.is_empty() {
        return Err(ApiError::validation(
            "messages must not be empty",
            Some("messages".into()),
        ));
    }

    let Some(canonical) = state.models.canonical_id(&req.model) else {
        return Err(ApiError::unknown_model(
            &req.model,
            state.models.suggestions_for(&req.model),
            state
                .models
                .available_ids()
                .iter()
                .map(|s| s.to_string())
                .collect(),
        ));
    };

    adapter::validate_tool_choice(req.tool_choice.as_ref(), req.tools.as_deref())?;

    if req.top_p.is_some() || req.n.is_some() || req.presence_penalty.is_some()
        || req.frequency_penalty.is_some() || req.logit_bias.is_some()
    {
        tracing::debug!("ignoring unsupported OpenAI sampling fields on request");
    }

    Ok(canonical.to_string())
}

fn prepare(state: &AppState, req: &ChatCompletionRequest) -> Result<Prepared, ApiError> {
    let model = validate(state, req)?;

    // Session merge: incoming messages append first, then the full
    // history drives the prompt. Stateless requests pass through.
    let (history, session_id) = state
        .sessions
        .process(req.messages.clone(), req.session_id.as_deref());

    let (session_system, session_max_turns) = match &session_id {
        Some(id) => match state.sessions.get(id) {
            Ok(session) => (session.system_prompt, session.max_turns),
            Err(_) => (None, None),
        },
        None => (None, None),
    };

    let explicit_system = req
        .system_prompt
        .as_deref()
        .or(session_system.as_deref());
    let prompt = adapter::build_prompt(
        &history,
        explicit_system,
        req.tools.as_deref(),
        req.enable_tools,
    )?;

    let opts = CompletionOptions {
        model: Some(model.clone()),
        system_prompt: prompt.system_prompt,
        max_turns: session_max_turns,
        env: Default::default(),
    };

    Ok(Prepared {
        model,
        prompt: prompt.prompt,
        session_id,
        opts,
    })
}

// ---------------------------------------------------------------------------
// Non-streaming
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Aggregated {
    text: String,
    tool_calls: Vec<ToolCall>,
    finish: FinishReason,
    usage: Usage,
    cost_usd: Option<f64>,
}

pub async fn complete(
    state: &AppState,
    req: ChatCompletionRequest,
) -> Result<ChatCompletionResponse, ApiError> {
    let prepared = prepare(state, &req)?;

    let events = state
        .runtime
        .run_completion(prepared.prompt.clone(), prepared.opts.clone())
        .await?;
    let aggregated = drive_to_completion(events, state.config.request_timeout).await?;

    if let Some(session_id) = &prepared.session_id {
        state.sessions.append(
            session_id,
            vec![adapter::assistant_turn(
                &aggregated.text,
                aggregated.tool_calls.clone(),
            )],
        );
    }
    state.metrics.record_completion(false);

    let has_tool_calls = !aggregated.tool_calls.is_empty();
    Ok(ChatCompletionResponse {
        id: openai::completion_id(),
        object: "chat.completion".into(),
        created: openai::unix_now(),
        model: prepared.model,
        choices: vec![Choice {
            index: 0,
            message: AssistantReply {
                role: Role::Assistant,
                content: if aggregated.text.is_empty() && has_tool_calls {
                    None
                } else {
                    Some(aggregated.text)
                },
                tool_calls: has_tool_calls.then_some(aggregated.tool_calls),
            },
            finish_reason: aggregated.finish,
        }],
        usage: aggregated.usage,
        metadata: aggregated
            .cost_usd
            .map(|cost| ResponseMetadata { cost_usd: Some(cost) }),
    })
}

/// Consume the runtime stream to its terminal event under a deadline.
async fn drive_to_completion(
    mut events: EventStream,
    deadline: std::time::Duration,
) -> Result<Aggregated, ApiError> {
    let started = Instant::now();
    let mut text = String::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();
    let mut turn_stop_reason: Option<String> = None;

    loop {
        let Some(remaining) = deadline.checked_sub(started.elapsed()) else {
            return Err(ApiError::timeout(deadline.as_secs()));
        };
        let next = tokio::time::timeout(remaining, events.next())
            .await
            .map_err(|_| ApiError::timeout(deadline.as_secs()))?;

        match next {
            None => {
                return Err(ApiError::upstream(
                    "claude stream ended without a result event",
                ))
            }
            Some(Err(e)) => return Err(e.into()),
            Some(Ok(RuntimeEvent::Assistant(assistant))) => {
                text.push_str(&assistant.text());
                for (name, input) in assistant.tool_uses() {
                    tool_calls.push(adapter::synthesize_tool_call(name, input));
                }
                if let Some(reason) = &assistant.message.stop_reason {
                    turn_stop_reason = Some(reason.clone());
                }
            }
            Some(Ok(RuntimeEvent::Result(result))) => {
                if result.is_error() {
                    let detail = result.errors().join("; ");
                    return Err(ApiError::upstream(if detail.is_empty() {
                        "claude run failed".to_string()
                    } else {
                        detail
                    }));
                }
                // Some CLI versions emit the final text only on the
                // terminal event.
                if text.is_empty() {
                    if let Some(final_text) = result.result_text() {
                        text.push_str(final_text);
                    }
                }
                let usage = result
                    .usage()
                    .map(|u| Usage::new(u.input_tokens, u.output_tokens))
                    .unwrap_or_default();
                let finish = adapter::finish_reason_for(
                    result.stop_reason().or(turn_stop_reason.as_deref()),
                    !tool_calls.is_empty(),
                );
                return Ok(Aggregated {
                    text,
                    tool_calls,
                    finish,
                    usage,
                    cost_usd: result.total_cost_usd(),
                });
            }
            // System init and tool-result passthroughs carry no
            // client-visible delta.
            Some(Ok(_)) => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Streaming
// ---------------------------------------------------------------------------

pub async fn complete_stream(
    state: AppState,
    req: ChatCompletionRequest,
) -> Result<impl IntoResponse, ApiError> {
    let prepared = prepare(&state, &req)?;

    // Spawn failures surface as a plain HTTP error before any SSE bytes.
    let events = state
        .runtime
        .run_completion(prepared.prompt.clone(), prepared.opts.clone())
        .await?;

    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(32);
    tokio::spawn(produce_chunks(state.clone(), prepared, events, tx));

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store"),
    );
    headers.insert(
        header::HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );
    Ok((
        headers,
        Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::default()),
    ))
}

/// Forward runtime events as OpenAI chunks until the terminal event.
///
/// Every send is fallible: a closed channel means the client went away,
/// and returning drops `events`, which kills the subprocess. The session
/// append happens only after the final chunk was accepted.
async fn produce_chunks(
    state: AppState,
    prepared: Prepared,
    mut events: EventStream,
    tx: mpsc::Sender<Result<Event, Infallible>>,
) {
    let id = openai::completion_id();
    let created = openai::unix_now();
    let model = prepared.model.clone();
    let deadline = state.config.request_timeout;
    let started = Instant::now();

    let mut text = String::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();
    let mut turn_stop_reason: Option<String> = None;

    // Opening chunk announces the role.
    let opener = chunk_of(
        &id,
        created,
        &model,
        Delta {
            role: Some(Role::Assistant),
            ..Delta::default()
        },
        None,
        None,
    );
    if send_chunk(&tx, &opener).await.is_err() {
        return;
    }

    loop {
        let Some(remaining) = deadline.checked_sub(started.elapsed()) else {
            fail_stream(&tx, &id, created, &model, ApiError::timeout(deadline.as_secs())).await;
            return;
        };
        let next = match tokio::time::timeout(remaining, events.next()).await {
            Ok(next) => next,
            Err(_) => {
                fail_stream(&tx, &id, created, &model, ApiError::timeout(deadline.as_secs()))
                    .await;
                return;
            }
        };

        match next {
            None => {
                fail_stream(
                    &tx,
                    &id,
                    created,
                    &model,
                    ApiError::upstream("claude stream ended without a result event"),
                )
                .await;
                return;
            }
            Some(Err(e)) => {
                fail_stream(&tx, &id, created, &model, e.into()).await;
                return;
            }
            Some(Ok(RuntimeEvent::Assistant(assistant))) => {
                let fragment = assistant.text();
                if !fragment.is_empty() {
                    text.push_str(&fragment);
                    let chunk = chunk_of(
                        &id,
                        created,
                        &model,
                        Delta {
                            content: Some(fragment),
                            ..Delta::default()
                        },
                        None,
                        None,
                    );
                    if send_chunk(&tx, &chunk).await.is_err() {
                        return;
                    }
                }
                for (name, input) in assistant.tool_uses() {
                    let call = adapter::synthesize_tool_call(name, input);
                    let chunk = chunk_of(
                        &id,
                        created,
                        &model,
                        Delta {
                            tool_calls: Some(vec![ToolCallDelta {
                                index: tool_calls.len() as u32,
                                id: Some(call.id.clone()),
                                kind: Some("function".into()),
                                function: Some(FunctionCallDelta {
                                    name: Some(call.function.name.clone()),
                                    arguments: Some(call.function.arguments.clone()),
                                }),
                            }]),
                            ..Delta::default()
                        },
                        None,
                        None,
                    );
                    tool_calls.push(call);
                    if send_chunk(&tx, &chunk).await.is_err() {
                        return;
                    }
                }
                if let Some(reason) = &assistant.message.stop_reason {
                    turn_stop_reason = Some(reason.clone());
                }
            }
            Some(Ok(RuntimeEvent::Result(result))) => {
                if result.is_error() {
                    let detail = result.errors().join("; ");
                    let err = ApiError::upstream(if detail.is_empty() {
                        "claude run failed".to_string()
                    } else {
                        detail
                    });
                    fail_stream(&tx, &id, created, &model, err).await;
                    return;
                }

                // A run whose only text arrived on the terminal event
                // still owes the client exactly one content delta.
                if text.is_empty() && tool_calls.is_empty() {
                    if let Some(final_text) = result.result_text().filter(|t| !t.is_empty()) {
                        text.push_str(final_text);
                        let chunk = chunk_of(
                            &id,
                            created,
                            &model,
                            Delta {
                                content: Some(final_text.to_string()),
                                ..Delta::default()
                            },
                            None,
                            None,
                        );
                        if send_chunk(&tx, &chunk).await.is_err() {
                            return;
                        }
                    }
                }

                let usage = result
                    .usage()
                    .map(|u| Usage::new(u.input_tokens, u.output_tokens))
                    .unwrap_or_default();
                let finish = adapter::finish_reason_for(
                    result.stop_reason().or(turn_stop_reason.as_deref()),
                    !tool_calls.is_empty(),
                );
                let final_chunk =
                    chunk_of(&id, created, &model, Delta::default(), Some(finish), Some(usage));
                if send_chunk(&tx, &final_chunk).await.is_err() {
                    return;
                }

                // The stream completed: commit the assistant turn.
                if let Some(session_id) = &prepared.session_id {
                    state
                        .sessions
                        .append(session_id, vec![adapter::assistant_turn(&text, tool_calls)]);
                }
                state.metrics.record_completion(true);

                let _ = tx.send(Ok(Event::default().data("[DONE]"))).await;
                return;
            }
            Some(Ok(_)) => {}
        }
    }
}

fn chunk_of(
    id: &str,
    created: i64,
    model: &str,
    delta: Delta,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
) -> ChatCompletionChunk {
    ChatCompletionChunk {
        id: id.to_string(),
        object: "chat.completion.chunk".into(),
        created,
        model: model.to_string(),
        choices: vec![ChunkChoice {
            index: 0,
            delta,
            finish_reason,
        }],
        usage,
    }
}

async fn send_chunk(
    tx: &mpsc::Sender<Result<Event, Infallible>>,
    chunk: &ChatCompletionChunk,
) -> Result<(), ()> {
    let payload = match serde_json::to_string(chunk) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::error!(%err, "failed to serialize stream chunk");
            return Err(());
        }
    };
    tx.send(Ok(Event::default().data(payload)))
        .await
        .map_err(|_| ())
}

/// Mid-stream failure: the HTTP status is long gone, so the error rides
/// as a final frame with the local `finish_reason = "error"` convention,
/// then `[DONE]`.
async fn fail_stream(
    tx: &mpsc::Sender<Result<Event, Infallible>>,
    id: &str,
    created: i64,
    model: &str,
    err: ApiError,
) {
    tracing::warn!(code = %err.code, "streaming completion failed: {}", err.message);
    let chunk = chunk_of(
        id,
        created,
        model,
        Delta::default(),
        Some(FinishReason::Error),
        None,
    );
    if send_chunk(tx, &chunk).await.is_ok() {
        let _ = tx.send(Ok(Event::default().data("[DONE]"))).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
