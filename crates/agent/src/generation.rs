//! Per-turn generation
//!
//! One task per user utterance: retrieve context, assemble the prompt,
//! stream tokens, segment into sentences, scan for tool markers, and push
//! speakable text onto the speech queue. Every suspension point observes
//! the turn's cancel token so a barge-in reaches into the middle of the
//! stream.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use voicegate_core::{GenerateRequest, ToolInvocation, Turn};
use voicegate_llm::prompt::{stop_sequences, PromptBuilder};
use voicegate_pipeline::{clean_markdown_for_tts, SentenceSplitter};
use voicegate_tools::marker::{scan_markers, validate_invocation};

use crate::session::{CallSession, FALLBACK_LINE, TOOL_FAILURE_LINE};

const SOFT_SENTENCE_LIMIT: usize = 200;

enum TurnOutcome {
    /// The stream ran to its end (or the sentence cap); the full cleaned
    /// response and any detected tool are ready
    Completed {
        response: String,
        tool: Option<ToolInvocation>,
    },
    Cancelled,
}

/// Entry point spawned by the session for each utterance
pub(crate) async fn run_generation(
    session: Arc<CallSession>,
    user_text: String,
    cancel: CancellationToken,
) {
    match stream_turn(&session, &user_text, &cancel).await {
        TurnOutcome::Cancelled => {
            tracing::debug!("generation cancelled before completion");
        }
        TurnOutcome::Completed { response, tool } => {
            // History append happens once, after the full reply has been
            // scheduled, and before the next turn can start
            if !response.is_empty() {
                session
                    .append_history(Turn::new(user_text.clone(), response))
                    .await;
            }
            match tool {
                Some(tool) if tool.requires_confirmation => session.set_pending_tool(tool),
                Some(tool) => session.execute_tool(tool, None, &cancel).await,
                None => {}
            }
            session.push_turn_complete(&cancel).await;
        }
    }
}

async fn stream_turn(
    session: &Arc<CallSession>,
    user_text: &str,
    cancel: &CancellationToken,
) -> TurnOutcome {
    let context = session.retriever.retrieve(user_text).await;
    if cancel.is_cancelled() {
        return TurnOutcome::Cancelled;
    }

    let history = session.history_snapshot();
    let prompt = PromptBuilder::new(session.system_prompt())
        .with_call_state(
            session.phase_name(),
            session.last_intent().map(|i| i.as_str().to_string()),
        )
        .with_dynamic_variables(session.dynamic_variables())
        .with_context(context.context_block)
        .with_history(&history, session.config.history_window)
        .build(user_text);

    let request = GenerateRequest {
        prompt,
        model: session.config.model_name.clone(),
        max_tokens: session.config.llm_max_tokens,
        temperature: session.config.llm_temperature,
        stop: stop_sequences(),
    };

    let (token_tx, mut token_rx) = mpsc::channel::<String>(256);
    let llm = session.deps.llm.clone();
    let llm_task = tokio::spawn(async move { llm.generate_stream(request, token_tx).await });

    let mut splitter = SentenceSplitter::new(SOFT_SENTENCE_LIMIT);
    let mut sentences: Vec<String> = Vec::new();
    let mut invocation: Option<ToolInvocation> = None;
    let mut spoken = 0usize;
    let cap = session.config.max_sentences_per_turn;

    'stream: loop {
        let token = tokio::select! {
            // Returning drops the receiver; the backend observes the closed
            // channel and stops generating
            _ = cancel.cancelled() => return TurnOutcome::Cancelled,
            token = token_rx.recv() => token,
        };
        let Some(token) = token else { break };
        session.touch_progress();

        for sentence in splitter.push(&token) {
            if !process_sentence(session, sentence, &mut invocation, &mut sentences, &mut spoken, cancel)
                .await
            {
                return TurnOutcome::Cancelled;
            }
            if spoken >= cap {
                tracing::info!(cap, "sentence cap reached, stopping generation");
                break 'stream;
            }
        }
    }
    // Dropping the receiver cancels a still-running stream (sentence cap)
    drop(token_rx);

    if spoken < cap {
        if let Some(tail) = splitter.flush() {
            if !process_sentence(session, tail, &mut invocation, &mut sentences, &mut spoken, cancel)
                .await
            {
                return TurnOutcome::Cancelled;
            }
        }
    }

    let failed = !matches!(llm_task.await, Ok(Ok(())));
    if cancel.is_cancelled() {
        return TurnOutcome::Cancelled;
    }
    if failed {
        // The user hears a neutral apology, never the error
        tracing::warn!("llm stream error, substituting apology");
        session.enqueue_sentence(FALLBACK_LINE, cancel).await;
        sentences.push(FALLBACK_LINE.to_string());
    }

    TurnOutcome::Completed {
        response: sentences.join(" "),
        tool: invocation,
    }
}

/// Handle one completed sentence: marker scan, markdown cleanup, enqueue.
/// Returns false when the turn was cancelled.
async fn process_sentence(
    session: &Arc<CallSession>,
    raw: String,
    invocation: &mut Option<ToolInvocation>,
    sentences: &mut Vec<String>,
    spoken: &mut usize,
    cancel: &CancellationToken,
) -> bool {
    let scan = scan_markers(&raw);

    if let Some(mut found) = scan.invocation {
        match validate_invocation(&mut found) {
            Ok(()) => {
                if invocation.is_none() {
                    tracing::info!(
                        tool = %found.name,
                        confirm = found.requires_confirmation,
                        "tool marker detected"
                    );
                    *invocation = Some(found);
                } else {
                    tracing::warn!(tool = %found.name, "ignoring second tool marker in turn");
                }
            }
            Err(e) => {
                // Policy violation: apologise, never execute
                tracing::warn!("rejecting tool invocation: {e}");
                if session.enqueue_sentence(TOOL_FAILURE_LINE, cancel).await {
                    *spoken += 1;
                    sentences.push(TOOL_FAILURE_LINE.to_string());
                } else if cancel.is_cancelled() {
                    return false;
                }
            }
        }
    }

    let clean = clean_markdown_for_tts(&scan.clean_text);
    if clean.is_empty() {
        return true;
    }

    sentences.push(clean.clone());
    if *spoken < session.config.max_sentences_per_turn {
        if session.enqueue_sentence(&clean, cancel).await {
            *spoken += 1;
        } else if cancel.is_cancelled() {
            return false;
        }
    }
    true
}
