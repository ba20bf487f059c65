//! Per-call session controller
//!
//! ## Architecture
//!
//! ```text
//! carrier ──► intake loop ──► AudioRing ──► STT writer ──► recognition
//!                │                                             │
//!                ▼ energy                                      ▼ events
//!         InterruptDetector                              TurnAssembler
//!                │ cancel                                      │ gate
//!                ▼                                             ▼
//!          cancel token ◄──────────────────────────── generation task
//!                │                                             │ sentences
//!                ▼                                             ▼
//!           TTS drainer ◄──────────────────────────────  SpeechQueue
//!                │ media frames
//!                ▼
//!             carrier
//! ```
//!
//! Each session owns a fixed set of workers: the intake loop, the STT
//! writer and reader, the end-of-turn gate ticker, at most one generation
//! task, the TTS drainer, and a watchdog. A single edge-triggered
//! cancellation token per turn carries the barge-in signal into all of
//! them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use voicegate_config::{AgentProfile, CallOverrides, Settings};
use voicegate_core::{
    audio, render_transcript, CallContext, ConversationRecord, ConversationStatus,
    ConversationStore, Embedder, LanguageModel, MediaTransport, SpeechToText, SttEvent,
    SttStream, TextToSpeech, ToolExecutor, ToolInvocation, Turn, VectorSearch, WebhookSink,
};
use voicegate_pipeline::{
    AudioRing, GateConfig, InterruptConfig, InterruptDetector, SentenceSplitter, SpeechItem,
    TtsNotice, TtsStreamer, TurnAssembler,
};
use voicegate_rag::{ContextRetriever, RetrieverConfig};
use voicegate_tools::{events, TOOL_END_CALL};

use crate::generation;
use crate::intent::{classify_intent, detect_confirmation, Confirmation, Intent};

/// Canonical user-facing fallback line; the user never hears an
/// engineering-flavoured error
pub const FALLBACK_LINE: &str =
    "I'm having trouble responding right now. Could you repeat that?";
pub(crate) const TOOL_FAILURE_LINE: &str = "I'm sorry, I wasn't able to do that.";
const CONFIRM_REPROMPT_LINE: &str = "Could you please confirm yes or no?";
const CONFIRM_CANCELLED_LINE: &str = "Understood, cancelled. How else can I help?";
const DEFAULT_FAREWELL: &str = "Goodbye, take care.";

const SPEECH_QUEUE_CAPACITY: usize = 8;
const AUDIO_RING_CAPACITY: usize = 64;
const CLEAR_REPEAT_GAP: Duration = Duration::from_millis(10);
const QUEUE_PUSH_TIMEOUT: Duration = Duration::from_secs(2);
const GATE_TICK: Duration = Duration::from_millis(50);

/// Call phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Greeting,
    Listening,
    Responding,
    AwaitingConfirmation,
    Ending,
}

/// Events observable by the server and tests
#[derive(Debug, Clone)]
pub enum SessionEvent {
    PhaseChanged { from: CallPhase, to: CallPhase },
    Utterance { text: String },
    BargeIn,
    Ended { status: ConversationStatus },
}

/// Inputs from the carrier socket
#[derive(Debug)]
pub enum SessionInput {
    /// One base64 µ-law media frame
    Media { payload: String },
    /// Carrier mark event, ignored by the pipeline
    Mark,
    /// Carrier ended the stream
    Stop,
}

/// Resolved per-session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub gate: GateConfig,
    pub interrupt: InterruptConfig,
    pub history_window: usize,
    pub inactivity_timeout: Duration,
    /// Silence in Responding without outbound progress that counts as a
    /// fatal stall
    pub responding_stall: Duration,
    pub llm_max_tokens: usize,
    pub llm_temperature: f32,
    /// Sentences spoken per turn before the rest of the stream is consumed
    /// silently
    pub max_sentences_per_turn: usize,
    pub farewell_message: String,
    /// Effective voice id after override resolution
    pub voice_id: String,
    /// Effective model override, if any
    pub model_name: Option<String>,
}

impl SessionConfig {
    /// Resolve settings, profile, and per-call overrides
    pub fn resolve(settings: &Settings, profile: &AgentProfile, overrides: &CallOverrides) -> Self {
        let silence_sec = profile
            .silence_threshold_sec
            .unwrap_or(settings.turn.silence_threshold_sec);
        Self {
            gate: GateConfig {
                silence_threshold: Duration::from_secs_f64(silence_sec),
                interim_enabled: settings.turn.interim_processing_enabled,
                interim_min_length: settings.turn.interim_min_length,
                ..GateConfig::default()
            },
            interrupt: InterruptConfig {
                enabled: settings.interrupt.enabled && profile.interrupt_enabled,
                min_energy: settings.interrupt.min_energy,
                baseline_factor: settings.interrupt.baseline_factor,
                min_speech: Duration::from_millis(settings.interrupt.min_speech_ms),
                debounce: Duration::from_millis(settings.interrupt.debounce_ms),
                required_samples: settings.interrupt.required_samples,
                ..InterruptConfig::default()
            },
            history_window: settings.session.history_window,
            inactivity_timeout: settings.session.inactivity_timeout(),
            responding_stall: Duration::from_secs(3),
            llm_max_tokens: settings.llm.max_tokens,
            llm_temperature: settings.llm.temperature,
            max_sentences_per_turn: 10,
            farewell_message: DEFAULT_FAREWELL.to_string(),
            voice_id: profile
                .effective_voice(overrides, &settings.speech.tts_voice)
                .to_string(),
            model_name: {
                let model = profile.effective_model(overrides, &settings.llm.model);
                if model == settings.llm.model {
                    None
                } else {
                    Some(model.to_string())
                }
            },
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            gate: GateConfig::default(),
            interrupt: InterruptConfig::default(),
            history_window: 6,
            inactivity_timeout: Duration::from_secs(30),
            responding_stall: Duration::from_secs(3),
            llm_max_tokens: 1200,
            llm_temperature: 0.2,
            max_sentences_per_turn: 10,
            farewell_message: DEFAULT_FAREWELL.to_string(),
            voice_id: String::new(),
            model_name: None,
        }
    }
}

/// External collaborators injected at session creation
#[derive(Clone)]
pub struct SessionDeps {
    pub stt: Arc<dyn SpeechToText>,
    pub tts: Arc<dyn TextToSpeech>,
    pub llm: Arc<dyn LanguageModel>,
    pub embedder: Arc<dyn Embedder>,
    pub vectors: Arc<dyn VectorSearch>,
    pub tools: Arc<dyn ToolExecutor>,
    pub store: Arc<dyn ConversationStore>,
    pub webhooks: Arc<dyn WebhookSink>,
    pub retriever_config: RetrieverConfig,
}

/// Everything needed to start one session
pub struct SessionParams {
    pub call_id: String,
    pub stream_id: String,
    pub profile: AgentProfile,
    pub overrides: CallOverrides,
    pub config: SessionConfig,
    pub transport: Arc<dyn MediaTransport>,
    pub deps: SessionDeps,
}

/// One live call
pub struct CallSession {
    call_id: String,
    stream_id: String,
    profile: AgentProfile,
    overrides: CallOverrides,
    pub(crate) config: SessionConfig,
    pub(crate) deps: SessionDeps,
    pub(crate) retriever: ContextRetriever,
    transport: Arc<dyn MediaTransport>,

    phase: RwLock<CallPhase>,
    pub(crate) history: Mutex<Vec<Turn>>,
    assembler: Mutex<TurnAssembler>,
    detector: Mutex<InterruptDetector>,
    turn_cancel: Mutex<CancellationToken>,
    pending_tool: Mutex<Option<ToolInvocation>>,
    last_intent: Mutex<Option<Intent>>,
    gen_task: Mutex<Option<tokio::task::JoinHandle<()>>>,

    ring: Mutex<AudioRing>,
    ring_notify: Notify,
    speech_tx: mpsc::Sender<SpeechItem>,
    speech_rx: Mutex<Option<mpsc::Receiver<SpeechItem>>>,
    notice_rx: Mutex<Option<mpsc::Receiver<TtsNotice>>>,
    notice_tx: mpsc::Sender<TtsNotice>,

    speaking: AtomicBool,
    ending_after_drain: AtomicBool,
    ended: AtomicBool,
    last_activity: Mutex<Instant>,
    /// Outbound progress clock shared with the TTS drainer and generation
    progress: Arc<Mutex<Instant>>,
    last_transport_error: Mutex<Option<Instant>>,

    shutdown: CancellationToken,
    events: broadcast::Sender<SessionEvent>,
}

impl CallSession {
    /// Create a session and the channel the server feeds it through
    pub fn new(params: SessionParams) -> (Arc<Self>, mpsc::Sender<SessionInput>) {
        let (input_tx, input_rx) = mpsc::channel(256);
        let (speech_tx, speech_rx) = mpsc::channel(SPEECH_QUEUE_CAPACITY);
        let (notice_tx, notice_rx) = mpsc::channel(16);
        let (events, _) = broadcast::channel(64);

        let retriever = ContextRetriever::new(
            params.deps.embedder.clone(),
            params.deps.vectors.clone(),
            params.deps.retriever_config.clone(),
        );

        let session = Arc::new(Self {
            call_id: params.call_id,
            stream_id: params.stream_id,
            profile: params.profile,
            overrides: params.overrides,
            assembler: Mutex::new(TurnAssembler::new(params.config.gate.clone())),
            detector: Mutex::new(InterruptDetector::new(params.config.interrupt.clone())),
            config: params.config,
            deps: params.deps,
            retriever,
            transport: params.transport,
            phase: RwLock::new(CallPhase::Greeting),
            history: Mutex::new(Vec::new()),
            turn_cancel: Mutex::new(CancellationToken::new()),
            pending_tool: Mutex::new(None),
            last_intent: Mutex::new(None),
            gen_task: Mutex::new(None),
            ring: Mutex::new(AudioRing::new(AUDIO_RING_CAPACITY)),
            ring_notify: Notify::new(),
            speech_tx,
            speech_rx: Mutex::new(Some(speech_rx)),
            notice_rx: Mutex::new(Some(notice_rx)),
            notice_tx,
            speaking: AtomicBool::new(false),
            ending_after_drain: AtomicBool::new(false),
            ended: AtomicBool::new(false),
            last_activity: Mutex::new(Instant::now()),
            progress: Arc::new(Mutex::new(Instant::now())),
            last_transport_error: Mutex::new(None),
            shutdown: CancellationToken::new(),
            events,
        });

        let runner = session.clone();
        tokio::spawn(runner.run(input_rx));

        (session, input_tx)
    }

    /// Drive the session until the carrier stops or a fatal error ends it
    async fn run(self: Arc<Self>, mut inbound: mpsc::Receiver<SessionInput>) {
        tracing::info!(call_id = %self.call_id, stream_id = %self.stream_id, "session starting");

        let record =
            ConversationRecord::started(self.call_id.clone(), Some(self.profile.name.clone()));
        if let Err(e) = self.deps.store.create(record).await {
            tracing::warn!("conversation create failed: {e}");
        }
        self.deps.webhooks.dispatch(
            events::CALL_STARTED,
            json!({ "conversation_id": self.call_id, "stream_id": self.stream_id }),
        );

        // TTS drainer
        if let Some(speech_rx) = self.speech_rx.lock().take() {
            let streamer = TtsStreamer::new(
                self.deps.tts.clone(),
                self.transport.clone(),
                self.config.voice_id.clone(),
                self.notice_tx.clone(),
                self.progress.clone(),
            );
            tokio::spawn(streamer.run(speech_rx));
        }

        // Remaining workers
        if let Some(notice_rx) = self.notice_rx.lock().take() {
            tokio::spawn(self.clone().notices_task(notice_rx));
        }
        tokio::spawn(self.clone().stt_task());
        tokio::spawn(self.clone().gate_task());
        tokio::spawn(self.clone().watchdog_task());

        self.start_greeting().await;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                input = inbound.recv() => match input {
                    Some(SessionInput::Media { payload }) => self.on_media(&payload).await,
                    Some(SessionInput::Mark) => {}
                    Some(SessionInput::Stop) => {
                        self.finalize(ConversationStatus::Completed).await;
                        break;
                    }
                    None => {
                        self.finalize(ConversationStatus::Disconnected).await;
                        break;
                    }
                }
            }
        }

        // Backstop: no-op if a worker already finalised
        self.finalize(ConversationStatus::Disconnected).await;
        tracing::info!(call_id = %self.call_id, "session ended");
    }

    // ------------------------------------------------------------------
    // Media intake
    // ------------------------------------------------------------------

    async fn on_media(&self, payload_b64: &str) {
        let bytes = match BASE64.decode(payload_b64) {
            Ok(b) if !b.is_empty() => b,
            Ok(_) => return,
            Err(e) => {
                // Protocol violation: log and ignore the frame
                tracing::debug!("ignoring malformed media payload: {e}");
                return;
            }
        };

        *self.last_activity.lock() = Instant::now();

        let pcm = audio::mulaw_decode(&bytes);
        let energy = audio::rms_energy(&pcm);
        let now = Instant::now();

        let fire = {
            let phase = *self.phase.read();
            let agent_speaking_phase =
                matches!(phase, CallPhase::Responding | CallPhase::AwaitingConfirmation);
            let mut detector = self.detector.lock();
            if !agent_speaking_phase {
                detector.update_baseline(energy);
                false
            } else {
                let armed = phase == CallPhase::Responding
                    || self.speaking.load(Ordering::SeqCst);
                armed && detector.on_frame(energy, now)
            }
        };

        if fire {
            self.handle_interrupt().await;
        }

        self.ring.lock().push(bytes);
        self.ring_notify.notify_one();
    }

    async fn handle_interrupt(&self) {
        if self.cancel_response().await {
            tracing::info!(call_id = %self.call_id, "barge-in, response cancelled");
            self.deps.webhooks.dispatch(
                events::USER_INTERRUPTED,
                json!({ "conversation_id": self.call_id }),
            );
            let _ = self.events.send(SessionEvent::BargeIn);
        }
    }

    /// Cancel the in-flight response: one clear pair, queue drain via the
    /// token, phase back to Listening. Idempotent per turn.
    async fn cancel_response(&self) -> bool {
        let token = self.turn_cancel.lock().clone();
        if token.is_cancelled() {
            return false;
        }
        token.cancel();
        self.speaking.store(false, Ordering::SeqCst);

        // Two clears, spaced to tolerate carrier frame-boundary loss
        let _ = self.transport.send_clear().await;
        tokio::time::sleep(CLEAR_REPEAT_GAP).await;
        let _ = self.transport.send_clear().await;

        self.set_phase(CallPhase::Listening);
        self.assembler.lock().reset();
        true
    }

    // ------------------------------------------------------------------
    // STT
    // ------------------------------------------------------------------

    async fn stt_task(self: Arc<Self>) {
        let mut failures = 0u32;
        loop {
            if self.shutdown.is_cancelled() {
                return;
            }
            let stream = match self.deps.stt.open_stream().await {
                Ok(s) => s,
                Err(e) => {
                    failures += 1;
                    tracing::warn!("stt open failed: {e}");
                    if failures >= 2 {
                        self.degrade_stt().await;
                        return;
                    }
                    continue;
                }
            };

            let SttStream {
                audio_tx,
                events: mut stt_events,
            } = stream;

            let writer = {
                let session = self.clone();
                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            _ = session.shutdown.cancelled() => return,
                            _ = session.ring_notify.notified() => {}
                        }
                        loop {
                            let frame = session.ring.lock().pop();
                            match frame {
                                Some(f) => {
                                    if audio_tx.send(f).await.is_err() {
                                        return;
                                    }
                                }
                                None => break,
                            }
                        }
                    }
                })
            };

            loop {
                tokio::select! {
                    _ = self.shutdown.cancelled() => {
                        writer.abort();
                        return;
                    }
                    event = stt_events.recv() => match event {
                        Some(ev) => self.on_stt_event(ev),
                        None => break,
                    }
                }
            }
            writer.abort();

            failures += 1;
            if failures >= 2 {
                self.degrade_stt().await;
                return;
            }
            tracing::warn!("stt channel closed, reopening once");
        }
    }

    async fn degrade_stt(&self) {
        tracing::error!(call_id = %self.call_id, "stt failed twice, degrading");
        self.speak_lines(CallPhase::Responding, vec![FALLBACK_LINE.to_string()])
            .await;
    }

    fn on_stt_event(&self, event: SttEvent) {
        *self.last_activity.lock() = Instant::now();
        let now = Instant::now();
        tracing::debug!(text = %event.text, is_final = event.is_final, "stt event");
        let mut assembler = self.assembler.lock();
        if event.is_final {
            assembler.on_final(&event.text, now);
        } else {
            assembler.on_partial(&event.text, now);
        }
    }

    // ------------------------------------------------------------------
    // End-of-turn gate
    // ------------------------------------------------------------------

    async fn gate_task(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(GATE_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = ticker.tick() => {}
            }
            let phase = *self.phase.read();
            if !matches!(phase, CallPhase::Listening | CallPhase::AwaitingConfirmation) {
                continue;
            }
            if self.speaking.load(Ordering::SeqCst) {
                continue;
            }
            let utterance = self.assembler.lock().poll(Instant::now());
            if let Some(text) = utterance {
                self.clone().dispatch_turn(text).await;
            }
        }
    }

    async fn dispatch_turn(self: Arc<Self>, text: String) {
        let intent = classify_intent(&text);
        tracing::info!(call_id = %self.call_id, %text, intent = intent.as_str(), "utterance");
        *self.last_intent.lock() = Some(intent);
        let _ = self.events.send(SessionEvent::Utterance { text: text.clone() });

        // Pending tool confirmation takes precedence over everything else
        let pending = self.pending_tool.lock().clone();
        if let Some(tool) = pending {
            match detect_confirmation(&text) {
                Some(Confirmation::Yes) => {
                    *self.pending_tool.lock() = None;
                    let cancel = self.begin_turn(CallPhase::Responding);
                    self.execute_tool(tool, Some(&text), &cancel).await;
                    self.push_turn_complete(&cancel).await;
                    return;
                }
                Some(Confirmation::No) => {
                    *self.pending_tool.lock() = None;
                    self.speak_lines(
                        CallPhase::Responding,
                        vec![CONFIRM_CANCELLED_LINE.to_string()],
                    )
                    .await;
                    return;
                }
                None => {
                    if text.split_whitespace().count() <= 5 {
                        self.speak_lines(
                            CallPhase::AwaitingConfirmation,
                            vec![CONFIRM_REPROMPT_LINE.to_string()],
                        )
                        .await;
                        return;
                    }
                    // Topic change: discard the pending tool, treat as new
                    tracing::info!("pending tool discarded, user changed topic");
                    *self.pending_tool.lock() = None;
                }
            }
        }

        if intent == Intent::Goodbye {
            let farewell = self.config.farewell_message.clone();
            self.append_history(Turn::new(text, farewell.clone())).await;
            self.ending_after_drain.store(true, Ordering::SeqCst);
            self.speak_lines(CallPhase::Responding, vec![farewell]).await;
            return;
        }

        // At most one generation task per session
        let previous = self.gen_task.lock().take();
        if let Some(handle) = previous {
            let _ = handle.await;
        }

        let cancel = self.begin_turn(CallPhase::Responding);
        let session = self.clone();
        let handle = tokio::spawn(generation::run_generation(session, text, cancel));
        *self.gen_task.lock() = Some(handle);
    }

    // ------------------------------------------------------------------
    // Speaking
    // ------------------------------------------------------------------

    /// Arm a fresh turn: new cancel token, speaking flag, detector re-arm
    fn begin_turn(&self, phase: CallPhase) -> CancellationToken {
        let token = CancellationToken::new();
        *self.turn_cancel.lock() = token.clone();
        self.speaking.store(true, Ordering::SeqCst);
        *self.progress.lock() = Instant::now();
        self.set_phase(phase);
        token
    }

    /// Speak fixed lines as one turn
    async fn speak_lines(&self, phase: CallPhase, lines: Vec<String>) {
        let cancel = self.begin_turn(phase);
        for line in lines {
            if !self.enqueue_sentence(&line, &cancel).await && cancel.is_cancelled() {
                return;
            }
        }
        self.push_turn_complete(&cancel).await;
    }

    pub(crate) async fn enqueue_sentence(&self, text: &str, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() || text.trim().is_empty() {
            return false;
        }
        let item = SpeechItem::Sentence {
            text: text.to_string(),
            cancel: cancel.clone(),
        };
        matches!(
            tokio::time::timeout(QUEUE_PUSH_TIMEOUT, self.speech_tx.send(item)).await,
            Ok(Ok(()))
        )
    }

    pub(crate) async fn push_turn_complete(&self, cancel: &CancellationToken) {
        let _ = self
            .speech_tx
            .send(SpeechItem::TurnComplete {
                cancel: cancel.clone(),
            })
            .await;
    }

    async fn start_greeting(&self) {
        match self.profile.effective_greeting(&self.overrides) {
            Some(greeting) => {
                self.append_history(Turn::new("[call started]", greeting.clone()))
                    .await;
                let mut splitter = SentenceSplitter::default();
                let mut lines = splitter.push(&greeting);
                lines.extend(splitter.flush());
                self.speak_lines(CallPhase::Responding, lines).await;
            }
            None => self.set_phase(CallPhase::Listening),
        }
    }

    // ------------------------------------------------------------------
    // Tools
    // ------------------------------------------------------------------

    pub(crate) fn set_pending_tool(&self, tool: ToolInvocation) {
        tracing::info!(tool = %tool.name, "tool awaiting confirmation");
        *self.pending_tool.lock() = Some(tool);
        self.set_phase(CallPhase::AwaitingConfirmation);
    }

    pub(crate) async fn execute_tool(
        &self,
        tool: ToolInvocation,
        user_text: Option<&str>,
        cancel: &CancellationToken,
    ) {
        if tool.name == TOOL_END_CALL {
            tracing::info!(call_id = %self.call_id, "end_call tool, ending after drain");
            self.ending_after_drain.store(true, Ordering::SeqCst);
            self.deps.webhooks.dispatch(
                events::TOOL_CALLED,
                json!({ "conversation_id": self.call_id, "tool_name": TOOL_END_CALL }),
            );
            return;
        }
        if cancel.is_cancelled() {
            return;
        }

        let ctx = CallContext {
            call_id: self.call_id.clone(),
            agent_id: Some(self.profile.name.clone()),
            dynamic_variables: self.overrides.dynamic_variables.clone(),
        };

        match self.deps.tools.execute(&tool, &ctx).await {
            Ok(outcome) => {
                self.deps.webhooks.dispatch(
                    events::TOOL_CALLED,
                    json!({
                        "conversation_id": self.call_id,
                        "tool_name": tool.name,
                        "success": outcome.success,
                    }),
                );
                let speech = outcome.speech.unwrap_or_default();
                if !speech.is_empty() {
                    self.enqueue_sentence(&speech, cancel).await;
                }
                self.append_history(
                    Turn::new(user_text.unwrap_or_default(), speech).with_tool(tool.name.clone()),
                )
                .await;
            }
            Err(e) => {
                // Spoken failure, no retry
                tracing::warn!(tool = %tool.name, "tool execution failed: {e}");
                self.enqueue_sentence(TOOL_FAILURE_LINE, cancel).await;
            }
        }
    }

    // ------------------------------------------------------------------
    // TTS notices
    // ------------------------------------------------------------------

    async fn notices_task(self: Arc<Self>, mut notices: mpsc::Receiver<TtsNotice>) {
        loop {
            let notice = tokio::select! {
                _ = self.shutdown.cancelled() => return,
                n = notices.recv() => match n {
                    Some(n) => n,
                    None => return,
                },
            };
            match notice {
                TtsNotice::TurnDrained => self.on_turn_drained().await,
                TtsNotice::TransportError => self.on_transport_error().await,
            }
        }
    }

    async fn on_turn_drained(&self) {
        self.speaking.store(false, Ordering::SeqCst);
        if self.ending_after_drain.load(Ordering::SeqCst) {
            self.set_phase(CallPhase::Ending);
            self.finalize(ConversationStatus::Completed).await;
            return;
        }
        let phase = *self.phase.read();
        match phase {
            CallPhase::Responding => {
                self.set_phase(CallPhase::Listening);
                self.assembler.lock().reset();
            }
            CallPhase::AwaitingConfirmation => {
                // Stay put, the gate now waits for the user's answer
                self.assembler.lock().reset();
            }
            _ => {}
        }
    }

    async fn on_transport_error(&self) {
        let repeated = {
            let mut last = self.last_transport_error.lock();
            let now = Instant::now();
            let repeated = last.is_some_and(|t| now.duration_since(t) < Duration::from_secs(1));
            *last = Some(now);
            repeated
        };
        if repeated {
            tracing::error!(call_id = %self.call_id, "repeated transport failures, terminating");
            self.finalize(ConversationStatus::Failed).await;
        } else {
            tracing::warn!("transport send failed, cancelling response");
            self.cancel_response().await;
        }
    }

    // ------------------------------------------------------------------
    // Watchdog
    // ------------------------------------------------------------------

    async fn watchdog_task(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(Duration::from_millis(500));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let idle = self.last_activity.lock().elapsed();
            if idle >= self.config.inactivity_timeout {
                tracing::warn!(call_id = %self.call_id, "inactivity timeout");
                self.finalize(ConversationStatus::Timeout).await;
                return;
            }

            if *self.phase.read() == CallPhase::Responding {
                let stalled = self.progress.lock().elapsed();
                if stalled >= self.config.responding_stall {
                    tracing::error!(call_id = %self.call_id, "response stalled, terminating");
                    self.finalize(ConversationStatus::Failed).await;
                    return;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Run cleanup exactly once and persist the final record
    pub(crate) async fn finalize(&self, status: ConversationStatus) {
        if self.ended.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(call_id = %self.call_id, status = status.as_str(), "finalising session");

        self.turn_cancel.lock().cancel();

        let transcript = render_transcript(&self.history.lock());
        if let Err(e) = self
            .deps
            .store
            .finish(&self.call_id, status, transcript.clone(), Utc::now())
            .await
        {
            tracing::warn!("failed to persist final record: {e}");
        }
        self.deps.webhooks.dispatch(
            events::CALL_ENDED,
            json!({
                "conversation_id": self.call_id,
                "status": status.as_str(),
                "transcript": transcript,
            }),
        );
        let _ = self.events.send(SessionEvent::Ended { status });
        self.shutdown.cancel();
    }

    fn set_phase(&self, to: CallPhase) {
        let from = {
            let mut phase = self.phase.write();
            let from = *phase;
            *phase = to;
            from
        };
        if from != to {
            tracing::debug!(call_id = %self.call_id, ?from, ?to, "phase transition");
            if to == CallPhase::Responding {
                self.detector.lock().rearm();
            }
            let _ = self.events.send(SessionEvent::PhaseChanged { from, to });
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn phase(&self) -> CallPhase {
        *self.phase.read()
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    /// Token cancelled when the session has fully ended
    pub fn closed(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub(crate) fn history_snapshot(&self) -> Vec<Turn> {
        self.history.lock().clone()
    }

    pub(crate) fn last_intent(&self) -> Option<Intent> {
        *self.last_intent.lock()
    }

    pub(crate) fn phase_name(&self) -> &'static str {
        match *self.phase.read() {
            CallPhase::Greeting => "Greeting",
            CallPhase::Listening => "Listening",
            CallPhase::Responding => "Responding",
            CallPhase::AwaitingConfirmation => "AwaitingConfirmation",
            CallPhase::Ending => "Ending",
        }
    }

    pub(crate) fn dynamic_variables(&self) -> HashMap<String, String> {
        self.overrides.dynamic_variables.clone()
    }

    pub(crate) fn system_prompt(&self) -> &str {
        &self.profile.system_prompt
    }

    pub(crate) fn touch_progress(&self) {
        *self.progress.lock() = Instant::now();
    }

    pub(crate) async fn append_history(&self, turn: Turn) {
        self.history.lock().push(turn.clone());
        if let Err(e) = self.deps.store.append_turn(&self.call_id, turn).await {
            tracing::warn!("history append failed: {e}");
        }
    }
}
