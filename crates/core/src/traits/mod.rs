//! Collaborator traits
//!
//! Every external service the per-call pipeline consumes is injected through
//! one of these seams. Implementations live in the leaf crates; tests swap in
//! in-memory fakes.

pub mod llm;
pub mod retriever;
pub mod speech;
pub mod store;
pub mod tools;
pub mod transport;

pub use llm::{GenerateRequest, LanguageModel};
pub use retriever::{Embedder, ScoredChunk, VectorSearch};
pub use speech::{SpeechToText, SttStream, TextToSpeech, TtsStream};
pub use store::{ConversationStore, WebhookSink};
pub use tools::{CallContext, ParamValue, ToolExecutor, ToolInvocation, ToolOutcome};
pub use transport::MediaTransport;
