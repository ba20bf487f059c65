//! Process-wide shared state
//!
//! Collaborators are constructed once at startup and shared by reference
//! across sessions; sessions themselves live in the registry for the
//! duration of one call.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::ServerError;
use voicegate_agent::{CallSession, SessionDeps};
use voicegate_config::{AgentProfile, Settings};
use voicegate_llm::{OllamaBackend, OllamaConfig};
use voicegate_persistence::InMemoryConversationStore;
use voicegate_pipeline::{DeepgramTts, DeepgramStt};
use voicegate_pipeline::stt::DeepgramSttConfig;
use voicegate_pipeline::tts::DeepgramTtsConfig;
use voicegate_rag::{
    ChromaStore, ChromaStoreConfig, OllamaEmbedder, OllamaEmbeddingConfig, RetrieverConfig,
};
use voicegate_tools::{HttpToolExecutor, HttpToolExecutorConfig, WebhookDispatcher};

/// Read-only agent profile registry
///
/// Agent CRUD is an external concern; the registry resolves whatever the
/// carrier's start message names, falling back to the default profile.
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, AgentProfile>>,
    default: AgentProfile,
}

impl AgentRegistry {
    pub fn new(default: AgentProfile) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            default,
        }
    }

    pub fn insert(&self, agent_id: impl Into<String>, profile: AgentProfile) {
        self.agents.write().insert(agent_id.into(), profile);
    }

    pub fn resolve(&self, agent_id: Option<&str>) -> AgentProfile {
        agent_id
            .and_then(|id| self.agents.read().get(id).cloned())
            .unwrap_or_else(|| self.default.clone())
    }
}

/// Live sessions by call id
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<CallSession>>>,
}

impl SessionRegistry {
    pub fn insert(&self, call_id: impl Into<String>, session: Arc<CallSession>) {
        self.sessions.write().insert(call_id.into(), session);
    }

    pub fn remove(&self, call_id: &str) -> Option<Arc<CallSession>> {
        self.sessions.write().remove(call_id)
    }

    pub fn get(&self, call_id: &str) -> Option<Arc<CallSession>> {
        self.sessions.read().get(call_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub deps: SessionDeps,
    pub agents: Arc<AgentRegistry>,
    pub sessions: Arc<SessionRegistry>,
}

impl AppState {
    /// Construct every collaborator from settings
    pub fn new(settings: Settings) -> Result<Self, ServerError> {
        let stt = Arc::new(DeepgramStt::new(DeepgramSttConfig {
            api_key: settings.speech.deepgram_api_key.clone(),
            model: settings.speech.stt_model.clone(),
            endpoint: settings.speech.stt_endpoint.clone(),
            endpointing_ms: (settings.turn.silence_threshold_sec * 1000.0) as u64,
            ..DeepgramSttConfig::default()
        }));

        let tts = Arc::new(
            DeepgramTts::new(DeepgramTtsConfig {
                api_key: settings.speech.deepgram_api_key.clone(),
                endpoint: settings.speech.tts_endpoint.clone(),
            })
            .map_err(|e| ServerError::Config(e.to_string()))?,
        );

        let llm = Arc::new(
            OllamaBackend::new(OllamaConfig {
                endpoint: settings.llm.endpoint.clone(),
                model: settings.llm.model.clone(),
                max_tokens: settings.llm.max_tokens,
                temperature: settings.llm.temperature,
                ..OllamaConfig::default()
            })
            .map_err(|e| ServerError::Config(e.to_string()))?,
        );

        let embedder = Arc::new(OllamaEmbedder::new(OllamaEmbeddingConfig {
            endpoint: settings.rag.embed_endpoint.clone(),
            model: settings.rag.embed_model.clone(),
        }));

        let vectors = Arc::new(ChromaStore::new(ChromaStoreConfig {
            endpoint: settings.rag.chroma_endpoint.clone(),
            collection: settings.rag.chroma_collection.clone(),
        }));

        let tools = Arc::new(
            HttpToolExecutor::new(HttpToolExecutorConfig::default())
                .map_err(|e| ServerError::Config(e.to_string()))?,
        );

        let deps = SessionDeps {
            stt,
            tts,
            llm,
            embedder,
            vectors,
            tools,
            store: Arc::new(InMemoryConversationStore::new()),
            webhooks: Arc::new(WebhookDispatcher::disabled()),
            retriever_config: RetrieverConfig {
                top_k: settings.rag.top_k,
                relevance_threshold: settings.rag.relevance_threshold,
                context_top: settings.rag.context_top,
            },
        };

        Ok(Self {
            settings: Arc::new(settings),
            deps,
            agents: Arc::new(AgentRegistry::new(AgentProfile::default())),
            sessions: Arc::new(SessionRegistry::default()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_registry_fallback() {
        let registry = AgentRegistry::new(AgentProfile {
            name: "default".to_string(),
            ..Default::default()
        });
        registry.insert(
            "agent_1",
            AgentProfile {
                name: "special".to_string(),
                ..Default::default()
            },
        );

        assert_eq!(registry.resolve(Some("agent_1")).name, "special");
        assert_eq!(registry.resolve(Some("missing")).name, "default");
        assert_eq!(registry.resolve(None).name, "default");
    }
}
