//! Environment-driven runtime settings

use std::env;
use std::time::Duration;

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "unparseable env value, using default");
            default
        }),
        Err(_) => default,
    }
}

fn env_bool_or(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => matches!(raw.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
        Err(_) => default,
    }
}

/// Server binding
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub bind_addr: String,
}

/// Speech provider settings (STT + TTS)
#[derive(Debug, Clone)]
pub struct SpeechSettings {
    pub deepgram_api_key: String,
    pub stt_model: String,
    pub stt_endpoint: String,
    pub tts_voice: String,
    pub tts_endpoint: String,
}

/// LLM backend settings
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub endpoint: String,
    pub model: String,
    pub max_tokens: usize,
    pub temperature: f32,
}

/// Retrieval settings
#[derive(Debug, Clone)]
pub struct RagSettings {
    /// Candidates fetched from the vector store
    pub top_k: usize,
    /// Maximum accepted distance
    pub relevance_threshold: f32,
    /// Chunks included in the prompt context block
    pub context_top: usize,
    pub embed_endpoint: String,
    pub embed_model: String,
    pub chroma_endpoint: String,
    pub chroma_collection: String,
}

/// Barge-in detector settings
#[derive(Debug, Clone)]
pub struct InterruptSettings {
    pub enabled: bool,
    pub min_energy: i32,
    pub baseline_factor: f32,
    pub min_speech_ms: u64,
    pub debounce_ms: u64,
    pub required_samples: usize,
}

/// End-of-turn gate settings
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub silence_threshold_sec: f64,
    pub interim_processing_enabled: bool,
    pub interim_min_length: usize,
}

/// Session-level settings
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub inactivity_timeout_sec: u64,
    pub history_window: usize,
}

/// Complete runtime settings, one instance per process
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub speech: SpeechSettings,
    pub llm: LlmSettings,
    pub rag: RagSettings,
    pub interrupt: InterruptSettings,
    pub turn: TurnSettings,
    pub session: SessionSettings,
}

impl Settings {
    /// Load from the environment, filling documented defaults
    pub fn from_env() -> Self {
        Self {
            server: ServerSettings {
                bind_addr: env_or("BIND_ADDR", "0.0.0.0:8080"),
            },
            speech: SpeechSettings {
                deepgram_api_key: env_or("DEEPGRAM_API_KEY", ""),
                stt_model: env_or("DEEPGRAM_STT_MODEL", "nova-2"),
                stt_endpoint: env_or("DEEPGRAM_STT_ENDPOINT", "wss://api.deepgram.com/v1/listen"),
                tts_voice: env_or("DEEPGRAM_VOICE", "aura-2-thalia-en"),
                tts_endpoint: env_or("DEEPGRAM_TTS_ENDPOINT", "https://api.deepgram.com/v1/speak"),
            },
            llm: LlmSettings {
                endpoint: env_or("OLLAMA_ENDPOINT", "http://localhost:11434"),
                model: env_or("OLLAMA_MODEL", "qwen2.5:14b"),
                max_tokens: env_parse_or("LLM_MAX_TOKENS", 1200),
                temperature: env_parse_or("LLM_TEMPERATURE", 0.2),
            },
            rag: RagSettings {
                top_k: env_parse_or("RAG_K", 6),
                relevance_threshold: env_parse_or("RAG_RELEVANCE_THRESHOLD", 1.0),
                context_top: env_parse_or("RAG_CONTEXT_TOP", 3),
                embed_endpoint: env_or("EMBED_ENDPOINT", "http://localhost:11434"),
                embed_model: env_or("EMBED_MODEL", "all-minilm"),
                chroma_endpoint: env_or("CHROMA_ENDPOINT", "http://localhost:8000"),
                chroma_collection: env_or("CHROMA_COLLECTION", "docs"),
            },
            interrupt: InterruptSettings {
                enabled: env_bool_or("INTERRUPT_ENABLED", true),
                min_energy: env_parse_or("INTERRUPT_MIN_ENERGY", 500),
                baseline_factor: env_parse_or("INTERRUPT_BASELINE_FACTOR", 2.0),
                min_speech_ms: env_parse_or("INTERRUPT_MIN_SPEECH_MS", 100),
                debounce_ms: env_parse_or("INTERRUPT_DEBOUNCE_MS", 300),
                required_samples: env_parse_or("INTERRUPT_REQUIRED_SAMPLES", 2),
            },
            turn: TurnSettings {
                silence_threshold_sec: env_parse_or("SILENCE_THRESHOLD_SEC", 0.8),
                interim_processing_enabled: env_bool_or("INTERIM_PROCESSING_ENABLED", false),
                interim_min_length: env_parse_or("INTERIM_MIN_LENGTH", 5),
            },
            session: SessionSettings {
                inactivity_timeout_sec: env_parse_or("CALL_INACTIVITY_TIMEOUT_SEC", 30),
                history_window: env_parse_or("HISTORY_WINDOW", 6),
            },
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        // Defaults only; does not read the environment
        Self {
            server: ServerSettings {
                bind_addr: "0.0.0.0:8080".to_string(),
            },
            speech: SpeechSettings {
                deepgram_api_key: String::new(),
                stt_model: "nova-2".to_string(),
                stt_endpoint: "wss://api.deepgram.com/v1/listen".to_string(),
                tts_voice: "aura-2-thalia-en".to_string(),
                tts_endpoint: "https://api.deepgram.com/v1/speak".to_string(),
            },
            llm: LlmSettings {
                endpoint: "http://localhost:11434".to_string(),
                model: "qwen2.5:14b".to_string(),
                max_tokens: 1200,
                temperature: 0.2,
            },
            rag: RagSettings {
                top_k: 6,
                relevance_threshold: 1.0,
                context_top: 3,
                embed_endpoint: "http://localhost:11434".to_string(),
                embed_model: "all-minilm".to_string(),
                chroma_endpoint: "http://localhost:8000".to_string(),
                chroma_collection: "docs".to_string(),
            },
            interrupt: InterruptSettings {
                enabled: true,
                min_energy: 500,
                baseline_factor: 2.0,
                min_speech_ms: 100,
                debounce_ms: 300,
                required_samples: 2,
            },
            turn: TurnSettings {
                silence_threshold_sec: 0.8,
                interim_processing_enabled: false,
                interim_min_length: 5,
            },
            session: SessionSettings {
                inactivity_timeout_sec: 30,
                history_window: 6,
            },
        }
    }
}

impl SessionSettings {
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_sec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let s = Settings::default();
        assert!(s.interrupt.enabled);
        assert_eq!(s.interrupt.min_energy, 500);
        assert_eq!(s.interrupt.baseline_factor, 2.0);
        assert_eq!(s.interrupt.min_speech_ms, 100);
        assert_eq!(s.interrupt.debounce_ms, 300);
        assert_eq!(s.interrupt.required_samples, 2);
        assert_eq!(s.turn.silence_threshold_sec, 0.8);
        assert!(!s.turn.interim_processing_enabled);
        assert_eq!(s.turn.interim_min_length, 5);
        assert_eq!(s.rag.top_k, 6);
        assert_eq!(s.rag.relevance_threshold, 1.0);
        assert_eq!(s.rag.context_top, 3);
        assert_eq!(s.llm.max_tokens, 1200);
        assert_eq!(s.session.history_window, 6);
        assert_eq!(s.session.inactivity_timeout_sec, 30);
    }
}
