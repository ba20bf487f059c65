//! Agent profiles and per-call overrides

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Read-only agent configuration attached to a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub name: String,
    pub system_prompt: String,
    #[serde(default)]
    pub first_message: Option<String>,
    pub voice_id: String,
    pub model_name: String,
    #[serde(default = "default_true")]
    pub interrupt_enabled: bool,
    #[serde(default)]
    pub silence_threshold_sec: Option<f64>,
}

fn default_true() -> bool {
    true
}

impl Default for AgentProfile {
    fn default() -> Self {
        Self {
            name: "assistant".to_string(),
            system_prompt: "You are a friendly voice assistant on a live phone call.".to_string(),
            first_message: Some("Hello! How can I help you today?".to_string()),
            voice_id: String::new(),
            model_name: String::new(),
            interrupt_enabled: true,
            silence_threshold_sec: None,
        }
    }
}

/// Per-call overrides carried in the carrier's start message
///
/// Precedence when resolving effective values: call override, then the agent
/// profile, then the environment default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallOverrides {
    #[serde(default)]
    pub voice_id: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub first_message: Option<String>,
    #[serde(default)]
    pub dynamic_variables: HashMap<String, String>,
}

impl AgentProfile {
    /// Effective voice id under the override precedence
    pub fn effective_voice<'a>(&'a self, overrides: &'a CallOverrides, env_default: &'a str) -> &'a str {
        if let Some(v) = overrides.voice_id.as_deref().filter(|v| !v.trim().is_empty()) {
            return v;
        }
        if !self.voice_id.trim().is_empty() {
            return &self.voice_id;
        }
        env_default
    }

    /// Effective model name under the override precedence
    pub fn effective_model<'a>(&'a self, overrides: &'a CallOverrides, env_default: &'a str) -> &'a str {
        if let Some(m) = overrides.model_name.as_deref().filter(|m| !m.trim().is_empty()) {
            return m;
        }
        if !self.model_name.trim().is_empty() {
            return &self.model_name;
        }
        env_default
    }

    /// Effective greeting, with `{{key}}` placeholders substituted
    pub fn effective_greeting(&self, overrides: &CallOverrides) -> Option<String> {
        let raw = overrides
            .first_message
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .or(self.first_message.as_deref())?;
        Some(substitute_variables(raw, &overrides.dynamic_variables))
    }
}

/// Replace `{{key}}` placeholders with values from the dynamic-variable bag
pub fn substitute_variables(text: &str, vars: &HashMap<String, String>) -> String {
    let mut out = text.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{{{key}}}}}"), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_precedence() {
        let profile = AgentProfile {
            voice_id: "profile-voice".to_string(),
            model_name: "profile-model".to_string(),
            ..Default::default()
        };
        let mut overrides = CallOverrides::default();
        assert_eq!(profile.effective_voice(&overrides, "env-voice"), "profile-voice");

        overrides.voice_id = Some("call-voice".to_string());
        assert_eq!(profile.effective_voice(&overrides, "env-voice"), "call-voice");

        let bare = AgentProfile {
            voice_id: String::new(),
            ..Default::default()
        };
        assert_eq!(bare.effective_voice(&CallOverrides::default(), "env-voice"), "env-voice");
        assert_eq!(bare.effective_model(&CallOverrides::default(), "env-model"), "env-model");
    }

    #[test]
    fn test_greeting_substitution() {
        let profile = AgentProfile {
            first_message: Some("Hello {{name}}, welcome to {{company}}!".to_string()),
            ..Default::default()
        };
        let mut overrides = CallOverrides::default();
        overrides
            .dynamic_variables
            .insert("name".to_string(), "Sam".to_string());
        overrides
            .dynamic_variables
            .insert("company".to_string(), "Acme".to_string());

        assert_eq!(
            profile.effective_greeting(&overrides).unwrap(),
            "Hello Sam, welcome to Acme!"
        );
    }

    #[test]
    fn test_greeting_override_wins() {
        let profile = AgentProfile {
            first_message: Some("profile greeting".to_string()),
            ..Default::default()
        };
        let overrides = CallOverrides {
            first_message: Some("call greeting".to_string()),
            ..Default::default()
        };
        assert_eq!(profile.effective_greeting(&overrides).unwrap(), "call greeting");
    }
}
