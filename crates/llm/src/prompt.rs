//! Prompt assembly
//!
//! Builds the single-string prompt the generate endpoint consumes: the
//! agent's system block with a strict grounding directive, per-call
//! context, dynamic variables, the retrieved knowledge block, recent
//! history, and the user's utterance. Stop sequences keep the model from
//! writing both sides of the dialogue.

use std::collections::HashMap;

use voicegate_core::Turn;

/// Stop sequences applied to every turn
pub fn stop_sequences() -> Vec<String> {
    vec![
        "\nUser:".to_string(),
        "\nAssistant:".to_string(),
        "User:".to_string(),
    ]
}

/// Builder for one turn's prompt
pub struct PromptBuilder {
    system_prompt: String,
    call_phase: Option<String>,
    intent: Option<String>,
    dynamic_variables: HashMap<String, String>,
    context_block: String,
    history: Vec<Turn>,
    history_window: usize,
}

impl PromptBuilder {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            call_phase: None,
            intent: None,
            dynamic_variables: HashMap::new(),
            context_block: String::new(),
            history: Vec::new(),
            history_window: 6,
        }
    }

    pub fn with_call_state(mut self, phase: impl Into<String>, intent: Option<String>) -> Self {
        self.call_phase = Some(phase.into());
        self.intent = intent;
        self
    }

    pub fn with_dynamic_variables(mut self, vars: HashMap<String, String>) -> Self {
        self.dynamic_variables = vars;
        self
    }

    pub fn with_context(mut self, context_block: impl Into<String>) -> Self {
        self.context_block = context_block.into();
        self
    }

    pub fn with_history(mut self, history: &[Turn], window: usize) -> Self {
        let start = history.len().saturating_sub(window);
        self.history = history[start..].to_vec();
        self.history_window = window;
        self
    }

    /// Assemble the final prompt for one user utterance
    pub fn build(self, utterance: &str) -> String {
        let mut sections: Vec<String> = Vec::new();

        sections.push(self.system_prompt.clone());

        let mut call_context = String::from(
            "## Call Context\n\
             You are on a LIVE PHONE CALL with a real person.\n\
             - Do not include stage directions or markdown\n\
             - Speak briefly and naturally\n\
             - Answer ONLY from the knowledge base context below; if it does \
             not contain the answer, say you don't have that information",
        );
        if let Some(phase) = &self.call_phase {
            call_context.push_str(&format!("\nCurrent call phase: {phase}"));
        }
        if let Some(intent) = &self.intent {
            call_context.push_str(&format!("\nDetected user intent: {intent}"));
        }
        sections.push(call_context);

        let vars: Vec<String> = self
            .dynamic_variables
            .iter()
            .filter(|(_, v)| !v.trim().is_empty())
            .map(|(k, v)| format!("- **{k}**: {v}"))
            .collect();
        if !vars.is_empty() {
            let mut sorted = vars;
            sorted.sort();
            sections.push(format!("## Caller Information:\n{}", sorted.join("\n")));
        }

        sections.push(format!(
            "## Knowledge Base Context:\n{}",
            if self.context_block.trim().is_empty() {
                "No specific context found."
            } else {
                &self.context_block
            }
        ));

        if !self.history.is_empty() {
            let lines: Vec<String> = self
                .history
                .iter()
                .map(|t| format!("User: {}\nAssistant: {}", t.user, t.assistant))
                .collect();
            sections.push(format!("## Conversation History:\n{}", lines.join("\n")));
        }

        sections.push(format!("## User's Current Question:\n{utterance}"));

        sections.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_contains_all_sections() {
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), "Sam".to_string());

        let history = vec![Turn::new("hi", "Hello!")];
        let prompt = PromptBuilder::new("You are a helpful agent.")
            .with_call_state("Listening", Some("Question".to_string()))
            .with_dynamic_variables(vars)
            .with_context("We open at nine.")
            .with_history(&history, 6)
            .build("when do you open");

        assert!(prompt.starts_with("You are a helpful agent."));
        assert!(prompt.contains("LIVE PHONE CALL"));
        assert!(prompt.contains("- **name**: Sam"));
        assert!(prompt.contains("We open at nine."));
        assert!(prompt.contains("User: hi\nAssistant: Hello!"));
        assert!(prompt.ends_with("when do you open"));
    }

    #[test]
    fn test_empty_context_directs_decline() {
        let prompt = PromptBuilder::new("agent").build("question");
        assert!(prompt.contains("No specific context found."));
        assert!(prompt.contains("Answer ONLY from the knowledge base context"));
    }

    #[test]
    fn test_history_window_bounds() {
        let history: Vec<Turn> = (0..10)
            .map(|i| Turn::new(format!("q{i}"), format!("a{i}")))
            .collect();
        let prompt = PromptBuilder::new("agent").with_history(&history, 6).build("next");
        assert!(!prompt.contains("User: q3"));
        assert!(prompt.contains("User: q4"));
        assert!(prompt.contains("User: q9"));
    }

    #[test]
    fn test_stop_sequences() {
        let stops = stop_sequences();
        assert!(stops.iter().any(|s| s == "User:"));
        assert!(stops.iter().any(|s| s == "\nAssistant:"));
    }
}
