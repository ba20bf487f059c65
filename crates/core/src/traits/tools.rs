//! Tool execution traits and the parsed marker types

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A parameter value parsed from a tool marker
///
/// Markers carry a string-keyed bag of string-or-number values; per-tool
/// validators convert these into typed parameters at execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Str(String),
    Num(f64),
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            ParamValue::Num(_) => None,
        }
    }

    pub fn to_display(&self) -> String {
        match self {
            ParamValue::Str(s) => s.clone(),
            ParamValue::Num(n) => n.to_string(),
        }
    }
}

/// A tool invocation parsed from an LLM tool marker
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    /// Tool name
    pub name: String,
    /// Parameter bag; unknown keys are preserved and passed through
    pub params: BTreeMap<String, ParamValue>,
    /// Whether the user must confirm before execution
    pub requires_confirmation: bool,
}

impl ToolInvocation {
    pub fn param(&self, key: &str) -> Option<&ParamValue> {
        self.params.get(key)
    }
}

/// Result of a tool execution
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub success: bool,
    /// Sentence to speak to the user, if any
    pub speech: Option<String>,
}

impl ToolOutcome {
    pub fn ok(speech: impl Into<String>) -> Self {
        Self {
            success: true,
            speech: Some(speech.into()),
        }
    }

    pub fn silent() -> Self {
        Self {
            success: true,
            speech: None,
        }
    }
}

/// Per-call context handed to tool executions
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub call_id: String,
    pub agent_id: Option<String>,
    pub dynamic_variables: HashMap<String, String>,
}

/// External tool execution interface
///
/// `end_call` is intercepted by the session before reaching the executor;
/// everything else (including `transfer_call` and `call_webhook`) is
/// delegated here.
#[async_trait]
pub trait ToolExecutor: Send + Sync + 'static {
    async fn execute(&self, invocation: &ToolInvocation, ctx: &CallContext) -> Result<ToolOutcome>;
}
