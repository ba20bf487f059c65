//! HTTP tool execution
//!
//! Tools run as outbound HTTP POSTs: `call_webhook` to the URL in its
//! parameters, everything else to the endpoint registered for the tool name
//! (the carrier integration registers `transfer_call` here). The payload
//! carries the parameter bag and call context; a JSON `response` or
//! `message` field in the reply becomes the sentence spoken to the user.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::json;

use crate::{ToolError, TOOL_CALL_WEBHOOK};
use voicegate_core::{CallContext, Error, Result, ToolExecutor, ToolInvocation, ToolOutcome};

/// Executor configuration
#[derive(Debug, Clone, Default)]
pub struct HttpToolExecutorConfig {
    /// Registered tool endpoints by tool name
    pub endpoints: HashMap<String, String>,
    /// Request timeout
    pub timeout: Option<Duration>,
}

/// Webhook-backed tool executor
pub struct HttpToolExecutor {
    client: Client,
    endpoints: HashMap<String, String>,
}

impl HttpToolExecutor {
    pub fn new(config: HttpToolExecutorConfig) -> std::result::Result<Self, ToolError> {
        let client = Client::builder()
            .timeout(config.timeout.unwrap_or(Duration::from_secs(10)))
            .build()
            .map_err(|e| ToolError::Execution(format!("http client: {e}")))?;
        Ok(Self {
            client,
            endpoints: config.endpoints,
        })
    }

    fn endpoint_for<'a>(&'a self, invocation: &'a ToolInvocation) -> Option<&'a str> {
        if invocation.name == TOOL_CALL_WEBHOOK {
            return invocation.param("url").and_then(|v| v.as_str());
        }
        self.endpoints.get(&invocation.name).map(String::as_str)
    }
}

#[async_trait]
impl ToolExecutor for HttpToolExecutor {
    async fn execute(&self, invocation: &ToolInvocation, ctx: &CallContext) -> Result<ToolOutcome> {
        let url = self
            .endpoint_for(invocation)
            .ok_or_else(|| Error::from(ToolError::Unknown(invocation.name.clone())))?
            .to_string();

        let params: serde_json::Map<String, serde_json::Value> = invocation
            .params
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    voicegate_core::ParamValue::Str(s) => json!(s),
                    voicegate_core::ParamValue::Num(n) => json!(n),
                };
                (k.clone(), value)
            })
            .collect();

        let payload = json!({
            "tool_name": invocation.name,
            "parameters": params,
            "call_context": {
                "call_id": ctx.call_id,
                "agent_id": ctx.agent_id,
                "dynamic_variables": ctx.dynamic_variables,
            },
            "timestamp": Utc::now().to_rfc3339(),
        });

        tracing::info!(tool = %invocation.name, %url, "executing tool");

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::from(ToolError::Execution(format!("request failed: {e}"))))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(ToolError::Execution(format!("tool returned status {status}")).into());
        }

        let body: serde_json::Value = response
            .json()
            .await
            .unwrap_or_else(|_| json!({}));

        let speech = body
            .get("response")
            .or_else(|| body.get("message"))
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string);

        Ok(ToolOutcome {
            success: true,
            speech,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voicegate_core::ParamValue;

    fn invocation(name: &str) -> ToolInvocation {
        ToolInvocation {
            name: name.to_string(),
            params: Default::default(),
            requires_confirmation: false,
        }
    }

    #[test]
    fn test_endpoint_lookup() {
        let mut endpoints = HashMap::new();
        endpoints.insert("transfer_call".to_string(), "https://carrier.test/transfer".to_string());
        let executor = HttpToolExecutor::new(HttpToolExecutorConfig {
            endpoints,
            timeout: None,
        })
        .unwrap();

        let transfer = invocation("transfer_call");
        assert_eq!(
            executor.endpoint_for(&transfer),
            Some("https://carrier.test/transfer")
        );
        assert!(executor.endpoint_for(&invocation("unknown_tool")).is_none());
    }

    #[test]
    fn test_call_webhook_uses_url_param() {
        let executor = HttpToolExecutor::new(HttpToolExecutorConfig::default()).unwrap();
        let mut call = invocation(TOOL_CALL_WEBHOOK);
        call.params.insert(
            "url".to_string(),
            ParamValue::Str("https://hook.test/x".to_string()),
        );
        assert_eq!(executor.endpoint_for(&call), Some("https://hook.test/x"));
    }

    #[tokio::test]
    async fn test_unknown_tool_errors() {
        let executor = HttpToolExecutor::new(HttpToolExecutorConfig::default()).unwrap();
        let result = executor
            .execute(&invocation("no_such_tool"), &CallContext::default())
            .await;
        assert!(result.is_err());
    }
}
