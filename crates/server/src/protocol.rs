//! Carrier media-stream wire format
//!
//! JSON messages over the media WebSocket, shaped like the Twilio media
//! stream protocol: inbound `connected`/`start`/`media`/`stop`/`mark`,
//! outbound `media` and `clear`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use voicegate_config::CallOverrides;

/// Inbound messages from the carrier
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum InboundMessage {
    Connected,
    Start {
        start: StartInfo,
    },
    Media {
        media: MediaPayload,
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
    },
    Stop,
    Mark,
}

/// Stream-start metadata
#[derive(Debug, Deserialize)]
pub struct StartInfo {
    #[serde(rename = "streamSid")]
    pub stream_sid: String,
    #[serde(rename = "callSid", default)]
    pub call_sid: Option<String>,
    /// Carrier-forwarded custom parameters: `agent_id`, `call_id`, per-call
    /// overrides, and the dynamic-variables bag
    #[serde(rename = "customParameters", default)]
    pub custom_parameters: HashMap<String, String>,
}

/// One inbound media frame
#[derive(Debug, Deserialize)]
pub struct MediaPayload {
    /// Base64 µ-law, 20 ms at 8 kHz
    pub payload: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub chunk: Option<String>,
}

/// Outbound messages to the carrier
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum OutboundMessage {
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutboundMedia,
    },
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct OutboundMedia {
    pub payload: String,
}

/// Split the start message's custom parameters into routing ids, per-call
/// overrides, and the dynamic-variable bag
pub fn parse_custom_parameters(
    mut params: HashMap<String, String>,
) -> (Option<String>, Option<String>, CallOverrides) {
    let agent_id = params.remove("agent_id");
    let call_id = params.remove("call_id");
    let overrides = CallOverrides {
        voice_id: params.remove("voice_id"),
        model_name: params.remove("model_name"),
        first_message: params.remove("first_message"),
        dynamic_variables: params,
    };
    (agent_id, call_id, overrides)
}
