//! JSON wire frames: one `{"event": ..., "payload": ...}` object per text
//! frame, in both directions. Event names are opaque to the framework.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// Borrowed outbound frame; serialized once per emit/broadcast.
#[derive(Serialize)]
struct OutboundMessage<'a, P: Serialize> {
    event: &'a str,
    payload: &'a P,
}

/// Encode an event frame to its wire form.
pub fn encode<P: Serialize>(event: &str, payload: &P) -> Result<String, serde_json::Error> {
    serde_json::to_string(&OutboundMessage { event, payload })
}

/// Inbound frame: the payload stays raw until a handler binds it.
#[derive(Debug, Deserialize)]
pub struct MessageSchema {
    pub event: String,
    #[serde(default)]
    pub payload: Option<Box<RawValue>>,
}
