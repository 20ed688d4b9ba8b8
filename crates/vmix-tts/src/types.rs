//! Provider request/response types.

use serde::{Deserialize, Serialize};

/// A voice offered by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    /// Display name, e.g. "Rachel - calm & quiet"
    pub name: String,
    /// Provider identifier
    pub voice_id: String,
}

impl Voice {
    pub fn new(name: impl Into<String>, voice_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            voice_id: voice_id.into(),
        }
    }
}

/// Response of `GET /v1/voices`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoicesResponse {
    pub voices: Vec<Voice>,
}

/// Body of `POST /v1/text-to-speech/{voice_id}`.
#[derive(Debug, Clone, Serialize)]
pub struct SynthesisRequest<'a> {
    pub text: &'a str,
    pub model_id: &'a str,
}
