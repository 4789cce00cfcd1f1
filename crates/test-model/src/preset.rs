use serde::{Deserialize, Serialize};

/// How the test model answers one request.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetResponse {
    /// Responds with the complete text.
    #[serde(rename = "answer")]
    Answer(String),
    /// Fails with the given message.
    #[serde(rename = "failure")]
    Failure(String),
}

impl PresetResponse {
    /// Creates an `Answer` preset.
    #[inline]
    pub fn answer<S: Into<String>>(text: S) -> Self {
        Self::Answer(text.into())
    }

    /// Creates a `Failure` preset.
    #[inline]
    pub fn failure<S: Into<String>>(message: S) -> Self {
        Self::Failure(message.into())
    }
}
