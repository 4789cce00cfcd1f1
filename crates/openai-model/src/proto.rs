use serde::{Deserialize, Serialize};
use vlm_chat_model::ModelRequest;

use crate::OpenAIConfig;

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct ModelObject {
    pub id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct ModelList {
    pub data: Vec<ModelObject>,
}

impl ModelList {
    #[inline]
    pub fn contains(&self, model_id: &str) -> bool {
        self.data.iter().any(|model| model.id == model_id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct ChatCompletion {
    pub choices: Vec<Choice>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
    pub finish_reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct ResponseMessage {
    pub content: Option<String>,
}

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum Message {
    User { content: Vec<ContentPart> },
    Assistant { content: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

/// A finished exchange kept in the session transcript.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Exchange {
    pub prompt: String,
    pub answer: String,
}

// -----------
// Conversions
// -----------

/// Creates a request that carries the transcript followed by the new
/// prompt.
///
/// Only the new prompt carries its image, earlier images are not sent
/// again.
pub fn create_request(
    model: &str,
    transcript: &[Exchange],
    req: &ModelRequest,
    image_url: Option<String>,
    config: &OpenAIConfig,
) -> ChatCompletionRequest {
    let mut messages = Vec::with_capacity(transcript.len() * 2 + 1);
    for exchange in transcript {
        messages.push(Message::User {
            content: vec![ContentPart::Text {
                text: exchange.prompt.clone(),
            }],
        });
        messages.push(Message::Assistant {
            content: exchange.answer.clone(),
        });
    }

    let mut content = vec![ContentPart::Text {
        text: req.prompt.clone(),
    }];
    if let Some(url) = image_url {
        content.push(ContentPart::ImageUrl {
            image_url: ImageUrl { url },
        });
    }
    messages.push(Message::User { content });

    ChatCompletionRequest {
        model: model.to_owned(),
        messages,
        max_tokens: config.max_tokens,
        stream: false,
    }
}

impl ChatCompletion {
    /// Returns the text of the first choice, if any.
    pub fn into_answer(self) -> Option<String> {
        let choice = self.choices.into_iter().next()?;
        match choice.finish_reason.as_deref() {
            Some("stop") | None => {}
            Some(reason) => debug!("answer finished with reason: {reason}"),
        }
        Some(choice.message.content.unwrap_or_default())
    }
}
