use std::fmt::{self, Display};

use serde::Serialize;

use crate::attachment::ImageAttachment;

/// Identity of a message, stable for its whole lifetime.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
)]
#[serde(transparent)]
pub struct MessageId(u64);

impl MessageId {
    #[inline]
    pub(crate) fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value of the identifier.
    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg:{}", self.0)
    }
}

/// Who a message comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person chatting.
    User,
    /// The model.
    Assistant,
    /// The app itself, e.g. to report failures.
    System,
}

/// One entry in the conversation log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Message {
    id: MessageId,
    role: Role,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<ImageAttachment>,
    is_streaming: bool,
}

impl Message {
    #[inline]
    pub(crate) fn user(
        id: MessageId,
        text: String,
        image: Option<ImageAttachment>,
    ) -> Self {
        Self {
            id,
            role: Role::User,
            text,
            image,
            is_streaming: false,
        }
    }

    /// Creates an empty, streaming assistant message.
    #[inline]
    pub(crate) fn placeholder(id: MessageId) -> Self {
        Self {
            id,
            role: Role::Assistant,
            text: String::new(),
            image: None,
            is_streaming: true,
        }
    }

    #[inline]
    pub(crate) fn system<S: Into<String>>(id: MessageId, text: S) -> Self {
        Self {
            id,
            role: Role::System,
            text: text.into(),
            image: None,
            is_streaming: false,
        }
    }

    /// Returns the identifier.
    #[inline]
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Returns who the message comes from.
    #[inline]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns the text revealed so far.
    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the attached image, only ever set on user messages.
    #[inline]
    pub fn image(&self) -> Option<&ImageAttachment> {
        self.image.as_ref()
    }

    /// Returns `true` while the message is being revealed.
    #[inline]
    pub fn is_streaming(&self) -> bool {
        self.is_streaming
    }

    #[inline]
    pub(crate) fn push_char(&mut self, ch: char) {
        self.text.push(ch);
    }

    /// Sets the final text and stops streaming.
    #[inline]
    pub(crate) fn finalize<S: Into<String>>(&mut self, text: S) {
        self.text = text.into();
        self.is_streaming = false;
    }
}
