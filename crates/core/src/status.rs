use serde::Serialize;

/// The user-facing state of the chat, each variant carrying its display
/// message.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ChatStatus {
    /// Something is in progress (loading the model, generating, ...).
    Loading(String),
    /// Waiting for the user.
    Ready(String),
    /// An image is attached and waits for a prompt.
    NeedsImage(String),
    /// Something went wrong.
    Error(String),
}

impl ChatStatus {
    #[inline]
    pub(crate) fn loading(message: &str) -> Self {
        Self::Loading(message.to_owned())
    }

    #[inline]
    pub(crate) fn ready(message: &str) -> Self {
        Self::Ready(message.to_owned())
    }

    #[inline]
    pub(crate) fn needs_image(message: &str) -> Self {
        Self::NeedsImage(message.to_owned())
    }

    #[inline]
    pub(crate) fn error(message: &str) -> Self {
        Self::Error(message.to_owned())
    }

    /// Returns the display message.
    #[inline]
    pub fn message(&self) -> &str {
        match self {
            Self::Loading(message)
            | Self::Ready(message)
            | Self::NeedsImage(message)
            | Self::Error(message) => message,
        }
    }

    /// Returns `true` if this is a `Loading` status.
    #[inline]
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading(_))
    }

    /// Returns `true` if this is a `Ready` status.
    #[inline]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// Returns `true` if this is an `Error` status.
    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

impl Default for ChatStatus {
    fn default() -> Self {
        Self::loading(crate::copy::LOADING_MODEL)
    }
}
