//! User-facing copy for statuses and system messages.
//!
//! The app speaks in emoji, so the strings are the same in every locale.

/// Shown while the model is being loaded.
pub const LOADING_MODEL: &str = "⏳✨";
/// An image is attached and waits for a prompt.
pub const IMAGE_ATTACHED_AWAITING_MESSAGE: &str = "🖼️➡️💬";
/// The attachment was removed after the conversation started.
pub const IMAGE_CLEARED_KEEP_CHATTING: &str = "🧹✨💬";
/// The model is loaded and nothing has been asked yet.
pub const MODEL_READY_TO_CHAT: &str = "🤖✅💬";
/// Status and assistant marker for a cancelled turn.
pub const GENERATION_CANCELLED: &str = "⛔️🛑";
/// A prompt was sent before a session existed.
pub const MODEL_SESSION_NOT_READY: &str = "⚠️🤖⏸️";
/// A prompt was sent before the model finished loading.
pub const MODEL_STILL_LOADING: &str = "🌀⏳";
/// Waiting for the model to answer.
pub const GENERATING_RESPONSE: &str = "🛠️💬";
/// The answer is being revealed.
pub const STREAMING_RESPONSE: &str = "📡💬";
/// Inference failed, the user may send again.
pub const SEND_TO_TRY_AGAIN: &str = "🔁📨";
/// Status after the attachment could not be decoded.
pub const IMAGE_FAILED_TO_LOAD: &str = "📵🖼️";
/// System message after the attachment could not be decoded.
pub const IMAGE_CONVERSION_FAILED: &str = "🚫🔄🖼️";
/// Status and system message after the model failed to load.
pub const MODEL_LOAD_FAILED: &str = "🚫🤖";
/// Assistant marker for a failed turn.
pub const STREAMED_ERROR: &str = "⚠️💬";

/// Returns the status shown after a turn completed.
#[inline]
pub fn ready_for_next_message(is_follow_up: bool) -> &'static str {
    if is_follow_up { "➕💬🖼️" } else { "💡❓🖼️" }
}
