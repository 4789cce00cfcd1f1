//! The conversation state observed by the presentation layer.

use std::collections::HashMap;

use serde::Serialize;

use crate::attachment::ImageAttachment;
use crate::message::{Message, MessageId};
use crate::status::ChatStatus;

/// Everything a chat screen renders: the message log, the pending
/// attachment, and the status banner.
///
/// Only the orchestrator mutates a conversation. Observers get read-only
/// snapshots of it.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Conversation {
    messages: Vec<Message>,
    #[serde(skip)]
    index: HashMap<MessageId, usize>,
    pub(crate) attached_image: Option<ImageAttachment>,
    pub(crate) has_started: bool,
    pub(crate) is_model_ready: bool,
    pub(crate) is_loading: bool,
    pub(crate) status: ChatStatus,
}

impl Conversation {
    /// Returns the messages in chronological order.
    #[inline]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Looks up a message by its identifier.
    #[inline]
    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.index.get(&id).map(|&idx| &self.messages[idx])
    }

    /// Returns the most recent message.
    #[inline]
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Returns the message currently being revealed, if any.
    #[inline]
    pub fn streaming_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|msg| msg.is_streaming())
    }

    /// Returns the image waiting to be sent with the next prompt.
    #[inline]
    pub fn attached_image(&self) -> Option<&ImageAttachment> {
        self.attached_image.as_ref()
    }

    /// Returns `true` once a turn has completed successfully.
    #[inline]
    pub fn has_started(&self) -> bool {
        self.has_started
    }

    /// Returns `true` once the model has been loaded.
    #[inline]
    pub fn is_model_ready(&self) -> bool {
        self.is_model_ready
    }

    /// Returns `true` while a turn is in flight.
    #[inline]
    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    /// Returns the status banner.
    #[inline]
    pub fn status(&self) -> &ChatStatus {
        &self.status
    }

    /// Appends a message to the log.
    pub(crate) fn push(&mut self, message: Message) {
        debug_assert!(
            !(message.is_streaming() && self.streaming_message().is_some()),
            "only one message may be streaming at a time"
        );
        debug_assert!(!self.index.contains_key(&message.id()));
        self.index.insert(message.id(), self.messages.len());
        self.messages.push(message);
    }

    /// Mutates the message with the given identifier in place.
    ///
    /// Returns `false` if there is no such message.
    pub(crate) fn update<F>(&mut self, id: MessageId, f: F) -> bool
    where
        F: FnOnce(&mut Message),
    {
        let Some(&idx) = self.index.get(&id) else {
            return false;
        };
        f(&mut self.messages[idx]);
        true
    }
}
