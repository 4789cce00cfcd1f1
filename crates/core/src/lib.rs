//! Core logic of the chat: the conversation state and the orchestrator
//! that drives a vision-language model through it.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

pub mod attachment;
mod config;
mod conversation;
pub mod copy;
mod message;
mod model_client;
mod orchestrator;
pub mod reveal;
mod status;

pub use attachment::ImageAttachment;
pub use config::{
    ChatConfig, ChatConfigBuilder, DEFAULT_MODEL_ID, RevealPacing,
};
pub use conversation::Conversation;
pub use message::{Message, MessageId, Role};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use status::ChatStatus;
