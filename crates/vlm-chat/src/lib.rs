//! An out-of-the-box chat client for vision-language models.
//!
//! The crate includes a CLI tool for using in the terminal. And you can also
//! use it as a library (or through its C APIs) to bring the chat into your
//! own host apps.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

#[cfg(feature = "ffi")]
pub mod ffi;
mod session;

pub use session::{Session, SessionBuilder};

/// Re-exports of [`vlm_chat_core`] crate.
pub mod core {
    pub use vlm_chat_core::*;
}

/// Re-exports of [`vlm_chat_openai_model`] crate.
pub mod openai {
    pub use vlm_chat_openai_model::*;
}
