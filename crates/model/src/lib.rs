//! An abstraction layer for vision-language model runtimes.
//!
//! This crate establishes the protocol the chat core uses to talk to an
//! inference engine: load a model by its identifier, then ask the loaded
//! session to respond to a prompt, optionally together with an image.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to. The engine itself
//! (weights, tokenization, accelerators) is entirely up to them.

#![deny(missing_docs)]

mod error;
mod image;
mod request;
mod service;

pub use error::*;
pub use image::*;
pub use request::*;
pub use service::*;
