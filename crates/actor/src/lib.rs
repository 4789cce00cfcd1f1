//! A lightweight actor framework.
//!
//! An actor owns a piece of state and mutates it only from its own task,
//! one message at a time. Other tasks talk to it through handles.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod error;
mod handle;
mod macros;
mod mailbox;
mod scheduler;

pub use error::ActorDeadError;
pub use handle::{Actor, WeakActor};
pub use mailbox::Message;

/// The state owned by an actor.
pub trait ActorState: Send + Sized + 'static {
    /// Called on the actor task before any message is handled.
    #[inline]
    fn started(&mut self, handle: &Actor<Self>) {
        let _ = handle;
    }

    /// Called on the actor task after it stopped handling messages.
    #[inline]
    fn stopped(&mut self) {}
}
