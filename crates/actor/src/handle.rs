use std::sync::{Arc, Weak};

use tokio::sync::oneshot;
use tracing::Instrument;

use crate::mailbox::{Call, Mailbox, MailboxParts};
use crate::scheduler::run_actor;
use crate::{ActorDeadError, ActorState, Message};

/// Handle to an actor.
///
/// The actor keeps running as long as any strong handle is alive. Tasks
/// spawned by the actor itself should hold a [`WeakActor`] instead, so
/// they don't keep their owner alive.
pub struct Actor<S> {
    mailbox: Arc<Mailbox<S>>,
}

impl<S: ActorState> Actor<S> {
    /// Spawn a new actor with the specified state and an optional label.
    ///
    /// Typically, you should not use this method directly, but rather
    /// use [`crate::define_actor`] macro to define your actor type and
    /// then call `spawn` method on that type.
    ///
    /// This must be called within a Tokio runtime.
    pub fn spawn(state: S, label: Option<&str>) -> Self {
        let MailboxParts {
            mailbox,
            msg_rx,
            kill_rx,
        } = Mailbox::new();
        let mailbox = Arc::new(mailbox);
        tokio::spawn(
            run_actor(Arc::downgrade(&mailbox), state, msg_rx, kill_rx)
                .instrument(trace_span!("actor", label = label)),
        );
        Self { mailbox }
    }

    #[inline]
    pub(crate) fn from_mailbox(mailbox: Arc<Mailbox<S>>) -> Self {
        Self { mailbox }
    }

    /// Sends a message to the actor.
    #[inline]
    pub fn send<M: Message<S> + 'static>(
        &self,
        msg: M,
    ) -> Result<(), ActorDeadError> {
        self.mailbox.send(Box::new(msg))
    }

    /// Runs `f` against the actor's state and returns its result.
    ///
    /// The closure is queued like any other message, so it observes the
    /// state after all previously sent messages have been handled.
    pub async fn call<R, F>(&self, f: F) -> Result<R, ActorDeadError>
    where
        R: Send + 'static,
        F: FnOnce(&mut S, &Actor<S>) -> R + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Call {
            f: Box::new(f),
            reply_tx,
        })?;
        reply_rx.await.map_err(|_| ActorDeadError)
    }

    /// Attempts to kill the actor.
    ///
    /// The actor is not guaranteed to be killed immediately, but it
    /// will stop handling further messages and quit soon.
    #[inline]
    pub fn try_kill(&self) {
        self.mailbox.try_kill();
    }

    /// Returns `true` if the actor has stopped handling messages.
    #[inline]
    pub fn is_dead(&self) -> bool {
        self.mailbox.is_closed()
    }

    /// Creates a weak handle to the actor.
    #[inline]
    pub fn downgrade(&self) -> WeakActor<S> {
        WeakActor {
            mailbox: Arc::downgrade(&self.mailbox),
        }
    }
}

impl<S> Clone for Actor<S> {
    #[inline]
    fn clone(&self) -> Self {
        Self {
            mailbox: Arc::clone(&self.mailbox),
        }
    }
}

/// A handle that doesn't keep the actor alive.
pub struct WeakActor<S> {
    mailbox: Weak<Mailbox<S>>,
}

impl<S: ActorState> WeakActor<S> {
    /// Sends a message to the actor if it's still alive.
    #[inline]
    pub fn send<M: Message<S> + 'static>(
        &self,
        msg: M,
    ) -> Result<(), ActorDeadError> {
        let mailbox = self.mailbox.upgrade().ok_or(ActorDeadError)?;
        mailbox.send(Box::new(msg))
    }

    /// Attempts to upgrade to a strong handle.
    #[inline]
    pub fn upgrade(&self) -> Option<Actor<S>> {
        self.mailbox.upgrade().map(Actor::from_mailbox)
    }
}

impl<S> Clone for WeakActor<S> {
    #[inline]
    fn clone(&self) -> Self {
        Self {
            mailbox: Weak::clone(&self.mailbox),
        }
    }
}
