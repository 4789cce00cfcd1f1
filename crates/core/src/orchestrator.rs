mod builder;
mod state;
#[cfg(test)]
mod tests;
mod turn;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use vlm_chat_actor::{Actor, ActorState, define_actor};

use crate::attachment::ImageAttachment;
use crate::config::ChatConfig;
use crate::conversation::Conversation;
use crate::message::MessageId;
use crate::model_client::{ModelClient, SessionClient};
pub use builder::OrchestratorBuilder;
use state::{CancelCurrentRequest, SetAttachedImage, SubmitPrompt};

/// State owned by the orchestrator actor.
///
/// The conversation lives inside the watch channel, so every mutation is
/// published to observers as soon as it's applied.
pub(crate) struct OrchestratorState {
    config: ChatConfig,
    model_client: ModelClient,
    session: Option<SessionClient>,
    load_failed: bool,
    load_task: Option<JoinHandle<()>>,
    current_turn: Option<Turn>,
    next_message_id: u64,
    conversation: watch::Sender<Conversation>,

    on_idle: Option<Box<dyn Fn() + Send + Sync>>,
}

/// The in-flight request handle.
struct Turn {
    token: CancellationToken,
    task: JoinHandle<()>,
    /// Unset while the attached image is still being decoded.
    placeholder: Option<MessageId>,
    is_follow_up: bool,
}

define_actor! {
    /// Drives one chat: loads the model, runs at most one turn at a time,
    /// and keeps the [`Conversation`] up to date.
    ///
    /// Intents sent through this handle are applied in order by a single
    /// task, which is the only writer of the conversation. Observers use
    /// [`Orchestrator::subscribe`] to watch it.
    ///
    /// Dropping the last handle stops the orchestrator and cancels the
    /// turn in flight, if any.
    pub actor Orchestrator(OrchestratorState) {
        state_rx: watch::Receiver<Conversation>,
    }
}

impl Orchestrator {
    /// Returns a receiver that observes every published snapshot.
    #[inline]
    pub fn subscribe(&self) -> watch::Receiver<Conversation> {
        self.state_rx.clone()
    }

    /// Returns the latest published snapshot.
    ///
    /// Intents that are still queued are not reflected yet, use
    /// [`Orchestrator::snapshot`] for that.
    #[inline]
    pub fn current(&self) -> Conversation {
        self.state_rx.borrow().clone()
    }

    /// Returns the snapshot after all previously sent intents have been
    /// applied.
    pub async fn snapshot(&self) -> Conversation {
        let result = self
            .handle()
            .call(|state, _| state.conversation.borrow().clone())
            .await;
        match result {
            Ok(conversation) => conversation,
            Err(_) => self.current(),
        }
    }

    /// Attaches an image to the next prompt, replacing any previous one.
    #[inline]
    pub fn attach_image(&self, image: ImageAttachment) {
        self.set_attached_image(Some(image));
    }

    /// Removes the pending attachment.
    #[inline]
    pub fn remove_image(&self) {
        self.set_attached_image(None);
    }

    /// Sets or clears the pending attachment.
    #[inline]
    pub fn set_attached_image(&self, image: Option<ImageAttachment>) {
        self.dispatch(SetAttachedImage(image));
    }

    /// Sends a prompt, as a follow-up if the conversation has started.
    #[inline]
    pub fn send<S: Into<String>>(&self, prompt: S) {
        self.send_follow_up(prompt);
    }

    /// Starts the conversation with the given prompt.
    #[inline]
    pub fn start_conversation<S: Into<String>>(&self, prompt: S) {
        self.dispatch(SubmitPrompt {
            prompt: prompt.into(),
            follow_up: false,
        });
    }

    /// Sends a follow-up prompt.
    ///
    /// Before the first completed turn this is the same as
    /// [`Orchestrator::start_conversation`].
    #[inline]
    pub fn send_follow_up<S: Into<String>>(&self, prompt: S) {
        self.dispatch(SubmitPrompt {
            prompt: prompt.into(),
            follow_up: true,
        });
    }

    /// Cancels the turn in flight. Does nothing when idle.
    #[inline]
    pub fn cancel(&self) {
        self.dispatch(CancelCurrentRequest);
    }

    /// Stops the orchestrator, cancelling the turn in flight.
    ///
    /// Intents sent afterwards are dropped.
    #[inline]
    pub fn shutdown(&self) {
        self.handle().try_kill();
    }

    fn dispatch<M>(&self, msg: M)
    where
        M: vlm_chat_actor::Message<OrchestratorState> + 'static,
    {
        if let Err(err) = self.handle().send(msg) {
            warn!("dropping an intent: {err}");
        }
    }

    fn spawn_from_builder(builder: OrchestratorBuilder) -> Self {
        let OrchestratorBuilder {
            model_client,
            config,
            on_idle,
        } = builder;

        let (conversation, state_rx) =
            watch::channel(Conversation::default());
        let state = OrchestratorState {
            config,
            model_client,
            session: None,
            load_failed: false,
            load_task: None,
            current_turn: None,
            next_message_id: 1,
            conversation,
            on_idle,
        };
        Self::spawn(state, Some("orchestrator"), state_rx)
    }
}

impl ActorState for OrchestratorState {
    fn started(&mut self, handle: &Actor<Self>) {
        self.initialize(handle);
    }

    fn stopped(&mut self) {
        if let Some(turn) = self.current_turn.take() {
            debug!("stopping with a turn in flight");
            turn.token.cancel();
            turn.task.abort();
        }
        if let Some(load_task) = self.load_task.take() {
            load_task.abort();
        }
    }
}
