use tokio::task::JoinHandle;
use vlm_chat_core::{
    ChatConfig, Conversation, ImageAttachment, Orchestrator,
    OrchestratorBuilder,
};
use vlm_chat_model::ModelService;

type ChangeCallback = Box<dyn Fn(&Conversation) + Send + Sync>;

/// A session builder.
///
/// See [`Session`].
pub struct SessionBuilder {
    orchestrator_builder: OrchestratorBuilder,
    on_change: Option<ChangeCallback>,
}

impl SessionBuilder {
    /// Creates a session builder with a specified model service.
    pub fn with_model_service<M: ModelService + 'static>(service: M) -> Self {
        let orchestrator_builder =
            OrchestratorBuilder::with_model_service(service);
        Self {
            orchestrator_builder,
            on_change: None,
        }
    }

    /// Sets the chat configuration.
    #[inline]
    pub fn with_config(mut self, config: ChatConfig) -> Self {
        self.orchestrator_builder =
            self.orchestrator_builder.with_config(config);
        self
    }

    /// Attaches a callback to be invoked when a turn ends.
    #[inline]
    pub fn on_idle(
        mut self,
        on_idle: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        self.orchestrator_builder = self.orchestrator_builder.on_idle(on_idle);
        self
    }

    /// Attaches a callback to be invoked with every new snapshot of the
    /// conversation.
    ///
    /// Snapshots published in quick succession may be coalesced, the
    /// callback always sees the latest one.
    #[inline]
    pub fn on_change(
        mut self,
        on_change: impl Fn(&Conversation) + Send + Sync + 'static,
    ) -> Self {
        self.on_change = Some(Box::new(on_change));
        self
    }

    /// Builds a new session.
    ///
    /// This must be called within a Tokio runtime.
    pub fn build(self) -> Session {
        let orchestrator = self.orchestrator_builder.build();

        let watcher = self.on_change.map(|on_change| {
            let mut state_rx = orchestrator.subscribe();
            tokio::spawn(async move {
                while state_rx.changed().await.is_ok() {
                    // Don't hold the channel lock while calling out.
                    let conversation = state_rx.borrow_and_update().clone();
                    on_change(&conversation);
                }
                trace!("conversation channel closed");
            })
        });

        Session {
            orchestrator,
            watcher,
        }
    }
}

/// A chat session, like a screen that displays messages and has an input
/// box with an image picker.
///
/// This is basically a wrapper around [`Orchestrator`] that also delivers
/// snapshots to a callback.
pub struct Session {
    orchestrator: Orchestrator,
    watcher: Option<JoinHandle<()>>,
}

impl Session {
    /// Returns the underlying orchestrator.
    #[inline]
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Sends a message to the session.
    #[inline]
    pub fn send_message(&self, message: &str) {
        self.orchestrator.send(message);
    }

    /// Cancels the answer being generated, if any.
    #[inline]
    pub fn cancel(&self) {
        self.orchestrator.cancel();
    }

    /// Attaches an encoded image (PNG, JPEG) to the next message.
    #[inline]
    pub fn attach_image(&self, image: ImageAttachment) {
        self.orchestrator.attach_image(image);
    }

    /// Removes the pending image.
    #[inline]
    pub fn remove_image(&self) {
        self.orchestrator.remove_image();
    }

    /// Returns the latest published snapshot.
    #[inline]
    pub fn current(&self) -> Conversation {
        self.orchestrator.current()
    }

    /// Returns the snapshot after all previously sent intents have been
    /// applied.
    #[inline]
    pub async fn snapshot(&self) -> Conversation {
        self.orchestrator.snapshot().await
    }

    /// Returns the latest published snapshot as JSON.
    pub fn current_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.current())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}
