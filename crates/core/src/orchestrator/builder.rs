use vlm_chat_model::ModelService;

use super::Orchestrator;
use crate::config::ChatConfig;
use crate::model_client::ModelClient;

/// [`Orchestrator`] builder.
pub struct OrchestratorBuilder {
    pub(crate) model_client: ModelClient,
    pub(crate) config: ChatConfig,
    pub(crate) on_idle: Option<Box<dyn Fn() + Send + Sync>>,
}

impl OrchestratorBuilder {
    /// Creates a new builder with the specified model service.
    #[inline]
    pub fn with_model_service<M: ModelService + 'static>(service: M) -> Self {
        Self {
            model_client: ModelClient::new(service),
            config: ChatConfig::default(),
            on_idle: None,
        }
    }

    /// Sets the chat configuration.
    #[inline]
    pub fn with_config(mut self, config: ChatConfig) -> Self {
        self.config = config;
        self
    }

    /// Attaches a callback to be invoked whenever a turn ends, whether it
    /// completed, failed, or was cancelled.
    #[inline]
    pub fn on_idle(
        mut self,
        on_idle: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        self.on_idle = Some(Box::new(on_idle));
        self
    }

    /// Builds the orchestrator and starts loading the model.
    ///
    /// This must be called within a Tokio runtime.
    #[inline]
    pub fn build(self) -> Orchestrator {
        Orchestrator::spawn_from_builder(self)
    }
}
