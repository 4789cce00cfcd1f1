use std::time::Duration;

/// The model loaded when none is configured.
pub const DEFAULT_MODEL_ID: &str = "mlx-community/gemma-3-4b-it-4bit";

/// Pauses between revealed characters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RevealPacing {
    /// Pause after a non-whitespace character.
    pub character_delay: Duration,
    /// Pause after a whitespace character.
    pub whitespace_delay: Duration,
}

impl RevealPacing {
    /// Reveals everything without pausing.
    pub const INSTANT: Self = Self {
        character_delay: Duration::ZERO,
        whitespace_delay: Duration::ZERO,
    };

    /// Returns the pause after revealing `ch`.
    #[inline]
    pub fn delay_after(&self, ch: char) -> Duration {
        if ch.is_whitespace() {
            self.whitespace_delay
        } else {
            self.character_delay
        }
    }
}

impl Default for RevealPacing {
    fn default() -> Self {
        Self {
            character_delay: Duration::from_millis(18),
            whitespace_delay: Duration::from_millis(40),
        }
    }
}

/// Builder for [`ChatConfig`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ChatConfigBuilder {
    model_id: Option<String>,
    pacing: Option<RevealPacing>,
}

impl ChatConfigBuilder {
    /// Sets the identifier of the model to load.
    #[inline]
    pub fn with_model_id<S: Into<String>>(mut self, model_id: S) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    /// Sets how fast answers are revealed.
    #[inline]
    pub fn with_pacing(mut self, pacing: RevealPacing) -> Self {
        self.pacing = Some(pacing);
        self
    }

    /// Builds the configuration.
    #[inline]
    pub fn build(self) -> ChatConfig {
        ChatConfig {
            model_id: self
                .model_id
                .unwrap_or_else(|| DEFAULT_MODEL_ID.to_owned()),
            pacing: self.pacing.unwrap_or_default(),
        }
    }
}

/// Configuration of a chat.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChatConfig {
    pub(crate) model_id: String,
    pub(crate) pacing: RevealPacing,
}

impl ChatConfig {
    /// Creates a builder with default settings.
    #[inline]
    pub fn builder() -> ChatConfigBuilder {
        ChatConfigBuilder::default()
    }

    /// Returns the identifier of the model to load.
    #[inline]
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Returns the reveal pacing.
    #[inline]
    pub fn pacing(&self) -> RevealPacing {
        self.pacing
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        ChatConfigBuilder::default().build()
    }
}
