use crate::ImageHandle;

/// A request to be sent to a loaded model session.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ModelRequest {
    /// The user prompt.
    pub prompt: String,
    /// An optional image the prompt refers to.
    pub image: Option<ImageHandle>,
}

impl ModelRequest {
    /// Creates a text-only request.
    #[inline]
    pub fn text<S: Into<String>>(prompt: S) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
        }
    }

    /// Attaches an image to the request.
    #[inline]
    pub fn with_image(mut self, image: ImageHandle) -> Self {
        self.image = Some(image);
        self
    }
}
