use std::error::Error;

use crate::error::ErrorKind;
use crate::request::ModelRequest;

/// The error type for a model service.
pub trait ModelServiceError: Error + Send + Sync + 'static {
    /// Returns the kind of this error.
    fn kind(&self) -> ErrorKind;
}

/// A type that represents a model runtime, which is the entry for loading
/// models into sessions.
///
/// Loading is expected to be slow (weights are fetched and prepared), so
/// callers should load once and keep the session around.
pub trait ModelService: Send + Sync {
    /// The error type that may be returned by the service.
    type Error: ModelServiceError;

    /// The session type produced by a successful load.
    type Session: ModelSession<Error = Self::Error>;

    /// Loads the model with the given identifier.
    fn load(
        &self,
        model_id: &str,
    ) -> impl Future<Output = Result<Self::Session, Self::Error>> + Send + 'static;
}

/// A loaded model that can respond to prompts.
///
/// Sessions may keep the conversation history internally, so follow-up
/// requests are answered in context.
pub trait ModelSession: Send + Sync + 'static {
    /// The error type that may be returned by the session.
    type Error: ModelServiceError;

    /// Responds to the request with the complete answer.
    ///
    /// The returned future must be independent of `self`. Dropping it
    /// discards the answer, but implementations are not required to stop
    /// the underlying inference.
    fn respond(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<String, Self::Error>> + Send + 'static;
}
