use std::fmt::{self, Debug};
use std::pin::Pin;
use std::sync::Arc;

use tracing::Instrument;
use vlm_chat_model::{
    ModelRequest, ModelService, ModelServiceError, ModelSession,
};

pub type BoxedModelError = Box<dyn ModelServiceError>;

type BoxedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type LoadFn = Arc<
    dyn Fn(String) -> BoxedFuture<Result<SessionClient, BoxedModelError>>
        + Send
        + Sync,
>;
type RespondFn = Arc<
    dyn Fn(ModelRequest) -> BoxedFuture<Result<String, BoxedModelError>>
        + Send
        + Sync,
>;

/// A wrapper around a model service that provides a type-erased
/// interface for the other modules.
#[derive(Clone)]
pub struct ModelClient {
    load_fn: LoadFn,
}

impl ModelClient {
    #[inline]
    pub fn new<M: ModelService + 'static>(service: M) -> Self {
        // We have to erase the type `M`, since the orchestrator doesn't
        // have a generic parameter and we don't want it either.
        let load_fn: LoadFn = Arc::new(move |model_id| {
            let fut = service.load(&model_id);
            Box::pin(
                async move {
                    match fut.await {
                        Ok(session) => {
                            debug!("model loaded");
                            Ok(SessionClient::new(session))
                        }
                        Err(err) => {
                            error!("failed to load model: {err:?}");
                            Err(Box::new(err) as BoxedModelError)
                        }
                    }
                }
                .instrument(debug_span!("load model", model_id = %model_id)),
            )
        });
        Self { load_fn }
    }

    /// Loads the model with the given identifier.
    #[inline]
    pub async fn load(
        &self,
        model_id: &str,
    ) -> Result<SessionClient, BoxedModelError> {
        (self.load_fn)(model_id.to_owned()).await
    }
}

/// A type-erased loaded model session.
#[derive(Clone)]
pub struct SessionClient {
    respond_fn: RespondFn,
}

impl SessionClient {
    fn new<S: ModelSession>(session: S) -> Self {
        let respond_fn: RespondFn = Arc::new(move |req| {
            let fut = session.respond(&req);
            Box::pin(
                async move {
                    trace!("got a request: {:?}", req);
                    let answer = fut.await.map_err(|err| {
                        error!("got an error: {err:?}");
                        Box::new(err) as BoxedModelError
                    })?;
                    trace!("got an answer of {} bytes", answer.len());
                    Ok(answer)
                }
                .instrument(trace_span!("model session req")),
            )
        });
        Self { respond_fn }
    }

    /// Sends a request and returns the complete answer.
    ///
    /// # Cancel safety
    ///
    /// Dropping the returned future discards the answer, but the model
    /// may keep working on it.
    #[inline]
    pub fn respond(
        &self,
        req: ModelRequest,
    ) -> impl Future<Output = Result<String, BoxedModelError>> + Send + 'static
    {
        (self.respond_fn)(req)
    }
}

impl Debug for SessionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionClient").finish_non_exhaustive()
    }
}
