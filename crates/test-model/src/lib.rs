//! A local fake model service for testing purpose.

mod preset;

use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::sleep;
use vlm_chat_model::{
    ErrorKind, ModelRequest, ModelService, ModelServiceError, ModelSession,
};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

impl StdError for Error {}

impl ModelServiceError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

#[derive(Default)]
struct Shared {
    script: Vec<PresetResponse>,
    next_step: AtomicUsize,
    requests: Mutex<Vec<ModelRequest>>,
    loaded_models: Mutex<Vec<String>>,
}

/// A local fake model service for testing purpose.
///
/// Before loading, you need to setup the script, which is how the session
/// should respond to each request. Requests consume the steps in order.
/// If there are no enough steps in the script, an error will be returned.
///
/// Clones share the same script and request log, so a test can keep one
/// clone around to inspect what the session has received.
///
/// # Note
///
/// This type is not optimized for production use. You should only use it
/// for testing.
#[derive(Clone, Default)]
pub struct TestModelService {
    shared: Arc<Shared>,
    load_failure: Option<String>,
    load_delay: Option<Duration>,
    respond_delay: Option<Duration>,
}

impl TestModelService {
    /// Creates a service that answers with the given script.
    #[inline]
    pub fn with_script(script: impl Into<Vec<PresetResponse>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                script: script.into(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Makes every `load` call fail with the given message.
    #[inline]
    pub fn fail_load<S: Into<String>>(mut self, message: S) -> Self {
        self.load_failure = Some(message.into());
        self
    }

    #[inline]
    pub fn with_load_delay(mut self, duration: Duration) -> Self {
        self.load_delay = Some(duration);
        self
    }

    #[inline]
    pub fn with_respond_delay(mut self, duration: Duration) -> Self {
        self.respond_delay = Some(duration);
        self
    }

    /// Returns the requests received by sessions of this service so far.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.shared
            .requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    /// Returns the identifiers passed to `load` so far.
    pub fn loaded_models(&self) -> Vec<String> {
        self.shared
            .loaded_models
            .lock()
            .map(|models| models.clone())
            .unwrap_or_default()
    }
}

pub struct TestModelSession {
    shared: Arc<Shared>,
    delay: Option<Duration>,
}

impl ModelService for TestModelService {
    type Error = crate::Error;
    type Session = TestModelSession;

    fn load(
        &self,
        model_id: &str,
    ) -> impl Future<Output = Result<Self::Session, Self::Error>> + Send + 'static
    {
        if let Ok(mut models) = self.shared.loaded_models.lock() {
            models.push(model_id.to_owned());
        }
        let shared = Arc::clone(&self.shared);
        let load_failure = self.load_failure.clone();
        let load_delay = self.load_delay;
        let delay = self.respond_delay;
        async move {
            if let Some(load_delay) = load_delay {
                sleep(load_delay).await;
            }
            if let Some(message) = load_failure {
                return Err(Error {
                    message,
                    kind: ErrorKind::Unavailable,
                });
            }
            Ok(TestModelSession { shared, delay })
        }
    }
}

impl ModelSession for TestModelSession {
    type Error = crate::Error;

    fn respond(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<String, Self::Error>> + Send + 'static
    {
        if let Ok(mut requests) = self.shared.requests.lock() {
            requests.push(req.clone());
        }
        let step_idx = self.shared.next_step.fetch_add(1, Ordering::Relaxed);
        let step = self.shared.script.get(step_idx).cloned();
        let delay = self.delay.unwrap_or(Duration::from_millis(1));
        async move {
            sleep(delay).await;
            match step {
                Some(PresetResponse::Answer(text)) => Ok(text),
                Some(PresetResponse::Failure(message)) => Err(Error {
                    message,
                    kind: ErrorKind::Other,
                }),
                None => Err(Error {
                    message: "no enough steps".to_owned(),
                    kind: ErrorKind::Other,
                }),
            }
        }
    }
}
