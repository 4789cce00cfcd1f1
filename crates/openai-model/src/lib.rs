//! A model service for OpenAI-compatible APIs.
//!
//! Works with hosted endpoints as well as local servers that expose vision
//! models behind the chat completions API.

#[macro_use]
extern crate tracing;

mod config;
mod encode;
mod proto;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::{Arc, Mutex, PoisonError};

use mime::Mime;
use reqwest::{Client, RequestBuilder, Response, StatusCode, header};
use serde::de::DeserializeOwned;
use vlm_chat_model::{
    ErrorKind, ModelRequest, ModelService, ModelServiceError, ModelSession,
};

pub use config::{OpenAIConfig, OpenAIConfigBuilder};
use proto::{ChatCompletion, Exchange, ModelList};

/// Error type for [`OpenAIService`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {}

impl ModelServiceError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// OpenAI-compatible model service.
#[derive(Clone, Debug)]
pub struct OpenAIService {
    client: Client,
    config: Arc<OpenAIConfig>,
}

impl OpenAIService {
    /// Creates a new `OpenAIService` with the given configuration.
    #[inline]
    pub fn new(config: OpenAIConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
        }
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header(
            header::AUTHORIZATION,
            format!("Bearer {}", self.config.api_key),
        )
    }
}

impl ModelService for OpenAIService {
    type Error = Error;
    type Session = OpenAISession;

    fn load(
        &self,
        model_id: &str,
    ) -> impl Future<Output = Result<Self::Session, Self::Error>> + Send + 'static
    {
        // Model ids may contain slashes, so look the id up in the listing
        // instead of requesting `/models/{id}`.
        let resp_fut = self
            .authorized(self.client.get(self.config.endpoint("/models")))
            .send();
        let service = self.clone();
        let model_id = model_id.to_owned();

        async move {
            let resp = resp_fut.await.map_err(|err| {
                Error::new(format!("{err}"), ErrorKind::Unavailable)
            })?;
            if resp.status() == StatusCode::NOT_FOUND {
                return Err(Error::new(
                    "the server doesn't list its models",
                    ErrorKind::Unavailable,
                ));
            }
            let resp = resp.error_for_status().map_err(|err| {
                Error::new(format!("{err}"), ErrorKind::Unavailable)
            })?;
            let models: ModelList = read_json(resp).await?;
            if !models.contains(&model_id) {
                return Err(Error::new(
                    format!("unknown model: {model_id}"),
                    ErrorKind::Unavailable,
                ));
            }
            debug!("found {model_id} among {} models", models.data.len());

            Ok(OpenAISession {
                service,
                model: model_id,
                transcript: Default::default(),
            })
        }
    }
}

/// A chat with one model of an [`OpenAIService`].
///
/// The session keeps the transcript of finished exchanges and sends it
/// along with every new prompt.
#[derive(Clone, Debug)]
pub struct OpenAISession {
    service: OpenAIService,
    model: String,
    transcript: Arc<Mutex<Vec<Exchange>>>,
}

impl OpenAISession {
    /// Returns the model identifier sent with every request.
    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn transcript(&self) -> Vec<Exchange> {
        self.transcript
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ModelSession for OpenAISession {
    type Error = Error;

    fn respond(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<String, Self::Error>> + Send + 'static
    {
        let image_url =
            req.image.as_ref().map(encode::png_data_url).transpose();
        let prompt = req.prompt.clone();
        let prepared = image_url.map(|image_url| {
            let OpenAIService { client, config } = &self.service;
            let body = proto::create_request(
                &self.model,
                &self.transcript(),
                req,
                image_url,
                config,
            );
            self.service
                .authorized(client.post(config.endpoint("/chat/completions")))
                .json(&body)
                .send()
        });
        let transcript = Arc::clone(&self.transcript);

        async move {
            let resp = prepared?
                .await
                .and_then(Response::error_for_status)
                .map_err(|err| {
                    Error::new(format!("{err}"), ErrorKind::Other)
                })?;
            let completion: ChatCompletion = read_json(resp).await?;
            let answer = completion.into_answer().ok_or_else(|| {
                Error::new("the server returned no choices", ErrorKind::Other)
            })?;

            transcript
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(Exchange {
                    prompt,
                    answer: answer.clone(),
                });
            Ok(answer)
        }
    }
}

async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T, Error> {
    let content_type = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let is_json = content_type
        .as_deref()
        .and_then(|v| v.parse().ok())
        .is_some_and(|m: Mime| m.subtype() == mime::JSON);
    if !is_json {
        return Err(Error::new(
            format!("Unexpected content type: {content_type:?}"),
            ErrorKind::Other,
        ));
    }

    resp.json()
        .await
        .map_err(|err| Error::new(format!("{err}"), ErrorKind::Other))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::net::SocketAddr;

    use serde_json::{Value, json};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;
    use vlm_chat_model::ImageHandle;

    use super::*;

    const MODEL_ID: &str = "mlx-community/gemma-3-4b-it-4bit";

    struct RecordedRequest {
        head: String,
        body: String,
    }

    impl RecordedRequest {
        fn request_line(&self) -> &str {
            self.head.lines().next().unwrap_or_default()
        }

        fn json(&self) -> Value {
            serde_json::from_str(&self.body).unwrap()
        }
    }

    /// A loopback server that lists the models and answers completions
    /// from a script, recording every request.
    struct TestServer {
        addr: SocketAddr,
        requests: mpsc::UnboundedReceiver<RecordedRequest>,
        handle: JoinHandle<()>,
    }

    impl TestServer {
        async fn start(answers: &[&str]) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let (request_tx, requests) = mpsc::unbounded_channel();
            let mut answers: VecDeque<String> =
                answers.iter().map(|&answer| answer.to_owned()).collect();

            let handle = tokio::spawn(async move {
                while let Ok((mut socket, _)) = listener.accept().await {
                    let request = read_request(&mut socket).await;
                    let line = request.request_line();
                    let answer = if line.starts_with("POST ") {
                        answers.pop_front()
                    } else {
                        None
                    };
                    let (status, body) = match (line, answer) {
                        ("GET /v1/models HTTP/1.1", _) => {
                            let models = json!({
                                "object": "list",
                                "data": [
                                    { "id": "other/model", "object": "model" },
                                    { "id": MODEL_ID, "object": "model" }
                                ]
                            });
                            ("200 OK", models)
                        }
                        (
                            "POST /v1/chat/completions HTTP/1.1",
                            Some(answer),
                        ) => {
                            let completion = json!({
                                "object": "chat.completion",
                                "choices": [{
                                    "index": 0,
                                    "message": {
                                        "role": "assistant",
                                        "content": answer
                                    },
                                    "finish_reason": "stop"
                                }]
                            });
                            ("200 OK", completion)
                        }
                        _ => {
                            let error = json!({ "error": { "message": line } });
                            ("404 Not Found", error)
                        }
                    };
                    request_tx.send(request).ok();

                    let body = body.to_string();
                    let response = format!(
                        "HTTP/1.1 {status}\r\n\
                         Content-Type: application/json\r\n\
                         Content-Length: {}\r\n\
                         Connection: close\r\n\
                         \r\n\
                         {body}",
                        body.len()
                    );
                    socket.write_all(response.as_bytes()).await.ok();
                }
            });

            Self {
                addr,
                requests,
                handle,
            }
        }

        fn service(&self) -> OpenAIService {
            let config = OpenAIConfigBuilder::with_api_key("xxx")
                .with_base_url(format!("http://{}/v1/", self.addr))
                .build();
            OpenAIService::new(config)
        }

        async fn next_request(&mut self) -> RecordedRequest {
            self.requests.recv().await.unwrap()
        }
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            self.handle.abort();
        }
    }

    async fn read_request(socket: &mut TcpStream) -> RecordedRequest {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let header_end = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            buf.extend_from_slice(&chunk[..n]);
            let end = buf.windows(4).position(|w| w == b"\r\n\r\n");
            if let Some(pos) = end {
                break pos + 4;
            }
            if n == 0 {
                break buf.len();
            }
        };
        let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
        let content_length = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while buf.len() < header_end + content_length {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        let body = String::from_utf8_lossy(&buf[header_end..]).into_owned();
        RecordedRequest { head, body }
    }

    #[tokio::test]
    async fn test_load_listed_model() {
        let mut server = TestServer::start(&[]).await;
        let session = server.service().load(MODEL_ID).await.unwrap();
        assert_eq!(session.model(), MODEL_ID);

        let request = server.next_request().await;
        assert_eq!(request.request_line(), "GET /v1/models HTTP/1.1");
        let authorization = "authorization: Bearer xxx";
        assert!(
            request
                .head
                .lines()
                .any(|line| line.eq_ignore_ascii_case(authorization))
        );
    }

    #[tokio::test]
    async fn test_load_unknown_model() {
        let server = TestServer::start(&[]).await;
        let Err(err) = server.service().load("gemma-3-4b-it-4bit").await
        else {
            panic!("loading should fail");
        };
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert_eq!(err.message(), "unknown model: gemma-3-4b-it-4bit");
    }

    #[tokio::test]
    async fn test_respond_replays_transcript() {
        let mut server =
            TestServer::start(&["A red square.", "It's 2 by 2."]).await;
        let session = server.service().load(MODEL_ID).await.unwrap();
        server.next_request().await;

        let image = ImageHandle::from_rgb8(2, 2, [255u8, 0, 0].repeat(4))
            .unwrap();
        let req = ModelRequest::text("describe this").with_image(image);
        let answer = session.respond(&req).await.unwrap();
        assert_eq!(answer, "A red square.");

        let request = server.next_request().await;
        assert_eq!(
            request.request_line(),
            "POST /v1/chat/completions HTTP/1.1"
        );
        let body = request.json();
        assert_eq!(body["model"], MODEL_ID);
        assert_eq!(body["stream"], false);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        let content = &messages[0]["content"];
        assert_eq!(
            content[0],
            json!({ "type": "text", "text": "describe this" })
        );
        assert_eq!(content[1]["type"], "image_url");
        let url = content[1]["image_url"]["url"].as_str().unwrap();
        assert!(url.starts_with("data:image/png;base64,"));

        let answer =
            session.respond(&ModelRequest::text("how big?")).await.unwrap();
        assert_eq!(answer, "It's 2 by 2.");

        let body = server.next_request().await.json();
        assert_eq!(
            body["messages"],
            json!([
                {
                    "role": "user",
                    "content": [{ "type": "text", "text": "describe this" }]
                },
                { "role": "assistant", "content": "A red square." },
                {
                    "role": "user",
                    "content": [{ "type": "text", "text": "how big?" }]
                }
            ])
        );
    }

    #[tokio::test]
    async fn test_respond_failure_keeps_transcript() {
        let mut server = TestServer::start(&[]).await;
        let session = server.service().load(MODEL_ID).await.unwrap();
        server.next_request().await;

        let err = session
            .respond(&ModelRequest::text("hello"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Other);
        assert!(session.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_load_unreachable() {
        // Nothing listens on the discard port.
        let config = OpenAIConfigBuilder::with_api_key("xxx")
            .with_base_url("http://127.0.0.1:9/v1")
            .build();
        let service = OpenAIService::new(config);
        let Err(err) = service.load("some/model").await else {
            panic!("loading should fail");
        };
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }

    #[tokio::test]
    async fn test_respond_unreachable() {
        let config = OpenAIConfigBuilder::with_api_key("xxx")
            .with_base_url("http://127.0.0.1:9/v1")
            .build();
        let session = OpenAISession {
            service: OpenAIService::new(config),
            model: "some/model".to_owned(),
            transcript: Default::default(),
        };
        let image = ImageHandle::from_rgb8(1, 1, vec![0u8; 3]).unwrap();
        let req = ModelRequest::text("hi").with_image(image);
        let err = session.respond(&req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Other);
        assert!(session.transcript().is_empty());
    }
}
