use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use vlm_chat_actor::{Actor, Message};
use vlm_chat_model::{ImageHandle, ModelRequest};

use super::turn::{TurnOutcome, run_turn};
use super::{OrchestratorState, Turn};
use crate::attachment::{self, ImageAttachment};
use crate::conversation::Conversation;
use crate::copy;
use crate::message::{Message as ChatMessage, MessageId};
use crate::model_client::{BoxedModelError, SessionClient};
use crate::reveal::RevealOutcome;
use crate::status::ChatStatus;

impl OrchestratorState {
    #[inline]
    fn modify(&self, f: impl FnOnce(&mut Conversation)) {
        self.conversation.send_modify(f);
    }

    #[inline]
    fn next_message_id(&mut self) -> MessageId {
        let id = MessageId::new(self.next_message_id);
        self.next_message_id += 1;
        id
    }

    fn notify_idle(&self) {
        if let Some(on_idle) = &self.on_idle {
            on_idle();
        }
    }

    pub(super) fn initialize(&mut self, handle: &Actor<Self>) {
        self.modify(|conv| {
            conv.status = ChatStatus::loading(copy::LOADING_MODEL);
        });

        let model_client = self.model_client.clone();
        let model_id = self.config.model_id.clone();
        let handle = handle.downgrade();
        info!("loading model {model_id}");
        self.load_task = Some(tokio::spawn(async move {
            let result = model_client.load(&model_id).await;
            handle.send(ModelLoaded(result)).ok();
        }));
    }

    fn model_loaded(
        &mut self,
        result: Result<SessionClient, BoxedModelError>,
    ) {
        self.load_task = None;
        match result {
            Ok(session) => {
                info!("model is ready");
                self.session = Some(session);
                self.modify(|conv| {
                    conv.is_model_ready = true;
                    conv.status = ChatStatus::ready(copy::MODEL_READY_TO_CHAT);
                });
            }
            Err(err) => {
                error!("model load error: {err}");
                self.load_failed = true;
                let id = self.next_message_id();
                self.modify(|conv| {
                    conv.status = ChatStatus::error(copy::MODEL_LOAD_FAILED);
                    conv.push(ChatMessage::system(id, copy::MODEL_LOAD_FAILED));
                });
            }
        }
    }

    fn set_attached_image(&mut self, image: Option<ImageAttachment>) {
        if image.is_some() && self.current_turn.is_some() {
            debug!("a turn is in flight, ignoring the attachment");
            return;
        }
        self.modify(|conv| {
            let is_attached = image.is_some();
            conv.attached_image = image;
            if !conv.is_model_ready {
                return;
            }
            conv.status = if is_attached {
                ChatStatus::needs_image(copy::IMAGE_ATTACHED_AWAITING_MESSAGE)
            } else if conv.has_started {
                ChatStatus::ready(copy::IMAGE_CLEARED_KEEP_CHATTING)
            } else {
                ChatStatus::ready(copy::MODEL_READY_TO_CHAT)
            };
        });
    }

    fn submit_prompt(
        &mut self,
        prompt: String,
        follow_up: bool,
        handle: &Actor<Self>,
    ) {
        // A follow-up before anything was answered starts the
        // conversation instead.
        let is_follow_up = follow_up && self.conversation.borrow().has_started;

        let prompt = prompt.trim();
        if prompt.is_empty() {
            return;
        }
        if self.current_turn.is_some() {
            debug!("a turn is already in flight, dropping the prompt");
            return;
        }
        if self.load_failed {
            debug!("the model failed to load, dropping the prompt");
            return;
        }
        let Some(session) = self.session.clone() else {
            self.modify(|conv| {
                conv.status = ChatStatus::error(copy::MODEL_SESSION_NOT_READY);
            });
            return;
        };
        if !self.conversation.borrow().is_model_ready {
            self.modify(|conv| {
                conv.status = ChatStatus::loading(copy::MODEL_STILL_LOADING);
            });
            return;
        }

        self.modify(|conv| {
            conv.is_loading = true;
            conv.status = ChatStatus::loading(copy::GENERATING_RESPONSE);
        });
        self.begin_turn(prompt.to_owned(), is_follow_up, session, handle);
    }

    fn begin_turn(
        &mut self,
        prompt: String,
        is_follow_up: bool,
        session: SessionClient,
        handle: &Actor<Self>,
    ) {
        let token = CancellationToken::new();
        let image = self.conversation.borrow().attached_image.clone();
        let Some(image) = image else {
            self.ask_model(prompt, None, is_follow_up, token, session, handle);
            return;
        };

        // The turn owns the attachment from now on.
        self.modify(|conv| conv.attached_image = None);

        // Decoding a large photo takes a while, keep the actor responsive
        // meanwhile.
        let handle = handle.downgrade();
        let task = tokio::spawn(
            async move {
                let encoded = image.clone();
                let result = tokio::task::spawn_blocking(move || {
                    encoded.to_model_image()
                })
                .await
                .map_err(|err| {
                    error!("image conversion task failed: {err}");
                    attachment::Error::new(attachment::ErrorKind::Malformed)
                })
                .and_then(|result| result);
                handle
                    .send(ImageConverted {
                        prompt,
                        image,
                        session,
                        result,
                    })
                    .ok();
            }
            .instrument(debug_span!("convert_image")),
        );
        self.current_turn = Some(Turn {
            token,
            task,
            placeholder: None,
            is_follow_up,
        });
    }

    fn image_converted(
        &mut self,
        converted: ImageConverted,
        handle: &Actor<Self>,
    ) {
        let Some(turn) =
            self.current_turn.take_if(|turn| turn.placeholder.is_none())
        else {
            warn!("got a stale image conversion");
            return;
        };
        let ImageConverted {
            prompt,
            image,
            session,
            result,
        } = converted;

        if turn.token.is_cancelled() {
            debug!("cancelled while converting the image");
            let user_id = self.next_message_id();
            let mut reply = ChatMessage::placeholder(self.next_message_id());
            RevealOutcome::Cancelled(String::new()).apply(&mut reply);
            self.modify(|conv| {
                conv.push(ChatMessage::user(user_id, prompt, Some(image)));
                conv.push(reply);
                conv.is_loading = false;
            });
            self.notify_idle();
            return;
        }

        match result {
            Ok(model_image) => self.ask_model(
                prompt,
                Some((image, model_image)),
                turn.is_follow_up,
                turn.token,
                session,
                handle,
            ),
            Err(err) => {
                warn!("image conversion error: {err}");
                let id = self.next_message_id();
                self.modify(|conv| {
                    conv.push(ChatMessage::system(
                        id,
                        copy::IMAGE_CONVERSION_FAILED,
                    ));
                    conv.status = ChatStatus::error(copy::IMAGE_FAILED_TO_LOAD);
                    conv.is_loading = false;
                });
                self.notify_idle();
            }
        }
    }

    fn ask_model(
        &mut self,
        prompt: String,
        image: Option<(ImageAttachment, ImageHandle)>,
        is_follow_up: bool,
        token: CancellationToken,
        session: SessionClient,
        handle: &Actor<Self>,
    ) {
        let (image, model_image) = image.unzip();
        let user_id = self.next_message_id();
        let placeholder = self.next_message_id();
        self.modify(|conv| {
            conv.attached_image = None;
            conv.push(ChatMessage::user(user_id, prompt.clone(), image));
            conv.push(ChatMessage::placeholder(placeholder));
        });

        let mut request = ModelRequest::text(prompt);
        if let Some(model_image) = model_image {
            request = request.with_image(model_image);
        }

        let task = tokio::spawn(
            run_turn(
                session,
                request,
                placeholder,
                token.clone(),
                self.config.pacing,
                handle.downgrade(),
            )
            .instrument(debug_span!("turn", %placeholder, is_follow_up)),
        );
        self.current_turn = Some(Turn {
            token,
            task,
            placeholder: Some(placeholder),
            is_follow_up,
        });
    }

    fn cancel_current_request(&mut self) {
        let Some(turn) = &self.current_turn else {
            return;
        };
        match turn.placeholder {
            Some(placeholder) => debug!("cancelling the turn of {placeholder}"),
            None => debug!("cancelling the turn before asking the model"),
        }
        turn.token.cancel();
        self.modify(|conv| {
            conv.status = ChatStatus::ready(copy::GENERATION_CANCELLED);
        });
    }

    fn is_current_turn(&self, placeholder: MessageId) -> bool {
        let is_current = self
            .current_turn
            .as_ref()
            .is_some_and(|turn| turn.placeholder == Some(placeholder));
        if !is_current {
            warn!("got an event of a stale turn ({placeholder})");
        }
        is_current
    }

    fn streaming_started(&mut self, placeholder: MessageId) {
        if !self.is_current_turn(placeholder) {
            return;
        }
        self.modify(|conv| {
            conv.status = ChatStatus::loading(copy::STREAMING_RESPONSE);
        });
    }

    fn reveal_progress(&mut self, placeholder: MessageId, ch: char) {
        if !self.is_current_turn(placeholder) {
            return;
        }
        self.modify(|conv| {
            conv.update(placeholder, |msg| msg.push_char(ch));
        });
    }

    fn turn_finished(
        &mut self,
        placeholder: MessageId,
        outcome: TurnOutcome,
    ) {
        if !self.is_current_turn(placeholder) {
            return;
        }
        let Some(turn) = self.current_turn.take() else {
            return;
        };
        let is_follow_up = turn.is_follow_up;

        self.modify(|conv| {
            match outcome {
                TurnOutcome::Revealed(reveal) if reveal.is_cancelled() => {
                    conv.update(placeholder, |msg| reveal.apply(msg));
                    conv.status = ChatStatus::ready(copy::GENERATION_CANCELLED);
                }
                TurnOutcome::Revealed(reveal) => {
                    conv.update(placeholder, |msg| reveal.apply(msg));
                    conv.has_started = true;
                    conv.status = ChatStatus::ready(
                        copy::ready_for_next_message(is_follow_up),
                    );
                }
                TurnOutcome::Failed(err) => {
                    error!("conversation error: {err}");
                    conv.update(placeholder, |msg| {
                        msg.finalize(copy::STREAMED_ERROR);
                    });
                    conv.status = ChatStatus::error(copy::SEND_TO_TRY_AGAIN);
                }
            }
            conv.is_loading = false;
        });
        self.notify_idle();
    }
}

#[derive(Debug)]
struct ModelLoaded(Result<SessionClient, BoxedModelError>);

impl Message<OrchestratorState> for ModelLoaded {
    #[inline]
    fn handle(
        self,
        state: &mut OrchestratorState,
        _: &Actor<OrchestratorState>,
    ) {
        state.model_loaded(self.0);
    }
}

#[derive(Debug)]
pub struct SetAttachedImage(pub Option<ImageAttachment>);

impl Message<OrchestratorState> for SetAttachedImage {
    #[inline]
    fn handle(
        self,
        state: &mut OrchestratorState,
        _: &Actor<OrchestratorState>,
    ) {
        state.set_attached_image(self.0);
    }
}

#[derive(Debug)]
pub struct SubmitPrompt {
    pub prompt: String,
    pub follow_up: bool,
}

impl Message<OrchestratorState> for SubmitPrompt {
    #[inline]
    fn handle(
        self,
        state: &mut OrchestratorState,
        handle: &Actor<OrchestratorState>,
    ) {
        state.submit_prompt(self.prompt, self.follow_up, handle);
    }
}

#[derive(Debug)]
pub struct CancelCurrentRequest;

impl Message<OrchestratorState> for CancelCurrentRequest {
    #[inline]
    fn handle(
        self,
        state: &mut OrchestratorState,
        _: &Actor<OrchestratorState>,
    ) {
        state.cancel_current_request();
    }
}

#[derive(Debug)]
struct ImageConverted {
    prompt: String,
    image: ImageAttachment,
    session: SessionClient,
    result: Result<ImageHandle, attachment::Error>,
}

impl Message<OrchestratorState> for ImageConverted {
    #[inline]
    fn handle(
        self,
        state: &mut OrchestratorState,
        handle: &Actor<OrchestratorState>,
    ) {
        state.image_converted(self, handle);
    }
}

#[derive(Debug)]
pub(super) struct StreamingStarted(pub MessageId);

impl Message<OrchestratorState> for StreamingStarted {
    #[inline]
    fn handle(
        self,
        state: &mut OrchestratorState,
        _: &Actor<OrchestratorState>,
    ) {
        state.streaming_started(self.0);
    }
}

#[derive(Debug)]
pub(super) struct RevealProgress {
    pub placeholder: MessageId,
    pub ch: char,
}

impl Message<OrchestratorState> for RevealProgress {
    #[inline]
    fn handle(
        self,
        state: &mut OrchestratorState,
        _: &Actor<OrchestratorState>,
    ) {
        state.reveal_progress(self.placeholder, self.ch);
    }
}

#[derive(Debug)]
pub(super) struct TurnFinished {
    pub placeholder: MessageId,
    pub outcome: TurnOutcome,
}

impl Message<OrchestratorState> for TurnFinished {
    #[inline]
    fn handle(
        self,
        state: &mut OrchestratorState,
        _: &Actor<OrchestratorState>,
    ) {
        state.turn_finished(self.placeholder, self.outcome);
    }
}
