use tokio_util::sync::CancellationToken;
use vlm_chat_actor::WeakActor;
use vlm_chat_model::ModelRequest;

use super::OrchestratorState;
use super::state::{RevealProgress, StreamingStarted, TurnFinished};
use crate::config::RevealPacing;
use crate::message::MessageId;
use crate::model_client::{BoxedModelError, SessionClient};
use crate::reveal::{RevealOutcome, reveal};

/// How a turn ended.
#[derive(Debug)]
pub(super) enum TurnOutcome {
    /// The answer was revealed, completely or until cancelled.
    Revealed(RevealOutcome),
    /// The model failed to answer.
    Failed(BoxedModelError),
}

/// The body of a turn, from asking the model to the end of the reveal.
///
/// The turn never touches the conversation itself. Everything is reported
/// back to the orchestrator, which applies it in order.
pub(super) async fn run_turn(
    session: SessionClient,
    request: ModelRequest,
    placeholder: MessageId,
    token: CancellationToken,
    pacing: RevealPacing,
    handle: WeakActor<OrchestratorState>,
) {
    let result = session.respond(request).await;

    // The request itself can't be interrupted, only its answer discarded.
    let outcome = if token.is_cancelled() {
        debug!("cancelled while waiting for the answer");
        TurnOutcome::Revealed(RevealOutcome::Cancelled(String::new()))
    } else {
        match result {
            Ok(answer) => {
                handle.send(StreamingStarted(placeholder)).ok();
                let outcome = reveal(&answer, &token, pacing, |ch| {
                    handle.send(RevealProgress { placeholder, ch }).ok();
                })
                .await;
                TurnOutcome::Revealed(outcome)
            }
            Err(err) => TurnOutcome::Failed(err),
        }
    };

    if handle
        .send(TurnFinished {
            placeholder,
            outcome,
        })
        .is_err()
    {
        debug!("orchestrator has stopped before the turn finished");
    }
}
