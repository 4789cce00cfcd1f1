//! Simulated streaming of an answer that arrived in one piece.
//!
//! Revealing the answer one character at a time gives the typing effect,
//! and the gaps between characters are where a turn can be cancelled.

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::config::RevealPacing;
use crate::copy;
use crate::message::Message;

/// How a reveal ended.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RevealOutcome {
    /// Every character was revealed.
    Completed(String),
    /// The reveal was cancelled, carrying what had been revealed so far.
    Cancelled(String),
}

impl RevealOutcome {
    /// Returns `true` if the reveal was cancelled.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Writes the final text into the revealed message and stops its
    /// streaming.
    ///
    /// A cancelled reveal keeps the revealed prefix. If nothing had been
    /// revealed, the message shows the cancellation marker instead.
    pub(crate) fn apply(self, message: &mut Message) {
        match self {
            Self::Completed(text) => message.finalize(text),
            Self::Cancelled(partial) if partial.is_empty() => {
                message.finalize(copy::GENERATION_CANCELLED)
            }
            Self::Cancelled(partial) => message.finalize(partial),
        }
    }
}

/// Reveals `text` one character at a time.
///
/// `on_progress` receives each character as it's revealed. Cancellation
/// is checked before every character, so a cancelled reveal stops with a
/// prefix of `text`.
pub async fn reveal<F>(
    text: &str,
    token: &CancellationToken,
    pacing: RevealPacing,
    mut on_progress: F,
) -> RevealOutcome
where
    F: FnMut(char),
{
    let mut partial = String::with_capacity(text.len());
    for ch in text.chars() {
        if token.is_cancelled() {
            trace!("cancelled after {} bytes", partial.len());
            return RevealOutcome::Cancelled(partial);
        }
        partial.push(ch);
        on_progress(ch);

        let delay = pacing.delay_after(ch);
        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            sleep(delay).await;
        }
    }
    RevealOutcome::Completed(partial)
}
