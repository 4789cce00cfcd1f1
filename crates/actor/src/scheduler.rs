use std::sync::Weak;

use tokio::select;
use tokio::sync::{mpsc, watch};

use crate::mailbox::Mailbox;
use crate::{Actor, ActorState, Message};

pub async fn run_actor<S: ActorState>(
    mailbox: Weak<Mailbox<S>>,
    mut state: S,
    mut msg_rx: mpsc::UnboundedReceiver<Box<dyn Message<S>>>,
    mut kill_rx: watch::Receiver<bool>,
) {
    debug!("started");
    match mailbox.upgrade() {
        Some(mailbox) => state.started(&Actor::from_mailbox(mailbox)),
        None => {
            debug!("dropped before starting");
            return;
        }
    }

    loop {
        let msg = select! {
            biased;

            _ = kill_rx.changed() => {
                break;
            }
            msg = msg_rx.recv() => {
                let Some(msg) = msg else {
                    break;
                };
                msg
            }
        };
        trace!("received message: {msg:?}");

        let Some(mailbox) = mailbox.upgrade() else {
            warn!("last mailbox has been dropped, discard the message");
            break;
        };

        let proc_span = trace_span!("proc msg");
        proc_span.in_scope(|| {
            msg.handle(&mut state, &Actor::from_mailbox(mailbox));
            trace!("finished");
        });
    }

    state.stopped();
    debug!("will terminate");
}
