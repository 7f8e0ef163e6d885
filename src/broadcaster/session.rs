//! One subscriber's side of the push channel
//!
//! The driver is transport agnostic: the axum websocket handler adapts its socket into a
//! `Sink<String>` plus a stream of [`SessionInput`], and tests drive it with plain channels.

use std::fmt::Display;

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, trace, warn};

use crate::protocol::{Envelope, Inbound, route_inbound};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionInput {
    Text(String),
    Close,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub updates_sent: u64,
    pub pongs_sent: u64,
    pub updates_dropped: u64,
}

async fn send_envelope<S>(sink: &mut S, envelope: &Envelope) -> bool
where
    S: Sink<String> + Unpin,
    S::Error: Display,
{
    let text = match envelope.to_text() {
        Ok(text) => text,
        Err(e) => {
            warn!("skipping envelope: {}", e);
            return true;
        }
    };

    match sink.send(text).await {
        Ok(()) => true,
        Err(e) => {
            debug!("send failed, subscriber gone: {}", e);
            false
        }
    }
}

/// Drive one subscriber until it disconnects or the broadcaster goes away
///
/// Inbound frames are always handled before queued updates, so a pong goes out ahead of
/// anything already buffered for this subscriber.
pub async fn run_session<S, R>(
    mut sink: S,
    mut inbound: R,
    mut updates: broadcast::Receiver<Envelope>,
) -> SessionStats
where
    S: Sink<String> + Unpin,
    S::Error: Display,
    R: Stream<Item = SessionInput> + Unpin,
{
    let mut stats = SessionStats::default();

    loop {
        tokio::select! {
            biased;

            input = inbound.next() => match input {
                Some(SessionInput::Text(text)) => match route_inbound(&text) {
                    Some(Inbound::Reply(pong)) => {
                        if !send_envelope(&mut sink, &pong).await {
                            break;
                        }
                        stats.pongs_sent += 1;
                    }
                    Some(Inbound::Forward(envelope)) => {
                        trace!("ignoring '{}' from subscriber", envelope.kind());
                    }
                    None => {}
                },
                Some(SessionInput::Close) | None => {
                    debug!("subscriber closed the push channel");
                    break;
                }
            },

            update = updates.recv() => match update {
                Ok(envelope) => {
                    if !send_envelope(&mut sink, &envelope).await {
                        break;
                    }
                    stats.updates_sent += 1;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("subscriber lagging, dropped {} updates", skipped);
                    stats.updates_dropped += skipped;
                }
                Err(RecvError::Closed) => {
                    debug!("broadcaster shut down");
                    break;
                }
            },
        }
    }

    stats
}
