//! Fan-out of tick results to push channel subscribers
//!
//! The broadcaster wraps a `tokio::sync::broadcast` channel. Every subscriber owns its own
//! receiver, so a slow subscriber only lags (and loses its oldest updates) without holding
//! up the publisher or any other subscriber.

pub mod session;

use tokio::sync::broadcast;
use tracing::trace;

use crate::TickResult;
use crate::protocol::Envelope;

pub use session::{SessionInput, SessionStats, run_session};

/// Updates buffered per subscriber before it starts lagging
pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<Envelope>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish one tick as an `energy_update` envelope
    ///
    /// Returns the number of subscribers the update was queued for.
    pub fn publish(&self, tick: TickResult) -> usize {
        self.publish_envelope(Envelope::energy_update(tick))
    }

    pub fn publish_envelope(&self, envelope: Envelope) -> usize {
        match self.tx.send(envelope) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!("no subscribers connected, update discarded");
                0
            }
        }
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
