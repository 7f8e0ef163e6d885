//! Actor-based sampling loop
//!
//! The monitor actor runs as an independent tokio task and is controlled through a
//! cloneable [`monitor::MonitorHandle`].
//!
//! ## Message Flow
//!
//! ```text
//! Ticker → Sampler → AlertEngine → Storage (best effort) → Broadcaster → subscribers
//!    ↑
//!    └─── Commands (Start, Stop, TickNow, UpdatePeriod, GetStats) + CancellationToken
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: mpsc command channel for control messages
//! 2. **Events**: tick results are fanned out through the [`Broadcaster`](crate::broadcaster::Broadcaster)
//! 3. **Request/Response**: oneshot channels for queries

pub mod messages;
pub mod monitor;

pub use messages::{MonitorCommand, MonitorStats};
pub use monitor::{MonitorHandle, persist_tick};
