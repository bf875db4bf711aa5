//! # Audio Module
//!
//! Per-guild playback: one session per voice channel, each with its own queue
//! and playback loop.
//!
//! ## Architecture
//!
//! ### [`queue`] - Track Queue
//! - FIFO of pending tracks with a deadline-bounded blocking dequeue
//! - Arbitrary removal, shuffle and paging for display
//!
//! ### [`session`] - Playback Session
//! - Explicit state machine (`Idle → Waiting → Playing ⇄ Paused → Stopped`)
//! - Skip voting, loop mode and volume
//!
//! ### [`registry`] - Session Registry
//! - Guild → session map exposed to the command layer
//! - Creates sessions on demand and forgets them on idle timeout or stop
//!
//! ### [`transport`] / [`voice`] - Voice Transport
//! - Trait seam the session plays through
//! - Songbird implementation used by the bot

pub mod queue;
pub mod registry;
pub mod session;
pub mod track;
pub mod transport;
pub mod voice;

#[cfg(test)]
pub(crate) mod testing;

pub use queue::{QueuePage, TrackQueue};
pub use registry::SessionRegistry;
pub use session::{PlaybackSession, PlayerState, SessionEvent, SessionSettings, VoteOutcome};
pub use track::{Track, TrackSummary};
