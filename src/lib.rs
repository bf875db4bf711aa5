//! Per-channel music playback sessions for Discord voice channels.
//!
//! - [`audio`]: track queue, playback session state machine and the
//!   per-guild session registry.
//! - [`sources`]: turns a user request (search text, page URL, catalog link
//!   or direct audio URL) into a playable track.
//! - [`bot`] and [`ui`]: the Discord slash-command surface.

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod sources;
pub mod ui;
