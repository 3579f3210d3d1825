//! Fishing bite detector: watches a screen region and/or the audio input for
//! the bobber splash, then reels in and recasts.

pub mod audio;
pub mod baseline;
pub mod blob;
pub mod capture;
pub mod clock;
pub mod config;
pub mod gate;
pub mod hotkey;
pub mod input;
pub mod logging;
pub mod mask;
pub mod overlay;
pub mod session;
