//! Audio domain - messages for the external audio controller

pub mod event;

pub use event::AudioEvent;
