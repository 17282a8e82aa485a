//! HTTP request handlers for the relay's REST surface.

pub mod analyze;
pub mod audio;
pub mod config;
pub mod preview;
