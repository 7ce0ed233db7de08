//! Watchforge - watch-folder DNxHR transcoding service
//!
//! This library crate exposes the engine for the binary and for integration
//! testing.

pub mod config;
pub mod context;
pub mod conversion;
pub mod error;
pub mod notifications;
pub mod probe;
pub mod scanner;
pub mod server;
pub mod state;
pub mod watch;
