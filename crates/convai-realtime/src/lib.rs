//! WebSocket client for the conversational voice agent service.

pub mod client;
pub mod protocol;

pub use client::{WsVoiceConnector, WsVoiceSession};
