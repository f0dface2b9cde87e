//! Shared wire definitions for `ChatVault` envelopes and messages.

pub mod codec;
pub mod envelope;
pub mod message;
