//! `ChatVault` — session encryption for case chat messages.
//!
//! Seals chat messages with AES-256-GCM under per-session keys and manages
//! those keys across restarts.

pub mod config;
pub mod crypto;
pub mod session;
pub mod store;
