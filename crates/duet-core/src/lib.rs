//! # duet-core
//!
//! Foundation types for the duet matchmaking and signaling server.
//!
//! This crate provides the shared vocabulary the other duet crates depend on:
//!
//! - **Branded IDs**: `UserId`, `ConnId`, `RoomId`, `MessageId` as newtypes
//!   for type safety
//! - **Wire protocol**: `ClientMessage` / `ServerMessage` tagged unions
//!   carried as JSON text frames over the WebSocket
//! - **Payloads**: `ChatMessage` (canonical chat envelope) and
//!   `PublicProfile` (the minimal partner profile disclosed on match)

#![deny(unsafe_code)]

pub mod ids;
pub mod protocol;

pub use ids::{ConnId, MessageId, RoomId, UserId};
pub use protocol::{ChatMessage, ClientMessage, PublicProfile, ServerMessage};
