//! Slack integration - Events API bot interface
//!
//! This crate provides the Slack side of attendly:
//! - **Payloads** (`payload`) - Events API JSON and slash-command form decoding
//! - **Signatures** (`signature`) - `X-Slack-Signature` verification
//! - **Events** (`events`) - channel messages and `/query` routed to handlers
//! - **Commands** (`commands`) - `/query` normalization and the analytics seam
//! - **Block Kit** (`blocks`) - confirmations, rejections and leave reports
//! - **Web API** (`web`) - `chat.postMessage`, `chat.postEphemeral`, `users.info`, `auth.test`
//! - **Runner** (`runner`) - one worker per inbound envelope, bounded by a deadline
//!
//! # Architecture
//!
//! ```text
//! HTTP ingress → IngressSender → IngressRunner → EventDispatcher → Handlers
//!                                     ↓
//!                          SlackWebApi ← Reply (Block Kit)
//! ```

pub mod blocks;
pub mod commands;
pub mod events;
pub mod payload;
pub mod runner;
pub mod signature;
pub mod web;

pub use events::{
    Audience, ChannelMessageHandler, EventContext, EventDispatcher, HandlerResult,
    LeaveMessageService, MessageEvent, Reply, SlackEnvelope, SlackEvent, SlashCommandHandler,
};
pub use runner::{ingress_queue, EventTransport, IngressRunner, IngressSender};
pub use web::{SlackWebApi, SlackWebClient, TransportError};
