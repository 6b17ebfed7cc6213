//! # Audio Module
//!
//! Per-guild music playback engine for Resonance.
//!
//! The engine never touches audio samples. Decoding, streaming and voice
//! transport live on an external audio node (Lavalink); this module keeps
//! the playback state for each guild and drives the node with logical
//! commands.
//!
//! ## Architecture
//!
//! ### [`registry`] - Player Registry
//! - One [`player::GuildPlayer`] per guild, created on first join/play
//! - Concurrent creations for the same guild share a single instance
//!
//! ### [`player`] - Guild Player
//! - Idle / Playing / Paused / Destroyed state machine
//! - Commands and node events serialize on one lock per guild
//! - Loop policy (off, track, queue) applied when a track ends
//!
//! ### [`queue`] - Queue Management
//! - Ordered items plus a separate `current` track
//! - Shuffle, dedup, move, removal by requester, pagination
//!
//! ### [`voice`] - Voice Checks
//! - Channel membership rules for channel-sensitive commands
//!
//! ### [`node`] - Audio Node
//! - [`node::AudioNode`] trait consumed by the player
//! - [`node::lavalink::LavalinkNode`] implementation (REST + WebSocket)
//!
//! ## Example Usage
//!
//! ```text
//! use crate::audio::{
//!     player::{EngineSettings, PlayRequest, PlayerOptions},
//!     registry::PlayerRegistry,
//! };
//! use serenity::all::{ChannelId, GuildId, UserId};
//!
//! let registry = PlayerRegistry::new(node, EngineSettings::default());
//! let options = PlayerOptions {
//!     text_channel_id: ChannelId::new(1),
//!     voice_channel_id: ChannelId::new(2),
//!     volume: 50,
//!     self_deaf: true,
//! };
//!
//! let player = registry.get_or_create(GuildId::new(3), options).await?;
//! player
//!     .play(PlayRequest::Query {
//!         query: "never gonna give you up".into(),
//!         requester: UserId::new(4),
//!     })
//!     .await?;
//! player.skip().await?;
//! ```

pub mod node;
pub mod player;
pub mod queue;
pub mod registry;
pub mod track;
pub mod voice;
