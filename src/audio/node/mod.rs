//! # Audio Node
//!
//! Boundary between the playback engine and the external audio-rendering
//! node. The engine only issues logical commands through [`AudioNode`] and
//! reacts to the [`NodeEvent`]s delivered on a per-guild channel; decoding,
//! streaming and voice transport all happen on the node.
//!
//! [`lavalink::LavalinkNode`] is the production implementation (Lavalink v4
//! over REST + WebSocket).

pub mod lavalink;
pub mod protocol;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use serde::Deserialize;
use serenity::model::id::{ChannelId, GuildId, UserId};
use tokio::sync::mpsc;

use crate::{audio::track::Track, error::MusicError};

/// Motivo por el que el nodo terminó un track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackEndReason {
    Finished,
    LoadFailed,
    Stopped,
    Replaced,
    Cleanup,
}

impl TrackEndReason {
    /// `Replaced` y `Cleanup` los provoca el propio motor (al reproducir
    /// otro track o al destruir el reproductor) y no deben avanzar la cola.
    pub fn advances_queue(self) -> bool {
        matches!(self, Self::Finished | Self::LoadFailed | Self::Stopped)
    }
}

/// Eventos asíncronos que el nodo entrega para un servidor.
///
/// Los eventos de track llevan la referencia `encoded` del track al que se
/// refieren, para poder descartar los que llegan tarde.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    TrackStart {
        encoded: String,
    },
    TrackEnd {
        encoded: String,
        reason: TrackEndReason,
    },
    TrackException {
        encoded: String,
        message: String,
    },
    NodeDisconnect,
}

/// Capacidades del nodo de audio que consume el motor.
///
/// Todos los comandos pueden fallar con [`MusicError::NodeUnavailable`]; el
/// reproductor además los limita con su propio timeout.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioNode: Send + Sync {
    /// Abre el canal ordenado de eventos de un servidor. Una nueva
    /// suscripción reemplaza a la anterior.
    fn subscribe(&self, guild_id: GuildId) -> mpsc::UnboundedReceiver<NodeEvent>;

    async fn connect_voice(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        self_deaf: bool,
    ) -> Result<(), MusicError>;

    async fn play(
        &self,
        guild_id: GuildId,
        track: &Track,
        start_ms: Option<u64>,
    ) -> Result<(), MusicError>;

    async fn stop(&self, guild_id: GuildId) -> Result<(), MusicError>;

    async fn pause(&self, guild_id: GuildId, paused: bool) -> Result<(), MusicError>;

    async fn seek(&self, guild_id: GuildId, position_ms: u64) -> Result<(), MusicError>;

    async fn set_volume(&self, guild_id: GuildId, volume: u8) -> Result<(), MusicError>;

    async fn search(&self, query: &str, requester: UserId) -> Result<Vec<Track>, MusicError>;

    /// Libera la sesión de voz y el reproductor remoto, y cierra la
    /// suscripción de eventos del servidor.
    async fn destroy(&self, guild_id: GuildId) -> Result<(), MusicError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_reason_policy() {
        assert!(TrackEndReason::Finished.advances_queue());
        assert!(TrackEndReason::Stopped.advances_queue());
        assert!(TrackEndReason::LoadFailed.advances_queue());
        assert!(!TrackEndReason::Replaced.advances_queue());
        assert!(!TrackEndReason::Cleanup.advances_queue());
    }

    #[test]
    fn test_end_reason_wire_names() {
        let reason: TrackEndReason = serde_json::from_str("\"loadFailed\"").unwrap();
        assert_eq!(reason, TrackEndReason::LoadFailed);
    }
}
