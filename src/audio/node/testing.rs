//! Nodo de audio en memoria para los tests del motor.
//!
//! Se comporta como Lavalink en lo que importa al reproductor: `play` sobre
//! un track activo emite `TrackEnd(Replaced)`, `stop` emite
//! `TrackEnd(Stopped)` y `destroy` cierra la suscripción.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    time::Duration,
};
use tokio::sync::mpsc;

use super::{AudioNode, NodeEvent, TrackEndReason};
use crate::{audio::track::Track, error::MusicError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeCall {
    ConnectVoice(ChannelId),
    Play(String, Option<u64>),
    Stop,
    Pause(bool),
    Seek(u64),
    Volume(u8),
    Destroy,
}

#[derive(Default)]
pub struct ScriptedNode {
    subscribers: DashMap<GuildId, mpsc::UnboundedSender<NodeEvent>>,
    playing: DashMap<GuildId, String>,
    calls: Mutex<Vec<(GuildId, NodeCall)>>,
    catalog: Mutex<HashMap<String, Vec<Track>>>,
    unavailable: AtomicBool,
    connect_delay_ms: AtomicUsize,
    call_delay_ms: AtomicUsize,
    connects: AtomicUsize,
}

impl ScriptedNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_results(self, query: &str, tracks: Vec<Track>) -> Self {
        self.catalog.lock().insert(query.to_string(), tracks);
        self
    }

    pub fn with_connect_delay(self, delay: Duration) -> Self {
        self.connect_delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
        self
    }

    /// Latencia para el resto de comandos (no para `connect_voice`)
    pub fn with_call_delay(self, delay: Duration) -> Self {
        self.call_delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
        self
    }

    /// Hace que todos los comandos siguientes fallen
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn calls(&self, guild_id: GuildId) -> Vec<NodeCall> {
        self.calls
            .lock()
            .iter()
            .filter(|(guild, _)| *guild == guild_id)
            .map(|(_, call)| call.clone())
            .collect()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Emite un evento como si viniera del nodo
    pub fn emit(&self, guild_id: GuildId, event: NodeEvent) {
        if let Some(tx) = self.subscribers.get(&guild_id) {
            let _ = tx.send(event);
        }
    }

    /// Termina con normalidad el track que está sonando
    pub fn finish_current(&self, guild_id: GuildId) {
        if let Some((_, encoded)) = self.playing.remove(&guild_id) {
            self.emit(
                guild_id,
                NodeEvent::TrackEnd {
                    encoded,
                    reason: TrackEndReason::Finished,
                },
            );
        }
    }

    pub fn has_subscriber(&self, guild_id: GuildId) -> bool {
        self.subscribers.contains_key(&guild_id)
    }

    async fn respond_later(&self) {
        let delay = self.call_delay_ms.load(Ordering::SeqCst) as u64;
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }

    fn record(&self, guild_id: GuildId, call: NodeCall) -> Result<(), MusicError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(MusicError::NodeUnavailable("nodo de prueba caído".into()));
        }
        self.calls.lock().push((guild_id, call));
        Ok(())
    }
}

#[async_trait]
impl AudioNode for ScriptedNode {
    fn subscribe(&self, guild_id: GuildId) -> mpsc::UnboundedReceiver<NodeEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.insert(guild_id, tx);
        rx
    }

    async fn connect_voice(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        _self_deaf: bool,
    ) -> Result<(), MusicError> {
        let delay = self.connect_delay_ms.load(Ordering::SeqCst) as u64;
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.record(guild_id, NodeCall::ConnectVoice(channel_id))?;
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn play(
        &self,
        guild_id: GuildId,
        track: &Track,
        start_ms: Option<u64>,
    ) -> Result<(), MusicError> {
        self.respond_later().await;
        self.record(guild_id, NodeCall::Play(track.encoded().to_string(), start_ms))?;

        if let Some(previous) = self.playing.insert(guild_id, track.encoded().to_string()) {
            self.emit(
                guild_id,
                NodeEvent::TrackEnd {
                    encoded: previous,
                    reason: TrackEndReason::Replaced,
                },
            );
        }
        self.emit(
            guild_id,
            NodeEvent::TrackStart {
                encoded: track.encoded().to_string(),
            },
        );
        Ok(())
    }

    async fn stop(&self, guild_id: GuildId) -> Result<(), MusicError> {
        self.respond_later().await;
        self.record(guild_id, NodeCall::Stop)?;

        if let Some((_, encoded)) = self.playing.remove(&guild_id) {
            self.emit(
                guild_id,
                NodeEvent::TrackEnd {
                    encoded,
                    reason: TrackEndReason::Stopped,
                },
            );
        }
        Ok(())
    }

    async fn pause(&self, guild_id: GuildId, paused: bool) -> Result<(), MusicError> {
        self.respond_later().await;
        self.record(guild_id, NodeCall::Pause(paused))
    }

    async fn seek(&self, guild_id: GuildId, position_ms: u64) -> Result<(), MusicError> {
        self.respond_later().await;
        self.record(guild_id, NodeCall::Seek(position_ms))
    }

    async fn set_volume(&self, guild_id: GuildId, volume: u8) -> Result<(), MusicError> {
        self.respond_later().await;
        self.record(guild_id, NodeCall::Volume(volume))
    }

    async fn search(&self, query: &str, requester: UserId) -> Result<Vec<Track>, MusicError> {
        self.respond_later().await;
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(MusicError::NodeUnavailable("nodo de prueba caído".into()));
        }

        let results = self.catalog.lock().get(query).cloned().unwrap_or_default();
        Ok(results
            .into_iter()
            .map(|track| {
                let mut stamped = Track::new(track.encoded(), track.title(), requester);
                if let Some(uri) = track.uri() {
                    stamped = stamped.with_uri(uri);
                }
                match track.length_ms() {
                    Some(length) => stamped.with_length_ms(length),
                    None => stamped,
                }
            })
            .collect())
    }

    async fn destroy(&self, guild_id: GuildId) -> Result<(), MusicError> {
        self.respond_later().await;
        self.subscribers.remove(&guild_id);
        self.playing.remove(&guild_id);
        self.record(guild_id, NodeCall::Destroy)
    }
}
