use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::{mpsc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        node::{AudioNode, NodeEvent, TrackEndReason},
        queue::{LoopMode, MusicQueue, QueueInfo},
        registry::RegistryLink,
        track::Track,
    },
    error::MusicError,
};

/// Estado observable de un reproductor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStatus {
    /// Nada sonando; la cola puede tener elementos
    Idle,
    Playing,
    Paused,
    /// Terminal: el reproductor ya no acepta operaciones
    Destroyed,
}

/// Parámetros con los que el comando crea el reproductor de un servidor.
#[derive(Debug, Clone)]
pub struct PlayerOptions {
    pub text_channel_id: ChannelId,
    pub voice_channel_id: ChannelId,
    pub volume: u8,
    pub self_deaf: bool,
}

/// Límites comunes a todos los reproductores del proceso.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub node_timeout: Duration,
    pub max_queue_size: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            node_timeout: Duration::from_secs(10),
            max_queue_size: 1000,
        }
    }
}

#[derive(Debug, Clone)]
pub enum PlayRequest {
    Track(Track),
    /// Texto de búsqueda o URL; las URLs pueden resolver a una playlist
    Query { query: String, requester: UserId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayOutcome {
    Started(Track),
    Queued { track: Track, position: usize },
    Playlist { first: Track, added: usize, started: bool },
}

/// Copia de solo lectura del estado de un reproductor.
#[derive(Debug, Clone)]
pub struct PlayerSnapshot {
    pub guild_id: GuildId,
    pub status: PlayerStatus,
    pub text_channel_id: ChannelId,
    pub voice_channel_id: ChannelId,
    pub volume: u8,
    pub loop_mode: LoopMode,
    pub queue: QueueInfo,
    pub last_track: Option<Track>,
}

impl PlayerSnapshot {
    pub fn current(&self) -> Option<&Track> {
        self.queue.current.as_ref()
    }

    pub fn is_paused(&self) -> bool {
        self.status == PlayerStatus::Paused
    }
}

struct PlayerState {
    text_channel_id: ChannelId,
    voice_channel_id: ChannelId,
    volume: u8,
    self_deaf: bool,
    status: PlayerStatus,
    loop_mode: LoopMode,
    queue: MusicQueue,
    last_track: Option<Track>,
    /// Track cuya excepción ya se procesó; su `TrackEnd(LoadFailed)` se ignora
    failed_track: Option<String>,
}

impl PlayerState {
    fn is_current(&self, encoded: &str) -> bool {
        self.queue
            .current()
            .is_some_and(|track| track.encoded() == encoded)
    }
}

/// Reproductor de un servidor.
///
/// Todas las operaciones de comandos y todos los eventos del nodo toman el
/// mismo `Mutex`, así que para un servidor se ejecutan de uno en uno. Los
/// eventos llegan por un canal ordenado que consume una única tarea.
pub struct GuildPlayer {
    guild_id: GuildId,
    node: Arc<dyn AudioNode>,
    state: Mutex<PlayerState>,
    settings: EngineSettings,
    destroyed: AtomicBool,
    /// Detiene la tarea de eventos
    shutdown: CancellationToken,
    /// Se cancela cuando `destroy` terminó de liberar todo
    closed: CancellationToken,
    link: RegistryLink,
}

impl GuildPlayer {
    /// Crea el reproductor y abre la sesión de voz en el nodo.
    pub async fn create(
        node: Arc<dyn AudioNode>,
        guild_id: GuildId,
        options: PlayerOptions,
        settings: EngineSettings,
        link: RegistryLink,
    ) -> Result<Arc<Self>, MusicError> {
        if options.volume > 100 {
            return Err(MusicError::OutOfRange {
                value: options.volume.into(),
                limit: 100,
            });
        }

        let events = node.subscribe(guild_id);
        let player = Arc::new(Self {
            guild_id,
            node,
            state: Mutex::new(PlayerState {
                text_channel_id: options.text_channel_id,
                voice_channel_id: options.voice_channel_id,
                volume: options.volume,
                self_deaf: options.self_deaf,
                status: PlayerStatus::Idle,
                loop_mode: LoopMode::Off,
                queue: MusicQueue::new(),
                last_track: None,
                failed_track: None,
            }),
            settings,
            destroyed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            closed: CancellationToken::new(),
            link,
        });

        if let Err(e) = player
            .node_call(player.node.connect_voice(
                guild_id,
                options.voice_channel_id,
                options.self_deaf,
            ))
            .await
        {
            warn!("⚠️ No se pudo abrir la sesión de voz en guild {}: {}", guild_id, e);
            player.release_session().await;
            return Err(e);
        }

        if let Err(e) = player
            .node_call(player.node.set_volume(guild_id, options.volume))
            .await
        {
            warn!("⚠️ No se pudo configurar el volumen inicial en guild {}: {}", guild_id, e);
            player.release_session().await;
            return Err(e);
        }

        Self::spawn_event_loop(&player, events);
        info!(
            "🔗 Reproductor creado en guild {} (canal {})",
            guild_id, options.voice_channel_id
        );
        Ok(player)
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Espera a que `destroy` haya liberado la sesión en el nodo.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    /// Reproduce un track o el resultado de una búsqueda; si ya hay algo
    /// sonando lo agrega a la cola.
    pub async fn play(&self, request: PlayRequest) -> Result<PlayOutcome, MusicError> {
        let mut state = self.lock_alive().await?;

        let tracks = match request {
            PlayRequest::Track(track) => vec![track],
            PlayRequest::Query { query, requester } => {
                let results = self
                    .node_call(self.node.search(&query, requester))
                    .await?;
                self.ensure_alive()?;

                if results.is_empty() {
                    info!("🔍 Sin resultados para '{}' en guild {}", query, self.guild_id);
                    return Err(MusicError::NoResults(query));
                }

                if is_url(&query) {
                    results
                } else {
                    results.into_iter().take(1).collect()
                }
            }
        };

        self.enqueue(&mut state, tracks).await
    }

    /// Detiene el track actual; el `TrackEnd` que emite el nodo avanza la cola.
    pub async fn skip(&self) -> Result<Track, MusicError> {
        let state = self.lock_alive().await?;
        let current = state
            .queue
            .current()
            .cloned()
            .ok_or(MusicError::NothingPlaying)?;

        self.node_call(self.node.stop(self.guild_id)).await?;
        self.ensure_alive()?;

        info!("⏭️ Saltando en guild {}: {}", self.guild_id, current.title());
        Ok(current)
    }

    pub async fn pause(&self, paused: bool) -> Result<(), MusicError> {
        let mut state = self.lock_alive().await?;

        match (paused, state.status) {
            (true, PlayerStatus::Paused) => return Err(MusicError::AlreadyPaused),
            (false, PlayerStatus::Playing) => return Err(MusicError::NotPaused),
            (_, PlayerStatus::Idle) => return Err(MusicError::NothingPlaying),
            (_, PlayerStatus::Destroyed) => return Err(MusicError::PlayerDestroyed),
            _ => {}
        }

        self.node_call(self.node.pause(self.guild_id, paused)).await?;
        self.ensure_alive()?;

        if paused {
            state.status = PlayerStatus::Paused;
            info!("⏸️ Reproducción pausada en guild {}", self.guild_id);
        } else {
            state.status = PlayerStatus::Playing;
            info!("▶️ Reproducción reanudada en guild {}", self.guild_id);
        }
        Ok(())
    }

    pub async fn seek(&self, position_ms: u64) -> Result<(), MusicError> {
        let state = self.lock_alive().await?;
        let current = state.queue.current().ok_or(MusicError::NothingPlaying)?;

        let limit = match current.length_ms() {
            Some(length) if current.is_seekable() => length,
            _ => 0,
        };
        if !current.is_seekable() || position_ms > limit {
            return Err(MusicError::OutOfRange {
                value: position_ms,
                limit,
            });
        }

        self.node_call(self.node.seek(self.guild_id, position_ms))
            .await?;
        self.ensure_alive()?;

        debug!("⏩ Posición {}ms en guild {}", position_ms, self.guild_id);
        Ok(())
    }

    pub async fn set_volume(&self, volume: u8) -> Result<(), MusicError> {
        if volume > 100 {
            return Err(MusicError::OutOfRange {
                value: volume.into(),
                limit: 100,
            });
        }

        let mut state = self.lock_alive().await?;
        self.node_call(self.node.set_volume(self.guild_id, volume))
            .await?;
        self.ensure_alive()?;

        state.volume = volume;
        info!("🔊 Volumen ajustado a {}% en guild {}", volume, self.guild_id);
        Ok(())
    }

    /// Mueve la sesión de voz a otro canal.
    pub async fn set_voice_channel(&self, channel_id: ChannelId) -> Result<(), MusicError> {
        let mut state = self.lock_alive().await?;
        let self_deaf = state.self_deaf;

        self.node_call(self.node.connect_voice(self.guild_id, channel_id, self_deaf))
            .await?;
        self.ensure_alive()?;

        state.voice_channel_id = channel_id;
        info!("🔀 Guild {} movido al canal {}", self.guild_id, channel_id);
        Ok(())
    }

    pub async fn set_text_channel(&self, channel_id: ChannelId) -> Result<(), MusicError> {
        let mut state = self.lock_alive().await?;
        state.text_channel_id = channel_id;
        Ok(())
    }

    pub async fn set_loop(&self, mode: LoopMode) -> Result<(), MusicError> {
        let mut state = self.lock_alive().await?;
        state.loop_mode = mode;
        match mode {
            LoopMode::Off => info!("➡️ Repetición desactivada en guild {}", self.guild_id),
            LoopMode::Track => info!("🔂 Repetir canción activado en guild {}", self.guild_id),
            LoopMode::Queue => info!("🔁 Repetir cola activado en guild {}", self.guild_id),
        }
        Ok(())
    }

    /// Vacía la cola y corta el track actual sin avanzar, sea cual sea el
    /// modo de repetición. Devuelve cuántos tracks se quitaron de la cola.
    pub async fn stop(&self) -> Result<usize, MusicError> {
        let mut state = self.lock_alive().await?;

        if state.queue.current().is_some() {
            self.node_call(self.node.stop(self.guild_id)).await?;
            self.ensure_alive()?;
        }

        // El TrackEnd(Stopped) que llega después ya no coincide con `current`
        let cleared = state.queue.clear();
        if let Some(stopped) = state.queue.take_current() {
            state.last_track = Some(stopped);
        }
        state.status = PlayerStatus::Idle;

        info!("⏹️ Reproducción detenida en guild {}", self.guild_id);
        Ok(cleared)
    }

    /// Vuelve a reproducir el track anterior; el actual queda primero en la cola.
    pub async fn previous(&self) -> Result<Track, MusicError> {
        let mut state = self.lock_alive().await?;
        let previous = state
            .last_track
            .clone()
            .ok_or(MusicError::NoPreviousTrack)?;

        self.node_call(self.node.play(self.guild_id, &previous, None))
            .await?;
        self.ensure_alive()?;

        if let Some(interrupted) = state.queue.take_current() {
            state.queue.unshift(interrupted);
        }
        state.queue.unshift(previous.clone());
        state.queue.advance(LoopMode::Off);
        state.last_track = None;
        state.status = PlayerStatus::Playing;

        info!("⏮️ Volviendo a '{}' en guild {}", previous.title(), self.guild_id);
        Ok(previous)
    }

    pub async fn insert_at(&self, index: usize, track: Track) -> Result<(), MusicError> {
        let mut state = self.lock_alive().await?;
        if state.queue.len() >= self.settings.max_queue_size {
            return Err(MusicError::QueueFull(self.settings.max_queue_size));
        }
        state.queue.insert_at(index, track)
    }

    pub async fn remove_at(&self, index: usize) -> Result<Track, MusicError> {
        self.lock_alive().await?.queue.remove_at(index)
    }

    pub async fn move_track(&self, from: usize, to: usize) -> Result<(), MusicError> {
        self.lock_alive().await?.queue.move_track(from, to)
    }

    pub async fn clear_queue(&self) -> Result<usize, MusicError> {
        Ok(self.lock_alive().await?.queue.clear())
    }

    pub async fn shuffle(&self) -> Result<usize, MusicError> {
        let mut state = self.lock_alive().await?;
        state.queue.shuffle();
        Ok(state.queue.len())
    }

    pub async fn dedup(&self) -> Result<usize, MusicError> {
        Ok(self.lock_alive().await?.queue.dedup())
    }

    pub async fn remove_by_requester(&self, user_id: UserId) -> Result<usize, MusicError> {
        Ok(self.lock_alive().await?.queue.remove_by_requester(user_id))
    }

    pub async fn voice_channel_id(&self) -> ChannelId {
        self.state.lock().await.voice_channel_id
    }

    /// Obtiene el estado actual (también después de destruido)
    pub async fn snapshot(&self) -> PlayerSnapshot {
        let state = self.state.lock().await;
        PlayerSnapshot {
            guild_id: self.guild_id,
            status: state.status,
            text_channel_id: state.text_channel_id,
            voice_channel_id: state.voice_channel_id,
            volume: state.volume,
            loop_mode: state.loop_mode,
            queue: state.queue.info(state.loop_mode),
            last_track: state.last_track.clone(),
        }
    }

    /// Libera la sesión en el nodo, vacía la cola y quita el reproductor del
    /// registro. Es idempotente y se puede llamar con otra operación en curso:
    /// esa operación descartará la respuesta del nodo.
    pub async fn destroy(&self) -> Result<(), MusicError> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shutdown.cancel();

        {
            let mut state = self.state.lock().await;
            let dropped = state.queue.reset();
            state.last_track = None;
            state.status = PlayerStatus::Destroyed;
            debug!("🗑️ {} tracks descartados en guild {}", dropped, self.guild_id);
        }

        let result = self.node_call(self.node.destroy(self.guild_id)).await;
        if let Err(e) = &result {
            warn!("⚠️ Error liberando la sesión de guild {}: {}", self.guild_id, e);
        }

        self.link.detach(self.guild_id, self);
        self.closed.cancel();
        info!("⏹️ Reproductor destruido en guild {}", self.guild_id);
        result
    }

    // Funciones privadas

    /// Libera lo que `create` alcanzó a abrir en el nodo
    async fn release_session(&self) {
        if let Err(e) = self.node_call(self.node.destroy(self.guild_id)).await {
            debug!("Error liberando la sesión de voz de guild {}: {}", self.guild_id, e);
        }
    }

    fn ensure_alive(&self) -> Result<(), MusicError> {
        if self.is_destroyed() {
            Err(MusicError::PlayerDestroyed)
        } else {
            Ok(())
        }
    }

    async fn lock_alive(&self) -> Result<MutexGuard<'_, PlayerState>, MusicError> {
        self.ensure_alive()?;
        let state = self.state.lock().await;
        self.ensure_alive()?;
        Ok(state)
    }

    /// Todo comando al nodo tiene un límite de tiempo
    async fn node_call<T, F>(&self, operation: F) -> Result<T, MusicError>
    where
        F: Future<Output = Result<T, MusicError>>,
    {
        match tokio::time::timeout(self.settings.node_timeout, operation).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "⏰ El nodo no respondió en {:?} (guild {})",
                    self.settings.node_timeout, self.guild_id
                );
                Err(MusicError::NodeUnavailable(format!(
                    "sin respuesta en {:?}",
                    self.settings.node_timeout
                )))
            }
        }
    }

    async fn enqueue(
        &self,
        state: &mut PlayerState,
        tracks: Vec<Track>,
    ) -> Result<PlayOutcome, MusicError> {
        let total = tracks.len();
        let mut tracks = tracks.into_iter();
        let Some(first) = tracks.next() else {
            return Err(MusicError::NoResults(String::new()));
        };

        let max = self.settings.max_queue_size;
        let started = if state.queue.current().is_none() {
            self.start_track(state, first.clone()).await?;
            true
        } else {
            if state.queue.len() >= max {
                return Err(MusicError::QueueFull(max));
            }
            state.queue.add(first.clone());
            false
        };

        let mut added = 1;
        for track in tracks {
            if state.queue.len() >= max {
                warn!(
                    "⚠️ Cola llena en guild {}, {} canciones descartadas",
                    self.guild_id,
                    total - added
                );
                break;
            }
            state.queue.add(track);
            added += 1;
        }

        Ok(match (total, started) {
            (1, true) => PlayOutcome::Started(first),
            (1, false) => PlayOutcome::Queued {
                track: first,
                position: state.queue.len(),
            },
            _ => PlayOutcome::Playlist {
                first,
                added,
                started,
            },
        })
    }

    /// Requiere que no haya track actual
    async fn start_track(&self, state: &mut PlayerState, track: Track) -> Result<(), MusicError> {
        self.node_call(self.node.play(self.guild_id, &track, None))
            .await?;
        self.ensure_alive()?;

        info!("🎵 Reproduciendo en guild {}: {}", self.guild_id, track.title());
        state.queue.unshift(track);
        state.queue.advance(LoopMode::Off);
        state.status = PlayerStatus::Playing;
        Ok(())
    }

    fn spawn_event_loop(player: &Arc<Self>, mut events: mpsc::UnboundedReceiver<NodeEvent>) {
        let weak = Arc::downgrade(player);
        let shutdown = player.shutdown.clone();
        let guild_id = player.guild_id;

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };

                let Some(player) = weak.upgrade() else {
                    break;
                };
                player.handle_event(event).await;
            }
            debug!("Tarea de eventos terminada para guild {}", guild_id);
        });
    }

    async fn handle_event(&self, event: NodeEvent) {
        match event {
            NodeEvent::NodeDisconnect => {
                warn!("🔌 Nodo desconectado, destruyendo reproductor de guild {}", self.guild_id);
                if let Err(e) = self.destroy().await {
                    debug!("Destroy tras desconexión en guild {}: {}", self.guild_id, e);
                }
            }
            NodeEvent::TrackStart { encoded } => {
                let mut state = self.state.lock().await;
                if !state.is_current(&encoded) {
                    debug!("Evento TrackStart obsoleto en guild {}", self.guild_id);
                    return;
                }
                if state.failed_track.as_deref() != Some(encoded.as_str()) {
                    state.failed_track = None;
                }
                debug!("▶️ El nodo inició el track actual en guild {}", self.guild_id);
            }
            NodeEvent::TrackEnd { encoded, reason } => {
                if !reason.advances_queue() {
                    debug!("TrackEnd ({:?}) ignorado en guild {}", reason, self.guild_id);
                    return;
                }

                let mut state = self.state.lock().await;
                if self.is_destroyed() {
                    return;
                }
                if reason == TrackEndReason::LoadFailed
                    && state.failed_track.as_deref() == Some(encoded.as_str())
                {
                    state.failed_track = None;
                    debug!("Fin de track fallido ya procesado en guild {}", self.guild_id);
                    return;
                }
                if !state.is_current(&encoded) {
                    debug!("Evento TrackEnd obsoleto en guild {}", self.guild_id);
                    return;
                }

                self.advance(&mut state, reason).await;
            }
            NodeEvent::TrackException { encoded, message } => {
                let mut state = self.state.lock().await;
                if self.is_destroyed() {
                    return;
                }
                if !state.is_current(&encoded) {
                    debug!("Excepción de un track obsoleto en guild {}: {}", self.guild_id, message);
                    return;
                }

                error!("❌ Error en track para guild {}: {}", self.guild_id, message);
                state.failed_track = Some(encoded);
                self.advance(&mut state, TrackEndReason::LoadFailed).await;
            }
        }
    }

    /// Aplica la política de loop al terminar el track actual.
    async fn advance(&self, state: &mut PlayerState, reason: TrackEndReason) {
        // Saltar o fallar sale del loop de canción; un track roto no se
        // vuelve a poner en la cola
        let mode = match (state.loop_mode, reason) {
            (LoopMode::Track, TrackEndReason::Finished) => LoopMode::Track,
            (LoopMode::Track, _) => LoopMode::Off,
            (LoopMode::Queue, TrackEndReason::LoadFailed) => LoopMode::Off,
            (mode, _) => mode,
        };

        if mode != LoopMode::Track {
            state.last_track = state.queue.current().cloned();
        }

        let Some(next) = state.queue.advance(mode) else {
            state.status = PlayerStatus::Idle;
            info!("📭 Cola terminada en guild {}", self.guild_id);
            return;
        };

        match self
            .node_call(self.node.play(self.guild_id, &next, None))
            .await
        {
            Ok(()) if self.is_destroyed() => {}
            Ok(()) => {
                state.status = PlayerStatus::Playing;
                info!("🎵 Reproduciendo en guild {}: {}", self.guild_id, next.title());
            }
            Err(e) => {
                error!(
                    "❌ Error al reproducir siguiente track en guild {}: {}",
                    self.guild_id, e
                );
                if let Some(track) = state.queue.take_current() {
                    state.queue.unshift(track);
                }
                state.status = PlayerStatus::Idle;
            }
        }
    }
}

fn is_url(query: &str) -> bool {
    query.starts_with("http://") || query.starts_with("https://")
}
