use anyhow::Context as _;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use parking_lot::RwLock;
use reqwest::header::AUTHORIZATION;
use serde_json::json;
use serenity::model::id::{ChannelId, GuildId, UserId};
use songbird::{error::JoinError, Songbird};
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{client::IntoClientRequest, http::HeaderValue, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    protocol::{parse_guild_id, IncomingMessage, LoadResult, RestError},
    AudioNode, NodeEvent,
};
use crate::{audio::track::Track, error::MusicError};

const CLIENT_NAME: &str = concat!("resonance/", env!("CARGO_PKG_VERSION"));
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Conexión con un servidor Lavalink
#[derive(Debug, Clone)]
pub struct LavalinkSettings {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub secure: bool,
    pub search_prefix: String,
    pub request_timeout: Duration,
}

impl LavalinkSettings {
    pub fn rest_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    pub fn websocket_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}:{}/v4/websocket", scheme, self.host, self.port)
    }
}

/// Nodo Lavalink v4.
///
/// Los comandos van por REST; los eventos llegan por un único WebSocket y
/// se reparten en orden a la suscripción de cada servidor. El handshake de
/// voz lo hace la mitad gateway de songbird: el bot nunca toca audio, solo
/// reenvía `{token, endpoint, sessionId}` al nodo.
pub struct LavalinkNode {
    http: reqwest::Client,
    settings: LavalinkSettings,
    user_id: UserId,
    songbird: Arc<Songbird>,
    session_id: RwLock<Option<String>>,
    subscribers: DashMap<GuildId, mpsc::UnboundedSender<NodeEvent>>,
    shutdown: CancellationToken,
}

impl LavalinkNode {
    /// Crea el cliente y lanza la tarea del WebSocket, que se reconecta sola.
    pub fn connect(
        settings: LavalinkSettings,
        user_id: UserId,
        songbird: Arc<Songbird>,
    ) -> anyhow::Result<Arc<Self>> {
        let node = Arc::new(Self::new(settings, user_id, songbird)?);

        info!("🎼 Conectando a Lavalink en {}", node.settings.websocket_url());
        tokio::spawn(node.clone().run_socket());
        Ok(node)
    }

    fn new(
        settings: LavalinkSettings,
        user_id: UserId,
        songbird: Arc<Songbird>,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .user_agent(CLIENT_NAME)
            .build()
            .context("Error al construir cliente HTTP para Lavalink")?;

        Ok(Self {
            http,
            settings,
            user_id,
            songbird,
            session_id: RwLock::new(None),
            subscribers: DashMap::new(),
            shutdown: CancellationToken::new(),
        })
    }

    /// `GET /version`; lo usa `--health-check`
    pub async fn probe(settings: &LavalinkSettings) -> anyhow::Result<String> {
        let response = reqwest::Client::new()
            .get(format!("{}/version", settings.rest_url()))
            .header(AUTHORIZATION, &settings.password)
            .timeout(settings.request_timeout)
            .send()
            .await
            .context("Lavalink no responde")?
            .error_for_status()?;

        Ok(response.text().await?)
    }

    pub fn is_ready(&self) -> bool {
        self.session_id.read().is_some()
    }

    /// Detiene la tarea del WebSocket
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    async fn run_socket(self: Arc<Self>) {
        let mut attempt: u32 = 0;

        loop {
            let outcome = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                outcome = self.run_session() => outcome,
            };

            // Una sesión que llegó a `ready` reinicia el backoff
            if self.session_id.write().take().is_some() {
                attempt = 0;
            }
            self.disconnect_all();

            match outcome {
                Ok(()) => warn!("🔌 WebSocket de Lavalink cerrado"),
                Err(e) => error!("❌ Error en WebSocket de Lavalink: {:#}", e),
            }

            attempt = attempt.saturating_add(1);
            let delay = backoff_delay(attempt);
            info!("🔄 Reconectando a Lavalink en {:?} (intento {})", delay, attempt);

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.disconnect_all();
        debug!("Tarea del WebSocket de Lavalink terminada");
    }

    async fn run_session(&self) -> anyhow::Result<()> {
        let mut request = self
            .settings
            .websocket_url()
            .into_client_request()
            .context("URL de WebSocket inválida")?;
        let headers = request.headers_mut();
        headers.insert("authorization", HeaderValue::from_str(&self.settings.password)?);
        headers.insert("user-id", HeaderValue::from_str(&self.user_id.to_string())?);
        headers.insert("client-name", HeaderValue::from_static(CLIENT_NAME));

        let (mut stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .context("No se pudo conectar al WebSocket de Lavalink")?;
        info!("✅ WebSocket de Lavalink conectado");

        while let Some(message) = stream.next().await {
            match message? {
                Message::Text(text) => self.handle_message(&text),
                Message::Close(frame) => {
                    debug!("Lavalink cerró el WebSocket: {:?}", frame);
                    break;
                }
                _ => {}
            }
        }

        Ok(())
    }

    fn handle_message(&self, raw: &str) {
        let message: IncomingMessage = match serde_json::from_str(raw) {
            Ok(message) => message,
            Err(e) => {
                warn!("⚠️ Mensaje de Lavalink no reconocido: {} - {}", e, raw);
                return;
            }
        };

        match message {
            IncomingMessage::Ready(ready) => {
                info!(
                    "🎼 Sesión de Lavalink lista: {} (resumida: {})",
                    ready.session_id, ready.resumed
                );
                *self.session_id.write() = Some(ready.session_id);
            }
            IncomingMessage::PlayerUpdate(update) => {
                if !update.state.connected {
                    debug!("Reproductor de guild {} sin conexión de voz", update.guild_id);
                }
            }
            IncomingMessage::Stats(stats) => {
                debug!(
                    "📊 Lavalink: {} reproductores, {} activos, uptime {}s",
                    stats.players,
                    stats.playing_players,
                    stats.uptime / 1000
                );
            }
            IncomingMessage::Event(event) => {
                let Some((raw_guild, event)) = event.into_node_event() else {
                    return;
                };
                match parse_guild_id(&raw_guild) {
                    Some(guild_id) => self.dispatch(guild_id, event),
                    None => warn!("⚠️ Evento con guild inválido: {}", raw_guild),
                }
            }
            IncomingMessage::Unknown => debug!("Operación de Lavalink ignorada"),
        }
    }

    fn dispatch(&self, guild_id: GuildId, event: NodeEvent) {
        let delivered = match self.subscribers.get(&guild_id) {
            Some(tx) => tx.send(event).is_ok(),
            None => {
                debug!("Evento para guild {} sin suscriptor", guild_id);
                return;
            }
        };

        if !delivered {
            self.subscribers.remove(&guild_id);
        }
    }

    fn disconnect_all(&self) {
        let guilds: Vec<GuildId> = self.subscribers.iter().map(|entry| *entry.key()).collect();
        if guilds.is_empty() {
            return;
        }

        warn!("🔌 Avisando desconexión a {} reproductores", guilds.len());
        for guild_id in guilds {
            if let Some((_, tx)) = self.subscribers.remove(&guild_id) {
                // El receptor puede haberse cerrado ya
                let _ = tx.send(NodeEvent::NodeDisconnect);
            }
        }
    }

    fn session(&self) -> Result<String, MusicError> {
        self.session_id
            .read()
            .clone()
            .ok_or_else(|| MusicError::NodeUnavailable("sin sesión de Lavalink".to_string()))
    }

    fn player_url(&self, session: &str, guild_id: GuildId) -> String {
        format!(
            "{}/v4/sessions/{}/players/{}",
            self.settings.rest_url(),
            session,
            guild_id
        )
    }

    async fn update_player(
        &self,
        guild_id: GuildId,
        body: serde_json::Value,
    ) -> Result<(), MusicError> {
        let session = self.session()?;
        let response = self
            .http
            .patch(self.player_url(&session, guild_id))
            .query(&[("noReplace", "false")])
            .header(AUTHORIZATION, &self.settings.password)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        check_status(response).await.map(|_| ())
    }
}

#[async_trait]
impl AudioNode for LavalinkNode {
    fn subscribe(&self, guild_id: GuildId) -> mpsc::UnboundedReceiver<NodeEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.subscribers.insert(guild_id, tx).is_some() {
            debug!("Suscripción de guild {} reemplazada", guild_id);
        }
        rx
    }

    async fn connect_voice(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        self_deaf: bool,
    ) -> Result<(), MusicError> {
        // Sin sesión el nodo no podría recibir las credenciales de voz
        if !self.is_ready() {
            return Err(MusicError::NodeUnavailable(
                "sin sesión de Lavalink".to_string(),
            ));
        }

        let call = self.songbird.get_or_insert(guild_id);
        {
            let mut handler = call.lock().await;
            // Sin conexión previa solo guarda la preferencia
            match handler.deafen(self_deaf).await {
                Ok(()) | Err(JoinError::NoCall) => {}
                Err(e) => return Err(voice_error(e)),
            }
        }

        let (info, _call) = self
            .songbird
            .join_gateway(guild_id, channel_id)
            .await
            .map_err(voice_error)?;
        debug!("🎤 Credenciales de voz obtenidas para guild {}", guild_id);

        self.update_player(
            guild_id,
            json!({
                "voice": {
                    "token": info.token,
                    "endpoint": info.endpoint,
                    "sessionId": info.session_id,
                }
            }),
        )
        .await
    }

    async fn play(
        &self,
        guild_id: GuildId,
        track: &Track,
        start_ms: Option<u64>,
    ) -> Result<(), MusicError> {
        let mut body = json!({
            "track": { "encoded": track.encoded() },
            "paused": false,
        });
        if let Some(position) = start_ms {
            body["position"] = json!(position);
        }

        self.update_player(guild_id, body).await
    }

    async fn stop(&self, guild_id: GuildId) -> Result<(), MusicError> {
        self.update_player(guild_id, json!({ "track": { "encoded": null } }))
            .await
    }

    async fn pause(&self, guild_id: GuildId, paused: bool) -> Result<(), MusicError> {
        self.update_player(guild_id, json!({ "paused": paused })).await
    }

    async fn seek(&self, guild_id: GuildId, position_ms: u64) -> Result<(), MusicError> {
        self.update_player(guild_id, json!({ "position": position_ms }))
            .await
    }

    async fn set_volume(&self, guild_id: GuildId, volume: u8) -> Result<(), MusicError> {
        self.update_player(guild_id, json!({ "volume": volume })).await
    }

    async fn search(&self, query: &str, requester: UserId) -> Result<Vec<Track>, MusicError> {
        let identifier = search_identifier(&self.settings.search_prefix, query);
        debug!("🔍 Buscando en Lavalink: {}", identifier);

        let response = self
            .http
            .get(format!("{}/v4/loadtracks", self.settings.rest_url()))
            .query(&[("identifier", identifier.as_str())])
            .header(AUTHORIZATION, &self.settings.password)
            .send()
            .await
            .map_err(transport_error)?;

        let result: LoadResult = check_status(response)
            .await?
            .json()
            .await
            .map_err(transport_error)?;

        let tracks = match result {
            LoadResult::Track(track) => vec![track],
            LoadResult::Playlist(playlist) => {
                info!(
                    "📋 Playlist '{}' con {} canciones",
                    playlist.info.name,
                    playlist.tracks.len()
                );
                playlist.tracks
            }
            LoadResult::Search(tracks) => tracks,
            LoadResult::Empty(_) => Vec::new(),
            LoadResult::Error(exception) => {
                warn!("⚠️ Lavalink no pudo cargar '{}': {}", query, exception.describe());
                return Err(MusicError::NoResults(query.to_string()));
            }
        };

        Ok(tracks
            .into_iter()
            .map(|track| track.into_track(requester))
            .collect())
    }

    async fn destroy(&self, guild_id: GuildId) -> Result<(), MusicError> {
        self.subscribers.remove(&guild_id);

        let rest = match self.session() {
            Ok(session) => {
                match self
                    .http
                    .delete(self.player_url(&session, guild_id))
                    .header(AUTHORIZATION, &self.settings.password)
                    .send()
                    .await
                {
                    Ok(response) => check_status(response).await.map(|_| ()),
                    Err(e) => Err(transport_error(e)),
                }
            }
            // Sin sesión no queda reproductor remoto que liberar
            Err(_) => Ok(()),
        };

        let voice = match self.songbird.remove(guild_id).await {
            Ok(()) | Err(JoinError::NoCall) => Ok(()),
            Err(e) => Err(voice_error(e)),
        };

        rest.and(voice)
    }
}

/// Texto de búsqueda con el prefijo del proveedor; las URLs pasan tal cual.
fn search_identifier(prefix: &str, query: &str) -> String {
    let query = query.trim();
    if query.starts_with("http://") || query.starts_with("https://") {
        query.to_string()
    } else {
        format!("{}{}", prefix, query)
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(5);
    Duration::from_secs(1u64 << exponent).min(MAX_BACKOFF)
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, MusicError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = match response.json::<RestError>().await {
        Ok(body) if !body.message.is_empty() => body.message,
        _ => status.canonical_reason().unwrap_or("error").to_string(),
    };
    Err(MusicError::NodeRejected {
        status: status.as_u16(),
        message,
    })
}

fn transport_error(e: reqwest::Error) -> MusicError {
    MusicError::NodeUnavailable(e.to_string())
}

fn voice_error(e: JoinError) -> MusicError {
    MusicError::NodeUnavailable(format!("conexión de voz: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::node::TrackEndReason;
    use pretty_assertions::assert_eq;

    fn settings() -> LavalinkSettings {
        LavalinkSettings {
            host: "lavalink".to_string(),
            port: 2333,
            password: "youshallnotpass".to_string(),
            secure: false,
            search_prefix: "ytsearch:".to_string(),
            request_timeout: Duration::from_secs(5),
        }
    }

    fn node() -> LavalinkNode {
        LavalinkNode::new(settings(), UserId::new(99), Songbird::serenity()).unwrap()
    }

    #[test]
    fn test_urls() {
        let mut settings = settings();
        assert_eq!(settings.rest_url(), "http://lavalink:2333");
        assert_eq!(settings.websocket_url(), "ws://lavalink:2333/v4/websocket");

        settings.secure = true;
        assert_eq!(settings.rest_url(), "https://lavalink:2333");
        assert_eq!(settings.websocket_url(), "wss://lavalink:2333/v4/websocket");
    }

    #[test]
    fn test_search_identifier() {
        assert_eq!(
            search_identifier("ytsearch:", " lofi hip hop "),
            "ytsearch:lofi hip hop"
        );
        assert_eq!(
            search_identifier("ytsearch:", "https://youtu.be/dQw4w9WgXcQ"),
            "https://youtu.be/dQw4w9WgXcQ"
        );
        assert_eq!(search_identifier("scsearch:", "lofi"), "scsearch:lofi");
    }

    #[test]
    fn test_backoff_is_bounded() {
        assert_eq!(backoff_delay(1), Duration::from_secs(1));
        assert_eq!(backoff_delay(2), Duration::from_secs(2));
        assert_eq!(backoff_delay(4), Duration::from_secs(8));
        assert_eq!(backoff_delay(6), MAX_BACKOFF);
        assert_eq!(backoff_delay(u32::MAX), MAX_BACKOFF);
    }

    #[tokio::test]
    async fn test_ready_sets_session() {
        let node = node();
        assert!(!node.is_ready());
        assert!(matches!(node.session(), Err(MusicError::NodeUnavailable(_))));

        node.handle_message(r#"{"op":"ready","resumed":false,"sessionId":"abc123"}"#);

        assert!(node.is_ready());
        assert_eq!(node.session().unwrap(), "abc123");
        assert_eq!(
            node.player_url("abc123", GuildId::new(5)),
            "http://lavalink:2333/v4/sessions/abc123/players/5"
        );
    }

    #[tokio::test]
    async fn test_connect_voice_without_session_skips_gateway() {
        let node = node();

        let err = node
            .connect_voice(GuildId::new(5), ChannelId::new(6), true)
            .await
            .unwrap_err();

        assert!(matches!(err, MusicError::NodeUnavailable(_)));
        assert!(node.songbird.get(GuildId::new(5)).is_none());
    }

    #[tokio::test]
    async fn test_events_routed_to_guild_subscriber() {
        let node = node();
        let mut first = node.subscribe(GuildId::new(1));
        let mut second = node.subscribe(GuildId::new(2));

        let track = r#"{"encoded":"enc","info":{"identifier":"x","isSeekable":true,"author":"a","length":1000,"isStream":false,"position":0,"title":"t","uri":null,"artworkUrl":null,"isrc":null,"sourceName":"youtube"}}"#;
        node.handle_message(&format!(
            r#"{{"op":"event","type":"TrackStartEvent","guildId":"1","track":{track}}}"#
        ));
        node.handle_message(&format!(
            r#"{{"op":"event","type":"TrackEndEvent","guildId":"1","track":{track},"reason":"finished"}}"#
        ));

        assert_eq!(
            first.try_recv().unwrap(),
            NodeEvent::TrackStart {
                encoded: "enc".into()
            }
        );
        assert_eq!(
            first.try_recv().unwrap(),
            NodeEvent::TrackEnd {
                encoded: "enc".into(),
                reason: TrackEndReason::Finished,
            }
        );
        assert!(second.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_garbage_is_ignored() {
        let node = node();
        let mut rx = node.subscribe(GuildId::new(1));

        node.handle_message("not json");
        node.handle_message(r#"{"op":"stats","players":1,"playingPlayers":0,"uptime":1000}"#);

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_socket_loss_notifies_every_subscriber() {
        let node = node();
        let mut first = node.subscribe(GuildId::new(1));
        let mut second = node.subscribe(GuildId::new(2));

        node.disconnect_all();

        assert_eq!(first.try_recv().unwrap(), NodeEvent::NodeDisconnect);
        assert_eq!(second.try_recv().unwrap(), NodeEvent::NodeDisconnect);
        assert!(node.subscribers.is_empty());
    }

    #[tokio::test]
    async fn test_closed_subscriber_is_dropped() {
        let node = node();
        drop(node.subscribe(GuildId::new(1)));

        node.dispatch(GuildId::new(1), NodeEvent::NodeDisconnect);

        assert!(node.subscribers.is_empty());
    }

    #[tokio::test]
    async fn test_commands_fail_without_session() {
        let node = node();
        let track = Track::new("enc", "t", UserId::new(1));

        let err = node.play(GuildId::new(1), &track, None).await.unwrap_err();

        assert!(err.is_node_failure());
    }
}
