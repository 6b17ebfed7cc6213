//! Mensajes de Lavalink v4 (REST y WebSocket) que usa [`super::lavalink::LavalinkNode`].

use serde::Deserialize;
use serenity::model::id::{GuildId, UserId};
use std::num::NonZeroU64;

use super::{NodeEvent, TrackEndReason};
use crate::audio::track::Track;

/// Mensajes entrantes por el WebSocket, discriminados por `op`.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum IncomingMessage {
    Ready(ReadyPayload),
    PlayerUpdate(PlayerUpdatePayload),
    Stats(StatsPayload),
    Event(EventPayload),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyPayload {
    pub resumed: bool,
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdatePayload {
    pub guild_id: String,
    pub state: PlayerUpdateState,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdateState {
    #[serde(default)]
    pub position: u64,
    pub connected: bool,
    #[serde(default)]
    pub ping: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsPayload {
    pub players: u32,
    pub playing_players: u32,
    pub uptime: u64,
}

/// Eventos de reproductor, discriminados por `type`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum EventPayload {
    TrackStartEvent(TrackStartEvent),
    TrackEndEvent(TrackEndEvent),
    TrackExceptionEvent(TrackExceptionEvent),
    TrackStuckEvent(TrackStuckEvent),
    WebSocketClosedEvent(WebSocketClosedEvent),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackStartEvent {
    pub guild_id: String,
    pub track: NodeTrack,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackEndEvent {
    pub guild_id: String,
    pub track: NodeTrack,
    pub reason: TrackEndReason,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackExceptionEvent {
    pub guild_id: String,
    pub track: NodeTrack,
    pub exception: NodeException,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackStuckEvent {
    pub guild_id: String,
    pub track: NodeTrack,
    pub threshold_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketClosedEvent {
    pub guild_id: String,
    pub code: u16,
    #[serde(default)]
    pub reason: String,
    pub by_remote: bool,
}

impl WebSocketClosedEvent {
    /// Cierres de la conexión de voz de Discord tras los que la sesión no
    /// se recupera (desconectado, sesión inválida o expirada).
    pub fn is_fatal(&self) -> bool {
        matches!(self.code, 4004 | 4006 | 4009 | 4014)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeException {
    pub message: Option<String>,
    pub severity: String,
    #[serde(default)]
    pub cause: String,
}

impl NodeException {
    pub fn describe(&self) -> String {
        match &self.message {
            Some(message) => format!("{} ({})", message, self.severity),
            None => format!("{} ({})", self.cause, self.severity),
        }
    }
}

/// Track tal como lo serializa Lavalink.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTrack {
    pub encoded: String,
    pub info: NodeTrackInfo,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTrackInfo {
    pub identifier: String,
    pub is_seekable: bool,
    pub author: String,
    pub length: u64,
    pub is_stream: bool,
    #[serde(default)]
    pub position: u64,
    pub title: String,
    pub uri: Option<String>,
    pub artwork_url: Option<String>,
    pub isrc: Option<String>,
    pub source_name: String,
}

impl NodeTrack {
    pub fn into_track(self, requester: UserId) -> Track {
        let info = self.info;
        let mut track = Track::new(self.encoded, info.title, requester)
            .with_identifier(info.identifier)
            .with_source_name(info.source_name)
            .with_seekable(info.is_seekable);

        if !info.author.is_empty() {
            track = track.with_author(info.author);
        }
        if let Some(uri) = info.uri {
            track = track.with_uri(uri);
        }
        if let Some(artwork) = info.artwork_url {
            track = track.with_thumbnail_url(artwork);
        }

        if info.is_stream {
            track.as_stream()
        } else {
            track.with_length_ms(info.length)
        }
    }
}

/// Respuesta de `GET /v4/loadtracks`.
#[derive(Debug, Deserialize)]
#[serde(tag = "loadType", content = "data", rename_all = "lowercase")]
pub enum LoadResult {
    Track(NodeTrack),
    Playlist(PlaylistData),
    Search(Vec<NodeTrack>),
    Empty(serde_json::Value),
    Error(NodeException),
}

#[derive(Debug, Deserialize)]
pub struct PlaylistData {
    pub info: PlaylistInfo,
    pub tracks: Vec<NodeTrack>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistInfo {
    pub name: String,
    #[serde(default)]
    pub selected_track: i32,
}

/// Respuesta de error de la API REST.
#[derive(Debug, Deserialize)]
pub struct RestError {
    pub status: u16,
    #[serde(default)]
    pub message: String,
}

/// Lavalink envía los ids de servidor como texto.
pub fn parse_guild_id(raw: &str) -> Option<GuildId> {
    raw.parse::<NonZeroU64>().ok().map(GuildId::from)
}

impl EventPayload {
    /// Traduce el evento al servidor y al [`NodeEvent`] que consume el motor.
    /// Devuelve `None` para eventos que el motor no necesita.
    pub fn into_node_event(self) -> Option<(String, NodeEvent)> {
        match self {
            Self::TrackStartEvent(event) => Some((
                event.guild_id,
                NodeEvent::TrackStart {
                    encoded: event.track.encoded,
                },
            )),
            Self::TrackEndEvent(event) => Some((
                event.guild_id,
                NodeEvent::TrackEnd {
                    encoded: event.track.encoded,
                    reason: event.reason,
                },
            )),
            Self::TrackExceptionEvent(event) => Some((
                event.guild_id,
                NodeEvent::TrackException {
                    encoded: event.track.encoded,
                    message: event.exception.describe(),
                },
            )),
            Self::TrackStuckEvent(event) => Some((
                event.guild_id,
                NodeEvent::TrackException {
                    encoded: event.track.encoded,
                    message: format!("track atascado durante {}ms", event.threshold_ms),
                },
            )),
            Self::WebSocketClosedEvent(event) if event.is_fatal() => {
                Some((event.guild_id, NodeEvent::NodeDisconnect))
            }
            Self::WebSocketClosedEvent(_) | Self::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TRACK_JSON: &str = r#"{
        "encoded": "QAAAjQIAJVJpY2sgQXN0bGV5",
        "info": {
            "identifier": "dQw4w9WgXcQ",
            "isSeekable": true,
            "author": "RickAstleyVEVO",
            "length": 212000,
            "isStream": false,
            "position": 0,
            "title": "Never Gonna Give You Up",
            "uri": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "artworkUrl": "https://i.ytimg.com/vi/dQw4w9WgXcQ/maxresdefault.jpg",
            "isrc": null,
            "sourceName": "youtube"
        },
        "pluginInfo": {},
        "userData": {}
    }"#;

    #[test]
    fn test_ready_message() {
        let message: IncomingMessage = serde_json::from_str(
            r#"{"op":"ready","resumed":false,"sessionId":"la3kfsdf5eafe848"}"#,
        )
        .unwrap();

        match message {
            IncomingMessage::Ready(ready) => {
                assert_eq!(ready.session_id, "la3kfsdf5eafe848");
                assert!(!ready.resumed);
            }
            other => panic!("mensaje inesperado: {other:?}"),
        }
    }

    #[test]
    fn test_track_end_event_maps_to_node_event() {
        let raw = format!(
            r#"{{"op":"event","type":"TrackEndEvent","guildId":"817327181659111454","track":{TRACK_JSON},"reason":"finished"}}"#
        );
        let message: IncomingMessage = serde_json::from_str(&raw).unwrap();

        let IncomingMessage::Event(event) = message else {
            panic!("se esperaba un evento");
        };
        let (guild, event) = event.into_node_event().unwrap();

        assert_eq!(guild, "817327181659111454");
        assert_eq!(
            event,
            NodeEvent::TrackEnd {
                encoded: "QAAAjQIAJVJpY2sgQXN0bGV5".into(),
                reason: TrackEndReason::Finished,
            }
        );
        assert_eq!(parse_guild_id(&guild), Some(GuildId::new(817327181659111454)));
    }

    #[test]
    fn test_stuck_and_fatal_close_events() {
        let stuck = format!(
            r#"{{"op":"event","type":"TrackStuckEvent","guildId":"1","track":{TRACK_JSON},"thresholdMs":10000}}"#
        );
        let IncomingMessage::Event(event) = serde_json::from_str::<IncomingMessage>(&stuck).unwrap() else {
            panic!("se esperaba un evento");
        };
        assert!(matches!(
            event.into_node_event(),
            Some((_, NodeEvent::TrackException { .. }))
        ));

        let closed = r#"{"op":"event","type":"WebSocketClosedEvent","guildId":"1","code":4014,"reason":"Disconnected.","byRemote":true}"#;
        let IncomingMessage::Event(event) = serde_json::from_str::<IncomingMessage>(closed).unwrap() else {
            panic!("se esperaba un evento");
        };
        assert_eq!(
            event.into_node_event(),
            Some(("1".to_string(), NodeEvent::NodeDisconnect))
        );
    }

    #[test]
    fn test_unknown_op_is_tolerated() {
        let message: IncomingMessage =
            serde_json::from_str(r#"{"op":"somethingNew","foo":1}"#).unwrap();
        assert!(matches!(message, IncomingMessage::Unknown));
    }

    #[test]
    fn test_load_results() {
        let search = format!(r#"{{"loadType":"search","data":[{TRACK_JSON}]}}"#);
        let LoadResult::Search(tracks) = serde_json::from_str::<LoadResult>(&search).unwrap() else {
            panic!("se esperaba una búsqueda");
        };
        let track = tracks[0].clone().into_track(UserId::new(42));

        assert_eq!(track.title(), "Never Gonna Give You Up");
        assert_eq!(track.length_ms(), Some(212_000));
        assert_eq!(track.requester_id(), UserId::new(42));
        assert_eq!(track.source_name(), Some("youtube"));

        let empty: LoadResult = serde_json::from_str(r#"{"loadType":"empty","data":{}}"#).unwrap();
        assert!(matches!(empty, LoadResult::Empty(_)));

        let error: LoadResult = serde_json::from_str(
            r#"{"loadType":"error","data":{"message":"Video unavailable","severity":"common","cause":"x"}}"#,
        )
        .unwrap();
        let LoadResult::Error(exception) = error else {
            panic!("se esperaba un error");
        };
        assert_eq!(exception.describe(), "Video unavailable (common)");
    }
}
