use serenity::model::id::ChannelId;

use crate::{audio::player::GuildPlayer, error::MusicError};

/// Validaciones de canal de voz para los comandos.
///
/// No guarda estado: el canal enlazado lo aporta el reproductor y el canal
/// del usuario lo resuelve quien llama (normalmente desde la caché de
/// serenity).
pub struct VoiceSessionManager;

impl VoiceSessionManager {
    /// El usuario debe estar en un canal de voz para crear un reproductor
    pub fn require_user_channel(user_channel: Option<ChannelId>) -> Result<ChannelId, MusicError> {
        user_channel.ok_or_else(|| {
            MusicError::InvalidChannel("Debes estar en un canal de voz".to_string())
        })
    }

    /// Controles de reproducción y `leave` exigen compartir canal con el bot
    pub fn ensure_same_channel(
        bound: ChannelId,
        user_channel: Option<ChannelId>,
    ) -> Result<(), MusicError> {
        let user_channel = Self::require_user_channel(user_channel)?;
        if user_channel != bound {
            return Err(MusicError::InvalidChannel(format!(
                "Debes estar en <#{}> para controlar la música",
                bound
            )));
        }
        Ok(())
    }

    /// Mover el bot a otro canal: no se permite dejar sin música a quienes
    /// siguen escuchando en el canal actual.
    pub fn ensure_can_move(
        bound: ChannelId,
        user_channel: Option<ChannelId>,
        listeners_in_bound: usize,
    ) -> Result<ChannelId, MusicError> {
        let target = Self::require_user_channel(user_channel)?;
        if target == bound {
            return Err(MusicError::InvalidChannel(format!(
                "Ya estoy en <#{}>",
                bound
            )));
        }
        if listeners_in_bound > 0 {
            return Err(MusicError::InvalidChannel(format!(
                "Hay {} usuarios escuchando en <#{}>",
                listeners_in_bound, bound
            )));
        }
        Ok(target)
    }

    /// Verifica al usuario contra el canal enlazado de un reproductor
    pub async fn check(
        player: &GuildPlayer,
        user_channel: Option<ChannelId>,
    ) -> Result<(), MusicError> {
        if player.is_destroyed() {
            return Err(MusicError::PlayerDestroyed);
        }
        Self::ensure_same_channel(player.voice_channel_id().await, user_channel)
    }
}
