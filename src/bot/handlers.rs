use anyhow::Result;
use serenity::{
    builder::{CreateEmbed, CreateInteractionResponseFollowup, EditInteractionResponse},
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::{
    audio::{
        player::{GuildPlayer, PlayRequest},
        queue::LoopMode,
        voice::VoiceSessionManager,
    },
    bot::MusicBot,
    error::MusicError,
    ui::embeds,
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &MusicBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    // Defer la respuesta ya que puede tomar tiempo
    command.defer(&ctx.http).await?;

    match run_command(ctx, &command, guild_id, bot).await {
        Ok(embed) => {
            command
                .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
                .await?;
        }
        Err(e) => {
            // Los errores solo los ve quien usó el comando
            command.delete_response(&ctx.http).await?;
            command
                .create_followup(
                    &ctx.http,
                    CreateInteractionResponseFollowup::new()
                        .embed(error_embed(&e))
                        .ephemeral(true),
                )
                .await?;
        }
    }

    Ok(())
}

async fn run_command(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &MusicBot,
) -> Result<CreateEmbed> {
    let user_channel = user_voice_channel(ctx, guild_id, command.user.id);

    match command.data.name.as_str() {
        "join" => handle_join(ctx, command, guild_id, user_channel, bot).await,
        "leave" => handle_leave(guild_id, user_channel, bot).await,
        "play" => handle_play(command, guild_id, user_channel, bot).await,
        "pause" => {
            controlled_player(bot, guild_id, user_channel).await?.pause(true).await?;
            Ok(embeds::create_success_embed("Pausado", "⏸️ Reproducción pausada"))
        }
        "resume" => {
            controlled_player(bot, guild_id, user_channel).await?.pause(false).await?;
            Ok(embeds::create_success_embed("Reanudado", "▶️ Reproducción reanudada"))
        }
        "skip" => {
            let skipped = controlled_player(bot, guild_id, user_channel).await?.skip().await?;
            Ok(embeds::create_success_embed(
                "Saltada",
                &format!("⏭️ **{}**", skipped.title()),
            ))
        }
        "previous" => {
            let track = controlled_player(bot, guild_id, user_channel)
                .await?
                .previous()
                .await?;
            Ok(embeds::create_success_embed(
                "Canción anterior",
                &format!("⏮️ Volviendo a **{}**", track.title()),
            ))
        }
        "stop" => handle_stop(guild_id, user_channel, bot).await,
        "seek" => {
            let seconds = int_option(command, "seconds").unwrap_or_default();
            let position_ms = u64::try_from(seconds).unwrap_or_default() * 1000;
            controlled_player(bot, guild_id, user_channel)
                .await?
                .seek(position_ms)
                .await?;
            Ok(embeds::create_success_embed(
                "Posición cambiada",
                &format!(
                    "⏩ Saltando a {}",
                    embeds::format_duration(std::time::Duration::from_millis(position_ms))
                ),
            ))
        }
        "volume" => handle_volume(command, guild_id, user_channel, bot).await,
        "loop" => {
            let mode = parse_loop_mode(string_option(command, "mode").unwrap_or("off"));
            controlled_player(bot, guild_id, user_channel)
                .await?
                .set_loop(mode)
                .await?;
            let description = match mode {
                LoopMode::Off => "➡️ Repetición desactivada",
                LoopMode::Track => "🔂 Repitiendo la canción actual",
                LoopMode::Queue => "🔁 Repitiendo toda la cola",
            };
            Ok(embeds::create_success_embed("Modo de repetición", description))
        }
        "queue" => {
            let page = int_option(command, "page")
                .and_then(|page| usize::try_from(page).ok())
                .unwrap_or(1);
            let player = bot.registry().get(guild_id).ok_or(MusicError::NothingPlaying)?;
            Ok(embeds::create_queue_embed(&player.snapshot().await.queue, page))
        }
        "nowplaying" => {
            let player = bot.registry().get(guild_id).ok_or(MusicError::NothingPlaying)?;
            Ok(embeds::create_now_playing_embed(&player.snapshot().await))
        }
        "shuffle" => {
            let count = controlled_player(bot, guild_id, user_channel).await?.shuffle().await?;
            Ok(embeds::create_success_embed(
                "Cola mezclada",
                &format!("🔀 {} canciones mezcladas", count),
            ))
        }
        "remove" => {
            let index = queue_index(int_option(command, "position").unwrap_or_default())?;
            let removed = controlled_player(bot, guild_id, user_channel)
                .await?
                .remove_at(index)
                .await?;
            Ok(embeds::create_success_embed(
                "Canción quitada",
                &format!("🗑️ **{}**", removed.title()),
            ))
        }
        "move" => {
            let from = queue_index(int_option(command, "from").unwrap_or_default())?;
            let to = queue_index(int_option(command, "to").unwrap_or_default())?;
            controlled_player(bot, guild_id, user_channel)
                .await?
                .move_track(from, to)
                .await?;
            Ok(embeds::create_success_embed(
                "Canción movida",
                &format!("📍 De la posición {} a la {}", from + 1, to + 1),
            ))
        }
        "clear" => handle_clear(command, guild_id, user_channel, bot).await,
        other => anyhow::bail!("Comando no reconocido: {}", other),
    }
}

// Handlers específicos para cada comando

async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    user_channel: Option<ChannelId>,
    bot: &MusicBot,
) -> Result<CreateEmbed> {
    let channel_id = VoiceSessionManager::require_user_channel(user_channel)?;

    if let Some(player) = bot.registry().get(guild_id) {
        let bound = player.voice_channel_id().await;
        let listeners = listeners_in(ctx, guild_id, bound);
        let target = VoiceSessionManager::ensure_can_move(bound, Some(channel_id), listeners)?;

        player.set_voice_channel(target).await?;
        return Ok(embeds::create_success_embed(
            "Canal cambiado",
            &format!("🔀 Me moví a <#{}>", target),
        ));
    }

    bot.registry()
        .get_or_create(guild_id, bot.player_options(command.channel_id, channel_id))
        .await?;

    Ok(embeds::create_success_embed(
        "Conectado",
        &format!("🔊 Conectado a <#{}>", channel_id),
    ))
}

async fn handle_leave(
    guild_id: GuildId,
    user_channel: Option<ChannelId>,
    bot: &MusicBot,
) -> Result<CreateEmbed> {
    controlled_player(bot, guild_id, user_channel).await?;
    bot.registry().remove(guild_id).await?;

    Ok(embeds::create_success_embed(
        "Desconectado",
        "👋 Desconectado del canal de voz",
    ))
}

async fn handle_play(
    command: &CommandInteraction,
    guild_id: GuildId,
    user_channel: Option<ChannelId>,
    bot: &MusicBot,
) -> Result<CreateEmbed> {
    let query = string_option(command, "query")
        .map(str::trim)
        .filter(|query| !query.is_empty())
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?;

    let player = match bot.registry().get(guild_id) {
        Some(player) => {
            VoiceSessionManager::check(&player, user_channel).await?;
            player
        }
        None => {
            let channel_id = VoiceSessionManager::require_user_channel(user_channel)?;
            bot.registry()
                .get_or_create(guild_id, bot.player_options(command.channel_id, channel_id))
                .await?
        }
    };

    player.set_text_channel(command.channel_id).await?;
    let outcome = player
        .play(PlayRequest::Query {
            query: query.to_string(),
            requester: command.user.id,
        })
        .await?;

    Ok(embeds::create_play_outcome_embed(&outcome))
}

async fn handle_stop(
    guild_id: GuildId,
    user_channel: Option<ChannelId>,
    bot: &MusicBot,
) -> Result<CreateEmbed> {
    let cleared = controlled_player(bot, guild_id, user_channel)
        .await?
        .stop()
        .await?;

    Ok(embeds::create_success_embed(
        "Detenido",
        &format!("⏹️ Reproducción detenida, {} canciones quitadas de la cola", cleared),
    ))
}

async fn handle_volume(
    command: &CommandInteraction,
    guild_id: GuildId,
    user_channel: Option<ChannelId>,
    bot: &MusicBot,
) -> Result<CreateEmbed> {
    let player = controlled_player(bot, guild_id, user_channel).await?;

    let Some(level) = int_option(command, "level") else {
        return Ok(embeds::create_volume_embed(player.snapshot().await.volume));
    };

    let volume = u8::try_from(level).map_err(|_| MusicError::OutOfRange {
        value: level.max(0) as u64,
        limit: 100,
    })?;
    player.set_volume(volume).await?;

    Ok(embeds::create_volume_embed(volume))
}

async fn handle_clear(
    command: &CommandInteraction,
    guild_id: GuildId,
    user_channel: Option<ChannelId>,
    bot: &MusicBot,
) -> Result<CreateEmbed> {
    let player = controlled_player(bot, guild_id, user_channel).await?;

    let (removed, description) = match string_option(command, "filter").unwrap_or("all") {
        "duplicates" => (player.dedup().await?, "duplicados"),
        "user" => {
            let user_id = user_option(command, "user").unwrap_or(command.user.id);
            (player.remove_by_requester(user_id).await?, "del usuario")
        }
        _ => (player.clear_queue().await?, "en total"),
    };

    Ok(embeds::create_success_embed(
        "Cola limpiada",
        &format!("🗑️ {} canciones quitadas ({})", removed, description),
    ))
}

// Funciones auxiliares

/// Reproductor del servidor, verificando que el usuario comparta su canal
async fn controlled_player(
    bot: &MusicBot,
    guild_id: GuildId,
    user_channel: Option<ChannelId>,
) -> Result<Arc<GuildPlayer>, MusicError> {
    let player = bot
        .registry()
        .get(guild_id)
        .ok_or(MusicError::NothingPlaying)?;
    VoiceSessionManager::check(&player, user_channel).await?;
    Ok(player)
}

fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

/// Usuarios (no bots) conectados a un canal de voz
pub(crate) fn listeners_in(ctx: &Context, guild_id: GuildId, channel_id: ChannelId) -> usize {
    let bot_id = ctx.cache.current_user().id;
    let Some(guild) = guild_id.to_guild_cached(&ctx.cache) else {
        return 0;
    };

    guild
        .voice_states
        .values()
        .filter(|state| state.channel_id == Some(channel_id) && state.user_id != bot_id)
        .filter(|state| state.member.as_ref().map_or(true, |member| !member.user.bot))
        .count()
}

fn string_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn int_option(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

fn user_option(command: &CommandInteraction, name: &str) -> Option<UserId> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_user_id())
}

fn parse_loop_mode(raw: &str) -> LoopMode {
    match raw {
        "track" => LoopMode::Track,
        "queue" => LoopMode::Queue,
        _ => LoopMode::Off,
    }
}

/// Posición 1-based de la cola a índice
fn queue_index(position: i64) -> Result<usize, MusicError> {
    usize::try_from(position)
        .ok()
        .and_then(|position| position.checked_sub(1))
        .ok_or(MusicError::OutOfRange {
            value: position.max(0) as u64,
            limit: 0,
        })
}

fn error_embed(error: &anyhow::Error) -> CreateEmbed {
    match error.downcast_ref::<MusicError>() {
        Some(e) if e.is_node_failure() => {
            warn!("⚠️ Fallo del nodo de audio: {}", e);
            embeds::create_error_embed("Servidor de audio no disponible", &e.to_string())
        }
        Some(e) => embeds::create_warning_embed("No se pudo completar", &e.to_string()),
        None => {
            error!("Error manejando comando: {:?}", error);
            embeds::create_error_embed(
                "Error inesperado",
                "Ocurrió un error al procesar el comando",
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_index_is_one_based() {
        assert_eq!(queue_index(1), Ok(0));
        assert_eq!(queue_index(10), Ok(9));
        assert!(queue_index(0).is_err());
        assert!(queue_index(-3).is_err());
    }

    #[test]
    fn test_parse_loop_mode() {
        assert_eq!(parse_loop_mode("track"), LoopMode::Track);
        assert_eq!(parse_loop_mode("queue"), LoopMode::Queue);
        assert_eq!(parse_loop_mode("off"), LoopMode::Off);
        assert_eq!(parse_loop_mode("cualquier cosa"), LoopMode::Off);
    }

    #[test]
    fn test_music_errors_survive_anyhow() {
        let error: anyhow::Error = MusicError::NothingPlaying.into();
        assert_eq!(
            error.downcast_ref::<MusicError>(),
            Some(&MusicError::NothingPlaying)
        );
    }
}
