//! # Bot Module
//!
//! Discord-facing half of Resonance.
//!
//! This module contains:
//! - Slash command registration ([`commands`])
//! - Command dispatch into the per-guild players ([`handlers`])
//! - Voice state tracking (bot disconnects, auto-leave on empty channels)
//!
//! ## Architecture
//!
//! [`MusicBot`] implements Serenity's [`EventHandler`] trait and carries the
//! [`PlayerRegistry`] every command resolves its guild player through. The
//! registry, not the handler, owns the players; the handler only decides
//! when a player is created or destroyed.
//!
//! ## Example
//!
//! ```text
//! let config = Arc::new(Config::load()?);
//! let registry = Arc::new(PlayerRegistry::new(node, config.engine_settings()));
//! let bot = MusicBot::new(config, registry);
//! ```

use anyhow::Result;
use dashmap::{mapref::entry::Entry, DashMap};
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{
    audio::{player::PlayerOptions, registry::PlayerRegistry},
    config::Config,
};

/// Event handler del bot.
pub struct MusicBot {
    config: Arc<Config>,
    registry: Arc<PlayerRegistry>,
    /// Temporizadores de salida automática por guild
    auto_leave: Arc<DashMap<GuildId, CancellationToken>>,
}

impl MusicBot {
    pub fn new(config: Arc<Config>, registry: Arc<PlayerRegistry>) -> Self {
        Self {
            config,
            registry,
            auto_leave: Arc::new(DashMap::new()),
        }
    }

    pub fn registry(&self) -> &PlayerRegistry {
        &self.registry
    }

    /// Opciones para un reproductor nuevo con los valores por defecto del bot
    pub fn player_options(&self, text_channel_id: ChannelId, voice_channel_id: ChannelId) -> PlayerOptions {
        PlayerOptions {
            text_channel_id,
            voice_channel_id,
            volume: self.config.default_volume,
            self_deaf: self.config.self_deaf,
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// Guild commands (when `GUILD_ID` is set) propagate almost instantly and
    /// are meant for development; otherwise commands are registered globally.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);

                // Verificar que el bot esté en la guild
                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }

    /// Programa la destrucción del reproductor si el canal sigue vacío tras `delay`
    fn schedule_auto_leave(&self, guild_id: GuildId, delay: Duration) {
        let token = match self.auto_leave.entry(guild_id) {
            Entry::Occupied(_) => return,
            Entry::Vacant(entry) => entry.insert(CancellationToken::new()).clone(),
        };

        info!(
            "🚪 Programando auto-desconexión en {}s para guild {}",
            delay.as_secs(),
            guild_id
        );

        let registry = self.registry.clone();
        let timers = self.auto_leave.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Auto-desconexión cancelada en guild {}", guild_id);
                }
                _ = tokio::time::sleep(delay) => {
                    timers.remove_if(&guild_id, |_, current| !current.is_cancelled());
                    match registry.remove(guild_id).await {
                        Ok(true) => info!("👋 Canal vacío, desconectado de guild {}", guild_id),
                        Ok(false) => {}
                        Err(e) => warn!("⚠️ Error en auto-desconexión de guild {}: {}", guild_id, e),
                    }
                }
            }
        });
    }

    fn cancel_auto_leave(&self, guild_id: GuildId) {
        if let Some((_, token)) = self.auto_leave.remove(&guild_id) {
            token.cancel();
        }
    }
}

#[async_trait]
impl EventHandler for MusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Handles voice state updates for users and the bot.
    ///
    /// - **Bot disconnected**: destroys the guild player
    /// - **Bound channel empty**: schedules auto-leave (if enabled)
    /// - **Someone returns**: cancels a pending auto-leave
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };

        // Detectar si el bot fue desconectado
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id == current_user_id && old.is_some() && new.channel_id.is_none() {
            self.cancel_auto_leave(guild_id);
            match self.registry.remove(guild_id).await {
                Ok(true) => info!("🔌 Bot desconectado en guild {}, reproductor destruido", guild_id),
                Ok(false) => {}
                Err(e) => error!("Error al destruir reproductor: {:?}", e),
            }
            return;
        }

        let Some(player) = self.registry.get(guild_id) else {
            self.cancel_auto_leave(guild_id);
            return;
        };

        let bound = player.voice_channel_id().await;
        let listeners = handlers::listeners_in(&ctx, guild_id, bound);

        match (listeners, self.config.auto_leave()) {
            (0, Some(delay)) => self.schedule_auto_leave(guild_id, delay),
            _ => self.cancel_auto_leave(guild_id),
        }
    }
}
