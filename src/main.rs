use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod error;
mod ui;

use crate::audio::{node::lavalink::LavalinkNode, registry::PlayerRegistry};
use crate::bot::MusicBot;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("resonance=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Resonance v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Arc::new(Config::load()?);

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    info!("{}", config.summary());

    // Intents mínimos: comandos slash y estados de voz
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    // Lavalink necesita el ID del bot antes de abrir el WebSocket
    let user_id = Http::new(&config.discord_token).get_current_user().await?.id;

    info!("🎼 Inicializando Lavalink...");
    let songbird = Songbird::serenity();
    let node = LavalinkNode::connect(config.lavalink_settings(), user_id, songbird.clone())?;
    let registry = Arc::new(PlayerRegistry::new(node.clone(), config.engine_settings()));

    // Crear handler del bot
    let handler = MusicBot::new(config.clone(), registry.clone());

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");

        registry.destroy_all().await;
        node.shutdown();
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    match LavalinkNode::probe(&config.lavalink_settings()).await {
        Ok(version) => {
            println!("OK (Lavalink {})", version.trim());
            Ok(())
        }
        Err(e) => anyhow::bail!("Lavalink no disponible: {:#}", e),
    }
}
