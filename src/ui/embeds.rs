use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::audio::{
    player::{PlayOutcome, PlayerSnapshot},
    queue::{LoopMode, QueueInfo},
    track::Track,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Resonance";

const ITEMS_PER_PAGE: usize = 10;

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(snapshot: &PlayerSnapshot) -> CreateEmbed {
    let Some(track) = snapshot.current() else {
        return create_info_embed(
            "Nada sonando",
            "😴 No hay nada reproduciéndose\n\n💡 Usa `/play <canción>` para agregar música",
        );
    };

    let status = if snapshot.is_paused() {
        "⏸️ En Pausa"
    } else {
        "🎵 Reproduciendo Ahora"
    };

    let embed = track_fields(
        CreateEmbed::default()
            .title(status)
            .description(format!("**{}**", track.title()))
            .color(colors::SUCCESS_GREEN),
        track,
    )
    .field("🔁 Repetición", loop_label(snapshot.loop_mode), true)
    .field("🔊 Volumen", format!("{}%", snapshot.volume), true)
    .field("📋 En cola", snapshot.queue.total_items().to_string(), true);

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea el embed de respuesta a `/play`
pub fn create_play_outcome_embed(outcome: &PlayOutcome) -> CreateEmbed {
    match outcome {
        PlayOutcome::Started(track) => track_fields(
            CreateEmbed::default()
                .title("🎵 Reproduciendo Ahora")
                .description(format!("**{}**", track.title()))
                .color(colors::SUCCESS_GREEN),
            track,
        )
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER)),
        PlayOutcome::Queued { track, position } => create_track_added_embed(track, *position),
        PlayOutcome::Playlist {
            first,
            added,
            started,
        } => create_playlist_added_embed(first, *added, *started),
    }
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_track_added_embed(track: &Track, position: usize) -> CreateEmbed {
    track_fields(
        CreateEmbed::default()
            .title("✅ Canción Agregada Exitosamente")
            .description(format!(
                "**{}** se ha agregado a la cola de reproducción",
                track.title()
            ))
            .color(colors::SUCCESS_GREEN),
        track,
    )
    .field("📍 Posición", position.to_string(), true)
    .timestamp(Timestamp::now())
    .footer(CreateEmbedFooter::new(
        "🎵 Se reproducirá automáticamente cuando le toque",
    ))
}

/// Crea un embed para mostrar que una playlist fue agregada
pub fn create_playlist_added_embed(first: &Track, added: usize, started: bool) -> CreateEmbed {
    let description = if added == 1 {
        "Se agregó **1 canción** de la playlist a la cola de reproducción".to_string()
    } else {
        format!(
            "Se agregaron **{} canciones** de la playlist a la cola de reproducción",
            added
        )
    };

    let footer_text = if started {
        "🎵 La reproducción comenzó • Usa /queue para ver todas las canciones"
    } else {
        "🎵 Usa /queue para ver todas las canciones"
    };

    let mut embed = CreateEmbed::default()
        .title("📋 Playlist Agregada Exitosamente")
        .description(description)
        .color(colors::MUSIC_PURPLE)
        .field("📊 Canciones agregadas", added.to_string(), true)
        .field(
            if started { "🎵 Sonando" } else { "⏭️ Primera" },
            first.title(),
            true,
        );

    if let Some(source) = first.source_name() {
        embed = embed.field("🔗 Fuente", source, true);
    }

    embed
        .footer(CreateEmbedFooter::new(footer_text))
        .timestamp(Timestamp::now())
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(queue_info: &QueueInfo, page: usize) -> CreateEmbed {
    let queue_page = queue_info.page(page, ITEMS_PER_PAGE);

    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if queue_info.current.is_none() && queue_info.total_items() == 0 {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    // Canción actual
    if let Some(current) = &queue_info.current {
        let status = match queue_info.loop_mode {
            LoopMode::Track => "🔂",
            LoopMode::Queue => "🔁",
            LoopMode::Off => "▶️",
        };

        embed = embed.field(
            format!("{} Reproduciendo", status),
            format!("**{}**{}", current.title(), artist_suffix(current)),
            false,
        );
    }

    // Próximas canciones
    if !queue_page.items.is_empty() {
        let mut description = String::new();

        for (i, item) in queue_page.items.iter().enumerate() {
            let duration = item
                .duration()
                .map(|d| format!(" `[{}]`", format_duration(d)))
                .unwrap_or_default();

            description.push_str(&format!(
                "**{}**. {}{}{} • <@{}>\n",
                queue_page.first_position + i,
                item.title(),
                artist_suffix(item),
                duration,
                item.requester_id()
            ));
        }

        embed = embed.field("Próximas canciones", description, false);
    }

    // Información adicional
    let mut info = format!("**Total:** {} canciones", queue_info.total_items());

    if queue_info.total_duration > Duration::ZERO {
        info.push_str(&format!(
            " • **Duración:** {}",
            format_duration(queue_info.total_duration)
        ));
    }

    if queue_info.loop_mode != LoopMode::Off {
        info.push_str(&format!(" • **{}**", loop_label(queue_info.loop_mode)));
    }

    embed = embed.field("Información", info, false);

    // Paginación
    if queue_page.total_pages > 1 {
        embed = embed.footer(CreateEmbedFooter::new(format!(
            "Página {} de {} • Resonance",
            queue_page.current_page, queue_page.total_pages
        )));
    } else {
        embed = embed.footer(CreateEmbedFooter::new(STANDARD_FOOTER));
    }

    embed.timestamp(Timestamp::now())
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de advertencia (errores del usuario, no del bot)
pub fn create_warning_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("⚠️ {}", title))
        .description(description)
        .color(colors::WARNING_ORANGE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de éxito
pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de información
pub fn create_info_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("ℹ️ {}", title))
        .description(description)
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de volumen con indicador visual
pub fn create_volume_embed(volume: u8) -> CreateEmbed {
    let status_emoji = match volume {
        0 => "🔇",
        1..=50 => "🔉",
        _ => "🔊",
    };

    CreateEmbed::default()
        .title(format!("{} Control de Volumen", status_emoji))
        .description(format!("**Volumen actual: {}%**", volume))
        .field("📊 Nivel", create_volume_bar(volume), false)
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new("💡 Usa /volume <nivel> para ajustar"))
        .timestamp(Timestamp::now())
}

fn track_fields(mut embed: CreateEmbed, track: &Track) -> CreateEmbed {
    embed = embed.field("🎤 Artista", track.author().unwrap_or("Desconocido"), true);

    embed = match track.duration() {
        Some(duration) if !track.is_stream() => {
            embed.field("⏱️ Duración", format_duration(duration), true)
        }
        _ => embed.field("⏱️ Duración", "🔴 En vivo", true),
    };

    embed = embed.field(
        "👤 Solicitado por",
        format!("<@{}>", track.requester_id()),
        true,
    );

    if let Some(source) = track.source_name() {
        embed = embed.field("🔗 Fuente", source, true);
    }
    if let Some(thumbnail) = track.thumbnail_url() {
        embed = embed.thumbnail(thumbnail);
    }
    if let Some(uri) = track.uri() {
        embed = embed.url(uri);
    }

    embed
}

fn artist_suffix(track: &Track) -> String {
    track
        .author()
        .map(|artist| format!(" - {}", artist))
        .unwrap_or_default()
}

fn loop_label(mode: LoopMode) -> &'static str {
    match mode {
        LoopMode::Off => "➡️ Desactivada",
        LoopMode::Track => "🔂 Canción",
        LoopMode::Queue => "🔁 Cola",
    }
}

/// Crea una barra visual de volumen
fn create_volume_bar(volume: u8) -> String {
    let segments = 20;
    let filled = (usize::from(volume.min(100)) * segments) / 100;
    let empty = segments - filled;

    let bar = "█".repeat(filled) + &"▒".repeat(empty);
    format!("`[{}]`", bar)
}

/// Formatea una duración en formato legible
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(59)), "0:59");
        assert_eq!(format_duration(Duration::from_secs(212)), "3:32");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
    }

    #[test]
    fn test_volume_bar() {
        assert_eq!(create_volume_bar(0), format!("`[{}]`", "▒".repeat(20)));
        assert_eq!(create_volume_bar(100), format!("`[{}]`", "█".repeat(20)));
        assert_eq!(
            create_volume_bar(50),
            format!("`[{}{}]`", "█".repeat(10), "▒".repeat(10))
        );
    }

    #[test]
    fn test_loop_labels_are_distinct() {
        assert_ne!(loop_label(LoopMode::Off), loop_label(LoopMode::Track));
        assert_ne!(loop_label(LoopMode::Track), loop_label(LoopMode::Queue));
    }
}
