use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

fn all_commands() -> Vec<CreateCommand> {
    vec![
        join_command(),
        leave_command(),
        play_command(),
        pause_command(),
        resume_command(),
        skip_command(),
        previous_command(),
        stop_command(),
        seek_command(),
        volume_command(),
        loop_command(),
        queue_command(),
        nowplaying_command(),
        shuffle_command(),
        remove_command(),
        move_command(),
        clear_command(),
    ]
}

// Comandos de conexión

fn join_command() -> CreateCommand {
    CreateCommand::new("join").description("Conecta el bot a tu canal de voz o lo mueve a él")
}

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Desconecta el bot y descarta la cola")
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Busca y reproduce una canción, o carga una playlist por URL")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "Enlace o texto a buscar",
            )
            .required(true),
        )
}

// Comandos de control

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pausa la canción que está sonando")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Continúa la canción pausada")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Salta a la siguiente canción")
}

fn previous_command() -> CreateCommand {
    CreateCommand::new("previous").description("Vuelve a la canción anterior")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Vacía la cola y corta la canción actual")
}

fn seek_command() -> CreateCommand {
    CreateCommand::new("seek")
        .description("Salta a una posición de la canción actual")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "seconds", "Posición en segundos")
                .min_int_value(0)
                .required(true),
        )
}

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Muestra o cambia el volumen del servidor")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "level",
                "Nivel de volumen (0-100)",
            )
            .min_int_value(0)
            .max_int_value(100),
        )
}

fn loop_command() -> CreateCommand {
    CreateCommand::new("loop")
        .description("Elige qué se repite al terminar una canción")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "mode", "Qué repetir")
                .add_string_choice("Nada", "off")
                .add_string_choice("Canción actual", "track")
                .add_string_choice("Toda la cola", "queue")
                .required(true),
        )
}

// Comandos de cola

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue")
        .description("Lista las canciones en espera")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "page", "Página a mostrar")
                .min_int_value(1),
        )
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Detalles de lo que está sonando")
}

fn shuffle_command() -> CreateCommand {
    CreateCommand::new("shuffle").description("Mezcla la cola de reproducción")
}

fn remove_command() -> CreateCommand {
    CreateCommand::new("remove")
        .description("Quita una canción de la cola")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "position", "Posición en la cola")
                .min_int_value(1)
                .required(true),
        )
}

fn move_command() -> CreateCommand {
    CreateCommand::new("move")
        .description("Mueve una canción a otra posición de la cola")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "from", "Posición actual")
                .min_int_value(1)
                .required(true),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "to", "Nueva posición")
                .min_int_value(1)
                .required(true),
        )
}

fn clear_command() -> CreateCommand {
    CreateCommand::new("clear")
        .description("Quita canciones de la cola en bloque")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "filter", "Qué quitar")
                .add_string_choice("Toda la cola", "all")
                .add_string_choice("Repetidas", "duplicates")
                .add_string_choice("Pedidas por un usuario", "user"),
        )
        .add_option(CreateCommandOption::new(
            CommandOptionType::User,
            "user",
            "Autor de las canciones a quitar (por defecto, tú)",
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn command_names() -> Vec<String> {
        all_commands()
            .iter()
            .map(|command| {
                let json = serde_json::to_value(command).unwrap();
                json["name"].as_str().unwrap().to_string()
            })
            .collect()
    }

    #[test]
    fn test_command_names_are_unique() {
        let names = command_names();
        let unique: HashSet<&String> = names.iter().collect();
        assert_eq!(names.len(), 17);
        assert_eq!(unique.len(), names.len());
    }

    #[test]
    fn test_every_dispatched_command_is_registered() {
        let names = command_names();
        for expected in ["join", "leave", "play", "seek", "loop", "queue", "move", "clear"] {
            assert!(names.iter().any(|name| name == expected), "falta /{}", expected);
        }
    }
}
