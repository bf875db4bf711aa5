use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, channel::ChannelType, id::GuildId},
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
        play_command(),
        pause_command(),
        resume_command(),
        skip_command(),
        stop_command(),
        queue_command(),
        nowplaying_command(),
        shuffle_command(),
        remove_command(),
        loop_command(),
        volume_command(),
        join_command(),
        leave_command(),
    ]
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una canción (búsqueda, URL, Spotify o audio directo)")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL o término de búsqueda",
            )
            .required(true),
        )
}

// Comandos de control

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pausa la reproducción actual")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Reanuda la reproducción pausada")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Vota para saltar la canción actual")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Detiene la reproducción, limpia la cola y desconecta")
}

// Comandos de cola

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue")
        .description("Muestra la cola de reproducción")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "page", "Número de página")
                .min_int_value(1),
        )
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Muestra información de la canción actual")
}

fn shuffle_command() -> CreateCommand {
    CreateCommand::new("shuffle").description("Mezcla la cola de reproducción")
}

fn remove_command() -> CreateCommand {
    CreateCommand::new("remove")
        .description("Quita una canción de la cola")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "position",
                "Posición en la cola (ver /queue)",
            )
            .min_int_value(1)
            .required(true),
        )
}

fn loop_command() -> CreateCommand {
    CreateCommand::new("loop").description("Activa/desactiva la repetición de la canción actual")
}

// Comandos de audio

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Muestra o ajusta el volumen de reproducción")
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

// Comandos de conexión

fn join_command() -> CreateCommand {
    CreateCommand::new("join")
        .description("Conecta o mueve el bot a un canal de voz")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Channel,
                "channel",
                "Canal de voz (por defecto, el tuyo)",
            )
            .channel_types(vec![ChannelType::Voice, ChannelType::Stage]),
        )
}

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Desconecta el bot del canal de voz")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_names_are_unique() {
        let names: Vec<String> = all_commands()
            .iter()
            .map(|c| serde_json::to_value(c).unwrap()["name"].as_str().unwrap().to_string())
            .collect();
        let mut deduped = names.clone();
        deduped.sort();
        deduped.dedup();

        assert_eq!(names.len(), deduped.len());
        assert!(names.contains(&"play".to_string()));
        assert!(names.contains(&"remove".to_string()));
    }

    #[test]
    fn join_accepts_an_optional_voice_channel() {
        let join = serde_json::to_value(join_command()).unwrap();
        let option = &join["options"][0];

        assert_eq!(option["name"], "channel");
        assert_eq!(option["channel_types"], serde_json::json!([2, 13]));
    }
}
