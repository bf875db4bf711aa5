use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use crate::{
    audio::session::VoteOutcome,
    bot::JukeboxBot,
    error::{PlayerError, ResolveError, StateError, VoiceConnectionError},
    ui::embeds,
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &JukeboxBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    if command.data.name == "play" {
        return handle_play(ctx, &command, bot, guild_id).await;
    }

    let result = match command.data.name.as_str() {
        "pause" => bot
            .registry
            .pause(guild_id)
            .await
            .map(|_| embeds::create_success_embed("Pausado", "⏸️ Reproducción pausada")),
        "resume" => bot
            .registry
            .resume(guild_id)
            .await
            .map(|_| embeds::create_success_embed("Reanudado", "▶️ Reproducción reanudada")),
        "skip" => handle_skip(bot, guild_id, command.user.id),
        "stop" | "leave" => bot
            .registry
            .stop(guild_id)
            .await
            .map(|_| embeds::create_success_embed("Detenido", "⏹️ Cola limpiada y desconectado")),
        "queue" => handle_queue(&command, bot, guild_id),
        "nowplaying" => bot.registry.now_playing(guild_id).map(|track| {
            let looping = bot.registry.loop_enabled(guild_id).unwrap_or(false);
            embeds::create_now_playing_embed(&track, looping)
        }),
        "shuffle" => bot.registry.shuffle(guild_id).map(|len| {
            embeds::create_success_embed("Cola mezclada", &format!("🔀 {} canciones mezcladas", len))
        }),
        "remove" => handle_remove(&command, bot, guild_id),
        "loop" => bot.registry.toggle_loop(guild_id).map(|enabled| {
            if enabled {
                embeds::create_success_embed("Bucle", "🔂 Repetir canción activado")
            } else {
                embeds::create_success_embed("Bucle", "➡️ Repetición desactivada")
            }
        }),
        "volume" => handle_volume(&command, bot, guild_id),
        "join" => handle_join(ctx, &command, bot, guild_id).await,
        _ => {
            let embed = embeds::create_error_embed("Comando no reconocido", "Prueba `/play`");
            return respond(ctx, &command, embed, true).await;
        }
    };

    match result {
        Ok(embed) => respond(ctx, &command, embed, false).await,
        Err(e) => {
            warn!("/{} falló en guild {}: {}", command.data.name, guild_id, e);
            let embed = embeds::create_error_embed("No se pudo completar", &user_message(&e));
            respond(ctx, &command, embed, true).await
        }
    }
}

// Handlers específicos para cada comando

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?;

    // Verificar que el usuario esté en un canal de voz
    let Some(voice_channel_id) = user_voice_channel(ctx, guild_id, command.user.id) else {
        let embed = embeds::create_error_embed("Sin canal de voz", "Debes estar en un canal de voz");
        return respond(ctx, command, embed, true).await;
    };

    // Defer la respuesta ya que puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let embed = match bot
        .registry
        .resolve_and_enqueue(
            guild_id,
            voice_channel_id,
            command.user.id,
            command.channel_id,
            query,
        )
        .await
    {
        Ok(summary) => embeds::create_track_added_embed(&summary),
        Err(e) => {
            warn!("No se pudo agregar `{}` en guild {}: {}", query, guild_id, e);
            embeds::create_error_embed("No se pudo agregar", &user_message(&e))
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

fn handle_skip(bot: &JukeboxBot, guild_id: GuildId, voter: UserId) -> Result<CreateEmbed, PlayerError> {
    let embed = match bot.registry.skip(guild_id, voter)? {
        VoteOutcome::ThresholdReached => embeds::create_success_embed("Saltado", "⏭️ Canción saltada"),
        VoteOutcome::VoteAdded { votes, required } => embeds::create_info_embed(
            "Voto registrado",
            &format!("🗳️ Votos para saltar: **{}/{}**", votes, required),
        ),
        VoteOutcome::AlreadyVoted => {
            embeds::create_info_embed("Voto repetido", "Ya votaste para saltar esta canción")
        }
    };
    Ok(embed)
}

fn handle_queue(
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<CreateEmbed, PlayerError> {
    let page = int_option(command, "page").unwrap_or(1).max(1) as usize;

    let queue_page = bot
        .registry
        .list_queue(guild_id, page, bot.config.queue_page_size)?;
    let current = bot.registry.now_playing(guild_id).ok();
    let looping = bot.registry.loop_enabled(guild_id)?;

    Ok(embeds::create_queue_embed(
        current.as_ref(),
        looping,
        &queue_page,
    ))
}

fn handle_remove(
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<CreateEmbed, PlayerError> {
    let position = int_option(command, "position").unwrap_or(0);
    let Some(index) = queue_index(position) else {
        return Ok(embeds::create_error_embed(
            "Posición inválida",
            "Las posiciones empiezan en 1 (ver `/queue`)",
        ));
    };

    let removed = bot.registry.remove_at(guild_id, index)?;
    Ok(embeds::create_success_embed(
        "Canción quitada",
        &format!("🗑️ **{}** fue quitada de la cola", removed.title()),
    ))
}

fn handle_volume(
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<CreateEmbed, PlayerError> {
    let volume = match int_option(command, "level") {
        Some(level) => bot.registry.set_volume(guild_id, level)?,
        None => bot.registry.volume(guild_id)?,
    };
    Ok(embeds::create_volume_embed(volume))
}

async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<CreateEmbed, PlayerError> {
    // Canal indicado en el comando, o el del usuario
    let target = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "channel")
        .and_then(|opt| opt.value.as_channel_id())
        .or_else(|| user_voice_channel(ctx, guild_id, command.user.id));

    let Some(channel_id) = target else {
        return Ok(embeds::create_error_embed(
            "Sin canal de voz",
            "Debes estar en un canal de voz",
        ));
    };

    bot.registry.join(guild_id, channel_id).await?;
    Ok(embeds::create_success_embed(
        "Conectado",
        &format!("🔊 Conectado a <#{}>", channel_id),
    ))
}

// Funciones auxiliares

async fn respond(
    ctx: &Context,
    command: &CommandInteraction,
    embed: CreateEmbed,
    ephemeral: bool,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;
    Ok(())
}

fn int_option(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

/// Posición 1-based mostrada al usuario → índice 0-based de la cola.
fn queue_index(position: i64) -> Option<usize> {
    usize::try_from(position).ok()?.checked_sub(1)
}

fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

/// Texto para el usuario según el tipo de error.
fn user_message(err: &PlayerError) -> String {
    match err {
        PlayerError::Resolve(ResolveError::NoMatch { query }) => {
            format!("No encontré nada para `{}`", query)
        }
        PlayerError::Resolve(ResolveError::Metadata { .. }) => {
            "No pude leer el título o el artista de ese enlace".to_string()
        }
        PlayerError::Resolve(ResolveError::MissingStream { .. }) => {
            "Encontré la canción pero no un stream reproducible".to_string()
        }
        PlayerError::Resolve(ResolveError::Provider { .. }) => {
            "El proveedor de búsqueda falló, intenta de nuevo".to_string()
        }
        PlayerError::Index(e) => format!(
            "No existe la posición {} (la cola tiene {} canciones)",
            e.index + 1,
            e.len
        ),
        PlayerError::Range(e) => {
            format!("El volumen debe estar entre 0 y 100 (recibido {})", e.value)
        }
        PlayerError::State(StateError::NoSession) => {
            "No estoy conectado a un canal de voz en este servidor".to_string()
        }
        PlayerError::State(StateError::OtherChannel { channel }) => format!(
            "Ya estoy reproduciendo en <#{}>; usa `/join` para moverme",
            channel
        ),
        PlayerError::State(e) => e.to_string(),
        PlayerError::Voice(VoiceConnectionError::Connect(_)) => {
            "No pude conectarme a tu canal de voz".to_string()
        }
        PlayerError::Voice(e) => e.to_string(),
    }
}
