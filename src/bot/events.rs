use anyhow::Result;
use serenity::{
    builder::{CreateEmbed, CreateMessage},
    http::Http,
    model::id::{ChannelId, GuildId},
};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};

use crate::{audio::session::SessionEvent, ui::embeds};

/// Publica los eventos de las sesiones en el canal de texto donde se pidió
/// la música.
pub async fn forward_session_events(
    http: Arc<Http>,
    mut events: broadcast::Receiver<SessionEvent>,
    idle_timeout: Duration,
) {
    info!("📣 Reenvío de eventos de sesión iniciado");
    let mut text_channels = HashMap::new();

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!("Se perdieron {} eventos de sesión", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let Some((channel, embed)) = notice_for(&event, &mut text_channels, idle_timeout) else {
            continue;
        };

        if let Err(e) = send_notice(&http, channel, embed).await {
            error!("Error al enviar aviso a {}: {:?}", channel, e);
        }
    }

    debug!("Canal de eventos cerrado");
}

/// Mensaje a enviar por un evento, si corresponde.
///
/// Recuerda el último canal de texto de cada guild para poder avisar del
/// cierre por inactividad, que no trae canal propio.
fn notice_for(
    event: &SessionEvent,
    text_channels: &mut HashMap<GuildId, ChannelId>,
    idle_timeout: Duration,
) -> Option<(ChannelId, CreateEmbed)> {
    match event {
        SessionEvent::NowPlaying {
            guild,
            channel,
            track,
        } => {
            text_channels.insert(*guild, *channel);
            Some((*channel, embeds::create_now_playing_embed(track, false)))
        }
        SessionEvent::PlaybackError {
            guild,
            channel,
            title,
            message,
        } => {
            text_channels.insert(*guild, *channel);
            Some((
                *channel,
                embeds::create_error_embed(
                    "Error de reproducción",
                    &format!("No se pudo reproducir **{}**: {}", title, message),
                ),
            ))
        }
        SessionEvent::IdleTimeout { guild } => text_channels
            .remove(guild)
            .map(|channel| (channel, embeds::create_idle_embed(idle_timeout))),
        SessionEvent::Stopped { guild } => {
            text_channels.remove(guild);
            None
        }
    }
}

async fn send_notice(http: &Http, channel: ChannelId, embed: CreateEmbed) -> Result<()> {
    channel
        .send_message(http, CreateMessage::new().embed(embed))
        .await?;
    Ok(())
}
