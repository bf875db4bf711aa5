use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::audio::{
    queue::QueuePage,
    track::{format_duration, Track, TrackSummary},
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
const STANDARD_FOOTER: &str = "🎵 Jukebox";

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(track: &Track, loop_enabled: bool) -> CreateEmbed {
    let title = if loop_enabled {
        "🔂 Reproduciendo Ahora (en bucle)"
    } else {
        "🎵 Reproduciendo Ahora"
    };

    let mut embed = CreateEmbed::default()
        .title(title)
        .description(format!("**{}**", track.title()))
        .color(colors::SUCCESS_GREEN)
        .field("🎤 Artista", uploader_link(track.uploader(), track.uploader_url()), true)
        .field(
            "⏱️ Duración",
            track
                .formatted_duration()
                .unwrap_or_else(|| "🔴 En vivo".to_string()),
            true,
        )
        .field("👤 Solicitado por", format!("<@{}>", track.requester()), true)
        .field("🕒 Pedida", requested_ago(track), true);

    if let Some(thumbnail) = track.thumbnail_url() {
        embed = embed.thumbnail(thumbnail);
    }
    if let Some(url) = track.page_url() {
        embed = embed.url(url);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_track_added_embed(summary: &TrackSummary) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("✅ Canción Agregada")
        .description(format!(
            "**{}** se ha agregado a la cola de reproducción",
            summary.title
        ))
        .color(colors::SUCCESS_GREEN)
        .field("🎤 Artista", &summary.uploader, true)
        .field(
            "⏱️ Duración",
            summary.duration.as_deref().unwrap_or("🔴 En vivo"),
            true,
        )
        .field("📍 Posición", format!("#{}", summary.position), true)
        .field("👤 Solicitado por", format!("<@{}>", summary.requester), true);

    if let Some(thumbnail) = &summary.thumbnail_url {
        embed = embed.thumbnail(thumbnail);
    }
    if let Some(url) = &summary.page_url {
        embed = embed.url(url);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(
            "🎵 Se reproducirá automáticamente si no hay música sonando",
        ))
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(
    current: Option<&Track>,
    loop_enabled: bool,
    queue_page: &QueuePage,
) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if current.is_none() && queue_page.total_items == 0 {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    // Canción actual
    if let Some(current) = current {
        let status = if loop_enabled { "🔂" } else { "▶️" };
        embed = embed.field(
            format!("{} Reproduciendo", status),
            format!("**{}** - {}", current.title(), current.uploader()),
            false,
        );
    }

    // Próximas canciones
    if !queue_page.items.is_empty() {
        let description: String = queue_page
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let duration = item
                    .formatted_duration()
                    .map(|d| format!(" `[{}]`", d))
                    .unwrap_or_default();
                format!(
                    "**{}**. {} - {}{}\n",
                    queue_page.first_index + i + 1,
                    item.title(),
                    item.uploader(),
                    duration
                )
            })
            .collect();

        embed = embed.field("Próximas canciones", description, false);
    }

    // Información adicional
    let mut info = format!("**Total:** {} canciones", queue_page.total_items);
    if queue_page.total_duration > Duration::ZERO {
        info.push_str(&format!(
            " • **Duración:** {}",
            format_duration(queue_page.total_duration)
        ));
    }
    embed = embed.field("Información", info, false);

    // Paginación
    let footer = if queue_page.total_pages > 1 {
        format!(
            "Página {} de {} • Jukebox",
            queue_page.current_page, queue_page.total_pages
        )
    } else {
        STANDARD_FOOTER.to_string()
    };

    embed
        .footer(CreateEmbedFooter::new(footer))
        .timestamp(Timestamp::now())
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

/// Aviso de que la sesión se cerró por inactividad.
pub fn create_idle_embed(idle: Duration) -> CreateEmbed {
    CreateEmbed::default()
        .title("💤 Desconectado por inactividad")
        .description(format!(
            "No hubo canciones en la cola durante {}.",
            humantime::format_duration(idle)
        ))
        .color(colors::WARNING_ORANGE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar el volumen
pub fn create_volume_embed(volume: f32) -> CreateEmbed {
    let percent = (volume * 100.0).round() as u32;
    let emoji = match percent {
        0 => "🔇",
        1..=33 => "🔈",
        34..=66 => "🔉",
        _ => "🔊",
    };

    CreateEmbed::default()
        .title(format!("{} Volumen: {}%", emoji, percent))
        .description(create_volume_bar(volume))
        .color(colors::MUSIC_PURPLE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

fn create_volume_bar(volume: f32) -> String {
    let filled = (volume.clamp(0.0, 1.0) * 10.0).round() as usize;
    format!("{}{}", "▰".repeat(filled), "▱".repeat(10 - filled))
}

/// Marca de tiempo relativa de Discord para cuándo se pidió el track.
fn requested_ago(track: &Track) -> String {
    format!("<t:{}:R>", track.requested_at().timestamp())
}

fn uploader_link(uploader: &str, url: Option<&str>) -> String {
    match url {
        Some(url) => format!("[{}]({})", uploader, url),
        None => uploader.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use serenity::model::id::{ChannelId, UserId};

    fn json(embed: CreateEmbed) -> Value {
        serde_json::to_value(embed).unwrap()
    }

    fn track(title: &str, secs: u64) -> Track {
        Track::new(
            title,
            format!("https://cdn/{title}"),
            UserId::new(1),
            ChannelId::new(2),
        )
        .with_duration_secs(secs)
        .with_uploader("Artist")
    }

    #[test]
    fn volume_bar_tracks_level() {
        assert_eq!(create_volume_bar(0.0), "▱▱▱▱▱▱▱▱▱▱");
        assert_eq!(create_volume_bar(0.5), "▰▰▰▰▰▱▱▱▱▱");
        assert_eq!(create_volume_bar(1.0), "▰▰▰▰▰▰▰▰▰▰");
    }

    #[test]
    fn empty_queue_has_hint() {
        let page = QueuePage {
            items: vec![],
            first_index: 0,
            current_page: 1,
            total_pages: 1,
            total_items: 0,
            total_duration: Duration::ZERO,
        };

        let value = json(create_queue_embed(None, false, &page));

        assert!(value["description"].as_str().unwrap().contains("vacía"));
    }

    #[test]
    fn queue_positions_are_one_based_and_page_offset() {
        let page = QueuePage {
            items: vec![track("k", 60), track("l", 0)],
            first_index: 10,
            current_page: 2,
            total_pages: 2,
            total_items: 12,
            total_duration: Duration::from_secs(600),
        };
        let now = track("now", 200);

        let value = json(create_queue_embed(Some(&now), true, &page));
        let fields = value["fields"].as_array().unwrap();

        assert_eq!(fields[0]["name"], "🔂 Reproduciendo");
        let upcoming = fields[1]["value"].as_str().unwrap();
        assert!(upcoming.contains("**11**. k - Artist `[1m]`"));
        assert!(upcoming.contains("**12**. l - Artist\n"));
        assert_eq!(value["footer"]["text"], "Página 2 de 2 • Jukebox");
    }

    #[test]
    fn now_playing_links_page() {
        let track = track("song", 185)
            .with_page_url(Some("https://youtu.be/x".into()))
            .with_uploader_url(Some("https://youtube.com/@artist".into()));

        let value = json(create_now_playing_embed(&track, false));

        assert_eq!(value["url"], "https://youtu.be/x");
        assert_eq!(value["fields"][0]["value"], "[Artist](https://youtube.com/@artist)");
        assert_eq!(value["fields"][1]["value"], "3m 5s");
        assert_eq!(
            value["fields"][3]["value"],
            format!("<t:{}:R>", track.requested_at().timestamp())
        );
    }
}
