use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{str::FromStr, time::Duration};

use crate::audio::{session::SessionSettings, transport::ReconnectPolicy};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub default_volume: f32,
    pub idle_timeout_secs: u64,
    pub skip_vote_threshold: usize,
    pub max_queue_size: usize, // 0 = sin límite

    // Búsqueda
    pub search_candidates: usize,
    pub queue_page_size: usize,
    pub http_timeout_secs: u64,

    // Herramientas externas
    pub ytdlp_path: String,
    pub ffprobe_path: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Construye la configuración leyendo cada clave con `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            // Discord
            discord_token: lookup("DISCORD_TOKEN").context("DISCORD_TOKEN no está definido")?,
            application_id: lookup("APPLICATION_ID")
                .context("APPLICATION_ID no está definido")?
                .parse()
                .context("APPLICATION_ID inválido")?,
            guild_id: lookup("GUILD_ID").and_then(|s| s.parse().ok()),

            // Audio
            default_volume: parse_or(&lookup, "DEFAULT_VOLUME", defaults.default_volume)?,
            idle_timeout_secs: parse_or(&lookup, "IDLE_TIMEOUT_SECS", defaults.idle_timeout_secs)?,
            skip_vote_threshold: parse_or(
                &lookup,
                "SKIP_VOTE_THRESHOLD",
                defaults.skip_vote_threshold,
            )?,
            max_queue_size: parse_or(&lookup, "MAX_QUEUE_SIZE", defaults.max_queue_size)?,

            // Búsqueda
            search_candidates: parse_or(&lookup, "SEARCH_CANDIDATES", defaults.search_candidates)?,
            queue_page_size: parse_or(&lookup, "QUEUE_PAGE_SIZE", defaults.queue_page_size)?,
            http_timeout_secs: parse_or(&lookup, "HTTP_TIMEOUT_SECS", defaults.http_timeout_secs)?,

            // Herramientas externas
            ytdlp_path: lookup("YTDLP_PATH").unwrap_or(defaults.ytdlp_path),
            ffprobe_path: lookup("FFPROBE_PATH").unwrap_or(defaults.ffprobe_path),
        })
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0.0 and 1.0
    /// - Idle timeout, vote threshold, candidate count and page size must be > 0
    /// - HTTP timeout must be > 0
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.default_volume) {
            anyhow::bail!(
                "Default volume must be between 0.0 and 1.0, got: {}",
                self.default_volume
            );
        }

        if self.idle_timeout_secs == 0 {
            anyhow::bail!("Idle timeout must be greater than 0");
        }

        if self.skip_vote_threshold == 0 {
            anyhow::bail!("Skip vote threshold must be greater than 0");
        }

        if self.search_candidates == 0 {
            anyhow::bail!("Search candidates must be greater than 0");
        }

        if self.queue_page_size == 0 {
            anyhow::bail!("Queue page size must be greater than 0");
        }

        if self.http_timeout_secs == 0 {
            anyhow::bail!("HTTP timeout must be greater than 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The Discord token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: {}% vol, {} idle, {} votes to skip, queue {}\n  \
            Search: {} candidates, {} per page, {} HTTP timeout\n  \
            Tools: {} / {}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0).round() as u32,
            humantime::format_duration(self.idle_timeout()),
            self.skip_vote_threshold,
            self.max_queue().map_or("sin límite".to_string(), |max| max.to_string()),
            self.search_candidates,
            self.queue_page_size,
            humantime::format_duration(self.http_timeout()),
            self.ytdlp_path,
            self.ffprobe_path,
        )
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn max_queue(&self) -> Option<usize> {
        (self.max_queue_size > 0).then_some(self.max_queue_size)
    }

    /// Parámetros que reciben las sesiones de reproducción.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            idle_timeout: self.idle_timeout(),
            skip_threshold: self.skip_vote_threshold,
            default_volume: self.default_volume,
            max_queue_size: self.max_queue(),
            reconnect: ReconnectPolicy::STREAMING,
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .with_context(|| format!("{key} inválido: `{value}`")),
        _ => Ok(default),
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            // Audio defaults
            default_volume: 0.5,
            idle_timeout_secs: 180, // 3 minutos
            skip_vote_threshold: 3,
            max_queue_size: 0,

            // Search defaults
            search_candidates: 5,
            queue_page_size: 10,
            http_timeout_secs: 15,

            // Tool defaults
            ytdlp_path: "yt-dlp".to_string(),
            ffprobe_path: "ffprobe".to_string(),
        }
    }
}
