//! # Bot Module
//!
//! Discord front end for the session registry.
//!
//! [`JukeboxBot`] implements Serenity's [`EventHandler`]: it registers the
//! slash commands on `ready`, dispatches interactions to [`handlers`] and
//! closes a guild's session when the bot is disconnected from voice by
//! someone else. Playback notices are posted by [`events`].

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{error, info, warn};

pub mod commands;
pub mod events;
pub mod handlers;

use crate::{
    audio::{registry::SessionRegistry, voice::SongbirdConnector},
    config::Config,
};

/// Registro de sesiones respaldado por songbird.
pub type Registry = SessionRegistry<SongbirdConnector>;

pub struct JukeboxBot {
    /// Configuración cargada del entorno
    pub config: Arc<Config>,
    /// Sesiones de reproducción por guild
    pub registry: Arc<Registry>,
    events_started: AtomicBool,
}

impl JukeboxBot {
    pub fn new(config: Arc<Config>, registry: Arc<Registry>) -> Self {
        Self {
            config,
            registry,
            events_started: AtomicBool::new(false),
        }
    }

    /// Registra los comandos slash en la guild de desarrollo o globalmente.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

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
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        // `ready` se repite en cada reconexión del gateway
        if !self.events_started.swap(true, Ordering::SeqCst) {
            tokio::spawn(events::forward_session_events(
                ctx.http.clone(),
                self.registry.subscribe(),
                self.config.idle_timeout(),
            ));
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Cierra la sesión cuando alguien desconecta al bot del canal de voz.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        let Some(guild_id) = new.guild_id else {
            return;
        };

        if !self.registry.has_session(guild_id) {
            return;
        }

        info!("🔌 Bot desconectado en guild {}", guild_id);
        if let Err(e) = self.registry.stop(guild_id).await {
            error!("Error al detener reproducción: {:?}", e);
        }
    }
}
