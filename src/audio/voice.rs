use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{HttpRequest, Input},
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::transport::{FinishedSignal, ReconnectPolicy, VoiceConnection, VoiceConnector};
use crate::error::VoiceConnectionError;

/// Abre llamadas de voz a través del manager de songbird.
pub struct SongbirdConnector {
    manager: Arc<Songbird>,
}

impl SongbirdConnector {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl VoiceConnector for SongbirdConnector {
    type Connection = SongbirdConnection;

    async fn connect(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> Result<SongbirdConnection, VoiceConnectionError> {
        let call = self.manager.join(guild, channel).await.map_err(|e| {
            error!("Error al obtener handler de voz: {:?}", e);
            VoiceConnectionError::Connect(e.to_string())
        })?;

        info!("🔊 Conectado al canal de voz {} en guild {}", channel, guild);

        Ok(SongbirdConnection {
            manager: self.manager.clone(),
            guild,
            call,
            current: Mutex::new(None),
        })
    }
}

/// Llamada de voz de un servidor más el track que suena en ella.
pub struct SongbirdConnection {
    manager: Arc<Songbird>,
    guild: GuildId,
    call: Arc<tokio::sync::Mutex<Call>>,
    current: Mutex<Option<TrackHandle>>,
}

impl SongbirdConnection {
    fn current(&self) -> Option<TrackHandle> {
        self.current.lock().clone()
    }

    async fn play_mode(&self) -> Option<PlayMode> {
        let handle = self.current()?;
        handle.get_info().await.ok().map(|info| info.playing)
    }
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    type Stream = Input;

    async fn move_to(&self, channel: ChannelId) -> Result<(), VoiceConnectionError> {
        self.manager
            .join(self.guild, channel)
            .await
            .map_err(|e| VoiceConnectionError::Connect(e.to_string()))?;
        info!("🔀 Movido al canal de voz {} en guild {}", channel, self.guild);
        Ok(())
    }

    async fn open_stream(
        &self,
        url: &str,
        policy: &ReconnectPolicy,
    ) -> Result<Input, VoiceConnectionError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = connect_timeout(policy) {
            builder = builder.connect_timeout(timeout);
        }
        let client = builder.build().map_err(|e| VoiceConnectionError::Stream {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        debug!("🎯 Abriendo stream {} ({:?})", url, policy);
        Ok(Input::from(HttpRequest::new(client, url.to_string())))
    }

    async fn play(
        &self,
        stream: Input,
        volume: f32,
        on_finished: FinishedSignal,
    ) -> Result<(), VoiceConnectionError> {
        let handle = {
            let mut call = self.call.lock().await;
            call.stop();
            call.play_input(stream)
        };

        handle
            .set_volume(volume)
            .map_err(|e| VoiceConnectionError::Control(e.to_string()))?;

        handle
            .add_event(
                Event::Track(TrackEvent::End),
                TrackFinished {
                    signal: on_finished.clone(),
                },
            )
            .map_err(|e| VoiceConnectionError::Play(format!("Error al agregar event handler: {e}")))?;
        handle
            .add_event(
                Event::Track(TrackEvent::Error),
                TrackFailed {
                    signal: on_finished,
                },
            )
            .map_err(|e| VoiceConnectionError::Play(format!("Error al agregar event handler: {e}")))?;

        *self.current.lock() = Some(handle);
        Ok(())
    }

    fn stop(&self) {
        if let Some(handle) = self.current.lock().take() {
            let _ = handle.stop();
        }
    }

    fn pause(&self) -> Result<(), VoiceConnectionError> {
        let handle = self
            .current()
            .ok_or_else(|| VoiceConnectionError::Control("no hay track activo".into()))?;
        handle
            .pause()
            .map_err(|e| VoiceConnectionError::Control(e.to_string()))
    }

    fn resume(&self) -> Result<(), VoiceConnectionError> {
        let handle = self
            .current()
            .ok_or_else(|| VoiceConnectionError::Control("no hay track activo".into()))?;
        handle
            .play()
            .map_err(|e| VoiceConnectionError::Control(e.to_string()))
    }

    async fn is_playing(&self) -> bool {
        matches!(self.play_mode().await, Some(PlayMode::Play))
    }

    async fn is_paused(&self) -> bool {
        matches!(self.play_mode().await, Some(PlayMode::Pause))
    }

    fn set_volume(&self, volume: f32) -> Result<(), VoiceConnectionError> {
        match self.current() {
            Some(handle) => handle
                .set_volume(volume)
                .map_err(|e| VoiceConnectionError::Control(e.to_string())),
            None => Ok(()),
        }
    }

    async fn disconnect(&self) {
        self.stop();
        if let Err(e) = self.manager.remove(self.guild).await {
            warn!("Error al desconectar guild {}: {:?}", self.guild, e);
        } else {
            info!("👋 Desconectado del canal de voz en guild {}", self.guild);
        }
    }
}

/// Límite de conexión HTTP derivado de la política.
///
/// Es lo único de la política que songbird deja configurar: `HttpRequest`
/// reabre por su cuenta los streams cortados con peticiones por rango, así
/// que `reconnect_streamed` y `max_retries` no tienen equivalente aquí.
fn connect_timeout(policy: &ReconnectPolicy) -> Option<std::time::Duration> {
    policy.reconnect.then_some(policy.max_delay)
}

/// Handler para cuando termina una canción
struct TrackFinished {
    signal: FinishedSignal,
}

#[async_trait]
impl VoiceEventHandler for TrackFinished {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        debug!("Track terminado");
        self.signal.finish(Ok(()));
        Some(Event::Cancel)
    }
}

/// Handler para errores del driver durante la reproducción
struct TrackFailed {
    signal: FinishedSignal,
}

#[async_trait]
impl VoiceEventHandler for TrackFailed {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let reason = match ctx {
            EventContext::Track(tracks) => tracks
                .iter()
                .find_map(|(state, _)| match &state.playing {
                    PlayMode::Errored(e) => Some(format!("{e:?}")),
                    _ => None,
                })
                .unwrap_or_else(|| "error desconocido".to_string()),
            _ => "error desconocido".to_string(),
        };

        error!("❌ Error de reproducción: {}", reason);
        self.signal.finish(Err(VoiceConnectionError::Play(reason)));
        Some(Event::Cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn streaming_policy_bounds_connection_setup() {
        assert_eq!(
            connect_timeout(&ReconnectPolicy::STREAMING),
            Some(Duration::from_secs(5))
        );

        let no_reconnect = ReconnectPolicy {
            reconnect: false,
            ..ReconnectPolicy::STREAMING
        };
        assert_eq!(connect_timeout(&no_reconnect), None);
    }
}
