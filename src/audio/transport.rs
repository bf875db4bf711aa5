//! Seam between the playback session and whatever actually moves audio.
//!
//! The session only talks to [`VoiceConnection`]; the production
//! implementation lives in [`super::voice`] and drives songbird.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tokio::sync::oneshot;

use crate::error::VoiceConnectionError;

/// Política de reconexión fijada al abrir cada stream.
///
/// Cada transporte aplica lo que su backend soporte; el de songbird solo
/// usa `reconnect` y `max_delay` (ver [`super::voice`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub reconnect: bool,
    pub reconnect_streamed: bool,
    pub max_retries: u32,
    pub max_delay: Duration,
}

impl ReconnectPolicy {
    /// Reconexión automática, reintentos limitados, espera máxima de 5 s.
    pub const STREAMING: Self = Self {
        reconnect: true,
        reconnect_streamed: true,
        max_retries: 3,
        max_delay: Duration::from_secs(5),
    };
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::STREAMING
    }
}

/// Resultado reportado por el transporte cuando un track termina.
pub type PlaybackOutcome = Result<(), VoiceConnectionError>;

/// Señal de "track terminado" de un solo uso.
///
/// Se puede clonar para registrarla en varios eventos del transporte (fin y
/// error); solo el primer `finish` llega a la sesión.
#[derive(Debug, Clone)]
pub struct FinishedSignal {
    tx: Arc<Mutex<Option<oneshot::Sender<PlaybackOutcome>>>>,
}

impl FinishedSignal {
    pub fn channel() -> (Self, oneshot::Receiver<PlaybackOutcome>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Devuelve `false` si la señal ya se había disparado.
    pub fn finish(&self, outcome: PlaybackOutcome) -> bool {
        match self.tx.lock().take() {
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }
}

/// Conexión de voz activa, propiedad exclusiva de una sesión.
#[async_trait]
pub trait VoiceConnection: Send + Sync + 'static {
    type Stream: Send + 'static;

    async fn move_to(&self, channel: ChannelId) -> Result<(), VoiceConnectionError>;

    async fn open_stream(
        &self,
        url: &str,
        policy: &ReconnectPolicy,
    ) -> Result<Self::Stream, VoiceConnectionError>;

    /// Empieza a reproducir `stream`; `on_finished` se dispara al terminar.
    async fn play(
        &self,
        stream: Self::Stream,
        volume: f32,
        on_finished: FinishedSignal,
    ) -> Result<(), VoiceConnectionError>;

    fn stop(&self);

    fn pause(&self) -> Result<(), VoiceConnectionError>;

    fn resume(&self) -> Result<(), VoiceConnectionError>;

    async fn is_playing(&self) -> bool;

    async fn is_paused(&self) -> bool;

    fn set_volume(&self, volume: f32) -> Result<(), VoiceConnectionError>;

    async fn disconnect(&self);
}

/// Abre conexiones de voz para un servidor.
#[async_trait]
pub trait VoiceConnector: Send + Sync + 'static {
    type Connection: VoiceConnection;

    async fn connect(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> Result<Self::Connection, VoiceConnectionError>;
}
