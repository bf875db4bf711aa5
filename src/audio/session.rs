//! Per-guild playback session.
//!
//! A session owns one voice connection, one [`TrackQueue`] and a single
//! playback slot. A dedicated task runs [`PlaybackSession::run`], an explicit
//! state machine:
//!
//! ```text
//! Idle ──connect──▶ Waiting ──dequeue──▶ Playing ⇄ Paused
//!                     ▲  │                  │
//!                     │  └─idle timeout─▶ Stopped ◀── stop()
//!                     └──finished / skip ───┘ (loop replays)
//! ```
//!
//! The loop only suspends while waiting for the next track (bounded by the
//! idle timeout) and while waiting for the current track to finish. Commands
//! mutate state through short `parking_lot` critical sections that are never
//! held across an `.await`.

use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{collections::HashSet, time::Duration};
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    queue::{TrackQueue, WaitTimeout},
    track::Track,
    transport::{FinishedSignal, PlaybackOutcome, ReconnectPolicy, VoiceConnection},
};
use crate::error::{RangeError, StateError, VoiceConnectionError};

/// Parámetros de comportamiento de cada sesión.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub idle_timeout: Duration,
    pub skip_threshold: usize,
    pub default_volume: f32,
    /// `None` = cola sin límite.
    pub max_queue_size: Option<usize>,
    pub reconnect: ReconnectPolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(180),
            skip_threshold: 3,
            default_volume: 0.5,
            max_queue_size: None,
            reconnect: ReconnectPolicy::STREAMING,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// Sin conexión todavía.
    Idle,
    /// Conectado, cola vacía, esperando con plazo.
    Waiting,
    Playing,
    Paused,
    Stopped,
}

/// Resultado de un voto para saltar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    AlreadyVoted,
    VoteAdded { votes: usize, required: usize },
    ThresholdReached,
}

/// Eventos informativos publicados por las sesiones.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    NowPlaying {
        guild: GuildId,
        channel: ChannelId,
        track: Track,
    },
    PlaybackError {
        guild: GuildId,
        channel: ChannelId,
        title: String,
        message: String,
    },
    IdleTimeout {
        guild: GuildId,
    },
    Stopped {
        guild: GuildId,
    },
}

/// Cómo terminó el loop de reproducción.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    IdleTimeout,
    Stopped,
}

#[derive(Debug)]
struct SessionState {
    state: PlayerState,
    voice_channel: ChannelId,
    current: Option<Track>,
    loop_enabled: bool,
    volume: f32,
    skip_voters: HashSet<UserId>,
    skip_tx: Option<oneshot::Sender<()>>,
}

pub struct PlaybackSession<C: VoiceConnection> {
    id: u64,
    guild: GuildId,
    connection: C,
    queue: TrackQueue,
    inner: Mutex<SessionState>,
    settings: SessionSettings,
    cancel: CancellationToken,
    closed: CancellationToken,
    events: broadcast::Sender<SessionEvent>,
}

impl<C: VoiceConnection> PlaybackSession<C> {
    pub fn new(
        id: u64,
        guild: GuildId,
        voice_channel: ChannelId,
        connection: C,
        settings: SessionSettings,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            id,
            guild,
            connection,
            queue: TrackQueue::new(),
            inner: Mutex::new(SessionState {
                state: PlayerState::Idle,
                voice_channel,
                current: None,
                loop_enabled: false,
                volume: settings.default_volume.clamp(0.0, 1.0),
                skip_voters: HashSet::new(),
                skip_tx: None,
            }),
            settings,
            cancel: CancellationToken::new(),
            closed: CancellationToken::new(),
            events,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn guild(&self) -> GuildId {
        self.guild
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn queue(&self) -> &TrackQueue {
        &self.queue
    }

    pub fn state(&self) -> PlayerState {
        self.inner.lock().state
    }

    pub fn is_closed(&self) -> bool {
        self.state() == PlayerState::Stopped
    }

    /// Se completa cuando el cierre terminó, desconexión incluida.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    pub fn voice_channel(&self) -> ChannelId {
        self.inner.lock().voice_channel
    }

    /// Mueve la conexión a `channel` si todavía no está ahí.
    pub async fn move_to(&self, channel: ChannelId) -> Result<(), VoiceConnectionError> {
        if self.voice_channel() == channel {
            return Ok(());
        }
        self.connection.move_to(channel).await?;
        self.inner.lock().voice_channel = channel;
        Ok(())
    }

    pub fn current(&self) -> Option<Track> {
        self.inner.lock().current.clone()
    }

    pub fn volume(&self) -> f32 {
        self.inner.lock().volume
    }

    pub fn loop_enabled(&self) -> bool {
        self.inner.lock().loop_enabled
    }

    pub fn skip_votes(&self) -> usize {
        self.inner.lock().skip_voters.len()
    }

    /// Encola un track. Falla si la sesión ya fue cerrada.
    ///
    /// El chequeo de estado y el push ocurren bajo el mismo lock que usa el
    /// cierre, así que un track nunca entra en la cola de una sesión muerta.
    pub fn enqueue(&self, track: Track) -> Result<usize, StateError> {
        let inner = self.inner.lock();
        if inner.state == PlayerState::Stopped {
            return Err(StateError::SessionClosed);
        }
        if let Some(max) = self.settings.max_queue_size {
            if self.queue.len() >= max {
                return Err(StateError::QueueFull { max });
            }
        }
        Ok(self.queue.enqueue(track))
    }

    /// Registra el voto de `voter` para saltar el track actual.
    ///
    /// El conteo, el reinicio de votos y la toma de `skip_tx` ocurren en la
    /// misma sección crítica: llegar al umbral salta el track una sola vez.
    pub fn vote_skip(&self, voter: UserId) -> Result<VoteOutcome, StateError> {
        let required = self.settings.skip_threshold.max(1);
        let skip_tx = {
            let mut inner = self.inner.lock();
            let requester = match (&inner.state, &inner.current, &inner.skip_tx) {
                (PlayerState::Playing | PlayerState::Paused, Some(track), Some(_)) => {
                    track.requester()
                }
                _ => return Err(StateError::NothingPlaying),
            };

            // El solicitante salta sin pasar por el umbral
            if voter != requester {
                if !inner.skip_voters.insert(voter) {
                    debug!("Voto repetido de {} en guild {}", voter, self.guild);
                    return Ok(VoteOutcome::AlreadyVoted);
                }
                let votes = inner.skip_voters.len();
                if votes < required {
                    info!("🗳️ Voto para saltar {}/{} en guild {}", votes, required, self.guild);
                    return Ok(VoteOutcome::VoteAdded { votes, required });
                }
            }

            match Self::take_skip(&mut inner) {
                Some(tx) => tx,
                None => return Err(StateError::NothingPlaying),
            }
        };

        self.finish_skip(skip_tx);
        Ok(VoteOutcome::ThresholdReached)
    }

    /// Salta el track actual. Devuelve `false` si no había nada sonando o
    /// si el track ya estaba siendo saltado.
    ///
    /// Se trata igual que un final natural: con loop activo el mismo track
    /// vuelve a sonar.
    pub fn skip(&self) -> bool {
        let skip_tx = {
            let mut inner = self.inner.lock();
            Self::take_skip(&mut inner)
        };

        match skip_tx {
            Some(tx) => {
                self.finish_skip(tx);
                true
            }
            None => false,
        }
    }

    /// Reinicia los votos y toma el canal de salto del track actual.
    fn take_skip(inner: &mut SessionState) -> Option<oneshot::Sender<()>> {
        if !matches!(inner.state, PlayerState::Playing | PlayerState::Paused) {
            return None;
        }
        inner.skip_voters.clear();
        inner.skip_tx.take()
    }

    fn finish_skip(&self, skip_tx: oneshot::Sender<()>) {
        self.connection.stop();
        let _ = skip_tx.send(());
        info!("⏭️ Track saltado en guild {}", self.guild);
    }

    pub async fn pause(&self) -> Result<(), PauseError> {
        // El track pudo terminar en el transporte antes de que el loop lo note
        if self.state() != PlayerState::Playing || !self.connection.is_playing().await {
            return Err(StateError::NothingPlaying.into());
        }

        let mut inner = self.inner.lock();
        if inner.state != PlayerState::Playing {
            return Err(StateError::NothingPlaying.into());
        }
        self.connection.pause()?;
        inner.state = PlayerState::Paused;
        info!("⏸️ Reproducción pausada en guild {}", self.guild);
        Ok(())
    }

    pub async fn resume(&self) -> Result<(), PauseError> {
        if self.state() != PlayerState::Paused || !self.connection.is_paused().await {
            return Err(StateError::NotPaused.into());
        }

        let mut inner = self.inner.lock();
        if inner.state != PlayerState::Paused {
            return Err(StateError::NotPaused.into());
        }
        self.connection.resume()?;
        inner.state = PlayerState::Playing;
        info!("▶️ Reproducción reanudada en guild {}", self.guild);
        Ok(())
    }

    /// Ajusta el volumen a partir de un porcentaje 0–100.
    pub fn set_volume(&self, percent: i64) -> Result<f32, RangeError> {
        if !(0..=100).contains(&percent) {
            return Err(RangeError { value: percent });
        }
        let volume = percent as f32 / 100.0;

        let mut inner = self.inner.lock();
        inner.volume = volume;
        if matches!(inner.state, PlayerState::Playing | PlayerState::Paused) {
            if let Err(e) = self.connection.set_volume(volume) {
                warn!("No se pudo aplicar el volumen al track actual: {}", e);
            }
        }
        info!("🔊 Volumen ajustado a {}% en guild {}", percent, self.guild);
        Ok(volume)
    }

    /// Alterna la repetición del track actual y devuelve el nuevo valor.
    pub fn toggle_loop(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.loop_enabled = !inner.loop_enabled;
        if inner.loop_enabled {
            info!("🔂 Repetir canción activado en guild {}", self.guild);
        } else {
            info!("➡️ Repetición desactivada en guild {}", self.guild);
        }
        inner.loop_enabled
    }

    /// Detiene la sesión: limpia la cola, corta el loop y desconecta.
    pub async fn stop(&self) {
        if self.teardown().await {
            info!("⏹️ Sesión detenida en guild {}", self.guild);
            let _ = self.events.send(SessionEvent::Stopped { guild: self.guild });
        }
    }

    /// Loop de reproducción; corre en su propia tarea hasta el cierre.
    pub async fn run(&self) -> LoopExit {
        info!("🎵 Loop de reproducción iniciado en guild {}", self.guild);

        loop {
            let track = match self.replay_candidate() {
                Some(track) => {
                    info!("🔂 Repitiendo track: {}", track.title());
                    track
                }
                None => {
                    if !self.enter_waiting() {
                        return LoopExit::Stopped;
                    }
                    tokio::select! {
                        _ = self.cancel.cancelled() => return LoopExit::Stopped,
                        popped = self.queue.pop_front(self.settings.idle_timeout) => match popped {
                            Ok(track) => track,
                            Err(WaitTimeout) => {
                                if self.teardown().await {
                                    info!("💤 Sin actividad en {:?}, cerrando sesión de guild {}",
                                        self.settings.idle_timeout, self.guild);
                                    let _ = self.events.send(SessionEvent::IdleTimeout { guild: self.guild });
                                }
                                return LoopExit::IdleTimeout;
                            }
                        },
                    }
                }
            };

            let (signal, finished) = FinishedSignal::channel();
            let (skip_tx, skipped) = oneshot::channel();
            let Some(volume) = self.enter_playing(track.clone(), skip_tx) else {
                return LoopExit::Stopped;
            };

            let started = tokio::select! {
                _ = self.cancel.cancelled() => return LoopExit::Stopped,
                started = self.start_transport(&track, volume, signal) => started,
            };
            if let Err(e) = started {
                self.fail_track(&track, e);
                continue;
            }

            info!("🎵 Reproduciendo: {}", track.title());
            let _ = self.events.send(SessionEvent::NowPlaying {
                guild: self.guild,
                channel: track.source_channel(),
                track: track.clone(),
            });

            let outcome: PlaybackOutcome = tokio::select! {
                _ = self.cancel.cancelled() => return LoopExit::Stopped,
                _ = skipped => Ok(()),
                // Si el transporte suelta la señal sin dispararla, lo tratamos como fin
                outcome = finished => outcome.unwrap_or(Ok(())),
            };

            match outcome {
                Ok(()) => self.finish_track(),
                Err(e) => self.fail_track(&track, e),
            }
        }
    }

    async fn start_transport(
        &self,
        track: &Track,
        volume: f32,
        signal: FinishedSignal,
    ) -> Result<(), VoiceConnectionError> {
        let stream = self
            .connection
            .open_stream(track.stream_url(), &self.settings.reconnect)
            .await?;
        self.connection.play(stream, volume, signal).await
    }

    fn replay_candidate(&self) -> Option<Track> {
        let inner = self.inner.lock();
        if inner.loop_enabled && inner.state != PlayerState::Stopped {
            inner.current.clone()
        } else {
            None
        }
    }

    fn enter_waiting(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == PlayerState::Stopped {
            return false;
        }
        inner.state = PlayerState::Waiting;
        inner.current = None;
        inner.skip_tx = None;
        true
    }

    /// Pasa a `Playing` con `track`; devuelve el volumen a aplicar.
    fn enter_playing(&self, track: Track, skip_tx: oneshot::Sender<()>) -> Option<f32> {
        let mut inner = self.inner.lock();
        if inner.state == PlayerState::Stopped {
            return None;
        }
        inner.skip_voters.clear();
        inner.current = Some(track);
        inner.skip_tx = Some(skip_tx);
        inner.state = PlayerState::Playing;
        Some(inner.volume)
    }

    fn finish_track(&self) {
        let mut inner = self.inner.lock();
        inner.skip_tx = None;
        if !inner.loop_enabled {
            inner.current = None;
        }
    }

    fn fail_track(&self, track: &Track, err: VoiceConnectionError) {
        error!("❌ Error reproduciendo {}: {}", track.title(), err);
        {
            let mut inner = self.inner.lock();
            inner.current = None;
            inner.skip_tx = None;
        }
        let _ = self.events.send(SessionEvent::PlaybackError {
            guild: self.guild,
            channel: track.source_channel(),
            title: track.title().to_string(),
            message: err.to_string(),
        });
    }

    /// Devuelve `true` solo para la llamada que efectivamente cerró la sesión.
    async fn teardown(&self) -> bool {
        {
            let mut inner = self.inner.lock();
            if inner.state == PlayerState::Stopped {
                return false;
            }
            inner.state = PlayerState::Stopped;
            inner.current = None;
            inner.skip_voters.clear();
            inner.skip_tx = None;
        }

        self.cancel.cancel();
        self.queue.clear();
        self.connection.stop();
        self.connection.disconnect().await;
        self.closed.cancel();
        true
    }
}

/// Error de pausa/reanudación: estado inválido o fallo del transporte.
#[derive(Debug, thiserror::Error)]
pub enum PauseError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Voice(#[from] VoiceConnectionError),
}
