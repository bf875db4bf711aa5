//! Registry of live playback sessions, one per guild.
//!
//! Every front-end operation goes through [`SessionRegistry`]. It owns the
//! session lifecycle: it connects and spawns the playback loop on the first
//! request and drops the session again when the loop exits (idle timeout or
//! explicit stop). Removal is keyed by session id, so a stale loop can never
//! evict the session that replaced it.

use dashmap::DashMap;
use futures::future::join_all;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use super::{
    queue::QueuePage,
    session::{PauseError, PlaybackSession, SessionEvent, SessionSettings, VoteOutcome},
    track::{Track, TrackSummary},
    transport::VoiceConnector,
};
use crate::{
    error::{PlayerError, StateError},
    sources::SourceResolver,
};

const EVENT_CAPACITY: usize = 64;

type Session<V> = PlaybackSession<<V as VoiceConnector>::Connection>;

/// Qué hacer cuando la sesión ya está en otro canal de voz.
#[derive(Debug, Clone, Copy)]
enum ChannelPolicy {
    Move,
    Reject,
}

pub struct SessionRegistry<V: VoiceConnector> {
    connector: V,
    resolver: Arc<SourceResolver>,
    settings: SessionSettings,
    sessions: Arc<DashMap<GuildId, Arc<Session<V>>>>,
    // Un lock por guild para no abrir dos llamadas a la vez
    creating: DashMap<GuildId, Arc<Mutex<()>>>,
    next_id: AtomicU64,
    events: broadcast::Sender<SessionEvent>,
}

impl<V: VoiceConnector> SessionRegistry<V> {
    pub fn new(connector: V, resolver: Arc<SourceResolver>, settings: SessionSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            connector,
            resolver,
            settings,
            sessions: Arc::new(DashMap::new()),
            creating: DashMap::new(),
            next_id: AtomicU64::new(1),
            events,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Eventos informativos de todas las sesiones.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn has_session(&self, guild: GuildId) -> bool {
        self.live_session(guild).is_some()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.iter().filter(|s| !s.is_closed()).count()
    }

    /// Resuelve la petición y la encola en la sesión del guild, creándola
    /// (o moviéndola al canal del usuario) si hace falta.
    pub async fn resolve_and_enqueue(
        &self,
        guild: GuildId,
        voice_channel: ChannelId,
        requester: UserId,
        source_channel: ChannelId,
        request: &str,
    ) -> Result<TrackSummary, PlayerError> {
        let session = self
            .ensure_session(guild, voice_channel, ChannelPolicy::Reject)
            .await?;

        let track = self
            .resolver
            .resolve(request, requester, source_channel)
            .await?;

        // La sesión pudo cerrarse mientras se resolvía
        match self.live_session(guild) {
            Some(live) if live.id() == session.id() => {}
            _ => {
                warn!(
                    "La sesión de guild {} se cerró antes de encolar {}",
                    guild,
                    track.title()
                );
                return Err(StateError::SessionClosed.into());
            }
        }

        let position = session.enqueue(track.clone())?;
        info!("➕ {} agregado en posición {} (guild {})", track.title(), position, guild);
        Ok(TrackSummary::new(&track, position))
    }

    /// Conecta al canal, o mueve la sesión existente si está en otro.
    pub async fn join(&self, guild: GuildId, channel: ChannelId) -> Result<(), PlayerError> {
        self.ensure_session(guild, channel, ChannelPolicy::Move)
            .await
            .map(|_| ())
    }

    pub fn skip(&self, guild: GuildId, voter: UserId) -> Result<VoteOutcome, PlayerError> {
        Ok(self.session(guild)?.vote_skip(voter)?)
    }

    pub fn set_volume(&self, guild: GuildId, percent: i64) -> Result<f32, PlayerError> {
        Ok(self.session(guild)?.set_volume(percent)?)
    }

    pub fn volume(&self, guild: GuildId) -> Result<f32, PlayerError> {
        Ok(self.session(guild)?.volume())
    }

    pub fn toggle_loop(&self, guild: GuildId) -> Result<bool, PlayerError> {
        Ok(self.session(guild)?.toggle_loop())
    }

    pub fn loop_enabled(&self, guild: GuildId) -> Result<bool, PlayerError> {
        Ok(self.session(guild)?.loop_enabled())
    }

    pub fn list_queue(
        &self,
        guild: GuildId,
        page: usize,
        page_size: usize,
    ) -> Result<QueuePage, PlayerError> {
        Ok(self.session(guild)?.queue().page(page, page_size))
    }

    /// Mezcla la cola y devuelve cuántos tracks tiene.
    pub fn shuffle(&self, guild: GuildId) -> Result<usize, PlayerError> {
        let session = self.session(guild)?;
        session.queue().shuffle();
        Ok(session.queue().len())
    }

    /// Quita el track en `index` (0-based).
    pub fn remove_at(&self, guild: GuildId, index: usize) -> Result<Track, PlayerError> {
        Ok(self.session(guild)?.queue().remove_at(index)?)
    }

    pub async fn pause(&self, guild: GuildId) -> Result<(), PlayerError> {
        self.session(guild)?.pause().await.map_err(PlayerError::from)
    }

    pub async fn resume(&self, guild: GuildId) -> Result<(), PlayerError> {
        self.session(guild)?.resume().await.map_err(PlayerError::from)
    }

    pub fn now_playing(&self, guild: GuildId) -> Result<Track, PlayerError> {
        self.session(guild)?
            .current()
            .ok_or_else(|| StateError::NothingPlaying.into())
    }

    pub async fn stop(&self, guild: GuildId) -> Result<(), PlayerError> {
        let session = self.session(guild)?;
        session.stop().await;
        self.forget(&session);
        Ok(())
    }

    /// Detiene todas las sesiones (apagado del bot).
    pub async fn shutdown_all(&self) {
        let sessions: Vec<_> = self.sessions.iter().map(|s| s.value().clone()).collect();
        if sessions.is_empty() {
            return;
        }

        info!("🛑 Cerrando {} sesiones", sessions.len());
        join_all(sessions.iter().map(|s| s.stop())).await;
        for session in &sessions {
            self.forget(session);
        }
    }

    fn session(&self, guild: GuildId) -> Result<Arc<Session<V>>, StateError> {
        self.live_session(guild).ok_or(StateError::NoSession)
    }

    fn live_session(&self, guild: GuildId) -> Option<Arc<Session<V>>> {
        self.sessions
            .get(&guild)
            .map(|s| s.value().clone())
            .filter(|s| !s.is_closed())
    }

    fn forget(&self, session: &Session<V>) {
        let id = session.id();
        if self
            .sessions
            .remove_if(&session.guild(), |_, s| s.id() == id)
            .is_some()
        {
            debug!("Sesión {} quitada del registro (guild {})", id, session.guild());
        }
    }

    async fn ensure_session(
        &self,
        guild: GuildId,
        channel: ChannelId,
        policy: ChannelPolicy,
    ) -> Result<Arc<Session<V>>, PlayerError> {
        if let Some(session) = self.live_session(guild) {
            return Self::place(session, channel, policy).await;
        }

        let lock = self.creating.entry(guild).or_default().clone();
        let _guard = lock.lock().await;

        // Otro comando pudo crearla mientras esperábamos el lock
        if let Some(session) = self.live_session(guild) {
            return Self::place(session, channel, policy).await;
        }

        // Una sesión cerrándose todavía tiene la llamada abierta
        let closing = self.sessions.get(&guild).map(|s| s.value().clone());
        if let Some(closing) = closing {
            closing.closed().await;
            self.forget(&closing);
        }

        let connection = self.connector.connect(guild, channel).await?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let session = Arc::new(PlaybackSession::new(
            id,
            guild,
            channel,
            connection,
            self.settings.clone(),
            self.events.clone(),
        ));
        self.sessions.insert(guild, session.clone());
        self.spawn_loop(session.clone());

        info!("🆕 Sesión {} creada en guild {}", id, guild);
        Ok(session)
    }

    async fn place(
        session: Arc<Session<V>>,
        channel: ChannelId,
        policy: ChannelPolicy,
    ) -> Result<Arc<Session<V>>, PlayerError> {
        let current = session.voice_channel();
        if current != channel {
            match policy {
                ChannelPolicy::Move => session.move_to(channel).await?,
                ChannelPolicy::Reject => {
                    debug!(
                        "Pedido desde {} rechazado: la sesión de guild {} está en {}",
                        channel,
                        session.guild(),
                        current
                    );
                    return Err(StateError::OtherChannel { channel: current }.into());
                }
            }
        }
        Ok(session)
    }

    fn spawn_loop(&self, session: Arc<Session<V>>) {
        let sessions = self.sessions.clone();
        tokio::spawn(async move {
            let exit = session.run().await;
            // No soltar el guild hasta que la llamada esté cerrada
            session.closed().await;
            let id = session.id();
            sessions.remove_if(&session.guild(), |_, s| s.id() == id);
            info!("Loop de guild {} terminado: {:?}", session.guild(), exit);
        });
    }
}

impl From<PauseError> for PlayerError {
    fn from(err: PauseError) -> Self {
        match err {
            PauseError::State(e) => e.into(),
            PauseError::Voice(e) => e.into(),
        }
    }
}
