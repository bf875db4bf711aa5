//! Transporte en memoria para los tests de sesión y registro.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use super::transport::{
    FinishedSignal, PlaybackOutcome, ReconnectPolicy, VoiceConnection, VoiceConnector,
};
use crate::error::VoiceConnectionError;

#[derive(Debug, Default)]
pub struct FakeLog {
    played: Mutex<Vec<String>>,
    volumes: Mutex<Vec<f32>>,
    signals: Mutex<Vec<FinishedSignal>>,
    moves: Mutex<Vec<ChannelId>>,
    stops: AtomicUsize,
    connects: AtomicUsize,
    paused: AtomicBool,
    idle: AtomicBool,
    disconnected: AtomicBool,
    fail_open: AtomicBool,
    fail_connect: AtomicBool,
}

impl FakeLog {
    pub async fn wait_for_plays(&self, plays: usize) {
        for _ in 0..500 {
            if self.played.lock().len() >= plays {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!(
            "expected {plays} plays, transport saw {:?}",
            self.played.lock()
        );
    }

    pub fn finish_latest(&self, outcome: PlaybackOutcome) {
        let signal = self
            .signals
            .lock()
            .last()
            .cloned()
            .expect("nothing has been played yet");
        signal.finish(outcome);
    }

    pub fn played_urls(&self) -> Vec<String> {
        self.played.lock().clone()
    }

    pub fn last_volume(&self) -> Option<f32> {
        self.volumes.lock().last().copied()
    }

    pub fn moves(&self) -> Vec<ChannelId> {
        self.moves.lock().clone()
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// El transporte deja de sonar sin avisar todavía a la sesión.
    pub fn go_idle(&self) {
        self.idle.store(true, Ordering::SeqCst);
    }

    pub fn disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    pub fn fail_next_open(&self) {
        self.fail_open.store(true, Ordering::SeqCst);
    }

    pub fn fail_connects(&self) {
        self.fail_connect.store(true, Ordering::SeqCst);
    }
}

pub struct FakeConnection {
    log: Arc<FakeLog>,
}

impl FakeConnection {
    pub fn new(log: Arc<FakeLog>) -> Self {
        Self { log }
    }
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    type Stream = String;

    async fn move_to(&self, channel: ChannelId) -> Result<(), VoiceConnectionError> {
        self.log.moves.lock().push(channel);
        Ok(())
    }

    async fn open_stream(
        &self,
        url: &str,
        _policy: &ReconnectPolicy,
    ) -> Result<String, VoiceConnectionError> {
        if self.log.fail_open.swap(false, Ordering::SeqCst) {
            return Err(VoiceConnectionError::Stream {
                url: url.to_string(),
                reason: "404".to_string(),
            });
        }
        Ok(url.to_string())
    }

    async fn play(
        &self,
        stream: String,
        volume: f32,
        on_finished: FinishedSignal,
    ) -> Result<(), VoiceConnectionError> {
        self.log.paused.store(false, Ordering::SeqCst);
        self.log.volumes.lock().push(volume);
        self.log.signals.lock().push(on_finished);
        self.log.played.lock().push(stream);
        Ok(())
    }

    fn stop(&self) {
        self.log.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn pause(&self) -> Result<(), VoiceConnectionError> {
        self.log.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn resume(&self) -> Result<(), VoiceConnectionError> {
        self.log.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn is_playing(&self) -> bool {
        !self.log.idle.load(Ordering::SeqCst)
            && !self.log.paused()
            && !self.log.played.lock().is_empty()
    }

    async fn is_paused(&self) -> bool {
        !self.log.idle.load(Ordering::SeqCst) && self.log.paused()
    }

    fn set_volume(&self, volume: f32) -> Result<(), VoiceConnectionError> {
        self.log.volumes.lock().push(volume);
        Ok(())
    }

    async fn disconnect(&self) {
        self.log.disconnected.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeConnector {
    pub log: Arc<FakeLog>,
}

#[async_trait]
impl VoiceConnector for FakeConnector {
    type Connection = FakeConnection;

    async fn connect(
        &self,
        _guild: GuildId,
        _channel: ChannelId,
    ) -> Result<FakeConnection, VoiceConnectionError> {
        self.log.connects.fetch_add(1, Ordering::SeqCst);
        if self.log.fail_connect.load(Ordering::SeqCst) {
            return Err(VoiceConnectionError::Connect("missing permissions".into()));
        }
        Ok(FakeConnection::new(self.log.clone()))
    }
}
