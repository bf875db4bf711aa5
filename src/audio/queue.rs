use parking_lot::Mutex;
use rand::seq::SliceRandom;
use std::{collections::VecDeque, time::Duration};
use thiserror::Error;
use tokio::{sync::Notify, time::Instant};
use tracing::{debug, info};

use super::track::Track;
use crate::error::IndexError;

/// El plazo de espera de `pop_front` venció sin que llegara ningún track.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("no llegó ningún track antes del plazo")]
pub struct WaitTimeout;

/// Cola FIFO de tracks pendientes con `pop_front` bloqueante.
///
/// Sin límite de capacidad propio: el registro de sesiones aplica
/// `MAX_QUEUE_SIZE` si está configurado.
#[derive(Debug, Default)]
pub struct TrackQueue {
    items: Mutex<VecDeque<Track>>,
    available: Notify,
}

impl TrackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega un track al final y despierta a un consumidor en espera.
    /// Devuelve la nueva longitud de la cola.
    pub fn enqueue(&self, track: Track) -> usize {
        let len = {
            let mut items = self.items.lock();
            debug!("➕ Agregado a la cola: {}", track.title());
            items.push_back(track);
            items.len()
        };
        self.available.notify_one();
        len
    }

    /// Espera hasta `wait` a que haya un track disponible.
    pub async fn pop_front(&self, wait: Duration) -> Result<Track, WaitTimeout> {
        let deadline = Instant::now() + wait;

        loop {
            // Registrarse antes de mirar la cola para no perder un notify_one
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(track) = self.items.lock().pop_front() {
                debug!("➡️ Siguiente en cola (FIFO): {}", track.title());
                return Ok(track);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(WaitTimeout);
            }
        }
    }

    /// Elimina el track en la posición `index` (0-based).
    pub fn remove_at(&self, index: usize) -> Result<Track, IndexError> {
        let mut items = self.items.lock();
        let len = items.len();
        let removed = items.remove(index).ok_or(IndexError { index, len })?;
        debug!("❌ Track eliminado en posición {}", index);
        Ok(removed)
    }

    /// Mezcla la cola
    pub fn shuffle(&self) {
        let mut items = self.items.lock();
        if items.len() < 2 {
            return;
        }
        items.make_contiguous().shuffle(&mut rand::thread_rng());
        info!("🔀 Cola mezclada ({} canciones)", items.len());
    }

    /// Limpia la cola
    pub fn clear(&self) -> usize {
        let mut items = self.items.lock();
        let removed = items.len();
        items.clear();
        if removed > 0 {
            info!("🗑️ Cola limpiada ({} canciones)", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Copia de los tracks en `[start, end)`, recortada a la longitud actual.
    pub fn slice(&self, start: usize, end: usize) -> Vec<Track> {
        let items = self.items.lock();
        let end = end.min(items.len());
        if start >= end {
            return Vec::new();
        }
        items.range(start..end).cloned().collect()
    }

    pub fn total_duration(&self) -> Duration {
        self.items
            .lock()
            .iter()
            .filter_map(Track::duration)
            .sum()
    }

    /// Obtiene una página específica de la cola (`page` es 1-based).
    pub fn page(&self, page: usize, items_per_page: usize) -> QueuePage {
        let items_per_page = items_per_page.max(1);
        let safe_page = page.max(1);
        let start = (safe_page - 1).saturating_mul(items_per_page);

        let items = self.items.lock();
        let total_items = items.len();
        let total_pages = if total_items == 0 {
            1
        } else {
            total_items.div_ceil(items_per_page)
        };
        let end = start.saturating_add(items_per_page).min(total_items);

        QueuePage {
            items: if start < end {
                items.range(start..end).cloned().collect()
            } else {
                Vec::new()
            },
            first_index: start,
            current_page: safe_page,
            total_pages,
            total_items,
            total_duration: items.iter().filter_map(Track::duration).sum(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueuePage {
    pub items: Vec<Track>,
    /// Índice 0-based del primer elemento de la página.
    pub first_index: usize,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
    pub total_duration: Duration,
}
