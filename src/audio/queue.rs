use rand::seq::SliceRandom;
use serenity::model::id::UserId;
use std::{collections::HashSet, collections::VecDeque, time::Duration};
use tracing::{debug, info};

use super::track::Track;
use crate::error::MusicError;

/// Política que aplica [`MusicQueue::advance`] cuando termina un track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    Off,
    Track,
    Queue,
}

/// Cola de reproducción de un servidor.
///
/// `current` nunca está a la vez en `items`, salvo que se vuelva a insertar
/// explícitamente (por ejemplo con [`MusicQueue::unshift`]). No hace I/O ni
/// bloquea; el reproductor que la posee serializa todo acceso.
#[derive(Debug, Default)]
pub struct MusicQueue {
    items: VecDeque<Track>,
    current: Option<Track>,
}

impl MusicQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega un track al final de la cola
    pub fn add(&mut self, track: Track) {
        debug!("➕ Agregado a la cola: {}", track.title());
        self.items.push_back(track);
    }

    /// Inserta un track en una posición (`index == len` equivale a `add`)
    pub fn insert_at(&mut self, index: usize, track: Track) -> Result<(), MusicError> {
        if index > self.items.len() {
            return Err(MusicError::index_out_of_range(index, self.items.len()));
        }

        debug!("📍 Track insertado en posición {}: {}", index, track.title());
        self.items.insert(index, track);
        Ok(())
    }

    /// Elimina un track específico
    pub fn remove_at(&mut self, index: usize) -> Result<Track, MusicError> {
        let len = self.items.len();
        let removed = self
            .items
            .remove(index)
            .ok_or_else(|| MusicError::index_out_of_range(index, len))?;

        debug!("❌ Track eliminado en posición {}", index);
        Ok(removed)
    }

    /// Mueve un track a una nueva posición
    pub fn move_track(&mut self, from: usize, to: usize) -> Result<(), MusicError> {
        let len = self.items.len();
        if from >= len {
            return Err(MusicError::index_out_of_range(from, len));
        }
        if to >= len {
            return Err(MusicError::index_out_of_range(to, len));
        }

        if from != to {
            if let Some(track) = self.items.remove(from) {
                self.items.insert(to, track);
            }
            debug!("📍 Track movido de posición {} a {}", from, to);
        }

        Ok(())
    }

    /// Limpia la cola (no toca el track actual)
    pub fn clear(&mut self) -> usize {
        let removed = self.items.len();
        self.items.clear();
        info!("🗑️ Cola limpiada: {} tracks removidos", removed);
        removed
    }

    /// Mezcla la cola
    pub fn shuffle(&mut self) {
        if self.items.len() < 2 {
            return;
        }

        let mut rng = rand::thread_rng();
        self.items.make_contiguous().shuffle(&mut rng);
        info!("🔀 Cola mezclada");
    }

    /// Limpia duplicados, conservando la primera aparición
    pub fn dedup(&mut self) -> usize {
        let mut seen = HashSet::new();
        let original_len = self.items.len();

        self.items
            .retain(|track| seen.insert(track.dedup_key().to_owned()));

        let removed = original_len - self.items.len();
        if removed > 0 {
            info!("🗑️ Eliminados {} duplicados", removed);
        }
        removed
    }

    /// Limpia tracks de un usuario específico
    pub fn remove_by_requester(&mut self, user_id: UserId) -> usize {
        let original_len = self.items.len();
        self.items.retain(|track| track.requester_id() != user_id);

        let removed = original_len - self.items.len();
        if removed > 0 {
            info!("🗑️ Eliminadas {} canciones del usuario {}", removed, user_id);
        }
        removed
    }

    /// Inserta al principio (restaurar un track, p. ej. "anterior")
    pub fn unshift(&mut self, track: Track) {
        self.items.push_front(track);
    }

    /// Consume el track actual y produce el siguiente según el modo de loop.
    ///
    /// - `Track`: el actual se repite sin cambios.
    /// - `Queue`: el actual pasa al final y se toma el primero.
    /// - `Off`: se toma el primero; con la cola vacía el actual queda en `None`.
    pub fn advance(&mut self, loop_mode: LoopMode) -> Option<Track> {
        match (loop_mode, self.current.take()) {
            (LoopMode::Track, Some(current)) => {
                debug!("🔂 Repitiendo track: {}", current.title());
                self.current = Some(current.clone());
                return Some(current);
            }
            (LoopMode::Queue, Some(finished)) => {
                debug!("🔁 Track agregado al final por loop de cola: {}", finished.title());
                self.items.push_back(finished);
            }
            _ => {}
        }

        self.current = self.items.pop_front();
        match &self.current {
            Some(next) => debug!("➡️ Siguiente en cola: {}", next.title()),
            None => debug!("📭 Cola vacía, no hay siguiente track"),
        }
        self.current.clone()
    }

    /// Saca el track actual sin avanzar la cola
    pub fn take_current(&mut self) -> Option<Track> {
        self.current.take()
    }

    /// Vacía la cola y el track actual
    pub fn reset(&mut self) -> usize {
        self.current = None;
        let removed = self.items.len();
        self.items.clear();
        removed
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.items.iter()
    }

    /// Duración de la cola más la del track actual (los streams no suman)
    pub fn total_duration(&self) -> Duration {
        self.items
            .iter()
            .chain(self.current.iter())
            .filter_map(Track::duration)
            .sum()
    }

    /// Obtiene información de la cola
    pub fn info(&self, loop_mode: LoopMode) -> QueueInfo {
        QueueInfo {
            current: self.current.clone(),
            items: self.items.iter().cloned().collect(),
            loop_mode,
            total_duration: self.total_duration(),
        }
    }
}

/// Copia de solo lectura de la cola, para mostrarla.
#[derive(Debug, Clone)]
pub struct QueueInfo {
    pub current: Option<Track>,
    pub items: Vec<Track>,
    pub loop_mode: LoopMode,
    pub total_duration: Duration,
}

impl QueueInfo {
    pub fn total_items(&self) -> usize {
        self.items.len()
    }

    /// Obtiene una página específica de la cola (las páginas empiezan en 1)
    pub fn page(&self, page: usize, items_per_page: usize) -> QueuePage {
        let items_per_page = items_per_page.max(1);
        let total_pages = self.items.len().div_ceil(items_per_page).max(1);
        let current_page = page.clamp(1, total_pages);
        let start = (current_page - 1) * items_per_page;
        let end = (start + items_per_page).min(self.items.len());

        QueuePage {
            items: self.items[start..end].to_vec(),
            first_position: start + 1,
            current_page,
            total_pages,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueuePage {
    pub items: Vec<Track>,
    /// Posición (1-based) del primer elemento de la página
    pub first_position: usize,
    pub current_page: usize,
    pub total_pages: usize,
}
