use thiserror::Error;

/// Errores del motor de música.
///
/// Cada variante corresponde a una condición que el comando que llama
/// convierte en un mensaje para el usuario. El motor nunca traga un fallo
/// del nodo de audio: siempre lo devuelve como [`MusicError::NodeUnavailable`]
/// o [`MusicError::NodeRejected`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MusicError {
    #[error("No hay nada reproduciéndose")]
    NothingPlaying,

    #[error("La reproducción ya está pausada")]
    AlreadyPaused,

    #[error("La reproducción no está pausada")]
    NotPaused,

    #[error("Valor fuera de rango: {value} (máximo {limit})")]
    OutOfRange { value: u64, limit: u64 },

    #[error("No se encontraron resultados para: {0}")]
    NoResults(String),

    #[error("El nodo de audio no está disponible: {0}")]
    NodeUnavailable(String),

    #[error("El nodo de audio rechazó el comando ({status}): {message}")]
    NodeRejected { status: u16, message: String },

    #[error("El reproductor de este servidor ya fue destruido")]
    PlayerDestroyed,

    #[error("Canal de voz inválido: {0}")]
    InvalidChannel(String),

    #[error("La cola está llena (máximo {0} canciones)")]
    QueueFull(usize),

    #[error("No hay una canción anterior")]
    NoPreviousTrack,
}

impl MusicError {
    /// Índice fuera del rango `[0, len)` (o `[0, len]` para inserciones).
    pub fn index_out_of_range(index: usize, limit: usize) -> Self {
        Self::OutOfRange {
            value: index as u64,
            limit: limit as u64,
        }
    }

    /// Errores que indican que el nodo no respondió, a diferencia de un
    /// rechazo explícito o de un error de estado del reproductor.
    pub fn is_node_failure(&self) -> bool {
        matches!(self, Self::NodeUnavailable(_) | Self::NodeRejected { .. })
    }
}
