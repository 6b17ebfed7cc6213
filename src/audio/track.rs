use serenity::model::id::UserId;
use std::time::Duration;

/// Representa un track reproducible por el nodo de audio.
///
/// Es inmutable una vez construido: los resultados de búsqueda del nodo se
/// convierten en `Track` con el usuario que hizo la petición ya asignado.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    encoded: String,
    identifier: String,
    title: String,
    uri: Option<String>,
    author: Option<String>,
    length_ms: Option<u64>,
    source_name: Option<String>,
    thumbnail_url: Option<String>,
    is_stream: bool,
    is_seekable: bool,
    requester_id: UserId,
}

impl Track {
    /// `encoded` es la referencia opaca que el nodo usa para reproducir el
    /// track y para identificarlo en sus eventos.
    pub fn new(encoded: impl Into<String>, title: impl Into<String>, requester_id: UserId) -> Self {
        let encoded = encoded.into();
        Self {
            identifier: encoded.clone(),
            encoded,
            title: title.into(),
            uri: None,
            author: None,
            length_ms: None,
            source_name: None,
            thumbnail_url: None,
            is_stream: false,
            is_seekable: true,
            requester_id,
        }
    }

    // Getters
    pub fn encoded(&self) -> &str {
        &self.encoded
    }
    pub fn identifier(&self) -> &str {
        &self.identifier
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }
    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }
    pub fn length_ms(&self) -> Option<u64> {
        self.length_ms
    }
    pub fn source_name(&self) -> Option<&str> {
        self.source_name.as_deref()
    }
    pub fn thumbnail_url(&self) -> Option<&str> {
        self.thumbnail_url.as_deref()
    }
    pub fn is_stream(&self) -> bool {
        self.is_stream
    }
    pub fn is_seekable(&self) -> bool {
        self.is_seekable
    }
    pub fn requester_id(&self) -> UserId {
        self.requester_id
    }

    pub fn duration(&self) -> Option<Duration> {
        self.length_ms.map(Duration::from_millis)
    }

    /// Clave usada para detectar duplicados: la URI y, si no hay, el título.
    pub fn dedup_key(&self) -> &str {
        self.uri.as_deref().unwrap_or(&self.title)
    }

    // Setters
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_length_ms(mut self, length_ms: u64) -> Self {
        self.length_ms = Some(length_ms);
        self
    }

    pub fn with_source_name(mut self, source_name: impl Into<String>) -> Self {
        self.source_name = Some(source_name.into());
        self
    }

    pub fn with_thumbnail_url(mut self, thumbnail_url: impl Into<String>) -> Self {
        self.thumbnail_url = Some(thumbnail_url.into());
        self
    }

    /// Los streams no tienen duración conocida ni se pueden adelantar.
    pub fn as_stream(mut self) -> Self {
        self.is_stream = true;
        self.is_seekable = false;
        self.length_ms = None;
        self
    }

    pub fn with_seekable(mut self, seekable: bool) -> Self {
        self.is_seekable = seekable;
        self
    }
}
