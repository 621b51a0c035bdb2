pub mod feed;
pub mod openai;
pub mod spotify;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::time::Duration;

use crate::error::{CatalogError, ClassificationError};

pub use openai::OpenAiClassifier;
pub use spotify::SpotifyClient;

/// Espera pedida por el servicio en `Retry-After` (segundos enteros)
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Servicio que decide si una canción está en español.
///
/// Devuelve la etiqueta cruda del servicio; quien llama decide qué significa.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LanguageClassifier: Send + Sync {
    async fn classify(&self, title: &str, artist: &str) -> Result<String, ClassificationError>;
}

/// Catálogo y playlists del servicio de streaming.
///
/// Las operaciones paginadas devuelven una página a la vez; el llamador
/// avanza el offset con [`Page::page_len`].
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Id del usuario autenticado
    async fn current_user_id(&self) -> Result<String, CatalogError>;

    async fn list_playlists(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Page<PlaylistSummary>, CatalogError>;

    /// Crea una playlist privada
    async fn create_playlist(
        &self,
        user_id: &str,
        name: &str,
    ) -> Result<PlaylistSummary, CatalogError>;

    async fn playlist_tracks(
        &self,
        playlist_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Page<PlaylistTrack>, CatalogError>;

    /// Búsqueda de tracks ordenada por relevancia
    async fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<TrackRef>, CatalogError>;

    /// Agrega URIs al final de la playlist (máximo 100 por llamada)
    async fn add_tracks(&self, playlist_id: &str, uris: &[String]) -> Result<(), CatalogError>;

    /// Quita ocurrencias concretas (uri + posición), máximo 100 por llamada
    async fn remove_occurrences(
        &self,
        playlist_id: &str,
        occurrences: &[PlaylistTrack],
    ) -> Result<(), CatalogError>;
}

/// Página de resultados
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Elementos crudos de la página, incluidos los descartados
    pub page_len: usize,
    pub has_next: bool,
}

/// Track del catálogo
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackRef {
    pub id: String,
    pub uri: String,
}

impl TrackRef {
    /// En Spotify la URI se deriva del id
    pub fn from_id(id: impl Into<String>) -> Self {
        let id = id.into();
        let uri = format!("spotify:track:{id}");
        Self { id, uri }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistSummary {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub url: Option<String>,
}

/// Entrada de una playlist tal como estaba al leerla
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistTrack {
    pub id: String,
    pub uri: String,
    pub position: usize,
}
