//! # Cache Module
//!
//! Memoria persistente de las dos operaciones caras del pipeline:
//! la clasificación de idioma y la búsqueda del track en el catálogo.
//!
//! ## Claves
//!
//! Cada canción se identifica con un [`SongKey`] `(title, artist)` exacto y
//! sensible a mayúsculas. Los archivos antiguos usaban `title + artist`
//! concatenados sin separador, lo que hace que `"AB" + "C"` y `"A" + "BC"`
//! colisionen. Esos registros se leen igual, se guardan en una tabla
//! `legacy` y se migran a claves compuestas cuando aparece la canción
//! correspondiente en el feed (ver [`SongCache::migrate_legacy`]).
//!
//! ## Registros
//!
//! ```json
//! { "OAI_RES": "Yes", "SPOTIFY_ID": "6habFhsOp2NvshLv26DqMb" }
//! ```
//!
//! - `OAI_RES`: respuesta cruda del clasificador. Una vez escrita no se
//!   vuelve a calcular.
//! - `SPOTIFY_ID`: id del track en Spotify. Queda vacío mientras la búsqueda
//!   no encuentre nada, para reintentar en la próxima ejecución.
//!
//! La persistencia a disco vive en [`crate::storage::CacheStore`].

mod song_cache;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use song_cache::SongCache;

/// Etiqueta con la que el clasificador marca una canción en español
pub const SPANISH_LABEL: &str = "Yes";

/// Identidad compuesta de una canción en la caché.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SongKey {
    pub title: String,
    pub artist: String,
}

impl SongKey {
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
        }
    }

    /// Clave de los archivos antiguos: concatenación directa, sin separador.
    pub fn legacy_key(&self) -> String {
        format!("{}{}", self.title, self.artist)
    }
}

impl fmt::Display for SongKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.title, self.artist)
    }
}

/// Resultado memoizado para una canción
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Respuesta cruda del clasificador ("Yes", "No" u otra cosa)
    #[serde(rename = "OAI_RES", default)]
    pub classification: Option<String>,
    /// Id del track en el catálogo remoto
    #[serde(rename = "SPOTIFY_ID", default)]
    pub remote_track_id: Option<String>,
}

impl CacheRecord {
    #[cfg(test)]
    pub fn classified(label: impl Into<String>) -> Self {
        Self {
            classification: Some(label.into()),
            remote_track_id: None,
        }
    }

    #[cfg(test)]
    pub fn with_track_id(mut self, id: impl Into<String>) -> Self {
        self.remote_track_id = Some(id.into());
        self
    }

    /// Id resuelto, ignorando valores vacíos
    pub fn track_id(&self) -> Option<&str> {
        self.remote_track_id.as_deref().filter(|id| !id.is_empty())
    }

    /// Completa los campos vacíos con los de `other` sin pisar los existentes.
    fn fill_from(&mut self, other: CacheRecord) {
        let other_has_track = other.track_id().is_some();
        let CacheRecord {
            classification,
            remote_track_id,
        } = other;

        if self.classification.is_none() {
            self.classification = classification;
        }
        if self.track_id().is_none() && other_has_track {
            self.remote_track_id = remote_track_id;
        }
    }
}

/// Canción leída del feed (no se persiste)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongRecord {
    pub title: String,
    pub artist: String,
}

impl SongRecord {
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
        }
    }

    pub fn key(&self) -> SongKey {
        SongKey::new(self.title.clone(), self.artist.clone())
    }
}
