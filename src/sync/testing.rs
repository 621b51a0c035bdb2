//! Dobles de prueba: catálogo en memoria y espera que solo registra.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::resolve::search_query;
use super::retry::WaitStrategy;
use crate::cache::SongRecord;
use crate::error::CatalogError;
use crate::sources::{CatalogClient, Page, PlaylistSummary, PlaylistTrack, TrackRef};

/// Registra las esperas pedidas sin dormir
#[derive(Default)]
pub struct RecordingWait {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingWait {
    pub fn recorded(&self) -> Vec<Duration> {
        self.waits.lock().unwrap().clone()
    }
}

#[async_trait]
impl WaitStrategy for RecordingWait {
    async fn wait(&self, duration: Duration) {
        self.waits.lock().unwrap().push(duration);
    }
}

pub struct FakePlaylist {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub tracks: Vec<String>,
}

#[derive(Default)]
pub struct FakeState {
    pub playlists: Vec<FakePlaylist>,
    /// query de búsqueda → id de track
    pub catalog: HashMap<String, String>,
    pub searches: Vec<String>,
    pub add_calls: Vec<usize>,
    pub remove_calls: Vec<usize>,
    pub created: usize,
    /// Búsquedas que fallarán con 503 antes de responder
    pub failing_searches: usize,
}

/// Catálogo en memoria con páginas pequeñas para ejercitar la paginación.
pub struct FakeCatalog {
    user_id: String,
    page_size: usize,
    state: Mutex<FakeState>,
}

impl FakeCatalog {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            page_size: 3,
            state: Mutex::new(FakeState::default()),
        }
    }

    pub fn with_playlist(self, id: &str, name: &str, owner_id: &str, tracks: &[&str]) -> Self {
        self.state().playlists.push(FakePlaylist {
            id: id.to_string(),
            name: name.to_string(),
            owner_id: owner_id.to_string(),
            tracks: tracks.iter().map(|t| t.to_string()).collect(),
        });
        self
    }

    pub fn with_track(self, title: &str, artist: &str, id: &str) -> Self {
        let query = search_query(&SongRecord::new(title, artist));
        self.state().catalog.insert(query, id.to_string());
        self
    }

    pub fn with_search_failures(self, count: usize) -> Self {
        self.state().failing_searches = count;
        self
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn tracks(&self, playlist_id: &str) -> Vec<String> {
        self.state()
            .playlists
            .iter()
            .find(|p| p.id == playlist_id)
            .map(|p| p.tracks.clone())
            .unwrap_or_default()
    }

    fn not_found() -> CatalogError {
        CatalogError::Status {
            status: 404,
            body: "playlist no existe".into(),
        }
    }
}

#[async_trait]
impl CatalogClient for FakeCatalog {
    async fn current_user_id(&self) -> Result<String, CatalogError> {
        Ok(self.user_id.clone())
    }

    async fn list_playlists(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Page<PlaylistSummary>, CatalogError> {
        let state = self.state();
        let end = (offset + limit.min(self.page_size)).min(state.playlists.len());
        let items: Vec<PlaylistSummary> = state.playlists[offset.min(end)..end]
            .iter()
            .map(|p| PlaylistSummary {
                id: p.id.clone(),
                name: p.name.clone(),
                owner_id: p.owner_id.clone(),
                url: Some(format!("https://open.spotify.com/playlist/{}", p.id)),
            })
            .collect();
        Ok(Page {
            page_len: items.len(),
            has_next: end < state.playlists.len(),
            items,
        })
    }

    async fn create_playlist(
        &self,
        user_id: &str,
        name: &str,
    ) -> Result<PlaylistSummary, CatalogError> {
        let mut state = self.state();
        state.created += 1;
        let id = format!("nueva{}", state.created);
        state.playlists.push(FakePlaylist {
            id: id.clone(),
            name: name.to_string(),
            owner_id: user_id.to_string(),
            tracks: Vec::new(),
        });
        Ok(PlaylistSummary {
            url: Some(format!("https://open.spotify.com/playlist/{id}")),
            id,
            name: name.to_string(),
            owner_id: user_id.to_string(),
        })
    }

    async fn playlist_tracks(
        &self,
        playlist_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Page<PlaylistTrack>, CatalogError> {
        let state = self.state();
        let playlist = state
            .playlists
            .iter()
            .find(|p| p.id == playlist_id)
            .ok_or_else(Self::not_found)?;
        let end = (offset + limit.min(self.page_size)).min(playlist.tracks.len());
        let items: Vec<PlaylistTrack> = playlist.tracks[offset.min(end)..end]
            .iter()
            .enumerate()
            .map(|(index, id)| PlaylistTrack {
                uri: TrackRef::from_id(id.as_str()).uri,
                id: id.clone(),
                position: offset + index,
            })
            .collect();
        Ok(Page {
            page_len: items.len(),
            has_next: end < playlist.tracks.len(),
            items,
        })
    }

    async fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<TrackRef>, CatalogError> {
        let mut state = self.state();
        state.searches.push(query.to_string());
        if state.failing_searches > 0 {
            state.failing_searches -= 1;
            return Err(CatalogError::Status {
                status: 503,
                body: "no disponible".into(),
            });
        }
        Ok(state
            .catalog
            .get(query)
            .map(|id| TrackRef::from_id(id.as_str()))
            .into_iter()
            .take(limit)
            .collect())
    }

    async fn add_tracks(&self, playlist_id: &str, uris: &[String]) -> Result<(), CatalogError> {
        assert!(uris.len() <= 100, "lote de {} URIs", uris.len());
        let mut state = self.state();
        state.add_calls.push(uris.len());
        let playlist = state
            .playlists
            .iter_mut()
            .find(|p| p.id == playlist_id)
            .ok_or_else(Self::not_found)?;
        for uri in uris {
            let id = uri.strip_prefix("spotify:track:").unwrap_or(uri);
            playlist.tracks.push(id.to_string());
        }
        Ok(())
    }

    async fn remove_occurrences(
        &self,
        playlist_id: &str,
        occurrences: &[PlaylistTrack],
    ) -> Result<(), CatalogError> {
        assert!(occurrences.len() <= 100, "lote de {} ocurrencias", occurrences.len());
        let mut state = self.state();
        state.remove_calls.push(occurrences.len());
        let playlist = state
            .playlists
            .iter_mut()
            .find(|p| p.id == playlist_id)
            .ok_or_else(Self::not_found)?;

        // Las posiciones se refieren al estado previo a la llamada
        let mut positions: Vec<&PlaylistTrack> = occurrences.iter().collect();
        positions.sort_by(|a, b| b.position.cmp(&a.position));
        for occurrence in positions {
            assert_eq!(
                playlist.tracks.get(occurrence.position),
                Some(&occurrence.id),
                "la posición {} no contiene {}",
                occurrence.position,
                occurrence.id
            );
            playlist.tracks.remove(occurrence.position);
        }
        Ok(())
    }
}
