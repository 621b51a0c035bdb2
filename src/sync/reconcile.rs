use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use super::retry::{with_retry, RetryConfig, WaitStrategy};
use crate::error::CatalogError;
use crate::sources::{CatalogClient, PlaylistSummary, PlaylistTrack, TrackRef};

pub const PLAYLIST_PAGE_SIZE: usize = 50;
pub const TRACK_PAGE_SIZE: usize = 100;
/// Máximo de tracks por llamada de agregar/quitar
pub const BATCH_SIZE: usize = 100;

/// Resultado de una reconciliación
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: usize,
    pub add_calls: usize,
    pub duplicates_removed: usize,
}

/// Tracks deseados que faltan en la playlist, en orden.
///
/// Las canciones sin track resuelto se saltan, y un track ya encolado en
/// esta pasada no se encola dos veces.
pub fn compute_delta(desired: &[Option<TrackRef>], current: &[PlaylistTrack]) -> Vec<TrackRef> {
    let mut present: HashSet<&str> = current.iter().map(|t| t.id.as_str()).collect();
    desired
        .iter()
        .flatten()
        .filter(|track| present.insert(track.id.as_str()))
        .cloned()
        .collect()
}

/// Ocurrencias sobrantes: por cada id se conserva la de menor posición.
///
/// Se devuelven en orden de posición descendente, así quitar una nunca
/// desplaza a las que quedan por quitar.
pub fn duplicate_occurrences(current: &[PlaylistTrack]) -> Vec<PlaylistTrack> {
    let mut keep: HashMap<&str, usize> = HashMap::new();
    for track in current {
        keep.entry(track.id.as_str())
            .and_modify(|pos| *pos = (*pos).min(track.position))
            .or_insert(track.position);
    }

    let mut extra: Vec<PlaylistTrack> = current
        .iter()
        .filter(|track| keep.get(track.id.as_str()) != Some(&track.position))
        .cloned()
        .collect();
    extra.sort_by(|a, b| b.position.cmp(&a.position));
    extra
}

/// Reconciliación de una playlist: agrega lo que falta y quita duplicados.
///
/// La membresía se lee siempre del servicio; nunca se cachea.
pub struct PlaylistReconciler<'a, C: CatalogClient + ?Sized> {
    client: &'a C,
    retry: RetryConfig,
    wait: &'a dyn WaitStrategy,
}

impl<'a, C: CatalogClient + ?Sized> PlaylistReconciler<'a, C> {
    pub fn new(client: &'a C, retry: RetryConfig, wait: &'a dyn WaitStrategy) -> Self {
        Self {
            client,
            retry,
            wait,
        }
    }

    /// Busca la playlist del usuario por nombre exacto o la crea privada.
    pub async fn locate_or_create(&self, name: &str) -> Result<PlaylistSummary, CatalogError> {
        let client = self.client;
        let user_id = with_retry(&self.retry, self.wait, "usuario actual", move || {
            client.current_user_id()
        })
        .await?;

        let mut playlists = Vec::new();
        let mut offset = 0;
        loop {
            let page = with_retry(&self.retry, self.wait, "listar playlists", move || {
                client.list_playlists(offset, PLAYLIST_PAGE_SIZE)
            })
            .await?;
            playlists.extend(page.items);
            offset += page.page_len;
            if !page.has_next || page.page_len == 0 {
                break;
            }
        }
        info!("📋 Encontradas {} playlists", playlists.len());

        if let Some(found) = playlists
            .into_iter()
            .find(|p| p.name == name && p.owner_id == user_id)
        {
            info!(
                "✅ Playlist encontrada: {}",
                found.url.as_deref().unwrap_or(&found.id)
            );
            return Ok(found);
        }

        let user = user_id.as_str();
        let created = with_retry(&self.retry, self.wait, "crear playlist", move || {
            client.create_playlist(user, name)
        })
        .await?;
        info!(
            "🆕 Playlist creada: {}",
            created.url.as_deref().unwrap_or(&created.id)
        );
        Ok(created)
    }

    /// Lee la playlist completa, página por página.
    pub async fn fetch_membership(
        &self,
        playlist_id: &str,
    ) -> Result<Vec<PlaylistTrack>, CatalogError> {
        let client = self.client;
        let mut tracks = Vec::new();
        let mut offset = 0;
        loop {
            let page = with_retry(&self.retry, self.wait, "leer playlist", move || {
                client.playlist_tracks(playlist_id, offset, TRACK_PAGE_SIZE)
            })
            .await?;
            tracks.extend(page.items);
            offset += page.page_len;
            if !page.has_next || page.page_len == 0 {
                break;
            }
        }
        debug!("🎶 Playlist {} tiene {} tracks", playlist_id, tracks.len());
        Ok(tracks)
    }

    /// Agrega los tracks en lotes de 100; devuelve la cantidad de llamadas.
    pub async fn add_missing(
        &self,
        playlist_id: &str,
        tracks: &[TrackRef],
    ) -> Result<usize, CatalogError> {
        if tracks.is_empty() {
            info!("👌 No hay tracks nuevos para agregar");
            return Ok(0);
        }

        info!("➕ Agregando {} tracks nuevos a la playlist", tracks.len());
        let client = self.client;
        let mut calls = 0;
        for batch in tracks.chunks(BATCH_SIZE) {
            let uris: Vec<String> = batch.iter().map(|t| t.uri.clone()).collect();
            let uris = uris.as_slice();
            // Un reintento tras un éxito no visto duplica entradas; el dedup posterior las quita
            with_retry(&self.retry, self.wait, "agregar tracks", move || {
                client.add_tracks(playlist_id, uris)
            })
            .await?;
            calls += 1;
            info!("✅ Agregados {} tracks", batch.len());
        }
        Ok(calls)
    }

    /// Relee la playlist y quita las ocurrencias repetidas de cada track.
    ///
    /// Sin reintentos: repetir un borrado por posición podría quitar otra entrada.
    pub async fn remove_duplicates(&self, playlist_id: &str) -> Result<usize, CatalogError> {
        let current = self.fetch_membership(playlist_id).await?;
        let extra = duplicate_occurrences(&current);

        if extra.is_empty() {
            info!("👌 No hay duplicados en la playlist");
            return Ok(0);
        }

        let ids: HashSet<&str> = extra.iter().map(|t| t.id.as_str()).collect();
        info!(
            "🧹 Quitando {} entradas duplicadas de {} tracks",
            extra.len(),
            ids.len()
        );
        for batch in extra.chunks(BATCH_SIZE) {
            self.client.remove_occurrences(playlist_id, batch).await?;
        }
        Ok(extra.len())
    }

    /// Pasada completa: membresía → delta → agregar → dedup.
    pub async fn reconcile(
        &self,
        playlist_id: &str,
        desired: &[Option<TrackRef>],
    ) -> Result<ReconcileReport, CatalogError> {
        let current = self.fetch_membership(playlist_id).await?;
        let to_add = compute_delta(desired, &current);
        let add_calls = self.add_missing(playlist_id, &to_add).await?;
        let duplicates_removed = self.remove_duplicates(playlist_id).await?;

        Ok(ReconcileReport {
            added: to_add.len(),
            add_calls,
            duplicates_removed,
        })
    }
}
