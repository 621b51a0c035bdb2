use std::time::Duration;
use tracing::debug;

use super::retry::{with_retry, FixedThrottle, RetryConfig, WaitStrategy};
use crate::cache::{CacheRecord, SongCache, SongRecord};
use crate::error::CatalogError;
use crate::sources::{CatalogClient, TrackRef};

/// Query estructurada de búsqueda en el catálogo
pub fn search_query(song: &SongRecord) -> String {
    format!("track:{} artist:{}", song.title, song.artist)
}

/// Resuelve canciones a tracks del catálogo, memoizando el id en la caché.
///
/// Los "no encontrado" no se memoizan: se vuelven a buscar en la próxima
/// ejecución.
pub struct CatalogResolver<'a, C: CatalogClient + ?Sized> {
    client: &'a C,
    retry: RetryConfig,
    wait: &'a dyn WaitStrategy,
    throttle: FixedThrottle,
}

impl<'a, C: CatalogClient + ?Sized> CatalogResolver<'a, C> {
    pub fn new(
        client: &'a C,
        retry: RetryConfig,
        wait: &'a dyn WaitStrategy,
        throttle_every: u64,
        throttle_pause: Duration,
    ) -> Self {
        Self {
            client,
            retry,
            wait,
            throttle: FixedThrottle::new(throttle_every, throttle_pause),
        }
    }

    /// Búsquedas que llegaron al servicio (las respuestas de caché no cuentan)
    pub fn lookups(&self) -> u64 {
        self.throttle.calls()
    }

    pub async fn resolve(
        &mut self,
        song: &SongRecord,
        cache: &mut SongCache,
    ) -> Result<Option<TrackRef>, CatalogError> {
        let key = song.key();
        if let Some(id) = cache.get(&key).and_then(CacheRecord::track_id) {
            return Ok(Some(TrackRef::from_id(id)));
        }

        let query = search_query(song);
        let client = self.client;
        let q = query.as_str();
        // Cada intento llega al servicio, también los reintentos
        let mut attempts = 0;
        let outcome = with_retry(&self.retry, self.wait, q, || {
            attempts += 1;
            client.search_tracks(q, 1)
        })
        .await;
        for _ in 0..attempts {
            self.throttle.record_call(self.wait).await;
        }
        let hits = outcome?;

        match hits.into_iter().next() {
            Some(track) => {
                cache.record_mut(&key).remote_track_id = Some(track.id.clone());
                Ok(Some(track))
            }
            None => {
                debug!("🔍 Sin resultados para '{}'", query);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SongKey;
    use crate::sync::testing::{FakeCatalog, RecordingWait};

    fn resolver<'a>(catalog: &'a FakeCatalog, wait: &'a RecordingWait) -> CatalogResolver<'a, FakeCatalog> {
        CatalogResolver::new(catalog, RetryConfig::default(), wait, 500, Duration::from_secs(15))
    }

    #[test]
    fn test_query_format() {
        let song = SongRecord::new("Despacito", "Luis Fonsi");
        assert_eq!(search_query(&song), "track:Despacito artist:Luis Fonsi");
    }

    #[tokio::test]
    async fn test_hit_is_stored_in_cache() {
        let catalog = FakeCatalog::new("me").with_track("Despacito", "Luis Fonsi", "T1");
        let wait = RecordingWait::default();
        let mut cache = SongCache::new();
        let mut resolver = resolver(&catalog, &wait);

        let track = resolver
            .resolve(&SongRecord::new("Despacito", "Luis Fonsi"), &mut cache)
            .await
            .unwrap();

        assert_eq!(track, Some(TrackRef::from_id("T1")));
        assert_eq!(
            cache
                .get(&SongKey::new("Despacito", "Luis Fonsi"))
                .and_then(CacheRecord::track_id),
            Some("T1")
        );
    }

    #[tokio::test]
    async fn test_cached_id_skips_search() {
        let catalog = FakeCatalog::new("me");
        let wait = RecordingWait::default();
        let mut cache = SongCache::new();
        cache.insert(
            SongKey::new("Gasolina", "Daddy Yankee"),
            CacheRecord::classified("Yes").with_track_id("T9"),
        );
        let mut resolver = resolver(&catalog, &wait);

        let track = resolver
            .resolve(&SongRecord::new("Gasolina", "Daddy Yankee"), &mut cache)
            .await
            .unwrap();

        assert_eq!(track.map(|t| t.uri), Some("spotify:track:T9".to_string()));
        assert!(catalog.state().searches.is_empty());
        assert_eq!(resolver.lookups(), 0);
    }

    #[tokio::test]
    async fn test_not_found_is_not_memoized() {
        let catalog = FakeCatalog::new("me");
        let wait = RecordingWait::default();
        let mut cache = SongCache::new();
        let song = SongRecord::new("Canción perdida", "Nadie");
        cache.insert(song.key(), CacheRecord::classified("Yes"));
        let mut resolver = resolver(&catalog, &wait);

        assert_eq!(resolver.resolve(&song, &mut cache).await.unwrap(), None);
        assert_eq!(resolver.resolve(&song, &mut cache).await.unwrap(), None);

        assert_eq!(catalog.state().searches.len(), 2);
        assert_eq!(cache.get(&song.key()), Some(&CacheRecord::classified("Yes")));
    }

    #[tokio::test]
    async fn test_throttle_counts_only_real_lookups() {
        let catalog = FakeCatalog::new("me");
        let wait = RecordingWait::default();
        let mut cache = SongCache::new();
        for i in 0..10 {
            cache.insert(
                SongKey::new(format!("cached {i}"), "x"),
                CacheRecord::classified("Yes").with_track_id(format!("C{i}")),
            );
        }
        let mut resolver =
            CatalogResolver::new(&catalog, RetryConfig::default(), &wait, 4, Duration::from_secs(15));

        for i in 0..10 {
            resolver
                .resolve(&SongRecord::new(format!("cached {i}"), "x"), &mut cache)
                .await
                .unwrap();
        }
        assert!(wait.recorded().is_empty());

        for i in 0..9 {
            resolver
                .resolve(&SongRecord::new(format!("nuevo {i}"), "x"), &mut cache)
                .await
                .unwrap();
        }
        assert_eq!(resolver.lookups(), 9);
        assert_eq!(wait.recorded(), vec![Duration::from_secs(15); 2]);
    }

    #[tokio::test]
    async fn test_retried_searches_count_toward_throttle() {
        let catalog = FakeCatalog::new("me")
            .with_track("Gasolina", "Daddy Yankee", "T2")
            .with_search_failures(1);
        let wait = RecordingWait::default();
        let mut cache = SongCache::new();
        let mut resolver =
            CatalogResolver::new(&catalog, RetryConfig::default(), &wait, 2, Duration::from_secs(15));

        let track = resolver
            .resolve(&SongRecord::new("Gasolina", "Daddy Yankee"), &mut cache)
            .await
            .unwrap();

        assert_eq!(track, Some(TrackRef::from_id("T2")));
        assert_eq!(resolver.lookups(), 2);
        assert_eq!(
            wait.recorded(),
            vec![Duration::from_secs(1), Duration::from_secs(15)]
        );
    }
}
