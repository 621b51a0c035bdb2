//! Orquestación de una ejecución completa.
//!
//! Clasificar → checkpoint → resolver → reconciliar → checkpoint. Todo en
//! orden de entrada, una llamada externa a la vez.

use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

use super::classify::ClassifierAdapter;
use super::reconcile::PlaylistReconciler;
use super::resolve::CatalogResolver;
use super::retry::{RetryConfig, WaitStrategy};
use crate::cache::{SongCache, SongRecord};
use crate::config::Config;
use crate::error::SyncError;
use crate::sources::{CatalogClient, LanguageClassifier};
use crate::storage::CacheStore;

/// Parámetros de la ejecución derivados de la configuración
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub playlist_name: String,
    pub retry: RetryConfig,
    pub throttle_every: u64,
    pub throttle_pause: Duration,
    pub progress_every: usize,
}

impl From<&Config> for SyncSettings {
    fn from(config: &Config) -> Self {
        Self {
            playlist_name: config.playlist_name.clone(),
            retry: config.retry(),
            throttle_every: config.throttle_every,
            throttle_pause: config.throttle_pause,
            progress_every: config.progress_every,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub songs: usize,
    pub newly_classified: usize,
    pub spanish: usize,
    pub lookups: u64,
    pub resolved: usize,
    pub unresolved: usize,
    pub added: usize,
    pub duplicates_removed: usize,
    pub playlist_url: Option<String>,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "📊 Resumen de la ejecución")?;
        writeln!(
            f,
            "🎵 Canciones: {} ({} clasificadas ahora)",
            self.songs, self.newly_classified
        )?;
        writeln!(f, "🇪🇸 En español: {}", self.spanish)?;
        writeln!(
            f,
            "🔍 Resueltas: {} | sin resultado: {} | búsquedas: {}",
            self.resolved, self.unresolved, self.lookups
        )?;
        write!(
            f,
            "➕ Agregadas: {} | 🧹 duplicados quitados: {}",
            self.added, self.duplicates_removed
        )?;
        if let Some(url) = &self.playlist_url {
            write!(f, "\n🔗 {url}")?;
        }
        Ok(())
    }
}

pub struct Pipeline<'a, L: LanguageClassifier + ?Sized, C: CatalogClient + ?Sized> {
    classifier: &'a L,
    catalog: &'a C,
    wait: &'a dyn WaitStrategy,
    settings: SyncSettings,
}

impl<'a, L, C> Pipeline<'a, L, C>
where
    L: LanguageClassifier + ?Sized,
    C: CatalogClient + ?Sized,
{
    pub fn new(
        classifier: &'a L,
        catalog: &'a C,
        wait: &'a dyn WaitStrategy,
        settings: SyncSettings,
    ) -> Self {
        Self {
            classifier,
            catalog,
            wait,
            settings,
        }
    }

    /// Ejecuta la sincronización completa.
    ///
    /// La caché se guarda solo en los dos checkpoints: un fallo a mitad de
    /// fase pierde el trabajo de esa fase, nunca el de la anterior.
    pub async fn run(&self, songs: &[SongRecord], store: &CacheStore) -> Result<RunReport, SyncError> {
        let mut cache = store.load().await?;
        if cache.is_empty() {
            info!("💾 Caché vacía en {}, se empieza de cero", store.path().display());
        } else {
            info!(
                "💾 Caché cargada de {}: {} registros",
                store.path().display(),
                cache.len()
            );
        }
        let migrated = cache.migrate_legacy(songs);
        if migrated > 0 {
            info!("🔁 {} registros migrados al formato nuevo", migrated);
        }

        let (spanish, newly_classified) = self.classify_all(songs, &mut cache).await?;
        store.save(&cache).await?;
        info!("💾 Checkpoint: clasificaciones guardadas");

        let reconciler = PlaylistReconciler::new(self.catalog, self.settings.retry.clone(), self.wait);
        let playlist = reconciler.locate_or_create(&self.settings.playlist_name).await?;

        let mut resolver = CatalogResolver::new(
            self.catalog,
            self.settings.retry.clone(),
            self.wait,
            self.settings.throttle_every,
            self.settings.throttle_pause,
        );
        let mut desired = Vec::with_capacity(spanish.len());
        for (index, song) in spanish.iter().enumerate() {
            desired.push(resolver.resolve(song, &mut cache).await?);
            self.progress("🔍 Resolviendo", index + 1, spanish.len());
        }
        let resolved = desired.iter().filter(|t| t.is_some()).count();
        info!(
            "🔍 {} de {} canciones resueltas ({} búsquedas)",
            resolved,
            spanish.len(),
            resolver.lookups()
        );

        let outcome = reconciler.reconcile(&playlist.id, &desired).await?;
        debug!(
            "➕ {} tracks agregados en {} llamadas",
            outcome.added, outcome.add_calls
        );
        store.save(&cache).await?;
        info!("💾 Checkpoint: ids de tracks guardados");

        if let Some(url) = &playlist.url {
            info!("🔗 Playlist: {}", url);
        }

        Ok(RunReport {
            songs: songs.len(),
            newly_classified,
            spanish: spanish.len(),
            lookups: resolver.lookups(),
            resolved,
            unresolved: spanish.len() - resolved,
            added: outcome.added,
            duplicates_removed: outcome.duplicates_removed,
            playlist_url: playlist.url,
        })
    }

    async fn classify_all<'s>(
        &self,
        songs: &'s [SongRecord],
        cache: &mut SongCache,
    ) -> Result<(Vec<&'s SongRecord>, usize), SyncError> {
        let mut adapter = ClassifierAdapter::new(self.classifier, self.settings.retry.clone(), self.wait);
        let mut spanish = Vec::new();

        for (index, song) in songs.iter().enumerate() {
            let label = adapter.classify(song, cache).await?;
            debug!("🏷️ {} / {} → {}", song.title, song.artist, label);
            if label.is_spanish() {
                spanish.push(song);
            }
            self.progress("🏷️ Clasificando", index + 1, songs.len());
        }

        info!(
            "🏷️ {} canciones en español de {} ({} llamadas al clasificador)",
            spanish.len(),
            songs.len(),
            adapter.calls()
        );
        Ok((spanish, adapter.calls()))
    }

    fn progress(&self, phase: &str, done: usize, total: usize) {
        let every = self.settings.progress_every;
        if every > 0 && done % every == 0 && done < total {
            info!("{} {}/{}", phase, done, total);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheRecord, SongKey};
    use crate::error::{CacheError, ClassificationError};
    use crate::sources::MockLanguageClassifier;
    use crate::sync::testing::{FakeCatalog, RecordingWait};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const PLAYLIST: &str = "heard in the mission";

    fn settings() -> SyncSettings {
        SyncSettings {
            playlist_name: PLAYLIST.to_string(),
            retry: RetryConfig::default(),
            throttle_every: 500,
            throttle_pause: Duration::from_secs(15),
            progress_every: 2,
        }
    }

    fn songs() -> Vec<SongRecord> {
        vec![
            SongRecord::new("Despacito", "Luis Fonsi"),
            SongRecord::new("Yellow", "Coldplay"),
            SongRecord::new("Gasolina", "Daddy Yankee"),
            SongRecord::new("Canción perdida", "Nadie"),
            SongRecord::new("Despacito", "Luis Fonsi"),
        ]
    }

    fn label_for(title: &str) -> String {
        if title == "Yellow" { "No" } else { "Yes" }.to_string()
    }

    fn catalog() -> FakeCatalog {
        FakeCatalog::new("me")
            .with_playlist("p1", "rock", "me", &[])
            .with_track("Despacito", "Luis Fonsi", "T1")
            .with_track("Gasolina", "Daddy Yankee", "T2")
    }

    #[tokio::test]
    async fn test_full_run_then_rerun_hits_cache() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path().join("song_cache.json"));
        let catalog = catalog();
        let wait = RecordingWait::default();
        let songs = songs();

        let mut mock = MockLanguageClassifier::new();
        mock.expect_classify()
            .times(4)
            .returning(|title, _| Ok(label_for(title)));
        let report = Pipeline::new(&mock, &catalog, &wait, settings())
            .run(&songs, &store)
            .await
            .unwrap();

        assert_eq!(report.songs, 5);
        assert_eq!(report.newly_classified, 4);
        assert_eq!(report.spanish, 4);
        assert_eq!(report.resolved, 3);
        assert_eq!(report.unresolved, 1);
        assert_eq!(report.added, 2);
        assert_eq!(report.duplicates_removed, 0);
        assert_eq!(
            report.playlist_url.as_deref(),
            Some("https://open.spotify.com/playlist/nueva1")
        );
        assert_eq!(catalog.tracks("nueva1"), vec!["T1", "T2"]);

        let saved = store.load().await.unwrap();
        assert_eq!(
            saved.get(&SongKey::new("Gasolina", "Daddy Yankee")),
            Some(&CacheRecord::classified("Yes").with_track_id("T2"))
        );
        assert_eq!(
            saved.get(&SongKey::new("Canción perdida", "Nadie")),
            Some(&CacheRecord::classified("Yes"))
        );

        // Segunda ejecución: cero llamadas al clasificador, misma playlist
        let mut idle = MockLanguageClassifier::new();
        idle.expect_classify().times(0);
        let searches_before = catalog.state().searches.len();
        let rerun = Pipeline::new(&idle, &catalog, &wait, settings())
            .run(&songs, &store)
            .await
            .unwrap();

        assert_eq!(rerun.newly_classified, 0);
        assert_eq!(rerun.added, 0);
        assert_eq!(rerun.lookups, 1);
        assert_eq!(catalog.state().searches.len(), searches_before + 1);
        assert_eq!(catalog.state().created, 1);
        assert_eq!(catalog.tracks("nueva1"), vec!["T1", "T2"]);
    }

    #[tokio::test]
    async fn test_run_migrates_legacy_cache_and_removes_duplicates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("song_cache.json");
        tokio::fs::write(
            &path,
            r#"{"DespacitoLuis Fonsi": {"OAI_RES": "Yes", "SPOTIFY_ID": "T1"}}"#,
        )
        .await
        .unwrap();
        let store = CacheStore::new(&path);
        let catalog = FakeCatalog::new("me").with_playlist("p9", PLAYLIST, "me", &["T1", "T1", "T1"]);
        let wait = RecordingWait::default();

        let mut mock = MockLanguageClassifier::new();
        mock.expect_classify().times(0);
        let report = Pipeline::new(&mock, &catalog, &wait, settings())
            .run(&[SongRecord::new("Despacito", "Luis Fonsi")], &store)
            .await
            .unwrap();

        assert_eq!(report.lookups, 0);
        assert_eq!(report.added, 0);
        assert_eq!(report.duplicates_removed, 2);
        assert_eq!(catalog.tracks("p9"), vec!["T1"]);

        let saved = store.load().await.unwrap();
        assert_eq!(saved.legacy_len(), 0);
        assert!(saved.get(&SongKey::new("Despacito", "Luis Fonsi")).is_some());
    }

    #[tokio::test]
    async fn test_classification_failure_stops_before_checkpoint() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path().join("song_cache.json"));
        let catalog = catalog();
        let wait = RecordingWait::default();

        let mut mock = MockLanguageClassifier::new();
        mock.expect_classify().returning(|title, _| {
            if title == "Gasolina" {
                Err(ClassificationError::Status {
                    status: 401,
                    body: "bad key".into(),
                    retry_after: None,
                })
            } else {
                Ok(label_for(title))
            }
        });

        let err = Pipeline::new(&mock, &catalog, &wait, settings())
            .run(&songs(), &store)
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Classification { ref key, .. } if key == "Gasolina / Daddy Yankee"));
        assert!(!store.path().exists());
        assert_eq!(catalog.state().created, 0);
    }

    #[tokio::test]
    async fn test_corrupt_cache_aborts_the_run() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("song_cache.json");
        tokio::fs::write(&path, "{ no es json").await.unwrap();
        let store = CacheStore::new(&path);
        let catalog = catalog();
        let wait = RecordingWait::default();
        let mock = MockLanguageClassifier::new();

        let err = Pipeline::new(&mock, &catalog, &wait, settings())
            .run(&songs(), &store)
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Cache(CacheError::Corrupt { .. })));
    }

    #[test]
    fn test_report_display_includes_url() {
        let report = RunReport {
            songs: 10,
            playlist_url: Some("https://open.spotify.com/playlist/x".into()),
            ..RunReport::default()
        };
        let text = report.to_string();
        assert!(text.contains("Canciones: 10"));
        assert!(text.ends_with("🔗 https://open.spotify.com/playlist/x"));
    }
}
