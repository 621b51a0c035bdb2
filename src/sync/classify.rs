use std::fmt;

use super::retry::{with_retry, RetryConfig, WaitStrategy};
use crate::cache::{SongCache, SongRecord, SPANISH_LABEL};
use crate::error::SyncError;
use crate::sources::LanguageClassifier;

/// Etiqueta cruda devuelta por el clasificador.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label(String);

impl Label {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Solo la cadena exacta "Yes" cuenta: sin normalizar mayúsculas ni espacios.
    pub fn is_spanish(&self) -> bool {
        self.0 == SPANISH_LABEL
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Clasificador con memoización en la caché.
pub struct ClassifierAdapter<'a, L: LanguageClassifier + ?Sized> {
    classifier: &'a L,
    retry: RetryConfig,
    wait: &'a dyn WaitStrategy,
    calls: usize,
}

impl<'a, L: LanguageClassifier + ?Sized> ClassifierAdapter<'a, L> {
    pub fn new(classifier: &'a L, retry: RetryConfig, wait: &'a dyn WaitStrategy) -> Self {
        Self {
            classifier,
            retry,
            wait,
            calls: 0,
        }
    }

    /// Canciones clasificadas con una llamada externa en esta ejecución
    pub fn calls(&self) -> usize {
        self.calls
    }

    pub async fn classify(
        &mut self,
        song: &SongRecord,
        cache: &mut SongCache,
    ) -> Result<Label, SyncError> {
        let key = song.key();
        if let Some(label) = cache.get(&key).and_then(|r| r.classification.clone()) {
            return Ok(Label(label));
        }

        let classifier = self.classifier;
        let (title, artist) = (song.title.as_str(), song.artist.as_str());
        let label = with_retry(&self.retry, self.wait, &key.to_string(), move || {
            classifier.classify(title, artist)
        })
        .await
        .map_err(|source| SyncError::Classification {
            key: key.to_string(),
            source,
        })?;

        self.calls += 1;
        cache.record_mut(&key).classification = Some(label.clone());
        Ok(Label(label))
    }
}
