use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::cache::SongCache;
use crate::error::CacheError;

/// Almacenamiento de la caché de canciones en un único archivo JSON.
///
/// No hay bloqueo de archivo: dos procesos usando la misma ruta pueden
/// perder actualizaciones del otro.
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Carga la caché completa.
    ///
    /// Un archivo inexistente es una caché vacía; un archivo ilegible o con
    /// JSON inválido es un error, nunca se reemplaza en silencio.
    pub async fn load(&self) -> Result<SongCache, CacheError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("📁 Caché no encontrada en {}, empezando vacía", self.path.display());
                return Ok(SongCache::new());
            }
            Err(source) => {
                return Err(CacheError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let value: serde_json::Value =
            serde_json::from_str(&content).map_err(|source| CacheError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        let cache = SongCache::from_value(value).map_err(|reason| CacheError::Layout {
            path: self.path.clone(),
            reason,
        })?;

        info!(
            "📂 Caché cargada: {} canciones ({} antiguas, {} en cuarentena)",
            cache.len(),
            cache.legacy_len(),
            cache.quarantined_len()
        );
        Ok(cache)
    }

    /// Guarda la caché completa de forma atómica.
    ///
    /// Escribe a un archivo temporal junto al destino, hace fsync y lo
    /// renombra encima; un fallo a mitad deja intacta la versión anterior.
    pub async fn save(&self, cache: &SongCache) -> Result<(), CacheError> {
        let content = cache.to_json().map_err(|e| CacheError::Io {
            path: self.path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|source| self.io_error(source))?;
        }

        let tmp_path = self.tmp_path();
        let write = async {
            let mut file = fs::File::create(&tmp_path).await?;
            file.write_all(content.as_bytes()).await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, &self.path).await
        };

        if let Err(source) = write.await {
            // Best effort: no dejar temporales huérfanos
            let _ = fs::remove_file(&tmp_path).await;
            return Err(self.io_error(source));
        }

        debug!("💾 Caché guardada en {} ({} bytes)", self.path.display(), content.len());
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "song_cache.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: std::io::Error) -> CacheError {
        CacheError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
