use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::{CacheRecord, SongKey, SongRecord};

/// Versión del formato que escribe este programa
pub const CACHE_FORMAT_VERSION: u64 = 2;

/// Caché en memoria: canción → clasificación + id de catálogo.
///
/// `legacy` y `quarantine` solo existen para no perder datos de archivos
/// viejos o dañados; nunca se borran salvo al migrar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SongCache {
    songs: BTreeMap<SongKey, CacheRecord>,
    legacy: BTreeMap<String, CacheRecord>,
    quarantine: BTreeMap<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredSong {
    title: String,
    artist: String,
    #[serde(flatten)]
    record: CacheRecord,
}

#[derive(Debug, Serialize)]
struct CacheDocument<'a> {
    version: u64,
    songs: Vec<StoredSongRef<'a>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    legacy: &'a BTreeMap<String, CacheRecord>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    quarantine: &'a BTreeMap<String, Value>,
}

#[derive(Debug, Serialize)]
struct StoredSongRef<'a> {
    title: &'a str,
    artist: &'a str,
    #[serde(flatten)]
    record: &'a CacheRecord,
}

impl SongCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.songs.len() + self.legacy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn legacy_len(&self) -> usize {
        self.legacy.len()
    }

    pub fn quarantined_len(&self) -> usize {
        self.quarantine.len()
    }

    /// Busca el registro de una canción, con fallback a la clave antigua.
    pub fn get(&self, key: &SongKey) -> Option<&CacheRecord> {
        self.songs
            .get(key)
            .or_else(|| self.legacy.get(&key.legacy_key()))
    }

    /// Upsert: devuelve el registro de la canción, creándolo vacío si falta.
    ///
    /// Si existe un registro antiguo con la clave concatenada se migra antes.
    pub fn record_mut(&mut self, key: &SongKey) -> &mut CacheRecord {
        self.promote_legacy(key);
        self.songs.entry(key.clone()).or_default()
    }

    #[cfg(test)]
    pub fn insert(&mut self, key: SongKey, record: CacheRecord) {
        self.songs.insert(key, record);
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = (&SongKey, &CacheRecord)> {
        self.songs.iter()
    }

    /// Migra los registros antiguos que coinciden con canciones del feed.
    ///
    /// Si dos canciones comparten la misma clave concatenada, la primera en
    /// orden de feed se queda con el registro. Devuelve cuántos se migraron.
    pub fn migrate_legacy(&mut self, songs: &[SongRecord]) -> usize {
        if self.legacy.is_empty() {
            return 0;
        }

        let migrated = songs
            .iter()
            .filter(|song| self.promote_legacy(&song.key()))
            .count();

        if migrated > 0 {
            debug!(
                "🔁 Migrados {} registros antiguos ({} sin coincidencia)",
                migrated,
                self.legacy.len()
            );
        }
        migrated
    }

    fn promote_legacy(&mut self, key: &SongKey) -> bool {
        let Some(old) = self.legacy.remove(&key.legacy_key()) else {
            return false;
        };
        match self.songs.get_mut(key) {
            Some(current) => current.fill_from(old),
            None => {
                self.songs.insert(key.clone(), old);
            }
        }
        true
    }

    /// Serializa al formato v2.
    pub fn to_json(&self) -> serde_json::Result<String> {
        let document = CacheDocument {
            version: CACHE_FORMAT_VERSION,
            songs: self
                .songs
                .iter()
                .map(|(key, record)| StoredSongRef {
                    title: &key.title,
                    artist: &key.artist,
                    record,
                })
                .collect(),
            legacy: &self.legacy,
            quarantine: &self.quarantine,
        };
        serde_json::to_string_pretty(&document)
    }

    /// Construye la caché a partir del JSON ya parseado.
    ///
    /// Acepta el formato v2 y el mapa plano antiguo. Las entradas que no
    /// validan van a cuarentena; solo una raíz inutilizable es un error.
    pub fn from_value(value: Value) -> Result<Self, String> {
        let Value::Object(mut root) = value else {
            return Err("la raíz debe ser un objeto JSON".to_string());
        };

        let mut cache = Self::new();

        match root.remove("version") {
            Some(Value::Number(version)) => {
                if version.as_u64() != Some(CACHE_FORMAT_VERSION) {
                    return Err(format!("versión {version} desconocida"));
                }

                match root.remove("quarantine") {
                    Some(Value::Object(stored)) => cache.quarantine.extend(stored),
                    None => {}
                    Some(_) => return Err("'quarantine' debe ser un objeto".to_string()),
                }
                match root.remove("legacy") {
                    Some(Value::Object(legacy)) => cache.load_legacy_entries(legacy),
                    None => {}
                    Some(_) => return Err("'legacy' debe ser un objeto".to_string()),
                }

                let songs = match root.remove("songs") {
                    Some(Value::Array(songs)) => songs,
                    None => Vec::new(),
                    Some(_) => return Err("'songs' debe ser una lista".to_string()),
                };
                for (index, raw) in songs.into_iter().enumerate() {
                    match serde_json::from_value::<StoredSong>(raw.clone()) {
                        Ok(song) => {
                            cache
                                .songs
                                .insert(SongKey::new(song.title, song.artist), song.record);
                        }
                        Err(e) => {
                            warn!("⚠️ Entrada songs[{}] inválida, en cuarentena: {}", index, e);
                            cache.quarantine_entry(format!("songs[{index}]"), raw);
                        }
                    }
                }
            }
            Some(other) => {
                // Un mapa antiguo podría tener una canción llamada "version"
                root.insert("version".to_string(), other);
                cache.load_legacy_entries(root);
            }
            None => cache.load_legacy_entries(root),
        }

        Ok(cache)
    }

    fn load_legacy_entries(&mut self, entries: Map<String, Value>) {
        for (key, raw) in entries {
            match serde_json::from_value::<CacheRecord>(raw.clone()) {
                Ok(record) if raw.is_object() => {
                    self.legacy.insert(key, record);
                }
                Ok(_) => {
                    warn!("⚠️ Entrada '{}' no es un objeto, en cuarentena", key);
                    self.quarantine_entry(key, raw);
                }
                Err(e) => {
                    warn!("⚠️ Entrada '{}' inválida, en cuarentena: {}", key, e);
                    self.quarantine_entry(key, raw);
                }
            }
        }
    }

    /// Guarda una entrada en cuarentena sin pisar otra con la misma clave.
    fn quarantine_entry(&mut self, key: String, raw: Value) {
        let mut slot = key.clone();
        let mut n = 1;
        while self.quarantine.contains_key(&slot) {
            n += 1;
            slot = format!("{key}#{n}");
        }
        self.quarantine.insert(slot, raw);
    }
}
