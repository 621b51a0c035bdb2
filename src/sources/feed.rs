use std::path::PathBuf;
use tracing::{debug, info};

use crate::cache::SongRecord;
use crate::error::DataSourceError;

/// Origen del CSV de canciones
#[derive(Debug, Clone)]
pub enum FeedSource {
    Url(String),
    File(PathBuf),
}

/// Descarga (o lee) el feed y lo convierte en canciones.
pub async fn fetch_songs(
    source: &FeedSource,
    http: &reqwest::Client,
) -> Result<Vec<SongRecord>, DataSourceError> {
    let text = match source {
        FeedSource::Url(url) => {
            debug!("🌐 Descargando feed desde {}", url);
            let response = http.get(url).send().await?;
            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(DataSourceError::Status { status, body });
            }
            response.text().await?
        }
        FeedSource::File(path) => tokio::fs::read_to_string(path)
            .await
            .map_err(|source| DataSourceError::Io {
                path: path.clone(),
                source,
            })?,
    };

    let songs = parse_songs(&text)?;
    info!("📥 Feed cargado con {} canciones", songs.len());
    Ok(songs)
}

/// Interpreta el CSV; solo se usan las columnas `title` y `artist`.
///
/// Las filas con título o artista vacío se descartan.
pub fn parse_songs(text: &str) -> Result<Vec<SongRecord>, DataSourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    let column = |name: &'static str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or(DataSourceError::MissingColumn(name))
    };
    let title_idx = column("title")?;
    let artist_idx = column("artist")?;

    let mut songs = Vec::new();
    let mut skipped = 0;
    for row in reader.records() {
        let row = row?;
        let title = row.get(title_idx).unwrap_or_default();
        let artist = row.get(artist_idx).unwrap_or_default();
        if title.is_empty() || artist.is_empty() {
            skipped += 1;
            continue;
        }
        songs.push(SongRecord::new(title, artist));
    }

    if skipped > 0 {
        debug!("⏭️ {} filas sin título o artista descartadas", skipped);
    }
    Ok(songs)
}
