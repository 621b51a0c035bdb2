use anyhow::{Context, Result};
use tracing::{error, info};

mod cache;
mod config;
mod error;
mod sources;
mod storage;
mod sync;

use crate::config::Config;
use crate::sources::feed;
use crate::sources::spotify::SpotifyCredentials;
use crate::sources::{OpenAiClassifier, SpotifyClient};
use crate::storage::CacheStore;
use crate::sync::retry::TokioSleep;
use crate::sync::{Pipeline, SyncSettings};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("spanish_playlist_sync=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Spanish Playlist Sync v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    let http = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .context("no se pudo construir el cliente HTTP")?;

    let songs = feed::fetch_songs(&config.feed_source(), &http)
        .await
        .context("no se pudo cargar el feed de canciones")?;

    let store = CacheStore::new(config.cache_path.clone());

    let classifier = OpenAiClassifier::new(
        http.clone(),
        config.openai_api_key.clone(),
        config.openai_model.clone(),
        config.openai_api_base.clone(),
    );
    let catalog = SpotifyClient::new(
        http,
        SpotifyCredentials {
            client_id: config.spotify_client_id.clone(),
            client_secret: config.spotify_client_secret.clone(),
            refresh_token: config.spotify_refresh_token.clone(),
        },
        &config.spotify_api_base,
        &config.spotify_accounts_base,
    );

    let pipeline = Pipeline::new(&classifier, &catalog, &TokioSleep, SyncSettings::from(&config));
    match pipeline.run(&songs, &store).await {
        Ok(report) => {
            info!("{}", report);
            info!("✅ Sincronización completada");
            Ok(())
        }
        Err(e) => {
            error!("❌ Sincronización abortada: {}", e);
            Err(e.into())
        }
    }
}
