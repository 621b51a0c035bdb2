use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::sources::feed::FeedSource;
use crate::sources::spotify;
use crate::sync::retry::RetryConfig;

pub const DEFAULT_PLAYLIST_NAME: &str = "heard in the mission";
pub const DEFAULT_FEED_URL: &str = "https://walzr.com/bop-spotter/export";
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:3000";

#[derive(Debug, Clone)]
pub struct Config {
    // OpenAI
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_api_base: String,

    // Spotify
    pub spotify_client_id: String,
    pub spotify_client_secret: String,
    pub spotify_refresh_token: String,
    pub spotify_api_base: String,
    pub spotify_accounts_base: String,
    pub spotify_redirect_uri: String,

    // Entrada / salida
    pub feed_url: String,
    pub songs_csv_path: Option<PathBuf>,
    pub cache_path: PathBuf,
    pub playlist_name: String,

    // Reintentos y límites
    pub retry_max_attempts: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    pub throttle_every: u64,
    pub throttle_pause: Duration,
    pub http_timeout: Duration,
    pub progress_every: usize,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Construye la configuración a partir de una función de búsqueda de variables.
    ///
    /// Las credenciales se verifican antes que cualquier otro valor.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let openai_api_key = var("OPENAI_API_KEY").ok_or_else(|| ConfigError::missing("OPENAI_API_KEY"))?;
        let spotify_client_id =
            var("SPOTIFY_CLIENT_ID").ok_or_else(|| ConfigError::missing("SPOTIFY_CLIENT_ID"))?;
        let spotify_client_secret =
            var("SPOTIFY_CLIENT_SECRET").ok_or_else(|| ConfigError::missing("SPOTIFY_CLIENT_SECRET"))?;

        let spotify_accounts_base = var("SPOTIFY_ACCOUNTS_BASE")
            .unwrap_or_else(|| spotify::DEFAULT_ACCOUNTS_BASE.to_string());
        let spotify_redirect_uri =
            var("SPOTIFY_REDIRECT_URI").unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string());

        let spotify_refresh_token = match var("SPOTIFY_REFRESH_TOKEN") {
            Some(token) => token,
            None => {
                // Sin refresh token solo podemos indicar dónde autorizar la app
                let hint = spotify::authorize_url(
                    &spotify_accounts_base,
                    &spotify_client_id,
                    &spotify_redirect_uri,
                )
                .map(|url| format!(" (autoriza la app en {url})"))
                .unwrap_or_default();
                return Err(ConfigError::MissingCredential {
                    var: "SPOTIFY_REFRESH_TOKEN",
                    hint,
                });
            }
        };

        let config = Self {
            openai_api_key,
            openai_model: var("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o".to_string()),
            openai_api_base: var("OPENAI_API_BASE")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),

            spotify_client_id,
            spotify_client_secret,
            spotify_refresh_token,
            spotify_api_base: var("SPOTIFY_API_BASE")
                .unwrap_or_else(|| spotify::DEFAULT_API_BASE.to_string()),
            spotify_accounts_base,
            spotify_redirect_uri,

            feed_url: var("FEED_URL").unwrap_or_else(|| DEFAULT_FEED_URL.to_string()),
            songs_csv_path: var("SONGS_CSV_PATH").map(PathBuf::from),
            cache_path: var("CACHE_PATH")
                .unwrap_or_else(|| "data/song_cache.json".to_string())
                .into(),
            playlist_name: var("PLAYLIST_NAME").unwrap_or_else(|| DEFAULT_PLAYLIST_NAME.to_string()),

            retry_max_attempts: parse_or(&var, "RETRY_MAX_ATTEMPTS", 4)?,
            retry_base_delay: Duration::from_millis(parse_or(&var, "RETRY_BASE_DELAY_MS", 1000)?),
            retry_max_delay: Duration::from_millis(parse_or(&var, "RETRY_MAX_DELAY_MS", 30_000)?),
            throttle_every: parse_or(&var, "THROTTLE_EVERY", 500)?,
            throttle_pause: Duration::from_secs(parse_or(&var, "THROTTLE_PAUSE_SECS", 15)?),
            http_timeout: Duration::from_secs(parse_or(&var, "HTTP_TIMEOUT_SECS", 30)?),
            progress_every: parse_or(&var, "PROGRESS_EVERY", 100)?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - At least one attempt per external call
    /// - Base retry delay must not exceed the cap
    /// - HTTP timeout and progress interval must be > 0
    /// - Playlist name must not be blank
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry_max_attempts == 0 {
            return Err(ConfigError::Invalid {
                var: "RETRY_MAX_ATTEMPTS",
                reason: "debe ser al menos 1".into(),
            });
        }

        if self.retry_base_delay > self.retry_max_delay {
            return Err(ConfigError::Invalid {
                var: "RETRY_BASE_DELAY_MS",
                reason: format!(
                    "{} supera RETRY_MAX_DELAY_MS ({})",
                    humantime::format_duration(self.retry_base_delay),
                    humantime::format_duration(self.retry_max_delay)
                ),
            });
        }

        if self.http_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                var: "HTTP_TIMEOUT_SECS",
                reason: "debe ser mayor que 0".into(),
            });
        }

        if self.progress_every == 0 {
            return Err(ConfigError::Invalid {
                var: "PROGRESS_EVERY",
                reason: "debe ser mayor que 0".into(),
            });
        }

        if self.playlist_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                var: "PLAYLIST_NAME",
                reason: "no puede estar vacío".into(),
            });
        }

        Ok(())
    }

    pub fn feed_source(&self) -> FeedSource {
        match &self.songs_csv_path {
            Some(path) => FeedSource::File(path.clone()),
            None => FeedSource::Url(self.feed_url.clone()),
        }
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry_max_attempts,
            base_delay: self.retry_base_delay,
            max_delay: self.retry_max_delay,
        }
    }

    /// Resumen de la configuración para logs, sin secretos.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Feed: {}\n  \
            Cache: {}\n  \
            Playlist: '{}'\n  \
            OpenAI: model {} @ {}\n  \
            Spotify: client {} @ {} (redirect {})\n  \
            Retry: {} intentos, base {}, máx {}\n  \
            Throttle: pausa de {} cada {} búsquedas",
            self.songs_csv_path
                .as_ref()
                .map_or(self.feed_url.clone(), |p| p.display().to_string()),
            self.cache_path.display(),
            self.playlist_name,
            self.openai_model,
            self.openai_api_base,
            redact(&self.spotify_client_id),
            self.spotify_api_base,
            self.spotify_redirect_uri,
            self.retry_max_attempts,
            humantime::format_duration(self.retry_base_delay),
            humantime::format_duration(self.retry_max_delay),
            humantime::format_duration(self.throttle_pause),
            self.throttle_every,
        )
    }
}

fn parse_or<T, F>(var: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var: name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn redact(value: &str) -> String {
    let visible: String = value.chars().take(4).collect();
    format!("{visible}…")
}
