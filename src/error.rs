use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errores que un reintento puede resolver (timeouts, 429, 5xx).
pub trait Transient {
    fn is_transient(&self) -> bool;

    /// Espera mínima sugerida por el servicio (cabecera `Retry-After`)
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

fn transport_is_transient(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

fn status_is_transient(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// Fallos al obtener o interpretar el feed CSV
#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("no se pudo descargar el feed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("el feed respondió {status}: {body}")]
    Status { status: u16, body: String },

    #[error("no se pudo leer {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV inválido: {0}")]
    Csv(#[from] csv::Error),

    #[error("al feed le falta la columna '{0}'")]
    MissingColumn(&'static str),
}

/// Fallos del servicio de clasificación de idioma
#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("error de transporte: {0}")]
    Http(#[from] reqwest::Error),

    #[error("el clasificador respondió {status}: {body}")]
    Status {
        status: u16,
        body: String,
        retry_after: Option<Duration>,
    },

    #[error("respuesta inesperada del clasificador: {0}")]
    UnexpectedShape(String),
}

impl Transient for ClassificationError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => transport_is_transient(e),
            Self::Status { status, .. } => status_is_transient(*status),
            Self::UnexpectedShape(_) => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Fallos del catálogo / playlists (Spotify)
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("error de transporte: {0}")]
    Http(#[from] reqwest::Error),

    #[error("el catálogo respondió {status}: {body}")]
    Status { status: u16, body: String },

    #[error("rate limit del catálogo (retry_after={retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("autorización rechazada: {0}")]
    Auth(String),

    #[error("respuesta inesperada del catálogo: {0}")]
    UnexpectedShape(String),
}

impl Transient for CatalogError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => transport_is_transient(e),
            Self::Status { status, .. } => status_is_transient(*status),
            Self::RateLimited { .. } => true,
            Self::Auth(_) | Self::UnexpectedShape(_) => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Fallos al leer o escribir el archivo de caché
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("error de E/S en la caché {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("la caché {path} no es JSON válido: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("la caché {path} tiene un formato no soportado: {reason}")]
    Layout { path: PathBuf, reason: String },
}

/// Fallos de configuración del proceso
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("falta la credencial {var}{hint}")]
    MissingCredential { var: &'static str, hint: String },

    #[error("valor inválido para {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

impl ConfigError {
    pub fn missing(var: &'static str) -> Self {
        Self::MissingCredential {
            var,
            hint: String::new(),
        }
    }
}

/// Error general de una ejecución del pipeline
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    DataSource(#[from] DataSourceError),

    #[error("no se pudo clasificar '{key}': {source}")]
    Classification {
        key: String,
        #[source]
        source: ClassificationError,
    },

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
