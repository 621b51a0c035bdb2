use async_trait::async_trait;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::Transient;

/// Estrategia de espera inyectable (backoff y throttle).
#[async_trait]
pub trait WaitStrategy: Send + Sync {
    async fn wait(&self, duration: Duration);
}

/// Espera real con el timer de tokio
pub struct TokioSleep;

#[async_trait]
impl WaitStrategy for TokioSleep {
    async fn wait(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Backoff exponencial: base * 2^(intento-1), con tope en `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Ejecuta `op` reintentando solo errores transitorios, hasta `max_attempts`.
///
/// Si el servicio pide una espera mayor (`Retry-After`) se respeta esa.
pub async fn with_retry<T, E, F, Fut>(
    config: &RetryConfig,
    wait: &dyn WaitStrategy,
    what: &str,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + Display,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < config.max_attempts => {
                let backoff = config.delay_for(attempt);
                let delay = e.retry_after().map_or(backoff, |hint| hint.max(backoff));
                warn!(
                    "⚠️ Intento {}/{} falló para {}: {} (reintentando en {})",
                    attempt,
                    config.max_attempts,
                    what,
                    e,
                    humantime::format_duration(delay)
                );
                wait.wait(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Pausa fija cada N llamadas reales al servicio.
///
/// Simplificación deliberada: no es un token bucket ni se adapta a las
/// respuestas del servicio. `every == 0` lo desactiva.
#[derive(Debug, Clone)]
pub struct FixedThrottle {
    every: u64,
    pause: Duration,
    calls: u64,
}

impl FixedThrottle {
    pub fn new(every: u64, pause: Duration) -> Self {
        Self {
            every,
            pause,
            calls: 0,
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }

    /// Registra una llamada y pausa si se alcanzó el umbral.
    pub async fn record_call(&mut self, wait: &dyn WaitStrategy) {
        self.calls += 1;
        if self.every > 0 && self.calls % self.every == 0 {
            info!(
                "⏸️ {} búsquedas realizadas, pausando {} por el rate limit",
                self.calls,
                humantime::format_duration(self.pause)
            );
            wait.wait(self.pause).await;
        }
    }
}
