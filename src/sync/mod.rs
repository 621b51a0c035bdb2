//! Flujo de sincronización: clasificación, resolución y reconciliación.

pub mod classify;
pub mod pipeline;
pub mod reconcile;
pub mod resolve;
pub mod retry;

#[cfg(test)]
pub(crate) mod testing;

pub use pipeline::{Pipeline, SyncSettings};
