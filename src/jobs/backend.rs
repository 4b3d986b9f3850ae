//! # Contrato del Backend de Jobs
//! src/jobs/backend.rs
//!
//! Interfaz que consume la capa HTTP. Permite reemplazar la implementación
//! en memoria por otra (p. ej. un broker externo) sin tocar los handlers.

use crate::error::Result;
use crate::jobs::params::GenerationParams;
use crate::jobs::types::{JobId, ResultView, StatusView};

pub trait JobBackend: Send + Sync {
    /// Admite un job o falla con `QueueFull`
    fn submit(&self, params: GenerationParams) -> Result<JobId>;

    fn status(&self, id: &JobId) -> Result<StatusView>;

    /// Artefacto listo, job pendiente o mensaje de falla
    fn result(&self, id: &JobId) -> Result<ResultView>;

    fn is_full(&self) -> bool;

    /// Estadísticas de la cola para `/metrics`
    fn queue_stats(&self) -> serde_json::Value;
}
