//! # Errores del Sistema
//! src/error.rs
//!
//! Taxonomía de errores del motor de jobs:
//!
//! - `QueueFull`: admisión rechazada, el cliente debe reintentar
//! - `Validation`: parámetros malformados, nunca entran al store
//! - `NotFound`: ID desconocido o ya expirado
//! - `MissingArtifact`: job completado cuyo archivo ya no existe (falla interna)
//!
//! Los errores del generador externo (`ComputeError`) nunca escapan del
//! worker: se clasifican y quedan registrados en el job como `Failed`.

use crate::jobs::types::JobId;
use std::path::PathBuf;
use thiserror::Error;

/// Errores visibles para la capa HTTP
#[derive(Error, Debug)]
pub enum JobError {
    #[error("Queue is full (max capacity: {capacity})")]
    QueueFull { capacity: usize },

    #[error("{0}")]
    Validation(String),

    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Result for job {job_id} is missing at {}", path.display())]
    MissingArtifact { job_id: JobId, path: PathBuf },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, JobError>;

/// Fallas reportadas por el generador externo
#[derive(Error, Debug)]
pub enum ComputeError {
    /// El generador se quedó sin memoria (GPU o RAM)
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("runtime error: {0}")]
    Runtime(String),

    /// No se pudo lanzar el proceso del generador
    #[error("failed to launch generator: {0}")]
    Spawn(#[source] std::io::Error),
}

impl ComputeError {
    /// Mensaje que se guarda en el job y ve el cliente.
    ///
    /// El detalle completo solo va a los logs.
    pub fn user_message(&self) -> &'static str {
        match self {
            ComputeError::ResourceExhausted(_) => {
                "Processing failed due to insufficient GPU memory. Try a smaller image size or reduce batch size."
            }
            ComputeError::Runtime(_) | ComputeError::Spawn(_) => {
                "An unexpected error occurred. This may be a resource issue."
            }
        }
    }
}

/// Errores de validación de la configuración
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ConfigError(pub &'static str);
