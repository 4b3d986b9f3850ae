//! # Generador de Imágenes
//! src/compute/mod.rs
//!
//! El cómputo de cada job (la invocación del modelo) es un colaborador
//! externo, lento y que puede fallar. El worker solo lo conoce a través
//! del trait `Generator`.

pub mod command;

pub use command::CommandGenerator;

use crate::error::ComputeError;
use crate::jobs::params::GenerationParams;
use crate::jobs::types::JobId;

/// Resultado producido por el generador
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub bytes: Vec<u8>,

    /// Extensión del archivo a guardar (sin punto)
    pub extension: &'static str,
}

impl Artifact {
    pub fn png(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            extension: "png",
        }
    }
}

/// Colaborador de cómputo.
///
/// La llamada es bloqueante y puede tardar minutos. Se invoca siempre
/// fuera del lock del store y desde un único worker.
pub trait Generator: Send + Sync {
    fn generate(&self, job_id: &JobId, params: &GenerationParams) -> Result<Artifact, ComputeError>;
}
