//! # Tipos y Estructuras para el Sistema de Jobs
//! src/jobs/types.rs
//!
//! Define los tipos fundamentales del ciclo de vida de un job:
//!
//! ```text
//! Queued → Processing → Completed
//!                     ↘ Failed
//! ```
//!
//! `Completed` y `Failed` son estados absorbentes.

use crate::jobs::params::GenerationParams;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Identificador único de un job (UUID v4, nunca se reutiliza)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(JobId)
    }
}

/// Estado de un job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Job en cola esperando ejecución
    Queued,

    /// Job ejecutándose en el worker
    Processing,

    /// Job completado, el artefacto está en disco
    Completed,

    /// Job falló con error
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registro de un job. Solo el `JobStore` lo posee.
#[derive(Debug)]
pub struct JobRecord {
    id: JobId,
    status: JobStatus,

    /// Parámetros de entrada; el worker los toma al desencolar
    params: Option<GenerationParams>,

    submit_time: DateTime<Utc>,
    start_time: Option<DateTime<Utc>>,
    completion_time: Option<DateTime<Utc>>,

    /// Solo presente en `Completed`
    result_path: Option<PathBuf>,

    /// Solo presente en `Failed`
    error_message: Option<String>,
}

impl JobRecord {
    /// Crea un registro nuevo en estado `Queued`
    pub fn new(id: JobId, params: GenerationParams, now: DateTime<Utc>) -> Self {
        Self {
            id,
            status: JobStatus::Queued,
            params: Some(params),
            submit_time: now,
            start_time: None,
            completion_time: None,
            result_path: None,
            error_message: None,
        }
    }

    /// Pasa a `Processing` y entrega los parámetros al worker.
    ///
    /// El registro deja de retener el payload (la imagen puede pesar MBs).
    pub fn start(&mut self, now: DateTime<Utc>) -> Option<GenerationParams> {
        assert_eq!(
            self.status,
            JobStatus::Queued,
            "job {} started from state {}",
            self.id,
            self.status
        );
        self.status = JobStatus::Processing;
        self.start_time = Some(now);
        self.params.take()
    }

    /// Marca el job como completado
    pub fn complete(&mut self, result_path: PathBuf, now: DateTime<Utc>) {
        self.assert_processing();
        self.status = JobStatus::Completed;
        self.result_path = Some(result_path);
        self.completion_time = Some(now);
    }

    /// Marca el job como fallido
    pub fn fail(&mut self, error_message: String, now: DateTime<Utc>) {
        self.assert_processing();
        self.status = JobStatus::Failed;
        self.error_message = Some(error_message);
        self.completion_time = Some(now);
    }

    fn assert_processing(&self) {
        assert_eq!(
            self.status,
            JobStatus::Processing,
            "job {} finished from state {}",
            self.id,
            self.status
        );
    }

    /// Indica si el job terminó hace más de `retention`.
    ///
    /// Jobs sin `completion_time` nunca expiran.
    pub fn is_expired(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        match self.completion_time {
            Some(done) => (now - done)
                .to_std()
                .map(|age| age > retention)
                .unwrap_or(false),
            None => false,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    #[cfg(test)]
    pub fn has_params(&self) -> bool {
        self.params.is_some()
    }

    pub fn result_path(&self) -> Option<&Path> {
        self.result_path.as_deref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Copia liviana del registro (sin los parámetros)
    pub fn info(&self) -> JobInfo {
        JobInfo {
            id: self.id,
            status: self.status,
            submit_time: self.submit_time,
            start_time: self.start_time,
            completion_time: self.completion_time,
            result_path: self.result_path.clone(),
            error_message: self.error_message.clone(),
        }
    }
}

/// Vista de solo lectura de un `JobRecord`
#[derive(Debug, Clone, PartialEq)]
pub struct JobInfo {
    pub id: JobId,
    pub status: JobStatus,
    pub submit_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub completion_time: Option<DateTime<Utc>>,
    pub result_path: Option<PathBuf>,
    pub error_message: Option<String>,
}

/// Respuesta de `/status/{id}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusView {
    pub job_id: JobId,
    pub status: JobStatus,

    /// Posición 1-based en la cola; solo mientras está `Queued`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Artefacto leído de disco para `/result/{id}`
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactFile {
    pub path: PathBuf,
    pub bytes: Vec<u8>,

    /// SHA256 del contenido
    pub etag: String,
}

/// Respuesta de `/result/{id}`
#[derive(Debug, Clone, PartialEq)]
pub enum ResultView {
    Ready(ArtifactFile),

    /// Aún no termina (`Queued` o `Processing`)
    Pending(JobStatus),

    Failed(String),
}
