//! # Gestor Central de Jobs
//! src/jobs/manager.rs
//!
//! Coordina el ciclo de vida completo: admisión en el store, el worker que
//! consume la cola y la limpieza periódica de resultados vencidos.

use crate::compute::Generator;
use crate::config::Config;
use crate::error::{JobError, Result};
use crate::jobs::backend::JobBackend;
use crate::jobs::params::GenerationParams;
use crate::jobs::store::JobStore;
use crate::jobs::sweeper::Sweeper;
use crate::jobs::types::{ArtifactFile, JobId, JobStatus, ResultView, StatusView};
use crate::jobs::worker::Worker;
use crate::metrics::{JobEvent, MetricsCollector};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Configuración del Job Manager
#[derive(Debug, Clone)]
pub struct JobManagerConfig {
    /// Capacidad máxima de la cola
    pub capacity: usize,

    /// Tiempo que se conserva un job terminado
    pub retention: Duration,

    /// Período del sweeper
    pub cleanup_interval: Duration,

    /// Directorio de artefactos
    pub results_folder: PathBuf,

    /// Espera del worker con la cola vacía
    pub worker_idle: Duration,
}

impl Default for JobManagerConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl JobManagerConfig {
    /// Crea una configuración desde el Config principal
    pub fn from_config(config: &Config) -> Self {
        Self {
            capacity: config.max_queue_size,
            retention: config.retention(),
            cleanup_interval: config.cleanup_interval(),
            results_folder: config.results_folder.clone(),
            worker_idle: config.worker_idle(),
        }
    }
}

/// Gestor central de jobs
#[derive(Clone)]
pub struct JobManager {
    config: JobManagerConfig,
    store: JobStore,
    metrics: MetricsCollector,
}

impl JobManager {
    /// Crea el manager sin lanzar threads
    pub fn new(config: JobManagerConfig, metrics: MetricsCollector) -> Self {
        let store = JobStore::new(config.capacity);
        Self {
            config,
            store,
            metrics,
        }
    }

    /// Crea el directorio de resultados y lanza el worker y el sweeper
    pub fn start(
        config: JobManagerConfig,
        generator: Arc<dyn Generator>,
        metrics: MetricsCollector,
    ) -> io::Result<Self> {
        fs::create_dir_all(&config.results_folder)?;

        let manager = Self::new(config, metrics);
        manager.worker(generator).spawn()?;
        manager.sweeper().spawn()?;

        tracing::info!(
            capacity = manager.store.capacity(),
            results = %manager.config.results_folder.display(),
            "Job manager started"
        );

        Ok(manager)
    }

    /// Worker que comparte el store de este manager
    pub fn worker(&self, generator: Arc<dyn Generator>) -> Worker {
        Worker::new(
            self.store.clone(),
            generator,
            self.config.results_folder.clone(),
            self.config.worker_idle,
            self.metrics.clone(),
        )
    }

    pub fn sweeper(&self) -> Sweeper {
        Sweeper::new(
            self.store.clone(),
            self.config.retention,
            self.config.cleanup_interval,
            self.metrics.clone(),
        )
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn config(&self) -> &JobManagerConfig {
        &self.config
    }

    /// Lee el artefacto de un job completado.
    ///
    /// Si el archivo falta porque el sweeper desalojó el job entre el
    /// snapshot y la lectura, el job ya no existe: `NotFound`, no 500.
    fn read_completed(&self, job_id: &JobId, path: PathBuf) -> Result<ArtifactFile> {
        match Self::read_artifact(job_id, path) {
            Err(JobError::MissingArtifact { .. }) if self.store.get(job_id).is_none() => {
                Err(JobError::NotFound(*job_id))
            }
            other => other,
        }
    }

    fn read_artifact(job_id: &JobId, path: PathBuf) -> Result<ArtifactFile> {
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(JobError::MissingArtifact {
                    job_id: *job_id,
                    path,
                });
            }
            Err(e) => return Err(JobError::Io(e)),
        };

        let etag = format!("{:x}", Sha256::digest(&bytes));
        Ok(ArtifactFile { path, bytes, etag })
    }
}

impl JobBackend for JobManager {
    fn submit(&self, params: GenerationParams) -> Result<JobId> {
        match self.store.submit(params) {
            Ok(job_id) => {
                self.metrics.record_job_event(JobEvent::Submitted);
                tracing::info!(
                    job_id = %job_id,
                    queue_len = self.store.queue_len(),
                    "Job queued"
                );
                Ok(job_id)
            }
            Err(e) => {
                if matches!(e, JobError::QueueFull { .. }) {
                    self.metrics.record_job_event(JobEvent::Rejected);
                    tracing::warn!(error = %e, "Rejected job submission");
                }
                Err(e)
            }
        }
    }

    fn status(&self, id: &JobId) -> Result<StatusView> {
        self.store.status_view(id).ok_or(JobError::NotFound(*id))
    }

    fn result(&self, id: &JobId) -> Result<ResultView> {
        // La lectura del archivo ocurre fuera del lock
        let info = self.store.get(id).ok_or(JobError::NotFound(*id))?;

        match info.status {
            JobStatus::Completed => {
                let path = info.result_path.ok_or_else(|| JobError::MissingArtifact {
                    job_id: *id,
                    path: PathBuf::new(),
                })?;
                self.read_completed(id, path).map(ResultView::Ready)
            }
            JobStatus::Failed => Ok(ResultView::Failed(info.error_message.unwrap_or_default())),
            status => Ok(ResultView::Pending(status)),
        }
    }

    fn is_full(&self) -> bool {
        self.store.is_full()
    }

    fn queue_stats(&self) -> serde_json::Value {
        let stats = self.store.stats();
        serde_json::json!({
            "capacity": stats.capacity,
            "queued": stats.queued,
            "processing": stats.processing,
            "completed": stats.completed,
            "failed": stats.failed,
            "full": stats.queued >= stats.capacity,
        })
    }
}
