//! # Worker de Generación
//! src/jobs/worker.rs
//!
//! Consumidor único de la cola. Cada iteración:
//!
//! 1. Desencola un job (ya marcado `Processing`) o duerme si no hay nada
//! 2. Llama al generador **fuera del lock**
//! 3. Guarda el artefacto en `<results>/<job_id>.png`
//! 4. Registra `Completed` o `Failed` en el store
//!
//! La falla de un job nunca detiene el loop.

use crate::compute::{Artifact, Generator};
use crate::error::ComputeError;
use crate::jobs::params::GenerationParams;
use crate::jobs::store::JobStore;
use crate::jobs::types::JobId;
use crate::metrics::{JobEvent, MetricsCollector};
use std::fs;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Mensaje registrado cuando el artefacto no se pudo guardar
const PERSIST_FAILED_MESSAGE: &str = "An unexpected server error occurred.";

/// Ruta determinística del artefacto de un job
pub fn result_path_for(results_folder: &Path, job_id: &JobId, extension: &str) -> PathBuf {
    results_folder.join(format!("{}.{}", job_id, extension))
}

/// Worker que procesa los jobs de a uno
pub struct Worker {
    store: JobStore,
    generator: Arc<dyn Generator>,
    results_folder: PathBuf,

    /// Espera cuando la cola está vacía
    idle_interval: Duration,

    metrics: MetricsCollector,
}

impl Worker {
    pub fn new(
        store: JobStore,
        generator: Arc<dyn Generator>,
        results_folder: PathBuf,
        idle_interval: Duration,
        metrics: MetricsCollector,
    ) -> Self {
        Self {
            store,
            generator,
            results_folder,
            idle_interval,
            metrics,
        }
    }

    /// Lanza el loop en un thread dedicado
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("job-worker".to_string())
            .spawn(move || self.run())
    }

    /// Loop principal: corre mientras viva el proceso
    pub fn run(&self) {
        tracing::info!(results = %self.results_folder.display(), "Image generation worker started");

        loop {
            if !self.run_once() {
                thread::sleep(self.idle_interval);
            }
        }
    }

    /// Procesa un job si hay alguno pendiente.
    ///
    /// Retorna `false` si la cola estaba vacía.
    pub fn run_once(&self) -> bool {
        match self.store.dequeue() {
            Some((job_id, params)) => {
                self.process(job_id, params);
                true
            }
            None => false,
        }
    }

    fn process(&self, job_id: JobId, params: GenerationParams) {
        tracing::info!(job_id = %job_id, params = %params.summary(), "Processing job");

        let outcome = self.generate(&job_id, &params);

        // La imagen de entrada se libera antes de escribir el resultado
        drop(params);

        match outcome {
            Ok(artifact) => match self.persist(&job_id, &artifact) {
                Ok(path) => {
                    self.finish_completed(&job_id, path);
                }
                Err(e) => {
                    tracing::error!(job_id = %job_id, error = %e, "Could not save result file");
                    self.finish_failed(&job_id, PERSIST_FAILED_MESSAGE.to_string());
                }
            },
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Job failed: {}", e.user_message());
                self.finish_failed(&job_id, e.user_message().to_string());
            }
        }
    }

    /// Corre el generador aislando un panic: el job queda `Failed` y el loop sigue
    fn generate(&self, job_id: &JobId, params: &GenerationParams) -> Result<Artifact, ComputeError> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.generator.generate(job_id, params)));

        outcome.unwrap_or_else(|payload| {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(ComputeError::Runtime(format!("generator panicked: {}", detail)))
        })
    }

    /// Escribe el artefacto con write + rename para no dejar archivos a medias
    fn persist(&self, job_id: &JobId, artifact: &Artifact) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.results_folder)?;

        let path = result_path_for(&self.results_folder, job_id, artifact.extension);
        let temp_path = path.with_extension(format!("{}.tmp", artifact.extension));

        fs::write(&temp_path, &artifact.bytes)?;
        fs::rename(&temp_path, &path)?;

        Ok(path)
    }

    fn finish_completed(&self, job_id: &JobId, path: PathBuf) {
        if self.store.complete(job_id, path) {
            self.metrics.record_job_event(JobEvent::Completed);
            tracing::info!(job_id = %job_id, "Job completed successfully");
        } else {
            tracing::error!(job_id = %job_id, "Finished job disappeared from the store");
        }
    }

    fn finish_failed(&self, job_id: &JobId, message: String) {
        if self.store.fail(job_id, message) {
            self.metrics.record_job_event(JobEvent::Failed);
        } else {
            tracing::error!(job_id = %job_id, "Failed job disappeared from the store");
        }
    }
}
