//! # Limpieza Periódica de Jobs
//! src/jobs/sweeper.rs
//!
//! Cada `cleanup_interval` busca jobs terminados hace más de la ventana de
//! retención, borra su artefacto de disco y elimina el registro.
//!
//! Política: el borrado del archivo es best-effort. Si falla se registra un
//! warning y el registro se elimina igual; el archivo queda huérfano.

use crate::jobs::store::JobStore;
use crate::metrics::{JobEvent, MetricsCollector};
use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Resumen de una pasada de limpieza
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Registros eliminados
    pub removed: usize,

    /// Artefactos borrados de disco
    pub files_deleted: usize,

    /// Artefactos que no se pudieron borrar
    pub delete_failures: usize,
}

pub struct Sweeper {
    store: JobStore,
    retention: Duration,
    interval: Duration,
    metrics: MetricsCollector,
}

impl Sweeper {
    pub fn new(store: JobStore, retention: Duration, interval: Duration, metrics: MetricsCollector) -> Self {
        Self {
            store,
            retention,
            interval,
            metrics,
        }
    }

    /// Lanza la limpieza periódica en un thread dedicado
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("job-sweeper".to_string())
            .spawn(move || self.run())
    }

    pub fn run(&self) {
        tracing::info!(
            retention_secs = self.retention.as_secs(),
            interval_secs = self.interval.as_secs(),
            "Job cleanup worker started"
        );

        loop {
            thread::sleep(self.interval);
            self.sweep();
        }
    }

    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(Utc::now())
    }

    /// Ejecuta una pasada tomando `now` como hora actual
    pub fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let expired = self.store.expired(now, self.retention);
        let mut report = SweepReport::default();

        if expired.is_empty() {
            return report;
        }

        tracing::info!(count = expired.len(), "Cleaning up expired jobs");

        for (job_id, result_path) in expired {
            if let Some(path) = result_path {
                match fs::remove_file(&path) {
                    Ok(()) => {
                        report.files_deleted += 1;
                        tracing::debug!(job_id = %job_id, path = %path.display(), "Deleted result file");
                    }
                    Err(e) => {
                        report.delete_failures += 1;
                        tracing::warn!(
                            job_id = %job_id,
                            path = %path.display(),
                            error = %e,
                            "Could not delete result file"
                        );
                    }
                }
            }

            if self.store.remove(&job_id).is_some() {
                report.removed += 1;
                self.metrics.record_job_event(JobEvent::Evicted);
            }
        }

        tracing::info!(
            removed = report.removed,
            files_deleted = report.files_deleted,
            delete_failures = report.delete_failures,
            "Cleanup complete"
        );

        report
    }
}
