//! # Store de Jobs y Cola de Admisión
//! src/jobs/store.rs
//!
//! Única fuente de verdad del estado de los jobs. El mapa de registros y la
//! cola FIFO de IDs pendientes viven bajo **un solo Mutex**, de modo que
//! ningún observador ve un job `Queued` fuera de la cola ni un job en la
//! cola que no esté `Queued`.
//!
//! Las secciones críticas son cortas: tomar el lock, mutar, soltar. Nunca
//! se hace I/O ni se llama al generador con el lock tomado.

use crate::error::{JobError, Result};
use crate::jobs::params::GenerationParams;
use crate::jobs::types::{JobId, JobInfo, JobRecord, JobStatus, StatusView};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Estado protegido por el lock
#[derive(Debug, Default)]
struct JobTable {
    records: HashMap<JobId, JobRecord>,

    /// IDs pendientes en orden de llegada
    queue: VecDeque<JobId>,
}

/// Store thread-safe con cola de admisión acotada
#[derive(Debug, Clone)]
pub struct JobStore {
    inner: Arc<Mutex<JobTable>>,

    /// Capacidad máxima de la cola
    capacity: usize,
}

impl JobStore {
    /// Crea un store vacío con la capacidad de cola indicada
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(JobTable::default())),
            capacity,
        }
    }

    /// Un lock envenenado significa que otro thread entró en pánico a
    /// mitad de una transición: el store ya no es confiable.
    fn lock(&self) -> MutexGuard<'_, JobTable> {
        self.inner.lock().expect("job store lock poisoned")
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Admite un job nuevo.
    ///
    /// La verificación de capacidad y el encolado son atómicos. Si la cola
    /// está llena no se crea ningún registro.
    pub fn submit(&self, params: GenerationParams) -> Result<JobId> {
        let mut table = self.lock();

        if table.queue.len() >= self.capacity {
            return Err(JobError::QueueFull {
                capacity: self.capacity,
            });
        }

        let id = JobId::new();
        table
            .records
            .insert(id, JobRecord::new(id, params, Utc::now()));
        table.queue.push_back(id);

        Ok(id)
    }

    /// Desencola el job más antiguo y lo marca `Processing` en la misma
    /// sección crítica.
    ///
    /// Retorna `None` si no hay jobs pendientes.
    pub fn dequeue(&self) -> Option<(JobId, GenerationParams)> {
        let mut table = self.lock();
        let id = table.queue.pop_front()?;

        let record = table
            .records
            .get_mut(&id)
            .expect("queued job missing from store");
        let params = record
            .start(Utc::now())
            .expect("queued job without parameters");

        Some((id, params))
    }

    /// Posición 1-based del job en la cola, si sigue `Queued`
    pub fn queue_position(&self, id: &JobId) -> Option<usize> {
        let table = self.lock();
        Self::position_in(&table, id)
    }

    fn position_in(table: &JobTable, id: &JobId) -> Option<usize> {
        table
            .queue
            .iter()
            .position(|queued| queued == id)
            .map(|idx| idx + 1)
    }

    /// Estado y posición leídos bajo el mismo lock
    pub fn status_view(&self, id: &JobId) -> Option<StatusView> {
        let table = self.lock();
        let record = table.records.get(id)?;

        let queue_position = if record.status() == JobStatus::Queued {
            Self::position_in(&table, id)
        } else {
            None
        };

        Some(StatusView {
            job_id: *id,
            status: record.status(),
            queue_position,
            error: record.error_message().map(str::to_string),
        })
    }

    /// Registra el éxito del job. Retorna `false` si el job ya no existe.
    pub fn complete(&self, id: &JobId, result_path: PathBuf) -> bool {
        let mut table = self.lock();
        match table.records.get_mut(id) {
            Some(record) => {
                record.complete(result_path, Utc::now());
                true
            }
            None => false,
        }
    }

    /// Registra la falla del job. Retorna `false` si el job ya no existe.
    pub fn fail(&self, id: &JobId, error_message: String) -> bool {
        let mut table = self.lock();
        match table.records.get_mut(id) {
            Some(record) => {
                record.fail(error_message, Utc::now());
                true
            }
            None => false,
        }
    }

    /// Obtiene una copia del registro
    pub fn get(&self, id: &JobId) -> Option<JobInfo> {
        let table = self.lock();
        table.records.get(id).map(JobRecord::info)
    }

    /// Jobs terminados hace más de `retention`, con la ruta de su artefacto
    pub fn expired(&self, now: DateTime<Utc>, retention: Duration) -> Vec<(JobId, Option<PathBuf>)> {
        let table = self.lock();
        table
            .records
            .values()
            .filter(|record| record.is_expired(now, retention))
            .map(|record| (record.id(), record.result_path().map(PathBuf::from)))
            .collect()
    }

    /// Elimina un registro terminado.
    ///
    /// Los jobs en cola o en proceso nunca se eliminan.
    pub fn remove(&self, id: &JobId) -> Option<JobInfo> {
        let mut table = self.lock();
        let terminal = table
            .records
            .get(id)
            .map(|record| record.status().is_terminal())?;

        if !terminal {
            return None;
        }
        table.records.remove(id).map(|record| record.info())
    }

    /// Número de jobs almacenados
    pub fn count(&self) -> usize {
        self.lock().records.len()
    }

    /// Número de jobs pendientes en la cola
    pub fn queue_len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_full(&self) -> bool {
        self.queue_len() >= self.capacity
    }

    /// Estadísticas del store
    pub fn stats(&self) -> StoreStats {
        let table = self.lock();
        let mut stats = StoreStats {
            capacity: self.capacity,
            queued: table.queue.len(),
            ..StoreStats::default()
        };

        for record in table.records.values() {
            match record.status() {
                JobStatus::Queued => {}
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }

        stats
    }
}

/// Estadísticas del store
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct StoreStats {
    pub capacity: usize,
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}
