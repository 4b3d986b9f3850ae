//! Tests del ciclo de vida de los jobs
//! tests/lifecycle_tests.rs
//!
//! Ejercitan el motor completo (store + worker + sweeper) a través de la
//! API pública, con un generador falso en lugar del proceso externo.

use chrono::Utc;
use image_queue::compute::{Artifact, Generator};
use image_queue::error::{ComputeError, JobError};
use image_queue::jobs::{
    GenerationParams, InputImage, JobBackend, JobId, JobManager, JobManagerConfig, JobStatus, ResultView,
};
use image_queue::metrics::MetricsCollector;
use std::collections::HashMap;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

fn params() -> GenerationParams {
    let mut bytes = PNG_MAGIC.to_vec();
    bytes.extend_from_slice(&[7u8; 16]);
    let image = InputImage::from_upload(bytes, Some("input.png")).unwrap();

    let mut fields = HashMap::new();
    fields.insert("prompt".to_string(), "a lighthouse at dusk".to_string());
    fields.insert("seed".to_string(), "42".to_string());
    GenerationParams::from_fields(&fields, image).unwrap()
}

/// Generador falso: registra el orden y puede simular falta de memoria
struct FakeGenerator {
    calls: Mutex<Vec<JobId>>,
    out_of_memory: bool,
    delay: Duration,
}

impl FakeGenerator {
    fn ok() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            out_of_memory: false,
            delay: Duration::ZERO,
        }
    }

    fn out_of_memory() -> Self {
        Self {
            out_of_memory: true,
            ..Self::ok()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::ok()
        }
    }
}

impl Generator for FakeGenerator {
    fn generate(&self, job_id: &JobId, params: &GenerationParams) -> Result<Artifact, ComputeError> {
        self.calls.lock().unwrap().push(*job_id);
        thread::sleep(self.delay);

        if self.out_of_memory {
            return Err(ComputeError::ResourceExhausted("CUDA out of memory. Tried to allocate 2 GiB".to_string()));
        }

        let mut png = PNG_MAGIC.to_vec();
        png.extend_from_slice(params.prompt.as_bytes());
        png.extend_from_slice(job_id.to_string().as_bytes());
        Ok(Artifact::png(png))
    }
}

/// Generador que entra en panic en la primera llamada y después funciona
struct PanicsOnceGenerator {
    panicked: AtomicBool,
}

impl Generator for PanicsOnceGenerator {
    fn generate(&self, job_id: &JobId, _params: &GenerationParams) -> Result<Artifact, ComputeError> {
        if !self.panicked.swap(true, Ordering::SeqCst) {
            panic!("generator crashed on job {}", job_id);
        }
        Ok(Artifact::png(PNG_MAGIC.to_vec()))
    }
}

fn config(dir: &TempDir, capacity: usize, retention: Duration) -> JobManagerConfig {
    JobManagerConfig {
        capacity,
        retention,
        cleanup_interval: Duration::from_secs(300),
        results_folder: dir.path().join("generated_images"),
        worker_idle: Duration::from_millis(5),
    }
}

fn wait_for_terminal(manager: &JobManager, id: &JobId) -> JobStatus {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let status = manager.status(id).unwrap().status;
        if status.is_terminal() {
            return status;
        }
        assert!(Instant::now() < deadline, "job {} never finished", id);
        thread::sleep(Duration::from_millis(5));
    }
}

fn rank(status: JobStatus) -> u8 {
    match status {
        JobStatus::Queued => 0,
        JobStatus::Processing => 1,
        JobStatus::Completed | JobStatus::Failed => 2,
    }
}

// ==================== Admission ====================

#[test]
fn test_capacity_two_rejects_third_until_dequeue() {
    let dir = TempDir::new().unwrap();
    let manager = JobManager::new(config(&dir, 2, Duration::from_secs(600)), MetricsCollector::new());

    let first = manager.submit(params()).unwrap();
    manager.submit(params()).unwrap();

    let err = manager.submit(params()).unwrap_err();
    assert!(matches!(err, JobError::QueueFull { capacity: 2 }));
    assert_eq!(manager.store().count(), 2);

    // El worker toma un job y libera un lugar
    let generator = Arc::new(FakeGenerator::ok());
    assert!(manager.worker(generator.clone()).run_once());
    assert_eq!(*generator.calls.lock().unwrap(), vec![first]);

    assert!(manager.submit(params()).is_ok());
}

#[test]
fn test_concurrent_submissions_never_exceed_capacity() {
    let dir = TempDir::new().unwrap();
    let manager = JobManager::new(config(&dir, 5, Duration::from_secs(600)), MetricsCollector::new());
    let barrier = Arc::new(Barrier::new(16));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let manager = manager.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                manager.submit(params())
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let accepted = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(JobError::QueueFull { .. })))
        .count();

    assert_eq!(accepted, 5);
    assert_eq!(rejected, 11);
    assert_eq!(manager.store().queue_len(), 5);
    assert_eq!(manager.store().count(), 5);
}

#[test]
fn test_positions_reported_before_worker_starts() {
    let dir = TempDir::new().unwrap();
    let manager = JobManager::new(config(&dir, 10, Duration::from_secs(600)), MetricsCollector::new());

    for k in 1..=4 {
        let id = manager.submit(params()).unwrap();
        let view = manager.status(&id).unwrap();
        assert_eq!(view.status, JobStatus::Queued);
        assert_eq!(view.queue_position, Some(k));
    }
}

// ==================== Processing ====================

#[test]
fn test_worker_processes_in_submission_order() {
    let dir = TempDir::new().unwrap();
    let manager = JobManager::new(config(&dir, 10, Duration::from_secs(600)), MetricsCollector::new());

    let ids: Vec<JobId> = (0..6).map(|_| manager.submit(params()).unwrap()).collect();

    let generator = Arc::new(FakeGenerator::ok());
    let worker = manager.worker(generator.clone());
    while worker.run_once() {}

    assert_eq!(*generator.calls.lock().unwrap(), ids);
    for id in &ids {
        assert_eq!(manager.status(id).unwrap().status, JobStatus::Completed);
    }
}

#[test]
fn test_resource_exhaustion_reported_as_failed() {
    let dir = TempDir::new().unwrap();
    let manager = JobManager::start(
        config(&dir, 10, Duration::from_secs(600)),
        Arc::new(FakeGenerator::out_of_memory()),
        MetricsCollector::new(),
    )
    .unwrap();

    let id = manager.submit(params()).unwrap();
    assert_eq!(wait_for_terminal(&manager, &id), JobStatus::Failed);

    let view = manager.status(&id).unwrap();
    let message = view.error.unwrap();
    assert!(message.contains("insufficient GPU memory"), "{}", message);
    assert!(!message.contains("CUDA"));

    match manager.result(&id).unwrap() {
        ResultView::Failed(result_message) => assert_eq!(result_message, message),
        other => panic!("expected failure, got {:?}", other),
    }
}

#[test]
fn test_worker_survives_generator_panic() {
    let dir = TempDir::new().unwrap();
    let metrics = MetricsCollector::new();
    let manager = JobManager::start(
        config(&dir, 10, Duration::from_secs(600)),
        Arc::new(PanicsOnceGenerator {
            panicked: AtomicBool::new(false),
        }),
        metrics.clone(),
    )
    .unwrap();

    let first = manager.submit(params()).unwrap();
    let second = manager.submit(params()).unwrap();

    assert_eq!(wait_for_terminal(&manager, &first), JobStatus::Failed);
    assert_eq!(wait_for_terminal(&manager, &second), JobStatus::Completed);

    assert!(matches!(manager.result(&first).unwrap(), ResultView::Failed(_)));
    assert!(matches!(manager.result(&second).unwrap(), ResultView::Ready(_)));
    assert_eq!(metrics.job_counters().failed, 1);
    assert_eq!(metrics.job_counters().completed, 1);

    // El job fallido es elegible para la limpieza
    let report = manager.sweeper().sweep_at(Utc::now() + chrono::Duration::seconds(601));
    assert_eq!(report.removed, 2);
}

#[test]
fn test_status_never_regresses() {
    let dir = TempDir::new().unwrap();
    let manager = JobManager::start(
        config(&dir, 10, Duration::from_secs(600)),
        Arc::new(FakeGenerator::slow(Duration::from_millis(20))),
        MetricsCollector::new(),
    )
    .unwrap();

    let ids: Vec<JobId> = (0..3).map(|_| manager.submit(params()).unwrap()).collect();
    let mut last_seen: HashMap<JobId, u8> = HashMap::new();

    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let mut all_done = true;
        for id in &ids {
            let status = manager.status(id).unwrap().status;
            let current = rank(status);
            let previous = last_seen.insert(*id, current).unwrap_or(0);
            assert!(current >= previous, "job {} regressed to {}", id, status);
            all_done &= status.is_terminal();
        }
        if all_done {
            break;
        }
        assert!(Instant::now() < deadline, "jobs never finished");
        thread::sleep(Duration::from_millis(2));
    }

    for id in &ids {
        assert_eq!(manager.status(id).unwrap().status, JobStatus::Completed);
    }
}

// ==================== Results ====================

#[test]
fn test_result_retrieval_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let manager = JobManager::new(config(&dir, 10, Duration::from_secs(600)), MetricsCollector::new());
    let id = manager.submit(params()).unwrap();
    manager.worker(Arc::new(FakeGenerator::ok())).run_once();

    let first = match manager.result(&id).unwrap() {
        ResultView::Ready(file) => file,
        other => panic!("expected ready, got {:?}", other),
    };
    assert!(first.bytes.starts_with(&PNG_MAGIC));
    assert_eq!(first.path, dir.path().join("generated_images").join(format!("{}.png", id)));

    for _ in 0..3 {
        assert_eq!(manager.result(&id).unwrap(), ResultView::Ready(first.clone()));
    }
}

// ==================== Eviction ====================

#[test]
fn test_completed_job_evicted_after_retention() {
    let dir = TempDir::new().unwrap();
    let retention = Duration::from_secs(600);
    let metrics = MetricsCollector::new();
    let manager = JobManager::new(config(&dir, 10, retention), metrics.clone());

    let id = manager.submit(params()).unwrap();
    manager.worker(Arc::new(FakeGenerator::ok())).run_once();
    let path = manager.store().get(&id).unwrap().result_path.unwrap();
    assert!(path.exists());

    // Dentro de la ventana: nada cambia
    let report = manager.sweeper().sweep();
    assert_eq!(report.removed, 0);
    assert!(manager.status(&id).is_ok());

    // Pasada la ventana
    let later = Utc::now() + chrono::Duration::seconds(601);
    let report = manager.sweeper().sweep_at(later);
    assert_eq!(report.removed, 1);
    assert_eq!(report.files_deleted, 1);

    assert!(matches!(manager.status(&id), Err(JobError::NotFound(_))));
    assert!(matches!(manager.result(&id), Err(JobError::NotFound(_))));
    assert!(!path.exists());
    assert_eq!(metrics.job_counters().evicted, 1);
}

#[test]
fn test_deleted_artifact_reported_as_missing() {
    let dir = TempDir::new().unwrap();
    let manager = JobManager::new(config(&dir, 10, Duration::from_secs(600)), MetricsCollector::new());
    let id = manager.submit(params()).unwrap();
    manager.worker(Arc::new(FakeGenerator::ok())).run_once();

    let path = manager.store().get(&id).unwrap().result_path.unwrap();
    fs::remove_file(&path).unwrap();

    assert!(matches!(manager.result(&id), Err(JobError::MissingArtifact { .. })));
    // El estado sigue siendo Completed: la falla es interna
    assert_eq!(manager.status(&id).unwrap().status, JobStatus::Completed);
}
