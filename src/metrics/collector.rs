//! # Collector de Métricas
//! src/metrics/collector.rs
//!
//! Recolecta métricas del servidor HTTP y contadores del ciclo de vida
//! de los jobs en tiempo real.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Máximo de latencias a guardar (para calcular percentiles)
const MAX_LATENCY_SAMPLES: usize = 10_000;

/// Eventos del ciclo de vida de un job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobEvent {
    Submitted,
    /// Rechazado por cola llena
    Rejected,
    Completed,
    Failed,
    /// Eliminado por el sweeper
    Evicted,
}

/// Contadores acumulados de jobs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobCounters {
    pub submitted: u64,
    pub rejected: u64,
    pub completed: u64,
    pub failed: u64,
    pub evicted: u64,
}

/// Collector de métricas thread-safe
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsData>>,
    start_time: Instant,
}

/// Datos internos de métricas
#[derive(Default)]
struct MetricsData {
    /// Contador total de requests
    total_requests: u64,

    /// Requests por código de estado
    status_codes: HashMap<u16, u64>,

    /// Latencias registradas (en microsegundos)
    latencies: VecDeque<u64>,

    /// Requests por ruta
    requests_per_path: HashMap<String, u64>,

    /// Threads de conexión activos
    active_threads: u64,

    jobs: JobCounters,
}

impl MetricsCollector {
    /// Crea un nuevo collector de métricas
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsData::default())),
            start_time: Instant::now(),
        }
    }

    // Las métricas no protegen invariantes: si otro thread entró en pánico
    // con el lock tomado, los contadores siguen siendo utilizables.
    fn data(&self) -> MutexGuard<'_, MetricsData> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registra un request atendido
    pub fn record_request(&self, path: &str, status_code: u16, latency: Duration) {
        let mut data = self.data();

        data.total_requests += 1;
        *data.status_codes.entry(status_code).or_insert(0) += 1;

        if data.latencies.len() >= MAX_LATENCY_SAMPLES {
            data.latencies.pop_front();
        }
        data.latencies.push_back(latency.as_micros() as u64);

        *data.requests_per_path.entry(path.to_string()).or_insert(0) += 1;
    }

    /// Registra un evento de job
    pub fn record_job_event(&self, event: JobEvent) {
        let mut data = self.data();
        let counters = &mut data.jobs;
        match event {
            JobEvent::Submitted => counters.submitted += 1,
            JobEvent::Rejected => counters.rejected += 1,
            JobEvent::Completed => counters.completed += 1,
            JobEvent::Failed => counters.failed += 1,
            JobEvent::Evicted => counters.evicted += 1,
        }
    }

    pub fn job_counters(&self) -> JobCounters {
        self.data().jobs
    }

    /// Incrementa el contador de threads activos
    pub fn increment_active_threads(&self) {
        self.data().active_threads += 1;
    }

    /// Decrementa el contador de threads activos
    pub fn decrement_active_threads(&self) {
        let mut data = self.data();
        data.active_threads = data.active_threads.saturating_sub(1);
    }

    pub fn active_threads(&self) -> u64 {
        self.data().active_threads
    }

    /// Obtiene las métricas actuales en formato JSON
    pub fn get_metrics_json(&self) -> serde_json::Value {
        let data = self.data();
        let latencies: Vec<u64> = data.latencies.iter().copied().collect();
        let (p50, p95, p99, avg) = calculate_percentiles(&latencies);
        let stddev = calculate_stddev(&latencies, avg);

        let status_codes: serde_json::Map<String, serde_json::Value> = data
            .status_codes
            .iter()
            .map(|(code, count)| (code.to_string(), (*count).into()))
            .collect();

        // Top 10 rutas más accedidas
        let mut paths: Vec<_> = data.requests_per_path.iter().collect();
        paths.sort_by(|a, b| b.1.cmp(a.1));
        let top_paths: Vec<serde_json::Value> = paths
            .iter()
            .take(10)
            .map(|(path, count)| serde_json::json!({ "path": path, "count": count }))
            .collect();

        serde_json::json!({
            "server": {
                "uptime_seconds": self.start_time.elapsed().as_secs(),
            },
            "requests": {
                "total": data.total_requests,
                "active_threads": data.active_threads,
                "status_codes": status_codes,
                "top_paths": top_paths,
            },
            "latency_us": {
                "p50": p50,
                "p95": p95,
                "p99": p99,
                "avg": avg,
                "stddev": (stddev * 100.0).round() / 100.0,
                "samples": latencies.len(),
            },
            "jobs": data.jobs,
        })
    }

    /// Obtiene un snapshot de las métricas
    pub fn get_snapshot(&self) -> MetricsSnapshot {
        let data = self.data();
        let latencies: Vec<u64> = data.latencies.iter().copied().collect();
        let (p50, p95, p99, avg) = calculate_percentiles(&latencies);

        MetricsSnapshot {
            total_requests: data.total_requests,
            active_threads: data.active_threads,
            uptime_secs: self.start_time.elapsed().as_secs(),
            latency_p50_us: p50,
            latency_p95_us: p95,
            latency_p99_us: p99,
            latency_avg_us: avg,
            jobs: data.jobs,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Calcula percentiles de latencia (p50, p95, p99, promedio)
fn calculate_percentiles(latencies: &[u64]) -> (u64, u64, u64, u64) {
    if latencies.is_empty() {
        return (0, 0, 0, 0);
    }

    let mut sorted = latencies.to_vec();
    sorted.sort_unstable();

    let len = sorted.len();
    let p50 = sorted[len * 50 / 100];
    let p95 = sorted[len * 95 / 100];
    let p99 = sorted[len * 99 / 100];

    let sum: u64 = sorted.iter().sum();
    (p50, p95, p99, sum / len as u64)
}

fn calculate_stddev(latencies: &[u64], avg: u64) -> f64 {
    if latencies.is_empty() {
        return 0.0;
    }

    let variance: f64 = latencies
        .iter()
        .map(|&x| {
            let diff = x as f64 - avg as f64;
            diff * diff
        })
        .sum::<f64>()
        / latencies.len() as f64;

    variance.sqrt()
}

/// Snapshot de métricas (para uso externo)
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub active_threads: u64,
    pub uptime_secs: u64,
    pub latency_p50_us: u64,
    pub latency_p95_us: u64,
    pub latency_p99_us: u64,
    pub latency_avg_us: u64,
    pub jobs: JobCounters,
}
