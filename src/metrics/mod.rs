//! # Sistema de Métricas
//! src/metrics/mod.rs
//!
//! Recolección y agregación de métricas del servidor:
//! - Contadores de requests
//! - Latencias (p50, p95, p99)
//! - Threads de conexión activos
//! - Eventos del ciclo de vida de los jobs

pub mod collector;

pub use collector::{JobCounters, JobEvent, MetricsCollector};
