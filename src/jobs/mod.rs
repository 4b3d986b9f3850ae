//! # Sistema de Jobs
//! src/jobs/mod.rs
//!
//! Motor de jobs de generación de imágenes: cola acotada en memoria, un
//! worker que procesa de a un job y un sweeper que elimina resultados
//! vencidos.
//!
//! ## Endpoints
//!
//! - `POST /process-image` - Encolar job (202, o 503 si la cola está llena)
//! - `GET /status/{id}` - Consultar estado y posición en la cola
//! - `GET /result/{id}` - Descargar la imagen generada

pub mod backend;
pub mod handlers;
pub mod manager;
pub mod params;
pub mod store;
pub mod sweeper;
pub mod types;
pub mod worker;

pub use backend::JobBackend;
pub use manager::{JobManager, JobManagerConfig};
pub use params::{GenerationParams, ImageFormat, InputImage};
pub use store::{JobStore, StoreStats};
pub use sweeper::{SweepReport, Sweeper};
pub use types::{ArtifactFile, JobId, JobInfo, JobStatus, ResultView, StatusView};
pub use worker::Worker;
