//! # Configuración del Servidor
//! src/config.rs
//!
//! Configuración del servidor con soporte para argumentos CLI y variables
//! de entorno. Se lee una vez al arrancar y no cambia después.
//!
//! ## Ejemplos de uso
//!
//! ### CLI
//! ```bash
//! ./image_queue --port 5000 \
//!   --max-queue-size 10 \
//!   --job-result-ttl 600 \
//!   --generator-cmd "python3 generate.py"
//! ```
//!
//! ### Variables de entorno
//! ```bash
//! MAX_QUEUE_SIZE=20 RESULTS_FOLDER=/var/lib/images ./image_queue
//! ```

use crate::error::ConfigError;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

pub const BYTES_PER_MB: usize = 1024 * 1024;

/// Configuración del servidor de jobs de imágenes
#[derive(Debug, Clone, Parser)]
#[command(name = "image_queue")]
#[command(about = "Servidor HTTP con cola acotada de trabajos de generación de imágenes")]
#[command(version)]
pub struct Config {
    /// Puerto en el que escucha el servidor
    #[arg(short, long, default_value = "5000", env = "HTTP_PORT")]
    pub port: u16,

    /// Host/IP en el que escucha
    #[arg(long, default_value = "0.0.0.0", env = "HTTP_HOST")]
    pub host: String,

    // === Cola ===
    /// Capacidad máxima de la cola de jobs pendientes
    #[arg(long = "max-queue-size", default_value = "10", env = "MAX_QUEUE_SIZE")]
    pub max_queue_size: usize,

    /// Tamaño máximo de la imagen subida en MB
    #[arg(long = "max-upload-mb", default_value = "10", env = "MAX_UPLOAD_MB")]
    pub max_upload_mb: usize,

    /// Milisegundos que duerme el worker cuando la cola está vacía
    #[arg(long = "worker-idle-ms", default_value = "100", env = "WORKER_IDLE_MS")]
    pub worker_idle_ms: u64,

    // === Resultados ===
    /// Segundos que se conservan los resultados de un job terminado
    #[arg(long = "job-result-ttl", default_value = "600", env = "JOB_RESULT_TTL")]
    pub job_result_ttl_secs: u64,

    /// Cada cuántos segundos corre la limpieza
    #[arg(long = "cleanup-interval", default_value = "300", env = "CLEANUP_INTERVAL")]
    pub cleanup_interval_secs: u64,

    /// Directorio donde se guardan las imágenes generadas
    #[arg(long = "results-folder", default_value = "generated_images", env = "RESULTS_FOLDER")]
    pub results_folder: PathBuf,

    // === Generador ===
    /// Programa externo que genera cada imagen (stdin: imagen, stdout: PNG)
    #[arg(long = "generator-cmd", default_value = "image-generator", env = "GENERATOR_CMD")]
    pub generator_cmd: String,

    /// Directorio con el frontend estático (index.html)
    #[arg(long = "static-dir", default_value = "static", env = "STATIC_DIR")]
    pub static_dir: PathBuf,

    /// Nivel de log por defecto si RUST_LOG no está definido
    #[arg(long = "log-level", default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,
}

impl Config {
    /// Crea una nueva configuración parseando argumentos CLI y entorno
    pub fn new() -> Self {
        Config::parse()
    }

    /// Obtiene la dirección completa para bind (host:port)
    ///
    /// # Ejemplo
    /// ```rust
    /// use image_queue::config::Config;
    ///
    /// let config = Config::default();
    /// assert_eq!(config.address(), "0.0.0.0:5000");
    /// ```
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Límite del body de `POST /process-image` en bytes
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(BYTES_PER_MB)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.job_result_ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn worker_idle(&self) -> Duration {
        Duration::from_millis(self.worker_idle_ms)
    }

    /// Valida la configuración
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_queue_size == 0 {
            return Err(ConfigError("Max queue size must be >= 1"));
        }
        if self.max_upload_mb == 0 {
            return Err(ConfigError("Max upload size must be >= 1 MB"));
        }
        if self.job_result_ttl_secs == 0 {
            return Err(ConfigError("Job result TTL must be > 0"));
        }
        if self.cleanup_interval_secs == 0 {
            return Err(ConfigError("Cleanup interval must be > 0"));
        }
        if self.worker_idle_ms == 0 {
            return Err(ConfigError("Worker idle interval must be > 0"));
        }
        if self.results_folder.as_os_str().is_empty() {
            return Err(ConfigError("Results folder must not be empty"));
        }
        if self.generator_cmd.trim().is_empty() {
            return Err(ConfigError("Generator command must not be empty"));
        }

        Ok(())
    }

    /// Registra un resumen de la configuración
    pub fn print_summary(&self) {
        tracing::info!(address = %self.address(), "Network");
        tracing::info!(
            max_queue_size = self.max_queue_size,
            max_upload_mb = self.max_upload_mb,
            worker_idle_ms = self.worker_idle_ms,
            "Queue"
        );
        tracing::info!(
            results_folder = %self.results_folder.display(),
            ttl_secs = self.job_result_ttl_secs,
            cleanup_interval_secs = self.cleanup_interval_secs,
            "Results"
        );
        tracing::info!(
            generator = %self.generator_cmd,
            static_dir = %self.static_dir.display(),
            "Generator"
        );
    }
}

impl Default for Config {
    /// Configuración por defecto
    fn default() -> Self {
        Self {
            port: 5000,
            host: "0.0.0.0".to_string(),
            max_queue_size: 10,
            max_upload_mb: 10,
            worker_idle_ms: 100,
            job_result_ttl_secs: 600,
            cleanup_interval_secs: 300,
            results_folder: PathBuf::from("generated_images"),
            generator_cmd: "image-generator".to_string(),
            static_dir: PathBuf::from("static"),
            log_level: "info".to_string(),
        }
    }
}
