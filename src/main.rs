//! # Image Queue - Entry Point
//! src/main.rs
//!
//! Arranque del servidor:
//! 1. Parsear y validar la configuración
//! 2. Inicializar el logging
//! 3. Crear el directorio de resultados y lanzar worker + sweeper
//! 4. Atender HTTP para siempre

use image_queue::compute::CommandGenerator;
use image_queue::config::Config;
use image_queue::jobs::{JobManager, JobManagerConfig};
use image_queue::metrics::MetricsCollector;
use image_queue::server::Server;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() {
    let config = Config::new();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    }

    tracing::info!("Image Queue HTTP/1.0 Server v{}", env!("CARGO_PKG_VERSION"));
    config.print_summary();

    let metrics = MetricsCollector::new();
    let generator = Arc::new(CommandGenerator::new(&config.generator_cmd));

    let manager = match JobManager::start(JobManagerConfig::from_config(&config), generator, metrics.clone()) {
        Ok(manager) => manager,
        Err(e) => {
            tracing::error!(
                error = %e,
                folder = %config.results_folder.display(),
                "Could not start job manager"
            );
            std::process::exit(1);
        }
    };

    let mut server = Server::new(config, Arc::new(manager), metrics);
    if let Err(e) = server.run() {
        tracing::error!(error = %e, "Fatal server error");
        std::process::exit(1);
    }
}
