//! # Image Queue
//! src/lib.rs
//!
//! Servidor HTTP/1.0 que acepta pedidos de generación de imágenes, los
//! encola en una cola acotada y los procesa de a uno en un worker en
//! segundo plano. Los clientes consultan el estado y descargan el
//! resultado por ID; los resultados vencen tras una ventana de retención.
//!
//! ## Arquitectura
//!
//! - `http`: Parsing y construcción de mensajes HTTP/1.0
//! - `router`: Enrutamiento por método y patrón de path
//! - `server`: Servidor TCP, un thread por conexión
//! - `jobs`: Store, cola de admisión, worker, sweeper y handlers
//! - `compute`: Colaborador externo que genera cada imagen
//! - `metrics`: Contadores de requests y de jobs
//! - `config`: Configuración por CLI y variables de entorno
//! - `error`: Errores tipados del motor de jobs
//!
//! ## Ejemplo de uso
//!
//! ```no_run
//! use image_queue::compute::CommandGenerator;
//! use image_queue::config::Config;
//! use image_queue::jobs::{JobManager, JobManagerConfig};
//! use image_queue::metrics::MetricsCollector;
//! use image_queue::server::Server;
//! use std::sync::Arc;
//!
//! let config = Config::default();
//! let metrics = MetricsCollector::new();
//! let generator = Arc::new(CommandGenerator::new(&config.generator_cmd));
//! let manager = JobManager::start(JobManagerConfig::from_config(&config), generator, metrics.clone())
//!     .expect("results folder");
//!
//! let mut server = Server::new(config, Arc::new(manager), metrics);
//! server.run().expect("Error al iniciar servidor");
//! ```

pub mod compute;
pub mod config;
pub mod error;
pub mod http;
pub mod jobs;
pub mod metrics;
pub mod router;
pub mod server;
