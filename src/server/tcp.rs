//! # Servidor TCP Concurrente
//! src/server/tcp.rs
//!
//! Servidor HTTP/1.0 con un thread por conexión. Cada conexión atiende un
//! único request: se lee el head, se valida `Content-Length` contra el
//! límite de subida y recién entonces se lee el body.

use crate::config::{Config, BYTES_PER_MB};
use crate::http::request::find_head_end;
use crate::http::{Method, ParseError, Request, Response, StatusCode};
use crate::jobs::backend::JobBackend;
use crate::jobs::handlers as job_handlers;
use crate::metrics::MetricsCollector;
use crate::router::Router;
use std::fs;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Tamaño máximo de request line + headers
const MAX_HEAD_BYTES: usize = 16 * 1024;

/// Un cliente que deja de enviar datos no retiene el thread para siempre
const READ_TIMEOUT: Duration = Duration::from_secs(30);

const READ_CHUNK: usize = 8192;

/// Resultado de leer un request del socket
#[derive(Debug)]
pub enum ReadOutcome {
    /// El peer cerró sin enviar nada
    Closed,
    Request(Request),
    /// `Content-Length` supera el límite; el body no se leyó
    TooLarge,
    Malformed(ParseError),
}

/// Lee un request completo respetando el límite de body
pub fn read_request(stream: &mut impl Read, max_body_bytes: usize) -> io::Result<ReadOutcome> {
    let mut buffer = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    // 1. Head
    let head_end = loop {
        if let Some(end) = find_head_end(&buffer) {
            break end;
        }
        if buffer.len() > MAX_HEAD_BYTES {
            return Ok(ReadOutcome::Malformed(ParseError::IncompleteRequest));
        }

        let read = stream.read(&mut chunk)?;
        if read == 0 {
            // EOF antes del terminador: se parsea lo recibido
            if buffer.is_empty() {
                return Ok(ReadOutcome::Closed);
            }
            return Ok(match Request::parse(&buffer) {
                Ok(request) => ReadOutcome::Request(request),
                Err(e) => ReadOutcome::Malformed(e),
            });
        }
        buffer.extend_from_slice(&chunk[..read]);
    };

    let head = match Request::parse(&buffer[..head_end]) {
        Ok(head) => head,
        Err(e) => return Ok(ReadOutcome::Malformed(e)),
    };

    // 2. Body
    let content_length = head.content_length().unwrap_or(0);
    if content_length > max_body_bytes {
        return Ok(ReadOutcome::TooLarge);
    }

    let total = head_end + content_length;
    while buffer.len() < total {
        let read = stream.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
    }
    buffer.truncate(total.min(buffer.len()));

    Ok(match Request::parse(&buffer) {
        Ok(request) => ReadOutcome::Request(request),
        Err(e) => ReadOutcome::Malformed(e),
    })
}

/// Etiqueta de métricas: los IDs se colapsan para acotar la cardinalidad
fn metrics_path(path: &str) -> String {
    let mut segments = path.trim_matches('/').split('/').filter(|s| !s.is_empty());
    match (segments.next(), segments.next()) {
        (Some(first), Some(_)) => format!("/{}/{{id}}", first),
        (Some(first), None) => format!("/{}", first),
        _ => "/".to_string(),
    }
}

/// Servidor HTTP/1.0 concurrente con métricas
pub struct Server {
    config: Config,
    router: Arc<Router>,
    metrics: MetricsCollector,
    listener: Option<TcpListener>,
}

impl Server {
    pub fn new(config: Config, backend: Arc<dyn JobBackend>, metrics: MetricsCollector) -> Self {
        let router = Self::build_router(&config, backend, metrics.clone());

        Self {
            config,
            router: Arc::new(router),
            metrics,
            listener: None,
        }
    }

    /// Registra las rutas de la API
    pub fn build_router(config: &Config, backend: Arc<dyn JobBackend>, metrics: MetricsCollector) -> Router {
        let mut router = Router::new();

        let submit_backend = Arc::clone(&backend);
        router.register(Method::POST, "/process-image", move |req, _| {
            job_handlers::submit_handler(req, submit_backend.as_ref())
        });

        let status_backend = Arc::clone(&backend);
        router.register(Method::GET, "/status/{id}", move |_, params| {
            job_handlers::status_handler(params.get("id").unwrap_or_default(), status_backend.as_ref())
        });

        let result_backend = Arc::clone(&backend);
        router.register(Method::GET, "/result/{id}", move |req, params| {
            job_handlers::result_handler(req, params.get("id").unwrap_or_default(), result_backend.as_ref())
        });

        router.register(Method::GET, "/metrics", move |_, _| {
            let mut body = metrics.get_metrics_json();
            body["job_queue"] = backend.queue_stats();
            Response::json(StatusCode::Ok, &body)
        });

        let index_path = config.static_dir.join("index.html");
        router.register(Method::GET, "/", move |_, _| index_handler(&index_path));

        router
    }

    /// Abre el socket. Retorna la dirección real (útil con puerto 0).
    pub fn bind(&mut self) -> io::Result<SocketAddr> {
        let listener = TcpListener::bind(self.config.address())?;
        let address = listener.local_addr()?;
        self.listener = Some(listener);
        Ok(address)
    }

    /// Acepta conexiones para siempre, una por thread
    pub fn run(&mut self) -> io::Result<()> {
        let listener = match self.listener.take() {
            Some(listener) => listener,
            None => TcpListener::bind(self.config.address())?,
        };

        tracing::info!(address = %listener.local_addr()?, "Server listening (one thread per connection)");
        let max_body_bytes = self.config.max_upload_bytes();

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let router = Arc::clone(&self.router);
                    let metrics = self.metrics.clone();

                    metrics.increment_active_threads();
                    let spawned = thread::Builder::new()
                        .name("http-conn".to_string())
                        .spawn({
                            let metrics = metrics.clone();
                            move || {
                                if let Err(e) = Self::handle_connection(stream, &router, &metrics, max_body_bytes) {
                                    tracing::warn!(error = %e, "Connection error");
                                }
                                metrics.decrement_active_threads();
                            }
                        });

                    if let Err(e) = spawned {
                        metrics.decrement_active_threads();
                        tracing::error!(error = %e, "Could not spawn connection thread");
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Error accepting connection");
                }
            }
        }

        Ok(())
    }

    /// Atiende una conexión completa: leer, rutear, responder
    pub fn handle_connection(
        mut stream: TcpStream,
        router: &Router,
        metrics: &MetricsCollector,
        max_body_bytes: usize,
    ) -> io::Result<()> {
        let start = Instant::now();
        let request_id = Uuid::new_v4().simple().to_string();
        let thread_id = format!("{:?}", thread::current().id());

        stream.set_read_timeout(Some(READ_TIMEOUT))?;

        let (mut response, method, path) = match read_request(&mut stream, max_body_bytes)? {
            ReadOutcome::Closed => {
                tracing::debug!("Connection closed without data");
                return Ok(());
            }
            ReadOutcome::Request(request) => {
                let response = router.route(&request);
                (response, Some(request.method()), request.path().to_string())
            }
            ReadOutcome::TooLarge => {
                let max_upload_mb = max_body_bytes / BYTES_PER_MB;
                tracing::warn!(max_upload_mb, "Rejected upload over size limit");
                let response = Response::error_with_message(
                    StatusCode::PayloadTooLarge,
                    &format!("File upload is too large. Maximum size is {}MB.", max_upload_mb),
                )
                .with_header("Connection", "close")
                .with_header("Access-Control-Allow-Origin", "*");
                (response, None, "/process-image".to_string())
            }
            ReadOutcome::Malformed(e) => {
                tracing::warn!(error = %e, "Malformed request");
                let response = Response::error(StatusCode::BadRequest, &format!("Invalid request: {}", e))
                    .with_header("Connection", "close")
                    .with_header("Access-Control-Allow-Origin", "*");
                (response, None, "/error".to_string())
            }
        };

        // Headers de observabilidad
        response.add_header("X-Request-Id", &request_id);
        response.add_header("X-Worker-Thread", &thread_id);
        response.add_header("X-Worker-Pid", &std::process::id().to_string());

        stream.write_all(&response.to_bytes())?;
        stream.flush()?;

        let latency = start.elapsed();
        let status = response.status();
        metrics.record_request(&metrics_path(&path), status.as_u16(), latency);

        let method = method.map(|m| m.as_str()).unwrap_or("-");
        let latency_ms = latency.as_secs_f64() * 1000.0;

        // El polling de estado exitoso es rutinario
        if status == StatusCode::Ok && path.starts_with("/status/") {
            tracing::debug!(request_id = %request_id, method, path = %path, status = status.as_u16(), latency_ms, "Request served");
        } else {
            tracing::info!(request_id = %request_id, method, path = %path, status = status.as_u16(), latency_ms, "Request served");
        }

        Ok(())
    }
}

/// Sirve el frontend estático, si existe
fn index_handler(index_path: &Path) -> Response {
    match fs::read(index_path) {
        Ok(html) => Response::new(StatusCode::Ok)
            .with_header("Content-Type", "text/html; charset=utf-8")
            .with_body(html),
        Err(e) => {
            tracing::debug!(path = %index_path.display(), error = %e, "Index page not available");
            Response::error_with_message(StatusCode::NotFound, "The requested URL was not found on the server.")
        }
    }
}
