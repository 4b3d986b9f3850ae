//! Tests de integración para el servidor HTTP
//! tests/integration_test.rs
//!
//! Levantan el servidor completo en `127.0.0.1:0` (puerto efímero) con un
//! generador falso y hablan HTTP/1.0 crudo por TCP.

use image_queue::compute::{Artifact, Generator};
use image_queue::config::Config;
use image_queue::error::ComputeError;
use image_queue::jobs::{GenerationParams, JobId, JobManager, JobManagerConfig};
use image_queue::metrics::MetricsCollector;
use image_queue::server::Server;
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Devuelve la imagen de entrada con el prompt agregado
struct EchoGenerator;

impl Generator for EchoGenerator {
    fn generate(&self, _job_id: &JobId, params: &GenerationParams) -> Result<Artifact, ComputeError> {
        let mut png = params.image.bytes.clone();
        png.extend_from_slice(params.prompt.as_bytes());
        Ok(Artifact::png(png))
    }
}

struct TestServer {
    addr: SocketAddr,
    _dir: TempDir,
}

fn start_server(max_queue_size: usize) -> TestServer {
    let dir = TempDir::new().unwrap();

    let mut config = Config::default();
    config.host = "127.0.0.1".to_string();
    config.port = 0;
    config.max_queue_size = max_queue_size;
    config.max_upload_mb = 1;
    config.worker_idle_ms = 5;
    config.results_folder = dir.path().join("generated_images");
    config.static_dir = dir.path().join("static");

    let metrics = MetricsCollector::new();
    let manager = JobManager::start(JobManagerConfig::from_config(&config), Arc::new(EchoGenerator), metrics.clone())
        .unwrap();

    let mut server = Server::new(config, Arc::new(manager), metrics);
    let addr = server.bind().unwrap();
    thread::spawn(move || server.run());

    TestServer { addr, _dir: dir }
}

struct HttpResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl HttpResponse {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

/// Envía bytes crudos y parsea la respuesta
fn send_raw(addr: SocketAddr, raw: &[u8]) -> HttpResponse {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream.write_all(raw).unwrap();
    stream.flush().unwrap();

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).unwrap();

    let split = buf.windows(4).position(|w| w == b"\r\n\r\n").expect("no head terminator");
    let head = String::from_utf8_lossy(&buf[..split]).into_owned();
    let body = buf[split + 4..].to_vec();

    let mut lines = head.split("\r\n");
    let status = lines.next().unwrap().split_whitespace().nth(1).unwrap().parse().unwrap();
    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    HttpResponse { status, headers, body }
}

fn get(addr: SocketAddr, path: &str) -> HttpResponse {
    send_raw(addr, format!("GET {} HTTP/1.0\r\n\r\n", path).as_bytes())
}

fn post_image(addr: SocketAddr, query: &str, image: &[u8]) -> HttpResponse {
    let mut raw = format!(
        "POST /process-image?{} HTTP/1.0\r\nContent-Type: image/png\r\nContent-Length: {}\r\n\r\n",
        query,
        image.len()
    )
    .into_bytes();
    raw.extend_from_slice(image);
    send_raw(addr, &raw)
}

fn sample_image() -> Vec<u8> {
    let mut bytes = PNG_MAGIC.to_vec();
    bytes.extend((0..64u8).collect::<Vec<_>>());
    bytes
}

fn wait_until_completed(addr: SocketAddr, job_id: &str) -> serde_json::Value {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let response = get(addr, &format!("/status/{}", job_id));
        assert_eq!(response.status, 200);
        let body = response.json();
        if body["status"] == "completed" || body["status"] == "failed" {
            return body;
        }
        assert!(Instant::now() < deadline, "job never finished: {}", body);
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn test_submit_poll_and_download() {
    let server = start_server(10);
    let image = sample_image();

    let response = post_image(server.addr, "prompt=a%20red%20fox&seed=42&filename=fox.png", &image);
    assert_eq!(response.status, 202);
    assert_eq!(response.header("Access-Control-Allow-Origin"), Some("*"));

    let body = response.json();
    let job_id = body["job_id"].as_str().unwrap().to_string();
    assert_eq!(body["message"], "Request accepted and queued.");
    assert_eq!(body["status_url"], format!("/status/{}", job_id));
    assert_eq!(body["result_url"], format!("/result/{}", job_id));

    let status = wait_until_completed(server.addr, &job_id);
    assert_eq!(status["status"], "completed");
    assert!(status.get("queue_position").is_none());

    let result = get(server.addr, &format!("/result/{}", job_id));
    assert_eq!(result.status, 200);
    assert_eq!(result.header("Content-Type"), Some("image/png"));

    let mut expected = image.clone();
    expected.extend_from_slice(b"a red fox");
    assert_eq!(result.body, expected);

    let etag = format!("\"{:x}\"", Sha256::digest(&expected));
    assert_eq!(result.header("ETag"), Some(etag.as_str()));

    // Descargas repetidas entregan el mismo artefacto
    let again = get(server.addr, &format!("/result/{}", job_id));
    assert_eq!(again.body, result.body);
    assert_eq!(again.header("ETag"), result.header("ETag"));

    let conditional = send_raw(
        server.addr,
        format!("GET /result/{} HTTP/1.0\r\nIf-None-Match: {}\r\n\r\n", job_id, etag).as_bytes(),
    );
    assert_eq!(conditional.status, 304);
}

#[test]
fn test_unknown_job_is_404() {
    let server = start_server(10);

    let unknown = JobId::new();
    let status = get(server.addr, &format!("/status/{}", unknown));
    assert_eq!(status.status, 404);
    assert_eq!(status.json()["error"], "Job ID not found.");

    let result = get(server.addr, &format!("/result/{}", unknown));
    assert_eq!(result.status, 404);

    assert_eq!(get(server.addr, "/status/not-a-job").status, 404);
}

#[test]
fn test_invalid_uploads_are_400() {
    let server = start_server(10);

    let empty = post_image(server.addr, "prompt=x", b"");
    assert_eq!(empty.status, 400);

    let not_image = post_image(server.addr, "prompt=x", b"definitely not an image");
    assert_eq!(not_image.status, 400);
    assert_eq!(not_image.json()["error"], "The uploaded file is not a valid image.");

    let bad_number = post_image(server.addr, "prompt=x&num_inference_steps=lots", &sample_image());
    assert_eq!(bad_number.status, 400);
}

#[test]
fn test_upload_over_limit_is_413() {
    let server = start_server(10);

    let raw = format!(
        "POST /process-image?prompt=x HTTP/1.0\r\nContent-Length: {}\r\n\r\n",
        2 * 1024 * 1024
    );
    let response = send_raw(server.addr, raw.as_bytes());

    assert_eq!(response.status, 413);
    let body = response.json();
    assert_eq!(body["error"], "Payload Too Large");
    assert!(body["message"].as_str().unwrap().contains("1MB"));
}

#[test]
fn test_unknown_route_and_wrong_method() {
    let server = start_server(10);

    let missing = get(server.addr, "/does-not-exist");
    assert_eq!(missing.status, 404);
    assert_eq!(missing.json()["error"], "Not Found");

    let wrong_method = get(server.addr, "/process-image");
    assert_eq!(wrong_method.status, 405);
    assert_eq!(wrong_method.json()["error"], "Method Not Allowed");
    assert_eq!(wrong_method.header("Allow"), Some("POST"));
}

#[test]
fn test_metrics_include_job_counters() {
    let server = start_server(10);

    let response = post_image(server.addr, "prompt=metrics", &sample_image());
    let job_id = response.json()["job_id"].as_str().unwrap().to_string();
    wait_until_completed(server.addr, &job_id);

    let metrics = get(server.addr, "/metrics");
    assert_eq!(metrics.status, 200);
    let body = metrics.json();
    assert_eq!(body["jobs"]["submitted"], 1);
    assert_eq!(body["jobs"]["completed"], 1);
    assert_eq!(body["job_queue"]["capacity"], 10);
    assert!(body["requests"]["total"].as_u64().unwrap() >= 2);
}

#[test]
fn test_observability_headers() {
    let server = start_server(10);
    let response = get(server.addr, "/metrics");

    assert!(response.header("X-Request-Id").is_some());
    assert!(response.header("X-Worker-Thread").is_some());
    assert_eq!(
        response.header("X-Worker-Pid"),
        Some(std::process::id().to_string().as_str())
    );
}
