//! # Construcción de Respuestas HTTP
//! src/http/response.rs
//!
//! Builder de respuestas HTTP/1.0. Los headers conservan el orden de
//! inserción; reinsertar un nombre reemplaza el valor anterior.
//!
//! ```text
//! HTTP/1.0 202 Accepted\r\n
//! Content-Type: application/json\r\n
//! Content-Length: 151\r\n
//! Access-Control-Allow-Origin: *\r\n
//! \r\n
//! {"job_id": "...", "message": "Request accepted and queued.", ...}
//! ```
//!
//! ## Ejemplo de uso
//!
//! ```
//! use image_queue::http::{Response, StatusCode};
//!
//! let response = Response::new(StatusCode::Ok)
//!     .with_header("Content-Type", "image/png")
//!     .with_body(vec![0x89, b'P', b'N', b'G']);
//!
//! assert_eq!(response.header("content-length"), Some("4"));
//! ```

use super::StatusCode;

pub const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,

    /// Pares (nombre, valor) en orden de inserción
    headers: Vec<(String, String)>,

    body: Vec<u8>,
}

impl Response {
    /// Respuesta sin headers ni body
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.add_header(name, value);
        self
    }

    /// Agrega o reemplaza un header (el nombre no distingue mayúsculas)
    pub fn add_header(&mut self, name: &str, value: &str) {
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            Some((_, existing_value)) => *existing_value = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
    }

    /// Establece el body y su `Content-Length`
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        let length = self.body.len().to_string();
        self.add_header("Content-Length", &length);
        self
    }

    /// Respuesta JSON con el código indicado
    ///
    /// # Ejemplo
    /// ```
    /// use image_queue::http::{Response, StatusCode};
    ///
    /// let response = Response::json(
    ///     StatusCode::Accepted,
    ///     &serde_json::json!({"job_id": "abc"}),
    /// );
    /// assert_eq!(response.status(), StatusCode::Accepted);
    /// assert_eq!(response.header("Content-Type"), Some("application/json"));
    /// ```
    pub fn json(status: StatusCode, value: &serde_json::Value) -> Self {
        Self::new(status)
            .with_header("Content-Type", JSON_CONTENT_TYPE)
            .with_body(value.to_string())
    }

    /// Error de la API: `{"error": "mensaje"}`
    pub fn error(status: StatusCode, message: &str) -> Self {
        Self::json(status, &serde_json::json!({ "error": message }))
    }

    /// Error genérico del servidor: `{"error": "<reason>", "message": "..."}`
    pub fn error_with_message(status: StatusCode, message: &str) -> Self {
        Self::json(
            status,
            &serde_json::json!({
                "error": status.reason_phrase(),
                "message": message,
            }),
        )
    }

    /// Descarta el body conservando `Content-Length` (respuestas a HEAD)
    pub fn without_body(mut self) -> Self {
        self.body.clear();
        self
    }

    /// Serializa la respuesta completa para escribirla en el socket
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut head = format!("HTTP/1.0 {}\r\n", self.status);
        for (name, value) in &self.headers {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        head.push_str("\r\n");

        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Busca un header sin distinguir mayúsculas
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}
