//! # Módulo HTTP
//! src/http/mod.rs
//!
//! Implementación mínima de HTTP/1.0 escrita a mano:
//!
//! - Parsing de requests con body binario
//! - Construcción de responses
//! - Códigos de estado
//!
//! Cada conexión atiende un único request y se cierra (HTTP/1.0, sin
//! keep-alive ni chunked encoding).

pub mod request;
pub mod response;
pub mod status;

pub use request::{Method, ParseError, Request};
pub use response::Response;
pub use status::StatusCode;
