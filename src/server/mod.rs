//! # Módulo del Servidor HTTP
//! src/server/mod.rs
//!
//! Servidor TCP que:
//! 1. Escucha en `host:port`
//! 2. Acepta conexiones y lanza un thread por cada una
//! 3. Lee el request (con límite de subida) y lo pasa al router
//! 4. Escribe la respuesta y registra métricas

pub mod tcp;

pub use tcp::Server;
