//! # Sistema de Routing
//! src/router/mod.rs
//!
//! Mapea método + path a handlers.
//!
//! ```text
//! Request → Router → Handler → Response
//! ```
//!
//! Los patrones admiten segmentos variables con llaves, por ejemplo
//! `/status/{id}`. Si el path existe pero con otro método se responde
//! 405; si no existe, 404. `HEAD` se atiende con el handler de `GET`.

use crate::http::{Method, Request, Response, StatusCode};
use std::collections::HashMap;

/// Handler con estado capturado
pub type Handler = Box<dyn Fn(&Request, &RouteParams) -> Response + Send + Sync>;

/// Valores de los segmentos variables de la ruta
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RouteParams(HashMap<String, String>);

impl RouteParams {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(|s| s.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

struct Route {
    method: Method,
    pattern: Vec<Segment>,
    handler: Handler,
}

impl Route {
    fn matches(&self, path: &str) -> Option<RouteParams> {
        let parts = split_path(path);
        if parts.len() != self.pattern.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (segment, part) in self.pattern.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(_) if part.is_empty() => return None,
                Segment::Param(name) => {
                    params.insert(name.clone(), part.to_string());
                }
            }
        }

        Some(RouteParams(params))
    }
}

fn split_path(path: &str) -> Vec<&str> {
    path.trim_matches('/')
        .split('/')
        .filter(|part| !part.is_empty())
        .collect()
}

fn parse_pattern(pattern: &str) -> Vec<Segment> {
    split_path(pattern)
        .into_iter()
        .map(|part| match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
            Some(name) => Segment::Param(name.to_string()),
            None => Segment::Literal(part.to_string()),
        })
        .collect()
}

/// Router que mapea rutas a handlers
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra una ruta con su handler
    ///
    /// # Ejemplo
    /// ```
    /// use image_queue::router::Router;
    /// use image_queue::http::{Method, Request, Response, StatusCode};
    ///
    /// let mut router = Router::new();
    /// router.register(Method::GET, "/hello/{name}", |_req, params| {
    ///     let name = params.get("name").unwrap_or_default();
    ///     Response::json(StatusCode::Ok, &serde_json::json!({ "hello": name }))
    /// });
    ///
    /// let request = Request::parse(b"GET /hello/ana HTTP/1.0\r\n\r\n").unwrap();
    /// assert_eq!(router.route(&request).status(), StatusCode::Ok);
    /// ```
    pub fn register<F>(&mut self, method: Method, pattern: &str, handler: F)
    where
        F: Fn(&Request, &RouteParams) -> Response + Send + Sync + 'static,
    {
        self.routes.push(Route {
            method,
            pattern: parse_pattern(pattern),
            handler: Box::new(handler),
        });
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Encuentra y ejecuta el handler apropiado para un request
    pub fn route(&self, request: &Request) -> Response {
        let method = request.method();
        let lookup = if method == Method::HEAD { Method::GET } else { method };

        let mut allowed: Vec<Method> = Vec::new();

        for route in &self.routes {
            let Some(params) = route.matches(request.path()) else {
                continue;
            };

            if route.method == lookup {
                let response = (route.handler)(request, &params);
                let response = if method == Method::HEAD {
                    response.without_body()
                } else {
                    response
                };
                return with_common_headers(response);
            }
            allowed.push(route.method);
        }

        let response = if allowed.is_empty() {
            Response::error_with_message(StatusCode::NotFound, "The requested URL was not found on the server.")
        } else if method == Method::OPTIONS {
            preflight(&allowed)
        } else {
            let mut response = Response::error_with_message(
                StatusCode::MethodNotAllowed,
                "The method is not allowed for the requested URL.",
            );
            response.add_header("Allow", &allow_header(&allowed));
            response
        };

        with_common_headers(response)
    }
}

fn allow_header(allowed: &[Method]) -> String {
    allowed.iter().map(Method::as_str).collect::<Vec<_>>().join(", ")
}

/// Respuesta a un preflight de CORS
fn preflight(allowed: &[Method]) -> Response {
    let mut methods = allowed.to_vec();
    methods.push(Method::OPTIONS);

    Response::new(StatusCode::NoContent)
        .with_header("Access-Control-Allow-Methods", &allow_header(&methods))
        .with_header("Access-Control-Allow-Headers", "Content-Type")
}

/// Headers comunes a todas las respuestas
fn with_common_headers(response: Response) -> Response {
    response
        .with_header("Server", "ImageQueue-HTTP/1.0")
        .with_header("Connection", "close")
        .with_header("Access-Control-Allow-Origin", "*")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(_req: &Request, _params: &RouteParams) -> Response {
        Response::json(StatusCode::Ok, &serde_json::json!({ "test": "ok" }))
    }

    fn request(raw: &[u8]) -> Request {
        Request::parse(raw).unwrap()
    }

    #[test]
    fn test_register_route() {
        let mut router = Router::new();
        assert!(router.is_empty());
        router.register(Method::GET, "/test", ok);
        assert_eq!(router.len(), 1);
    }

    #[test]
    fn test_route_found() {
        let mut router = Router::new();
        router.register(Method::GET, "/test", ok);

        let response = router.route(&request(b"GET /test HTTP/1.0\r\n\r\n"));
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(response.header("Access-Control-Allow-Origin"), Some("*"));
        assert_eq!(response.header("Connection"), Some("close"));
    }

    #[test]
    fn test_route_not_found() {
        let router = Router::new();
        let response = router.route(&request(b"GET /nonexistent HTTP/1.0\r\n\r\n"));

        assert_eq!(response.status(), StatusCode::NotFound);
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["error"], "Not Found");
        assert_eq!(response.header("Access-Control-Allow-Origin"), Some("*"));
    }

    #[test]
    fn test_path_params() {
        let mut router = Router::new();
        router.register(Method::GET, "/status/{id}", |_req, params| {
            Response::json(StatusCode::Ok, &serde_json::json!({ "id": params.get("id") }))
        });

        let response = router.route(&request(b"GET /status/abc-123 HTTP/1.0\r\n\r\n"));
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["id"], "abc-123");

        let missing = router.route(&request(b"GET /status/ HTTP/1.0\r\n\r\n"));
        assert_eq!(missing.status(), StatusCode::NotFound);

        let extra = router.route(&request(b"GET /status/a/b HTTP/1.0\r\n\r\n"));
        assert_eq!(extra.status(), StatusCode::NotFound);
    }

    #[test]
    fn test_wrong_method_is_405() {
        let mut router = Router::new();
        router.register(Method::POST, "/process-image", ok);

        let response = router.route(&request(b"GET /process-image HTTP/1.0\r\n\r\n"));
        assert_eq!(response.status(), StatusCode::MethodNotAllowed);
        assert_eq!(response.header("Allow"), Some("POST"));
    }

    #[test]
    fn test_head_uses_get_handler_without_body() {
        let mut router = Router::new();
        router.register(Method::GET, "/test", ok);

        let response = router.route(&request(b"HEAD /test HTTP/1.0\r\n\r\n"));
        assert_eq!(response.status(), StatusCode::Ok);
        assert!(response.body().is_empty());
        assert!(response.header("Content-Length").is_some());
    }

    #[test]
    fn test_options_preflight() {
        let mut router = Router::new();
        router.register(Method::POST, "/process-image", ok);

        let response = router.route(&request(b"OPTIONS /process-image HTTP/1.0\r\n\r\n"));
        assert_eq!(response.status(), StatusCode::NoContent);
        assert_eq!(response.header("Access-Control-Allow-Methods"), Some("POST, OPTIONS"));
        assert_eq!(response.header("Access-Control-Allow-Origin"), Some("*"));
    }

    #[test]
    fn test_multiple_routes_same_path() {
        let mut router = Router::new();
        router.register(Method::GET, "/", ok);
        router.register(Method::POST, "/", |_req, _params| Response::new(StatusCode::Accepted));

        assert_eq!(router.route(&request(b"GET / HTTP/1.0\r\n\r\n")).status(), StatusCode::Ok);
        assert_eq!(router.route(&request(b"POST / HTTP/1.0\r\n\r\n")).status(), StatusCode::Accepted);
    }
}
