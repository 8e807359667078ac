//! # Sistema de Routing
//! src/router/mod.rs
//!
//! Mapea paths HTTP a handlers. Es el último eslabón de aplicación del
//! pipeline: implementa `Handler`, así que se monta con `HandlerStage`.
//!
//! ```text
//! Request → Router → handler(&Request) → Response → ResponseWriter
//! ```
//!
//! Si no hay handler para el path, responde 404 Not Found.

use crate::http::{Request, Response, StatusCode};
use crate::pipeline::Handler;
use crate::sink::ResponseWriter;

/// Función que atiende un path
pub type RouteFn = Box<dyn Fn(&Request) -> Response + Send + Sync>;

/// Valor del header `Server`
pub const SERVER_NAME: &str = "http_gate/0.1";

/// Router que mapea paths a handlers
pub struct Router {
    routes: Vec<(String, RouteFn)>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Registra una ruta con su handler
    ///
    /// # Ejemplo
    /// ```
    /// use http_gate::router::Router;
    /// use http_gate::http::Response;
    ///
    /// let mut router = Router::new();
    /// router.register("/hello", |_req| Response::json(r#"{"message": "Hello"}"#));
    /// ```
    pub fn register<F>(&mut self, path: &str, handler: F)
    where
        F: Fn(&Request) -> Response + Send + Sync + 'static,
    {
        self.routes.push((path.to_string(), Box::new(handler)));
    }

    /// Ejecuta el handler del path, o arma un 404
    ///
    /// # Ejemplo
    /// ```
    /// use http_gate::router::Router;
    /// use http_gate::http::{Request, StatusCode};
    ///
    /// let router = Router::new();
    /// let request = Request::parse(b"GET /test HTTP/1.0\r\n\r\n").unwrap();
    /// assert_eq!(router.route(&request).status(), StatusCode::NOT_FOUND);
    /// ```
    pub fn route(&self, request: &Request) -> Response {
        let path = request.path();

        let mut response = match self.routes.iter().find(|(route, _)| route == path) {
            Some((_, handler)) => handler(request),
            None => Response::error(StatusCode::NOT_FOUND, &format!("Route not found: {}", path)),
        };
        response.add_header("Server", SERVER_NAME);
        response
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Handler for Router {
    fn handle(&self, w: &mut dyn ResponseWriter, req: &Request) {
        let response = self.route(req);
        if let Err(e) = response.write_to(w) {
            tracing::debug!(error = %e, path = req.path(), "no se pudo escribir la respuesta");
        }
    }
}
