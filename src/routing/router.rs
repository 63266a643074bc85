use crate::api::{BoxBody, Call};
use crate::error::ApiError;
use crate::middleware::authorize::Access;
use crate::server::AppState;
use http::{Method, Response};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Response<BoxBody>, ApiError>> + Send>>;

/// Endpoint logic. Runs after every gate of its route has passed.
pub type Handler = Arc<dyn Fn(AppState, Call) -> HandlerFuture + Send + Sync>;

/// Box an async fn into a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(AppState, Call) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response<BoxBody>, ApiError>> + Send + 'static,
{
    Arc::new(move |state, call| Box::pin(f(state, call)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

fn compile(pattern: &str) -> Vec<Segment> {
    pattern
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| match s.strip_prefix(':') {
            Some(name) => Segment::Param(name.to_string()),
            None => Segment::Literal(s.to_string()),
        })
        .collect()
}

/// Named path parameters captured by a match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    #[cfg(test)]
    pub(crate) fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

struct Route {
    method: Method,
    pattern: String,
    segments: Vec<Segment>,
    access: Access,
    handler: Handler,
}

impl Route {
    fn capture(&self, parts: &[&str]) -> Option<Params> {
        if parts.len() != self.segments.len() {
            return None;
        }
        let mut params = Vec::new();
        for (seg, part) in self.segments.iter().zip(parts) {
            match seg {
                Segment::Literal(lit) if lit == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => params.push((name.clone(), part.to_string())),
            }
        }
        Some(Params(params))
    }
}

/// A resolved route: the gate to run and the handler behind it.
pub struct Matched<'a> {
    pub pattern: &'a str,
    pub access: &'a Access,
    pub handler: &'a Handler,
    pub params: Params,
}

/// Method + path dispatch with `:name` parameter segments. Routes are
/// tried in registration order.
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, method: Method, pattern: &str, access: Access, handler: Handler) -> Self {
        self.routes.push(Route {
            method,
            pattern: pattern.to_string(),
            segments: compile(pattern),
            access,
            handler,
        });
        self
    }

    /// Resolve a request. A path known under other methods is
    /// `MethodNotAllowed`; an unknown path is `NotFound`.
    pub fn lookup(&self, method: &Method, path: &str) -> Result<Matched<'_>, ApiError> {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut allowed = Vec::new();

        for route in &self.routes {
            let Some(params) = route.capture(&parts) else {
                continue;
            };
            if route.method == *method {
                return Ok(Matched {
                    pattern: &route.pattern,
                    access: &route.access,
                    handler: &route.handler,
                    params,
                });
            }
            if !allowed.contains(&route.method) {
                allowed.push(route.method.clone());
            }
        }

        if allowed.is_empty() {
            Err(ApiError::NotFound)
        } else {
            Err(ApiError::MethodNotAllowed {
                method: method.clone(),
                allowed,
            })
        }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
