use super::{AppState, ShutdownPhase};
use crate::api::{full_body, BoxBody};
use http::header::CONTENT_TYPE;
use http::{HeaderValue, StatusCode};
use hyper::body::Incoming;
use hyper::{Request, Response};

fn respond(status: StatusCode, content_type: &'static str, body: String) -> Response<BoxBody> {
    let mut resp = Response::new(full_body(body));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    resp
}

pub async fn handle_admin(
    req: Request<Incoming>,
    state: AppState,
    phase: ShutdownPhase,
) -> Result<Response<BoxBody>, hyper::Error> {
    Ok(route_admin(req.uri().path(), &state, phase).await)
}

async fn route_admin(path: &str, state: &AppState, phase: ShutdownPhase) -> Response<BoxBody> {
    match path {
        "/health" | "/healthz" => respond(
            StatusCode::OK,
            "application/json",
            r#"{"status":"ok"}"#.to_string(),
        ),

        "/ready" | "/readyz" => {
            let (status, label) = match phase {
                ShutdownPhase::Running => (StatusCode::OK, "ready"),
                ShutdownPhase::Draining => (StatusCode::SERVICE_UNAVAILABLE, "draining"),
                ShutdownPhase::Stopped => (StatusCode::SERVICE_UNAVAILABLE, "stopped"),
            };
            let body = serde_json::json!({
                "status": label,
                "environment": state.config.env,
                "routes": state.router.len(),
                "rate_limited_clients": state.limiter.client_count().await,
            });
            respond(status, "application/json", body.to_string())
        }

        "/metrics" => match &state.metrics {
            Some(m) => respond(
                StatusCode::OK,
                "text/plain; version=0.0.4; charset=utf-8",
                m.render(),
            ),
            None => respond(
                StatusCode::NOT_FOUND,
                "application/json",
                r#"{"error":"metrics recorder not installed"}"#.to_string(),
            ),
        },

        _ => respond(
            StatusCode::NOT_FOUND,
            "application/json",
            r#"{"error":"not found"}"#.to_string(),
        ),
    }
}
