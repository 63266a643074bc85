use super::context::{full_body, BoxBody};
use crate::error::ApiError;
use crate::validator::Validator;
use bytes::Bytes;
use http::header::{ALLOW, CONTENT_TYPE, WWW_AUTHENTICATE};
use http::{HeaderValue, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::error::Category;
use std::collections::HashMap;

/// Largest request body the decoder accepts.
pub const MAX_BODY_BYTES: usize = 1_048_576;

const FALLBACK_ERROR: &str =
    "{\n\t\"error\": \"the server encountered a problem and could not process your request\"\n}\n";

fn json_response(status: StatusCode, mut body: Vec<u8>) -> Response<BoxBody> {
    body.push(b'\n');
    let mut resp = Response::new(full_body(body));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    resp
}

/// Serialize `data` as an indented JSON envelope.
pub fn write_json<T: Serialize>(status: StatusCode, data: &T) -> Result<Response<BoxBody>, ApiError> {
    let body = serde_json::to_vec_pretty(data).map_err(ApiError::server_fault)?;
    Ok(json_response(status, body))
}

/// Render an error as `{"error": ...}` with the headers its kind requires.
pub fn error_response(err: &ApiError) -> Response<BoxBody> {
    let envelope = match err {
        ApiError::FailedValidation(errors) => serde_json::json!({ "error": errors }),
        other => serde_json::json!({ "error": other.public_message() }),
    };

    let mut resp = match serde_json::to_vec_pretty(&envelope) {
        Ok(body) => json_response(err.status(), body),
        Err(_) => {
            let mut resp = Response::new(full_body(FALLBACK_ERROR));
            *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            resp
        }
    };

    if err.challenges_bearer() {
        resp.headers_mut()
            .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    }
    if let ApiError::MethodNotAllowed { allowed, .. } = err {
        let list = allowed
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        if let Ok(v) = HeaderValue::from_str(&list) {
            resp.headers_mut().insert(ALLOW, v);
        }
    }
    resp
}

/// Decode exactly one JSON value from `body` into `T`. Unknown fields are
/// rejected when `T` is declared with `deny_unknown_fields`.
pub fn read_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ApiError::BadRequest("body must not be empty".to_string()));
    }

    let mut de = serde_json::Deserializer::from_slice(body);
    let value = T::deserialize(&mut de).map_err(classify)?;
    de.end().map_err(|_| {
        ApiError::BadRequest("body must only contain a single JSON value".to_string())
    })?;
    Ok(value)
}

fn classify(e: serde_json::Error) -> ApiError {
    let msg = match e.classify() {
        Category::Syntax => format!(
            "body contains badly-formed JSON (at line {} column {})",
            e.line(),
            e.column()
        ),
        Category::Eof => "body contains badly-formed JSON".to_string(),
        Category::Data => {
            let text = e.to_string();
            if let Some(rest) = text.strip_prefix("unknown field `") {
                let field = rest.split('`').next().unwrap_or_default();
                format!("body contains unknown key \"{}\"", field)
            } else if text.starts_with("invalid type") {
                format!(
                    "body contains incorrect JSON type (at line {} column {})",
                    e.line(),
                    e.column()
                )
            } else {
                // Messages raised by our own Deserialize impls.
                text.split(" at line ").next().unwrap_or_default().to_string()
            }
        }
        Category::Io => return ApiError::server_fault(e),
    };
    ApiError::BadRequest(msg)
}

/// Decoded query string parameters.
pub fn query_params(query: Option<&str>) -> HashMap<String, String> {
    query
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect()
        })
        .unwrap_or_default()
}

pub fn read_string(qs: &HashMap<String, String>, key: &str, default: &str) -> String {
    match qs.get(key) {
        Some(v) if !v.is_empty() => v.clone(),
        _ => default.to_string(),
    }
}

pub fn read_csv(qs: &HashMap<String, String>, key: &str, default: &[&str]) -> Vec<String> {
    match qs.get(key) {
        Some(v) if !v.is_empty() => v.split(',').map(|s| s.to_string()).collect(),
        _ => default.iter().map(|s| s.to_string()).collect(),
    }
}

/// Parse an integer parameter, recording a field error instead of failing.
pub fn read_int(
    qs: &HashMap<String, String>,
    key: &str,
    default: usize,
    v: &mut Validator,
) -> usize {
    match qs.get(key) {
        Some(s) if !s.is_empty() => match s.parse::<usize>() {
            Ok(n) => n,
            Err(_) => {
                v.add_error(key, "must be an integer value");
                default
            }
        },
        _ => default,
    }
}
