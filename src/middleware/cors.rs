use crate::api::{empty_body, BoxBody};
use http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_REQUEST_METHOD, ORIGIN, VARY,
};
use http::{HeaderMap, HeaderValue, Method, Response, StatusCode};

/// Outcome of the CORS stage.
pub enum CorsResult {
    /// Carry on; `allow_origin` is echoed on the final response if set.
    Continue { allow_origin: Option<HeaderValue> },
    /// A preflight from a trusted origin, answered here.
    Preflight(Response<BoxBody>),
}

/// Cross-origin policy over an exact-match list of trusted origins.
#[derive(Debug, Clone, Default)]
pub struct Cors {
    trusted_origins: Vec<String>,
}

impl Cors {
    pub fn new(trusted_origins: Vec<String>) -> Self {
        Self { trusted_origins }
    }

    pub fn on_request(&self, method: &Method, headers: &HeaderMap) -> CorsResult {
        let origin = headers.get(ORIGIN).filter(|o| !o.is_empty());
        let allow_origin = origin
            .filter(|o| {
                o.to_str()
                    .map(|s| self.trusted_origins.iter().any(|t| t == s))
                    .unwrap_or(false)
            })
            .cloned();

        let Some(allowed) = allow_origin else {
            return CorsResult::Continue { allow_origin: None };
        };

        if *method == Method::OPTIONS && headers.contains_key(ACCESS_CONTROL_REQUEST_METHOD) {
            let mut resp = Response::new(empty_body());
            *resp.status_mut() = StatusCode::OK;
            let h = resp.headers_mut();
            h.insert(ACCESS_CONTROL_ALLOW_ORIGIN, allowed);
            h.insert(
                ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static("OPTIONS, PUT, PATCH, DELETE"),
            );
            h.insert(
                ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static("Authorization, Content-Type"),
            );
            vary_cors(h);
            return CorsResult::Preflight(resp);
        }

        CorsResult::Continue {
            allow_origin: Some(allowed),
        }
    }
}

pub fn vary_cors(headers: &mut HeaderMap) {
    headers.append(VARY, HeaderValue::from_static("Origin"));
    headers.append(VARY, HeaderValue::from_static("Access-Control-Request-Method"));
}

/// Stamp CORS headers onto an outgoing response.
pub fn on_response(allow_origin: Option<HeaderValue>, resp: &mut Response<BoxBody>) {
    let h = resp.headers_mut();
    vary_cors(h);
    if let Some(origin) = allow_origin {
        h.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cors() -> Cors {
        Cors::new(vec!["https://app.example.com".to_string()])
    }

    fn headers(pairs: &[(http::HeaderName, &'static str)]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for (k, v) in pairs {
            h.insert(k.clone(), HeaderValue::from_static(*v));
        }
        h
    }

    #[test]
    fn untrusted_origin_gets_no_allow_header() {
        let h = headers(&[(ORIGIN, "https://evil.example.com")]);
        match cors().on_request(&Method::GET, &h) {
            CorsResult::Continue { allow_origin } => assert!(allow_origin.is_none()),
            CorsResult::Preflight(_) => panic!("untrusted origin must not preflight"),
        }
    }

    #[test]
    fn trusted_origin_is_echoed() {
        let h = headers(&[(ORIGIN, "https://app.example.com")]);
        let CorsResult::Continue { allow_origin } = cors().on_request(&Method::GET, &h) else {
            panic!("simple request must continue");
        };
        let mut resp = Response::new(empty_body());
        on_response(allow_origin, &mut resp);
        assert_eq!(
            resp.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "https://app.example.com"
        );
        assert_eq!(resp.headers().get_all(VARY).iter().count(), 2);
    }

    #[test]
    fn trusted_preflight_is_answered() {
        let h = headers(&[
            (ORIGIN, "https://app.example.com"),
            (ACCESS_CONTROL_REQUEST_METHOD, "DELETE"),
        ]);
        let CorsResult::Preflight(resp) = cors().on_request(&Method::OPTIONS, &h) else {
            panic!("expected preflight response");
        };
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(ACCESS_CONTROL_ALLOW_METHODS).unwrap(),
            "OPTIONS, PUT, PATCH, DELETE"
        );
    }

    #[test]
    fn options_without_request_method_is_not_preflight() {
        let h = headers(&[(ORIGIN, "https://app.example.com")]);
        assert!(matches!(
            cors().on_request(&Method::OPTIONS, &h),
            CorsResult::Continue { .. }
        ));
    }
}
