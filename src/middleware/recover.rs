use crate::api::json::error_response;
use crate::api::BoxBody;
use crate::error::ApiError;
use futures_util::FutureExt;
use http::header::CONNECTION;
use http::{HeaderValue, Response};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

/// Run `fut`, turning a panic anywhere inside it into a 500 that also asks
/// the client to drop the connection.
///
/// `Connection: close` only takes effect on HTTP/1, where hyper closes the
/// connection once the response is written. HTTP/2 forbids connection-level
/// headers, so hyper strips it and the panic ends just that one stream while
/// the connection stays open.
pub async fn recover<F>(fut: F) -> Response<BoxBody>
where
    F: Future<Output = Response<BoxBody>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(resp) => resp,
        Err(payload) => {
            let detail = panic_message(payload.as_ref());
            tracing::error!("middleware: recover: request panicked, panic={}", detail);
            metrics::counter!("api_panics_recovered_total").increment(1);

            let mut resp = error_response(&ApiError::ServerFault(detail));
            resp.headers_mut()
                .insert(CONNECTION, HeaderValue::from_static("close"));
            resp
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
