use super::context::{BoxBody, RequestContext};
use super::json::{error_response, query_params, MAX_BODY_BYTES};
use super::Call;
use crate::error::ApiError;
use crate::middleware::{authenticate, cors, rate_limit, recover, CorsResult};
use crate::server::AppState;
use bytes::Bytes;
use http::{Method, Request, Response};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Body;
use tokio::time::Instant;
use tracing::{debug, error};

/// Handle a request through the fixed stage order:
///
/// 1. RECOVER      — a panic becomes a 500 + `Connection: close`; handler
///                   panics are caught inside the chain so the Vary and CORS
///                   headers still apply, this outer one is the backstop
/// 2. CORS         — trusted-origin headers, preflight short-circuit
/// 3. RATE_LIMIT   — per-client token bucket
/// 4. AUTHENTICATE — bearer token to principal, `Vary: Authorization`
/// 5. ROUTE        — method + path dispatch (404 / 405)
/// 6. AUTHORIZE    — the route's access gates
/// 7. HANDLER      — endpoint logic
/// 8. LOG          — access line and request metrics
pub async fn handle_request<B>(
    req: Request<B>,
    state: AppState,
    remote_addr: String,
) -> Result<Response<BoxBody>, hyper::Error>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    metrics::counter!("api_requests_received_total").increment(1);

    let resp = recover::recover(run_chain(req, &state, &remote_addr, start)).await;

    let elapsed = start.elapsed();
    let mut buf = itoa::Buffer::new();
    let status_str = buf.format(resp.status().as_u16());
    metrics::counter!(
        "api_responses_sent_total",
        "status_code" => status_str.to_owned(),
    )
    .increment(1);
    metrics::histogram!("api_request_duration_seconds").record(elapsed.as_secs_f64());

    tracing::info!(
        client = %remote_addr,
        method = %method,
        path = %path,
        status = resp.status().as_u16(),
        latency_ms = %format!("{:.3}", elapsed.as_secs_f64() * 1000.0),
        "access"
    );

    Ok(resp)
}

async fn run_chain<B>(
    req: Request<B>,
    state: &AppState,
    remote_addr: &str,
    start: Instant,
) -> Response<BoxBody>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let allow_origin = match state.cors.on_request(req.method(), req.headers()) {
        CorsResult::Preflight(resp) => return resp,
        CorsResult::Continue { allow_origin } => allow_origin,
    };

    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let mut resp = match rate_limit::rate_limit_on_request(&state.limiter, remote_addr).await {
        Err(e) => reject(&e, &method, &path),
        Ok(client) => {
            // Recover below the header stamping so a 500 from a panic still
            // carries the Vary and CORS headers.
            let mut resp = recover::recover(async {
                match phase_dispatch(req, state, client, start).await {
                    Ok(resp) => resp,
                    Err(e) => reject(&e, &method, &path),
                }
            })
            .await;
            authenticate::vary_authorization(resp.headers_mut());
            resp
        }
    };

    cors::on_response(allow_origin, &mut resp);
    resp
}

/// Authenticate, route, authorize, then run the handler.
async fn phase_dispatch<B>(
    req: Request<B>,
    state: &AppState,
    client: String,
    start: Instant,
) -> Result<Response<BoxBody>, ApiError>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = req.into_parts();

    let principal = state.authenticator.authenticate(&parts.headers).await?;
    let ctx = RequestContext::new(
        parts.method.clone(),
        parts.uri.path().to_string(),
        client,
        principal,
        start,
    );

    let matched = state.router.lookup(ctx.method(), ctx.path())?;
    state
        .authorizer
        .authorize(matched.access, ctx.principal())
        .await?;

    let body = read_body(body).await?;
    let call = Call {
        ctx,
        params: matched.params,
        query: query_params(parts.uri.query()),
        body,
    };
    (matched.handler)(state.clone(), call).await
}

async fn read_body<B>(body: B) -> Result<Bytes, ApiError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => Err(ApiError::BadRequest(format!(
            "body must not be larger than {} bytes",
            MAX_BODY_BYTES
        ))),
        Err(e) => Err(ApiError::BadRequest(format!(
            "unable to read request body: {}",
            e
        ))),
    }
}

fn reject(err: &ApiError, method: &Method, path: &str) -> Response<BoxBody> {
    match err {
        ApiError::ServerFault(detail) => {
            error!(
                "api: server fault, method={}, path={}, error={}",
                method, path, detail
            );
        }
        ApiError::InvalidCredentialFormat
        | ApiError::InvalidCredentials
        | ApiError::AuthenticationRequired
        | ApiError::NotPermitted => {
            debug!("api: access denied, method={}, path={}, reason={}", method, path, err);
            metrics::counter!(
                "api_auth_failures_total",
                "reason" => auth_reason(err),
            )
            .increment(1);
        }
        _ => {}
    }
    error_response(err)
}

fn auth_reason(err: &ApiError) -> &'static str {
    match err {
        ApiError::InvalidCredentialFormat => "invalid_format",
        ApiError::InvalidCredentials => "invalid_credentials",
        ApiError::AuthenticationRequired => "authentication_required",
        _ => "not_permitted",
    }
}
