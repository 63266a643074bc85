use crate::api::json::write_json;
use crate::api::{BoxBody, Call};
use crate::error::ApiError;
use crate::server::AppState;
use http::{Response, StatusCode};
use serde_json::json;

pub async fn show(state: AppState, _call: Call) -> Result<Response<BoxBody>, ApiError> {
    write_json(
        StatusCode::OK,
        &json!({
            "status": "available",
            "system_info": {
                "environment": state.config.env,
                "version": env!("CARGO_PKG_VERSION"),
            },
        }),
    )
}
