pub mod context;
mod handler;
pub mod json;

pub use context::{empty_body, full_body, BoxBody, Principal, RequestContext};
pub use handler::handle_request;

use crate::routing::Params;
use bytes::Bytes;
use std::collections::HashMap;

/// Everything a handler receives about the request it serves.
#[derive(Debug)]
pub struct Call {
    pub ctx: RequestContext,
    pub params: Params,
    pub query: HashMap<String, String>,
    pub body: Bytes,
}
