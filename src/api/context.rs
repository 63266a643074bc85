use crate::data::User;
use bytes::Bytes;
use http::Method;
use http_body_util::{BodyExt, Full};
use std::sync::Arc;
use tokio::time::Instant;

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

pub fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

pub fn empty_body() -> BoxBody {
    Full::new(Bytes::new())
        .map_err(|never| match never {})
        .boxed()
}

/// Who is making the request.
#[derive(Debug, Clone)]
pub enum Principal {
    /// No credential was presented.
    Anonymous,
    User(Arc<User>),
}

impl Principal {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Principal::Anonymous)
    }

    pub fn id(&self) -> Option<i64> {
        match self {
            Principal::Anonymous => None,
            Principal::User(u) => Some(u.id),
        }
    }

    pub fn activated(&self) -> bool {
        match self {
            Principal::Anonymous => false,
            Principal::User(u) => u.activated,
        }
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            Principal::Anonymous => None,
            Principal::User(u) => Some(u),
        }
    }
}

/// Per-request facts fixed once authentication has run. Downstream stages
/// and handlers only ever read it.
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    path: String,
    client: String,
    principal: Principal,
    start: Instant,
}

impl RequestContext {
    pub fn new(
        method: Method,
        path: String,
        client: String,
        principal: Principal,
        start: Instant,
    ) -> Self {
        Self {
            method,
            path,
            client,
            principal,
            start,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Rate limiting identity (client IP).
    pub fn client(&self) -> &str {
        &self.client
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn start(&self) -> Instant {
        self.start
    }
}
