mod router;

pub use router::{handler, Handler, HandlerFuture, Matched, Params, Router};
