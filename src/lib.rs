pub mod api;
pub mod config;
pub mod data;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routing;
pub mod server;
pub mod validator;
