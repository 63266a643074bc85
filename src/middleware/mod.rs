pub mod authenticate;
pub mod authorize;
pub mod cors;
pub mod rate_limit;
pub mod recover;

#[cfg(test)]
mod rate_limit_tests;

pub use authenticate::Authenticator;
pub use authorize::{Access, Authorizer};
pub use cors::{Cors, CorsResult};
pub use rate_limit::RateLimiter;
