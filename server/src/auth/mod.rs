//! Bearer-token guard for the HTTP API.

mod middleware;

pub use middleware::Authorized;
