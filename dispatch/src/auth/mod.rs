//! Request authentication.

mod middleware;

pub use middleware::IngestClient;
