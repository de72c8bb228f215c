//! Authentication for the trigger endpoints.

mod middleware;

pub use middleware::AuthUser;
